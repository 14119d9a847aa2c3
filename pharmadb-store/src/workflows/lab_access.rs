//! Laboratory access grants

use serde::Serialize;
use tracing::info;

use crate::db::repos::{Entity, Inspector, LabAccess, NewLabAccess};
use crate::db::Session;
use crate::error::{StoreError, StoreResult};

/// Grants moved by `transfer_lab_access`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabAccessTransfer {
    pub from_inspector_id: i64,
    pub to_inspector_id: i64,
    /// The target's new grants, one per transferred lab
    pub grants: Vec<LabAccess>,
}

fn pair_label(inspector_id: i64, lab_id: i64) -> String {
    format!("inspector {inspector_id} / lab {lab_id}")
}

/// Grant an inspector access to a laboratory. A second grant for the
/// same pair fails with `DuplicateKey`.
pub async fn grant_lab_access(session: &mut Session, grant: NewLabAccess) -> StoreResult<LabAccess> {
    let granted = session
        .within_transaction(move |s| {
            Box::pin(async move { s.repo::<LabAccess>().insert(&grant).await })
        })
        .await?;

    info!(
        inspector_id = granted.inspector_id,
        lab_id = granted.lab_id,
        "lab access granted"
    );
    Ok(granted)
}

/// Remove the grant for a pair; `NotFound` when there is none.
pub async fn revoke_lab_access(session: &mut Session, inspector_id: i64, lab_id: i64) -> StoreResult<()> {
    session
        .within_transaction(move |s| {
            Box::pin(async move {
                if s.repo::<LabAccess>().delete_pair(inspector_id, lab_id).await? {
                    Ok(())
                } else {
                    Err(StoreError::not_found(
                        LabAccess::RESOURCE,
                        pair_label(inspector_id, lab_id),
                    ))
                }
            })
        })
        .await?;

    info!(inspector_id, lab_id, "lab access revoked");
    Ok(())
}

/// Move the source inspector's grants on `lab_ids` to the target.
///
/// The target keeps the source's access level and grant date, replacing
/// any grant it already held on those labs.
pub async fn transfer_lab_access(
    session: &mut Session,
    from_inspector_id: i64,
    to_inspector_id: i64,
    mut lab_ids: Vec<i64>,
) -> StoreResult<LabAccessTransfer> {
    if from_inspector_id == to_inspector_id {
        return Err(StoreError::invalid("to_inspector_id", "cannot transfer lab access to the same inspector"));
    }
    lab_ids.sort_unstable();
    lab_ids.dedup();

    let transfer = session
        .within_transaction(move |s| {
            Box::pin(async move {
                for inspector_id in [from_inspector_id, to_inspector_id] {
                    if !s.repo::<Inspector>().exists(inspector_id).await? {
                        return Err(StoreError::not_found(Inspector::RESOURCE, inspector_id));
                    }
                }

                let mut grants = Vec::with_capacity(lab_ids.len());
                for lab_id in lab_ids {
                    let mut access = s.repo::<LabAccess>();
                    let source = access
                        .find_pair(from_inspector_id, lab_id)
                        .await?
                        .ok_or_else(|| {
                            StoreError::not_found(
                                LabAccess::RESOURCE,
                                pair_label(from_inspector_id, lab_id),
                            )
                        })?;
                    access.delete_pair(to_inspector_id, lab_id).await?;
                    let granted = access
                        .insert(&NewLabAccess {
                            inspector_id: to_inspector_id,
                            lab_id,
                            access_level: source.access_level,
                            granted_date: Some(source.granted_date),
                        })
                        .await?;
                    access.delete_pair(from_inspector_id, lab_id).await?;
                    grants.push(granted);
                }

                Ok(LabAccessTransfer {
                    from_inspector_id,
                    to_inspector_id,
                    grants,
                })
            })
        })
        .await?;

    info!(
        from_inspector_id,
        to_inspector_id,
        labs = transfer.grants.len(),
        "lab access transferred"
    );
    Ok(transfer)
}
