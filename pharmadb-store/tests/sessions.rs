//! Session, transaction and pool behaviour against a live database

mod common;

use std::time::Duration;

use pharmadb_store::{AbortReason, Filter, Inspector, NewInspector, StoreError};

async fn employee_exists(store: &pharmadb_store::Store, employee_no: &str) -> bool {
    let mut session = store.acquire().await.unwrap();
    session
        .repo::<Inspector>()
        .find_by_employee_no(employee_no)
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
#[ignore = "requires database"]
async fn commit_on_ok_rollback_on_err() {
    let store = common::store().await;

    let kept = format!("INS-{}", common::suffix());
    let new = NewInspector::new(kept.clone(), "提交");
    store
        .transaction(move |s| {
            Box::pin(async move {
                s.repo::<Inspector>().create(&new).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    assert!(employee_exists(&store, &kept).await);

    let dropped = format!("INS-{}", common::suffix());
    let new = NewInspector::new(dropped.clone(), "回滚");
    let err = store
        .transaction(move |s| {
            Box::pin(async move {
                s.repo::<Inspector>().create(&new).await?;
                Err::<(), _>(StoreError::NotEditable {
                    key: "body.failure".into(),
                })
            })
        })
        .await
        .unwrap_err();
    // the body's error comes back unchanged
    assert!(matches!(err, StoreError::NotEditable { ref key } if key == "body.failure"));
    assert!(!employee_exists(&store, &dropped).await);
}

#[tokio::test]
#[ignore = "requires database"]
async fn nested_failure_rolls_back_only_the_savepoint() {
    let store = common::store().await;
    let outer_no = format!("INS-{}", common::suffix());
    let inner_no = format!("INS-{}", common::suffix());

    let mut session = store.acquire().await.unwrap();
    let (outer, inner) = (outer_no.clone(), inner_no.clone());
    session
        .within_transaction(move |s| {
            Box::pin(async move {
                s.repo::<Inspector>()
                    .create(&NewInspector::new(outer, "外层"))
                    .await?;
                assert_eq!(s.depth(), 1);

                let nested = s
                    .within_transaction(move |s| {
                        Box::pin(async move {
                            assert_eq!(s.depth(), 2);
                            s.repo::<Inspector>()
                                .create(&NewInspector::new(inner, "内层"))
                                .await?;
                            Err::<(), _>(StoreError::invalid("body", "inner failure"))
                        })
                    })
                    .await;
                assert!(nested.is_err());
                Ok(())
            })
        })
        .await
        .unwrap();
    assert_eq!(session.depth(), 0);
    drop(session);

    assert!(employee_exists(&store, &outer_no).await);
    assert!(!employee_exists(&store, &inner_no).await);
}

#[tokio::test]
#[ignore = "requires database"]
async fn nested_success_commits_with_outer_only() {
    let store = common::store().await;
    let inner_no = format!("INS-{}", common::suffix());

    let mut session = store.acquire().await.unwrap();
    let inner = inner_no.clone();
    let err = session
        .within_transaction(move |s| {
            Box::pin(async move {
                s.within_transaction(move |s| {
                    Box::pin(async move {
                        s.repo::<Inspector>()
                            .create(&NewInspector::new(inner, "内层"))
                            .await
                    })
                })
                .await?;
                Err::<(), _>(StoreError::invalid("body", "outer failure"))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    drop(session);

    assert!(!employee_exists(&store, &inner_no).await);
}

#[tokio::test]
#[ignore = "requires database"]
async fn deadline_aborts_and_rolls_back() {
    let store = common::store().await;
    let employee_no = format!("INS-{}", common::suffix());

    let mut session = store.acquire().await.unwrap();
    session.set_timeout(Duration::from_millis(300));
    let new = NewInspector::new(employee_no.clone(), "超时");
    let err = session
        .within_transaction(move |s| {
            Box::pin(async move {
                s.repo::<Inspector>().create(&new).await?;
                sqlx::query("SELECT pg_sleep(3)").execute(s.conn()).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TransactionAborted { .. }), "{err:?}");
    assert!(!session.in_transaction());
    drop(session);

    assert!(!employee_exists(&store, &employee_no).await);
}

#[tokio::test]
#[ignore = "requires database"]
async fn expired_deadline_refuses_to_begin() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();
    session.set_timeout(Duration::ZERO);

    let err = session
        .within_transaction(|s| {
            Box::pin(async move { s.repo::<Inspector>().count(&[]).await })
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::TransactionAborted {
            reason: AbortReason::DeadlineExceeded,
            ..
        }
    ));
}

#[tokio::test]
#[ignore = "requires database"]
async fn exhausted_pool_fails_fast() {
    let mut config = common::config();
    config.pool.max_connections = 1;
    config.pool.min_connections = 0;
    config.pool.acquire_timeout_secs = 1;
    let store = common::store_with(config).await;

    let held = store.acquire().await.unwrap();
    let started = std::time::Instant::now();
    let err = store.acquire().await.unwrap_err();
    assert!(matches!(err, StoreError::ResourceExhausted { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));

    drop(held);
    let mut session = store.acquire().await.unwrap();
    session
        .repo::<Inspector>()
        .count(&[Filter::eq("is_active", true)])
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn cancelled_transaction_never_returns_to_the_pool() {
    let mut config = common::config();
    config.pool.max_connections = 1;
    config.pool.min_connections = 0;
    config.pool.acquire_timeout_secs = 5;
    let store = common::store_with(config).await;
    let employee_no = format!("INS-{}", common::suffix());

    let mut session = store.acquire().await.unwrap();
    let new = NewInspector::new(employee_no.clone(), "取消");
    let cancelled = tokio::time::timeout(
        Duration::from_millis(300),
        session.within_transaction(move |s| {
            Box::pin(async move {
                s.repo::<Inspector>().create(&new).await?;
                sqlx::query("SELECT pg_sleep(3)").execute(s.conn()).await?;
                Ok(())
            })
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(session.in_transaction());
    drop(session);

    // the only pool slot must hold a connection with no transaction open
    let mut session = store.acquire().await.unwrap();
    let xid: Option<i64> = sqlx::query_scalar("SELECT txid_current_if_assigned()")
        .fetch_one(session.conn())
        .await
        .unwrap();
    assert_eq!(xid, None);
    drop(session);

    assert!(!employee_exists(&store, &employee_no).await);
}
