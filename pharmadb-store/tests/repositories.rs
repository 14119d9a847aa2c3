//! Repository behaviour against a live database

mod common;

use pharmadb_core::{OrderBy, Pagination};
use pharmadb_store::{
    Filter, Inspector, InspectorPatch, LabAccess, ListQuery, NewInspector, NewLabAccess, NewSystemConfig,
    StoreError, SystemConfig,
};

#[tokio::test]
#[ignore = "requires database"]
async fn create_then_get_round_trips_with_defaults() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    let employee_no = format!("INS-{}", common::suffix());
    let new = NewInspector::new(employee_no.clone(), "李药检").department("中药检验科");
    let id = session.repo::<Inspector>().create(&new).await.unwrap();

    let stored = session.repo::<Inspector>().get(id).await.unwrap();
    assert_eq!(stored.inspector_id, id);
    assert_eq!(stored.employee_no, employee_no);
    assert_eq!(stored.name, "李药检");
    assert_eq!(stored.department.as_deref(), Some("中药检验科"));
    assert!(stored.is_active);
}

#[tokio::test]
#[ignore = "requires database"]
async fn missing_row_is_not_found_not_empty() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    assert!(session.repo::<Inspector>().find(-1).await.unwrap().is_none());
    let err = session.repo::<Inspector>().get(-1).await.unwrap_err();
    assert!(err.is_not_found());
    let err = session
        .repo::<Inspector>()
        .update(-1, &InspectorPatch {
            name: Some("无".into()),
            ..InspectorPatch::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(session.repo::<Inspector>().delete(-1).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ignore = "requires database"]
async fn duplicate_unique_key_persists_once() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    let employee_no = format!("INS-{}", common::suffix());
    let new = NewInspector::new(employee_no.clone(), "王药检");
    session.repo::<Inspector>().create(&new).await.unwrap();
    let err = session.repo::<Inspector>().create(&new).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }), "{err:?}");

    let count = session
        .repo::<Inspector>()
        .count(&[Filter::eq("employee_no", employee_no.as_str())])
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn duplicate_grant_is_duplicate_key() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();
    let inspector = common::inspector(&mut session).await;
    let lab = common::laboratory(&mut session).await;

    let grant = NewLabAccess {
        inspector_id: inspector.inspector_id,
        lab_id: lab.lab_id,
        access_level: Some("full".into()),
        granted_date: None,
    };
    session.repo::<LabAccess>().create(&grant).await.unwrap();
    let err = session.repo::<LabAccess>().create(&grant).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
}

#[tokio::test]
#[ignore = "requires database"]
async fn delete_with_children_is_constraint_violation() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    let referenced = common::inspector(&mut session).await;
    common::conversation(&mut session, referenced.inspector_id).await;
    let err = session
        .repo::<Inspector>()
        .delete(referenced.inspector_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation { .. }), "{err:?}");
    assert!(session.repo::<Inspector>().exists(referenced.inspector_id).await.unwrap());

    let unreferenced = common::inspector(&mut session).await;
    session.repo::<Inspector>().delete(unreferenced.inspector_id).await.unwrap();
    assert!(!session.repo::<Inspector>().exists(unreferenced.inspector_id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires database"]
async fn list_filters_and_pages() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    let department = format!("科室-{}", common::suffix());
    for i in 0..5 {
        let new = NewInspector::new(format!("INS-{}", common::suffix()), format!("检验员{i}"))
            .department(department.clone());
        session.repo::<Inspector>().create(&new).await.unwrap();
    }

    let query = ListQuery::new()
        .filter(Filter::eq("department", department.as_str()))
        .order_by(OrderBy::asc("name"))
        .page(Pagination::new(2, 2));
    let page = session.repo::<Inspector>().list(&query).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages(), 3);
    let names: Vec<_> = page.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["检验员2", "检验员3"]);

    let past_end = ListQuery::new()
        .filter(Filter::eq("department", department.as_str()))
        .page(Pagination::new(9, 2));
    let page = session.repo::<Inspector>().list(&past_end).await.unwrap();
    assert!(page.is_empty());
    assert_eq!(page.total, 5);
}

#[tokio::test]
#[ignore = "requires database"]
async fn unknown_filter_column_is_invalid_argument() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    let query = ListQuery::new().filter(Filter::eq("name; DROP TABLE inspectors", "x"));
    let err = session.repo::<Inspector>().list(&query).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[tokio::test]
#[ignore = "requires database"]
async fn config_key_is_the_primary_key() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();

    let key = format!("test.retention_{}", common::suffix());
    let new = NewSystemConfig::new(key.clone(), "30").category("retention");
    let created = session.repo::<SystemConfig>().create(&new).await.unwrap();
    assert_eq!(created, key);

    let stored = session.repo::<SystemConfig>().get(key.clone()).await.unwrap();
    assert_eq!(stored.config_value.as_deref(), Some("30"));
    assert_eq!(stored.config_type, "string");
    assert!(stored.is_editable);

    session.repo::<SystemConfig>().delete(key.clone()).await.unwrap();
    assert!(session.repo::<SystemConfig>().find(key).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires database"]
async fn schema_initialization_is_idempotent() {
    let store = common::store().await;
    store.initialize_schema().await.unwrap();
    store.create_indexes().await.unwrap();

    let report = store.verify_schema().await.unwrap();
    assert!(report.is_complete(), "missing tables: {:?}", report.missing);
    assert_eq!(report.present.len(), 9);
}
