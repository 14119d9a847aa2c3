//! Shared fixtures for the database tests
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p pharmadb-store -- --ignored
//!
//! Every fixture tags its unique keys with a fresh suffix so repeated and
//! parallel runs never collide.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use tokio::sync::OnceCell;
use uuid::Uuid;

use pharmadb_store::{
    Conversation, Inspector, Laboratory, NewConversation, NewInspector, NewItem, NewLaboratory,
    PharmacopoeiaItem, Session, Store, StoreConfig,
};

static SCHEMA: OnceCell<()> = OnceCell::const_new();

pub fn config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    config.pool.min_connections = 1;
    config.pool.max_connections = 10;
    config.pool.acquire_timeout_secs = 5;
    config
}

/// Store on `DATABASE_URL` with the schema in place.
pub async fn store() -> Store {
    store_with(config()).await
}

pub async fn store_with(config: StoreConfig) -> Store {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pharmadb_store=debug")
        .with_test_writer()
        .try_init();

    let store = Store::connect(config).await.expect("connect");
    SCHEMA
        .get_or_init(|| async {
            store.initialize_schema().await.expect("initialize schema");
            store.create_indexes().await.expect("create indexes");
        })
        .await;
    store
}

/// Short random tag for unique columns.
pub fn suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub async fn inspector(session: &mut Session) -> Inspector {
    let new = NewInspector::new(format!("INS-{}", suffix()), "张检验").department("化学检验科");
    session.repo::<Inspector>().insert(&new).await.expect("insert inspector")
}

pub async fn laboratory(session: &mut Session) -> Laboratory {
    let new = NewLaboratory::new(format!("LAB-{}", suffix()), "理化检测室");
    session.repo::<Laboratory>().insert(&new).await.expect("insert laboratory")
}

pub async fn item(session: &mut Session) -> PharmacopoeiaItem {
    let doc_id = (Uuid::new_v4().as_u128() % 1_000_000_000) as i32;
    let new = NewItem::new(2, doc_id, "阿司匹林");
    session.repo::<PharmacopoeiaItem>().insert(&new).await.expect("insert item")
}

pub async fn conversation(session: &mut Session, inspector_id: i64) -> Conversation {
    let new = NewConversation::new(inspector_id, format!("sess-{}", Uuid::new_v4()), Utc::now())
        .topic("含量测定");
    session.repo::<Conversation>().insert(&new).await.expect("insert conversation")
}
