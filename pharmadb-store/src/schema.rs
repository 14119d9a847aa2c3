//! Schema creation for the nine inspection tables
//!
//! Both entry points are idempotent (`IF NOT EXISTS`) and safe to run on
//! every start. Tables are created parents first.

use sqlx::PgPool;
use tracing::info;

use crate::error::StoreResult;

const TABLES: &[(&str, &str)] = &[
    (
        "pharmacopoeia_items",
        r#"
        CREATE TABLE IF NOT EXISTS pharmacopoeia_items (
            item_id BIGSERIAL PRIMARY KEY,
            volume INTEGER NOT NULL CHECK (volume BETWEEN 1 AND 4),
            doc_id INTEGER NOT NULL,
            name_cn VARCHAR(200) NOT NULL,
            name_pinyin VARCHAR(200),
            name_en VARCHAR(200),
            category VARCHAR(100),
            content TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT pharmacopoeia_items_volume_doc_key UNIQUE (volume, doc_id)
        )
        "#,
    ),
    (
        "inspectors",
        r#"
        CREATE TABLE IF NOT EXISTS inspectors (
            inspector_id BIGSERIAL PRIMARY KEY,
            employee_no VARCHAR(20) NOT NULL UNIQUE,
            name VARCHAR(50) NOT NULL,
            phone VARCHAR(20),
            email VARCHAR(100),
            department VARCHAR(100),
            title VARCHAR(50),
            certification_level VARCHAR(50),
            join_date DATE NOT NULL DEFAULT CURRENT_DATE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "laboratories",
        r#"
        CREATE TABLE IF NOT EXISTS laboratories (
            lab_id BIGSERIAL PRIMARY KEY,
            lab_code VARCHAR(20) NOT NULL UNIQUE,
            lab_name VARCHAR(100) NOT NULL,
            location VARCHAR(200),
            certification VARCHAR(200),
            equipment_level VARCHAR(50),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "inspector_lab_access",
        r#"
        CREATE TABLE IF NOT EXISTS inspector_lab_access (
            access_id BIGSERIAL PRIMARY KEY,
            inspector_id BIGINT NOT NULL REFERENCES inspectors(inspector_id),
            lab_id BIGINT NOT NULL REFERENCES laboratories(lab_id),
            access_level VARCHAR(50),
            granted_date DATE NOT NULL DEFAULT CURRENT_DATE,
            CONSTRAINT inspector_lab_access_pair_key UNIQUE (inspector_id, lab_id)
        )
        "#,
    ),
    (
        "conversations",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id BIGSERIAL PRIMARY KEY,
            inspector_id BIGINT NOT NULL REFERENCES inspectors(inspector_id),
            session_id VARCHAR(100) NOT NULL UNIQUE,
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ,
            total_messages INTEGER NOT NULL DEFAULT 0 CHECK (total_messages >= 0),
            session_type VARCHAR(50),
            context_topic VARCHAR(200),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT conversations_time_order CHECK (end_time IS NULL OR end_time >= start_time)
        )
        "#,
    ),
    (
        "messages",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            message_id BIGSERIAL PRIMARY KEY,
            conversation_id BIGINT NOT NULL REFERENCES conversations(conversation_id),
            message_seq INTEGER NOT NULL CHECK (message_seq > 0),
            sender_type VARCHAR(20) NOT NULL CHECK (sender_type IN ('inspector', 'system')),
            message_text TEXT NOT NULL,
            intent VARCHAR(50),
            confidence_score DOUBLE PRECISION CHECK (confidence_score BETWEEN 0 AND 1),
            response_time_ms INTEGER CHECK (response_time_ms >= 0),
            referenced_item_id BIGINT REFERENCES pharmacopoeia_items(item_id),
            timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT messages_conversation_seq_key UNIQUE (conversation_id, message_seq)
        )
        "#,
    ),
    (
        "experiment_records",
        r#"
        CREATE TABLE IF NOT EXISTS experiment_records (
            experiment_id BIGSERIAL PRIMARY KEY,
            experiment_no VARCHAR(50) NOT NULL UNIQUE,
            inspector_id BIGINT NOT NULL REFERENCES inspectors(inspector_id),
            lab_id BIGINT NOT NULL REFERENCES laboratories(lab_id),
            item_id BIGINT NOT NULL REFERENCES pharmacopoeia_items(item_id),
            experiment_type VARCHAR(50),
            batch_no VARCHAR(50),
            sample_quantity DOUBLE PRECISION,
            experiment_date DATE NOT NULL,
            start_time TIMESTAMPTZ,
            end_time TIMESTAMPTZ,
            status VARCHAR(20) NOT NULL DEFAULT 'in-progress'
                CHECK (status IN ('in-progress', 'completed', 'abnormal')),
            result VARCHAR(20) CHECK (result IN ('qualified', 'unqualified', 'pending')),
            conclusion TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "experiment_data_points",
        r#"
        CREATE TABLE IF NOT EXISTS experiment_data_points (
            data_id BIGSERIAL PRIMARY KEY,
            experiment_id BIGINT NOT NULL REFERENCES experiment_records(experiment_id),
            measurement_type VARCHAR(50) NOT NULL,
            measurement_value DOUBLE PRECISION,
            measurement_unit VARCHAR(20),
            standard_min DOUBLE PRECISION,
            standard_max DOUBLE PRECISION,
            is_qualified BOOLEAN,
            measurement_time TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            equipment_id VARCHAR(50),
            notes TEXT,
            CONSTRAINT experiment_data_points_range CHECK (
                standard_min IS NULL OR standard_max IS NULL OR standard_min <= standard_max
            )
        )
        "#,
    ),
    (
        "system_config",
        r#"
        CREATE TABLE IF NOT EXISTS system_config (
            config_key VARCHAR(100) PRIMARY KEY,
            config_value TEXT,
            config_type VARCHAR(20) NOT NULL DEFAULT 'string',
            description TEXT,
            category VARCHAR(50),
            is_editable BOOLEAN NOT NULL DEFAULT TRUE,
            updated_by VARCHAR(50),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_items_category ON pharmacopoeia_items(category)",
    "CREATE INDEX IF NOT EXISTS idx_items_name_cn ON pharmacopoeia_items(name_cn)",
    "CREATE INDEX IF NOT EXISTS idx_inspectors_department ON inspectors(department)",
    "CREATE INDEX IF NOT EXISTS idx_inspectors_active_name ON inspectors(is_active, name)",
    "CREATE INDEX IF NOT EXISTS idx_lab_access_lab ON inspector_lab_access(lab_id)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_inspector_start ON conversations(inspector_id, start_time)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_start ON conversations(start_time)",
    "CREATE INDEX IF NOT EXISTS idx_messages_intent ON messages(intent)",
    "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_messages_referenced_item ON messages(referenced_item_id)",
    "CREATE INDEX IF NOT EXISTS idx_messages_sender_type ON messages(sender_type)",
    "CREATE INDEX IF NOT EXISTS idx_experiments_inspector_date ON experiment_records(inspector_id, experiment_date)",
    "CREATE INDEX IF NOT EXISTS idx_experiments_lab ON experiment_records(lab_id)",
    "CREATE INDEX IF NOT EXISTS idx_experiments_item ON experiment_records(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_experiments_date ON experiment_records(experiment_date)",
    "CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiment_records(status)",
    "CREATE INDEX IF NOT EXISTS idx_data_points_experiment ON experiment_data_points(experiment_id)",
    "CREATE INDEX IF NOT EXISTS idx_data_points_type ON experiment_data_points(measurement_type)",
    "CREATE INDEX IF NOT EXISTS idx_system_config_category ON system_config(category)",
];

/// Table names in creation (dependency) order.
pub fn table_names() -> Vec<&'static str> {
    TABLES.iter().map(|(name, _)| *name).collect()
}

/// Create every table that does not exist yet.
pub async fn initialize_schema(pool: &PgPool) -> StoreResult<()> {
    info!("Running schema initialization...");

    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        tracing::debug!(table = name, "table ready");
    }

    info!(tables = TABLES.len(), "schema initialized");
    Ok(())
}

/// Create the secondary indexes used by finders and reports.
pub async fn create_indexes(pool: &PgPool) -> StoreResult<()> {
    info!("Creating indexes...");

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    info!(indexes = INDEXES.len(), "indexes created");
    Ok(())
}

/// Presence of each table in the current schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub present: Vec<&'static str>,
    pub missing: Vec<&'static str>,
}

impl SchemaReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Report which of the store's tables exist in the connected database.
pub async fn verify_schema(pool: &PgPool) -> StoreResult<SchemaReport> {
    let existing: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_name = ANY($1)
        "#,
    )
    .bind(table_names())
    .fetch_all(pool)
    .await?;

    let (present, missing) = table_names()
        .into_iter()
        .partition(|name| existing.iter().any(|found| found == name));
    Ok(SchemaReport { present, missing })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_listed_parents_first() {
        let names = table_names();
        assert_eq!(names.len(), 9);
        let pos = |t: &str| names.iter().position(|n| *n == t).unwrap();
        assert!(pos("inspectors") < pos("conversations"));
        assert!(pos("conversations") < pos("messages"));
        assert!(pos("pharmacopoeia_items") < pos("messages"));
        assert!(pos("experiment_records") < pos("experiment_data_points"));
        assert!(pos("laboratories") < pos("inspector_lab_access"));
    }

    #[test]
    fn every_statement_is_idempotent() {
        for (_, ddl) in TABLES {
            assert!(ddl.contains("IF NOT EXISTS"));
        }
        for ddl in INDEXES {
            assert!(ddl.starts_with("CREATE INDEX IF NOT EXISTS"));
        }
    }
}
