//! Postgres-backed record store.
//!
//! One table holds every record kind as JSONB, partitioned by
//! `(namespace, tenant_id)`. A store instance is bound to one namespace, so
//! tenants, dictionaries and rules never share keys.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::error;

use atelier_core::TenantId;

use super::{RecordError, RecordResult, RecordStore};
use crate::event_store::postgres::block_on;

pub const RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    namespace TEXT NOT NULL,
    tenant_id UUID NOT NULL,
    record_key TEXT NOT NULL,
    body JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (namespace, tenant_id, record_key)
)
"#;

pub async fn migrate_records(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(RECORDS_SCHEMA).execute(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PostgresRecordStore<V> {
    pool: PgPool,
    namespace: &'static str,
    _record: PhantomData<fn() -> V>,
}

impl<V> PostgresRecordStore<V> {
    pub fn new(pool: PgPool, namespace: &'static str) -> Self {
        Self {
            pool,
            namespace,
            _record: PhantomData,
        }
    }

    fn run<F, T>(&self, operation: &'static str, fut: F) -> RecordResult<T>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let outcome = block_on(fut).map_err(RecordError::Store)?;
        outcome.map_err(|e| {
            error!(namespace = self.namespace, operation, error = %e, "record store query failed");
            RecordError::Store(format!("{} {operation}: {e}", self.namespace))
        })
    }

    /// Reads degrade to "absent" after logging; only writes report failure.
    fn read<F, T>(&self, operation: &'static str, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        self.run(operation, fut).ok()
    }
}

fn decode<V: DeserializeOwned>(namespace: &str, body: JsonValue) -> Option<V> {
    match serde_json::from_value(body) {
        Ok(v) => Some(v),
        Err(e) => {
            error!(namespace, error = %e, "stored record does not decode");
            None
        }
    }
}

impl<V> RecordStore<V> for PostgresRecordStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &str) -> Option<V> {
        let row = self.read(
            "get",
            sqlx::query("SELECT body FROM records WHERE namespace = $1 AND tenant_id = $2 AND record_key = $3")
                .bind(self.namespace)
                .bind(tenant_id.as_uuid())
                .bind(key)
                .fetch_optional(&self.pool),
        )??;
        let body: JsonValue = row.try_get("body").ok()?;
        decode(self.namespace, body)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let rows = self
            .read(
                "list",
                sqlx::query(
                    "SELECT body FROM records WHERE namespace = $1 AND tenant_id = $2 ORDER BY record_key",
                )
                .bind(self.namespace)
                .bind(tenant_id.as_uuid())
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter()
            .filter_map(|row| row.try_get::<JsonValue, _>("body").ok())
            .filter_map(|body| decode(self.namespace, body))
            .collect()
    }

    fn upsert(&self, tenant_id: TenantId, key: String, value: V) -> RecordResult<()> {
        let body = serde_json::to_value(&value)
            .map_err(|e| RecordError::Store(format!("{} record does not serialize: {e}", self.namespace)))?;
        self.run(
            "upsert",
            sqlx::query(
                r#"
                INSERT INTO records (namespace, tenant_id, record_key, body)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (namespace, tenant_id, record_key)
                DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
                "#,
            )
            .bind(self.namespace)
            .bind(tenant_id.as_uuid())
            .bind(key)
            .bind(body)
            .execute(&self.pool),
        )?;
        Ok(())
    }

    fn remove(&self, tenant_id: TenantId, key: &str) -> RecordResult<bool> {
        let done = self.run(
            "remove",
            sqlx::query("DELETE FROM records WHERE namespace = $1 AND tenant_id = $2 AND record_key = $3")
                .bind(self.namespace)
                .bind(tenant_id.as_uuid())
                .bind(key)
                .execute(&self.pool),
        )?;
        Ok(done.rows_affected() > 0)
    }
}
