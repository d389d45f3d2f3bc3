// pg_store.rs
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::db_connect::{self, PgPool};
use crate::store::{keyed_documents, AggregateStore, Collection, RunStamp, StoreError, StoredDocument};
use crate::store_schema::{ensure_schema, table_name};

/// Aggregate store backed by one JSONB table per collection.
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    /// Connects, then makes sure the schema and tables exist.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = db_connect::connect(config).await?;
        let client = pool.get().await.context("Failed to get DB client for schema setup")?;
        ensure_schema(&client, &config.schema).await?;
        drop(client);
        Ok(PgStore { pool, schema: config.schema.clone() })
    }
}

fn stored_document(row: &Row) -> StoredDocument {
    StoredDocument {
        key: row.get("key"),
        run_id: row.get("run_id"),
        written_at: row.get("written_at"),
        body: row.get("body"),
    }
}

impl PgStore {
    /// Upserts in one transaction; with `prune`, rows of other runs are
    /// deleted before the commit.
    async fn upsert(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
        prune: bool,
    ) -> Result<usize, StoreError> {
        let keyed = keyed_documents(collection, documents)?;

        // ON CONFLICT cannot touch the same row twice in one statement
        let mut keys: Vec<String> = Vec::with_capacity(keyed.len());
        let mut bodies: Vec<Value> = Vec::with_capacity(keyed.len());
        let mut position: HashMap<String, usize> = HashMap::new();
        for (key, body) in keyed {
            match position.get(&key) {
                Some(&i) => bodies[i] = body,
                None => {
                    position.insert(key.clone(), keys.len());
                    keys.push(key);
                    bodies.push(body);
                }
            }
        }

        let table = table_name(&self.schema, collection);
        let mut client = self.pool.get().await
            .context("Failed to get DB client for store write")?;
        let tx = client.transaction().await
            .context("Failed to start transaction for store write")?;

        let upsert_query = format!(
            r#"
            INSERT INTO {} (key, run_id, written_at, body)
            SELECT * FROM UNNEST($1::text[], $2::uuid[], $3::timestamptz[], $4::jsonb[])
            ON CONFLICT (key) DO UPDATE
            SET run_id = EXCLUDED.run_id, written_at = EXCLUDED.written_at, body = EXCLUDED.body
            "#,
            table
        );
        let run_ids: Vec<Uuid> = vec![run.run_id; keys.len()];
        let written_at: Vec<DateTime<Utc>> = vec![Utc::now(); keys.len()];

        let mut written = 0;
        if !keys.is_empty() {
            written = tx
                .execute(
                    &upsert_query,
                    &[
                        &keys as &(dyn ToSql + Sync),
                        &run_ids as &(dyn ToSql + Sync),
                        &written_at as &(dyn ToSql + Sync),
                        &bodies as &(dyn ToSql + Sync),
                    ],
                )
                .await
                .with_context(|| format!("Failed to upsert documents into {}", table))?;
        }
        if prune {
            let delete_query = format!("DELETE FROM {} WHERE run_id <> $1", table);
            let removed = tx
                .execute(&delete_query, &[&run.run_id])
                .await
                .with_context(|| format!("Failed to remove stale documents from {}", table))?;
            debug!("Removed {} stale documents from {}", removed, table);
        }
        tx.commit().await
            .with_context(|| format!("Failed to commit write to {}", table))?;

        let (total, idle, in_use) = db_connect::get_pool_status(&self.pool);
        debug!("Pool after write: {} total, {} idle, {} in use", total, idle, in_use);
        info!("Upserted {} documents into {}.", written, table);
        Ok(written as usize)
    }
}

#[async_trait]
impl AggregateStore for PgStore {
    async fn write(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
    ) -> Result<usize, StoreError> {
        self.upsert(run, collection, documents, false).await
    }

    async fn replace(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
    ) -> Result<usize, StoreError> {
        self.upsert(run, collection, documents, true).await
    }

    async fn read_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        let table = table_name(&self.schema, collection);
        let client = self.pool.get().await
            .context("Failed to get DB client for store read")?;
        let query = format!("SELECT key, run_id, written_at, body FROM {} ORDER BY key", table);
        let rows = client.query(&query, &[]).await
            .with_context(|| format!("Failed to read {}", table))?;
        Ok(rows.iter().map(stored_document).collect())
    }

    async fn read_one(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let table = table_name(&self.schema, collection);
        let client = self.pool.get().await
            .context("Failed to get DB client for store read")?;
        let query = format!("SELECT key, run_id, written_at, body FROM {} WHERE key = $1", table);
        let row = client.query_opt(&query, &[&key]).await
            .with_context(|| format!("Failed to read '{}' from {}", key, table))?;
        Ok(row.as_ref().map(stored_document))
    }
}
