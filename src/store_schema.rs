use anyhow::{bail, Context, Result};
use log::info;
use tokio_postgres::Client;

use crate::store::Collection;

/// Quoted `"schema"."collection"` table name.
pub fn table_name(schema: &str, collection: Collection) -> String {
    format!(r#""{}"."{}""#, schema, collection.name())
}

fn check_identifier(schema: &str) -> Result<()> {
    let valid = !schema.is_empty()
        && schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("Invalid schema name '{}'", schema);
    }
    Ok(())
}

/// Creates the store schema and one upsert table per collection.
/// Each table is keyed by the collection's natural key.
pub async fn ensure_schema(client: &Client, schema: &str) -> Result<()> {
    check_identifier(schema)?;
    info!("Ensuring store schema '{}' exists...", schema);
    let query = format!(r#"CREATE SCHEMA IF NOT EXISTS "{}";"#, schema);
    client.execute(&query, &[]).await
        .context(format!("Failed to create schema {}", schema))?;

    for collection in Collection::ALL {
        let table = table_name(schema, collection);
        let create_query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                run_id UUID NOT NULL,
                written_at TIMESTAMPTZ NOT NULL,
                body JSONB NOT NULL
            );
            "#,
            table
        );
        client.execute(&create_query, &[]).await
            .context(format!("Failed to create table {}", table))?;
    }
    info!("Schema '{}' ensured with {} collections.", schema, Collection::ALL.len());
    Ok(())
}
