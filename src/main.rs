use anyhow::{bail, Result};
use log::info;
use std::env;
use std::sync::Arc;

use eurovision_stats::config::{PipelineConfig, StoreBackend, StoreConfig};
use eurovision_stats::env_loader;
use eurovision_stats::pg_store::PgStore;
use eurovision_stats::pipeline::Pipeline;
use eurovision_stats::sources::JsonDirSource;
use eurovision_stats::store::{AggregateStore, MemoryStore, RunStamp};

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    // eurovision-stats [run|restat] [source_dir]
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");
    let mut config = PipelineConfig::from_env()?;
    if let Some(dir) = args.get(2) {
        config.source_dir = dir.into();
    }

    let store: Arc<dyn AggregateStore> = match config.store_backend {
        StoreBackend::Postgres => Arc::new(PgStore::connect(&StoreConfig::from_env()?).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!("Aggregate store ready ({:?}).", config.store_backend);

    let sources = JsonDirSource::new(config.source_dir.clone()).sources();
    let pipeline = Pipeline::new(config, sources, store)?;

    match command {
        "run" => {
            let report = pipeline.run().await?;
            for line in report.summary_lines() {
                println!("{}", line);
            }
        }
        "restat" => {
            let stats = pipeline.recompute_statistics(&RunStamp::new()).await?;
            println!("{}", serde_json::to_string_pretty(&stats.aggregate)?);
            println!(
                "Winners without metadata: {}, without key: {}, without language: {}",
                stats.diagnostics.without_metadata,
                stats.diagnostics.without_key,
                stats.diagnostics.without_language
            );
        }
        other => bail!("Unknown command '{}', expected 'run' or 'restat'", other),
    }
    Ok(())
}
