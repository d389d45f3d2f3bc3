// config.rs
use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::Year;

pub const DEFAULT_YEAR_FROM: Year = 1956;
pub const DEFAULT_YEAR_TO: Year = 2018;
const DEFAULT_VOTE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Unknown store backend '{}'", other)),
        }
    }
}

/// PostgreSQL connection settings for the aggregate store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub pool_size: u32,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[hidden]")
            .field("schema", &self.schema)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Ok(StoreConfig {
            host: text("POSTGRES_HOST", "127.0.0.1"),
            port: parsed(&lookup, "POSTGRES_PORT", 5432)?,
            dbname: text("POSTGRES_DB", "eurovision"),
            user: text("POSTGRES_USER", "postgres"),
            password: text("POSTGRES_PASSWORD", ""),
            schema: text("EUROVISION_SCHEMA", "eurovision"),
            pool_size: parsed(&lookup, "POSTGRES_POOL_SIZE", 8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub year_from: Year,
    /// Inclusive.
    pub year_to: Year,
    pub vote_concurrency: usize,
    pub source_dir: PathBuf,
    pub store_backend: StoreBackend,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            year_from: DEFAULT_YEAR_FROM,
            year_to: DEFAULT_YEAR_TO,
            vote_concurrency: DEFAULT_VOTE_CONCURRENCY,
            source_dir: PathBuf::from("data"),
            store_backend: StoreBackend::Postgres,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            year_from: parsed(&lookup, "EUROVISION_YEAR_FROM", defaults.year_from)?,
            year_to: parsed(&lookup, "EUROVISION_YEAR_TO", defaults.year_to)?,
            vote_concurrency: parsed(&lookup, "EUROVISION_VOTE_CONCURRENCY", defaults.vote_concurrency)?,
            source_dir: lookup("EUROVISION_SOURCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.source_dir),
            store_backend: parsed(&lookup, "EUROVISION_STORE", defaults.store_backend)?,
        };
        config.validate()?;
        info!(
            "Pipeline config: years {}-{}, vote concurrency {}, sources {:?}, store {:?}",
            config.year_from,
            config.year_to,
            config.vote_concurrency,
            config.source_dir,
            config.store_backend
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.year_from > self.year_to {
            bail!("Year range {}-{} is empty", self.year_from, self.year_to);
        }
        if self.vote_concurrency == 0 {
            bail!("Vote concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn years(&self) -> impl Iterator<Item = Year> {
        self.year_from..=self.year_to
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid value '{}' for {}", raw, key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_cover_the_historical_range() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.year_from, 1956);
        assert_eq!(config.year_to, 2018);
        assert_eq!(config.years().count(), 63);
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("EUROVISION_YEAR_FROM", "2000"),
            ("EUROVISION_YEAR_TO", "2001"),
            ("EUROVISION_VOTE_CONCURRENCY", "2"),
            ("EUROVISION_STORE", "Memory"),
            ("EUROVISION_SOURCE_DIR", "/tmp/rows"),
        ]))
        .unwrap();
        assert_eq!(config.years().collect::<Vec<_>>(), vec![2000, 2001]);
        assert_eq!(config.vote_concurrency, 2);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.source_dir, PathBuf::from("/tmp/rows"));
    }

    #[test]
    fn malformed_values_fail_loudly() {
        assert!(PipelineConfig::from_lookup(lookup(&[("EUROVISION_YEAR_FROM", "soon")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("EUROVISION_VOTE_CONCURRENCY", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[
            ("EUROVISION_YEAR_FROM", "2019"),
            ("EUROVISION_YEAR_TO", "2018"),
        ]))
        .is_err());
        assert!(StoreConfig::from_lookup(lookup(&[("POSTGRES_PORT", "http")])).is_err());
    }

    #[test]
    fn store_config_hides_password_in_debug() {
        let config = StoreConfig::from_lookup(lookup(&[("POSTGRES_PASSWORD", "s3cret")])).unwrap();
        assert_eq!(config.password, "s3cret");
        assert!(!format!("{:?}", config).contains("s3cret"));
        assert_eq!(config.port, 5432);
    }
}
