use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];
const SECRET_KEYS: [&str; 2] = ["POSTGRES_PASSWORD", "CATALOG_CLIENT_SECRET"];

/// Loads the first env file found. Variables already set in the process
/// environment win over the file.
pub fn load_env() -> Option<PathBuf> {
    for path in ENV_PATHS.iter().map(Path::new) {
        if !path.exists() {
            continue;
        }
        match load_env_from_file(path) {
            Ok(count) => {
                info!("Loaded {} environment variables from {:?}", count, path);
                return Some(path.to_path_buf());
            }
            Err(e) => warn!("Failed to load environment from {:?}: {:#}", path, e),
        }
    }
    info!("No .env file found, using environment variables from system");
    None
}

fn load_env_from_file(path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file {:?}", path))?;
    let mut applied = 0;
    for (key, value) in parse_env(&content) {
        if std::env::var(&key).is_err() {
            debug!(
                "Set env var from file: {} = {}",
                key,
                if SECRET_KEYS.contains(&key.as_str()) { "[hidden]" } else { value.as_str() }
            );
            std::env::set_var(&key, &value);
            applied += 1;
        }
    }
    Ok(applied)
}

/// `KEY=value` pairs, skipping blank lines and `#` comments.
pub fn parse_env(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}
