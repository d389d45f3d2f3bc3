// sources.rs
//! Source adapters. Each one yields already-parsed rows; the markup and
//! HTTP work that produced them happens outside this crate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{VoteDirection, Year};
use crate::rows::{RawPerformNumberRow, RawTrack, RawVoteRow, RawWinTableRow, RawWinnerRow};

/// The three tables of the contest-history page that the pipeline uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WinnerTables {
    pub by_year: Vec<RawWinnerRow>,
    pub by_country: Vec<RawWinTableRow>,
    pub by_language: Vec<RawWinTableRow>,
}

/// A country as listed by the vote-history service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Identifier used in vote queries.
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryFlag {
    pub country: String,
    pub url: String,
}

#[async_trait]
pub trait ContestHistorySource: Send + Sync {
    async fn winner_tables(&self) -> Result<WinnerTables>;

    async fn country_flags(&self) -> Result<Vec<CountryFlag>>;

    /// Running-order position of each winning song in its final.
    async fn perform_numbers(&self) -> Result<Vec<RawPerformNumberRow>>;
}

#[async_trait]
pub trait MusicCatalog: Send + Sync {
    /// Every track of the winners playlist with key and genre tags.
    async fn tracks(&self) -> Result<Vec<RawTrack>>;
}

#[async_trait]
pub trait VoteHistorySource: Send + Sync {
    async fn countries(&self) -> Result<Vec<Country>>;

    async fn votes(
        &self,
        country: &Country,
        direction: VoteDirection,
        year: Year,
    ) -> Result<Vec<RawVoteRow>>;
}

/// The collaborators a pipeline run reads from.
#[derive(Clone)]
pub struct Sources {
    pub contest: Arc<dyn ContestHistorySource>,
    pub catalog: Arc<dyn MusicCatalog>,
    pub votes: Arc<dyn VoteHistorySource>,
}

/// Serves rows exported as JSON files:
///
/// ```text
/// <dir>/winners_by_year.json       [RawWinnerRow]
/// <dir>/winners_by_country.json    [RawWinTableRow]
/// <dir>/winners_by_language.json   [RawWinTableRow]
/// <dir>/country_flags.json         [CountryFlag]
/// <dir>/perform_numbers.json       [RawPerformNumberRow]
/// <dir>/catalog.json               [RawTrack]
/// <dir>/countries.json             [Country]
/// <dir>/votes/<code>_<from|to>_<year>.json   [RawVoteRow]
/// ```
///
/// A missing vote file means the country has no rows for that year.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirSource { dir: dir.into() }
    }

    pub fn sources(self) -> Sources {
        let shared = Arc::new(self);
        Sources { contest: shared.clone(), catalog: shared.clone(), votes: shared }
    }

    pub fn vote_file(&self, country: &Country, direction: VoteDirection, year: Year) -> PathBuf {
        self.dir
            .join("votes")
            .join(format!("{}_{}_{}.json", country.code, direction.as_str(), year))
    }

    async fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        read_json(&self.dir.join(name)).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {:?}", path))
}

#[async_trait]
impl ContestHistorySource for JsonDirSource {
    async fn winner_tables(&self) -> Result<WinnerTables> {
        info!("Loading winner tables from {:?}", self.dir);
        Ok(WinnerTables {
            by_year: self.read("winners_by_year.json").await?,
            by_country: self.read("winners_by_country.json").await?,
            by_language: self.read("winners_by_language.json").await?,
        })
    }

    async fn country_flags(&self) -> Result<Vec<CountryFlag>> {
        self.read("country_flags.json").await
    }

    async fn perform_numbers(&self) -> Result<Vec<RawPerformNumberRow>> {
        self.read("perform_numbers.json").await
    }
}

#[async_trait]
impl MusicCatalog for JsonDirSource {
    async fn tracks(&self) -> Result<Vec<RawTrack>> {
        info!("Loading catalog tracks from {:?}", self.dir);
        self.read("catalog.json").await
    }
}

#[async_trait]
impl VoteHistorySource for JsonDirSource {
    async fn countries(&self) -> Result<Vec<Country>> {
        self.read("countries.json").await
    }

    async fn votes(
        &self,
        country: &Country,
        direction: VoteDirection,
        year: Year,
    ) -> Result<Vec<RawVoteRow>> {
        let path = self.vote_file(country, direction, year);
        match tokio::fs::metadata(&path).await {
            Ok(_) => read_json(&path).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No vote rows for {} {} {}", country.name, direction.as_str(), year);
                Ok(Vec::new())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to stat {:?}", path)),
        }
    }
}
