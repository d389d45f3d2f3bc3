// statistics.rs
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::ResolvedWinner;
use crate::resolver::ResolvedWinners;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCounts {
    pub english: u32,
    pub other: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionCounts {
    pub solo: u32,
    pub band: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCounts {
    pub pop: u32,
    pub classic: u32,
    pub rock: u32,
    pub other: u32,
}

/// The `songs_statistic` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsAggregate {
    pub lang: LanguageCounts,
    pub composition: CompositionCounts,
    pub genre: GenreCounts,
    pub key: BTreeMap<String, u32>,
}

/// How many winners sat out each tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsDiagnostics {
    pub winners_seen: usize,
    pub without_metadata: usize,
    pub without_key: usize,
    pub without_language: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub aggregate: StatisticsAggregate,
    pub diagnostics: StatisticsDiagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreBucket {
    Pop,
    Classic,
    Rock,
    Other,
}

/// Classifies a tag by substring, checking pop, classic and rock in that order.
pub fn classify_genre(tag: &str) -> GenreBucket {
    let tag = tag.to_lowercase();
    if tag.contains("pop") {
        GenreBucket::Pop
    } else if tag.contains("classic") {
        GenreBucket::Classic
    } else if tag.contains("rock") {
        GenreBucket::Rock
    } else {
        GenreBucket::Other
    }
}

impl GenreCounts {
    fn add(&mut self, bucket: GenreBucket) {
        match bucket {
            GenreBucket::Pop => self.pop += 1,
            GenreBucket::Classic => self.classic += 1,
            GenreBucket::Rock => self.rock += 1,
            GenreBucket::Other => self.other += 1,
        }
    }
}

/// Tallies language, composition, genre and key over the resolved winners.
/// A winner joins only the tallies its metadata supports.
pub fn aggregate<'a>(winners: impl IntoIterator<Item = &'a ResolvedWinner>) -> Statistics {
    let mut stats = Statistics::default();
    let agg = &mut stats.aggregate;
    let diag = &mut stats.diagnostics;

    for winner in winners {
        diag.winners_seen += 1;
        let Some(song) = &winner.song else {
            diag.without_metadata += 1;
            continue;
        };

        if let Some(tags) = song.genres.first() {
            for tag in tags {
                agg.genre.add(classify_genre(tag));
            }
        }

        match winner.language.as_deref() {
            Some(lang) if lang.eq_ignore_ascii_case("english") => agg.lang.english += 1,
            Some(_) => agg.lang.other += 1,
            None => diag.without_language += 1,
        }

        if song.artists.len() > 1 {
            agg.composition.band += 1;
        } else {
            agg.composition.solo += 1;
        }

        match &song.key {
            Some(key) => *agg.key.entry(key.clone()).or_insert(0) += 1,
            None => {
                debug!("Winner of {} has no key", winner.year);
                diag.without_key += 1;
            }
        }
    }

    info!(
        "Aggregated statistics over {} winners ({} without metadata, {} without key, {} without language).",
        diag.winners_seen, diag.without_metadata, diag.without_key, diag.without_language
    );
    stats
}

/// Rebuilds statistics from stored `winner_by_year` documents. Documents that
/// do not describe a winner are skipped.
pub fn aggregate_stored(documents: &[Value]) -> Statistics {
    let mut entries = Vec::with_capacity(documents.len());
    for doc in documents {
        match serde_json::from_value::<ResolvedWinner>(doc.clone()) {
            Ok(winner) => entries.push(winner),
            Err(e) => warn!("Skipping stored winner document: {}", e),
        }
    }
    aggregate(ResolvedWinners::from_entries(entries).iter())
}

pub fn statistics_document(aggregate: &StatisticsAggregate) -> Result<Value> {
    serde_json::to_value(aggregate).context("Failed to serialize statistics aggregate")
}
