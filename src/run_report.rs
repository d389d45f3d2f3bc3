use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{BestPair, Year};
use crate::rows::RowTally;
use crate::statistics::StatisticsDiagnostics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionStats {
    pub winners: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub resolution_percentage: f64,
}

impl ResolutionStats {
    pub fn new(winners: usize, resolved: usize) -> Self {
        let resolution_percentage = if winners > 0 {
            (resolved as f64 / winners as f64) * 100.0
        } else {
            0.0
        };

        ResolutionStats {
            winners,
            resolved,
            unresolved: winners.saturating_sub(resolved),
            resolution_percentage,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved == 0 && self.winners > 0
    }
}

/// Row tallies for each feed of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedTallies {
    pub winners: RowTally,
    pub country_wins: RowTally,
    pub language_wins: RowTally,
    pub catalog: RowTally,
    pub perform_numbers: RowTally,
    pub votes: RowTally,
}

impl FeedTallies {
    pub fn skipped_total(&self) -> usize {
        [
            &self.winners,
            &self.country_wins,
            &self.language_wins,
            &self.catalog,
            &self.perform_numbers,
            &self.votes,
        ]
        .iter()
        .map(|t| t.skipped_total())
        .sum()
    }
}

/// What a pipeline run read, skipped and wrote.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: FeedTallies,
    pub resolution: ResolutionStats,
    pub unresolved_songs: Vec<(Year, String)>,
    pub statistics: StatisticsDiagnostics,
    pub vote_countries: usize,
    pub vote_edges: usize,
    pub best_pairs: Vec<BestPair>,
    pub documents_written: BTreeMap<&'static str, usize>,
}

impl RunReport {
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Run {} ({} -> {})", self.run_id, self.started_at, self.finished_at),
            format!(
                "Winners resolved: {}/{} ({:.1}%)",
                self.resolution.resolved, self.resolution.winners, self.resolution.resolution_percentage
            ),
            format!("Rows skipped: {}", self.rows.skipped_total()),
            format!(
                "Winners without key: {}, without language: {}",
                self.statistics.without_key, self.statistics.without_language
            ),
            format!("Vote graph: {} countries, {} edges", self.vote_countries, self.vote_edges),
        ];
        if !self.resolution.is_complete() {
            let songs: Vec<String> = self
                .unresolved_songs
                .iter()
                .map(|(year, song)| format!("{} ({})", song, year))
                .collect();
            lines.push(format!("Unresolved winners: {}", songs.join(", ")));
        }
        for (rank, pair) in self.best_pairs.iter().enumerate() {
            lines.push(format!(
                "Best pair #{}: {} & {} ({} points)",
                rank + 1,
                pair.countries.0,
                pair.countries.1,
                pair.score
            ));
        }
        let written: usize = self.documents_written.values().sum();
        lines.push(format!(
            "Documents written: {} across {} collections",
            written,
            self.documents_written.len()
        ));
        lines
    }
}
