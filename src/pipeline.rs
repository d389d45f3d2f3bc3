// pipeline.rs
use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::best_pair::{best_pairs, best_pairs_document};
use crate::config::PipelineConfig;
use crate::models::{
    BestPair, CountryVoteProfile, CountryWins, LanguageWins, PerformNumber, ResolvedWinner,
    TrackMetadata, VoteDirection, Year,
};
use crate::resolver::{self, ResolutionOutcome};
use crate::rows::{RawPerformNumberRow, RawTrack, RowParser};
use crate::run_report::{FeedTallies, ResolutionStats, RunReport};
use crate::sources::{Country, CountryFlag, Sources, WinnerTables};
use crate::statistics::{self, statistics_document, Statistics};
use crate::store::{AggregateStore, Collection, RunStamp};
use crate::vote_graph::{profile_document, yearly_document, CountryVotes, VoteGraphBuilder, YearlyVotes};

/// Everything read from the sources for one run.
pub struct Collected {
    pub tables: WinnerTables,
    pub tracks: Vec<RawTrack>,
    pub flags: Vec<CountryFlag>,
    pub perform_numbers: Vec<RawPerformNumberRow>,
    pub countries: Vec<Country>,
    pub votes: Vec<CountryVotes>,
}

/// Derived state of one run, ready to persist.
pub struct Aggregated {
    pub rows: FeedTallies,
    pub tracks: Vec<TrackMetadata>,
    pub country_wins: Vec<CountryWins>,
    pub language_wins: Vec<LanguageWins>,
    pub resolution: ResolutionOutcome,
    pub statistics: Statistics,
    pub locations: Vec<(String, Vec<ResolvedWinner>)>,
    pub given: Vec<CountryVoteProfile>,
    pub received: Vec<CountryVoteProfile>,
    pub yearly_given: Vec<YearlyVotes>,
    pub yearly_received: Vec<YearlyVotes>,
    pub best_pairs: Vec<BestPair>,
    pub flags: Vec<CountryFlag>,
    pub perform_numbers: Vec<PerformNumber>,
    pub vote_countries: usize,
    pub vote_edges: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    sources: Sources,
    store: Arc<dyn AggregateStore>,
    parser: RowParser,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sources: Sources, store: Arc<dyn AggregateStore>) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config, sources, store, parser: RowParser::new()? })
    }

    /// Collects every feed, aggregates once collection is complete, then
    /// writes the new snapshot.
    pub async fn run(&self) -> Result<RunReport> {
        let run = RunStamp::new();
        info!("Starting pipeline run {}", run.run_id);

        let collected = self.collect().await?;
        let aggregated = self.aggregate(collected);
        let documents_written = self.persist(&run, &aggregated).await?;

        let report = RunReport {
            run_id: run.run_id,
            started_at: run.started_at,
            finished_at: Utc::now(),
            resolution: ResolutionStats::new(
                aggregated.resolution.winners_considered,
                aggregated.resolution.resolved.len(),
            ),
            unresolved_songs: aggregated
                .resolution
                .unresolved
                .iter()
                .map(|u| (u.year, u.song.clone()))
                .collect(),
            statistics: aggregated.statistics.diagnostics.clone(),
            vote_countries: aggregated.vote_countries,
            vote_edges: aggregated.vote_edges,
            best_pairs: aggregated.best_pairs.clone(),
            rows: aggregated.rows,
            documents_written,
        };
        info!("Pipeline run {} completed.", run.run_id);
        Ok(report)
    }

    pub async fn collect(&self) -> Result<Collected> {
        info!("Collecting contest history...");
        let tables = self.sources.contest.winner_tables().await
            .context("Failed to collect winner tables")?;
        let flags = self.sources.contest.country_flags().await
            .context("Failed to collect country flags")?;
        let perform_numbers = self.sources.contest.perform_numbers().await
            .context("Failed to collect song running order")?;
        info!("Collecting catalog tracks...");
        let tracks = self.sources.catalog.tracks().await
            .context("Failed to collect catalog tracks")?;
        let countries = self.sources.votes.countries().await
            .context("Failed to collect vote countries")?;
        let votes = self.collect_votes(&countries).await?;
        info!(
            "Collected {} winner rows, {} tracks, {} countries, {} vote queries.",
            tables.by_year.len(),
            tracks.len(),
            countries.len(),
            votes.len()
        );
        Ok(Collected { tables, tracks, flags, perform_numbers, countries, votes })
    }

    /// Queries every (country, direction, year) with at most
    /// `vote_concurrency` requests in flight. Results keep request order.
    async fn collect_votes(&self, countries: &[Country]) -> Result<Vec<CountryVotes>> {
        let mut requests: Vec<(Country, VoteDirection, Year)> = Vec::new();
        for direction in [VoteDirection::Given, VoteDirection::Received] {
            for country in countries {
                for year in self.config.years() {
                    requests.push((country.clone(), direction, year));
                }
            }
        }
        info!(
            "Collecting votes: {} queries with concurrency {}",
            requests.len(),
            self.config.vote_concurrency
        );

        let progress = ProgressBar::new(requests.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .context("Invalid progress template")?,
        );
        let source = self.sources.votes.clone();
        let votes: Vec<CountryVotes> = stream::iter(requests)
            .map(|(country, direction, year)| {
                let source = source.clone();
                let progress = progress.clone();
                async move {
                    let rows = source.votes(&country, direction, year).await.with_context(|| {
                        format!("Failed to collect votes {} {} {}", country.name, direction.as_str(), year)
                    })?;
                    progress.inc(1);
                    Ok::<_, anyhow::Error>(CountryVotes { country: country.name, direction, year, rows })
                }
            })
            .buffered(self.config.vote_concurrency)
            .try_collect()
            .await?;
        progress.finish_with_message("votes collected");
        Ok(votes)
    }

    pub fn aggregate(&self, collected: Collected) -> Aggregated {
        info!("Aggregating collected rows...");
        let p = &self.parser;
        let mut rows = FeedTallies::default();

        let (winners, tally) = p.parse_all("winners_by_year", &collected.tables.by_year, RowParser::winner);
        rows.winners = tally;
        let (country_wins, tally) = p.parse_all("winners_by_country", &collected.tables.by_country, RowParser::win_table);
        rows.country_wins = tally;
        let (language_wins, tally) = p.parse_all("winners_by_language", &collected.tables.by_language, RowParser::win_table);
        rows.language_wins = tally;
        let (tracks, tally) = p.parse_all("catalog", &collected.tracks, RowParser::track);
        rows.catalog = tally;
        let (perform_numbers, tally) = p.parse_all("perform_numbers", &collected.perform_numbers, RowParser::perform_number);
        rows.perform_numbers = tally;

        let country_wins: Vec<CountryWins> = country_wins.into_iter().map(|t| t.into_country_wins()).collect();
        let language_wins: Vec<LanguageWins> = language_wins.into_iter().map(|t| t.into_language_wins()).collect();

        let resolution = resolver::resolve(&winners, &tracks, &language_wins);
        let statistics = statistics::aggregate(resolution.resolved.iter());
        let locations = resolver::group_by_location(&resolution.resolved);

        let mut builder = VoteGraphBuilder::new();
        for country in &collected.countries {
            builder.add_country(&country.name);
        }
        for votes in &collected.votes {
            builder.ingest(p, votes);
        }
        let graph = builder.build();
        rows.votes = graph.tally().clone();

        let given = graph.profiles(VoteDirection::Given);
        let received = graph.profiles(VoteDirection::Received);
        let best_pairs = best_pairs(&given);

        Aggregated {
            rows,
            tracks,
            country_wins,
            language_wins,
            resolution,
            statistics,
            locations,
            yearly_given: graph.yearly(VoteDirection::Given),
            yearly_received: graph.yearly(VoteDirection::Received),
            given,
            received,
            best_pairs,
            flags: collected.flags,
            perform_numbers,
            vote_countries: graph.country_count(),
            vote_edges: graph.edge_count(),
        }
    }

    /// Writes every collection of the snapshot, one after another. Each
    /// collection is replaced, so documents of earlier runs are dropped.
    pub async fn persist(
        &self,
        run: &RunStamp,
        aggregated: &Aggregated,
    ) -> Result<BTreeMap<&'static str, usize>> {
        let resolved: Vec<&ResolvedWinner> = aggregated.resolution.resolved.iter().collect();
        let locations: Vec<Value> = aggregated
            .locations
            .iter()
            .map(|(location, winners)| json!({ "location": location, "winners": winners }))
            .collect();

        let documents: Vec<(Collection, Value)> = vec![
            (Collection::WinnersSongsCatalog, serde_json::to_value(&aggregated.tracks)?),
            (Collection::WinnerByYear, serde_json::to_value(&resolved)?),
            (Collection::SongsStatistic, statistics_document(&aggregated.statistics.aggregate)?),
            (Collection::WinnersByCountry, serde_json::to_value(&aggregated.country_wins)?),
            (Collection::WinnersByLanguage, serde_json::to_value(&aggregated.language_wins)?),
            (Collection::AllWinnersByLocation, Value::Array(locations)),
            (
                Collection::AllPointsGivenFrom,
                Value::Array(aggregated.given.iter().map(|p| profile_document(p, VoteDirection::Given)).collect()),
            ),
            (
                Collection::AllPointsGivenTo,
                Value::Array(aggregated.received.iter().map(|p| profile_document(p, VoteDirection::Received)).collect()),
            ),
            (
                Collection::PointsByYearGivenFrom,
                Value::Array(aggregated.yearly_given.iter().map(yearly_document).collect()),
            ),
            (
                Collection::PointsByYearGivenTo,
                Value::Array(aggregated.yearly_received.iter().map(yearly_document).collect()),
            ),
            (Collection::Bff, best_pairs_document(&aggregated.best_pairs)),
            (Collection::CountryFlag, serde_json::to_value(&aggregated.flags)?),
            (Collection::WinnerSongsPerformNumber, serde_json::to_value(&aggregated.perform_numbers)?),
        ];

        let mut written = BTreeMap::new();
        for (collection, docs) in documents {
            let count = self.store.replace(run, collection, docs).await
                .with_context(|| format!("Failed to write {}", collection.name()))?;
            written.insert(collection.name(), count);
        }
        Ok(written)
    }

    /// Rebuilds `songs_statistic` from the stored `winner_by_year` documents.
    pub async fn recompute_statistics(&self, run: &RunStamp) -> Result<Statistics> {
        info!("Recomputing statistics from stored winners...");
        let stored = self.store.read_all(Collection::WinnerByYear).await
            .context("Failed to read stored winners")?;
        let bodies: Vec<Value> = stored.into_iter().map(|d| d.body).collect();
        let stats = statistics::aggregate_stored(&bodies);
        self.store
            .write(run, Collection::SongsStatistic, statistics_document(&stats.aggregate)?)
            .await
            .context("Failed to write recomputed statistics")?;
        Ok(stats)
    }
}
