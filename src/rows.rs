// rows.rs
//! Raw source rows as the adapters deliver them, and their conversion into
//! typed records. A row that cannot be converted is skipped with a reason
//! instead of failing the surrounding collection.

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{CountryWins, LanguageWins, PerformNumber, TrackMetadata, WinnerRecord, Year};

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Catalog value meaning "no key detected".
const NO_PITCH_CLASS: i64 = -1;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawWinnerRow {
    pub year: Option<String>,
    pub date: Option<String>,
    pub host_city: Option<String>,
    pub winner: Option<String>,
    pub song: Option<String>,
    pub performer: Option<String>,
}

/// One row of the wins-per-country or wins-per-language tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawWinTableRow {
    pub name: Option<String>,
    pub wins: Option<String>,
    pub years: Vec<String>,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawTrack {
    pub name: Option<String>,
    pub id: Option<String>,
    pub artists: Vec<String>,
    pub release_date: Option<String>,
    pub pitch_class: Option<i64>,
    pub genres: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawVoteRow {
    pub country: Option<String>,
    pub points: Option<String>,
}

/// One row of the final running-order table of winning songs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawPerformNumberRow {
    pub song: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinTally {
    pub name: String,
    pub wins: u32,
    pub years: Vec<Year>,
    pub countries: Vec<String>,
}

impl WinTally {
    pub fn into_country_wins(self) -> CountryWins {
        CountryWins { country: self.name, wins: self.wins, years: self.years }
    }

    pub fn into_language_wins(self) -> LanguageWins {
        LanguageWins {
            language: self.name,
            wins: self.wins,
            years: self.years,
            countries: self.countries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
    MalformedYear(String),
    MalformedNumber { field: &'static str, value: String },
    UnknownPitchClass(i64),
    /// A country listed as its own counterpart.
    SelfVote(String),
}

impl SkipReason {
    /// Stable label used as the tally key.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingField(_) => "missing_field",
            SkipReason::MalformedYear(_) => "malformed_year",
            SkipReason::MalformedNumber { .. } => "malformed_number",
            SkipReason::UnknownPitchClass(_) => "unknown_pitch_class",
            SkipReason::SelfVote(_) => "self_vote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome<T> {
    Parsed(T),
    Skipped(SkipReason),
}

/// Parsed and skipped row counts for one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowTally {
    pub parsed: usize,
    pub skipped: BTreeMap<&'static str, usize>,
}

impl RowTally {
    pub fn record<T>(&mut self, outcome: &RowOutcome<T>) {
        match outcome {
            RowOutcome::Parsed(_) => self.parsed += 1,
            RowOutcome::Skipped(reason) => {
                *self.skipped.entry(reason.label()).or_insert(0) += 1;
            }
        }
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn merge(&mut self, other: &RowTally) {
        self.parsed += other.parsed;
        for (label, count) in &other.skipped {
            *self.skipped.entry(label).or_insert(0) += count;
        }
    }
}

/// Converts raw rows into records. Holds the compiled cell patterns.
pub struct RowParser {
    year: Regex,
    digits: Regex,
}

impl RowParser {
    pub fn new() -> Result<Self> {
        Ok(RowParser {
            year: Regex::new(r"^\d{4}$").context("Failed to compile year pattern")?,
            digits: Regex::new(r"^\d+$").context("Failed to compile digits pattern")?,
        })
    }

    /// Parses every row, keeping the successes in source order.
    pub fn parse_all<R, T>(
        &self,
        feed: &str,
        rows: &[R],
        parse: impl Fn(&Self, &R) -> RowOutcome<T>,
    ) -> (Vec<T>, RowTally) {
        let mut tally = RowTally::default();
        let mut parsed = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let outcome = parse(self, row);
            tally.record(&outcome);
            match outcome {
                RowOutcome::Parsed(value) => parsed.push(value),
                RowOutcome::Skipped(reason) => {
                    debug!("Skipping {} row {}: {:?}", feed, index, reason);
                }
            }
        }
        (parsed, tally)
    }

    pub fn year(&self, cell: &str) -> Option<Year> {
        let cleaned: String = cell
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
            .collect();
        if !self.year.is_match(&cleaned) {
            return None;
        }
        cleaned.parse().ok()
    }

    /// Parses a non-negative count, ignoring spaces inside the cell.
    pub fn count(&self, cell: &str) -> Option<u32> {
        let cleaned: String = cell.chars().filter(|c| !c.is_whitespace()).collect();
        if !self.digits.is_match(&cleaned) {
            return None;
        }
        cleaned.parse().ok()
    }

    pub fn winner(&self, raw: &RawWinnerRow) -> RowOutcome<WinnerRecord> {
        let year_cell = match required(&raw.year, "year") {
            Ok(v) => v,
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        let Some(year) = self.year(year_cell) else {
            return RowOutcome::Skipped(SkipReason::MalformedYear(year_cell.to_string()));
        };
        let fields = (|| {
            Ok::<_, SkipReason>(WinnerRecord {
                year,
                date: required(&raw.date, "date")?.to_string(),
                host_city: required(&raw.host_city, "host_city")?.to_string(),
                winner: required(&raw.winner, "winner")?.to_string(),
                song: required(&raw.song, "song")?.to_string(),
                performer: required(&raw.performer, "performer")?.to_string(),
            })
        })();
        match fields {
            Ok(record) => RowOutcome::Parsed(record),
            Err(reason) => RowOutcome::Skipped(reason),
        }
    }

    pub fn win_table(&self, raw: &RawWinTableRow) -> RowOutcome<WinTally> {
        let name = match required(&raw.name, "name") {
            Ok(v) => v.to_string(),
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        let wins_cell = match required(&raw.wins, "wins") {
            Ok(v) => v,
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        let Some(wins) = self.count(wins_cell) else {
            return RowOutcome::Skipped(SkipReason::MalformedNumber {
                field: "wins",
                value: wins_cell.to_string(),
            });
        };
        let mut years = Vec::with_capacity(raw.years.len());
        for cell in &raw.years {
            match self.year(cell) {
                Some(year) => years.push(year),
                None => return RowOutcome::Skipped(SkipReason::MalformedYear(cell.clone())),
            }
        }
        let countries = raw
            .countries
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        RowOutcome::Parsed(WinTally { name, wins, years, countries })
    }

    pub fn track(&self, raw: &RawTrack) -> RowOutcome<TrackMetadata> {
        let key = match raw.pitch_class {
            None | Some(NO_PITCH_CLASS) => None,
            Some(pc) => match pitch_class_name(pc) {
                Some(name) => Some(name.to_string()),
                None => return RowOutcome::Skipped(SkipReason::UnknownPitchClass(pc)),
            },
        };
        let track = (|| {
            Ok::<_, SkipReason>(TrackMetadata {
                name: required(&raw.name, "name")?.to_string(),
                catalog_id: required(&raw.id, "id")?.to_string(),
                artists: raw.artists.clone(),
                release_date: raw.release_date.clone().unwrap_or_default(),
                key,
                genres: raw.genres.clone(),
            })
        })();
        match track {
            Ok(track) => RowOutcome::Parsed(track),
            Err(reason) => RowOutcome::Skipped(reason),
        }
    }

    /// Parses a running-order row. The song title loses its periods and
    /// commas so it matches titles written with or without them.
    pub fn perform_number(&self, raw: &RawPerformNumberRow) -> RowOutcome<PerformNumber> {
        let song = match required(&raw.song, "song") {
            Ok(v) => normalize_song_title(v),
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        if song.trim().is_empty() {
            return RowOutcome::Skipped(SkipReason::MissingField("song"));
        }
        let position_cell = match required(&raw.position, "position") {
            Ok(v) => v,
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        match self.count(position_cell) {
            Some(position) => RowOutcome::Parsed(PerformNumber { song, position }),
            None => RowOutcome::Skipped(SkipReason::MalformedNumber {
                field: "position",
                value: position_cell.to_string(),
            }),
        }
    }

    /// Parses one (counterpart, points) vote row.
    pub fn vote(&self, raw: &RawVoteRow) -> RowOutcome<(String, u32)> {
        let country = match required(&raw.country, "country") {
            Ok(v) => v.to_string(),
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        let points_cell = match required(&raw.points, "points") {
            Ok(v) => v,
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        match self.count(points_cell) {
            Some(points) => RowOutcome::Parsed((country, points)),
            None => RowOutcome::Skipped(SkipReason::MalformedNumber {
                field: "points",
                value: points_cell.to_string(),
            }),
        }
    }
}

/// Maps a catalog pitch class (0 = C .. 11 = B) to its name.
pub fn pitch_class_name(pitch_class: i64) -> Option<&'static str> {
    usize::try_from(pitch_class)
        .ok()
        .and_then(|i| PITCH_CLASSES.get(i).copied())
}

pub fn normalize_song_title(title: &str) -> String {
    title.chars().filter(|c| *c != '.' && *c != ',').collect()
}

fn required<'a>(cell: &'a Option<String>, field: &'static str) -> Result<&'a str, SkipReason> {
    match cell.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SkipReason::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RowParser {
        RowParser::new().unwrap()
    }

    fn winner_row(year: &str) -> RawWinnerRow {
        RawWinnerRow {
            year: Some(year.to_string()),
            date: Some("20 March 1965".to_string()),
            host_city: Some("Naples".to_string()),
            winner: Some("Luxembourg".to_string()),
            song: Some("Poupée de cire, poupée de son".to_string()),
            performer: Some("France Gall".to_string()),
        }
    }

    #[test]
    fn year_cell_tolerates_non_breaking_space() {
        let p = parser();
        assert_eq!(p.year("1965\u{a0}"), Some(1965));
        assert_eq!(p.year(" 2018 "), Some(2018));
        assert_eq!(p.year("65"), None);
        assert_eq!(p.year("19x5"), None);
    }

    #[test]
    fn winner_row_with_missing_cell_is_skipped() {
        let p = parser();
        let mut row = winner_row("1965");
        row.performer = None;
        assert_eq!(p.winner(&row), RowOutcome::Skipped(SkipReason::MissingField("performer")));

        let parsed = p.winner(&winner_row("1965"));
        match parsed {
            RowOutcome::Parsed(r) => {
                assert_eq!(r.year, 1965);
                assert_eq!(r.winner, "Luxembourg");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn malformed_points_are_dropped_not_zeroed() {
        let p = parser();
        let ok = RawVoteRow { country: Some("Greece".into()), points: Some("1 2".into()) };
        assert_eq!(p.vote(&ok), RowOutcome::Parsed(("Greece".to_string(), 12)));

        let blank = RawVoteRow { country: Some("Greece".into()), points: Some("  ".into()) };
        assert_eq!(p.vote(&blank), RowOutcome::Skipped(SkipReason::MissingField("points")));

        let text = RawVoteRow { country: Some("Greece".into()), points: Some("n/a".into()) };
        assert!(matches!(
            p.vote(&text),
            RowOutcome::Skipped(SkipReason::MalformedNumber { field: "points", .. })
        ));

        let negative = RawVoteRow { country: Some("Greece".into()), points: Some("-3".into()) };
        assert!(matches!(p.vote(&negative), RowOutcome::Skipped(_)));
    }

    #[test]
    fn pitch_classes_map_to_names() {
        assert_eq!(pitch_class_name(0), Some("C"));
        assert_eq!(pitch_class_name(9), Some("A"));
        assert_eq!(pitch_class_name(11), Some("B"));
        assert_eq!(pitch_class_name(12), None);
        assert_eq!(pitch_class_name(-1), None);
    }

    #[test]
    fn track_without_key_is_kept_with_no_key() {
        let p = parser();
        let raw = RawTrack {
            name: Some("Waterloo".into()),
            id: Some("abc".into()),
            artists: vec!["ABBA".into()],
            pitch_class: Some(-1),
            ..Default::default()
        };
        match p.track(&raw) {
            RowOutcome::Parsed(t) => assert_eq!(t.key, None),
            other => panic!("unexpected outcome {:?}", other),
        }
        let bad = RawTrack { pitch_class: Some(14), ..raw };
        assert_eq!(p.track(&bad), RowOutcome::Skipped(SkipReason::UnknownPitchClass(14)));
    }

    #[test]
    fn parse_all_counts_skips_per_reason() {
        let p = parser();
        let rows = vec![
            RawVoteRow { country: Some("Norway".into()), points: Some("10".into()) },
            RawVoteRow { country: None, points: Some("8".into()) },
            RawVoteRow { country: Some("Denmark".into()), points: Some("x".into()) },
            RawVoteRow { country: Some("Sweden".into()), points: Some("7".into()) },
        ];
        let (votes, tally) = p.parse_all("votes", &rows, RowParser::vote);
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[1], ("Sweden".to_string(), 7));
        assert_eq!(tally.parsed, 2);
        assert_eq!(tally.skipped.get("missing_field"), Some(&1));
        assert_eq!(tally.skipped.get("malformed_number"), Some(&1));
        assert_eq!(tally.skipped_total(), 2);
    }

    #[test]
    fn perform_number_strips_punctuation_from_title() {
        let p = parser();
        let raw = RawPerformNumberRow {
            song: Some("Poupée de cire, poupée de son".into()),
            position: Some(" 12 ".into()),
        };
        assert_eq!(
            p.perform_number(&raw),
            RowOutcome::Parsed(PerformNumber {
                song: "Poupée de cire poupée de son".to_string(),
                position: 12,
            })
        );
        assert_eq!(normalize_song_title("Boom Bang-a-Bang."), "Boom Bang-a-Bang");

        let unnumbered = RawPerformNumberRow { position: Some("?".into()), ..raw.clone() };
        assert!(matches!(
            p.perform_number(&unnumbered),
            RowOutcome::Skipped(SkipReason::MalformedNumber { field: "position", .. })
        ));
        let only_punctuation = RawPerformNumberRow { song: Some(".,".into()), ..raw };
        assert_eq!(
            p.perform_number(&only_punctuation),
            RowOutcome::Skipped(SkipReason::MissingField("song"))
        );
    }

    #[test]
    fn win_table_row_parses_years() {
        let p = parser();
        let raw = RawWinTableRow {
            name: Some("English".into()),
            wins: Some("\n33\n".into()),
            years: vec!["1967".into(), "1969".into()],
            countries: vec!["United Kingdom".into(), " ".into()],
        };
        match p.win_table(&raw) {
            RowOutcome::Parsed(t) => {
                assert_eq!(t.wins, 33);
                assert_eq!(t.years, vec![1967, 1969]);
                assert_eq!(t.countries, vec!["United Kingdom".to_string()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
