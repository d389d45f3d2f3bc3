use serde::{Deserialize, Serialize};

/// Contest year, the natural key of every winner-derived record.
pub type Year = u16;

// Parsed source records

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub year: Year,
    pub date: String,
    pub host_city: String,
    /// Winning country.
    pub winner: String,
    pub song: String,
    pub performer: String,
}

/// Song attributes from the music catalog, stored as one
/// `winners_songs_catalog` document per track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub name: String,
    pub catalog_id: String,
    pub artists: Vec<String>,
    pub release_date: String,
    /// Pitch-class name, e.g. "A" or "C#".
    #[serde(default)]
    pub key: Option<String>,
    /// One tag group per artist.
    #[serde(default)]
    pub genres: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryWins {
    pub country: String,
    pub wins: u32,
    pub years: Vec<Year>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageWins {
    pub language: String,
    pub wins: u32,
    pub years: Vec<Year>,
    pub countries: Vec<String>,
}

/// Running-order position of a winning song in its final, stored as a
/// `winner_songs_perform_number` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformNumber {
    /// Song title without periods or commas.
    pub song: String,
    pub position: u32,
}

/// A winner bound to its catalog track, stored as a `winner_by_year` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedWinner {
    pub year: Year,
    pub date: String,
    pub host_city: String,
    pub winner: String,
    pub performer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song: Option<TrackMetadata>,
    #[serde(default)]
    pub language: Option<String>,
}

impl ResolvedWinner {
    pub fn bind(record: &WinnerRecord, song: TrackMetadata) -> Self {
        ResolvedWinner {
            year: record.year,
            date: record.date.clone(),
            host_city: record.host_city.clone(),
            winner: record.winner.clone(),
            performer: record.performer.clone(),
            song: Some(song),
            language: None,
        }
    }
}

// Voting

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    /// Points the queried country awarded.
    Given,
    /// Points the queried country got.
    Received,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Given => "from",
            VoteDirection::Received => "to",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEdge {
    pub year: Year,
    pub source: String,
    pub target: String,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartPoints {
    pub country: String,
    pub points: u64,
}

/// A country's counterparts ranked by cumulative points, highest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryVoteProfile {
    pub country: String,
    pub counterparts: Vec<CounterpartPoints>,
}

impl CountryVoteProfile {
    pub fn top(&self, k: usize) -> &[CounterpartPoints] {
        &self.counterparts[..k.min(self.counterparts.len())]
    }

    pub fn favourite(&self) -> Option<&CounterpartPoints> {
        self.counterparts.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPair {
    pub countries: (String, String),
    pub score: u64,
}

impl BestPair {
    pub fn involves(&self, a: &str, b: &str) -> bool {
        let (x, y) = (&self.countries.0, &self.countries.1);
        (x == a && y == b) || (x == b && y == a)
    }
}
