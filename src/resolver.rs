// resolver.rs
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::models::{LanguageWins, ResolvedWinner, TrackMetadata, WinnerRecord, Year};

/// Winners bound to catalog tracks, in source order with unique years.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedWinners {
    entries: Vec<ResolvedWinner>,
}

impl ResolvedWinners {
    /// Builds the collection, letting a later entry for a year replace the
    /// earlier one in place.
    pub fn from_entries(entries: impl IntoIterator<Item = ResolvedWinner>) -> Self {
        let mut position: HashMap<Year, usize> = HashMap::new();
        let mut ordered: Vec<ResolvedWinner> = Vec::new();
        for entry in entries {
            match position.get(&entry.year) {
                Some(&i) => ordered[i] = entry,
                None => {
                    position.insert(entry.year, ordered.len());
                    ordered.push(entry);
                }
            }
        }
        ResolvedWinners { entries: ordered }
    }

    pub fn get(&self, year: Year) -> Option<&ResolvedWinner> {
        self.entries.iter().find(|w| w.year == year)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedWinner> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A winner with no catalog track of the same title.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedWinner {
    pub year: Year,
    pub song: String,
    /// Most similar catalog title and its similarity in [0, 1]. Reported only.
    pub closest_title: Option<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub resolved: ResolvedWinners,
    pub unresolved: Vec<UnresolvedWinner>,
    pub winners_considered: usize,
}

/// Binds each winner to the first catalog track whose title matches the
/// winner's song case-insensitively, then annotates the language.
pub fn resolve(
    winners: &[WinnerRecord],
    catalog: &[TrackMetadata],
    languages: &[LanguageWins],
) -> ResolutionOutcome {
    info!(
        "Resolving {} winners against {} catalog tracks...",
        winners.len(),
        catalog.len()
    );
    let winners = dedupe_by_year(winners);
    let lowered_titles: Vec<String> = catalog.iter().map(|t| t.name.to_lowercase()).collect();

    let mut resolved = Vec::with_capacity(winners.len());
    let mut unresolved = Vec::new();

    for record in &winners {
        let wanted = record.song.to_lowercase();
        match lowered_titles.iter().position(|title| *title == wanted) {
            Some(index) => {
                let mut bound = ResolvedWinner::bind(record, catalog[index].clone());
                bound.language = language_for_year(languages, record.year);
                if bound.language.is_none() {
                    debug!("No language listed for {}", record.year);
                }
                resolved.push(bound);
            }
            None => {
                let closest_title = closest_title(&wanted, catalog, &lowered_titles);
                warn!(
                    "No catalog track titled '{}' ({}); closest: {:?}",
                    record.song, record.year, closest_title
                );
                unresolved.push(UnresolvedWinner {
                    year: record.year,
                    song: record.song.clone(),
                    closest_title,
                });
            }
        }
    }

    info!(
        "Resolved {} of {} winners ({} unresolved).",
        resolved.len(),
        winners.len(),
        unresolved.len()
    );
    ResolutionOutcome {
        resolved: ResolvedWinners::from_entries(resolved),
        unresolved,
        winners_considered: winners.len(),
    }
}

/// Language whose winning years include `year`. When several languages list
/// the year, the one listed last wins.
pub fn language_for_year(languages: &[LanguageWins], year: Year) -> Option<String> {
    languages
        .iter()
        .rev()
        .find(|lang| lang.years.contains(&year))
        .map(|lang| lang.language.to_lowercase())
}

/// Groups winners by host city, lower-cased with spaces removed, in order of
/// first appearance.
pub fn group_by_location(winners: &ResolvedWinners) -> Vec<(String, Vec<ResolvedWinner>)> {
    let mut groups: Vec<(String, Vec<ResolvedWinner>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for winner in winners.iter() {
        let location: String = winner
            .host_city
            .chars()
            .filter(|c| *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match index.get(&location) {
            Some(&i) => groups[i].1.push(winner.clone()),
            None => {
                index.insert(location.clone(), groups.len());
                groups.push((location, vec![winner.clone()]));
            }
        }
    }
    groups
}

fn dedupe_by_year(winners: &[WinnerRecord]) -> Vec<WinnerRecord> {
    let mut position: HashMap<Year, usize> = HashMap::new();
    let mut ordered: Vec<WinnerRecord> = Vec::with_capacity(winners.len());
    for record in winners {
        match position.get(&record.year) {
            Some(&i) => {
                warn!("Duplicate winner row for {}, keeping the later one", record.year);
                ordered[i] = record.clone();
            }
            None => {
                position.insert(record.year, ordered.len());
                ordered.push(record.clone());
            }
        }
    }
    ordered
}

fn closest_title(
    wanted: &str,
    catalog: &[TrackMetadata],
    lowered_titles: &[String],
) -> Option<(String, f64)> {
    lowered_titles
        .iter()
        .enumerate()
        .map(|(i, title)| (i, strsim::normalized_levenshtein(wanted, title)))
        .fold(None, |best: Option<(usize, f64)>, (i, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((i, score)),
        })
        .map(|(i, score)| (catalog[i].name.clone(), score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winner(year: Year, song: &str) -> WinnerRecord {
        WinnerRecord {
            year,
            date: format!("{} date", year),
            host_city: "Naples".to_string(),
            winner: "Luxembourg".to_string(),
            song: song.to_string(),
            performer: "France Gall".to_string(),
        }
    }

    fn track(name: &str, id: &str) -> TrackMetadata {
        TrackMetadata {
            name: name.to_string(),
            catalog_id: id.to_string(),
            artists: vec!["France Gall".to_string()],
            release_date: "1965".to_string(),
            key: Some("A".to_string()),
            genres: vec![vec!["pop".to_string()]],
        }
    }

    fn language(name: &str, years: &[Year]) -> LanguageWins {
        LanguageWins {
            language: name.to_string(),
            wins: years.len() as u32,
            years: years.to_vec(),
            countries: vec![],
        }
    }

    #[test]
    fn binds_case_insensitive_title_match() {
        let winners = vec![winner(1965, "Poupée de cire, poupée de son")];
        let catalog = vec![
            track("Waterloo", "w"),
            track("poupée de cire, poupée de son", "p"),
        ];
        let outcome = resolve(&winners, &catalog, &[language("French", &[1965])]);
        let bound = outcome.resolved.get(1965).unwrap();
        assert_eq!(bound.song.as_ref().unwrap().catalog_id, "p");
        assert_eq!(bound.language.as_deref(), Some("french"));
        assert!(outcome.unresolved.is_empty());
    }

    #[test]
    fn first_matching_catalog_entry_wins() {
        let winners = vec![winner(1974, "Waterloo")];
        let catalog = vec![track("WATERLOO", "first"), track("waterloo", "second")];
        let outcome = resolve(&winners, &catalog, &[]);
        let bound = outcome.resolved.get(1974).unwrap();
        assert_eq!(bound.song.as_ref().unwrap().catalog_id, "first");
        assert_eq!(bound.language, None);
    }

    #[test]
    fn unmatched_winner_is_omitted_with_closest_hint() {
        let winners = vec![winner(1974, "Waterloo"), winner(1965, "Poupee de cire")];
        let catalog = vec![track("Waterloo", "w"), track("Poupée de cire", "p")];
        let outcome = resolve(&winners, &catalog, &[]);
        assert_eq!(outcome.resolved.len(), 1);
        assert!(outcome.resolved.get(1965).is_none());
        assert_eq!(outcome.unresolved.len(), 1);
        let (title, score) = outcome.unresolved[0].closest_title.clone().unwrap();
        assert_eq!(title, "Poupée de cire");
        assert!(score > 0.8);
    }

    #[test]
    fn resolution_is_idempotent() {
        let winners = vec![winner(1974, "Waterloo"), winner(1965, "Poupée de cire")];
        let catalog = vec![track("Waterloo", "w"), track("poupée de cire", "p")];
        let langs = vec![language("English", &[1974])];
        assert_eq!(resolve(&winners, &catalog, &langs), resolve(&winners, &catalog, &langs));
    }

    #[test]
    fn later_duplicate_year_replaces_in_place() {
        let winners = vec![
            winner(1969, "Boom Bang-a-Bang"),
            winner(1970, "All Kinds of Everything"),
            winner(1969, "Vivo cantando"),
        ];
        let catalog = vec![
            track("Boom Bang-a-Bang", "b"),
            track("Vivo cantando", "v"),
            track("All Kinds of Everything", "a"),
        ];
        let outcome = resolve(&winners, &catalog, &[]);
        let years: Vec<Year> = outcome.resolved.iter().map(|w| w.year).collect();
        assert_eq!(years, vec![1969, 1970]);
        assert_eq!(
            outcome.resolved.get(1969).unwrap().song.as_ref().unwrap().catalog_id,
            "v"
        );
        assert_eq!(outcome.winners_considered, 2);
    }

    #[test]
    fn last_listed_language_wins_year_ties() {
        let langs = vec![language("English", &[1969]), language("Spanish", &[1969])];
        assert_eq!(language_for_year(&langs, 1969).as_deref(), Some("spanish"));
        assert_eq!(language_for_year(&langs, 1970), None);
    }

    #[test]
    fn groups_by_normalised_host_city() {
        let mut a = ResolvedWinner::bind(&winner(1963, "Dansevise"), track("Dansevise", "d"));
        a.host_city = "London".to_string();
        let mut b = ResolvedWinner::bind(&winner(1998, "Diva"), track("Diva", "v"));
        b.host_city = "Birmingham".to_string();
        let mut c = ResolvedWinner::bind(&winner(1968, "La, la, la"), track("La, la, la", "l"));
        c.host_city = "Lon don".to_string();
        let groups = group_by_location(&ResolvedWinners::from_entries(vec![a, b, c]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "london");
        let years: Vec<Year> = groups[0].1.iter().map(|w| w.year).collect();
        assert_eq!(years, vec![1963, 1968]);
    }
}
