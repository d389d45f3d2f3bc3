// best_pair.rs
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::{BestPair, CountryVoteProfile};

/// Number of pairs kept in the `bff` document.
pub const MAX_BEST_PAIRS: usize = 3;

/// Finds countries whose favourite counterpart favours them back.
///
/// Only each profile's rank-1 counterpart is considered. A mutual pair is
/// recorded once, scored as the sum of both rank-1 totals, and the
/// strongest [`MAX_BEST_PAIRS`] are returned. Equal scores keep discovery order.
pub fn best_pairs(profiles: &[CountryVoteProfile]) -> Vec<BestPair> {
    let favourites: HashMap<&str, (&str, u64)> = profiles
        .iter()
        .filter_map(|p| p.favourite().map(|f| (p.country.as_str(), (f.country.as_str(), f.points))))
        .collect();

    let mut pairs: Vec<BestPair> = Vec::new();
    for profile in profiles {
        let country = profile.country.as_str();
        let Some(&(partner, points_to_partner)) = favourites.get(country) else {
            debug!("{} has no votes to compare", country);
            continue;
        };
        if partner == country {
            debug!("{} lists itself as favourite, ignoring", country);
            continue;
        }
        let Some(&(partners_favourite, points_back)) = favourites.get(partner) else {
            continue;
        };
        if partners_favourite != country {
            continue;
        }
        if pairs.iter().any(|p| p.involves(country, partner)) {
            continue;
        }
        pairs.push(BestPair {
            countries: (country.to_string(), partner.to_string()),
            score: points_to_partner + points_back,
        });
    }

    info!("Found {} mutual favourite pairs.", pairs.len());
    pairs.sort_by(|a, b| b.score.cmp(&a.score));
    pairs.truncate(MAX_BEST_PAIRS);
    pairs
}

/// The `bff` document: `{"1": [a, b], "2": [...], ...}` from best to worst.
pub fn best_pairs_document(pairs: &[BestPair]) -> Value {
    let mut doc = Map::new();
    for (rank, pair) in pairs.iter().enumerate() {
        doc.insert(
            (rank + 1).to_string(),
            Value::from(vec![pair.countries.0.clone(), pair.countries.1.clone()]),
        );
    }
    Value::Object(doc)
}
