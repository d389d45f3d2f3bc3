// store.rs
//! Aggregate store abstraction. Documents are JSON objects upserted under
//! their collection's natural key. A pipeline run replaces each collection
//! wholesale, so documents from an earlier run never outlive it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Key of single-document collections.
pub const CURRENT_KEY: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    WinnersSongsCatalog,
    WinnerByYear,
    SongsStatistic,
    AllPointsGivenFrom,
    AllPointsGivenTo,
    PointsByYearGivenFrom,
    PointsByYearGivenTo,
    Bff,
    CountryFlag,
    WinnersByCountry,
    WinnersByLanguage,
    AllWinnersByLocation,
    WinnerSongsPerformNumber,
}

impl Collection {
    pub const ALL: [Collection; 13] = [
        Collection::WinnersSongsCatalog,
        Collection::WinnerByYear,
        Collection::SongsStatistic,
        Collection::AllPointsGivenFrom,
        Collection::AllPointsGivenTo,
        Collection::PointsByYearGivenFrom,
        Collection::PointsByYearGivenTo,
        Collection::Bff,
        Collection::CountryFlag,
        Collection::WinnersByCountry,
        Collection::WinnersByLanguage,
        Collection::AllWinnersByLocation,
        Collection::WinnerSongsPerformNumber,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::WinnersSongsCatalog => "winners_songs_catalog",
            Collection::WinnerByYear => "winner_by_year",
            Collection::SongsStatistic => "songs_statistic",
            Collection::AllPointsGivenFrom => "all_points_given_from",
            Collection::AllPointsGivenTo => "all_points_given_to",
            Collection::PointsByYearGivenFrom => "points_by_year_given_from",
            Collection::PointsByYearGivenTo => "points_by_year_given_to",
            Collection::Bff => "bff",
            Collection::CountryFlag => "country_flag",
            Collection::WinnersByCountry => "winners_by_country",
            Collection::WinnersByLanguage => "winners_by_language",
            Collection::AllWinnersByLocation => "all_winners_by_location",
            Collection::WinnerSongsPerformNumber => "winner_songs_perform_number",
        }
    }

    /// Natural key of a document in this collection.
    pub fn natural_key(self, doc: &Value) -> Result<String, StoreError> {
        let field = |name: &'static str| -> Result<String, StoreError> {
            match doc.get(name) {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(StoreError::MissingNaturalKey { collection: self.name(), field: name }),
            }
        };
        match self {
            Collection::WinnersSongsCatalog => field("catalog_id"),
            Collection::WinnerByYear => field("year"),
            Collection::SongsStatistic | Collection::Bff => Ok(CURRENT_KEY.to_string()),
            Collection::AllPointsGivenFrom
            | Collection::AllPointsGivenTo
            | Collection::CountryFlag
            | Collection::WinnersByCountry => field("country"),
            Collection::PointsByYearGivenFrom | Collection::PointsByYearGivenTo => {
                Ok(format!("{}:{}", field("country")?, field("year")?))
            }
            Collection::WinnersByLanguage => field("language"),
            Collection::AllWinnersByLocation => field("location"),
            Collection::WinnerSongsPerformNumber => field("song"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("documents for '{collection}' must be an object or an array of objects, got {found}")]
    InvalidDocumentShape { collection: &'static str, found: &'static str },
    #[error("document for '{collection}' has no usable '{field}' key")]
    MissingNaturalKey { collection: &'static str, field: &'static str },
    #[error("store backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Identifies the run that wrote a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunStamp {
    pub fn new() -> Self {
        RunStamp { run_id: Uuid::new_v4(), started_at: Utc::now() }
    }
}

impl Default for RunStamp {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub run_id: Uuid,
    pub written_at: DateTime<Utc>,
    pub body: Value,
}

/// Splits a write payload into documents with their natural keys. Fails on
/// anything other than an object or an array of objects.
pub fn keyed_documents(
    collection: Collection,
    documents: Value,
) -> Result<Vec<(String, Value)>, StoreError> {
    let docs = match documents {
        Value::Object(_) => vec![documents],
        Value::Array(items) => items,
        other => {
            return Err(StoreError::InvalidDocumentShape {
                collection: collection.name(),
                found: json_kind(&other),
            })
        }
    };
    docs.into_iter()
        .map(|doc| {
            if !doc.is_object() {
                return Err(StoreError::InvalidDocumentShape {
                    collection: collection.name(),
                    found: json_kind(&doc),
                });
            }
            Ok((collection.natural_key(&doc)?, doc))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Upserts one document or an array of documents; returns how many were written.
    async fn write(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
    ) -> Result<usize, StoreError>;

    /// Upserts the run's documents and removes every document of the
    /// collection that another run wrote. An empty array clears the collection.
    async fn replace(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
    ) -> Result<usize, StoreError>;

    /// All documents of a collection in key order.
    async fn read_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError>;

    async fn read_one(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, StoreError>;
}

/// In-process store used for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<StoredDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Collection, Vec<StoredDocument>>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("memory store lock poisoned")))
    }

    fn upsert(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
        prune: bool,
    ) -> Result<usize, StoreError> {
        let keyed = keyed_documents(collection, documents)?;
        let written = keyed.len();
        let now = Utc::now();
        let mut collections = self.lock()?;
        let stored = collections.entry(collection).or_default();
        for (key, body) in keyed {
            let doc = StoredDocument { key, run_id: run.run_id, written_at: now, body };
            match stored.iter_mut().find(|d| d.key == doc.key) {
                Some(existing) => *existing = doc,
                None => stored.push(doc),
            }
        }
        if prune {
            let before = stored.len();
            stored.retain(|d| d.run_id == run.run_id);
            debug!("Removed {} stale documents from {}", before - stored.len(), collection.name());
        }
        stored.sort_by(|a, b| a.key.cmp(&b.key));
        info!("Upserted {} documents into {}", written, collection.name());
        Ok(written)
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn write(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
    ) -> Result<usize, StoreError> {
        self.upsert(run, collection, documents, false)
    }

    async fn replace(
        &self,
        run: &RunStamp,
        collection: Collection,
        documents: Value,
    ) -> Result<usize, StoreError> {
        self.upsert(run, collection, documents, true)
    }

    async fn read_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.lock()?.get(&collection).cloned().unwrap_or_default())
    }

    async fn read_one(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .lock()?
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| d.key == key).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn natural_keys_per_collection() {
        let yearly = json!({"country": "Malta", "year": 2005, "voted": []});
        assert_eq!(
            Collection::PointsByYearGivenFrom.natural_key(&yearly).unwrap(),
            "Malta:2005"
        );
        assert_eq!(Collection::Bff.natural_key(&json!({})).unwrap(), CURRENT_KEY);
        assert_eq!(
            Collection::WinnerSongsPerformNumber
                .natural_key(&json!({"song": "Waterloo", "position": 8}))
                .unwrap(),
            "Waterloo"
        );
        assert!(matches!(
            Collection::WinnersSongsCatalog.natural_key(&json!({"name": "Waterloo"})),
            Err(StoreError::MissingNaturalKey { field: "catalog_id", .. })
        ));
    }

    #[test]
    fn rejects_documents_that_are_not_objects() {
        let err = keyed_documents(Collection::CountryFlag, json!("Sweden")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocumentShape { found: "a string", .. }));

        let err = keyed_documents(Collection::CountryFlag, json!([{"country": "Sweden"}, 3]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocumentShape { found: "a number", .. }));
    }

    #[test]
    fn upserts_by_natural_key() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let first = RunStamp::new();
            let second = RunStamp::new();
            store
                .write(&first, Collection::CountryFlag, json!([
                    {"country": "Sweden", "url": "a"},
                    {"country": "Norway", "url": "b"},
                ]))
                .await
                .unwrap();
            store
                .write(&second, Collection::CountryFlag, json!({"country": "Sweden", "url": "c"}))
                .await
                .unwrap();

            let all = store.read_all(Collection::CountryFlag).await.unwrap();
            assert_eq!(all.len(), 2);
            let sweden = store.read_one(Collection::CountryFlag, "Sweden").await.unwrap().unwrap();
            assert_eq!(sweden.body["url"], "c");
            assert_eq!(sweden.run_id, second.run_id);
            assert!(store.read_one(Collection::Bff, CURRENT_KEY).await.unwrap().is_none());
        });
    }

    #[test]
    fn replace_drops_documents_of_earlier_runs() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let first = RunStamp::new();
            let second = RunStamp::new();
            store
                .replace(&first, Collection::WinnerByYear, json!([{"year": 1974}, {"year": 1965}]))
                .await
                .unwrap();
            let written = store
                .replace(&second, Collection::WinnerByYear, json!([{"year": 1965}]))
                .await
                .unwrap();
            assert_eq!(written, 1);

            let all = store.read_all(Collection::WinnerByYear).await.unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0].key, "1965");
            assert_eq!(all[0].run_id, second.run_id);

            store.replace(&RunStamp::new(), Collection::WinnerByYear, json!([])).await.unwrap();
            assert!(store.read_all(Collection::WinnerByYear).await.unwrap().is_empty());
        });
    }

    #[test]
    fn invalid_write_leaves_collection_untouched() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let run = RunStamp::new();
            let result = store.write(&run, Collection::SongsStatistic, json!(42)).await;
            assert!(matches!(result, Err(StoreError::InvalidDocumentShape { .. })));
            assert!(store.read_all(Collection::SongsStatistic).await.unwrap().is_empty());
        });
    }
}
