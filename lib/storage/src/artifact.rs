//! Report Merge Store
//!
//! Every report is a JSON object with an `analysis_id`, an array of entries
//! keyed by candidate id, and any number of other top-level fields. Runs only
//! ever append entries whose key is not yet present, so re-running on the
//! same candidates is a no-op and re-running on a superset adds just the new
//! ones. Summaries are rebuilt from the full entry list on every persist.

use crate::context::{read_json, write_json_atomic};
use ahash::AHashSet;
use fairrank_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

pub const ANALYSIS_ID_FIELD: &str = "analysis_id";
pub const SUMMARY_FIELD: &str = "summary";

/// One keyed entry of a merged report
pub trait ReportEntry: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Prefix of generated analysis ids
    const KIND: &'static str;
    /// Top-level field holding the entry array
    const ENTRIES_KEY: &'static str;

    fn key(&self) -> &str;

    /// Name used in "already exists" logs
    fn label(&self) -> &str {
        self.key()
    }

    /// Fixed fields written when a report is first created
    fn preamble() -> Map<String, Value> {
        Map::new()
    }

    /// Aggregate over all entries, stored under `summary`
    fn summarize(_entries: &[Self]) -> Option<Value> {
        None
    }
}

pub fn new_analysis_id(kind: &str) -> String {
    format!("{kind}_{}", Uuid::new_v4())
}

/// Counts from one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ReportArtifact<E: ReportEntry> {
    analysis_id: String,
    entries: Vec<E>,
    /// Top-level fields other than the id and entries, kept verbatim
    extra: Map<String, Value>,
}

impl<E: ReportEntry> Default for ReportArtifact<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ReportEntry> ReportArtifact<E> {
    /// Empty report with a fresh `analysis_id`
    pub fn new() -> Self {
        Self {
            analysis_id: new_analysis_id(E::KIND),
            entries: Vec::new(),
            extra: E::preamble(),
        }
    }

    /// Rebuild from a persisted document.
    ///
    /// A missing `analysis_id` is backfilled. Duplicate keys already on disk
    /// keep their first occurrence.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::Storage(format!("{} report is not a JSON object", E::KIND)));
        };

        let analysis_id = match map.remove(ANALYSIS_ID_FIELD) {
            Some(Value::String(id)) => id,
            _ => {
                let id = new_analysis_id(E::KIND);
                info!(analysis_id = %id, "Backfilled missing analysis_id for legacy {} report", E::KIND);
                id
            }
        };

        // Rebuilt on persist
        map.remove(SUMMARY_FIELD);

        let raw_entries = match map.remove(E::ENTRIES_KEY) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(Error::Storage(format!(
                    "'{}' in {} report is not an array",
                    E::ENTRIES_KEY,
                    E::KIND
                )))
            }
        };

        let mut seen = AHashSet::with_capacity(raw_entries.len());
        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw in raw_entries {
            let entry: E = serde_json::from_value(raw)?;
            if seen.insert(entry.key().to_string()) {
                entries.push(entry);
            } else {
                warn!(key = entry.key(), "Dropping duplicate {} entry", E::KIND);
            }
        }

        Ok(Self {
            analysis_id,
            entries,
            extra: map,
        })
    }

    /// Load `path`, or start a new report if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match read_json::<Value>(path)? {
            Some(value) => Self::from_value(value),
            None => Ok(Self::new()),
        }
    }

    /// Append entries whose key is not present yet
    pub fn merge<I: IntoIterator<Item = E>>(&mut self, new_entries: I) -> MergeOutcome {
        let mut keys: AHashSet<String> = self.entries.iter().map(|e| e.key().to_string()).collect();
        let mut outcome = MergeOutcome::default();

        for entry in new_entries {
            if keys.contains(entry.key()) {
                info!("{} entry for {} already exists, skipping", E::KIND, entry.label());
                outcome.skipped += 1;
                continue;
            }
            keys.insert(entry.key().to_string());
            self.entries.push(entry);
            outcome.added += 1;
        }
        outcome
    }

    pub fn to_value(&self) -> Result<Value> {
        let mut extra: Vec<(&String, &Value)> = self.extra.iter().collect();
        extra.sort_by(|a, b| a.0.cmp(b.0));

        let mut map = Map::new();
        for (k, v) in extra {
            map.insert(k.clone(), v.clone());
        }
        map.insert(ANALYSIS_ID_FIELD.to_string(), Value::String(self.analysis_id.clone()));
        map.insert(E::ENTRIES_KEY.to_string(), serde_json::to_value(&self.entries)?);
        if let Some(summary) = E::summarize(&self.entries) {
            map.insert(SUMMARY_FIELD.to_string(), summary);
        }
        Ok(Value::Object(map))
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, &self.to_value()?)
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key() == key)
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// Load `path` (or start fresh), merge `new_entries`, persist, and return the result
pub fn merge_and_persist<E, I>(path: &Path, new_entries: I) -> Result<(ReportArtifact<E>, MergeOutcome)>
where
    E: ReportEntry,
    I: IntoIterator<Item = E>,
{
    let mut artifact = ReportArtifact::<E>::load(path)?;
    let outcome = artifact.merge(new_entries);
    artifact.persist(path)?;
    info!(
        added = outcome.added,
        skipped = outcome.skipped,
        total = artifact.len(),
        "Saved {} report to {}",
        E::KIND,
        path.display()
    );
    Ok((artifact, outcome))
}
