// Completed-match summaries and the in-memory log archive.
//
// The archive is the source of truth while the service runs; `db` persists
// a copy of it under a single storage key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::events::DecisionReason;

/// Key of the persistent slot holding the serialized archive.
pub const STORAGE_KEY: &str = "kumite.match_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub ao: u32,
    pub aka: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Summary of one decided bout. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLogEntry {
    pub id: String,
    pub filename: String,
    pub timestamp_range: TimestampRange,
    pub division: String,
    pub referee_name: String,
    pub winner: String,
    pub loser: String,
    pub reason: DecisionReason,
    pub event_lines: Vec<String>,
    pub final_score: FinalScore,
}

/// Append-only collection of match logs, most recent first.
#[derive(Debug, Clone, Default)]
pub struct LogArchive {
    entries: Vec<MatchLogEntry>,
}

impl LogArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<MatchLogEntry>) -> Self {
        Self { entries }
    }

    pub fn read_all(&self) -> &[MatchLogEntry] {
        &self.entries
    }

    pub fn write_all(&mut self, entries: Vec<MatchLogEntry>) {
        self.entries = entries;
    }

    /// Prepend a new entry so the newest comes first.
    pub fn append_one(&mut self, entry: MatchLogEntry) {
        self.entries.insert(0, entry);
    }

    pub fn get(&self, id: &str) -> Option<&MatchLogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a filesystem-friendly document name, e.g. `male-u21_tanaka_vs_sato_20261015_143000.pdf`.
pub fn log_filename(division: &str, ao: &str, aka: &str, at: DateTime<Utc>) -> String {
    let parts = [slug(division), slug(ao), "vs".to_string(), slug(aka)];
    let stem = parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("_");
    format!("{stem}_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}

fn slug(raw: &str) -> String {
    let mut out = String::new();
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
