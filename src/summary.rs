//! A JSON report of one ingest run, written alongside the consensus FASTQ
//! output.

use chrono::{DateTime, Local};
use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};

use crate::clustering::{Clustering, IngestStats};

#[derive(Debug, Clone, Serialize, Deserialize, Getters, Setters)]
pub struct RunSummary {
    #[getset(get = "pub", set = "pub")]
    process_start_time: DateTime<Local>,
    #[getset(get = "pub", set = "pub")]
    process_end_time: DateTime<Local>,
    #[getset(get = "pub", set = "pub")]
    current_version: String,
    #[getset(get = "pub", set = "pub")]
    input_path: String,
    #[getset(get = "pub", set = "pub")]
    clusters: usize,
    #[getset(get = "pub", set = "pub")]
    corrupted_uids: usize,
    #[getset(get = "pub", set = "pub")]
    merge_pass_applied: bool,
    #[getset(get = "pub", set = "pub")]
    clusters_after_merge: Option<usize>,
    #[getset(get = "pub", set = "pub")]
    stats: IngestStats,
}

impl RunSummary {
    pub fn new(process_start_time: DateTime<Local>, input_path: String) -> Self {
        Self {
            process_start_time,
            process_end_time: process_start_time,
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            input_path,
            clusters: 0,
            corrupted_uids: 0,
            merge_pass_applied: false,
            clusters_after_merge: None,
            stats: IngestStats::default(),
        }
    }

    pub fn from_clustering(mut self, clustering: &Clustering) -> Self {
        self.clusters = clustering.len();
        self.corrupted_uids = clustering.fail_count();
        self.stats = clustering.stats().clone();
        self
    }

    pub fn finish(mut self) -> Self {
        self.process_end_time = Local::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Local);
        let summary = RunSummary::new(now, "reads.fastq".to_string());
        let json = serde_json::to_string_pretty(&summary).unwrap();
        let restored: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.input_path(), "reads.fastq");
        assert_eq!(restored.current_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn from_clustering_copies_top_level_counters() {
        use crate::store::GroupedSequenceStore;

        let store = GroupedSequenceStore::new(8, 2, 1, Some(b'N'));
        let clustering = Clustering::new(store, None);
        let now = Local::now();
        let summary = RunSummary::new(now, "reads.fastq".to_string()).from_clustering(&clustering);
        assert_eq!(summary.clusters(), &0);
        assert_eq!(summary.corrupted_uids(), &0);
    }
}
