//! Owns the UID-keyed cluster map and the approximate-UID index that
//! routes each incoming read to a cluster, and drives FASTQ ingest.

use std::collections::HashMap;
use std::io::Write;
use std::time::Instant;

use bio::io::fastq;

use crate::consensus::{Consensus, GROSSLY_DIFFERENT_PREFIX_LEN, GROSSLY_DIFFERENT_TOLERANCE};
use crate::qual_seq::QualSeq;
use crate::store::{GroupedSequenceStore, SequenceStore};

/// Aggregate counters maintained across a whole ingest run, each pair
/// indexed `[short, long]` when `read_length` is known (see
/// [`IngestStats::read_length`]); without it, every read is bucketed
/// into the `long` slot.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct IngestStats {
    pub read_length: Option<usize>,
    pub total_skipped: [usize; 2],
    pub total_merged: [usize; 2],
    pub total_fixed: [usize; 2],
    pub single_count: [usize; 2],
}

fn is_long_index(payload_len: usize, read_length: Option<usize>, id_length: usize, adapter_len: usize) -> usize {
    let max_short = read_length
        .map(|rl| rl.saturating_sub(id_length + adapter_len))
        .unwrap_or(0);
    usize::from(payload_len > max_short)
}

/// Slices the UID and payload out of one FASTQ record's sequence or
/// quality bytes, given the UID length and the combined UID+adapter
/// length on each end. Returns `None` if the bytes are too short to
/// contain both flanks.
fn split_uid_and_payload(bytes: &[u8], id_length: usize, adapt_length: usize) -> Option<(Vec<u8>, Vec<u8>)> {
    let len = bytes.len();
    if len < 2 * adapt_length {
        return None;
    }
    let mut name_id = Vec::with_capacity(id_length * 2);
    name_id.extend_from_slice(&bytes[..id_length]);
    name_id.extend_from_slice(&bytes[len - id_length..]);
    let payload = bytes[adapt_length..len - adapt_length].to_vec();
    Some((name_id, payload))
}

// MARK: Clustering
pub struct Clustering {
    centres: HashMap<String, Consensus>,
    store: GroupedSequenceStore,
    /// Memoised near-match resolutions from the approximate-UID index,
    /// keyed by the UID that was resolved. Ingest-time bookkeeping only;
    /// not required to reconstruct the cluster map.
    id_map: HashMap<String, String>,
    stats: IngestStats,
}

impl Clustering {
    pub fn new(store: GroupedSequenceStore, read_length: Option<usize>) -> Self {
        Self {
            centres: HashMap::new(),
            store,
            id_map: HashMap::new(),
            stats: IngestStats {
                read_length,
                ..Default::default()
            },
        }
    }

    pub fn centres(&self) -> &HashMap<String, Consensus> {
        &self.centres
    }

    pub fn store(&self) -> &GroupedSequenceStore {
        &self.store
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn id_map(&self) -> &HashMap<String, String> {
        &self.id_map
    }

    pub fn len(&self) -> usize {
        self.centres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centres.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&Consensus> {
        self.centres.get(uid)
    }

    /// Mutable access for the small-cluster merge pass and tests, which
    /// both need to grow a centre's size outside of normal ingest.
    pub(crate) fn centres_mut(&mut self) -> &mut HashMap<String, Consensus> {
        &mut self.centres
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.centres.contains_key(uid)
    }

    /// Sequences that could not be routed through the shard index because
    /// their UID contains the wildcard letter — each necessarily opened
    /// its own singleton cluster.
    pub fn fail_count(&self) -> usize {
        self.store.wild_tags().len()
    }

    pub fn cluster_fails(&self) -> HashMap<String, &Consensus> {
        self.store
            .wild_tags()
            .iter()
            .filter_map(|uid| self.centres.get(uid.as_ref()).map(|c| (uid.to_string(), c)))
            .collect()
    }

    /// Registers a brand-new cluster centre.
    pub fn add(&mut self, uid: QualSeq, payload: QualSeq) {
        let name_id = String::from_utf8(uid.seq().to_vec()).expect("UID bytes are ASCII");
        self.store.add(&name_id);
        self.centres.insert(name_id, Consensus::new(uid, payload));
    }

    /// Finds the best existing cluster centre for `uid`/`read`, or opens a
    /// new one. Queries the store for raw candidates, keeps only those
    /// whose payload length matches and isn't grossly different from
    /// `read`, then picks the one with minimum UID Hamming distance
    /// within `threshold`. A resolved match is memoised in `id_map` so
    /// later reads with the same corrupted UID skip straight to it.
    fn merge_target(&mut self, uid: &QualSeq, read: &QualSeq, threshold: usize) -> Option<String> {
        let name_id = String::from_utf8(uid.seq().to_vec()).expect("UID bytes are ASCII");
        let raw_candidates = self.store.search_raw(&name_id);

        let mut candidates: Vec<(String, usize)> = raw_candidates
            .into_iter()
            .filter(|cand| self.centres[cand].payload().len() == read.len())
            .filter(|cand| {
                !self.centres[cand]
                    .payload()
                    .grossly_different(read, GROSSLY_DIFFERENT_PREFIX_LEN, GROSSLY_DIFFERENT_TOLERANCE)
                    .unwrap_or(false)
            })
            .map(|cand| {
                let dist = SequenceStore::diff(&name_id, &cand);
                (cand, dist)
            })
            .filter(|&(_, dist)| dist <= threshold)
            .collect();
        candidates.sort_by_key(|&(_, dist)| dist);

        let similar = candidates.into_iter().next().map(|(cand, _)| cand);
        match &similar {
            None => self.add(uid.clone(), read.clone()),
            Some(sim) => {
                self.id_map.insert(name_id, sim.clone());
            }
        }
        similar
    }

    /// Routes one (UID, payload) pair to a cluster: a memoised near
    /// match, an exact cluster-key hit, a freshly resolved near match, or
    /// a new singleton. Updates `stats` to match.
    fn ingest_record(&mut self, uid: QualSeq, read: QualSeq, name_id: &str, threshold: usize, is_long: usize) {
        let mut id_matched = false;
        let similar = if let Some(sim) = self.id_map.get(name_id) {
            self.stats.total_fixed[is_long] += 1;
            Some(sim.clone())
        } else if self.centres.contains_key(name_id) {
            id_matched = true;
            Some(name_id.to_string())
        } else {
            let sim = self.merge_target(&uid, &read, threshold);
            if sim.is_some() {
                self.stats.total_fixed[is_long] += 1;
            }
            sim
        };

        match similar {
            Some(key) => {
                let success = self
                    .centres
                    .get_mut(&key)
                    .expect("resolved cluster key always exists")
                    .update(&uid, &read, 1, None, true);
                if success {
                    if !id_matched {
                        self.stats.total_merged[is_long] += 1;
                    }
                    if self.centres[&key].size() == 2 {
                        self.stats.single_count[is_long] -= 1;
                    }
                } else {
                    self.stats.total_skipped[is_long] += 1;
                }
            }
            None => {
                self.stats.single_count[is_long] += 1;
            }
        }
    }

    fn log_progress(&self, record_count: usize, start: Instant, batch_start: &mut Instant) {
        let now = Instant::now();
        let total = now.duration_since(start);
        let batch = now.duration_since(*batch_start);
        *batch_start = now;

        let singles: usize = self.stats.single_count.iter().sum();
        let clusters = self.centres.len().max(1);
        log::debug!(
            "reads: {}, clusters: {}, singletons: {} ({:.1}%), corrupted UIDs: {} ({:.2}%)",
            record_count,
            self.centres.len(),
            singles,
            singles as f64 / clusters as f64 * 100.0,
            self.fail_count(),
            self.fail_count() as f64 / record_count.max(1) as f64 * 100.0,
        );
        if self.stats.read_length.is_some() {
            log::debug!(
                "singletons (short/long): {} {}",
                self.stats.single_count[0],
                self.stats.single_count[1]
            );
        }

        let total_fixed: usize = self.stats.total_fixed.iter().sum();
        let total_merged: usize = self.stats.total_merged.iter().sum();
        let total_skipped: usize = self.stats.total_skipped.iter().sum();
        log::debug!(
            "similar UIDs: {} ({:.1}%), UIDs merged: {} ({:.1}%), merge failures: {} ({:.1}%)",
            total_fixed,
            total_fixed as f64 / record_count.max(1) as f64 * 100.0,
            total_merged,
            total_merged as f64 / record_count.max(1) as f64 * 100.0,
            total_skipped,
            total_skipped as f64 / record_count.max(1) as f64 * 100.0,
        );
        if self.stats.read_length.is_some() {
            log::debug!(
                "similar UIDs (short/long): {} {}",
                self.stats.total_fixed[0],
                self.stats.total_fixed[1]
            );
            log::debug!(
                "merged UIDs (short/long): {} {}",
                self.stats.total_merged[0],
                self.stats.total_merged[1]
            );
            log::debug!(
                "merge failures (short/long): {} {}",
                self.stats.total_skipped[0],
                self.stats.total_skipped[1]
            );
        }
        log::debug!(
            "total time: {:.1?}, increment: {:.1?}, rate: {:.1} reads/s",
            total,
            batch,
            record_count as f64 / total.as_secs_f64().max(f64::EPSILON),
        );
    }

    /// Streams a FASTQ input record by record, extracting the UID and
    /// payload from each by fixed offsets and folding the read into a
    /// cluster. A malformed record, a sequence/quality length mismatch,
    /// or a record too short for `id_length`/`adapter` is logged at
    /// ERROR and skipped rather than aborting the run.
    pub fn from_fastq<R: std::io::Read>(
        reader: R,
        id_length: usize,
        adapter: &str,
        threshold: usize,
        prefix: usize,
        read_length: Option<usize>,
    ) -> Self {
        let adapt_length = id_length + adapter.len();
        let store = GroupedSequenceStore::new(id_length * 2, prefix, threshold, Some(b'N'));
        let mut clustering = Self::new(store, read_length);

        let start = Instant::now();
        let mut batch_start = start;
        let mut record_count = 0usize;

        for (record_no, result) in fastq::Reader::new(reader).records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    log::warn!("malformed FASTQ record #{}: {}", record_no, err);
                    continue;
                }
            };
            if record.seq().len() != record.qual().len() {
                log::error!("record #{}: sequence/quality length mismatch; skipping", record_no);
                continue;
            }

            let seq_split = split_uid_and_payload(record.seq(), id_length, adapt_length);
            let qual_split = split_uid_and_payload(record.qual(), id_length, adapt_length);
            let (Some((name_id_bytes, payload_seq)), Some((qname_id_bytes, payload_qual))) = (seq_split, qual_split)
            else {
                log::error!(
                    "record #{} is too short for the configured id-length/adapter",
                    record_no
                );
                continue;
            };

            let (Ok(uid), Ok(read)) = (
                QualSeq::new(&name_id_bytes, &qname_id_bytes, None),
                QualSeq::new(&payload_seq, &payload_qual, None),
            ) else {
                log::error!("record #{}: UID/payload slices disagree in length; skipping", record_no);
                continue;
            };

            let name_id = String::from_utf8_lossy(&name_id_bytes).into_owned();
            let is_long = is_long_index(payload_seq.len(), read_length, id_length, adapter.len());
            clustering.ingest_record(uid, read, &name_id, threshold, is_long);

            record_count += 1;
            if log::log_enabled!(log::Level::Debug) && record_count % 10_000 == 0 {
                clustering.log_progress(record_count, start, &mut batch_start);
            }
        }
        clustering
    }

    /// Emits every cluster's FASTQ serialisation. No ordering is required.
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for consensus in self.centres.values() {
            writer.write_all(consensus.to_fastq_record().as_bytes())?;
        }
        Ok(())
    }
}
