//! Flat, composition-indexed approximate string set.
//!
//! Stored strings are bucketed by how many times each alphabet letter
//! occurs in them. A query can only match a stored string if their
//! per-letter counts are within `max_diff` of each other for every
//! letter in the alphabet — a necessary (not sufficient) condition for
//! Hamming distance `<= max_diff` that is cheap to index and test.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{ALPHABET, StoreError};

/// Per-string record of the half-open `[low, high)` range of counts it was
/// filed under for each alphabet letter, so `remove` can find and erase it
/// from exactly the composition buckets it was placed in at insert time.
type CountRanges = [(usize, usize); ALPHABET.len()];

#[derive(Debug, Clone)]
pub struct SequenceStore {
    max_length: usize,
    index: HashMap<Rc<str>, CountRanges>,
    composition: HashMap<u8, Vec<HashSet<Rc<str>>>>,
}

impl SequenceStore {
    /// `max_length` bounds the length of any sequence ever added; it sizes
    /// the composition buckets up front.
    pub fn new(max_length: usize) -> Self {
        let composition = ALPHABET
            .iter()
            .map(|&letter| (letter, vec![HashSet::new(); max_length + 1]))
            .collect();
        Self {
            max_length,
            index: HashMap::new(),
            composition,
        }
    }

    pub fn from_iter<I, S>(max_length: usize, seqs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = Self::new(max_length);
        for seq in seqs {
            store.add(seq.as_ref(), None);
        }
        store
    }

    fn letter_count(seq: &str, letter: u8) -> usize {
        seq.bytes().filter(|&b| b == letter).count()
    }

    /// Adds `seq` to the store. Idempotent: re-adding an already-stored
    /// sequence is a no-op.
    ///
    /// When `wildcard` is set, `seq` is additionally filed under the
    /// composition buckets for every count between its true letter count
    /// and that count plus however many wildcard characters it contains —
    /// so a later wildcard-aware query that "spends" some of its allowed
    /// mismatches on the wildcard can still find it.
    pub fn add(&mut self, seq: &str, wildcard: Option<u8>) {
        if self.index.contains_key(seq) {
            return;
        }
        let key: Rc<str> = Rc::from(seq);
        let wilds = wildcard.map_or(0, |w| Self::letter_count(seq, w));
        let mut ranges: CountRanges = [(0, 0); ALPHABET.len()];
        for (slot, &letter) in ALPHABET.iter().enumerate() {
            let count = Self::letter_count(seq, letter);
            let high = (count + wilds + 1).min(self.max_length + 1);
            ranges[slot] = (count, high);
            let buckets = self.composition.get_mut(&letter).expect("known letter");
            for bucket in &mut buckets[count..high] {
                bucket.insert(Rc::clone(&key));
            }
        }
        self.index.insert(key, ranges);
    }

    /// Removes `seq` from the store. Fails with [`StoreError::NotFound`]
    /// if it isn't present.
    pub fn remove(&mut self, seq: &str) -> Result<(), StoreError> {
        let Some(ranges) = self.index.get(seq).copied() else {
            return Err(StoreError::NotFound(seq.to_string()));
        };
        for (slot, &letter) in ALPHABET.iter().enumerate() {
            let (low, high) = ranges[slot];
            let buckets = self.composition.get_mut(&letter).expect("known letter");
            for bucket in &mut buckets[low..high] {
                bucket.remove(seq);
            }
        }
        self.index.remove(seq);
        Ok(())
    }

    /// Removes `seq` if present; otherwise does nothing.
    pub fn discard(&mut self, seq: &str) {
        let _ = self.remove(seq);
    }

    pub fn contains(&self, seq: &str) -> bool {
        self.index.contains_key(seq)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<str>> {
        self.index.keys()
    }

    /// Hamming distance between two equal-length strings.
    pub fn diff(a: &str, b: &str) -> usize {
        a.bytes().zip(b.bytes()).filter(|(x, y)| x != y).count()
    }

    fn candidates(&self, query: &str, max_diff: usize, wildcard: Option<u8>) -> HashSet<Rc<str>> {
        let wilds = wildcard.map_or(0, |w| Self::letter_count(query, w));
        let mut candidates = HashSet::new();
        for &letter in &ALPHABET {
            let count = Self::letter_count(query, letter);
            let low = count.saturating_sub(max_diff);
            let high = (count + max_diff + wilds + 1).min(self.max_length + 1);
            if low >= high {
                continue;
            }
            let buckets = self.composition.get(&letter).expect("known letter");
            for bucket in &buckets[low..high] {
                candidates.extend(bucket.iter().cloned());
            }
        }
        candidates
    }

    /// Unordered candidate sequences within `max_diff` of `query`, without
    /// computing or filtering by actual distance. Callers that need to
    /// apply their own filter before ranking (as [`crate::clustering::Clustering`]
    /// does for payload length and gross-difference checks) use this form.
    pub fn search_raw(&self, query: &str, max_diff: usize, wildcard: Option<u8>) -> Vec<Rc<str>> {
        if let Some(key) = self.index.get_key_value(query) {
            return vec![Rc::clone(key.0)];
        }
        self.candidates(query, max_diff, wildcard)
            .into_iter()
            .collect()
    }

    /// Candidates within `max_diff` of `query`, ranked by ascending
    /// Hamming distance and truncated to `max_hits` (all matches if
    /// `None`).
    pub fn search_ranked(
        &self,
        query: &str,
        max_diff: usize,
        max_hits: Option<usize>,
        wildcard: Option<u8>,
    ) -> Vec<(Rc<str>, usize)> {
        if let Some(key) = self.index.get_key_value(query) {
            return vec![(Rc::clone(key.0), 0)];
        }
        let mut hits: Vec<(Rc<str>, usize)> = self
            .candidates(query, max_diff, wildcard)
            .into_iter()
            .map(|cand| {
                let dist = Self::diff(query, &cand);
                (cand, dist)
            })
            .filter(|&(_, dist)| dist <= max_diff)
            .collect();
        hits.sort_by_key(|&(_, dist)| dist);
        if let Some(max_hits) = max_hits {
            hits.truncate(max_hits);
        }
        hits
    }

    /// Best match for `query`, or `None` if nothing is within `max_diff`.
    pub fn find(
        &self,
        query: &str,
        max_diff: usize,
        wildcard: Option<u8>,
    ) -> Option<(Rc<str>, usize)> {
        self.search_ranked(query, max_diff, Some(1), wildcard)
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_contains_works() {
        let mut store = SequenceStore::new(4);
        store.add("ACGT", None);
        store.add("ACGT", None);
        assert_eq!(store.len(), 1);
        assert!(store.contains("ACGT"));
    }

    #[test]
    fn search_exact_returns_distance_zero() {
        let mut store = SequenceStore::new(4);
        store.add("ACGT", None);
        store.add("ACGA", None);
        let hits = store.search_ranked("ACGT", 2, None, None);
        assert_eq!(hits[0], (Rc::from("ACGT"), 0));
    }

    #[test]
    fn search_finds_approximate_matches_within_radius() {
        let mut store = SequenceStore::new(4);
        store.add("AAAA", None);
        store.add("AAAT", None);
        store.add("TTTT", None);
        let hits = store.search_ranked("AAAA", 1, None, None);
        let seqs: HashSet<&str> = hits.iter().map(|(s, _)| s.as_ref()).collect();
        assert!(seqs.contains("AAAA"));
        assert!(seqs.contains("AAAT"));
        assert!(!seqs.contains("TTTT"));
    }

    #[test]
    fn remove_requires_presence() {
        let mut store = SequenceStore::new(4);
        assert!(store.remove("ACGT").is_err());
        store.add("ACGT", None);
        assert!(store.remove("ACGT").is_ok());
        assert!(!store.contains("ACGT"));
        store.discard("ACGT");
    }

    #[test]
    fn wildcard_widens_matchable_range() {
        // "AANN" has 2 wildcard Ns; a store entry with 2 fewer As than the
        // query should still be reachable because the wildcard widens the
        // range it was filed under.
        let mut store = SequenceStore::new(4);
        store.add("AANN", Some(b'N'));
        // "AAAA" differs from "AANN" only by assuming the Ns resolve to A;
        // a max_diff=0 search should still surface it thanks to the wildcard.
        let hits = store.search_ranked("AAAA", 0, None, Some(b'N'));
        assert!(hits.is_empty(), "direct Hamming distance is still computed against the literal stored string");
        let raw = store.search_raw("AAAA", 0, Some(b'N'));
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].as_ref(), "AANN");
    }

    #[test]
    fn diff_counts_mismatches() {
        assert_eq!(SequenceStore::diff("ACGT", "ACGA"), 1);
        assert_eq!(SequenceStore::diff("ACGT", "ACGT"), 0);
    }
}
