//! Prefix-sharded wrapper over [`SequenceStore`] that bounds candidate-set
//! size for large inputs and routes UIDs containing a wildcard letter
//! around the sharding scheme entirely.

use std::collections::HashMap;

use itertools::Itertools;

use super::{ALPHABET, SequenceStore, StoreError};

#[derive(Debug, Clone)]
pub struct GroupedSequenceStore {
    tag_size: usize,
    max_diff: usize,
    wildcard: Option<u8>,
    stores: HashMap<String, SequenceStore>,
    tag_diff: HashMap<String, HashMap<String, usize>>,
    wild_store: SequenceStore,
    length: usize,
}

impl GroupedSequenceStore {
    /// `max_length` is the length of a *full* stored string (prefix +
    /// suffix). `tag_size` is the prefix length used for sharding;
    /// `max_diff` bounds both the prefix-to-prefix distance used to pick
    /// neighbour shards and the total Hamming distance a search accepts.
    pub fn new(max_length: usize, tag_size: usize, max_diff: usize, wildcard: Option<u8>) -> Self {
        let prefixes: Vec<String> = std::iter::repeat_n(ALPHABET.iter(), tag_size)
            .multi_cartesian_product()
            .map(|combo| combo.into_iter().map(|&b| b as char).collect())
            .collect();

        let stores = prefixes
            .iter()
            .map(|p| (p.clone(), SequenceStore::new(max_length - tag_size)))
            .collect();

        let tag_diff = prefixes
            .iter()
            .map(|tag| {
                let neighbours = prefixes
                    .iter()
                    .filter_map(|other| {
                        let d = SequenceStore::diff(tag, other);
                        (d <= max_diff).then(|| (other.clone(), d))
                    })
                    .collect();
                (tag.clone(), neighbours)
            })
            .collect();

        Self {
            tag_size,
            max_diff,
            wildcard,
            stores,
            tag_diff,
            wild_store: SequenceStore::new(max_length),
            length: 0,
        }
    }

    pub fn from_iter<I, S>(
        max_length: usize,
        tag_size: usize,
        max_diff: usize,
        wildcard: Option<u8>,
        seqs: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = Self::new(max_length, tag_size, max_diff, wildcard);
        for seq in seqs {
            store.add(seq.as_ref());
        }
        store
    }

    fn prefix_has_wildcard(&self, prefix: &str) -> bool {
        self.wildcard
            .is_some_and(|w| prefix.bytes().any(|b| b == w))
    }

    pub fn add(&mut self, seq: &str) {
        if self.contains(seq) {
            return;
        }
        let prefix = &seq[..self.tag_size];
        if self.prefix_has_wildcard(prefix) {
            self.wild_store.add(seq, None);
        } else {
            self.stores
                .get_mut(prefix)
                .expect("prefix drawn from the known alphabet")
                .add(&seq[self.tag_size..], self.wildcard);
        }
        self.length += 1;
    }

    pub fn remove(&mut self, seq: &str) -> Result<(), StoreError> {
        let prefix = &seq[..self.tag_size];
        if self.prefix_has_wildcard(prefix) {
            self.wild_store.remove(seq)?;
        } else {
            self.stores
                .get_mut(prefix)
                .expect("prefix drawn from the known alphabet")
                .remove(&seq[self.tag_size..])?;
        }
        self.length -= 1;
        Ok(())
    }

    pub fn discard(&mut self, seq: &str) {
        let _ = self.remove(seq);
    }

    pub fn contains(&self, seq: &str) -> bool {
        let prefix = &seq[..self.tag_size];
        if self.prefix_has_wildcard(prefix) {
            self.wild_store.contains(seq)
        } else {
            self.stores[prefix].contains(&seq[self.tag_size..])
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Sequences filed away in `wild_store` because their prefix contains
    /// the wildcard letter and so could not be routed to a single shard.
    pub fn wild_tags(&self) -> &SequenceStore {
        &self.wild_store
    }

    /// Unordered candidates within the store's configured `max_diff` of
    /// `query`. A wildcard-prefixed query only ever matches itself
    /// exactly, since it could belong to any shard and the shard-skip
    /// optimisation this store relies on would be unsound for it.
    pub fn search_raw(&self, query: &str) -> Vec<String> {
        let prefix = &query[..self.tag_size];
        if self.prefix_has_wildcard(prefix) {
            return if self.wild_store.contains(query) {
                vec![query.to_string()]
            } else {
                Vec::new()
            };
        }
        let suffix = &query[self.tag_size..];
        if self.stores[prefix].contains(suffix) {
            return vec![query.to_string()];
        }
        let mut candidates = Vec::new();
        for (other_prefix, &tag_diff) in &self.tag_diff[prefix] {
            let sub = self.stores[other_prefix].search_raw(
                suffix,
                self.max_diff - tag_diff,
                self.wildcard,
            );
            candidates.extend(sub.into_iter().map(|s| format!("{other_prefix}{s}")));
        }
        candidates
    }

    /// Candidates within `max_diff` of `query`, ranked by ascending total
    /// Hamming distance (prefix distance + suffix distance) and truncated
    /// to `max_hits`.
    pub fn search_ranked(&self, query: &str, max_hits: Option<usize>) -> Vec<(String, usize)> {
        let prefix = &query[..self.tag_size];
        if self.prefix_has_wildcard(prefix) {
            return if self.wild_store.contains(query) {
                vec![(query.to_string(), 0)]
            } else {
                Vec::new()
            };
        }
        let suffix = &query[self.tag_size..];
        if self.stores[prefix].contains(suffix) {
            return vec![(query.to_string(), 0)];
        }
        let mut hits = Vec::new();
        for (other_prefix, &tag_diff) in &self.tag_diff[prefix] {
            let sub = self.stores[other_prefix].search_ranked(
                suffix,
                self.max_diff - tag_diff,
                max_hits,
                self.wildcard,
            );
            hits.extend(
                sub.into_iter()
                    .map(|(s, dist)| (format!("{other_prefix}{s}"), dist + tag_diff)),
            );
        }
        hits.sort_by_key(|&(_, dist)| dist);
        if let Some(max_hits) = max_hits {
            hits.truncate(max_hits);
        }
        hits
    }

    /// Best match for `query`, or `None` if nothing is within `max_diff`.
    pub fn find(&self, query: &str) -> Option<(String, usize)> {
        self.search_ranked(query, Some(1))
            .into_iter()
            .find(|&(_, dist)| dist <= self.max_diff)
    }
}
