//! Approximate string sets used to find UID neighbours within a Hamming
//! radius without scanning every stored tag.
//!
//! Two variants are exposed behind the same shape of contract
//! (`add`/`remove`/`discard`/`contains`/`search_raw`/`search_ranked`):
//! [`sequence_store::SequenceStore`] is the flat, composition-indexed
//! implementation; [`grouped_sequence_store::GroupedSequenceStore`] shards
//! a collection of those by a fixed-length prefix to bound candidate-set
//! size on large inputs.

pub mod grouped_sequence_store;
pub mod sequence_store;

pub use grouped_sequence_store::GroupedSequenceStore;
pub use sequence_store::SequenceStore;

use thiserror::Error;

// MARK: StoreError
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("sequence not found in store: {0}")]
    NotFound(String),
}

/// The four-letter alphabet composition indexing is built over. `N` is
/// handled separately as the wildcard and never occupies a composition
/// slot of its own (matching the source: the wildcard widens the *other*
/// letters' count ranges instead of being counted itself).
pub const ALPHABET: [u8; 4] = *b"ACGT";
