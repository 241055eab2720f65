//! A nucleotide sequence paired with its per-base quality scores.
//!
//! `QualSeq` is the unit both UIDs and payload reads are represented as
//! throughout the clustering engine: a byte string and an equal-length
//! ASCII Phred+33 quality string that travel together.

use thiserror::Error;

// MARK: QualSeqError
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QualSeqError {
    #[error("sequence length {seq_len} does not match quality length {qual_len}")]
    LengthMismatch { seq_len: usize, qual_len: usize },
    #[error("sequence of length {len} is shorter than the required prefix of {prefix_len}")]
    ShortSequence { len: usize, prefix_len: usize },
}

// MARK: QualSeq
/// A sequence and its quality scores.
///
/// `seq` and `qual` always have the same length; any attempt to replace
/// one with a value of a different length is rejected with
/// [`QualSeqError::LengthMismatch`] rather than silently truncating or
/// panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualSeq {
    seq: Vec<u8>,
    qual: Vec<u8>,
    name: Option<String>,
}

impl QualSeq {
    /// Builds a new `QualSeq`, failing if `seq` and `qual` differ in length.
    pub fn new(seq: &[u8], qual: &[u8], name: Option<&str>) -> Result<Self, QualSeqError> {
        if seq.len() != qual.len() {
            return Err(QualSeqError::LengthMismatch {
                seq_len: seq.len(),
                qual_len: qual.len(),
            });
        }
        Ok(Self {
            seq: seq.to_vec(),
            qual: qual.to_vec(),
            name: name.map(str::to_owned),
        })
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn qual(&self) -> &[u8] {
        &self.qual
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn seq_mut(&mut self) -> &mut [u8] {
        &mut self.seq
    }

    pub fn qual_mut(&mut self) -> &mut [u8] {
        &mut self.qual
    }

    /// Replaces the stored sequence. Fails if `s` has a different length.
    pub fn set_seq(&mut self, s: &[u8]) -> Result<(), QualSeqError> {
        if s.len() != self.seq.len() {
            return Err(QualSeqError::LengthMismatch {
                seq_len: s.len(),
                qual_len: self.qual.len(),
            });
        }
        self.seq = s.to_vec();
        Ok(())
    }

    /// Replaces the stored quality scores. Fails if `q` has a different length.
    pub fn set_qual(&mut self, q: &[u8]) -> Result<(), QualSeqError> {
        if q.len() != self.qual.len() {
            return Err(QualSeqError::LengthMismatch {
                seq_len: self.seq.len(),
                qual_len: q.len(),
            });
        }
        self.qual = q.to_vec();
        Ok(())
    }

    /// Replaces both the sequence and quality buffers wholesale. Used for
    /// the payload-length bootstrap rule in [`crate::consensus::Consensus::update`],
    /// where the old and new lengths legitimately differ.
    pub fn replace(&mut self, seq: &[u8], qual: &[u8]) -> Result<(), QualSeqError> {
        if seq.len() != qual.len() {
            return Err(QualSeqError::LengthMismatch {
                seq_len: seq.len(),
                qual_len: qual.len(),
            });
        }
        self.seq = seq.to_vec();
        self.qual = qual.to_vec();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Cheap "grossly different" gate: counts mismatches in the first
    /// `prefix_len` bases and reports true once that count exceeds
    /// `tolerance`. Used to reject obvious cross-molecule collisions
    /// before the full positional consensus merge runs.
    pub fn grossly_different(
        &self,
        other: &QualSeq,
        prefix_len: usize,
        tolerance: usize,
    ) -> Result<bool, QualSeqError> {
        if self.len() < prefix_len {
            return Err(QualSeqError::ShortSequence {
                len: self.len(),
                prefix_len,
            });
        }
        if other.len() < prefix_len {
            return Err(QualSeqError::ShortSequence {
                len: other.len(),
                prefix_len,
            });
        }
        let mismatches = self.seq[..prefix_len]
            .iter()
            .zip(&other.seq[..prefix_len])
            .filter(|(a, b)| a != b)
            .count();
        Ok(mismatches > tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_length_mismatch() {
        let err = QualSeq::new(b"ACGT", b"III", None).unwrap_err();
        assert_eq!(
            err,
            QualSeqError::LengthMismatch {
                seq_len: 4,
                qual_len: 3
            }
        );
    }

    #[test]
    fn set_seq_preserves_length_invariant() {
        let mut q = QualSeq::new(b"ACGT", b"IIII", None).unwrap();
        assert!(q.set_seq(b"ACG").is_err());
        assert!(q.set_seq(b"TTTT").is_ok());
        assert_eq!(q.seq(), b"TTTT");
    }

    #[test]
    fn grossly_different_uses_ten_base_prefix_by_default_tolerance() {
        let a = QualSeq::new(b"AAAAAAAAAAGGGG", b"IIIIIIIIIIIIII", None).unwrap();
        // 7 mismatches in the first 10 bases: not grossly different (tolerance 7 means > 7 fails).
        let b = QualSeq::new(b"CCCCCCCAAAGGGG", b"IIIIIIIIIIIIII", None).unwrap();
        assert!(!a.grossly_different(&b, 10, 7).unwrap());

        // 8 mismatches: grossly different.
        let c = QualSeq::new(b"CCCCCCCCAAGGGG", b"IIIIIIIIIIIIII", None).unwrap();
        assert!(a.grossly_different(&c, 10, 7).unwrap());
    }

    #[test]
    fn grossly_different_requires_prefix_length() {
        let a = QualSeq::new(b"ACG", b"III", None).unwrap();
        let b = QualSeq::new(b"ACGTACGTAC", b"IIIIIIIIII", None).unwrap();
        assert_eq!(
            a.grossly_different(&b, 10, 7).unwrap_err(),
            QualSeqError::ShortSequence {
                len: 3,
                prefix_len: 10
            }
        );
    }
}
