//! Per-cluster consensus aggregate.
//!
//! A `Consensus` owns the canonical UID for a cluster, the current
//! consensus payload, and a sparse history of positions where members
//! have disagreed. `update` is the hot path: every incoming read is
//! folded in one position at a time, raising quality scores and
//! recording disagreements without ever re-scanning prior members.

use std::collections::BTreeMap;

use crate::qual_seq::QualSeq;

/// Letters a recorded disagreement can tally, in ascending ASCII order —
/// this lets `diffs` iteration double as the "sorted by letter" order the
/// FASTQ header requires without a separate sort at serialisation time.
pub const DIFF_ALPHABET: [u8; 5] = *b"ACGNT";

/// Per-position tally, one slot per [`DIFF_ALPHABET`] letter.
pub type LetterCounts = [u32; DIFF_ALPHABET.len()];

fn letter_index(letter: u8) -> usize {
    DIFF_ALPHABET
        .iter()
        .position(|&l| l == letter)
        .unwrap_or_else(|| panic!("payload letter {:?} outside the supported alphabet", letter as char))
}

pub(crate) const GROSSLY_DIFFERENT_PREFIX_LEN: usize = 10;
pub(crate) const GROSSLY_DIFFERENT_TOLERANCE: usize = 7;

// MARK: Consensus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    uid: QualSeq,
    payload: QualSeq,
    diffs: BTreeMap<usize, LetterCounts>,
    size: usize,
    different: usize,
    shorter: usize,
    longer: usize,
}

impl Consensus {
    /// Opens a new cluster from its first read.
    pub fn new(uid: QualSeq, payload: QualSeq) -> Self {
        Self {
            uid,
            payload,
            diffs: BTreeMap::new(),
            size: 1,
            different: 0,
            shorter: 0,
            longer: 0,
        }
    }

    pub fn uid(&self) -> &QualSeq {
        &self.uid
    }

    pub fn payload(&self) -> &QualSeq {
        &self.payload
    }

    pub fn diffs(&self) -> &BTreeMap<usize, LetterCounts> {
        &self.diffs
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn different(&self) -> usize {
        self.different
    }

    pub fn shorter(&self) -> usize {
        self.shorter
    }

    pub fn longer(&self) -> usize {
        self.longer
    }

    fn is_grossly_different(&self, other: &QualSeq) -> bool {
        self.payload
            .grossly_different(other, GROSSLY_DIFFERENT_PREFIX_LEN, GROSSLY_DIFFERENT_TOLERANCE)
            .unwrap_or_else(|_| {
                log::debug!("payload shorter than the gross-difference prefix; treating as not grossly different");
                false
            })
    }

    /// Folds one more read into the cluster. Returns `true` iff it was
    /// merged; `false` covers every rejection path (UID length mismatch,
    /// gross difference, wrong length relative to the current payload).
    ///
    /// `size` lets a whole other cluster be folded in at once (see
    /// [`Consensus::merge`]); `diffs` carries that cluster's own
    /// disagreement history along so it isn't lost. `discard` controls
    /// whether rejections are tallied into the reject counters — set to
    /// `false` for cluster merges, where a rejected merge just leaves two
    /// clusters standing rather than discarding a read.
    pub fn update(
        &mut self,
        uid: &QualSeq,
        payload: &QualSeq,
        size: usize,
        diffs: Option<&BTreeMap<usize, LetterCounts>>,
        discard: bool,
    ) -> bool {
        if uid.len() != self.uid.len() {
            log::error!(
                "UID length mismatch during consensus update: {} vs {}",
                uid.len(),
                self.uid.len()
            );
            log::debug!(
                "length mismatch: {} vs {}",
                String::from_utf8_lossy(uid.seq()),
                String::from_utf8_lossy(self.uid.seq())
            );
            return false;
        }

        if self.is_grossly_different(payload) {
            if discard {
                self.different += size;
            }
            return false;
        }

        if payload.len() < self.payload.len() {
            if discard {
                self.shorter += size;
            }
            return false;
        }

        if payload.len() > self.payload.len() {
            if discard && self.size == 1 {
                self.payload = payload.clone();
                self.shorter += size;
            } else {
                self.longer += size;
            }
            return false;
        }

        for i in 0..self.uid.len() {
            let merged = self.uid.qual()[i].max(uid.qual()[i]);
            self.uid.qual_mut()[i] = merged;
        }

        let propagated: std::collections::HashSet<usize> = diffs
            .map(|d| d.keys().copied().collect())
            .unwrap_or_default();

        if let Some(diffs) = diffs {
            for (&pos, incoming) in diffs {
                let entry = self.diffs.entry(pos).or_insert_with(|| {
                    let mut seeded: LetterCounts = [0; DIFF_ALPHABET.len()];
                    seeded[letter_index(self.payload.seq()[pos])] = self.size as u32;
                    seeded
                });
                for (idx, &count) in incoming.iter().enumerate() {
                    entry[idx] += count;
                }
            }
        }

        for i in 0..self.payload.len() {
            let incoming = (payload.qual()[i], 0u8, payload.seq()[i]);
            let current = (self.payload.qual()[i], 1u8, self.payload.seq()[i]);
            let (q_win, _, nuc_win) = incoming.max(current);
            let agree = self.payload.seq()[i] == payload.seq()[i];

            if !propagated.contains(&i) {
                if agree {
                    if let Some(counts) = self.diffs.get_mut(&i) {
                        counts[letter_index(self.payload.seq()[i])] += size as u32;
                    }
                } else {
                    let counts = self.diffs.entry(i).or_insert_with(|| {
                        let mut seeded: LetterCounts = [0; DIFF_ALPHABET.len()];
                        seeded[letter_index(self.payload.seq()[i])] = self.size as u32;
                        seeded
                    });
                    counts[letter_index(payload.seq()[i])] += size as u32;
                }
            }

            self.payload.qual_mut()[i] = q_win;
            if !agree {
                self.payload.seq_mut()[i] = nuc_win;
            }
        }

        self.size += size;
        true
    }

    /// Folds another cluster into this one, carrying its disagreement
    /// history along. Rejections never touch the reject counters — a
    /// failed merge just leaves both clusters standing.
    pub fn merge(&mut self, other: &Consensus, tolerance: usize) -> bool {
        let grossly_different = self
            .uid
            .grossly_different(&other.uid, self.uid.len(), tolerance)
            .unwrap_or(false);
        if grossly_different {
            return false;
        }
        self.update(&other.uid, &other.payload, other.size, Some(&other.diffs), false)
    }

    /// Renders this cluster as a single four-line FASTQ record.
    pub fn to_fastq_record(&self) -> String {
        let mut header = format!("@{}", self.size);
        for (pos, counts) in &self.diffs {
            header.push(' ');
            header.push_str(&pos.to_string());
            for (idx, &letter) in DIFF_ALPHABET.iter().enumerate() {
                if counts[idx] > 0 {
                    header.push(letter as char);
                    header.push_str(&counts[idx].to_string());
                }
            }
        }
        let seq: String = self
            .uid
            .seq()
            .iter()
            .chain(self.payload.seq())
            .map(|&b| b as char)
            .collect();
        let qual: String = self
            .uid
            .qual()
            .iter()
            .chain(self.payload.qual())
            .map(|&b| b as char)
            .collect();
        format!("{header}\n{seq}\n+\n{qual}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qs(seq: &[u8], qual: &[u8]) -> QualSeq {
        QualSeq::new(seq, qual, None).unwrap()
    }

    #[test]
    fn identical_higher_quality_read_raises_qual_with_no_new_diffs() {
        let mut c = Consensus::new(
            qs(b"AAAACCCC", b"IIIIIIII"),
            qs(b"ACCTCTCCCTGTGGGTCATGTGACT", &[b'I'; 25]),
        );
        let mut higher = [b'J'; 25];
        higher[5] = b'I';
        assert!(c.update(
            &qs(b"AAAACCCC", b"JJJJJJJJ"),
            &qs(b"ACCTCTCCCTGTGGGTCATGTGACT", &higher),
            1,
            None,
            true,
        ));
        assert_eq!(c.size(), 2);
        assert!(c.diffs().is_empty());
        assert_eq!(c.payload().qual()[0], b'J');
    }

    #[test]
    fn single_position_mismatch_breaks_tie_by_quality() {
        let mut c = Consensus::new(
            qs(b"AAAACCCC", b"IIIIIIII"),
            qs(b"ACCTCTCCCTGTGGGTCATGTGACT", &[b'I'; 25]),
        );
        let mut qual2 = [b'I'; 25];
        qual2[13] = b'D';
        let mut seq2 = b"ACCTCTCCCTGTGGGTCATGTGACT".to_vec();
        seq2[13] = b'T';
        assert!(c.update(&qs(b"AAAACCCC", b"IIIIIIII"), &qs(&seq2, &qual2), 1, None, true));
        assert_eq!(c.size(), 2);
        assert_eq!(c.payload().seq()[13], b'G');
        let counts = c.diffs()[&13];
        assert_eq!(counts[letter_index(b'G')], 1);
        assert_eq!(counts[letter_index(b'T')], 1);
    }

    #[test]
    fn shorter_read_is_rejected_without_mutating_payload() {
        let mut c = Consensus::new(qs(b"AAAACCCC", b"IIIIIIII"), qs(&[b'A'; 25], &[b'I'; 25]));
        let merged = c.update(
            &qs(b"AAAACCCC", b"IIIIIIII"),
            &qs(&[b'A'; 20], &[b'I'; 20]),
            1,
            None,
            true,
        );
        assert!(!merged);
        assert_eq!(c.size(), 1);
        assert_eq!(c.shorter(), 1);
        assert_eq!(c.payload().len(), 25);
    }

    #[test]
    fn longer_read_replaces_singleton_payload() {
        let mut c = Consensus::new(qs(b"AAAACCCC", b"IIIIIIII"), qs(&[b'A'; 20], &[b'I'; 20]));
        let merged = c.update(
            &qs(b"AAAACCCC", b"IIIIIIII"),
            &qs(&[b'A'; 25], &[b'I'; 25]),
            1,
            None,
            true,
        );
        assert!(!merged);
        assert_eq!(c.size(), 1);
        assert_eq!(c.shorter(), 1);
        assert_eq!(c.payload().len(), 25);
    }

    #[test]
    fn longer_read_is_counted_once_cluster_has_grown() {
        let mut c = Consensus::new(qs(b"AAAACCCC", b"IIIIIIII"), qs(&[b'A'; 20], &[b'I'; 20]));
        assert!(c.update(&qs(b"AAAACCCC", b"IIIIIIII"), &qs(&[b'A'; 20], &[b'I'; 20]), 1, None, true));
        let merged = c.update(
            &qs(b"AAAACCCC", b"IIIIIIII"),
            &qs(&[b'A'; 25], &[b'I'; 25]),
            1,
            None,
            true,
        );
        assert!(!merged);
        assert_eq!(c.size(), 2);
        assert_eq!(c.longer(), 1);
        assert_eq!(c.payload().len(), 20);
    }

    #[test]
    fn grossly_different_payload_is_rejected() {
        let mut c = Consensus::new(
            qs(b"AAAACCCC", b"IIIIIIII"),
            qs(b"AAAAAAAAAAGGGG", &[b'I'; 14]),
        );
        let merged = c.update(
            &qs(b"AAAACCCC", b"IIIIIIII"),
            &qs(b"CCCCCCCCAAGGGG", &[b'I'; 14]),
            1,
            None,
            true,
        );
        assert!(!merged);
        assert_eq!(c.size(), 1);
        assert_eq!(c.different(), 1);
    }

    #[test]
    fn merge_is_symmetric_in_resulting_size() {
        let a = Consensus::new(qs(b"AAAACCCC", b"IIIIIIII"), qs(b"ACGT", b"IIII"));
        let b = Consensus::new(qs(b"AAAACCCC", b"IIJJIIII"), qs(b"ACGT", b"JJJJ"));

        let mut a_absorbs_b = a.clone();
        assert!(a_absorbs_b.merge(&b, 0));

        let mut b_absorbs_a = b.clone();
        assert!(b_absorbs_a.merge(&a, 0));

        assert_eq!(a_absorbs_b.size(), b_absorbs_a.size());
        assert_eq!(a_absorbs_b.uid().qual(), b_absorbs_a.uid().qual());
    }

    #[test]
    fn fastq_round_trip_preserves_header_fields() {
        let mut c = Consensus::new(qs(b"AAAACCCC", b"IIIIIIII"), qs(b"ACGT", b"IIII"));
        let mut qual2 = [b'I'; 4];
        qual2[0] = b'D';
        c.update(&qs(b"AAAACCCC", b"IIIIIIII"), &qs(b"GCGT", &qual2), 1, None, true);
        let record = c.to_fastq_record();
        let mut lines = record.lines();
        assert_eq!(lines.next().unwrap(), "@2 0A1G1");
        assert_eq!(lines.next().unwrap(), "AAAACCCCACGT");
        assert_eq!(lines.next().unwrap(), "+");
    }
}
