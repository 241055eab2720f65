//! Optional post-ingest pass that rescues clusters too small to trust as
//! consensus on their own by merging them into a nearby mid-sized
//! cluster, or into each other. Disabled unless both `merge_size` and
//! `merge_target` are configured; ingest already produced a correct
//! clustering without it.

use crate::clustering::Clustering;
use crate::consensus::Consensus;

/// Runs the small-cluster merge pass over every centre in `clustering`
/// and returns the final set of consensus records to emit. Clusters
/// larger than `merge_target` pass through untouched; clusters at or
/// below `merge_size` are absorbed into a mid-sized "target" cluster or
/// into each other wherever `Consensus::merge` accepts them.
pub fn run(clustering: &Clustering, merge_size: usize, merge_target: usize, id_tolerance: usize) -> Vec<Consensus> {
    let mut large = Vec::new();
    let mut targets: Vec<Consensus> = Vec::new();
    let mut candidates: Vec<Consensus> = Vec::new();
    let mut merged_count = 0usize;

    // HashMap iteration order is randomized per process; sort the keys so
    // repeated runs on the same input land on the same merge groupings.
    let mut uids: Vec<&String> = clustering.centres().keys().collect();
    uids.sort();

    for uid in uids {
        let consensus = &clustering.centres()[uid];
        let size = consensus.size();
        if size > merge_target {
            large.push(consensus.clone());
            continue;
        }
        if size > merge_size {
            let mut target = consensus.clone();
            let mut absorbed_idx = Vec::new();
            for (i, cand) in candidates.iter().enumerate() {
                if target.merge(cand, id_tolerance) {
                    merged_count += 1;
                    absorbed_idx.push(i);
                }
            }
            for &i in absorbed_idx.iter().rev() {
                candidates.remove(i);
            }
            targets.push(target);
            continue;
        }

        let mut absorbed = false;
        for t in targets.iter_mut() {
            if t.merge(consensus, id_tolerance) {
                merged_count += 1;
                absorbed = true;
                break;
            }
        }
        if !absorbed {
            let mut promote_idx = None;
            for (i, cand) in candidates.iter_mut().enumerate() {
                if cand.merge(consensus, id_tolerance) {
                    merged_count += 1;
                    absorbed = true;
                    if cand.size() > merge_size {
                        promote_idx = Some(i);
                    }
                    break;
                }
            }
            if let Some(i) = promote_idx {
                targets.push(candidates.remove(i));
            }
        }
        if !absorbed {
            candidates.push(consensus.clone());
        }
    }

    log::info!("Clusters merged: {}", merged_count);
    log::info!("Small clusters remaining: {}", candidates.len());

    large.into_iter().chain(targets).chain(candidates).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qual_seq::QualSeq;
    use crate::store::GroupedSequenceStore;

    fn qs(seq: &[u8]) -> QualSeq {
        QualSeq::new(seq, &vec![b'I'; seq.len()], None).unwrap()
    }

    #[test]
    fn large_clusters_pass_through_untouched() {
        let store = GroupedSequenceStore::new(8, 5, 0, Some(b'N'));
        let mut clustering = Clustering::new(store, None);
        clustering.add(qs(b"AAAAAAAA"), qs(b"ACGTACGT"));

        let out = run(&clustering, 0, 0, 0);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn small_clusters_merge_into_a_target() {
        let store = GroupedSequenceStore::new(8, 5, 0, Some(b'N'));
        let mut clustering = Clustering::new(store, None);

        // "AAAAAAAA" will be grown to size 2 so it lands in the target bucket
        // (merge_size=1 < size <= merge_target=3).
        clustering.add(qs(b"AAAAAAAA"), qs(b"ACGTACGT"));
        clustering
            .centres_mut()
            .get_mut("AAAAAAAA")
            .unwrap()
            .update(&qs(b"AAAAAAAA"), &qs(b"ACGTACGT"), 1, None, true);

        // A distinct, identical-payload singleton that can only merge via
        // a UID within tolerance; id_tolerance=0 here so it can't reach
        // "AAAAAAAA" and instead becomes its own leftover candidate.
        clustering.add(qs(b"CCCCCCCC"), qs(b"ACGTACGT"));

        let out = run(&clustering, 1, 3, 0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|c| c.size() == 2));
        assert!(out.iter().any(|c| c.size() == 1));
    }
}
