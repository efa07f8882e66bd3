//! Beam search over raw paths.
//!
//! This search does not collapse paths, so several beam entries may decode to
//! the same labels and the probability of a label sequence is spread across
//! them. It is mainly useful as a reference for [`PrefixBeam`](crate::PrefixBeam).

use rustc_hash::FxHashMap;

use crate::hypothesis::PathHypothesis;
use crate::log_space::{log_sum_exp, LogProb};
use crate::table::LogProbTable;

/// Search for the `beam_size` most probable raw paths through `log_probs`.
///
/// At each step every path in the beam is extended by every label. Paths with
/// equal scores keep the order in which they were generated.
pub(crate) fn decode_beam<T: LogProb>(
    log_probs: &LogProbTable<T>,
    beam_size: usize,
) -> Vec<PathHypothesis<T>> {
    let beam_size = beam_size.max(1);
    let mut beam: Vec<(Vec<u32>, T)> = vec![(Vec::new(), T::ONE)];

    for row in log_probs.rows() {
        let mut next_beam = Vec::with_capacity(beam.len() * row.len());
        for (path, score) in &beam {
            for (label, &prob) in row.iter().enumerate() {
                let mut next_path = Vec::with_capacity(path.len() + 1);
                next_path.extend_from_slice(path);
                next_path.push(label as u32);
                next_beam.push((next_path, *score + prob));
            }
        }

        // `sort_by` is stable, which keeps the result deterministic.
        next_beam.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        next_beam.truncate(beam_size);
        beam = next_beam;
    }

    beam.into_iter()
        .map(|(path, score)| PathHypothesis::new(path, score))
        .collect()
}

/// Merge raw paths which collapse to the same label sequence.
///
/// Returns each distinct label sequence of `hyps` with the summed log
/// probability of its paths, sorted by descending probability and then by
/// label sequence. When `hyps` holds every path through a table, this gives
/// the exact probability of each label sequence.
pub fn merge_paths<T: LogProb>(
    hyps: &[PathHypothesis<T>],
    blank: u32,
) -> Vec<(Vec<u32>, T)> {
    let mut groups: FxHashMap<Vec<u32>, Vec<T>> = FxHashMap::default();
    for hyp in hyps {
        groups
            .entry(hyp.labels(blank))
            .or_default()
            .push(hyp.log_prob());
    }

    let mut merged: Vec<_> = groups
        .into_iter()
        .map(|(labels, log_probs)| (labels, log_sum_exp(log_probs)))
        .collect();
    merged.sort_by(|(labels_a, a), (labels_b, b)| {
        b.total_cmp(a).then_with(|| labels_a.cmp(labels_b))
    });
    merged
}
