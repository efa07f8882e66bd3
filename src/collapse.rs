//! The many-to-one mapping from per-timestep paths to label sequences.

use crate::hypothesis::DecodeStep;

/// Collapse a raw path into a label sequence.
///
/// Each run of identical consecutive labels is first replaced by a single
/// label, then blanks are removed. A blank between two equal labels therefore
/// keeps them apart: `[1, 0, 1]` collapses to `[1, 1]` while `[1, 1, 1]`
/// collapses to `[1]`.
///
/// The output contains no blanks, but may contain consecutive repeats that
/// were separated by a blank in `path`. Collapsing such an output again merges
/// those repeats, so `collapse` is only idempotent on outputs without adjacent
/// equal labels.
pub fn collapse(path: &[u32], blank: u32) -> Vec<u32> {
    collapse_steps(path, blank)
        .into_iter()
        .map(|step| step.label)
        .collect()
}

/// Variant of [`collapse`] which also returns the position in `path` where
/// each output label's run starts.
pub fn collapse_steps(path: &[u32], blank: u32) -> Vec<DecodeStep> {
    let mut steps = Vec::new();
    let mut prev_label = None;

    for (pos, &label) in path.iter().enumerate() {
        if prev_label == Some(label) {
            continue;
        }
        prev_label = Some(label);

        if label != blank {
            steps.push(DecodeStep {
                label,
                pos: pos as u32,
            });
        }
    }

    steps
}
