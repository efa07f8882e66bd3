use crate::collapse::collapse_steps;
use crate::hypothesis::GreedyHypothesis;
use crate::log_space::LogProb;
use crate::table::LogProbTable;

/// Decode by choosing the most probable label at each time step.
///
/// If several labels share the highest probability, the lowest label wins.
pub(crate) fn decode_greedy<T: LogProb>(
    log_probs: &LogProbTable<T>,
    blank: u32,
) -> GreedyHypothesis<T> {
    let mut path = Vec::with_capacity(log_probs.seq_len());
    let mut prob = T::ONE.exp();
    let mut log_prob = T::ONE;

    for row in log_probs.rows() {
        let Some((label, max_prob)) =
            row.iter()
                .copied()
                .enumerate()
                .reduce(|(max_i, max_val), (i, val)| {
                    if val > max_val {
                        (i, val)
                    } else {
                        (max_i, max_val)
                    }
                })
        else {
            continue;
        };

        path.push(label as u32);
        prob = prob * max_prob.exp();
        log_prob = log_prob + max_prob;
    }

    let steps = collapse_steps(&path, blank);
    GreedyHypothesis::new(path, steps, prob, log_prob)
}
