use rten_tensor::NdTensorView;
use rten_tensor::prelude::*;

use crate::errors::DecodeError;
use crate::log_space::LogProb;

/// How the values in a probability table are represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ProbScale {
    /// Values are probabilities, eg. the output of a softmax.
    #[default]
    Linear,
    /// Values are natural-log probabilities, eg. the output of a log-softmax.
    Log,
}

/// A `[seq, n_labels]` table of log probabilities stored in row-major order.
pub(crate) struct LogProbTable<T> {
    data: Vec<T>,
    seq_len: usize,
    n_labels: usize,
}

impl<T: LogProb> LogProbTable<T> {
    /// Convert a probability table to log space.
    ///
    /// Fails if any entry is NaN or infinite, or is negative in a linear table.
    /// Zero probabilities are valid and become log-zero.
    pub fn new(probs: NdTensorView<T, 2>, scale: ProbScale) -> Result<Self, DecodeError> {
        let [seq_len, n_labels] = probs.shape();
        let data = probs
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let log_prob = match scale {
                    ProbScale::Linear => x.ln(),
                    ProbScale::Log => x,
                };
                if log_prob.is_nan() || log_prob == T::INFINITY {
                    Err(DecodeError::InvalidProbability {
                        pos: i / n_labels,
                        label: i % n_labels,
                    })
                } else {
                    Ok(log_prob)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LogProbTable {
            data,
            seq_len,
            n_labels,
        })
    }

    /// Return the number of time steps.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Return the log probabilities of each label at time step `pos`.
    pub fn row(&self, pos: usize) -> &[T] {
        let start = pos * self.n_labels;
        &self.data[start..start + self.n_labels]
    }

    /// Iterate over the rows of the table in time order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        (0..self.seq_len).map(|pos| self.row(pos))
    }
}
