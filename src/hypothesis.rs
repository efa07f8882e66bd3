//! Results produced by the decoders.

use crate::collapse::collapse;
use crate::log_space::LogProb;
use crate::prefix_beam::PrefixScore;

/// Item in an output sequence produced by a decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeStep {
    /// Class label.
    pub label: u32,

    /// Position in the input sequence that corresponds to this label.
    ///
    /// Decoding skips blanks and repeated labels. If a label is repeated, the
    /// position will correspond to the first occurrence in the sequence. eg.
    /// If the most likely path is "a--bb", the output labels and their
    /// positions will be `('a', 0), ('b', 3)`.
    pub pos: u32,
}

/// Result of decoding a sequence with [`CtcDecoder::decode_greedy`](crate::CtcDecoder::decode_greedy).
#[derive(Clone, Debug)]
pub struct GreedyHypothesis<T> {
    path: Vec<u32>,
    steps: Vec<DecodeStep>,
    prob: T,
    log_prob: T,
}

impl<T: LogProb> GreedyHypothesis<T> {
    pub(crate) fn new(path: Vec<u32>, steps: Vec<DecodeStep>, prob: T, log_prob: T) -> Self {
        GreedyHypothesis {
            path,
            steps,
            prob,
            log_prob,
        }
    }

    /// Return the most likely label at each time step, before collapsing.
    pub fn path(&self) -> &[u32] {
        &self.path
    }

    /// Return the collapsed label sequence and associated input positions.
    pub fn steps(&self) -> &[DecodeStep] {
        &self.steps
    }

    /// Return the collapsed label sequence.
    pub fn labels(&self) -> Vec<u32> {
        self.steps.iter().map(|step| step.label).collect()
    }

    /// Return the product of the probabilities of the selected labels.
    ///
    /// This is accumulated in the probability domain, so for long sequences it
    /// underflows to a subnormal value or to zero. See
    /// [`log_prob`](Self::log_prob) for a value which does not.
    pub fn prob(&self) -> T {
        self.prob
    }

    /// Return the log probability of the path, ie. the sum of the log
    /// probabilities of the selected labels.
    ///
    /// This is the probability of a single path, not of all the paths that
    /// collapse to the same labels.
    pub fn log_prob(&self) -> T {
        self.log_prob
    }
}

/// A raw path produced by [`CtcDecoder::decode_beam`](crate::CtcDecoder::decode_beam).
#[derive(Clone, Debug, PartialEq)]
pub struct PathHypothesis<T> {
    path: Vec<u32>,
    log_prob: T,
}

impl<T: LogProb> PathHypothesis<T> {
    pub(crate) fn new(path: Vec<u32>, log_prob: T) -> Self {
        PathHypothesis { path, log_prob }
    }

    /// Return the label chosen at each time step.
    pub fn path(&self) -> &[u32] {
        &self.path
    }

    /// Return the label sequence this path collapses to.
    pub fn labels(&self, blank: u32) -> Vec<u32> {
        collapse(&self.path, blank)
    }

    /// Return the log probability of this path.
    pub fn log_prob(&self) -> T {
        self.log_prob
    }
}

/// A label sequence produced by
/// [`CtcDecoder::decode_prefix_beam`](crate::CtcDecoder::decode_prefix_beam).
#[derive(Clone, Debug, PartialEq)]
pub struct PrefixHypothesis<T> {
    labels: Vec<u32>,
    score: PrefixScore<T>,
}

impl<T: LogProb> PrefixHypothesis<T> {
    pub(crate) fn new(labels: Vec<u32>, score: PrefixScore<T>) -> Self {
        PrefixHypothesis { labels, score }
    }

    /// Return the collapsed label sequence.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Return the log probabilities of the paths that produce this label
    /// sequence, split by whether they end in a blank.
    pub fn score(&self) -> PrefixScore<T> {
        self.score
    }

    /// Log probability of all paths that produce this label sequence and end
    /// with a blank.
    pub fn log_prob_blank(&self) -> T {
        self.score.blank
    }

    /// Log probability of all paths that produce this label sequence and end
    /// with its last label.
    pub fn log_prob_no_blank(&self) -> T {
        self.score.no_blank
    }

    /// Return the log probability of all paths that produce this label
    /// sequence.
    ///
    /// This score is not normalized by the input length, so longer input
    /// sequences will tend to lead to lower scores.
    pub fn log_prob(&self) -> T {
        self.score.total()
    }
}

/// Convert a label sequence to a string.
///
/// `alphabet` lists the characters of the non-blank labels in label order,
/// skipping the blank. Labels with no corresponding character are rendered as
/// `?`.
pub fn render_labels(labels: &[u32], alphabet: &str, blank: u32) -> String {
    labels
        .iter()
        .map(|&label| {
            let index = match label.cmp(&blank) {
                std::cmp::Ordering::Less => Some(label),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(label - 1),
            };
            index
                .and_then(|index| alphabet.chars().nth(index as usize))
                .unwrap_or('?')
        })
        .collect()
}
