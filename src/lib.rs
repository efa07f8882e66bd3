//! rten-ctc decodes the output of sequence models trained with Connectionist
//! Temporal Classification (CTC), such as speech recognition and text line
//! recognition models.
//!
//! # Inputs
//!
//! A CTC model outputs a `[sequence, n_labels]` table with the probability of
//! each label at each time step. One label, usually label 0, is reserved for
//! the CTC _blank_, which means "no new output at this step". Tables are
//! passed to the decoders as [rten-tensor](rten_tensor) views and may hold
//! either probabilities or log probabilities (see [`ProbScale`]). Both `f32`
//! and `f64` tables are supported.
//!
//! # Collapsing paths
//!
//! A _path_ is a choice of one label per time step. Paths map to label
//! sequences by merging runs of repeated labels and then removing blanks (see
//! [`collapse`]), so many paths produce the same labels. The probability of a
//! label sequence is the sum of the probabilities of all of its paths.
//!
//! # Decoding methods
//!
//! - [`CtcDecoder::decode_greedy`] takes the most probable label at each step.
//!   It is very fast but scores a single path.
//! - [`CtcDecoder::decode_prefix_beam`] runs a beam search over label
//!   sequences, summing the probability of every path that produces each one.
//!   This is the method to use when accuracy matters.
//! - [`CtcDecoder::decode_beam`] runs a beam search over raw paths. Paths that
//!   collapse to the same labels compete for beam slots, so this is mainly a
//!   baseline for comparison. [`merge_paths`] sums the paths of each label
//!   sequence in its output.
//!
//! ```
//! use rten_ctc::{render_labels, CtcDecoder};
//! use rten_tensor::NdTensor;
//! use rten_tensor::prelude::*;
//!
//! let probs = NdTensor::from([[0.25, 0.4, 0.35], [0.4, 0.35, 0.25], [0.1, 0.5, 0.4]]);
//! let hyps = CtcDecoder::new().decode_prefix_beam(probs.view()).unwrap();
//!
//! assert_eq!(hyps[0].labels(), [2, 1]);
//! assert_eq!(render_labels(hyps[0].labels(), "ab", 0), "ba");
//! ```
//!
//! # Logging
//!
//! Decoders report progress through the [log](https://docs.rs/log) crate at
//! `debug` and `trace` levels. No logger is installed by this crate.

mod beam;
mod collapse;
mod decoder;
mod errors;
mod greedy;
mod hypothesis;
mod log_space;
mod prefix_beam;
mod table;

pub use beam::merge_paths;
pub use collapse::{collapse, collapse_steps};
pub use decoder::{
    beam_decode, greedy_decode, prefix_beam_decode, CtcDecoder, DecodeOptions, DEFAULT_BEAM_SIZE,
    DEFAULT_BLANK, DEFAULT_PREFIX_BEAM_SIZE,
};
pub use errors::DecodeError;
pub use hypothesis::{render_labels, DecodeStep, GreedyHypothesis, PathHypothesis, PrefixHypothesis};
pub use log_space::{log_add_exp, log_sum_exp, LogProb};
pub use prefix_beam::{PrefixBeam, PrefixScore};
pub use table::ProbScale;
