use rten_tensor::NdTensorView;
use rten_tensor::prelude::*;

use crate::beam::decode_beam;
use crate::errors::DecodeError;
use crate::greedy::decode_greedy;
use crate::hypothesis::{GreedyHypothesis, PathHypothesis, PrefixHypothesis};
use crate::log_space::LogProb;
use crate::prefix_beam::decode_prefix_beam;
use crate::table::{LogProbTable, ProbScale};

/// Label reserved for the CTC blank, unless configured otherwise.
pub const DEFAULT_BLANK: u32 = 0;

/// Beam size used by [`CtcDecoder::decode_beam`] if none is configured.
pub const DEFAULT_BEAM_SIZE: usize = 10;

/// Beam size used by [`CtcDecoder::decode_prefix_beam`] if none is configured.
pub const DEFAULT_PREFIX_BEAM_SIZE: usize = 100;

/// Configuration for a [`CtcDecoder`].
///
/// With the `serde` feature enabled this can be deserialized, eg. from JSON.
/// Missing fields take their default values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DecodeOptions {
    /// Column of the probability table that holds the blank label.
    pub blank: u32,

    /// Whether the table holds probabilities or log probabilities.
    pub scale: ProbScale,

    /// Maximum number of hypotheses kept after each step of a beam search.
    ///
    /// If not set, each search uses its own default.
    pub beam_size: Option<usize>,

    /// Maximum number of hypotheses returned by a beam search.
    ///
    /// If not set, the whole final beam is returned.
    pub n_best: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            blank: DEFAULT_BLANK,
            scale: ProbScale::Linear,
            beam_size: None,
            n_best: None,
        }
    }
}

/// Connectionist Temporal Classification (CTC) [^1] [^2] sequence decoder.
///
/// The decoder takes an input of shape `[sequence, n_labels]`, containing the
/// probability of each label at each time step, and infers the most likely
/// sequences of output labels. One label is reserved for the CTC blank.
///
/// Different decoding methods are available. Greedy decoding with
/// [`CtcDecoder::decode_greedy`] is very fast, but considers only the most
/// likely label at each time step. Prefix beam search with
/// [`CtcDecoder::decode_prefix_beam`] sums the probabilities of all paths
/// which produce the same labels, and keeps the most probable label sequences
/// after each step. This may produce more accurate results, but is
/// significantly slower. [`CtcDecoder::decode_beam`] searches raw paths
/// without merging them and is mostly useful for comparison.
///
/// Decoding is a pure function of the input. The decoder holds only its
/// configuration and can be shared freely.
///
/// [^1]: <https://en.wikipedia.org/wiki/Connectionist_temporal_classification>
///
/// [^2]: <https://distill.pub/2017/ctc/>
#[derive(Clone, Debug, Default)]
pub struct CtcDecoder {
    options: DecodeOptions,
}

impl CtcDecoder {
    /// Create a decoder with the default options.
    pub fn new() -> CtcDecoder {
        Self::default()
    }

    pub fn with_options(options: DecodeOptions) -> CtcDecoder {
        CtcDecoder { options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode a sequence using a greedy method.
    ///
    /// This method chooses the label with the highest probability at each
    /// time step and then collapses the resulting path.
    pub fn decode_greedy<T: LogProb>(
        &self,
        probs: NdTensorView<T, 2>,
    ) -> Result<GreedyHypothesis<T>, DecodeError> {
        let blank = self.check_blank(&probs)?;
        let log_probs = LogProbTable::new(probs, self.options.scale)?;
        let hyp = decode_greedy(&log_probs, blank);

        log::debug!(
            "greedy decode: {} steps, {} labels, log prob {:?}",
            log_probs.seq_len(),
            hyp.steps().len(),
            hyp.log_prob()
        );

        Ok(hyp)
    }

    /// Search for the most probable raw paths, without merging paths that
    /// collapse to the same labels.
    ///
    /// Uses a beam size of [`DEFAULT_BEAM_SIZE`] unless one is configured.
    /// Returns paths sorted by descending probability.
    pub fn decode_beam<T: LogProb>(
        &self,
        probs: NdTensorView<T, 2>,
    ) -> Result<Vec<PathHypothesis<T>>, DecodeError> {
        let beam_size = self.beam_size(DEFAULT_BEAM_SIZE)?;
        let log_probs = LogProbTable::new(probs, self.options.scale)?;
        let mut hyps = decode_beam(&log_probs, beam_size);
        self.truncate_n_best(&mut hyps);

        log::debug!(
            "beam decode: {} steps, beam size {}, {} hypotheses",
            log_probs.seq_len(),
            beam_size,
            hyps.len()
        );

        Ok(hyps)
    }

    /// Decode a sequence using a prefix beam search.
    ///
    /// This method retains the most probable label sequences after each
    /// decoding step and discards the rest. The beam size is
    /// [`DEFAULT_PREFIX_BEAM_SIZE`] unless one is configured. Higher values
    /// may produce more accurate results, but will make decoding slower.
    ///
    /// Returns hypotheses sorted by descending probability. Label sequences
    /// with zero probability are never returned, so the result is empty if
    /// every label has probability zero at some time step.
    pub fn decode_prefix_beam<T: LogProb>(
        &self,
        probs: NdTensorView<T, 2>,
    ) -> Result<Vec<PrefixHypothesis<T>>, DecodeError> {
        let blank = self.check_blank(&probs)?;
        let beam_size = self.beam_size(DEFAULT_PREFIX_BEAM_SIZE)?;
        let log_probs = LogProbTable::new(probs, self.options.scale)?;
        let mut hyps = decode_prefix_beam(&log_probs, beam_size, blank);
        self.truncate_n_best(&mut hyps);

        log::debug!(
            "prefix beam decode: {} steps, beam size {}, {} hypotheses, best log prob {:?}",
            log_probs.seq_len(),
            beam_size,
            hyps.len(),
            hyps.first().map(|hyp| hyp.log_prob())
        );

        Ok(hyps)
    }

    /// Decode a sequence using a prefix beam search and return the `n_best`
    /// most probable hypotheses.
    ///
    /// See [`CtcDecoder::decode_prefix_beam`].
    pub fn decode_prefix_beam_nbest<T: LogProb>(
        &self,
        probs: NdTensorView<T, 2>,
        n_best: usize,
    ) -> Result<Vec<PrefixHypothesis<T>>, DecodeError> {
        let mut hyps = self.decode_prefix_beam(probs)?;
        hyps.truncate(n_best);
        Ok(hyps)
    }

    fn check_blank<T>(&self, probs: &NdTensorView<T, 2>) -> Result<u32, DecodeError> {
        let [_, n_labels] = probs.shape();
        let blank = self.options.blank;
        if (blank as usize) < n_labels {
            Ok(blank)
        } else {
            Err(DecodeError::InvalidBlank { blank, n_labels })
        }
    }

    fn beam_size(&self, default: usize) -> Result<usize, DecodeError> {
        match self.options.beam_size {
            Some(0) => Err(DecodeError::InvalidBeamSize),
            Some(beam_size) => Ok(beam_size),
            None => Ok(default),
        }
    }

    fn truncate_n_best<H>(&self, hyps: &mut Vec<H>) {
        if let Some(n_best) = self.options.n_best {
            hyps.truncate(n_best);
        }
    }
}

/// Decode `probs` greedily, with `blank` as the blank label.
///
/// See [`CtcDecoder::decode_greedy`].
pub fn greedy_decode<T: LogProb>(
    probs: NdTensorView<T, 2>,
    blank: u32,
) -> Result<GreedyHypothesis<T>, DecodeError> {
    CtcDecoder::with_options(DecodeOptions {
        blank,
        ..Default::default()
    })
    .decode_greedy(probs)
}

/// Search for the `beam_size` most probable raw paths through `probs`.
///
/// See [`CtcDecoder::decode_beam`].
pub fn beam_decode<T: LogProb>(
    probs: NdTensorView<T, 2>,
    beam_size: usize,
) -> Result<Vec<PathHypothesis<T>>, DecodeError> {
    CtcDecoder::with_options(DecodeOptions {
        beam_size: Some(beam_size),
        ..Default::default()
    })
    .decode_beam(probs)
}

/// Decode `probs` with a prefix beam search of width `beam_size`, with
/// `blank` as the blank label.
///
/// See [`CtcDecoder::decode_prefix_beam`].
pub fn prefix_beam_decode<T: LogProb>(
    probs: NdTensorView<T, 2>,
    beam_size: usize,
    blank: u32,
) -> Result<Vec<PrefixHypothesis<T>>, DecodeError> {
    CtcDecoder::with_options(DecodeOptions {
        blank,
        beam_size: Some(beam_size),
        ..Default::default()
    })
    .decode_prefix_beam(probs)
}

#[cfg(test)]
mod tests {
    use rten_ctc_testing::{expect_close, random_table, TestCases};
    use rten_tensor::NdTensor;
    use rten_tensor::prelude::*;

    use super::{beam_decode, greedy_decode, prefix_beam_decode, CtcDecoder, DecodeOptions};
    use crate::beam::merge_paths;
    use crate::collapse::collapse;
    use crate::errors::DecodeError;
    use crate::table::ProbScale;

    fn scenario_table() -> NdTensor<f64, 2> {
        NdTensor::from([[0.25, 0.4, 0.35], [0.4, 0.35, 0.25], [0.1, 0.5, 0.4]])
    }

    #[test]
    fn test_scenario() {
        let probs = scenario_table();

        let greedy = greedy_decode(probs.view(), 0).unwrap();
        assert_eq!(greedy.path(), [1, 0, 1]);
        assert_eq!(greedy.labels(), [1, 1]);
        expect_close(greedy.prob(), 0.08, 1e-9).unwrap();

        let beam = beam_decode(probs.view(), 2).unwrap();
        assert_eq!(beam[0].path(), [1, 0, 1]);
        assert_eq!(beam[1].path(), [1, 1, 1]);

        let prefix = prefix_beam_decode(probs.view(), 2, 0).unwrap();
        assert_eq!(prefix.len(), 2);
        assert_eq!(prefix[0].labels(), [1, 2]);
        expect_close(prefix[0].log_prob().exp(), 0.12, 1e-9).unwrap();
        assert_eq!(prefix[1].labels(), [2, 1]);
        expect_close(prefix[1].log_prob().exp(), 0.11375, 1e-9).unwrap();

        // Greedy decoding picks the single most probable path, whose labels
        // are not the most probable label sequence.
        let prefix = prefix_beam_decode(probs.view(), 100, 0).unwrap();
        assert_eq!(prefix[0].labels(), [2, 1]);
        assert!(prefix.iter().any(|hyp| hyp.labels() == [1, 1]));
    }

    // With beams wide enough to keep everything, merging the raw paths of the
    // naive search gives the same label sequences as the prefix search.
    #[test]
    fn test_merged_beam_matches_prefix_beam() {
        let probs = scenario_table();
        let merged = merge_paths(&beam_decode(probs.view(), 27).unwrap(), 0);
        let prefix = prefix_beam_decode(probs.view(), 100, 0).unwrap();

        assert_eq!(merged.len(), prefix.len());
        for ((labels, log_prob), hyp) in merged.iter().zip(&prefix) {
            assert_eq!(labels, hyp.labels());
            expect_close(log_prob.exp(), hyp.log_prob().exp(), 1e-9).unwrap();
        }
    }

    #[test]
    fn test_greedy_matches_beam_of_one() {
        #[derive(Debug)]
        struct Case {
            seed: u64,
            seq: usize,
            n_labels: usize,
        }

        let cases = [
            Case {
                seed: 10,
                seq: 8,
                n_labels: 3,
            },
            Case {
                seed: 11,
                seq: 20,
                n_labels: 6,
            },
            Case {
                seed: 12,
                seq: 1,
                n_labels: 2,
            },
        ];

        cases.test_each(|case| {
            let probs = random_table(case.seed, case.seq, case.n_labels);
            let greedy = greedy_decode(probs.view(), 0).unwrap();
            let beam = beam_decode(probs.view(), 1).unwrap();

            assert_eq!(beam.len(), 1);
            assert_eq!(beam[0].path(), greedy.path());
            assert_eq!(greedy.labels(), collapse(beam[0].path(), 0));
            expect_close(beam[0].log_prob(), greedy.log_prob(), 1e-9).unwrap();
        });

        // Ties between labels resolve the same way in both decoders.
        let probs = NdTensor::from([[0.5, 0.5], [0.2, 0.8], [0.5, 0.5]]);
        let greedy = greedy_decode(probs.view(), 0).unwrap();
        let beam = beam_decode(probs.view(), 1).unwrap();
        assert_eq!(beam[0].path(), greedy.path());
    }

    #[test]
    fn test_log_scale_input() {
        let probs = scenario_table();
        let log_probs = probs.map(|p| p.ln());
        let decoder = CtcDecoder::with_options(DecodeOptions {
            scale: ProbScale::Log,
            beam_size: Some(2),
            ..Default::default()
        });

        let from_log = decoder.decode_prefix_beam(log_probs.view()).unwrap();
        let from_linear = prefix_beam_decode(probs.view(), 2, 0).unwrap();
        assert_eq!(from_log, from_linear);

        let greedy = decoder.decode_greedy(log_probs.view()).unwrap();
        assert_eq!(greedy.labels(), [1, 1]);
    }

    #[test]
    fn test_f32_input() {
        let probs = NdTensor::from([
            [0.25f32, 0.4, 0.35],
            [0.4, 0.35, 0.25],
            [0.1, 0.5, 0.4],
        ]);
        let hyps = prefix_beam_decode(probs.view(), 2, 0).unwrap();
        assert_eq!(hyps[0].labels(), [1, 2]);
        expect_close(hyps[0].log_prob().exp(), 0.12, 1e-5).unwrap();
    }

    #[test]
    fn test_non_zero_blank() {
        // Move the blank column of the scenario table to the end.
        let probs = scenario_table();
        let [seq, n_labels] = probs.shape();
        let mut moved = NdTensor::<f64, 2>::zeros([seq, n_labels]);
        for t in 0..seq {
            for i in 0..n_labels {
                moved[[t, i]] = probs[[t, (i + 1) % n_labels]];
            }
        }

        let hyps = prefix_beam_decode(moved.view(), 2, 2).unwrap();
        assert_eq!(hyps[0].labels(), [0, 1]);
        expect_close(hyps[0].log_prob().exp(), 0.12, 1e-9).unwrap();

        let greedy = greedy_decode(moved.view(), 2).unwrap();
        assert_eq!(greedy.path(), [0, 2, 0]);
        assert_eq!(greedy.labels(), [0, 0]);
    }

    #[test]
    fn test_n_best() {
        let probs = scenario_table();
        let decoder = CtcDecoder::with_options(DecodeOptions {
            n_best: Some(3),
            ..Default::default()
        });

        let hyps = decoder.decode_prefix_beam(probs.view()).unwrap();
        assert_eq!(hyps.len(), 3);

        let hyps = decoder.decode_prefix_beam_nbest(probs.view(), 1).unwrap();
        assert_eq!(hyps.len(), 1);
        assert_eq!(hyps[0].labels(), [2, 1]);

        let hyps = decoder.decode_beam(probs.view()).unwrap();
        assert_eq!(hyps.len(), 3);
    }

    #[test]
    fn test_invalid_inputs() {
        let probs = scenario_table();

        assert_eq!(
            greedy_decode(probs.view(), 3).err(),
            Some(DecodeError::InvalidBlank {
                blank: 3,
                n_labels: 3
            })
        );
        assert_eq!(
            prefix_beam_decode(probs.view(), 0, 0).err(),
            Some(DecodeError::InvalidBeamSize)
        );
        assert_eq!(
            beam_decode(probs.view(), 0).err(),
            Some(DecodeError::InvalidBeamSize)
        );

        let no_labels = NdTensor::<f64, 2>::zeros([4, 0]);
        assert_eq!(
            prefix_beam_decode(no_labels.view(), 10, 0).err(),
            Some(DecodeError::InvalidBlank {
                blank: 0,
                n_labels: 0
            })
        );

        let mut bad_probs = scenario_table();
        bad_probs[[2, 1]] = f64::NAN;
        assert_eq!(
            prefix_beam_decode(bad_probs.view(), 10, 0).err(),
            Some(DecodeError::InvalidProbability { pos: 2, label: 1 })
        );
        bad_probs[[2, 1]] = -0.5;
        assert_eq!(
            greedy_decode(bad_probs.view(), 0).err(),
            Some(DecodeError::InvalidProbability { pos: 2, label: 1 })
        );

        let inf_probs = NdTensor::from([[0.5f64, f64::INFINITY]]);
        assert_eq!(
            prefix_beam_decode(inf_probs.view(), 10, 0).err(),
            Some(DecodeError::InvalidProbability { pos: 0, label: 1 })
        );
    }

    #[test]
    fn test_all_zero_step() {
        let probs = NdTensor::from([[0.5, 0.5], [0., 0.], [0.5, 0.5]]);
        let hyps = prefix_beam_decode(probs.view(), 10, 0).unwrap();
        assert!(hyps.is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_options_from_json() {
        let options: DecodeOptions =
            serde_json::from_str(r#"{"blank": 2, "scale": "log", "beam_size": 16}"#).unwrap();
        assert_eq!(
            options,
            DecodeOptions {
                blank: 2,
                scale: ProbScale::Log,
                beam_size: Some(16),
                n_best: None,
            }
        );

        let options: DecodeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, DecodeOptions::default());
    }
}
