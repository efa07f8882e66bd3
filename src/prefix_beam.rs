//! Prefix beam search over collapsed label sequences.
//!
//! Unlike a search over raw paths, each beam entry here is a label sequence
//! which has already been collapsed. Every raw path that collapses to the same
//! sequence contributes to the same entry, so beam slots are not wasted on
//! alternative spellings of one output. See the "Inference" section of
//! <https://distill.pub/2017/ctc/> for an explanation of the algorithm.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::hypothesis::PrefixHypothesis;
use crate::log_space::{log_add_exp, log_sum_exp, LogProb};
use crate::table::LogProbTable;

/// Label sequence held by a beam entry. Most prefixes fit inline.
type Prefix = SmallVec<[u32; 16]>;

/// Log probabilities of the raw paths that collapse to a prefix.
///
/// The mass is split by whether paths end with a blank or with the prefix's
/// last label. Both are needed to decide whether a repeated label starts a new
/// occurrence or extends the current one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrefixScore<T> {
    /// Log probability of paths which end with a blank.
    pub blank: T,

    /// Log probability of paths which end with the last label of the prefix.
    pub no_blank: T,
}

impl<T: LogProb> PrefixScore<T> {
    /// Score of a prefix which no path produces.
    pub const ZERO: Self = PrefixScore {
        blank: T::ZERO,
        no_blank: T::ZERO,
    };

    /// Return the log probability of all paths that produce the prefix.
    pub fn total(&self) -> T {
        log_add_exp(self.blank, self.no_blank)
    }
}

/// Scores of the prefixes reachable at the next time step.
///
/// A prefix that has not received any contribution yet has a score of
/// [`PrefixScore::ZERO`], and looking one up inserts that default.
struct NextScores<T> {
    scores: FxHashMap<Prefix, PrefixScore<T>>,
}

impl<T: LogProb> NextScores<T> {
    fn with_capacity(capacity: usize) -> Self {
        let mut scores = FxHashMap::default();
        scores.reserve(capacity);
        NextScores { scores }
    }

    /// Return the score for `prefix`, inserting a zero score on a miss.
    fn get_or_zero(&mut self, prefix: Prefix) -> &mut PrefixScore<T> {
        self.scores.entry(prefix).or_insert(PrefixScore::ZERO)
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    /// Drop prefixes with zero probability and return the `beam_size` most
    /// probable of the rest, sorted by descending probability.
    ///
    /// Prefixes with equal probability are ordered by their labels.
    fn into_ranked(self, beam_size: usize) -> Vec<(Prefix, PrefixScore<T>)> {
        let mut ranked: Vec<(T, Prefix, PrefixScore<T>)> = self
            .scores
            .into_iter()
            .map(|(prefix, score)| (score.total(), prefix, score))
            .filter(|(total, ..)| *total != T::ZERO)
            .collect();

        let cmp = |a: &(T, Prefix, PrefixScore<T>), b: &(T, Prefix, PrefixScore<T>)| {
            b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
        };
        if ranked.len() > beam_size {
            ranked.select_nth_unstable_by(beam_size - 1, cmp);
            ranked.truncate(beam_size);
        }
        ranked.sort_by(cmp);

        ranked
            .into_iter()
            .map(|(_, prefix, score)| (prefix, score))
            .collect()
    }
}

/// State of a prefix beam search.
///
/// The beam holds at most `beam_size` distinct prefixes. It starts with only
/// the empty prefix, which every path produces before the first time step, and
/// is rebuilt by each call to [`step`](PrefixBeam::step).
#[derive(Clone, Debug)]
pub struct PrefixBeam<T> {
    /// Prefixes and their scores, sorted by descending total probability.
    entries: Vec<(Prefix, PrefixScore<T>)>,
    beam_size: usize,
    blank: u32,
}

impl<T: LogProb> PrefixBeam<T> {
    /// Create a beam holding only the empty prefix.
    ///
    /// A `beam_size` of zero is treated as one.
    pub fn new(beam_size: usize, blank: u32) -> Self {
        PrefixBeam {
            entries: vec![(
                Prefix::new(),
                PrefixScore {
                    blank: T::ONE,
                    no_blank: T::ZERO,
                },
            )],
            beam_size: beam_size.max(1),
            blank,
        }
    }

    /// Advance the search by one time step.
    ///
    /// `log_probs` contains the log probability of each label at this step.
    /// Every prefix in the beam is extended by every label, contributions that
    /// produce the same prefix are summed and the `beam_size` most probable
    /// prefixes replace the current beam.
    pub fn step(&mut self, log_probs: &[T]) {
        let entries = std::mem::take(&mut self.entries);
        let mut next = NextScores::with_capacity(entries.len() * log_probs.len());

        for (prefix, score) in entries {
            let last_label = prefix.last().copied();

            for (label, &prob) in log_probs.iter().enumerate() {
                let label = label as u32;

                // A blank leaves the prefix unchanged, whichever way the
                // path ended before.
                if label == self.blank {
                    let same = next.get_or_zero(prefix.clone());
                    same.blank =
                        log_sum_exp([same.blank, score.blank + prob, score.no_blank + prob]);
                    continue;
                }

                let mut extended = prefix.clone();
                extended.push(label);
                let ext = next.get_or_zero(extended);

                if Some(label) != last_label {
                    ext.no_blank =
                        log_sum_exp([ext.no_blank, score.blank + prob, score.no_blank + prob]);
                } else {
                    // Repeats not separated by a blank merge into the current
                    // occurrence of the label. Only paths ending in a blank
                    // can start a new one.
                    ext.no_blank = log_add_exp(ext.no_blank, score.blank + prob);

                    let same = next.get_or_zero(prefix.clone());
                    same.no_blank = log_add_exp(same.no_blank, score.no_blank + prob);
                }
            }
        }

        let n_candidates = next.len();
        self.entries = next.into_ranked(self.beam_size);

        log::trace!(
            "prefix beam step: {} candidates, kept {}",
            n_candidates,
            self.entries.len()
        );
    }

    /// Return the number of prefixes in the beam.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return true if no prefix has a non-zero probability.
    ///
    /// This only happens if every label had zero probability at some step.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over prefixes and their scores, most probable first.
    pub fn iter(&self) -> impl Iterator<Item = (&[u32], PrefixScore<T>)> {
        self.entries
            .iter()
            .map(|(prefix, score)| (prefix.as_slice(), *score))
    }

    /// Convert the beam into hypotheses, most probable first.
    pub fn into_hypotheses(self) -> Vec<PrefixHypothesis<T>> {
        self.entries
            .into_iter()
            .map(|(prefix, score)| PrefixHypothesis::new(prefix.into_vec(), score))
            .collect()
    }
}

/// Run a prefix beam search over every row of `log_probs`.
pub(crate) fn decode_prefix_beam<T: LogProb>(
    log_probs: &LogProbTable<T>,
    beam_size: usize,
    blank: u32,
) -> Vec<PrefixHypothesis<T>> {
    let mut beam = PrefixBeam::new(beam_size, blank);
    for row in log_probs.rows() {
        beam.step(row);
    }
    beam.into_hypotheses()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rten_ctc_testing::{expect_close, onehot_table, random_table, run_bench, TestCases};
    use rten_tensor::NdTensor;
    use rten_tensor::prelude::*;

    use super::{decode_prefix_beam, PrefixBeam, PrefixScore};
    use crate::collapse::collapse;
    use crate::log_space::LogProb;
    use crate::table::{LogProbTable, ProbScale};

    fn scenario_table() -> NdTensor<f64, 2> {
        NdTensor::from([[0.25, 0.4, 0.35], [0.4, 0.35, 0.25], [0.1, 0.5, 0.4]])
    }

    fn log_table(probs: &NdTensor<f64, 2>) -> LogProbTable<f64> {
        LogProbTable::new(probs.view(), ProbScale::Linear).unwrap()
    }

    /// Compute the probability of every label sequence by enumerating all raw
    /// paths through `probs` and summing the paths that collapse to each one.
    fn enumerate_label_probs(probs: &NdTensor<f64, 2>, blank: u32) -> HashMap<Vec<u32>, f64> {
        let [seq, n_labels] = probs.shape();
        let mut label_probs = HashMap::new();
        let n_paths = n_labels.pow(seq as u32);
        for mut index in 0..n_paths {
            let mut path = Vec::with_capacity(seq);
            let mut prob = 1.;
            for t in 0..seq {
                let label = index % n_labels;
                index /= n_labels;
                prob *= probs[[t, label]];
                path.push(label as u32);
            }
            *label_probs.entry(collapse(&path, blank)).or_insert(0.) += prob;
        }
        label_probs
    }

    fn score_of(beam: &PrefixBeam<f64>, labels: &[u32]) -> Option<PrefixScore<f64>> {
        beam.iter()
            .find(|(prefix, _)| *prefix == labels)
            .map(|(_, score)| score)
    }

    #[test]
    fn test_decode_scenario() {
        let probs = scenario_table();
        let hyps = decode_prefix_beam(&log_table(&probs), 2, 0);

        assert_eq!(hyps.len(), 2);
        assert_eq!(hyps[0].labels(), [1, 2]);
        assert_eq!(hyps[1].labels(), [2, 1]);
        expect_close(hyps[0].log_prob().exp(), 0.12, 1e-9).unwrap();
        expect_close(hyps[1].log_prob().exp(), 0.11375, 1e-9).unwrap();
    }

    #[test]
    fn test_full_beam_matches_enumeration() {
        #[derive(Debug)]
        struct Case {
            seed: u64,
            seq: usize,
            n_labels: usize,
            blank: u32,
        }

        let cases = [
            Case {
                seed: 1,
                seq: 3,
                n_labels: 3,
                blank: 0,
            },
            Case {
                seed: 2,
                seq: 5,
                n_labels: 3,
                blank: 0,
            },
            Case {
                seed: 3,
                seq: 4,
                n_labels: 4,
                blank: 3,
            },
            Case {
                seed: 4,
                seq: 1,
                n_labels: 2,
                blank: 1,
            },
        ];

        cases.test_each(|case| {
            let probs = random_table(case.seed, case.seq, case.n_labels);
            let expected = enumerate_label_probs(&probs, case.blank);
            let hyps = decode_prefix_beam(&log_table(&probs), 10_000, case.blank);

            assert_eq!(hyps.len(), expected.len());
            for hyp in &hyps {
                let prob = expected[hyp.labels()];
                expect_close(hyp.log_prob().exp(), prob, 1e-9).unwrap();
            }

            // Hypotheses are sorted by descending probability.
            assert!(
                hyps.windows(2)
                    .all(|pair| pair[0].log_prob() >= pair[1].log_prob())
            );
        });

        // Same check for the scenario table, whose totals are easy to read.
        let probs = scenario_table();
        let hyps = decode_prefix_beam(&log_table(&probs), 100, 0);
        let top: Vec<(Vec<u32>, f64)> = hyps
            .iter()
            .take(4)
            .map(|hyp| (hyp.labels().to_vec(), hyp.log_prob().exp()))
            .collect();
        let expected = [
            (vec![2, 1], 0.2185),
            (vec![1, 2], 0.205),
            (vec![1], 0.2025),
            (vec![2], 0.129),
        ];
        for ((labels, prob), (expected_labels, expected_prob)) in top.iter().zip(expected) {
            assert_eq!(*labels, expected_labels);
            expect_close(*prob, expected_prob, 1e-9).unwrap();
        }
        assert_eq!(hyps.len(), 9);
    }

    #[test]
    fn test_probability_mass_is_conserved() {
        for seed in 0..5 {
            let probs = random_table(seed, 6, 4);
            let table = log_table(&probs);
            let mut beam = PrefixBeam::new(100_000, 0);
            for row in table.rows() {
                beam.step(row);
                let mass: f64 = beam
                    .iter()
                    .map(|(_, score)| score.blank.exp() + score.no_blank.exp())
                    .sum();
                expect_close(mass, 1., 1e-9).unwrap();
            }
        }
    }

    #[test]
    fn test_step_merges_repeats() {
        let half = 0.5f64.ln();
        let mut beam = PrefixBeam::new(10, 0);

        beam.step(&[half, half]);
        let entries: Vec<_> = beam.iter().map(|(p, s)| (p.to_vec(), s)).collect();
        assert_eq!(
            entries,
            [
                (
                    vec![],
                    PrefixScore {
                        blank: half,
                        no_blank: f64::ZERO
                    }
                ),
                (
                    vec![1],
                    PrefixScore {
                        blank: f64::ZERO,
                        no_blank: half
                    }
                ),
            ]
        );

        // "11" collapses to "1", so no path can produce `[1, 1]` yet.
        beam.step(&[half, half]);
        assert_eq!(beam.len(), 2);
        let score = score_of(&beam, &[1]).unwrap();
        expect_close(score.blank.exp(), 0.25, 1e-12).unwrap();
        expect_close(score.no_blank.exp(), 0.5, 1e-12).unwrap();
        let score = score_of(&beam, &[]).unwrap();
        expect_close(score.blank.exp(), 0.25, 1e-12).unwrap();
        assert_eq!(beam.iter().next().map(|(p, _)| p.to_vec()), Some(vec![1]));

        // "1-1" is the only path producing `[1, 1]`.
        beam.step(&[half, half]);
        let score = score_of(&beam, &[1, 1]).unwrap();
        assert_eq!(score.blank, f64::ZERO);
        expect_close(score.no_blank.exp(), 0.125, 1e-12).unwrap();
    }

    #[test]
    fn test_beam_sums_paths() {
        // The greedy path is "--", but the paths "a-", "-a" and "aa" which all
        // produce "a" are more probable in total.
        //
        // Example taken from https://towardsdatascience.com/beam-search-decoding-in-ctc-trained-neural-networks-5a889a3d85a7.
        let probs = NdTensor::from([[0.8, 0.2], [0.6, 0.4]]);
        let table = log_table(&probs);

        let hyps = decode_prefix_beam(&table, 10, 0);
        assert_eq!(hyps[0].labels(), [1]);
        expect_close(hyps[0].log_prob().exp(), 0.52, 1e-12).unwrap();
        assert_eq!(hyps[1].labels(), [] as [u32; 0]);
        expect_close(hyps[1].log_prob().exp(), 0.48, 1e-12).unwrap();

        // With a beam width of 1, "a" is pruned after the first step.
        let hyps = decode_prefix_beam(&table, 1, 0);
        assert_eq!(hyps.len(), 1);
        assert_eq!(hyps[0].labels(), [] as [u32; 0]);
        expect_close(hyps[0].log_prob().exp(), 0.48, 1e-12).unwrap();
    }

    #[test]
    fn test_zero_probability_branches_are_dropped() {
        // "foo" with a blank between the repeated labels.
        let probs = onehot_table(&[6, 15, 0, 15], 27);
        let hyps = decode_prefix_beam(&log_table(&probs), 10, 0);

        assert_eq!(hyps.len(), 1);
        assert_eq!(hyps[0].labels(), [6, 15, 15]);
        assert_eq!(hyps[0].log_prob(), 0.);

        // Without the blank, the repeat merges.
        let probs = onehot_table(&[6, 15, 15], 27);
        let hyps = decode_prefix_beam(&log_table(&probs), 10, 0);
        assert_eq!(hyps[0].labels(), [6, 15]);
    }

    #[test]
    fn test_smaller_beam_does_not_increase_top_score() {
        let table = log_table(&scenario_table());
        let top_scores: Vec<f64> = (1..=12)
            .map(|beam_size| decode_prefix_beam(&table, beam_size, 0)[0].log_prob())
            .collect();
        assert!(top_scores.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_empty_input() {
        let probs = NdTensor::<f64, 2>::zeros([0, 3]);
        let hyps = decode_prefix_beam(&log_table(&probs), 5, 0);
        assert_eq!(hyps.len(), 1);
        assert_eq!(hyps[0].labels(), [] as [u32; 0]);
        assert_eq!(hyps[0].log_prob(), 0.);
    }

    #[test]
    #[ignore]
    fn bench_prefix_beam() {
        let probs = random_table(1234, 200, 40);
        let table = log_table(&probs);
        run_bench(10, "prefix beam search, 200 steps, 40 labels", || {
            decode_prefix_beam(&table, 32, 0);
        });
    }
}
