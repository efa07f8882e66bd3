//! Internal testing utilities for the rten-ctc crates.

use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::time::Instant;

use rten_tensor::NdTensor;

/// Utility for creating parametrized (aka. table-driven) tests.
///
/// Create a `Debug` struct, conventionally named `Case`, holding the data for
/// one test case, build a collection of cases and call `test_each` with the
/// test function. All cases are run even if some of them panic. Afterwards
/// `test_each` panics with the debug representation of every failing case.
///
/// ```
/// use rten_ctc_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///   path: Vec<u32>,
///   len: usize,
/// }
///
/// let cases = [Case { path: vec![1, 0, 2], len: 3 }];
/// cases.test_each(|case| assert_eq!(case.path.len(), case.len));
/// ```
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching any panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes cases by
    /// value. Each case is formatted before the test runs so it can be
    /// reported if the test panics.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        assert!(
            failures.is_empty(),
            "{} test cases failed: {:?}",
            failures.len(),
            failures
        );
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        for case in self {
            let test = &test;
            let case_str = format!("{:?}", case);
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push(case_str);
            }
        }
        assert!(
            failures.is_empty(),
            "{} test cases failed: {:?}",
            failures.len(),
            failures
        );
    }
}

/// Error returned by [`expect_close`].
#[derive(Debug)]
pub struct NotCloseError {
    pub actual: f64,
    pub expected: f64,
    pub tolerance: f64,
}

impl Display for NotCloseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} is not within {} of {}",
            self.actual, self.tolerance, self.expected
        )
    }
}

impl Error for NotCloseError {}

/// Check that `actual` is within `tolerance` of `expected`.
///
/// Equal values always match, so two log-zero (`-inf`) values are considered
/// close.
pub fn expect_close(
    actual: impl Into<f64>,
    expected: impl Into<f64>,
    tolerance: f64,
) -> Result<(), NotCloseError> {
    let (actual, expected) = (actual.into(), expected.into());
    if actual == expected || (actual - expected).abs() <= tolerance {
        Ok(())
    } else {
        Err(NotCloseError {
            actual,
            expected,
            tolerance,
        })
    }
}

/// Create a `[seq.len(), n_labels]` probability table where the label at each
/// time step has probability 1 and every other label has probability 0.
pub fn onehot_table(seq: &[u32], n_labels: usize) -> NdTensor<f64, 2> {
    let mut table = NdTensor::zeros([seq.len(), n_labels]);
    for (t, &label) in seq.iter().enumerate() {
        table[[t, label as usize]] = 1.;
    }
    table
}

/// Create a `[steps, n_labels]` table of random, strictly positive
/// probabilities where each row sums to 1.
///
/// The same seed always produces the same table.
pub fn random_table(seed: u64, steps: usize, n_labels: usize) -> NdTensor<f64, 2> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut table = NdTensor::zeros([steps, n_labels]);
    for t in 0..steps {
        let row: Vec<f64> = (0..n_labels).map(|_| 0.05 + rng.f64()).collect();
        let total: f64 = row.iter().sum();
        for (label, p) in row.into_iter().enumerate() {
            table[[t, label]] = p / total;
        }
    }
    table
}

/// Statistics from a benchmark run. All fields are durations in milliseconds.
#[derive(Debug, Default)]
pub struct BenchStats {
    pub max: f32,
    pub mean: f32,
    pub median: f32,
    pub min: f32,
}

/// Run `f` for `trials` iterations and print timing statistics.
pub fn run_bench<F: FnMut(), D: Display>(trials: usize, description: D, mut f: F) -> BenchStats {
    if trials == 0 {
        return BenchStats::default();
    }

    let mut times: Vec<f32> = (0..trials)
        .map(|_| {
            let start = Instant::now();
            f();
            (start.elapsed().as_secs_f64() * 1000.0) as f32
        })
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));

    let min = times[0];
    let max = times[times.len() - 1];
    let median = times[times.len() / 2];
    let mean = times.iter().sum::<f32>() / times.len() as f32;

    println!(
        "{}. mean {:.3}ms median {:.3} min {:.3} max {:.3}",
        description, mean, median, min, max
    );

    BenchStats {
        max,
        mean,
        median,
        min,
    }
}
