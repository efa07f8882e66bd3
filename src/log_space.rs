//! Arithmetic on probabilities stored as natural logarithms.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

/// Float type which can hold a probability in log space.
///
/// Decoders are generic over this trait so they can consume `f32` model
/// outputs directly, or `f64` tables where extra precision matters.
pub trait LogProb:
    Copy
    + Debug
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
{
    /// Log probability of an impossible event, `ln(0) = -inf`.
    const ZERO: Self;

    /// Log probability of a certain event, `ln(1) = 0`.
    const ONE: Self;

    /// Positive infinity. Never a valid log probability.
    const INFINITY: Self;

    fn ln(self) -> Self;
    fn exp(self) -> Self;
    fn ln_1p(self) -> Self;
    fn is_nan(self) -> bool;

    /// Compare two values using the IEEE 754 total order.
    fn total_cmp(&self, other: &Self) -> Ordering;
}

macro_rules! impl_log_prob {
    ($type:ty) => {
        impl LogProb for $type {
            const ZERO: Self = <$type>::NEG_INFINITY;
            const ONE: Self = 0.;
            const INFINITY: Self = <$type>::INFINITY;

            fn ln(self) -> Self {
                <$type>::ln(self)
            }

            fn exp(self) -> Self {
                <$type>::exp(self)
            }

            fn ln_1p(self) -> Self {
                <$type>::ln_1p(self)
            }

            fn is_nan(self) -> bool {
                <$type>::is_nan(self)
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                <$type>::total_cmp(self, other)
            }
        }
    };
}

impl_log_prob!(f32);
impl_log_prob!(f64);

/// Add two probabilities in log space, ie. compute `ln(exp(a) + exp(b))`.
///
/// The larger value is factored out so `exp` is only evaluated on a
/// non-positive argument, which avoids overflow. If the smaller value is
/// log-zero the larger one is returned unchanged, so adding two log-zero
/// values gives log-zero rather than NaN.
pub fn log_add_exp<T: LogProb>(a: T, b: T) -> T {
    let (hi, lo) = if a < b { (b, a) } else { (a, b) };
    if lo == T::ZERO {
        hi
    } else {
        hi + (lo - hi).exp().ln_1p()
    }
}

/// Sum probabilities in log space, ie. compute
///
/// ```text
/// log(exp(log_probs[0]) + exp(log_probs[1]) ...)
/// ```
///
/// Values are combined pairwise from left to right with [`log_add_exp`]. An
/// empty input, or one where every value is log-zero, sums to log-zero.
pub fn log_sum_exp<T: LogProb, I: IntoIterator<Item = T>>(log_probs: I) -> T {
    log_probs.into_iter().fold(T::ZERO, log_add_exp)
}
