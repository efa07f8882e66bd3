use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Errors with the inputs to a CTC decoder.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeError {
    /// An entry of the probability table is NaN or positive infinity, or is a
    /// negative probability whose logarithm is undefined.
    InvalidProbability { pos: usize, label: usize },
    /// The blank label is not a column of the probability table.
    InvalidBlank { blank: u32, n_labels: usize },
    /// The beam size is zero.
    InvalidBeamSize,
}

impl Display for DecodeError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidProbability { pos, label } => write!(
                fmt,
                "probability of label {} at position {} is not a valid number",
                label, pos
            ),
            Self::InvalidBlank { blank, n_labels } => write!(
                fmt,
                "blank label {} is out of range for {} labels",
                blank, n_labels
            ),
            Self::InvalidBeamSize => write!(fmt, "beam size must be at least 1"),
        }
    }
}

impl Error for DecodeError {}
