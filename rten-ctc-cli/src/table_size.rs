use std::str::FromStr;

/// Shape of a generated probability table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableSize {
    /// Number of time steps.
    pub seq: usize,

    /// Number of labels, including the blank.
    pub n_labels: usize,
}

impl TableSize {
    /// Parse a table size in the form `<seq>x<n_labels>`, eg. `50x29`.
    pub fn parse(spec: &str) -> Result<TableSize, ParseError> {
        let Some((seq_str, labels_str)) = spec.split_once(['x', 'X']) else {
            return Err(ParseError::new(spec, ParseErrorKind::InvalidFormat));
        };

        let parse_size = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::new(spec, ParseErrorKind::InvalidSize))
        };
        let seq = parse_size(seq_str)?;
        let n_labels = parse_size(labels_str)?;
        if n_labels == 0 {
            return Err(ParseError::new(spec, ParseErrorKind::NoLabels));
        }

        Ok(TableSize { seq, n_labels })
    }
}

impl FromStr for TableSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableSize::parse(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ParseErrorKind {
    /// Spec doesn't match "<seq>x<n_labels>".
    InvalidFormat,
    /// A size is not a non-negative integer.
    InvalidSize,
    /// The label count is zero, which leaves no room for the blank.
    NoLabels,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    spec: String,
    kind: ParseErrorKind,
}

impl ParseError {
    fn new(spec: &str, kind: ParseErrorKind) -> ParseError {
        ParseError {
            spec: spec.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseErrorKind::InvalidFormat => write!(
                fmt,
                "invalid table size \"{}\": expected <seq>x<n_labels>",
                self.spec
            ),
            ParseErrorKind::InvalidSize => write!(
                fmt,
                "invalid table size \"{}\". Sizes must be non-negative integers.",
                self.spec
            ),
            ParseErrorKind::NoLabels => write!(
                fmt,
                "invalid table size \"{}\". The table needs at least one label.",
                self.spec
            ),
        }
    }
}

impl std::error::Error for ParseError {}
