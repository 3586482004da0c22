use core::fmt;

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Classifies a decode failure.
///
/// Every failure is fatal to the decode that produced it; the kind lets
/// callers distinguish broken files from files using features outside the
/// baseline sequential subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The marker structure of the file is invalid (missing SOI, an
    /// unexpected marker in header position, a malformed segment).
    MalformedHeader,
    /// The file is a valid JPEG, but uses a feature outside the baseline
    /// sequential subset (progressive frames, 12-bit precision, ...).
    UnsupportedFeature,
    /// A quantization or Huffman table definition is invalid.
    TableError,
    /// Entropy-coded data referenced a Huffman code that does not exist,
    /// or decoded a coefficient length outside the baseline limits.
    HuffmanError,
    /// The entropy-coded stream is truncated, contains an invalid escape
    /// sequence, or a run-length overran an 8x8 block.
    StreamError,
    /// The frame dimensions exceed [`crate::MAX_DIMENSION`].
    TooLarge,
    /// An embedded ICC profile is split into inconsistent chunks.
    IccError,
}

/// The error type returned by all fallible decoder operations.
#[derive(Clone, Copy)]
pub struct Error {
    kind: ErrorKind,
    msg: &'static str,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, msg: &'static str) -> Self {
        Self { kind, msg }
    }

    /// Returns the classification of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.msg)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.msg)
    }
}

impl std::error::Error for Error {}
