use std::fmt;
use std::io;

pub(crate) type AmbraResult<T> = Result<T, Error>;

/// Errors that can occur during ambra usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar definition
    /// or a bundle file if the `dump` feature is enabled
    Io(io::Error),

    /// JSON parsing failed when loading a grammar definition.
    Json(serde_json::Error),

    /// A grammar definition is malformed. Detected when compiling, the grammar is not
    /// registered.
    #[allow(missing_docs)]
    Definition { grammar: String, message: String },

    /// An `illegal` pattern matched while scanning in strict mode.
    #[allow(missing_docs)]
    IllegalLexeme {
        grammar: String,
        lexeme: String,
        mode: String,
        index: usize,
    },

    /// A begin and an end matched the same empty position while scanning in strict mode.
    /// This is always a bug in the grammar.
    #[allow(missing_docs)]
    ZeroWidthMatch { grammar: String, index: usize },

    /// The scanner iterated way more than it matched, most likely because of a grammar
    /// producing empty matches forever.
    #[allow(missing_docs)]
    InfiniteLoop { grammar: String, index: usize },

    /// A grammar was not found in the registry.
    /// Only happens when asking to scan something with a grammar we can't find
    GrammarNotFound(String),

    /// A combined mode matcher failed to compile.
    /// Those are built lazily on first use so we can't validate them all ahead.
    TokenizeRegex(String),
}

impl Error {
    /// Whether this error is one that lenient scans turn into an `illegal` result
    pub(crate) fn is_illegal(&self) -> bool {
        matches!(self, Error::IllegalLexeme { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::Definition { grammar, message } => {
                write!(f, "invalid definition for grammar '{}': {}", grammar, message)
            }
            Error::IllegalLexeme { lexeme, mode, .. } => {
                write!(f, "Illegal lexeme \"{}\" for mode \"{}\"", lexeme, mode)
            }
            Error::ZeroWidthMatch { grammar, index } => {
                write!(f, "0 width match regex ({}) at index {}", grammar, index)
            }
            Error::InfiniteLoop { grammar, index } => write!(
                f,
                "potential infinite loop in grammar '{}' at index {}, way more iterations than matches",
                grammar, index
            ),
            Error::GrammarNotFound(name) => write!(f, "grammar '{}' not found", name),
            Error::TokenizeRegex(message) => write!(f, "regex compilation error: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Definition { .. }
            | Error::IllegalLexeme { .. }
            | Error::ZeroWidthMatch { .. }
            | Error::InfiniteLoop { .. }
            | Error::GrammarNotFound(_)
            | Error::TokenizeRegex(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
