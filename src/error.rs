use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Everything that can go wrong inside a pipeline.
///
/// The first three kinds form the parse-failure family recognised by
/// [`is_parse`](IterError::is_parse); the backtracking combinators catch
/// exactly that family and let everything else propagate. Host I/O errors
/// are held behind `Arc` so the whole enum stays cheap to clone: failure
/// states hand a copy of their error to catch handlers while remaining
/// intact themselves.
#[derive(Debug, Clone, Error)]
pub enum IterError {
    /// The stream ended while a consumer still needed input. Carries the
    /// original host error when it arose from an I/O operation.
    #[error("unexpected end of input")]
    Eof(Option<Arc<io::Error>>),

    /// A parser needed one of a set of tokens and saw something else.
    #[error("saw {saw:?}, expected one of {{{}}}", .tokens.join(", "))]
    Expected { saw: String, tokens: Vec<String> },

    /// Any other parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// A generic failure raised with [`Iter::fail`](crate::Iter::fail).
    #[error("{0}")]
    Message(String),

    /// A host I/O error lifted into the pipeline.
    #[error("{0}")]
    Io(Arc<io::Error>),
}

impl IterError {
    /// Classifies a host error: end-of-file becomes [`IterError::Eof`]
    /// (so parse combinators treat starvation and truncated files alike),
    /// everything else becomes [`IterError::Io`].
    pub fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            IterError::Eof(Some(Arc::new(err)))
        } else {
            IterError::Io(Arc::new(err))
        }
    }

    /// An expected-token failure.
    pub fn expected(saw: impl Into<String>, tokens: Vec<String>) -> Self {
        IterError::Expected {
            saw: saw.into(),
            tokens,
        }
    }

    /// Whether this failure belongs to the parse family caught by the
    /// backtracking combinators.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            IterError::Eof(_) | IterError::Expected { .. } | IterError::Parse(_)
        )
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, IterError::Eof(_))
    }

    /// Combines two expected-token failures into one whose token set is
    /// the union of both, keeping the later failure's description of what
    /// was actually seen. Any other combination keeps `second` unchanged.
    pub fn merge_expected(first: Self, second: Self) -> Self {
        match (first, second) {
            (
                IterError::Expected { tokens: mut acc, .. },
                IterError::Expected { saw, tokens },
            ) => {
                for token in tokens {
                    if !acc.contains(&token) {
                        acc.push(token);
                    }
                }
                IterError::Expected { saw, tokens: acc }
            }
            (_, second) => second,
        }
    }

    /// Unwraps the end-of-input classification so top-level callers see
    /// the host error that actually occurred.
    pub(crate) fn into_host(self) -> Self {
        match self {
            IterError::Eof(Some(err)) => IterError::Io(err),
            other => other,
        }
    }
}

impl From<io::Error> for IterError {
    fn from(err: io::Error) -> Self {
        IterError::from_io(err)
    }
}
