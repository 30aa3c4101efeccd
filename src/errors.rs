// Errors returned by the conversion engine.

use std::{error, fmt, ops::Range, result};

use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{
        self,
        termcolor::{ColorChoice, StandardStream},
    },
};
use thiserror::Error;

use crate::dialect::Dialect;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Errors returned by procshift.
///
/// Only two kinds of error are terminal for a conversion call:
/// [`Error::UnsupportedDirection`] and [`Error::MalformedUnit`]. Problems with
/// individual fragments are reported as [`crate::engine::Warning`]s instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The source and target dialects are identical, or nobody registered a
    /// rule set for this pair.
    #[error("unsupported conversion: {from} to {to}")]
    UnsupportedDirection { from: Dialect, to: Dialect },

    /// The input does not look like a procedural unit we understand.
    #[error(transparent)]
    MalformedUnit(#[from] Box<SourceError>),

    /// Invalid engine configuration.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Another error, wrapped with a note about what we were doing.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// Any other failure, usually from serde or a dialect name parse.
    #[error(transparent)]
    Other(Box<dyn error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Create a new `Error::UnsupportedDirection`.
    pub fn unsupported_direction(from: Dialect, to: Dialect) -> Self {
        Error::UnsupportedDirection { from, to }
    }

    /// Create a new `Error::MalformedUnit` pointing at `span` in `sql`.
    pub fn malformed(sql: &str, span: Range<usize>, reason: impl Into<String>) -> Self {
        Error::MalformedUnit(Box::new(SourceError::new(sql, span, reason)))
    }

    /// Create a new `Error::Other` from an error value.
    pub fn other<E>(e: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Error::Other(Box::<E>::new(e))
    }

    /// Is this one of the errors caused by the caller's input, rather than by
    /// our configuration?
    pub fn is_terminal_input_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedDirection { .. } | Error::MalformedUnit(_)
        )
    }

    /// Print this error to stderr. Malformed units get a source snippet.
    pub fn emit(&self) {
        match self {
            Error::MalformedUnit(e) => {
                e.emit();
            }
            _ => {
                let next = self.skip_transparent();
                eprintln!("ERROR: {}", next);
                let mut source = next.source();
                while let Some(cause) = source {
                    eprintln!("  caused by: {}", cause);
                    source = cause.source();
                }
            }
        }
    }

    /// The error that actually has something to say, unwrapping boxed ones.
    pub fn skip_transparent(&self) -> &(dyn error::Error + 'static) {
        match self {
            Error::MalformedUnit(e) => e.as_ref(),
            Error::Other(e) => e.as_ref(),
            Error::UnsupportedDirection { .. } | Error::Config { .. } | Error::Context { .. } => {
                self
            }
        }
    }
}

/// Format an error message.
macro_rules! format_err {
    ($($arg:tt)*) => {
        $crate::errors::Error::Other(format!($($arg)*).into())
    };
}

// Make the macro importable as `crate::errors::format_err`.
pub(crate) use format_err;

/// Attach a note to errors from other crates.
pub trait Context<T, E>: Sized {
    fn with_context<S, F>(self, context_fn: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S,
    {
        self.context(context_fn())
    }

    fn context<S>(self, context: S) -> Result<T>
    where
        S: Into<String>;
}

impl<T, E> Context<T, E> for Result<T, E>
where
    E: error::Error + Send + Sync + 'static,
{
    fn context<S>(self, context: S) -> Result<T>
    where
        S: Into<String>,
    {
        self.map_err(|e| Error::Context {
            context: context.into(),
            source: Box::new(Error::other(e)),
        })
    }
}

/// A structural problem in SQL source code supplied by the user.
#[derive(Debug)]
pub struct SourceError {
    /// Short human-readable reason, like "unbalanced BEGIN/END".
    pub reason: String,
    /// Byte range of the offending text.
    pub span: Range<usize>,
    pub files: SimpleFile<&'static str, String>,
    pub diagnostic: Diagnostic<()>,
}

impl SourceError {
    /// Build a diagnostic for `span` in `sql`.
    pub fn new(sql: &str, span: Range<usize>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        // Clamp so `codespan_reporting` never sees an out-of-range label.
        let end = span.end.min(sql.len());
        let start = span.start.min(end);
        let diagnostic = Diagnostic::error()
            .with_message("malformed procedural unit")
            .with_labels(vec![Label::primary((), start..end).with_message(reason.clone())]);
        Self {
            reason,
            span: start..end,
            files: SimpleFile::new("<input>", sql.to_owned()),
            diagnostic,
        }
    }

    pub fn emit(&self) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        let mut lock = writer.lock();
        if let Err(err) = term::emit(&mut lock, &config, &self.files, &self.diagnostic) {
            eprintln!("ERROR: {} (could not render diagnostic: {})", self, err);
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed procedural unit: {}", self.reason)
    }
}

impl error::Error for SourceError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn malformed_unit_keeps_reason_and_clamps_span() {
        let err = Error::malformed("BEGIN", 0..99, "unbalanced BEGIN/END");
        match &err {
            Error::MalformedUnit(e) => {
                assert_eq!(e.span, 0..5);
                assert_eq!(e.reason, "unbalanced BEGIN/END");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "malformed procedural unit: unbalanced BEGIN/END"
        );
        assert!(err.is_terminal_input_error());
    }

    #[test]
    fn context_wraps_foreign_errors() {
        let parsed: Result<u32, _> = "x".parse::<u32>().context("could not parse indent");
        let err = parsed.unwrap_err();
        assert!(err.to_string().starts_with("could not parse indent: "));
        assert!(!err.is_terminal_input_error());
    }
}
