use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by dump processing.
///
/// The pipeline cancels on the first error; everything the workers reported
/// is then aggregated through [`join_errors`], which drops cancellation
/// noise whenever a real failure is present.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("network error for {url}")]
    Network {
        url: String,
        #[source]
        source: Box<reqwest::Error>,
    },

    #[error("{op} {}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decompression error")]
    Decompression(#[source] std::io::Error),

    #[error("tokenization error: {0}")]
    Tokenization(String),

    #[error("cannot decode json: {record}")]
    JsonDecode {
        record: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot parse SQL: {detail}: {row}")]
    SqlParse { detail: String, row: String },

    #[error("unexpected type: {0}")]
    UnexpectedType(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("not found")]
    NotFound,

    #[error("cancelled")]
    Cancelled,

    /// Error returned by a caller-supplied handler.
    #[error("{0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    #[error("{}", format_multiple(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Wrap an arbitrary caller error so a handler can fail the pipeline.
    pub fn handler<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Handler(Box::new(err))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        Error::Network {
            url: url.to_owned(),
            source: Box::new(source),
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

fn format_multiple(errors: &[Error]) -> String {
    let mut out = String::from("multiple errors:");
    for err in errors {
        let _ = write!(out, " [{err}]");
    }
    out
}

/// Aggregate the errors collected from all pipeline workers.
///
/// Cancellation errors are suppressed as long as any other kind is present;
/// a run that failed only because it was cancelled reports a single
/// [`Error::Cancelled`]. Several real errors are joined into
/// [`Error::Multiple`].
pub(crate) fn join_errors(errors: Vec<Error>) -> Option<Error> {
    if errors.is_empty() {
        return None;
    }
    let mut real = errors;
    let cancelled = real.iter().any(Error::is_cancelled);
    real.retain(|e| !e.is_cancelled());
    match real.len() {
        0 => cancelled.then_some(Error::Cancelled),
        1 => real.pop(),
        _ => Some(Error::Multiple(real)),
    }
}

/// Trim a raw record to something short enough to embed in an error message.
pub(crate) fn snippet(bytes: &[u8]) -> String {
    const MAX: usize = 256;
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_end();
    if trimmed.len() <= MAX {
        trimmed.to_owned()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_suppresses_cancellations_when_real_errors_exist() {
        let joined = join_errors(vec![
            Error::Cancelled,
            Error::NotFound,
            Error::Cancelled,
        ])
        .unwrap();
        assert!(matches!(joined, Error::NotFound));
    }

    #[test]
    fn join_keeps_a_single_cancellation() {
        let joined = join_errors(vec![Error::Cancelled, Error::Cancelled]).unwrap();
        assert!(joined.is_cancelled());
    }

    #[test]
    fn join_of_nothing_is_none() {
        assert!(join_errors(Vec::new()).is_none());
    }

    #[test]
    fn join_combines_real_errors() {
        let joined = join_errors(vec![
            Error::NotFound,
            Error::InvalidValue("bad".to_owned()),
        ])
        .unwrap();
        match joined {
            Error::Multiple(errs) => assert_eq!(errs.len(), 2),
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn snippet_truncates_long_records() {
        let long = "x".repeat(1000);
        let s = snippet(long.as_bytes());
        assert!(s.len() < 300);
        assert!(s.ends_with('…'));
    }
}
