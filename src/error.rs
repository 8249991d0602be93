//! Error taxonomy for the coverage core.
//!
//! `Parse` and `AmbiguousPath` are surfaced to the caller because they
//! compromise downstream aggregation and diffing. Per-line numeric failures
//! inside adapters are not errors at all: the affected line is skipped and
//! parsing continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoverageError {
    /// Structurally invalid report input. Aborts the single adapter
    /// invocation that hit it, never a whole batch.
    #[error("failed to parse {format} report: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// Two FILE nodes claim the same relative path. Coverage can no longer
    /// be unambiguously attributed to either, so the operation that found
    /// the duplicate is refused.
    #[error("ambiguous relative path '{0}': more than one file node")]
    AmbiguousPath(String),

    /// Local filesystem failure while reading report bytes.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A storage or build-history collaborator failed.
    #[error("storage collaborator failed: {0}")]
    Storage(anyhow::Error),

    /// No registered adapter recognized the input.
    #[error("no adapter matched the supplied report")]
    UnknownFormat,
}

pub type Result<T> = std::result::Result<T, CoverageError>;

impl CoverageError {
    pub(crate) fn parse(format: &'static str, message: impl ToString) -> Self {
        CoverageError::Parse {
            format,
            message: message.to_string(),
        }
    }
}
