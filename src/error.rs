//! Error taxonomy for the pipeline.
//!
//! Every failure is either absorbed at its call site ([`FailurePolicy::Degrade`])
//! or propagated to the top of the run ([`FailurePolicy::Abort`]). Nothing is
//! retried.

use std::io;

use thiserror::Error;

/// What a call site does when the operation behind it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Substitute null/sentinel values and keep going.
    Degrade,
    /// Terminate the whole run.
    Abort,
}

impl FailurePolicy {
    /// Resolve a failed step: `Abort` hands `error` back, `Degrade` swaps in
    /// whatever `fallback` builds from it.
    pub fn on_error<T>(self, error: PipelineError, fallback: impl FnOnce(&PipelineError) -> T) -> Result<T> {
        match self {
            Self::Degrade => Ok(fallback(&error)),
            Self::Abort => Err(error),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot coerce {field} value {value:?}: {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("boundary file unusable: {0}")]
    Boundary(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl PipelineError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn parse(field: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Transport-level failures (the ones a `Degrade` call site may swallow).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
