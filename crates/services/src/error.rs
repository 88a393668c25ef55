//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AccessError, ConfigError, ExamId, QuestionId};

use crate::sessions::SessionState;

/// Errors emitted by the remote session API client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote session API is not configured")]
    Disabled,
    #[error("remote session API returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("remote session API returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by exam loaders.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoaderError {
    #[error("exam {0} not found")]
    NotFound(ExamId),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("exam document is malformed: {0}")]
    Malformed(String),
    #[error("exam source unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by the session controller.
///
/// Loader errors prevent a session from starting. The remaining
/// variants reject a single operation and leave the session untouched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("session already started")]
    AlreadyStarted,
    #[error("session is not active (state: {state})")]
    NotActive { state: SessionState },
    #[error("question index {index} out of range for {count} questions")]
    InvalidQuestionIndex { index: usize, count: usize },
    #[error("this exam does not allow going back from question {} to {}", .current + 1, .index + 1)]
    ReviewNotAllowed { index: usize, current: usize },
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
    #[error("answer does not fit question {0}")]
    AnswerKindMismatch(QuestionId),
}

/// Errors raised while reading engine configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineConfigError {
    #[error("{name} must be a positive integer, got {raw:?}")]
    InvalidNumber { name: &'static str, raw: String },
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}
