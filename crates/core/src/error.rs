use thiserror::Error;

use crate::model::{AccessError, ConfigError, QuestionError, SnapshotError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
