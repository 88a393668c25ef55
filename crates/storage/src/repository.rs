use async_trait::async_trait;
use exam_core::model::{ExamId, ExamResult, ExamSession, SessionId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a session as the JSON payload stored by key/value backends.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_snapshot(session: &ExamSession) -> Result<String, StorageError> {
    serde_json::to_string(session).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decodes a stored JSON payload.
///
/// The decoded session is not yet checked against its exam; callers run
/// `ExamSession::validate_against` before resuming it.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the payload is malformed.
pub fn decode_snapshot(raw: &str) -> Result<ExamSession, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A stored result with its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: i64,
    pub result: ExamResult,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: i64, result: ExamResult) -> Self {
        Self { id, result }
    }
}

/// Key/value store of session snapshots, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writes a snapshot. Last write wins, judged by `last_updated`: a
    /// snapshot captured before the stored one is ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_snapshot(&self, session: &ExamSession) -> Result<(), StorageError>;

    /// Fetches a snapshot by session id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend or decoding failures.
    async fn load_snapshot(&self, id: &SessionId) -> Result<Option<ExamSession>, StorageError>;

    /// Removes a snapshot. Removing a missing snapshot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn delete_snapshot(&self, id: &SessionId) -> Result<(), StorageError>;

    /// Most recently updated unfinished snapshot of `user_id` for `exam_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend or decoding failures.
    async fn find_in_progress(
        &self,
        exam_id: ExamId,
        user_id: UserId,
    ) -> Result<Option<ExamSession>, StorageError>;
}

/// Append-only history of scored attempts.
#[async_trait]
pub trait ExamResultRepository: Send + Sync {
    /// Appends a result and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a result for the session already exists.
    async fn append_result(&self, result: &ExamResult) -> Result<i64, StorageError>;

    /// Fetches the result of a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend or decoding failures.
    async fn get_result(&self, session_id: &SessionId) -> Result<Option<ExamResult>, StorageError>;

    /// Lists results for an exam, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend or decoding failures.
    async fn list_results(&self, exam_id: ExamId, limit: u32) -> Result<Vec<ResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<SessionId, ExamSession>>>,
    results: Arc<Mutex<Vec<ResultRow>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryRepository {
    async fn save_snapshot(&self, session: &ExamSession) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let is_stale = guard
            .get(session.id())
            .is_some_and(|existing| existing.last_updated() > session.last_updated());
        if !is_stale {
            guard.insert(session.id().clone(), session.clone());
        }
        Ok(())
    }

    async fn load_snapshot(&self, id: &SessionId) -> Result<Option<ExamSession>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn delete_snapshot(&self, id: &SessionId) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(id);
        Ok(())
    }

    async fn find_in_progress(
        &self,
        exam_id: ExamId,
        user_id: UserId,
    ) -> Result<Option<ExamSession>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|s| s.exam_id() == exam_id && s.user_id() == user_id && !s.is_completed())
            .max_by_key(|s| s.last_updated())
            .cloned())
    }
}

#[async_trait]
impl ExamResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &ExamResult) -> Result<i64, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|row| row.result.session_id == result.session_id) {
            return Err(StorageError::Conflict);
        }
        let id = i64::try_from(guard.len() + 1)
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?;
        guard.push(ResultRow::new(id, result.clone()));
        Ok(id)
    }

    async fn get_result(&self, session_id: &SessionId) -> Result<Option<ExamResult>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .find(|row| &row.result.session_id == session_id)
            .map(|row| row.result.clone()))
    }

    async fn list_results(&self, exam_id: ExamId, limit: u32) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<ResultRow> = guard
            .iter()
            .filter(|row| row.result.exam_id == exam_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.result
                .completed_at
                .cmp(&a.result.completed_at)
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates the engine's repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionStore>,
    pub results: Arc<dyn ExamResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let sessions: Arc<dyn SessionStore> = Arc::new(repo.clone());
        let results: Arc<dyn ExamResultRepository> = Arc::new(repo);
        Self { sessions, results }
    }
}
