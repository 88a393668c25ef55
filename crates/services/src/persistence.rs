//! Best-effort persistence of session snapshots and results.
//!
//! Nothing here fails an exam operation: storage and remote errors are logged
//! and reported back as a flag so the caller can retry on the next cycle.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use exam_core::model::{ExamId, ExamResult, ExamSession, SessionId, UserId};
use storage::{ResultRow, Storage, StorageError};

use crate::remote::RemoteSessionApi;

#[derive(Clone)]
pub struct PersistenceAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    remote: Option<Arc<dyn RemoteSessionApi>>,
    // Snapshot writes go through one at a time so a slow save can't land after a newer one.
    writes: Mutex<()>,
}

impl PersistenceAdapter {
    #[must_use]
    pub fn new(storage: Storage, remote: Option<Arc<dyn RemoteSessionApi>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                remote,
                writes: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn local(storage: Storage) -> Self {
        Self::new(storage, None)
    }

    #[must_use]
    pub fn remote(&self) -> Option<&Arc<dyn RemoteSessionApi>> {
        self.inner.remote.as_ref()
    }

    /// Writes a snapshot to local storage. Returns whether it was stored.
    pub async fn save(&self, session: &ExamSession) -> bool {
        let _guard = self.inner.writes.lock().await;
        match self.inner.storage.sessions.save_snapshot(session).await {
            Ok(()) => {
                debug!(session_id = %session.id(), remaining = session.time_remaining(), "snapshot saved");
                true
            }
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "failed to save snapshot");
                false
            }
        }
    }

    /// Loads a snapshot from local storage, then from the remote mirror.
    ///
    /// The returned session is not yet validated against its exam.
    pub async fn load(&self, id: &SessionId) -> Option<ExamSession> {
        match self.inner.storage.sessions.load_snapshot(id).await {
            Ok(Some(session)) => return Some(session),
            Ok(None) => {}
            Err(err) => warn!(session_id = %id, error = %err, "failed to read local snapshot"),
        }

        let remote = self.inner.remote.as_ref()?;
        match remote.get_session(id).await {
            Ok(found) => found,
            Err(err) => {
                warn!(session_id = %id, error = %err, "failed to fetch remote session");
                None
            }
        }
    }

    /// Most recent unfinished attempt of `user_id` on `exam_id`, if any.
    pub async fn find_in_progress(&self, exam_id: ExamId, user_id: UserId) -> Option<ExamSession> {
        match self
            .inner
            .storage
            .sessions
            .find_in_progress(exam_id, user_id)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(%exam_id, %user_id, error = %err, "failed to look up unfinished session");
                None
            }
        }
    }

    /// Removes the snapshot. Returns whether the store accepted the delete.
    pub async fn delete(&self, id: &SessionId) -> bool {
        let _guard = self.inner.writes.lock().await;
        match self.inner.storage.sessions.delete_snapshot(id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(session_id = %id, error = %err, "failed to delete snapshot");
                false
            }
        }
    }

    /// Pushes progress to the remote mirror. Without a remote this is a no-op
    /// that reports success.
    pub async fn sync_remote(&self, session: &ExamSession) -> bool {
        let Some(remote) = self.inner.remote.as_ref() else {
            return true;
        };
        match remote.save_progress(session).await {
            Ok(()) => true,
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "failed to sync progress");
                false
            }
        }
    }

    /// Appends a result to the history. Returns the row id when stored.
    pub async fn record_result(&self, result: &ExamResult) -> Option<i64> {
        match self.inner.storage.results.append_result(result).await {
            Ok(id) => Some(id),
            Err(StorageError::Conflict) => {
                warn!(session_id = %result.session_id, "result already recorded");
                None
            }
            Err(err) => {
                warn!(session_id = %result.session_id, error = %err, "failed to record result");
                None
            }
        }
    }

    /// Stored result of a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result store cannot be read.
    pub async fn result(&self, session_id: &SessionId) -> Result<Option<ExamResult>, StorageError> {
        self.inner.storage.results.get_result(session_id).await
    }

    /// Newest results of an exam first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result store cannot be read.
    pub async fn list_results(
        &self,
        exam_id: ExamId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        self.inner.storage.results.list_results(exam_id, limit).await
    }
}
