use exam_core::model::{ExamId, ExamSession, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, exam_id_to_i64, map_snapshot_row, user_id_to_i64};
use crate::repository::{SessionStore, StorageError, encode_snapshot};

#[async_trait::async_trait]
impl SessionStore for SqliteRepository {
    async fn save_snapshot(&self, session: &ExamSession) -> Result<(), StorageError> {
        let payload = encode_snapshot(session)?;

        // The WHERE clause drops writes captured before the stored snapshot.
        sqlx::query(
            r"
                INSERT INTO session_snapshots (
                    session_id, exam_id, user_id, is_completed, payload, last_updated_ms
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(session_id) DO UPDATE SET
                    exam_id = excluded.exam_id,
                    user_id = excluded.user_id,
                    is_completed = excluded.is_completed,
                    payload = excluded.payload,
                    last_updated_ms = excluded.last_updated_ms
                WHERE excluded.last_updated_ms >= session_snapshots.last_updated_ms
            ",
        )
        .bind(session.id().as_str())
        .bind(exam_id_to_i64(session.exam_id())?)
        .bind(user_id_to_i64(session.user_id())?)
        .bind(session.is_completed())
        .bind(payload)
        .bind(session.last_updated().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn load_snapshot(&self, id: &SessionId) -> Result<Option<ExamSession>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload
                FROM session_snapshots
                WHERE session_id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_snapshot_row).transpose()
    }

    async fn delete_snapshot(&self, id: &SessionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_snapshots WHERE session_id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn find_in_progress(
        &self,
        exam_id: ExamId,
        user_id: UserId,
    ) -> Result<Option<ExamSession>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload
                FROM session_snapshots
                WHERE exam_id = ?1 AND user_id = ?2 AND is_completed = 0
                ORDER BY last_updated_ms DESC
                LIMIT 1
            ",
        )
        .bind(exam_id_to_i64(exam_id)?)
        .bind(user_id_to_i64(user_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_snapshot_row).transpose()
    }
}
