use exam_core::model::{ExamId, ExamResult, SessionId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, exam_id_to_i64, map_result_payload, ser, user_id_to_i64};
use crate::repository::{ExamResultRepository, ResultRow, StorageError};

#[async_trait::async_trait]
impl ExamResultRepository for SqliteRepository {
    async fn append_result(&self, result: &ExamResult) -> Result<i64, StorageError> {
        let payload = serde_json::to_string(result).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO exam_results (
                    session_id, exam_id, user_id, percentage, passed, completed_at_ms, payload
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(result.session_id.as_str())
        .bind(exam_id_to_i64(result.exam_id)?)
        .bind(user_id_to_i64(result.user_id)?)
        .bind(i64::from(result.percentage))
        .bind(result.passed)
        .bind(result.completed_at.timestamp_millis())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            other => conn(other),
        })?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, session_id: &SessionId) -> Result<Option<ExamResult>, StorageError> {
        let row = sqlx::query("SELECT payload FROM exam_results WHERE session_id = ?1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_result_payload).transpose()
    }

    async fn list_results(&self, exam_id: ExamId, limit: u32) -> Result<Vec<ResultRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, payload
                FROM exam_results
                WHERE exam_id = ?1
                ORDER BY completed_at_ms DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(exam_id_to_i64(exam_id)?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(ResultRow::new(id, map_result_payload(&row)?));
        }
        Ok(out)
    }
}
