use exam_core::model::{ExamId, ExamResult, ExamSession, UserId};
use sqlx::Row;

use crate::repository::{StorageError, decode_snapshot};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn exam_id_to_i64(id: ExamId) -> Result<i64, StorageError> {
    id_i64("exam_id", id.value())
}

pub(crate) fn user_id_to_i64(id: UserId) -> Result<i64, StorageError> {
    id_i64("user_id", id.value())
}

pub(crate) fn map_snapshot_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExamSession, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    decode_snapshot(&payload)
}

pub(crate) fn map_result_payload(row: &sqlx::sqlite::SqliteRow) -> Result<ExamResult, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    serde_json::from_str(&payload).map_err(ser)
}
