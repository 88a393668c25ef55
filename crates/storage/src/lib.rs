#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    ExamResultRepository, InMemoryRepository, ResultRow, SessionStore, Storage, StorageError,
    decode_snapshot, encode_snapshot,
};
