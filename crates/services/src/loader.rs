use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use exam_core::Clock;
use exam_core::model::{ExamConfig, ExamId};

use crate::error::LoaderError;

/// Everything the loader hands over for one exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDetails {
    pub config: ExamConfig,
    /// Reading passage or other material shown next to the questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_material: Option<String>,
}

impl ExamDetails {
    #[must_use]
    pub fn new(config: ExamConfig) -> Self {
        Self {
            config,
            display_material: None,
        }
    }

    /// Parses an exam document. The config is validated while parsing.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Malformed` if the document is not valid JSON or
    /// describes an invalid exam.
    pub fn from_json(raw: &str) -> Result<Self, LoaderError> {
        serde_json::from_str(raw).map_err(|e| LoaderError::Malformed(e.to_string()))
    }
}

/// Source of exam definitions.
#[async_trait]
pub trait ExamLoader: Send + Sync {
    /// Fetches an exam that may be started now.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::NotFound` for unknown exams, `LoaderError::Access`
    /// when the exam is closed, not yet open or deactivated, and other
    /// variants for source failures.
    async fn get_exam_details(&self, exam_id: ExamId) -> Result<ExamDetails, LoaderError>;
}

/// Loader over exams held in memory, with availability checks against a clock.
#[derive(Clone, Default)]
pub struct InMemoryExamLoader {
    clock: Clock,
    exams: Arc<RwLock<HashMap<ExamId, ExamDetails>>>,
}

impl InMemoryExamLoader {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            exams: Arc::default(),
        }
    }

    /// Adds or replaces an exam.
    pub fn insert(&self, details: ExamDetails) {
        let mut guard = match self.exams.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(details.config.id(), details);
    }

    #[must_use]
    pub fn with_exam(self, details: ExamDetails) -> Self {
        self.insert(details);
        self
    }
}

#[async_trait]
impl ExamLoader for InMemoryExamLoader {
    async fn get_exam_details(&self, exam_id: ExamId) -> Result<ExamDetails, LoaderError> {
        let details = {
            let guard = self
                .exams
                .read()
                .map_err(|e| LoaderError::Unavailable(e.to_string()))?;
            guard
                .get(&exam_id)
                .cloned()
                .ok_or(LoaderError::NotFound(exam_id))?
        };
        details.config.check_access(self.clock.now())?;
        Ok(details)
    }
}
