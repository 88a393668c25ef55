use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{ExamId, QuestionId};
use crate::model::question::{Question, QuestionError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons an exam configuration cannot back a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("exam title cannot be empty")]
    EmptyTitle,

    #[error("exam has no questions")]
    EmptyQuestionSet,

    #[error("time limit must be > 0 minutes")]
    InvalidTimeLimit,

    #[error("passing score must be between 0 and 100, got {0}")]
    InvalidPassingScore(u32),

    #[error("question id {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("declared total points ({declared}) do not match question points ({sum})")]
    PointsMismatch { declared: u32, sum: u32 },

    #[error("exam window closes before it opens")]
    InvalidWindow,

    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// Exam availability problems. These come from the loader side and are
/// surfaced to the student unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessError {
    #[error("exam opens at {opens_at}")]
    NotYetOpen { opens_at: DateTime<Utc> },

    #[error("exam closed at {closed_at}")]
    Expired { closed_at: DateTime<Utc> },

    #[error("exam is deactivated")]
    Deactivated,
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Immutable exam definition loaded once per attempt.
///
/// Questions are kept sorted by their display order. Total points are the sum
/// of question points; a declared total that disagrees is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExamConfigRecord", into = "ExamConfigRecord")]
#[allow(clippy::struct_excessive_bools)]
pub struct ExamConfig {
    id: ExamId,
    title: String,
    time_limit_minutes: u32,
    questions: Vec<Question>,
    total_points: u32,
    passing_score: u32,
    shuffle_questions: bool,
    allow_review: bool,
    show_results: bool,
    opens_at: Option<DateTime<Utc>>,
    closes_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl ExamConfig {
    /// Creates a validated configuration with default flags
    /// (no shuffling, review and results allowed, always open).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the exam has no questions, a zero time limit,
    /// a passing score above 100, duplicate question ids or invalid questions.
    pub fn new(
        id: ExamId,
        title: impl Into<String>,
        time_limit_minutes: u32,
        questions: Vec<Question>,
        passing_score: u32,
    ) -> Result<Self, ConfigError> {
        ExamConfigRecord {
            id,
            title: title.into(),
            time_limit_minutes,
            questions,
            total_points: None,
            passing_score,
            shuffle_questions: false,
            allow_review: true,
            show_results: true,
            opens_at: None,
            closes_at: None,
            is_active: true,
        }
        .try_into()
    }

    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle_questions = shuffle;
        self
    }

    #[must_use]
    pub fn with_review(mut self, allow_review: bool) -> Self {
        self.allow_review = allow_review;
        self
    }

    #[must_use]
    pub fn with_show_results(mut self, show_results: bool) -> Self {
        self.show_results = show_results;
        self
    }

    #[must_use]
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Restricts the exam to a time window.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidWindow` if `closes_at` precedes `opens_at`.
    pub fn with_window(
        mut self,
        opens_at: Option<DateTime<Utc>>,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ConfigError> {
        if let (Some(open), Some(close)) = (opens_at, closes_at)
            && close < open
        {
            return Err(ConfigError::InvalidWindow);
        }
        self.opens_at = opens_at;
        self.closes_at = closes_at;
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> ExamId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes
    }

    /// The full countdown budget of an attempt, in seconds.
    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_minutes.saturating_mul(60)
    }

    /// Questions in display order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(Question::id).collect()
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    /// Minimum percentage needed to pass.
    #[must_use]
    pub fn passing_score(&self) -> u32 {
        self.passing_score
    }

    #[must_use]
    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }

    #[must_use]
    pub fn allow_review(&self) -> bool {
        self.allow_review
    }

    #[must_use]
    pub fn show_results(&self) -> bool {
        self.show_results
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Checks whether the exam may be started at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AccessError` if the exam is deactivated, not yet open, or closed.
    pub fn check_access(&self, now: DateTime<Utc>) -> Result<(), AccessError> {
        if !self.is_active {
            return Err(AccessError::Deactivated);
        }
        if let Some(opens_at) = self.opens_at
            && now < opens_at
        {
            return Err(AccessError::NotYetOpen { opens_at });
        }
        if let Some(closed_at) = self.closes_at
            && now >= closed_at
        {
            return Err(AccessError::Expired { closed_at });
        }
        Ok(())
    }
}

//
// ─── SERIALIZED SHAPE ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
struct ExamConfigRecord {
    id: ExamId,
    title: String,
    time_limit_minutes: u32,
    questions: Vec<Question>,
    #[serde(default)]
    total_points: Option<u32>,
    passing_score: u32,
    #[serde(default)]
    shuffle_questions: bool,
    #[serde(default = "default_true")]
    allow_review: bool,
    #[serde(default = "default_true")]
    show_results: bool,
    #[serde(default)]
    opens_at: Option<DateTime<Utc>>,
    #[serde(default)]
    closes_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TryFrom<ExamConfigRecord> for ExamConfig {
    type Error = ConfigError;

    fn try_from(record: ExamConfigRecord) -> Result<Self, Self::Error> {
        if record.title.trim().is_empty() {
            return Err(ConfigError::EmptyTitle);
        }
        if record.questions.is_empty() {
            return Err(ConfigError::EmptyQuestionSet);
        }
        if record.time_limit_minutes == 0 {
            return Err(ConfigError::InvalidTimeLimit);
        }
        if record.passing_score > 100 {
            return Err(ConfigError::InvalidPassingScore(record.passing_score));
        }
        if let (Some(open), Some(close)) = (record.opens_at, record.closes_at)
            && close < open
        {
            return Err(ConfigError::InvalidWindow);
        }

        let mut seen = HashSet::with_capacity(record.questions.len());
        let mut sum = 0_u32;
        for question in &record.questions {
            question.validate()?;
            if !seen.insert(question.id()) {
                return Err(ConfigError::DuplicateQuestion(question.id()));
            }
            sum = sum.saturating_add(question.points());
        }
        if let Some(declared) = record.total_points
            && declared != sum
        {
            return Err(ConfigError::PointsMismatch { declared, sum });
        }

        let mut questions = record.questions;
        questions.sort_by_key(Question::order);

        Ok(Self {
            id: record.id,
            title: record.title,
            time_limit_minutes: record.time_limit_minutes,
            questions,
            total_points: sum,
            passing_score: record.passing_score,
            shuffle_questions: record.shuffle_questions,
            allow_review: record.allow_review,
            show_results: record.show_results,
            opens_at: record.opens_at,
            closes_at: record.closes_at,
            is_active: record.is_active,
        })
    }
}

impl From<ExamConfig> for ExamConfigRecord {
    fn from(config: ExamConfig) -> Self {
        Self {
            id: config.id,
            title: config.title,
            time_limit_minutes: config.time_limit_minutes,
            questions: config.questions,
            total_points: Some(config.total_points),
            passing_score: config.passing_score,
            shuffle_questions: config.shuffle_questions,
            allow_review: config.allow_review,
            show_results: config.show_results,
            opens_at: config.opens_at,
            closes_at: config.closes_at,
            is_active: config.is_active,
        }
    }
}
