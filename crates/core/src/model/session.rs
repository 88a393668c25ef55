use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::ledger::AnswerLedger;
use crate::model::exam::ExamConfig;
use crate::model::ids::{ExamId, QuestionId, SessionId, UserId};

/// Reasons a restored snapshot cannot continue under a given exam config.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot belongs to exam {found}, expected {expected}")]
    ExamMismatch { expected: ExamId, found: ExamId },

    #[error("question order does not match the exam's questions")]
    OrderMismatch,

    #[error("current question index {index} out of range for {count} questions")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("snapshot answers unknown question {0}")]
    UnknownQuestion(QuestionId),

    #[error("remaining time {remaining}s exceeds the limit of {limit}s")]
    RemainingBeyondLimit { remaining: u32, limit: u32 },
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Mutable aggregate of one attempt.
///
/// Serializes to the persisted snapshot shape. Invariants kept by the
/// mutators: `time_remaining` never increases, the current index always
/// points into `question_order`, and a completed session rejects changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSession {
    id: SessionId,
    exam_id: ExamId,
    user_id: UserId,
    start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    current_question_index: usize,
    question_order: Vec<QuestionId>,
    answers: AnswerLedger,
    time_remaining: u32,
    is_completed: bool,
    is_paused: bool,
    last_updated: DateTime<Utc>,
}

impl ExamSession {
    /// Allocates a fresh attempt with the full time budget and an empty ledger.
    ///
    /// `question_order` must be a permutation of the config's question ids;
    /// pass `config.question_ids()` for display order.
    #[must_use]
    pub fn new(
        id: SessionId,
        config: &ExamConfig,
        user_id: UserId,
        start_time: DateTime<Utc>,
        question_order: Vec<QuestionId>,
    ) -> Self {
        let total = question_order.len();
        Self {
            id,
            exam_id: config.id(),
            user_id,
            start_time,
            end_time: None,
            current_question_index: 0,
            question_order,
            answers: AnswerLedger::new(total),
            time_remaining: config.time_limit_secs(),
            is_completed: false,
            is_paused: false,
            last_updated: start_time,
        }
    }

    /// Checks a restored snapshot against the exam it claims to belong to
    /// and re-attaches the ledger's question count.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` for a foreign exam, a stale question set,
    /// an out-of-range index or impossible remaining time.
    pub fn validate_against(mut self, config: &ExamConfig) -> Result<Self, SnapshotError> {
        if self.exam_id != config.id() {
            return Err(SnapshotError::ExamMismatch {
                expected: config.id(),
                found: self.exam_id,
            });
        }

        let expected: HashSet<QuestionId> = config.question_ids().into_iter().collect();
        let ordered: HashSet<QuestionId> = self.question_order.iter().copied().collect();
        if ordered != expected || self.question_order.len() != expected.len() {
            return Err(SnapshotError::OrderMismatch);
        }

        let count = self.question_order.len();
        if self.current_question_index >= count {
            return Err(SnapshotError::IndexOutOfRange {
                index: self.current_question_index,
                count,
            });
        }

        if let Some(unknown) = self
            .answers
            .iter()
            .map(|a| a.question_id())
            .find(|id| !expected.contains(id))
        {
            return Err(SnapshotError::UnknownQuestion(unknown));
        }

        let limit = config.time_limit_secs();
        if self.time_remaining > limit {
            return Err(SnapshotError::RemainingBeyondLimit {
                remaining: self.time_remaining,
                limit,
            });
        }

        self.answers = self.answers.with_total(count);
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    #[must_use]
    pub fn current_question_id(&self) -> Option<QuestionId> {
        self.question_order.get(self.current_question_index).copied()
    }

    #[must_use]
    pub fn question_order(&self) -> &[QuestionId] {
        &self.question_order
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.question_order.len()
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerLedger {
        &self.answers
    }

    #[must_use]
    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// When this snapshot was last captured for persistence.
    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Stamps the capture time. The stamp only moves forward.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated = self.last_updated.max(at);
    }

    /// Moves to `index`, returning the question there.
    ///
    /// Returns `None` and leaves the session untouched if the index is out of
    /// range or the session is completed.
    pub fn move_to(&mut self, index: usize) -> Option<QuestionId> {
        if self.is_completed {
            return None;
        }
        let id = self.question_order.get(index).copied()?;
        self.current_question_index = index;
        Some(id)
    }

    /// Swaps in a newer ledger. Ignored once completed.
    pub fn replace_answers(&mut self, answers: AnswerLedger) {
        if !self.is_completed {
            self.answers = answers.with_total(self.question_order.len());
        }
    }

    /// Lowers the remaining time. Larger values are ignored so the countdown
    /// can never move backwards.
    pub fn consume_time(&mut self, remaining: u32) {
        if !self.is_completed {
            self.time_remaining = self.time_remaining.min(remaining);
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if !self.is_completed {
            self.is_paused = paused;
        }
    }

    /// Seals the attempt. The scored ledger replaces the working one.
    pub fn complete(&mut self, ended_at: DateTime<Utc>, scored: AnswerLedger) {
        if self.is_completed {
            return;
        }
        self.answers = scored.with_total(self.question_order.len());
        self.end_time = Some(ended_at);
        self.is_paused = false;
        self.is_completed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, Question, QuestionKind};
    use crate::time::fixed_now;

    fn config() -> ExamConfig {
        let questions = (1..=5)
            .map(|id| {
                Question::new(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    1,
                    u32::try_from(id).unwrap(),
                    QuestionKind::TrueFalse { correct: true },
                )
                .unwrap()
            })
            .collect();
        ExamConfig::new(ExamId::new(8), "Checks", 30, questions, 60).unwrap()
    }

    fn session(config: &ExamConfig) -> ExamSession {
        ExamSession::new(
            SessionId::new("s-1"),
            config,
            UserId::new(3),
            fixed_now(),
            config.question_ids(),
        )
    }

    #[test]
    fn new_session_gets_full_budget() {
        let config = config();
        let session = session(&config);
        assert_eq!(session.time_remaining(), 1_800);
        assert_eq!(session.current_question_index(), 0);
        assert!(session.answers().is_empty());
        assert_eq!(session.answers().total(), 5);
    }

    #[test]
    fn move_to_rejects_out_of_range() {
        let config = config();
        let mut session = session(&config);
        assert_eq!(session.move_to(4), Some(QuestionId::new(5)));
        assert_eq!(session.move_to(5), None);
        assert_eq!(session.current_question_index(), 4);
    }

    #[test]
    fn remaining_time_never_increases() {
        let config = config();
        let mut session = session(&config);
        session.consume_time(100);
        session.consume_time(500);
        assert_eq!(session.time_remaining(), 100);
    }

    #[test]
    fn completed_session_is_frozen() {
        let config = config();
        let mut session = session(&config);
        let ledger = session.answers().record(QuestionId::new(1), AnswerValue::Bool(true), 2);
        session.complete(fixed_now(), ledger.clone());
        session.replace_answers(AnswerLedger::new(5));
        session.consume_time(0);
        assert_eq!(session.move_to(1), None);
        assert_eq!(session.answers(), &ledger);
        assert_eq!(session.time_remaining(), 1_800);
        assert_eq!(session.end_time(), Some(fixed_now()));
    }

    #[test]
    fn snapshot_round_trip_validates() {
        let config = config();
        let mut session = session(&config);
        session.move_to(4);
        session.replace_answers(
            session
                .answers()
                .record(QuestionId::new(2), AnswerValue::Bool(false), 9),
        );
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"currentQuestionIndex\":4"));

        let restored: ExamSession = serde_json::from_str(&json).unwrap();
        let restored = restored.validate_against(&config).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn validation_catches_foreign_snapshots() {
        let config = config();
        let other = ExamConfig::new(
            ExamId::new(9),
            "Other",
            30,
            config.questions().to_vec(),
            60,
        )
        .unwrap();
        let err = session(&config).validate_against(&other).unwrap_err();
        assert!(matches!(err, SnapshotError::ExamMismatch { .. }));
    }
}
