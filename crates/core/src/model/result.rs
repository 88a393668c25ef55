use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::answer::AnswerValue;
use crate::model::ids::{ExamId, QuestionId, SessionId, UserId};

/// Per-question line of a scored attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub answer: Option<AnswerValue>,
    pub correct_answer: AnswerValue,
    pub is_correct: bool,
    pub points_earned: u32,
    pub points_possible: u32,
    pub time_spent: u32,
}

impl QuestionResult {
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answer.as_ref().is_some_and(|a| !a.is_blank())
    }
}

/// Final, immutable outcome of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub session_id: SessionId,
    pub exam_id: ExamId,
    pub user_id: UserId,
    pub score: u32,
    pub total_points: u32,
    pub percentage: u32,
    pub correct_answers: usize,
    pub incorrect_answers: usize,
    pub unanswered_questions: usize,
    pub time_spent: u32,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
    pub question_results: Vec<QuestionResult>,
}

impl ExamResult {
    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.question_results.len()
    }
}
