use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;

/// A recorded answer value.
///
/// The variant is chosen by the question kind: multiple choice records the
/// option key as text, true/false a boolean, fill-in-blank text or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl AnswerValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Empty text or an empty list: recorded, but not an answer.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Bool(_) => false,
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }
}

/// The ledger entry for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAnswer {
    question_id: QuestionId,
    answer: AnswerValue,
    time_spent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_correct: Option<bool>,
}

impl ExamAnswer {
    #[must_use]
    pub fn new(question_id: QuestionId, answer: AnswerValue, time_spent: u32) -> Self {
        Self {
            question_id,
            answer,
            time_spent,
            is_correct: None,
        }
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn answer(&self) -> &AnswerValue {
        &self.answer
    }

    /// Seconds spent on the question across all visits.
    #[must_use]
    pub fn time_spent(&self) -> u32 {
        self.time_spent
    }

    /// `None` until the attempt is scored.
    #[must_use]
    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        !self.answer.is_blank()
    }

    #[must_use]
    pub fn with_correctness(mut self, is_correct: bool) -> Self {
        self.is_correct = Some(is_correct);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_keep_their_shape() {
        let values = vec![
            AnswerValue::Bool(false),
            AnswerValue::text("B"),
            AnswerValue::List(vec!["x".into(), "y".into()]),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[false,"B",["x","y"]]"#);
        let back: Vec<AnswerValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn blank_detection() {
        assert!(AnswerValue::text("  ").is_blank());
        assert!(AnswerValue::List(vec![String::new()]).is_blank());
        assert!(!AnswerValue::Bool(false).is_blank());
    }
}
