use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::answer::AnswerValue;
use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} is worth zero points")]
    ZeroPoints(QuestionId),

    #[error("question {0} needs at least two options")]
    TooFewOptions(QuestionId),

    #[error("question {id} lists option {key} more than once")]
    DuplicateOption { id: QuestionId, key: OptionKey },

    #[error("question {id}: correct option {key} is not among its options")]
    CorrectOptionMissing { id: QuestionId, key: OptionKey },

    #[error("question {0} has no acceptable answers")]
    NoAcceptedAnswers(QuestionId),
}

//
// ─── OPTION KEYS ───────────────────────────────────────────────────────────────
//

/// Key of a multiple-choice option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
    E,
}

impl OptionKey {
    pub const ALL: [OptionKey; 5] = [Self::A, Self::B, Self::C, Self::D, Self::E];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
            OptionKey::E => "E",
        }
    }

    /// Parses an option key. Matching is exact: `"a"` is not a key.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single labelled multiple-choice option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub key: OptionKey,
    pub text: String,
}

impl ChoiceOption {
    #[must_use]
    pub fn new(key: OptionKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Kind-specific payload of a question, including its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<ChoiceOption>,
        correct: OptionKey,
    },
    TrueFalse {
        correct: bool,
    },
    FillBlank {
        accepted: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
}

/// An immutable exam question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    id: QuestionId,
    text: String,
    points: u32,
    order: u32,
    kind: QuestionKind,
}

impl Question {
    /// Creates a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the answer key is inconsistent with the options
    /// or the question is worth no points.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        points: u32,
        order: u32,
        kind: QuestionKind,
    ) -> Result<Self, QuestionError> {
        let question = Self {
            id,
            text: text.into(),
            points,
            order,
            kind,
        };
        question.validate()?;
        Ok(question)
    }

    /// Checks the invariants of a question, including ones built by deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first violated `QuestionError`.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.points == 0 {
            return Err(QuestionError::ZeroPoints(self.id));
        }
        match &self.kind {
            QuestionKind::MultipleChoice { options, correct } => {
                if options.len() < 2 {
                    return Err(QuestionError::TooFewOptions(self.id));
                }
                for (i, option) in options.iter().enumerate() {
                    if options[..i].iter().any(|o| o.key == option.key) {
                        return Err(QuestionError::DuplicateOption {
                            id: self.id,
                            key: option.key,
                        });
                    }
                }
                if !options.iter().any(|o| o.key == *correct) {
                    return Err(QuestionError::CorrectOptionMissing {
                        id: self.id,
                        key: *correct,
                    });
                }
            }
            QuestionKind::TrueFalse { .. } => {}
            QuestionKind::FillBlank { accepted, .. } => {
                if accepted.iter().all(|a| a.trim().is_empty()) {
                    return Err(QuestionError::NoAcceptedAnswers(self.id));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }

    /// Returns true if `value` has a shape this question can record.
    ///
    /// Multiple choice takes one of its own option keys, true/false takes a
    /// boolean and fill-in-blank takes text or a list of text.
    #[must_use]
    pub fn accepts(&self, value: &AnswerValue) -> bool {
        match (&self.kind, value) {
            (QuestionKind::MultipleChoice { options, .. }, AnswerValue::Text(raw)) => {
                raw.is_empty()
                    || OptionKey::parse(raw).is_some_and(|key| options.iter().any(|o| o.key == key))
            }
            (QuestionKind::TrueFalse { .. }, AnswerValue::Bool(_)) => true,
            (QuestionKind::FillBlank { .. }, AnswerValue::Text(_) | AnswerValue::List(_)) => true,
            _ => false,
        }
    }

    /// Grades a recorded value against this question's answer key.
    ///
    /// Blank values are never correct. A list answer to a fill-in-blank
    /// question is correct only when every entry is acceptable.
    #[must_use]
    pub fn is_correct(&self, value: &AnswerValue) -> bool {
        if value.is_blank() {
            return false;
        }
        match (&self.kind, value) {
            (QuestionKind::MultipleChoice { correct, .. }, AnswerValue::Text(raw)) => {
                OptionKey::parse(raw) == Some(*correct)
            }
            (QuestionKind::TrueFalse { correct }, AnswerValue::Bool(b)) => b == correct,
            (
                QuestionKind::FillBlank {
                    accepted,
                    case_sensitive,
                },
                AnswerValue::Text(raw),
            ) => blank_matches(accepted, *case_sensitive, raw),
            (
                QuestionKind::FillBlank {
                    accepted,
                    case_sensitive,
                },
                AnswerValue::List(items),
            ) => items
                .iter()
                .all(|item| blank_matches(accepted, *case_sensitive, item)),
            _ => false,
        }
    }

    /// The answer key expressed as an `AnswerValue`, for result breakdowns.
    #[must_use]
    pub fn correct_answer(&self) -> AnswerValue {
        match &self.kind {
            QuestionKind::MultipleChoice { correct, .. } => {
                AnswerValue::Text(correct.as_str().to_owned())
            }
            QuestionKind::TrueFalse { correct } => AnswerValue::Bool(*correct),
            QuestionKind::FillBlank { accepted, .. } => AnswerValue::List(accepted.clone()),
        }
    }
}

fn blank_matches(accepted: &[String], case_sensitive: bool, raw: &str) -> bool {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return false;
    }
    accepted.iter().any(|a| {
        let a = a.trim();
        if case_sensitive {
            a == candidate
        } else {
            a.to_lowercase() == candidate.to_lowercase()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(key: OptionKey) -> ChoiceOption {
        ChoiceOption {
            key,
            text: format!("option {key}"),
        }
    }

    fn mc(correct: OptionKey) -> Question {
        Question::new(
            QuestionId::new(1),
            "Pick one",
            2,
            0,
            QuestionKind::MultipleChoice {
                options: vec![choice(OptionKey::A), choice(OptionKey::B), choice(OptionKey::C)],
                correct,
            },
        )
        .unwrap()
    }

    fn blank(case_sensitive: bool) -> Question {
        Question::new(
            QuestionId::new(3),
            "Capital of France?",
            1,
            2,
            QuestionKind::FillBlank {
                accepted: vec!["Paris".into(), "Paname".into()],
                case_sensitive,
            },
        )
        .unwrap()
    }

    #[test]
    fn multiple_choice_requires_exact_key() {
        let q = mc(OptionKey::B);
        assert!(q.is_correct(&AnswerValue::text("B")));
        assert!(!q.is_correct(&AnswerValue::text("b")));
        assert!(!q.is_correct(&AnswerValue::text("A")));
        assert!(!q.is_correct(&AnswerValue::Bool(true)));
    }

    #[test]
    fn multiple_choice_accepts_only_own_options() {
        let q = mc(OptionKey::A);
        assert!(q.accepts(&AnswerValue::text("C")));
        assert!(!q.accepts(&AnswerValue::text("E")));
        assert!(!q.accepts(&AnswerValue::Bool(false)));
    }

    #[test]
    fn true_false_uses_boolean_equality() {
        let q = Question::new(
            QuestionId::new(2),
            "Water is wet",
            1,
            1,
            QuestionKind::TrueFalse { correct: true },
        )
        .unwrap();
        assert!(q.is_correct(&AnswerValue::Bool(true)));
        assert!(!q.is_correct(&AnswerValue::Bool(false)));
        assert!(!q.accepts(&AnswerValue::text("true")));
    }

    #[test]
    fn fill_blank_honors_case_flag() {
        assert!(blank(false).is_correct(&AnswerValue::text(" paris ")));
        assert!(!blank(true).is_correct(&AnswerValue::text("paris")));
        assert!(blank(true).is_correct(&AnswerValue::text("Paris")));
        assert!(!blank(false).is_correct(&AnswerValue::text("")));
    }

    #[test]
    fn fill_blank_list_requires_every_entry() {
        let q = blank(false);
        assert!(q.is_correct(&AnswerValue::List(vec!["paris".into(), "PANAME".into()])));
        assert!(!q.is_correct(&AnswerValue::List(vec!["paris".into(), "lyon".into()])));
        assert!(!q.is_correct(&AnswerValue::List(Vec::new())));
    }

    #[test]
    fn rejects_inconsistent_answer_keys() {
        let err = Question::new(
            QuestionId::new(9),
            "Broken",
            1,
            0,
            QuestionKind::MultipleChoice {
                options: vec![choice(OptionKey::A), choice(OptionKey::B)],
                correct: OptionKey::D,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectOptionMissing {
                id: QuestionId::new(9),
                key: OptionKey::D
            }
        );

        let err = Question::new(
            QuestionId::new(10),
            "Nothing",
            1,
            0,
            QuestionKind::FillBlank {
                accepted: vec!["  ".into()],
                case_sensitive: false,
            },
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::NoAcceptedAnswers(QuestionId::new(10)));
    }

    #[test]
    fn deserializes_tagged_kind() {
        let json = r#"{
            "id": 7, "text": "2 + 2 = 4", "points": 1, "order": 0,
            "kind": { "type": "true_false", "correct": true }
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind(), &QuestionKind::TrueFalse { correct: true });
    }
}
