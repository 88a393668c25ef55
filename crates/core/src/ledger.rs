use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::{AnswerValue, ExamAnswer, QuestionId};
use crate::scoring::rounded_percentage;

/// Answered/total counts for the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerProgress {
    pub answered: usize,
    pub total: usize,
    pub percentage: u32,
}

/// Authoritative question → answer map of an attempt.
///
/// The ledger is persistent: `record` returns a new ledger and leaves the
/// receiver untouched, so holders of an older ledger can detect change with
/// `ptr_eq`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerLedger {
    total: usize,
    answers: Arc<BTreeMap<QuestionId, ExamAnswer>>,
}

impl AnswerLedger {
    /// Creates an empty ledger for an exam with `total` questions.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            answers: Arc::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn from_answers(total: usize, answers: impl IntoIterator<Item = ExamAnswer>) -> Self {
        let answers = answers
            .into_iter()
            .map(|a| (a.question_id(), a))
            .collect();
        Self {
            total,
            answers: Arc::new(answers),
        }
    }

    /// Upserts the answer for `question_id`.
    ///
    /// The value is replaced (last write wins); `time_spent_delta` seconds are
    /// added to whatever time the question already had.
    #[must_use]
    pub fn record(&self, question_id: QuestionId, value: AnswerValue, time_spent_delta: u32) -> Self {
        let mut answers = (*self.answers).clone();
        let time_spent = answers
            .get(&question_id)
            .map_or(0, ExamAnswer::time_spent)
            .saturating_add(time_spent_delta);
        answers.insert(question_id, ExamAnswer::new(question_id, value, time_spent));
        Self {
            total: self.total,
            answers: Arc::new(answers),
        }
    }

    /// Returns a ledger whose answers carry the given correctness flags.
    #[must_use]
    pub fn resolve(&self, outcomes: impl IntoIterator<Item = (QuestionId, bool)>) -> Self {
        let mut answers = (*self.answers).clone();
        for (id, is_correct) in outcomes {
            if let Some(answer) = answers.remove(&id) {
                answers.insert(id, answer.with_correctness(is_correct));
            }
        }
        Self {
            total: self.total,
            answers: Arc::new(answers),
        }
    }

    #[must_use]
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total;
        self
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&ExamAnswer> {
        self.answers.get(&question_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExamAnswer> {
        self.answers.values()
    }

    /// Number of ledger entries, blank ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|a| a.is_answered()).count()
    }

    #[must_use]
    pub fn progress(&self) -> LedgerProgress {
        let answered = self.answered_count();
        let total = self.total.max(1);
        LedgerProgress {
            answered,
            total: self.total,
            percentage: rounded_percentage(answered as u64, total as u64),
        }
    }

    /// True when both ledgers share the same underlying map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.answers, &other.answers)
    }
}

// The total is not part of the stored shape; owners restore it with `with_total`.
impl Serialize for AnswerLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.answers.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AnswerLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let answers = BTreeMap::<QuestionId, ExamAnswer>::deserialize(deserializer)?;
        Ok(Self {
            total: 0,
            answers: Arc::new(answers),
        })
    }
}
