//! Deterministic scoring of a finished attempt.
//!
//! The same function runs whether or not a remote scorer is reachable, so two
//! calls with equal inputs always produce equal results.

use chrono::{DateTime, Utc};

use crate::ledger::AnswerLedger;
use crate::model::{ExamConfig, ExamResult, QuestionResult, SessionId, UserId};

/// Identity and timing of the attempt being scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub time_spent: u32,
    pub completed_at: DateTime<Utc>,
}

/// `round(part / whole * 100)`, half away from zero, clamped to `[0, 100]`.
///
/// A zero `whole` yields 0.
#[must_use]
pub fn rounded_percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = part.min(whole);
    let pct = (part * 200 + whole) / (whole * 2);
    u32::try_from(pct).unwrap_or(100)
}

/// Scores `answers` against the answer key in `config`.
///
/// Questions are reported in display order. Blank or missing answers are
/// unanswered, earn nothing, and are counted apart from incorrect ones.
#[must_use]
pub fn score_submission(
    config: &ExamConfig,
    answers: &AnswerLedger,
    submission: Submission,
) -> ExamResult {
    let mut score = 0_u32;
    let mut correct = 0_usize;
    let mut incorrect = 0_usize;
    let mut unanswered = 0_usize;
    let mut question_results = Vec::with_capacity(config.question_count());

    for question in config.questions() {
        let recorded = answers.get(question.id());
        let value = recorded.map(|a| a.answer().clone());
        let is_correct = value.as_ref().is_some_and(|v| question.is_correct(v));
        let answered = value.as_ref().is_some_and(|v| !v.is_blank());

        let points_earned = if is_correct { question.points() } else { 0 };
        score = score.saturating_add(points_earned);
        match (answered, is_correct) {
            (false, _) => unanswered += 1,
            (true, true) => correct += 1,
            (true, false) => incorrect += 1,
        }

        question_results.push(QuestionResult {
            question_id: question.id(),
            answer: value,
            correct_answer: question.correct_answer(),
            is_correct,
            points_earned,
            points_possible: question.points(),
            time_spent: recorded.map_or(0, |a| a.time_spent()),
        });
    }

    let percentage = rounded_percentage(u64::from(score), u64::from(config.total_points()));

    ExamResult {
        session_id: submission.session_id,
        exam_id: config.id(),
        user_id: submission.user_id,
        score,
        total_points: config.total_points(),
        percentage,
        correct_answers: correct,
        incorrect_answers: incorrect,
        unanswered_questions: unanswered,
        time_spent: submission.time_spent,
        passed: percentage >= config.passing_score(),
        completed_at: submission.completed_at,
        question_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerValue, ChoiceOption, ExamId, OptionKey, Question, QuestionId, QuestionKind,
    };
    use crate::time::fixed_now;

    fn mc(id: u64, correct: OptionKey, points: u32) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            points,
            u32::try_from(id).unwrap(),
            QuestionKind::MultipleChoice {
                options: OptionKey::ALL
                    .into_iter()
                    .map(|key| ChoiceOption {
                        key,
                        text: key.to_string(),
                    })
                    .collect(),
                correct,
            },
        )
        .unwrap()
    }

    fn submission() -> Submission {
        Submission {
            session_id: SessionId::new("s"),
            user_id: UserId::new(1),
            time_spent: 120,
            completed_at: fixed_now(),
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(rounded_percentage(1, 2), 50);
        assert_eq!(rounded_percentage(1, 3), 33);
        assert_eq!(rounded_percentage(2, 3), 67);
        assert_eq!(rounded_percentage(1, 8), 13);
        assert_eq!(rounded_percentage(5, 0), 0);
        assert_eq!(rounded_percentage(9, 4), 100);
    }

    #[test]
    fn half_right_passes_at_fifty() {
        let config = ExamConfig::new(
            ExamId::new(1),
            "Two",
            10,
            vec![mc(1, OptionKey::A, 1), mc(2, OptionKey::B, 1)],
            50,
        )
        .unwrap();
        let answers = AnswerLedger::new(2)
            .record(QuestionId::new(1), AnswerValue::text("A"), 10)
            .record(QuestionId::new(2), AnswerValue::text("A"), 20);

        let result = score_submission(&config, &answers, submission());

        assert_eq!(result.correct_answers, 1);
        assert_eq!(result.incorrect_answers, 1);
        assert_eq!(result.unanswered_questions, 0);
        assert_eq!(result.score, 1);
        assert_eq!(result.percentage, 50);
        assert!(result.passed);
        assert_eq!(result.question_results[1].time_spent, 20);
    }

    #[test]
    fn unanswered_are_tracked_apart_and_weighted_points_apply() {
        let config = ExamConfig::new(
            ExamId::new(1),
            "Weighted",
            10,
            vec![
                mc(1, OptionKey::A, 3),
                mc(2, OptionKey::B, 1),
                mc(3, OptionKey::C, 1),
            ],
            70,
        )
        .unwrap();
        let answers = AnswerLedger::new(3)
            .record(QuestionId::new(1), AnswerValue::text("A"), 0)
            .record(QuestionId::new(3), AnswerValue::text(""), 0);

        let result = score_submission(&config, &answers, submission());

        assert_eq!(result.score, 3);
        assert_eq!(result.percentage, 60);
        assert!(!result.passed);
        assert_eq!(result.correct_answers, 1);
        assert_eq!(result.incorrect_answers, 0);
        assert_eq!(result.unanswered_questions, 2);
        assert!(!result.question_results[2].is_answered());
    }

    #[test]
    fn scoring_is_deterministic() {
        let config =
            ExamConfig::new(ExamId::new(1), "One", 10, vec![mc(1, OptionKey::E, 2)], 50).unwrap();
        let answers = AnswerLedger::new(1).record(QuestionId::new(1), AnswerValue::text("E"), 4);
        assert_eq!(
            score_submission(&config, &answers, submission()),
            score_submission(&config, &answers, submission())
        );
    }
}
