use chrono::Duration;
use exam_core::model::{
    AnswerValue, ExamConfig, ExamId, ExamSession, Question, QuestionId, QuestionKind, SessionId,
    UserId,
};
use exam_core::scoring::{Submission, score_submission};
use exam_core::time::fixed_now;
use storage::repository::{ExamResultRepository, SessionStore, StorageError};
use storage::sqlite::SqliteRepository;

fn config() -> ExamConfig {
    let questions = (1..=6)
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
    ExamConfig::new(ExamId::new(2), "SQLite", 45, questions, 50).unwrap()
}

fn session(id: &str, config: &ExamConfig) -> ExamSession {
    ExamSession::new(
        SessionId::new(id),
        config,
        UserId::new(11),
        fixed_now(),
        config.question_ids(),
    )
}

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_snapshot_round_trip_restores_position_and_ledger() {
    let repo = repo("memdb_snapshot_roundtrip").await;
    let config = config();

    let mut saved = session("resume-me", &config);
    saved.move_to(4);
    let ledger = saved
        .answers()
        .record(QuestionId::new(1), AnswerValue::Bool(true), 12)
        .record(QuestionId::new(5), AnswerValue::Bool(false), 3);
    saved.replace_answers(ledger);
    saved.consume_time(1_234);
    saved.touch(fixed_now() + Duration::seconds(30));
    repo.save_snapshot(&saved).await.unwrap();

    let loaded = repo
        .load_snapshot(&SessionId::new("resume-me"))
        .await
        .unwrap()
        .expect("snapshot present")
        .validate_against(&config)
        .unwrap();

    assert_eq!(loaded, saved);
    assert_eq!(loaded.current_question_index(), 4);
    assert_eq!(loaded.answers().len(), 2);
    assert_eq!(loaded.time_remaining(), 1_234);
}

#[tokio::test]
async fn sqlite_ignores_stale_writes_and_deletes() {
    let repo = repo("memdb_snapshot_stale").await;
    let config = config();

    let older = session("s", &config);
    let mut newer = older.clone();
    newer.move_to(2);
    newer.touch(fixed_now() + Duration::seconds(20));

    repo.save_snapshot(&newer).await.unwrap();
    repo.save_snapshot(&older).await.unwrap();
    let loaded = repo.load_snapshot(newer.id()).await.unwrap().unwrap();
    assert_eq!(loaded.current_question_index(), 2);

    repo.delete_snapshot(newer.id()).await.unwrap();
    assert!(repo.load_snapshot(newer.id()).await.unwrap().is_none());
    repo.delete_snapshot(newer.id()).await.unwrap();
}

#[tokio::test]
async fn sqlite_finds_latest_unfinished_snapshot() {
    let repo = repo("memdb_snapshot_find").await;
    let config = config();

    let first = session("first", &config);
    let mut second = session("second", &config);
    second.touch(fixed_now() + Duration::minutes(5));
    repo.save_snapshot(&first).await.unwrap();
    repo.save_snapshot(&second).await.unwrap();

    let found = repo
        .find_in_progress(config.id(), UserId::new(11))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), &SessionId::new("second"));
    assert!(
        repo.find_in_progress(ExamId::new(99), UserId::new(11))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn sqlite_result_history_appends_and_lists_newest_first() {
    let repo = repo("memdb_results").await;
    let config = config();

    let answers = session("r1", &config)
        .answers()
        .record(QuestionId::new(1), AnswerValue::Bool(true), 1);
    let first = score_submission(
        &config,
        &answers,
        Submission {
            session_id: SessionId::new("r1"),
            user_id: UserId::new(11),
            time_spent: 100,
            completed_at: fixed_now(),
        },
    );
    let second = score_submission(
        &config,
        &answers,
        Submission {
            session_id: SessionId::new("r2"),
            user_id: UserId::new(11),
            time_spent: 80,
            completed_at: fixed_now() + Duration::hours(1),
        },
    );

    repo.append_result(&first).await.unwrap();
    repo.append_result(&second).await.unwrap();
    let dup = repo.append_result(&first).await.unwrap_err();
    assert!(matches!(dup, StorageError::Conflict));

    let rows = repo.list_results(config.id(), 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].result.session_id, SessionId::new("r2"));
    assert_eq!(rows[1].result, first);

    let fetched = repo.get_result(&SessionId::new("r1")).await.unwrap();
    assert_eq!(fetched, Some(first));
}
