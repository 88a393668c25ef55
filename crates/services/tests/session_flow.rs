mod common;

use std::sync::Arc;

use exam_core::model::{
    AccessError, AnswerValue, ExamConfig, ExamId, OptionKey, QuestionId, SessionId,
};
use exam_core::scoring::{Submission, score_submission};
use exam_core::time::fixed_clock;
use serde_json::json;
use services::{
    ExamDetails, HttpSessionApi, InMemoryExamLoader, LoaderError, PersistenceAdapter,
    RemoteConfig, RemoteScore, RemoteSessionApi, SessionError, SessionState,
};
use storage::Storage;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{ScriptedRemote, controller, controller_with, exam, multiple_choice, remote};

fn key(k: &str) -> AnswerValue {
    AnswerValue::text(k)
}

#[tokio::test]
async fn half_right_meets_a_fifty_percent_pass_mark() {
    let config = ExamConfig::new(
        ExamId::new(1),
        "Two questions",
        5,
        vec![
            multiple_choice(1, 0, OptionKey::A),
            multiple_choice(2, 1, OptionKey::B),
        ],
        50,
    )
    .unwrap();
    let (mut controller, clock) = controller(Storage::in_memory());
    controller.start(config).await.unwrap();

    controller.answer(QuestionId::new(1), key("A")).unwrap();
    controller.navigate(1).unwrap();
    controller.answer(QuestionId::new(2), key("A")).unwrap();
    clock.advance_secs(90);

    let result = controller.submit().await.unwrap().clone();
    assert_eq!(result.correct_answers, 1);
    assert_eq!(result.incorrect_answers, 1);
    assert_eq!(result.unanswered_questions, 0);
    assert_eq!(result.percentage, 50);
    assert!(result.passed);
    assert_eq!(result.time_spent, 90);
    assert_eq!(controller.state(), SessionState::Completed);

    let stored = controller
        .persistence()
        .result(&result.session_id)
        .await
        .unwrap();
    assert_eq!(stored, Some(result));
}

#[tokio::test]
async fn time_up_submits_what_was_answered() {
    let (mut controller, clock) = controller(Storage::in_memory());
    controller.start(exam(2, 3, 1)).await.unwrap();
    controller.answer(QuestionId::new(2), key("A")).unwrap();
    let id = controller.session().unwrap().id().clone();

    clock.advance_secs(59);
    assert!(!controller.tick().expired());
    clock.advance_secs(1);
    let report = controller.tick();
    assert!(report.expired());

    let result = controller.on_timer_expired().await.unwrap();
    assert_eq!(result.unanswered_questions, 2);
    assert_eq!(result.correct_answers, 1);
    assert_eq!(result.time_spent, 60);

    // The snapshot is gone once the attempt is submitted.
    assert!(controller.persistence().load(&id).await.is_none());
}

#[tokio::test]
async fn second_submit_and_later_edits_are_rejected() {
    let (mut controller, _clock) = controller(Storage::in_memory());
    controller.start(exam(3, 2, 5)).await.unwrap();
    controller.answer(QuestionId::new(1), key("A")).unwrap();
    let first = controller.submit().await.unwrap().clone();

    for err in [
        controller.submit().await.unwrap_err(),
        controller.answer(QuestionId::new(2), key("A")).unwrap_err(),
        controller.navigate(0).unwrap_err(),
    ] {
        assert!(matches!(
            err,
            SessionError::NotActive {
                state: SessionState::Completed
            }
        ));
    }
    assert_eq!(controller.result(), Some(&first));
    assert_eq!(
        controller
            .persistence()
            .list_results(ExamId::new(3), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn exited_attempt_resumes_where_it_left_off() {
    let storage = Storage::in_memory();
    let config = exam(4, 6, 30);

    let (mut first, clock) = controller(storage.clone());
    first.start(config.clone()).await.unwrap();
    first.answer(QuestionId::new(2), key("A")).unwrap();
    first.navigate(4).unwrap();
    first.answer(QuestionId::new(5), key("C")).unwrap();
    clock.advance_secs(20);
    first.tick();
    assert!(first.confirm_exit().await.unwrap());
    let left = first.session().unwrap().clone();

    let (mut second, _clock) = controller(storage);
    let resumed = second.resume(config, left.id()).await.unwrap();
    assert_eq!(resumed.id(), left.id());
    assert_eq!(resumed.current_question_index(), 4);
    assert_eq!(resumed.answers(), left.answers());
    assert_eq!(resumed.time_remaining(), 1_780);
    assert_eq!(resumed.question_order(), left.question_order());
    assert_eq!(second.state(), SessionState::Active);
}

#[tokio::test]
async fn resume_or_start_finds_the_unfinished_attempt() {
    let storage = Storage::in_memory();
    let (mut first, _clock) = controller(storage.clone());
    first.start(exam(5, 3, 10)).await.unwrap();
    first.navigate(2).unwrap();
    first.confirm_exit().await.unwrap();
    let id = first.session().unwrap().id().clone();

    let (mut second, _clock) = controller(storage);
    let session = second.resume_or_start(exam(5, 3, 10)).await.unwrap();
    assert_eq!(session.id(), &id);
    assert_eq!(session.current_question_index(), 2);
}

#[tokio::test]
async fn snapshot_of_a_changed_exam_is_discarded() {
    let storage = Storage::in_memory();
    let (mut first, _clock) = controller(storage.clone());
    first.start(exam(6, 3, 10)).await.unwrap();
    first.navigate(2).unwrap();
    first.confirm_exit().await.unwrap();
    let old = first.session().unwrap().id().clone();

    let (mut second, _clock) = controller(storage);
    let session = second.resume_or_start(exam(6, 4, 10)).await.unwrap();
    assert_ne!(session.id(), &old);
    assert_eq!(session.current_question_index(), 0);
    assert_eq!(session.question_count(), 4);
}

#[tokio::test]
async fn resume_falls_back_to_the_remote_copy() {
    let config = exam(7, 3, 10);
    let (mut origin, _clock) = controller(Storage::in_memory());
    origin.start(config.clone()).await.unwrap();
    origin.navigate(1).unwrap();
    origin.answer(QuestionId::new(2), key("B")).unwrap();
    let mirrored = origin.snapshot().unwrap();

    let fake = remote(ScriptedRemote {
        stored: Some(mirrored.clone()),
        ..ScriptedRemote::default()
    });
    let api: Arc<dyn RemoteSessionApi> = fake.clone();
    let (mut controller, _clock) =
        controller_with(PersistenceAdapter::new(Storage::in_memory(), Some(api)));

    let resumed = controller.resume(config, mirrored.id()).await.unwrap();
    assert_eq!(resumed.id(), mirrored.id());
    assert_eq!(resumed.current_question_index(), 1);
    assert_eq!(resumed.answers(), mirrored.answers());
    assert!(fake.calls().contains(&format!("get:{}", mirrored.id())));
}

#[tokio::test]
async fn missing_snapshot_everywhere_starts_fresh() {
    let fake = remote(ScriptedRemote::default());
    let api: Arc<dyn RemoteSessionApi> = fake.clone();
    let (mut controller, _clock) =
        controller_with(PersistenceAdapter::new(Storage::in_memory(), Some(api)));

    let session = controller
        .resume(exam(8, 2, 10), &SessionId::new("gone"))
        .await
        .unwrap();
    assert_ne!(session.id().as_str(), "gone");
    assert!(session.answers().is_empty());
    assert_eq!(fake.calls()[0], "get:gone");
}

#[tokio::test]
async fn remote_start_and_sync_are_used_when_available() {
    let fake = remote(ScriptedRemote {
        session_id: Some("srv-7".into()),
        score: Some(RemoteScore {
            score: 0,
            percentage: 0,
            passed: false,
        }),
        ..ScriptedRemote::default()
    });
    let api: Arc<dyn RemoteSessionApi> = fake.clone();
    let (mut controller, clock) =
        controller_with(PersistenceAdapter::new(Storage::in_memory(), Some(api)));

    let session = controller.start(exam(9, 2, 10)).await.unwrap();
    assert_eq!(session.id().as_str(), "srv-7");

    controller.answer(QuestionId::new(1), key("A")).unwrap();
    clock.advance_secs(30);
    let report = controller.housekeeping().await;
    assert!(report.save_due && report.sync_due);
    assert!(fake.calls().contains(&"progress:srv-7".to_string()));

    // A disagreeing remote score never replaces the local one.
    let result = controller.submit().await.unwrap();
    assert_eq!(result.score, 1);
    assert_eq!(result.percentage, 50);
    assert!(fake.calls().contains(&"submit:srv-7".to_string()));
}

#[tokio::test]
async fn failing_remote_scorer_falls_back_to_local_scoring() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exams/10/sessions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "srv-10" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/srv-10/submit"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(RemoteConfig {
        base_url: server.uri().parse().unwrap(),
        token: None,
        timeout: std::time::Duration::from_secs(2),
    })
    .unwrap();
    let api: Arc<dyn RemoteSessionApi> = Arc::new(api);
    let (mut controller, clock) =
        controller_with(PersistenceAdapter::new(Storage::in_memory(), Some(api)));

    let config = exam(10, 3, 10);
    controller.start(config.clone()).await.unwrap();
    controller.answer(QuestionId::new(1), key("A")).unwrap();
    controller.answer(QuestionId::new(3), key("B")).unwrap();
    clock.advance_secs(45);

    let session = controller.session().unwrap().clone();
    let result = controller.submit().await.unwrap().clone();
    let expected = score_submission(
        &config,
        session.answers(),
        Submission {
            session_id: session.id().clone(),
            user_id: session.user_id(),
            time_spent: 45,
            completed_at: result.completed_at,
        },
    );
    assert_eq!(result, expected);
    assert_eq!(result.session_id.as_str(), "srv-10");
    assert_eq!(result.correct_answers, 1);
    assert_eq!(result.incorrect_answers, 1);
}

#[tokio::test]
async fn unavailable_exams_never_start_a_session() {
    let loader = InMemoryExamLoader::new(fixed_clock())
        .with_exam(ExamDetails::new(exam(11, 2, 10).with_active(false)));
    let (mut controller, _clock) = controller(Storage::in_memory());

    let err = controller
        .open(&loader, ExamId::new(11))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Loader(LoaderError::Access(AccessError::Deactivated))
    ));
    let err = controller
        .open(&loader, ExamId::new(12))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Loader(LoaderError::NotFound(_))));
    assert_eq!(controller.state(), SessionState::NotStarted);
    assert!(controller.session().is_none());
}

#[tokio::test]
async fn open_carries_display_material() {
    let details = ExamDetails {
        config: exam(13, 2, 10),
        display_material: Some("Read the passage first.".into()),
    };
    let loader = InMemoryExamLoader::new(fixed_clock()).with_exam(details);
    let (mut controller, _clock) = controller(Storage::in_memory());

    controller.open(&loader, ExamId::new(13)).await.unwrap();
    assert_eq!(controller.state(), SessionState::Active);
    assert_eq!(controller.display_material(), Some("Read the passage first."));
}

#[tokio::test]
async fn sqlite_backed_attempt_survives_a_restart() {
    let url = "sqlite:file:services_flow_restart?mode=memory&cache=shared";
    let config = exam(14, 5, 20);

    let storage = Storage::sqlite(url).await.unwrap();
    let (mut first, clock) = controller(storage);
    first.start(config.clone()).await.unwrap();
    first.answer(QuestionId::new(1), key("A")).unwrap();
    first.navigate(3).unwrap();
    clock.advance_secs(10);
    first.housekeeping().await;
    assert!(!first.is_dirty());
    let id = first.session().unwrap().id().clone();

    let storage = Storage::sqlite(url).await.unwrap();
    let (mut second, _clock) = controller(storage);
    let resumed = second.resume_or_start(config).await.unwrap();
    assert_eq!(resumed.id(), &id);
    assert_eq!(resumed.current_question_index(), 3);
    assert_eq!(resumed.time_remaining(), 1_190);

    let result = second.submit().await.unwrap();
    assert_eq!(result.correct_answers, 1);
    assert!(second.persistence().load(&id).await.is_none());
}

#[tokio::test]
async fn idle_time_is_not_handed_back_after_a_crash() {
    let storage = Storage::in_memory();
    let config = exam(15, 3, 10);

    let (mut first, clock) = controller(storage.clone());
    first.start(config.clone()).await.unwrap();
    first.answer(QuestionId::new(1), key("A")).unwrap();
    for _ in 0..10 {
        clock.advance_secs(10);
        first.housekeeping().await;
    }
    assert_eq!(first.time_remaining(), 500);
    // The process dies here without an exit save.
    drop(first);

    let (mut second, _clock) = controller(storage);
    let resumed = second.resume_or_start(config).await.unwrap();
    assert_eq!(resumed.time_remaining(), 500);
    assert_eq!(resumed.answers().answered_count(), 1);
}

#[tokio::test]
async fn open_session_resumes_with_display_material() {
    let storage = Storage::in_memory();
    let details = ExamDetails {
        config: exam(16, 3, 10),
        display_material: Some("Passage A".into()),
    };
    let loader = InMemoryExamLoader::new(fixed_clock()).with_exam(details);

    let (mut first, _clock) = controller(storage.clone());
    first.open(&loader, ExamId::new(16)).await.unwrap();
    first.navigate(2).unwrap();
    first.confirm_exit().await.unwrap();
    let id = first.session().unwrap().id().clone();

    let (mut second, _clock) = controller(storage);
    let resumed = second
        .open_session(&loader, ExamId::new(16), &id)
        .await
        .unwrap();
    assert_eq!(resumed.id(), &id);
    assert_eq!(resumed.current_question_index(), 2);
    assert_eq!(second.display_material(), Some("Passage A"));
}
