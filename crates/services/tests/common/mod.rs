#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{
    ChoiceOption, ExamConfig, ExamId, ExamSession, OptionKey, Question, QuestionId, QuestionKind,
    SessionId, UserId,
};
use exam_core::time::fixed_now;
use exam_core::{AnswerLedger, Clock, ManualClock};
use services::{
    AutoSavePolicy, PersistenceAdapter, RemoteError, RemoteScore, RemoteSessionApi,
    SessionController,
};
use storage::Storage;

pub const USER: u64 = 21;

pub fn multiple_choice(id: u64, order: u32, correct: OptionKey) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        1,
        order,
        QuestionKind::MultipleChoice {
            options: vec![
                ChoiceOption::new(OptionKey::A, "alpha"),
                ChoiceOption::new(OptionKey::B, "beta"),
                ChoiceOption::new(OptionKey::C, "gamma"),
            ],
            correct,
        },
    )
    .unwrap()
}

/// `count` multiple-choice questions, all answered correctly with `A`.
pub fn exam(id: u64, count: u64, minutes: u32) -> ExamConfig {
    let questions = (1..=count)
        .map(|q| multiple_choice(q, u32::try_from(q).unwrap(), OptionKey::A))
        .collect();
    ExamConfig::new(ExamId::new(id), format!("Exam {id}"), minutes, questions, 50).unwrap()
}

pub fn controller_with(
    persistence: PersistenceAdapter,
) -> (SessionController, ManualClock) {
    let (clock, handle) = Clock::manual(fixed_now());
    let controller = SessionController::new(persistence, clock, UserId::new(USER)).with_autosave(
        AutoSavePolicy {
            save_every: Duration::from_secs(10),
            sync_every: Duration::from_secs(30),
        },
    );
    (controller, handle)
}

pub fn controller(storage: Storage) -> (SessionController, ManualClock) {
    controller_with(PersistenceAdapter::local(storage))
}

/// Remote double that records calls and fails whatever it is told to.
#[derive(Default)]
pub struct ScriptedRemote {
    pub session_id: Option<String>,
    pub score: Option<RemoteScore>,
    pub stored: Option<ExamSession>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl RemoteSessionApi for ScriptedRemote {
    async fn start_session(
        &self,
        exam_id: ExamId,
        _user_id: UserId,
    ) -> Result<SessionId, RemoteError> {
        self.log(format!("start:{exam_id}"));
        self.session_id
            .clone()
            .map(SessionId::new)
            .ok_or_else(|| RemoteError::InvalidResponse("start refused".into()))
    }

    async fn save_progress(&self, session: &ExamSession) -> Result<(), RemoteError> {
        self.log(format!("progress:{}", session.id()));
        Ok(())
    }

    async fn submit_answers(
        &self,
        session_id: &SessionId,
        _answers: &AnswerLedger,
    ) -> Result<RemoteScore, RemoteError> {
        self.log(format!("submit:{session_id}"));
        self.score
            .ok_or_else(|| RemoteError::InvalidResponse("scorer down".into()))
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ExamSession>, RemoteError> {
        self.log(format!("get:{session_id}"));
        Ok(self
            .stored
            .clone()
            .filter(|session| session.id() == session_id))
    }
}

pub fn remote(remote: ScriptedRemote) -> Arc<ScriptedRemote> {
    Arc::new(remote)
}
