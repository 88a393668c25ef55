use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use exam_core::model::{
    AnswerValue, ExamAnswer, ExamConfig, ExamId, ExamResult, ExamSession, Question, QuestionId,
    SessionId, UserId,
};
use exam_core::scoring::{Submission, score_submission};
use exam_core::time::elapsed_secs;
use exam_core::{AnswerLedger, Clock, CountdownTimer, LedgerProgress, TimerEvent};

use crate::autosave::{AutoSavePolicy, AutoSaveScheduler, SaveTicket};
use crate::error::SessionError;
use crate::loader::ExamLoader;
use crate::persistence::PersistenceAdapter;

use super::state::{ExitPrompt, SessionState, TickReport};

//
// ─── SAVE JOB ──────────────────────────────────────────────────────────────────
//

/// A snapshot claimed for saving. Write it, then hand the ticket back through
/// [`SessionController::finish_save`].
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub ticket: SaveTicket,
    pub snapshot: ExamSession,
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// State machine of one attempt.
///
/// The controller exclusively owns the `ExamSession`. The timer and the
/// autosave scheduler have no tasks of their own; a host drives them through
/// [`SessionController::tick`] (or [`SessionController::housekeeping`]) and
/// the controller decides what the tick means for the attempt.
pub struct SessionController {
    clock: Clock,
    user_id: UserId,
    persistence: PersistenceAdapter,
    config: Option<Arc<ExamConfig>>,
    display_material: Option<String>,
    session: Option<ExamSession>,
    state: SessionState,
    timer: CountdownTimer,
    autosave: AutoSaveScheduler,
    question_entered_at: Option<DateTime<Utc>>,
    result: Option<ExamResult>,
}

impl SessionController {
    #[must_use]
    pub fn new(persistence: PersistenceAdapter, clock: Clock, user_id: UserId) -> Self {
        Self {
            clock,
            user_id,
            persistence,
            config: None,
            display_material: None,
            session: None,
            state: SessionState::NotStarted,
            timer: CountdownTimer::new(),
            autosave: AutoSaveScheduler::new(AutoSavePolicy::default()),
            question_entered_at: None,
            result: None,
        }
    }

    #[must_use]
    pub fn with_autosave(mut self, policy: AutoSavePolicy) -> Self {
        self.autosave = AutoSaveScheduler::new(policy);
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn session(&self) -> Option<&ExamSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> Option<&ExamConfig> {
        self.config.as_deref()
    }

    #[must_use]
    pub fn display_material(&self) -> Option<&str> {
        self.display_material.as_deref()
    }

    #[must_use]
    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    /// Seconds left on the attempt as of the last tick.
    #[must_use]
    pub fn time_remaining(&self) -> u32 {
        self.session.as_ref().map_or(0, ExamSession::time_remaining)
    }

    #[must_use]
    pub fn progress(&self) -> Option<LedgerProgress> {
        self.session.as_ref().map(|s| s.answers().progress())
    }

    /// The scored result once the attempt is completed.
    #[must_use]
    pub fn result(&self) -> Option<&ExamResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        let id = self.session.as_ref()?.current_question_id()?;
        self.config.as_ref()?.question(id)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Starts a fresh attempt.
    ///
    /// The session id comes from the remote API when one is configured and
    /// reachable, otherwise it is generated locally.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` unless the controller is new.
    pub async fn start(&mut self, config: ExamConfig) -> Result<&ExamSession, SessionError> {
        self.ensure_not_started()?;
        self.start_fresh(Arc::new(config)).await
    }

    /// Resumes the snapshot stored under `session_id`, or starts fresh when
    /// there is none or it no longer fits the exam.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` unless the controller is new.
    pub async fn resume(
        &mut self,
        config: ExamConfig,
        session_id: &SessionId,
    ) -> Result<&ExamSession, SessionError> {
        self.ensure_not_started()?;
        let stored = self.persistence.load(session_id).await;
        self.restore_or_start(Arc::new(config), stored).await
    }

    /// Resumes the user's latest unfinished attempt on this exam, or starts
    /// fresh.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` unless the controller is new.
    pub async fn resume_or_start(&mut self, config: ExamConfig) -> Result<&ExamSession, SessionError> {
        self.ensure_not_started()?;
        let stored = self
            .persistence
            .find_in_progress(config.id(), self.user_id)
            .await;
        self.restore_or_start(Arc::new(config), stored).await
    }

    /// Loads the exam and resumes or starts an attempt on it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Loader` when the exam cannot be loaded or is not
    /// available, and `SessionError::AlreadyStarted` unless the controller is
    /// new. No session is created on error.
    pub async fn open(
        &mut self,
        loader: &dyn ExamLoader,
        exam_id: ExamId,
    ) -> Result<&ExamSession, SessionError> {
        self.ensure_not_started()?;
        let details = loader.get_exam_details(exam_id).await?;
        self.display_material = details.display_material;
        self.resume_or_start(details.config).await
    }

    /// Loads the exam and resumes the snapshot stored under `session_id`,
    /// starting fresh when there is none.
    ///
    /// # Errors
    ///
    /// Same as [`SessionController::open`].
    pub async fn open_session(
        &mut self,
        loader: &dyn ExamLoader,
        exam_id: ExamId,
        session_id: &SessionId,
    ) -> Result<&ExamSession, SessionError> {
        self.ensure_not_started()?;
        let details = loader.get_exam_details(exam_id).await?;
        self.display_material = details.display_material;
        self.resume(details.config, session_id).await
    }

    async fn restore_or_start(
        &mut self,
        config: Arc<ExamConfig>,
        stored: Option<ExamSession>,
    ) -> Result<&ExamSession, SessionError> {
        let Some(stored) = stored.filter(|s| !s.is_completed()) else {
            return self.start_fresh(config).await;
        };

        let session_id = stored.id().clone();
        match stored.validate_against(&config) {
            Ok(mut session) => {
                session.set_paused(false);
                info!(
                    session_id = %session.id(),
                    exam_id = %config.id(),
                    index = session.current_question_index(),
                    remaining = session.time_remaining(),
                    "session resumed"
                );
                // The restored copy may have come from the remote mirror only.
                self.autosave.mark_dirty();
                Ok(self.activate(config, session))
            }
            Err(err) => {
                warn!(%session_id, error = %err, "discarding snapshot that no longer fits the exam");
                self.start_fresh(config).await
            }
        }
    }

    async fn start_fresh(&mut self, config: Arc<ExamConfig>) -> Result<&ExamSession, SessionError> {
        let id = self.allocate_session_id(config.id()).await;
        let mut order = config.question_ids();
        if config.shuffle_questions() {
            order.shuffle(&mut rng());
        }

        let session = ExamSession::new(id, &config, self.user_id, self.clock.now(), order);
        info!(
            session_id = %session.id(),
            exam_id = %config.id(),
            user_id = %self.user_id,
            time_limit = session.time_remaining(),
            "session started"
        );

        if !self.persistence.save(&session).await {
            // The first autosave cycle retries.
            self.autosave.mark_dirty();
        }
        Ok(self.activate(config, session))
    }

    async fn allocate_session_id(&self, exam_id: ExamId) -> SessionId {
        let Some(remote) = self.persistence.remote() else {
            return SessionId::generate();
        };
        match remote.start_session(exam_id, self.user_id).await {
            Ok(id) => id,
            Err(err) => {
                warn!(%exam_id, error = %err, "remote session start failed, using a local id");
                SessionId::generate()
            }
        }
    }

    fn activate(&mut self, config: Arc<ExamConfig>, session: ExamSession) -> &ExamSession {
        let now = self.clock.now();
        self.timer.start(session.time_remaining(), now);
        self.autosave.start(now);
        self.question_entered_at = Some(now);
        self.config = Some(config);
        self.state = SessionState::Active;
        self.session.insert(session)
    }

    // ─── Attempt operations ────────────────────────────────────────────────

    /// Records an answer, overwriting any earlier one for the question.
    ///
    /// Seconds since the student arrived at the current question are added
    /// to the question's time.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside `Active`,
    /// `SessionError::UnknownQuestion` for ids outside the exam and
    /// `SessionError::AnswerKindMismatch` when the value does not fit the
    /// question kind.
    pub fn answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<&ExamAnswer, SessionError> {
        self.ensure_active()?;
        let now = self.clock.now();
        let (Some(session), Some(config)) = (self.session.as_mut(), self.config.as_ref()) else {
            return Err(SessionError::NotActive { state: self.state });
        };

        let question = config
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if !question.accepts(&value) {
            return Err(SessionError::AnswerKindMismatch(question_id));
        }

        let delta = self
            .question_entered_at
            .map_or(0, |since| elapsed_secs(since, now));
        self.question_entered_at = Some(now);

        let ledger = session.answers().record(question_id, value, delta);
        session.replace_answers(ledger);
        self.autosave.mark_dirty();
        debug!(session_id = %session.id(), %question_id, delta, "answer recorded");

        session
            .answers()
            .get(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))
    }

    /// Moves to the question at `index` of the session's question order.
    ///
    /// Exams without review only move forward.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside `Active`,
    /// `SessionError::InvalidQuestionIndex` for an out-of-range index and
    /// `SessionError::ReviewNotAllowed` for a backward move on an exam
    /// without review.
    pub fn navigate(&mut self, index: usize) -> Result<QuestionId, SessionError> {
        self.ensure_active()?;
        let now = self.clock.now();
        let (Some(session), Some(config)) = (self.session.as_mut(), self.config.as_ref()) else {
            return Err(SessionError::NotActive { state: self.state });
        };

        let current = session.current_question_index();
        if index < current && !config.allow_review() {
            return Err(SessionError::ReviewNotAllowed { index, current });
        }
        let count = session.question_count();
        let id = session
            .move_to(index)
            .ok_or(SessionError::InvalidQuestionIndex { index, count })?;
        self.question_entered_at = Some(now);
        self.autosave.mark_dirty();
        Ok(id)
    }

    /// Freezes the countdown. Time since the last tick is not charged.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside `Active`.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NotActive { state: self.state });
        };

        self.timer.stop();
        session.consume_time(self.timer.remaining());
        session.set_paused(true);
        self.autosave.mark_dirty();
        self.question_entered_at = None;
        self.state = SessionState::Paused;
        info!(session_id = %session.id(), remaining = session.time_remaining(), "session paused");
        Ok(())
    }

    /// Restarts the countdown from the stored remaining time.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` unless the session is `Paused`.
    pub fn unpause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(self.not_active());
        }
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NotActive { state: self.state });
        };

        session.set_paused(false);
        self.timer.start(session.time_remaining(), now);
        self.autosave.mark_dirty();
        self.question_entered_at = Some(now);
        self.state = SessionState::Active;
        info!(session_id = %session.id(), remaining = session.time_remaining(), "session unpaused");
        Ok(())
    }

    // ─── Timer and autosave ────────────────────────────────────────────────

    /// Charges elapsed time and polls the autosave cadences.
    ///
    /// Does nothing outside `Active`. When the report says the timer expired
    /// the caller must run [`SessionController::on_timer_expired`].
    pub fn tick(&mut self) -> TickReport {
        let idle = TickReport {
            event: TimerEvent::Idle,
            remaining: self.time_remaining(),
            save_due: false,
            sync_due: false,
        };
        if self.state != SessionState::Active {
            return idle;
        }
        let Some(session) = self.session.as_mut() else {
            return idle;
        };

        let now = self.clock.now();
        let event = self.timer.tick(now);
        session.consume_time(self.timer.remaining());
        if matches!(event, TimerEvent::Tick { .. }) {
            // Charged time must reach storage, or a restart hands it back.
            self.autosave.mark_dirty();
        }

        if event == TimerEvent::Expired {
            info!(session_id = %session.id(), "time is up");
            return TickReport {
                event,
                remaining: 0,
                save_due: false,
                sync_due: false,
            };
        }

        let due = self.autosave.poll(now);
        TickReport {
            event,
            remaining: session.time_remaining(),
            save_due: due.save,
            sync_due: due.sync,
        }
    }

    /// Claims the save slot and captures a snapshot to write.
    ///
    /// Returns `None` when there is no live session or a save is in flight.
    pub fn begin_save(&mut self) -> Option<SaveJob> {
        if !self.state.is_live() {
            return None;
        }
        let snapshot = self.snapshot()?;
        let ticket = self.autosave.begin_save()?;
        Some(SaveJob { ticket, snapshot })
    }

    /// Reports the outcome of a save claimed with [`SessionController::begin_save`].
    pub fn finish_save(&mut self, ticket: SaveTicket, saved: bool) {
        self.autosave.finish_save(ticket, saved);
    }

    /// A copy of the live session stamped with the current time.
    pub fn snapshot(&mut self) -> Option<ExamSession> {
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        session.touch(now);
        Some(session.clone())
    }

    /// One host cycle: tick, then submit on expiry or run whatever save and
    /// sync came due. Persistence failures are logged and retried next cycle.
    ///
    /// Hosts that must not hold the controller across I/O use
    /// [`SessionController::tick`] and [`SessionController::begin_save`]
    /// instead.
    pub async fn housekeeping(&mut self) -> TickReport {
        let report = self.tick();
        if report.expired() {
            if let Err(err) = self.on_timer_expired().await {
                warn!(error = %err, "forced submission failed");
            }
            return report;
        }

        if report.save_due
            && let Some(job) = self.begin_save()
        {
            let saved = self.persistence.save(&job.snapshot).await;
            self.finish_save(job.ticket, saved);
        }
        if report.sync_due
            && let Some(snapshot) = self.snapshot()
        {
            self.persistence.sync_remote(&snapshot).await;
        }
        report
    }

    // ─── Completion ────────────────────────────────────────────────────────

    /// Hard deadline: submits whatever has been answered.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` if the attempt already ended.
    pub async fn on_timer_expired(&mut self) -> Result<&ExamResult, SessionError> {
        info!(state = %self.state, "submitting on time-up");
        self.submit().await
    }

    /// Scores the attempt and completes it.
    ///
    /// Scoring runs locally and its result is authoritative. The remote
    /// scorer, when configured, is informed but its failure does not block
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside `Active`, including on a
    /// second submission.
    pub async fn submit(&mut self) -> Result<&ExamResult, SessionError> {
        self.ensure_active()?;
        let now = self.clock.now();
        let (Some(session), Some(config)) = (self.session.as_mut(), self.config.clone()) else {
            return Err(SessionError::NotActive { state: self.state });
        };

        self.timer.tick(now);
        session.consume_time(self.timer.remaining());
        self.timer.stop();
        self.autosave.stop();

        let answers = session.answers().clone();
        let time_spent = config
            .time_limit_secs()
            .saturating_sub(session.time_remaining());
        let result = score_submission(
            &config,
            &answers,
            Submission {
                session_id: session.id().clone(),
                user_id: session.user_id(),
                time_spent,
                completed_at: now,
            },
        );

        let outcomes = result
            .question_results
            .iter()
            .filter(|r| r.is_answered())
            .map(|r| (r.question_id, r.is_correct));
        session.complete(now, answers.resolve(outcomes));
        session.touch(now);
        let completed = session.clone();

        self.state = SessionState::Completed;
        self.question_entered_at = None;
        info!(
            session_id = %completed.id(),
            score = result.score,
            percentage = result.percentage,
            passed = result.passed,
            "session submitted"
        );

        self.report_remote_score(&completed, &answers, &result).await;
        if !self.persistence.delete(completed.id()).await {
            // Leave a completed snapshot behind so the attempt is not resumed.
            self.persistence.save(&completed).await;
        }
        self.persistence.record_result(&result).await;

        Ok(&*self.result.insert(result))
    }

    async fn report_remote_score(
        &self,
        session: &ExamSession,
        answers: &AnswerLedger,
        local: &ExamResult,
    ) {
        let Some(remote) = self.persistence.remote() else {
            return;
        };
        match remote.submit_answers(session.id(), answers).await {
            Ok(remote)
                if remote.score != local.score
                    || remote.percentage != local.percentage
                    || remote.passed != local.passed =>
            {
                warn!(
                    session_id = %session.id(),
                    local = local.percentage,
                    remote = remote.percentage,
                    "remote score disagrees with local scoring"
                );
            }
            Ok(_) => debug!(session_id = %session.id(), "remote score matches"),
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "remote submit failed, keeping local result");
            }
        }
    }

    // ─── Exit ──────────────────────────────────────────────────────────────

    /// Summarises what leaving now would abandon. Changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` unless the session is `Active` or `Paused`.
    pub fn request_exit(&self) -> Result<ExitPrompt, SessionError> {
        if !self.state.is_live() {
            return Err(self.not_active());
        }
        let session = self.session.as_ref().ok_or_else(|| self.not_active())?;
        let progress = session.answers().progress();
        Ok(ExitPrompt {
            answered: progress.answered,
            total: progress.total,
            remaining: session.time_remaining(),
        })
    }

    /// Saves progress and leaves without submitting. The attempt stays
    /// resumable. Returns whether the final save succeeded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` unless the session is `Active` or `Paused`.
    pub async fn confirm_exit(&mut self) -> Result<bool, SessionError> {
        if !self.state.is_live() {
            return Err(self.not_active());
        }
        let now = self.clock.now();
        if self.state == SessionState::Active
            && let Some(session) = self.session.as_mut()
        {
            self.timer.tick(now);
            session.consume_time(self.timer.remaining());
        }
        self.timer.stop();
        self.autosave.stop();

        let snapshot = self.snapshot().ok_or_else(|| self.not_active())?;
        let saved = self.persistence.save(&snapshot).await;
        self.state = SessionState::Exited;
        self.question_entered_at = None;
        info!(session_id = %snapshot.id(), saved, remaining = snapshot.time_remaining(), "session exited");
        Ok(saved)
    }

    // ─── Guards ────────────────────────────────────────────────────────────

    fn ensure_not_started(&self) -> Result<(), SessionError> {
        if self.state == SessionState::NotStarted {
            Ok(())
        } else {
            Err(SessionError::AlreadyStarted)
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    fn not_active(&self) -> SessionError {
        SessionError::NotActive { state: self.state }
    }
}
