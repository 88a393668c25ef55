use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use exam_core::AnswerLedger;
use exam_core::model::{ExamId, ExamSession, SessionId, UserId};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Score reported by the remote scorer. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteScore {
    pub score: u32,
    pub percentage: u32,
    pub passed: bool,
}

/// Server-side mirror of exam sessions.
#[async_trait]
pub trait RemoteSessionApi: Send + Sync {
    /// Registers a new attempt and returns the id the server assigned.
    async fn start_session(
        &self,
        exam_id: ExamId,
        user_id: UserId,
    ) -> Result<SessionId, RemoteError>;

    /// Pushes answers, position and remaining time.
    async fn save_progress(&self, session: &ExamSession) -> Result<(), RemoteError>;

    async fn submit_answers(
        &self,
        session_id: &SessionId,
        answers: &AnswerLedger,
    ) -> Result<RemoteScore, RemoteError>;

    /// Fetches a session the server knows about. Unknown ids yield `None`.
    async fn get_session(&self, session_id: &SessionId)
    -> Result<Option<ExamSession>, RemoteError>;
}

/// JSON-over-HTTP client of the remote session API.
#[derive(Clone, Debug)]
pub struct HttpSessionApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSessionApi {
    /// Builds a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let mut base_url = config.base_url;
        // Url::join drops the last segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            token: config.token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteSessionApi for HttpSessionApi {
    async fn start_session(
        &self,
        exam_id: ExamId,
        user_id: UserId,
    ) -> Result<SessionId, RemoteError> {
        let url = self.endpoint(&format!("exams/{exam_id}/sessions"))?;
        let response = self
            .authorize(self.client.post(url))
            .json(&StartRequest { user_id })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }

        let body: StartResponse = response.json().await?;
        if body.id.trim().is_empty() {
            return Err(RemoteError::InvalidResponse("empty session id".into()));
        }
        Ok(SessionId::new(body.id))
    }

    async fn save_progress(&self, session: &ExamSession) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("sessions/{}/progress", session.id()))?;
        let payload = ProgressRequest {
            answers: session.answers(),
            current_question_index: session.current_question_index(),
            time_remaining: session.time_remaining(),
            is_paused: session.is_paused(),
        };
        let response = self
            .authorize(self.client.put(url))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        Ok(())
    }

    async fn submit_answers(
        &self,
        session_id: &SessionId,
        answers: &AnswerLedger,
    ) -> Result<RemoteScore, RemoteError> {
        let url = self.endpoint(&format!("sessions/{session_id}/submit"))?;
        let response = self
            .authorize(self.client.post(url))
            .json(&SubmitRequest { answers })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ExamSession>, RemoteError> {
        let url = self.endpoint(&format!("sessions/{session_id}"))?;
        let response = self.authorize(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        Ok(Some(response.json().await?))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressRequest<'a> {
    answers: &'a AnswerLedger,
    current_question_index: usize,
    time_remaining: u32,
    is_paused: bool,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    answers: &'a AnswerLedger,
}
