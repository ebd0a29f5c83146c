use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};
use uuid::Uuid;

use super::domain::{Attachment, Field, FieldValue};
use super::pipeline::SubmissionPipeline;
use super::schema::WizardSchema;
use super::storage::{AttachmentStore, RecordStore};
use super::wizard::{
    RegistrationWizard, SubmissionStart, SubmitOutcome, WizardError, WizardView,
    DEFAULT_SHAKE_DURATION,
};

type SharedWizard<A, R> = Arc<tokio::sync::Mutex<RegistrationWizard<A, R>>>;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct SessionEntry<A, R> {
    wizard: SharedWizard<A, R>,
    last_touched: Instant,
}

/// Live wizards keyed by session id. Each wizard has its own async lock so a
/// running submission never blocks other sessions. Sessions idle for longer
/// than the idle timeout are dropped whenever a new one is opened.
pub struct RegistrationSessions<A, R> {
    schema: Arc<WizardSchema>,
    pipeline: SubmissionPipeline<A, R>,
    shake_duration: Duration,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<String, SessionEntry<A, R>>>,
}

impl<A, R> RegistrationSessions<A, R>
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    pub fn new(schema: WizardSchema, pipeline: SubmissionPipeline<A, R>) -> Self {
        Self {
            schema: Arc::new(schema),
            pipeline,
            shake_duration: DEFAULT_SHAKE_DURATION,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_shake_duration(mut self, duration: Duration) -> Self {
        self.shake_duration = duration;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Start a fresh, empty wizard and return its session id.
    pub fn open(&self) -> String {
        self.open_at(Instant::now())
    }

    pub fn open_at(&self, now: Instant) -> String {
        self.evict_idle_at(now);

        let id = Uuid::new_v4().to_string();
        let wizard = RegistrationWizard::new(Arc::clone(&self.schema), self.pipeline.clone())
            .with_shake_duration(self.shake_duration);
        self.sessions.lock().expect("session mutex poisoned").insert(
            id.clone(),
            SessionEntry {
                wizard: Arc::new(tokio::sync::Mutex::new(wizard)),
                last_touched: now,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<SharedWizard<A, R>> {
        self.get_at(id, Instant::now())
    }

    /// Look up a session and mark it as used at `now`.
    pub fn get_at(&self, id: &str, now: Instant) -> Option<SharedWizard<A, R>> {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        let entry = sessions.get_mut(id)?;
        entry.last_touched = now;
        Some(Arc::clone(&entry.wizard))
    }

    /// Drop every session untouched for at least the idle timeout and return
    /// how many were removed.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        let before = sessions.len();
        sessions.retain(|_, entry| {
            now.saturating_duration_since(entry.last_touched) < self.idle_timeout
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "idle registration sessions dropped");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wizard snapshot tagged with its session id.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    #[serde(flatten)]
    pub wizard: WizardView,
}

/// Body of `PUT .../fields/:field`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUpdate {
    Value(String),
    Attachment(AttachmentPayload),
    Clear,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub data_base64: String,
}

impl AttachmentPayload {
    fn decode(self) -> Result<Attachment, String> {
        let bytes = STANDARD
            .decode(self.data_base64.as_bytes())
            .map_err(|err| format!("attachment is not valid base64: {err}"))?;
        let content_type = match self.content_type {
            Some(raw) => raw
                .parse::<mime::Mime>()
                .map_err(|_| format!("`{raw}` is not a valid content type"))?
                .to_string(),
            None => mime::APPLICATION_OCTET_STREAM.to_string(),
        };
        Ok(Attachment::new(self.file_name, content_type, bytes))
    }
}

/// Router exposing the wizard operations for browser clients.
pub fn registration_router<A, R>(sessions: Arc<RegistrationSessions<A, R>>) -> Router
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    Router::new()
        .route("/api/v1/registrations", post(open_handler::<A, R>))
        .route(
            "/api/v1/registrations/:session_id",
            get(view_handler::<A, R>),
        )
        .route(
            "/api/v1/registrations/:session_id/fields/:field",
            put(update_field_handler::<A, R>),
        )
        .route(
            "/api/v1/registrations/:session_id/advance",
            post(advance_handler::<A, R>),
        )
        .route(
            "/api/v1/registrations/:session_id/retreat",
            post(retreat_handler::<A, R>),
        )
        .route(
            "/api/v1/registrations/:session_id/submit",
            post(submit_handler::<A, R>),
        )
        .with_state(sessions)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

fn session_not_found(session_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("registration session `{session_id}` not found"),
    )
}

fn wizard_error_response(error: WizardError) -> Response {
    let status = match error {
        WizardError::FieldNotInSchema(_) | WizardError::KindMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WizardError::Locked
        | WizardError::SubmissionInFlight
        | WizardError::NotOnFinalStep { .. } => StatusCode::CONFLICT,
    };
    error_response(status, error.to_string())
}

fn session_view(session_id: String, wizard: WizardView) -> axum::Json<SessionView> {
    axum::Json(SessionView { session_id, wizard })
}

pub(crate) async fn open_handler<A, R>(
    State(sessions): State<Arc<RegistrationSessions<A, R>>>,
) -> Response
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let session_id = sessions.open();
    let Some(wizard) = sessions.get(&session_id) else {
        return session_not_found(&session_id);
    };
    let view = wizard.lock().await.view();
    (StatusCode::CREATED, session_view(session_id, view)).into_response()
}

pub(crate) async fn view_handler<A, R>(
    State(sessions): State<Arc<RegistrationSessions<A, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let Some(wizard) = sessions.get(&session_id) else {
        return session_not_found(&session_id);
    };
    let view = wizard.lock().await.view();
    (StatusCode::OK, session_view(session_id, view)).into_response()
}

pub(crate) async fn update_field_handler<A, R>(
    State(sessions): State<Arc<RegistrationSessions<A, R>>>,
    Path((session_id, field)): Path<(String, String)>,
    axum::Json(update): axum::Json<FieldUpdate>,
) -> Response
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let Some(wizard) = sessions.get(&session_id) else {
        return session_not_found(&session_id);
    };
    let field = match field.parse::<Field>() {
        Ok(field) => field,
        Err(err) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    };
    let value = match update {
        FieldUpdate::Value(text) => FieldValue::Text(text),
        FieldUpdate::Attachment(payload) => match payload.decode() {
            Ok(attachment) => FieldValue::Attachment(Some(attachment)),
            Err(message) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, message),
        },
        FieldUpdate::Clear => FieldValue::Attachment(None),
    };

    let mut wizard = wizard.lock().await;
    if let Err(err) = wizard.update_field(field, value) {
        return wizard_error_response(err);
    }
    (StatusCode::OK, session_view(session_id, wizard.view())).into_response()
}

pub(crate) async fn advance_handler<A, R>(
    State(sessions): State<Arc<RegistrationSessions<A, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let Some(wizard) = sessions.get(&session_id) else {
        return session_not_found(&session_id);
    };
    let mut wizard = wizard.lock().await;
    let status = if wizard.advance() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, session_view(session_id, wizard.view())).into_response()
}

pub(crate) async fn retreat_handler<A, R>(
    State(sessions): State<Arc<RegistrationSessions<A, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let Some(wizard) = sessions.get(&session_id) else {
        return session_not_found(&session_id);
    };
    let mut wizard = wizard.lock().await;
    wizard.retreat();
    (StatusCode::OK, session_view(session_id, wizard.view())).into_response()
}

pub(crate) async fn submit_handler<A, R>(
    State(sessions): State<Arc<RegistrationSessions<A, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let Some(shared) = sessions.get(&session_id) else {
        return session_not_found(&session_id);
    };

    // The wizard lock is released while the pipeline runs; a concurrent
    // submit for the same session sees `InFlight` and is ignored.
    let start = shared.lock().await.begin_submission();
    let pending = match start {
        Ok(SubmissionStart::Ready(pending)) => pending,
        Ok(SubmissionStart::AlreadyInFlight) => {
            return (
                StatusCode::ACCEPTED,
                axum::Json(json!({ "session_id": session_id, "status": "in_flight" })),
            )
                .into_response()
        }
        Ok(SubmissionStart::Rejected) => {
            let view = shared.lock().await.view();
            return (StatusCode::UNPROCESSABLE_ENTITY, session_view(session_id, view))
                .into_response();
        }
        Err(err) => return wizard_error_response(err),
    };

    // Runs detached so a dropped request cannot leave the wizard in flight.
    let committer = Arc::clone(&shared);
    let task = tokio::spawn(async move {
        let report = pending.run().await;
        let mut wizard = committer.lock().await;
        let outcome = wizard.finish_submission(report);
        (outcome, wizard.view())
    });
    let (outcome, view) = match task.await {
        Ok(finished) => finished,
        Err(err) => {
            error!(%session_id, error = %err, "submission task aborted");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "submission aborted");
        }
    };

    match outcome {
        SubmitOutcome::Succeeded(receipt) => (
            StatusCode::OK,
            axum::Json(json!({ "session_id": session_id, "receipt": receipt })),
        )
            .into_response(),
        SubmitOutcome::Failed(failure) => (
            StatusCode::BAD_GATEWAY,
            axum::Json(json!({
                "error": "submission failed",
                "reason": failure.reason(),
            })),
        )
            .into_response(),
        SubmitOutcome::Rejected | SubmitOutcome::Ignored => {
            (StatusCode::OK, session_view(session_id, view)).into_response()
        }
    }
}
