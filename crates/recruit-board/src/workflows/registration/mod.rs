//! Multi-step membership registration: the wizard state machine, per-step
//! validation, and the upload-then-insert submission pipeline.

pub mod domain;
pub mod pipeline;
pub mod receipt;
pub mod rest;
pub mod router;
pub mod schema;
pub mod storage;
pub(crate) mod validation;
pub mod wizard;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationDraft, Attachment, Branch, Field, FieldKind, FieldValue, SubmissionStatus,
    UnknownField, ValidationErrors,
};
pub use pipeline::{
    AttachmentUrls, PipelineError, PipelineReport, StoragePrefixes, SubmissionFailure,
    SubmissionPipeline, SubmissionStage,
};
pub use receipt::SubmissionReceipt;
pub use rest::{RestBackend, RestClientError};
pub use router::{registration_router, RegistrationSessions, SessionView, DEFAULT_IDLE_TIMEOUT};
pub use schema::{SchemaError, SchemaPreset, StepDefinition, WizardSchema};
pub use storage::{AttachmentStore, InsertError, RecordStore, RegistrationRecord, UploadError};
pub use validation::{is_valid_email, normalize_mobile};
pub use wizard::{
    PendingSubmission, RegistrationWizard, SubmissionStart, SubmitOutcome, WizardError,
    WizardView, DEFAULT_SHAKE_DURATION,
};
