use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{ApplicationDraft, Field, FieldKind, FieldValue, SubmissionStatus, ValidationErrors};
use super::pipeline::{AttachmentUrls, PipelineReport, SubmissionFailure, SubmissionPipeline};
use super::receipt::SubmissionReceipt;
use super::schema::{StepDefinition, WizardSchema};
use super::storage::{AttachmentStore, RecordStore};
use super::validation;

pub const DEFAULT_SHAKE_DURATION: Duration = Duration::from_millis(500);

/// Short-lived "that step is not valid yet" cue. It expires on its own and is
/// never part of the committed wizard state.
#[derive(Debug, Clone, Copy)]
pub struct ShakeSignal {
    raised_at: Instant,
    duration: Duration,
}

impl ShakeSignal {
    pub fn is_active_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) < self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("field `{0}` is not part of this registration form")]
    FieldNotInSchema(Field),
    #[error("field `{field}` expects {expected} input")]
    KindMismatch { field: Field, expected: &'static str },
    #[error("registration has already been submitted")]
    Locked,
    #[error("a submission is already in progress")]
    SubmissionInFlight,
    #[error("submit is only available on step {total} (currently on step {current})")]
    NotOnFinalStep { current: usize, total: usize },
}

/// What a call to [`RegistrationWizard::submit`] amounted to.
#[derive(Debug)]
pub enum SubmitOutcome {
    Succeeded(SubmissionReceipt),
    /// Final-step validation failed; see the wizard's errors.
    Rejected,
    /// Another submission is still running; nothing was sent.
    Ignored,
    Failed(SubmissionFailure),
}

/// Result of [`RegistrationWizard::begin_submission`].
pub enum SubmissionStart<A, R> {
    Ready(PendingSubmission<A, R>),
    Rejected,
    AlreadyInFlight,
}

/// Snapshot taken when a submission starts, so the pipeline can run without
/// holding the wizard.
pub struct PendingSubmission<A, R> {
    pipeline: SubmissionPipeline<A, R>,
    draft: ApplicationDraft,
    known: AttachmentUrls,
}

impl<A, R> PendingSubmission<A, R>
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    pub async fn run(self) -> PipelineReport {
        self.pipeline.run(&self.draft, self.known).await
    }
}

/// Serializable snapshot for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub current_step: usize,
    pub total_steps: usize,
    pub step: Option<StepDefinition>,
    pub values: BTreeMap<Field, String>,
    pub attachments: BTreeMap<Field, String>,
    pub errors: ValidationErrors,
    pub status: SubmissionStatus,
    pub shake: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<SubmissionReceipt>,
}

/// Multi-step registration form: step navigation, field errors, and the
/// final upload-then-insert submission.
pub struct RegistrationWizard<A, R> {
    schema: Arc<WizardSchema>,
    current_step: usize,
    draft: ApplicationDraft,
    errors: ValidationErrors,
    status: SubmissionStatus,
    uploaded: AttachmentUrls,
    receipt: Option<SubmissionReceipt>,
    shake: Option<ShakeSignal>,
    shake_duration: Duration,
    pipeline: SubmissionPipeline<A, R>,
}

impl<A, R> RegistrationWizard<A, R>
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    pub fn new(schema: Arc<WizardSchema>, pipeline: SubmissionPipeline<A, R>) -> Self {
        Self {
            schema,
            current_step: 1,
            draft: ApplicationDraft::default(),
            errors: ValidationErrors::default(),
            status: SubmissionStatus::Idle,
            uploaded: AttachmentUrls::default(),
            receipt: None,
            shake: None,
            shake_duration: DEFAULT_SHAKE_DURATION,
            pipeline,
        }
    }

    pub fn with_shake_duration(mut self, duration: Duration) -> Self {
        self.shake_duration = duration;
        self
    }

    pub fn schema(&self) -> &WizardSchema {
        &self.schema
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.schema.total_steps()
    }

    pub fn draft(&self) -> &ApplicationDraft {
        &self.draft
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    /// URLs of attachments stored by earlier, failed attempts.
    pub fn uploaded(&self) -> &AttachmentUrls {
        &self.uploaded
    }

    pub fn shake_active(&self) -> bool {
        self.shake_active_at(Instant::now())
    }

    pub fn shake_active_at(&self, now: Instant) -> bool {
        self.shake.is_some_and(|signal| signal.is_active_at(now))
    }

    /// Overwrite one field and clear its error. No validation happens here.
    pub fn update_field(
        &mut self,
        field: Field,
        value: impl Into<FieldValue>,
    ) -> Result<(), WizardError> {
        self.ensure_editable()?;
        if !self.schema.contains(field) {
            return Err(WizardError::FieldNotInSchema(field));
        }

        match (field.kind(), value.into()) {
            (FieldKind::Text, FieldValue::Text(text)) => {
                if let Some(slot) = self.draft.text_slot(field) {
                    *slot = text;
                }
            }
            (FieldKind::Attachment, FieldValue::Attachment(attachment)) => {
                if let Some(slot) = self.draft.attachment_slot(field) {
                    *slot = attachment;
                }
                self.uploaded.forget(field);
            }
            (kind, _) => {
                return Err(WizardError::KindMismatch {
                    field,
                    expected: kind.describe(),
                })
            }
        }

        self.errors.remove(field);
        Ok(())
    }

    /// Re-check the fields of `step`, replacing only their error entries.
    /// Steps outside the schema have no fields and always pass.
    pub fn validate_step(&mut self, step: usize) -> bool {
        let schema = Arc::clone(&self.schema);
        let Some(definition) = schema.step(step) else {
            return true;
        };

        let mut valid = true;
        for &field in &definition.fields {
            match validation::check_field(field, &self.draft) {
                Some(message) => {
                    self.errors.insert(field, message);
                    valid = false;
                }
                None => {
                    self.errors.remove(field);
                }
            }
        }

        if !valid {
            self.shake = Some(ShakeSignal {
                raised_at: Instant::now(),
                duration: self.shake_duration,
            });
            debug!(
                step,
                failing = ?self.errors.fields().collect::<Vec<_>>(),
                "step validation failed"
            );
        }
        valid
    }

    /// Move forward one step if the current one validates.
    pub fn advance(&mut self) -> bool {
        if !self.validate_step(self.current_step) {
            return false;
        }
        let from = self.current_step;
        self.current_step = (from + 1).min(self.total_steps());
        debug!(from, to = self.current_step, "wizard advanced");
        true
    }

    pub fn retreat(&mut self) {
        let from = self.current_step;
        self.current_step = from.saturating_sub(1).max(1);
        debug!(from, to = self.current_step, "wizard retreated");
    }

    /// Validate the final step and mark the wizard in flight. The returned
    /// snapshot is run separately and its report handed back to
    /// [`finish_submission`](Self::finish_submission).
    pub fn begin_submission(&mut self) -> Result<SubmissionStart<A, R>, WizardError> {
        match self.status {
            SubmissionStatus::Succeeded => return Err(WizardError::Locked),
            SubmissionStatus::InFlight => {
                debug!("duplicate submit ignored while in flight");
                return Ok(SubmissionStart::AlreadyInFlight);
            }
            SubmissionStatus::Idle | SubmissionStatus::Failed(_) => {}
        }

        let total = self.total_steps();
        if self.current_step != total {
            return Err(WizardError::NotOnFinalStep {
                current: self.current_step,
                total,
            });
        }

        if !self.validate_step(total) {
            return Ok(SubmissionStart::Rejected);
        }

        self.status = SubmissionStatus::InFlight;
        info!(email = %self.draft.email.trim(), "registration submission started");

        Ok(SubmissionStart::Ready(PendingSubmission {
            pipeline: self.pipeline.clone(),
            draft: self.draft.clone(),
            known: self.uploaded.clone(),
        }))
    }

    /// Commit a pipeline report. Successful uploads are remembered even when
    /// the run failed, so a retry does not store them twice.
    pub fn finish_submission(&mut self, report: PipelineReport) -> SubmitOutcome {
        let PipelineReport { urls, outcome } = report;
        self.uploaded = urls;

        match outcome {
            Ok(record) => {
                let receipt = SubmissionReceipt::issue(&record, Utc::now());
                info!(member_id = %receipt.member_id, "registration submitted");
                self.status = SubmissionStatus::Succeeded;
                self.receipt = Some(receipt.clone());
                self.draft = ApplicationDraft::default();
                self.uploaded = AttachmentUrls::default();
                SubmitOutcome::Succeeded(receipt)
            }
            Err(failure) => {
                warn!(stage = ?failure.stage, reason = %failure.reason(), "registration submission failed");
                self.status = SubmissionStatus::Failed(failure.reason());
                SubmitOutcome::Failed(failure)
            }
        }
    }

    /// Validate, upload attachments, then insert the record, in order.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, WizardError> {
        match self.begin_submission()? {
            SubmissionStart::Ready(pending) => {
                let report = pending.run().await;
                Ok(self.finish_submission(report))
            }
            SubmissionStart::Rejected => Ok(SubmitOutcome::Rejected),
            SubmissionStart::AlreadyInFlight => Ok(SubmitOutcome::Ignored),
        }
    }

    pub fn view(&self) -> WizardView {
        let mut values = BTreeMap::new();
        let mut attachments = BTreeMap::new();
        for &field in self.schema.fields() {
            if let Some(text) = self.draft.text(field) {
                values.insert(field, text.to_string());
            } else if let Some(attachment) = self.draft.attachment(field) {
                attachments.insert(field, attachment.file_name.clone());
            }
        }

        WizardView {
            current_step: self.current_step,
            total_steps: self.total_steps(),
            step: self.schema.step(self.current_step).cloned(),
            values,
            attachments,
            errors: self.errors.clone(),
            status: self.status.clone(),
            shake: self.shake_active(),
            receipt: self.receipt.clone(),
        }
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        match self.status {
            SubmissionStatus::Succeeded => Err(WizardError::Locked),
            SubmissionStatus::InFlight => Err(WizardError::SubmissionInFlight),
            SubmissionStatus::Idle | SubmissionStatus::Failed(_) => Ok(()),
        }
    }
}
