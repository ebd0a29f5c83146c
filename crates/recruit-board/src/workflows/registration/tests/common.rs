use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use crate::workflows::registration::{
    Attachment, AttachmentStore, Field, InsertError, RecordStore, RegistrationRecord,
    RegistrationWizard, SubmissionPipeline, UploadError, WizardSchema,
};

/// Attachment store that keeps every accepted path and can refuse uploads
/// whose path starts with a given prefix.
#[derive(Default)]
pub(super) struct MemoryAttachments {
    stored: Mutex<Vec<String>>,
    attempts: Mutex<Vec<String>>,
    refuse_prefix: Mutex<Option<String>>,
}

impl MemoryAttachments {
    pub(super) fn refusing(prefix: &str) -> Self {
        let store = Self::default();
        store.refuse(Some(prefix));
        store
    }

    pub(super) fn refuse(&self, prefix: Option<&str>) {
        *self.refuse_prefix.lock().expect("attachment mutex poisoned") =
            prefix.map(str::to_string);
    }

    pub(super) fn stored(&self) -> Vec<String> {
        self.stored.lock().expect("attachment mutex poisoned").clone()
    }

    pub(super) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("attachment mutex poisoned").clone()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachments {
    async fn upload(&self, _attachment: &Attachment, path: &str) -> Result<String, UploadError> {
        self.attempts
            .lock()
            .expect("attachment mutex poisoned")
            .push(path.to_string());

        let refused = self
            .refuse_prefix
            .lock()
            .expect("attachment mutex poisoned")
            .as_deref()
            .is_some_and(|prefix| path.starts_with(prefix));
        if refused {
            return Err(UploadError::Unavailable("bucket offline".to_string()));
        }

        self.stored
            .lock()
            .expect("attachment mutex poisoned")
            .push(path.to_string());
        Ok(format!("memory://{path}"))
    }
}

/// Attachment store whose uploads block until [`release`](Self::release) is
/// called, announcing each upload as it starts.
pub(super) struct GatedAttachments {
    pub(super) started: Notify,
    gate: Semaphore,
    inner: MemoryAttachments,
}

impl Default for GatedAttachments {
    fn default() -> Self {
        Self {
            started: Notify::new(),
            gate: Semaphore::new(0),
            inner: MemoryAttachments::default(),
        }
    }
}

impl GatedAttachments {
    pub(super) fn release(&self) {
        self.gate.add_permits(16);
    }

    pub(super) fn stored(&self) -> Vec<String> {
        self.inner.stored()
    }
}

#[async_trait]
impl AttachmentStore for GatedAttachments {
    async fn upload(&self, attachment: &Attachment, path: &str) -> Result<String, UploadError> {
        self.started.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| UploadError::Unavailable("gate closed".to_string()))?;
        self.inner.upload(attachment, path).await
    }
}

#[derive(Default)]
pub(super) struct MemoryRecords {
    rows: Mutex<Vec<RegistrationRecord>>,
    calls: Mutex<usize>,
    failing: AtomicBool,
}

impl MemoryRecords {
    pub(super) fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(super) fn rows(&self) -> Vec<RegistrationRecord> {
        self.rows.lock().expect("record mutex poisoned").clone()
    }

    pub(super) fn calls(&self) -> usize {
        *self.calls.lock().expect("record mutex poisoned")
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn insert(&self, record: &RegistrationRecord) -> Result<(), InsertError> {
        *self.calls.lock().expect("record mutex poisoned") += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(InsertError::Schema("column \"year\" does not exist".to_string()));
        }
        self.rows
            .lock()
            .expect("record mutex poisoned")
            .push(record.clone());
        Ok(())
    }
}

pub(super) type MemoryWizard = RegistrationWizard<MemoryAttachments, MemoryRecords>;

pub(super) fn pipeline(
    attachments: &Arc<MemoryAttachments>,
    records: &Arc<MemoryRecords>,
) -> SubmissionPipeline<MemoryAttachments, MemoryRecords> {
    SubmissionPipeline::new(Arc::clone(attachments), Arc::clone(records))
}

pub(super) fn wizard_with(
    schema: WizardSchema,
    attachments: &Arc<MemoryAttachments>,
    records: &Arc<MemoryRecords>,
) -> MemoryWizard {
    RegistrationWizard::new(Arc::new(schema), pipeline(attachments, records))
}

pub(super) fn photo() -> Attachment {
    Attachment::new("asha.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47])
}

pub(super) fn resume() -> Attachment {
    Attachment::new("asha-cv.pdf", "application/pdf", b"%PDF-1.7".to_vec())
}

pub(super) fn fill_identity(wizard: &mut MemoryWizard) {
    wizard
        .update_field(Field::FullName, "Asha Patil")
        .expect("full name accepted");
    wizard
        .update_field(Field::Email, "asha@wlug.org")
        .expect("email accepted");
    wizard
        .update_field(Field::Mobile, "98765 43210")
        .expect("mobile accepted");
}

pub(super) fn fill_department(wizard: &mut MemoryWizard) {
    wizard
        .update_field(Field::Branch, "cse")
        .expect("branch accepted");
    wizard.update_field(Field::Year, "2").expect("year accepted");
    wizard
        .update_field(Field::Mission, "Help run the Linux install fest")
        .expect("mission accepted");
}

pub(super) fn fill_documents(wizard: &mut MemoryWizard) {
    wizard
        .update_field(Field::ProfilePhoto, photo())
        .expect("photo accepted");
    wizard
        .update_field(Field::Resume, resume())
        .expect("resume accepted");
}

/// Fill every step of the documents layout and walk to the review step.
pub(super) fn ready_for_review(wizard: &mut MemoryWizard) {
    fill_identity(wizard);
    assert!(wizard.advance());
    fill_department(wizard);
    assert!(wizard.advance());
    fill_documents(wizard);
    assert!(wizard.advance());
    assert_eq!(wizard.current_step(), wizard.total_steps());
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
