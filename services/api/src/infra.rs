use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use recruit_board::workflows::registration::{
    Attachment, AttachmentStore, InsertError, RecordStore, RegistrationRecord, UploadError,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Keeps uploaded files in memory and hands out `memory://` URLs. Used when
/// no hosted storage backend is configured.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAttachmentStore {
    objects: Arc<Mutex<HashMap<String, Attachment>>>,
    fail_with: Option<String>,
}

impl InMemoryAttachmentStore {
    pub(crate) fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        let guard = self.objects.lock().expect("attachment mutex poisoned");
        let mut paths: Vec<String> = guard.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn upload(&self, attachment: &Attachment, path: &str) -> Result<String, UploadError> {
        if let Some(reason) = &self.fail_with {
            return Err(UploadError::Unavailable(reason.clone()));
        }

        let mut guard = self.objects.lock().expect("attachment mutex poisoned");
        if guard.contains_key(path) {
            return Err(UploadError::Rejected {
                status: 409,
                message: format!("object `{path}` already exists"),
            });
        }
        guard.insert(path.to_string(), attachment.clone());
        Ok(format!("memory://{path}"))
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRecordStore {
    rows: Arc<Mutex<Vec<RegistrationRecord>>>,
}

impl InMemoryRecordStore {
    pub(crate) fn rows(&self) -> Vec<RegistrationRecord> {
        self.rows.lock().expect("record mutex poisoned").clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: &RegistrationRecord) -> Result<(), InsertError> {
        self.rows
            .lock()
            .expect("record mutex poisoned")
            .push(record.clone());
        Ok(())
    }
}
