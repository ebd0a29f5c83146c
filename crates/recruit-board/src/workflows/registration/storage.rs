use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationDraft, Attachment};
use super::validation::normalize_mobile;

/// Flat row written once all attachments are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub year: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prn: String,
    pub mission: String,
    pub photo_url: String,
    pub resume_url: String,
}

impl RegistrationRecord {
    /// Scalar fields are trimmed, the branch code lower-cased, and the mobile
    /// number reduced to its digits. Missing attachment URLs become `""`.
    pub fn from_draft(
        draft: &ApplicationDraft,
        photo_url: Option<&str>,
        resume_url: Option<&str>,
    ) -> Self {
        Self {
            full_name: draft.full_name.trim().to_string(),
            email: draft.email.trim().to_string(),
            mobile: normalize_mobile(&draft.mobile),
            branch: draft.branch.trim().to_ascii_lowercase(),
            year: draft.year.trim().to_string(),
            prn: draft.prn.trim().to_string(),
            mission: draft.mission.trim().to_string(),
            photo_url: photo_url.unwrap_or_default().to_string(),
            resume_url: resume_url.unwrap_or_default().to_string(),
        }
    }

    /// Column/value view of the row, omitting empty optional columns.
    pub fn columns(&self) -> BTreeMap<&'static str, &str> {
        let mut columns = BTreeMap::new();
        columns.insert("full_name", self.full_name.as_str());
        columns.insert("email", self.email.as_str());
        columns.insert("mobile", self.mobile.as_str());
        columns.insert("branch", self.branch.as_str());
        if !self.year.is_empty() {
            columns.insert("year", self.year.as_str());
        }
        if !self.prn.is_empty() {
            columns.insert("prn", self.prn.as_str());
        }
        columns.insert("mission", self.mission.as_str());
        columns.insert("photo_url", self.photo_url.as_str());
        columns.insert("resume_url", self.resume_url.as_str());
        columns
    }
}

/// Object storage for applicant files.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store `attachment` at `path` and return its public URL.
    async fn upload(&self, attachment: &Attachment, path: &str) -> Result<String, UploadError>;
}

/// Table storage for finished registrations.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &RegistrationRecord) -> Result<(), InsertError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("storage rejected upload with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    #[error("record does not match table schema: {0}")]
    Schema(String),
    #[error("record store rejected insert with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}
