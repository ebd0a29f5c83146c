use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::domain::{ApplicationDraft, Attachment, Field};
use super::storage::{AttachmentStore, InsertError, RecordStore, RegistrationRecord, UploadError};

/// Namespaces applied to uploaded object paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePrefixes {
    pub photos: String,
    pub resumes: String,
}

impl Default for StoragePrefixes {
    fn default() -> Self {
        Self {
            photos: "photos/".to_string(),
            resumes: "resumes/".to_string(),
        }
    }
}

/// `<prefix><email>-<disambiguator>[.<ext>]`, with characters outside
/// `[a-z0-9@._-]` in the email replaced by `_`.
pub fn object_path(prefix: &str, email: &str, disambiguator: &str, attachment: &Attachment) -> String {
    let owner: String = email
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '@' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    match attachment.extension() {
        Some(ext) => format!("{prefix}{owner}-{disambiguator}.{ext}"),
        None => format!("{prefix}{owner}-{disambiguator}"),
    }
}

/// URLs of attachments already stored for the current draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachmentUrls {
    pub profile_photo: Option<String>,
    pub resume: Option<String>,
}

impl AttachmentUrls {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::ProfilePhoto => self.profile_photo.as_deref(),
            Field::Resume => self.resume.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn forget(&mut self, field: Field) {
        match field {
            Field::ProfilePhoto => self.profile_photo = None,
            Field::Resume => self.resume = None,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    PhotoUpload,
    ResumeUpload,
    RecordInsert,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Insert(#[from] InsertError),
}

/// Generic failure shown to the applicant. The stage and underlying error are
/// kept for logs only.
#[derive(Debug, thiserror::Error)]
#[error("submission failed: {source}")]
pub struct SubmissionFailure {
    pub stage: SubmissionStage,
    #[source]
    pub source: PipelineError,
}

impl SubmissionFailure {
    pub fn reason(&self) -> String {
        self.source.to_string()
    }
}

/// Result of one pass through the pipeline. `urls` reflects every upload that
/// succeeded, even when a later stage failed.
#[derive(Debug)]
pub struct PipelineReport {
    pub urls: AttachmentUrls,
    pub outcome: Result<RegistrationRecord, SubmissionFailure>,
}

/// Uploads attachments, then writes the record, strictly in that order.
pub struct SubmissionPipeline<A, R> {
    attachments: Arc<A>,
    records: Arc<R>,
    prefixes: StoragePrefixes,
}

impl<A, R> Clone for SubmissionPipeline<A, R> {
    fn clone(&self) -> Self {
        Self {
            attachments: Arc::clone(&self.attachments),
            records: Arc::clone(&self.records),
            prefixes: self.prefixes.clone(),
        }
    }
}

impl<A, R> SubmissionPipeline<A, R>
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    pub fn new(attachments: Arc<A>, records: Arc<R>) -> Self {
        Self::with_prefixes(attachments, records, StoragePrefixes::default())
    }

    pub fn with_prefixes(attachments: Arc<A>, records: Arc<R>, prefixes: StoragePrefixes) -> Self {
        Self {
            attachments,
            records,
            prefixes,
        }
    }

    /// Run the sequence for `draft`. Attachments with a URL in `known` are not
    /// uploaded again.
    pub async fn run(&self, draft: &ApplicationDraft, known: AttachmentUrls) -> PipelineReport {
        let mut urls = known;

        if let Some(photo) = &draft.profile_photo {
            if urls.profile_photo.is_none() {
                match self.store(photo, &self.prefixes.photos, &draft.email).await {
                    Ok(url) => urls.profile_photo = Some(url),
                    Err(err) => return Self::failed(urls, SubmissionStage::PhotoUpload, err.into()),
                }
            }
        }

        if let Some(resume) = &draft.resume {
            if urls.resume.is_none() {
                match self.store(resume, &self.prefixes.resumes, &draft.email).await {
                    Ok(url) => urls.resume = Some(url),
                    Err(err) => {
                        return Self::failed(urls, SubmissionStage::ResumeUpload, err.into())
                    }
                }
            }
        }

        let record = RegistrationRecord::from_draft(
            draft,
            draft.profile_photo.as_ref().and(urls.profile_photo.as_deref()),
            draft.resume.as_ref().and(urls.resume.as_deref()),
        );

        if let Err(err) = self.records.insert(&record).await {
            return Self::failed(urls, SubmissionStage::RecordInsert, err.into());
        }

        info!(email = %record.email, branch = %record.branch, "registration record stored");
        PipelineReport {
            urls,
            outcome: Ok(record),
        }
    }

    async fn store(
        &self,
        attachment: &Attachment,
        prefix: &str,
        email: &str,
    ) -> Result<String, UploadError> {
        let path = object_path(prefix, email, &Uuid::new_v4().simple().to_string(), attachment);
        debug!(%path, bytes = attachment.len(), "uploading attachment");
        self.attachments.upload(attachment, &path).await
    }

    fn failed(urls: AttachmentUrls, stage: SubmissionStage, source: PipelineError) -> PipelineReport {
        warn!(?stage, error = %source, "submission pipeline halted");
        PipelineReport {
            urls,
            outcome: Err(SubmissionFailure { stage, source }),
        }
    }
}
