use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::Branch;
use super::storage::RegistrationRecord;

const MEMBER_ID_PREFIX: &str = "WLUG-";

/// Confirmation handed back once a registration is stored; the presentation
/// layer renders it as the applicant's member badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub member_id: String,
    pub full_name: String,
    pub branch: String,
    pub photo_url: String,
    pub resume_url: String,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionReceipt {
    pub fn issue(record: &RegistrationRecord, submitted_at: DateTime<Utc>) -> Self {
        let branch = Branch::from_code(&record.branch)
            .map(|branch| branch.label().to_string())
            .unwrap_or_else(|| record.branch.clone());

        Self {
            member_id: member_id(submitted_at),
            full_name: record.full_name.clone(),
            branch,
            photo_url: record.photo_url.clone(),
            resume_url: record.resume_url.clone(),
            submitted_at,
        }
    }
}

/// `WLUG-` followed by the submission time in epoch milliseconds, base 36,
/// upper case.
pub fn member_id(at: DateTime<Utc>) -> String {
    let millis = u64::try_from(at.timestamp_millis()).unwrap_or_default();
    format!("{MEMBER_ID_PREFIX}{}", to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
