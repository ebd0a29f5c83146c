use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every input the registration form can collect. Which of them a wizard
/// actually asks for is decided by its [`WizardSchema`](super::WizardSchema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    FullName,
    Email,
    Mobile,
    Branch,
    Year,
    Prn,
    Mission,
    ProfilePhoto,
    Resume,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::FullName,
        Field::Email,
        Field::Mobile,
        Field::Branch,
        Field::Year,
        Field::Prn,
        Field::Mission,
        Field::ProfilePhoto,
        Field::Resume,
    ];

    /// Name used by the presentation layer (`fullName`, `profilePhoto`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Field::FullName => "fullName",
            Field::Email => "email",
            Field::Mobile => "mobile",
            Field::Branch => "branch",
            Field::Year => "year",
            Field::Prn => "prn",
            Field::Mission => "mission",
            Field::ProfilePhoto => "profilePhoto",
            Field::Resume => "resume",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Field::FullName => "Full Name",
            Field::Email => "Email",
            Field::Mobile => "Mobile",
            Field::Branch => "Branch",
            Field::Year => "Year of Study",
            Field::Prn => "PRN",
            Field::Mission => "Why join WLUG?",
            Field::ProfilePhoto => "Profile Photo",
            Field::Resume => "Resume",
        }
    }

    pub const fn kind(self) -> FieldKind {
        match self {
            Field::ProfilePhoto | Field::Resume => FieldKind::Attachment,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raised when a field name from the presentation layer is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown registration field `{0}`")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == value)
            .ok_or_else(|| UnknownField(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Attachment,
}

impl FieldKind {
    pub const fn describe(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Attachment => "file",
        }
    }
}

/// Closed set of departments an applicant can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Cse,
    It,
    Ece,
    Eee,
    Mech,
    Civil,
    Aiml,
    Other,
}

impl Branch {
    pub const ALL: [Branch; 8] = [
        Branch::Cse,
        Branch::It,
        Branch::Ece,
        Branch::Eee,
        Branch::Mech,
        Branch::Civil,
        Branch::Aiml,
        Branch::Other,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Branch::Cse => "cse",
            Branch::It => "it",
            Branch::Ece => "ece",
            Branch::Eee => "eee",
            Branch::Mech => "mech",
            Branch::Civil => "civil",
            Branch::Aiml => "aiml",
            Branch::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Branch::Cse => "Computer Science",
            Branch::It => "Information Technology",
            Branch::Ece => "Electronics & Communication",
            Branch::Eee => "Electrical Engineering",
            Branch::Mech => "Mechanical Engineering",
            Branch::Civil => "Civil Engineering",
            Branch::Aiml => "AI & Machine Learning",
            Branch::Other => "Other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Branch::ALL
            .into_iter()
            .find(|branch| branch.code().eq_ignore_ascii_case(code))
    }
}

/// A file staged locally by the applicant, not yet uploaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension of the original file name, if it has one.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// New raw input for a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Attachment(Option<Attachment>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Attachment> for FieldValue {
    fn from(value: Attachment) -> Self {
        FieldValue::Attachment(Some(value))
    }
}

impl From<Option<Attachment>> for FieldValue {
    fn from(value: Option<Attachment>) -> Self {
        FieldValue::Attachment(value)
    }
}

/// In-progress applicant input, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationDraft {
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub branch: String,
    pub year: String,
    pub prn: String,
    pub mission: String,
    pub profile_photo: Option<Attachment>,
    pub resume: Option<Attachment>,
}

impl ApplicationDraft {
    pub fn text(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::FullName => &self.full_name,
            Field::Email => &self.email,
            Field::Mobile => &self.mobile,
            Field::Branch => &self.branch,
            Field::Year => &self.year,
            Field::Prn => &self.prn,
            Field::Mission => &self.mission,
            Field::ProfilePhoto | Field::Resume => return None,
        };
        Some(value.as_str())
    }

    pub fn attachment(&self, field: Field) -> Option<&Attachment> {
        match field {
            Field::ProfilePhoto => self.profile_photo.as_ref(),
            Field::Resume => self.resume.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn text_slot(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::FullName => Some(&mut self.full_name),
            Field::Email => Some(&mut self.email),
            Field::Mobile => Some(&mut self.mobile),
            Field::Branch => Some(&mut self.branch),
            Field::Year => Some(&mut self.year),
            Field::Prn => Some(&mut self.prn),
            Field::Mission => Some(&mut self.mission),
            Field::ProfilePhoto | Field::Resume => None,
        }
    }

    pub(crate) fn attachment_slot(&mut self, field: Field) -> Option<&mut Option<Attachment>> {
        match field {
            Field::ProfilePhoto => Some(&mut self.profile_photo),
            Field::Resume => Some(&mut self.resume),
            _ => None,
        }
    }
}

/// Per-field messages for the fields that currently fail their rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    pub(crate) fn insert(&mut self, field: Field, message: String) {
        self.0.insert(field, message);
    }

    pub(crate) fn remove(&mut self, field: Field) -> Option<String> {
        self.0.remove(&field)
    }
}

/// Progress of the final submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

impl SubmissionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Idle => "idle",
            SubmissionStatus::InFlight => "in_flight",
            SubmissionStatus::Succeeded => "succeeded",
            SubmissionStatus::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip_through_from_str() {
        for field in Field::ALL {
            assert_eq!(field.name().parse::<Field>(), Ok(field));
        }
        assert_eq!(
            "nickname".parse::<Field>(),
            Err(UnknownField("nickname".to_string()))
        );
    }

    #[test]
    fn branch_codes_are_case_insensitive() {
        assert_eq!(Branch::from_code(" AIML "), Some(Branch::Aiml));
        assert_eq!(Branch::from_code("cse"), Some(Branch::Cse));
        assert_eq!(Branch::from_code("law"), None);
        assert_eq!(Branch::from_code(""), None);
    }

    #[test]
    fn attachment_extension_ignores_dotfiles_and_odd_suffixes() {
        let photo = Attachment::new("Portrait.JPeG", "image/jpeg", vec![1, 2, 3]);
        assert_eq!(photo.extension().as_deref(), Some("jpeg"));
        assert_eq!(Attachment::new(".bashrc", "text/plain", Vec::new()).extension(), None);
        assert_eq!(Attachment::new("resume", "application/pdf", Vec::new()).extension(), None);
        assert_eq!(Attachment::new("cv.p df", "application/pdf", Vec::new()).extension(), None);
    }

    #[test]
    fn errors_serialize_with_presentation_field_names() {
        let mut errors = ValidationErrors::default();
        errors.insert(Field::FullName, "Full name is required".to_string());
        let json = serde_json::to_value(&errors).expect("serializes");
        assert_eq!(json["fullName"], "Full name is required");
    }

    #[test]
    fn failed_status_serializes_reason() {
        let json = serde_json::to_value(SubmissionStatus::Failed("offline".to_string()))
            .expect("serializes");
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "offline");
    }
}
