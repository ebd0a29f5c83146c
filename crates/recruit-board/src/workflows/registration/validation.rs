//! Field rules applied when a step is validated.

use super::domain::{ApplicationDraft, Branch, Field};

pub const MOBILE_DIGITS: usize = 10;

/// Strip everything but ASCII digits, e.g. `"(123) 456-7890"` -> `"1234567890"`.
pub fn normalize_mobile(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Loose `local@domain.tld` shape check: no whitespace, a single `@`, and a
/// dot in the domain with text on both sides of the last one.
pub fn is_valid_email(raw: &str) -> bool {
    let candidate = raw.trim();
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Message for the first rule `field` breaks, or `None` when it is valid.
pub fn check_field(field: Field, draft: &ApplicationDraft) -> Option<String> {
    let message = match field {
        Field::FullName => blank(&draft.full_name).then_some("Full name is required"),
        Field::Email => {
            if blank(&draft.email) {
                Some("Email is required")
            } else {
                (!is_valid_email(&draft.email)).then_some("Invalid email address")
            }
        }
        Field::Mobile => {
            if blank(&draft.mobile) {
                Some("Mobile number is required")
            } else {
                (normalize_mobile(&draft.mobile).len() != MOBILE_DIGITS)
                    .then_some("Invalid mobile number: enter exactly 10 digits")
            }
        }
        Field::Branch => {
            if blank(&draft.branch) {
                Some("Select your branch")
            } else {
                Branch::from_code(&draft.branch)
                    .is_none()
                    .then_some("Select a branch from the list")
            }
        }
        Field::Year => {
            if blank(&draft.year) {
                Some("Year of study is required")
            } else {
                (!matches!(draft.year.trim(), "1" | "2" | "3" | "4"))
                    .then_some("Year of study must be between 1 and 4")
            }
        }
        Field::Prn => blank(&draft.prn).then_some("PRN is required"),
        Field::Mission => blank(&draft.mission).then_some("Tell us why you want to join"),
        Field::ProfilePhoto => draft
            .profile_photo
            .is_none()
            .then_some("Profile photo is required"),
        Field::Resume => draft.resume.is_none().then_some("Resume is required"),
    };
    message.map(str::to_string)
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}
