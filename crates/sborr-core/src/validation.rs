//! Input validation for the forms that feed the stores.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{NEW_PASSWORD_MIN, SIGN_IN_PASSWORD_MIN};
use crate::error::{Error, Result};
use crate::models::{DocumentStatus, DocumentType, NewDocument, User};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Check sign-in credentials before contacting the auth provider.
pub fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if !is_valid_email(email.trim()) {
        return Err(Error::InvalidInput("Invalid email address".to_string()));
    }
    if password.chars().count() < SIGN_IN_PASSWORD_MIN {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {} characters",
            SIGN_IN_PASSWORD_MIN
        )));
    }
    Ok(())
}

/// Check a password change request.
pub fn validate_password_change(current: &str, new: &str, confirm: &str) -> Result<()> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err(Error::InvalidInput("Please fill out all fields.".to_string()));
    }
    if new.chars().count() < NEW_PASSWORD_MIN {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {} characters long.",
            NEW_PASSWORD_MIN
        )));
    }
    if new != confirm {
        return Err(Error::InvalidInput("New passwords do not match.".to_string()));
    }
    Ok(())
}

/// Fields collected by the document form.
#[derive(Debug, Clone, Default)]
pub struct DocumentForm {
    pub title: String,
    pub description: String,
    pub doc_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
    pub series: String,
}

impl DocumentForm {
    /// Validate the form. `creating` adds the rules for new uploads.
    pub fn validate(&self, creating: bool, has_file: bool) -> Result<()> {
        if self.title.trim().is_empty()
            || self.doc_type.is_none()
            || self.status.is_none()
            || self.series.trim().is_empty()
        {
            return Err(Error::InvalidInput(
                "Please fill all required fields.".to_string(),
            ));
        }
        if creating {
            if !has_file {
                return Err(Error::InvalidInput("Please upload a file.".to_string()));
            }
            if let Some(status) = self.status {
                if !status.is_initial() {
                    return Err(Error::InvalidInput(format!(
                        "New documents cannot start as {}",
                        status.label()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Description as an optional field (blank means none).
    pub fn description(&self) -> Option<String> {
        let trimmed = self.description.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// The record to insert for a new upload by `author`.
    pub fn new_document(&self, author: &User) -> Result<NewDocument> {
        self.validate(true, true)?;
        let missing = || Error::InvalidInput("Please fill all required fields.".to_string());
        Ok(NewDocument {
            title: self.title.trim().to_string(),
            description: self.description(),
            doc_type: self.doc_type.ok_or_else(missing)?,
            status: self.status.ok_or_else(missing)?,
            series: self.series.trim().to_string(),
            author_name: author.full_name(),
            created_by: Some(author.id),
        })
    }
}
