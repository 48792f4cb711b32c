//! Who may change what.

use crate::models::{Document, User, UserRole};

/// A document may be edited or deleted only by the councilor who created it.
pub fn can_modify_document(user: &User, document: &Document) -> bool {
    user.role == Some(UserRole::Councilor) && document.created_by == Some(user.id)
}

/// Only councilors author documents.
pub fn can_upload_document(user: &User) -> bool {
    user.role == Some(UserRole::Councilor)
}
