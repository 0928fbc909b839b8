//! Write-side types handed to the storage layer. Reads come back
//! as the quill-types domain models.
use chrono::NaiveDate;
use uuid::Uuid;

pub struct NewUser {
    pub username: String,
    /// Already lowercased by the caller.
    pub email: String,
    pub password_hash: String,
    pub fullname: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

/// A unique column another account already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConflict {
    Username,
    Email,
}

pub struct NewPost {
    pub title: String,
    pub content: String,
    pub auto_reply: bool,
    pub reply_text: Option<String>,
    pub user_id: Uuid,
}

/// Full replacement of the owner-editable post fields.
pub struct PostPatch {
    pub title: String,
    pub content: String,
    pub auto_reply: bool,
    pub reply_text: Option<String>,
}

pub struct NewComment {
    pub content: String,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Default)]
pub struct PostFilter {
    pub user_id: Option<Uuid>,
    /// Case-insensitive substring of the author's username.
    pub username: Option<String>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
}
