use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered identity. `password_hash` never leaves the server: it is
/// skipped on serialization and only read by the credential verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub fullname: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub auto_reply: bool,
    pub reply_text: Option<String>,
    pub user_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// The text an auto-reply would carry, if this post is configured for one.
    pub fn auto_reply_text(&self) -> Option<&str> {
        if !self.auto_reply {
            return None;
        }
        self.reply_text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Comments form a tree addressed by id: `parent_id` is a lookup key into the
/// same table, root comments have none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
