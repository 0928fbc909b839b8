use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which table a moderated entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Comment,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

/// Reply a worker creates on behalf of a post owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub content: String,
    pub post_id: Uuid,
    /// Post owner; the reply is attributed to them.
    pub user_id: Uuid,
    /// The comment that triggered the reply.
    pub parent_id: Uuid,
}

/// Work items carried by the moderation queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ModerationJob {
    /// Run the classifier over freshly written text and suppress the entity on
    /// a positive verdict.
    Classify {
        entity_id: Uuid,
        kind: ContentKind,
        content: String,
    },

    /// Create the system-authored reply for an auto-reply post.
    CreateReply(ReplyPayload),
}

impl ModerationJob {
    pub fn classify(kind: ContentKind, entity_id: Uuid, content: impl Into<String>) -> Self {
        Self::Classify {
            entity_id,
            kind,
            content: content.into(),
        }
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classify { .. } => "classify",
            Self::CreateReply(_) => "create_reply",
        }
    }

    /// The entity this job is about: the moderated entity for classification,
    /// the triggering comment for replies.
    pub fn subject_id(&self) -> Uuid {
        match self {
            Self::Classify { entity_id, .. } => *entity_id,
            Self::CreateReply(reply) => reply.parent_id,
        }
    }
}
