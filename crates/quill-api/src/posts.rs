use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use quill_db::models::{NewPost, PostFilter, PostPatch};
use quill_db::{Creatable, Deletable, Fetchable, Updatable};
use quill_moderation::queue::submit;
use quill_types::api::{FieldError, PostQuery, PostRequest, PostResponse};
use quill_types::jobs::{ContentKind, ModerationJob};

use crate::error::{ApiError, blocking};
use crate::middleware::{CurrentUser, ensure_owner};
use crate::state::AppState;

pub const MAX_TITLE_CHARS: usize = 30;
pub const MAX_REPLY_TEXT_CHARS: usize = 150;

fn validate_post(req: &PostRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    let title_len = req.title.trim().chars().count();
    if title_len == 0 || title_len > MAX_TITLE_CHARS {
        errors.push(FieldError::new("title", format!("must be 1 to {MAX_TITLE_CHARS} characters")));
    }
    if req.content.trim().is_empty() {
        errors.push(FieldError::new("content", "must not be empty"));
    }
    match req.reply_text.as_deref() {
        Some(text) if text.chars().count() > MAX_REPLY_TEXT_CHARS => {
            errors.push(FieldError::new(
                "reply_text",
                format!("must be at most {MAX_REPLY_TEXT_CHARS} characters"),
            ));
        }
        text if req.auto_reply && text.is_none_or(|t| t.trim().is_empty()) => {
            errors.push(FieldError::new("reply_text", "is required when auto_reply is on"));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_post(&req)?;

    let posts = state.posts.clone();
    let post = blocking(move || {
        posts.create(NewPost {
            title: req.title,
            content: req.content,
            auto_reply: req.auto_reply,
            reply_text: req.reply_text,
            user_id: user.id,
        })
    })
    .await?;

    info!("Post {} created by {}", post.id, post.user_id);
    submit(
        state.queue.as_ref(),
        ModerationJob::classify(ContentKind::Post, post.id, post.content.clone()),
    );

    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let filter = PostFilter {
        user_id: None,
        username: query.username.filter(|s| !s.is_empty()),
        title: query.title.filter(|s| !s.is_empty()),
    };

    let posts = state.posts.clone();
    let rows = blocking(move || posts.list(&filter)).await?;
    Ok(Json(rows.into_iter().map(PostResponse::from).collect()))
}

pub async fn my_posts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let filter = PostFilter {
        user_id: Some(user.id),
        ..Default::default()
    };

    let posts = state.posts.clone();
    let rows = blocking(move || posts.list(&filter)).await?;
    Ok(Json(rows.into_iter().map(PostResponse::from).collect()))
}

/// Replace the owner-editable fields. Never touches `is_active`, so an edit
/// cannot undo a suppression; the new content is re-moderated.
pub async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<Uuid>,
    Json(req): Json<PostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    validate_post(&req)?;

    let posts = state.posts.clone();
    let existing = blocking({
        let posts = posts.clone();
        move || posts.fetch(post_id)
    })
    .await?
    .ok_or(ApiError::NotFound("post"))?;
    ensure_owner(existing.user_id, &user, "post")?;

    let updated = blocking(move || {
        posts.update(
            post_id,
            PostPatch {
                title: req.title,
                content: req.content,
                auto_reply: req.auto_reply,
                reply_text: req.reply_text,
            },
        )
    })
    .await?
    .ok_or(ApiError::NotFound("post"))?;

    submit(
        state.queue.as_ref(),
        ModerationJob::classify(ContentKind::Post, updated.id, updated.content.clone()),
    );

    Ok(Json(updated.into()))
}

pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let posts = state.posts.clone();
    let existing = blocking({
        let posts = posts.clone();
        move || posts.fetch(post_id)
    })
    .await?
    .ok_or(ApiError::NotFound("post"))?;
    ensure_owner(existing.user_id, &user, "post")?;

    blocking(move || posts.delete(post_id)).await?;
    info!("Post {} deleted by {}", post_id, user.id);

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(auto_reply: bool, reply_text: Option<&str>) -> PostRequest {
        PostRequest {
            title: "Title".into(),
            content: "body".into(),
            auto_reply,
            reply_text: reply_text.map(str::to_string),
        }
    }

    fn fields(result: Result<(), ApiError>) -> Vec<String> {
        match result {
            Err(ApiError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn auto_reply_needs_non_blank_text() {
        assert_eq!(fields(validate_post(&request(true, None))), ["reply_text"]);
        assert_eq!(fields(validate_post(&request(true, Some(" \t")))), ["reply_text"]);
        assert!(validate_post(&request(true, Some("Thanks!"))).is_ok());
    }

    #[test]
    fn reply_text_is_optional_without_auto_reply() {
        assert!(validate_post(&request(false, None)).is_ok());
        assert!(validate_post(&request(false, Some(""))).is_ok());
    }

    #[test]
    fn title_and_reply_text_bounds() {
        let long_reply = "x".repeat(MAX_REPLY_TEXT_CHARS + 1);
        assert_eq!(fields(validate_post(&request(false, Some(&long_reply)))), ["reply_text"]);

        let mut req = request(false, None);
        req.title = "x".repeat(MAX_TITLE_CHARS + 1);
        req.content = "  ".into();
        assert_eq!(fields(validate_post(&req)), ["title", "content"]);
    }
}
