use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use quill_db::models::NewComment;
use quill_db::{Creatable, Deletable, Fetchable, Updatable};
use quill_moderation::JobQueue;
use quill_moderation::queue::submit;
use quill_types::api::{CommentQuery, CommentResponse, CreateCommentRequest, UpdateCommentRequest};
use quill_types::jobs::{ContentKind, ModerationJob, ReplyPayload};
use quill_types::models::{Comment, Post};

use crate::error::{ApiError, blocking};
use crate::middleware::{CurrentUser, ensure_owner};
use crate::state::AppState;

pub const MAX_COMMENT_CHARS: usize = 150;

fn validate_content(content: &str) -> Result<(), ApiError> {
    let len = content.trim().chars().count();
    if len == 0 || len > MAX_COMMENT_CHARS {
        return Err(ApiError::invalid(
            "content",
            format!("must be 1 to {MAX_COMMENT_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Queue the post owner's canned reply under a freshly persisted comment.
/// Does nothing unless the post has auto-reply configured.
pub fn trigger_auto_reply(queue: &dyn JobQueue, post: &Post, comment: &Comment) {
    let Some(text) = post.auto_reply_text() else {
        return;
    };

    debug!("Auto-reply queued for comment {} on post {}", comment.id, post.id);
    submit(
        queue,
        ModerationJob::CreateReply(ReplyPayload {
            content: text.to_string(),
            post_id: post.id,
            user_id: post.user_id,
            parent_id: comment.id,
        }),
    );
}

pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let posts = state.posts.clone();
    let comments = state.comments.clone();
    let (post, comment) = blocking(move || {
        let Some(post) = posts.fetch(req.post_id)? else {
            return Ok(Err(ApiError::NotFound("post")));
        };
        if let Some(parent_id) = req.parent_id {
            // A parent must exist and belong to the same post
            match comments.fetch(parent_id)? {
                Some(parent) if parent.post_id == post.id => {}
                _ => return Ok(Err(ApiError::NotFound("parent comment"))),
            }
        }

        let comment = comments.create(NewComment {
            content: req.content,
            user_id: user.id,
            post_id: post.id,
            parent_id: req.parent_id,
        })?;
        Ok(Ok((post, comment)))
    })
    .await??;

    info!("Comment {} created on post {}", comment.id, post.id);

    let queue = state.queue.as_ref();
    submit(
        queue,
        ModerationJob::classify(ContentKind::Comment, comment.id, comment.content.clone()),
    );
    trigger_auto_reply(queue, &post, &comment);

    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let comments = state.comments.clone();
    let rows = blocking(move || comments.list_for_post(query.post_id)).await?;
    Ok(Json(rows.into_iter().map(CommentResponse::from).collect()))
}

pub async fn my_comments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let comments = state.comments.clone();
    let rows = blocking(move || comments.list_by_user(user.id)).await?;
    Ok(Json(rows.into_iter().map(CommentResponse::from).collect()))
}

/// Only the content changes. `is_active` is left alone and the new text goes
/// back through moderation.
pub async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(comment_id): Path<Uuid>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    validate_content(&req.content)?;

    let comments = state.comments.clone();
    let existing = blocking({
        let comments = comments.clone();
        move || comments.fetch(comment_id)
    })
    .await?
    .ok_or(ApiError::NotFound("comment"))?;
    ensure_owner(existing.user_id, &user, "comment")?;

    let updated = blocking(move || comments.update(comment_id, req.content))
        .await?
        .ok_or(ApiError::NotFound("comment"))?;

    submit(
        state.queue.as_ref(),
        ModerationJob::classify(ContentKind::Comment, updated.id, updated.content.clone()),
    );

    Ok(Json(updated.into()))
}

/// Deleting a comment removes its whole reply subtree.
pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let comments = state.comments.clone();
    let existing = blocking({
        let comments = comments.clone();
        move || comments.fetch(comment_id)
    })
    .await?
    .ok_or(ApiError::NotFound("comment"))?;
    ensure_owner(existing.user_id, &user, "comment")?;

    blocking(move || comments.delete(comment_id)).await?;
    info!("Comment {} deleted by {}", comment_id, user.id);

    Ok(StatusCode::NO_CONTENT)
}
