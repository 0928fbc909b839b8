//! HTTP surface: token service, credential checks, the bearer guard, and the
//! axum handlers for users, posts, comments and analytics.

pub mod analytics;
pub mod auth;
pub mod comments;
pub mod credentials;
pub mod error;
pub mod middleware;
pub mod posts;
pub mod state;
pub mod tokens;

use axum::{
    Router,
    routing::{get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};
pub use tokens::{TokenConfig, TokenService};

/// Every API route, with state applied. Transport layers (tracing, CORS) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(auth::register))
        .route("/users/token", post(auth::login))
        .route("/users/refresh", post(auth::refresh))
        .route("/users/me", get(auth::me))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/my", get(posts::my_posts))
        .route("/posts/{post_id}", put(posts::update_post).delete(posts::delete_post))
        .route("/comments", get(comments::list_comments).post(comments::create_comment))
        .route("/comments/my", get(comments::my_comments))
        .route(
            "/comments/{comment_id}",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .route(
            "/analytics/comments-daily-breakdown",
            get(analytics::comments_daily_breakdown),
        )
        .with_state(state)
}
