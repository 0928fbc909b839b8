use axum::{
    Json,
    extract::{Query, State},
};

use quill_types::api::{AnalyticsQuery, CommentAnalytics};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

/// Comment totals split by moderation status, overall and per day. Both
/// bounds are inclusive and optional.
pub async fn comments_daily_breakdown(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<CommentAnalytics>, ApiError> {
    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(ApiError::invalid("date_from", "must not be after date_to"));
        }
    }

    let db = state.db.clone();
    let stats = blocking(move || db.comment_analytics(query.date_from, query.date_to)).await?;
    Ok(Json(stats))
}
