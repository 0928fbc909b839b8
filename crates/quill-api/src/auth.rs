use axum::{Form, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{NaiveDate, Utc};
use tracing::info;

use quill_db::IdentityStore;
use quill_db::models::{NewUser, UserConflict};
use quill_types::api::{
    AccessTokenResponse, FieldError, LoginForm, RefreshRequest, RegisterRequest, RegisterResponse,
    TokenPairResponse, UserResponse,
};

use crate::credentials::hash_password;
use crate::error::{ApiError, blocking};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::tokens::TokenSubject;

const TOKEN_TYPE: &str = "bearer";

/// Shape checks that need no storage access.
fn validate_registration(req: &RegisterRequest, today: NaiveDate) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let username_len = req.username.chars().count();
    if !(3..=30).contains(&username_len) {
        errors.push(FieldError::new("username", "must be between 3 and 30 characters"));
    }

    if !is_valid_email(&req.email) {
        errors.push(FieldError::new("email", "value is not a valid email address"));
    }

    let pw = &req.password;
    if pw.chars().count() < 8 {
        errors.push(FieldError::new("password", "must be at least 8 characters long"));
    }
    if !pw.chars().any(|c| c.is_uppercase()) {
        errors.push(FieldError::new("password", "must contain at least one uppercase letter"));
    }
    if !pw.chars().any(|c| c.is_lowercase()) {
        errors.push(FieldError::new("password", "must contain at least one lowercase letter"));
    }
    if !pw.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("password", "must contain at least one digit"));
    }
    if req.password != req.password_confirm {
        errors.push(FieldError::new("password_confirm", "passwords do not match"));
    }

    if req.birthdate.is_some_and(|d| d > today) {
        errors.push(FieldError::new("birthdate", "cannot be in the future"));
    }

    errors
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn conflict_error(conflict: UserConflict) -> FieldError {
    match conflict {
        UserConflict::Username => FieldError::new("username", "username already registered"),
        UserConflict::Email => FieldError::new("email", "email already registered"),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let errors = validate_registration(&req, Utc::now().date_naive());
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let users = state.users.clone();
    let user = blocking(move || {
        let password_hash = hash_password(&req.password)?;
        users.insert(NewUser {
            username: req.username,
            email: req.email.to_lowercase(),
            password_hash,
            fullname: req.fullname,
            birthdate: req.birthdate,
        })
    })
    .await?
    .map_err(|conflicts| ApiError::Validation(conflicts.into_iter().map(conflict_error).collect()))?;

    info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".into(),
            user_id: user.id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let credentials = state.credentials.clone();
    let user = blocking(move || credentials.verify(&form.username, &form.password))
        .await?
        .ok_or(ApiError::BadCredentials)?;

    let pair = state.tokens.issue_pair(&TokenSubject::from(&user))?;

    Ok(Json(TokenPairResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        token_type: TOKEN_TYPE.into(),
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let access_token = state.tokens.refresh(&req.refresh_token)?;

    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: TOKEN_TYPE.into(),
    }))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}
