use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use uuid::Uuid;

use quill_db::IdentityStore;
use quill_types::api::{Claims, TokenKind};
use quill_types::models::User;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signing secret and lifetimes, fixed at startup.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed, expired, wrong kind, missing claims or
    /// unknown subject. Deliberately one variant.
    #[error("invalid token")]
    InvalidToken,

    #[error("token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("identity lookup failed: {0}")]
    Lookup(anyhow::Error),
}

/// Who a token is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for TokenSubject {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn issue_access(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Access, self.access_ttl)
    }

    pub fn issue_refresh(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Refresh, self.refresh_ttl)
    }

    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue_access(subject)?,
            refresh: self.issue_refresh(subject)?,
        })
    }

    fn issue(&self, subject: &TokenSubject, kind: TokenKind, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.id,
            username: subject.username.clone(),
            kind,
            iat: now.timestamp().max(0) as usize,
            exp: (now + ttl).timestamp().max(0) as usize,
        };

        Ok(encode(&Header::new(ALGORITHM), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry and return the claims. Every failure is
    /// `InvalidToken`.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenError::InvalidToken)?;

        if data.claims.username.is_empty() {
            return Err(TokenError::InvalidToken);
        }
        Ok(data.claims)
    }

    /// Exchange a refresh token for a new access token. The refresh token is
    /// not rotated and stays usable until it expires.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.decode(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::InvalidToken);
        }

        self.issue_access(&TokenSubject {
            id: claims.sub,
            username: claims.username,
        })
    }

    /// Authenticate a resource call: access tokens only, and the subject must
    /// still exist.
    pub fn resolve_identity(
        &self,
        token: &str,
        identities: &dyn IdentityStore,
    ) -> Result<User, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind == TokenKind::Refresh {
            return Err(TokenError::InvalidToken);
        }

        identities
            .find_by_id(claims.sub)
            .map_err(TokenError::Lookup)?
            .ok_or(TokenError::InvalidToken)
    }
}
