use std::sync::Arc;

use quill_db::{CommentRepo, Database, PostRepo, UserRepo};
use quill_moderation::JobQueue;

use crate::credentials::CredentialVerifier;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub users: UserRepo,
    pub posts: PostRepo,
    pub comments: CommentRepo,
    pub credentials: CredentialVerifier,
    pub tokens: Arc<TokenService>,
    pub queue: Arc<dyn JobQueue>,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, tokens: TokenService, queue: Arc<dyn JobQueue>) -> AppState {
        let users = UserRepo::new(db.clone());
        Arc::new(Self {
            credentials: CredentialVerifier::new(Arc::new(users.clone())),
            users,
            posts: PostRepo::new(db.clone()),
            comments: CommentRepo::new(db.clone()),
            db,
            tokens: Arc::new(tokens),
            queue,
        })
    }
}
