//! Narrow repository capabilities. Each use site asks for exactly the
//! operations it needs (a worker only ever sees `Deactivatable` and
//! `ReplyStore`), and each repository implements only what it supports.

use std::sync::Arc;

use anyhow::Result;
use quill_types::jobs::ReplyPayload;
use quill_types::models::{Comment, Post, User};
use uuid::Uuid;

use crate::Database;
use crate::models::{NewComment, NewPost, NewUser, PostPatch, UserConflict};

/// Identity lookups used by the credential verifier and token resolution.
pub trait IdentityStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    /// `Err` inside `Ok` names the unique fields already taken.
    fn insert(&self, user: NewUser) -> Result<std::result::Result<User, Vec<UserConflict>>>;
}

pub trait Fetchable {
    type Entity;
    fn fetch(&self, id: Uuid) -> Result<Option<Self::Entity>>;
}

pub trait Creatable {
    type New;
    type Entity;
    fn create(&self, new: Self::New) -> Result<Self::Entity>;
}

pub trait Updatable {
    type Patch;
    type Entity;
    /// `None` when no row has this id.
    fn update(&self, id: Uuid, patch: Self::Patch) -> Result<Option<Self::Entity>>;
}

pub trait Deletable {
    fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Visibility suppression. Returns false when the entity no longer exists.
pub trait Deactivatable: Send + Sync {
    fn deactivate(&self, id: Uuid) -> Result<bool>;
}

/// System-authored replies, created outside the normal authorization path.
pub trait ReplyStore: Send + Sync {
    /// `None` when a reply for this trigger already exists or the trigger is gone.
    fn create_reply(&self, reply: &ReplyPayload) -> Result<Option<Comment>>;
}

// -- Users --

#[derive(Clone)]
pub struct UserRepo {
    db: Arc<Database>,
}

impl UserRepo {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl IdentityStore for UserRepo {
    fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.db.get_user_by_username(username)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.db.get_user_by_id(id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.db.get_user_by_email(email)
    }

    fn insert(&self, user: NewUser) -> Result<std::result::Result<User, Vec<UserConflict>>> {
        self.db.create_user(&user)
    }
}

// -- Posts --

#[derive(Clone)]
pub struct PostRepo {
    db: Arc<Database>,
}

impl PostRepo {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn list(&self, filter: &crate::models::PostFilter) -> Result<Vec<Post>> {
        self.db.list_posts(filter)
    }
}

impl Fetchable for PostRepo {
    type Entity = Post;

    fn fetch(&self, id: Uuid) -> Result<Option<Post>> {
        self.db.get_post(id)
    }
}

impl Creatable for PostRepo {
    type New = NewPost;
    type Entity = Post;

    fn create(&self, new: NewPost) -> Result<Post> {
        self.db.insert_post(&new)
    }
}

impl Updatable for PostRepo {
    type Patch = PostPatch;
    type Entity = Post;

    fn update(&self, id: Uuid, patch: PostPatch) -> Result<Option<Post>> {
        self.db.update_post(id, &patch)
    }
}

impl Deletable for PostRepo {
    fn delete(&self, id: Uuid) -> Result<bool> {
        self.db.delete_post(id)
    }
}

impl Deactivatable for PostRepo {
    fn deactivate(&self, id: Uuid) -> Result<bool> {
        self.db.deactivate_post(id)
    }
}

// -- Comments --

#[derive(Clone)]
pub struct CommentRepo {
    db: Arc<Database>,
}

impl CommentRepo {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        self.db.list_comments_for_post(post_id)
    }

    pub fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Comment>> {
        self.db.list_comments_by_user(user_id)
    }
}

impl Fetchable for CommentRepo {
    type Entity = Comment;

    fn fetch(&self, id: Uuid) -> Result<Option<Comment>> {
        self.db.get_comment(id)
    }
}

impl Creatable for CommentRepo {
    type New = NewComment;
    type Entity = Comment;

    fn create(&self, new: NewComment) -> Result<Comment> {
        self.db.insert_comment(&new)
    }
}

/// Comments only allow their content to change.
impl Updatable for CommentRepo {
    type Patch = String;
    type Entity = Comment;

    fn update(&self, id: Uuid, content: String) -> Result<Option<Comment>> {
        self.db.update_comment_content(id, &content)
    }
}

impl Deletable for CommentRepo {
    fn delete(&self, id: Uuid) -> Result<bool> {
        self.db.delete_comment(id)
    }
}

impl Deactivatable for CommentRepo {
    fn deactivate(&self, id: Uuid) -> Result<bool> {
        self.db.deactivate_comment(id)
    }
}

impl ReplyStore for CommentRepo {
    fn create_reply(&self, reply: &ReplyPayload) -> Result<Option<Comment>> {
        self.db.insert_reply(reply)
    }
}
