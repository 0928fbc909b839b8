use crate::Database;
use crate::models::{NewComment, NewPost, NewUser, PostFilter, PostPatch, UserConflict};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use quill_types::api::{CommentAnalytics, DailyCommentStats};
use quill_types::jobs::ReplyPayload;
use quill_types::models::{Comment, Post, User};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row, params};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password, fullname, birthdate, is_active, is_superuser, created_at, updated_at";
const POST_COLUMNS: &str =
    "p.id, p.title, p.content, p.auto_reply, p.reply_text, p.user_id, p.is_active, p.created_at, p.updated_at";
const COMMENT_COLUMNS: &str =
    "id, content, user_id, post_id, parent_id, is_active, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a user unless the username or email is taken. The check and the
    /// insert run under one connection lock; a unique violation raised by
    /// another writer is reported as a conflict too.
    pub fn create_user(&self, new: &NewUser) -> Result<std::result::Result<User, Vec<UserConflict>>> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            let mut conflicts = Vec::new();
            if query_user(conn, "username", &new.username)?.is_some() {
                conflicts.push(UserConflict::Username);
            }
            if query_user(conn, "email", &new.email)?.is_some() {
                conflicts.push(UserConflict::Email);
            }
            if !conflicts.is_empty() {
                return Ok(Err(conflicts));
            }

            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, password, fullname, birthdate, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    new.username,
                    new.email,
                    new.password_hash,
                    new.fullname,
                    new.birthdate,
                    now
                ],
            );
            if let Err(e) = inserted {
                return match unique_conflict(&e) {
                    Some(conflict) => Ok(Err(vec![conflict])),
                    None => Err(e.into()),
                };
            }

            let user = query_user(conn, "id", &id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("User vanished after insert: {}", id))?;
            Ok(Ok(user))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    // -- Posts --

    pub fn insert_post(&self, new: &NewPost) -> Result<Post> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, title, content, auto_reply, reply_text, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    new.title,
                    new.content,
                    new.auto_reply,
                    new.reply_text,
                    new.user_id.to_string(),
                    now
                ],
            )?;
            query_post(conn, id)?.ok_or_else(|| anyhow::anyhow!("Post vanished after insert: {}", id))
        })
    }

    pub fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.user_id = u.id
                 WHERE (?1 IS NULL OR p.user_id = ?1)
                   AND (?2 IS NULL OR u.username LIKE ?2 ESCAPE '\\')
                   AND (?3 IS NULL OR p.title LIKE ?3 ESCAPE '\\')
                 ORDER BY p.created_at DESC"
            ))?;

            let rows = stmt
                .query_map(
                    params![
                        filter.user_id.map(|id| id.to_string()),
                        filter.username.as_deref().map(contains_pattern),
                        filter.title.as_deref().map(contains_pattern)
                    ],
                    post_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn update_post(&self, id: Uuid, patch: &PostPatch) -> Result<Option<Post>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET title = ?2, content = ?3, auto_reply = ?4, reply_text = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    patch.title,
                    patch.content,
                    patch.auto_reply,
                    patch.reply_text,
                    Utc::now()
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_post(conn, id)
        })
    }

    pub fn delete_post(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id.to_string()])? > 0)
        })
    }

    /// Clears `is_active` only; concurrent owner edits touch other columns.
    pub fn deactivate_post(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE posts SET is_active = 0 WHERE id = ?1",
                [id.to_string()],
            )? > 0)
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, new: &NewComment) -> Result<Comment> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, content, user_id, post_id, parent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.to_string(),
                    new.content,
                    new.user_id.to_string(),
                    new.post_id.to_string(),
                    new.parent_id.map(|p| p.to_string()),
                    now
                ],
            )?;
            query_comment(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Comment vanished after insert: {}", id))
        })
    }

    /// Insert a system auto-reply. At most one reply exists per triggering
    /// comment: a redelivered job hits the `reply_to` unique key and returns
    /// `None`. Also `None` when the triggering comment is already gone.
    pub fn insert_reply(&self, reply: &ReplyPayload) -> Result<Option<Comment>> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let parent_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1)",
                [reply.parent_id.to_string()],
                |row| row.get(0),
            )?;
            if !parent_exists {
                return Ok(None);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO comments (id, content, user_id, post_id, parent_id, reply_to, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6)",
                params![
                    id.to_string(),
                    reply.content,
                    reply.user_id.to_string(),
                    reply.post_id.to_string(),
                    reply.parent_id.to_string(),
                    now
                ],
            )?;

            let comment = if inserted > 0 { query_comment(&tx, id)? } else { None };
            tx.commit()?;
            Ok(comment)
        })
    }

    pub fn get_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    pub fn list_comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        self.with_conn(|conn| query_comments(conn, "post_id", post_id))
    }

    pub fn list_comments_by_user(&self, user_id: Uuid) -> Result<Vec<Comment>> {
        self.with_conn(|conn| query_comments(conn, "user_id", user_id))
    }

    pub fn update_comment_content(&self, id: Uuid, content: &str) -> Result<Option<Comment>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), content, Utc::now()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_comment(conn, id)
        })
    }

    /// Deletes the comment and, through the cascade, its whole subtree.
    pub fn delete_comment(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id.to_string()])? > 0)
        })
    }

    pub fn deactivate_comment(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE comments SET is_active = 0 WHERE id = ?1",
                [id.to_string()],
            )? > 0)
        })
    }

    // -- Analytics --

    /// Comment counts by status, overall and per calendar day (UTC), within an
    /// inclusive date range. Either bound may be open.
    pub fn comment_analytics(
        &self,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<CommentAnalytics> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date(created_at) AS day,
                        COUNT(*),
                        COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN is_active = 0 THEN 1 ELSE 0 END), 0)
                 FROM comments
                 WHERE (?1 IS NULL OR date(created_at) >= ?1)
                   AND (?2 IS NULL OR date(created_at) <= ?2)
                 GROUP BY day
                 ORDER BY day",
            )?;

            let daily = stmt
                .query_map(params![date_from, date_to], |row| {
                    Ok(DailyCommentStats {
                        date: row.get(0)?,
                        total_comments: row.get::<_, i64>(1)? as u64,
                        active_comments: row.get::<_, i64>(2)? as u64,
                        blocked_comments: row.get::<_, i64>(3)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(CommentAnalytics {
                total_comments: daily.iter().map(|d| d.total_comments).sum(),
                active_comments: daily.iter().map(|d| d.active_comments).sum(),
                blocked_comments: daily.iter().map(|d| d.blocked_comments).sum(),
                daily,
            })
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn query_post(conn: &Connection, id: Uuid) -> Result<Option<Post>> {
    let mut stmt = conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"))?;
    let row = stmt.query_row([id.to_string()], post_from_row).optional()?;
    Ok(row)
}

fn query_comment(conn: &Connection, id: Uuid) -> Result<Option<Comment>> {
    let mut stmt = conn.prepare(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"))?;
    let row = stmt.query_row([id.to_string()], comment_from_row).optional()?;
    Ok(row)
}

fn query_comments(conn: &Connection, column: &str, id: Uuid) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE {column} = ?1 ORDER BY created_at"
    ))?;

    let rows = stmt
        .query_map([id.to_string()], comment_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        fullname: row.get(4)?,
        birthdate: row.get(5)?,
        is_active: row.get(6)?,
        is_superuser: row.get(7)?,
        created_at: row.get::<_, DateTime<Utc>>(8)?,
        updated_at: row.get::<_, DateTime<Utc>>(9)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        auto_reply: row.get(3)?,
        reply_text: row.get(4)?,
        user_id: uuid_at(row, 5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    let parent_id = row
        .get::<_, Option<String>>(4)?
        .map(|s| parse_uuid(4, &s))
        .transpose()?;

    Ok(Comment {
        id: uuid_at(row, 0)?,
        content: row.get(1)?,
        user_id: uuid_at(row, 2)?,
        post_id: uuid_at(row, 3)?,
        parent_id,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// `LIKE` pattern matching `needle` anywhere, with its own wildcards escaped.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Maps a failed users insert to the unique column it collided on.
fn unique_conflict(e: &rusqlite::Error) -> Option<UserConflict> {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(msg)) if err.code == ErrorCode::ConstraintViolation => {
            if msg.contains("users.username") {
                Some(UserConflict::Username)
            } else if msg.contains("users.email") {
                Some(UserConflict::Email)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Ids are stored as TEXT; a corrupt one surfaces as a conversion error.
fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    parse_uuid(idx, &raw)
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
