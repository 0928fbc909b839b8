use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                fullname        TEXT,
                birthdate       TEXT,
                is_active       INTEGER NOT NULL DEFAULT 1,
                is_superuser    INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE posts (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                content         TEXT NOT NULL,
                auto_reply      INTEGER NOT NULL DEFAULT 0,
                reply_text      TEXT,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_posts_user ON posts(user_id);

            CREATE TABLE comments (
                id              TEXT PRIMARY KEY,
                content         TEXT NOT NULL,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                parent_id       TEXT REFERENCES comments(id) ON DELETE CASCADE,
                -- set only on system auto-replies: the comment that triggered it
                reply_to        TEXT UNIQUE REFERENCES comments(id) ON DELETE CASCADE,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);
            CREATE INDEX idx_comments_user ON comments(user_id);
            CREATE INDEX idx_comments_parent ON comments(parent_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
