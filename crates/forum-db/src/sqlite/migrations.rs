use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            login           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            password_salt   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS posts (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id            INTEGER NOT NULL REFERENCES users(id),
            title               TEXT NOT NULL,
            text                TEXT NOT NULL,
            comments_allowed    INTEGER NOT NULL DEFAULT 1
        );

        -- Exactly one of post_id / parent_id is non-zero.
        CREATE TABLE IF NOT EXISTS comments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id    INTEGER NOT NULL REFERENCES users(id),
            post_id     INTEGER NOT NULL DEFAULT 0,
            parent_id   INTEGER NOT NULL DEFAULT 0,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comments_post
            ON comments(post_id, parent_id, id);

        CREATE INDEX IF NOT EXISTS idx_comments_parent
            ON comments(parent_id, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
