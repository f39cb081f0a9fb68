use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL DEFAULT '',
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS boards (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS board_members (
            board_id    INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (board_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_board_members_user
            ON board_members(user_id);

        CREATE TABLE IF NOT EXISTS lists (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            board_id    INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL CHECK (position > 0),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(board_id, position)
        );

        CREATE TABLE IF NOT EXISTS cards (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            list_id     INTEGER NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL CHECK (position > 0),
            due_date    TEXT,
            priority    TEXT NOT NULL DEFAULT 'medium'
                        CHECK (priority IN ('low', 'medium', 'high')),
            assigned_to TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_by  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(list_id, position)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
