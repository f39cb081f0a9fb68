use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use taski_types::events::{Mutation, MutationKind};
use taski_types::models::{Board, BoardId, User};

use crate::models::{UserRow, list_from_row, uuid_col, LIST_COLUMNS};
use crate::{CommitSink, Database};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: Uuid, username: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), username, email, password_hash, Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, created_at, password FROM users WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(UserRow {
                            user: User {
                                id: uuid_col(row, 0)?,
                                username: row.get(1)?,
                                email: row.get(2)?,
                                created_at: row.get(3)?,
                            },
                            password: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, email, created_at FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(User {
                            id: uuid_col(row, 0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
    }

    // -- Boards --

    pub fn create_board(
        &self,
        owner_id: Uuid,
        title: &str,
        description: &str,
        sink: &dyn CommitSink,
    ) -> Result<Board> {
        self.transact(sink, |tx| {
            let now = Utc::now();
            tx.execute(
                "INSERT INTO boards (title, description, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![title, description, owner_id.to_string(), now],
            )?;
            let board = query_board(tx, tx.last_insert_rowid())?
                .ok_or_else(|| anyhow::anyhow!("board vanished after insert"))?;
            Ok((board.clone(), vec![Mutation::board(MutationKind::Create, board)]))
        })
    }

    pub fn get_board(&self, id: BoardId) -> Result<Option<Board>> {
        self.with_conn(|conn| query_board(conn, id))
    }

    /// Boards the user owns or is a member of, most recently updated first.
    pub fn boards_for_user(&self, user_id: Uuid) -> Result<Vec<Board>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM boards
                 WHERE owner_id = ?1
                    OR id IN (SELECT board_id FROM board_members WHERE user_id = ?1)
                 ORDER BY updated_at DESC, id DESC",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, BoardId>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut boards = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(board) = query_board(conn, id)? {
                    boards.push(board);
                }
            }
            Ok(boards)
        })
    }

    pub fn update_board(
        &self,
        id: BoardId,
        title: Option<&str>,
        description: Option<&str>,
        sink: &dyn CommitSink,
    ) -> Result<Option<Board>> {
        self.transact(sink, |tx| {
            let changed = tx.execute(
                "UPDATE boards
                 SET title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     updated_at = ?4
                 WHERE id = ?1",
                params![id, title, description, Utc::now()],
            )?;
            if changed == 0 {
                return Ok((None, vec![]));
            }
            let board = query_board(tx, id)?;
            let mutations = board
                .iter()
                .map(|b| Mutation::board(MutationKind::Update, b.clone()))
                .collect();
            Ok((board, mutations))
        })
    }

    /// Add a member. Returns `None` if the board does not exist.
    pub fn add_member(&self, board_id: BoardId, user_id: Uuid, sink: &dyn CommitSink) -> Result<Option<Board>> {
        self.transact(sink, |tx| {
            if query_board(tx, board_id)?.is_none() {
                return Ok((None, vec![]));
            }
            tx.execute(
                "INSERT OR IGNORE INTO board_members (board_id, user_id) VALUES (?1, ?2)",
                params![board_id, user_id.to_string()],
            )?;
            tx.execute(
                "UPDATE boards SET updated_at = ?2 WHERE id = ?1",
                params![board_id, Utc::now()],
            )?;
            let board = query_board(tx, board_id)?;
            let mutations = board
                .iter()
                .map(|b| Mutation::board(MutationKind::Update, b.clone()))
                .collect();
            Ok((board, mutations))
        })
    }

    /// Delete a board with everything on it. Every destroyed card and list
    /// gets its own delete mutation ahead of the board's.
    pub fn delete_board(&self, id: BoardId, sink: &dyn CommitSink) -> Result<bool> {
        self.transact(sink, |tx| {
            let Some(board) = query_board(tx, id)? else {
                return Ok((false, vec![]));
            };

            let mut stmt = tx.prepare(&format!(
                "SELECT {LIST_COLUMNS} FROM lists l WHERE l.board_id = ?1 ORDER BY l.position"
            ))?;
            let lists = stmt
                .query_map([id], list_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);

            let mut mutations = Vec::new();
            for list in lists {
                mutations.extend(crate::lists::cascade_cards(tx, &list)?);
                mutations.push(Mutation::list(MutationKind::Delete, list));
            }

            tx.execute("DELETE FROM boards WHERE id = ?1", [id])?;
            mutations.push(Mutation::board(MutationKind::Delete, board));
            Ok((true, mutations))
        })
    }
}

pub(crate) fn query_board(conn: &Connection, id: BoardId) -> Result<Option<Board>> {
    let board = conn
        .query_row(
            "SELECT id, title, description, owner_id, created_at, updated_at FROM boards WHERE id = ?1",
            [id],
            |row| {
                Ok(Board {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    owner_id: uuid_col(row, 3)?,
                    member_ids: Vec::new(),
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    let Some(mut board) = board else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT user_id FROM board_members WHERE board_id = ?1 ORDER BY user_id")?;
    board.member_ids = stmt
        .query_map([id], |row| uuid_col(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(board))
}
