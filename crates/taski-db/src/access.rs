//! Owner-or-member access checks, dispatched through a resolver table keyed
//! by entity kind.

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use taski_types::models::BoardId;

use crate::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Board,
    List,
    Card,
}

/// Maps an entity id to the id of the board that owns it.
type BoardResolver = fn(&Connection, i64) -> rusqlite::Result<Option<BoardId>>;

const BOARD_RESOLVERS: &[(EntityKind, BoardResolver)] = &[
    (EntityKind::Board, board_of_board),
    (EntityKind::List, board_of_list),
    (EntityKind::Card, board_of_card),
];

fn board_of_board(conn: &Connection, id: i64) -> rusqlite::Result<Option<BoardId>> {
    conn.query_row("SELECT id FROM boards WHERE id = ?1", [id], |row| row.get(0))
        .optional()
}

fn board_of_list(conn: &Connection, id: i64) -> rusqlite::Result<Option<BoardId>> {
    conn.query_row("SELECT board_id FROM lists WHERE id = ?1", [id], |row| row.get(0))
        .optional()
}

fn board_of_card(conn: &Connection, id: i64) -> rusqlite::Result<Option<BoardId>> {
    conn.query_row(
        "SELECT l.board_id FROM cards c JOIN lists l ON l.id = c.list_id WHERE c.id = ?1",
        [id],
        |row| row.get(0),
    )
    .optional()
}

fn resolver(kind: EntityKind) -> Result<BoardResolver> {
    BOARD_RESOLVERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, resolve)| *resolve)
        .ok_or_else(|| anyhow!("no board resolver for {:?}", kind))
}

fn is_participant(conn: &Connection, user_id: Uuid, board_id: BoardId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards WHERE id = ?1 AND owner_id = ?2)
             OR EXISTS(SELECT 1 FROM board_members WHERE board_id = ?1 AND user_id = ?2)",
        rusqlite::params![board_id, user_id.to_string()],
        |row| row.get(0),
    )
}

impl Database {
    /// The board an entity ultimately belongs to, or `None` if it does not exist.
    pub fn owning_board(&self, kind: EntityKind, id: i64) -> Result<Option<BoardId>> {
        let resolve = resolver(kind)?;
        self.with_conn(|conn| Ok(resolve(conn, id)?))
    }

    /// Whether `user_id` owns or is a member of the board behind the entity.
    /// Missing entities are never accessible.
    pub fn can_access(&self, user_id: Uuid, kind: EntityKind, id: i64) -> Result<bool> {
        let resolve = resolver(kind)?;
        self.with_conn(|conn| match resolve(conn, id)? {
            Some(board_id) => Ok(is_participant(conn, user_id, board_id)?),
            None => Ok(false),
        })
    }

    pub fn is_board_owner(&self, user_id: Uuid, board_id: BoardId) -> Result<bool> {
        self.with_conn(|conn| {
            let owner: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM boards WHERE id = ?1 AND owner_id = ?2)",
                rusqlite::params![board_id, user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(owner)
        })
    }
}
