//! Ordering keys for siblings: lists within a board, cards within a list.

use anyhow::Result;
use rusqlite::Connection;

use taski_types::models::{BoardId, ListId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingScope {
    ListsOfBoard(BoardId),
    CardsOfList(ListId),
}

/// Resolve the position a new or moved sibling will take.
///
/// An explicit, non-zero request is returned untouched; collisions are left
/// to the table's UNIQUE constraint. Otherwise the sibling is appended after
/// the current maximum (1 for an empty scope). Must run inside the write
/// transaction that stores the row so concurrent appends cannot share a value.
pub fn assign_position(conn: &Connection, scope: SiblingScope, requested: Option<i64>) -> Result<i64> {
    if let Some(position) = requested.filter(|p| *p != 0) {
        return Ok(position);
    }

    let max: Option<i64> = match scope {
        SiblingScope::ListsOfBoard(board_id) => conn.query_row(
            "SELECT MAX(position) FROM lists WHERE board_id = ?1",
            [board_id],
            |row| row.get(0),
        )?,
        SiblingScope::CardsOfList(list_id) => conn.query_row(
            "SELECT MAX(position) FROM cards WHERE list_id = ?1",
            [list_id],
            |row| row.get(0),
        )?,
    };

    Ok(max.unwrap_or(0) + 1)
}
