//! Row types and row mappers. Domain models live in taski-types; this module
//! only knows how they are laid out in SQLite.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use taski_types::models::{Card, List, ListId, Priority, User};

/// A user with its password hash. Never leaves the API crate.
pub struct UserRow {
    pub user: User,
    pub password: String,
}

pub struct NewCard {
    pub list_id: ListId,
    pub title: String,
    pub description: String,
    pub position: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub assigned_to: Option<Uuid>,
    pub created_by: Uuid,
}

/// Fields to change on a card; `None` leaves the column alone.
#[derive(Default)]
pub struct CardChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub list_id: Option<ListId>,
    pub position: Option<i64>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<Uuid>>,
}

pub(crate) const LIST_COLUMNS: &str = "l.id, l.title, l.board_id, l.position, l.created_at, l.updated_at";

pub(crate) const CARD_COLUMNS: &str = "c.id, c.title, c.description, c.list_id, c.position, c.due_date, \
     c.priority, c.assigned_to, c.created_by, c.created_at, c.updated_at";

pub(crate) fn list_from_row(row: &Row<'_>) -> rusqlite::Result<List> {
    Ok(List {
        id: row.get(0)?,
        title: row.get(1)?,
        board_id: row.get(2)?,
        position: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let priority: String = row.get(6)?;
    Ok(Card {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        list_id: row.get(3)?,
        position: row.get(4)?,
        due_date: row.get(5)?,
        priority: priority
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        assigned_to: opt_uuid_col(row, 7)?,
        created_by: uuid_col(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
