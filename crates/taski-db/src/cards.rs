use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use taski_types::events::{Mutation, MutationKind};
use taski_types::models::{BoardId, Card, CardId, ListId};

use crate::models::{CARD_COLUMNS, CardChanges, NewCard, card_from_row};
use crate::positions::{SiblingScope, assign_position};
use crate::{CommitSink, Database};

impl Database {
    /// Create a card. Returns `None` if the list does not exist.
    pub fn create_card(&self, new: NewCard, sink: &dyn CommitSink) -> Result<Option<Card>> {
        self.transact(sink, |tx| {
            let Some(board_id) = board_of_list(tx, new.list_id)? else {
                return Ok((None, vec![]));
            };

            let position = assign_position(tx, SiblingScope::CardsOfList(new.list_id), new.position)?;
            let now = Utc::now();
            tx.execute(
                "INSERT INTO cards (title, description, list_id, position, due_date, priority,
                                    assigned_to, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    new.title,
                    new.description,
                    new.list_id,
                    position,
                    new.due_date,
                    new.priority.as_str(),
                    new.assigned_to.map(|id| id.to_string()),
                    new.created_by.to_string(),
                    now,
                ],
            )?;

            let card = query_card(tx, tx.last_insert_rowid())?
                .ok_or_else(|| anyhow::anyhow!("card vanished after insert"))?;
            Ok((Some(card.clone()), vec![Mutation::card(MutationKind::Create, card, board_id)]))
        })
    }

    pub fn get_card(&self, id: CardId) -> Result<Option<Card>> {
        self.with_conn(|conn| query_card(conn, id))
    }

    pub fn cards_for_list(&self, list_id: ListId) -> Result<Vec<Card>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards c WHERE c.list_id = ?1 ORDER BY c.position"
            ))?;
            let cards = stmt
                .query_map([list_id], card_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(cards)
        })
    }

    /// Cards on every board the user owns or is a member of.
    pub fn cards_for_user(&self, user_id: Uuid) -> Result<Vec<Card>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards c
                 JOIN lists l ON l.id = c.list_id
                 JOIN boards b ON b.id = l.board_id
                 WHERE b.owner_id = ?1
                    OR b.id IN (SELECT board_id FROM board_members WHERE user_id = ?1)
                 ORDER BY c.list_id, c.position"
            ))?;
            let cards = stmt
                .query_map([user_id.to_string()], card_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(cards)
        })
    }

    /// Apply `changes` to a card. Moving to another list without a position
    /// appends at the end of the destination.
    ///
    /// A move across boards is reported as a delete on the old board followed
    /// by a create on the new one, so both boards' subscribers stay in sync.
    pub fn update_card(&self, id: CardId, changes: CardChanges, sink: &dyn CommitSink) -> Result<Option<Card>> {
        self.transact(sink, |tx| {
            let Some(current) = query_card(tx, id)? else {
                return Ok((None, vec![]));
            };
            let Some(old_board) = board_of_list(tx, current.list_id)? else {
                return Ok((None, vec![]));
            };

            let list_id = changes.list_id.unwrap_or(current.list_id);
            let Some(new_board) = board_of_list(tx, list_id)? else {
                return Ok((None, vec![]));
            };

            let moved = list_id != current.list_id;
            let position = match changes.position {
                Some(requested) if moved || requested != current.position => {
                    assign_position(tx, SiblingScope::CardsOfList(list_id), Some(requested))?
                }
                None if moved => assign_position(tx, SiblingScope::CardsOfList(list_id), None)?,
                _ => current.position,
            };

            let title = changes.title.unwrap_or(current.title);
            let description = changes.description.unwrap_or(current.description);
            let due_date = changes.due_date.unwrap_or(current.due_date);
            let priority = changes.priority.unwrap_or(current.priority);
            let assigned_to = changes.assigned_to.unwrap_or(current.assigned_to);

            tx.execute(
                "UPDATE cards
                 SET title = ?2, description = ?3, list_id = ?4, position = ?5, due_date = ?6,
                     priority = ?7, assigned_to = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    id,
                    title,
                    description,
                    list_id,
                    position,
                    due_date,
                    priority.as_str(),
                    assigned_to.map(|id| id.to_string()),
                    Utc::now(),
                ],
            )?;

            let card = query_card(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("card vanished during update"))?;

            let mutations = if old_board == new_board {
                vec![Mutation::card(MutationKind::Update, card.clone(), new_board)]
            } else {
                vec![
                    Mutation::card(MutationKind::Delete, card.clone(), old_board),
                    Mutation::card(MutationKind::Create, card.clone(), new_board),
                ]
            };
            Ok((Some(card), mutations))
        })
    }

    pub fn delete_card(&self, id: CardId, sink: &dyn CommitSink) -> Result<bool> {
        self.transact(sink, |tx| {
            let Some(card) = query_card(tx, id)? else {
                return Ok((false, vec![]));
            };
            let board_id = board_of_list(tx, card.list_id)?
                .ok_or_else(|| anyhow::anyhow!("card {} has no list", id))?;

            tx.execute("DELETE FROM cards WHERE id = ?1", [id])?;
            Ok((true, vec![Mutation::card(MutationKind::Delete, card, board_id)]))
        })
    }
}

pub(crate) fn query_card(conn: &Connection, id: CardId) -> Result<Option<Card>> {
    let card = conn
        .query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards c WHERE c.id = ?1"),
            [id],
            card_from_row,
        )
        .optional()?;
    Ok(card)
}

fn board_of_list(conn: &Connection, list_id: ListId) -> Result<Option<BoardId>> {
    let board_id = conn
        .query_row("SELECT board_id FROM lists WHERE id = ?1", [list_id], |row| row.get(0))
        .optional()?;
    Ok(board_id)
}
