use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use taski_types::events::{Mutation, MutationKind};
use taski_types::models::{BoardId, List, ListId};

use crate::models::{CARD_COLUMNS, LIST_COLUMNS, card_from_row, list_from_row};
use crate::positions::{SiblingScope, assign_position};
use crate::{CommitSink, Database};

impl Database {
    /// Create a list on a board. Returns `None` if the board does not exist.
    pub fn create_list(
        &self,
        board_id: BoardId,
        title: &str,
        position: Option<i64>,
        sink: &dyn CommitSink,
    ) -> Result<Option<List>> {
        self.transact(sink, |tx| {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM boards WHERE id = ?1)",
                [board_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok((None, vec![]));
            }

            let position = assign_position(tx, SiblingScope::ListsOfBoard(board_id), position)?;
            let now = Utc::now();
            tx.execute(
                "INSERT INTO lists (title, board_id, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![title, board_id, position, now],
            )?;

            let list = query_list(tx, tx.last_insert_rowid())?
                .ok_or_else(|| anyhow::anyhow!("list vanished after insert"))?;
            Ok((Some(list.clone()), vec![Mutation::list(MutationKind::Create, list)]))
        })
    }

    pub fn get_list(&self, id: ListId) -> Result<Option<List>> {
        self.with_conn(|conn| query_list(conn, id))
    }

    pub fn lists_for_board(&self, board_id: BoardId) -> Result<Vec<List>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LIST_COLUMNS} FROM lists l WHERE l.board_id = ?1 ORDER BY l.position"
            ))?;
            let lists = stmt
                .query_map([board_id], list_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(lists)
        })
    }

    /// Lists on every board the user owns or is a member of.
    pub fn lists_for_user(&self, user_id: Uuid) -> Result<Vec<List>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LIST_COLUMNS} FROM lists l
                 JOIN boards b ON b.id = l.board_id
                 WHERE b.owner_id = ?1
                    OR b.id IN (SELECT board_id FROM board_members WHERE user_id = ?1)
                 ORDER BY l.board_id, l.position"
            ))?;
            let lists = stmt
                .query_map([user_id.to_string()], list_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(lists)
        })
    }

    /// Rename and/or move a list within its board. A zero position appends.
    pub fn update_list(
        &self,
        id: ListId,
        title: Option<&str>,
        position: Option<i64>,
        sink: &dyn CommitSink,
    ) -> Result<Option<List>> {
        self.transact(sink, |tx| {
            let Some(current) = query_list(tx, id)? else {
                return Ok((None, vec![]));
            };

            let position = match position {
                Some(requested) if requested != current.position => {
                    assign_position(tx, SiblingScope::ListsOfBoard(current.board_id), Some(requested))?
                }
                _ => current.position,
            };

            tx.execute(
                "UPDATE lists SET title = COALESCE(?2, title), position = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, title, position, Utc::now()],
            )?;

            let list = query_list(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("list vanished during update"))?;
            Ok((Some(list.clone()), vec![Mutation::list(MutationKind::Update, list)]))
        })
    }

    /// Delete a list and its cards. Each destroyed card gets a delete
    /// mutation ahead of the list's own.
    pub fn delete_list(&self, id: ListId, sink: &dyn CommitSink) -> Result<bool> {
        self.transact(sink, |tx| {
            let Some(list) = query_list(tx, id)? else {
                return Ok((false, vec![]));
            };

            let mut mutations = cascade_cards(tx, &list)?;
            tx.execute("DELETE FROM lists WHERE id = ?1", [id])?;
            mutations.push(Mutation::list(MutationKind::Delete, list));
            Ok((true, mutations))
        })
    }
}

pub(crate) fn query_list(conn: &Connection, id: ListId) -> Result<Option<List>> {
    let list = conn
        .query_row(
            &format!("SELECT {LIST_COLUMNS} FROM lists l WHERE l.id = ?1"),
            [id],
            list_from_row,
        )
        .optional()?;
    Ok(list)
}

/// Delete mutations for every card in `list`, in position order. The rows
/// themselves go with the list through `ON DELETE CASCADE`.
pub(crate) fn cascade_cards(conn: &Connection, list: &List) -> Result<Vec<Mutation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CARD_COLUMNS} FROM cards c WHERE c.list_id = ?1 ORDER BY c.position"
    ))?;
    let mutations = stmt
        .query_map([list.id], card_from_row)?
        .map(|card| card.map(|card| Mutation::card(MutationKind::Delete, card, list.board_id)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Discard;
    use crate::testing::{Recorder, board_with_list, user};

    #[test]
    fn create_list_on_missing_board_is_none() {
        let db = Database::open_in_memory().unwrap();
        let recorder = Recorder::default();
        assert!(db.create_list(404, "Nope", None, &recorder).unwrap().is_none());
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn lists_append_in_order() {
        let db = Database::open_in_memory().unwrap();
        let (_, board_id, first) = board_with_list(&db);

        let second = db.create_list(board_id, "Doing", None, &Discard).unwrap().unwrap();
        let third = db.create_list(board_id, "Done", Some(0), &Discard).unwrap().unwrap();
        assert_eq!((second.position, third.position), (2, 3));

        let ids: Vec<_> = db.lists_for_board(board_id).unwrap().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![first, second.id, third.id]);
    }

    #[test]
    fn lists_for_user_excludes_foreign_boards() {
        let db = Database::open_in_memory().unwrap();
        let (owner, _, list_id) = board_with_list(&db);
        let stranger = user(&db, "stranger");

        let lists = db.lists_for_user(owner).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].id, list_id);
        assert!(db.lists_for_user(stranger).unwrap().is_empty());
    }

    #[test]
    fn update_list_moves_and_renames() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, list_id) = board_with_list(&db);
        let recorder = Recorder::default();

        let list = db.update_list(list_id, Some("Backlog"), Some(5), &recorder).unwrap().unwrap();
        assert_eq!(list.title, "Backlog");
        assert_eq!(list.position, 5);
        assert_eq!(recorder.take()[0].kind, MutationKind::Update);

        // Same position again is not a collision with itself.
        let list = db.update_list(list_id, None, Some(5), &recorder).unwrap().unwrap();
        assert_eq!(list.position, 5);
    }

    #[test]
    fn delete_list_reports_each_card() {
        let db = Database::open_in_memory().unwrap();
        let (owner, board_id, list_id) = board_with_list(&db);
        for title in ["a", "b"] {
            db.create_card(
                crate::models::NewCard {
                    list_id,
                    title: title.into(),
                    description: String::new(),
                    position: None,
                    due_date: None,
                    priority: Default::default(),
                    assigned_to: None,
                    created_by: owner,
                },
                &Discard,
            )
            .unwrap();
        }

        let recorder = Recorder::default();
        assert!(db.delete_list(list_id, &recorder).unwrap());
        let mutations = recorder.take();
        assert_eq!(mutations.len(), 3);
        assert!(mutations.iter().all(|m| m.kind == MutationKind::Delete && m.board_id == board_id));
        assert!(matches!(mutations[2].entity, taski_types::events::Entity::List(_)));
        assert!(db.cards_for_list(list_id).unwrap().is_empty());
    }
}
