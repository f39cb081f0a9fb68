use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Board, BoardId, Card, CardId, List, ListId};

/// A logical broadcast channel. Exists only as a key in the subscription
/// registry, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Board(BoardId),
    Card(CardId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board(id) => write!(f, "board:{}", id),
            Self::Card(id) => write!(f, "card:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Snapshot of the entity a committed write touched.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Board(Board),
    List(List),
    Card(Card),
}

/// A committed write, handed from the storage layer to the broadcaster.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub entity: Entity,
    pub kind: MutationKind,
    pub board_id: BoardId,
}

impl Mutation {
    pub fn card(kind: MutationKind, card: Card, board_id: BoardId) -> Self {
        Self { entity: Entity::Card(card), kind, board_id }
    }

    pub fn list(kind: MutationKind, list: List) -> Self {
        let board_id = list.board_id;
        Self { entity: Entity::List(list), kind, board_id }
    }

    pub fn board(kind: MutationKind, board: Board) -> Self {
        let board_id = board.id;
        Self { entity: Entity::Board(board), kind, board_id }
    }

    /// Every mutation goes to its board topic; card mutations are mirrored
    /// to the card topic as well.
    pub fn topics(&self) -> Vec<Topic> {
        match &self.entity {
            Entity::Card(card) => vec![Topic::Board(self.board_id), Topic::Card(card.id)],
            Entity::List(_) | Entity::Board(_) => vec![Topic::Board(self.board_id)],
        }
    }
}

/// Normalized mutation event as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEvent {
    CardCreate { card: Card },
    CardUpdate { card: Card },
    CardDelete { card_id: CardId },
    ListCreate { list: List },
    ListUpdate { list: List },
    ListDelete { list_id: ListId },
    BoardUpdate { board: Board },
    BoardDelete { board_id: BoardId },
}

impl From<&Mutation> for BoardEvent {
    fn from(mutation: &Mutation) -> Self {
        match (&mutation.entity, mutation.kind) {
            (Entity::Card(card), MutationKind::Create) => Self::CardCreate { card: card.clone() },
            (Entity::Card(card), MutationKind::Update) => Self::CardUpdate { card: card.clone() },
            (Entity::Card(card), MutationKind::Delete) => Self::CardDelete { card_id: card.id },
            (Entity::List(list), MutationKind::Create) => Self::ListCreate { list: list.clone() },
            (Entity::List(list), MutationKind::Update) => Self::ListUpdate { list: list.clone() },
            (Entity::List(list), MutationKind::Delete) => Self::ListDelete { list_id: list.id },
            // A freshly created board has no subscribers yet.
            (Entity::Board(board), MutationKind::Create | MutationKind::Update) => {
                Self::BoardUpdate { board: board.clone() }
            }
            (Entity::Board(board), MutationKind::Delete) => Self::BoardDelete { board_id: board.id },
        }
    }
}

/// Everything a realtime client can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Mutation(BoardEvent),
    /// Free-form board signaling, relayed verbatim.
    Message { message: String },
}

impl From<BoardEvent> for OutboundEvent {
    fn from(event: BoardEvent) -> Self {
        Self::Mutation(event)
    }
}

/// Control messages sent FROM client TO server over the board socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SessionCommand {
    Subscription {
        action: SubscriptionAction,
        card_id: Option<CardId>,
    },
    Message {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::models::Priority;

    fn card() -> Card {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        Card {
            id: 7,
            title: "Write docs".into(),
            description: String::new(),
            list_id: 3,
            position: 2,
            due_date: None,
            priority: Priority::High,
            assigned_to: None,
            created_by: Uuid::nil(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn topic_names() {
        assert_eq!(Topic::Board(4).to_string(), "board:4");
        assert_eq!(Topic::Card(9).to_string(), "card:9");
    }

    #[test]
    fn card_mutations_fan_out_to_board_and_card() {
        let m = Mutation::card(MutationKind::Update, card(), 11);
        assert_eq!(m.topics(), vec![Topic::Board(11), Topic::Card(7)]);
    }

    #[test]
    fn card_create_wire_shape() {
        let event = OutboundEvent::from(BoardEvent::from(&Mutation::card(
            MutationKind::Create,
            card(),
            1,
        )));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "card_create");
        assert_eq!(value["card"]["id"], 7);
        assert_eq!(value["card"]["list_id"], 3);
        assert_eq!(value["card"]["priority"], "high");
        assert_eq!(value["card"]["assigned_to"], serde_json::Value::Null);
        assert_eq!(value["card"]["due_date"], serde_json::Value::Null);
        assert_eq!(value["card"]["created_at"], "2025-03-01T12:30:00Z");
    }

    #[test]
    fn delete_carries_only_the_id() {
        let event = OutboundEvent::from(BoardEvent::from(&Mutation::card(
            MutationKind::Delete,
            card(),
            1,
        )));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "card_delete", "card_id": 7 })
        );
    }

    #[test]
    fn message_has_no_type_tag() {
        let event = OutboundEvent::Message { message: "hi".into() };
        assert_eq!(serde_json::to_value(&event).unwrap(), json!({ "message": "hi" }));
    }

    #[test]
    fn parses_control_messages() {
        let sub: SessionCommand =
            serde_json::from_str(r#"{"action":"subscribe","card_id":5}"#).unwrap();
        assert_eq!(
            sub,
            SessionCommand::Subscription {
                action: SubscriptionAction::Subscribe,
                card_id: Some(5)
            }
        );

        let msg: SessionCommand = serde_json::from_str(r#"{"message":"ping"}"#).unwrap();
        assert_eq!(msg, SessionCommand::Message { message: "ping".into() });

        assert!(serde_json::from_str::<SessionCommand>(r#"{"action":"explode"}"#).is_err());
        assert!(serde_json::from_str::<SessionCommand>("not json").is_err());
    }
}
