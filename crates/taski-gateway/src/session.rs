use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taski_db::{Database, EntityKind};
use taski_types::events::{OutboundEvent, SessionCommand, SubscriptionAction, Topic};
use taski_types::models::{BoardId, CardId, Identity};

use crate::registry::{ConnectionId, Frame, TopicRegistry};

/// Authorization questions a session asks while opening and subscribing.
pub trait AccessOracle: Send + Sync + 'static {
    /// Whether the user owns or is a member of the board.
    fn is_authorized(&self, user_id: Uuid, board_id: BoardId) -> anyhow::Result<bool>;

    /// The board a card lives on, if the card exists.
    fn card_board(&self, card_id: CardId) -> anyhow::Result<Option<BoardId>>;
}

impl AccessOracle for Database {
    fn is_authorized(&self, user_id: Uuid, board_id: BoardId) -> anyhow::Result<bool> {
        self.can_access(user_id, EntityKind::Board, board_id)
    }

    fn card_board(&self, card_id: CardId) -> anyhow::Result<Option<BoardId>> {
        self.owning_board(EntityKind::Card, card_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Rejected {
    #[error("no identity presented")]
    Unauthenticated,
    #[error("user {user_id} may not access board {board_id}")]
    Forbidden { user_id: Uuid, board_id: BoardId },
    #[error("authorization lookup failed: {0}")]
    Lookup(#[from] anyhow::Error),
}

/// There is no connecting state: a `Session` only exists once it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// One realtime client on one board.
///
/// A `Session` only exists once authorization passed and the board topic
/// was joined. Closing it, explicitly or by dropping it, removes the
/// connection from every topic exactly once.
pub struct Session {
    control: SessionControl,
    outbox: mpsc::Receiver<Frame>,
}

impl Session {
    pub async fn connect(
        registry: &TopicRegistry,
        oracle: Arc<dyn AccessOracle>,
        board_id: BoardId,
        identity: Option<Identity>,
    ) -> Result<Self, Rejected> {
        let identity = identity.ok_or(Rejected::Unauthenticated)?;

        let check = oracle.clone();
        let user_id = identity.user_id;
        let allowed = tokio::task::spawn_blocking(move || check.is_authorized(user_id, board_id))
            .await
            .map_err(anyhow::Error::from)??;
        if !allowed {
            return Err(Rejected::Forbidden { user_id, board_id });
        }

        let (id, outbox) = registry.register(board_id);
        registry.join(id, Topic::Board(board_id));
        info!("{} ({}) opened session {} on board {}", identity.username, user_id, id, board_id);

        Ok(Self {
            control: SessionControl {
                id,
                board_id,
                identity,
                registry: registry.clone(),
                oracle,
                closed: AtomicBool::new(false),
            },
            outbox,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.control.id
    }

    pub fn board_id(&self) -> BoardId {
        self.control.board_id
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    pub async fn receive(&self, raw: &str) {
        self.control.receive(raw).await;
    }

    pub fn close(&self) {
        self.control.close();
    }

    /// Separate inbound control from the outbox so both can be driven from
    /// one `select!` loop.
    pub fn split(self) -> (SessionControl, mpsc::Receiver<Frame>) {
        (self.control, self.outbox)
    }
}

pub struct SessionControl {
    id: ConnectionId,
    board_id: BoardId,
    identity: Identity,
    registry: TopicRegistry,
    oracle: Arc<dyn AccessOracle>,
    closed: AtomicBool,
}

impl SessionControl {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::Acquire) {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    /// Route one inbound text frame. Anything unrecognized is ignored.
    pub async fn receive(&self, raw: &str) {
        if self.state() == SessionState::Closed {
            return;
        }

        let command = match serde_json::from_str::<SessionCommand>(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(
                    "Session {} ignoring bad message: {} -- raw: {}",
                    self.id,
                    e,
                    raw.chars().take(200).collect::<String>()
                );
                return;
            }
        };

        match command {
            SessionCommand::Subscription {
                action,
                card_id: Some(card_id),
            } if card_id > 0 => match action {
                SubscriptionAction::Subscribe => self.subscribe_card(card_id).await,
                SubscriptionAction::Unsubscribe => {
                    self.registry.leave(self.id, Topic::Card(card_id));
                }
            },
            SessionCommand::Subscription { action, .. } => {
                debug!("Session {} sent {:?} without a card id", self.id, action);
            }
            SessionCommand::Message { message } => {
                self.registry
                    .publish(Topic::Board(self.board_id), &OutboundEvent::Message { message });
            }
        }
    }

    async fn subscribe_card(&self, card_id: CardId) {
        let oracle = self.oracle.clone();
        let owner = match tokio::task::spawn_blocking(move || oracle.card_board(card_id)).await {
            Ok(Ok(owner)) => owner,
            Ok(Err(e)) => {
                warn!("Card lookup for session {} failed: {}", self.id, e);
                return;
            }
            Err(e) => {
                warn!("Card lookup task for session {} failed: {}", self.id, e);
                return;
            }
        };

        if owner != Some(self.board_id) {
            debug!(
                "Session {} on board {} may not follow card {}",
                self.id, self.board_id, card_id
            );
            return;
        }
        self.registry.join(self.id, Topic::Card(card_id));
    }

    /// Leave every topic. Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let left = self.registry.leave_all(self.id);
        info!(
            "{} ({}) closed session {} ({} subscriptions removed)",
            self.identity.username, self.identity.user_id, self.id, left
        );
    }
}

impl Drop for SessionControl {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[derive(Default)]
    struct FakeOracle {
        members: HashSet<(Uuid, BoardId)>,
        cards: HashMap<CardId, BoardId>,
    }

    impl AccessOracle for FakeOracle {
        fn is_authorized(&self, user_id: Uuid, board_id: BoardId) -> anyhow::Result<bool> {
            Ok(self.members.contains(&(user_id, board_id)))
        }

        fn card_board(&self, card_id: CardId) -> anyhow::Result<Option<BoardId>> {
            Ok(self.cards.get(&card_id).copied())
        }
    }

    struct FailingOracle;

    impl AccessOracle for FailingOracle {
        fn is_authorized(&self, _: Uuid, _: BoardId) -> anyhow::Result<bool> {
            anyhow::bail!("database unavailable")
        }

        fn card_board(&self, _: CardId) -> anyhow::Result<Option<BoardId>> {
            anyhow::bail!("database unavailable")
        }
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
        }
    }

    fn oracle_for(identity: &Identity, board_id: BoardId) -> Arc<dyn AccessOracle> {
        let mut oracle = FakeOracle::default();
        oracle.members.insert((identity.user_id, board_id));
        oracle.cards.insert(5, board_id);
        oracle.cards.insert(6, board_id + 1);
        Arc::new(oracle)
    }

    impl Session {
        async fn next_frame(&mut self) -> Option<Frame> {
            self.outbox.recv().await
        }
    }

    async fn open(registry: &TopicRegistry) -> Session {
        let who = identity();
        let oracle = oracle_for(&who, 1);
        Session::connect(registry, oracle, 1, Some(who)).await.unwrap()
    }

    #[tokio::test]
    async fn anonymous_connection_is_rejected_before_joining() {
        let registry = TopicRegistry::new();
        let result = Session::connect(&registry, Arc::new(FakeOracle::default()), 1, None).await;

        assert!(matches!(result, Err(Rejected::Unauthenticated)));
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count(Topic::Board(1)), 0);
    }

    #[tokio::test]
    async fn non_member_is_forbidden() {
        let registry = TopicRegistry::new();
        let who = identity();
        let oracle = oracle_for(&who, 2);

        let result = Session::connect(&registry, oracle, 1, Some(who)).await;
        assert!(matches!(result, Err(Rejected::Forbidden { board_id: 1, .. })));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn lookup_failure_rejects() {
        let registry = TopicRegistry::new();
        let result = Session::connect(&registry, Arc::new(FailingOracle), 1, Some(identity())).await;
        assert!(matches!(result, Err(Rejected::Lookup(_))));
    }

    #[tokio::test]
    async fn open_session_follows_the_board() {
        let registry = TopicRegistry::new();
        let session = open(&registry).await;

        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(registry.topics_of(session.id()), vec![Topic::Board(1)]);
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_cards() {
        let registry = TopicRegistry::new();
        let session = open(&registry).await;

        session.receive(r#"{"action":"subscribe","card_id":5}"#).await;
        assert_eq!(registry.topics_of(session.id()), vec![Topic::Board(1), Topic::Card(5)]);

        session.receive(r#"{"action":"unsubscribe","card_id":5}"#).await;
        assert_eq!(registry.topics_of(session.id()), vec![Topic::Board(1)]);
    }

    #[tokio::test]
    async fn cards_on_other_boards_cannot_be_followed() {
        let registry = TopicRegistry::new();
        let session = open(&registry).await;

        session.receive(r#"{"action":"subscribe","card_id":6}"#).await;
        session.receive(r#"{"action":"subscribe","card_id":404}"#).await;
        assert_eq!(registry.topics_of(session.id()), vec![Topic::Board(1)]);
    }

    #[tokio::test]
    async fn malformed_messages_are_ignored() {
        let registry = TopicRegistry::new();
        let mut session = open(&registry).await;

        for raw in [
            "{",
            "[]",
            r#"{"action":"subscribe"}"#,
            r#"{"action":"subscribe","card_id":0}"#,
            r#"{"action":"subscribe","card_id":"5"}"#,
            r#"{"action":"launch","card_id":5}"#,
            r#"{"message":42}"#,
        ] {
            session.receive(raw).await;
        }

        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(registry.topics_of(session.id()), vec![Topic::Board(1)]);
        assert!(timeout(Duration::from_millis(50), session.next_frame()).await.is_err());
    }

    #[tokio::test]
    async fn message_is_relayed_to_the_board() {
        let registry = TopicRegistry::new();
        let mut sender = open(&registry).await;
        let (peer, mut peer_rx) = registry.register(1);
        registry.join(peer, Topic::Board(1));

        sender.receive(r#"{"message":"moving card 5"}"#).await;

        let expected = r#"{"message":"moving card 5"}"#;
        assert_eq!(&*peer_rx.recv().await.unwrap(), expected);
        assert_eq!(&*sender.next_frame().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn close_leaves_everything_once() {
        let registry = TopicRegistry::new();
        let session = open(&registry).await;
        session.receive(r#"{"action":"subscribe","card_id":5}"#).await;

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count(Topic::Card(5)), 0);

        // Closed sessions ignore further control messages.
        session.receive(r#"{"action":"subscribe","card_id":5}"#).await;
        assert_eq!(registry.subscriber_count(Topic::Card(5)), 0);
        drop(session);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_session_leaves_all_topics() {
        let registry = TopicRegistry::new();
        let session = open(&registry).await;
        let (control, _outbox) = session.split();
        assert_eq!(registry.connection_count(), 1);

        drop(control);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count(Topic::Board(1)), 0);
    }

    #[tokio::test]
    async fn registry_shutdown_ends_the_outbox() {
        let registry = TopicRegistry::new();
        let mut session = open(&registry).await;

        registry.shutdown();
        assert!(session.next_frame().await.is_none());
    }
}
