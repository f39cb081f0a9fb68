use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use taski_types::events::{OutboundEvent, Topic};
use taski_types::models::{BoardId, CardId};

pub type ConnectionId = Uuid;

/// A serialized event, shared by every subscriber it is delivered to.
pub type Frame = Arc<str>;

/// Frames a subscriber may have queued before new ones are dropped for it.
pub const OUTBOX_CAPACITY: usize = 256;

/// Maps topics to the connections subscribed to them and fans events out.
///
/// Constructed once at startup and handed to everything that needs it.
/// Every operation takes the lock once, so callers never observe a half
/// updated subscriber set; delivery happens after the lock is released.
#[derive(Clone, Default)]
pub struct TopicRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    topics: HashMap<Topic, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Subscriber>,
    shut_down: bool,
}

struct Subscriber {
    outbox: mpsc::Sender<Frame>,
    board_id: BoardId,
    topics: HashSet<Topic>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection opened on `board_id`. Returns its id and the
    /// receiving end of its outbox. After `shutdown` the outbox is returned
    /// already closed.
    pub fn register(&self, board_id: BoardId) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);

        let mut state = self.write();
        if !state.shut_down {
            state.connections.insert(
                conn_id,
                Subscriber {
                    outbox: tx,
                    board_id,
                    topics: HashSet::new(),
                },
            );
        }
        (conn_id, rx)
    }

    /// Subscribe a connection to a topic. Idempotent. Returns false if the
    /// connection is not (or no longer) registered.
    pub fn join(&self, conn_id: ConnectionId, topic: Topic) -> bool {
        let mut guard = self.write();
        let state = &mut *guard;
        let Some(subscriber) = state.connections.get_mut(&conn_id) else {
            return false;
        };
        subscriber.topics.insert(topic);
        state.topics.entry(topic).or_default().insert(conn_id);
        trace!("{} joined {}", conn_id, topic);
        true
    }

    /// Unsubscribe a connection from a topic. Returns whether it was subscribed.
    pub fn leave(&self, conn_id: ConnectionId, topic: Topic) -> bool {
        let mut guard = self.write();
        let state = &mut *guard;
        let was_subscribed = state
            .connections
            .get_mut(&conn_id)
            .is_some_and(|subscriber| subscriber.topics.remove(&topic));
        remove_from_topic(&mut state.topics, conn_id, topic);
        if was_subscribed {
            trace!("{} left {}", conn_id, topic);
        }
        was_subscribed
    }

    /// Drop a connection from every topic and close its outbox.
    /// Returns how many topics it was removed from; 0 if already gone.
    pub fn leave_all(&self, conn_id: ConnectionId) -> usize {
        let mut guard = self.write();
        let state = &mut *guard;
        let Some(subscriber) = state.connections.remove(&conn_id) else {
            return 0;
        };
        for topic in &subscriber.topics {
            remove_from_topic(&mut state.topics, conn_id, *topic);
        }
        subscriber.topics.len()
    }

    /// Unsubscribe followers of a card whose connection is on a board other
    /// than `board_id`, the card's current board. Returns how many were removed.
    pub fn prune_card_followers(&self, card_id: CardId, board_id: BoardId) -> usize {
        let topic = Topic::Card(card_id);
        let mut guard = self.write();
        let state = &mut *guard;
        let Some(members) = state.topics.get(&topic) else {
            return 0;
        };
        let strangers: Vec<ConnectionId> = members
            .iter()
            .copied()
            .filter(|id| state.connections.get(id).is_some_and(|s| s.board_id != board_id))
            .collect();

        for conn_id in &strangers {
            if let Some(subscriber) = state.connections.get_mut(conn_id) {
                subscriber.topics.remove(&topic);
            }
            remove_from_topic(&mut state.topics, *conn_id, topic);
            debug!("{} stopped following card {}, now on board {}", conn_id, card_id, board_id);
        }
        strangers.len()
    }

    /// Deliver `event` to every current subscriber of `topic`.
    ///
    /// Each delivery is a non-blocking `try_send`: a subscriber whose outbox
    /// is full loses this frame, one that just disconnected is skipped.
    /// Returns the number of outboxes the frame was queued on.
    pub fn publish(&self, topic: Topic, event: &OutboundEvent) -> usize {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize event for {}: {}", topic, e);
                return 0;
            }
        };

        let targets: Vec<(ConnectionId, mpsc::Sender<Frame>)> = {
            let state = self.read();
            let Some(members) = state.topics.get(&topic) else {
                return 0;
            };
            members
                .iter()
                .filter_map(|id| state.connections.get(id).map(|s| (*id, s.outbox.clone())))
                .collect()
        };

        let mut delivered = 0;
        for (conn_id, outbox) in targets {
            match outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbox of {} is full, dropping frame for {}", conn_id, topic);
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("{} disconnected before delivery on {}", conn_id, topic);
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.read().topics.get(&topic).map_or(0, HashSet::len)
    }

    pub fn topics_of(&self, conn_id: ConnectionId) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .read()
            .connections
            .get(&conn_id)
            .map(|s| s.topics.iter().copied().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }

    /// Forget every subscription and close every outbox. Sessions see their
    /// outbox end and close; later registrations get a closed outbox.
    pub fn shutdown(&self) {
        let mut state = self.write();
        state.shut_down = true;
        let closed = state.connections.len();
        state.connections.clear();
        state.topics.clear();
        debug!("Topic registry shut down, closed {} outboxes", closed);
    }
}

fn remove_from_topic(topics: &mut HashMap<Topic, HashSet<ConnectionId>>, conn_id: ConnectionId, topic: Topic) {
    if let Some(members) = topics.get_mut(&topic) {
        members.remove(&conn_id);
        if members.is_empty() {
            topics.remove(&topic);
        }
    }
}
