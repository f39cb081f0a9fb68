use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use taski_db::CommitSink;
use taski_types::events::{BoardEvent, Entity, Mutation, OutboundEvent};

use crate::registry::TopicRegistry;

/// Turns committed mutations into events on the registry.
///
/// Commit paths enqueue without blocking; a single dispatcher task drains
/// the queue in order, so events for one entity go out in commit order.
#[derive(Clone)]
pub struct MutationBroadcaster {
    queue: mpsc::UnboundedSender<Mutation>,
}

impl MutationBroadcaster {
    /// Start the dispatcher task. It stops once every broadcaster clone has
    /// been dropped and the queue is drained.
    pub fn spawn(registry: TopicRegistry) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(rx, registry));
        (Self { queue }, handle)
    }

    /// Queue a committed mutation for broadcast. Never fails the caller: if
    /// the dispatcher is gone the event is lost and the write stands.
    pub fn on_commit(&self, mutation: Mutation) {
        if let Err(mpsc::error::SendError(lost)) = self.queue.send(mutation) {
            warn!(
                "Mutation dispatcher stopped, dropping {:?} event for board {}",
                lost.kind, lost.board_id
            );
        }
    }
}

impl CommitSink for MutationBroadcaster {
    fn committed(&self, mutation: Mutation) {
        self.on_commit(mutation);
    }
}

/// Publish one mutation to every topic it belongs to.
/// Returns the total number of deliveries.
///
/// Card followers whose session is on another board than the card's are
/// unsubscribed first, so a card moved away stops reaching them.
pub fn publish_mutation(registry: &TopicRegistry, mutation: &Mutation) -> usize {
    if let Entity::Card(card) = &mutation.entity {
        registry.prune_card_followers(card.id, mutation.board_id);
    }
    let event = OutboundEvent::from(BoardEvent::from(mutation));
    mutation
        .topics()
        .into_iter()
        .map(|topic| registry.publish(topic, &event))
        .sum()
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Mutation>, registry: TopicRegistry) {
    while let Some(mutation) = rx.recv().await {
        let delivered = publish_mutation(&registry, &mutation);
        debug!(
            "{:?} on board {} delivered to {} subscriber(s)",
            mutation.kind, mutation.board_id, delivered
        );
    }
    debug!("Mutation dispatcher stopped");
}
