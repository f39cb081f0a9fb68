pub mod broadcaster;
pub mod connection;
pub mod registry;
pub mod session;

pub use broadcaster::MutationBroadcaster;
pub use registry::{ConnectionId, Frame, TopicRegistry};
pub use session::{AccessOracle, Rejected, Session, SessionControl, SessionState};
