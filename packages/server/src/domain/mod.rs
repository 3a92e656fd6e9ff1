//! Domain layer: value objects, connections, persisted shapes and the
//! collaborator ports the hub depends on.

mod connection;
mod error;
mod message;
mod repository;
mod value;

pub use connection::{Connection, ConnectionId, Delivery, Outbound, OutboundReceiver};
pub use error::{HandshakeError, HubError, StoreError, SubmitError};
pub use message::{NewChannelMessage, NewDirectMessage, PersistedMessage, UserDisplay};
pub use repository::{AccessChecker, MessageStore};
#[cfg(test)]
pub use repository::{MockAccessChecker, MockMessageStore};
pub use value::{ChannelId, ChatRoomKey, Identity, MessageId, UserId};
