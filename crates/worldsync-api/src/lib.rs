// worldsync-api: wire layer for the worldsync world-state client
//
// Socket transport with reconnect/heartbeat, the JSON message envelope,
// snapshot wire types, and the snapshot REST client.

pub mod envelope;
pub mod error;
pub mod rest;
pub mod snapshot;
pub mod transport;

pub use envelope::{Envelope, MessageKind};
pub use error::Error;
pub use rest::SnapshotClient;
pub use snapshot::{RawEdge, RawEntity, WorldSnapshot};
pub use transport::{
    ConnectionState, Connector, MemoryConnector, MemoryListener, MemoryPeer, ReconnectConfig,
    Subscription, TimerPurpose, Transport, TransportConfig, TungsteniteConnector,
};
