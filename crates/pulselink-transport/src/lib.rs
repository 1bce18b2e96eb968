#![forbid(unsafe_code)]

//! Transport strategies for pulselink.
//!
//! One [`Transport`] implementation per [`Protocol`], all sharing the wire
//! frame layout and the datagram/stream link seams. The
//! [`ProtocolSelector`] decides which strategy a session runs on;
//! [`build_transport`] wires the chosen strategy to real sockets.
//!
//! [`Protocol`]: pulselink_core::Protocol

mod datagram;
mod error;
mod link;
mod selector;
mod stream;
mod transport;
mod types;
mod wire;

pub use pulselink_core::Protocol;

pub use datagram::{
    DatagramTransport, EncryptedStreamTransport, LowLatencyOrderedTransport, PeerChannelTransport,
};
pub use error::{TransportError, TransportResult};
pub use link::{DatagramLink, StreamLink, TcpLink, UdpLink};
pub use selector::{ProtocolSelector, SelectionRequest};
pub use stream::{BroadcastTransport, ReliableStreamTransport};
pub use transport::{Transport, build_transport};
pub use types::{RetryPolicy, TransportHealth, TransportOptions};
pub use wire::{FLAG_ENCRYPTED, FLAG_PRIORITY, WireFrame};
