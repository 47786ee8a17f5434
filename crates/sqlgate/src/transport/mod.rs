//! Message transport for services.
//!
//! Two socket pairs cover the two messaging patterns:
//!
//! - [`ReplySocket`] / [`RequestSocket`]: synchronous request and reply
//! - [`PullSocket`] / [`PushSocket`]: one-way delivery
//!
//! Each works over `tcp://host:port` (length-delimited frames with a 4 byte
//! big-endian length prefix) and `inproc://name` (channels registered in a
//! [`Context`]). Server sockets feed every accepted connection into one
//! bounded queue, so a receiver sees messages one at a time in arrival order.

mod endpoint;
mod inproc;
mod socket;
mod tcp;

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::oneshot;

pub use endpoint::Endpoint;
pub use inproc::Context;
pub use socket::{PullSocket, PushSocket, ReplySocket, RequestSocket};

/// Pending messages per server socket.
pub const QUEUE_CAPACITY: usize = 64;

/// Largest frame accepted over TCP.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// What the transport knows about the sender of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Identity attached by an in-process client. Always `None` over TCP.
    pub identity: Option<String>,
    /// Remote address of a TCP peer
    pub peer: Option<SocketAddr>,
}

/// Server socket flavour an endpoint is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Reply,
    Pull,
}

impl SocketKind {
    /// Name of the client socket that talks to this kind.
    pub(crate) fn peer_name(self) -> &'static str {
        match self {
            SocketKind::Reply => "request",
            SocketKind::Pull => "push",
        }
    }
}

/// A message waiting in a server socket queue.
pub(crate) struct Incoming {
    pub payload: Bytes,
    pub metadata: Metadata,
    pub reply_to: Option<oneshot::Sender<Bytes>>,
}

impl Incoming {
    pub fn one_way(payload: Bytes, metadata: Metadata) -> Self {
        Self {
            payload,
            metadata,
            reply_to: None,
        }
    }

    pub fn duplex(payload: Bytes, metadata: Metadata) -> (Self, oneshot::Receiver<Bytes>) {
        let (tx, rx) = oneshot::channel();
        let incoming = Self {
            payload,
            metadata,
            reply_to: Some(tx),
        };
        (incoming, rx)
    }
}
