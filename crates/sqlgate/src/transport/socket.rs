//! Server and client sockets.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::tcp::{self, FramedStream};
use super::{Context, Endpoint, Incoming, Metadata, SocketKind, QUEUE_CAPACITY};
use crate::error::TransportError;

/// Keeps an endpoint bound for as long as the owning socket lives.
enum Binding {
    Inproc { context: Context, name: String },
    Tcp { accept: JoinHandle<()>, local_addr: SocketAddr },
}

impl Binding {
    async fn bind(
        context: &Context,
        endpoint: &Endpoint,
        kind: SocketKind,
    ) -> Result<(Self, mpsc::Receiver<Incoming>), TransportError> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let binding = match endpoint {
            Endpoint::Inproc(name) => {
                context.register(name, kind, tx)?;
                Binding::Inproc {
                    context: context.clone(),
                    name: name.clone(),
                }
            }
            Endpoint::Tcp(addr) => {
                let listener = tcp::listen(addr).await?;
                let local_addr = listener.local_addr()?;
                let accept = tokio::spawn(tcp::accept_loop(listener, kind, tx));
                Binding::Tcp { accept, local_addr }
            }
        };
        Ok((binding, rx))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Binding::Inproc { .. } => None,
            Binding::Tcp { local_addr, .. } => Some(*local_addr),
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        match self {
            Binding::Inproc { context, name } => context.unregister(name),
            Binding::Tcp { accept, .. } => accept.abort(),
        }
    }
}

/// Duplex server socket: every received request expects one reply.
pub struct ReplySocket {
    endpoint: Endpoint,
    queue: mpsc::Receiver<Incoming>,
    pending: Option<oneshot::Sender<Bytes>>,
    binding: Binding,
}

impl ReplySocket {
    pub async fn bind(context: &Context, endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let (binding, queue) = Binding::bind(context, &endpoint, SocketKind::Reply).await?;
        info!("Reply socket bound to {}", endpoint);
        Ok(Self {
            endpoint,
            queue,
            pending: None,
            binding,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Address the TCP listener is bound to, useful after binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.binding.local_addr()
    }

    /// Wait for the next request.
    ///
    /// A request left unanswered is abandoned when the next one arrives.
    pub async fn recv(&mut self) -> Result<(Bytes, Metadata), TransportError> {
        let incoming = self.queue.recv().await.ok_or(TransportError::Closed)?;
        self.pending = incoming.reply_to;
        Ok((incoming.payload, incoming.metadata))
    }

    /// Answer the last received request.
    pub fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let reply_to = self.pending.take().ok_or(TransportError::NoPendingRequest)?;
        if reply_to.send(payload).is_err() {
            warn!("Peer on {} went away before the reply was sent", self.endpoint);
        }
        Ok(())
    }
}

/// One-way server socket.
pub struct PullSocket {
    endpoint: Endpoint,
    queue: mpsc::Receiver<Incoming>,
    binding: Binding,
}

impl PullSocket {
    pub async fn bind(context: &Context, endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let (binding, queue) = Binding::bind(context, &endpoint, SocketKind::Pull).await?;
        info!("Pull socket bound to {}", endpoint);
        Ok(Self {
            endpoint,
            queue,
            binding,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.binding.local_addr()
    }

    pub async fn recv(&mut self) -> Result<(Bytes, Metadata), TransportError> {
        let incoming = self.queue.recv().await.ok_or(TransportError::Closed)?;
        Ok((incoming.payload, incoming.metadata))
    }
}

enum Client {
    Tcp(FramedStream),
    Inproc {
        queue: mpsc::Sender<Incoming>,
        identity: Option<String>,
    },
}

impl Client {
    async fn connect(
        context: &Context,
        endpoint: &Endpoint,
        kind: SocketKind,
        identity: Option<String>,
    ) -> Result<Self, TransportError> {
        match endpoint {
            Endpoint::Inproc(name) => Ok(Client::Inproc {
                queue: context.lookup(name, kind)?,
                identity,
            }),
            Endpoint::Tcp(addr) => {
                if identity.is_some() {
                    debug!("Identity is not carried over TCP, {} will see none", endpoint);
                }
                Ok(Client::Tcp(tcp::connect(addr).await?))
            }
        }
    }

    fn metadata(identity: &Option<String>) -> Metadata {
        Metadata {
            identity: identity.clone(),
            peer: None,
        }
    }
}

/// Client for a [`ReplySocket`].
pub struct RequestSocket {
    endpoint: Endpoint,
    client: Client,
}

impl RequestSocket {
    pub async fn connect(context: &Context, endpoint: &str) -> Result<Self, TransportError> {
        Self::connect_inner(context, endpoint, None).await
    }

    /// Connect and attach `identity` to every request (in-process only).
    pub async fn connect_with_identity(
        context: &Context,
        endpoint: &str,
        identity: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Self::connect_inner(context, endpoint, Some(identity.into())).await
    }

    async fn connect_inner(
        context: &Context,
        endpoint: &str,
        identity: Option<String>,
    ) -> Result<Self, TransportError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let client = Client::connect(context, &endpoint, SocketKind::Reply, identity).await?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one request and wait for its reply.
    pub async fn request(&mut self, payload: Bytes) -> Result<Bytes, TransportError> {
        match &mut self.client {
            Client::Tcp(framed) => {
                framed.send(payload).await?;
                match framed.next().await {
                    Some(frame) => Ok(frame?.freeze()),
                    None => Err(TransportError::Closed),
                }
            }
            Client::Inproc { queue, identity } => {
                let (incoming, reply) = Incoming::duplex(payload, Client::metadata(identity));
                queue
                    .send(incoming)
                    .await
                    .map_err(|_| TransportError::Closed)?;
                reply.await.map_err(|_| TransportError::Closed)
            }
        }
    }
}

/// Client for a [`PullSocket`].
pub struct PushSocket {
    endpoint: Endpoint,
    client: Client,
}

impl PushSocket {
    pub async fn connect(context: &Context, endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let client = Client::connect(context, &endpoint, SocketKind::Pull, None).await?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Queue one message. Returns once the receiver's queue accepted it.
    pub async fn push(&mut self, payload: Bytes) -> Result<(), TransportError> {
        match &mut self.client {
            Client::Tcp(framed) => Ok(framed.send(payload).await?),
            Client::Inproc { queue, identity } => queue
                .send(Incoming::one_way(payload, Client::metadata(identity)))
                .await
                .map_err(|_| TransportError::Closed),
        }
    }
}
