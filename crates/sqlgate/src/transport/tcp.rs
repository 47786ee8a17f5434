//! TCP listener and framing.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::{Incoming, Metadata, SocketKind, MAX_FRAME_LENGTH};
use crate::error::TransportError;

pub(crate) type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

pub(crate) fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub(crate) async fn listen(addr: &str) -> Result<TcpListener, TransportError> {
    TcpListener::bind(addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AddrInUse => TransportError::AddressInUse(format!("tcp://{}", addr)),
        _ => TransportError::Io(e),
    })
}

pub(crate) async fn connect(addr: &str) -> Result<FramedStream, TransportError> {
    let stream = TcpStream::connect(addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            TransportError::ConnectionRefused(format!("tcp://{}", addr))
        }
        _ => TransportError::Io(e),
    })?;
    stream.set_nodelay(true)?;
    Ok(Framed::new(stream, codec()))
}

/// Accept connections until the socket owning `queue` goes away.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    kind: SocketKind,
    queue: mpsc::Sender<Incoming>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }
                    tokio::spawn(serve_connection(stream, peer, kind, queue.clone()));
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = queue.closed() => break,
        }
    }
    debug!("TCP accept loop stopped");
}

/// Forward frames from one peer. On a reply socket the next frame is not
/// read until the reply to the previous one was written.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    kind: SocketKind,
    queue: mpsc::Sender<Incoming>,
) {
    let mut framed = Framed::new(stream, codec());

    while let Some(frame) = framed.next().await {
        let payload = match frame {
            Ok(frame) => frame.freeze(),
            Err(e) => {
                warn!("Connection from {} error: {}", peer, e);
                break;
            }
        };
        let metadata = Metadata {
            identity: None,
            peer: Some(peer),
        };

        match kind {
            SocketKind::Pull => {
                if queue.send(Incoming::one_way(payload, metadata)).await.is_err() {
                    break;
                }
            }
            SocketKind::Reply => {
                let (incoming, reply) = Incoming::duplex(payload, metadata);
                if queue.send(incoming).await.is_err() {
                    break;
                }
                let Ok(reply) = reply.await else {
                    debug!("Request from {} was dropped without a reply", peer);
                    break;
                };
                if let Err(e) = framed.send(reply).await {
                    warn!("Failed to send reply to {}: {}", peer, e);
                    break;
                }
            }
        }
    }

    debug!("Connection from {} closed", peer);
}
