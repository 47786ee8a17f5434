//! Command dispatcher.
//!
//! A [`Dispatcher`] owns one bound [`Channel`] and a [`HandlerTable`]. Handlers
//! are registered with `&mut self` and [`Dispatcher::serve`] consumes the
//! dispatcher, so the table cannot change while requests are served.
//!
//! The loop handles one message at a time:
//!
//! 1. receive; a receive failure ends the loop with an error
//! 2. parse; a malformed request gets a FAIL reply
//! 3. attach the transport identity
//! 4. look up the command; an unknown command gets a FAIL reply
//! 5. run the handler inside a `request` span and send its reply
//!
//! One-way channels skip the reply and log failed commands instead. Sending a
//! reply on a duplex channel can fail; that also ends the loop.

mod handler;

pub use handler::{CommandHandler, HandlerTable};

use bytes::Bytes;
use futures::FutureExt;
use sqlgate_protocol::{Reply, Request};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

use crate::error::{GatewayError, Result, TransportError};
use crate::transport::{Context, Endpoint, Metadata, PullSocket, ReplySocket};

/// Sent when a reply cannot be encoded.
const ENCODE_FAILURE: &[u8] =
    br#"{"status":"FAIL","message":"failed to encode the reply","parameters":{}}"#;

/// A bound endpoint, duplex or one-way.
pub enum Channel {
    /// Every request is answered
    Duplex(ReplySocket),
    /// Requests are consumed without a reply
    OneWay(PullSocket),
}

impl Channel {
    pub fn is_one_way(&self) -> bool {
        matches!(self, Channel::OneWay(_))
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Channel::Duplex(socket) => socket.endpoint(),
            Channel::OneWay(socket) => socket.endpoint(),
        }
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Channel::Duplex(socket) => socket.local_addr(),
            Channel::OneWay(socket) => socket.local_addr(),
        }
    }

    async fn recv(&mut self) -> std::result::Result<(Bytes, Metadata), TransportError> {
        match self {
            Channel::Duplex(socket) => socket.recv().await,
            Channel::OneWay(socket) => socket.recv().await,
        }
    }

    fn reply(&mut self, reply: &Reply) -> std::result::Result<(), TransportError> {
        match self {
            Channel::Duplex(socket) => socket.send(encode(reply)),
            Channel::OneWay(_) => Ok(()),
        }
    }
}

/// Routes requests received on one channel to registered handlers.
pub struct Dispatcher<C> {
    name: String,
    channel: Channel,
    handlers: HandlerTable<C>,
}

impl<C> Dispatcher<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, channel: Channel) -> Self {
        Self {
            name: name.into(),
            channel,
            handlers: HandlerTable::new(),
        }
    }

    /// Bind a duplex dispatcher. `name` labels logs and spans.
    pub async fn bind_reply(context: &Context, name: &str, endpoint: &str) -> Result<Self> {
        let socket = ReplySocket::bind(context, endpoint).await?;
        Ok(Self::new(name, Channel::Duplex(socket)))
    }

    /// Bind a one-way dispatcher.
    pub async fn bind_pull(context: &Context, name: &str, endpoint: &str) -> Result<Self> {
        let socket = PullSocket::bind(context, endpoint).await?;
        Ok(Self::new(name, Channel::OneWay(socket)))
    }

    pub fn register_command<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: CommandHandler<C> + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Arc::new(handler)) {
            warn!("{}: handler for command {} replaced", self.name, name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn handlers(&self) -> &HandlerTable<C> {
        &self.handlers
    }

    /// Serve requests until the transport fails.
    pub async fn serve(mut self, context: C) -> Result<()> {
        info!(
            "{} dispatcher serving {:?} on {}",
            self.name,
            self.handlers.names(),
            self.channel.endpoint()
        );

        loop {
            let (payload, metadata) = match self.channel.recv().await {
                Ok(message) => message,
                Err(e) => {
                    error!("{} dispatcher failed to receive: {}", self.name, e);
                    let reply = Reply::fail(format!("failed to receive the message: {}", e));
                    if let Err(reply_err) = self.channel.reply(&reply) {
                        debug!("Receive failure was not reported: {}", reply_err);
                    }
                    return Err(e.into());
                }
            };

            let request = match Request::parse(&payload) {
                Ok(request) => request.with_identity(metadata.identity),
                Err(e) => {
                    debug!(
                        "{}: malformed request from {:?}: {}",
                        self.name, metadata.peer, e
                    );
                    self.respond(None, &Reply::fail(e.to_string()))?;
                    continue;
                }
            };

            let Some(handler) = self.handlers.get(request.command()).cloned() else {
                let reply = Reply::fail(format!(
                    "handler not found for command: {}",
                    request.command()
                ));
                self.respond(Some(&request), &reply)?;
                continue;
            };

            let span = tracing::info_span!(
                target: "sqlgate",
                "request",
                service = %self.name,
                command = %request.command()
            );
            let reply = match AssertUnwindSafe(handler.handle(&request, &context))
                .catch_unwind()
                .instrument(span)
                .await
            {
                Ok(reply) => reply,
                Err(_) => {
                    error!("{}: handler for {} panicked", self.name, request.command());
                    Reply::fail(format!(
                        "handler for command {} panicked",
                        request.command()
                    ))
                }
            };

            self.respond(Some(&request), &reply)?;
        }
    }

    fn respond(&mut self, request: Option<&Request>, reply: &Reply) -> Result<()> {
        if !reply.is_ok() && self.channel.is_one_way() {
            // Parameter values may hold credentials, only their names are logged.
            let command = request.map(Request::command).unwrap_or("<malformed>");
            let names: Vec<&str> = request
                .map(|r| r.parameters().keys().map(String::as_str).collect())
                .unwrap_or_default();
            warn!(
                service = %self.name,
                command = %command,
                parameters = ?names,
                "Command failed: {}",
                reply.message()
            );
        }

        self.channel.reply(reply).map_err(|e| {
            error!("{} dispatcher failed to send the reply: {}", self.name, e);
            GatewayError::Transport(e)
        })
    }
}

fn encode(reply: &Reply) -> Bytes {
    match reply.to_bytes() {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            error!("Failed to encode reply: {}", e);
            Bytes::from_static(ENCODE_FAILURE)
        }
    }
}
