//! Client for sqlgate services.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use sqlgate_protocol::{command, Parameters, QueryRequest, Reply, Request};

use crate::error::{GatewayError, Result};
use crate::transport::{Context, RequestSocket};

/// Sends commands to a duplex service endpoint and waits for replies.
pub struct ServiceClient {
    socket: RequestSocket,
}

impl ServiceClient {
    pub async fn connect(context: &Context, endpoint: &str) -> Result<Self> {
        Ok(Self {
            socket: RequestSocket::connect(context, endpoint).await?,
        })
    }

    /// Connect to an in-process endpoint and present `identity` with every request.
    pub async fn connect_with_identity(
        context: &Context,
        endpoint: &str,
        identity: &str,
    ) -> Result<Self> {
        Ok(Self {
            socket: RequestSocket::connect_with_identity(context, endpoint, identity).await?,
        })
    }

    /// Send a request and return the reply as received, OK or FAIL.
    pub async fn request(&mut self, command: &str, parameters: Parameters) -> Result<Reply> {
        let payload = Request::new(command, parameters).to_bytes()?;
        let raw = self.socket.request(Bytes::from(payload)).await?;
        Ok(Reply::parse(&raw)?)
    }

    /// Run a database command and decode its reply parameters.
    ///
    /// A FAIL reply becomes [`GatewayError::Query`] carrying its message.
    pub async fn query<T: DeserializeOwned>(
        &mut self,
        command: &str,
        query: &QueryRequest,
    ) -> Result<T> {
        let payload = Request::from_serializable(command, query)?.to_bytes()?;
        let raw = self.socket.request(Bytes::from(payload)).await?;
        let reply = Reply::parse(&raw)?;
        if !reply.is_ok() {
            return Err(GatewayError::Query(reply.message().to_string()));
        }
        Ok(reply.decode_parameters()?)
    }

    pub async fn select_row(&mut self, query: &QueryRequest) -> Result<Parameters> {
        let reply: sqlgate_protocol::SelectRowReply =
            self.query(command::SELECT_ROW, query).await?;
        Ok(reply.outputs)
    }

    pub async fn select(&mut self, query: &QueryRequest) -> Result<Vec<Parameters>> {
        let reply: sqlgate_protocol::SelectAllReply =
            self.query(command::SELECT_ALL, query).await?;
        Ok(reply.rows)
    }

    pub async fn exist(&mut self, query: &QueryRequest) -> Result<bool> {
        let reply: sqlgate_protocol::ExistReply = self.query(command::EXIST, query).await?;
        Ok(reply.exist)
    }
}
