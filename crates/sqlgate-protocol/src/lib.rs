//! Wire types shared by sqlgate services and their clients.
//!
//! - [`Request`] / [`Reply`]: the JSON command envelope
//! - [`command`]: command names served by the database gateway
//! - [`QueryRequest`]: query parameters and SQL builders

pub mod command;
pub mod envelope;
pub mod error;
pub mod query;

pub use envelope::{Parameters, Reply, Request, Status};
pub use error::{ProtocolError, Result};
pub use query::{
    Argument, DeleteReply, ExistReply, InsertReply, QueryRequest, SelectAllReply, SelectRowReply,
    UpdateReply,
};
