//! Endpoint addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// A parsed `tcp://host:port` or `inproc://name` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `host:port`, passed to the socket layer unchanged
    Tcp(String),
    /// Name registered in a [`Context`](super::Context)
    Inproc(String),
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidEndpoint(raw.to_string());

        if let Some(addr) = raw.strip_prefix("tcp://") {
            let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(invalid());
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        if let Some(name) = raw.strip_prefix("inproc://") {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(invalid());
            }
            return Ok(Endpoint::Inproc(name.to_string()));
        }
        Err(invalid())
    }

    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}
