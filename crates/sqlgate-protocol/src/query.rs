//! Query request model and SQL builders.
//!
//! A [`QueryRequest`] describes a query in parts; the builders join them into
//! a SQL string with `?` placeholders. Arguments are always bound
//! positionally by the executor, never interpolated.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Parameters;
use crate::error::{ProtocolError, Result};

/// Parameters of the database commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// SELECT columns for reads, assigned columns for writes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    pub tables: Vec<String>,
    /// WHERE clause without the keyword.
    #[serde(rename = "where", default, skip_serializing_if = "String::is_empty")]
    pub where_clause: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
}

/// An argument ready to be bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    Bytes(Vec<u8>),
}

impl QueryRequest {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = where_clause.into();
        self
    }

    pub fn arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Arguments as given.
    pub fn plain_arguments(&self) -> Vec<Argument> {
        self.arguments.iter().cloned().map(Argument::Value).collect()
    }

    /// Arguments a read binds. A read without a where clause has no
    /// placeholders, so nothing is bound.
    pub fn select_arguments(&self) -> Vec<Argument> {
        if self.where_clause.is_empty() {
            return Vec::new();
        }
        self.plain_arguments()
    }

    /// Arguments with padded base64 strings decoded into bytes.
    ///
    /// Writers send binary columns as standard base64 ending in `=`. A string
    /// that ends in `=` but does not decode is bound as text.
    pub fn byte_arguments(&self) -> Vec<Argument> {
        self.arguments
            .iter()
            .map(|arg| match arg {
                Value::String(s) if s.ends_with('=') => match STANDARD.decode(s) {
                    Ok(bytes) => Argument::Bytes(bytes),
                    Err(_) => Argument::Value(arg.clone()),
                },
                other => Argument::Value(other.clone()),
            })
            .collect()
    }

    pub fn build_select(&self) -> Result<String> {
        self.require_tables()?;
        if !self.where_clause.is_empty() && self.arguments.is_empty() {
            return Err(invalid("missing arguments for the where clause"));
        }

        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.join(", ")
        };
        let where_clause = if self.where_clause.is_empty() {
            "1"
        } else {
            self.where_clause.as_str()
        };
        Ok(format!(
            "SELECT {} FROM {} WHERE {}",
            fields,
            self.tables.join(", "),
            where_clause
        ))
    }

    pub fn build_select_row(&self) -> Result<String> {
        Ok(format!("{} LIMIT 1", self.build_select()?))
    }

    pub fn build_exist(&self) -> Result<String> {
        if self.arguments.is_empty() {
            return Err(invalid("missing arguments parameter"));
        }
        self.require_tables()?;
        self.require_where("missing where parameter")?;
        Ok(format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            self.tables.join(", "),
            self.where_clause
        ))
    }

    pub fn build_insert(&self) -> Result<String> {
        self.require_fields()?;
        self.require_tables()?;
        if self.tables.len() != 1 {
            return Err(invalid("insert requires exactly one table"));
        }
        if self.arguments.len() != self.fields.len() {
            return Err(invalid("arguments to pass in insert clause mismatch"));
        }

        let placeholders = vec!["?"; self.fields.len()].join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.tables[0],
            self.fields.join(", "),
            placeholders
        ))
    }

    pub fn build_update(&self) -> Result<String> {
        self.require_fields()?;
        self.require_tables()?;
        if self.arguments.is_empty() {
            return Err(invalid("missing arguments parameter"));
        }
        self.require_where("missing where parameter, updating all rows is prohibited")?;

        let assignments = self
            .fields
            .iter()
            .map(|field| format!("{} = ?", field))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            self.tables.join(", "),
            assignments,
            self.where_clause
        ))
    }

    pub fn build_delete(&self) -> Result<String> {
        self.require_tables()?;
        self.require_where("missing where parameter, deleting all rows is prohibited")?;
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            self.tables.join(", "),
            self.where_clause
        ))
    }

    fn require_tables(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(invalid("missing tables parameter"));
        }
        Ok(())
    }

    fn require_fields(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(invalid("missing fields parameter"));
        }
        Ok(())
    }

    fn require_where(&self, message: &str) -> Result<()> {
        if self.where_clause.trim().is_empty() {
            return Err(invalid(message));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ProtocolError {
    ProtocolError::InvalidQuery(message.to_string())
}

/// Reply parameters of `select-row`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectRowReply {
    pub outputs: Parameters,
}

/// Reply parameters of `select`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectAllReply {
    pub rows: Vec<Parameters>,
}

/// Reply parameters of `exist`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistReply {
    pub exist: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertReply {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReply {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReply {}
