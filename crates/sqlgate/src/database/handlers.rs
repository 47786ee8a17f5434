//! Handlers for the database commands.

use async_trait::async_trait;
use sqlgate_protocol::{
    command, DeleteReply, ExistReply, InsertReply, QueryRequest, Reply, Request, SelectAllReply,
    SelectRowReply, UpdateReply,
};

use super::handle::{Connector, SharedHandle};
use super::QueryExecutor;
use crate::dispatcher::{CommandHandler, Dispatcher};

pub const NOT_FOUND: &str = "not found";
pub const NOTHING_WRITTEN: &str = "no rows were inserted or updated";
pub const NOTHING_DELETED: &str = "no rows were deleted";

/// The query a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    SelectRow,
    SelectAll,
    Exist,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    pub const ALL: [QueryKind; 6] = [
        QueryKind::SelectRow,
        QueryKind::SelectAll,
        QueryKind::Exist,
        QueryKind::Insert,
        QueryKind::Update,
        QueryKind::Delete,
    ];

    pub fn command(self) -> &'static str {
        match self {
            QueryKind::SelectRow => command::SELECT_ROW,
            QueryKind::SelectAll => command::SELECT_ALL,
            QueryKind::Exist => command::EXIST,
            QueryKind::Insert => command::INSERT,
            QueryKind::Update => command::UPDATE,
            QueryKind::Delete => command::DELETE,
        }
    }
}

/// Runs one kind of query against the handle's current connection.
#[derive(Debug, Clone, Copy)]
pub struct QueryHandler {
    kind: QueryKind,
}

impl QueryHandler {
    pub fn new(kind: QueryKind) -> Self {
        Self { kind }
    }

    async fn run<E: QueryExecutor>(
        &self,
        request: &Request,
        connection: E,
    ) -> Result<Reply, String> {
        let query: QueryRequest = request
            .decode_parameters()
            .map_err(|e| format!("parameter validation: {}", e))?;

        match self.kind {
            QueryKind::SelectRow => {
                let sql = query.build_select_row().map_err(|e| e.to_string())?;
                let mut rows = fetch(&connection, &sql, &query).await?;
                if rows.is_empty() {
                    return Err(NOT_FOUND.to_string());
                }
                encode(&SelectRowReply {
                    outputs: rows.swap_remove(0),
                })
            }
            QueryKind::SelectAll => {
                let sql = query.build_select().map_err(|e| e.to_string())?;
                let rows = fetch(&connection, &sql, &query).await?;
                encode(&SelectAllReply { rows })
            }
            QueryKind::Exist => {
                let sql = query.build_exist().map_err(|e| e.to_string())?;
                let rows = fetch(&connection, &sql, &query).await?;
                encode(&ExistReply {
                    exist: !rows.is_empty(),
                })
            }
            QueryKind::Insert => {
                let sql = query.build_insert().map_err(|e| e.to_string())?;
                write(&connection, &sql, &query, NOTHING_WRITTEN).await?;
                encode(&InsertReply {})
            }
            QueryKind::Update => {
                let sql = query.build_update().map_err(|e| e.to_string())?;
                write(&connection, &sql, &query, NOTHING_WRITTEN).await?;
                encode(&UpdateReply {})
            }
            QueryKind::Delete => {
                let sql = query.build_delete().map_err(|e| e.to_string())?;
                let affected = connection
                    .execute(&sql, query.plain_arguments())
                    .await
                    .map_err(|e| e.to_string())?;
                if affected == 0 {
                    return Err(NOTHING_DELETED.to_string());
                }
                encode(&DeleteReply {})
            }
        }
    }
}

async fn fetch<E: QueryExecutor>(
    connection: &E,
    sql: &str,
    query: &QueryRequest,
) -> Result<Vec<sqlgate_protocol::Parameters>, String> {
    debug!("Executing query: {}", sql);
    connection
        .fetch(sql, query.select_arguments())
        .await
        .map_err(|e| e.to_string())
}

/// Insert or update with base64 arguments decoded to bytes.
async fn write<E: QueryExecutor>(
    connection: &E,
    sql: &str,
    query: &QueryRequest,
    nothing_changed: &str,
) -> Result<(), String> {
    debug!("Executing statement: {}", sql);
    let affected = connection
        .execute(sql, query.byte_arguments())
        .await
        .map_err(|e| e.to_string())?;
    if affected == 0 {
        return Err(nothing_changed.to_string());
    }
    Ok(())
}

fn encode<T: serde::Serialize>(reply: &T) -> Result<Reply, String> {
    Reply::from_serializable(reply).map_err(|e| e.to_string())
}

#[async_trait]
impl<K> CommandHandler<SharedHandle<K>> for QueryHandler
where
    K: Connector,
    K::Connection: QueryExecutor,
{
    async fn handle(&self, request: &Request, handle: &SharedHandle<K>) -> Reply {
        let connection = match handle.connection().await {
            Ok(connection) => connection,
            Err(e) => return Reply::fail(e.to_string()),
        };
        match self.run(request, connection).await {
            Ok(reply) => reply,
            Err(message) => Reply::fail(message),
        }
    }
}

/// Register every database command on `dispatcher`.
pub fn register_database_commands<K>(dispatcher: &mut Dispatcher<SharedHandle<K>>)
where
    K: Connector,
    K::Connection: QueryExecutor,
{
    for kind in QueryKind::ALL {
        dispatcher.register_command(kind.command(), QueryHandler::new(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_database_command_has_a_kind() {
        let commands: Vec<&str> = QueryKind::ALL.iter().map(|k| k.command()).collect();
        assert_eq!(commands, command::DATABASE_COMMANDS);
    }
}
