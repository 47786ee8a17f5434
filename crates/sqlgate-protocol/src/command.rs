//! Command names understood by the database service.

/// Pushed over the control channel with fresh database credentials.
pub const NEW_CREDENTIALS: &str = "new-credentials";
/// Fetch one row; FAIL when nothing matches.
pub const SELECT_ROW: &str = "select-row";
/// Fetch every matching row.
pub const SELECT_ALL: &str = "select";
/// Insert a new row.
pub const INSERT: &str = "insert";
/// Update existing rows.
pub const UPDATE: &str = "update";
/// Report whether the query matches any row.
pub const EXIST: &str = "exist";
/// Delete matching rows.
pub const DELETE: &str = "delete";

/// Commands served on the public database endpoint.
pub const DATABASE_COMMANDS: &[&str] = &[SELECT_ROW, SELECT_ALL, EXIST, INSERT, UPDATE, DELETE];
