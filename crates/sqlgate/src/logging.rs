//! Logging macros that pin the target to "sqlgate" for all log calls.
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g. "sqlgate::database::handle"). A single target keeps filter
//! directives like `RUST_LOG=sqlgate=debug` working for the whole crate.

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "sqlgate", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "sqlgate", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "sqlgate", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!(target: "sqlgate", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!(target: "sqlgate", $($arg)*) };
}
