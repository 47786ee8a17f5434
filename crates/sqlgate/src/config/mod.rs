//! Configuration module for sqlgate
//!
//! Configuration comes from an optional YAML file, then `SDS_*` environment
//! variables override individual values:
//!
//! ```yaml
//! service:
//!   url: "tcp://127.0.0.1:8002"
//! database:
//!   host: "localhost"
//!   port: 3306
//!   name: "seascape_sds"
//!   timeout_secs: 10
//! ```

mod loader;
mod types;

pub use loader::{apply_env_overrides, load_config, load_config_from_env, load_config_from_str};
pub use types::*;
