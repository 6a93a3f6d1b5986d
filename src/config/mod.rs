//! Configuration management
//!
//! Dispatch settings are read with figment from, in increasing priority:
//! the embedded defaults, a `bpc.toml` file, and `BPC_*` environment
//! variables (`BPC_JOBS`, `BPC_SHARED`, `BPC_PARALLEL`). Boolean values accept
//! the same vocabulary as [`parse_boolean_state`](crate::options::parse_boolean_state).

pub mod core;
mod de;

pub use self::core::{CONFIG_FILE, DispatchConfig, ENV_PREFIX};
