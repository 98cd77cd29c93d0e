//! opsdeck-core — shared building blocks for the opsdeck console.
//!
//! Everything here is synchronous and file-backed. Higher crates
//! (`opsdeck-probe`, `opsdeck-alert`, `opsdeck-action`) read the
//! deployment state through these helpers on every call so that edits
//! made by hand take effect without a restart.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   deploy/docker-compose.home.yml   compose file (required)
//!   deploy/.env.home                 deployment env (ports, hostnames, tunnel mode)
//!   .opsdeck_runtime/                pid files, logs, alert state, alerts env
//!   frontend/                        mobile preview helper state
//! ```

pub mod bootstrap;
pub mod env;
pub mod error;
pub mod humanize;
pub mod layout;
pub mod reply;
pub mod settings;

pub use env::{EnvMap, env_bool, env_int, env_str, parse_hhmm, parse_port, read_env_file, upsert_env_key};
pub use error::{CoreError, CoreResult};
pub use humanize::{humanize_error, humanize_git_error};
pub use layout::Layout;
pub use reply::OpsReply;
pub use settings::{HomeSettings, TunnelMode};

/// Product name used in notification titles and commit messages.
pub const PRODUCT: &str = "opsdeck";
