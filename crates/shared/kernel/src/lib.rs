//! Kernel utilities shared across slices.
//! Keep this crate lightweight: config loading, the error taxonomy every service
//! reports in, and the request context that carries the caller and its database scope.
//!
//! ## Config loading
//! ```rust,no_run
//! use keeper_kernel::config::load_config;
//! use keeper_kernel::domain::config::ApiConfig;
//!
//! let cfg: ApiConfig = load_config(Some("keeper.toml")).unwrap_or_default();
//! ```
pub mod config;
mod context;
mod error;
#[cfg(feature = "server")]
pub mod server;

pub use context::RequestContext;
pub use error::{ErrorKind, KeeperError, KeeperErrorExt};
pub use keeper_domain as domain;
