//! HTTP API module.
//!
//! Router, handlers, wire types and the log stream.

pub mod handlers;
pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
