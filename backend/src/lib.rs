//! # xmlgate - HTTP gateway for XML and JSON tooling
//!
//! xmlgate accepts JSON requests naming a file and an operation, runs the
//! matching command-line tool (or library call) against it, and returns the
//! result inline or as a saved file with a download link.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │ request  │──▶│   gate   │──▶│   paths    │──▶│ tools /      │──▶│  deliver   │
//! │  (JSON)  │   │ (key/use)│   │ (rewrite)  │   │ convert      │   │ inline/file│
//! └──────────┘   └──────────┘   └────────────┘   └──────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per concern
//! - [`config`] - Environment configuration
//! - [`paths`] - Client path rewriting and output destinations
//! - [`tools`] - xmlstarlet / xmllint / xsltproc / jsonrepair invocation
//! - [`convert`] - XML <-> JSON conversion
//! - [`validation`] - JSON schema validation
//! - [`gate`] - Free usage / API key middleware
//! - [`version`] - version.json bookkeeping
//! - [`api`] - HTTP API server

pub mod error;
pub mod config;

pub mod paths;
pub mod tools;
pub mod convert;
pub mod validation;

pub mod gate;
pub mod version;

pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{
    ConfigError, ConvertError, GateError, PathError, ServerError, ToolError, VersionError,
};

pub use config::{Config, ToolPaths};

pub use paths::{
    deliver, require_kind, resolve_output, transform_path, Delivered, FileKind, OutputOptions,
    OutputTarget,
};

pub use tools::{SchemaFlavor, ToolOutput, ToolRunner};

pub use convert::{json_to_xml, pretty_json, xml_to_json, XmlOptions};

pub use gate::{GateDecision, UsageGate};

pub use version::{bump_minor, bump_version_file, VersionFile};

pub use api::{router, AppState, OperationResponse, ValidateResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
