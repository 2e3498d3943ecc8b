//! Request and response bodies for the operation endpoints.
//!
//! All field names are camelCase on the wire. Every operation request also
//! accepts the output fields of [`OutputOptions`] (`outputDir`,
//! `outputName`, `viaUrl`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::paths::OutputOptions;

/// `POST /api/extract`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractRequest {
    pub file_path: String,
    pub xpath: String,
    #[serde(flatten)]
    pub output: OutputOptions,
}

/// `POST /api/validate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateRequest {
    pub file_path: String,
    /// `.xsd`, `.rng` or `.dtd` for XML input, `.json` for JSON input
    pub schema_path: Option<String>,
    /// Validate against the document's own DTD
    pub dtd: bool,
}

/// `POST /api/transform`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformRequest {
    pub file_path: String,
    pub stylesheet_path: String,
    /// Passed as `--stringparam name value`
    pub params: BTreeMap<String, String>,
    #[serde(flatten)]
    pub output: OutputOptions,
}

/// `POST /api/format`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatRequest {
    pub file_path: String,
    pub indent: Option<u8>,
    #[serde(flatten)]
    pub output: OutputOptions,
}

/// `POST /api/strip-dtd` and `POST /api/repair`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileRequest {
    pub file_path: String,
    #[serde(flatten)]
    pub output: OutputOptions,
}

/// `POST /api/convert`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertRequest {
    pub file_path: String,
    /// Wrapper element for JSON without a single root key
    pub root: Option<String>,
    /// Indent XML output (default true)
    pub pretty: Option<bool>,
    #[serde(flatten)]
    pub output: OutputOptions,
}

/// Response of every operation except validate.
///
/// Either `result` (inline) or `file` (+ `url` for downloads) is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Repair only: whether the tool changed anything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

impl OperationResponse {
    pub fn inline(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn written(file: &Path, url: Option<String>) -> Self {
        Self {
            file: Some(file.display().to_string()),
            url,
            ..Default::default()
        }
    }

    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = Some(changed);
        self
    }
}

/// `POST /api/validate` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Which engine judged the file
    pub validator: String,
}
