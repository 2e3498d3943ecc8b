//! JSON validation.
//!
//! XML validation is delegated to xmllint (see [`crate::tools`]); JSON input
//! is checked in-process: well-formedness with `serde_json`, and schema
//! conformance with `jsonschema` when a schema is supplied. The draft is
//! picked from the schema's `$schema` keyword.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use xmlgate::validation::validate;
//!
//! let schema = json!({
//!     "type": "object",
//!     "required": ["name"],
//!     "properties": { "name": { "type": "string" } }
//! });
//!
//! assert!(validate(&schema, &json!({ "name": "test" })).unwrap().is_ok());
//! assert!(validate(&schema, &json!({ "age": 42 })).unwrap().is_err());
//! ```

use serde_json::Value;

/// Outcome of checking one document.
pub type Verdict = Result<(), Vec<String>>;

/// Validate `data` against `schema`.
///
/// The outer `Err` means the schema itself is unusable; the inner
/// [`Verdict`] lists the document's violations.
pub fn validate(schema: &Value, data: &Value) -> Result<Verdict, String> {
    let validator = jsonschema::validator_for(schema).map_err(|e| format!("Invalid schema: {}", e))?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    Ok(if errors.is_empty() { Ok(()) } else { Err(errors) })
}

/// Check JSON text, optionally against a schema.
pub fn validate_json_text(content: &str, schema: Option<&Value>) -> Result<Verdict, String> {
    let data: Value = match serde_json::from_str(content) {
        Ok(data) => data,
        Err(e) => return Ok(Err(vec![e.to_string()])),
    };

    match schema {
        Some(schema) => validate(schema, &data),
        None => Ok(Ok(())),
    }
}
