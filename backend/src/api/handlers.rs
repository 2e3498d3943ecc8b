//! Operation handlers.
//!
//! Each handler follows the same four steps: rewrite the client path,
//! check extensions, run one tool or library call, then answer inline or
//! write the result where the request asked.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::logs::{log_error, log_info, log_success};
use super::server::AppState;
use super::types::{
    ConvertRequest, ExtractRequest, FileRequest, FormatRequest, OperationResponse, TransformRequest,
    ValidateRequest, ValidateResponse,
};
use crate::config::Config;
use crate::convert::{is_xml_name, json_to_xml, pretty_json, xml_to_json, XmlOptions};
use crate::error::{ConvertError, PathError, ServerError, ServerResult};
use crate::paths::{deliver, require_kind, resolve_output, transform_path, Delivered, FileKind, OutputTarget};
use crate::tools::SchemaFlavor;
use crate::validation::validate_json_text;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

fn require_fields(fields: &[&str], message: &str) -> ServerResult<()> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        Err(ServerError::BadRequest(message.to_string()))
    } else {
        Ok(())
    }
}

/// Rewrite, check the kind, and make sure the file exists.
async fn existing_file(config: &Config, client_path: &str, allowed: &[FileKind]) -> ServerResult<(PathBuf, FileKind)> {
    let path = transform_path(config, client_path)?;
    let kind = require_kind(&path, allowed)?;
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok((path, kind)),
        _ => Err(ServerError::NotFound(client_path.trim().to_string())),
    }
}

/// Send `content` to `target`; `inline` is what goes in the body otherwise.
async fn respond(target: &OutputTarget, content: &str, inline: Value) -> ServerResult<OperationResponse> {
    match deliver(target, content).await? {
        Delivered::Inline => Ok(OperationResponse::inline(inline)),
        Delivered::Written { file, url } => {
            log_success(format!("Wrote {}", file.display()));
            Ok(OperationResponse::written(&file, url))
        }
    }
}

fn report<T>(operation: &str, result: ServerResult<T>) -> ServerResult<T> {
    if let Err(ref e) = result {
        log_error(format!("{} failed: {}", operation, e));
    }
    result
}

// =============================================================================
// Extract
// =============================================================================

pub async fn extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> ServerResult<Json<OperationResponse>> {
    report("extract", run_extract(&state, body(payload)?).await).map(Json)
}

async fn run_extract(state: &AppState, request: ExtractRequest) -> ServerResult<OperationResponse> {
    require_fields(&[request.file_path.as_str(), request.xpath.as_str()], "filePath and xpath are required.")?;
    if request.xpath.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err(ServerError::BadRequest("xpath contains control characters.".to_string()));
    }

    let (file, _) = existing_file(&state.config, &request.file_path, &[FileKind::Xml]).await?;
    let target = resolve_output(&state.config, &file, &request.output, "extract", "txt")?;
    log_info(format!("extract {} from {}", request.xpath, file.display()));

    let result = state.tools.extract(&file, &request.xpath).await?;
    respond(&target, &result, Value::String(result.clone())).await
}

// =============================================================================
// Validate
// =============================================================================

pub async fn validate(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> ServerResult<Json<ValidateResponse>> {
    report("validate", run_validate(&state, body(payload)?).await).map(Json)
}

async fn run_validate(state: &AppState, request: ValidateRequest) -> ServerResult<ValidateResponse> {
    require_fields(&[request.file_path.as_str()], "filePath is required.")?;

    let schema_path = request.schema_path.as_deref().filter(|s| !s.trim().is_empty());
    if schema_path.is_some() && request.dtd {
        return Err(ServerError::BadRequest("Use either schemaPath or dtd, not both.".to_string()));
    }

    let (file, kind) = existing_file(&state.config, &request.file_path, &[FileKind::Xml, FileKind::Json]).await?;
    log_info(format!("validate {}", file.display()));

    let response = match kind {
        FileKind::Json => {
            let schema = match schema_path {
                Some(client) => {
                    let (path, _) = existing_file(&state.config, client, &[FileKind::Json]).await?;
                    let text = tokio::fs::read_to_string(&path).await?;
                    Some(
                        serde_json::from_str::<Value>(&text)
                            .map_err(|e| ServerError::BadRequest(format!("Invalid schema: {}", e)))?,
                    )
                }
                None => None,
            };
            let content = tokio::fs::read_to_string(&file).await?;
            let verdict = validate_json_text(&content, schema.as_ref()).map_err(ServerError::BadRequest)?;
            ValidateResponse {
                valid: verdict.is_ok(),
                errors: verdict.err().unwrap_or_default(),
                validator: if schema.is_some() { "jsonschema" } else { "serde_json" }.to_string(),
            }
        }
        _ => {
            let schema = match schema_path {
                Some(client) => {
                    let (path, _) = existing_file(&state.config, client, &[FileKind::Xml, FileKind::Dtd]).await?;
                    let flavor = SchemaFlavor::from_path(&path).ok_or_else(|| PathError::Extension {
                        path: path.display().to_string(),
                        expected: "xsd, rng or dtd".to_string(),
                    })?;
                    Some((flavor, path))
                }
                None => None,
            };
            let output = state
                .tools
                .validate(&file, schema.as_ref().map(|(f, p)| (*f, p.as_path())), request.dtd)
                .await?;
            let errors = if output.success {
                Vec::new()
            } else {
                output
                    .stderr
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            };
            ValidateResponse {
                valid: output.success,
                errors,
                validator: "xmllint".to_string(),
            }
        }
    };

    if response.valid {
        log_success(format!("{} is valid", file.display()));
    } else {
        log_info(format!("{} has {} problem(s)", file.display(), response.errors.len()));
    }
    Ok(response)
}

// =============================================================================
// Transform
// =============================================================================

pub async fn transform(
    State(state): State<AppState>,
    payload: Result<Json<TransformRequest>, JsonRejection>,
) -> ServerResult<Json<OperationResponse>> {
    report("transform", run_transform(&state, body(payload)?).await).map(Json)
}

async fn run_transform(state: &AppState, request: TransformRequest) -> ServerResult<OperationResponse> {
    require_fields(
        &[request.file_path.as_str(), request.stylesheet_path.as_str()],
        "filePath and stylesheetPath are required.",
    )?;
    if let Some(bad) = request.params.keys().find(|name| !is_xml_name(name)) {
        return Err(ServerError::BadRequest(format!("Invalid parameter name: {}", bad)));
    }

    let (file, _) = existing_file(&state.config, &request.file_path, &[FileKind::Xml]).await?;
    let (stylesheet, _) = existing_file(&state.config, &request.stylesheet_path, &[FileKind::Stylesheet]).await?;
    let target = resolve_output(&state.config, &file, &request.output, "transform", "xml")?;
    log_info(format!("transform {} with {}", file.display(), stylesheet.display()));

    let params: Vec<(String, String)> = request.params.into_iter().collect();
    let result = state.tools.transform(&file, &stylesheet, &params).await?;
    respond(&target, &result, Value::String(result.clone())).await
}

// =============================================================================
// Format
// =============================================================================

pub async fn format(
    State(state): State<AppState>,
    payload: Result<Json<FormatRequest>, JsonRejection>,
) -> ServerResult<Json<OperationResponse>> {
    report("format", run_format(&state, body(payload)?).await).map(Json)
}

async fn run_format(state: &AppState, request: FormatRequest) -> ServerResult<OperationResponse> {
    require_fields(&[request.file_path.as_str()], "filePath is required.")?;

    let (file, kind) = existing_file(&state.config, &request.file_path, &[FileKind::Xml, FileKind::Json]).await?;
    let extension = if kind == FileKind::Json { "json" } else { "xml" };
    let target = resolve_output(&state.config, &file, &request.output, "format", extension)?;
    log_info(format!("format {}", file.display()));

    let result = match kind {
        FileKind::Json => {
            let value: Value = serde_json::from_str(&read_text(&file).await?).map_err(ConvertError::from)?;
            pretty_json(&value, request.indent.unwrap_or(2) as usize)?
        }
        _ => state.tools.format(&file, request.indent).await?,
    };
    respond(&target, &result, Value::String(result.clone())).await
}

// =============================================================================
// Strip external subset
// =============================================================================

pub async fn strip_dtd(
    State(state): State<AppState>,
    payload: Result<Json<FileRequest>, JsonRejection>,
) -> ServerResult<Json<OperationResponse>> {
    report("strip-dtd", run_strip(&state, body(payload)?).await).map(Json)
}

async fn run_strip(state: &AppState, request: FileRequest) -> ServerResult<OperationResponse> {
    require_fields(&[request.file_path.as_str()], "filePath is required.")?;

    let (file, _) = existing_file(&state.config, &request.file_path, &[FileKind::Xml]).await?;
    let target = resolve_output(&state.config, &file, &request.output, "strip-dtd", "xml")?;
    log_info(format!("strip DTD from {}", file.display()));

    let result = state.tools.strip_dtd(&file).await?;
    respond(&target, &result, Value::String(result.clone())).await
}

// =============================================================================
// Convert
// =============================================================================

pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> ServerResult<Json<OperationResponse>> {
    report("convert", run_convert(&state, body(payload)?).await).map(Json)
}

async fn run_convert(state: &AppState, request: ConvertRequest) -> ServerResult<OperationResponse> {
    require_fields(&[request.file_path.as_str()], "filePath is required.")?;

    let (file, kind) = existing_file(&state.config, &request.file_path, &[FileKind::Xml, FileKind::Json]).await?;
    let text = read_text(&file).await?;

    match kind {
        FileKind::Json => {
            let target = resolve_output(&state.config, &file, &request.output, "convert", "xml")?;
            log_info(format!("convert {} to XML", file.display()));
            let value: Value = serde_json::from_str(&text).map_err(ConvertError::from)?;
            let options = XmlOptions {
                root: request.root.unwrap_or_else(|| XmlOptions::default().root),
                pretty: request.pretty.unwrap_or(true),
            };
            let xml = json_to_xml(&value, &options)?;
            respond(&target, &xml, Value::String(xml.clone())).await
        }
        _ => {
            let target = resolve_output(&state.config, &file, &request.output, "convert", "json")?;
            log_info(format!("convert {} to JSON", file.display()));
            let value = xml_to_json(&text)?;
            let content = pretty_json(&value, 2)?;
            respond(&target, &content, value).await
        }
    }
}

// =============================================================================
// Repair
// =============================================================================

pub async fn repair(
    State(state): State<AppState>,
    payload: Result<Json<FileRequest>, JsonRejection>,
) -> ServerResult<Json<OperationResponse>> {
    report("repair", run_repair(&state, body(payload)?).await).map(Json)
}

async fn run_repair(state: &AppState, request: FileRequest) -> ServerResult<OperationResponse> {
    require_fields(&[request.file_path.as_str()], "filePath is required.")?;

    let (file, _) = existing_file(&state.config, &request.file_path, &[FileKind::Json, FileKind::Other]).await?;
    let target = resolve_output(&state.config, &file, &request.output, "repair", "json")?;
    log_info(format!("repair {}", file.display()));

    let original = read_text(&file).await?;
    let repaired = state.tools.repair(&file).await?;
    let value: Value = serde_json::from_str(&repaired)
        .map_err(|e| ServerError::Unprocessable(format!("Repaired output is still not valid JSON: {}", e)))?;
    let changed = original.trim() != repaired.trim();

    let mut content = repaired.trim_end().to_string();
    content.push('\n');
    Ok(respond(&target, &content, value).await?.with_changed(changed))
}

async fn read_text(path: &Path) -> ServerResult<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}
