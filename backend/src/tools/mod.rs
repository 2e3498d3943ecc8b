//! External tool invocation.
//!
//! Every operation that is not a library call runs exactly one child process.
//! Arguments are passed as argv entries, never through a shell.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::api::logs::{log_error, log_info_indent};
use crate::config::{Config, ToolPaths};
use crate::error::{ToolError, ToolResult};

/// Captured result of one tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub success: bool,
}

/// Which schema language a validation run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFlavor {
    Xsd,
    RelaxNg,
    Dtd,
}

impl SchemaFlavor {
    /// Pick the flavor from a schema file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("xsd") => Some(SchemaFlavor::Xsd),
            Some("rng") => Some(SchemaFlavor::RelaxNg),
            Some("dtd") => Some(SchemaFlavor::Dtd),
            _ => None,
        }
    }

    fn flag(self) -> &'static str {
        match self {
            SchemaFlavor::Xsd => "--schema",
            SchemaFlavor::RelaxNg => "--relaxng",
            SchemaFlavor::Dtd => "--dtdvalid",
        }
    }
}

/// Runs the wrapped command-line tools.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    tools: ToolPaths,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(tools: ToolPaths, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tools.clone(), config.tool_timeout)
    }

    /// Run `program` with `args`, capturing output.
    ///
    /// A non-zero exit is not an error here; see [`ToolRunner::run_checked`].
    pub async fn run<I, S>(&self, program: &str, args: I, envs: &[(&str, String)]) -> ToolResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            command.env(key, value);
        }

        log_info_indent(format!("$ {}", program), 1);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                log_error(format!("{} not found", program));
                return Err(ToolError::NotInstalled(program.to_string()));
            }
            Ok(Err(e)) => {
                return Err(ToolError::Spawn {
                    tool: program.to_string(),
                    source: e,
                })
            }
            Err(_) => {
                log_error(format!("{} timed out", program));
                return Err(ToolError::Timeout(self.timeout.as_secs()));
            }
        };

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
            success: output.status.success(),
        })
    }

    /// Like [`ToolRunner::run`], but a failed exit becomes [`ToolError::Failed`].
    pub async fn run_checked<I, S>(&self, program: &str, args: I, envs: &[(&str, String)]) -> ToolResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(program, args, envs).await?;
        if output.success {
            Ok(output)
        } else {
            Err(ToolError::Failed {
                tool: program.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// `xmlstarlet sel -t -v <xpath> <file>`, trimmed.
    ///
    /// Anything on stderr counts as a failure even when the exit is clean.
    pub async fn extract(&self, file: &Path, xpath: &str) -> ToolResult<String> {
        let args: [&OsStr; 5] = [
            "sel".as_ref(),
            "-t".as_ref(),
            "-v".as_ref(),
            xpath.as_ref(),
            file.as_os_str(),
        ];
        let output = self.run_checked(&self.tools.xmlstarlet, args, &[]).await?;
        if !output.stderr.trim().is_empty() {
            return Err(ToolError::Stderr(output.stderr.trim().to_string()));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Validate with xmllint. Returns the raw run; the caller decides
    /// what a non-zero exit means.
    pub async fn validate(
        &self,
        file: &Path,
        schema: Option<(SchemaFlavor, &Path)>,
        internal_dtd: bool,
    ) -> ToolResult<ToolOutput> {
        let mut args: Vec<&OsStr> = vec!["--noout".as_ref()];
        match schema {
            Some((flavor, schema_path)) => {
                args.push(flavor.flag().as_ref());
                args.push(schema_path.as_os_str());
            }
            None if internal_dtd => args.push("--valid".as_ref()),
            None => {}
        }
        args.push(file.as_os_str());
        self.run(&self.tools.xmllint, args, &[]).await
    }

    /// `xsltproc [--stringparam k v]... <stylesheet> <file>`
    pub async fn transform(&self, file: &Path, stylesheet: &Path, params: &[(String, String)]) -> ToolResult<String> {
        let mut args: Vec<&OsStr> = Vec::with_capacity(params.len() * 3 + 2);
        for (name, value) in params {
            args.push("--stringparam".as_ref());
            args.push(name.as_ref());
            args.push(value.as_ref());
        }
        args.push(stylesheet.as_os_str());
        args.push(file.as_os_str());
        let output = self.run_checked(&self.tools.xsltproc, args, &[]).await?;
        Ok(output.stdout)
    }

    /// `xmllint --format <file>`, honouring `XMLLINT_INDENT`.
    pub async fn format(&self, file: &Path, indent: Option<u8>) -> ToolResult<String> {
        let envs: Vec<(&str, String)> = indent
            .map(|n| vec![("XMLLINT_INDENT", " ".repeat(n as usize))])
            .unwrap_or_default();
        let args: [&OsStr; 2] = ["--format".as_ref(), file.as_os_str()];
        let output = self.run_checked(&self.tools.xmllint, args, &envs).await?;
        Ok(output.stdout)
    }

    /// `xmllint --dropdtd <file>`
    pub async fn strip_dtd(&self, file: &Path) -> ToolResult<String> {
        let args: [&OsStr; 2] = ["--dropdtd".as_ref(), file.as_os_str()];
        let output = self.run_checked(&self.tools.xmllint, args, &[]).await?;
        Ok(output.stdout)
    }

    /// `jsonrepair <file>`
    pub async fn repair(&self, file: &Path) -> ToolResult<String> {
        let output = self.run_checked(&self.tools.jsonrepair, [file.as_os_str()], &[]).await?;
        Ok(output.stdout)
    }
}
