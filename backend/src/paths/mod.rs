//! Client path rewriting and output destination resolution.
//!
//! Clients name files the way they see them (`/mnt/data/books/catalog.xml`,
//! `books\\catalog.xml`, ...). Every handler first turns that into a path
//! under the server's data root with [`transform_path`], then decides where
//! the result goes with [`resolve_output`].
//!
//! # Output targets
//!
//! | Request fields                | Target                                  |
//! |-------------------------------|-----------------------------------------|
//! | `viaUrl: true`                | file in `public_dir` + download URL     |
//! | `outputDir` and/or `outputName` | file under the data root              |
//! | none                          | result inline in the JSON response      |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PathError, PathResult};

static OUTPUT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("output name pattern is valid")
});

/// Rewrite a client-supplied path into a server-local path under `data_root`.
///
/// Never touches the filesystem.
pub fn transform_path(config: &Config, client_path: &str) -> PathResult<PathBuf> {
    let trimmed = client_path.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if trimmed.contains('\0') {
        return Err(PathError::Invalid(trimmed.replace('\0', "\\0")));
    }

    let normalized = trimmed.replace('\\', "/");
    let prefix = config.client_prefix.replace('\\', "/");
    let prefix = prefix.trim_end_matches('/');
    let root = config.data_root.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');

    let relative = if let Some(rest) = strip_component_prefix(&normalized, prefix) {
        rest
    } else if is_absolute(&normalized) {
        let absolute = absolute_root(&config.data_root).to_string_lossy().replace('\\', "/");
        strip_component_prefix(&normalized, root)
            .or_else(|| strip_component_prefix(&normalized, absolute.trim_end_matches('/')))
            .ok_or_else(|| PathError::OutsideRoot(trimmed.to_string()))?
    } else {
        normalized.as_str()
    };

    let mut local = config.data_root.clone();
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::Traversal(trimmed.to_string())),
            name => local.push(name),
        }
    }
    Ok(local)
}

/// `root` anchored at the working directory, without `.` components.
fn absolute_root(root: &Path) -> PathBuf {
    let base = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    };
    base.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// `path` minus `prefix`, only when the prefix ends on a component boundary.
fn strip_component_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

// =============================================================================
// Extension checks
// =============================================================================

/// What a file is, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Xml,
    Stylesheet,
    Json,
    Dtd,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xml" | "xsd" | "rng" | "svg" | "xhtml" | "kml" | "gpx" => FileKind::Xml,
            "xsl" | "xslt" => FileKind::Stylesheet,
            "json" => FileKind::Json,
            "dtd" => FileKind::Dtd,
            _ => FileKind::Other,
        }
    }

    fn label(self) -> &'static str {
        match self {
            FileKind::Xml => "xml",
            FileKind::Stylesheet => "xsl/xslt",
            FileKind::Json => "json",
            FileKind::Dtd => "dtd",
            FileKind::Other => "other",
        }
    }
}

/// Check that `path` is one of the `allowed` kinds.
pub fn require_kind(path: &Path, allowed: &[FileKind]) -> PathResult<FileKind> {
    let kind = FileKind::from_path(path);
    if allowed.contains(&kind) {
        Ok(kind)
    } else {
        Err(PathError::Extension {
            path: path.display().to_string(),
            expected: allowed.iter().map(|k| k.label()).collect::<Vec<_>>().join(" or "),
        })
    }
}

// =============================================================================
// Output destination
// =============================================================================

/// Output fields shared by every operation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputOptions {
    /// Directory (client view) to write the result into
    pub output_dir: Option<String>,
    /// File name for the result
    pub output_name: Option<String>,
    /// Publish the result under `/downloads` and return a link
    pub via_url: bool,
}

/// Where an operation's result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Returned in the response body
    Inline,
    /// Written under the data root
    File { path: PathBuf },
    /// Written under the public directory, reachable at `url`
    Download { path: PathBuf, url: String },
}

/// Decide where the result of `operation` on `input` should go.
pub fn resolve_output(
    config: &Config,
    input: &Path,
    options: &OutputOptions,
    operation: &str,
    extension: &str,
) -> PathResult<OutputTarget> {
    let requested_name = options
        .output_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(validate_output_name)
        .transpose()?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    if options.via_url {
        let name = match requested_name {
            Some(name) => name.to_string(),
            None => {
                let tag = Uuid::new_v4().simple().to_string();
                format!("{}-{}.{}", stem, &tag[..8], extension)
            }
        };
        return Ok(OutputTarget::Download {
            path: config.public_dir.join(&name),
            url: format!("{}/{}", config.public_url, name),
        });
    }

    let output_dir = options
        .output_dir
        .as_deref()
        .filter(|d| !d.trim().is_empty());

    if output_dir.is_none() && requested_name.is_none() {
        return Ok(OutputTarget::Inline);
    }

    let dir = match output_dir {
        Some(dir) => transform_path(config, dir)?,
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.data_root.clone()),
    };
    let name = match requested_name {
        Some(name) => name.to_string(),
        None => format!("{}.{}.{}", stem, operation, extension),
    };

    Ok(OutputTarget::File { path: dir.join(name) })
}

fn validate_output_name(name: &str) -> PathResult<&str> {
    if OUTPUT_NAME.is_match(name) {
        Ok(name)
    } else {
        Err(PathError::InvalidName(name.to_string()))
    }
}

/// What [`deliver`] did with the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Inline,
    Written { file: PathBuf, url: Option<String> },
}

/// Write `content` to the target, creating parent directories as needed.
pub async fn deliver(target: &OutputTarget, content: &str) -> std::io::Result<Delivered> {
    let (path, url) = match target {
        OutputTarget::Inline => return Ok(Delivered::Inline),
        OutputTarget::File { path } => (path, None),
        OutputTarget::Download { path, url } => (path, Some(url.clone())),
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;

    Ok(Delivered::Written { file: path.clone(), url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> Config {
        Config {
            data_root: PathBuf::from("/srv/xmlgate"),
            client_prefix: "/mnt/data".to_string(),
            public_dir: PathBuf::from("/srv/public"),
            public_url: "http://localhost:3000/downloads".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_client_prefix_is_rewritten() {
        let path = transform_path(&config(), "/mnt/data/books/catalog.xml").unwrap();
        assert_eq!(path, PathBuf::from("/srv/xmlgate/books/catalog.xml"));
    }

    #[test]
    fn test_prefix_must_end_on_component() {
        let err = transform_path(&config(), "/mnt/database/x.xml").unwrap_err();
        assert!(matches!(err, PathError::OutsideRoot(_)));
    }

    #[test]
    fn test_relative_and_backslashes() {
        let path = transform_path(&config(), r"books\.\catalog.xml").unwrap();
        assert_eq!(path, PathBuf::from("/srv/xmlgate/books/catalog.xml"));
    }

    #[test]
    fn test_local_root_is_accepted() {
        let path = transform_path(&config(), "/srv/xmlgate/a.xml").unwrap();
        assert_eq!(path, PathBuf::from("/srv/xmlgate/a.xml"));
    }

    #[test]
    fn test_relative_root_accepts_absolute_server_paths() {
        let config = Config::default();
        let inside = std::env::current_dir().unwrap().join("data").join("a.xml");
        let path = transform_path(&config, &inside.to_string_lossy()).unwrap();
        assert_eq!(path, PathBuf::from("./data").join("a.xml"));

        let outside = std::env::current_dir().unwrap().join("elsewhere").join("a.xml");
        let err = transform_path(&config, &outside.to_string_lossy()).unwrap_err();
        assert!(matches!(err, PathError::OutsideRoot(_)));
    }

    #[test]
    fn test_rejections() {
        let c = config();
        assert!(matches!(transform_path(&c, "  "), Err(PathError::Empty)));
        assert!(matches!(transform_path(&c, "a\0b"), Err(PathError::Invalid(_))));
        assert!(matches!(
            transform_path(&c, "/mnt/data/../etc/passwd"),
            Err(PathError::Traversal(_))
        ));
        assert!(matches!(transform_path(&c, "/etc/passwd"), Err(PathError::OutsideRoot(_))));
        assert!(matches!(transform_path(&c, "C:\\Windows\\win.ini"), Err(PathError::OutsideRoot(_))));
    }

    #[test]
    fn test_file_kinds() {
        assert_eq!(FileKind::from_path(Path::new("a.XML")), FileKind::Xml);
        assert_eq!(FileKind::from_path(Path::new("style.xslt")), FileKind::Stylesheet);
        assert_eq!(FileKind::from_path(Path::new("data.json")), FileKind::Json);
        assert_eq!(FileKind::from_path(Path::new("README")), FileKind::Other);

        let err = require_kind(Path::new("notes.txt"), &[FileKind::Xml, FileKind::Json]).unwrap_err();
        assert!(err.to_string().contains("xml or json"));
    }

    #[test]
    fn test_inline_by_default() {
        let target = resolve_output(
            &config(),
            Path::new("/srv/xmlgate/a.xml"),
            &OutputOptions::default(),
            "format",
            "xml",
        )
        .unwrap();
        assert_eq!(target, OutputTarget::Inline);
    }

    #[test]
    fn test_output_name_only_uses_input_dir() {
        let options = OutputOptions {
            output_name: Some("pretty.xml".into()),
            ..Default::default()
        };
        let target = resolve_output(&config(), Path::new("/srv/xmlgate/in/a.xml"), &options, "format", "xml").unwrap();
        assert_eq!(
            target,
            OutputTarget::File { path: PathBuf::from("/srv/xmlgate/in/pretty.xml") }
        );
    }

    #[test]
    fn test_output_dir_gets_default_name() {
        let options = OutputOptions {
            output_dir: Some("/mnt/data/out".into()),
            ..Default::default()
        };
        let target = resolve_output(&config(), Path::new("/srv/xmlgate/a.xml"), &options, "convert", "json").unwrap();
        assert_eq!(
            target,
            OutputTarget::File { path: PathBuf::from("/srv/xmlgate/out/a.convert.json") }
        );
    }

    #[test]
    fn test_via_url_wins() {
        let options = OutputOptions {
            output_dir: Some("out".into()),
            via_url: true,
            ..Default::default()
        };
        match resolve_output(&config(), Path::new("/srv/xmlgate/a.xml"), &options, "format", "xml").unwrap() {
            OutputTarget::Download { path, url } => {
                let name = path.file_name().unwrap().to_str().unwrap().to_string();
                assert!(name.starts_with("a-"));
                assert!(name.ends_with(".xml"));
                assert_eq!(path.parent().unwrap(), Path::new("/srv/public"));
                assert_eq!(url, format!("http://localhost:3000/downloads/{}", name));
            }
            other => panic!("expected download, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_output_name() {
        let options = OutputOptions {
            output_name: Some("../../escape.xml".into()),
            ..Default::default()
        };
        let err = resolve_output(&config(), Path::new("/srv/xmlgate/a.xml"), &options, "format", "xml").unwrap_err();
        assert!(matches!(err, PathError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_deliver_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.json");
        let target = OutputTarget::File { path: path.clone() };

        let delivered = deliver(&target, "{}").await.unwrap();
        assert_eq!(delivered, Delivered::Written { file: path.clone(), url: None });
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        assert_eq!(deliver(&OutputTarget::Inline, "x").await.unwrap(), Delivered::Inline);
    }
}
