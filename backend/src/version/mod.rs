//! Release bookkeeping in `version.json`.
//!
//! ```json
//! {
//!   "version": "1.3.0",
//!   "changelog": [
//!     { "version": "1.3.0", "date": "2026-10-18", "changes": ["", ""] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::VersionError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: String,
    pub date: String,
    pub changes: Vec<String>,
}

impl VersionFile {
    /// Load from disk; a missing or unreadable file yields an empty record.
    pub fn load_or_default(path: &Path) -> Self {
        fs::read_to_string(path)
            .map(|content| Self::parse_or_default(&content))
            .unwrap_or_default()
    }

    /// Parse file contents; malformed JSON yields an empty record.
    pub fn parse_or_default(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), VersionError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// `1.4.2` -> `1.5.0`
pub fn bump_minor(version: &str) -> Result<String, VersionError> {
    let parts: Vec<&str> = version.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(VersionError::InvalidFormat(version.to_string()));
    }
    let parse = |part: &str| {
        part.parse::<u64>()
            .map_err(|_| VersionError::InvalidFormat(version.to_string()))
    };
    let major = parse(parts[0])?;
    let minor = parse(parts[1])?;
    parse(parts[2])?;
    Ok(format!("{}.{}.0", major, minor + 1))
}

/// Bump the version in `path`, adding a dated changelog stub.
///
/// `fallback` is used when the file has no version yet.
pub fn bump_version_file(path: &Path, fallback: &str) -> Result<String, VersionError> {
    let mut data = VersionFile::load_or_default(path);
    let current = if data.version.is_empty() { fallback } else { data.version.as_str() };
    let next = bump_minor(current)?;

    data.version = next.clone();
    if !data.changelog.iter().any(|entry| entry.version == next) {
        data.changelog.insert(
            0,
            ChangelogEntry {
                version: next.clone(),
                date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
                changes: vec![String::new(), String::new()],
            },
        );
    }

    data.save(path)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bump_minor() {
        assert_eq!(bump_minor("1.0.0").unwrap(), "1.1.0");
        assert_eq!(bump_minor("2.9.7").unwrap(), "2.10.0");
        assert!(bump_minor("1.0").is_err());
        assert!(bump_minor("1.x.0").is_err());
    }

    #[test]
    fn test_new_file_uses_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.json");

        let next = bump_version_file(&path, "0.1.0").unwrap();
        assert_eq!(next, "0.2.0");

        let data = VersionFile::load_or_default(&path);
        assert_eq!(data.version, "0.2.0");
        assert_eq!(data.changelog.len(), 1);
        assert_eq!(data.changelog[0].changes, vec!["", ""]);
        assert_eq!(data.changelog[0].date.len(), 10);
    }

    #[test]
    fn test_existing_entry_not_duplicated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.json");
        let existing = VersionFile {
            version: "1.1.0".into(),
            changelog: vec![ChangelogEntry {
                version: "1.2.0".into(),
                date: "2026-01-01".into(),
                changes: vec!["prepared early".into()],
            }],
        };
        existing.save(&path).unwrap();

        assert_eq!(bump_version_file(&path, "0.0.0").unwrap(), "1.2.0");
        let data = VersionFile::load_or_default(&path);
        assert_eq!(data.changelog.len(), 1);
        assert_eq!(data.changelog[0].changes, vec!["prepared early"]);
    }

    #[test]
    fn test_invalid_version_leaves_file_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.json");
        fs::write(&path, r#"{"version":"banana","changelog":[]}"#).unwrap();

        assert!(matches!(
            bump_version_file(&path, "0.1.0"),
            Err(VersionError::InvalidFormat(_))
        ));
        assert!(fs::read_to_string(&path).unwrap().contains("banana"));
    }
}
