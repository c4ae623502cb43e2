//! Plugin descriptor parsing and validation.
//!
//! Descriptors are declared in `plugin.toml` manifests. Discovery — how
//! a manifest and its compiled implementation arrive in the process —
//! is an external concern; the runtime only sees the parsed descriptor
//! at registration time, after which it is immutable.

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Identity and load metadata for one plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin id, also the namespace prefix for its routes.
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Ids of plugins this one expects to be present. Declared metadata
    /// only; ordering is controlled by `priority`, not enforced here.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Higher priority initializes earlier and stops later. Default 0.
    #[serde(default)]
    pub priority: i32,
}

/// Wrapper for the `[plugin]` table in a manifest file.
#[derive(Debug, Deserialize)]
struct ManifestDoc {
    plugin: PluginDescriptor,
}

// ─── Validation helpers ─────────────────────────────────────────────

/// Validate a plugin id against `^[a-z][a-z0-9-]{1,63}$`.
///
/// The id must start with a lowercase ASCII letter, followed by 1-63
/// characters that are lowercase ASCII letters, digits, or hyphens.
/// Total length: 2-64 characters.
fn validate_plugin_id(id: &str) -> Result<(), RuntimeError> {
    let len = id.len();
    if !(2..=64).contains(&len) {
        return Err(RuntimeError::InvalidDescriptor(format!(
            "plugin id must be 2-64 characters, got {len}"
        )));
    }

    let mut chars = id.chars();

    let first = chars.next().unwrap();
    if !first.is_ascii_lowercase() {
        return Err(RuntimeError::InvalidDescriptor(format!(
            "plugin id must start with a lowercase letter, got '{first}'"
        )));
    }

    for ch in chars {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
            return Err(RuntimeError::InvalidDescriptor(format!(
                "plugin id contains invalid character '{ch}'"
            )));
        }
    }

    Ok(())
}

/// Validate a version string as semver.
fn validate_semver(value: &str, field_name: &str) -> Result<(), RuntimeError> {
    semver::Version::parse(value).map_err(|_| {
        RuntimeError::InvalidDescriptor(format!("{field_name} is not valid semver: '{value}'"))
    })?;
    Ok(())
}

impl PluginDescriptor {
    /// Parse a descriptor from a TOML manifest string.
    pub fn parse(toml_str: &str) -> Result<Self, RuntimeError> {
        let doc: ManifestDoc = toml::from_str(toml_str)?;
        Ok(doc.plugin)
    }

    /// Validate all fields of a parsed descriptor.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        validate_plugin_id(&self.id)?;

        if self.name.is_empty() {
            return Err(RuntimeError::InvalidDescriptor(
                "plugin.name must not be empty".into(),
            ));
        }

        validate_semver(&self.version, "plugin.version")?;

        let desc_len = self.description.len();
        if desc_len == 0 || desc_len > 500 {
            return Err(RuntimeError::InvalidDescriptor(format!(
                "plugin.description must be 1-500 characters, got {desc_len}"
            )));
        }

        for dep in &self.dependencies {
            validate_plugin_id(dep)?;
            if dep == &self.id {
                return Err(RuntimeError::InvalidDescriptor(format!(
                    "plugin '{}' declares a dependency on itself",
                    self.id
                )));
            }
        }

        Ok(())
    }

    /// Parse and validate a descriptor from a TOML manifest string.
    pub fn parse_and_validate(toml_str: &str) -> Result<Self, RuntimeError> {
        let descriptor = Self::parse(toml_str)?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_VALID_TOML: &str = r#"
[plugin]
id = "notes-sync"
name = "Notes Sync"
version = "1.2.3"
description = "Synchronizes notes with a remote store"
author = "Jane Doe"
dependencies = ["notes"]
priority = 10
"#;

    const MINIMAL_VALID_TOML: &str = r#"
[plugin]
id = "ab"
name = "AB"
version = "0.1.0"
description = "Minimal plugin"
"#;

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn test_parse_valid_descriptor() {
        let d = PluginDescriptor::parse(FULL_VALID_TOML).unwrap();
        assert_eq!(d.id, "notes-sync");
        assert_eq!(d.name, "Notes Sync");
        assert_eq!(d.version, "1.2.3");
        assert_eq!(d.author.as_deref(), Some("Jane Doe"));
        assert_eq!(d.dependencies, vec!["notes"]);
        assert_eq!(d.priority, 10);
    }

    #[test]
    fn test_parse_minimal_descriptor() {
        let d = PluginDescriptor::parse(MINIMAL_VALID_TOML).unwrap();
        assert_eq!(d.id, "ab");
        assert!(d.author.is_none());
        assert!(d.dependencies.is_empty());
        assert_eq!(d.priority, 0);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = PluginDescriptor::parse("this is not valid {{{{ toml").unwrap_err();
        assert!(matches!(err, RuntimeError::TomlParse(_)));
    }

    // ── Id validation ───────────────────────────────────────────────

    #[test]
    fn test_validate_invalid_id_uppercase() {
        let toml = r#"
[plugin]
id = "MyPlugin"
name = "Bad"
version = "1.0.0"
description = "Bad id"
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        let err = d.validate().unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidDescriptor(_)));
        assert!(err.to_string().contains("lowercase"));
    }

    #[test]
    fn test_validate_invalid_id_too_short() {
        let toml = r#"
[plugin]
id = "a"
name = "Short"
version = "1.0.0"
description = "Too short"
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("2-64 characters"));
    }

    #[test]
    fn test_validate_invalid_id_character() {
        let toml = r#"
[plugin]
id = "my_plugin"
name = "Underscore"
version = "1.0.0"
description = "Underscores are not allowed"
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("invalid character"));
    }

    // ── Version validation ──────────────────────────────────────────

    #[test]
    fn test_validate_invalid_version() {
        let toml = r#"
[plugin]
id = "my-plugin"
name = "Bad version"
version = "not.a.version"
description = "Bad version"
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("semver"));
    }

    // ── Description validation ──────────────────────────────────────

    #[test]
    fn test_validate_empty_description() {
        let toml = r#"
[plugin]
id = "my-plugin"
name = "Empty"
version = "1.0.0"
description = ""
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("1-500 characters"));
    }

    // ── Dependency validation ───────────────────────────────────────

    #[test]
    fn test_validate_self_dependency() {
        let toml = r#"
[plugin]
id = "my-plugin"
name = "Selfish"
version = "1.0.0"
description = "Depends on itself"
dependencies = ["my-plugin"]
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("itself"));
    }

    #[test]
    fn test_validate_invalid_dependency_id() {
        let toml = r#"
[plugin]
id = "my-plugin"
name = "Bad dep"
version = "1.0.0"
description = "Dependency id is invalid"
dependencies = ["Not Valid"]
"#;
        let d = PluginDescriptor::parse(toml).unwrap();
        assert!(d.validate().is_err());
    }

    // ── parse_and_validate ──────────────────────────────────────────

    #[test]
    fn test_parse_and_validate_valid() {
        let d = PluginDescriptor::parse_and_validate(FULL_VALID_TOML).unwrap();
        assert_eq!(d.id, "notes-sync");
    }
}
