use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Human-editable attributes carried by a `.meta.toml` sidecar.
///
/// Known fields are typed; everything else lands in `extra` and is written
/// back verbatim, so a read-modify-write cycle never drops keys this daemon
/// does not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<toml::Value>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl SidecarMetadata {
    /// Boolean passthrough key honored on subcategory creation.
    pub fn is_active(&self) -> bool {
        self.extra
            .get("is_active")
            .and_then(toml::Value::as_bool)
            .unwrap_or(true)
    }

    /// The full sidecar projected to JSON for the `metadata` database column.
    pub fn metadata_json(&self) -> String {
        let value = match toml::Table::try_from(self) {
            Ok(table) => toml_to_json(&toml::Value::Table(table)),
            Err(_) => serde_json::Value::Object(serde_json::Map::new()),
        };
        value.to_string()
    }
}

pub fn read_sidecar(path: &Path) -> Result<SidecarMetadata, MetadataError> {
    let raw = fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

pub fn write_sidecar(path: &Path, metadata: &SidecarMetadata) -> Result<(), MetadataError> {
    let rendered = toml::to_string_pretty(metadata)?;
    fs::write(path, rendered)?;
    Ok(())
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(text) => serde_json::Value::String(text.clone()),
        toml::Value::Integer(number) => serde_json::Value::Number((*number).into()),
        toml::Value::Float(number) => serde_json::Number::from_f64(*number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(flag) => serde_json::Value::Bool(*flag),
        toml::Value::Datetime(datetime) => serde_json::Value::String(datetime.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(key, value)| (key.clone(), toml_to_json(value)))
                .collect(),
        ),
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "I/O error on sidecar: {}", err),
            MetadataError::Parse(err) => write!(f, "invalid sidecar TOML: {}", err),
            MetadataError::Serialize(err) => write!(f, "failed to render sidecar TOML: {}", err),
        }
    }
}

impl Error for MetadataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MetadataError::Io(err) => Some(err),
            MetadataError::Parse(err) => Some(err),
            MetadataError::Serialize(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(value: std::io::Error) -> Self {
        MetadataError::Io(value)
    }
}

impl From<toml::de::Error> for MetadataError {
    fn from(value: toml::de::Error) -> Self {
        MetadataError::Parse(value)
    }
}

impl From<toml::ser::Error> for MetadataError {
    fn from(value: toml::ser::Error) -> Self {
        MetadataError::Serialize(value)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{read_sidecar, write_sidecar, MetadataError, SidecarMetadata};

    fn temp_sidecar(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kmsd-meta-test-{}.toml", Uuid::now_v7()));
        std::fs::write(&path, contents).expect("temp sidecar should be writable");
        path
    }

    #[test]
    fn reads_known_fields() {
        let path = temp_sidecar(
            r#"
name = "Firewall"
description = "Edge firewall config"
status = "active"
author = "ops"
tags = ["network", "edge"]
created = 2025-04-01T08:30:00Z
"#,
        );
        let metadata = read_sidecar(&path).expect("sidecar should parse");
        assert_eq!(metadata.name.as_deref(), Some("Firewall"));
        assert_eq!(metadata.status.as_deref(), Some("active"));
        assert_eq!(metadata.tags, vec!["network", "edge"]);
        assert!(metadata.created.is_some());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn preserves_unknown_keys_across_read_modify_write() {
        let path = temp_sidecar(
            r#"
name = "Firewall"
owner_team = "netops"
review_cycle_days = 90

[links]
runbook = "https://wiki.internal/fw"
"#,
        );
        let mut metadata = read_sidecar(&path).expect("sidecar should parse");
        metadata.description = Some("updated".to_string());
        write_sidecar(&path, &metadata).expect("sidecar should write");

        let reread = read_sidecar(&path).expect("rewritten sidecar should parse");
        assert_eq!(reread.description.as_deref(), Some("updated"));
        assert_eq!(
            reread.extra.get("owner_team").and_then(toml::Value::as_str),
            Some("netops")
        );
        assert_eq!(
            reread
                .extra
                .get("review_cycle_days")
                .and_then(toml::Value::as_integer),
            Some(90)
        );
        assert_eq!(
            reread
                .extra
                .get("links")
                .and_then(toml::Value::as_table)
                .and_then(|links| links.get("runbook"))
                .and_then(toml::Value::as_str),
            Some("https://wiki.internal/fw")
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn metadata_json_includes_every_key() {
        let path = temp_sidecar(
            r#"
name = "Firewall"
owner_team = "netops"
created = 2025-04-01T08:30:00Z
"#,
        );
        let metadata = read_sidecar(&path).expect("sidecar should parse");
        let json: serde_json::Value =
            serde_json::from_str(&metadata.metadata_json()).expect("projection should be JSON");
        assert_eq!(json["name"], "Firewall");
        assert_eq!(json["owner_team"], "netops");
        assert_eq!(json["created"], "2025-04-01T08:30:00Z");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn parse_failure_is_reported() {
        let path = temp_sidecar("name = [unclosed");
        match read_sidecar(&path) {
            Err(MetadataError::Parse(_)) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn is_active_defaults_to_true() {
        let metadata = SidecarMetadata::default();
        assert!(metadata.is_active());

        let path = temp_sidecar("is_active = false");
        let parsed = read_sidecar(&path).expect("sidecar should parse");
        assert!(!parsed.is_active());
        let _ = std::fs::remove_file(path);
    }
}
