//! # Input Loading
//!
//! Documents and schema manifests are read from disk as JSON or YAML,
//! chosen by file extension (`.yaml` / `.yml` parse as YAML, anything else
//! as JSON). `-` reads JSON from standard input. YAML is converted straight
//! into `serde_json::Value`, so everything downstream sees one data model.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Load a JSON or YAML file as a JSON value.
pub fn load_value(path: &Path) -> Result<Value> {
    if path.as_os_str() == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("failed to read standard input")?;
        return serde_json::from_str(&content).context("invalid JSON on standard input");
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content, is_yaml(path)).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load a JSON or YAML file and deserialize it into `T`.
pub fn load_as<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let value = load_value(path)?;
    serde_json::from_value(value).with_context(|| format!("unexpected shape in {}", path.display()))
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml" | "yml")
    )
}

fn parse(content: &str, yaml: bool) -> Result<Value> {
    if yaml {
        Ok(serde_yaml::from_str(content)?)
    } else {
        Ok(serde_json::from_str(content)?)
    }
}
