//! Site aliases: where a site lives and its per-site deploy settings.
//!
//! An alias is a JSON file named after the alias in the aliases directory:
//!
//! ```json
//! {
//!   "host": "web1.example.com",
//!   "user": "deploy",
//!   "root": "/var/www/example",
//!   "deploy": { "branch": "master", "post-deploy": ["drush cron"] }
//! }
//! ```
//!
//! Without a `host` (or with a localhost one) commands run locally.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths;
use crate::ssh::is_local_host;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    #[serde(skip_deserializing, default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Per-site deploy settings, the middle settings layer.
    #[serde(default)]
    pub deploy: Map<String, Value>,
}

fn default_port() -> u16 {
    22
}

impl Alias {
    /// A local alias rooted at `root`, mostly useful for tests.
    pub fn local(name: &str, root: &str) -> Self {
        Self {
            name: name.to_string(),
            host: None,
            user: None,
            port: default_port(),
            identity_file: None,
            root: root.to_string(),
            uri: None,
            deploy: Map::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        match self.host.as_deref() {
            None => true,
            Some(host) => host.trim().is_empty() || is_local_host(host),
        }
    }

    /// `@name`, the way aliases are shown to users.
    pub fn display_name(&self) -> String {
        format!("@{}", self.name)
    }
}

/// Strip the optional leading `@` and reject names that can't be file names.
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim().trim_start_matches('@');

    if name.is_empty() {
        return Err(Error::validation_missing_argument(vec!["alias".to_string()])
            .with_hint("No alias given. Usage: drydock deploy @<alias>"));
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid || name.starts_with('.') {
        return Err(Error::alias_not_found(name, Vec::new()));
    }

    Ok(name.to_string())
}

pub fn load(raw: &str) -> Result<Alias> {
    let dir = paths::aliases()?;
    load_from(&dir, raw)
}

pub fn load_from(dir: &Path, raw: &str) -> Result<Alias> {
    let name = normalize_name(raw)?;
    let path = dir.join(format!("{}.json", name));

    if !path.exists() {
        return Err(Error::alias_not_found(name, list_names(dir)));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let mut alias: Alias = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;

    if alias.root.trim().is_empty() {
        return Err(Error::config_missing_key(
            "root",
            Some(path.display().to_string()),
        ));
    }

    alias.name = name;
    Ok(alias)
}

/// Alias names available in `dir`, sorted.
pub fn list_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .collect();
    names.sort();
    names
}
