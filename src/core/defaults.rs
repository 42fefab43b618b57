use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;

use crate::paths;
use crate::utils::template::{self, TemplateVars};

/// Root configuration structure for drydock.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DrydockConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via drydock.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default = "default_dump_dir")]
    pub dump_dir: String,

    #[serde(default = "default_num_dumps")]
    pub num_dumps: u64,

    #[serde(default = "default_site_cli")]
    pub site_cli: String,

    #[serde(default = "default_version_file")]
    pub version_file: String,

    /// Template for service restarts; `{{service}}` is replaced by the name.
    #[serde(default = "default_restart_command")]
    pub restart_command: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            dump_dir: default_dump_dir(),
            num_dumps: default_num_dumps(),
            site_cli: default_site_cli(),
            version_file: default_version_file(),
            restart_command: default_restart_command(),
        }
    }
}

impl Defaults {
    /// The lowest-priority settings layer.
    pub fn settings_layer(&self) -> Map<String, Value> {
        let restart = |service: &str| {
            template::render(&self.restart_command, &[(TemplateVars::SERVICE, service)])
        };

        let mut layer = Map::new();
        layer.insert("dump-dir".to_string(), json!(self.dump_dir));
        layer.insert("num-dumps".to_string(), json!(self.num_dumps));
        layer.insert("site-cli".to_string(), json!(self.site_cli));
        layer.insert("version-file".to_string(), json!(self.version_file));
        layer.insert(
            "restart-apache2-command".to_string(),
            json!(restart("apache2")),
        );
        layer.insert(
            "restart-varnish-command".to_string(),
            json!(restart("varnish")),
        );
        layer
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_dump_dir() -> String {
    "/tmp".to_string()
}

fn default_num_dumps() -> u64 {
    5
}

fn default_site_cli() -> String {
    "drush".to_string()
}

fn default_version_file() -> String {
    "VERSION.txt".to_string()
}

fn default_restart_command() -> String {
    "sudo service {{service}} restart".to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If drydock.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full drydock.json config, falling back to defaults on any error.
pub fn load_config() -> DrydockConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> crate::Result<DrydockConfig> {
    let path = paths::drydock_json()?;

    if !path.exists() {
        return Err(crate::Error::other("drydock.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_config(&content)
}

fn parse_config(content: &str) -> crate::Result<DrydockConfig> {
    serde_json::from_str(content).map_err(|e| {
        crate::Error::validation_invalid_json(e, Some("parse drydock.json".to_string()))
    })
}
