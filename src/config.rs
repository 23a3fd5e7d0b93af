use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// default location of the backing bare repository
pub const DEFAULT_REPO: &str = "/var/lib/gitstate/state.git";
/// default root of the per-branch configuration tree
pub const DEFAULT_CONFIG_DIR: &str = "/etc/gitstate/branches";
/// default driver search directory
pub const DEFAULT_DRIVER_PATH: &str = "/usr/lib/gitstate/drivers";

/// extension of per-branch config files
pub const CONFIG_EXT: &str = "toml";

/// reserved key naming the driver executable
pub const KEY_DRIVER: &str = "driver";
/// reserved key switching a branch or sub-tree off
pub const KEY_ENABLED: &str = "enabled";

/// settings file inside the backing repository
pub const SETTINGS_FILE: &str = "gitstate.toml";

/// repository-level settings stored in gitstate.toml next to the bare repository data
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// root of the per-branch configuration tree
    pub config_dir: PathBuf,
    /// directories searched for driver executables, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub driver_path: Vec<PathBuf>,
}

impl Settings {
    pub fn new(config_dir: impl Into<PathBuf>, driver_path: Vec<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            driver_path,
        }
    }

    /// load settings from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::ConfigValue {
            path: path.to_path_buf(),
            key: "settings".to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            driver_path: parse_search_path(DEFAULT_DRIVER_PATH),
        }
    }
}

/// split a colon-separated search path, dropping empty entries
pub fn parse_search_path(s: &str) -> Vec<PathBuf> {
    s.split(':')
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// the flattened key/value entries of one branch config file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub entries: BTreeMap<String, String>,
}

impl ConfigFile {
    /// read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// parse config file content
    ///
    /// top-level scalars become entries as-is; scalars inside a `[section]`
    /// become `section.key`. arrays are joined with spaces.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut entries = BTreeMap::new();
        flatten("", &table, &mut entries);

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// driver named by this file, if any
    pub fn driver(&self) -> Option<&str> {
        self.get(KEY_DRIVER).filter(|d| !d.is_empty())
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            toml::Value::Table(inner) => flatten(&name, inner, out),
            other => {
                out.insert(name, scalar_string(other));
            }
        }
    }
}

fn scalar_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// parse a boolean config value
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// configuration files applied in order, root to leaf; later layers win
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigLayers {
    layers: Vec<ConfigFile>,
}

impl ConfigLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: ConfigFile) {
        self.layers.push(file);
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// source files in precedence order (lowest first)
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.layers.iter().map(|l| l.path.as_path())
    }

    /// value of a key from the highest-precedence layer defining it
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers.iter().rev().find_map(|l| l.get(key))
    }

    /// all keys merged into one map
    pub fn merged(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for layer in &self.layers {
            for (k, v) in &layer.entries {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    /// the `enabled` flag; true unless a layer sets it false
    pub fn enabled(&self) -> Result<bool> {
        let Some(layer) = self
            .layers
            .iter()
            .rev()
            .find(|l| l.entries.contains_key(KEY_ENABLED))
        else {
            return Ok(true);
        };

        let raw = layer.get(KEY_ENABLED).unwrap_or_default();
        parse_bool(raw).ok_or_else(|| Error::ConfigValue {
            path: layer.path.clone(),
            key: KEY_ENABLED.to_string(),
            message: format!("expected a boolean, got '{}'", raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file(name: &str, content: &str) -> ConfigFile {
        ConfigFile::parse(Path::new(name), content).unwrap()
    }

    #[test]
    fn test_parse_flat_and_sections() {
        let cfg = file(
            "a.toml",
            r#"
driver = "sysconf"
enabled = true
retries = 3
paths = ["/etc/hosts", "/etc/fstab"]

[sysconf]
root = "/"
"#,
        );

        assert_eq!(cfg.driver(), Some("sysconf"));
        assert_eq!(cfg.get("enabled"), Some("true"));
        assert_eq!(cfg.get("retries"), Some("3"));
        assert_eq!(cfg.get("paths"), Some("/etc/hosts /etc/fstab"));
        assert_eq!(cfg.get("sysconf.root"), Some("/"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let result = ConfigFile::parse(Path::new("bad.toml"), "driver = ");
        match result {
            Err(Error::ConfigParse { path, .. }) => assert_eq!(path, PathBuf::from("bad.toml")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_driver_is_none() {
        let cfg = file("a.toml", "driver = \"\"");
        assert_eq!(cfg.driver(), None);
    }

    #[test]
    fn test_layers_precedence() {
        let mut layers = ConfigLayers::new();
        layers.push(file("a.toml", "driver = \"one\"\nmode = \"root\"\nkeep = \"x\""));
        layers.push(file("a/b.toml", "mode = \"leaf\""));

        assert_eq!(layers.get("mode"), Some("leaf"));
        assert_eq!(layers.get("keep"), Some("x"));
        assert_eq!(layers.get("driver"), Some("one"));

        let merged = layers.merged();
        assert_eq!(merged.get("mode").map(String::as_str), Some("leaf"));
        assert_eq!(merged.len(), 3);

        let sources: Vec<_> = layers.sources().collect();
        assert_eq!(sources, vec![Path::new("a.toml"), Path::new("a/b.toml")]);
    }

    #[test]
    fn test_layers_enabled() {
        let mut layers = ConfigLayers::new();
        assert!(layers.enabled().unwrap());

        layers.push(file("a.toml", "enabled = false"));
        assert!(!layers.enabled().unwrap());

        layers.push(file("a/b.toml", "enabled = \"yes\""));
        assert!(layers.enabled().unwrap());

        layers.push(file("a/b/c.toml", "enabled = \"maybe\""));
        assert!(matches!(layers.enabled(), Err(Error::ConfigValue { .. })));
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gitstate.toml");

        let settings = Settings::new(
            "/etc/gitstate/branches",
            vec![PathBuf::from("/opt/drivers"), PathBuf::from("/usr/lib/drivers")],
        );
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(settings, loaded);
    }

    #[test]
    fn test_settings_minimal_toml() {
        let settings: Settings = toml::from_str("config_dir = \"/srv/cfg\"").unwrap();
        assert_eq!(settings.config_dir, PathBuf::from("/srv/cfg"));
        assert!(settings.driver_path.is_empty());
    }

    #[test]
    fn test_parse_search_path() {
        assert_eq!(
            parse_search_path("/a::/b:"),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert!(parse_search_path("").is_empty());
    }
}
