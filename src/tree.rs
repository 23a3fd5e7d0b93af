//! configuration tree: one config file per branch path segment
//!
//! the file for branch prefix `a/b` lives at `<root>/a/b.toml`. walking a
//! branch from its first segment, every file found is layered over the
//! previous ones and the last file naming a driver becomes the driver root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::branch::{base_dir, literal_base, prefixes, validate_branch};
use crate::config::{ConfigFile, ConfigLayers, Settings, CONFIG_EXT};
use crate::driver::{Driver, DriverContext};
use crate::error::Result;
use crate::hash::Hash;
use crate::refs::read_branch;
use crate::repo::Repo;

/// a resolved driver binding for one branch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// the branch that was resolved
    pub branch: String,
    /// branch owning the driver
    pub root: String,
    /// remainder below the root, empty when the branch is the root
    pub sub_branch: String,
    /// driver name
    pub driver: String,
    /// merged configuration, root to leaf
    pub config: BTreeMap<String, String>,
    /// current tip of the branch, null if it does not exist
    pub commit: Hash,
}

impl Binding {
    /// driver context for this binding, comparing against `commit`
    pub fn context(&self, repo: &Repo, commit: Hash) -> DriverContext {
        DriverContext {
            git_dir: repo.path().to_path_buf(),
            root_branch: self.root.clone(),
            sub_branch: self.sub_branch.clone(),
            commit,
            config: self.config.clone(),
        }
    }
}

/// outcome of resolving a branch against the configuration tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Bound(Binding),
    /// no file on the path names a driver
    NotConfigured,
    /// `enabled = false` applies to the branch
    Disabled,
}

/// the per-branch configuration tree
#[derive(Clone, Debug)]
pub struct ConfigTree {
    root: PathBuf,
    driver_path: Vec<PathBuf>,
}

impl ConfigTree {
    pub fn new(root: impl Into<PathBuf>, driver_path: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            driver_path,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.config_dir, settings.driver_path.clone())
    }

    /// configuration root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// driver search directories
    pub fn driver_path(&self) -> &[PathBuf] {
        &self.driver_path
    }

    /// path of the config file owned by a branch prefix
    pub fn file_path(&self, prefix: &str) -> PathBuf {
        self.root.join(format!("{}.{}", prefix, CONFIG_EXT))
    }

    /// the driver executable of a binding
    pub fn driver(&self, binding: &Binding) -> Driver {
        Driver::locate(&binding.driver, &self.driver_path)
    }

    /// longest prefix of `branch` (itself included) whose config file names a driver
    pub fn resolve_driver_root(&self, branch: &str) -> Option<String> {
        prefixes(branch)
            .into_iter()
            .rev()
            .find(|prefix| self.names_driver(prefix))
            .map(str::to_string)
    }

    fn names_driver(&self, prefix: &str) -> bool {
        let path = self.file_path(prefix);
        if !path.is_file() {
            return false;
        }
        match ConfigFile::load(&path) {
            Ok(file) => file.driver().is_some(),
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                false
            }
        }
    }

    /// config files along the path of `branch`, root first, and the driver root
    pub fn layers(&self, branch: &str) -> Result<(ConfigLayers, Option<(String, String)>)> {
        let mut layers = ConfigLayers::new();
        let mut bound = None;

        for prefix in prefixes(branch) {
            let path = self.file_path(prefix);
            if !path.is_file() {
                continue;
            }

            let file = ConfigFile::load(&path)?;
            if let Some(driver) = file.driver() {
                bound = Some((prefix.to_string(), driver.to_string()));
            }
            layers.push(file);
        }

        Ok((layers, bound))
    }

    /// resolve the driver binding of a branch
    pub fn load(&self, repo: &Repo, branch: &str) -> Result<Resolution> {
        validate_branch(branch)?;
        let (layers, bound) = self.layers(branch)?;

        if !layers.enabled()? {
            debug!(branch, "branch disabled");
            return Ok(Resolution::Disabled);
        }

        let Some((root, driver)) = bound else {
            return Ok(Resolution::NotConfigured);
        };

        let sub_branch = branch
            .strip_prefix(root.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or_default()
            .to_string();

        Ok(Resolution::Bound(Binding {
            branch: branch.to_string(),
            root,
            sub_branch,
            driver,
            config: layers.merged(),
            commit: read_branch(repo, branch)?,
        }))
    }

    /// branches whose config file names a driver, under the literal base of `pattern`
    ///
    /// files that cannot be read are skipped with a warning.
    pub fn find_domains(&self, pattern: &str) -> Vec<String> {
        let base = literal_base(pattern);
        let dir = base_dir(pattern);
        let search_root = if dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(dir)
        };

        if !search_root.is_dir() {
            return vec![];
        }

        let mut domains = Vec::new();
        for entry in WalkDir::new(&search_root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable config entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(CONFIG_EXT)
            {
                continue;
            }

            let Some(branch) = self.branch_of(path) else {
                continue;
            };
            if !branch.starts_with(base) || validate_branch(&branch).is_err() {
                continue;
            }

            match ConfigFile::load(path) {
                Ok(file) if file.driver().is_some() => domains.push(branch),
                Ok(_) => {}
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }

        domains.sort();
        domains
    }

    /// branch prefix owning a config file path
    fn branch_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?.with_extension("");
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}
