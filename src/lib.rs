//! gitstate - machine state in git branches
//!
//! tracks pieces of a machine's live state (config files, containers,
//! databases) as branches of a bare git repository. each branch is bound to
//! a driver, an external program that knows how to snapshot and restore
//! that piece of state.
//!
//! # Core concepts
//!
//! - **State branch**: a named unit of machine state, stored as `refs/heads/<branch>`
//! - **Driver**: executable implementing the list, status, commit and reset actions
//! - **Config tree**: one TOML file per branch prefix, layered root to leaf
//! - **Driver domain**: a config subtree whose branches the driver enumerates
//!
//! # Example usage
//!
//! ```no_run
//! use gitstate::{ops, ConfigTree, Repo, Settings};
//! use std::path::Path;
//!
//! let repo = Repo::open(Path::new("/var/lib/gitstate/state.git")).unwrap();
//! let tree = ConfigTree::from_settings(&Settings::default());
//!
//! // snapshot every container in one atomic batch
//! let options = ops::CommitOptions {
//!     message: "nightly".to_string(),
//!     ..Default::default()
//! };
//! let outcome = ops::commit(&repo, &tree, &["lxc/**".to_string()], &options).unwrap();
//! std::process::exit(outcome.exit_code());
//! ```

mod branch;
mod config;
mod error;
mod hash;
mod refs;
mod repo;
mod tree;

pub mod driver;
pub mod ops;
pub mod resolve;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use branch::{validate_branch, validate_pattern, PatternKind};
pub use config::{
    parse_search_path, ConfigFile, ConfigLayers, Settings, DEFAULT_CONFIG_DIR, DEFAULT_DRIVER_PATH,
    DEFAULT_REPO, SETTINGS_FILE,
};
pub use driver::{BranchStatus, Driver, DriverContext, ResetMode, StatusReport};
pub use error::{Error, Result};
pub use hash::Hash;
pub use refs::{
    branch_exists, head_summary, list_branches, list_staging_refs, read_branch, resolve_commit,
    StagedRef, Transaction,
};
pub use repo::{GitOutput, Repo, RepoLock};
pub use tree::{Binding, ConfigTree, Resolution};
