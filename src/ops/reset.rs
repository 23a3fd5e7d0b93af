use tracing::{debug, info, warn};

use crate::driver::ResetMode;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::refs::{resolve_commit, update_branch};
use crate::repo::Repo;
use crate::resolve::{expand, ExpandOptions};
use crate::tree::{ConfigTree, Resolution};

/// reset options
#[derive(Clone, Debug, Default)]
pub struct ResetOptions {
    /// None picks keep with a target and hard without one
    pub mode: Option<ResetMode>,
    /// revision to move to; None re-applies each branch's own commit
    pub to: Option<String>,
    /// only touch live state, leave refs alone
    pub state_only: bool,
    pub existing_only: bool,
}

/// result of a reset batch
#[derive(Clone, Debug, Default)]
pub struct ResetOutcome {
    pub reset: Vec<String>,
    /// disabled branches
    pub skipped: Vec<String>,
    /// branch and reason
    pub failed: Vec<(String, String)>,
}

impl ResetOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            2
        }
    }

    /// one-line summary: branches reset, skipped and failed by name
    pub fn summary(&self) -> String {
        let mut line = format!("reset {} branch(es)", self.reset.len());
        if !self.skipped.is_empty() {
            line.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        if !self.failed.is_empty() {
            let names: Vec<&str> = self.failed.iter().map(|(b, _)| b.as_str()).collect();
            line.push_str(&format!(
                ", {} failed: {}",
                names.len(),
                names.join(", ")
            ));
        }
        line
    }
}

/// mode to run with, given what was asked for and whether a target was given
pub fn effective_mode(mode: Option<ResetMode>, has_target: bool) -> Result<ResetMode> {
    match (mode, has_target) {
        (None, true) => Ok(ResetMode::Keep),
        (None, false) | (Some(ResetMode::Hard), false) => Ok(ResetMode::Hard),
        (Some(mode), false) => Err(Error::usage(format!(
            "--{} needs a target commit",
            mode
        ))),
        (Some(mode), true) => Ok(mode),
    }
}

/// bring the live state of every matching branch to a commit
///
/// every branch is handled on its own: a failure is recorded and the batch
/// moves on.
pub fn reset(
    repo: &Repo,
    tree: &ConfigTree,
    patterns: &[String],
    options: &ResetOptions,
) -> Result<ResetOutcome> {
    let mode = effective_mode(options.mode, options.to.is_some())?;
    let target = resolve_target(repo, options.to.as_deref())?;

    let branches = expand(
        repo,
        tree,
        patterns,
        ExpandOptions {
            existing_only: options.existing_only,
        },
    )?;
    if branches.is_empty() {
        return Err(Error::usage("no branch to reset"));
    }

    let _lock = repo.lock()?;
    Ok(reset_branches(
        repo,
        tree,
        &branches,
        mode,
        target,
        options.state_only,
    ))
}

/// resolve the target revision once for the whole batch
pub(crate) fn resolve_target(repo: &Repo, to: Option<&str>) -> Result<Option<Hash>> {
    to.map(|rev| {
        resolve_commit(repo, rev).map_err(|e| match e {
            Error::RefNotFound(rev) => Error::usage(format!("unknown revision: {}", rev)),
            other => other,
        })
    })
    .transpose()
}

/// reset already-expanded branches without taking the batch lock
pub(crate) fn reset_branches(
    repo: &Repo,
    tree: &ConfigTree,
    branches: &[String],
    mode: ResetMode,
    target: Option<Hash>,
    state_only: bool,
) -> ResetOutcome {
    let mut outcome = ResetOutcome::default();

    for branch in branches {
        match reset_branch(repo, tree, branch, mode, target, state_only) {
            Ok(true) => outcome.reset.push(branch.clone()),
            Ok(false) => outcome.skipped.push(branch.clone()),
            Err(e) => {
                warn!("{}: {}", branch, e);
                outcome.failed.push((branch.clone(), e.to_string()));
            }
        }
    }

    outcome
}

/// reset one branch; false if it is disabled
fn reset_branch(
    repo: &Repo,
    tree: &ConfigTree,
    branch: &str,
    mode: ResetMode,
    target: Option<Hash>,
    state_only: bool,
) -> Result<bool> {
    let binding = match tree.load(repo, branch)? {
        Resolution::Bound(binding) => binding,
        Resolution::Disabled => {
            info!("skipping disabled branch {}", branch);
            return Ok(false);
        }
        Resolution::NotConfigured => return Err(Error::NotConfigured(branch.to_string())),
    };

    let target = target.unwrap_or(binding.commit);
    debug!(branch, %mode, target = %target.short(), "reset");

    if mode.touches_state() {
        let driver = tree.driver(&binding);
        driver.reset(&binding.context(repo, binding.commit), mode, target)?;
    }

    if !state_only && target != binding.commit {
        update_branch(repo, branch, &target, Some(&binding.commit))?;
        info!(branch, commit = %target.short(), "branch moved");
    }

    Ok(true)
}
