//! server-side git hooks run by the backing repository on push

use std::io::BufRead;

use tracing::{debug, info};

use crate::driver::ResetMode;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;
use crate::refs::branch_from_ref;
use crate::repo::Repo;
use crate::tree::ConfigTree;

use super::reset::{reset_branches, ResetOutcome};

/// `update` hook: apply a pushed commit to live state before git moves the ref
///
/// behaves like `reset --keep` on the pushed branch, so a push is refused
/// when the live state has diverged from the branch. git updates the ref
/// itself once the hook accepts.
pub fn git_hook_update(
    repo: &Repo,
    tree: &ConfigTree,
    ref_name: &str,
    old: &str,
    new: &str,
) -> Result<ResetOutcome> {
    let Some(branch) = branch_from_ref(ref_name) else {
        debug!(ref_name, "not a state branch, accepting");
        return Ok(ResetOutcome::default());
    };

    let old = Hash::from_hex(old)
        .map_err(|_| Error::usage(format!("invalid old commit: {}", old)))?;
    let new = Hash::from_hex(new)
        .map_err(|_| Error::usage(format!("invalid new commit: {}", new)))?;

    if new.is_null() {
        info!(branch, "branch deleted, live state left alone");
        return Ok(ResetOutcome::default());
    }

    debug!(branch, old = %old.short(), new = %new.short(), "applying push");
    Ok(reset_branches(
        repo,
        tree,
        &[branch.to_string()],
        ResetMode::Keep,
        Some(new),
        true,
    ))
}

/// `pre-receive` hook: log the pushed updates and accept them
pub fn git_hook_pre_receive(input: impl BufRead) -> Result<usize> {
    let mut count = 0;
    for line in input.lines() {
        let line = line.with_path("<stdin>")?;
        let mut parts = line.split_whitespace();
        if let (Some(old), Some(new), Some(ref_name)) = (parts.next(), parts.next(), parts.next())
        {
            debug!(ref_name, old, new, "incoming update");
            count += 1;
        }
    }
    Ok(count)
}
