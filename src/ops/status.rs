use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::driver::{BranchStatus, StatusReport};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::refs::{head_summary, resolve_commit};
use crate::repo::Repo;
use crate::resolve::{expand, ExpandOptions, ALL_BRANCHES};
use crate::tree::{ConfigTree, Resolution};

/// sign shown for branches whose status could not be determined
pub const FAILED_SIGN: char = '?';

/// status options
#[derive(Clone, Debug, Default)]
pub struct StatusOptions {
    pub report: StatusReport,
    /// compare every branch against this revision instead of its own tip
    pub against: Option<String>,
}

/// what a branch reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryState {
    Checked(BranchStatus),
    Failed(String),
}

/// status of one branch
#[derive(Clone, Debug)]
pub struct StatusEntry {
    pub branch: String,
    /// commit the live state was compared with
    pub base: Hash,
    pub state: EntryState,
    /// driver output for list and diff reports
    pub text: String,
}

impl StatusEntry {
    pub fn sign(&self) -> char {
        match &self.state {
            EntryState::Checked(status) => status.sign(),
            EntryState::Failed(_) => FAILED_SIGN,
        }
    }
}

/// statuses of a set of branches
#[derive(Clone, Debug, Default)]
pub struct StatusSummary {
    pub entries: Vec<StatusEntry>,
    /// head labels, parallel to `entries`, filled for list and diff reports
    pub heads: Vec<String>,
}

impl StatusSummary {
    /// branches whose status could not be determined
    pub fn failed(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| matches!(e.state, EntryState::Failed(_)))
            .map(|e| e.branch.as_str())
            .collect()
    }

    /// 0 if everything is clean, the shared code if all changed branches
    /// agree, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if !self.failed().is_empty() {
            return 1;
        }

        let codes: BTreeSet<i32> = self
            .entries
            .iter()
            .filter_map(|e| match e.state {
                EntryState::Checked(status) if !status.is_clean() => Some(status.code()),
                _ => None,
            })
            .collect();

        match codes.len() {
            0 => 0,
            1 => codes.into_iter().next().unwrap_or(1),
            _ => 1,
        }
    }

    /// output lines for a report
    pub fn render(&self, report: StatusReport) -> Vec<String> {
        let mut lines = Vec::new();
        if report == StatusReport::Quiet {
            return lines;
        }

        for (i, entry) in self.entries.iter().enumerate() {
            if report == StatusReport::Branches {
                lines.push(format!("{} {}", entry.sign(), entry.branch));
                continue;
            }

            let head = self.heads.get(i).map(String::as_str).unwrap_or_default();
            lines.push(format!("{} {}  {}", entry.sign(), entry.branch, head));
            if let EntryState::Failed(message) = &entry.state {
                lines.push(format!("    error: {}", message));
            }
            for line in entry.text.lines() {
                lines.push(format!("    {}", line));
            }
        }
        lines
    }
}

/// compare the live state of every matching branch with its commit
pub fn status(
    repo: &Repo,
    tree: &ConfigTree,
    patterns: &[String],
    options: &StatusOptions,
) -> Result<StatusSummary> {
    let against = options
        .against
        .as_deref()
        .map(|rev| resolve_commit(repo, rev))
        .transpose()
        .map_err(|e| match e {
            Error::RefNotFound(rev) => Error::usage(format!("unknown revision: {}", rev)),
            other => other,
        })?;

    let patterns = if patterns.is_empty() {
        vec![ALL_BRANCHES.to_string()]
    } else {
        patterns.to_vec()
    };
    let branches = expand(repo, tree, &patterns, ExpandOptions::default())?;

    let mut summary = StatusSummary::default();
    for branch in &branches {
        let Some(entry) = branch_status(repo, tree, branch, against, options.report) else {
            continue;
        };

        if options.report == StatusReport::List || options.report == StatusReport::Diff {
            let head = head_summary(repo, &entry.base).unwrap_or_else(|e| {
                debug!(branch = %entry.branch, "no head label: {}", e);
                entry.base.short()
            });
            summary.heads.push(head);
        }
        summary.entries.push(entry);
    }

    Ok(summary)
}

/// status of a single branch; None for disabled branches
fn branch_status(
    repo: &Repo,
    tree: &ConfigTree,
    branch: &str,
    against: Option<Hash>,
    report: StatusReport,
) -> Option<StatusEntry> {
    let failed = |base: Hash, e: Error| {
        warn!("{}: {}", branch, e);
        Some(StatusEntry {
            branch: branch.to_string(),
            base,
            state: EntryState::Failed(e.to_string()),
            text: String::new(),
        })
    };

    let binding = match tree.load(repo, branch) {
        Ok(Resolution::Bound(binding)) => binding,
        Ok(Resolution::Disabled) => {
            debug!(branch, "disabled, skipping");
            return None;
        }
        Ok(Resolution::NotConfigured) => {
            let base = against.unwrap_or_default();
            return failed(base, Error::NotConfigured(branch.to_string()));
        }
        Err(e) => return failed(against.unwrap_or_default(), e),
    };

    let base = against.unwrap_or(binding.commit);
    let driver = tree.driver(&binding);

    match driver.status(&binding.context(repo, base), report) {
        Ok(result) => Some(StatusEntry {
            branch: branch.to_string(),
            base,
            state: EntryState::Checked(result.status),
            text: result.text,
        }),
        Err(e) => failed(base, e),
    }
}
