use tracing::{debug, info};

use crate::driver::CommitResult;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::refs::{resolve_commit, StagedRef, Transaction};
use crate::repo::Repo;
use crate::resolve::{expand, ExpandOptions};
use crate::tree::{ConfigTree, Resolution};

/// message used when none is given
pub const DEFAULT_MESSAGE: &str = "state snapshot";

/// commit options
#[derive(Clone, Debug)]
pub struct CommitOptions {
    pub message: String,
    pub author: Option<String>,
    pub allow_empty: bool,
    /// literal branches must already exist
    pub existing_only: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            message: DEFAULT_MESSAGE.to_string(),
            author: None,
            allow_empty: false,
            existing_only: false,
        }
    }
}

/// result of a commit batch
#[derive(Clone, Debug, Default)]
pub struct CommitOutcome {
    /// branches moved to new commits
    pub committed: Vec<StagedRef>,
    /// branches whose driver had nothing to commit
    pub unchanged: Vec<String>,
    /// disabled branches
    pub skipped: Vec<String>,
}

impl CommitOutcome {
    /// whether no branch moved
    pub fn nothing_committed(&self) -> bool {
        self.committed.is_empty()
    }

    /// one-line summary of the batch
    pub fn summary(&self) -> String {
        let mut line = format!("committed {} branch(es)", self.committed.len());
        if !self.unchanged.is_empty() {
            line.push_str(&format!(", {} unchanged", self.unchanged.len()));
        }
        if !self.skipped.is_empty() {
            line.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        line
    }

    pub fn exit_code(&self) -> i32 {
        if self.nothing_committed() {
            2
        } else {
            0
        }
    }
}

/// what happened to one branch of the batch
enum BranchCommit {
    Committed { commit: Hash, previous: Hash },
    Unchanged,
    Skipped,
}

/// snapshot the live state of every matching branch
///
/// all branches are committed first, each result staged under the
/// transaction namespace. only when every driver succeeded are the staged
/// commits promoted to their branches, in one ref transaction. a failing
/// driver aborts the batch with no branch moved.
pub fn commit(
    repo: &Repo,
    tree: &ConfigTree,
    patterns: &[String],
    options: &CommitOptions,
) -> Result<CommitOutcome> {
    let branches = expand(
        repo,
        tree,
        patterns,
        ExpandOptions {
            existing_only: options.existing_only,
        },
    )?;
    if branches.is_empty() {
        return Err(Error::usage("no branch to commit"));
    }

    let _lock = repo.lock()?;
    let mut tx = Transaction::begin();
    debug!(transaction = tx.id(), ?branches, "commit batch");

    let mut outcome = CommitOutcome::default();
    for branch in &branches {
        let result = commit_branch(repo, tree, branch, options).and_then(|result| {
            if let BranchCommit::Committed { commit, previous } = result {
                tx.stage(repo, branch, commit, previous)?;
            }
            Ok(result)
        });

        match result {
            Ok(BranchCommit::Committed { .. }) => {}
            Ok(BranchCommit::Unchanged) => outcome.unchanged.push(branch.clone()),
            Ok(BranchCommit::Skipped) => outcome.skipped.push(branch.clone()),
            Err(e) => {
                tx.discard(repo);
                return Err(e);
            }
        }
    }

    if tx.is_empty() {
        info!("nothing committed on {} branches", branches.len());
        return Ok(outcome);
    }

    outcome.committed = tx.promote(repo)?;
    for staged in &outcome.committed {
        info!(branch = %staged.branch, commit = %staged.commit.short(), "committed");
    }
    Ok(outcome)
}

fn commit_branch(
    repo: &Repo,
    tree: &ConfigTree,
    branch: &str,
    options: &CommitOptions,
) -> Result<BranchCommit> {
    let binding = match tree.load(repo, branch)? {
        Resolution::Bound(binding) => binding,
        Resolution::Disabled => {
            info!("skipping disabled branch {}", branch);
            return Ok(BranchCommit::Skipped);
        }
        Resolution::NotConfigured => return Err(Error::NotConfigured(branch.to_string())),
    };

    let driver = tree.driver(&binding);
    let ctx = binding.context(repo, binding.commit);

    let result = driver.commit(
        &ctx,
        &options.message,
        options.author.as_deref(),
        options.allow_empty,
    )?;

    match result {
        CommitResult::NothingToCommit => {
            debug!(branch, "nothing to commit");
            Ok(BranchCommit::Unchanged)
        }
        CommitResult::Committed(commit) => {
            // the driver must have written a real commit into the repository
            match resolve_commit(repo, &commit.to_hex()) {
                Ok(found) if found == commit => {}
                _ => {
                    return Err(Error::DriverContract {
                        driver: driver.name().to_string(),
                        branch: branch.to_string(),
                        message: format!("{} is not a commit in the repository", commit),
                    })
                }
            }

            Ok(BranchCommit::Committed {
                commit,
                previous: binding.commit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::{branch_exists, list_staging_refs, read_branch};
    use crate::testutil::{write_script, Fixture};

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn message(m: &str) -> CommitOptions {
        CommitOptions {
            message: m.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_all_success() {
        let fx = Fixture::new();
        fx.fake_branch("sysconf", "");
        fx.fake_branch("db", "");
        let before = fx.seed("db", "before");

        let outcome = commit(&fx.repo, &fx.tree, &patterns(&["sysconf", "db"]), &message("snap"))
            .unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.committed.len(), 2);
        for staged in &outcome.committed {
            assert_eq!(read_branch(&fx.repo, &staged.branch).unwrap(), staged.commit);
        }
        assert_eq!(outcome.committed[1].previous, before);
        assert!(list_staging_refs(&fx.repo).unwrap().is_empty());

        // the new commit of db continues its history
        let parent = fx
            .repo
            .git_run(["rev-parse", format!("{}^", outcome.committed[1].commit).as_str()])
            .unwrap();
        assert_eq!(parent.trim(), before.to_hex());
    }

    #[test]
    fn test_commit_is_atomic() {
        let fx = Fixture::new();
        fx.fake_branch("a", "");
        fx.fake_branch("b", "commit_exit = 1");
        fx.fake_branch("c", "");
        let old_c = fx.seed("c", "old c");

        let result = commit(&fx.repo, &fx.tree, &patterns(&["a", "b", "c"]), &message("snap"));
        assert!(matches!(result, Err(Error::DriverFailed { .. })));

        // a committed before b failed, but nothing was promoted
        assert!(!branch_exists(&fx.repo, "a").unwrap());
        assert_eq!(read_branch(&fx.repo, "c").unwrap(), old_c);
        assert!(list_staging_refs(&fx.repo).unwrap().is_empty());

        // c was never asked
        let calls = fx.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("commit ")).count(), 2);
    }

    #[test]
    fn test_commit_with_unchanged_branch() {
        let fx = Fixture::new();
        fx.fake_branch("a", "");
        fx.fake_branch("b", "commit_exit = 2");
        let old_b = fx.seed("b", "old b");

        let outcome =
            commit(&fx.repo, &fx.tree, &patterns(&["a", "b"]), &message("snap")).unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert!(!outcome.nothing_committed());
        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.committed[0].branch, "a");
        assert_eq!(outcome.unchanged, vec!["b"]);
        assert_eq!(outcome.summary(), "committed 1 branch(es), 1 unchanged");
        assert_eq!(read_branch(&fx.repo, "b").unwrap(), old_b);

        let subject = fx
            .repo
            .git_run(["log", "-1", "--format=%s", "refs/heads/a"])
            .unwrap();
        assert_eq!(subject.trim(), "snap [a:]");
    }

    #[test]
    fn test_commit_nothing_happened() {
        let fx = Fixture::new();
        fx.fake_branch("a", "commit_exit = 2");
        fx.fake_branch("off", "enabled = false");

        let outcome =
            commit(&fx.repo, &fx.tree, &patterns(&["a", "off"]), &message("snap")).unwrap();
        assert!(outcome.nothing_committed());
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(outcome.skipped, vec!["off"]);
        assert_eq!(
            outcome.summary(),
            "committed 0 branch(es), 1 unchanged, 1 skipped"
        );
    }

    #[test]
    fn test_commit_missing_hash_is_contract_violation() {
        let fx = Fixture::new();
        fx.fake_branch("a", "no_hash = \"yes\"");

        let result = commit(&fx.repo, &fx.tree, &patterns(&["a"]), &message("snap"));
        assert!(matches!(result, Err(Error::DriverContract { .. })));
    }

    #[test]
    fn test_commit_unknown_hash_is_contract_violation() {
        let fx = Fixture::new();
        let drivers = fx.dir.path().join("drivers");
        write_script(
            &drivers,
            "liar",
            "#!/bin/sh\necho 1111111111111111111111111111111111111111\n",
        );
        fx.configure("a", "driver = \"liar\"");

        let result = commit(&fx.repo, &fx.tree, &patterns(&["a"]), &message("snap"));
        assert!(matches!(result, Err(Error::DriverContract { .. })));
        assert!(!branch_exists(&fx.repo, "a").unwrap());
    }

    #[test]
    fn test_commit_over_wildcard() {
        let fx = Fixture::new();
        fx.fake_branch("lxc", "list = \"web db\"");

        let outcome =
            commit(&fx.repo, &fx.tree, &patterns(&["lxc/**"]), &message("nightly")).unwrap();
        let branches: Vec<&str> = outcome.committed.iter().map(|s| s.branch.as_str()).collect();
        assert_eq!(branches, vec!["lxc/web", "lxc/db"]);
        assert!(branch_exists(&fx.repo, "lxc/web").unwrap());
        assert!(branch_exists(&fx.repo, "lxc/db").unwrap());
    }

    #[test]
    fn test_commit_requirements() {
        let fx = Fixture::new();
        fx.fake_branch("a", "");

        // unconfigured branch is fatal
        assert!(matches!(
            commit(&fx.repo, &fx.tree, &patterns(&["a", "nowhere"]), &message("m")),
            Err(Error::NotConfigured(_))
        ));
        assert!(!branch_exists(&fx.repo, "a").unwrap());

        // existing-only refuses new branches
        let opts = CommitOptions {
            existing_only: true,
            ..message("m")
        };
        assert!(matches!(
            commit(&fx.repo, &fx.tree, &patterns(&["a"]), &opts),
            Err(Error::RefNotFound(_))
        ));

        // nothing to expand
        assert!(matches!(
            commit(&fx.repo, &fx.tree, &[], &message("m")),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_commit_refuses_concurrent_batch() {
        let fx = Fixture::new();
        fx.fake_branch("a", "");
        let _held = fx.repo.lock().unwrap();

        assert!(matches!(
            commit(&fx.repo, &fx.tree, &patterns(&["a"]), &message("m")),
            Err(Error::LockContention)
        ));
    }
}
