//! ref store adapter over git plumbing
//!
//! state branches live under `refs/heads/`. multi-branch commits stage their
//! results under `refs/staging/<transaction>/` and promote them in a single
//! `update-ref --stdin` transaction.

use tracing::{debug, warn};

use crate::branch::{pattern_regex, validate_branch};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::repo::Repo;

/// ref namespace holding state branches
pub const BRANCH_PREFIX: &str = "refs/heads/";
/// ref namespace holding not-yet-promoted commit results
pub const STAGING_PREFIX: &str = "refs/staging/";

/// full ref name of a branch
pub fn branch_ref(branch: &str) -> String {
    format!("{}{}", BRANCH_PREFIX, branch)
}

/// branch name of a full ref, if it lives in the branch namespace
pub fn branch_from_ref(ref_name: &str) -> Option<&str> {
    ref_name
        .strip_prefix(BRANCH_PREFIX)
        .filter(|b| !b.is_empty())
}

/// current commit of a branch, or the null hash if it does not exist
pub fn read_branch(repo: &Repo, branch: &str) -> Result<Hash> {
    let output = repo.git_output([
        "rev-parse",
        "--verify",
        "--quiet",
        format!("{}^{{commit}}", branch_ref(branch)).as_str(),
    ])?;

    if !output.success() {
        return Ok(Hash::NULL);
    }
    Hash::from_hex(output.stdout.trim())
}

/// check if a branch ref exists
pub fn branch_exists(repo: &Repo, branch: &str) -> Result<bool> {
    let output = repo.git_output(["show-ref", "--verify", "--quiet", branch_ref(branch).as_str()])?;
    Ok(output.success())
}

/// resolve a branch name, ref or hash to a commit
///
/// a branch name takes precedence over other revisions of the same spelling.
/// the null hash resolves to itself.
pub fn resolve_commit(repo: &Repo, rev: &str) -> Result<Hash> {
    if rev.is_empty() || rev.starts_with('-') {
        return Err(Error::RefNotFound(rev.to_string()));
    }

    if Hash::looks_like_hex(rev) {
        let hash = Hash::from_hex(rev)?;
        if hash.is_null() {
            return Ok(hash);
        }
    }

    let candidate = if validate_branch(rev).is_ok() && branch_exists(repo, rev)? {
        branch_ref(rev)
    } else {
        rev.to_string()
    };

    let output = repo.git_output([
        "rev-parse",
        "--verify",
        "--quiet",
        format!("{}^{{commit}}", candidate).as_str(),
    ])?;

    if !output.success() {
        return Err(Error::RefNotFound(rev.to_string()));
    }
    Hash::from_hex(output.stdout.trim())
}

/// list all state branches
pub fn list_branches(repo: &Repo) -> Result<Vec<String>> {
    let out = repo.git_run(["for-each-ref", "--format=%(refname)", BRANCH_PREFIX])?;

    let mut branches: Vec<String> = out
        .lines()
        .filter_map(branch_from_ref)
        .map(str::to_string)
        .collect();

    branches.sort();
    Ok(branches)
}

/// list branches matching a wildcard pattern; each `*` matches at least
/// one character
pub fn list_branches_matching(repo: &Repo, pattern: &str) -> Result<Vec<String>> {
    let all = list_branches(repo)?;
    let regex = pattern_regex(pattern)?;

    Ok(all.into_iter().filter(|b| regex.is_match(b)).collect())
}

/// point a branch at `new`, or delete it when `new` is null
///
/// when `expected` is given the update only happens if the branch still
/// points there (null meaning "must not exist").
pub fn update_branch(repo: &Repo, branch: &str, new: &Hash, expected: Option<&Hash>) -> Result<()> {
    validate_branch(branch)?;
    let ref_name = branch_ref(branch);
    let message = format!("gitstate: update {}", branch);

    let mut args = vec!["update-ref".to_string(), "-m".to_string(), message];
    if new.is_null() {
        args.push("-d".to_string());
        args.push(ref_name);
    } else {
        args.push(ref_name);
        args.push(new.to_hex());
    }
    if let Some(old) = expected {
        args.push(old.to_hex());
    }

    repo.git_run(&args)?;
    debug!(branch, commit = %new, "branch updated");
    Ok(())
}

/// one-line description of a commit: abbreviated hash and subject
pub fn head_summary(repo: &Repo, hash: &Hash) -> Result<String> {
    if hash.is_null() {
        return Ok("(no commit)".to_string());
    }
    let out = repo.git_run(["log", "-1", "--format=%h %s", hash.to_hex().as_str()])?;
    Ok(out.trim().to_string())
}

/// a commit result waiting in the staging namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedRef {
    pub branch: String,
    /// new tip
    pub commit: Hash,
    /// tip observed before the driver ran
    pub previous: Hash,
}

/// a batch of branch updates staged under `refs/staging/<id>/`
#[derive(Debug)]
pub struct Transaction {
    id: String,
    staged: Vec<StagedRef>,
}

impl Transaction {
    /// start a transaction with a fresh time-ordered id
    pub fn begin() -> Self {
        Self {
            id: uuid::Uuid::now_v7().simple().to_string(),
            staged: vec![],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// staging ref holding the pending tip of `branch`
    pub fn staging_ref(&self, branch: &str) -> String {
        format!("{}{}/{}", STAGING_PREFIX, self.id, branch)
    }

    pub fn staged(&self) -> &[StagedRef] {
        &self.staged
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// record a new tip for `branch` without touching the branch itself
    pub fn stage(&mut self, repo: &Repo, branch: &str, commit: Hash, previous: Hash) -> Result<()> {
        validate_branch(branch)?;
        let ref_name = self.staging_ref(branch);
        repo.git_run(["update-ref", ref_name.as_str(), commit.to_hex().as_str()])?;

        self.staged.retain(|s| s.branch != branch);
        self.staged.push(StagedRef {
            branch: branch.to_string(),
            commit,
            previous,
        });
        debug!(transaction = %self.id, branch, %commit, "staged");
        Ok(())
    }

    /// copy every staged tip into its branch and drop the staging refs,
    /// all in one ref transaction. on failure nothing is promoted and the
    /// staging refs are dropped.
    pub fn promote(self, repo: &Repo) -> Result<Vec<StagedRef>> {
        if self.staged.is_empty() {
            return Ok(vec![]);
        }

        let mut script = String::new();
        for s in &self.staged {
            script.push_str(&format!(
                "update {} {} {}\n",
                branch_ref(&s.branch),
                s.commit.to_hex(),
                s.previous.to_hex()
            ));
            script.push_str(&format!(
                "delete {} {}\n",
                self.staging_ref(&s.branch),
                s.commit.to_hex()
            ));
        }

        let message = format!("gitstate: commit {}", self.id);
        if let Err(e) = repo.git_with_input(["update-ref", "-m", message.as_str(), "--stdin"], &script) {
            self.discard(repo);
            return Err(e);
        }
        debug!(transaction = %self.id, count = self.staged.len(), "promoted");
        Ok(self.staged)
    }

    /// delete the staging refs without promoting anything
    pub fn discard(self, repo: &Repo) {
        let mut script = String::new();
        for s in &self.staged {
            script.push_str(&format!("delete {}\n", self.staging_ref(&s.branch)));
        }
        if script.is_empty() {
            return;
        }
        if let Err(e) = repo.git_with_input(["update-ref", "--stdin"], &script) {
            warn!(transaction = %self.id, "cannot drop staging refs: {}", e);
        }
    }
}

/// list refs remaining in the staging namespace
pub fn list_staging_refs(repo: &Repo) -> Result<Vec<String>> {
    let out = repo.git_run(["for-each-ref", "--format=%(refname)", STAGING_PREFIX])?;
    Ok(out.lines().map(str::to_string).collect())
}
