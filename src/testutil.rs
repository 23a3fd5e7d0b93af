//! fixtures shared by unit tests: a bare repository, a config tree and a
//! scriptable fake driver

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::hash::Hash;
use crate::repo::Repo;
use crate::tree::ConfigTree;

const IDENTITY: [(&str, &str); 4] = [
    ("GIT_AUTHOR_NAME", "gitstate test"),
    ("GIT_AUTHOR_EMAIL", "test@example.com"),
    ("GIT_COMMITTER_NAME", "gitstate test"),
    ("GIT_COMMITTER_EMAIL", "test@example.com"),
];

/// fake driver, steered by the branch configuration:
///
/// - `list`: space-separated names; unset means a flat driver
/// - `status_exit`, `commit_exit`, `reset_exit`: exit codes to return
/// - `no_hash`: commit succeeds without printing a hash
/// - `diverged`: keep-mode resets fail
/// - `log`: file receiving one line per invocation
const FAKE_DRIVER: &str = r#"#!/bin/sh
export GIT_AUTHOR_NAME="gitstate test" GIT_AUTHOR_EMAIL=test@example.com
export GIT_COMMITTER_NAME="gitstate test" GIT_COMMITTER_EMAIL=test@example.com

if [ -n "$STATE_CONF_LOG" ]; then
    echo "$STATE_DRIVER_ACTION root=$STATE_ROOT_BRANCH sub=$STATE_BRANCH commit=$STATE_COMMIT report=$STATE_STATUS_REPORT mode=$RESET_MODE target=$RESET_COMMIT msg=$COMMIT_MESSAGE" >> "$STATE_CONF_LOG"
fi

case "$STATE_DRIVER_ACTION" in
list)
    [ -n "$STATE_CONF_LIST" ] || exit 2
    for name in $STATE_CONF_LIST; do
        echo "$name"
    done
    ;;
status)
    if [ "$STATE_STATUS_REPORT" != quiet ] && [ "$STATE_STATUS_REPORT" != branches ]; then
        echo "status of $STATE_ROOT_BRANCH:$STATE_BRANCH"
    fi
    exit "${STATE_CONF_STATUS_EXIT:-0}"
    ;;
commit)
    code="${STATE_CONF_COMMIT_EXIT:-0}"
    [ "$code" = 0 ] || exit "$code"
    [ -z "$STATE_CONF_NO_HASH" ] || exit 0
    tree=$(git mktree < /dev/null) || exit 1
    if [ "$STATE_COMMIT" = 0000000000000000000000000000000000000000 ]; then
        git commit-tree "$tree" -m "$COMMIT_MESSAGE [$STATE_ROOT_BRANCH:$STATE_BRANCH]"
    else
        git commit-tree "$tree" -p "$STATE_COMMIT" -m "$COMMIT_MESSAGE [$STATE_ROOT_BRANCH:$STATE_BRANCH]"
    fi
    ;;
reset)
    if [ "$RESET_MODE" = keep ] && [ -n "$STATE_CONF_DIVERGED" ]; then
        echo "live state diverged from $STATE_COMMIT" >&2
        exit 1
    fi
    exit "${STATE_CONF_RESET_EXIT:-0}"
    ;;
esac
"#;

/// write an executable script
pub fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// a fresh bare repository in a temporary directory
pub fn test_repo() -> (TempDir, Repo) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repo::init(&dir.path().join("state.git")).unwrap();
    (dir, repo)
}

/// create a commit with an empty tree
pub fn empty_commit(repo: &Repo, message: &str) -> Hash {
    let tree = repo.git_with_input(["mktree"], "").unwrap();
    let output = repo
        .git()
        .args(["commit-tree", tree.trim(), "-m", message])
        .envs(IDENTITY)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "commit-tree failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Hash::from_hex(String::from_utf8_lossy(&output.stdout).trim()).unwrap()
}

/// repository, config tree and fake driver under one temporary directory
pub struct Fixture {
    pub dir: TempDir,
    pub repo: Repo,
    pub tree: ConfigTree,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("state.git")).unwrap();

        let config_dir = dir.path().join("branches");
        let driver_dir = dir.path().join("drivers");
        fs::create_dir_all(&config_dir).unwrap();
        fs::create_dir_all(&driver_dir).unwrap();
        write_script(&driver_dir, "fake", FAKE_DRIVER);

        let tree = ConfigTree::new(config_dir, vec![driver_dir]);
        Self { dir, repo, tree }
    }

    /// write the config file of a branch prefix
    pub fn configure(&self, prefix: &str, content: &str) {
        let path = self.tree.file_path(prefix);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// configure a branch served by the fake driver, logging its calls
    pub fn fake_branch(&self, prefix: &str, extra: &str) {
        self.configure(
            prefix,
            &format!(
                "driver = \"fake\"\nlog = \"{}\"\n{}",
                self.log_path().display(),
                extra
            ),
        );
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// driver invocations logged so far
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// create a commit and point `branch` at it
    pub fn seed(&self, branch: &str, message: &str) -> Hash {
        let commit = empty_commit(&self.repo, message);
        crate::refs::update_branch(&self.repo, branch, &commit, None).unwrap();
        commit
    }
}
