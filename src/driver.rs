//! state driver protocol
//!
//! a driver is an executable run without arguments. everything it needs is
//! passed through its environment, built here from a typed context; results
//! come back through stdout and the exit code.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use tracing::debug;

use crate::branch::{env_name, join};
use crate::config::{KEY_DRIVER, KEY_ENABLED};
use crate::error::{Error, Result};
use crate::hash::Hash;

/// prefix of driver-specific config keys in the driver environment
pub const CONF_ENV_PREFIX: &str = "STATE_CONF_";

/// exit code meaning "flat driver" for list and "nothing to commit" for commit
pub const EXIT_SOFT: i32 = 2;

/// variables owned by the protocol; inherited values are never passed through
pub const RESERVED_ENV: &[&str] = &[
    "STATE_DRIVER_ACTION",
    "STATE_STATUS_REPORT",
    "STATE_COMMIT",
    "STATE_BRANCH",
    "STATE_BRANCH_UC",
    "STATE_ROOT_BRANCH",
    "COMMIT_MESSAGE",
    "COMMIT_AUTHOR",
    "COMMIT_ALLOW_EMPTY",
    "RESET_MODE",
    "RESET_COMMIT",
    "GIT_DIR",
];

/// driver action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    List,
    Status,
    Commit,
    Reset,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Status => "status",
            Action::Commit => "commit",
            Action::Reset => "reset",
        }
    }
}

/// how much a status driver should print
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusReport {
    Quiet,
    #[default]
    Branches,
    List,
    Diff,
}

impl StatusReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReport::Quiet => "quiet",
            StatusReport::Branches => "branches",
            StatusReport::List => "list",
            StatusReport::Diff => "diff",
        }
    }
}

impl FromStr for StatusReport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quiet" => Ok(StatusReport::Quiet),
            "branches" => Ok(StatusReport::Branches),
            "list" => Ok(StatusReport::List),
            "diff" => Ok(StatusReport::Diff),
            _ => Err(Error::usage(format!("unknown status report: {}", s))),
        }
    }
}

/// how reset treats live state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    /// move the ref only
    Soft,
    /// overwrite live state from the target
    Hard,
    /// apply the target only if live state matches the current commit
    Keep,
    /// carry local changes across the move
    Merge,
}

impl ResetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetMode::Soft => "soft",
            ResetMode::Hard => "hard",
            ResetMode::Keep => "keep",
            ResetMode::Merge => "merge",
        }
    }

    /// whether the driver has to touch live state
    pub fn touches_state(&self) -> bool {
        !matches!(self, ResetMode::Soft)
    }
}

impl FromStr for ResetMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "soft" => Ok(ResetMode::Soft),
            "hard" => Ok(ResetMode::Hard),
            "keep" => Ok(ResetMode::Keep),
            "merge" => Ok(ResetMode::Merge),
            _ => Err(Error::usage(format!("unknown reset mode: {}", s))),
        }
    }
}

impl fmt::Display for ResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// live state of a branch compared to a commit, from the status exit code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchStatus {
    Clean,
    Dirty,
    Modified,
    Added,
    Deleted,
}

impl BranchStatus {
    /// map a status exit code; codes outside the protocol give None
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BranchStatus::Clean),
            1 => Some(BranchStatus::Dirty),
            5 => Some(BranchStatus::Modified),
            6 => Some(BranchStatus::Added),
            7 => Some(BranchStatus::Deleted),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            BranchStatus::Clean => 0,
            BranchStatus::Dirty => 1,
            BranchStatus::Modified => 5,
            BranchStatus::Added => 6,
            BranchStatus::Deleted => 7,
        }
    }

    /// one-letter sign used in status output
    pub fn sign(&self) -> char {
        match self {
            BranchStatus::Clean => ' ',
            BranchStatus::Dirty => '!',
            BranchStatus::Modified => 'M',
            BranchStatus::Added => 'A',
            BranchStatus::Deleted => 'D',
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, BranchStatus::Clean)
    }
}

/// branch-specific part of a driver invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverContext {
    /// backing repository, exported as GIT_DIR
    pub git_dir: PathBuf,
    /// branch owning the driver binding
    pub root_branch: String,
    /// path below the root branch, possibly empty
    pub sub_branch: String,
    /// reference commit: current tip, or the status comparison base
    pub commit: Hash,
    /// merged configuration of the branch
    pub config: BTreeMap<String, String>,
}

impl DriverContext {
    /// full branch name
    pub fn branch(&self) -> String {
        join(&self.root_branch, &self.sub_branch)
    }
}

/// action-specific part of a driver invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    List,
    Status {
        report: StatusReport,
    },
    Commit {
        message: String,
        author: Option<String>,
        allow_empty: bool,
    },
    Reset {
        mode: ResetMode,
        target: Hash,
    },
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::List => Action::List,
            Request::Status { .. } => Action::Status,
            Request::Commit { .. } => Action::Commit,
            Request::Reset { .. } => Action::Reset,
        }
    }
}

/// serialize an invocation into the driver's environment
pub fn environment(ctx: &DriverContext, request: &Request) -> Vec<(String, String)> {
    let mut env = vec![
        ("STATE_DRIVER_ACTION".to_string(), request.action().as_str().to_string()),
        ("STATE_COMMIT".to_string(), ctx.commit.to_hex()),
        ("STATE_BRANCH".to_string(), ctx.sub_branch.clone()),
        ("STATE_BRANCH_UC".to_string(), env_name(&ctx.sub_branch)),
        ("STATE_ROOT_BRANCH".to_string(), ctx.root_branch.clone()),
        ("GIT_DIR".to_string(), ctx.git_dir.to_string_lossy().into_owned()),
    ];

    match request {
        Request::List => {}
        Request::Status { report } => {
            env.push(("STATE_STATUS_REPORT".to_string(), report.as_str().to_string()));
        }
        Request::Commit {
            message,
            author,
            allow_empty,
        } => {
            env.push(("COMMIT_MESSAGE".to_string(), message.clone()));
            env.push((
                "COMMIT_AUTHOR".to_string(),
                author.clone().unwrap_or_default(),
            ));
            env.push(("COMMIT_ALLOW_EMPTY".to_string(), allow_empty.to_string()));
        }
        Request::Reset { mode, target } => {
            env.push(("RESET_MODE".to_string(), mode.as_str().to_string()));
            env.push(("RESET_COMMIT".to_string(), target.to_hex()));
        }
    }

    for (key, value) in &ctx.config {
        if key == KEY_DRIVER || key == KEY_ENABLED {
            continue;
        }
        env.push((format!("{}{}", CONF_ENV_PREFIX, env_name(key)), value.clone()));
    }

    env
}

/// raw result of a driver run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverOutput {
    pub code: i32,
    pub stdout: String,
}

/// what a list action reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    /// the driver does not enumerate sub-branches
    Flat,
    Names(Vec<String>),
}

/// what a commit action reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitResult {
    Committed(Hash),
    NothingToCommit,
}

/// what a status action reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusResult {
    pub status: BranchStatus,
    pub text: String,
}

/// a driver executable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Driver {
    name: String,
    program: PathBuf,
}

impl Driver {
    /// find a driver by name
    ///
    /// names with a slash are paths. otherwise the first search directory
    /// holding the name wins, and the bare name falls back to PATH lookup.
    pub fn locate(name: &str, search_path: &[PathBuf]) -> Self {
        let program = if name.contains('/') {
            PathBuf::from(name)
        } else {
            search_path
                .iter()
                .map(|dir| dir.join(name))
                .find(|p| p.is_file())
                .unwrap_or_else(|| PathBuf::from(name))
        };

        Self {
            name: name.to_string(),
            program,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// run the driver and capture stdout; stderr goes to the terminal
    pub fn invoke(&self, ctx: &DriverContext, request: &Request) -> Result<DriverOutput> {
        let action = request.action();
        debug!(
            driver = %self.name,
            branch = %ctx.branch(),
            action = action.as_str(),
            "invoking driver"
        );

        let mut cmd = Command::new(&self.program);
        for name in RESERVED_ENV {
            cmd.env_remove(name);
        }
        cmd.envs(environment(ctx, request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let output = cmd.output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::DriverNotFound(format!("{} ({})", self.name, self.program.display()))
            } else {
                self.failure(ctx, action, format!("cannot run: {}", e))
            }
        })?;

        let code = match output.status.code() {
            Some(code) => code,
            None => {
                let signal = output.status.signal().unwrap_or_default();
                return Err(self.failure(ctx, action, format!("killed by signal {}", signal)));
            }
        };

        debug!(driver = %self.name, code, "driver finished");
        Ok(DriverOutput {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    /// enumerate sub-branches
    pub fn list(&self, ctx: &DriverContext) -> Result<Listing> {
        let out = self.invoke(ctx, &Request::List)?;
        match out.code {
            0 => Ok(Listing::Names(
                out.stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            EXIT_SOFT => Ok(Listing::Flat),
            code => Err(self.failure(ctx, Action::List, format!("exit code {}", code))),
        }
    }

    /// compare live state with `ctx.commit`
    pub fn status(&self, ctx: &DriverContext, report: StatusReport) -> Result<StatusResult> {
        let out = self.invoke(ctx, &Request::Status { report })?;
        let status = BranchStatus::from_code(out.code).ok_or_else(|| Error::DriverContract {
            driver: self.name.clone(),
            branch: ctx.branch(),
            message: format!("status exit code {} is not part of the protocol", out.code),
        })?;

        Ok(StatusResult {
            status,
            text: out.stdout,
        })
    }

    /// export live state as a new commit
    pub fn commit(
        &self,
        ctx: &DriverContext,
        message: &str,
        author: Option<&str>,
        allow_empty: bool,
    ) -> Result<CommitResult> {
        let request = Request::Commit {
            message: message.to_string(),
            author: author.map(str::to_string),
            allow_empty,
        };
        let out = self.invoke(ctx, &request)?;

        match out.code {
            0 => {
                let line = out
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .last()
                    .unwrap_or_default();

                if line.is_empty() {
                    return Err(self.contract(ctx, "reported success without a commit hash"));
                }
                let hash = Hash::from_hex(line).map_err(|_| {
                    self.contract(ctx, &format!("printed '{}' instead of a commit hash", line))
                })?;
                if hash.is_null() {
                    return Err(self.contract(ctx, "printed the null hash as a new commit"));
                }
                Ok(CommitResult::Committed(hash))
            }
            EXIT_SOFT => Ok(CommitResult::NothingToCommit),
            code => Err(self.failure(ctx, Action::Commit, format!("exit code {}", code))),
        }
    }

    /// bring live state to `target`
    pub fn reset(&self, ctx: &DriverContext, mode: ResetMode, target: Hash) -> Result<()> {
        let out = self.invoke(ctx, &Request::Reset { mode, target })?;
        match out.code {
            0 => Ok(()),
            code => Err(self.failure(ctx, Action::Reset, format!("exit code {}", code))),
        }
    }

    fn failure(&self, ctx: &DriverContext, action: Action, status: String) -> Error {
        Error::DriverFailed {
            driver: self.name.clone(),
            branch: ctx.branch(),
            action: action.as_str(),
            status,
        }
    }

    fn contract(&self, ctx: &DriverContext, message: &str) -> Error {
        Error::DriverContract {
            driver: self.name.clone(),
            branch: ctx.branch(),
            message: message.to_string(),
        }
    }
}
