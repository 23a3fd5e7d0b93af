use std::ffi::OsStr;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::config::SETTINGS_FILE;
use crate::error::{Error, IoResultExt, Result};

/// the bare git repository backing all state branches
#[derive(Clone, Debug)]
pub struct Repo {
    path: PathBuf,
}

/// captured result of a git invocation
#[derive(Debug)]
pub struct GitOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

impl Repo {
    /// create the bare repository if it does not exist yet, then open it
    pub fn init(path: &Path) -> Result<Self> {
        if is_bare_repo(path) {
            debug!(path = %path.display(), "repository already initialized");
            return Ok(Self::at(path));
        }

        std::fs::create_dir_all(path).with_path(path)?;

        let output = Command::new("git")
            .arg("init")
            .arg("--bare")
            .arg("--quiet")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .with_path(path)?;

        if !output.status.success() {
            return Err(Error::Git {
                command: "init".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(path = %path.display(), "initialized bare repository");
        Ok(Self::at(path))
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        if !is_bare_repo(path) {
            return Err(Error::NoRepo(path.to_path_buf()));
        }
        Ok(Self::at(path))
    }

    fn at(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// repository root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// path to the hooks directory
    pub fn hooks_path(&self) -> PathBuf {
        self.path.join("hooks")
    }

    /// path to gitstate.toml
    pub fn settings_path(&self) -> PathBuf {
        self.path.join(SETTINGS_FILE)
    }

    /// path to lock file
    pub fn lock_path(&self) -> PathBuf {
        self.path.join("gitstate.lock")
    }

    /// a git command bound to this repository
    pub fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir").arg(&self.path);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// run git and capture its output, whatever the exit status
    pub fn git_output<I, S>(&self, args: I) -> Result<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let output = self.git().args(&args).output().map_err(|e| Error::Git {
            command: command_name(&args),
            message: e.to_string(),
        })?;

        Ok(GitOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// run git and return its stdout, failing on non-zero exit
    pub fn git_run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let output = self.git_output(&args)?;
        if !output.success() {
            return Err(Error::Git {
                command: command_name(&args),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// run git feeding `input` on stdin, failing on non-zero exit
    pub fn git_with_input<I, S>(&self, args: I, input: &str) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let command = command_name(&args);
        let git_err = |e: std::io::Error| Error::Git {
            command: command.clone(),
            message: e.to_string(),
        };

        let mut child = self
            .git()
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(git_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).map_err(git_err)?;
        }

        let output = child.wait_with_output().map_err(git_err)?;
        if !output.status.success() {
            return Err(Error::Git {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// acquire exclusive lock on repository
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;

        Ok(RepoLock { flock })
    }
}

/// guard that holds repository lock until dropped
pub struct RepoLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}
// lock is released automatically when Flock is dropped

fn is_bare_repo(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

fn command_name<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.first()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .unwrap_or_default()
}
