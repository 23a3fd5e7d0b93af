//! gitstate CLI - machine state in git branches

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};
use tracing::{debug, warn, Level};

use gitstate::ops::{self, CommitOptions, ResetOptions, StatusOptions, DEFAULT_MESSAGE};
use gitstate::resolve::{expand, ExpandOptions, ALL_BRANCHES};
use gitstate::transport::{serve, Service};
use gitstate::{
    parse_search_path, ConfigTree, Repo, ResetMode, Settings, StatusReport, DEFAULT_REPO,
    SETTINGS_FILE,
};

#[derive(Parser)]
#[command(name = "gitstate")]
#[command(about = "machine state tracked in git branches, one driver per branch")]
#[command(version)]
struct Cli {
    /// backing bare repository
    #[arg(long, global = true, env = "GITSTATE_REPO")]
    repo: Option<PathBuf>,

    /// root of the per-branch configuration tree
    #[arg(long, global = true, env = "GITSTATE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// colon-separated driver search path
    #[arg(long, global = true, env = "GITSTATE_DRIVER_PATH")]
    driver_path: Option<String>,

    /// debug logging
    #[arg(short, long, global = true, conflicts_with = "log_quiet")]
    verbose: bool,

    /// warnings and errors only
    #[arg(short = 'q', global = true)]
    log_quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// compare live state with the committed state
    #[command(group(ArgGroup::new("report").args(["quiet", "branches", "list", "diff"])))]
    Status {
        /// branches or patterns (default: all)
        patterns: Vec<String>,

        /// no output, exit status only
        #[arg(long)]
        quiet: bool,

        /// one line per branch (default)
        #[arg(long)]
        branches: bool,

        /// changed paths under each branch
        #[arg(long)]
        list: bool,

        /// full diff of each branch
        #[arg(long)]
        diff: bool,

        /// compare against this revision instead of each branch tip
        #[arg(long = "ref")]
        against: Option<String>,
    },

    /// snapshot live state into new commits, atomically across branches
    Commit {
        /// branches or patterns
        #[arg(required = true)]
        patterns: Vec<String>,

        /// commit message
        #[arg(short, long)]
        message: Option<String>,

        /// commit author
        #[arg(long)]
        author: Option<String>,

        /// let drivers create commits without changes
        #[arg(long)]
        allow_empty: bool,

        /// only commit branches that already exist
        #[arg(long)]
        existing: bool,

        /// print "<hash> <branch>" for every committed branch
        #[arg(long)]
        stdout: bool,
    },

    /// bring live state back to a commit
    #[command(group(ArgGroup::new("mode").args(["soft", "hard", "keep", "merge"])))]
    Reset {
        /// branches or patterns
        #[arg(required = true)]
        patterns: Vec<String>,

        /// revision to reset to (default: each branch's own commit)
        #[arg(long)]
        to: Option<String>,

        /// move the branch only
        #[arg(long)]
        soft: bool,

        /// overwrite live state
        #[arg(long)]
        hard: bool,

        /// refuse when live state diverged (default with --to)
        #[arg(long)]
        keep: bool,

        /// carry local changes over
        #[arg(long)]
        merge: bool,

        /// only reset branches that already exist
        #[arg(long)]
        existing: bool,

        /// touch live state only, leave branches where they are
        #[arg(long)]
        state_only: bool,
    },

    /// list the branches patterns expand to
    Ls {
        /// branches or patterns (default: all)
        patterns: Vec<String>,

        /// literal branches must exist
        #[arg(long)]
        existing: bool,
    },

    /// create the repository, configuration directory and hooks
    Init,

    /// serve fetches (ssh forced command)
    GitUploadPack {
        /// requested path, ignored
        path: Option<String>,
    },

    /// serve pushes (ssh forced command)
    GitReceivePack {
        /// requested path, ignored
        path: Option<String>,
    },

    /// pre-receive hook
    GitHookPreReceive,

    /// update hook: apply a pushed commit to live state
    GitHookUpdate {
        ref_name: String,
        old: String,
        new: String,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Status { .. } => "status",
            Commands::Commit { .. } => "commit",
            Commands::Reset { .. } => "reset",
            Commands::Ls { .. } => "ls",
            Commands::Init => "init",
            Commands::GitUploadPack { .. } => "git-upload-pack",
            Commands::GitReceivePack { .. } => "git-receive-pack",
            Commands::GitHookPreReceive => "git-hook-pre-receive",
            Commands::GitHookUpdate { .. } => "git-hook-update",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_quiet);

    let name = cli.command.name();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {}: {}", name, e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// repository path and settings: flags and environment first, then the
/// settings stored in the repository, then built-in defaults
fn load_settings(cli: &Cli) -> gitstate::Result<(PathBuf, Settings)> {
    let repo_path = cli
        .repo
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPO));

    let settings_path = repo_path.join(SETTINGS_FILE);
    let stored = if settings_path.is_file() {
        Settings::load(&settings_path)?
    } else {
        Settings::default()
    };

    let settings = Settings::new(
        cli.config_dir.clone().unwrap_or(stored.config_dir),
        cli.driver_path
            .as_deref()
            .map(parse_search_path)
            .unwrap_or(stored.driver_path),
    );
    debug!(repo = %repo_path.display(), ?settings, "settings");
    Ok((repo_path, settings))
}

fn open(repo_path: &Path, settings: &Settings) -> gitstate::Result<(Repo, ConfigTree)> {
    Ok((Repo::open(repo_path)?, ConfigTree::from_settings(settings)))
}

fn or_all(patterns: Vec<String>) -> Vec<String> {
    if patterns.is_empty() {
        vec![ALL_BRANCHES.to_string()]
    } else {
        patterns
    }
}

/// report picked by the status flags
fn status_report(quiet: bool, list: bool, diff: bool) -> StatusReport {
    if quiet {
        StatusReport::Quiet
    } else if list {
        StatusReport::List
    } else if diff {
        StatusReport::Diff
    } else {
        StatusReport::Branches
    }
}

/// exit status as a process exit code byte
fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn run(cli: Cli) -> gitstate::Result<u8> {
    let (repo_path, settings) = load_settings(&cli)?;

    match cli.command {
        Commands::Status {
            patterns,
            quiet,
            branches: _,
            list,
            diff,
            against,
        } => {
            let report = status_report(quiet, list, diff);
            let (repo, tree) = open(&repo_path, &settings)?;
            let options = StatusOptions { report, against };
            let summary = ops::status(&repo, &tree, &patterns, &options)?;

            for line in summary.render(report) {
                println!("{}", line);
            }
            let failed = summary.failed();
            if !failed.is_empty() {
                warn!("status failed on: {}", failed.join(", "));
            }
            Ok(exit_code(summary.exit_code()))
        }

        Commands::Commit {
            patterns,
            message,
            author,
            allow_empty,
            existing,
            stdout,
        } => {
            let (repo, tree) = open(&repo_path, &settings)?;
            let options = CommitOptions {
                message: message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
                author,
                allow_empty,
                existing_only: existing,
            };
            let outcome = ops::commit(&repo, &tree, &patterns, &options)?;

            if outcome.nothing_committed() {
                println!("No commit happened actually");
            }
            if stdout {
                for staged in &outcome.committed {
                    println!("{} {}", staged.commit, staged.branch);
                }
            }
            eprintln!("{}", outcome.summary());
            Ok(exit_code(outcome.exit_code()))
        }

        Commands::Reset {
            patterns,
            to,
            soft,
            hard,
            keep,
            merge,
            existing,
            state_only,
        } => {
            let mode = [
                (soft, ResetMode::Soft),
                (hard, ResetMode::Hard),
                (keep, ResetMode::Keep),
                (merge, ResetMode::Merge),
            ]
            .into_iter()
            .find_map(|(set, mode)| set.then_some(mode));

            let (repo, tree) = open(&repo_path, &settings)?;
            let options = ResetOptions {
                mode,
                to,
                state_only,
                existing_only: existing,
            };
            let outcome = ops::reset(&repo, &tree, &patterns, &options)?;

            eprintln!("{}", outcome.summary());
            Ok(exit_code(outcome.exit_code()))
        }

        Commands::Ls { patterns, existing } => {
            let (repo, tree) = open(&repo_path, &settings)?;
            let options = ExpandOptions {
                existing_only: existing,
            };
            for branch in expand(&repo, &tree, &or_all(patterns), options)? {
                println!("{}", branch);
            }
            Ok(0)
        }

        Commands::Init => {
            let program = std::env::current_exe()
                .map_err(|source| gitstate::Error::Io {
                    path: PathBuf::from("/proc/self/exe"),
                    source,
                })?;
            let repo = ops::init(&repo_path, &settings, &program)?;
            println!("initialized gitstate repository at {}", repo.path().display());
            Ok(0)
        }

        Commands::GitUploadPack { path } => {
            debug!(?path, "ignoring requested path");
            let repo = Repo::open(&repo_path)?;
            Ok(exit_code(serve(&repo, Service::UploadPack)?))
        }

        Commands::GitReceivePack { path } => {
            debug!(?path, "ignoring requested path");
            let repo = Repo::open(&repo_path)?;
            Ok(exit_code(serve(&repo, Service::ReceivePack)?))
        }

        Commands::GitHookPreReceive => {
            let count = ops::git_hook_pre_receive(io::stdin().lock())?;
            debug!(count, "pre-receive accepted");
            Ok(0)
        }

        Commands::GitHookUpdate { ref_name, old, new } => {
            let (repo, tree) = open(&repo_path, &settings)?;
            let outcome = ops::git_hook_update(&repo, &tree, &ref_name, &old, &new)?;

            eprintln!("{}", outcome.summary());
            Ok(exit_code(outcome.exit_code()))
        }
    }
}
