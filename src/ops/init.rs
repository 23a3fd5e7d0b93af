use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{IoResultExt, Result};
use crate::repo::Repo;

/// hooks installed into the backing repository, with the command they run
pub const HOOKS: &[(&str, &str)] = &[
    ("update", "git-hook-update"),
    ("pre-receive", "git-hook-pre-receive"),
];

/// set up the backing repository and configuration directory
///
/// safe to run again: an existing repository is kept, settings and hook
/// scripts are rewritten. `program` is the binary the hooks call back into.
pub fn init(path: &Path, settings: &Settings, program: &Path) -> Result<Repo> {
    let repo = Repo::init(path)?;

    fs::create_dir_all(&settings.config_dir).with_path(&settings.config_dir)?;
    settings.save(&repo.settings_path())?;

    let hooks = repo.hooks_path();
    fs::create_dir_all(&hooks).with_path(&hooks)?;
    for (name, command) in HOOKS {
        let hook = hooks.join(name);
        fs::write(&hook, hook_script(program, &repo, settings, command)).with_path(&hook)?;
        fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).with_path(&hook)?;
        debug!(hook = %hook.display(), "hook written");
    }

    info!(repo = %repo.path().display(), "repository ready");
    Ok(repo)
}

/// hook script exec'ing `program` with the repository settings
pub fn hook_script(program: &Path, repo: &Repo, settings: &Settings, command: &str) -> String {
    let mut args = vec![
        shell_quote(&program.to_string_lossy()),
        "--repo".to_string(),
        shell_quote(&repo.path().to_string_lossy()),
        "--config-dir".to_string(),
        shell_quote(&settings.config_dir.to_string_lossy()),
    ];
    if !settings.driver_path.is_empty() {
        args.push("--driver-path".to_string());
        args.push(shell_quote(&join_search_path(&settings.driver_path)));
    }
    args.push(command.to_string());

    format!("#!/bin/sh\nexec {} \"$@\"\n", args.join(" "))
}

fn join_search_path(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

/// quote a word for /bin/sh
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
