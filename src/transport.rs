//! git transport passthrough
//!
//! remotes reach the state repository over ssh with a forced command running
//! `gitstate git-upload-pack` or `gitstate git-receive-pack`. the path the
//! client asked for is ignored; the configured repository is always served.

use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};
use crate::repo::Repo;

/// git service to run on the repository
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    /// git subcommand implementing the service
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "upload-pack",
            Service::ReceivePack => "receive-pack",
        }
    }
}

/// run a git service on the repository with inherited stdio, returning its
/// exit code
pub fn serve(repo: &Repo, service: Service) -> Result<i32> {
    debug!(service = service.as_str(), repo = %repo.path().display(), "serving");

    let status = Command::new("git")
        .arg(service.as_str())
        .arg(repo.path())
        .status()
        .map_err(|e| Error::Git {
            command: service.as_str().to_string(),
            message: e.to_string(),
        })?;

    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_commands() {
        assert_eq!(Service::UploadPack.as_str(), "upload-pack");
        assert_eq!(Service::ReceivePack.as_str(), "receive-pack");
    }
}
