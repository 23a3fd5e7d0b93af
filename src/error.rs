use std::path::PathBuf;

/// error type for gitstate operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("invalid branch name: {0}")]
    InvalidBranch(String),

    #[error("pattern does not match any branch: {0}")]
    PatternNoMatch(String),

    #[error("branch is not configured: {0}")]
    NotConfigured(String),

    #[error("cannot read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for '{key}' in {path}: {message}")]
    ConfigValue {
        path: PathBuf,
        key: String,
        message: String,
    },

    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("driver '{driver}' broke the protocol on branch {branch}: {message}")]
    DriverContract {
        driver: String,
        branch: String,
        message: String,
    },

    #[error("driver '{driver}' failed on branch {branch} ({action}): {status}")]
    DriverFailed {
        driver: String,
        branch: String,
        action: &'static str,
        status: String,
    },

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("another batch is running on this repository")]
    LockContention,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// shorthand for a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
