use std::path::{Path, PathBuf};

/// dbbm error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No project file found walking upward from the working directory
    #[error("no dbbm.json found in {} or any parent directory", .start.display())]
    NoProject { start: PathBuf },

    /// Config JSON invalid, or a release/feature/task reference broken
    #[error("config error: {message}")]
    ConfigParse {
        message: String,
        path: Option<PathBuf>,
    },

    /// Baseline walk reached a release with no baseline and no backups
    #[error("no baseline backups found for release '{release}' or any of its ancestors")]
    NoBaseline { release: String },

    /// Baseline or active release name does not resolve
    #[error("unknown release: {0}")]
    UnknownRelease(String),

    /// Recipe references a feature that was never loaded
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Recipe uses an unregistered task kind
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// `--resume` but no resume file on disk
    #[error("--resume requested but {} does not exist", .0.display())]
    ResumeMissing(PathBuf),

    /// Resume file content does not parse as a hex state hash
    #[error("resume file holds an invalid state hash: {0}")]
    ResumeInvalid(String),

    /// Hex string is not a valid state hash
    #[error("invalid state hash: {0}")]
    InvalidHash(String),

    /// At least one transform requirement was not met
    #[error("command aborted due to unmet requirements")]
    UnmetRequirements,

    /// SQL subprocess exited non-zero
    #[error("sql failure: {0}")]
    Sql(String),

    /// File-system error during copy/restore/backup
    #[error("io error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Outer wrapper the deploy driver applies before surfacing an error
    #[error("blocking error detected")]
    Blocking(#[source] Box<Error>),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Config error with no file attribution.
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            path: None,
        }
    }

    /// Config error attributed to a file.
    pub fn config_in(message: impl Into<String>, path: &Path) -> Self {
        Error::ConfigParse {
            message: message.into(),
            path: Some(path.to_path_buf()),
        }
    }
}

/// Result type using the dbbm Error
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes per CLI contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Deployment (or other command) completed
    Success = 0,
    /// Deployment aborted by a blocking error
    DeployFailed = 1,
    /// Configuration or argument error
    ConfigError = 2,
    /// Internal error
    InternalError = 3,
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::NoProject { .. }
            | Error::ConfigParse { .. }
            | Error::UnknownRelease(_)
            | Error::UnknownFeature(_)
            | Error::UnknownTask(_) => ExitCode::ConfigError,
            Error::Blocking(inner) => ExitCode::from(inner.as_ref()),
            _ => ExitCode::DeployFailed,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
