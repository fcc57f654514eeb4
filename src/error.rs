//! Error types for the collection pipeline
//!
//! Usage errors abort before anything is spawned or uploaded. Resolution
//! errors are caught by the provenance chain and never surface to the user.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no test command given; pass it after `--`, e.g. `codecomet -- go test ./...`")]
    EmptyCommand,

    #[error("unsupported test runner '{0}': only go and pytest are supported at this time")]
    UnsupportedFramework(String),

    #[error("expected `{program} {expected}`, got `{program} {found}`")]
    WrongSubcommand {
        program: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error(
        "an existing {0} argument is not supported; remove it and the supported coverage flags will be added"
    )]
    ConflictingCoverageFlag(String),

    #[error("{0} argument is missing its file")]
    MissingFlagValue(String),

    #[error("failed to create temporary {kind} file")]
    TempFile {
        kind: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to read report file {}", .path.display())]
    ReportFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no git repository found in {} or any parent directory", .0.display())]
    RepoNotFound(PathBuf),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to capture {0} of the test command")]
    StreamHandle(&'static str),

    #[error("failed to wait for the test command")]
    Wait(#[source] io::Error),
}

impl Error {
    /// True for errors caused by how the tool was invoked rather than by the
    /// environment it ran in.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::EmptyCommand
                | Error::UnsupportedFramework(_)
                | Error::WrongSubcommand { .. }
                | Error::ConflictingCoverageFlag(_)
                | Error::MissingFlagValue(_)
                | Error::ReportFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
