use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{
    container::ContainerError, filter::PatternError, framework::MissingArgument,
    neutralizer::NeutralizeError,
};

/// Fatal build failures; any of these aborts the whole build
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("entry file {path} is not readable")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bundled file {path} is not readable")]
    UnitUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write bundle to {path}")]
    TargetUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed source in {path}")]
    MalformedSource {
        path: PathBuf,
        #[source]
        source: NeutralizeError,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    MissingArgument(#[from] MissingArgument),

    #[error("arguments given for unknown command `{0}`")]
    UnknownCommand(String),

    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    #[error("build-time command `{command}` failed")]
    Command {
        command: String,
        #[source]
        source: anyhow::Error,
    },
}
