//! Error types.
//!
//! [`AnalysisError`] covers the conditions that stop a run. Anything that only
//! affects a single artifact is an [`ArtifactError`]; the collector downgrades
//! those to a "no data" cell.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("results directory {0} does not exist")]
    ResultsDirMissing(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("config file {0} not found")]
    ConfigMissing(PathBuf),

    #[error("unable to read config file {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to parse config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid cache geometry: {0}")]
    InvalidGeometry(String),

    #[error("unable to start worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("unable to open artifact {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to read artifact {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
