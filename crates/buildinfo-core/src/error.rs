use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildInfoError {
    #[error("unit '{0}' is not part of the registered task graph")]
    UnknownUnit(String),

    #[error("unit '{0}' did work but produced no module fragment")]
    MissingFragment(String),

    #[error("failed to deploy '{path}': {message}")]
    Deploy { path: String, message: String },

    #[error("failed to publish build info: {0}")]
    Publish(String),

    #[error("failed writing {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: Box<BuildInfoError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl BuildInfoError {
    /// Wrap an I/O or serialization failure as a failed export of `path`.
    pub fn export(path: impl Into<PathBuf>, source: BuildInfoError) -> Self {
        Self::Export {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildInfoError>;
