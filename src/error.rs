use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MmToolsError>;

#[derive(Debug, Error)]
pub enum MmToolsError {
    #[error("unknown {axis} style `{style}`")]
    UnknownStyle { axis: &'static str, style: String },
    #[error("tool `{tool}` does not support style `{style}`")]
    UnsupportedStyle { tool: String, style: String },
    #[error("remote execution is not implemented for tool `{0}`")]
    RemoteNotImplemented(String),
    #[error("tool `{tool}` received invalid input: {reason}")]
    InvalidInput { tool: String, reason: String },
    #[error("engine for tool `{tool}` failed: {source}")]
    Engine {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("no engine factory registered for model `{0}`")]
    EngineNotRegistered(String),
    #[error("remote inference `{key}` failed: {reason}")]
    Remote { key: String, reason: String },
    #[error("tool `{0}` not registered")]
    ToolNotRegistered(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MmToolsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_input(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn engine(tool: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Engine {
            tool: tool.into(),
            source,
        }
    }
}
