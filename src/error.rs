//! Build error taxonomy

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning the source tree into the output tree.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Filesystem failure while resetting, copying or writing the output
    /// tree. Fatal for the build in progress.
    #[error("i/o failure during {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A single source file could not be rendered (unreadable, malformed
    /// front-matter, ...). The builder decides whether to skip the file or
    /// abort depending on the build mode.
    #[error("failed to render {path}: {reason}")]
    Render { path: PathBuf, reason: String },

    /// Layout templates could not be loaded or filled.
    #[error("template error in {template}: {source}")]
    Template {
        template: String,
        #[source]
        source: tera::Error,
    },

    /// The external stylesheet tool failed. Builds still complete with
    /// stale styles; callers log this instead of aborting.
    #[error("style build failed: {0}")]
    Styles(String),
}

impl BuildError {
    pub fn io(stage: &'static str, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }

    pub fn render(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Render {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
