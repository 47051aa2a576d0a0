//! mica: a small local-first static site generator with live reload
//!
//! Markdown sources under `content/` are rendered through Tera layouts from
//! `layouts/` into `out/`, with `static/` copied alongside. In serve mode
//! the content and layout trees are watched, every change triggers a full
//! rebuild, and connected browsers are told to refresh.

pub mod builder;
pub mod config;
pub mod content;
pub mod error;
pub mod server;
pub mod styles;
pub mod watcher;

use anyhow::Result;
use std::path::{Path, PathBuf};

use builder::{BuildMode, BuildSummary, Builder};
use error::BuildError;

/// A site project: configuration plus resolved directories.
#[derive(Clone)]
pub struct Site {
    pub config: config::SiteConfig,
    pub base_dir: PathBuf,
    pub content_dir: PathBuf,
    pub layouts_dir: PathBuf,
    pub static_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl Site {
    /// Create a site rooted at a directory, loading `site.yml` when present.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("site.yml");

        let config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            config::SiteConfig::default()
        };

        let content_dir = base_dir.join(&config.content_dir);
        let layouts_dir = base_dir.join(&config.layouts_dir);
        let static_dir = base_dir.join(&config.static_dir);
        let out_dir = base_dir.join(&config.out_dir);

        Ok(Self {
            config,
            base_dir,
            content_dir,
            layouts_dir,
            static_dir,
            out_dir,
        })
    }

    /// Run a full build of the output tree.
    pub fn build(&self, mode: BuildMode) -> Result<BuildSummary, BuildError> {
        Builder::new(self)?.build(mode)
    }

    /// Directories whose changes trigger a rebuild.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        vec![self.content_dir.clone(), self.layouts_dir.clone()]
    }
}
