//! Site configuration (site.yml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main site configuration.
///
/// Every field has a default so a project without a `site.yml` works out of
/// the box with the conventional `content/`, `layouts/`, `static/`, `out/`
/// layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site title, exposed to every template as `site_title`
    pub title: String,
    /// Default port for the development server
    pub port: u16,

    // Directories, relative to the project root
    pub content_dir: String,
    pub layouts_dir: String,
    pub static_dir: String,
    pub out_dir: String,

    /// Source extension matched (case-insensitively) during the content walk
    pub markup_ext: String,

    #[serde(default)]
    pub styles: StylesConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "mica site".to_string(),
            port: 3000,
            content_dir: "content".to_string(),
            layouts_dir: "layouts".to_string(),
            static_dir: "static".to_string(),
            out_dir: "out".to_string(),
            markup_ext: "md".to_string(),
            styles: StylesConfig::default(),
        }
    }
}

/// External stylesheet compilation step.
///
/// The command is run as `<command...> -i <input> -o <out_dir>/<output>`
/// after every build. The input path is relative to the project root, the
/// output path relative to the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    pub command: Vec<String>,
    pub input: String,
    pub output: String,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".to_string(), "@tailwindcss/cli".to_string()],
            input: "static/base.css".to_string(),
            output: "static/index.css".to_string(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        let config: SiteConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {:?}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SiteConfig::default();
        assert_eq!(config.content_dir, "content");
        assert_eq!(config.out_dir, "out");
        assert_eq!(config.markup_ext, "md");
        assert_eq!(config.port, 3000);
        assert_eq!(config.styles.command[0], "npx");
    }

    #[test]
    fn test_partial_override() {
        let yaml = "title: my blog\nport: 8080\n";
        let config: SiteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.title, "my blog");
        assert_eq!(config.port, 8080);
        // untouched fields keep their defaults
        assert_eq!(config.layouts_dir, "layouts");
        assert_eq!(config.styles.input, "static/base.css");
    }

    #[test]
    fn test_styles_override() {
        let yaml = r#"
styles:
  command: ["tailwindcss"]
  input: css/main.css
"#;
        let config: SiteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.styles.command, vec!["tailwindcss"]);
        assert_eq!(config.styles.input, "css/main.css");
        assert_eq!(config.styles.output, "static/index.css");
    }
}
