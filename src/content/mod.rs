//! Content parsing and rendering

mod frontmatter;
mod markdown;

pub use frontmatter::PageMeta;
pub use markdown::MarkdownRenderer;
