//! Output builder - turns the content tree into the output tree
//!
//! Every build is a full rebuild: the output directory is deleted and
//! recreated, static assets are copied verbatim, and the content tree is
//! walked twice. The first pass renders markdown and indexes every page
//! marked `type: post`; the second pass fills templates, so the post list a
//! template sees is always complete regardless of walk order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tera::Tera;
use walkdir::WalkDir;

use crate::content::{MarkdownRenderer, PageMeta};
use crate::error::BuildError;
use crate::Site;

/// Script appended to every rendered page at build time. Opens the reload
/// channel and refreshes on any message; the re-established connection after
/// the refresh comes from the freshly served copy of this same snippet.
pub const RELOAD_SCRIPT: &str = r#"
<script>
(function () {
  var ws = new WebSocket("ws://" + location.host + "/reload");
  ws.onmessage = function () { location.reload(); };
})();
</script>
"#;

/// How failures in a single file are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Build-and-exit: abort on the first broken file
    OneShot,
    /// Watch-and-serve: skip broken files so one bad save does not blank
    /// the whole site
    Serve,
}

impl BuildMode {
    fn fail_fast(self) -> bool {
        matches!(self, BuildMode::OneShot)
    }
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub pages: usize,
    pub posts: usize,
    pub skipped: usize,
}

/// Per-build template state. Created fresh for every build and discarded
/// afterwards; nothing here survives across builds.
struct BuildContext {
    site_title: String,
    posts: Vec<PostEntry>,
}

/// One entry of the aggregate post list exposed to templates as `posts`.
#[derive(Debug, Clone, Serialize)]
struct PostEntry {
    title: String,
    desc: Option<String>,
    date: Option<String>,
    tags: Vec<String>,
    href: String,
}

/// A content file after the first pass: markdown rendered, metadata parsed,
/// template not yet filled.
struct PageDraft {
    rel: PathBuf,
    meta: PageMeta,
    body: String,
}

pub struct Builder<'a> {
    site: &'a Site,
    renderer: MarkdownRenderer,
    tera: Tera,
    default_template: Option<String>,
}

impl<'a> Builder<'a> {
    /// Load layouts and discover the default one (first file whose name
    /// starts with `_`, in sorted order).
    pub fn new(site: &'a Site) -> Result<Self, BuildError> {
        let pattern = format!("{}/**/*", site.layouts_dir.display());
        let mut tera = Tera::new(&pattern).map_err(|source| BuildError::Template {
            template: site.config.layouts_dir.clone(),
            source,
        })?;
        // pages are HTML already; escaping would mangle the rendered body
        tera.autoescape_on(vec![]);

        let default_template =
            find_default_layout(&site.layouts_dir).map_err(|e| BuildError::io("scan layouts", e))?;
        if let Some(name) = &default_template {
            tracing::debug!("default layout: {}", name);
        }

        Ok(Self {
            site,
            renderer: MarkdownRenderer::new(),
            tera,
            default_template,
        })
    }

    /// Run a full build.
    pub fn build(&self, mode: BuildMode) -> Result<BuildSummary, BuildError> {
        let start = Instant::now();

        self.reset_out_dir()?;
        self.copy_static()?;

        let sources = self.collect_sources();
        let mut summary = BuildSummary::default();

        // first pass: render markdown and index posts
        let mut drafts = Vec::with_capacity(sources.len());
        for src in &sources {
            match self.load_page(src) {
                Ok(draft) => drafts.push(draft),
                Err(e) if mode.fail_fast() => return Err(e),
                Err(e) => {
                    tracing::error!("skipping file: {}", e);
                    summary.skipped += 1;
                }
            }
        }

        let context = BuildContext {
            site_title: self.site.config.title.clone(),
            posts: drafts
                .iter()
                .filter(|d| d.meta.is_post())
                .map(post_entry)
                .collect(),
        };
        summary.posts = context.posts.len();

        // second pass: fill templates with the complete post list
        for draft in &drafts {
            match self.write_page(draft, &context) {
                Ok(()) => summary.pages += 1,
                Err(e) if mode.fail_fast() => return Err(e),
                Err(e) => {
                    tracing::error!("skipping page: {}", e);
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            "built {} pages ({} posts, {} skipped) in {:.2}s",
            summary.pages,
            summary.posts,
            summary.skipped,
            start.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    fn reset_out_dir(&self) -> Result<(), BuildError> {
        let out = &self.site.out_dir;
        if out.exists() {
            fs::remove_dir_all(out).map_err(|e| BuildError::io("reset output dir", e))?;
        }
        fs::create_dir_all(out).map_err(|e| BuildError::io("create output dir", e))
    }

    /// Copy the static tree byte-for-byte into `<out>/<static>/`
    fn copy_static(&self) -> Result<(), BuildError> {
        let src_root = &self.site.static_dir;
        if !src_root.exists() {
            return Ok(());
        }
        let dest_root = self.site.out_dir.join(&self.site.config.static_dir);

        for entry in WalkDir::new(src_root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let rel = path.strip_prefix(src_root).unwrap_or(path);
            let dest = dest_root.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io("create static dir", e))?;
            }
            fs::copy(path, &dest).map_err(|e| BuildError::io("copy static asset", e))?;
        }
        Ok(())
    }

    /// Every file under the content root with the configured markup
    /// extension, sorted so builds are reproducible across filesystems.
    fn collect_sources(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.site.content_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file() && has_extension(e.path(), &self.site.config.markup_ext))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    fn load_page(&self, src: &Path) -> Result<PageDraft, BuildError> {
        let raw = fs::read_to_string(src)
            .map_err(|e| BuildError::render(src, format!("read failed: {}", e)))?;
        let (meta, body_md) =
            PageMeta::parse(&raw).map_err(|e| BuildError::render(src, e.to_string()))?;
        let body = self
            .renderer
            .render(body_md)
            .map_err(|e| BuildError::render(src, e.to_string()))?;
        let rel = src
            .strip_prefix(&self.site.content_dir)
            .unwrap_or(src)
            .to_path_buf();
        Ok(PageDraft { rel, meta, body })
    }

    fn write_page(&self, draft: &PageDraft, context: &BuildContext) -> Result<(), BuildError> {
        let out_rel = output_rel_path(&draft.rel, &draft.meta);
        let dest = self.site.out_dir.join(&out_rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io("create output dir", e))?;
        }

        let template = draft
            .meta
            .explicit_template()
            .map(str::to_string)
            .or_else(|| self.default_template.clone())
            .ok_or_else(|| {
                BuildError::render(
                    draft.rel.as_path(),
                    "no template set and no default layout found",
                )
            })?;

        let mut tctx = tera::Context::new();
        tctx.insert("site_title", &context.site_title);
        tctx.insert("posts", &context.posts);
        tctx.insert("title", &draft.meta.title);
        tctx.insert("body", &draft.body);
        tctx.insert("desc", &draft.meta.desc);
        tctx.insert("tags", &draft.meta.tags);
        tctx.insert("date", &display_date(&draft.meta));

        let mut html = self.tera.render(&template, &tctx).map_err(|source| {
            BuildError::Template {
                template: template.clone(),
                source,
            }
        })?;
        html.push_str(RELOAD_SCRIPT);

        fs::write(&dest, html).map_err(|e| BuildError::io("write page", e))?;
        tracing::debug!(
            "rendered {} -> {} ({})",
            draft.rel.display(),
            out_rel.display(),
            template
        );
        Ok(())
    }
}

/// Output path relative to the output root: same directory as the source,
/// extension rewritten to `.html` unless the front-matter overrides the
/// filename.
fn output_rel_path(rel: &Path, meta: &PageMeta) -> PathBuf {
    match meta.filename_override() {
        Some(name) => rel.with_file_name(name),
        None => rel.with_extension("html"),
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn display_date(meta: &PageMeta) -> Option<String> {
    meta.parse_date()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .or_else(|| meta.date.clone())
}

fn post_entry(draft: &PageDraft) -> PostEntry {
    let out_rel = output_rel_path(&draft.rel, &draft.meta);
    let href = format!("/{}", out_rel.to_string_lossy().replace('\\', "/"));
    PostEntry {
        title: draft.meta.title.clone(),
        desc: draft.meta.desc.clone(),
        date: display_date(&draft.meta),
        tags: draft.meta.tags.clone(),
        href,
    }
}

/// First file in the layouts directory whose name starts with `_`
fn find_default_layout(layouts_dir: &Path) -> std::io::Result<Option<String>> {
    if !layouts_dir.exists() {
        return Ok(None);
    }
    let mut names: Vec<String> = fs::read_dir(layouts_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with('_'))
        .collect();
    names.sort();
    Ok(names.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DEFAULT_LAYOUT: &str =
        "<html><head><title>{{ title }} | {{ site_title }}</title></head><body>{{ body }}</body></html>";

    fn site_fixture(root: &Path) -> Site {
        fs::create_dir_all(root.join("content")).unwrap();
        fs::create_dir_all(root.join("layouts")).unwrap();
        fs::write(root.join("layouts/_default.html"), DEFAULT_LAYOUT).unwrap();
        Site::new(root).unwrap()
    }

    fn build(site: &Site, mode: BuildMode) -> Result<BuildSummary, BuildError> {
        Builder::new(site)?.build(mode)
    }

    #[test]
    fn test_output_mirrors_content_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("hello.md"), "# Hi\n").unwrap();
        fs::create_dir_all(site.content_dir.join("notes")).unwrap();
        fs::write(site.content_dir.join("notes/a.md"), "body\n").unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        assert!(site.out_dir.join("hello.html").exists());
        assert!(site.out_dir.join("notes/a.html").exists());
    }

    #[test]
    fn test_filename_override() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(
            site.content_dir.join("page.md"),
            "---\ntitle: t\nfilename: custom.htm\n---\nbody\n",
        )
        .unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        assert!(site.out_dir.join("custom.htm").exists());
        assert!(!site.out_dir.join("page.html").exists());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("UPPER.MD"), "body\n").unwrap();
        fs::write(site.content_dir.join("skip.txt"), "not markup\n").unwrap();

        let summary = build(&site, BuildMode::OneShot).unwrap();

        assert_eq!(summary.pages, 1);
        assert!(site.out_dir.join("UPPER.html").exists());
        assert!(!site.out_dir.join("skip.html").exists());
    }

    #[test]
    fn test_posts_visible_to_pages_processed_earlier() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(
            site.layouts_dir.join("_default.html"),
            "{% for p in posts %}[{{ p.title }}]({{ p.href }}){% endfor %}{{ body }}",
        )
        .unwrap();
        // index.md sorts before the post file in walk order; the two-pass
        // build must still hand it the full list
        fs::write(site.content_dir.join("index.md"), "home\n").unwrap();
        fs::write(
            site.content_dir.join("zzz-post.md"),
            "---\ntitle: My Post\ntype: post\n---\npost body\n",
        )
        .unwrap();

        let summary = build(&site, BuildMode::OneShot).unwrap();
        assert_eq!(summary.posts, 1);

        let index = fs::read_to_string(site.out_dir.join("index.html")).unwrap();
        assert!(index.contains("[My Post](/zzz-post.html)"));
    }

    #[test]
    fn test_post_indexed_exactly_once() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(
            site.layouts_dir.join("_default.html"),
            "{% for p in posts %}[{{ p.title }}]{% endfor %}",
        )
        .unwrap();
        fs::write(
            site.content_dir.join("a.md"),
            "---\ntitle: Only Once\ntype: post\n---\nbody\n",
        )
        .unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        let page = fs::read_to_string(site.out_dir.join("a.html")).unwrap();
        assert_eq!(page.matches("[Only Once]").count(), 1);
    }

    #[test]
    fn test_explicit_template_selected() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.layouts_dir.join("post.html"), "POST:{{ body }}").unwrap();
        fs::write(
            site.content_dir.join("a.md"),
            "---\ntitle: t\ntemplate: post.html\n---\nbody\n",
        )
        .unwrap();
        fs::write(site.content_dir.join("b.md"), "other\n").unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        let a = fs::read_to_string(site.out_dir.join("a.html")).unwrap();
        let b = fs::read_to_string(site.out_dir.join("b.html")).unwrap();
        assert!(a.starts_with("POST:"));
        assert!(b.starts_with("<html>"));
    }

    #[test]
    fn test_static_assets_copied_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::create_dir_all(site.static_dir.join("img")).unwrap();
        fs::write(site.static_dir.join("img/logo.svg"), b"<svg/>").unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        let copied = fs::read(site.out_dir.join("static/img/logo.svg")).unwrap();
        assert_eq!(copied, b"<svg/>");
    }

    #[test]
    fn test_output_dir_fully_regenerated() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("a.md"), "body\n").unwrap();
        fs::create_dir_all(&site.out_dir).unwrap();
        fs::write(site.out_dir.join("stale.html"), "old\n").unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        assert!(!site.out_dir.join("stale.html").exists());
        assert!(site.out_dir.join("a.html").exists());
    }

    #[test]
    fn test_double_build_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("hello.md"), "# Hi\n\ntext\n").unwrap();
        fs::create_dir_all(&site.static_dir).unwrap();
        fs::write(site.static_dir.join("a.css"), "body {}\n").unwrap();

        build(&site, BuildMode::OneShot).unwrap();
        let first = snapshot(&site.out_dir);
        build(&site, BuildMode::OneShot).unwrap();
        let second = snapshot(&site.out_dir);

        assert_eq!(first, second);
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files: Vec<(PathBuf, Vec<u8>)> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                (rel, fs::read(e.path()).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_reload_script_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("a.md"), "body\n").unwrap();

        build(&site, BuildMode::OneShot).unwrap();

        let html = fs::read_to_string(site.out_dir.join("a.html")).unwrap();
        assert!(html.contains("/reload"));
        assert!(html.trim_end().ends_with("</script>"));
    }

    #[test]
    fn test_bad_file_fails_one_shot_build() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("bad.md"), "---\ntitle: [oops\n---\nx\n").unwrap();
        fs::write(site.content_dir.join("good.md"), "fine\n").unwrap();

        assert!(build(&site, BuildMode::OneShot).is_err());
    }

    #[test]
    fn test_bad_file_skipped_in_serve_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("bad.md"), "---\ntitle: [oops\n---\nx\n").unwrap();
        fs::write(site.content_dir.join("good.md"), "fine\n").unwrap();

        let summary = build(&site, BuildMode::Serve).unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.skipped, 1);
        assert!(site.out_dir.join("good.html").exists());
        assert!(!site.out_dir.join("bad.html").exists());
    }

    #[test]
    fn test_no_frontmatter_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let site = site_fixture(tmp.path());
        fs::write(site.content_dir.join("plain.md"), "just text\n").unwrap();

        let summary = build(&site, BuildMode::OneShot).unwrap();

        assert_eq!(summary.posts, 0);
        let html = fs::read_to_string(site.out_dir.join("plain.html")).unwrap();
        // empty title, default layout
        assert!(html.contains("<title> | mica site</title>"));
    }

    #[test]
    fn test_output_rel_path() {
        let meta = PageMeta::default();
        assert_eq!(
            output_rel_path(Path::new("notes/a.md"), &meta),
            PathBuf::from("notes/a.html")
        );
        let meta = PageMeta {
            filename: Some("custom.htm".to_string()),
            ..Default::default()
        };
        assert_eq!(
            output_rel_path(Path::new("notes/a.md"), &meta),
            PathBuf::from("notes/custom.htm")
        );
    }
}
