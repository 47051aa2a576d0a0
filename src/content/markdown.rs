//! Markdown rendering

use anyhow::Result;
use linkify::{LinkFinder, LinkKind};
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use std::collections::HashMap;

/// Markdown renderer.
///
/// Rendering is a pure function of the input text: GFM tables, strikethrough
/// and bare-URL autolinks, slug-based auto-identifiers on headings, and soft
/// line breaks promoted to hard `<br />` breaks. Unchanged input always
/// renders to identical output.
pub struct MarkdownRenderer {
    options: Options,
    finder: LinkFinder,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES
            | Options::ENABLE_GFM;
        let mut finder = LinkFinder::new();
        finder.kinds(&[LinkKind::Url]);
        Self { options, finder }
    }

    /// Render markdown to HTML
    pub fn render(&self, markdown: &str) -> Result<String> {
        let parser = Parser::new_ext(markdown, self.options);

        let mut events: Vec<Event> = Vec::new();
        // index into `events` of the currently open heading, when it still
        // needs an auto-generated id
        let mut open_heading: Option<usize> = None;
        let mut heading_text = String::new();
        let mut seen_slugs: HashMap<String, usize> = HashMap::new();
        // depth of constructs whose text must not be autolinked: explicit
        // links, image alt text, code blocks
        let mut no_autolink = 0usize;

        for event in parser {
            match event {
                Event::SoftBreak => events.push(Event::HardBreak),
                Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                }) => {
                    open_heading = id.is_none().then_some(events.len());
                    heading_text.clear();
                    events.push(Event::Start(Tag::Heading {
                        level,
                        id,
                        classes,
                        attrs,
                    }));
                }
                Event::End(TagEnd::Heading(level)) => {
                    if let Some(idx) = open_heading.take() {
                        let slug = unique_slug(&heading_text, &mut seen_slugs);
                        if !slug.is_empty() {
                            if let Event::Start(Tag::Heading { id, .. }) = &mut events[idx] {
                                *id = Some(CowStr::from(slug));
                            }
                        }
                    }
                    events.push(Event::End(TagEnd::Heading(level)));
                }
                ev @ (Event::Text(_) | Event::Code(_)) if open_heading.is_some() => {
                    match &ev {
                        Event::Text(t) | Event::Code(t) => heading_text.push_str(t),
                        _ => {}
                    }
                    events.push(ev);
                }
                Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_))) => {
                    no_autolink += 1;
                    events.push(Event::Start(tag));
                }
                Event::End(end @ (TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock)) => {
                    no_autolink = no_autolink.saturating_sub(1);
                    events.push(Event::End(end));
                }
                Event::Text(text) if no_autolink == 0 => self.push_linkified(text, &mut events),
                other => events.push(other),
            }
        }

        let mut out = String::new();
        html::push_html(&mut out, events.into_iter());
        Ok(out)
    }

    /// Split a text run around any bare URLs, wrapping each in a link
    fn push_linkified<'a>(&self, text: CowStr<'a>, events: &mut Vec<Event<'a>>) {
        let spans: Vec<(usize, usize)> =
            self.finder.links(&text).map(|l| (l.start(), l.end())).collect();
        if spans.is_empty() {
            events.push(Event::Text(text));
            return;
        }

        let mut last = 0;
        for (start, end) in spans {
            if start > last {
                events.push(Event::Text(CowStr::from(text[last..start].to_string())));
            }
            let url = text[start..end].to_string();
            events.push(Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                dest_url: CowStr::from(url.clone()),
                title: CowStr::from(""),
                id: CowStr::from(""),
            }));
            events.push(Event::Text(CowStr::from(url)));
            events.push(Event::End(TagEnd::Link));
            last = end;
        }
        if last < text.len() {
            events.push(Event::Text(CowStr::from(text[last..].to_string())));
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Slugify heading text, suffixing repeats with -1, -2, ...
fn unique_slug(text: &str, seen: &mut HashMap<String, usize>) -> String {
    let base = slug::slugify(text);
    if base.is_empty() {
        return base;
    }
    let count = seen.entry(base.clone()).or_insert(0);
    let slug = if *count == 0 {
        base.clone()
    } else {
        format!("{}-{}", base, count)
    };
    *count += 1;
    slug
}
