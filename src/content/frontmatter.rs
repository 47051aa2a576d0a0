//! Front-matter parsing

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Front-matter data from a content file.
///
/// A file without a front-matter block gets the zero-valued default: empty
/// title, no tags, default template, derived output filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PageMeta {
    pub title: String,
    pub tags: Vec<String>,
    pub desc: Option<String>,
    pub date: Option<String>,
    /// Layout to fill; empty or absent means the default layout
    pub template: Option<String>,
    /// Pages marked `type: post` are collected into the shared post list
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Overrides the final component of the output path
    pub filename: Option<String>,
}

impl PageMeta {
    /// Parse front-matter from a source file.
    /// Returns `(meta, remaining_content)`.
    ///
    /// Malformed YAML inside a delimited block is an error rather than a
    /// silent default, so a typo in `tags:` does not quietly drop a post
    /// from the site. A missing closing delimiter means the leading `---`
    /// was markdown, not front-matter.
    pub fn parse(content: &str) -> Result<(Self, &str)> {
        let trimmed = content.trim_start();
        let Some(rest) = trimmed.strip_prefix("---") else {
            return Ok((PageMeta::default(), content));
        };
        let rest = rest.trim_start_matches(['\r', '\n']);

        let Some((yaml, remaining)) = split_at_closing_fence(rest) else {
            return Ok((PageMeta::default(), content));
        };
        let remaining = remaining.trim_start_matches(['\r', '\n']);

        if yaml.trim().is_empty() {
            return Ok((PageMeta::default(), remaining));
        }

        let meta: PageMeta = serde_yaml::from_str(yaml)
            .map_err(|e| anyhow!("malformed front-matter: {}", e))?;
        Ok((meta, remaining))
    }

    /// Whether this page belongs in the aggregate post list
    pub fn is_post(&self) -> bool {
        self.kind.as_deref() == Some("post")
    }

    /// Layout name, if one was explicitly set and non-empty
    pub fn explicit_template(&self) -> Option<&str> {
        self.template.as_deref().filter(|t| !t.is_empty())
    }

    /// Output filename override, if one was explicitly set and non-empty
    pub fn filename_override(&self) -> Option<&str> {
        self.filename.as_deref().filter(|f| !f.is_empty())
    }

    /// Parse the date string into a DateTime
    pub fn parse_date(&self) -> Option<DateTime<Local>> {
        self.date.as_ref().and_then(|s| parse_date_string(s))
    }
}

/// Find the closing front-matter fence: a line that is exactly `---`,
/// with nothing else on it. Returns the YAML block and everything after
/// the fence line. `----` or `---text` lines are content, not fences.
fn split_at_closing_fence(rest: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parse a date string in a few common formats, as local wall-clock time
fn parse_date_string(s: &str) -> Option<DateTime<Local>> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];

    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            if let Some(local) = Local.from_local_datetime(&dt).earliest() {
                return Some(local);
            }
        }
        if let Ok(d) = chrono::NaiveDate::parse_from_str(s, fmt) {
            let dt = d.and_hms_opt(0, 0, 0)?;
            if let Some(local) = Local.from_local_datetime(&dt).earliest() {
                return Some(local);
            }
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local));
    }

    None
}
