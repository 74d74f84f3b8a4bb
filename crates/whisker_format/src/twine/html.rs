//! `<tw-storydata>` document parsing and serialization.
//!
//! Twine archives are HTML fragments: one `<tw-storydata>` element whose
//! children are `<tw-passagedata>` elements plus optional stylesheet and
//! script elements. The structure is rigid enough that a small hand-written
//! scanner covers every file Twine 2 produces; a full HTML parser would buy
//! nothing.

use whisker_base::{DiagCode, Diagnostic};

/// Attributes and content of one `<tw-passagedata>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassageData {
    pub pid: String,
    pub name: String,
    pub tags: Vec<String>,
    /// Raw `position` attribute, e.g. `"600,300"`.
    pub position: Option<String>,
    /// Unescaped passage source.
    pub content: String,
}

/// A parsed `<tw-storydata>` document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryData {
    pub name: String,
    pub ifid: Option<String>,
    pub format: Option<String>,
    pub format_version: Option<String>,
    /// The pid (not the name) of the start passage.
    pub startnode: Option<String>,
    pub stylesheet: String,
    pub script: String,
    pub passages: Vec<PassageData>,
}

/// Parses a Twine HTML document. Returns `None` when no `<tw-storydata>`
/// element exists.
pub fn parse_story_data(source: &str, diagnostics: &mut Vec<Diagnostic>) -> Option<StoryData> {
    let open = find_tag(source, "tw-storydata", 0)?;
    let mut data = StoryData {
        name: open.attr("name").unwrap_or_default(),
        ifid: open.attr("ifid"),
        format: open.attr("format"),
        format_version: open.attr("format-version"),
        startnode: open.attr("startnode"),
        ..StoryData::default()
    };

    let body_start = open.end;
    let body_end = source[body_start..]
        .find("</tw-storydata>")
        .map(|i| body_start + i)
        .unwrap_or(source.len());
    let body = &source[body_start..body_end];

    let mut cursor = 0;
    while let Some(tag) = find_tag(body, "tw-passagedata", cursor) {
        let content_end = match body[tag.end..].find("</tw-passagedata>") {
            Some(i) => tag.end + i,
            None => {
                diagnostics.push(Diagnostic::error(
                    DiagCode::MalformedInput,
                    format!(
                        "<tw-passagedata> '{}' is never closed",
                        tag.attr("name").unwrap_or_default()
                    ),
                ));
                break;
            }
        };

        data.passages.push(PassageData {
            pid: tag.attr("pid").unwrap_or_default(),
            name: tag.attr("name").unwrap_or_default(),
            tags: tag
                .attr("tags")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            position: tag.attr("position"),
            content: unescape(&body[tag.end..content_end]),
        });
        cursor = content_end;
    }

    if let Some(style) = element_content(body, "style") {
        data.stylesheet = unescape(style);
    }
    if let Some(script) = element_content(body, "script") {
        data.script = unescape(script);
    }

    Some(data)
}

/// Serializes a story document back to Twine HTML.
pub fn write_story_data(data: &StoryData, pretty: bool) -> String {
    let mut out = String::new();
    let nl = if pretty { "\n" } else { "" };

    out.push_str(&format!(
        r#"<tw-storydata name="{}" startnode="{}" creator="Whisker" ifid="{}" format="{}" format-version="{}" options="" hidden>"#,
        escape_attr(&data.name),
        escape_attr(data.startnode.as_deref().unwrap_or("1")),
        escape_attr(data.ifid.as_deref().unwrap_or("")),
        escape_attr(data.format.as_deref().unwrap_or("")),
        escape_attr(data.format_version.as_deref().unwrap_or("")),
    ));
    out.push_str(nl);

    if !data.stylesheet.is_empty() {
        out.push_str(&format!(
            r#"<style role="stylesheet" id="twine-user-stylesheet" type="text/twine-css">{}</style>{}"#,
            escape_text(&data.stylesheet),
            nl
        ));
    }
    if !data.script.is_empty() {
        out.push_str(&format!(
            r#"<script role="script" id="twine-user-script" type="text/twine-javascript">{}</script>{}"#,
            escape_text(&data.script),
            nl
        ));
    }

    for passage in &data.passages {
        out.push_str(&format!(
            r#"<tw-passagedata pid="{}" name="{}" tags="{}""#,
            escape_attr(&passage.pid),
            escape_attr(&passage.name),
            escape_attr(&passage.tags.join(" ")),
        ));
        if let Some(position) = &passage.position {
            out.push_str(&format!(r#" position="{}""#, escape_attr(position)));
        }
        out.push('>');
        out.push_str(&escape_text(&passage.content));
        out.push_str("</tw-passagedata>");
        out.push_str(nl);
    }

    out.push_str("</tw-storydata>");
    out.push_str(nl);
    out
}

/// One scanned opening tag.
struct Tag<'a> {
    /// Byte offset just past the closing `>`.
    end: usize,
    attrs: Vec<(&'a str, String)>,
}

impl Tag<'_> {
    fn attr(&self, name: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

/// Finds the next `<name …>` opening tag at or after `from`.
fn find_tag<'a>(source: &'a str, name: &str, from: usize) -> Option<Tag<'a>> {
    let needle = format!("<{}", name);
    let mut search = from;
    loop {
        let rel = source[search..].find(&needle)?;
        let tag_start = search + rel;
        let after = tag_start + needle.len();
        // Require a boundary so "tw-storydata" does not match a longer name.
        let boundary = source[after..].chars().next();
        if !matches!(boundary, Some(' ') | Some('\t') | Some('\n') | Some('>')) {
            search = after;
            continue;
        }
        let close_rel = source[after..].find('>')?;
        let attr_text = &source[after..after + close_rel];
        return Some(Tag {
            end: after + close_rel + 1,
            attrs: parse_attrs(attr_text),
        });
    }
}

/// Parses `key="value"` pairs, unescaping values.
fn parse_attrs(text: &str) -> Vec<(&str, String)> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && !bytes[i].is_ascii_alphanumeric() && bytes[i] != b'-' {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
            i += 1;
        }
        if key_start == i {
            break;
        }
        let key = &text[key_start..i];

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let value_start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                out.push((key, unescape(&text[value_start..i])));
                i += 1;
            }
        } else {
            // Bare attribute like `hidden`.
            out.push((key, String::new()));
        }
    }
    out
}

/// Extracts the content of the first `<name …>…</name>` element.
fn element_content<'a>(source: &'a str, name: &str) -> Option<&'a str> {
    let tag = find_tag(source, name, 0)?;
    let close = format!("</{}>", name);
    let end = source[tag.end..].find(&close)? + tag.end;
    Some(&source[tag.end..end])
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}
