//! Twine HTML adapters.
//!
//! One [`TwineFormat`] value per dialect. The `<tw-storydata>` envelope is
//! shared (`html`); the passage-text syntax differs per dialect and lives in
//! the sibling modules, each exposing a `parse_content` / `write_content`
//! pair.

pub mod chapbook;
pub mod expr;
pub mod harlowe;
pub mod html;
pub mod snowman;
pub mod sugarcube;

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{ContentNode, Passage, Story};

use crate::format::{
    DuplicatePolicy, ExportOptions, ExportResult, Format, ImportOptions, ImportResult,
    TwineDialect,
};

use html::{parse_story_data, write_story_data, PassageData, StoryData};

/// A Twine HTML adapter for one dialect.
pub struct TwineFormat {
    dialect: TwineDialect,
}

impl TwineFormat {
    pub fn new(dialect: TwineDialect) -> Self {
        Self { dialect }
    }

    fn parse_dialect_content(
        &self,
        text: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<ContentNode> {
        match self.dialect {
            TwineDialect::Harlowe => harlowe::parse_content(text, diagnostics),
            TwineDialect::Sugarcube => sugarcube::parse_content(text, diagnostics),
            TwineDialect::Chapbook => chapbook::parse_content(text, diagnostics),
            TwineDialect::Snowman => snowman::parse_content(text, diagnostics),
        }
    }

    fn write_dialect_content(
        &self,
        dialect: TwineDialect,
        nodes: &[ContentNode],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> String {
        match dialect {
            TwineDialect::Harlowe => harlowe::write_content(nodes, diagnostics),
            TwineDialect::Sugarcube => sugarcube::write_content(nodes, diagnostics),
            TwineDialect::Chapbook => chapbook::write_content(nodes, diagnostics),
            TwineDialect::Snowman => snowman::write_content(nodes, diagnostics),
        }
    }
}

impl Format for TwineFormat {
    fn name(&self) -> &'static str {
        match self.dialect {
            TwineDialect::Harlowe => "harlowe",
            TwineDialect::Sugarcube => "sugarcube",
            TwineDialect::Chapbook => "chapbook",
            TwineDialect::Snowman => "snowman",
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
    }

    fn can_import(&self, source: &str) -> bool {
        if !source.contains("<tw-storydata") {
            return false;
        }
        let mut probe_diags = Vec::new();
        let Some(data) = parse_story_data(source, &mut probe_diags) else {
            return false;
        };
        match data.format.as_deref().and_then(TwineDialect::from_format_name) {
            Some(dialect) => dialect == self.dialect,
            // Untagged archives default to the Harlowe adapter.
            None => self.dialect == TwineDialect::Harlowe,
        }
    }

    fn import(&self, source: &str, options: &ImportOptions) -> ImportResult {
        let mut diagnostics = Vec::new();
        let Some(data) = parse_story_data(source, &mut diagnostics) else {
            diagnostics.push(Diagnostic::error(
                DiagCode::MalformedInput,
                "no <tw-storydata> element found",
            ));
            return ImportResult {
                story: None,
                diagnostics,
            };
        };

        let mut story = Story::new(data.name.clone());
        story.metadata.ifid = data.ifid.clone();
        story.metadata.format = data.format.clone();
        story.metadata.format_version = data.format_version.clone();
        story.global_css = data.stylesheet.clone();
        story.global_script = data.script.clone();

        let start_name = data
            .startnode
            .as_deref()
            .and_then(|pid| data.passages.iter().find(|p| p.pid == pid))
            .map(|p| p.name.clone());

        for passage_data in &data.passages {
            let mut passage = Passage::new(passage_data.name.clone());
            passage.tags = passage_data.tags.clone();
            passage.position = passage_data.position.as_deref().and_then(parse_position);
            if !passage_data.pid.is_empty() {
                passage
                    .metadata
                    .insert("pid".to_string(), passage_data.pid.clone());
            }
            passage.content = self.parse_dialect_content(&passage_data.content, &mut diagnostics);

            if story.get_passage(&passage.id).is_some() {
                match options.duplicate_policy {
                    DuplicatePolicy::FirstWins => {
                        diagnostics.push(Diagnostic::warning(
                            DiagCode::DuplicatePassage,
                            format!(
                                "duplicate passage '{}'; first definition wins",
                                passage.id
                            ),
                        ));
                        continue;
                    }
                    DuplicatePolicy::Error => {
                        diagnostics.push(Diagnostic::error(
                            DiagCode::DuplicatePassageId,
                            format!("duplicate passage '{}'", passage.id),
                        ));
                        continue;
                    }
                }
            }
            if let Err(diag) = story.add_passage(passage) {
                diagnostics.push(diag);
            }
        }

        if let Some(start) = start_name {
            story.start_passage = start;
        }

        ImportResult {
            story: Some(story),
            diagnostics,
        }
    }

    fn can_export(&self, _story: &Story) -> Result<(), String> {
        // Every IR construct has a dialect rendering; script blocks and raw
        // expressions pass through verbatim.
        Ok(())
    }

    fn export(&self, story: &Story, options: &ExportOptions) -> ExportResult {
        let mut diagnostics = Vec::new();
        let dialect = options.twine_format;

        let mut data = StoryData {
            name: story.metadata.title.clone(),
            ifid: story.metadata.ifid.clone(),
            format: Some(dialect.format_name().to_string()),
            format_version: story.metadata.format_version.clone(),
            startnode: None,
            stylesheet: story.global_css.clone(),
            script: story.global_script.clone(),
            passages: Vec::new(),
        };

        for (index, passage) in story.get_all_passages().enumerate() {
            let pid = (index + 1).to_string();
            if passage.id == story.start_passage {
                data.startnode = Some(pid.clone());
            }
            // With macro conversion off, passages carry WhiskerScript
            // verbatim instead of dialect macros.
            let content = if options.convert_macros {
                self.write_dialect_content(dialect, &passage.content, &mut diagnostics)
            } else {
                crate::script::print_passage_content(&passage.content, &mut diagnostics)
            };
            data.passages.push(PassageData {
                pid,
                name: passage.id.clone(),
                tags: passage.tags.clone(),
                position: if options.preserve_positions {
                    passage
                        .position
                        .map(|(x, y)| format!("{},{}", x as i64, y as i64))
                } else {
                    None
                },
                content,
            });
        }

        ExportResult {
            content: write_story_data(&data, options.pretty),
            diagnostics,
        }
    }
}

fn parse_position(raw: &str) -> Option<(f64, f64)> {
    let (x, y) = raw.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Finds the byte index of the `close` character matching the `open` at
/// `text[start]`, honoring nesting and skipping quoted strings.
pub(crate) fn find_balanced(text: &str, open: char, close: char, start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, ch) in text[start..].char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                } else if ch == open {
                    depth += 1;
                } else if ch == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(start + i);
                    }
                }
            }
        }
    }
    None
}

/// Splits `text` on top-level commas (ignoring commas inside brackets,
/// parens, and strings).
pub(crate) fn split_top_level(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    out.push(&text[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    out.push(&text[start..]);
    out
}

/// Strips one layer of quotes from a macro argument.
pub(crate) fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        if (bytes[0] == b'"' && bytes[trimmed.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[trimmed.len() - 1] == b'\'')
        {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_balanced_honors_nesting_and_quotes() {
        let text = r#"(if: $x is "a)b")[body]"#;
        let close = find_balanced(text, '(', ')', 0).unwrap();
        assert_eq!(&text[..close + 1], r#"(if: $x is "a)b")"#);
    }

    #[test]
    fn split_top_level_ignores_nested_commas() {
        let parts = split_top_level(r#"$a to (min(1, 2)), $b to "x,y""#);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].trim(), "$a to (min(1, 2))");
    }

    #[test]
    fn unquote_strips_matching_quotes() {
        assert_eq!(unquote("\"hello\""), "hello");
        assert_eq!(unquote("'hi'"), "hi");
        assert_eq!(unquote("bare"), "bare");
    }

    #[test]
    fn position_parses_twine_format() {
        assert_eq!(parse_position("600,300"), Some((600.0, 300.0)));
        assert_eq!(parse_position("junk"), None);
    }
}
