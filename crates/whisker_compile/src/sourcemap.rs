//! Source Map v3 generation.
//!
//! Maps generated Story IR positions back to WhiskerScript source, so tools
//! downstream of the compiler (debuggers, error overlays, the LSP) can point
//! at the author's text. Generated coordinates are synthetic: line is the
//! passage ordinal, column is the content-node ordinal within that passage.
//!
//! The document follows the Source Map v3 layout — `version`, `file`,
//! `sourceRoot`, `sources`, `names`, and a `mappings` string of base64
//! VLQ-encoded segments, relative-encoded per the standard.
//!
//! # Usage
//!
//! The builder is driven by the code generator: one [`SourceMapBuilder::add_mapping`]
//! call per lowered node. [`SourceMapV3::resolve`] decodes back for
//! consumers and tests.

use serde::{Deserialize, Serialize};

/// A finished Source Map v3 document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapV3 {
    pub version: u32,
    pub file: String,
    pub source_root: String,
    pub sources: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

/// One decoded mapping: generated (line, column) → source (line, column),
/// all 0-based per the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source_index: u32,
    pub source_line: u32,
    pub source_column: u32,
}

impl SourceMapV3 {
    /// Decodes the `mappings` string back into explicit mappings.
    pub fn resolve(&self) -> Vec<Mapping> {
        let mut out = Vec::new();
        let mut src_idx = 0i64;
        let mut src_line = 0i64;
        let mut src_col = 0i64;

        for (gen_line, line) in self.mappings.split(';').enumerate() {
            let mut gen_col = 0i64;
            for segment in line.split(',') {
                if segment.is_empty() {
                    continue;
                }
                let fields = decode_vlq(segment);
                if fields.len() < 4 {
                    continue;
                }
                gen_col += fields[0];
                src_idx += fields[1];
                src_line += fields[2];
                src_col += fields[3];
                out.push(Mapping {
                    generated_line: gen_line as u32,
                    generated_column: gen_col as u32,
                    source_index: src_idx as u32,
                    source_line: src_line as u32,
                    source_column: src_col as u32,
                });
            }
        }
        out
    }

    /// Finds the source position for a generated position, if mapped.
    pub fn lookup(&self, generated_line: u32, generated_column: u32) -> Option<(u32, u32)> {
        self.resolve()
            .into_iter()
            .find(|m| m.generated_line == generated_line && m.generated_column == generated_column)
            .map(|m| (m.source_line, m.source_column))
    }
}

/// Accumulates mappings during code generation.
#[derive(Debug)]
pub struct SourceMapBuilder {
    file: String,
    sources: Vec<String>,
    /// (generated line, generated column, source line, source column),
    /// 0-based.
    mappings: Vec<(u32, u32, u32, u32)>,
}

impl SourceMapBuilder {
    pub fn new(file: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            sources: vec![source_path.into()],
            mappings: Vec::new(),
        }
    }

    /// Records one generated-to-source mapping. Coordinates are 0-based.
    pub fn add_mapping(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        source_line: u32,
        source_column: u32,
    ) {
        self.mappings
            .push((generated_line, generated_column, source_line, source_column));
    }

    pub fn build(mut self) -> SourceMapV3 {
        self.mappings.sort_unstable();

        let max_line = self.mappings.last().map(|m| m.0).unwrap_or(0);
        let mut lines: Vec<String> = Vec::with_capacity(max_line as usize + 1);
        let mut src_line_prev = 0i64;
        let mut src_col_prev = 0i64;

        for line_no in 0..=max_line {
            let mut segments = Vec::new();
            let mut gen_col_prev = 0i64;
            for &(gl, gc, sl, sc) in self.mappings.iter().filter(|m| m.0 == line_no) {
                debug_assert_eq!(gl, line_no);
                let mut segment = String::new();
                encode_vlq(gc as i64 - gen_col_prev, &mut segment);
                encode_vlq(0, &mut segment); // single source file
                encode_vlq(sl as i64 - src_line_prev, &mut segment);
                encode_vlq(sc as i64 - src_col_prev, &mut segment);
                gen_col_prev = gc as i64;
                src_line_prev = sl as i64;
                src_col_prev = sc as i64;
                segments.push(segment);
            }
            lines.push(segments.join(","));
        }

        SourceMapV3 {
            version: 3,
            file: self.file,
            source_root: String::new(),
            sources: std::mem::take(&mut self.sources),
            names: Vec::new(),
            mappings: lines.join(";"),
        }
    }
}

const BASE64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encodes one value as base64 VLQ, appending to `out`.
fn encode_vlq(value: i64, out: &mut String) {
    // Sign bit goes in the lowest position.
    let mut vlq = if value < 0 {
        ((-value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq != 0 {
            digit |= 0b100000; // continuation
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Decodes a base64 VLQ segment into its values.
fn decode_vlq(segment: &str) -> Vec<i64> {
    let mut out = Vec::new();
    let mut value: u64 = 0;
    let mut shift = 0;
    for ch in segment.bytes() {
        let Some(digit) = BASE64.iter().position(|&b| b == ch) else {
            return out;
        };
        let digit = digit as u64;
        value |= (digit & 0b11111) << shift;
        if digit & 0b100000 != 0 {
            shift += 5;
        } else {
            let negative = value & 1 != 0;
            let magnitude = (value >> 1) as i64;
            out.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_encodes_known_values() {
        let mut out = String::new();
        encode_vlq(0, &mut out);
        assert_eq!(out, "A");

        let mut out = String::new();
        encode_vlq(16, &mut out);
        assert_eq!(out, "gB");

        let mut out = String::new();
        encode_vlq(-1, &mut out);
        assert_eq!(out, "D");
    }

    #[test]
    fn vlq_round_trips() {
        for value in [-100_000i64, -33, -1, 0, 1, 15, 16, 31, 32, 12345, 1 << 20] {
            let mut encoded = String::new();
            encode_vlq(value, &mut encoded);
            assert_eq!(decode_vlq(&encoded), vec![value], "value {}", value);
        }
    }

    #[test]
    fn builder_produces_standard_header() {
        let builder = SourceMapBuilder::new("story.json", "story.ws");
        let map = builder.build();
        assert_eq!(map.version, 3);
        assert_eq!(map.sources, vec!["story.ws"]);

        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"sourceRoot\""), "{}", json);
        assert!(json.contains("\"mappings\""), "{}", json);
    }

    #[test]
    fn mappings_round_trip_through_vlq() {
        let mut builder = SourceMapBuilder::new("out", "in.ws");
        builder.add_mapping(0, 0, 0, 0);
        builder.add_mapping(0, 1, 1, 4);
        builder.add_mapping(1, 0, 5, 2);
        builder.add_mapping(2, 3, 7, 0);
        let map = builder.build();

        let resolved = map.resolve();
        assert_eq!(resolved.len(), 4);
        assert_eq!(map.lookup(0, 1), Some((1, 4)));
        assert_eq!(map.lookup(1, 0), Some((5, 2)));
        assert_eq!(map.lookup(2, 3), Some((7, 0)));
        assert_eq!(map.lookup(9, 9), None);
    }

    #[test]
    fn generated_lines_separated_by_semicolons() {
        let mut builder = SourceMapBuilder::new("out", "in.ws");
        builder.add_mapping(0, 0, 0, 0);
        builder.add_mapping(2, 0, 1, 0);
        let map = builder.build();
        assert_eq!(map.mappings.matches(';').count(), 2);
    }
}
