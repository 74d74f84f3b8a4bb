//! Line-oriented lexer for WhiskerScript.
//!
//! WhiskerScript is structured by line-start markers (`::` passage headers,
//! `@@` metadata, `+` choices, `~` assignments, `->` diverts) with
//! markdown-flavored inline text and `{ … }` expression islands. The lexer
//! works line by line:
//!
//! 1. Classify the line by its leading marker and emit the structural token.
//! 2. Lex the remainder in the mode that marker demands — prose text with
//!    inline toggles, or expression atoms inside braces.
//!
//! Mode switching happens at brace boundaries: `{` flips from text to
//! expression lexing until the matching `}`. Inside expressions, `->` flips
//! to target mode (passage names may contain spaces, so targets lex as raw
//! text).
//!
//! The lexer never aborts: unknown characters produce a `WSK0001`
//! diagnostic and an [`TokenKind::Error`] placeholder, and the stream always
//! ends with [`TokenKind::Eof`].

use whisker_base::{DiagCode, Diagnostic, SourceFile, SourceLocation, SourcePosition, SourceSpan};

use crate::token::{Token, TokenKind};

/// The result of lexing one file.
#[derive(Debug)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lexes an entire source file into a token stream.
pub fn lex(file: &SourceFile) -> LexOutput {
    Lexer::new(file).run()
}

struct Lexer<'a> {
    file: &'a SourceFile,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
    /// Set while inside a fenced code block.
    in_fence: bool,
}

/// A cursor over one line of source.
struct LineCursor<'a> {
    text: &'a str,
    /// Byte index into `text`.
    idx: usize,
    /// Position of `text[idx]` in the file.
    pos: SourcePosition,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str, start: SourcePosition) -> Self {
        Self {
            text,
            idx: 0,
            pos: start,
        }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.idx..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.idx += ch.len_utf8();
        self.pos.advance(ch);
        Some(ch)
    }

    fn bump_str(&mut self, s: &str) {
        for _ in s.chars() {
            self.bump();
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
    }

    fn at_end(&self) -> bool {
        self.idx >= self.text.len()
    }
}

impl<'a> Lexer<'a> {
    fn new(file: &'a SourceFile) -> Self {
        Self {
            file,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            in_fence: false,
        }
    }

    fn run(mut self) -> LexOutput {
        let mut pos = SourcePosition::start();
        let content = self.file.content.clone();

        for raw_line in content.split_inclusive('\n') {
            let line = raw_line.strip_suffix('\n').unwrap_or(raw_line);
            let line = line.strip_suffix('\r').unwrap_or(line);
            let line_start = pos;

            self.lex_line(line, line_start);

            // Newline token covers the terminator itself.
            let mut end = line_start;
            for ch in line.chars() {
                end.advance(ch);
            }
            let nl_start = end;
            for ch in raw_line[line.len()..].chars() {
                end.advance(ch);
            }
            self.push(TokenKind::Newline, SourceSpan::new(nl_start, end));
            pos = end;
        }

        if self.in_fence {
            self.diagnostics.push(
                Diagnostic::error(DiagCode::UnterminatedFence, "unterminated code fence")
                    .with_location(SourceLocation::new(&self.file.path, SourceSpan::at(pos))),
            );
        }

        self.push(TokenKind::Eof, SourceSpan::at(pos));
        LexOutput {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn push(&mut self, kind: TokenKind, span: SourceSpan) {
        self.tokens.push(Token::new(kind, span));
    }

    fn error_char(&mut self, ch: char, span: SourceSpan) {
        self.diagnostics.push(
            Diagnostic::error(
                DiagCode::UnexpectedChar,
                format!("unexpected character '{}'", ch),
            )
            .with_location(SourceLocation::new(&self.file.path, span)),
        );
        self.push(TokenKind::Error(ch), span);
    }

    fn lex_line(&mut self, line: &str, start: SourcePosition) {
        let mut cur = LineCursor::new(line, start);

        if self.in_fence {
            if line.trim() == "```" {
                let span = self.whole_line_span(&mut cur);
                self.push(TokenKind::FenceClose, span);
                self.in_fence = false;
            } else {
                let span = self.whole_line_span(&mut cur);
                self.push(TokenKind::Text(line.to_string()), span);
            }
            return;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return;
        }

        cur.skip_spaces();

        if cur.starts_with("::") {
            self.lex_passage_header(&mut cur);
        } else if cur.starts_with("@@") {
            self.lex_metadata(&mut cur);
        } else if cur.starts_with("```") {
            let fence_start = cur.pos;
            cur.bump_str("```");
            let lang = cur.rest().trim().to_string();
            let span = self.whole_line_span(&mut cur);
            self.push(
                TokenKind::FenceOpen(lang),
                SourceSpan::new(fence_start, span.end),
            );
            self.in_fence = true;
        } else if is_rule_line(trimmed) {
            let span = self.whole_line_span(&mut cur);
            self.push(TokenKind::HorizontalRule, span);
        } else if cur.starts_with("->") {
            let arrow_start = cur.pos;
            cur.bump_str("->");
            let mut arrow_end = arrow_start;
            arrow_end.advance('-');
            arrow_end.advance('>');
            self.push(TokenKind::Arrow, SourceSpan::new(arrow_start, arrow_end));
            self.lex_target(&mut cur);
        } else if cur.starts_with("+ ") || cur.starts_with("+[") {
            self.lex_choice(&mut cur);
        } else if cur.starts_with("~ ") || cur.starts_with("~$") {
            let marker_start = cur.pos;
            cur.bump();
            let mut marker_end = marker_start;
            marker_end.advance('~');
            self.push(TokenKind::TildeMarker, SourceSpan::new(marker_start, marker_end));
            self.lex_expr_until_line_end(&mut cur);
        } else if let Some(depth) = blockquote_depth(trimmed) {
            let marker_start = cur.pos;
            for _ in 0..depth {
                cur.bump();
                cur.skip_spaces();
            }
            self.push(
                TokenKind::BlockquoteMarker(depth),
                SourceSpan::new(marker_start, cur.pos),
            );
            self.lex_text(&mut cur, 0);
        } else if let Some(ordered) = list_marker(trimmed) {
            let marker_start = cur.pos;
            if ordered {
                while cur.peek().is_some_and(|c| c.is_ascii_digit()) {
                    cur.bump();
                }
                cur.bump(); // '.'
            } else {
                cur.bump(); // '-' or '*'
            }
            cur.skip_spaces();
            self.push(
                TokenKind::ListMarker { ordered },
                SourceSpan::new(marker_start, cur.pos),
            );
            self.lex_text(&mut cur, 0);
        } else if trimmed == "}" {
            let span = self.whole_line_span(&mut cur);
            self.push(TokenKind::RBrace, span);
        } else {
            self.lex_text(&mut cur, 0);
        }
    }

    fn whole_line_span(&mut self, cur: &mut LineCursor) -> SourceSpan {
        let start = cur.pos;
        while cur.bump().is_some() {}
        SourceSpan::new(start, cur.pos)
    }

    /// `:: Name [tag1, tag2]`
    fn lex_passage_header(&mut self, cur: &mut LineCursor) {
        let marker_start = cur.pos;
        cur.bump_str("::");
        self.push(TokenKind::PassageMarker, SourceSpan::new(marker_start, cur.pos));
        cur.skip_spaces();

        let name_start = cur.pos;
        let mut name = String::new();
        while let Some(ch) = cur.peek() {
            if ch == '[' {
                break;
            }
            name.push(ch);
            cur.bump();
        }
        let name = name.trim_end().to_string();
        let mut name_end = name_start;
        for ch in name.chars() {
            name_end.advance(ch);
        }
        self.push(TokenKind::Text(name), SourceSpan::new(name_start, name_end));

        if cur.peek() == Some('[') {
            let lb_start = cur.pos;
            cur.bump();
            self.push(TokenKind::LBracket, SourceSpan::new(lb_start, cur.pos));

            let tags_start = cur.pos;
            let mut tags = String::new();
            while let Some(ch) = cur.peek() {
                if ch == ']' {
                    break;
                }
                tags.push(ch);
                cur.bump();
            }
            self.push(
                TokenKind::Text(tags.trim().to_string()),
                SourceSpan::new(tags_start, cur.pos),
            );

            if cur.peek() == Some(']') {
                let rb_start = cur.pos;
                cur.bump();
                self.push(TokenKind::RBracket, SourceSpan::new(rb_start, cur.pos));
            } else {
                self.diagnostics.push(
                    Diagnostic::error(DiagCode::UnclosedDelimiter, "unclosed '[' in passage header")
                        .with_location(SourceLocation::new(
                            &self.file.path,
                            SourceSpan::new(lb_start, cur.pos),
                        )),
                );
            }
        }
    }

    /// `@@ key: value` or `@@ var $name = expr`
    fn lex_metadata(&mut self, cur: &mut LineCursor) {
        let marker_start = cur.pos;
        cur.bump_str("@@");
        self.push(TokenKind::MetadataMarker, SourceSpan::new(marker_start, cur.pos));
        cur.skip_spaces();

        let rest = cur.rest();
        let is_var_decl = rest
            .strip_prefix("var")
            .is_some_and(|r| r.trim_start().starts_with('$'));

        if is_var_decl {
            let kw_start = cur.pos;
            cur.bump_str("var");
            self.push(
                TokenKind::Ident("var".to_string()),
                SourceSpan::new(kw_start, cur.pos),
            );
            self.lex_expr_until_line_end(cur);
        } else {
            let text_start = cur.pos;
            let text = cur.rest().to_string();
            let span = self.whole_line_span(cur);
            self.push(
                TokenKind::Text(text),
                SourceSpan::new(text_start, span.end),
            );
        }
    }

    /// `+ [text] -> Target`, `+ [text] { … }`, `+ [text] {`
    fn lex_choice(&mut self, cur: &mut LineCursor) {
        let marker_start = cur.pos;
        cur.bump();
        self.push(TokenKind::ChoiceMarker, SourceSpan::new(marker_start, cur.pos));
        cur.skip_spaces();

        if cur.peek() == Some('[') {
            let lb_start = cur.pos;
            cur.bump();
            self.push(TokenKind::LBracket, SourceSpan::new(lb_start, cur.pos));

            let text_start = cur.pos;
            let mut text = String::new();
            while let Some(ch) = cur.peek() {
                if ch == ']' {
                    break;
                }
                text.push(ch);
                cur.bump();
            }
            self.push(TokenKind::Text(text), SourceSpan::new(text_start, cur.pos));

            if cur.peek() == Some(']') {
                let rb_start = cur.pos;
                cur.bump();
                self.push(TokenKind::RBracket, SourceSpan::new(rb_start, cur.pos));
            } else {
                self.diagnostics.push(
                    Diagnostic::error(DiagCode::UnclosedDelimiter, "unclosed '[' in choice text")
                        .with_location(SourceLocation::new(
                            &self.file.path,
                            SourceSpan::new(lb_start, cur.pos),
                        )),
                );
            }
        }

        cur.skip_spaces();
        if cur.starts_with("->") {
            let arrow_start = cur.pos;
            cur.bump_str("->");
            self.push(TokenKind::Arrow, SourceSpan::new(arrow_start, cur.pos));
            self.lex_target(cur);
            return;
        }

        if cur.peek() == Some('{') {
            let lb_start = cur.pos;
            cur.bump();
            self.push(TokenKind::LBrace, SourceSpan::new(lb_start, cur.pos));

            // Guard form (`{ if cond -> Target }`) lexes as an expression;
            // anything else is inline body content.
            let inner = cur.rest();
            let guard_like = inner.trim_start().starts_with("if ")
                || inner.trim_start().starts_with("if(");
            if guard_like {
                self.lex_expr(cur, 1);
            } else if inner.trim().is_empty() {
                // Multi-line body; subsequent lines lex normally until `}`.
            } else {
                self.lex_text(cur, 1);
            }
        }
    }

    /// Passage names may contain spaces; a target is raw text to end of line
    /// (or the closing brace in guard position).
    fn lex_target(&mut self, cur: &mut LineCursor) {
        cur.skip_spaces();
        let start = cur.pos;
        let mut text = String::new();
        while let Some(ch) = cur.peek() {
            if ch == '}' {
                break;
            }
            text.push(ch);
            cur.bump();
        }
        let trimmed = text.trim_end();
        let mut end = start;
        for ch in trimmed.chars() {
            end.advance(ch);
        }
        self.push(
            TokenKind::Text(trimmed.to_string()),
            SourceSpan::new(start, end),
        );
        if cur.peek() == Some('}') {
            let rb_start = cur.pos;
            cur.bump();
            self.push(TokenKind::RBrace, SourceSpan::new(rb_start, cur.pos));
        }
    }

    /// Prose with inline toggles, interpolation islands, hooks, and links.
    ///
    /// `brace_depth` is nonzero when lexing inside a choice's inline body;
    /// the matching `}` closes it.
    fn lex_text(&mut self, cur: &mut LineCursor, mut brace_depth: u32) {
        let mut buf = String::new();
        let mut buf_start = cur.pos;
        let mut hook_depth: u32 = 0;

        macro_rules! flush {
            () => {
                if !buf.is_empty() {
                    let span = SourceSpan::new(buf_start, cur.pos);
                    self.tokens.push(Token::new(TokenKind::Text(std::mem::take(&mut buf)), span));
                }
            };
        }

        while let Some(ch) = cur.peek() {
            match ch {
                '\\' => {
                    // Escape: next char is literal.
                    cur.bump();
                    if let Some(esc) = cur.bump() {
                        buf.push(esc);
                    } else {
                        buf.push('\\');
                    }
                }
                '{' => {
                    flush!();
                    let start = cur.pos;
                    cur.bump();
                    self.push(TokenKind::LBrace, SourceSpan::new(start, cur.pos));
                    self.lex_expr(cur, 1);
                    buf_start = cur.pos;
                }
                '}' if brace_depth > 0 => {
                    flush!();
                    let start = cur.pos;
                    cur.bump();
                    self.push(TokenKind::RBrace, SourceSpan::new(start, cur.pos));
                    brace_depth -= 1;
                    if brace_depth == 0 {
                        return;
                    }
                    buf_start = cur.pos;
                }
                '*' => {
                    flush!();
                    let start = cur.pos;
                    if cur.starts_with("**") {
                        cur.bump_str("**");
                        self.push(TokenKind::Bold, SourceSpan::new(start, cur.pos));
                    } else {
                        cur.bump();
                        self.push(TokenKind::Italic, SourceSpan::new(start, cur.pos));
                    }
                    buf_start = cur.pos;
                }
                '~' if cur.starts_with("~~") => {
                    flush!();
                    let start = cur.pos;
                    cur.bump_str("~~");
                    self.push(TokenKind::Strike, SourceSpan::new(start, cur.pos));
                    buf_start = cur.pos;
                }
                '`' => {
                    flush!();
                    let start = cur.pos;
                    cur.bump();
                    self.push(TokenKind::CodeTick, SourceSpan::new(start, cur.pos));
                    buf_start = cur.pos;
                }
                '[' if cur.starts_with("[[") => {
                    flush!();
                    self.lex_link(cur);
                    buf_start = cur.pos;
                }
                '|' => {
                    if let Some((name, visible, consumed)) = hook_open(cur.rest()) {
                        flush!();
                        let start = cur.pos;
                        for _ in 0..consumed {
                            cur.bump();
                        }
                        self.push(
                            TokenKind::HookOpen { name, visible },
                            SourceSpan::new(start, cur.pos),
                        );
                        hook_depth += 1;
                        buf_start = cur.pos;
                    } else {
                        buf.push(ch);
                        cur.bump();
                    }
                }
                ']' if hook_depth > 0 => {
                    flush!();
                    let start = cur.pos;
                    cur.bump();
                    self.push(TokenKind::RBracket, SourceSpan::new(start, cur.pos));
                    hook_depth -= 1;
                    buf_start = cur.pos;
                }
                _ => {
                    buf.push(ch);
                    cur.bump();
                }
            }
        }
        flush!();
    }

    /// `[[text|target]]`, `[[text->target]]`, `[[target]]`
    fn lex_link(&mut self, cur: &mut LineCursor) {
        let start = cur.pos;
        cur.bump_str("[[");
        self.push(TokenKind::LinkOpen, SourceSpan::new(start, cur.pos));

        let mut buf = String::new();
        let mut buf_start = cur.pos;
        loop {
            let Some(ch) = cur.peek() else {
                self.diagnostics.push(
                    Diagnostic::error(DiagCode::UnclosedDelimiter, "unterminated '[[' link")
                        .with_location(SourceLocation::new(
                            &self.file.path,
                            SourceSpan::new(start, cur.pos),
                        )),
                );
                break;
            };
            if cur.starts_with("]]") {
                if !buf.is_empty() {
                    let span = SourceSpan::new(buf_start, cur.pos);
                    self.tokens
                        .push(Token::new(TokenKind::Text(std::mem::take(&mut buf)), span));
                }
                let close_start = cur.pos;
                cur.bump_str("]]");
                self.push(TokenKind::LinkClose, SourceSpan::new(close_start, cur.pos));
                break;
            }
            if ch == '|' || cur.starts_with("->") {
                if !buf.is_empty() {
                    let span = SourceSpan::new(buf_start, cur.pos);
                    self.tokens
                        .push(Token::new(TokenKind::Text(std::mem::take(&mut buf)), span));
                }
                let sep_start = cur.pos;
                if ch == '|' {
                    cur.bump();
                    self.push(TokenKind::Pipe, SourceSpan::new(sep_start, cur.pos));
                } else {
                    cur.bump_str("->");
                    self.push(TokenKind::Arrow, SourceSpan::new(sep_start, cur.pos));
                }
                buf_start = cur.pos;
                continue;
            }
            buf.push(ch);
            cur.bump();
        }
    }

    fn lex_expr_until_line_end(&mut self, cur: &mut LineCursor) {
        self.lex_expr(cur, 0);
    }

    /// Expression atoms. `close_depth` > 0 means we stop after emitting the
    /// `}` that brings the brace depth back to zero.
    fn lex_expr(&mut self, cur: &mut LineCursor, close_depth: u32) {
        let mut depth = close_depth;
        loop {
            cur.skip_spaces();
            let Some(ch) = cur.peek() else {
                return;
            };
            let start = cur.pos;

            match ch {
                '}' => {
                    cur.bump();
                    self.push(TokenKind::RBrace, SourceSpan::new(start, cur.pos));
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            return;
                        }
                    }
                }
                '{' => {
                    cur.bump();
                    self.push(TokenKind::LBrace, SourceSpan::new(start, cur.pos));
                    depth += 1;
                }
                '(' => {
                    cur.bump();
                    self.push(TokenKind::LParen, SourceSpan::new(start, cur.pos));
                }
                ')' => {
                    cur.bump();
                    self.push(TokenKind::RParen, SourceSpan::new(start, cur.pos));
                }
                '[' => {
                    cur.bump();
                    self.push(TokenKind::LBracket, SourceSpan::new(start, cur.pos));
                }
                ']' => {
                    cur.bump();
                    self.push(TokenKind::RBracket, SourceSpan::new(start, cur.pos));
                }
                ',' => {
                    cur.bump();
                    self.push(TokenKind::Comma, SourceSpan::new(start, cur.pos));
                }
                ':' => {
                    cur.bump();
                    self.push(TokenKind::Colon, SourceSpan::new(start, cur.pos));
                }
                '+' => {
                    cur.bump();
                    self.push(TokenKind::Plus, SourceSpan::new(start, cur.pos));
                }
                '-' => {
                    if cur.starts_with("->") {
                        cur.bump_str("->");
                        self.push(TokenKind::Arrow, SourceSpan::new(start, cur.pos));
                        self.lex_target(cur);
                        return;
                    }
                    cur.bump();
                    self.push(TokenKind::Minus, SourceSpan::new(start, cur.pos));
                }
                '*' => {
                    cur.bump();
                    self.push(TokenKind::Star, SourceSpan::new(start, cur.pos));
                }
                '/' => {
                    cur.bump();
                    self.push(TokenKind::Slash, SourceSpan::new(start, cur.pos));
                }
                '%' => {
                    cur.bump();
                    self.push(TokenKind::Percent, SourceSpan::new(start, cur.pos));
                }
                '=' => {
                    if cur.starts_with("==") {
                        cur.bump_str("==");
                        self.push(TokenKind::EqEq, SourceSpan::new(start, cur.pos));
                    } else {
                        cur.bump();
                        self.push(TokenKind::Assign, SourceSpan::new(start, cur.pos));
                    }
                }
                '!' => {
                    if cur.starts_with("!=") {
                        cur.bump_str("!=");
                        self.push(TokenKind::NotEq, SourceSpan::new(start, cur.pos));
                    } else {
                        cur.bump();
                        let span = SourceSpan::new(start, cur.pos);
                        self.error_char('!', span);
                    }
                }
                '<' => {
                    if cur.starts_with("<=") {
                        cur.bump_str("<=");
                        self.push(TokenKind::Le, SourceSpan::new(start, cur.pos));
                    } else {
                        cur.bump();
                        self.push(TokenKind::Lt, SourceSpan::new(start, cur.pos));
                    }
                }
                '>' => {
                    if cur.starts_with(">=") {
                        cur.bump_str(">=");
                        self.push(TokenKind::Ge, SourceSpan::new(start, cur.pos));
                    } else {
                        cur.bump();
                        self.push(TokenKind::Gt, SourceSpan::new(start, cur.pos));
                    }
                }
                '$' => {
                    cur.bump();
                    let mut name = String::new();
                    while cur.peek().is_some_and(is_ident_char) {
                        name.push(cur.bump().unwrap_or_default());
                    }
                    self.push(TokenKind::Variable(name), SourceSpan::new(start, cur.pos));
                }
                '"' => {
                    self.lex_string(cur);
                }
                c if c.is_ascii_digit() => {
                    let mut lexeme = String::new();
                    let mut seen_dot = false;
                    while let Some(d) = cur.peek() {
                        if d.is_ascii_digit() {
                            lexeme.push(d);
                            cur.bump();
                        } else if d == '.' && !seen_dot && cur.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
                            seen_dot = true;
                            lexeme.push(d);
                            cur.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(TokenKind::Number(lexeme), SourceSpan::new(start, cur.pos));
                }
                c if is_ident_start(c) => {
                    let mut ident = String::new();
                    while cur.peek().is_some_and(is_ident_char) {
                        ident.push(cur.bump().unwrap_or_default());
                    }
                    let kind = TokenKind::keyword(&ident).unwrap_or(TokenKind::Ident(ident));
                    self.push(kind, SourceSpan::new(start, cur.pos));
                }
                other => {
                    cur.bump();
                    let span = SourceSpan::new(start, cur.pos);
                    self.error_char(other, span);
                }
            }
        }
    }

    fn lex_string(&mut self, cur: &mut LineCursor) {
        let start = cur.pos;
        cur.bump(); // opening quote
        let mut value = String::new();
        loop {
            match cur.peek() {
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(DiagCode::UnterminatedString, "unterminated string literal")
                            .with_location(SourceLocation::new(
                                &self.file.path,
                                SourceSpan::new(start, cur.pos),
                            )),
                    );
                    self.push(TokenKind::Str(value), SourceSpan::new(start, cur.pos));
                    return;
                }
                Some('"') => {
                    cur.bump();
                    self.push(TokenKind::Str(value), SourceSpan::new(start, cur.pos));
                    return;
                }
                Some('\\') => {
                    cur.bump();
                    match cur.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(other) => value.push(other),
                        None => {}
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    cur.bump();
                }
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_rule_line(trimmed: &str) -> bool {
    (trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-'))
        || (trimmed.len() >= 3 && trimmed.chars().all(|c| c == '*'))
}

fn blockquote_depth(trimmed: &str) -> Option<u8> {
    let depth = trimmed.chars().take_while(|&c| c == '>').count();
    if depth > 0 {
        Some(depth.min(255) as u8)
    } else {
        None
    }
}

/// `- item`, `* item`, `3. item`. A marker needs a following space so that
/// `*italic*` is not mistaken for a list.
fn list_marker(trimmed: &str) -> Option<bool> {
    if (trimmed.starts_with("- ") || trimmed.starts_with("* ")) && trimmed.len() > 2 {
        return Some(false);
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && trimmed[digits..].starts_with(". ") {
        return Some(true);
    }
    None
}

/// Matches `|name>[` or `|name)[`; returns (name, visible, chars consumed).
fn hook_open(rest: &str) -> Option<(String, bool, usize)> {
    let mut chars = rest.chars();
    if chars.next() != Some('|') {
        return None;
    }
    let name: String = chars.clone().take_while(|c| is_ident_char(*c)).collect();
    if name.is_empty() {
        return None;
    }
    let after = &rest[1 + name.len()..];
    let name_chars = name.chars().count();
    if after.starts_with(">[") {
        Some((name, true, name_chars + 3))
    } else if after.starts_with(")[") {
        Some((name, false, name_chars + 3))
    } else {
        None
    }
}
