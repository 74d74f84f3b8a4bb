//! Recursive-descent parser for WhiskerScript.
//!
//! The parser consumes the token stream line by line, building the spanned
//! AST of [`crate::ast`]. It never aborts: on an unexpected token it emits a
//! diagnostic, synchronizes to the next line boundary, and keeps going, so a
//! single typo does not hide every later problem.
//!
//! # Block structure
//!
//! Multi-line constructs (`{ if }` … `{ endif }`, `{ for }` … `{ endfor }`,
//! multi-line choice bodies) are assembled by [`Parser::parse_body`], which
//! stops when it sees a control line belonging to an enclosing construct
//! and leaves the tokens for the caller to consume.

mod expr;

#[cfg(test)]
mod tests;

use whisker_base::{DiagCode, Diagnostic, SourceFile, SourceLocation, SourceSpan};
use whisker_story::FormatFlags;

use crate::ast::{ExprNode, MetadataEntry, Module, Node, NodeKind, PassageNode, VarDecl};
use crate::lexer::{lex, LexOutput};
use crate::token::{Token, TokenKind};

/// The result of parsing one file.
#[derive(Debug)]
pub struct ParseOutput {
    pub module: Module,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lexes and parses a source file.
pub fn parse(file: &SourceFile) -> ParseOutput {
    let LexOutput {
        tokens,
        mut diagnostics,
    } = lex(file);
    let mut parser = Parser::new(file, tokens);
    let module = parser.parse_module();
    diagnostics.append(&mut parser.diagnostics);
    ParseOutput {
        module,
        diagnostics,
    }
}

/// What ended a [`Parser::parse_body`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyStop {
    /// `{ elsif … }` control line (tokens not consumed).
    Elsif,
    /// `{ else }` control line.
    Else,
    /// `{ endif }` control line (consumed).
    Endif,
    /// `{ endfor }` control line (consumed).
    Endfor,
    /// A `}` line closing a multi-line choice body (consumed).
    CloseBrace,
    /// Next passage header or end of input.
    End,
}

pub(crate) struct Parser<'a> {
    file: &'a SourceFile,
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(file: &'a SourceFile, tokens: Vec<Token>) -> Self {
        Self {
            file,
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    pub(crate) fn current_span(&self) -> SourceSpan {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn location(&self, span: SourceSpan) -> SourceLocation {
        SourceLocation::new(&self.file.path, span)
    }

    pub(crate) fn report(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    /// Skips to the start of the next line. The recovery point for every
    /// statement-level error.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if matches!(self.peek(), TokenKind::Newline) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn parse_module(&mut self) -> Module {
        let mut module = Module::default();
        let mut reported_stray_content = false;

        loop {
            self.skip_newlines();
            if self.at_eof() {
                break;
            }
            match self.peek() {
                TokenKind::PassageMarker => {
                    let passage = self.parse_passage();
                    module.passages.push(passage);
                }
                TokenKind::MetadataMarker => {
                    self.parse_metadata_line(&mut module.metadata, &mut module.variables);
                }
                _ => {
                    if !reported_stray_content {
                        let span = self.current_span();
                        self.report(
                            Diagnostic::error(
                                DiagCode::ExpectedPassageHeader,
                                "content before the first ':: Passage' header",
                            )
                            .with_location(self.location(span)),
                        );
                        reported_stray_content = true;
                    }
                    self.synchronize();
                }
            }
        }

        module
    }

    /// `@@ key: value` or `@@ var $name = expr`
    fn parse_metadata_line(
        &mut self,
        metadata: &mut Vec<MetadataEntry>,
        variables: &mut Vec<VarDecl>,
    ) {
        let marker_span = self.current_span();
        self.advance(); // @@

        match self.peek().clone() {
            TokenKind::Ident(ref kw) if kw == "var" => {
                self.advance();
                let TokenKind::Variable(name) = self.peek().clone() else {
                    let span = self.current_span();
                    self.report(
                        Diagnostic::error(
                            DiagCode::InvalidMetadata,
                            "expected '$variable' after '@@ var'",
                        )
                        .with_location(self.location(span)),
                    );
                    self.synchronize();
                    return;
                };
                self.advance();
                if !self.eat(&TokenKind::Assign) {
                    let span = self.current_span();
                    self.report(
                        Diagnostic::error(
                            DiagCode::InvalidMetadata,
                            "expected '=' in variable declaration",
                        )
                        .with_location(self.location(span)),
                    );
                    self.synchronize();
                    return;
                }
                let initial = self.parse_expression();
                let span = marker_span.merge(initial.span);
                variables.push(VarDecl {
                    name,
                    initial,
                    span,
                });
                self.synchronize();
            }
            TokenKind::Text(raw) => {
                self.advance();
                match raw.split_once(':') {
                    Some((key, value)) => {
                        metadata.push(MetadataEntry {
                            key: key.trim().to_string(),
                            value: value.trim().to_string(),
                            span: marker_span,
                        });
                    }
                    None => {
                        self.report(
                            Diagnostic::warning(
                                DiagCode::InvalidMetadata,
                                format!("metadata line '{}' has no ':' separator", raw.trim()),
                            )
                            .with_location(self.location(marker_span)),
                        );
                    }
                }
                self.synchronize();
            }
            _ => {
                self.report(
                    Diagnostic::warning(DiagCode::InvalidMetadata, "empty metadata line")
                        .with_location(self.location(marker_span)),
                );
                self.synchronize();
            }
        }
    }

    /// `:: Name [tags]` followed by the passage body.
    fn parse_passage(&mut self) -> PassageNode {
        let header_span = self.current_span();
        self.advance(); // ::

        let name = match self.peek().clone() {
            TokenKind::Text(name) => {
                self.advance();
                name
            }
            _ => String::new(),
        };
        if name.is_empty() {
            self.report(
                Diagnostic::error(DiagCode::ExpectedPassageHeader, "passage header has no name")
                    .with_location(self.location(header_span)),
            );
        }

        let mut tags = Vec::new();
        if self.eat(&TokenKind::LBracket) {
            if let TokenKind::Text(raw) = self.peek().clone() {
                self.advance();
                tags = raw
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            self.eat(&TokenKind::RBracket);
        }
        self.synchronize();

        let mut passage = PassageNode {
            name,
            tags,
            span: header_span,
            metadata: Vec::new(),
            body: Vec::new(),
        };

        loop {
            let (mut body, stop) = self.parse_body(&mut passage.metadata);
            passage.body.append(&mut body);
            match stop {
                BodyStop::End => break,
                BodyStop::Elsif | BodyStop::Else => {
                    // Orphaned control line; consume it and keep going.
                    let at = self.current_span();
                    self.report(
                        Diagnostic::error(
                            DiagCode::UnexpectedToken,
                            "control line without a matching '{ if }'",
                        )
                        .with_location(self.location(at)),
                    );
                    self.consume_control_line();
                }
                BodyStop::Endif | BodyStop::Endfor | BodyStop::CloseBrace => {
                    let at = self.current_span();
                    self.report(
                        Diagnostic::error(
                            DiagCode::UnexpectedToken,
                            "closing line without a matching opener",
                        )
                        .with_location(self.location(at)),
                    );
                }
            }
        }
        passage
    }

    // ------------------------------------------------------------------
    // Passage bodies
    // ------------------------------------------------------------------

    /// Parses content lines until a stop condition. Control lines that
    /// belong to an enclosing construct (`{ elsif }`, `{ else }`) are left
    /// unconsumed; their terminators (`{ endif }`, `{ endfor }`, `}`) are
    /// consumed.
    fn parse_body(&mut self, metadata: &mut Vec<MetadataEntry>) -> (Vec<Node>, BodyStop) {
        let mut nodes = Vec::new();

        loop {
            if self.at_eof() || matches!(self.peek(), TokenKind::PassageMarker) {
                return (nodes, BodyStop::End);
            }
            match self.peek() {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::MetadataMarker => {
                    let mut vars = Vec::new();
                    self.parse_metadata_line(metadata, &mut vars);
                    for var in vars {
                        self.report(
                            Diagnostic::warning(
                                DiagCode::InvalidMetadata,
                                "variable declarations belong before the first passage",
                            )
                            .with_location(self.location(var.span)),
                        );
                    }
                }
                TokenKind::ChoiceMarker => {
                    let node = self.parse_choice();
                    nodes.push(node);
                }
                TokenKind::TildeMarker => {
                    if let Some(node) = self.parse_assignment() {
                        nodes.push(node);
                    }
                }
                TokenKind::Arrow => {
                    let span = self.current_span();
                    self.advance();
                    if let TokenKind::Text(target) = self.peek().clone() {
                        self.advance();
                        nodes.push(Node::new(NodeKind::Divert { target }, span));
                    } else {
                        self.report(
                            Diagnostic::error(DiagCode::UnexpectedToken, "expected target after '->'")
                                .with_location(self.location(span)),
                        );
                    }
                    self.synchronize();
                }
                TokenKind::LBrace => match self.peek_at(1) {
                    TokenKind::KwIf => {
                        let node = self.parse_conditional();
                        nodes.push(node);
                    }
                    TokenKind::KwFor => {
                        let node = self.parse_foreach();
                        nodes.push(node);
                    }
                    TokenKind::KwElsif => return (nodes, BodyStop::Elsif),
                    TokenKind::KwElse => return (nodes, BodyStop::Else),
                    TokenKind::KwEndif => {
                        self.consume_control_line();
                        return (nodes, BodyStop::Endif);
                    }
                    TokenKind::KwEndfor => {
                        self.consume_control_line();
                        return (nodes, BodyStop::Endfor);
                    }
                    _ => {
                        let mut line = self.parse_text_line();
                        nodes.append(&mut line);
                    }
                },
                TokenKind::RBrace => {
                    self.advance();
                    self.skip_newlines();
                    return (nodes, BodyStop::CloseBrace);
                }
                TokenKind::BlockquoteMarker(depth) => {
                    let depth = *depth;
                    let span = self.current_span();
                    self.advance();
                    let body = self.parse_text_line();
                    nodes.push(Node::new(NodeKind::Blockquote { depth, body }, span));
                }
                TokenKind::ListMarker { ordered } => {
                    let ordered = *ordered;
                    let span = self.current_span();
                    self.advance();
                    let body = self.parse_text_line();
                    nodes.push(Node::new(NodeKind::ListItem { ordered, body }, span));
                }
                TokenKind::HorizontalRule => {
                    let span = self.current_span();
                    self.advance();
                    nodes.push(Node::new(NodeKind::HorizontalRule, span));
                    self.synchronize();
                }
                TokenKind::FenceOpen(lang) => {
                    let lang = lang.clone();
                    let node = self.parse_fence(lang);
                    nodes.push(node);
                }
                TokenKind::Error(_) => {
                    self.advance();
                }
                _ => {
                    let mut line = self.parse_text_line();
                    nodes.append(&mut line);
                }
            }
        }
    }

    /// Consumes `{ endif }` / `{ endfor }` and the rest of its line.
    fn consume_control_line(&mut self) {
        self.advance(); // {
        self.advance(); // keyword
        self.eat(&TokenKind::RBrace);
        self.synchronize();
    }

    /// A fenced code block. The info string `script` marks an opaque host
    /// script; anything else is a formatted code block.
    fn parse_fence(&mut self, lang: String) -> Node {
        let span = self.current_span();
        self.advance(); // FenceOpen
        self.eat(&TokenKind::Newline);

        let mut lines = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::Text(text) => {
                    self.advance();
                    lines.push(text);
                }
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::FenceClose => {
                    self.advance();
                    break;
                }
                _ => break,
            }
        }
        let text = lines.join("\n");

        if lang == "script" {
            Node::new(NodeKind::ScriptBlock { text }, span)
        } else {
            Node::new(
                NodeKind::Text {
                    text,
                    flags: FormatFlags {
                        codeblock: Some(lang),
                        ..FormatFlags::default()
                    },
                },
                span,
            )
        }
    }

    /// `~ $var = expr`
    fn parse_assignment(&mut self) -> Option<Node> {
        let span = self.current_span();
        self.advance(); // ~

        let TokenKind::Variable(var) = self.peek().clone() else {
            let at = self.current_span();
            self.report(
                Diagnostic::error(DiagCode::UnexpectedToken, "expected '$variable' after '~'")
                    .with_location(self.location(at)),
            );
            self.synchronize();
            return None;
        };
        self.advance();

        if !self.eat(&TokenKind::Assign) {
            let at = self.current_span();
            self.report(
                Diagnostic::error(DiagCode::UnexpectedToken, "expected '=' in assignment")
                    .with_location(self.location(at)),
            );
            self.synchronize();
            return None;
        }

        let expr = self.parse_expression();
        let span = span.merge(expr.span);
        self.synchronize();
        Some(Node::new(NodeKind::Assignment { var, expr }, span))
    }

    /// `+ [text] -> Target`, `+ [text] { if cond -> Target }`,
    /// `+ [text] { inline body }`, or `+ [text] {` … `}` across lines.
    fn parse_choice(&mut self) -> Node {
        let span = self.current_span();
        self.advance(); // +

        let mut text = String::new();
        if self.eat(&TokenKind::LBracket) {
            if let TokenKind::Text(t) = self.peek().clone() {
                self.advance();
                text = t.trim().to_string();
            }
            self.eat(&TokenKind::RBracket);
        } else {
            self.report(
                Diagnostic::error(DiagCode::InvalidChoice, "expected '[choice text]' after '+'")
                    .with_location(self.location(span)),
            );
            self.synchronize();
            return Node::new(
                NodeKind::Choice {
                    text,
                    target: None,
                    body: Vec::new(),
                    guard: None,
                },
                span,
            );
        }

        let mut target = None;
        let mut guard = None;
        let mut body = Vec::new();

        match self.peek().clone() {
            TokenKind::Arrow => {
                self.advance();
                if let TokenKind::Text(t) = self.peek().clone() {
                    self.advance();
                    target = Some(t);
                }
                self.synchronize();
            }
            TokenKind::LBrace => {
                self.advance();
                match self.peek() {
                    TokenKind::KwIf => {
                        self.advance();
                        let cond = self.parse_expression();
                        if self.eat(&TokenKind::Arrow) {
                            if let TokenKind::Text(t) = self.peek().clone() {
                                self.advance();
                                target = Some(t);
                            }
                            self.eat(&TokenKind::RBrace);
                        } else {
                            self.report(
                                Diagnostic::error(
                                    DiagCode::InvalidChoice,
                                    "expected '-> Target' after choice guard",
                                )
                                .with_location(self.location(cond.span)),
                            );
                        }
                        guard = Some(cond);
                        self.synchronize();
                    }
                    TokenKind::Newline => {
                        // Multi-line inline body, closed by a `}` line.
                        self.advance();
                        let mut meta = Vec::new();
                        let (nodes, stop) = self.parse_body(&mut meta);
                        body = nodes;
                        if stop != BodyStop::CloseBrace {
                            self.report(
                                Diagnostic::error(
                                    DiagCode::UnclosedDelimiter,
                                    "choice body is missing its closing '}'",
                                )
                                .with_location(self.location(span)),
                            );
                        }
                    }
                    _ => {
                        body = self.parse_inline_body();
                        self.synchronize();
                    }
                }
            }
            _ => {
                self.synchronize();
            }
        }

        Node::new(
            NodeKind::Choice {
                text,
                target,
                body,
                guard,
            },
            span,
        )
    }

    /// Text-mode content between a choice's `{` and its matching `}` on the
    /// same line.
    fn parse_inline_body(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut flags = FormatFlags::default();

        loop {
            match self.peek().clone() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Newline | TokenKind::Eof => break,
                _ => {
                    if !self.parse_text_token(&mut nodes, &mut flags) {
                        break;
                    }
                }
            }
        }
        nodes
    }

    /// `{ if cond }` body `{ elsif cond }` body `{ else }` body `{ endif }`
    fn parse_conditional(&mut self) -> Node {
        let span = self.current_span();
        self.advance(); // {
        self.advance(); // if
        let condition = self.parse_expression();
        self.eat(&TokenKind::RBrace);
        self.eat(&TokenKind::Newline);

        let mut meta = Vec::new();
        let (then_body, mut stop) = self.parse_body(&mut meta);
        let mut elsif = Vec::new();
        let mut else_body = None;

        while stop == BodyStop::Elsif {
            self.advance(); // {
            self.advance(); // elsif
            let cond = self.parse_expression();
            self.eat(&TokenKind::RBrace);
            self.eat(&TokenKind::Newline);
            let (arm, next) = self.parse_body(&mut meta);
            elsif.push((cond, arm));
            stop = next;
        }

        if stop == BodyStop::Else {
            self.consume_control_line();
            let (arm, next) = self.parse_body(&mut meta);
            else_body = Some(arm);
            stop = next;
        }

        if stop != BodyStop::Endif {
            self.report(
                Diagnostic::error(
                    DiagCode::UnterminatedConditional,
                    "'{ if }' block is missing '{ endif }'",
                )
                .with_location(self.location(span)),
            );
        }

        Node::new(
            NodeKind::Conditional {
                condition,
                then_body,
                elsif,
                else_body,
            },
            span,
        )
    }

    /// `{ for x in expr }` body `{ endfor }`
    fn parse_foreach(&mut self) -> Node {
        let span = self.current_span();
        self.advance(); // {
        self.advance(); // for

        let binder = match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            TokenKind::Variable(name) => {
                self.advance();
                name
            }
            _ => {
                let at = self.current_span();
                self.report(
                    Diagnostic::error(DiagCode::UnexpectedToken, "expected loop variable after 'for'")
                        .with_location(self.location(at)),
                );
                String::new()
            }
        };

        if !self.eat(&TokenKind::KwIn) {
            let at = self.current_span();
            self.report(
                Diagnostic::error(DiagCode::UnexpectedToken, "expected 'in' in for loop")
                    .with_location(self.location(at)),
            );
        }
        let collection = self.parse_expression();
        self.eat(&TokenKind::RBrace);
        self.eat(&TokenKind::Newline);

        let mut meta = Vec::new();
        let (body, stop) = self.parse_body(&mut meta);
        if stop != BodyStop::Endfor {
            self.report(
                Diagnostic::error(
                    DiagCode::UnterminatedConditional,
                    "'{ for }' block is missing '{ endfor }'",
                )
                .with_location(self.location(span)),
            );
        }

        Node::new(
            NodeKind::ForEach {
                binder,
                collection,
                body,
            },
            span,
        )
    }

    /// One prose line: text runs, inline toggles, interpolations, links,
    /// hooks. Ends with an implicit newline text node so renderers keep
    /// the author's line breaks.
    fn parse_text_line(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut flags = FormatFlags::default();

        loop {
            match self.peek() {
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                TokenKind::Eof | TokenKind::PassageMarker => break,
                _ => {
                    if !self.parse_text_token(&mut nodes, &mut flags) {
                        break;
                    }
                }
            }
        }

        if !nodes.is_empty() {
            let span = nodes.last().map(|n| n.span).unwrap_or_default();
            nodes.push(Node::new(
                NodeKind::Text {
                    text: "\n".to_string(),
                    flags: FormatFlags::default(),
                },
                span,
            ));
        }
        nodes
    }

    /// Handles one token of inline content. Returns `false` when the token
    /// cannot be part of text (caller decides what to do).
    fn parse_text_token(&mut self, nodes: &mut Vec<Node>, flags: &mut FormatFlags) -> bool {
        let span = self.current_span();
        match self.peek().clone() {
            TokenKind::Text(text) => {
                self.advance();
                nodes.push(Node::new(
                    NodeKind::Text {
                        text,
                        flags: flags.clone(),
                    },
                    span,
                ));
                true
            }
            TokenKind::Bold => {
                self.advance();
                flags.bold = !flags.bold;
                true
            }
            TokenKind::Italic => {
                self.advance();
                flags.italic = !flags.italic;
                true
            }
            TokenKind::Strike => {
                self.advance();
                flags.strike = !flags.strike;
                true
            }
            TokenKind::CodeTick => {
                self.advance();
                flags.code = !flags.code;
                true
            }
            TokenKind::LBrace => {
                self.advance();
                let expr = self.parse_expression();
                if !self.eat(&TokenKind::RBrace) {
                    self.report(
                        Diagnostic::error(DiagCode::UnclosedDelimiter, "unclosed '{' interpolation")
                            .with_location(self.location(span)),
                    );
                }
                let expr_span = span.merge(expr.span);
                nodes.push(Node::new(NodeKind::Interpolation { expr }, expr_span));
                true
            }
            TokenKind::LinkOpen => {
                self.advance();
                let node = self.parse_link(span);
                nodes.push(node);
                true
            }
            TokenKind::HookOpen { name, visible } => {
                self.advance();
                let mut body = Vec::new();
                let mut inner_flags = FormatFlags::default();
                loop {
                    match self.peek() {
                        TokenKind::RBracket => {
                            self.advance();
                            break;
                        }
                        TokenKind::Newline | TokenKind::Eof => {
                            self.report(
                                Diagnostic::error(
                                    DiagCode::UnclosedDelimiter,
                                    format!("named hook '|{}>' is missing its ']'", name),
                                )
                                .with_location(self.location(span)),
                            );
                            break;
                        }
                        _ => {
                            if !self.parse_text_token(&mut body, &mut inner_flags) {
                                break;
                            }
                        }
                    }
                }
                nodes.push(Node::new(
                    NodeKind::NamedHook {
                        name,
                        visible,
                        body,
                    },
                    span,
                ));
                true
            }
            TokenKind::Error(_) => {
                self.advance();
                true
            }
            // Expression atoms surfacing in text position happen after a
            // recovered error; render their lexeme as text.
            TokenKind::Ident(word) => {
                self.advance();
                nodes.push(Node::new(
                    NodeKind::Text {
                        text: word,
                        flags: flags.clone(),
                    },
                    span,
                ));
                true
            }
            _ => {
                self.advance();
                true
            }
        }
    }

    /// `[[text|target]]`, `[[text->target]]`, or `[[target]]` — lowered to a
    /// choice node, matching how the Twine family treats wiki links.
    fn parse_link(&mut self, span: SourceSpan) -> Node {
        let mut first = String::new();
        let mut second: Option<String> = None;

        loop {
            match self.peek().clone() {
                TokenKind::Text(t) => {
                    self.advance();
                    if second.is_some() {
                        second = Some(second.unwrap_or_default() + &t);
                    } else {
                        first.push_str(&t);
                    }
                }
                TokenKind::Pipe | TokenKind::Arrow => {
                    self.advance();
                    second = Some(String::new());
                }
                TokenKind::LinkClose => {
                    self.advance();
                    break;
                }
                TokenKind::Newline | TokenKind::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }

        let (text, target) = match second {
            Some(target) => (first, target),
            None => (first.clone(), first),
        };
        Node::new(
            NodeKind::Choice {
                text: text.trim().to_string(),
                target: Some(target.trim().to_string()),
                body: Vec::new(),
                guard: None,
            },
            span,
        )
    }

    fn parse_expression(&mut self) -> ExprNode {
        expr::parse_expression(self)
    }
}
