//! Token types for WhiskerScript.

use whisker_base::SourceSpan;

/// What a token is.
///
/// WhiskerScript is line-oriented: structural markers (`::`, `@@`, `+`, `~`)
/// only mean anything at the start of a line, and `Newline` is significant.
/// Text runs and expression atoms share one stream; the lexer switches
/// between text and expression modes at brace boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Line-start structure
    /// `::` — opens a passage header.
    PassageMarker,
    /// `@@` — story or passage metadata.
    MetadataMarker,
    /// `+` — a choice.
    ChoiceMarker,
    /// `~` — a variable assignment.
    TildeMarker,
    /// `>`, `>>`, ... — blockquote with nesting depth.
    BlockquoteMarker(u8),
    /// `-`, `*`, or `N.` at line start.
    ListMarker { ordered: bool },
    /// `---` or `***` alone on a line.
    HorizontalRule,
    /// ```` ```lang ```` — opens a fenced code block.
    FenceOpen(String),
    FenceClose,

    // Inline text
    /// A literal text run.
    Text(String),
    /// `**` toggle.
    Bold,
    /// `*` toggle.
    Italic,
    /// `~~` toggle.
    Strike,
    /// `` ` `` toggle.
    CodeTick,
    /// `|name>[` (visible) or `|name)[` (hidden) — opens a named hook.
    HookOpen { name: String, visible: bool },
    /// `[[` — opens a wiki-style link.
    LinkOpen,
    /// `]]` — closes a wiki-style link.
    LinkClose,
    /// `|` inside a wiki link.
    Pipe,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `->`
    Arrow,

    // Expression atoms
    Ident(String),
    /// `$name` — a story variable reference.
    Variable(String),
    /// Numeric literal, lexeme preserved verbatim.
    Number(String),
    /// String literal, escapes already processed.
    Str(String),
    LParen,
    RParen,
    Comma,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `=` in assignments.
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Keywords
    KwIf,
    KwElsif,
    KwElse,
    KwEndif,
    KwFor,
    KwEndfor,
    KwIn,
    KwTrue,
    KwFalse,
    KwNil,
    KwAnd,
    KwOr,
    KwNot,
    KwContains,

    Newline,
    Eof,
    /// Placeholder emitted after a `WSK0001` so the stream never aborts.
    Error(char),
}

impl TokenKind {
    /// Keyword lookup for identifiers lexed in expression mode.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "if" => Some(TokenKind::KwIf),
            "elsif" => Some(TokenKind::KwElsif),
            "else" => Some(TokenKind::KwElse),
            "endif" => Some(TokenKind::KwEndif),
            "for" => Some(TokenKind::KwFor),
            "endfor" => Some(TokenKind::KwEndfor),
            "in" => Some(TokenKind::KwIn),
            "true" => Some(TokenKind::KwTrue),
            "false" => Some(TokenKind::KwFalse),
            "nil" => Some(TokenKind::KwNil),
            "and" => Some(TokenKind::KwAnd),
            "or" => Some(TokenKind::KwOr),
            "not" => Some(TokenKind::KwNot),
            "contains" => Some(TokenKind::KwContains),
            _ => None,
        }
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

impl Token {
    pub fn new(kind: TokenKind, span: SourceSpan) -> Self {
        Self { kind, span }
    }

    pub fn is(&self, kind: &TokenKind) -> bool {
        &self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup_covers_control_flow() {
        assert_eq!(TokenKind::keyword("if"), Some(TokenKind::KwIf));
        assert_eq!(TokenKind::keyword("endfor"), Some(TokenKind::KwEndfor));
        assert_eq!(TokenKind::keyword("contains"), Some(TokenKind::KwContains));
        assert_eq!(TokenKind::keyword("banana"), None);
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(TokenKind::keyword("If"), None);
        assert_eq!(TokenKind::keyword("TRUE"), None);
    }
}
