//! Expression parsing and printing for the Twine dialects.
//!
//! Harlowe and SugarCube share most of their expression surface: `$var`
//! story variables, `_var` temporaries, `is` / `is not` for equality,
//! `contains` / `is in` for membership, word operators `and` / `or` / `not`.
//! This module parses that surface into the IR expression model and prints
//! it back. Anything it cannot understand becomes an [`Expr::Raw`] — the
//! caller attaches the diagnostic — so imports never lose text.

use whisker_story::{BinaryOp, Expr, LogicalOp, UnaryOp, Value};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(String),
    Str(String),
    Var(String),
    Word(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(text: &str) -> Option<Vec<Tok>> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '$' | '_' => {
                chars.next();
                let mut name = String::new();
                while chars
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || *c == '_')
                {
                    name.push(chars.next()?);
                }
                if name.is_empty() {
                    return None;
                }
                out.push(Tok::Var(name));
            }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        None => return None,
                        Some(c) if c == quote => break,
                        Some('\\') => value.push(chars.next()?),
                        Some(c) => value.push(c),
                    }
                }
                out.push(Tok::Str(value));
            }
            c if c.is_ascii_digit() => {
                let mut lexeme = String::new();
                while chars
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || *c == '.')
                {
                    lexeme.push(chars.next()?);
                }
                out.push(Tok::Num(lexeme));
            }
            c if c.is_alphabetic() => {
                let mut word = String::new();
                while chars
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || *c == '_')
                {
                    word.push(chars.next()?);
                }
                out.push(Tok::Word(word));
            }
            '(' => {
                chars.next();
                out.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                out.push(Tok::RParen);
            }
            '[' => {
                chars.next();
                out.push(Tok::LBracket);
            }
            ']' => {
                chars.next();
                out.push(Tok::RBracket);
            }
            ',' => {
                chars.next();
                out.push(Tok::Comma);
            }
            '+' => {
                chars.next();
                out.push(Tok::Op("+"));
            }
            '-' => {
                chars.next();
                out.push(Tok::Op("-"));
            }
            '*' => {
                chars.next();
                out.push(Tok::Op("*"));
            }
            '/' => {
                chars.next();
                out.push(Tok::Op("/"));
            }
            '%' => {
                chars.next();
                out.push(Tok::Op("%"));
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Tok::Op("<="));
                } else {
                    out.push(Tok::Op("<"));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Tok::Op(">="));
                } else {
                    out.push(Tok::Op(">"));
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                    }
                    out.push(Tok::Op("=="));
                } else {
                    out.push(Tok::Op("="));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                    }
                    out.push(Tok::Op("!="));
                } else {
                    out.push(Tok::Op("not"));
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    out.push(Tok::Op("&&"));
                } else {
                    return None;
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    out.push(Tok::Op("||"));
                } else {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(out)
}

struct P {
    toks: Vec<Tok>,
    pos: usize,
}

impl P {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.toks.get(self.pos + 1)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// Maps the word-operator surface to a binding power and IR operator.
    /// `is not` and `is in` are two-token lookahead cases.
    fn binary_at(&self) -> Option<(u8, BinaryOp, usize)> {
        match self.peek()? {
            Tok::Word(w) if w == "is" => match self.peek2() {
                Some(Tok::Word(w2)) if w2 == "not" => Some((3, BinaryOp::Ne, 2)),
                Some(Tok::Word(w2)) if w2 == "in" => Some((5, BinaryOp::Contains, 2)),
                _ => Some((3, BinaryOp::Eq, 1)),
            },
            Tok::Word(w) if w == "contains" => Some((5, BinaryOp::Contains, 1)),
            Tok::Word(w) if w == "eq" => Some((3, BinaryOp::Eq, 1)),
            Tok::Word(w) if w == "neq" => Some((3, BinaryOp::Ne, 1)),
            Tok::Word(w) if w == "gt" => Some((4, BinaryOp::Gt, 1)),
            Tok::Word(w) if w == "gte" => Some((4, BinaryOp::Ge, 1)),
            Tok::Word(w) if w == "lt" => Some((4, BinaryOp::Lt, 1)),
            Tok::Word(w) if w == "lte" => Some((4, BinaryOp::Le, 1)),
            Tok::Op("==") => Some((3, BinaryOp::Eq, 1)),
            Tok::Op("!=") => Some((3, BinaryOp::Ne, 1)),
            Tok::Op("<") => Some((4, BinaryOp::Lt, 1)),
            Tok::Op("<=") => Some((4, BinaryOp::Le, 1)),
            Tok::Op(">") => Some((4, BinaryOp::Gt, 1)),
            Tok::Op(">=") => Some((4, BinaryOp::Ge, 1)),
            Tok::Op("+") => Some((6, BinaryOp::Add, 1)),
            Tok::Op("-") => Some((6, BinaryOp::Sub, 1)),
            Tok::Op("*") => Some((7, BinaryOp::Mul, 1)),
            Tok::Op("/") => Some((7, BinaryOp::Div, 1)),
            Tok::Op("%") => Some((7, BinaryOp::Mod, 1)),
            _ => None,
        }
    }

    fn logical_at(&self) -> Option<(u8, LogicalOp)> {
        match self.peek()? {
            Tok::Word(w) if w == "and" => Some((2, LogicalOp::And)),
            Tok::Word(w) if w == "or" => Some((1, LogicalOp::Or)),
            Tok::Op("&&") => Some((2, LogicalOp::And)),
            Tok::Op("||") => Some((1, LogicalOp::Or)),
            _ => None,
        }
    }

    fn expr(&mut self, min_bp: u8) -> Option<Expr> {
        let mut lhs = self.prefix()?;
        loop {
            if let Some((bp, op)) = self.logical_at() {
                if bp < min_bp {
                    break;
                }
                self.next();
                let rhs = self.expr(bp + 1)?;
                lhs = Expr::logical(op, lhs, rhs);
                continue;
            }
            let Some((bp, op, skip)) = self.binary_at() else {
                break;
            };
            if bp < min_bp {
                break;
            }
            for _ in 0..skip {
                self.next();
            }
            let rhs = self.expr(bp + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn prefix(&mut self) -> Option<Expr> {
        match self.peek()? {
            Tok::Word(w) if w == "not" => {
                self.next();
                Some(Expr::unary(UnaryOp::Not, self.expr(8)?))
            }
            Tok::Op("not") => {
                self.next();
                Some(Expr::unary(UnaryOp::Not, self.expr(8)?))
            }
            Tok::Op("-") => {
                self.next();
                Some(Expr::unary(UnaryOp::Neg, self.expr(8)?))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Option<Expr> {
        match self.next()? {
            Tok::Num(lexeme) => {
                if lexeme.contains('.') {
                    lexeme.parse::<f64>().ok().map(|f| Expr::literal(Value::Float(f)))
                } else {
                    lexeme.parse::<i64>().ok().map(|n| Expr::literal(Value::Int(n)))
                }
            }
            Tok::Str(s) => Some(Expr::literal(Value::Str(s))),
            Tok::Var(name) => Some(Expr::variable(name)),
            Tok::Word(w) if w == "true" => Some(Expr::literal(Value::Bool(true))),
            Tok::Word(w) if w == "false" => Some(Expr::literal(Value::Bool(false))),
            Tok::Word(w) if w == "null" || w == "undefined" || w == "nil" => {
                Some(Expr::literal(Value::Nil))
            }
            Tok::Word(name) => {
                if self.peek() == Some(&Tok::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Tok::RParen) {
                        loop {
                            args.push(self.expr(0)?);
                            if self.peek() == Some(&Tok::Comma) {
                                self.next();
                            } else {
                                break;
                            }
                        }
                    }
                    if self.next()? != Tok::RParen {
                        return None;
                    }
                    Some(Expr::Call { name, args })
                } else {
                    Some(Expr::variable(name))
                }
            }
            Tok::LParen => {
                let inner = self.expr(0)?;
                if self.next()? != Tok::RParen {
                    return None;
                }
                Some(inner)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if self.peek() != Some(&Tok::RBracket) {
                    loop {
                        items.push(self.expr(0)?);
                        if self.peek() == Some(&Tok::Comma) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                if self.next()? != Tok::RBracket {
                    return None;
                }
                Some(Expr::ArrayLiteral { items })
            }
            _ => None,
        }
    }
}

/// Parses a dialect expression; `None` means the text is beyond this
/// surface and the caller should fall back to [`Expr::Raw`].
pub fn parse_expr(text: &str) -> Option<Expr> {
    let toks = tokenize(text)?;
    if toks.is_empty() {
        return None;
    }
    let mut parser = P { toks, pos: 0 };
    let expr = parser.expr(0)?;
    if parser.pos != parser.toks.len() {
        return None;
    }
    Some(expr)
}

/// Parses an expression, degrading to `Raw` (the caller reports the
/// diagnostic when it cares).
pub fn parse_expr_or_raw(text: &str) -> Expr {
    parse_expr(text).unwrap_or_else(|| Expr::Raw {
        text: text.trim().to_string(),
    })
}

/// Prints an expression in dialect surface syntax (`is`, `is not`,
/// `contains`, word logicals).
pub fn print_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value } => print_value(value),
        Expr::Variable { name } => format!("${}", name),
        Expr::Binary { op, left, right } => {
            let word = match op {
                BinaryOp::Eq => "is",
                BinaryOp::Ne => "is not",
                BinaryOp::Contains => "contains",
                BinaryOp::In => "is in",
                other => other.symbol(),
            };
            format!("{} {} {}", print_operand(left), word, print_operand(right))
        }
        Expr::Logical { op, left, right } => {
            let word = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            format!("{} {} {}", print_operand(left), word, print_operand(right))
        }
        Expr::Unary { op, operand } => match op {
            UnaryOp::Not => format!("not {}", print_operand(operand)),
            UnaryOp::Neg => format!("-{}", print_operand(operand)),
        },
        Expr::Call { name, args } => {
            let parts: Vec<String> = args.iter().map(print_expr).collect();
            format!("{}({})", name, parts.join(", "))
        }
        Expr::ArrayLiteral { items } => {
            let parts: Vec<String> = items.iter().map(print_expr).collect();
            format!("[{}]", parts.join(", "))
        }
        Expr::MapLiteral { pairs } => {
            let parts: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\": {}", k, print_expr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Expr::Raw { text } => text.clone(),
    }
}

fn print_operand(expr: &Expr) -> String {
    match expr {
        Expr::Binary { .. } | Expr::Logical { .. } => format!("({})", print_expr(expr)),
        _ => print_expr(expr),
    }
}

fn print_value(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        Value::Nil => "null".to_string(),
        Value::Float(f) => {
            // Keep the decimal point so the literal reparses as a float.
            let text = format!("{}", f);
            if text.contains('.') {
                text
            } else {
                format!("{}.0", text)
            }
        }
        other => other.to_display_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_is_as_equality() {
        let expr = parse_expr("$x is 2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Eq, Expr::variable("x"), Expr::literal(Value::Int(2)))
        );
    }

    #[test]
    fn parses_is_not_and_is_in() {
        assert_eq!(
            parse_expr("$x is not 2").unwrap(),
            Expr::binary(BinaryOp::Ne, Expr::variable("x"), Expr::literal(Value::Int(2)))
        );
        assert_eq!(
            parse_expr("$item is in $bag").unwrap(),
            Expr::binary(
                BinaryOp::Contains,
                Expr::variable("item"),
                Expr::variable("bag")
            )
        );
    }

    #[test]
    fn parses_word_logicals() {
        let expr = parse_expr("$a > 1 and $b < 2").unwrap();
        assert!(matches!(
            expr,
            Expr::Logical {
                op: LogicalOp::And,
                ..
            }
        ));
    }

    #[test]
    fn parses_sugarcube_word_comparisons() {
        assert_eq!(
            parse_expr("$hp gte 5").unwrap(),
            Expr::binary(BinaryOp::Ge, Expr::variable("hp"), Expr::literal(Value::Int(5)))
        );
    }

    #[test]
    fn temp_variables_parse_like_story_variables() {
        assert_eq!(parse_expr("_tmp + 1").unwrap(),
            Expr::binary(BinaryOp::Add, Expr::variable("tmp"), Expr::literal(Value::Int(1))));
    }

    #[test]
    fn unparseable_text_becomes_raw() {
        let expr = parse_expr_or_raw("window.alert(`hi`)");
        assert!(matches!(expr, Expr::Raw { .. }));
    }

    #[test]
    fn print_round_trips_through_parse() {
        let exprs = ["$x is 2", "$a and ($b or $c)", "$hp - 1", "not $done"];
        for text in exprs {
            let parsed = parse_expr(text).unwrap();
            let printed = print_expr(&parsed);
            assert_eq!(parse_expr(&printed).unwrap(), parsed, "{} → {}", text, printed);
        }
    }
}
