//! Pratt expression parser.
//!
//! Precedence, loosest to tightest: `or`, `and`, equality (`==` `!=`),
//! comparison (`<` `<=` `>` `>=`), membership (`contains` `in`), additive,
//! multiplicative, unary (`not`, `-`), then calls and grouping.

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{BinaryOp, Expr, LogicalOp, UnaryOp, Value};

use crate::ast::ExprNode;
use crate::token::TokenKind;

use super::Parser;

/// Binding powers; binary operators associate left.
fn binding_power(kind: &TokenKind) -> Option<(u8, BinOpKind)> {
    use TokenKind::*;
    Some(match kind {
        KwOr => (1, BinOpKind::Logical(LogicalOp::Or)),
        KwAnd => (2, BinOpKind::Logical(LogicalOp::And)),
        EqEq => (3, BinOpKind::Binary(BinaryOp::Eq)),
        NotEq => (3, BinOpKind::Binary(BinaryOp::Ne)),
        Lt => (4, BinOpKind::Binary(BinaryOp::Lt)),
        Le => (4, BinOpKind::Binary(BinaryOp::Le)),
        Gt => (4, BinOpKind::Binary(BinaryOp::Gt)),
        Ge => (4, BinOpKind::Binary(BinaryOp::Ge)),
        KwContains => (5, BinOpKind::Binary(BinaryOp::Contains)),
        KwIn => (5, BinOpKind::Binary(BinaryOp::In)),
        Plus => (6, BinOpKind::Binary(BinaryOp::Add)),
        Minus => (6, BinOpKind::Binary(BinaryOp::Sub)),
        Star => (7, BinOpKind::Binary(BinaryOp::Mul)),
        Slash => (7, BinOpKind::Binary(BinaryOp::Div)),
        Percent => (7, BinOpKind::Binary(BinaryOp::Mod)),
        _ => return None,
    })
}

enum BinOpKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

pub(super) fn parse_expression(parser: &mut Parser) -> ExprNode {
    parse_bp(parser, 0)
}

fn parse_bp(parser: &mut Parser, min_bp: u8) -> ExprNode {
    let mut lhs = parse_prefix(parser);

    loop {
        let Some((bp, _)) = binding_power(parser.peek()) else {
            break;
        };
        if bp < min_bp {
            break;
        }
        let op_token = parser.advance();
        let (_, op) = binding_power(&op_token.kind).unwrap_or((0, BinOpKind::Binary(BinaryOp::Add)));
        let rhs = parse_bp(parser, bp + 1);
        let span = lhs.span.merge(rhs.span);
        let expr = match op {
            BinOpKind::Binary(op) => Expr::binary(op, lhs.expr, rhs.expr),
            BinOpKind::Logical(op) => Expr::logical(op, lhs.expr, rhs.expr),
        };
        lhs = ExprNode::new(expr, span);
    }

    lhs
}

fn parse_prefix(parser: &mut Parser) -> ExprNode {
    let span = parser.current_span();
    match parser.peek().clone() {
        TokenKind::KwNot => {
            parser.advance();
            let operand = parse_bp(parser, 8);
            let span = span.merge(operand.span);
            ExprNode::new(Expr::unary(UnaryOp::Not, operand.expr), span)
        }
        TokenKind::Minus => {
            parser.advance();
            let operand = parse_bp(parser, 8);
            let span = span.merge(operand.span);
            ExprNode::new(Expr::unary(UnaryOp::Neg, operand.expr), span)
        }
        _ => parse_primary(parser),
    }
}

fn parse_primary(parser: &mut Parser) -> ExprNode {
    let span = parser.current_span();
    match parser.peek().clone() {
        TokenKind::Number(lexeme) => {
            parser.advance();
            let value = if lexeme.contains('.') {
                match lexeme.parse::<f64>() {
                    Ok(f) => Value::Float(f),
                    Err(_) => {
                        parser.report(
                            Diagnostic::error(
                                DiagCode::InvalidNumber,
                                format!("invalid number literal '{}'", lexeme),
                            )
                            .with_location(parser.location(span)),
                        );
                        Value::Nil
                    }
                }
            } else {
                match lexeme.parse::<i64>() {
                    Ok(n) => Value::Int(n),
                    Err(_) => {
                        parser.report(
                            Diagnostic::error(
                                DiagCode::InvalidNumber,
                                format!("integer literal '{}' is out of range", lexeme),
                            )
                            .with_location(parser.location(span)),
                        );
                        Value::Nil
                    }
                }
            };
            ExprNode::new(Expr::literal(value), span)
        }
        TokenKind::Str(value) => {
            parser.advance();
            ExprNode::new(Expr::literal(Value::Str(value)), span)
        }
        TokenKind::KwTrue => {
            parser.advance();
            ExprNode::new(Expr::literal(Value::Bool(true)), span)
        }
        TokenKind::KwFalse => {
            parser.advance();
            ExprNode::new(Expr::literal(Value::Bool(false)), span)
        }
        TokenKind::KwNil => {
            parser.advance();
            ExprNode::new(Expr::literal(Value::Nil), span)
        }
        TokenKind::Variable(name) => {
            parser.advance();
            ExprNode::new(Expr::variable(name), span)
        }
        TokenKind::Ident(name) => {
            parser.advance();
            if parser.peek() == &TokenKind::LParen {
                parser.advance();
                let mut args = Vec::new();
                let mut end = parser.current_span();
                if parser.peek() != &TokenKind::RParen {
                    loop {
                        let arg = parse_bp(parser, 0);
                        args.push(arg.expr);
                        end = arg.span;
                        if parser.peek() == &TokenKind::Comma {
                            parser.advance();
                        } else {
                            break;
                        }
                    }
                }
                if parser.peek() == &TokenKind::RParen {
                    end = parser.current_span();
                    parser.advance();
                } else {
                    parser.report(
                        Diagnostic::error(DiagCode::UnclosedDelimiter, "unclosed '(' in call")
                            .with_location(parser.location(span)),
                    );
                }
                ExprNode::new(Expr::Call { name, args }, span.merge(end))
            } else {
                // Bare identifier: a loop binder or temp variable.
                ExprNode::new(Expr::variable(name), span)
            }
        }
        TokenKind::LParen => {
            parser.advance();
            let inner = parse_bp(parser, 0);
            if parser.peek() == &TokenKind::RParen {
                parser.advance();
            } else {
                parser.report(
                    Diagnostic::error(DiagCode::UnclosedDelimiter, "unclosed '(' in expression")
                        .with_location(parser.location(span)),
                );
            }
            ExprNode::new(inner.expr, span.merge(inner.span))
        }
        TokenKind::LBracket => {
            parser.advance();
            let mut items = Vec::new();
            let mut end = parser.current_span();
            if parser.peek() != &TokenKind::RBracket {
                loop {
                    let item = parse_bp(parser, 0);
                    items.push(item.expr);
                    end = item.span;
                    if parser.peek() == &TokenKind::Comma {
                        parser.advance();
                    } else {
                        break;
                    }
                }
            }
            if parser.peek() == &TokenKind::RBracket {
                end = parser.current_span();
                parser.advance();
            } else {
                parser.report(
                    Diagnostic::error(DiagCode::UnclosedDelimiter, "unclosed '[' in array literal")
                        .with_location(parser.location(span)),
                );
            }
            ExprNode::new(Expr::ArrayLiteral { items }, span.merge(end))
        }
        TokenKind::LBrace => {
            parser.advance();
            let mut pairs = Vec::new();
            let mut end = parser.current_span();
            if parser.peek() != &TokenKind::RBrace {
                loop {
                    let key = match parser.peek().clone() {
                        TokenKind::Ident(k) => {
                            parser.advance();
                            k
                        }
                        TokenKind::Str(k) => {
                            parser.advance();
                            k
                        }
                        _ => {
                            let at = parser.current_span();
                            parser.report(
                                Diagnostic::error(
                                    DiagCode::ExpectedExpression,
                                    "expected key in map literal",
                                )
                                .with_location(parser.location(at)),
                            );
                            break;
                        }
                    };
                    if parser.peek() == &TokenKind::Colon {
                        parser.advance();
                    }
                    let value = parse_bp(parser, 0);
                    end = value.span;
                    pairs.push((key, value.expr));
                    if parser.peek() == &TokenKind::Comma {
                        parser.advance();
                    } else {
                        break;
                    }
                }
            }
            if parser.peek() == &TokenKind::RBrace {
                end = parser.current_span();
                parser.advance();
            }
            ExprNode::new(Expr::MapLiteral { pairs }, span.merge(end))
        }
        other => {
            parser.report(
                Diagnostic::error(
                    DiagCode::ExpectedExpression,
                    format!("expected expression, found {:?}", other),
                )
                .with_location(parser.location(span)),
            );
            // Recover with a nil literal; the caller synchronizes.
            if !matches!(other, TokenKind::Newline | TokenKind::Eof | TokenKind::RBrace) {
                parser.advance();
            }
            ExprNode::new(Expr::literal(Value::Nil), span)
        }
    }
}
