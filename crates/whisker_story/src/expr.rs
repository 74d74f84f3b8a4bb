//! Expression trees stored in the Story IR.
//!
//! Expressions appear in interpolations, choice guards, loop collections,
//! and enter/exit scripts. The IR keeps them as plain owned trees; the
//! runtime walks them with its sandboxed interpreter.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `a contains b` — membership test with the collection on the left.
    Contains,
    /// `a in b` — membership test with the collection on the right.
    In,
}

impl BinaryOp {
    /// Surface-syntax spelling, used by formatters and exporters.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Contains => "contains",
            BinaryOp::In => "in",
        }
    }
}

/// Short-circuiting logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: Value,
    },
    Variable {
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    ArrayLiteral {
        items: Vec<Expr>,
    },
    MapLiteral {
        pairs: Vec<(String, Expr)>,
    },
    /// Opaque host-language text carried through import/export untouched.
    ///
    /// Raw expressions are never evaluated by the sandbox; producing one
    /// always comes with a diagnostic.
    Raw {
        text: String,
    },
}

impl Expr {
    pub fn literal(value: Value) -> Expr {
        Expr::Literal { value }
    }

    pub fn variable(name: impl Into<String>) -> Expr {
        Expr::Variable { name: name.into() }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Returns `true` if any node in the tree is a [`Expr::Raw`] escape
    /// hatch. Exporters that cannot represent opaque host code use this.
    pub fn contains_raw(&self) -> bool {
        match self {
            Expr::Raw { .. } => true,
            Expr::Literal { .. } | Expr::Variable { .. } => false,
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.contains_raw() || right.contains_raw()
            }
            Expr::Unary { operand, .. } => operand.contains_raw(),
            Expr::Call { args, .. } => args.iter().any(Expr::contains_raw),
            Expr::ArrayLiteral { items } => items.iter().any(Expr::contains_raw),
            Expr::MapLiteral { pairs } => pairs.iter().any(|(_, e)| e.contains_raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_helper_boxes_operands() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::literal(Value::Int(1)),
            Expr::variable("x"),
        );
        match expr {
            Expr::Binary { op, left, right } => {
                assert_eq!(op, BinaryOp::Add);
                assert_eq!(*left, Expr::literal(Value::Int(1)));
                assert_eq!(*right, Expr::variable("x"));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn contains_raw_finds_nested_escape_hatch() {
        let clean = Expr::binary(
            BinaryOp::Eq,
            Expr::variable("x"),
            Expr::literal(Value::Int(2)),
        );
        assert!(!clean.contains_raw());

        let dirty = Expr::logical(
            LogicalOp::And,
            clean,
            Expr::Raw {
                text: "window.alert(1)".into(),
            },
        );
        assert!(dirty.contains_raw());
    }

    #[test]
    fn expr_round_trips_through_json() {
        let expr = Expr::Call {
            name: "min".into(),
            args: vec![Expr::literal(Value::Int(1)), Expr::variable("hp")],
        };
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn operator_symbols_match_surface_syntax() {
        assert_eq!(BinaryOp::Contains.symbol(), "contains");
        assert_eq!(BinaryOp::Ne.symbol(), "!=");
    }
}
