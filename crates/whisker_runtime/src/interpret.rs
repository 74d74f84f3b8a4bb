//! The sandboxed expression interpreter.
//!
//! A tree-walking evaluator over the IR expression model: single-threaded,
//! synchronous, non-re-entrant. There is no way to reach the filesystem,
//! the network, processes, or host reflection from here — the only world an
//! expression sees is the [`GameState`] behind capability checks and a
//! closed builtin library.
//!
//! # Evaluation rules
//!
//! - Every AST node visited charges one unit against the turn budget.
//! - Missing variable reads yield `Nil`, never an error.
//! - Int/float mixing promotes to float; `/` always produces a float, and
//!   division by zero yields `Nil` plus a warning.
//! - Operator type mismatches yield a diagnostic and `Nil`; evaluation
//!   continues.
//! - `and`/`or` short-circuit and return the deciding operand, so
//!   `$x or "default"` works as authors expect.
//!
//! The only hard error is [`RuntimeError::ExecutionLimit`], which the
//! engine turns into a turn abort + rollback.

use std::time::Instant;

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{BinaryOp, Expr, LogicalOp, UnaryOp, Value};

use crate::builtins;
use crate::error::RuntimeError;
use crate::state::GameState;

/// Capabilities granted to an evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalCaps {
    pub state_read: bool,
    pub state_write: bool,
}

impl EvalCaps {
    /// Full access, used by the engine's own evaluations.
    pub fn full() -> Self {
        Self {
            state_read: true,
            state_write: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            state_read: true,
            state_write: false,
        }
    }
}

/// The per-turn execution budget: instruction count plus wall clock.
#[derive(Debug)]
pub struct Budget {
    pub max_instructions: u64,
    pub used: u64,
    pub started: Instant,
    pub max_millis: u64,
}

impl Budget {
    pub fn new(max_instructions: u64, max_millis: u64) -> Self {
        Self {
            max_instructions,
            used: 0,
            started: Instant::now(),
            max_millis,
        }
    }

    /// Charges `units` instructions; errors when either limit is breached.
    pub fn charge(&mut self, units: u64) -> Result<(), RuntimeError> {
        self.used += units;
        if self.used > self.max_instructions {
            return Err(RuntimeError::ExecutionLimit {
                detail: format!("instruction limit {} exceeded", self.max_instructions),
            });
        }
        // Clock checks are amortized; Instant::elapsed is cheap but not free.
        if self.used % 1024 == 0 {
            self.check_clock()?;
        }
        Ok(())
    }

    pub fn check_clock(&self) -> Result<(), RuntimeError> {
        if self.started.elapsed().as_millis() as u64 > self.max_millis {
            return Err(RuntimeError::ExecutionLimit {
                detail: format!("time limit {}ms exceeded", self.max_millis),
            });
        }
        Ok(())
    }
}

/// One expression evaluator, borrowing the engine's state and budget.
pub struct Evaluator<'a> {
    pub state: &'a mut GameState,
    pub caps: EvalCaps,
    pub budget: &'a mut Budget,
    pub diagnostics: &'a mut Vec<Diagnostic>,
    /// Base instant for the `elapsed()` builtin.
    pub epoch: Instant,
}

impl<'a> Evaluator<'a> {
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.budget.charge(1)?;

        match expr {
            Expr::Literal { value } => Ok(value.clone()),
            Expr::Variable { name } => {
                if !self.caps.state_read {
                    self.warn(
                        DiagCode::CapabilityDenied,
                        format!("read of '${}' without state:read", name),
                    );
                    return Ok(Value::Nil);
                }
                Ok(self.state.get(name))
            }
            Expr::Binary { op, left, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                Ok(self.binary(*op, lhs, rhs))
            }
            Expr::Logical { op, left, right } => {
                let lhs = self.eval(left)?;
                match op {
                    LogicalOp::And => {
                        if lhs.is_truthy() {
                            self.eval(right)
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if lhs.is_truthy() {
                            Ok(lhs)
                        } else {
                            self.eval(right)
                        }
                    }
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => match value {
                        Value::Int(n) => Value::Int(-n),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            self.type_mismatch(format!("cannot negate {}", other.type_name()));
                            Value::Nil
                        }
                    },
                })
            }
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                builtins::call(name, values, self)
            }
            Expr::ArrayLiteral { items } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::MapLiteral { pairs } => {
                let mut map = indexmap::IndexMap::new();
                for (key, value_expr) in pairs {
                    map.insert(key.clone(), self.eval(value_expr)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Raw { text } => {
                // Escape-hatch text is never executed.
                self.warn(
                    DiagCode::UnsupportedConstruct,
                    format!("raw expression '{}' evaluates to nil", text),
                );
                Ok(Value::Nil)
            }
        }
    }

    /// Assigns through the write capability.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if !self.caps.state_write {
            self.warn(
                DiagCode::CapabilityDenied,
                format!("write of '${}' without state:write", name),
            );
            return false;
        }
        self.state.set(name, value);
        true
    }

    fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        match op {
            BinaryOp::Add => self.add(lhs, rhs),
            BinaryOp::Sub => self.arith(op, lhs, rhs),
            BinaryOp::Mul => self.arith(op, lhs, rhs),
            BinaryOp::Mod => self.arith(op, lhs, rhs),
            BinaryOp::Div => self.divide(lhs, rhs),
            BinaryOp::Eq => Value::Bool(value_eq(&lhs, &rhs)),
            BinaryOp::Ne => Value::Bool(!value_eq(&lhs, &rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                self.compare(op, lhs, rhs)
            }
            BinaryOp::Contains => self.contains(lhs, rhs),
            BinaryOp::In => self.contains(rhs, lhs),
        }
    }

    fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            (Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Value::Float(a + b),
                _ => {
                    self.type_mismatch(format!(
                        "cannot add {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ));
                    Value::Nil
                }
            },
        }
    }

    fn arith(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
            return match op {
                BinaryOp::Sub => Value::Int(a.wrapping_sub(*b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(*b)),
                BinaryOp::Mod => {
                    if *b == 0 {
                        self.division_by_zero();
                        Value::Nil
                    } else {
                        Value::Int(a.rem_euclid(*b))
                    }
                }
                _ => Value::Nil,
            };
        }
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => match op {
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Mod => {
                    if b == 0.0 {
                        self.division_by_zero();
                        Value::Nil
                    } else {
                        Value::Float(a.rem_euclid(b))
                    }
                }
                _ => Value::Nil,
            },
            _ => {
                self.type_mismatch(format!(
                    "cannot apply '{}' to {} and {}",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ));
                Value::Nil
            }
        }
    }

    /// Division always produces a float; dividing by zero yields `Nil` and
    /// a warning rather than a trap.
    fn divide(&mut self, lhs: Value, rhs: Value) -> Value {
        match (lhs.as_number(), rhs.as_number()) {
            (Some(_), Some(b)) if b == 0.0 => {
                self.division_by_zero();
                Value::Nil
            }
            (Some(a), Some(b)) => Value::Float(a / b),
            _ => {
                self.type_mismatch(format!(
                    "cannot divide {} by {}",
                    lhs.type_name(),
                    rhs.type_name()
                ));
                Value::Nil
            }
        }
    }

    fn compare(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let ordering = match (&lhs, &rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        let Some(ordering) = ordering else {
            self.type_mismatch(format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            ));
            return Value::Nil;
        };
        let result = match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::Le => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::Ge => ordering.is_ge(),
            _ => false,
        };
        Value::Bool(result)
    }

    fn contains(&mut self, haystack: Value, needle: Value) -> Value {
        match &haystack {
            Value::Array(items) => Value::Bool(items.iter().any(|v| value_eq(v, &needle))),
            Value::Map(entries) => match &needle {
                Value::Str(key) => Value::Bool(entries.contains_key(key)),
                _ => {
                    self.type_mismatch("map keys are strings".to_string());
                    Value::Nil
                }
            },
            Value::Str(s) => match &needle {
                Value::Str(sub) => Value::Bool(s.contains(sub.as_str())),
                _ => {
                    self.type_mismatch("string containment needs a string".to_string());
                    Value::Nil
                }
            },
            other => {
                self.type_mismatch(format!("{} is not a collection", other.type_name()));
                Value::Nil
            }
        }
    }

    fn division_by_zero(&mut self) {
        self.diagnostics.push(Diagnostic::warning(
            DiagCode::DivisionByZero,
            "division by zero yields nil",
        ));
    }

    pub(crate) fn type_mismatch(&mut self, detail: String) {
        self.diagnostics
            .push(Diagnostic::warning(DiagCode::TypeMismatch, detail));
    }

    fn warn(&mut self, code: DiagCode, message: String) {
        self.diagnostics.push(Diagnostic::warning(code, message));
    }
}

/// Equality with numeric cross-type coercion: `2 == 2.0` is true.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(state: &mut GameState, expr: &Expr) -> (Value, Vec<Diagnostic>) {
        let mut budget = Budget::new(10_000, 5_000);
        let mut diagnostics = Vec::new();
        let epoch = Instant::now();
        let mut evaluator = Evaluator {
            state,
            caps: EvalCaps::full(),
            budget: &mut budget,
            diagnostics: &mut diagnostics,
            epoch,
        };
        let value = evaluator.eval(expr).expect("within budget");
        (value, diagnostics)
    }

    fn eval(expr: &Expr) -> Value {
        let mut state = GameState::new(10);
        eval_with(&mut state, expr).0
    }

    #[test]
    fn arithmetic_keeps_integers_integral() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::literal(Value::Int(2)),
            Expr::literal(Value::Int(3)),
        );
        assert_eq!(eval(&expr), Value::Int(5));
    }

    #[test]
    fn mixing_int_and_float_promotes() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::literal(Value::Int(2)),
            Expr::literal(Value::Float(0.5)),
        );
        assert_eq!(eval(&expr), Value::Float(2.5));
    }

    #[test]
    fn division_always_floats_and_never_traps() {
        let expr = Expr::binary(
            BinaryOp::Div,
            Expr::literal(Value::Int(7)),
            Expr::literal(Value::Int(2)),
        );
        assert_eq!(eval(&expr), Value::Float(3.5));

        let mut state = GameState::new(10);
        let zero = Expr::binary(
            BinaryOp::Div,
            Expr::literal(Value::Int(1)),
            Expr::literal(Value::Int(0)),
        );
        let (value, diags) = eval_with(&mut state, &zero);
        assert_eq!(value, Value::Nil);
        assert!(diags.iter().any(|d| d.code == DiagCode::DivisionByZero));
    }

    #[test]
    fn missing_variable_reads_nil() {
        let expr = Expr::variable("ghost");
        assert_eq!(eval(&expr), Value::Nil);
    }

    #[test]
    fn type_mismatch_degrades_to_nil_with_warning() {
        let mut state = GameState::new(10);
        let expr = Expr::binary(
            BinaryOp::Sub,
            Expr::literal(Value::Str("a".into())),
            Expr::literal(Value::Int(1)),
        );
        let (value, diags) = eval_with(&mut state, &expr);
        assert_eq!(value, Value::Nil);
        assert!(diags.iter().any(|d| d.code == DiagCode::TypeMismatch));
    }

    #[test]
    fn logical_operators_return_deciding_operand() {
        let expr = Expr::logical(
            LogicalOp::Or,
            Expr::literal(Value::Str(String::new())),
            Expr::literal(Value::Str("default".into())),
        );
        assert_eq!(eval(&expr), Value::Str("default".into()));

        let expr = Expr::logical(
            LogicalOp::And,
            Expr::literal(Value::Int(1)),
            Expr::literal(Value::Int(2)),
        );
        assert_eq!(eval(&expr), Value::Int(2));
    }

    #[test]
    fn short_circuit_skips_right_side_effects() {
        // The right side reads a variable without the capability; it must
        // not even be evaluated.
        let mut state = GameState::new(10);
        let mut budget = Budget::new(10_000, 5_000);
        let mut diagnostics = Vec::new();
        let mut evaluator = Evaluator {
            state: &mut state,
            caps: EvalCaps {
                state_read: false,
                state_write: false,
            },
            budget: &mut budget,
            diagnostics: &mut diagnostics,
            epoch: Instant::now(),
        };
        let expr = Expr::logical(
            LogicalOp::And,
            Expr::literal(Value::Bool(false)),
            Expr::variable("hidden"),
        );
        let value = evaluator.eval(&expr).unwrap();
        assert_eq!(value, Value::Bool(false));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn numeric_equality_crosses_types() {
        let expr = Expr::binary(
            BinaryOp::Eq,
            Expr::literal(Value::Int(2)),
            Expr::literal(Value::Float(2.0)),
        );
        assert_eq!(eval(&expr), Value::Bool(true));
    }

    #[test]
    fn contains_and_in_are_mirrors() {
        let array = Expr::ArrayLiteral {
            items: vec![Expr::literal(Value::Int(1)), Expr::literal(Value::Int(2))],
        };
        let contains = Expr::binary(BinaryOp::Contains, array.clone(), Expr::literal(Value::Int(2)));
        assert_eq!(eval(&contains), Value::Bool(true));

        let in_expr = Expr::binary(BinaryOp::In, Expr::literal(Value::Int(2)), array);
        assert_eq!(eval(&in_expr), Value::Bool(true));
    }

    #[test]
    fn string_contains_substring() {
        let expr = Expr::binary(
            BinaryOp::Contains,
            Expr::literal(Value::Str("lantern".into())),
            Expr::literal(Value::Str("ant".into())),
        );
        assert_eq!(eval(&expr), Value::Bool(true));
    }

    #[test]
    fn read_without_capability_is_denied_not_fatal() {
        let mut state = GameState::new(10);
        state.set("hp", Value::Int(10));
        let mut budget = Budget::new(10_000, 5_000);
        let mut diagnostics = Vec::new();
        let mut evaluator = Evaluator {
            state: &mut state,
            caps: EvalCaps::default(),
            budget: &mut budget,
            diagnostics: &mut diagnostics,
            epoch: Instant::now(),
        };
        let value = evaluator.eval(&Expr::variable("hp")).unwrap();
        assert_eq!(value, Value::Nil);
        assert!(diagnostics
            .iter()
            .any(|d| d.code == DiagCode::CapabilityDenied));
    }

    #[test]
    fn instruction_budget_aborts_evaluation() {
        let mut state = GameState::new(10);
        let mut budget = Budget::new(3, 5_000);
        let mut diagnostics = Vec::new();
        let mut evaluator = Evaluator {
            state: &mut state,
            caps: EvalCaps::full(),
            budget: &mut budget,
            diagnostics: &mut diagnostics,
            epoch: Instant::now(),
        };
        // 5 nodes > budget of 3.
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::binary(
                BinaryOp::Add,
                Expr::literal(Value::Int(1)),
                Expr::literal(Value::Int(2)),
            ),
            Expr::literal(Value::Int(3)),
        );
        let err = evaluator.eval(&expr).unwrap_err();
        assert!(matches!(err, RuntimeError::ExecutionLimit { .. }));
    }

    #[test]
    fn raw_expressions_evaluate_to_nil_with_warning() {
        let mut state = GameState::new(10);
        let (value, diags) = eval_with(
            &mut state,
            &Expr::Raw {
                text: "os.exit()".into(),
            },
        );
        assert_eq!(value, Value::Nil);
        assert!(!diags.is_empty());
    }
}
