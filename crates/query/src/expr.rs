//! Scalar expressions.
//!
//! Expressions are evaluated against one input row and the node's current
//! correlated parameter values. Evaluation is pure.
//!
//! NULL handling follows SQL three-valued logic: comparisons and arithmetic
//! with a NULL operand yield NULL, `AND`/`OR` short-circuit on FALSE/TRUE.

use alloc::boxed::Box;
use alloc::format;
use core::cmp::Ordering;
use strata_core::{Error, Result, Row, Value};

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Column of the input row, by position.
    Column(usize),
    /// Constant.
    Literal(Value),
    /// Correlated parameter, by position, supplied at init or rescan.
    Param(usize),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, expr: Box<Expr> },
}

impl Expr {
    /// Creates a column reference.
    pub fn column(index: usize) -> Self {
        Expr::Column(index)
    }

    /// Creates a literal.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Creates a parameter reference.
    pub fn param(index: usize) -> Self {
        Expr::Param(index)
    }

    /// Creates a binary expression.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Lt, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Gt, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    pub fn is_null(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(expr),
        }
    }

    /// Returns true if the expression reads no column of the input row.
    pub fn is_row_independent(&self) -> bool {
        match self {
            Expr::Column(_) => false,
            Expr::Literal(_) | Expr::Param(_) => true,
            Expr::Binary { left, right, .. } => {
                left.is_row_independent() && right.is_row_independent()
            }
            Expr::Unary { expr, .. } => expr.is_row_independent(),
        }
    }

    /// Evaluates the expression against `row` with parameter values `params`.
    pub fn eval(&self, row: &Row, params: &[Value]) -> Result<Value> {
        match self {
            Expr::Column(index) => row.get(*index).cloned().ok_or_else(|| {
                Error::expression(format!(
                    "column {} out of range for row of {} columns",
                    index,
                    row.len()
                ))
            }),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Param(index) => params
                .get(*index)
                .cloned()
                .ok_or_else(|| Error::expression(format!("no value supplied for parameter ${}", index + 1))),
            Expr::Binary { op, left, right } => {
                let l = left.eval(row, params)?;
                match (op, &l) {
                    (BinaryOp::And, Value::Boolean(false)) => return Ok(l),
                    (BinaryOp::Or, Value::Boolean(true)) => return Ok(l),
                    _ => {}
                }
                let r = right.eval(row, params)?;
                eval_binary(*op, &l, &r)
            }
            Expr::Unary { op, expr } => eval_unary(*op, expr.eval(row, params)?),
        }
    }

    /// Evaluates a predicate: only TRUE passes, NULL and FALSE do not.
    pub fn eval_predicate(&self, row: &Row, params: &[Value]) -> Result<bool> {
        match self.eval(row, params)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(Error::expression(format!(
                "predicate produced non-boolean value {}",
                other
            ))),
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    // Handle NULL propagation
    if left.is_null() || right.is_null() {
        return Ok(match op {
            BinaryOp::And if matches!(left, Value::Boolean(false)) || matches!(right, Value::Boolean(false)) => {
                Value::Boolean(false)
            }
            BinaryOp::Or if matches!(left, Value::Boolean(true)) || matches!(right, Value::Boolean(true)) => {
                Value::Boolean(true)
            }
            _ => Value::Null,
        });
    }

    match op {
        BinaryOp::Eq => Ok(Value::Boolean(compare(left, right)? == Ordering::Equal)),
        BinaryOp::Ne => Ok(Value::Boolean(compare(left, right)? != Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Boolean(compare(left, right)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Boolean(compare(left, right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Boolean(compare(left, right)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Boolean(compare(left, right)? != Ordering::Less)),
        BinaryOp::And | BinaryOp::Or => {
            let (Some(l), Some(r)) = (left.as_bool(), right.as_bool()) else {
                return Err(Error::expression(format!(
                    "{:?} requires boolean operands, got {} and {}",
                    op, left, right
                )));
            };
            Ok(Value::Boolean(if op == BinaryOp::And { l && r } else { l || r }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            eval_arithmetic(op, left, right)
        }
    }
}

/// Compares two non-NULL values. Integers of either width compare
/// numerically, and integers compare with floats as floats.
fn compare(left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            Ok(left.as_i64().cmp(&right.as_i64()))
        }
        (Value::Float64(_), Value::Int32(_) | Value::Int64(_) | Value::Float64(_))
        | (Value::Int32(_) | Value::Int64(_), Value::Float64(_)) => {
            let l = Value::Float64(as_f64(left));
            let r = Value::Float64(as_f64(right));
            Ok(l.cmp(&r))
        }
        _ if left.data_type() == right.data_type() => Ok(left.cmp(right)),
        _ => Err(Error::expression(format!("cannot compare {} with {}", left, right))),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int32(i) => *i as f64,
        Value::Int64(i) => *i as f64,
        Value::Float64(f) => *f,
        _ => f64::NAN,
    }
}

fn eval_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let type_error = || {
        Error::expression(format!(
            "operator {:?} is not defined for {} and {}",
            op, left, right
        ))
    };
    match (left, right) {
        (Value::Int32(a), Value::Int32(b)) => {
            let out = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                _ if *b == 0 => return Err(Error::expression("division by zero")),
                _ => a.checked_div(*b),
            };
            out.map(Value::Int32)
                .ok_or_else(|| Error::expression("integer out of range"))
        }
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            let (a, b) = match (left.as_i64(), right.as_i64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(type_error()),
            };
            let out = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                _ if b == 0 => return Err(Error::expression("division by zero")),
                _ => a.checked_div(b),
            };
            out.map(Value::Int64)
                .ok_or_else(|| Error::expression("bigint out of range"))
        }
        (Value::Float64(_) | Value::Int32(_) | Value::Int64(_), Value::Float64(_))
        | (Value::Float64(_), Value::Int32(_) | Value::Int64(_)) => {
            let (a, b) = (as_f64(left), as_f64(right));
            Ok(Value::Float64(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b == 0.0 => return Err(Error::expression("division by zero")),
                _ => a / b,
            }))
        }
        _ => Err(type_error()),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value> {
    match op {
        UnaryOp::IsNull => Ok(Value::Boolean(value.is_null())),
        UnaryOp::IsNotNull => Ok(Value::Boolean(!value.is_null())),
        _ if value.is_null() => Ok(Value::Null),
        UnaryOp::Not => match value {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(Error::expression(format!("NOT requires a boolean, got {}", other))),
        },
        UnaryOp::Neg => match value {
            Value::Int32(i) => i.checked_neg().map(Value::Int32).ok_or_else(|| Error::expression("integer out of range")),
            Value::Int64(i) => i.checked_neg().map(Value::Int64).ok_or_else(|| Error::expression("bigint out of range")),
            Value::Float64(f) => Ok(Value::Float64(-f)),
            other => Err(Error::expression(format!("cannot negate {}", other))),
        },
    }
}
