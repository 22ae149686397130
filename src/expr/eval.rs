//! Tree-walking evaluator for expressions and statements.

use super::ast::{BinaryOp, CmpOp, Expr, FormatPart, Stmt, UnaryOp};
use crate::builtins;
use crate::context::RenderContext;
use crate::error::{Error, Result, TypeErrorKind};
use crate::value::{Map, Value};
use std::cmp::Ordering;

/// Evaluates an expression against the current scope chain.
pub fn evaluate(expr: &Expr, ctx: &RenderContext) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => ctx.resolve(name),
        Expr::List(items) => {
            let values = items.iter().map(|e| evaluate(e, ctx)).collect::<Result<Vec<_>>>()?;
            Ok(Value::list(values))
        }
        Expr::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match evaluate(key, ctx)? {
                    Value::String(s) => s,
                    other => {
                        return Err(Error::invalid_operand(format!(
                            "mapping keys must be strings, not '{}'",
                            other.type_name()
                        )))
                    }
                };
                map.insert(key, evaluate(value, ctx)?);
            }
            Ok(Value::map(map))
        }
        Expr::Format(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    FormatPart::Literal(s) => out.push_str(s),
                    FormatPart::Expr(e) => out.push_str(&evaluate(e, ctx)?.to_output()),
                }
            }
            Ok(Value::String(out))
        }
        Expr::Attr { target, name } => get_attribute(&evaluate(target, ctx)?, name),
        Expr::Index { target, index } => subscript(&evaluate(target, ctx)?, &evaluate(index, ctx)?),
        Expr::Slice { target, start, stop, step } => {
            let target = evaluate(target, ctx)?;
            let bound = |e: &Option<Box<Expr>>| -> Result<Option<i64>> {
                match e {
                    None => Ok(None),
                    Some(e) => match evaluate(e, ctx)? {
                        Value::Null => Ok(None),
                        v => v.as_int().map(Some).ok_or_else(|| {
                            Error::invalid_operand("slice indices must be integers")
                        }),
                    },
                }
            };
            slice(&target, bound(start)?, bound(stop)?, bound(step)?)
        }
        Expr::Call { callee, args, kwargs } => call(callee, args, kwargs, ctx),
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, ctx)?),
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            binary(*op, &left, &right, ctx.iteration_limit())
        }
        Expr::Not(operand) => Ok(Value::Bool(!evaluate(operand, ctx)?.is_truthy())),
        Expr::And(left, right) => {
            let left = evaluate(left, ctx)?;
            if left.is_truthy() {
                evaluate(right, ctx)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, ctx)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                evaluate(right, ctx)
            }
        }
        Expr::Compare { left, rest } => {
            let mut left = evaluate(left, ctx)?;
            for (op, right) in rest {
                let right = evaluate(right, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::Conditional { condition, then, otherwise } => {
            if evaluate(condition, ctx)?.is_truthy() {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
    }
}

/// Executes code-block statements. Bindings land in the innermost scope.
pub fn execute(stmts: &[Stmt], ctx: &mut RenderContext) -> Result<()> {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { targets, value } => {
                let value = evaluate(value, ctx)?;
                bind_targets(targets, value, ctx)?;
            }
            Stmt::AugAssign { target, op, value } => {
                let current = ctx.resolve(target)?;
                let value = evaluate(value, ctx)?;
                let updated = binary(*op, &current, &value, ctx.iteration_limit())?;
                ctx.bind(target.clone(), updated);
            }
            Stmt::Expr(expr) => {
                evaluate(expr, ctx)?;
            }
        }
    }
    Ok(())
}

/// Binds one name directly, or unpacks a sequence across several names.
pub fn bind_targets(targets: &[String], value: Value, ctx: &mut RenderContext) -> Result<()> {
    if let [name] = targets {
        ctx.bind(name.clone(), value);
        return Ok(());
    }
    for (name, item) in targets.iter().zip(unpack(value, targets.len())?) {
        ctx.bind(name.clone(), item);
    }
    Ok(())
}

/// Splits a sequence into exactly `expected` values.
pub fn unpack(value: Value, expected: usize) -> Result<Vec<Value>> {
    match value {
        Value::List(items) if items.len() == expected => Ok(items.to_vec()),
        Value::List(items) => Err(Error::type_error(TypeErrorKind::UnpackMismatch {
            expected,
            found: items.len(),
        })),
        other => Err(Error::type_error(TypeErrorKind::NotIterable(other.type_name()))),
    }
}

fn call(
    callee: &Expr,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &RenderContext,
) -> Result<Value> {
    let eval_args = || -> Result<(Vec<Value>, Vec<(String, Value)>)> {
        let positional = args.iter().map(|e| evaluate(e, ctx)).collect::<Result<Vec<_>>>()?;
        let keywords = kwargs
            .iter()
            .map(|(k, e)| -> Result<(String, Value)> { Ok((k.clone(), evaluate(e, ctx)?)) })
            .collect::<Result<Vec<_>>>()?;
        Ok((positional, keywords))
    };

    let func = if let Expr::Attr { target, name } = callee {
        let receiver = evaluate(target, ctx)?;
        if let Value::Object(obj) = &receiver {
            let (positional, keywords) = eval_args()?;
            if let Some(result) = obj.call_method(name, &positional, &keywords) {
                return result;
            }
            return call_value(get_attribute(&receiver, name)?, positional, keywords);
        }
        get_attribute(&receiver, name)?
    } else {
        evaluate(callee, ctx)?
    };
    let (positional, keywords) = eval_args()?;
    call_value(func, positional, keywords)
}

pub fn call_value(func: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value> {
    match func {
        Value::Function(f) => f.call(args, kwargs),
        other => Err(Error::type_error(TypeErrorKind::NotCallable(other.type_name()))),
    }
}

/// Resolves `value.name`. Built-in methods take precedence over mapping keys.
pub fn get_attribute(value: &Value, name: &str) -> Result<Value> {
    if let Value::Object(obj) = value {
        return obj.get_attr(name).ok_or_else(|| Error::name_error(name));
    }
    if let Some(method) = builtins::method(value, name) {
        return Ok(Value::Function(method));
    }
    match value {
        Value::Map(entries) => entries.get(name).cloned().ok_or_else(|| Error::name_error(name)),
        _ => Err(Error::name_error(name)),
    }
}

fn normalize_index(index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Error::type_error(TypeErrorKind::IndexOutOfRange(index)));
    }
    Ok(resolved as usize)
}

pub fn subscript(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => Ok(items[normalize_index(*i, items.len())?].clone()),
        (Value::String(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(chars[normalize_index(*i, chars.len())?].to_string()))
        }
        (Value::List(_) | Value::String(_), other) => Err(Error::invalid_operand(format!(
            "indices must be integers, not '{}'",
            other.type_name()
        ))),
        (Value::Map(entries), Value::String(key)) => entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::type_error(TypeErrorKind::KeyNotFound(key.clone()))),
        (Value::Map(_), other) => Err(Error::type_error(TypeErrorKind::KeyNotFound(other.repr()))),
        (Value::Object(obj), Value::String(key)) => {
            obj.get_attr(key).ok_or_else(|| Error::type_error(TypeErrorKind::KeyNotFound(key.clone())))
        }
        (other, _) => Err(Error::type_error(TypeErrorKind::NotSubscriptable(other.type_name()))),
    }
}

fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: i64| {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map(clamp).unwrap_or(if step > 0 { lower } else { upper });
    let stop = stop.map(clamp).unwrap_or(if step > 0 { upper } else { lower });

    let mut indices = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    indices
}

pub fn slice(target: &Value, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Value> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::type_error(TypeErrorKind::InvalidArgument("slice step cannot be zero".into())));
    }
    match target {
        Value::List(items) => Ok(Value::list(
            slice_indices(items.len(), start, stop, step).into_iter().map(|i| items[i].clone()).collect(),
        )),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(
                slice_indices(chars.len(), start, stop, step).into_iter().map(|i| chars[i]).collect(),
            ))
        }
        other => Err(Error::type_error(TypeErrorKind::NotSubscriptable(other.type_name()))),
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Error::invalid_operand("integer overflow")),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (op, other) => Err(Error::invalid_operand(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            other.type_name()
        ))),
    }
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> Error {
    Error::invalid_operand(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> Error {
    Error::invalid_operand("integer overflow")
}

/// Size of a sequence built from `len` items taken `count` times, bounded
/// by `limit`.
fn bounded_size(len: usize, count: usize, limit: usize) -> Result<usize> {
    match len.checked_mul(count) {
        Some(total) if total <= limit => Ok(total),
        _ => Err(Error::IterationLimitExceeded { limit }),
    }
}

fn repeat<T: Clone>(items: &[T], count: usize, total: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(total);
    if total > 0 {
        for _ in 0..count {
            out.extend_from_slice(items);
        }
    }
    out
}

/// Applies a binary operator. Lists and strings produced by `*`, and lists
/// produced by `+`, may hold at most `limit` items.
pub fn binary(op: BinaryOp, left: &Value, right: &Value, limit: usize) -> Result<Value> {
    use Value::{Float, Int, List, String as Str};

    match (op, left, right) {
        (BinaryOp::Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
        (BinaryOp::Add, List(a), List(b)) => {
            bounded_size(a.len().saturating_add(b.len()), 1, limit)?;
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinaryOp::Mul, Str(s), Int(n)) | (BinaryOp::Mul, Int(n), Str(s)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            bounded_size(s.len(), count, limit)?;
            Ok(Str(s.repeat(count)))
        }
        (BinaryOp::Mul, List(items), Int(n)) | (BinaryOp::Mul, Int(n), List(items)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            let total = bounded_size(items.len(), count, limit)?;
            Ok(Value::list(repeat(items, count, total)))
        }

        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::FloorDiv, Int(a), Int(b)) => {
            if *b == 0 {
                return Err(Error::type_error(TypeErrorKind::DivisionByZero));
            }
            let q = a.checked_div(*b).ok_or_else(overflow)?;
            let floored = if a % b != 0 && ((*a < 0) != (*b < 0)) { q - 1 } else { q };
            Ok(Int(floored))
        }
        (BinaryOp::Mod, Int(a), Int(b)) => {
            if *b == 0 {
                return Err(Error::type_error(TypeErrorKind::DivisionByZero));
            }
            let r = a.checked_rem(*b).ok_or_else(overflow)?;
            Ok(Int(if r != 0 && ((r < 0) != (*b < 0)) { r + b } else { r }))
        }
        (BinaryOp::Pow, Int(a), Int(b)) if *b >= 0 => {
            let exp = u32::try_from(*b).map_err(|_| overflow())?;
            a.checked_pow(exp).map(Int).ok_or_else(overflow)
        }

        (op, a, b) => {
            let (Some(x), Some(y)) = (number(a), number(b)) else {
                return Err(unsupported(op, a, b));
            };
            match op {
                BinaryOp::Add => Ok(Float(x + y)),
                BinaryOp::Sub => Ok(Float(x - y)),
                BinaryOp::Mul => Ok(Float(x * y)),
                BinaryOp::Pow => Ok(Float(x.powf(y))),
                BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if y == 0.0 => {
                    Err(Error::type_error(TypeErrorKind::DivisionByZero))
                }
                BinaryOp::Div => Ok(Float(x / y)),
                BinaryOp::FloorDiv => Ok(Float((x / y).floor())),
                BinaryOp::Mod => Ok(Float(x - y * (x / y).floor())),
            }
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::String(_), other) => Err(Error::invalid_operand(format!(
            "'in <string>' requires string as left operand, not '{}'",
            other.type_name()
        ))),
        (Value::List(items), item) => Ok(items.iter().any(|v| v == item)),
        (Value::Map(entries), Value::String(key)) => Ok(entries.contains_key(key)),
        (Value::Map(_), _) => Ok(false),
        (other, _) => Err(Error::type_error(TypeErrorKind::NotIterable(other.type_name()))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq | CmpOp::Is => left == right,
        CmpOp::Ne | CmpOp::IsNot => left != right,
        CmpOp::Lt => left.compare(right)? == Ordering::Less,
        CmpOp::Le => left.compare(right)? != Ordering::Greater,
        CmpOp::Gt => left.compare(right)? == Ordering::Greater,
        CmpOp::Ge => left.compare(right)? != Ordering::Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    })
}
