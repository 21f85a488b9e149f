//! Concrete interpreter.
//!
//! [`apply_op`] defines the semantics of every operator over values; the
//! simplifier folds constants with it and [`evaluate`] runs it over a whole
//! expression DAG to cross-check the backends.

use std::collections::HashMap;

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::expr::{Expr, Op};
use crate::types::Type;
use crate::value::{to_unsigned, wrap, Value};

/// Assignment of concrete values to free variables.
pub type Valuation = HashMap<Expr, Value>;

fn bad(op: &Op, args: &[Value]) -> Error {
    Error::InvalidValue(format!(
        "cannot apply `{}` to [{}]",
        op.name(),
        args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
    ))
}

fn bool_arg(op: &Op, args: &[Value], i: usize) -> Result<bool> {
    args.get(i).and_then(Value::as_bool).ok_or_else(|| bad(op, args))
}

fn int_arg<'a>(op: &Op, args: &'a [Value], i: usize) -> Result<&'a BigInt> {
    args.get(i).and_then(Value::as_int).ok_or_else(|| bad(op, args))
}

fn items_arg<'a>(op: &Op, args: &'a [Value], i: usize) -> Result<&'a [Value]> {
    args.get(i).and_then(Value::items).ok_or_else(|| bad(op, args))
}

fn find(haystack: &[Value], needle: &[Value], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn with_items(like: &Value, items: Vec<Value>) -> Value {
    match like {
        Value::FSeq { element, cap, .. } => Value::FSeq {
            element: element.clone(),
            cap: *cap,
            items,
        },
        _ => Value::Seq {
            element: match like {
                Value::Seq { element, .. } => element.clone(),
                _ => Type::Bool,
            },
            items,
        },
    }
}

fn arith(op: &Op, a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::BitVec { width, signed, value: x }, Value::BitVec { value: y, .. }) => {
            let r = match op {
                Op::Add => x + y,
                Op::Sub => x - y,
                Op::Mul => x * y,
                _ => return None,
            };
            Some(Value::BitVec {
                width: *width,
                signed: *signed,
                value: wrap(&r, *width, *signed),
            })
        }
        (Value::BigInt(x), Value::BigInt(y)) => Some(Value::BigInt(match op {
            Op::Add => x + y,
            Op::Sub => x - y,
            Op::Mul => x * y,
            _ => return None,
        })),
        (Value::Real(x), Value::Real(y)) => Some(Value::Real(match op {
            Op::Add => x + y,
            Op::Sub => x - y,
            Op::Mul => x * y,
            _ => return None,
        })),
        _ => None,
    }
}

fn bitwise(op: &Op, args: &[Value]) -> Option<Value> {
    let (width, signed, x) = match &args[0] {
        Value::BitVec { width, signed, value } => (*width, *signed, to_unsigned(value, *width)),
        _ => return None,
    };
    let r = match op {
        Op::BitNot => ((BigInt::one() << width) - BigInt::one()) - x,
        _ => {
            let y = to_unsigned(args.get(1)?.as_int()?, width);
            match op {
                Op::BitAnd => x & y,
                Op::BitOr => x | y,
                Op::BitXor => x ^ y,
                _ => return None,
            }
        }
    };
    Some(Value::BitVec {
        width,
        signed,
        value: wrap(&r, width, signed),
    })
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::BitVec { value: x, .. }, Value::BitVec { value: y, .. }) => Some(x.cmp(y)),
        (Value::BigInt(x), Value::BigInt(y)) => Some(x.cmp(y)),
        (Value::Real(x), Value::Real(y)) => Some(x.cmp(y)),
        (Value::Char(x), Value::Char(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Apply `op` to concrete operands; `ty` is the result type of the node.
pub fn apply_op(op: &Op, args: &[Value], ty: &Type) -> Result<Value> {
    let v = match op {
        Op::Const(v) => v.clone(),
        Op::Var { .. } => return Err(Error::InvalidValue("variables have no fixed value".into())),

        Op::Not => Value::Bool(!bool_arg(op, args, 0)?),
        Op::And => Value::Bool(bool_arg(op, args, 0)? && bool_arg(op, args, 1)?),
        Op::Or => Value::Bool(bool_arg(op, args, 0)? || bool_arg(op, args, 1)?),
        Op::Ite => {
            if bool_arg(op, args, 0)? {
                args[1].clone()
            } else {
                args[2].clone()
            }
        }
        Op::Eq => Value::Bool(args[0] == args[1]),

        Op::Lt | Op::Le => {
            let ord = compare(&args[0], &args[1]).ok_or_else(|| bad(op, args))?;
            Value::Bool(if *op == Op::Lt { ord.is_lt() } else { ord.is_le() })
        }
        Op::Add | Op::Sub | Op::Mul => arith(op, &args[0], &args[1]).ok_or_else(|| bad(op, args))?,
        Op::BitAnd | Op::BitOr | Op::BitXor | Op::BitNot => bitwise(op, args).ok_or_else(|| bad(op, args))?,
        Op::Cast => match ty {
            Type::BitVec { width, signed } => Value::bitvec(*width, *signed, int_arg(op, args, 0)?.clone()),
            _ => return Err(bad(op, args)),
        },

        Op::Create => match ty {
            Type::Tuple(_) => Value::Tuple(args.to_vec()),
            _ => Value::Record {
                ty: ty.clone(),
                values: args.to_vec(),
            },
        },
        Op::GetField(i) => args[0]
            .fields()
            .and_then(|fs| fs.get(*i))
            .cloned()
            .ok_or_else(|| bad(op, args))?,
        Op::WithField(i) => {
            let mut fields = args[0].fields().ok_or_else(|| bad(op, args))?.to_vec();
            *fields.get_mut(*i).ok_or_else(|| bad(op, args))? = args[1].clone();
            match &args[0] {
                Value::Record { ty, .. } => Value::Record {
                    ty: ty.clone(),
                    values: fields,
                },
                _ => Value::Tuple(fields),
            }
        }

        Op::Some => Value::some(args[0].clone()),
        Op::IsSome => match &args[0] {
            Value::Option { value, .. } => Value::Bool(value.is_some()),
            _ => return Err(bad(op, args)),
        },
        Op::OptionValue => match &args[0] {
            Value::Option { value: Some(v), .. } => v.as_ref().clone(),
            Value::Option { inner, value: None } => inner.default_value(),
            _ => return Err(bad(op, args)),
        },

        Op::MapGet => args[0].map_get(&args[1]).ok_or_else(|| bad(op, args))?,
        Op::MapSet => args[0]
            .map_set(args[1].clone(), args[2].clone())
            .ok_or_else(|| bad(op, args))?,

        Op::SetAdd | Op::SetRemove => args[0]
            .set_update(args[1].clone(), *op == Op::SetAdd)
            .ok_or_else(|| bad(op, args))?,
        Op::SetContains => Value::Bool(args[0].set_contains(&args[1]).ok_or_else(|| bad(op, args))?),
        Op::SetUnion => args[0].set_combine(&args[1], |a, b| a || b).ok_or_else(|| bad(op, args))?,
        Op::SetIntersect => args[0].set_combine(&args[1], |a, b| a && b).ok_or_else(|| bad(op, args))?,
        Op::SetDifference => args[0].set_combine(&args[1], |a, b| a && !b).ok_or_else(|| bad(op, args))?,

        Op::SeqUnit => Value::Seq {
            element: args[0].ty(),
            items: vec![args[0].clone()],
        },
        Op::SeqConcat => {
            let mut items = items_arg(op, args, 0)?.to_vec();
            items.extend_from_slice(items_arg(op, args, 1)?);
            with_items(&args[0], items)
        }
        Op::SeqLength => Value::BigInt(BigInt::from(items_arg(op, args, 0)?.len())),
        Op::SeqAt => {
            let items = items_arg(op, args, 0)?;
            let i = int_arg(op, args, 1)?;
            let item = i.to_usize().and_then(|i| items.get(i)).cloned();
            with_items(&args[0], item.into_iter().collect())
        }
        Op::SeqContains => Value::Bool(find(items_arg(op, args, 0)?, items_arg(op, args, 1)?, 0).is_some()),
        Op::SeqStartsWith => Value::Bool(items_arg(op, args, 0)?.starts_with(items_arg(op, args, 1)?)),
        Op::SeqEndsWith => Value::Bool(items_arg(op, args, 0)?.ends_with(items_arg(op, args, 1)?)),
        Op::SeqReplaceFirst => {
            let items = items_arg(op, args, 0)?;
            let pattern = items_arg(op, args, 1)?;
            let replacement = items_arg(op, args, 2)?;
            let result = match find(items, pattern, 0) {
                Some(i) => {
                    let mut r = items[..i].to_vec();
                    r.extend_from_slice(replacement);
                    r.extend_from_slice(&items[i + pattern.len()..]);
                    r
                }
                None => items.to_vec(),
            };
            with_items(&args[0], result)
        }
        Op::SeqSlice => {
            let items = items_arg(op, args, 0)?;
            let offset = int_arg(op, args, 1)?;
            let len = int_arg(op, args, 2)?;
            let n = BigInt::from(items.len());
            let slice = if offset.is_negative() || *offset >= n || !len.is_positive() {
                Vec::new()
            } else {
                let end = (offset + len).min(n);
                // Both bounds fit: they are at most the length.
                let (start, end) = (offset.to_usize().unwrap_or(0), end.to_usize().unwrap_or(0));
                items[start..end].to_vec()
            };
            with_items(&args[0], slice)
        }
        Op::SeqIndexOf => {
            let items = items_arg(op, args, 0)?;
            let needle = items_arg(op, args, 1)?;
            let start = int_arg(op, args, 2)?;
            let index = if start.is_negative() || *start > BigInt::from(items.len()) {
                None
            } else {
                find(items, needle, start.to_usize().unwrap_or(0))
            };
            Value::BigInt(index.map_or_else(|| -BigInt::one(), BigInt::from))
        }
        Op::RegexMatch(regex) => {
            let items = items_arg(op, args, 0)?;
            let codes = items
                .iter()
                .map(|c| match c {
                    Value::Char(c) => Ok(*c),
                    _ => Err(bad(op, args)),
                })
                .collect::<Result<Vec<_>>>()?;
            Value::Bool(regex.matches(codes))
        }

        Op::FSeqPushBack => match &args[0] {
            Value::FSeq { element, cap, items } => {
                let mut items = items.clone();
                if items.len() < *cap as usize {
                    items.push(args[1].clone());
                }
                Value::FSeq {
                    element: element.clone(),
                    cap: *cap,
                    items,
                }
            }
            _ => return Err(bad(op, args)),
        },
        Op::FSeqLength => Value::u32(items_arg(op, args, 0)?.len() as u32),
        Op::FSeqGet(i) => match &args[0] {
            Value::FSeq { element, items, .. } => match items.get(*i as usize) {
                Some(v) => Value::some(v.clone()),
                None => Value::none(element.clone()),
            },
            _ => return Err(bad(op, args)),
        },
        Op::FSeqContains => Value::Bool(items_arg(op, args, 0)?.contains(&args[1])),
    };
    Ok(v)
}

/// Evaluate `expr` under `valuation`; unassigned variables take their default.
pub fn evaluate(expr: &Expr, valuation: &Valuation) -> Result<Value> {
    let mut memo: FxHashMap<u64, Value> = FxHashMap::default();
    let mut stack = vec![(expr.clone(), false)];

    while let Some((e, expanded)) = stack.pop() {
        if memo.contains_key(&e.id()) {
            continue;
        }
        let value = match e.op() {
            Op::Const(v) => v.clone(),
            Op::Var { .. } => match valuation.get(&e) {
                Some(v) if v.ty() == *e.ty() => v.clone(),
                Some(v) => {
                    return Err(Error::InvalidValue(format!(
                        "value {} assigned to {} is not a {}",
                        v,
                        e,
                        e.ty()
                    )))
                }
                None => e.ty().default_value(),
            },
            op if expanded => {
                let args = e
                    .args()
                    .iter()
                    .map(|a| memo.get(&a.id()).cloned().ok_or_else(|| bad(op, &[])))
                    .collect::<Result<Vec<_>>>()?;
                apply_op(op, &args, e.ty())?
            }
            _ => {
                stack.push((e.clone(), true));
                stack.extend(e.args().iter().map(|c| (c.clone(), false)));
                continue;
            }
        };
        memo.insert(e.id(), value);
    }

    memo.remove(&expr.id())
        .ok_or_else(|| Error::InvalidValue(format!("failed to evaluate {}", expr)))
}

/// Evaluate a boolean expression.
pub fn evaluate_bool(expr: &Expr, valuation: &Valuation) -> Result<bool> {
    evaluate(expr, valuation)?
        .as_bool()
        .ok_or_else(|| Error::mismatch("evaluate_bool", "bool", expr.ty()))
}
