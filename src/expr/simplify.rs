//! Local rewrites applied before a node is interned.
//!
//! Each rule is sound for every valuation: it only looks at the operator,
//! the operand identities and literal operands.

use num_bigint::BigInt;
use num_traits::{One, Zero};

use super::{Context, Expr, Op};
use crate::error::Result;
use crate::eval::apply_op;
use crate::types::Type;
use crate::value::{to_unsigned, Value};

fn is_zero(e: &Expr) -> bool {
    match e.as_const() {
        Some(Value::BitVec { value, .. }) | Some(Value::BigInt(value)) => value.is_zero(),
        Some(Value::Real(r)) => r.is_zero(),
        _ => false,
    }
}

fn is_one(e: &Expr) -> bool {
    match e.as_const() {
        Some(Value::BitVec { value, .. }) | Some(Value::BigInt(value)) => value.is_one(),
        Some(Value::Real(r)) => r.is_one(),
        _ => false,
    }
}

fn is_all_ones(e: &Expr) -> bool {
    match e.as_const() {
        Some(Value::BitVec { width, value, .. }) => {
            to_unsigned(value, *width) == (BigInt::one() << *width) - BigInt::one()
        }
        _ => false,
    }
}

/// `Some(true)` for the full set, `Some(false)` for the empty set.
fn set_literal(e: &Expr) -> Option<bool> {
    match e.as_const() {
        Some(Value::Set { default, exceptions, .. }) if exceptions.is_empty() => Some(*default),
        _ => None,
    }
}

fn is_seq_empty(e: &Expr) -> bool {
    matches!(e.as_const(), Some(Value::Seq { items, .. }) if items.is_empty())
}

fn negation_of(e: &Expr) -> Option<&Expr> {
    match e.op() {
        Op::Not => Some(e.arg(0)),
        _ => None,
    }
}

fn zero(ctx: &Context, ty: &Type) -> Expr {
    ctx.constant(ty.default_value())
}

/// Try to rewrite `op(args)` into an existing or simpler expression.
pub(super) fn rewrite(ctx: &Context, op: &Op, args: &[Expr], ty: &Type) -> Result<Option<Expr>> {
    // Constant folding.
    if !args.is_empty() && args.iter().all(|a| a.as_const().is_some()) {
        let values: Vec<Value> = args.iter().filter_map(|a| a.as_const().cloned()).collect();
        return Ok(Some(ctx.constant(apply_op(op, &values, ty)?)));
    }

    let pick = |e: &Expr| Ok(Some(e.clone()));

    match op {
        Op::Not => {
            let x = &args[0];
            if let Some(inner) = negation_of(x) {
                return pick(inner);
            }
            // De Morgan, when it removes negations.
            if matches!(x.op(), Op::And | Op::Or) {
                if let (Some(a), Some(b)) = (negation_of(x.arg(0)), negation_of(x.arg(1))) {
                    let dual = if *x.op() == Op::And { Op::Or } else { Op::And };
                    return Ok(Some(ctx.make(dual, vec![a.clone(), b.clone()])?));
                }
            }
        }

        Op::And | Op::Or => {
            let (a, b) = (&args[0], &args[1]);
            // Neutral is `true` for `and`, `false` for `or`.
            let neutral = *op == Op::And;
            for (x, y) in [(a, b), (b, a)] {
                match x.as_bool() {
                    Some(v) if v == neutral => return pick(y),
                    Some(_) => return pick(x),
                    None => {}
                }
                if negation_of(x) == Some(y) {
                    return Ok(Some(ctx.bool(!neutral)));
                }
            }
            if a == b {
                return pick(a);
            }
        }

        Op::Ite => {
            let (c, t, e) = (&args[0], &args[1], &args[2]);
            if let Some(v) = c.as_bool() {
                return pick(if v { t } else { e });
            }
            if t == e {
                return pick(t);
            }
            if let Some(inner) = negation_of(c) {
                return Ok(Some(ctx.make(Op::Ite, vec![inner.clone(), e.clone(), t.clone()])?));
            }
            if ty.is_bool() {
                let not_c = || ctx.make(Op::Not, vec![c.clone()]);
                let r = match (t.as_bool(), e.as_bool()) {
                    (Some(true), _) => ctx.make(Op::Or, vec![c.clone(), e.clone()])?,
                    (Some(false), _) => ctx.make(Op::And, vec![not_c()?, e.clone()])?,
                    (_, Some(true)) => ctx.make(Op::Or, vec![not_c()?, t.clone()])?,
                    (_, Some(false)) => ctx.make(Op::And, vec![c.clone(), t.clone()])?,
                    _ => return Ok(None),
                };
                return Ok(Some(r));
            }
        }

        Op::Eq => {
            let (a, b) = (&args[0], &args[1]);
            if a == b {
                return Ok(Some(ctx.tt()));
            }
            if a.ty().is_bool() {
                for (x, y) in [(a, b), (b, a)] {
                    match x.as_bool() {
                        Some(true) => return pick(y),
                        Some(false) => return Ok(Some(ctx.make(Op::Not, vec![y.clone()])?)),
                        None => {}
                    }
                }
            }
        }

        Op::Lt | Op::Le => {
            if args[0] == args[1] {
                return Ok(Some(ctx.bool(*op == Op::Le)));
            }
        }

        Op::Add => {
            let (a, b) = (&args[0], &args[1]);
            if is_zero(a) {
                return pick(b);
            }
            if is_zero(b) {
                return pick(a);
            }
        }
        Op::Sub => {
            let (a, b) = (&args[0], &args[1]);
            if is_zero(b) {
                return pick(a);
            }
            if a == b {
                return Ok(Some(zero(ctx, ty)));
            }
        }
        Op::Mul => {
            let (a, b) = (&args[0], &args[1]);
            for (x, y) in [(a, b), (b, a)] {
                if is_zero(x) {
                    return pick(x);
                }
                if is_one(x) {
                    return pick(y);
                }
            }
        }

        Op::BitAnd | Op::BitOr => {
            let (a, b) = (&args[0], &args[1]);
            if a == b {
                return pick(a);
            }
            for (x, y) in [(a, b), (b, a)] {
                let absorbing = if *op == Op::BitAnd { is_zero(x) } else { is_all_ones(x) };
                let neutral = if *op == Op::BitAnd { is_all_ones(x) } else { is_zero(x) };
                if absorbing {
                    return pick(x);
                }
                if neutral {
                    return pick(y);
                }
            }
        }
        Op::BitXor => {
            let (a, b) = (&args[0], &args[1]);
            if a == b {
                return Ok(Some(zero(ctx, ty)));
            }
            if is_zero(a) {
                return pick(b);
            }
            if is_zero(b) {
                return pick(a);
            }
        }
        Op::BitNot => {
            if *args[0].op() == Op::BitNot {
                return pick(args[0].arg(0));
            }
        }
        Op::Cast => {
            if args[0].ty() == ty {
                return pick(&args[0]);
            }
        }

        Op::GetField(i) => {
            let r = &args[0];
            match r.op() {
                Op::Create => return pick(r.arg(*i)),
                Op::WithField(j) if j == i => return pick(r.arg(1)),
                Op::WithField(_) => return Ok(Some(ctx.make(Op::GetField(*i), vec![r.arg(0).clone()])?)),
                _ => {}
            }
        }
        Op::WithField(i) => {
            let (r, v) = (&args[0], &args[1]);
            // Writing back what was just read.
            if *v.op() == Op::GetField(*i) && v.arg(0) == r {
                return pick(r);
            }
            // A later write to the same field shadows an earlier one.
            if *r.op() == Op::WithField(*i) {
                return Ok(Some(ctx.make(Op::WithField(*i), vec![r.arg(0).clone(), v.clone()])?));
            }
        }

        Op::IsSome => {
            if *args[0].op() == Op::Some {
                return Ok(Some(ctx.tt()));
            }
        }
        Op::OptionValue => {
            if *args[0].op() == Op::Some {
                return pick(args[0].arg(0));
            }
        }

        Op::MapGet => {
            let (m, k) = (&args[0], &args[1]);
            if *m.op() == Op::MapSet {
                if m.arg(1) == k {
                    return pick(m.arg(2));
                }
                // Distinct literal keys never alias.
                if m.arg(1).as_const().is_some() && k.as_const().is_some() {
                    return Ok(Some(ctx.make(Op::MapGet, vec![m.arg(0).clone(), k.clone()])?));
                }
            }
        }
        Op::MapSet => {
            let (m, k, v) = (&args[0], &args[1], &args[2]);
            // Storing the value already there.
            if *v.op() == Op::MapGet && v.arg(0) == m && v.arg(1) == k {
                return pick(m);
            }
            if *m.op() == Op::MapSet && m.arg(1) == k {
                return Ok(Some(ctx.make(Op::MapSet, vec![m.arg(0).clone(), k.clone(), v.clone()])?));
            }
        }

        Op::SetContains => {
            let (s, x) = (&args[0], &args[1]);
            if matches!(s.op(), Op::SetAdd | Op::SetRemove) && s.arg(1) == x {
                return Ok(Some(ctx.bool(*s.op() == Op::SetAdd)));
            }
            if let Some(full) = set_literal(s) {
                return Ok(Some(ctx.bool(full)));
            }
        }
        Op::SetUnion | Op::SetIntersect => {
            let (a, b) = (&args[0], &args[1]);
            if a == b {
                return pick(a);
            }
            // Neutral is the empty set for union, the full set for intersection.
            let neutral = *op == Op::SetIntersect;
            for (x, y) in [(a, b), (b, a)] {
                match set_literal(x) {
                    Some(v) if v == neutral => return pick(y),
                    Some(_) => return pick(x),
                    None => {}
                }
            }
        }
        Op::SetDifference => {
            let (a, b) = (&args[0], &args[1]);
            if a == b || set_literal(a) == Some(false) || set_literal(b) == Some(true) {
                return Ok(Some(zero(ctx, ty)));
            }
            if set_literal(b) == Some(false) {
                return pick(a);
            }
            // (A \ B) \ B == A \ B
            if *a.op() == Op::SetDifference && a.arg(1) == b {
                return pick(a);
            }
        }

        Op::SeqConcat => {
            let (a, b) = (&args[0], &args[1]);
            if is_seq_empty(a) {
                return pick(b);
            }
            if is_seq_empty(b) {
                return pick(a);
            }
        }
        Op::SeqContains | Op::SeqStartsWith | Op::SeqEndsWith => {
            if args[0] == args[1] || is_seq_empty(&args[1]) {
                return Ok(Some(ctx.tt()));
            }
        }

        _ => {}
    }

    Ok(None)
}
