//! Compilation of bounded expressions into vectors of BDDs.
//!
//! Every node becomes one [`Ref`] per bit of its value, least significant
//! bit first, in [`Value::to_bits`] layout. Integers go through ripple-carry
//! circuits; composite values are plain splices of their fields' bits.

use log::{debug, trace};
use num_bigint::BigInt;

use crate::bdd::Bdd;
use crate::error::{Error, Result};
use crate::expr::{Expr, Op};
use crate::interleave;
use crate::manager::State;
use crate::reference::Ref;
use crate::types::{len_width, Type, CHAR_WIDTH, MAX_CHAR};
use crate::value::{int_to_bits, Value};

fn unsupported(ty: &Type) -> Error {
    Error::UnsupportedType {
        backend: "bdd",
        ty: ty.clone(),
    }
}

fn width(ty: &Type) -> Result<usize> {
    ty.bit_width().map(|w| w as usize).ok_or_else(|| unsupported(ty))
}

/// Reject any node whose value has no finite bit encoding.
pub(crate) fn check_bounded(root: &Expr) -> Result<()> {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut stack = vec![root];
    while let Some(e) = stack.pop() {
        if !seen.insert(e.id()) {
            continue;
        }
        if let Some(ty) = e.ty().find_unbounded() {
            return Err(unsupported(&ty));
        }
        stack.extend(e.args());
    }
    Ok(())
}

pub(crate) fn constant(bdd: &Bdd, value: u64, width: usize) -> Vec<Ref> {
    int_to_bits(&BigInt::from(value), width as u32)
        .into_iter()
        .map(|b| if b { bdd.one } else { bdd.zero })
        .collect()
}

fn value_bits(bdd: &Bdd, value: &Value) -> Result<Vec<Ref>> {
    Ok(value
        .to_bits()?
        .into_iter()
        .map(|b| if b { bdd.one } else { bdd.zero })
        .collect())
}

pub(crate) fn equal(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Ref {
    bdd.apply_and_many(a.iter().zip(b).map(|(&x, &y)| bdd.apply_eq(x, y)))
}

/// Unsigned `a < b` (or `a <= b` when not `strict`).
pub(crate) fn less(bdd: &Bdd, a: &[Ref], b: &[Ref], strict: bool) -> Ref {
    let mut acc = if strict { bdd.zero } else { bdd.one };
    // Walk up from the least significant bit; a higher differing bit decides.
    for (&x, &y) in a.iter().zip(b) {
        acc = bdd.apply_ite(bdd.apply_xor(x, y), y, acc);
    }
    acc
}

/// Two's complement comparison: flipping the sign bits turns it unsigned.
fn less_signed(bdd: &Bdd, a: &[Ref], b: &[Ref], strict: bool) -> Ref {
    let flip = |v: &[Ref]| {
        let mut v = v.to_vec();
        if let Some(msb) = v.last_mut() {
            *msb = -*msb;
        }
        v
    };
    less(bdd, &flip(a), &flip(b), strict)
}

fn adder(bdd: &Bdd, a: &[Ref], b: &[Ref], carry_in: Ref) -> Vec<Ref> {
    let mut carry = carry_in;
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let half = bdd.apply_xor(x, y);
            let sum = bdd.apply_xor(half, carry);
            carry = bdd.apply_or(bdd.apply_and(x, y), bdd.apply_and(carry, half));
            sum
        })
        .collect()
}

fn subtract(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Vec<Ref> {
    let not_b: Vec<Ref> = b.iter().map(|&y| -y).collect();
    adder(bdd, a, &not_b, bdd.one)
}

/// Shift-and-add product, truncated to the operand width.
fn multiply(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Vec<Ref> {
    let n = a.len();
    let mut acc = vec![bdd.zero; n];
    for (i, &y) in b.iter().enumerate() {
        if bdd.is_zero(y) {
            continue;
        }
        let partial: Vec<Ref> = (0..n)
            .map(|k| if k < i { bdd.zero } else { bdd.apply_and(a[k - i], y) })
            .collect();
        acc = adder(bdd, &acc, &partial, bdd.zero);
    }
    acc
}

fn select(bdd: &Bdd, c: Ref, t: &[Ref], e: &[Ref]) -> Vec<Ref> {
    t.iter().zip(e).map(|(&x, &y)| bdd.apply_ite(c, x, y)).collect()
}

fn extend(bdd: &Bdd, a: &[Ref], width: usize, signed: bool) -> Vec<Ref> {
    let fill = match a.last() {
        Some(&msb) if signed => msb,
        _ => bdd.zero,
    };
    (0..width).map(|i| a.get(i).copied().unwrap_or(fill)).collect()
}

/// Bit range of field `index` of a tuple or record.
fn field_range(ty: &Type, index: usize) -> Result<(usize, usize)> {
    let fields = ty.field_types().ok_or_else(|| unsupported(ty))?;
    let mut start = 0;
    for f in fields.iter().take(index) {
        start += width(f)?;
    }
    let len = width(fields.get(index).ok_or_else(|| unsupported(ty))?)?;
    Ok((start, len))
}

/// Element type, element width and length width of a bounded sequence.
fn fseq_layout(ty: &Type) -> Result<(&Type, u32, usize, usize)> {
    match ty {
        Type::FSeq(element, cap) => Ok((element, *cap, width(element)?, len_width(*cap) as usize)),
        _ => Err(unsupported(ty)),
    }
}

/// Constraint that `bits` hold a canonical value of `ty`: characters in
/// range, and unused option payloads and sequence slots at their defaults.
pub(crate) fn well_formed(bdd: &Bdd, ty: &Type, bits: &[Ref]) -> Result<Ref> {
    Ok(match ty {
        Type::Bool | Type::BitVec { .. } => bdd.one,
        Type::Char => less(bdd, bits, &constant(bdd, MAX_CHAR as u64, CHAR_WIDTH as usize), false),
        Type::Option(inner) => {
            let payload = &bits[1..];
            let default = value_bits(bdd, &inner.default_value())?;
            bdd.apply_ite(
                bits[0],
                well_formed(bdd, inner, payload)?,
                equal(bdd, payload, &default),
            )
        }
        Type::Tuple(_) | Type::Record { .. } => {
            let mut acc = bdd.one;
            let mut start = 0;
            for field in ty.field_types().unwrap_or_default() {
                let w = width(&field)?;
                acc = bdd.apply_and(acc, well_formed(bdd, &field, &bits[start..start + w])?);
                start += w;
            }
            acc
        }
        Type::FSeq(..) => {
            let (element, cap, ew, lw) = fseq_layout(ty)?;
            let len = &bits[..lw];
            let default = value_bits(bdd, &element.default_value())?;
            let mut acc = less(bdd, len, &constant(bdd, cap as u64, lw), false);
            for i in 0..cap as usize {
                let slot = &bits[lw + i * ew..lw + (i + 1) * ew];
                let used = less(bdd, &constant(bdd, i as u64, lw), len, true);
                let ok = bdd.apply_ite(used, well_formed(bdd, element, slot)?, equal(bdd, slot, &default));
                acc = bdd.apply_and(acc, ok);
            }
            acc
        }
        _ => return Err(unsupported(ty)),
    })
}

impl State {
    /// Bits of `root`, compiling whatever part of it is not cached yet.
    pub(crate) fn compile(&mut self, root: &Expr) -> Result<Vec<Ref>> {
        if let Some(bits) = self.compiled.get(root) {
            trace!("compile cache hit for node {}", root.id());
            return Ok(bits.clone());
        }
        check_bounded(root)?;
        self.allocate(&interleave::order(root));

        let mut stack = vec![(root.clone(), false)];
        let mut fresh = 0usize;
        while let Some((e, expanded)) = stack.pop() {
            if self.compiled.contains_key(&e) {
                continue;
            }
            if !expanded && !e.args().is_empty() {
                stack.push((e.clone(), true));
                stack.extend(e.args().iter().rev().map(|a| (a.clone(), false)));
                continue;
            }
            let args = e
                .args()
                .iter()
                .map(|a| self.compiled.get(a).cloned().ok_or_else(|| unsupported(a.ty())))
                .collect::<Result<Vec<_>>>()?;
            let bits = self.node(&e, &args)?;
            self.compiled.insert(e, bits);
            fresh += 1;
        }
        debug!(
            "compiled {} new nodes, {} BDD variables, {} BDD nodes",
            fresh,
            self.num_vars(),
            self.bdd.num_nodes()
        );
        self.compiled.get(root).cloned().ok_or_else(|| unsupported(root.ty()))
    }

    /// Compile a boolean expression into a single BDD.
    pub(crate) fn compile_bool(&mut self, root: &Expr) -> Result<Ref> {
        if !root.ty().is_bool() {
            return Err(Error::mismatch("compile", "bool", root.ty()));
        }
        let bits = self.compile(root)?;
        Ok(bits[0])
    }

    fn node(&mut self, e: &Expr, args: &[Vec<Ref>]) -> Result<Vec<Ref>> {
        if e.is_var() {
            let vars = self.var_bits(e)?;
            return Ok(vars.into_iter().map(|v| self.bdd.mk_var(v)).collect());
        }
        let bdd = &self.bdd;
        let bits = match e.op() {
            Op::Const(v) => value_bits(bdd, v)?,

            Op::Not => vec![bdd.apply_not(args[0][0])],
            Op::And => vec![bdd.apply_and_many(args.iter().map(|a| a[0]))],
            Op::Or => vec![bdd.apply_or_many(args.iter().map(|a| a[0]))],
            Op::Ite => select(bdd, args[0][0], &args[1], &args[2]),
            Op::Eq => vec![equal(bdd, &args[0], &args[1])],

            Op::Lt | Op::Le => {
                let strict = *e.op() == Op::Lt;
                let r = match e.arg(0).ty() {
                    Type::BitVec { signed: true, .. } => less_signed(bdd, &args[0], &args[1], strict),
                    Type::BitVec { .. } | Type::Char => less(bdd, &args[0], &args[1], strict),
                    ty => return Err(unsupported(ty)),
                };
                vec![r]
            }
            Op::Add => adder(bdd, &args[0], &args[1], bdd.zero),
            Op::Sub => subtract(bdd, &args[0], &args[1]),
            Op::Mul => multiply(bdd, &args[0], &args[1]),

            Op::BitAnd => args[0].iter().zip(&args[1]).map(|(&x, &y)| bdd.apply_and(x, y)).collect(),
            Op::BitOr => args[0].iter().zip(&args[1]).map(|(&x, &y)| bdd.apply_or(x, y)).collect(),
            Op::BitXor => args[0].iter().zip(&args[1]).map(|(&x, &y)| bdd.apply_xor(x, y)).collect(),
            Op::BitNot => args[0].iter().map(|&x| bdd.apply_not(x)).collect(),
            Op::Cast => {
                let signed = matches!(e.arg(0).ty(), Type::BitVec { signed: true, .. });
                extend(bdd, &args[0], width(e.ty())?, signed)
            }

            Op::Create => args.concat(),
            Op::GetField(i) => {
                let (start, len) = field_range(e.arg(0).ty(), *i)?;
                args[0][start..start + len].to_vec()
            }
            Op::WithField(i) => {
                let (start, len) = field_range(e.arg(0).ty(), *i)?;
                let mut bits = args[0].clone();
                bits[start..start + len].copy_from_slice(&args[1]);
                bits
            }

            Op::Some => std::iter::once(bdd.one).chain(args[0].iter().copied()).collect(),
            Op::IsSome => vec![args[0][0]],
            Op::OptionValue => args[0][1..].to_vec(),

            Op::FSeqPushBack => {
                let (_, cap, ew, lw) = fseq_layout(e.ty())?;
                let (len, x) = (&args[0][..lw], &args[1]);
                let room = less(bdd, len, &constant(bdd, cap as u64, lw), true);
                let longer = adder(bdd, len, &constant(bdd, 1, lw), bdd.zero);
                let mut bits = select(bdd, room, &longer, len);
                for i in 0..cap as usize {
                    let slot = &args[0][lw + i * ew..lw + (i + 1) * ew];
                    let here = bdd.apply_and(room, equal(bdd, len, &constant(bdd, i as u64, lw)));
                    bits.extend(select(bdd, here, x, slot));
                }
                bits
            }
            Op::FSeqLength => {
                let (_, _, _, lw) = fseq_layout(e.arg(0).ty())?;
                extend(bdd, &args[0][..lw], width(e.ty())?, false)
            }
            Op::FSeqGet(i) => {
                let (element, _, ew, lw) = fseq_layout(e.arg(0).ty())?;
                let i = *i as usize;
                let len = &args[0][..lw];
                let present = less(bdd, &constant(bdd, i as u64, lw), len, true);
                let slot = &args[0][lw + i * ew..lw + (i + 1) * ew];
                let default = value_bits(bdd, &element.default_value())?;
                std::iter::once(present)
                    .chain(select(bdd, present, slot, &default))
                    .collect()
            }
            Op::FSeqContains => {
                let (_, cap, ew, lw) = fseq_layout(e.arg(0).ty())?;
                let len = &args[0][..lw];
                let hits = (0..cap as usize).map(|i| {
                    let slot = &args[0][lw + i * ew..lw + (i + 1) * ew];
                    let used = less(bdd, &constant(bdd, i as u64, lw), len, true);
                    bdd.apply_and(used, equal(bdd, slot, &args[1]))
                });
                let hits: Vec<Ref> = hits.collect();
                vec![bdd.apply_or_many(hits)]
            }

            _ => return Err(unsupported(e.ty())),
        };
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;
    use crate::eval::{evaluate, Valuation};
    use crate::expr::Context;
    use crate::manager::Manager;

    /// Number of values of `var` satisfying `e`.
    fn count(e: &Expr, var: &Expr) -> BigUint {
        let manager = Manager::new();
        let mut state = manager.lock();
        let f = state.compile_bool(e).unwrap();
        let wf = state.well_formed(var).unwrap();
        let f = state.bdd.apply_and(f, wf);
        let n = state.num_vars() as usize;
        let k = var.ty().bit_width().unwrap() as usize;
        state.bdd.sat_count(f, n) >> (n - k)
    }

    /// Compile `e` and check every assignment of `var` against the interpreter.
    fn agrees(e: &Expr, var: &Expr, values: impl IntoIterator<Item = Value>) {
        let manager = Manager::new();
        let mut state = manager.lock();
        let f = state.compile_bool(e).unwrap();
        let bits = state.var_bits(var).unwrap();
        for value in values {
            let assignment = bits.iter().copied().zip(value.to_bits().unwrap()).collect();
            let expected = evaluate(e, &Valuation::from([(var.clone(), value.clone())]))
                .unwrap()
                .as_bool()
                .unwrap();
            assert_eq!(state.evaluate(f, &assignment), expected, "{} at {}", e, value);
        }
    }

    #[test]
    fn test_arithmetic_matches_interpreter() {
        let ctx = Context::new();
        let x = ctx.var(Type::u8(), "x").unwrap();
        let c = |v| ctx.constant(Value::u8(v));
        let e = x
            .mul(&c(3))
            .unwrap()
            .sub(&x.add(&c(7)).unwrap())
            .unwrap()
            .lt(&c(100))
            .unwrap();
        agrees(&e, &x, (0..=255).map(Value::u8));
    }

    #[test]
    fn test_signed_compare_and_cast() {
        let ctx = Context::new();
        let x = ctx.var(Type::i8(), "x").unwrap();
        let wide = x.cast(&Type::i16()).unwrap();
        let e = wide
            .le(&ctx.constant(Value::i16(-3)))
            .unwrap()
            .or(&x.bitand(&ctx.constant(Value::i8(0x40))).unwrap().eq(&ctx.constant(Value::i8(0x40))).unwrap())
            .unwrap();
        agrees(&e, &x, (-128..=127).map(Value::i8));
        assert_eq!(count(&x.lt(&ctx.constant(Value::i8(0))).unwrap(), &x), BigUint::from(128u32));
    }

    #[test]
    fn test_char_range_is_enforced() {
        let ctx = Context::new();
        let c = ctx.var(Type::Char, "c").unwrap();
        let e = c.ge(&ctx.constant(Value::char_code(0x20000).unwrap())).unwrap();
        assert_eq!(count(&e, &c), BigUint::from(0x10000u32));
    }

    #[test]
    fn test_option_and_record_fields() {
        let ctx = Context::new();
        let ty = Type::option(Type::record("R", [("a", Type::unsigned(3)), ("b", Type::Bool)]));
        let o = ctx.var(ty, "o").unwrap();
        let v = o.option_value().unwrap();
        let e = o
            .is_some()
            .unwrap()
            .and(&v.field(1).unwrap())
            .unwrap()
            .and(&v.field(0).unwrap().lt(&ctx.constant(Value::bitvec(3, false, 2))).unwrap())
            .unwrap();
        // Two values of a, with b set.
        assert_eq!(count(&e, &o), BigUint::from(2u32));
        // None plus 16 records.
        assert_eq!(count(&ctx.tt(), &o), BigUint::from(17u32));
    }

    #[test]
    fn test_fseq_operations() {
        let ctx = Context::new();
        let ty = Type::fseq(Type::unsigned(2), 2).unwrap();
        let s = ctx.var(ty.clone(), "s").unwrap();
        let three = ctx.constant(Value::bitvec(2, false, 3));
        // 1 + 4 + 16 canonical values.
        assert_eq!(count(&ctx.tt(), &s), BigUint::from(21u32));
        let pushed = s.push_back(&three).unwrap();
        let e = pushed.fseq_contains(&three).unwrap();
        // Only a full sequence without a 3 misses it.
        assert_eq!(count(&e, &s), BigUint::from(21u32 - 9));
        let first = s.get(0).unwrap();
        let e = first.eq(&ctx.some(&three).unwrap()).unwrap();
        assert_eq!(count(&e, &s), BigUint::from(5u32));
        let e = s.length().unwrap().eq(&ctx.constant(Value::u32(2))).unwrap();
        assert_eq!(count(&e, &s), BigUint::from(16u32));
    }

    #[test]
    fn test_unbounded_rejected() {
        let ctx = Context::new();
        let n = ctx.var(Type::BigInt, "n").unwrap();
        let e = n.lt(&ctx.constant(Value::int(3))).unwrap();
        let manager = Manager::new();
        let err = manager.lock().compile(&e).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { backend: "bdd", ty: Type::BigInt }));
        assert_eq!(manager.num_vars(), 0);

        let s = ctx.var(Type::string(), "s").unwrap();
        let e = s.length().unwrap().eq(&ctx.constant(Value::int(1))).unwrap();
        assert!(manager.lock().compile(&e).unwrap_err().is_usage());
    }

    #[test]
    fn test_compile_is_memoized() {
        let ctx = Context::new();
        let x = ctx.var(Type::u8(), "x").unwrap();
        let e = x.mul(&x).unwrap().eq(&ctx.constant(Value::u8(9))).unwrap();
        let manager = Manager::new();
        let mut state = manager.lock();
        let f = state.compile_bool(&e).unwrap();
        let nodes = state.bdd.num_nodes();
        assert_eq!(state.compile_bool(&e).unwrap(), f);
        assert_eq!(state.bdd.num_nodes(), nodes);
    }
}
