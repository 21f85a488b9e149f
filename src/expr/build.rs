//! Construction helpers. Every helper goes through [`Context::make`].

use super::{Expr, Op};
use crate::error::{Error, Result};
use crate::regex::Regex;
use crate::types::Type;
use crate::value::Value;

impl Expr {
    fn unary(&self, op: Op) -> Result<Expr> {
        self.context().make(op, vec![self.clone()])
    }

    fn binary(&self, op: Op, other: &Expr) -> Result<Expr> {
        self.context().make(op, vec![self.clone(), other.clone()])
    }

    fn ternary(&self, op: Op, b: &Expr, c: &Expr) -> Result<Expr> {
        self.context().make(op, vec![self.clone(), b.clone(), c.clone()])
    }

    fn literal(&self, value: Value) -> Expr {
        self.context().constant(value)
    }

    // Boolean connectives.

    pub fn not(&self) -> Result<Expr> {
        self.unary(Op::Not)
    }

    pub fn and(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::And, other)
    }

    pub fn or(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Or, other)
    }

    pub fn implies(&self, other: &Expr) -> Result<Expr> {
        self.not()?.or(other)
    }

    pub fn xor(&self, other: &Expr) -> Result<Expr> {
        self.eq(other)?.not()
    }

    pub fn iff(&self, other: &Expr) -> Result<Expr> {
        self.eq(other)
    }

    /// `if self { then } else { otherwise }`
    pub fn ite(&self, then: &Expr, otherwise: &Expr) -> Result<Expr> {
        self.ternary(Op::Ite, then, otherwise)
    }

    pub fn eq(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Eq, other)
    }

    pub fn ne(&self, other: &Expr) -> Result<Expr> {
        self.eq(other)?.not()
    }

    // Ordering.

    pub fn lt(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Lt, other)
    }

    pub fn le(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Le, other)
    }

    pub fn gt(&self, other: &Expr) -> Result<Expr> {
        other.lt(self)
    }

    pub fn ge(&self, other: &Expr) -> Result<Expr> {
        other.le(self)
    }

    // Arithmetic.

    pub fn add(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Add, other)
    }

    pub fn sub(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Sub, other)
    }

    pub fn mul(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::Mul, other)
    }

    pub fn neg(&self) -> Result<Expr> {
        if !self.ty().is_arithmetic() {
            return Err(Error::mismatch("neg", "a numeric type", self.ty()));
        }
        self.literal(self.ty().default_value()).sub(self)
    }

    /// Add a constant of the same type, given as an integer.
    pub fn add_int(&self, n: i64) -> Result<Expr> {
        self.add(&self.int_literal(n)?)
    }

    /// A literal of this expression's numeric type.
    pub fn int_literal(&self, n: i64) -> Result<Expr> {
        let value = match self.ty() {
            Type::BitVec { width, signed } => Value::bitvec(*width, *signed, n),
            Type::BigInt => Value::int(n),
            Type::Real => Value::real(n, 1)?,
            other => return Err(Error::mismatch("int_literal", "a numeric type", other)),
        };
        Ok(self.literal(value))
    }

    // Bit-vectors.

    pub fn bitand(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::BitAnd, other)
    }

    pub fn bitor(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::BitOr, other)
    }

    pub fn bitxor(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::BitXor, other)
    }

    pub fn bitnot(&self) -> Result<Expr> {
        self.unary(Op::BitNot)
    }

    pub fn cast(&self, target: &Type) -> Result<Expr> {
        self.context().make_typed(Op::Cast, vec![self.clone()], target.clone())
    }

    // Tuples, records and options.

    pub fn field(&self, index: usize) -> Result<Expr> {
        self.unary(Op::GetField(index))
    }

    /// Field of a record by name.
    pub fn field_named(&self, name: &str) -> Result<Expr> {
        match self.ty() {
            Type::Record { fields, .. } => match fields.iter().position(|(n, _)| n.as_ref() == name) {
                Some(i) => self.field(i),
                None => Err(Error::mismatch("field_named", format!("a record with field `{}`", name), self.ty())),
            },
            other => Err(Error::mismatch("field_named", "a record", other)),
        }
    }

    pub fn with_field(&self, index: usize, value: &Expr) -> Result<Expr> {
        self.binary(Op::WithField(index), value)
    }

    pub fn is_some(&self) -> Result<Expr> {
        self.unary(Op::IsSome)
    }

    pub fn is_none(&self) -> Result<Expr> {
        self.is_some()?.not()
    }

    /// The wrapped value, or the default of the inner type for `None`.
    pub fn option_value(&self) -> Result<Expr> {
        self.unary(Op::OptionValue)
    }

    // Maps.

    pub fn map_get(&self, key: &Expr) -> Result<Expr> {
        self.binary(Op::MapGet, key)
    }

    pub fn map_set(&self, key: &Expr, value: &Expr) -> Result<Expr> {
        self.ternary(Op::MapSet, key, value)
    }

    /// Reset `key` to the default value.
    pub fn map_delete(&self, key: &Expr) -> Result<Expr> {
        let default = match self.ty() {
            Type::Map(_, v) => v.default_value(),
            other => return Err(Error::mismatch("map_delete", "a map", other)),
        };
        self.map_set(key, &self.literal(default))
    }

    /// Whether `key` maps to a non-default value.
    pub fn map_contains_key(&self, key: &Expr) -> Result<Expr> {
        let default = match self.ty() {
            Type::Map(_, v) => v.default_value(),
            other => return Err(Error::mismatch("map_contains_key", "a map", other)),
        };
        self.map_get(key)?.ne(&self.literal(default))
    }

    // Sets.

    pub fn add_element(&self, element: &Expr) -> Result<Expr> {
        self.binary(Op::SetAdd, element)
    }

    pub fn remove_element(&self, element: &Expr) -> Result<Expr> {
        self.binary(Op::SetRemove, element)
    }

    pub fn contains(&self, element: &Expr) -> Result<Expr> {
        self.binary(Op::SetContains, element)
    }

    pub fn union(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::SetUnion, other)
    }

    pub fn intersect(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::SetIntersect, other)
    }

    pub fn difference(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::SetDifference, other)
    }

    pub fn is_subset(&self, other: &Expr) -> Result<Expr> {
        self.difference(other)?.eq(&self.literal(self.ty().default_value()))
    }

    // Unbounded sequences.

    pub fn concat(&self, other: &Expr) -> Result<Expr> {
        self.binary(Op::SeqConcat, other)
    }

    pub fn length(&self) -> Result<Expr> {
        match self.ty() {
            Type::FSeq(..) => self.unary(Op::FSeqLength),
            _ => self.unary(Op::SeqLength),
        }
    }

    /// The one-element subsequence at `index`, or the empty sequence.
    pub fn at(&self, index: &Expr) -> Result<Expr> {
        self.binary(Op::SeqAt, index)
    }

    pub fn seq_contains(&self, sub: &Expr) -> Result<Expr> {
        self.binary(Op::SeqContains, sub)
    }

    pub fn starts_with(&self, prefix: &Expr) -> Result<Expr> {
        self.binary(Op::SeqStartsWith, prefix)
    }

    pub fn ends_with(&self, suffix: &Expr) -> Result<Expr> {
        self.binary(Op::SeqEndsWith, suffix)
    }

    pub fn replace_first(&self, pattern: &Expr, replacement: &Expr) -> Result<Expr> {
        self.ternary(Op::SeqReplaceFirst, pattern, replacement)
    }

    pub fn slice(&self, offset: &Expr, len: &Expr) -> Result<Expr> {
        self.ternary(Op::SeqSlice, offset, len)
    }

    pub fn index_of(&self, sub: &Expr, start: &Expr) -> Result<Expr> {
        self.ternary(Op::SeqIndexOf, sub, start)
    }

    pub fn regex_match(&self, regex: &Regex) -> Result<Expr> {
        self.unary(Op::RegexMatch(regex.clone()))
    }

    // Bounded sequences.

    pub fn push_back(&self, value: &Expr) -> Result<Expr> {
        self.binary(Op::FSeqPushBack, value)
    }

    pub fn get(&self, index: u32) -> Result<Expr> {
        self.unary(Op::FSeqGet(index))
    }

    pub fn fseq_contains(&self, value: &Expr) -> Result<Expr> {
        self.binary(Op::FSeqContains, value)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::eval::{evaluate, evaluate_bool, Valuation};
    use crate::expr::Context;

    #[test]
    fn test_hash_consing() {
        let ctx = Context::new();
        let x = ctx.var(Type::u8(), "x").unwrap();
        let one = ctx.constant(Value::u8(1));
        let a = x.add(&one).unwrap();
        let b = x.add(&one).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        // Same name, distinct variables.
        let y = ctx.var(Type::u8(), "x").unwrap();
        assert_ne!(x, y);
        assert_ne!(x.add(&one).unwrap(), y.add(&one).unwrap());
    }

    #[test]
    fn test_context_mismatch() {
        let c1 = Context::new();
        let c2 = Context::new();
        let x = c1.var(Type::Bool, "x").unwrap();
        let y = c2.var(Type::Bool, "y").unwrap();
        assert!(matches!(x.and(&y), Err(Error::ContextMismatch)));
    }

    #[test]
    fn test_reclaimed_slots() {
        let ctx = Context::new();
        let x = ctx.var(Type::u16(), "x").unwrap();
        let k = ctx.constant(Value::u16(3));
        let first = x.mul(&k).unwrap();
        let id = first.id();
        let before = ctx.table_len();
        drop(first);
        assert!(ctx.table_len() < before);

        let again = x.mul(&k).unwrap();
        assert_ne!(again.id(), id);
        assert_eq!(*again.op(), Op::Mul);
    }

    #[test]
    fn test_deep_chain_drops() {
        let ctx = Context::new();
        let x = ctx.var(Type::u32(), "x").unwrap();
        let mut e = x.clone();
        for i in 0..100_000 {
            e = e.bitxor(&ctx.constant(Value::u32(i + 1))).unwrap();
        }
        drop(e);
        assert!(ctx.table_len() < 10);
    }

    #[test]
    fn test_derived_operators() {
        let ctx = Context::new();
        let x = ctx.var(Type::i8(), "x").unwrap();
        let y = ctx.var(Type::i8(), "y").unwrap();
        let mut valuation = Valuation::new();
        valuation.insert(x.clone(), Value::i8(-3));
        valuation.insert(y.clone(), Value::i8(5));

        assert!(evaluate_bool(&y.gt(&x).unwrap(), &valuation).unwrap());
        assert!(evaluate_bool(&x.ge(&x.add_int(-1).unwrap()).unwrap(), &valuation).unwrap());
        assert_eq!(evaluate(&x.neg().unwrap(), &valuation).unwrap(), Value::i8(3));

        let a = ctx.var(Type::Bool, "a").unwrap();
        let b = ctx.var(Type::Bool, "b").unwrap();
        valuation.insert(a.clone(), Value::Bool(true));
        assert!(evaluate_bool(&a.xor(&b).unwrap(), &valuation).unwrap());
        assert!(!evaluate_bool(&a.implies(&b).unwrap(), &valuation).unwrap());
    }

    #[test]
    fn test_map_delete() {
        let ctx = Context::new();
        let m = ctx.constant(Value::empty_map(Type::u8(), Type::u8()).unwrap());
        let k = ctx.constant(Value::u8(4));
        let v = ctx.constant(Value::u8(9));
        let set = m.map_set(&k, &v).unwrap();
        assert!(set.map_contains_key(&k).unwrap().is_true());
        assert_eq!(set.map_delete(&k).unwrap(), m);
    }

    #[test]
    fn test_record_by_name() {
        let ctx = Context::new();
        let ty = Type::record("P", [("x", Type::u8()), ("y", Type::Bool)]);
        let p = ctx.var(ty.clone(), "p").unwrap();
        assert_eq!(p.field_named("y").unwrap(), p.field(1).unwrap());
        assert!(p.field_named("z").is_err());

        let x = ctx.constant(Value::u8(1));
        assert!(ctx.record(&ty, vec![x.clone()]).is_err());
        assert!(ctx.record(&ty, vec![x.clone(), x]).is_err());
    }

    #[test]
    fn test_fseq_get_bounds() {
        let ctx = Context::new();
        let s = ctx.var(Type::fseq(Type::u8(), 2).unwrap(), "s").unwrap();
        assert_eq!(*s.get(1).unwrap().ty(), Type::option(Type::u8()));
        assert!(s.get(2).is_err());
        assert_eq!(*s.length().unwrap().ty(), Type::u32());
    }
}
