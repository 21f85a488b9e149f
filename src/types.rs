//! The type model: a closed set of value shapes.
//!
//! Both backends dispatch on [`Type`] and consult the same primitive
//! decomposition ([`Type::leaves`]) and the same table of disallowed
//! nestings ([`Type::validate`]), so they always agree on what a value
//! looks like once flattened.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::utils::bits_needed;

/// Largest code point representable by [`Type::Char`].
pub const MAX_CHAR: u32 = 0x2FFFF;

/// Number of bits of a [`Type::Char`] leaf.
pub const CHAR_WIDTH: u32 = 18;

/// Largest supported bit-vector width.
pub const MAX_WIDTH: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Bool,
    BitVec { width: u32, signed: bool },
    Char,
    BigInt,
    Real,
    Option(Arc<Type>),
    Tuple(Arc<[Type]>),
    Record {
        name: Arc<str>,
        fields: Arc<[(Arc<str>, Type)]>,
    },
    Map(Arc<Type>, Arc<Type>),
    Set(Arc<Type>),
    Seq(Arc<Type>),
    FSeq(Arc<Type>, u32),
}

/// A primitive slot of a flattened value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Leaf {
    Bool,
    Bits { width: u32, signed: bool },
    Char,
    Int,
    Real,
    /// Unbounded sequence of the given element type.
    Seq(Type),
    /// Total function from the index leaves to the element leaf.
    Array { index: Vec<Leaf>, element: Box<Leaf> },
}

/// Where a nested type sits inside its container.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Position {
    MapKey,
    SetElement,
    SeqElement,
    FSeqElement,
}

impl Position {
    fn describe(self) -> &'static str {
        match self {
            Position::MapKey => "map key",
            Position::SetElement => "set element",
            Position::SeqElement => "sequence element",
            Position::FSeqElement => "bounded sequence element",
        }
    }
}

/// Positions in which a map-like type may not appear, at any depth.
const NO_MAP_LIKE: [Position; 4] = [
    Position::MapKey,
    Position::SetElement,
    Position::SeqElement,
    Position::FSeqElement,
];

/// Width of the length leaf of a bounded sequence with capacity `cap`.
pub fn len_width(cap: u32) -> u32 {
    bits_needed(cap as u64).max(1)
}

impl Type {
    pub fn bitvec(width: u32, signed: bool) -> Result<Type> {
        if width == 0 || width > MAX_WIDTH {
            return Err(Error::InvalidType(format!(
                "bit-vector width must be in 1..={}, got {}",
                MAX_WIDTH, width
            )));
        }
        Ok(Type::BitVec { width, signed })
    }

    pub const fn unsigned(width: u32) -> Type {
        Type::BitVec { width, signed: false }
    }
    pub const fn signed(width: u32) -> Type {
        Type::BitVec { width, signed: true }
    }

    pub const fn u8() -> Type {
        Type::unsigned(8)
    }
    pub const fn u16() -> Type {
        Type::unsigned(16)
    }
    pub const fn u32() -> Type {
        Type::unsigned(32)
    }
    pub const fn u64() -> Type {
        Type::unsigned(64)
    }
    pub const fn i8() -> Type {
        Type::signed(8)
    }
    pub const fn i16() -> Type {
        Type::signed(16)
    }
    pub const fn i32() -> Type {
        Type::signed(32)
    }
    pub const fn i64() -> Type {
        Type::signed(64)
    }

    pub fn option(inner: Type) -> Type {
        Type::Option(Arc::new(inner))
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Type {
        Type::Tuple(elements.into_iter().collect())
    }

    pub fn record<S: AsRef<str>>(name: &str, fields: impl IntoIterator<Item = (S, Type)>) -> Type {
        Type::Record {
            name: Arc::from(name),
            fields: fields
                .into_iter()
                .map(|(n, t)| (Arc::from(n.as_ref()), t))
                .collect(),
        }
    }

    pub fn map(key: Type, value: Type) -> Result<Type> {
        let ty = Type::Map(Arc::new(key), Arc::new(value));
        ty.validate()?;
        Ok(ty)
    }

    pub fn set(element: Type) -> Result<Type> {
        let ty = Type::Set(Arc::new(element));
        ty.validate()?;
        Ok(ty)
    }

    pub fn seq(element: Type) -> Result<Type> {
        let ty = Type::Seq(Arc::new(element));
        ty.validate()?;
        Ok(ty)
    }

    /// Unbounded sequence of characters.
    pub fn string() -> Type {
        Type::Seq(Arc::new(Type::Char))
    }

    pub fn fseq(element: Type, cap: u32) -> Result<Type> {
        let ty = Type::FSeq(Arc::new(element), cap);
        ty.validate()?;
        Ok(ty)
    }

    /// Check widths and the disallowed-nesting table over the whole type.
    pub fn validate(&self) -> Result<()> {
        let mut stack = vec![self];
        while let Some(ty) = stack.pop() {
            match ty {
                Type::Bool | Type::Char | Type::BigInt | Type::Real => {}
                Type::BitVec { width, signed } => {
                    Type::bitvec(*width, *signed)?;
                }
                Type::Option(t) => stack.push(t),
                Type::Tuple(ts) => stack.extend(ts.iter()),
                Type::Record { fields, .. } => stack.extend(fields.iter().map(|(_, t)| t)),
                Type::Map(k, v) => {
                    ty.check_nesting(k, Position::MapKey)?;
                    stack.push(k);
                    stack.push(v);
                }
                Type::Set(t) => {
                    ty.check_nesting(t, Position::SetElement)?;
                    stack.push(t);
                }
                Type::Seq(t) => {
                    ty.check_nesting(t, Position::SeqElement)?;
                    if t.is_composite() {
                        return Err(Error::DisallowedNesting {
                            outer: ty.clone(),
                            inner: t.as_ref().clone(),
                            position: Position::SeqElement.describe(),
                        });
                    }
                    stack.push(t);
                }
                Type::FSeq(t, _) => {
                    ty.check_nesting(t, Position::FSeqElement)?;
                    stack.push(t);
                }
            }
        }
        if self.bit_width().is_none() && self.find_unbounded().is_none() {
            return Err(Error::InvalidType(format!("encoding of {} exceeds {} bits", self, u32::MAX)));
        }
        Ok(())
    }

    /// Whether the type flattens into more than one slot per value.
    /// Unbounded sequences only hold single-slot elements.
    fn is_composite(&self) -> bool {
        matches!(
            self,
            Type::Option(_) | Type::Tuple(_) | Type::Record { .. } | Type::FSeq(..)
        )
    }

    fn check_nesting(&self, inner: &Type, position: Position) -> Result<()> {
        if NO_MAP_LIKE.contains(&position) && inner.contains_map_like() {
            return Err(Error::DisallowedNesting {
                outer: self.clone(),
                inner: inner.clone(),
                position: position.describe(),
            });
        }
        Ok(())
    }

    /// Whether a `Map` or `Set` occurs anywhere inside this type.
    pub fn contains_map_like(&self) -> bool {
        let mut stack = vec![self];
        while let Some(ty) = stack.pop() {
            match ty {
                Type::Map(..) | Type::Set(_) => return true,
                Type::Option(t) | Type::Seq(t) | Type::FSeq(t, _) => stack.push(t),
                Type::Tuple(ts) => stack.extend(ts.iter()),
                Type::Record { fields, .. } => stack.extend(fields.iter().map(|(_, t)| t)),
                _ => {}
            }
        }
        false
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_bitvec(&self) -> bool {
        matches!(self, Type::BitVec { .. })
    }

    /// Types supporting `+ - *`.
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Type::BitVec { .. } | Type::BigInt | Type::Real)
    }

    /// Types supporting `< <=`.
    pub fn is_ordered(&self) -> bool {
        self.is_arithmetic() || matches!(self, Type::Char)
    }

    /// Field types of a tuple or record.
    pub fn field_types(&self) -> Option<Vec<Type>> {
        match self {
            Type::Tuple(ts) => Some(ts.to_vec()),
            Type::Record { fields, .. } => Some(fields.iter().map(|(_, t)| t.clone()).collect()),
            _ => None,
        }
    }

    pub fn field_type(&self, index: usize) -> Option<Type> {
        match self {
            Type::Tuple(ts) => ts.get(index).cloned(),
            Type::Record { fields, .. } => fields.get(index).map(|(_, t)| t.clone()),
            _ => None,
        }
    }

    /// Element type of options, sets and sequences; value type of maps.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Option(t) | Type::Set(t) | Type::Seq(t) | Type::FSeq(t, _) => Some(t),
            Type::Map(_, v) => Some(v),
            _ => None,
        }
    }

    /// Whether every value of this type has a finite bit encoding.
    pub fn is_bounded(&self) -> bool {
        self.bit_width().is_some()
    }

    /// Number of bits of the flattened encoding.
    ///
    /// `None` for unbounded types and for encodings wider than `u32::MAX`.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::BitVec { width, .. } => Some(*width),
            Type::Char => Some(CHAR_WIDTH),
            Type::BigInt | Type::Real | Type::Map(..) | Type::Set(_) | Type::Seq(_) => None,
            Type::Option(t) => t.bit_width()?.checked_add(1),
            Type::Tuple(ts) => ts.iter().try_fold(0u32, |acc, t| acc.checked_add(t.bit_width()?)),
            Type::Record { fields, .. } => fields
                .iter()
                .try_fold(0u32, |acc, (_, t)| acc.checked_add(t.bit_width()?)),
            Type::FSeq(t, cap) => cap.checked_mul(t.bit_width()?)?.checked_add(len_width(*cap)),
        }
    }

    /// The first unbounded type found inside this type, if any.
    pub fn find_unbounded(&self) -> Option<Type> {
        let mut stack = vec![self];
        while let Some(ty) = stack.pop() {
            match ty {
                Type::BigInt | Type::Real | Type::Map(..) | Type::Set(_) | Type::Seq(_) => {
                    return Some(ty.clone())
                }
                Type::Option(t) | Type::FSeq(t, _) => stack.push(t),
                Type::Tuple(ts) => stack.extend(ts.iter().rev()),
                Type::Record { fields, .. } => stack.extend(fields.iter().rev().map(|(_, t)| t)),
                _ => {}
            }
        }
        None
    }

    /// Flatten into primitive leaves: depth-first, in field order.
    pub fn leaves(&self) -> Vec<Leaf> {
        let mut out = Vec::new();
        self.push_leaves(&mut out);
        out
    }

    fn push_leaves(&self, out: &mut Vec<Leaf>) {
        match self {
            Type::Bool => out.push(Leaf::Bool),
            Type::BitVec { width, signed } => out.push(Leaf::Bits {
                width: *width,
                signed: *signed,
            }),
            Type::Char => out.push(Leaf::Char),
            Type::BigInt => out.push(Leaf::Int),
            Type::Real => out.push(Leaf::Real),
            Type::Option(t) => {
                out.push(Leaf::Bool);
                t.push_leaves(out);
            }
            Type::Tuple(ts) => ts.iter().for_each(|t| t.push_leaves(out)),
            Type::Record { fields, .. } => fields.iter().for_each(|(_, t)| t.push_leaves(out)),
            Type::FSeq(t, cap) => {
                out.push(Leaf::Bits {
                    width: len_width(*cap),
                    signed: false,
                });
                for _ in 0..*cap {
                    t.push_leaves(out);
                }
            }
            Type::Seq(t) => out.push(Leaf::Seq(t.as_ref().clone())),
            Type::Map(k, v) => {
                let index = k.leaves();
                for element in v.leaves() {
                    out.push(Leaf::Array {
                        index: index.clone(),
                        element: Box::new(element),
                    });
                }
            }
            Type::Set(t) => out.push(Leaf::Array {
                index: t.leaves(),
                element: Box::new(Leaf::Bool),
            }),
        }
    }

    /// Number of leaves, without materializing them.
    pub fn num_leaves(&self) -> usize {
        match self {
            Type::Bool | Type::BitVec { .. } | Type::Char | Type::BigInt | Type::Real => 1,
            Type::Seq(_) | Type::Set(_) => 1,
            Type::Option(t) => 1 + t.num_leaves(),
            Type::Tuple(ts) => ts.iter().map(Type::num_leaves).sum(),
            Type::Record { fields, .. } => fields.iter().map(|(_, t)| t.num_leaves()).sum(),
            Type::FSeq(t, cap) => 1 + *cap as usize * t.num_leaves(),
            Type::Map(_, v) => v.num_leaves(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::BitVec { width, signed } => write!(f, "{}{}", if *signed { "i" } else { "u" }, width),
            Type::Char => write!(f, "char"),
            Type::BigInt => write!(f, "bigint"),
            Type::Real => write!(f, "real"),
            Type::Option(t) => write!(f, "option<{}>", t),
            Type::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            Type::Record { name, fields } => {
                write!(f, "{} {{", name)?;
                for (i, (n, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", n, t)?;
                }
                write!(f, " }}")
            }
            Type::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            Type::Set(t) => write!(f, "set<{}>", t),
            Type::Seq(t) if **t == Type::Char => write!(f, "string"),
            Type::Seq(t) => write!(f, "seq<{}>", t),
            Type::FSeq(t, cap) => write!(f, "fseq<{}, {}>", t, cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_width_range() {
        assert!(Type::bitvec(0, false).is_err());
        assert!(Type::bitvec(1025, true).is_err());
        assert_eq!(Type::bitvec(1024, true).ok(), Some(Type::signed(1024)));
        assert_eq!(Type::bitvec(8, false).ok(), Some(Type::u8()));
    }

    #[test]
    fn test_disallowed_nesting() {
        let m = Type::map(Type::u8(), Type::Bool).unwrap();
        let s = Type::set(Type::u8()).unwrap();

        for inner in [m.clone(), s.clone(), Type::option(m.clone()), Type::tuple([Type::Bool, s.clone()])] {
            assert!(matches!(
                Type::map(inner.clone(), Type::u8()),
                Err(Error::DisallowedNesting { position: "map key", .. })
            ));
            assert!(Type::set(inner.clone()).is_err());
            assert!(Type::seq(inner.clone()).is_err());
            assert!(Type::fseq(inner.clone(), 3).is_err());
        }

        // Map-like values are fine.
        assert!(Type::map(Type::u8(), m.clone()).is_ok());
        assert!(Type::option(s.clone()).validate().is_ok());
        assert!(Type::tuple([m, s]).validate().is_ok());
    }

    #[test]
    fn test_seq_elements_are_single_slot() {
        let composite = [
            Type::tuple([Type::u8(), Type::Bool]),
            Type::record("P", [("x", Type::i8())]),
            Type::option(Type::u8()),
            Type::fseq(Type::Bool, 2).unwrap(),
        ];
        for inner in composite {
            assert!(matches!(
                Type::seq(inner.clone()),
                Err(Error::DisallowedNesting { position: "sequence element", .. })
            ));
            // Nested deeper still fails.
            assert!(Type::option(Type::Seq(Arc::new(inner))).validate().is_err());
        }

        assert!(Type::seq(Type::u8()).is_ok());
        assert!(Type::seq(Type::Real).is_ok());
        assert!(Type::seq(Type::string()).is_ok());
        // Composites may still hold sequences.
        assert!(Type::tuple([Type::string(), Type::u8()]).validate().is_ok());
    }

    #[test]
    fn test_oversized_encoding_is_rejected() {
        assert_eq!(Type::FSeq(Arc::new(Type::u64()), u32::MAX).bit_width(), None);
        assert!(matches!(Type::fseq(Type::u64(), u32::MAX), Err(Error::InvalidType(_))));
        assert!(matches!(Type::fseq(Type::Bool, u32::MAX), Err(Error::InvalidType(_))));

        let half = Type::fseq(Type::u64(), 1 << 25).unwrap();
        assert_eq!(half.bit_width(), Some((1 << 31) + 26));
        let pair = Type::tuple([half.clone(), half]);
        assert_eq!(pair.bit_width(), None);
        assert!(matches!(pair.validate(), Err(Error::InvalidType(_))));

        // Unbounded types are not oversized.
        assert!(Type::fseq(Type::BigInt, u32::MAX).is_ok());
        assert!(Type::fseq(Type::u8(), 1 << 20).is_ok());
    }

    #[test]
    fn test_nested_width_is_validated() {
        let bad = Type::tuple([Type::Bool, Type::BitVec { width: 0, signed: false }]);
        assert!(matches!(bad.validate(), Err(Error::InvalidType(_))));
    }

    #[test]
    fn test_leaves() {
        let ty = Type::tuple([Type::option(Type::u8()), Type::Char]);
        assert_eq!(
            ty.leaves(),
            vec![
                Leaf::Bool,
                Leaf::Bits { width: 8, signed: false },
                Leaf::Char,
            ]
        );

        let fs = Type::fseq(Type::Bool, 4).unwrap();
        let leaves = fs.leaves();
        assert_eq!(leaves.len(), 5);
        assert_eq!(leaves[0], Leaf::Bits { width: 3, signed: false });
        assert_eq!(fs.num_leaves(), 5);

        let m = Type::map(Type::tuple([Type::u8(), Type::Bool]), Type::option(Type::i16())).unwrap();
        let leaves = m.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(m.num_leaves(), 2);
        match &leaves[1] {
            Leaf::Array { index, element } => {
                assert_eq!(index.len(), 2);
                assert_eq!(**element, Leaf::Bits { width: 16, signed: true });
            }
            other => panic!("unexpected leaf {:?}", other),
        }
    }

    #[test]
    fn test_bit_width() {
        assert_eq!(Type::Bool.bit_width(), Some(1));
        assert_eq!(Type::option(Type::u8()).bit_width(), Some(9));
        assert_eq!(Type::fseq(Type::u8(), 0).unwrap().bit_width(), Some(1));
        assert_eq!(Type::fseq(Type::u8(), 3).unwrap().bit_width(), Some(2 + 24));
        assert_eq!(Type::tuple([Type::Char, Type::BigInt]).bit_width(), None);
        assert_eq!(Type::tuple([Type::Char, Type::BigInt]).find_unbounded(), Some(Type::BigInt));
        assert_eq!(Type::u8().find_unbounded(), None);
    }

    #[test]
    fn test_len_width() {
        assert_eq!(len_width(0), 1);
        assert_eq!(len_width(1), 1);
        assert_eq!(len_width(2), 2);
        assert_eq!(len_width(7), 3);
        assert_eq!(len_width(8), 4);
    }

    #[test]
    fn test_display() {
        let r = Type::record("Point", [("x", Type::i32()), ("y", Type::i32())]);
        assert_eq!(r.to_string(), "Point { x: i32, y: i32 }");
        assert_eq!(Type::string().to_string(), "string");
        assert_eq!(Type::map(Type::u8(), Type::Bool).unwrap().to_string(), "map<u8, bool>");
    }
}
