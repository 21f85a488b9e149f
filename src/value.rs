//! Concrete values: constants of expressions and results of models.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::{Error, Result};
use crate::types::{len_width, Type, MAX_CHAR};

/// A self-describing concrete value: every value knows its [`Type`].
///
/// Values are kept in canonical form, so structural equality is semantic
/// equality: fixed-width integers are normalized into their range and map
/// entries equal to the default are dropped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Bool(bool),
    BitVec {
        width: u32,
        signed: bool,
        value: BigInt,
    },
    Char(u32),
    BigInt(BigInt),
    Real(BigRational),
    Option {
        inner: Type,
        value: Option<Box<Value>>,
    },
    Tuple(Vec<Value>),
    Record {
        ty: Type,
        values: Vec<Value>,
    },
    Map {
        ty: Type,
        default: Box<Value>,
        entries: Arc<BTreeMap<Value, Value>>,
    },
    Set {
        element: Type,
        default: bool,
        exceptions: Arc<BTreeSet<Value>>,
    },
    Seq {
        element: Type,
        items: Vec<Value>,
    },
    FSeq {
        element: Type,
        cap: u32,
        items: Vec<Value>,
    },
}

/// Reduce `value` into the range of a `width`-bit integer.
pub fn wrap(value: &BigInt, width: u32, signed: bool) -> BigInt {
    let modulus = BigInt::one() << width;
    let m = value.mod_floor(&modulus);
    if signed && m >= (BigInt::one() << (width - 1)) {
        m - modulus
    } else {
        m
    }
}

/// Unsigned bit pattern of a normalized fixed-width integer.
pub fn to_unsigned(value: &BigInt, width: u32) -> BigInt {
    if value.is_negative() {
        value + (BigInt::one() << width)
    } else {
        value.clone()
    }
}

impl Value {
    pub fn bitvec(width: u32, signed: bool, value: impl Into<BigInt>) -> Value {
        Value::BitVec {
            width,
            signed,
            value: wrap(&value.into(), width, signed),
        }
    }

    pub fn u8(v: u8) -> Value {
        Value::bitvec(8, false, v)
    }
    pub fn u16(v: u16) -> Value {
        Value::bitvec(16, false, v)
    }
    pub fn u32(v: u32) -> Value {
        Value::bitvec(32, false, v)
    }
    pub fn u64(v: u64) -> Value {
        Value::bitvec(64, false, v)
    }
    pub fn i8(v: i8) -> Value {
        Value::bitvec(8, true, v)
    }
    pub fn i16(v: i16) -> Value {
        Value::bitvec(16, true, v)
    }
    pub fn i32(v: i32) -> Value {
        Value::bitvec(32, true, v)
    }
    pub fn i64(v: i64) -> Value {
        Value::bitvec(64, true, v)
    }

    pub fn int(v: impl Into<BigInt>) -> Value {
        Value::BigInt(v.into())
    }

    pub fn real(numer: impl Into<BigInt>, denom: impl Into<BigInt>) -> Result<Value> {
        let denom = denom.into();
        if denom.is_zero() {
            return Err(Error::InvalidValue("zero denominator".into()));
        }
        Ok(Value::Real(BigRational::new(numer.into(), denom)))
    }

    pub fn char(c: char) -> Result<Value> {
        Value::char_code(c as u32)
    }

    pub fn char_code(code: u32) -> Result<Value> {
        if code > MAX_CHAR {
            return Err(Error::InvalidValue(format!(
                "character U+{:X} is outside the supported range",
                code
            )));
        }
        Ok(Value::Char(code))
    }

    pub fn none(inner: Type) -> Value {
        Value::Option { inner, value: None }
    }

    pub fn some(value: Value) -> Value {
        Value::Option {
            inner: value.ty(),
            value: Some(Box::new(value)),
        }
    }

    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(values)
    }

    pub fn record(ty: Type, values: Vec<Value>) -> Result<Value> {
        let fields = match &ty {
            Type::Record { .. } => ty.field_types().unwrap_or_default(),
            _ => return Err(Error::mismatch("record", "a record type", &ty)),
        };
        if fields.len() != values.len() || fields.iter().zip(&values).any(|(t, v)| *t != v.ty()) {
            return Err(Error::InvalidValue(format!("field values do not match {}", ty)));
        }
        Ok(Value::Record { ty, values })
    }

    /// The map sending every key to the default of the value type.
    pub fn empty_map(key: Type, value: Type) -> Result<Value> {
        let ty = Type::map(key, value.clone())?;
        Ok(Value::Map {
            ty,
            default: Box::new(value.default_value()),
            entries: Arc::new(BTreeMap::new()),
        })
    }

    /// The map sending every key to `default`.
    pub fn const_map(key: Type, default: Value) -> Result<Value> {
        let ty = Type::map(key, default.ty())?;
        Ok(Value::Map {
            ty,
            default: Box::new(default),
            entries: Arc::new(BTreeMap::new()),
        })
    }

    pub fn empty_set(element: Type) -> Result<Value> {
        Type::set(element.clone())?;
        Ok(Value::Set {
            element,
            default: false,
            exceptions: Arc::new(BTreeSet::new()),
        })
    }

    pub fn full_set(element: Type) -> Result<Value> {
        Type::set(element.clone())?;
        Ok(Value::Set {
            element,
            default: true,
            exceptions: Arc::new(BTreeSet::new()),
        })
    }

    pub fn seq(element: Type, items: Vec<Value>) -> Result<Value> {
        Type::seq(element.clone())?;
        if let Some(bad) = items.iter().find(|v| v.ty() != element) {
            return Err(Error::InvalidValue(format!("{} is not a {}", bad, element)));
        }
        Ok(Value::Seq { element, items })
    }

    pub fn string(s: &str) -> Result<Value> {
        let items = s.chars().map(Value::char).collect::<Result<Vec<_>>>()?;
        Ok(Value::Seq {
            element: Type::Char,
            items,
        })
    }

    pub fn fseq(element: Type, cap: u32, items: Vec<Value>) -> Result<Value> {
        Type::fseq(element.clone(), cap)?;
        if items.len() > cap as usize {
            return Err(Error::InvalidValue(format!(
                "{} items exceed the capacity {}",
                items.len(),
                cap
            )));
        }
        if let Some(bad) = items.iter().find(|v| v.ty() != element) {
            return Err(Error::InvalidValue(format!("{} is not a {}", bad, element)));
        }
        Ok(Value::FSeq { element, cap, items })
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::BitVec { width, signed, .. } => Type::BitVec {
                width: *width,
                signed: *signed,
            },
            Value::Char(_) => Type::Char,
            Value::BigInt(_) => Type::BigInt,
            Value::Real(_) => Type::Real,
            Value::Option { inner, .. } => Type::option(inner.clone()),
            Value::Tuple(vs) => Type::tuple(vs.iter().map(Value::ty)),
            Value::Record { ty, .. } | Value::Map { ty, .. } => ty.clone(),
            Value::Set { element, .. } => Type::Set(Arc::new(element.clone())),
            Value::Seq { element, .. } => Type::Seq(Arc::new(element.clone())),
            Value::FSeq { element, cap, .. } => Type::FSeq(Arc::new(element.clone()), *cap),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload of fixed-width and unbounded integers.
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::BitVec { value, .. } | Value::BigInt(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Char(c) => Some(*c as i64),
            _ => self.as_int()?.to_i64(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Char(c) => Some(*c as u64),
            _ => self.as_int()?.to_u64(),
        }
    }

    pub fn as_real(&self) -> Option<&BigRational> {
        match self {
            Value::Real(r) => Some(r),
            _ => None,
        }
    }

    /// Fields of a tuple or record.
    pub fn fields(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(vs) => Some(vs),
            Value::Record { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Items of a bounded or unbounded sequence.
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::Seq { items, .. } | Value::FSeq { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Contents of a `Seq(Char)` as a Rust string.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Seq {
                element: Type::Char,
                items,
            } => items
                .iter()
                .map(|v| match v {
                    Value::Char(c) => char::from_u32(*c),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    pub fn map_get(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Map { default, entries, .. } => Some(entries.get(key).unwrap_or(default).clone()),
            _ => None,
        }
    }

    pub fn map_set(&self, key: Value, value: Value) -> Option<Value> {
        match self {
            Value::Map { ty, default, entries } => {
                let mut entries = entries.as_ref().clone();
                if value == **default {
                    entries.remove(&key);
                } else {
                    entries.insert(key, value);
                }
                Some(Value::Map {
                    ty: ty.clone(),
                    default: default.clone(),
                    entries: Arc::new(entries),
                })
            }
            _ => None,
        }
    }

    pub fn set_contains(&self, element: &Value) -> Option<bool> {
        match self {
            Value::Set { default, exceptions, .. } => Some(*default != exceptions.contains(element)),
            _ => None,
        }
    }

    /// Set membership after updating `element` to `member`.
    pub fn set_update(&self, element: Value, member: bool) -> Option<Value> {
        match self {
            Value::Set {
                element: ty,
                default,
                exceptions,
            } => {
                let mut exceptions = exceptions.as_ref().clone();
                if member == *default {
                    exceptions.remove(&element);
                } else {
                    exceptions.insert(element);
                }
                Some(Value::Set {
                    element: ty.clone(),
                    default: *default,
                    exceptions: Arc::new(exceptions),
                })
            }
            _ => None,
        }
    }

    /// Pointwise combination of two sets by a boolean connective.
    pub fn set_combine(&self, other: &Value, op: impl Fn(bool, bool) -> bool) -> Option<Value> {
        match (self, other) {
            (
                Value::Set {
                    element,
                    default: d1,
                    exceptions: e1,
                },
                Value::Set { default: d2, exceptions: e2, .. },
            ) => {
                let default = op(*d1, *d2);
                let exceptions = e1
                    .union(e2)
                    .filter(|x| op(*d1 != e1.contains(*x), *d2 != e2.contains(*x)) != default)
                    .cloned()
                    .collect();
                Some(Value::Set {
                    element: element.clone(),
                    default,
                    exceptions: Arc::new(exceptions),
                })
            }
            _ => None,
        }
    }
}

impl Type {
    /// The default value of this type.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::BitVec { width, signed } => Value::bitvec(*width, *signed, 0),
            Type::Char => Value::Char(0),
            Type::BigInt => Value::BigInt(BigInt::zero()),
            Type::Real => Value::Real(BigRational::zero()),
            Type::Option(t) => Value::none(t.as_ref().clone()),
            Type::Tuple(ts) => Value::Tuple(ts.iter().map(Type::default_value).collect()),
            Type::Record { .. } => Value::Record {
                ty: self.clone(),
                values: self
                    .field_types()
                    .unwrap_or_default()
                    .iter()
                    .map(Type::default_value)
                    .collect(),
            },
            Type::Map(_, v) => Value::Map {
                ty: self.clone(),
                default: Box::new(v.default_value()),
                entries: Arc::new(BTreeMap::new()),
            },
            Type::Set(t) => Value::Set {
                element: t.as_ref().clone(),
                default: false,
                exceptions: Arc::new(BTreeSet::new()),
            },
            Type::Seq(t) => Value::Seq {
                element: t.as_ref().clone(),
                items: Vec::new(),
            },
            Type::FSeq(t, cap) => Value::FSeq {
                element: t.as_ref().clone(),
                cap: *cap,
                items: Vec::new(),
            },
        }
    }
}

/// Bits of a non-negative integer, least significant first.
pub fn int_to_bits(value: &BigInt, width: u32) -> Vec<bool> {
    let (_, bytes) = value.to_bytes_le();
    (0..width)
        .map(|i| {
            let byte = bytes.get((i / 8) as usize).copied().unwrap_or(0);
            (byte >> (i % 8)) & 1 == 1
        })
        .collect()
}

/// Integer from bits, least significant first.
pub fn bits_to_int(bits: &[bool], signed: bool) -> BigInt {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &b) in bits.iter().enumerate() {
        if b {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    let unsigned = BigInt::from_bytes_le(Sign::Plus, &bytes);
    match bits.len() {
        0 => unsigned,
        w => wrap(&unsigned, w as u32, signed),
    }
}

impl Value {
    /// Canonical bit encoding of a bounded value, least significant bit first
    /// for each leaf, leaves in [`Type::leaves`] order.
    pub fn to_bits(&self) -> Result<Vec<bool>> {
        let mut out = Vec::new();
        self.push_bits(&mut out)?;
        Ok(out)
    }

    fn push_bits(&self, out: &mut Vec<bool>) -> Result<()> {
        match self {
            Value::Bool(b) => out.push(*b),
            Value::BitVec { width, value, .. } => out.extend(int_to_bits(&to_unsigned(value, *width), *width)),
            Value::Char(c) => out.extend(int_to_bits(&BigInt::from(*c), crate::types::CHAR_WIDTH)),
            Value::Option { inner, value } => {
                out.push(value.is_some());
                match value {
                    Some(v) => v.push_bits(out)?,
                    None => inner.default_value().push_bits(out)?,
                }
            }
            Value::Tuple(vs) | Value::Record { values: vs, .. } => {
                for v in vs {
                    v.push_bits(out)?;
                }
            }
            Value::FSeq { element, cap, items } => {
                out.extend(int_to_bits(&BigInt::from(items.len()), len_width(*cap)));
                for item in items {
                    item.push_bits(out)?;
                }
                let default = element.default_value();
                for _ in items.len()..*cap as usize {
                    default.push_bits(out)?;
                }
            }
            _ => {
                return Err(Error::UnsupportedType {
                    backend: "bdd",
                    ty: self.ty(),
                })
            }
        }
        Ok(())
    }

    /// Decode a canonical bit encoding produced by [`Value::to_bits`].
    ///
    /// Non-canonical input (out-of-range characters or lengths) is clamped,
    /// so only well-formed encodings round-trip.
    pub fn from_bits(ty: &Type, bits: &[bool]) -> Result<Value> {
        let mut pos = 0;
        let value = Value::pop_bits(ty, bits, &mut pos)?;
        if pos != bits.len() {
            return Err(Error::InvalidValue(format!(
                "expected {} bits for {}, got {}",
                pos,
                ty,
                bits.len()
            )));
        }
        Ok(value)
    }

    fn take<'a>(bits: &'a [bool], pos: &mut usize, n: usize) -> Result<&'a [bool]> {
        let slice = bits
            .get(*pos..*pos + n)
            .ok_or_else(|| Error::InvalidValue("bit encoding is too short".into()))?;
        *pos += n;
        Ok(slice)
    }

    fn pop_bits(ty: &Type, bits: &[bool], pos: &mut usize) -> Result<Value> {
        Ok(match ty {
            Type::Bool => Value::Bool(Value::take(bits, pos, 1)?[0]),
            Type::BitVec { width, signed } => {
                let b = Value::take(bits, pos, *width as usize)?;
                Value::BitVec {
                    width: *width,
                    signed: *signed,
                    value: bits_to_int(b, *signed),
                }
            }
            Type::Char => {
                let b = Value::take(bits, pos, crate::types::CHAR_WIDTH as usize)?;
                let code = bits_to_int(b, false).to_u32().unwrap_or(0);
                Value::Char(code.min(MAX_CHAR))
            }
            Type::Option(inner) => {
                let has = Value::take(bits, pos, 1)?[0];
                let value = Value::pop_bits(inner, bits, pos)?;
                if has {
                    Value::some(value)
                } else {
                    Value::none(inner.as_ref().clone())
                }
            }
            Type::Tuple(ts) => Value::Tuple(
                ts.iter()
                    .map(|t| Value::pop_bits(t, bits, pos))
                    .collect::<Result<_>>()?,
            ),
            Type::Record { .. } => Value::Record {
                ty: ty.clone(),
                values: ty
                    .field_types()
                    .unwrap_or_default()
                    .iter()
                    .map(|t| Value::pop_bits(t, bits, pos))
                    .collect::<Result<_>>()?,
            },
            Type::FSeq(element, cap) => {
                let b = Value::take(bits, pos, len_width(*cap) as usize)?;
                let len = bits_to_int(b, false).to_u32().unwrap_or(0).min(*cap);
                let mut items = Vec::with_capacity(*cap as usize);
                for _ in 0..*cap {
                    items.push(Value::pop_bits(element, bits, pos)?);
                }
                items.truncate(len as usize);
                Value::FSeq {
                    element: element.as_ref().clone(),
                    cap: *cap,
                    items,
                }
            }
            _ => {
                return Err(Error::UnsupportedType {
                    backend: "bdd",
                    ty: ty.clone(),
                })
            }
        })
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
            write!(f, "{}", open)?;
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", v)?;
            }
            write!(f, "{}", close)
        }

        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::BitVec { width, signed, value } => {
                write!(f, "{}{}{}", value, if *signed { "i" } else { "u" }, width)
            }
            Value::Char(c) => match char::from_u32(*c) {
                Some(ch) => write!(f, "{:?}", ch),
                None => write!(f, "'\\u{{{:x}}}'", c),
            },
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Real(r) => write!(f, "{}", r),
            Value::Option { value: None, .. } => write!(f, "None"),
            Value::Option { value: Some(v), .. } => write!(f, "Some({})", v),
            Value::Tuple(vs) => list(f, "(", vs, ")"),
            Value::Record { ty, values } => match ty {
                Type::Record { name, .. } => list(f, &format!("{} {{ ", name), values, " }"),
                _ => list(f, "{ ", values, " }"),
            },
            Value::Map { default, entries, .. } => {
                write!(f, "{{")?;
                for (k, v) in entries.iter() {
                    write!(f, "{} => {}, ", k, v)?;
                }
                write!(f, "_ => {}}}", default)
            }
            Value::Set {
                default, exceptions, ..
            } => {
                let items: Vec<Value> = exceptions.iter().cloned().collect();
                if *default {
                    list(f, "all \\ {", &items, "}")
                } else {
                    list(f, "{", &items, "}")
                }
            }
            Value::Seq { .. } if self.as_string().is_some() => {
                write!(f, "{:?}", self.as_string().unwrap_or_default())
            }
            Value::Seq { items, .. } | Value::FSeq { items, .. } => list(f, "[", items, "]"),
        }
    }
}
