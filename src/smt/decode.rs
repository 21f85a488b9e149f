//! Reading solver replies back into values.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, trace};
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use super::encode::VarLeaves;
use super::sexp::{parse_all, unescape, Sexp};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::types::{Type, MAX_CHAR};
use crate::value::Value;

/// What the solver answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Sat(HashMap<Expr, Value>),
    Unsat,
}

fn parse_error(what: &str, s: &Sexp) -> Error {
    Error::Parse(format!("expected {}, found `{}`", what, s))
}

/// Interpret the full output of one query.
pub fn read_reply(text: &str, vars: &[VarLeaves]) -> Result<Reply> {
    let sexps = parse_all(text)?;
    let mut status = None;
    let mut reason = String::new();
    let mut errors = Vec::new();
    let mut bindings: HashMap<&str, &Sexp> = HashMap::new();

    for s in &sexps {
        match s {
            Sexp::Atom(a) if status.is_none() && matches!(a.as_str(), "sat" | "unsat" | "unknown" | "timeout") => {
                status = Some(a.as_str());
            }
            Sexp::Atom(_) | Sexp::Str(_) => {}
            Sexp::List(items) => {
                if s.is_app("error") {
                    if let Some(Sexp::Str(msg)) = items.get(1) {
                        errors.push(msg.clone());
                    }
                } else if s.is_app(":reason-unknown") {
                    reason = match items.get(1) {
                        Some(Sexp::Str(r)) | Some(Sexp::Atom(r)) => r.clone(),
                        _ => String::new(),
                    };
                } else if !s.is_app("objectives") {
                    for binding in items {
                        match binding.as_list() {
                            Some([Sexp::Atom(name), value]) => {
                                bindings.insert(name.as_str(), value);
                            }
                            _ => return Err(parse_error("a `(symbol value)` binding", binding)),
                        }
                    }
                }
            }
        }
    }

    match status {
        Some("unsat") => Ok(Reply::Unsat),
        Some("timeout") => Err(Error::Timeout),
        Some("unknown") => {
            debug!("solver answered unknown: {}", reason);
            if reason.contains("timeout") || reason.contains("canceled") {
                Err(Error::Timeout)
            } else {
                Err(Error::Solver(format!("unknown result: {}", reason)))
            }
        }
        Some(_) => {
            let mut model = HashMap::with_capacity(vars.len());
            for v in vars {
                let leaves = v
                    .symbols
                    .iter()
                    .map(|name| {
                        bindings
                            .get(name.as_str())
                            .copied()
                            .ok_or_else(|| Error::Parse(format!("no value for `{}`", name)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (value, canonical) = decode_value(v.var.ty(), &mut leaves.iter())?;
                if !canonical {
                    trace!("non-canonical model value {} for {}", value, v.var);
                }
                model.insert(v.var.clone(), value);
            }
            Ok(Reply::Sat(model))
        }
        None if !errors.is_empty() => Err(Error::Solver(errors.join("; "))),
        None => Err(Error::Parse(format!("no check-sat answer in `{}`", text.trim()))),
    }
}

fn next<'a>(leaves: &mut std::slice::Iter<'_, &'a Sexp>) -> Result<&'a Sexp> {
    leaves
        .next()
        .copied()
        .ok_or_else(|| Error::Parse("model has fewer leaves than its type".into()))
}

/// Rebuild a value of type `ty` from its leaf values.
///
/// The flag is false when the leaves do not form a canonical encoding,
/// e.g. a map key at which the solver left a junk slot.
pub fn decode_value(ty: &Type, leaves: &mut std::slice::Iter<'_, &Sexp>) -> Result<(Value, bool)> {
    Ok(match ty {
        Type::Bool => (Value::Bool(decode_bool(next(leaves)?)?), true),
        Type::BitVec { width, signed } => {
            let (w, bits) = decode_bits(next(leaves)?)?;
            if w != *width {
                return Err(Error::Parse(format!("expected {} bits, found {}", width, w)));
            }
            (Value::bitvec(*width, *signed, BigInt::from(bits)), true)
        }
        Type::Char => {
            let (_, bits) = decode_bits(next(leaves)?)?;
            match bits.to_u32() {
                Some(code) if code <= MAX_CHAR => (Value::Char(code), true),
                _ => (Value::Char(0), false),
            }
        }
        Type::BigInt => (Value::BigInt(decode_int(next(leaves)?)?), true),
        Type::Real => (Value::Real(decode_real(next(leaves)?)?), true),
        Type::Seq(element) => decode_seq(element, next(leaves)?)?,
        Type::Option(inner) => {
            let present = decode_bool(next(leaves)?)?;
            let (value, canonical) = decode_value(inner, leaves)?;
            if present {
                (Value::some(value), canonical)
            } else {
                let canonical = canonical && value == inner.default_value();
                (Value::none(inner.as_ref().clone()), canonical)
            }
        }
        Type::Tuple(ts) => {
            let mut values = Vec::with_capacity(ts.len());
            let mut canonical = true;
            for t in ts.iter() {
                let (v, c) = decode_value(t, leaves)?;
                values.push(v);
                canonical &= c;
            }
            (Value::Tuple(values), canonical)
        }
        Type::Record { fields, .. } => {
            let mut values = Vec::with_capacity(fields.len());
            let mut canonical = true;
            for (_, t) in fields.iter() {
                let (v, c) = decode_value(t, leaves)?;
                values.push(v);
                canonical &= c;
            }
            (Value::record(ty.clone(), values)?, canonical)
        }
        Type::FSeq(element, cap) => {
            let (_, len) = decode_bits(next(leaves)?)?;
            let len = len.to_usize().unwrap_or(usize::MAX);
            let mut canonical = len <= *cap as usize;
            let default = element.default_value();
            let mut items = Vec::new();
            for i in 0..*cap as usize {
                let (v, c) = decode_value(element, leaves)?;
                canonical &= c;
                if i < len {
                    items.push(v);
                } else {
                    canonical &= v == default;
                }
            }
            (Value::fseq(element.as_ref().clone(), *cap, items)?, canonical)
        }
        Type::Map(key, value) => {
            let arrays = (0..value.num_leaves())
                .map(|_| parse_array(next(leaves)?, key.num_leaves()))
                .collect::<Result<Vec<_>>>()?;
            decode_map(key, value, &arrays)?
        }
        Type::Set(element) => {
            let array = parse_array(next(leaves)?, element.num_leaves())?;
            let default = decode_bool(&array.default)?;
            let mut members = BTreeMap::new();
            for (keys, member) in &array.entries {
                let (k, canonical) = decode_value(element, &mut keys.iter().collect::<Vec<_>>().iter())?;
                if canonical {
                    members.insert(k, decode_bool(member)?);
                }
            }
            let exceptions: BTreeSet<Value> = members
                .into_iter()
                .filter(|(_, m)| *m != default)
                .map(|(k, _)| k)
                .collect();
            let set = Value::Set {
                element: element.as_ref().clone(),
                default,
                exceptions: Arc::new(exceptions),
            };
            (set, true)
        }
    })
}

fn decode_map(key: &Type, value: &Type, arrays: &[ArrayModel]) -> Result<(Value, bool)> {
    let defaults: Vec<&Sexp> = arrays.iter().map(|a| &a.default).collect();
    let (default, _) = decode_value(value, &mut defaults.iter())?;

    // Later entries of one array shadow earlier ones.
    let mut slots: Vec<BTreeMap<Value, &Sexp>> = Vec::with_capacity(arrays.len());
    for array in arrays {
        let mut slot = BTreeMap::new();
        for (keys, v) in &array.entries {
            let (k, canonical) = decode_value(key, &mut keys.iter().collect::<Vec<_>>().iter())?;
            if canonical {
                slot.insert(k, v);
            }
        }
        slots.push(slot);
    }

    let keys: BTreeSet<&Value> = slots.iter().flat_map(|s| s.keys()).collect();
    let mut map = Value::const_map(key.clone(), default)?;
    for k in keys {
        let leaves: Vec<&Sexp> = slots
            .iter()
            .zip(&defaults)
            .map(|(slot, d)| slot.get(k).copied().unwrap_or(*d))
            .collect();
        let (v, _) = decode_value(value, &mut leaves.iter())?;
        map = map
            .map_set(k.clone(), v)
            .ok_or_else(|| Error::Parse(format!("cannot store into {}", key)))?;
    }
    Ok((map, true))
}

fn decode_bool(s: &Sexp) -> Result<bool> {
    match s.as_atom() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(parse_error("a boolean", s)),
    }
}

/// Width and unsigned value of a bit-vector literal.
fn decode_bits(s: &Sexp) -> Result<(u32, BigUint)> {
    if let Some(atom) = s.as_atom() {
        let parsed = if let Some(hex) = atom.strip_prefix("#x") {
            BigUint::parse_bytes(hex.as_bytes(), 16).map(|v| (4 * hex.len() as u32, v))
        } else if let Some(bin) = atom.strip_prefix("#b") {
            BigUint::parse_bytes(bin.as_bytes(), 2).map(|v| (bin.len() as u32, v))
        } else {
            None
        };
        return parsed.ok_or_else(|| parse_error("a bit-vector", s));
    }
    // (_ bvN w)
    if let Some([Sexp::Atom(underscore), Sexp::Atom(bv), Sexp::Atom(width)]) = s.as_list() {
        if underscore == "_" {
            if let (Some(n), Ok(w)) = (bv.strip_prefix("bv"), width.parse::<u32>()) {
                if let Some(v) = BigUint::parse_bytes(n.as_bytes(), 10) {
                    return Ok((w, v));
                }
            }
        }
    }
    Err(parse_error("a bit-vector", s))
}

fn decode_int(s: &Sexp) -> Result<BigInt> {
    match s {
        Sexp::Atom(a) => BigInt::parse_bytes(a.as_bytes(), 10).ok_or_else(|| parse_error("an integer", s)),
        Sexp::List(items) => match items.as_slice() {
            [Sexp::Atom(minus), n] if minus == "-" => Ok(-decode_int(n)?),
            _ => Err(parse_error("an integer", s)),
        },
        Sexp::Str(_) => Err(parse_error("an integer", s)),
    }
}

fn decode_real(s: &Sexp) -> Result<BigRational> {
    match s {
        Sexp::Atom(a) => {
            let (whole, frac) = a.split_once('.').unwrap_or((a.as_str(), ""));
            let digits = format!("{}{}", whole, frac);
            let numer = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(|| parse_error("a real", s))?;
            let denom = num_traits::pow(BigInt::from(10), frac.len());
            Ok(BigRational::new(numer, denom))
        }
        Sexp::List(items) => match items.as_slice() {
            [Sexp::Atom(minus), x] if minus == "-" => Ok(-decode_real(x)?),
            [Sexp::Atom(slash), n, d] if slash == "/" => {
                let d = decode_real(d)?;
                if d.is_zero() {
                    return Err(parse_error("a non-zero denominator", s));
                }
                Ok(decode_real(n)? / d)
            }
            _ => Err(parse_error("a real", s)),
        },
        Sexp::Str(_) => Err(parse_error("a real", s)),
    }
}

fn decode_seq(element: &Type, s: &Sexp) -> Result<(Value, bool)> {
    let mut items = Vec::new();
    let mut canonical = true;
    let mut stack = vec![s];
    while let Some(s) = stack.pop() {
        match s {
            Sexp::Str(text) if *element == Type::Char => {
                for code in unescape(text) {
                    if code <= MAX_CHAR {
                        items.push(Value::Char(code));
                    } else {
                        canonical = false;
                    }
                }
            }
            _ if s.is_app("str.++") || s.is_app("seq.++") => {
                if let Some(parts) = s.as_list() {
                    stack.extend(parts[1..].iter().rev());
                }
            }
            _ if s.is_app("seq.unit") => match s.as_list() {
                Some([_, x]) => {
                    let (v, c) = decode_value(element, &mut [x].iter())?;
                    items.push(v);
                    canonical &= c;
                }
                _ => return Err(parse_error("a unit sequence", s)),
            },
            _ if s.is_app("str.from_code") && *element == Type::Char => match s.as_list() {
                Some([_, code]) => {
                    match decode_int(code)?.to_u32().filter(|c| *c <= MAX_CHAR) {
                        Some(c) => items.push(Value::Char(c)),
                        None => canonical = false,
                    }
                }
                _ => return Err(parse_error("a character code", s)),
            },
            Sexp::List(parts) if is_seq_empty(parts) => {}
            _ => return Err(parse_error("a sequence", s)),
        }
    }
    Ok((Value::seq(element.clone(), items)?, canonical))
}

fn is_seq_empty(items: &[Sexp]) -> bool {
    matches!(items, [as_, empty, _] if as_.as_atom() == Some("as") && empty.as_atom() == Some("seq.empty"))
}

/// A finite description of an array model.
#[derive(Debug)]
struct ArrayModel {
    default: Sexp,
    /// Index leaves and element; later entries shadow earlier ones.
    entries: Vec<(Vec<Sexp>, Sexp)>,
}

fn parse_array(s: &Sexp, arity: usize) -> Result<ArrayModel> {
    let mut stores = Vec::new();
    let mut current = s;
    loop {
        let items = current.as_list().ok_or_else(|| parse_error("an array", current))?;
        if current.is_app("store") && items.len() == arity + 3 {
            stores.push((items[2..2 + arity].to_vec(), items[arity + 2].clone()));
            current = &items[1];
            continue;
        }
        if let [head, value] = items {
            if is_const_head(head) {
                stores.reverse();
                return Ok(ArrayModel {
                    default: value.clone(),
                    entries: stores,
                });
            }
        }
        if current.is_app("lambda") {
            let mut model = parse_lambda(items, arity)?;
            stores.reverse();
            model.entries.extend(stores);
            return Ok(model);
        }
        if current.is_app("_") && items.get(1).and_then(Sexp::as_atom) == Some("as-array") {
            return Err(Error::Parse(format!("as-array models are not supported: `{}`", current)));
        }
        return Err(parse_error("an array", current));
    }
}

fn is_const_head(head: &Sexp) -> bool {
    matches!(head.as_list(), Some([as_, c, _]) if as_.as_atom() == Some("as") && c.as_atom() == Some("const"))
}

/// `(lambda ((x S) ...) body)` where `body` is an `ite` chain over key
/// equalities, or a boolean combination of them.
fn parse_lambda(items: &[Sexp], arity: usize) -> Result<ArrayModel> {
    let (params, body) = match items {
        [_, Sexp::List(params), body] => (params, body),
        _ => return Err(Error::Parse("malformed lambda".into())),
    };
    let names: Vec<&str> = params
        .iter()
        .filter_map(|p| p.as_list().and_then(|p| p.first()).and_then(Sexp::as_atom))
        .collect();
    if names.len() != arity {
        return Err(Error::Parse(format!("lambda has {} parameters, expected {}", names.len(), arity)));
    }

    let mut entries = Vec::new();
    let mut current = body;
    loop {
        match current.as_list() {
            Some([head, c, then, otherwise]) if head.as_atom() == Some("ite") => match key_of(c, &names) {
                Some(keys) => {
                    entries.push((keys, then.clone()));
                    current = otherwise;
                }
                None => return Err(parse_error("a key comparison", c)),
            },
            _ => break,
        }
    }

    if let Some(keys) = key_of(current, &names) {
        entries.push((keys, Sexp::Atom("true".into())));
        entries.reverse();
        return Ok(ArrayModel {
            default: Sexp::Atom("false".into()),
            entries,
        });
    }
    if current.is_app("or") {
        for c in current.as_list().map(|l| &l[1..]).unwrap_or_default() {
            let keys = key_of(c, &names).ok_or_else(|| parse_error("a key comparison", c))?;
            entries.push((keys, Sexp::Atom("true".into())));
        }
        entries.reverse();
        return Ok(ArrayModel {
            default: Sexp::Atom("false".into()),
            entries,
        });
    }
    entries.reverse();
    Ok(ArrayModel {
        default: current.clone(),
        entries,
    })
}

/// Key tuple selected by a conjunction of `(= param literal)` comparisons.
fn key_of(c: &Sexp, names: &[&str]) -> Option<Vec<Sexp>> {
    let conjuncts: Vec<&Sexp> = if c.is_app("and") {
        c.as_list()?[1..].iter().collect()
    } else {
        vec![c]
    };
    let mut keys: Vec<Option<Sexp>> = vec![None; names.len()];
    for eq in conjuncts {
        match eq.as_list()? {
            [head, a, b] if head.as_atom() == Some("=") => {
                let (param, literal) = match (a.as_atom(), b.as_atom()) {
                    (Some(x), _) if names.contains(&x) => (x, b),
                    (_, Some(y)) if names.contains(&y) => (y, a),
                    _ => return None,
                };
                let i = names.iter().position(|n| *n == param)?;
                keys[i] = Some(literal.clone());
            }
            _ => return None,
        }
    }
    keys.into_iter().collect()
}
