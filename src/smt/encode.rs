//! Translation of expression DAGs into SMT-LIB2 scripts.
//!
//! Every value is flattened into the primitive leaves of its type (see
//! [`Type::leaves`]) and each leaf becomes one SMT term. Compound nodes are
//! bound by `define-fun`, one symbol per leaf, so shared subterms are
//! printed once and no printed term nests deeper than one operator.

use std::time::Duration;

use log::debug;
use num_bigint::BigUint;
use num_traits::One;
use rustc_hash::FxHashMap;

use super::term::{Command, Sort, Term};
use super::Objective;
use crate::error::{Error, Result};
use crate::expr::{Expr, Op};
use crate::regex::Regex;
use crate::types::{len_width, Leaf, Type, CHAR_WIDTH, MAX_CHAR};
use crate::value::{to_unsigned, Value};

/// Leaf symbols of one declared variable.
#[derive(Debug, Clone)]
pub struct VarLeaves {
    pub var: Expr,
    pub symbols: Vec<String>,
}

/// A complete query, ready to print.
#[derive(Debug, Clone)]
pub struct Query {
    pub script: Vec<Command>,
    pub vars: Vec<VarLeaves>,
}

fn unsupported(ty: &Type) -> Error {
    Error::UnsupportedType {
        backend: "smt",
        ty: ty.clone(),
    }
}

/// SMT sort of one primitive leaf.
pub fn leaf_sort(leaf: &Leaf) -> Result<Sort> {
    Ok(match leaf {
        Leaf::Bool => Sort::Bool,
        Leaf::Bits { width, .. } => Sort::BitVec(*width),
        Leaf::Char => Sort::BitVec(CHAR_WIDTH),
        Leaf::Int => Sort::Int,
        Leaf::Real => Sort::Real,
        Leaf::Seq(element) => {
            if *element == Type::Char {
                return Ok(Sort::String);
            }
            match element.leaves().as_slice() {
                [leaf @ (Leaf::Bool | Leaf::Bits { .. } | Leaf::Char | Leaf::Int | Leaf::Real | Leaf::Seq(_))] => {
                    Sort::Seq(Box::new(leaf_sort(leaf)?))
                }
                _ => return Err(unsupported(&Type::Seq(element.clone().into()))),
            }
        }
        Leaf::Array { index, element } => {
            if index.is_empty() {
                return Err(Error::InvalidType("map keys must have at least one primitive leaf".into()));
            }
            let index = index.iter().map(leaf_sort).collect::<Result<Vec<_>>>()?;
            Sort::Array(index, Box::new(leaf_sort(element)?))
        }
    })
}

/// SMT sorts of the leaves of `ty`.
pub fn sorts(ty: &Type) -> Result<Vec<Sort>> {
    ty.validate()?;
    ty.leaves().iter().map(leaf_sort).collect()
}

fn bits(width: u32, value: &num_bigint::BigInt) -> Term {
    let unsigned = to_unsigned(value, width);
    Term::bv(width, unsigned.to_biguint().unwrap_or_default())
}

fn char_term(code: u32) -> Term {
    Term::bv_u64(CHAR_WIDTH, code as u64)
}

/// Leaf terms of a concrete value.
pub fn value_terms(value: &Value) -> Result<Vec<Term>> {
    let mut out = Vec::new();
    push_value(value, &mut out)?;
    Ok(out)
}

fn single(value: &Value) -> Result<Term> {
    let mut terms = value_terms(value)?;
    match terms.len() {
        1 => Ok(terms.remove(0)),
        _ => Err(unsupported(&Type::Seq(value.ty().into()))),
    }
}

fn push_value(value: &Value, out: &mut Vec<Term>) -> Result<()> {
    match value {
        Value::Bool(b) => out.push(Term::Bool(*b)),
        Value::BitVec { width, value, .. } => out.push(bits(*width, value)),
        Value::Char(c) => out.push(char_term(*c)),
        Value::BigInt(n) => out.push(Term::Int(n.clone())),
        Value::Real(r) => out.push(Term::Real(r.clone())),
        Value::Option { inner, value } => {
            out.push(Term::Bool(value.is_some()));
            match value {
                Some(v) => push_value(v, out)?,
                None => push_value(&inner.default_value(), out)?,
            }
        }
        Value::Tuple(values) | Value::Record { values, .. } => {
            for v in values {
                push_value(v, out)?;
            }
        }
        Value::FSeq { element, cap, items } => {
            out.push(Term::bv_u64(len_width(*cap), items.len() as u64));
            let default = element.default_value();
            for i in 0..*cap as usize {
                push_value(items.get(i).unwrap_or(&default), out)?;
            }
        }
        Value::Seq { element, items } => {
            if *element == Type::Char {
                let codes = items
                    .iter()
                    .map(|c| match c {
                        Value::Char(c) => Ok(*c),
                        other => Err(Error::InvalidValue(format!("{} is not a character", other))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.push(Term::Str(codes));
            } else {
                let sort = sorts(&value.ty())?.remove(0);
                let mut units = items
                    .iter()
                    .map(|item| Ok(Term::app("seq.unit", vec![single(item)?])))
                    .collect::<Result<Vec<_>>>()?;
                out.push(match units.len() {
                    0 => Term::SeqEmpty(sort),
                    1 => units.remove(0),
                    _ => Term::app("seq.++", units),
                });
            }
        }
        Value::Map { ty, default, entries } => {
            let array_sorts = sorts(ty)?;
            let defaults = value_terms(default)?;
            let mut arrays: Vec<Term> = array_sorts
                .into_iter()
                .zip(defaults)
                .map(|(sort, d)| Term::ConstArray(sort, Box::new(d)))
                .collect();
            for (key, val) in entries.iter() {
                let key = value_terms(key)?;
                for (array, v) in arrays.iter_mut().zip(value_terms(val)?) {
                    *array = store(array.clone(), &key, v);
                }
            }
            out.extend(arrays);
        }
        Value::Set {
            element,
            default,
            exceptions,
        } => {
            let sort = sorts(&Type::Set(element.clone().into()))?.remove(0);
            let mut array = Term::ConstArray(sort, Box::new(Term::Bool(*default)));
            for x in exceptions.iter() {
                array = store(array, &value_terms(x)?, Term::Bool(!*default));
            }
            out.push(array);
        }
    }
    Ok(())
}

fn select(array: Term, key: &[Term]) -> Term {
    let mut args = vec![array];
    args.extend_from_slice(key);
    Term::app("select", args)
}

fn store(array: Term, key: &[Term], value: Term) -> Term {
    let mut args = vec![array];
    args.extend_from_slice(key);
    args.push(value);
    Term::app("store", args)
}

fn leaf_eq(a: &[Term], b: &[Term]) -> Term {
    Term::and(a.iter().cloned().zip(b.iter().cloned()).map(|(x, y)| x.eq(y)))
}

fn bv_ult(a: Term, b: Term) -> Term {
    Term::app("bvult", vec![a, b])
}

/// Offset and leaf count of field `index` of a tuple or record.
fn field_span(ty: &Type, index: usize) -> Result<(usize, usize)> {
    let fields = ty
        .field_types()
        .ok_or_else(|| Error::mismatch("get_field", "a tuple or record", ty))?;
    let offset = fields.iter().take(index).map(Type::num_leaves).sum();
    let len = fields
        .get(index)
        .map(Type::num_leaves)
        .ok_or_else(|| Error::mismatch("get_field", format!("a field {}", index), ty))?;
    Ok((offset, len))
}

fn regex_term(regex: &Regex) -> Term {
    match regex {
        Regex::Empty => Term::sym("re.none"),
        Regex::Epsilon => Term::app("str.to_re", vec![Term::Str(Vec::new())]),
        Regex::Range(lo, hi) if lo == hi => Term::app("str.to_re", vec![Term::Str(vec![*lo])]),
        Regex::Range(lo, hi) => Term::app("re.range", vec![Term::Str(vec![*lo]), Term::Str(vec![*hi])]),
        Regex::AnyChar => Term::sym("re.allchar"),
        Regex::Concat(a, b) => Term::app("re.++", vec![regex_term(a), regex_term(b)]),
        Regex::Union(a, b) => Term::app("re.union", vec![regex_term(a), regex_term(b)]),
        Regex::Star(r) => Term::app("re.*", vec![regex_term(r)]),
    }
}

/// Builds one query: declarations, definitions and assertions.
#[derive(Debug, Default)]
pub struct Encoder {
    body: Vec<Command>,
    memo: FxHashMap<u64, Vec<Term>>,
    vars: Vec<VarLeaves>,
    bound: usize,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf terms of `root`, encoding every node not seen before.
    pub fn encode(&mut self, root: &Expr) -> Result<Vec<Term>> {
        let mut stack = vec![(root.clone(), false)];
        while let Some((e, expanded)) = stack.pop() {
            if self.memo.contains_key(&e.id()) {
                continue;
            }
            if !expanded && !e.args().is_empty() {
                stack.push((e.clone(), true));
                for a in e.args().iter().rev() {
                    if !self.memo.contains_key(&a.id()) {
                        stack.push((a.clone(), false));
                    }
                }
                continue;
            }
            let terms = self.node(&e)?;
            self.memo.insert(e.id(), terms);
        }
        self.memo
            .get(&root.id())
            .cloned()
            .ok_or_else(|| Error::InvalidValue(format!("{} was not encoded", root)))
    }

    /// Assert a boolean expression.
    pub fn assert(&mut self, e: &Expr) -> Result<()> {
        if !e.ty().is_bool() {
            return Err(Error::mismatch("assert", "bool", e.ty()));
        }
        let term = self.encode(e)?.remove(0);
        self.body.push(Command::Assert(term));
        Ok(())
    }

    pub fn objective(&mut self, objective: &Objective) -> Result<()> {
        let (e, maximize) = match objective {
            Objective::Maximize(e) => (e, true),
            Objective::Minimize(e) => (e, false),
        };
        if !e.ty().is_arithmetic() {
            return Err(Error::mismatch("objective", "a numeric type", e.ty()));
        }
        let mut term = self.encode(e)?.remove(0);
        if let Type::BitVec { width, signed: true } = e.ty() {
            // Optimizers order bit-vectors as unsigned; flipping the sign bit
            // maps the signed order onto it.
            let sign = Term::bv(*width, BigUint::one() << (*width - 1));
            term = Term::app("bvxor", vec![term, sign]);
        }
        self.body.push(if maximize {
            Command::Maximize(term)
        } else {
            Command::Minimize(term)
        });
        Ok(())
    }

    /// Close the query with options, `check-sat` and the model requests.
    pub fn finish(self, timeout: Option<Duration>) -> Query {
        let mut script = vec![Command::SetOption("produce-models".into(), "true".into())];
        if let Some(timeout) = timeout {
            script.push(Command::SetOption("timeout".into(), timeout.as_millis().to_string()));
        }
        script.extend(self.body);
        script.push(Command::CheckSat);
        script.push(Command::GetInfo("reason-unknown".into()));
        let symbols: Vec<Term> = self
            .vars
            .iter()
            .flat_map(|v| v.symbols.iter().map(Term::sym))
            .collect();
        if !symbols.is_empty() {
            script.push(Command::GetValue(symbols));
        }
        debug!(
            "smt query: {} commands, {} variables, {} nodes",
            script.len(),
            self.vars.len(),
            self.memo.len()
        );
        Query {
            script,
            vars: self.vars,
        }
    }

    fn node(&mut self, e: &Expr) -> Result<Vec<Term>> {
        match e.op() {
            Op::Var { index, .. } => self.declare(e, *index),
            op => {
                let terms = match op {
                    Op::Const(v) => value_terms(v)?,
                    _ => self.apply(e)?,
                };
                let sorts = sorts(e.ty())?;
                let mut out = Vec::with_capacity(terms.len());
                for (j, (term, sort)) in terms.into_iter().zip(sorts).enumerate() {
                    if term.is_atomic() {
                        out.push(term);
                    } else {
                        let name = format!("n{}_{}", e.id(), j);
                        self.body.push(Command::DefineFun(name.clone(), sort, term));
                        out.push(Term::Sym(name));
                    }
                }
                Ok(out)
            }
        }
    }

    fn declare(&mut self, e: &Expr, index: u64) -> Result<Vec<Term>> {
        let sorts = sorts(e.ty())?;
        let symbols: Vec<String> = (0..sorts.len()).map(|j| format!("v{}_{}", index, j)).collect();
        for (name, sort) in symbols.iter().zip(sorts) {
            self.body.push(Command::DeclareConst(name.clone(), sort));
        }
        let terms: Vec<Term> = symbols.iter().map(Term::sym).collect();
        let wf = self.well_formed(e.ty(), &terms)?;
        if wf != Term::Bool(true) {
            self.body.push(Command::Assert(wf));
        }
        self.vars.push(VarLeaves {
            var: e.clone(),
            symbols,
        });
        Ok(terms)
    }

    /// Canonicity constraint of a value of type `ty` spread over `leaves`.
    fn well_formed(&mut self, ty: &Type, leaves: &[Term]) -> Result<Term> {
        Ok(match ty {
            Type::Bool | Type::BitVec { .. } | Type::BigInt | Type::Real | Type::Seq(_) => Term::Bool(true),
            Type::Char => Term::app("bvule", vec![leaves[0].clone(), char_term(MAX_CHAR)]),
            Type::Option(t) => {
                let inner = &leaves[1..];
                let wf = self.well_formed(t, inner)?;
                let default = value_terms(&t.default_value())?;
                leaves[0].clone().ite(wf, leaf_eq(inner, &default))
            }
            Type::Tuple(_) | Type::Record { .. } => {
                let mut parts = Vec::new();
                let mut offset = 0;
                for t in ty.field_types().unwrap_or_default() {
                    let n = t.num_leaves();
                    parts.push(self.well_formed(&t, &leaves[offset..offset + n])?);
                    offset += n;
                }
                Term::and(parts)
            }
            Type::FSeq(t, cap) => {
                let len = leaves[0].clone();
                let width = len_width(*cap);
                let n = t.num_leaves();
                let default = value_terms(&t.default_value())?;
                let mut parts = vec![Term::app("bvule", vec![len.clone(), Term::bv_u64(width, *cap as u64)])];
                for i in 0..*cap as usize {
                    let slot = &leaves[1 + i * n..1 + (i + 1) * n];
                    let wf = self.well_formed(t, slot)?;
                    let live = bv_ult(Term::bv_u64(width, i as u64), len.clone());
                    parts.push(live.ite(wf, leaf_eq(slot, &default)));
                }
                Term::and(parts)
            }
            Type::Map(k, v) => {
                let (bindings, key) = self.bound_key(k)?;
                let key_wf = self.well_formed(k, &key)?;
                let values: Vec<Term> = leaves.iter().map(|a| select(a.clone(), &key)).collect();
                let value_wf = self.well_formed(v, &values)?;
                let default = value_terms(&v.default_value())?;
                let body = key_wf.ite(value_wf, leaf_eq(&values, &default));
                Term::forall(bindings, body)
            }
            Type::Set(t) => {
                let (bindings, key) = self.bound_key(t)?;
                let key_wf = self.well_formed(t, &key)?;
                let member = select(leaves[0].clone(), &key);
                Term::forall(bindings, member.implies(key_wf))
            }
        })
    }

    fn bound_key(&mut self, ty: &Type) -> Result<(Vec<(String, Sort)>, Vec<Term>)> {
        let mut bindings = Vec::new();
        let mut terms = Vec::new();
        for sort in sorts(ty)? {
            let name = format!("q{}", self.bound);
            self.bound += 1;
            terms.push(Term::sym(name.clone()));
            bindings.push((name, sort));
        }
        Ok((bindings, terms))
    }

    fn args(&self, e: &Expr) -> Result<Vec<Vec<Term>>> {
        e.args()
            .iter()
            .map(|a| {
                self.memo
                    .get(&a.id())
                    .cloned()
                    .ok_or_else(|| Error::InvalidValue(format!("{} was not encoded", a)))
            })
            .collect()
    }

    fn apply(&mut self, e: &Expr) -> Result<Vec<Term>> {
        let a = self.args(e)?;
        let first = |i: usize| a[i][0].clone();
        let arg_ty = e.arg(0).ty();
        let is_string = |ty: &Type| *ty == Type::string();

        let terms = match e.op() {
            Op::Const(_) | Op::Var { .. } => return Err(Error::InvalidValue(format!("{} is a leaf", e))),

            Op::Not => vec![first(0).not()],
            Op::And => vec![Term::and([first(0), first(1)])],
            Op::Or => vec![Term::or([first(0), first(1)])],
            Op::Ite => {
                let c = first(0);
                a[1].iter()
                    .zip(&a[2])
                    .map(|(t, f)| c.clone().ite(t.clone(), f.clone()))
                    .collect()
            }
            Op::Eq => vec![leaf_eq(&a[0], &a[1])],

            Op::Lt | Op::Le => {
                let strict = *e.op() == Op::Lt;
                let head = match arg_ty {
                    Type::BitVec { signed: true, .. } => if strict { "bvslt" } else { "bvsle" },
                    Type::BitVec { .. } | Type::Char => if strict { "bvult" } else { "bvule" },
                    _ => if strict { "<" } else { "<=" },
                };
                vec![Term::app(head, vec![first(0), first(1)])]
            }
            Op::Add | Op::Sub | Op::Mul => {
                let bv = arg_ty.is_bitvec();
                let head = match (e.op(), bv) {
                    (Op::Add, true) => "bvadd",
                    (Op::Sub, true) => "bvsub",
                    (Op::Mul, true) => "bvmul",
                    (Op::Add, false) => "+",
                    (Op::Sub, false) => "-",
                    _ => "*",
                };
                vec![Term::app(head, vec![first(0), first(1)])]
            }
            Op::BitAnd => vec![Term::app("bvand", vec![first(0), first(1)])],
            Op::BitOr => vec![Term::app("bvor", vec![first(0), first(1)])],
            Op::BitXor => vec![Term::app("bvxor", vec![first(0), first(1)])],
            Op::BitNot => vec![Term::app("bvnot", vec![first(0)])],
            Op::Cast => {
                let (from, signed) = match arg_ty {
                    Type::BitVec { width, signed } => (*width, *signed),
                    other => return Err(Error::mismatch("cast", "a bit-vector", other)),
                };
                let to = match e.ty() {
                    Type::BitVec { width, .. } => *width,
                    other => return Err(Error::mismatch("cast", "a bit-vector", other)),
                };
                let x = first(0);
                vec![if to < from {
                    Term::app(format!("(_ extract {} 0)", to - 1), vec![x])
                } else if to > from {
                    let ext = if signed { "sign_extend" } else { "zero_extend" };
                    Term::app(format!("(_ {} {})", ext, to - from), vec![x])
                } else {
                    x
                }]
            }

            Op::Create => a.concat(),
            Op::GetField(i) => {
                let (offset, len) = field_span(arg_ty, *i)?;
                a[0][offset..offset + len].to_vec()
            }
            Op::WithField(i) => {
                let (offset, len) = field_span(arg_ty, *i)?;
                let mut leaves = a[0].clone();
                leaves.splice(offset..offset + len, a[1].iter().cloned());
                leaves
            }

            Op::Some => std::iter::once(Term::Bool(true)).chain(a[0].iter().cloned()).collect(),
            Op::IsSome => vec![first(0)],
            Op::OptionValue => a[0][1..].to_vec(),

            Op::MapGet => a[0].iter().map(|array| select(array.clone(), &a[1])).collect(),
            Op::MapSet => a[0]
                .iter()
                .zip(&a[2])
                .map(|(array, v)| store(array.clone(), &a[1], v.clone()))
                .collect(),

            Op::SetAdd => vec![store(first(0), &a[1], Term::Bool(true))],
            Op::SetRemove => vec![store(first(0), &a[1], Term::Bool(false))],
            Op::SetContains => vec![select(first(0), &a[1])],
            Op::SetUnion => vec![Term::app("(_ map or)", vec![first(0), first(1)])],
            Op::SetIntersect => vec![Term::app("(_ map and)", vec![first(0), first(1)])],
            Op::SetDifference => {
                let not_b = Term::app("(_ map not)", vec![first(1)]);
                vec![Term::app("(_ map and)", vec![first(0), not_b])]
            }

            Op::SeqUnit => {
                let x = single_leaf(e.arg(0).ty(), &a[0])?;
                vec![if is_string(e.ty()) {
                    Term::app("str.from_code", vec![Term::app("bv2nat", vec![x])])
                } else {
                    Term::app("seq.unit", vec![x])
                }]
            }
            op @ (Op::SeqConcat
            | Op::SeqLength
            | Op::SeqAt
            | Op::SeqContains
            | Op::SeqStartsWith
            | Op::SeqEndsWith
            | Op::SeqReplaceFirst
            | Op::SeqSlice
            | Op::SeqIndexOf) => {
                let prefix = if is_string(arg_ty) { "str" } else { "seq" };
                let (name, args) = match op {
                    Op::SeqConcat => ("++", vec![first(0), first(1)]),
                    Op::SeqLength => ("len", vec![first(0)]),
                    Op::SeqAt => ("at", vec![first(0), first(1)]),
                    Op::SeqContains => ("contains", vec![first(0), first(1)]),
                    Op::SeqStartsWith => ("prefixof", vec![first(1), first(0)]),
                    Op::SeqEndsWith => ("suffixof", vec![first(1), first(0)]),
                    Op::SeqReplaceFirst => ("replace", vec![first(0), first(1), first(2)]),
                    Op::SeqSlice => (if prefix == "str" { "substr" } else { "extract" }, vec![first(0), first(1), first(2)]),
                    _ => ("indexof", vec![first(0), first(1), first(2)]),
                };
                vec![Term::app(format!("{}.{}", prefix, name), args)]
            }
            Op::RegexMatch(regex) => vec![Term::app("str.in_re", vec![first(0), regex_term(regex)])],

            Op::FSeqPushBack => {
                let (t, cap) = fseq_parts(arg_ty)?;
                let width = len_width(cap);
                let n = t.num_leaves();
                let len = first(0);
                let room = bv_ult(len.clone(), Term::bv_u64(width, cap as u64));
                let grown = Term::app("bvadd", vec![len.clone(), Term::bv_u64(width, 1)]);
                let mut leaves = vec![room.ite(grown, len.clone())];
                for i in 0..cap as usize {
                    let here = len.clone().eq(Term::bv_u64(width, i as u64));
                    for j in 0..n {
                        leaves.push(here.clone().ite(a[1][j].clone(), a[0][1 + i * n + j].clone()));
                    }
                }
                leaves
            }
            Op::FSeqLength => {
                let (_, cap) = fseq_parts(arg_ty)?;
                let width = len_width(cap);
                vec![if width < 32 {
                    Term::app(format!("(_ zero_extend {})", 32 - width), vec![first(0)])
                } else {
                    first(0)
                }]
            }
            Op::FSeqGet(i) => {
                let (t, cap) = fseq_parts(arg_ty)?;
                let n = t.num_leaves();
                let i = *i as usize;
                let live = bv_ult(Term::bv_u64(len_width(cap), i as u64), first(0));
                std::iter::once(live)
                    .chain(a[0][1 + i * n..1 + (i + 1) * n].iter().cloned())
                    .collect()
            }
            Op::FSeqContains => {
                let (t, cap) = fseq_parts(arg_ty)?;
                let width = len_width(cap);
                let n = t.num_leaves();
                vec![Term::or((0..cap as usize).map(|i| {
                    let live = bv_ult(Term::bv_u64(width, i as u64), first(0));
                    Term::and([live, leaf_eq(&a[0][1 + i * n..1 + (i + 1) * n], &a[1])])
                }))]
            }
        };
        Ok(terms)
    }
}

fn single_leaf(ty: &Type, leaves: &[Term]) -> Result<Term> {
    match leaves {
        [x] => Ok(x.clone()),
        _ => Err(unsupported(&Type::Seq(ty.clone().into()))),
    }
}

fn fseq_parts(ty: &Type) -> Result<(&Type, u32)> {
    match ty {
        Type::FSeq(t, cap) => Ok((t, *cap)),
        other => Err(Error::mismatch("fseq", "a bounded sequence", other)),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::ErrorKind;
    use crate::expr::Context;
    use crate::smt::printer::to_smtlib;

    fn script(e: &Expr) -> String {
        let mut enc = Encoder::new();
        enc.assert(e).unwrap();
        to_smtlib(&enc.finish(None).script)
    }

    #[test]
    fn test_bitvec_query() {
        let ctx = Context::new();
        let x = ctx.var(Type::i8(), "x").unwrap();
        let e = x.add(&ctx.constant(Value::i8(1))).unwrap().eq(&ctx.constant(Value::i8(5))).unwrap();
        let text = script(&e);
        let index = x.var_index().unwrap();
        assert!(text.starts_with("(set-option :produce-models true)\n"));
        assert!(text.contains(&format!("(declare-const v{}_0 (_ BitVec 8))", index)));
        assert!(text.contains(&format!("(bvadd v{}_0 #x01)", index)));
        assert!(text.contains("(check-sat)\n(get-info :reason-unknown)\n"));
        assert!(text.ends_with(&format!("(get-value (v{}_0))\n", index)));
    }

    #[test]
    fn test_shared_nodes_defined_once() {
        let ctx = Context::new();
        let x = ctx.var(Type::u8(), "x").unwrap();
        let y = ctx.var(Type::u8(), "y").unwrap();
        let s = x.mul(&y).unwrap();
        let e = s.lt(&s.add(&x).unwrap()).unwrap();
        let text = script(&e);
        assert_eq!(text.matches("bvmul").count(), 1);
        assert!(text.contains(&format!("(define-fun n{}_0 () (_ BitVec 8)", s.id())));
    }

    #[test]
    fn test_char_and_option_well_formedness() {
        let ctx = Context::new();
        let c = ctx.var(Type::Char, "c").unwrap();
        let text = script(&c.eq(&ctx.constant(Value::char('a').unwrap())).unwrap());
        assert!(text.contains("bvule"));
        assert!(text.contains("#b101111111111111111"));

        let o = ctx.var(Type::option(Type::u8()), "o").unwrap();
        let text = script(&o.is_some().unwrap().not().unwrap());
        let i = o.var_index().unwrap();
        assert!(text.contains(&format!("(assert (ite v{0}_0 true (= v{0}_1 #x00)))", i)));
    }

    #[test]
    fn test_strings_and_regex() {
        let ctx = Context::new();
        let s = ctx.var(Type::string(), "s").unwrap();
        let e = s
            .starts_with(&ctx.string("ab").unwrap())
            .unwrap()
            .and(&s.regex_match(&Regex::literal("ab").concat(Regex::AnyChar.star())).unwrap())
            .unwrap();
        let text = script(&e);
        let i = s.var_index().unwrap();
        assert!(text.contains(&format!("(declare-const v{}_0 String)", i)));
        assert!(text.contains(&format!("(str.prefixof \"ab\" v{}_0)", i)));
        assert!(text.contains("str.in_re"));
        assert!(text.contains("(re.* re.allchar)"));
    }

    #[test]
    fn test_map_and_set_encoding() {
        let ctx = Context::new();
        let m = ctx.var(Type::map(Type::u8(), Type::Bool).unwrap(), "m").unwrap();
        let k = ctx.constant(Value::u8(3));
        let e = m.map_set(&k, &ctx.tt()).unwrap().map_get(&k).unwrap();
        // map_get after map_set of the same key folds to the stored value
        assert!(e.is_true());
        let e = m.map_get(&k).unwrap();
        let text = script(&e);
        assert!(text.contains("(Array (_ BitVec 8) Bool)"));
        assert!(text.contains("(select"));

        let s = ctx.var(Type::set(Type::Char).unwrap(), "s").unwrap();
        let t = ctx.var(Type::set(Type::Char).unwrap(), "t").unwrap();
        let e = s.difference(&t).unwrap().contains(&ctx.constant(Value::char('x').unwrap())).unwrap();
        let text = script(&e);
        assert!(text.contains("((_ map and)"));
        assert!(text.contains("((_ map not)"));
        assert!(text.contains("(forall ((q"));
    }

    #[test]
    fn test_seq_of_tuples_rejected() {
        let pair = Type::tuple([Type::u8(), Type::Bool]);
        let err = Type::seq(pair.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);

        // A raw leaf that slipped past the type model still has no sort.
        let err = leaf_sort(&Leaf::Seq(pair)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { backend: "smt", .. }));
        assert_eq!(leaf_sort(&Leaf::Seq(Type::u8())).unwrap(), Sort::Seq(Box::new(Sort::BitVec(8))));
    }

    #[test]
    fn test_fseq_encoding() {
        let ctx = Context::new();
        let ty = Type::fseq(Type::u8(), 3).unwrap();
        let s = ctx.var(ty, "s").unwrap();
        let pushed = s.push_back(&ctx.constant(Value::u8(7))).unwrap();
        let e = pushed.get(0).unwrap().is_some().unwrap();
        let text = script(&e);
        let i = s.var_index().unwrap();
        assert!(text.contains(&format!("(declare-const v{}_0 (_ BitVec 2))", i)));
        assert!(text.contains(&format!("(bvule v{}_0 #b11)", i)));
        assert!(text.contains("bvadd"));
    }

    #[test]
    fn test_signed_objective() {
        let ctx = Context::new();
        let x = ctx.var(Type::i8(), "x").unwrap();
        let mut enc = Encoder::new();
        enc.assert(&x.lt(&ctx.constant(Value::i8(10))).unwrap()).unwrap();
        enc.objective(&Objective::Maximize(x.clone())).unwrap();
        let text = to_smtlib(&enc.finish(Some(Duration::from_millis(250))).script);
        assert!(text.contains("(set-option :timeout 250)"));
        assert!(text.contains(&format!("(maximize (bvxor v{}_0 #x80))", x.var_index().unwrap())));
    }
}
