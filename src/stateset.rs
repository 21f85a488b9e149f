//! Sets of typed values and function relations as BDDs.
//!
//! A [`StateSet`] of type `T` lives on the canonical variable of `T` in its
//! manager, so any two sets of the same type in one manager combine
//! directly. A [`Transformer`] holds the relation `out = f(in)` over the
//! function's own parameter bits and a private output variable; images are
//! renamed back into the canonical range of the result type.

use std::fmt;
use std::sync::Arc;

use log::debug;
use num_bigint::BigUint;

use crate::error::{Error, Result};
use crate::expr::{Context, Expr};
use crate::manager::{Manager, State};
use crate::reference::Ref;
use crate::types::Type;
use crate::value::Value;

fn resolve(manager: Option<&Manager>) -> Manager {
    manager.cloned().unwrap_or_else(|| Manager::global().clone())
}

/// A set of values of one type.
#[derive(Clone)]
pub struct StateSet {
    manager: Manager,
    ty: Type,
    node: Ref,
}

impl fmt::Debug for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSet")
            .field("ty", &self.ty)
            .field("node", &self.node)
            .finish()
    }
}

impl StateSet {
    /// The values `x` of type `ty` for which `predicate(x)` holds.
    ///
    /// Free variables of the predicate other than `x` are existentially
    /// quantified.
    pub fn from_predicate<F>(ty: &Type, predicate: F, manager: Option<&Manager>) -> Result<StateSet>
    where
        F: FnOnce(&Expr) -> Result<Expr>,
    {
        let manager = resolve(manager);
        ty.validate()?;
        if let Some(unbounded) = ty.find_unbounded() {
            return Err(Error::UnsupportedType {
                backend: "bdd",
                ty: unbounded,
            });
        }
        let var = manager.canonical_var(ty)?;
        let p = predicate(&var)?;
        let node = manager.run(|state| {
            let f = state.compile_bool(&p)?;
            let bits = state.var_bits(&var)?;
            let f = state.project(f, &bits);
            let wf = state.well_formed(&var)?;
            Ok(state.bdd.apply_and(f, wf))
        })?;
        Ok(StateSet {
            manager,
            ty: ty.clone(),
            node,
        })
    }

    pub fn empty(ty: &Type, manager: Option<&Manager>) -> Result<StateSet> {
        StateSet::from_predicate(ty, |x| Ok(x.context().ff()), manager)
    }

    pub fn full(ty: &Type, manager: Option<&Manager>) -> Result<StateSet> {
        StateSet::from_predicate(ty, |x| Ok(x.context().tt()), manager)
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    fn check(&self, other: &StateSet) -> Result<()> {
        if !self.manager.ptr_eq(&other.manager) {
            return Err(Error::ManagerMismatch);
        }
        if self.ty != other.ty {
            return Err(Error::mismatch("state set", self.ty.to_string(), &other.ty));
        }
        Ok(())
    }

    fn with_node(&self, node: Ref) -> StateSet {
        StateSet {
            manager: self.manager.clone(),
            ty: self.ty.clone(),
            node,
        }
    }

    fn combine(&self, other: &StateSet, op: impl FnOnce(&State, Ref, Ref) -> Ref) -> Result<StateSet> {
        self.check(other)?;
        let node = op(&self.manager.lock(), self.node, other.node);
        Ok(self.with_node(node))
    }

    pub fn union(&self, other: &StateSet) -> Result<StateSet> {
        self.combine(other, |s, f, g| s.bdd.apply_or(f, g))
    }

    pub fn intersect(&self, other: &StateSet) -> Result<StateSet> {
        self.combine(other, |s, f, g| s.bdd.apply_and(f, g))
    }

    pub fn difference(&self, other: &StateSet) -> Result<StateSet> {
        self.combine(other, |s, f, g| s.bdd.apply_and(f, -g))
    }

    /// All other well-formed values of the type.
    pub fn complement(&self) -> Result<StateSet> {
        let var = self.manager.canonical_var(&self.ty)?;
        let f = self.node;
        let node = self.manager.run(|state| {
            let wf = state.well_formed(&var)?;
            Ok(state.bdd.apply_and(-f, wf))
        })?;
        Ok(self.with_node(node))
    }

    pub fn is_empty(&self) -> bool {
        self.manager.lock().bdd.is_zero(self.node)
    }

    pub fn is_full(&self) -> Result<bool> {
        let var = self.manager.canonical_var(&self.ty)?;
        let f = self.node;
        self.manager.run(|state| Ok(state.well_formed(&var)? == f))
    }

    /// Whether both sets hold the same values.
    pub fn equals(&self, other: &StateSet) -> Result<bool> {
        self.check(other)?;
        Ok(self.node == other.node)
    }

    /// One member, found by a fixed walk that prefers high branches and
    /// reads unconstrained bits as false.
    pub fn element(&self) -> Result<Value> {
        let var = self.manager.canonical_var(&self.ty)?;
        let (ty, f) = (&self.ty, self.node);
        self.manager.run(|state| {
            let assignment = state.pick(f).ok_or(Error::EmptySet)?;
            let bits = state.var_bits(&var)?;
            state.decode(ty, &bits, &assignment)
        })
    }

    /// Number of values in the set.
    pub fn count(&self) -> Result<BigUint> {
        let var = self.manager.canonical_var(&self.ty)?;
        let f = self.node;
        self.manager.run(|state| {
            let k = state.var_bits(&var)?.len();
            let n = state.num_vars() as usize;
            Ok(state.bdd.sat_count(f, n) >> (n - k))
        })
    }

    pub fn contains(&self, value: &Value) -> Result<bool> {
        if value.ty() != self.ty {
            return Err(Error::mismatch("contains", self.ty.to_string(), &value.ty()));
        }
        let var = self.manager.canonical_var(&self.ty)?;
        let f = self.node;
        let encoded = value.to_bits()?;
        self.manager.run(|state| {
            let bits = state.var_bits(&var)?;
            let assignment = bits.into_iter().zip(encoded).collect();
            Ok(state.evaluate(f, &assignment))
        })
    }
}

/// A function given by its parameters and a body over them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    params: Vec<Expr>,
    body: Expr,
}

impl Function {
    pub fn new(params: Vec<Expr>, body: Expr) -> Result<Function> {
        if params.is_empty() {
            return Err(Error::InvalidValue("a function needs at least one parameter".into()));
        }
        for (i, p) in params.iter().enumerate() {
            if !p.is_var() {
                return Err(Error::NotAVariable(p.to_string()));
            }
            if !p.context().ptr_eq(body.context()) {
                return Err(Error::ContextMismatch);
            }
            if params[..i].contains(p) {
                return Err(Error::InvalidValue(format!("parameter {} is repeated", p)));
            }
        }
        Ok(Function { params, body })
    }

    /// Build a one-parameter function from a closure over a fresh variable.
    pub fn unary<F>(ctx: &Context, ty: Type, body: F) -> Result<Function>
    where
        F: FnOnce(&Expr) -> Result<Expr>,
    {
        let x = ctx.fresh(ty)?;
        let body = body(&x)?;
        Function::new(vec![x], body)
    }

    pub fn params(&self) -> &[Expr] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn context(&self) -> &Context {
        self.body.context()
    }

    /// The parameter type, or a tuple of them for several parameters.
    pub fn input_type(&self) -> Type {
        match self.params.as_slice() {
            [p] => p.ty().clone(),
            ps => Type::tuple(ps.iter().map(|p| p.ty().clone())),
        }
    }

    pub fn output_type(&self) -> &Type {
        self.body.ty()
    }

    /// The input as one expression, matching [`Function::input_type`].
    pub fn input(&self) -> Result<Expr> {
        match self.params.as_slice() {
            [p] => Ok(p.clone()),
            ps => self.context().tuple(ps.to_vec()),
        }
    }
}

/// The compiled relation of a function, shared by every [`Transformer`]
/// compiled from it in one manager.
#[derive(Debug)]
pub(crate) struct Relation {
    function: Function,
    input_ty: Type,
    output: Expr,
    input_bits: Vec<u32>,
    output_bits: Vec<u32>,
    node: Ref,
}

#[derive(Clone)]
pub struct Transformer {
    manager: Manager,
    relation: Arc<Relation>,
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("function", &self.relation.function)
            .field("node", &self.relation.node)
            .finish()
    }
}

impl Transformer {
    /// Compile `function` into the relation `{(in, out) | out = function(in)}`.
    ///
    /// Compiling the same function twice under one manager returns the
    /// same transformer.
    pub fn compile(function: &Function, manager: Option<&Manager>) -> Result<Transformer> {
        let manager = resolve(manager);
        let key = (function.params.clone(), function.body.clone());
        if let Some(relation) = manager.lock().relations.get(&key) {
            return Ok(Transformer {
                manager: manager.clone(),
                relation: relation.clone(),
            });
        }

        let input = function.input()?;
        let output = function.context().fresh(function.output_type().clone())?;
        let graph = output.eq(&function.body)?;

        let relation = manager.run(|state| {
            if let Some(relation) = state.relations.get(&key) {
                return Ok(relation.clone());
            }
            let f = state.compile_bool(&graph)?;
            let mut input_bits = Vec::new();
            for p in &function.params {
                input_bits.extend(state.var_bits(p)?);
            }
            let output_bits = state.var_bits(&output)?;
            let keep: Vec<u32> = input_bits.iter().chain(&output_bits).copied().collect();
            let f = state.project(f, &keep);
            let wf = state.well_formed_all(&function.params)?;
            let node = state.bdd.apply_and(f, wf);
            debug!(
                "compiled transformer over {} input and {} output bits, {} nodes",
                input_bits.len(),
                output_bits.len(),
                state.bdd.size(node)
            );
            let relation = Arc::new(Relation {
                function: function.clone(),
                input_ty: input.ty().clone(),
                output,
                input_bits,
                output_bits,
                node,
            });
            state.relations.insert(key, relation.clone());
            Ok(relation)
        })?;
        Ok(Transformer { manager, relation })
    }

    pub fn ptr_eq(&self, other: &Transformer) -> bool {
        self.manager.ptr_eq(&other.manager) && Arc::ptr_eq(&self.relation, &other.relation)
    }

    pub fn function(&self) -> &Function {
        &self.relation.function
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn input_type(&self) -> &Type {
        &self.relation.input_ty
    }

    pub fn output_type(&self) -> &Type {
        self.relation.output.ty()
    }

    /// Build `predicate(input, output)` over this transformer's variables.
    fn predicate<F>(&self, predicate: F) -> Result<Expr>
    where
        F: FnOnce(&Expr, &Expr) -> Result<Expr>,
    {
        let input = self.relation.function.input()?;
        predicate(&input, &self.relation.output)
    }

    /// Inputs having an output such that `predicate(input, output)` holds.
    pub fn input_set<F>(&self, predicate: F) -> Result<StateSet>
    where
        F: FnOnce(&Expr, &Expr) -> Result<Expr>,
    {
        let p = self.predicate(predicate)?;
        let r = self.relation.clone();
        let canonical = self.manager.canonical_var(&r.input_ty)?;
        let node = self.manager.run(|state| {
            let g = state.compile_bool(&p)?;
            let keep: Vec<u32> = r.input_bits.iter().chain(&r.output_bits).copied().collect();
            let g = state.project(g, &keep);
            let cube = state.bdd.mk_cube(r.output_bits.iter().copied());
            let f = state.bdd.and_exists(r.node, g, cube);
            let target = state.var_bits(&canonical)?;
            Ok(state.rename(f, &r.input_bits, &target))
        })?;
        Ok(StateSet {
            manager: self.manager.clone(),
            ty: r.input_ty.clone(),
            node,
        })
    }

    /// Outputs of inputs such that `predicate(input, output)` holds.
    pub fn output_set<F>(&self, predicate: F) -> Result<StateSet>
    where
        F: FnOnce(&Expr, &Expr) -> Result<Expr>,
    {
        let p = self.predicate(predicate)?;
        let r = self.relation.clone();
        let out_ty = r.output.ty().clone();
        let canonical = self.manager.canonical_var(&out_ty)?;
        let node = self.manager.run(|state| {
            let g = state.compile_bool(&p)?;
            let keep: Vec<u32> = r.input_bits.iter().chain(&r.output_bits).copied().collect();
            let g = state.project(g, &keep);
            let cube = state.bdd.mk_cube(r.input_bits.iter().copied());
            let f = state.bdd.and_exists(r.node, g, cube);
            let target = state.var_bits(&canonical)?;
            Ok(state.rename(f, &r.output_bits, &target))
        })?;
        Ok(StateSet {
            manager: self.manager.clone(),
            ty: out_ty,
            node,
        })
    }

    /// Image of `set`: every `f(x)` with `x` in `set`.
    pub fn transform_forward(&self, set: &StateSet) -> Result<StateSet> {
        if !self.manager.ptr_eq(&set.manager) {
            return Err(Error::ManagerMismatch);
        }
        let r = self.relation.clone();
        if set.ty != r.input_ty {
            return Err(Error::mismatch("transform_forward", r.input_ty.to_string(), &set.ty));
        }
        let out_ty = r.output.ty().clone();
        let source = self.manager.canonical_var(&set.ty)?;
        let target = self.manager.canonical_var(&out_ty)?;
        let s = set.node;
        let node = self.manager.run(|state| {
            let source = state.var_bits(&source)?;
            let s = state.rename(s, &source, &r.input_bits);
            let cube = state.bdd.mk_cube(r.input_bits.iter().copied());
            let f = state.bdd.and_exists(s, r.node, cube);
            let target = state.var_bits(&target)?;
            Ok(state.rename(f, &r.output_bits, &target))
        })?;
        Ok(StateSet {
            manager: self.manager.clone(),
            ty: out_ty,
            node,
        })
    }

    /// Pre-image of `set`: every `x` with `f(x)` in `set`.
    pub fn transform_backwards(&self, set: &StateSet) -> Result<StateSet> {
        if !self.manager.ptr_eq(&set.manager) {
            return Err(Error::ManagerMismatch);
        }
        let r = self.relation.clone();
        let out_ty = r.output.ty().clone();
        if set.ty != out_ty {
            return Err(Error::mismatch("transform_backwards", out_ty.to_string(), &set.ty));
        }
        let source = self.manager.canonical_var(&out_ty)?;
        let target = self.manager.canonical_var(&r.input_ty)?;
        let s = set.node;
        let node = self.manager.run(|state| {
            let source = state.var_bits(&source)?;
            let s = state.rename(s, &source, &r.output_bits);
            let cube = state.bdd.mk_cube(r.output_bits.iter().copied());
            let f = state.bdd.and_exists(s, r.node, cube);
            let target = state.var_bits(&target)?;
            Ok(state.rename(f, &r.input_bits, &target))
        })?;
        Ok(StateSet {
            manager: self.manager.clone(),
            ty: r.input_ty.clone(),
            node,
        })
    }
}
