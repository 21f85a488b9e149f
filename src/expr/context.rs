use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use super::table::{NodeKey, NodeTable};
use super::{simplify, typing, Expr, Node, Op};
use crate::error::{Error, Result};
use crate::types::Type;
use crate::value::Value;

struct Inner {
    table: NodeTable,
    next_id: AtomicU64,
    next_var: AtomicU64,
}

/// Expression session: the node table plus the generation counters.
///
/// Expressions from different contexts never mix. Library code always takes
/// the context from its operands; [`Context::global`] exists for callers that
/// do not care about isolation.
#[derive(Clone)]
pub struct Context(Arc<Inner>);

impl Context {
    pub fn new() -> Self {
        Context(Arc::new(Inner {
            table: NodeTable::new(),
            next_id: AtomicU64::new(0),
            next_var: AtomicU64::new(0),
        }))
    }

    /// The process-wide default context.
    pub fn global() -> &'static Context {
        static GLOBAL: OnceLock<Context> = OnceLock::new();
        GLOBAL.get_or_init(Context::new)
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of node-table slots, live or not yet reclaimed.
    pub fn table_len(&self) -> usize {
        self.0.table.len()
    }

    pub(super) fn forget(&self, key: &NodeKey) {
        self.0.table.forget(key);
    }

    /// Build a node: type-check, simplify, then intern.
    pub fn make(&self, op: Op, args: Vec<Expr>) -> Result<Expr> {
        if args.iter().any(|a| !a.context().ptr_eq(self)) {
            return Err(Error::ContextMismatch);
        }
        let ty = typing::result_type(&op, &args)?;
        self.build(op, args, ty)
    }

    /// Build a node whose result type is given explicitly (casts, creation).
    pub fn make_typed(&self, op: Op, args: Vec<Expr>, ty: Type) -> Result<Expr> {
        if args.iter().any(|a| !a.context().ptr_eq(self)) {
            return Err(Error::ContextMismatch);
        }
        typing::check_typed(&op, &args, &ty)?;
        self.build(op, args, ty)
    }

    fn build(&self, op: Op, args: Vec<Expr>, ty: Type) -> Result<Expr> {
        if let Some(e) = simplify::rewrite(self, &op, &args, &ty)? {
            return Ok(e);
        }
        Ok(self.intern(op, args, ty))
    }

    fn intern(&self, op: Op, args: Vec<Expr>, ty: Type) -> Expr {
        let key = NodeKey {
            op,
            args: args.iter().map(Expr::id).collect(),
            ty,
        };
        self.0.table.get_or_insert(key, |key| Node {
            ctx: self.clone(),
            key,
            args,
            id: self.0.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub fn constant(&self, value: Value) -> Expr {
        let ty = value.ty();
        self.intern(Op::Const(value), Vec::new(), ty)
    }

    pub fn bool(&self, b: bool) -> Expr {
        self.constant(Value::Bool(b))
    }

    pub fn tt(&self) -> Expr {
        self.bool(true)
    }

    pub fn ff(&self) -> Expr {
        self.bool(false)
    }

    /// A fresh free variable of type `ty`.
    pub fn var(&self, ty: Type, name: &str) -> Result<Expr> {
        self.new_var(ty, Some(Arc::from(name)))
    }

    /// A fresh anonymous free variable of type `ty`.
    pub fn fresh(&self, ty: Type) -> Result<Expr> {
        self.new_var(ty, None)
    }

    fn new_var(&self, ty: Type, name: Option<Arc<str>>) -> Result<Expr> {
        ty.validate()?;
        let index = self.0.next_var.fetch_add(1, Ordering::Relaxed);
        Ok(self.intern(Op::Var { index, name }, Vec::new(), ty))
    }

    pub fn tuple(&self, fields: Vec<Expr>) -> Result<Expr> {
        let ty = Type::tuple(fields.iter().map(|f| f.ty().clone()));
        self.make_typed(Op::Create, fields, ty)
    }

    pub fn record(&self, ty: &Type, fields: Vec<Expr>) -> Result<Expr> {
        self.make_typed(Op::Create, fields, ty.clone())
    }

    pub fn some(&self, value: &Expr) -> Result<Expr> {
        self.make(Op::Some, vec![value.clone()])
    }

    pub fn none(&self, inner: Type) -> Result<Expr> {
        Type::option(inner.clone()).validate()?;
        Ok(self.constant(Value::none(inner)))
    }

    pub fn seq_unit(&self, value: &Expr) -> Result<Expr> {
        self.make(Op::SeqUnit, vec![value.clone()])
    }

    pub fn string(&self, s: &str) -> Result<Expr> {
        Ok(self.constant(Value::string(s)?))
    }

    pub fn and_all(&self, exprs: impl IntoIterator<Item = Expr>) -> Result<Expr> {
        exprs.into_iter().try_fold(self.tt(), |acc, e| acc.and(&e))
    }

    pub fn or_all(&self, exprs: impl IntoIterator<Item = Expr>) -> Result<Expr> {
        exprs.into_iter().try_fold(self.ff(), |acc, e| acc.or(&e))
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("slots", &self.table_len())
            .field("nodes", &self.0.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
