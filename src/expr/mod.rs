//! Hash-consed typed expressions.
//!
//! Every [`Expr`] is created through [`Context::make`], which runs the
//! simplifier and then interns the node, so structurally equal trees built
//! in the same context share one instance while any of them is alive.

mod build;
mod context;
mod simplify;
mod table;
mod typing;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub use self::context::Context;
pub(crate) use self::table::NodeKey;

use crate::regex::Regex;
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Const(Value),
    Var { index: u64, name: Option<Arc<str>> },

    Not,
    And,
    Or,
    Ite,
    Eq,

    Lt,
    Le,
    Add,
    Sub,
    Mul,

    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    /// Convert between bit-vector types; the target is the node type.
    Cast,

    /// Build a tuple or record of the node type from its fields.
    Create,
    GetField(usize),
    WithField(usize),

    Some,
    IsSome,
    OptionValue,

    MapGet,
    MapSet,

    SetAdd,
    SetRemove,
    SetContains,
    SetUnion,
    SetIntersect,
    SetDifference,

    SeqUnit,
    SeqConcat,
    SeqLength,
    SeqAt,
    SeqContains,
    SeqStartsWith,
    SeqEndsWith,
    SeqReplaceFirst,
    SeqSlice,
    SeqIndexOf,
    RegexMatch(Regex),

    FSeqPushBack,
    FSeqLength,
    FSeqGet(u32),
    FSeqContains,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Const(_) => "const",
            Op::Var { .. } => "var",
            Op::Not => "not",
            Op::And => "and",
            Op::Or => "or",
            Op::Ite => "ite",
            Op::Eq => "eq",
            Op::Lt => "lt",
            Op::Le => "le",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::BitAnd => "bitand",
            Op::BitOr => "bitor",
            Op::BitXor => "bitxor",
            Op::BitNot => "bitnot",
            Op::Cast => "cast",
            Op::Create => "create",
            Op::GetField(_) => "get_field",
            Op::WithField(_) => "with_field",
            Op::Some => "some",
            Op::IsSome => "is_some",
            Op::OptionValue => "option_value",
            Op::MapGet => "map_get",
            Op::MapSet => "map_set",
            Op::SetAdd => "set_add",
            Op::SetRemove => "set_remove",
            Op::SetContains => "set_contains",
            Op::SetUnion => "set_union",
            Op::SetIntersect => "set_intersect",
            Op::SetDifference => "set_difference",
            Op::SeqUnit => "seq_unit",
            Op::SeqConcat => "seq_concat",
            Op::SeqLength => "seq_length",
            Op::SeqAt => "seq_at",
            Op::SeqContains => "seq_contains",
            Op::SeqStartsWith => "seq_starts_with",
            Op::SeqEndsWith => "seq_ends_with",
            Op::SeqReplaceFirst => "seq_replace_first",
            Op::SeqSlice => "seq_slice",
            Op::SeqIndexOf => "seq_index_of",
            Op::RegexMatch(_) => "regex_match",
            Op::FSeqPushBack => "fseq_push_back",
            Op::FSeqLength => "fseq_length",
            Op::FSeqGet(_) => "fseq_get",
            Op::FSeqContains => "fseq_contains",
        }
    }

    /// Whether the operands may be swapped without changing the result.
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            Op::And
                | Op::Or
                | Op::Eq
                | Op::Add
                | Op::Mul
                | Op::BitAnd
                | Op::BitOr
                | Op::BitXor
                | Op::SetUnion
                | Op::SetIntersect
        )
    }
}

pub(crate) struct Node {
    ctx: Context,
    key: NodeKey,
    args: Vec<Expr>,
    id: u64,
}

impl Drop for Node {
    fn drop(&mut self) {
        self.ctx.forget(&self.key);

        // Release the operands iteratively, so dropping a deep chain
        // does not recurse once per level.
        let mut stack = std::mem::take(&mut self.args);
        while let Some(e) = stack.pop() {
            if let Some(mut node) = Arc::into_inner(e.0) {
                stack.append(&mut node.args);
            }
        }
    }
}

/// Handle to an interned expression node.
///
/// Cloning is cheap. Equality and hashing use node identity, which
/// coincides with structural equality within one [`Context`].
#[derive(Clone)]
pub struct Expr(Arc<Node>);

impl Expr {
    /// Dense identity, unique within the context and never reused.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn ty(&self) -> &Type {
        &self.0.key.ty
    }

    pub fn op(&self) -> &Op {
        &self.0.key.op
    }

    pub fn args(&self) -> &[Expr] {
        &self.0.args
    }

    pub fn arg(&self, i: usize) -> &Expr {
        &self.0.args[i]
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self.op() {
            Op::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_const()?.as_bool()
    }

    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.as_bool() == Some(false)
    }

    pub fn is_var(&self) -> bool {
        matches!(self.op(), Op::Var { .. })
    }

    /// Generation index of a variable.
    pub fn var_index(&self) -> Option<u64> {
        match self.op() {
            Op::Var { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self.op() {
            Op::Var { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    /// Free variables in first-occurrence order (depth-first, left to right).
    pub fn vars(&self) -> Vec<Expr> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(e) = stack.pop() {
            if !seen.insert(e.id()) {
                continue;
            }
            if e.is_var() {
                out.push(e.clone());
            }
            stack.extend(e.args().iter().rev().cloned());
        }
        out
    }

    /// Number of distinct nodes in the DAG.
    pub fn dag_size(&self) -> usize {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            if seen.insert(e.id()) {
                stack.extend(e.args());
            }
        }
        seen.len()
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Op::Const(v) => write!(f, "{}", v),
            Op::Var { index, name } => match name {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "v{}", index),
            },
            op => {
                write!(f, "({}", op.name())?;
                match op {
                    Op::GetField(i) | Op::WithField(i) => write!(f, "[{}]", i)?,
                    Op::FSeqGet(i) => write!(f, "[{}]", i)?,
                    Op::Cast => write!(f, "<{}>", self.ty())?,
                    Op::RegexMatch(r) => write!(f, "<{}>", r)?,
                    _ => {}
                }
                for a in self.args() {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}
