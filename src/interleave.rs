//! Variable-order heuristic for the BDD backend.
//!
//! The expression is read as an "interacts-with" graph over the primitive
//! leaves of its free variables. Leaves that meet under equality, ordering,
//! arithmetic or bitwise operators, or as the two branches of one
//! conditional, land in the same union-find class. Composite values are
//! tracked leaf by leaf, so comparing two records only joins matching
//! fields.
//!
//! Each class becomes one group of adjacent BDD variables. Groups come out
//! in first-discovery order, and inside a group the bits of all member
//! leaves are interleaved, most significant first.

use log::debug;
use rustc_hash::FxHashMap;

use crate::expr::{Expr, Op};
use crate::types::{Leaf, Type, CHAR_WIDTH};

/// Bit `index` of a variable, in [`Value::to_bits`][crate::value::Value::to_bits] order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bit {
    pub var: Expr,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct Order {
    groups: Vec<Vec<Bit>>,
}

impl Order {
    pub fn groups(&self) -> &[Vec<Bit>] {
        &self.groups
    }

    /// All bits, root first.
    pub fn bits(&self) -> impl Iterator<Item = &Bit> {
        self.groups.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }
}

/// A primitive leaf of a free variable.
#[derive(Debug)]
struct Slot {
    var: Expr,
    offset: u32,
    width: u32,
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    fn add(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.size.push(1);
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return a;
        }
        let (big, small) = if self.size[a] >= self.size[b] { (a, b) } else { (b, a) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        big
    }
}

fn leaf_width(leaf: &Leaf) -> Option<u32> {
    match leaf {
        Leaf::Bool => Some(1),
        Leaf::Bits { width, .. } => Some(*width),
        Leaf::Char => Some(CHAR_WIDTH),
        _ => None,
    }
}

/// For every leaf of a node's value, the class of the variable leaves it is
/// derived from.
type Flow = Vec<Option<usize>>;

struct Analysis {
    slots: Vec<Slot>,
    classes: UnionFind,
    vars: FxHashMap<Expr, Flow>,
}

impl Analysis {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            classes: UnionFind::new(),
            vars: FxHashMap::default(),
        }
    }

    fn var(&mut self, var: &Expr) -> Flow {
        if let Some(flow) = self.vars.get(var) {
            return flow.clone();
        }
        let mut offset = 0;
        let mut flow = Vec::new();
        for leaf in var.ty().leaves() {
            match leaf_width(&leaf) {
                Some(width) => {
                    let id = self.classes.add();
                    debug_assert_eq!(id, self.slots.len());
                    self.slots.push(Slot {
                        var: var.clone(),
                        offset,
                        width,
                    });
                    flow.push(Some(id));
                    offset += width;
                }
                None => flow.push(None),
            }
        }
        self.vars.insert(var.clone(), flow.clone());
        flow
    }

    fn merge(&mut self, a: &[Option<usize>], b: &[Option<usize>]) -> Flow {
        a.iter()
            .zip(b)
            .map(|(x, y)| match (*x, *y) {
                (Some(x), Some(y)) => Some(self.classes.union(x, y)),
                (x, None) => x,
                (None, y) => y,
            })
            .collect()
    }

    fn flow(&mut self, e: &Expr, args: &[&Flow]) -> Flow {
        let none = |ty: &Type| vec![None; ty.num_leaves()];
        match e.op() {
            Op::Var { .. } => self.var(e),
            Op::Not | Op::BitNot | Op::Cast => args[0].clone(),
            Op::Ite => self.merge(args[1], args[2]),
            Op::Eq | Op::Lt | Op::Le => {
                self.merge(args[0], args[1]);
                vec![None]
            }
            Op::Add | Op::Sub | Op::Mul | Op::BitAnd | Op::BitOr | Op::BitXor => self.merge(args[0], args[1]),

            Op::Create => args.iter().flat_map(|f| f.iter().copied()).collect(),
            Op::GetField(i) => {
                let (start, len) = field_range(e.arg(0).ty(), *i);
                slice(args[0], start, len)
            }
            Op::WithField(i) => {
                let (start, len) = field_range(e.arg(0).ty(), *i);
                let mut flow = args[0].clone();
                for (k, f) in slice(args[1], 0, len).into_iter().enumerate() {
                    if let Some(slot) = flow.get_mut(start + k) {
                        *slot = f;
                    }
                }
                flow
            }

            Op::Some => std::iter::once(None).chain(args[0].iter().copied()).collect(),
            Op::IsSome => slice(args[0], 0, 1),
            Op::OptionValue => args[0].iter().skip(1).copied().collect(),

            Op::FSeqPushBack => {
                // Every slot may receive the pushed element.
                let k = args[1].len();
                let mut flow = args[0].clone();
                let mut start = 1;
                while start + k <= flow.len() {
                    let merged = self.merge(&flow[start..start + k], args[1]);
                    flow[start..start + k].copy_from_slice(&merged);
                    start += k;
                }
                flow
            }
            Op::FSeqLength => slice(args[0], 0, 1),
            Op::FSeqGet(i) => {
                let k = e.ty().num_leaves() - 1;
                let mut flow = slice(args[0], 0, 1);
                flow.extend(slice(args[0], 1 + *i as usize * k, k));
                flow
            }
            Op::FSeqContains => {
                let k = args[1].len();
                let mut start = 1;
                while start + k <= args[0].len() {
                    self.merge(&args[0][start..start + k], args[1]);
                    start += k;
                }
                vec![None]
            }

            _ => none(e.ty()),
        }
    }

    fn order(mut self) -> Order {
        let mut group_of: FxHashMap<usize, usize> = FxHashMap::default();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for id in 0..self.slots.len() {
            let root = self.classes.find(id);
            let g = *group_of.entry(root).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[g].push(id);
        }

        let groups = members
            .into_iter()
            .map(|ids| {
                let top = ids.iter().map(|&id| self.slots[id].width).max().unwrap_or(0);
                let mut bits = Vec::new();
                for k in (0..top).rev() {
                    for &id in &ids {
                        let slot = &self.slots[id];
                        if k < slot.width {
                            bits.push(Bit {
                                var: slot.var.clone(),
                                index: slot.offset + k,
                            });
                        }
                    }
                }
                bits
            })
            .collect();
        Order { groups }
    }
}

fn slice(flow: &[Option<usize>], start: usize, len: usize) -> Flow {
    flow.get(start..start + len)
        .map(<[_]>::to_vec)
        .unwrap_or_else(|| vec![None; len])
}

/// Leaf range of field `index` inside a tuple or record.
fn field_range(ty: &Type, index: usize) -> (usize, usize) {
    let fields = ty.field_types().unwrap_or_default();
    let start = fields.iter().take(index).map(Type::num_leaves).sum();
    let len = fields.get(index).map(Type::num_leaves).unwrap_or(0);
    (start, len)
}

/// Compute the interleaved variable order for `expr`.
pub fn order(expr: &Expr) -> Order {
    let mut analysis = Analysis::new();
    let mut memo: FxHashMap<u64, Flow> = FxHashMap::default();
    let mut stack = vec![(expr.clone(), false)];

    while let Some((e, expanded)) = stack.pop() {
        if memo.contains_key(&e.id()) {
            continue;
        }
        if !expanded && !e.args().is_empty() {
            stack.push((e.clone(), true));
            stack.extend(e.args().iter().rev().map(|a| (a.clone(), false)));
            continue;
        }
        let args: Vec<Flow> = e
            .args()
            .iter()
            .map(|a| memo.get(&a.id()).cloned().unwrap_or_default())
            .collect();
        let refs: Vec<&Flow> = args.iter().collect();
        let flow = analysis.flow(&e, &refs);
        memo.insert(e.id(), flow);
    }

    let order = analysis.order();
    debug!(
        "interleaved {} bits into {} groups",
        order.len(),
        order.groups().len()
    );
    order
}
