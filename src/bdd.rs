//! The BDD kernel: a reduced ordered BDD with complemented edges.
//!
//! Variables are 1-indexed `u32`s and the variable index *is* the level:
//! smaller indices are closer to the root. The kernel never reorders; the
//! [`Manager`][crate::manager::Manager] decides the order up front and simply
//! allocates indices in that order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing2, pairing3, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(
            self.variable as u64,
            self.low.unsigned() as u64,
            self.high.unsigned() as u64,
        )
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
enum OpKey {
    Ite(Ref, Ref, Ref),
    Exists(Ref, Ref),
    AndExists(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Ite(f, g, h) => pairing3(
                f.unsigned() as u64,
                g.unsigned() as u64,
                h.unsigned() as u64,
            ),
            OpKey::Exists(f, c) => pairing2(f.unsigned() as u64, c.unsigned() as u64) ^ 0x5555,
            OpKey::AndExists(f, g, c) => pairing3(
                f.unsigned() as u64,
                g.unsigned() as u64,
                c.unsigned() as u64,
            )
            .rotate_left(17),
        }
    }
}

pub struct Bdd {
    storage: RefCell<Table<Node>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(storage_bits: usize, cache_bits: usize) -> Self {
        let mut storage = Table::new(storage_bits);

        // Allocate the terminal node:
        let one = storage.add(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);
        let zero = -one;

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(cache_bits)),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16, 16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("size", &storage.size())
            .field("buckets", &storage.num_buckets())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    /// Number of allocated nodes, including the terminal.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    pub fn variable(&self, index: usize) -> u32 {
        self.storage.borrow().value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    /// Level of the top variable of `node`, `u32::MAX` for terminals.
    fn level(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.variable(node.index())
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        trace!("mk(v = {}, low = {}, high = {})", v, low, high);

        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let i = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        });
        Ref::positive(i as u32)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of positive literals, used as a quantification set.
    pub fn mk_cube(&self, vars: impl IntoIterator<Item = u32>) -> Ref {
        let mut vars = vars.into_iter().collect::<Vec<_>>();
        vars.sort_unstable();
        vars.dedup();
        let mut current = self.one;
        for &v in vars.iter().rev() {
            current = self.mk_node(v, self.zero, current);
        }
        current
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        if self.is_terminal(node) || v < self.variable(node.index()) {
            return (node, node);
        }
        assert_eq!(v, self.variable(node.index()));
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        trace!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        let i = self.level(f);
        let j = self.level(g);
        let k = self.level(h);

        // Equivalent pairs (choose the one with the lowest variable):
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        if self.is_one(g) && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let m = self.level(f).min(self.level(g)).min(self.level(h));
        assert_ne!(m, u32::MAX);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    /// Skip the cube variables above `level`.
    fn advance_cube(&self, mut cube: Ref, level: u32) -> Ref {
        while !self.is_one(cube) && self.variable(cube.index()) < level {
            cube = self.high_node(cube);
        }
        cube
    }

    /// Existential quantification `∃ cube. f`.
    pub fn exists(&self, f: Ref, cube: Ref) -> Ref {
        if self.is_terminal(f) || self.is_one(cube) {
            return f;
        }

        let v = self.variable(f.index());
        let cube = self.advance_cube(cube, v);
        if self.is_one(cube) {
            return f;
        }

        let key = OpKey::Exists(f, cube);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return res;
        }

        let (f0, f1) = (self.low_node(f), self.high_node(f));
        let res = if self.variable(cube.index()) == v {
            let rest = self.high_node(cube);
            let r0 = self.exists(f0, rest);
            if self.is_one(r0) {
                self.one
            } else {
                let r1 = self.exists(f1, rest);
                self.apply_or(r0, r1)
            }
        } else {
            let r0 = self.exists(f0, cube);
            let r1 = self.exists(f1, cube);
            self.mk_node(v, r0, r1)
        };

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Relational product `∃ cube. f ∧ g`, without building `f ∧ g` first.
    pub fn and_exists(&self, f: Ref, g: Ref, cube: Ref) -> Ref {
        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return self.zero;
        }
        if self.is_one(f) {
            return self.exists(g, cube);
        }
        if self.is_one(g) || f == g {
            return self.exists(f, cube);
        }
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        // Conjunction is commutative: normalize the key.
        let (f, g) = if f.raw() <= g.raw() { (f, g) } else { (g, f) };

        let top = self.level(f).min(self.level(g));
        let cube = self.advance_cube(cube, top);
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        let key = OpKey::AndExists(f, g, cube);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return res;
        }

        let (f0, f1) = self.top_cofactors(f, top);
        let (g0, g1) = self.top_cofactors(g, top);
        let res = if self.variable(cube.index()) == top {
            let rest = self.high_node(cube);
            let r0 = self.and_exists(f0, g0, rest);
            if self.is_one(r0) {
                self.one
            } else {
                let r1 = self.and_exists(f1, g1, rest);
                self.apply_or(r0, r1)
            }
        } else {
            let r0 = self.and_exists(f0, g0, cube);
            let r1 = self.and_exists(f1, g1, cube);
            self.mk_node(top, r0, r1)
        };

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Simultaneously rename variables of `f` according to `map`.
    ///
    /// Variables absent from `map` are kept. The targets must not occur in `f`
    /// unless they are themselves renamed; the result is rebuilt with ITE, so
    /// the mapping need not preserve the order.
    pub fn rename(&self, f: Ref, map: &FxHashMap<u32, u32>) -> Ref {
        debug!("rename(f = {}, {} variables)", f, map.len());
        let mut cache = HashMap::new();
        self.rename_(f, map, &mut cache)
    }

    fn rename_(&self, f: Ref, map: &FxHashMap<u32, u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if f.is_negated() {
            return -self.rename_(-f, map, cache);
        }
        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let v = self.variable(f.index());
        let low = self.rename_(self.low(f.index()), map, cache);
        let high = self.rename_(self.high(f.index()), map, cache);
        let target = map.get(&v).copied().unwrap_or(v);
        let res = self.apply_ite(self.mk_var(target), high, low);
        cache.insert(f, res);
        res
    }

    /// Number of distinct nodes reachable from `f`, terminal included.
    pub fn size(&self, f: Ref) -> usize {
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![f.index()];
        while let Some(i) = stack.pop() {
            if visited.insert(i) && i != self.one.index() {
                stack.push(self.low(i).index());
                stack.push(self.high(i).index());
            }
        }
        visited.len()
    }

    /// Set of variables `f` depends on, in increasing order.
    pub fn support(&self, f: Ref) -> Vec<u32> {
        let mut visited = std::collections::HashSet::new();
        let mut vars = std::collections::BTreeSet::new();
        let mut stack = vec![f.regular()];
        while let Some(node) = stack.pop() {
            if self.is_terminal(node) || !visited.insert(node.index()) {
                continue;
            }
            vars.insert(self.variable(node.index()));
            stack.push(self.low(node.index()).regular());
            stack.push(self.high(node.index()).regular());
        }
        vars.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);

        assert_eq!(bdd.variable(x.index()), 1);
        assert_eq!(bdd.high_node(x), bdd.one);
        assert_eq!(bdd.low_node(x), bdd.zero);
    }

    #[test]
    fn test_not_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let not_x = -x;

        assert_eq!(bdd.variable(not_x.index()), 1);
        assert_eq!(bdd.high_node(not_x), bdd.zero);
        assert_eq!(bdd.low_node(not_x), bdd.one);
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();

        assert!(bdd.is_terminal(bdd.zero));
        assert!(bdd.is_zero(bdd.zero));
        assert!(!bdd.is_one(bdd.zero));
        assert!(bdd.is_one(bdd.one));
        assert_eq!(bdd.variable(bdd.one.index()), 0);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        assert_eq!(-bdd.apply_and(x, y), bdd.apply_or(-x, -y));
        assert_eq!(-bdd.apply_or(x, y), bdd.apply_and(-x, -y));
    }

    #[test]
    fn test_xor_itself() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, y);

        assert_eq!(bdd.apply_xor(f, f), bdd.zero);
        assert_eq!(bdd.apply_xor(f, -f), bdd.one);
    }

    #[test]
    fn test_apply_ite() {
        let bdd = Bdd::default();

        let g = bdd.mk_var(2);
        let h = bdd.mk_var(3);
        assert_eq!(bdd.apply_ite(bdd.one, g, h), g);
        assert_eq!(bdd.apply_ite(bdd.zero, g, h), h);

        let f = bdd.mk_node(1, bdd.one, h);
        assert_eq!(bdd.apply_ite(f, f, h), bdd.apply_or(f, h));
        assert_eq!(bdd.apply_ite(f, g, f), bdd.apply_and(f, g));
        assert_eq!(bdd.apply_ite(f, -g, bdd.one), -bdd.apply_and(f, g));

        let f = bdd.mk_var(6);
        let g = bdd.mk_var(7);
        let h = bdd.mk_var(8);
        let result = bdd.mk_node(bdd.variable(f.index()), -g, -h);
        assert_eq!(bdd.apply_ite(-f, -g, -h), result);
    }

    #[test]
    fn test_cube() {
        let bdd = Bdd::default();
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);
        let f = bdd.apply_and_many([x1, x2, x3]);
        assert_eq!(bdd.mk_cube([3, 1, 2, 2]), f);
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        // ∃x2. (x1 ∧ x2) ∨ (¬x2 ∧ x3) = x1 ∨ x3
        let f = bdd.apply_or(bdd.apply_and(x1, x2), bdd.apply_and(-x2, x3));
        let r = bdd.exists(f, bdd.mk_cube([2]));
        assert_eq!(r, bdd.apply_or(x1, x3));

        // ∃x1,x2,x3. f = 1
        assert_eq!(bdd.exists(f, bdd.mk_cube([1, 2, 3])), bdd.one);
    }

    #[test]
    fn test_and_exists_matches_naive() {
        let bdd = Bdd::default();
        let x: Vec<Ref> = (1..=6).map(|v| bdd.mk_var(v)).collect();
        let f = bdd.apply_or(bdd.apply_and(x[0], x[3]), bdd.apply_xor(x[1], x[4]));
        let g = bdd.apply_and(bdd.apply_eq(x[0], x[2]), bdd.apply_or(-x[4], x[5]));
        for cube in [vec![1], vec![1, 2], vec![3, 5], vec![1, 2, 3, 4, 5, 6], vec![]] {
            let c = bdd.mk_cube(cube.clone());
            let naive = bdd.exists(bdd.apply_and(f, g), c);
            assert_eq!(bdd.and_exists(f, g, c), naive, "cube = {:?}", cube);
        }
    }

    #[test]
    fn test_rename_reverses_order() {
        let bdd = Bdd::default();
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let f = bdd.apply_and(x1, -x2);

        let mut map = FxHashMap::default();
        map.insert(1, 4);
        map.insert(2, 3);
        let g = bdd.rename(f, &map);
        assert_eq!(g, bdd.apply_and(bdd.mk_var(4), -bdd.mk_var(3)));
    }

    #[test]
    fn test_support_and_size() {
        let bdd = Bdd::default();
        let x1 = bdd.mk_var(1);
        let x5 = bdd.mk_var(5);
        let f = bdd.apply_xor(x1, x5);
        assert_eq!(bdd.support(f), vec![1, 5]);
        assert_eq!(bdd.size(f), 3);
        assert_eq!(bdd.support(bdd.one), Vec::<u32>::new());
    }
}
