//! BDD sessions.
//!
//! A [`Manager`] owns one [`Bdd`] kernel together with everything that must
//! agree on its variable order: the bit allocation of every variable it has
//! seen, the compiled-expression cache, one canonical variable per type (the
//! range state sets live in) and the transformer cache. References produced
//! by one manager mean nothing to another, so objects from different
//! managers are never combined.
//!
//! All state sits behind one mutex and every public operation takes it
//! exactly once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use log::debug;
use rustc_hash::FxHashMap;

use crate::bdd::Bdd;
use crate::error::{Error, Result};
use crate::expr::{Context, Expr};
use crate::interleave::Order;
use crate::reference::Ref;
use crate::stateset::Relation;
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct BddConfig {
    /// Initial unique-table size, as a power of two.
    pub storage_bits: usize,
    /// Computed-table size, as a power of two.
    pub cache_bits: usize,
    /// Run compilation and image computation on a dedicated thread.
    pub large_stack: bool,
    /// Stack size of that thread, in bytes.
    pub stack_size: usize,
}

impl Default for BddConfig {
    fn default() -> Self {
        Self {
            storage_bits: 16,
            cache_bits: 16,
            large_stack: false,
            stack_size: 256 << 20,
        }
    }
}

impl BddConfig {
    pub fn with_storage_bits(mut self, bits: usize) -> Self {
        self.storage_bits = bits;
        self
    }

    pub fn with_cache_bits(mut self, bits: usize) -> Self {
        self.cache_bits = bits;
        self
    }

    pub fn with_large_stack(mut self, large_stack: bool) -> Self {
        self.large_stack = large_stack;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }
}

pub(crate) struct State {
    pub(crate) bdd: Bdd,
    num_vars: u32,
    bits: FxHashMap<Expr, Vec<u32>>,
    wf: FxHashMap<Expr, Ref>,
    pub(crate) compiled: FxHashMap<Expr, Vec<Ref>>,
    pub(crate) relations: FxHashMap<(Vec<Expr>, Expr), Arc<Relation>>,
}

struct Shared {
    config: BddConfig,
    context: Context,
    canonical: Mutex<FxHashMap<Type, Expr>>,
    state: Mutex<State>,
}

/// Handle to a BDD session. Cloning shares the session.
#[derive(Clone)]
pub struct Manager(Arc<Shared>);

impl Default for Manager {
    fn default() -> Self {
        Manager::new()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Manager")
            .field("vars", &state.num_vars)
            .field("compiled", &state.compiled.len())
            .field("bdd", &state.bdd)
            .finish()
    }
}

impl Manager {
    pub fn new() -> Self {
        Manager::with_config(BddConfig::default())
    }

    pub fn with_config(config: BddConfig) -> Self {
        debug!("new manager with {:?}", config);
        let bdd = Bdd::new(config.storage_bits, config.cache_bits);
        Manager(Arc::new(Shared {
            config,
            context: Context::new(),
            canonical: Mutex::new(FxHashMap::default()),
            state: Mutex::new(State {
                bdd,
                num_vars: 0,
                bits: FxHashMap::default(),
                wf: FxHashMap::default(),
                compiled: FxHashMap::default(),
                relations: FxHashMap::default(),
            }),
        }))
    }

    /// The process-wide default manager.
    ///
    /// A manager holds every expression it has compiled, and every function
    /// it has turned into a transformer, until [`Manager::clear_caches`].
    /// The global one is never dropped, so long-running callers should
    /// either clear it from time to time or pass their own manager.
    pub fn global() -> &'static Manager {
        static GLOBAL: OnceLock<Manager> = OnceLock::new();
        GLOBAL.get_or_init(Manager::new)
    }

    pub fn ptr_eq(&self, other: &Manager) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn config(&self) -> &BddConfig {
        &self.0.config
    }

    /// Context holding the canonical variables of this manager.
    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Number of BDD variables allocated so far.
    pub fn num_vars(&self) -> u32 {
        self.lock().num_vars
    }

    pub fn num_nodes(&self) -> usize {
        self.lock().bdd.num_nodes()
    }

    /// Drop the compiled-expression and transformer caches.
    ///
    /// Bit allocations and well-formedness constraints stay, so existing
    /// state sets and transformers remain valid. Later compilations rebuild
    /// the same BDD nodes.
    pub fn clear_caches(&self) {
        let mut state = self.lock();
        debug!(
            "clearing {} compiled expressions and {} relations",
            state.compiled.len(),
            state.relations.len()
        );
        state.compiled.clear();
        state.relations.clear();
    }

    /// BDD variables of `var`, in [`Value::to_bits`] order, if allocated.
    pub fn bits_of(&self, var: &Expr) -> Option<Vec<u32>> {
        self.lock().bits.get(var).cloned()
    }

    /// The variable whose bits form the canonical range of `ty`.
    pub fn canonical_var(&self, ty: &Type) -> Result<Expr> {
        let mut canonical = self.0.canonical.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(var) = canonical.get(ty) {
            return Ok(var.clone());
        }
        let var = self.0.context.fresh(ty.clone())?;
        canonical.insert(ty.clone(), var.clone());
        Ok(var)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, on a large-stack thread if configured.
    pub(crate) fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut State) -> Result<T> + Send,
    {
        self.run_on(self.0.config.large_stack, f)
    }

    pub(crate) fn run_on<T, F>(&self, large_stack: bool, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut State) -> Result<T> + Send,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !large_stack {
            return f(state);
        }
        std::thread::scope(|scope| {
            let handle = std::thread::Builder::new()
                .name("symlogic-bdd".into())
                .stack_size(self.0.config.stack_size)
                .spawn_scoped(scope, move || f(state))?;
            handle.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload))
        })
    }
}

impl State {
    pub(crate) fn num_vars(&self) -> u32 {
        self.num_vars
    }

    /// Allocate fresh BDD variables for every bit in `order` that has none.
    ///
    /// Variables that are already allocated keep their positions.
    pub(crate) fn allocate(&mut self, order: &Order) {
        let before = self.num_vars;
        for bit in order.bits() {
            let allocated = self
                .bits
                .get(&bit.var)
                .and_then(|bits| bits.get(bit.index as usize))
                .is_some_and(|&v| v != 0);
            if allocated {
                continue;
            }
            let width = bit.var.ty().bit_width().unwrap_or(0) as usize;
            let bits = self.bits.entry(bit.var.clone()).or_insert_with(|| vec![0; width]);
            if let Some(slot) = bits.get_mut(bit.index as usize) {
                self.num_vars += 1;
                *slot = self.num_vars;
            }
        }
        if self.num_vars > before {
            debug!("allocated variables {}..={}", before + 1, self.num_vars);
        }
    }

    /// BDD variables of `var`, allocating any missing ones last in the order.
    pub(crate) fn var_bits(&mut self, var: &Expr) -> Result<Vec<u32>> {
        if !var.is_var() {
            return Err(Error::NotAVariable(var.to_string()));
        }
        let width = var.ty().bit_width().ok_or_else(|| Error::UnsupportedType {
            backend: "bdd",
            ty: var.ty().clone(),
        })? as usize;
        let bits = self.bits.entry(var.clone()).or_insert_with(|| vec![0; width]);
        for slot in bits.iter_mut().filter(|b| **b == 0) {
            self.num_vars += 1;
            *slot = self.num_vars;
        }
        Ok(bits.clone())
    }

    /// Well-formedness constraint of `var`'s encoding.
    pub(crate) fn well_formed(&mut self, var: &Expr) -> Result<Ref> {
        if let Some(&wf) = self.wf.get(var) {
            return Ok(wf);
        }
        let bits = self.var_bits(var)?;
        let refs: Vec<Ref> = bits.iter().map(|&v| self.bdd.mk_var(v)).collect();
        let wf = crate::compile::well_formed(&self.bdd, var.ty(), &refs)?;
        self.wf.insert(var.clone(), wf);
        Ok(wf)
    }

    /// Conjunction of the well-formedness constraints of `vars`.
    pub(crate) fn well_formed_all(&mut self, vars: &[Expr]) -> Result<Ref> {
        let mut acc = self.bdd.one;
        for var in vars {
            let wf = self.well_formed(var)?;
            acc = self.bdd.apply_and(acc, wf);
        }
        Ok(acc)
    }

    /// Existentially quantify every variable of `f` not in `keep`.
    pub(crate) fn project(&self, f: Ref, keep: &[u32]) -> Ref {
        let drop: Vec<u32> = self
            .bdd
            .support(f)
            .into_iter()
            .filter(|v| !keep.contains(v))
            .collect();
        if drop.is_empty() {
            return f;
        }
        self.bdd.exists(f, self.bdd.mk_cube(drop))
    }

    /// Move `f` from the variables `from` to the variables `to`, pairwise.
    pub(crate) fn rename(&self, f: Ref, from: &[u32], to: &[u32]) -> Ref {
        let map: FxHashMap<u32, u32> = from
            .iter()
            .copied()
            .zip(to.iter().copied())
            .filter(|(a, b)| a != b)
            .collect();
        if map.is_empty() {
            return f;
        }
        self.bdd.rename(f, &map)
    }

    /// Decode the value of type `ty` stored in `bits` under a partial
    /// assignment; unassigned bits read as false.
    pub(crate) fn decode(&self, ty: &Type, bits: &[u32], assignment: &FxHashMap<u32, bool>) -> Result<Value> {
        let bools: Vec<bool> = bits
            .iter()
            .map(|v| assignment.get(v).copied().unwrap_or(false))
            .collect();
        Value::from_bits(ty, &bools)
    }

    /// One satisfying assignment of `f`, high branches first.
    pub(crate) fn pick(&self, f: Ref) -> Option<FxHashMap<u32, bool>> {
        let path = self.bdd.one_sat(f)?;
        Some(path.into_iter().map(|lit| (lit.unsigned_abs(), lit > 0)).collect())
    }

    /// Value of `f` under a total assignment of its support.
    pub(crate) fn evaluate(&self, f: Ref, assignment: &FxHashMap<u32, bool>) -> bool {
        let mut node = f;
        while !self.bdd.is_terminal(node) {
            let v = self.bdd.variable(node.index());
            node = if assignment.get(&v).copied().unwrap_or(false) {
                self.bdd.high_node(node)
            } else {
                self.bdd.low_node(node)
            };
        }
        self.bdd.is_one(node)
    }
}
