//! One entry point over both backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::manager::Manager;
use crate::smt::{self, DebugSink, Objective, ProcessSolver, SmtConfig, SmtOutcome, SmtSolver};
use crate::value::Value;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Backend {
    #[default]
    Smt,
    Bdd,
}

#[derive(Clone)]
pub struct SolveConfig {
    pub backend: Backend,
    /// SMT only.
    pub timeout: Option<Duration>,
    /// Receives the SMT query text.
    pub debug: Option<DebugSink>,
    /// SMT only.
    pub objective: Option<Objective>,
    pub solver: Arc<dyn SmtSolver>,
    /// BDD only.
    pub large_stack: bool,
    /// BDD only; `None` means [`Manager::global`].
    pub manager: Option<Manager>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Smt,
            timeout: None,
            debug: None,
            objective: None,
            solver: Arc::new(ProcessSolver::default()),
            large_stack: false,
            manager: None,
        }
    }
}

impl fmt::Debug for SolveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolveConfig")
            .field("backend", &self.backend)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug.is_some())
            .field("objective", &self.objective)
            .field("solver", &self.solver.name())
            .field("large_stack", &self.large_stack)
            .field("manager", &self.manager)
            .finish()
    }
}

impl SolveConfig {
    pub fn smt() -> Self {
        Self::default()
    }

    pub fn bdd() -> Self {
        Self {
            backend: Backend::Bdd,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_debug(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.debug = Some(Arc::new(sink));
        self
    }

    pub fn maximize(mut self, e: &Expr) -> Self {
        self.objective = Some(Objective::Maximize(e.clone()));
        self
    }

    pub fn minimize(mut self, e: &Expr) -> Self {
        self.objective = Some(Objective::Minimize(e.clone()));
        self
    }

    pub fn with_solver(mut self, solver: impl SmtSolver + 'static) -> Self {
        self.solver = Arc::new(solver);
        self
    }

    pub fn with_large_stack(mut self, large_stack: bool) -> Self {
        self.large_stack = large_stack;
        self
    }

    pub fn with_manager(mut self, manager: &Manager) -> Self {
        self.manager = Some(manager.clone());
        self
    }

    fn smt_config(&self) -> SmtConfig {
        SmtConfig {
            timeout: self.timeout,
            debug: self.debug.clone(),
            objective: self.objective.clone(),
            solver: self.solver.clone(),
        }
    }
}

/// Result of a solve: a model, or the verdict that none exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    model: Option<HashMap<Expr, Value>>,
}

impl Solution {
    pub fn unsat() -> Self {
        Self { model: None }
    }

    pub fn sat(model: HashMap<Expr, Value>) -> Self {
        Self { model: Some(model) }
    }

    pub fn is_satisfiable(&self) -> bool {
        self.model.is_some()
    }

    /// Value of `var` in the model; variables the query never mentioned
    /// take their type's default.
    pub fn get(&self, var: &Expr) -> Result<Value> {
        if !var.is_var() {
            return Err(Error::NotAVariable(var.to_string()));
        }
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::InvalidValue("an unsatisfiable query has no model".into()))?;
        Ok(model.get(var).cloned().unwrap_or_else(|| var.ty().default_value()))
    }

    pub fn model(&self) -> Option<&HashMap<Expr, Value>> {
        self.model.as_ref()
    }
}

/// Decide the boolean `expr` with the configured backend.
pub fn solve(expr: &Expr, config: &SolveConfig) -> Result<Solution> {
    match config.backend {
        Backend::Smt => solve_smt(expr, config),
        Backend::Bdd => solve_bdd(expr, config),
    }
}

pub fn solve_smt(expr: &Expr, config: &SolveConfig) -> Result<Solution> {
    Ok(match smt::check(expr, &config.smt_config())? {
        SmtOutcome::Sat(model) => Solution::sat(model),
        SmtOutcome::Unsat => Solution::unsat(),
    })
}

pub fn solve_bdd(expr: &Expr, config: &SolveConfig) -> Result<Solution> {
    if config.objective.is_some() {
        return Err(Error::InvalidValue("objectives need the SMT backend".into()));
    }
    if !expr.ty().is_bool() {
        return Err(Error::mismatch("solve", "bool", expr.ty()));
    }
    let manager = config.manager.clone().unwrap_or_else(|| Manager::global().clone());
    let large_stack = config.large_stack || manager.config().large_stack;
    let vars = expr.vars();

    let model = manager.run_on(large_stack, |state| {
        let f = state.compile_bool(expr)?;
        let wf = state.well_formed_all(&vars)?;
        let f = state.bdd.apply_and(f, wf);
        let Some(assignment) = state.pick(f) else {
            return Ok(None);
        };
        let mut model = HashMap::with_capacity(vars.len());
        for var in &vars {
            let bits = state.var_bits(var)?;
            model.insert(var.clone(), state.decode(var.ty(), &bits, &assignment)?);
        }
        Ok(Some(model))
    })?;

    debug!(
        "bdd solve over {} variables: {}",
        vars.len(),
        if model.is_some() { "sat" } else { "unsat" }
    );
    Ok(Solution { model })
}
