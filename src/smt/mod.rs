//! SMT backend: one solver session per query.
//!
//! A session encodes the expression into an SMT-LIB2 script
//! ([`encode::Encoder`]), prints it ([`printer`]), hands the text to an
//! [`SmtSolver`] and reads the model back ([`decode`]). Nothing survives
//! the call, so concurrent queries never interfere.

pub mod decode;
pub mod encode;
pub mod printer;
pub mod sexp;
pub mod solver;
pub mod term;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

pub use self::solver::{ProcessSolver, SmtSolver};

use self::decode::Reply;
use self::encode::Encoder;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::value::Value;

/// Receives the literal query text before it is sent to the solver.
pub type DebugSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Optimization goal over a numeric expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Objective {
    Maximize(Expr),
    Minimize(Expr),
}

impl Objective {
    pub fn expr(&self) -> &Expr {
        match self {
            Objective::Maximize(e) | Objective::Minimize(e) => e,
        }
    }
}

#[derive(Clone)]
pub struct SmtConfig {
    pub timeout: Option<Duration>,
    pub debug: Option<DebugSink>,
    pub objective: Option<Objective>,
    pub solver: Arc<dyn SmtSolver>,
}

impl Default for SmtConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            debug: None,
            objective: None,
            solver: Arc::new(ProcessSolver::default()),
        }
    }
}

impl fmt::Debug for SmtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtConfig")
            .field("timeout", &self.timeout)
            .field("debug", &self.debug.is_some())
            .field("objective", &self.objective)
            .field("solver", &self.solver.name())
            .finish()
    }
}

impl SmtConfig {
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

    /// Run a different solver executable, e.g. `cvc5 --lang smt2`.
    pub fn with_command<S: Into<String>>(self, program: &str, args: impl IntoIterator<Item = S>) -> Self {
        self.with_solver(ProcessSolver::new(program, args))
    }

    pub fn with_solver(mut self, solver: impl SmtSolver + 'static) -> Self {
        self.solver = Arc::new(solver);
        self
    }
}

/// Outcome of a successful query.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtOutcome {
    /// Values of every variable the query mentions.
    Sat(HashMap<Expr, Value>),
    Unsat,
}

/// Decide the boolean `expr` with the configured solver.
pub fn check(expr: &Expr, config: &SmtConfig) -> Result<SmtOutcome> {
    if let Some(objective) = &config.objective {
        if !objective.expr().context().ptr_eq(expr.context()) {
            return Err(Error::ContextMismatch);
        }
    }

    let mut encoder = Encoder::new();
    encoder.assert(expr)?;
    if let Some(objective) = &config.objective {
        encoder.objective(objective)?;
    }
    let query = encoder.finish(config.timeout);
    let text = printer::to_smtlib(&query.script);

    if let Some(sink) = &config.debug {
        sink(&text);
    }
    debug!("sending query to {}", config.solver.name());
    let reply = config.solver.run(&text)?;

    match decode::read_reply(&reply, &query.vars)? {
        Reply::Sat(model) => {
            debug!("sat with {} variables", model.len());
            Ok(SmtOutcome::Sat(model))
        }
        Reply::Unsat => {
            debug!("unsat");
            Ok(SmtOutcome::Unsat)
        }
    }
}
