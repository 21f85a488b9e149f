//! # symlogic: typed symbolic reasoning over SMT and BDDs
//!
//! **`symlogic`** builds typed logical and arithmetic expressions over a rich
//! value model and answers questions about them with two independent
//! decision procedures: an external SMT solver and an embedded
//! reduced-ordered BDD engine.
//!
//! ## Building expressions
//!
//! Every expression lives in a [`Context`][crate::expr::Context], which
//! hash-conses nodes and runs a small algebraic simplifier on construction.
//! Operand types are checked when a node is built, never later.
//!
//! ```rust
//! use symlogic::expr::Context;
//! use symlogic::solve::{solve, SolveConfig};
//! use symlogic::types::Type;
//! use symlogic::value::Value;
//!
//! let ctx = Context::new();
//! let x = ctx.var(Type::i8(), "x")?;
//! let e = x.add(&ctx.constant(Value::i8(1)))?.eq(&ctx.constant(Value::i8(5)))?;
//!
//! // The BDD backend needs no external solver.
//! let solution = solve(&e, &SolveConfig::bdd())?;
//! assert!(solution.is_satisfiable());
//! assert_eq!(solution.get(&x)?, Value::i8(4));
//! # Ok::<(), symlogic::error::Error>(())
//! ```
//!
//! ## State sets and transformers
//!
//! On top of the BDD backend, [`StateSet`][crate::stateset::StateSet] is a
//! set of values of one type and [`Transformer`][crate::stateset::Transformer]
//! the relation of a function, supporting images and pre-images:
//!
//! ```rust
//! use symlogic::expr::Context;
//! use symlogic::manager::Manager;
//! use symlogic::stateset::{Function, StateSet, Transformer};
//! use symlogic::types::Type;
//! use symlogic::value::Value;
//!
//! let manager = Manager::new();
//! let ctx = Context::new();
//! let inc = Function::unary(&ctx, Type::u8(), |i| i.add(&ctx.constant(Value::u8(1))))?;
//! let t = Transformer::compile(&inc, Some(&manager))?;
//!
//! let ten = StateSet::from_predicate(
//!     &Type::u8(),
//!     |x| x.eq(&x.context().constant(Value::u8(10))),
//!     Some(&manager),
//! )?;
//! assert_eq!(t.transform_backwards(&ten)?.element()?, Value::u8(9));
//! # Ok::<(), symlogic::error::Error>(())
//! ```
//!
//! ## Core components
//!
//! - **[`expr`]**: hash-consed expression nodes, the simplifier and the builders.
//! - **[`types`]** and **[`value`]**: the type model and concrete values.
//! - **[`smt`]**: SMT-LIB2 encoding, solver processes and model decoding.
//! - **[`bdd`]**: the BDD kernel, driven by [`manager`] and [`interleave`].
//! - **[`stateset`]**: set algebra and image computation.
//! - **[`solve`]**: one entry point over both backends.

pub mod bdd;
pub mod cache;
mod compile;
pub mod error;
pub mod eval;
pub mod expr;
pub mod interleave;
pub mod manager;
pub mod reference;
pub mod regex;
pub mod sat;
pub mod smt;
pub mod solve;
pub mod stateset;
pub mod table;
pub mod types;
pub mod utils;
pub mod value;
