//! Randomized checks against a native reference semantics.
//!
//! Random trees over two `u8` variables are built through the simplifying
//! constructors and compared with a direct evaluation of the tree on `u8`
//! machine arithmetic, so neither the simplifier nor the interpreter is
//! trusted on its own.

use proptest::prelude::*;
use symlogic::error::Result;
use symlogic::eval::{evaluate, evaluate_bool, Valuation};
use symlogic::expr::{Context, Expr};
use symlogic::manager::Manager;
use symlogic::smt::ProcessSolver;
use symlogic::solve::{solve, SolveConfig};
use symlogic::types::Type;
use symlogic::value::Value;

#[derive(Debug, Clone, Copy)]
enum Bin {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy)]
enum Cmp {
    Lt,
    Le,
    Eq,
}

#[derive(Debug, Clone)]
enum Term {
    X,
    Y,
    Lit(u8),
    Not(Box<Term>),
    Bin(Bin, Box<Term>, Box<Term>),
    Ite(Cmp, Box<(Term, Term, Term, Term)>),
}

#[derive(Debug, Clone)]
enum Cond {
    Lit(bool),
    Cmp(Cmp, Term, Term),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

fn bin() -> impl Strategy<Value = Bin> {
    prop_oneof![
        Just(Bin::Add),
        Just(Bin::Sub),
        Just(Bin::Mul),
        Just(Bin::And),
        Just(Bin::Or),
        Just(Bin::Xor),
    ]
}

fn cmp() -> impl Strategy<Value = Cmp> {
    prop_oneof![Just(Cmp::Lt), Just(Cmp::Le), Just(Cmp::Eq)]
}

fn term() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        Just(Term::X),
        Just(Term::Y),
        prop_oneof![Just(0u8), Just(1), Just(255), any::<u8>()].prop_map(Term::Lit),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| Term::Not(Box::new(t))),
            (bin(), inner.clone(), inner.clone()).prop_map(|(op, a, b)| Term::Bin(op, Box::new(a), Box::new(b))),
            (cmp(), inner.clone(), inner.clone(), inner.clone(), inner)
                .prop_map(|(op, a, b, t, e)| Term::Ite(op, Box::new((a, b, t, e)))),
        ]
    })
}

fn cond() -> impl Strategy<Value = Cond> {
    let leaf = prop_oneof![
        1 => any::<bool>().prop_map(Cond::Lit),
        4 => (cmp(), term(), term()).prop_map(|(op, a, b)| Cond::Cmp(op, a, b)),
    ];
    leaf.prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|c| Cond::Not(Box::new(c))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Cond::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Cond::Or(Box::new(a), Box::new(b))),
        ]
    })
}

fn compare(op: Cmp, a: u8, b: u8) -> bool {
    match op {
        Cmp::Lt => a < b,
        Cmp::Le => a <= b,
        Cmp::Eq => a == b,
    }
}

impl Term {
    fn value(&self, x: u8, y: u8) -> u8 {
        match self {
            Term::X => x,
            Term::Y => y,
            Term::Lit(v) => *v,
            Term::Not(a) => !a.value(x, y),
            Term::Bin(op, a, b) => {
                let (a, b) = (a.value(x, y), b.value(x, y));
                match op {
                    Bin::Add => a.wrapping_add(b),
                    Bin::Sub => a.wrapping_sub(b),
                    Bin::Mul => a.wrapping_mul(b),
                    Bin::And => a & b,
                    Bin::Or => a | b,
                    Bin::Xor => a ^ b,
                }
            }
            Term::Ite(op, parts) => {
                let (a, b, t, e) = parts.as_ref();
                if compare(*op, a.value(x, y), b.value(x, y)) {
                    t.value(x, y)
                } else {
                    e.value(x, y)
                }
            }
        }
    }

    fn build(&self, vars: &Vars) -> Result<Expr> {
        Ok(match self {
            Term::X => vars.x.clone(),
            Term::Y => vars.y.clone(),
            Term::Lit(v) => vars.ctx.constant(Value::u8(*v)),
            Term::Not(a) => a.build(vars)?.bitnot()?,
            Term::Bin(op, a, b) => {
                let (a, b) = (a.build(vars)?, b.build(vars)?);
                match op {
                    Bin::Add => a.add(&b)?,
                    Bin::Sub => a.sub(&b)?,
                    Bin::Mul => a.mul(&b)?,
                    Bin::And => a.bitand(&b)?,
                    Bin::Or => a.bitor(&b)?,
                    Bin::Xor => a.bitxor(&b)?,
                }
            }
            Term::Ite(op, parts) => {
                let (a, b, t, e) = parts.as_ref();
                let c = build_cmp(*op, &a.build(vars)?, &b.build(vars)?)?;
                c.ite(&t.build(vars)?, &e.build(vars)?)?
            }
        })
    }
}

fn build_cmp(op: Cmp, a: &Expr, b: &Expr) -> Result<Expr> {
    match op {
        Cmp::Lt => a.lt(b),
        Cmp::Le => a.le(b),
        Cmp::Eq => a.eq(b),
    }
}

impl Cond {
    fn value(&self, x: u8, y: u8) -> bool {
        match self {
            Cond::Lit(b) => *b,
            Cond::Cmp(op, a, b) => compare(*op, a.value(x, y), b.value(x, y)),
            Cond::Not(c) => !c.value(x, y),
            Cond::And(a, b) => a.value(x, y) && b.value(x, y),
            Cond::Or(a, b) => a.value(x, y) || b.value(x, y),
        }
    }

    fn build(&self, vars: &Vars) -> Result<Expr> {
        Ok(match self {
            Cond::Lit(b) => vars.ctx.bool(*b),
            Cond::Cmp(op, a, b) => build_cmp(*op, &a.build(vars)?, &b.build(vars)?)?,
            Cond::Not(c) => c.build(vars)?.not()?,
            Cond::And(a, b) => a.build(vars)?.and(&b.build(vars)?)?,
            Cond::Or(a, b) => a.build(vars)?.or(&b.build(vars)?)?,
        })
    }
}

struct Vars {
    ctx: Context,
    x: Expr,
    y: Expr,
}

impl Vars {
    fn new() -> Self {
        let ctx = Context::new();
        let x = ctx.var(Type::u8(), "x").unwrap();
        let y = ctx.var(Type::u8(), "y").unwrap();
        Vars { ctx, x, y }
    }

    fn valuation(&self, x: u8, y: u8) -> Valuation {
        Valuation::from([(self.x.clone(), Value::u8(x)), (self.y.clone(), Value::u8(y))])
    }

    fn witness(&self, solution: &symlogic::solve::Solution) -> (u8, u8) {
        let get = |v: &Expr| solution.get(v).unwrap().as_u64().unwrap() as u8;
        (get(&self.x), get(&self.y))
    }
}

fn satisfiable(c: &Cond) -> bool {
    (0..=255u8).any(|x| (0..=255u8).any(|y| c.value(x, y)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn simplifier_is_sound(t in term(), x in any::<u8>(), y in any::<u8>()) {
        let vars = Vars::new();
        let e = t.build(&vars).unwrap();
        let v = evaluate(&e, &vars.valuation(x, y)).unwrap();
        prop_assert_eq!(v, Value::u8(t.value(x, y)), "{}", e);
    }

    #[test]
    fn simplified_conditions_are_sound(c in cond(), x in any::<u8>(), y in any::<u8>()) {
        let vars = Vars::new();
        let e = c.build(&vars).unwrap();
        prop_assert_eq!(evaluate_bool(&e, &vars.valuation(x, y)).unwrap(), c.value(x, y), "{}", e);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn bdd_agrees_with_enumeration(c in cond()) {
        let vars = Vars::new();
        let e = c.build(&vars).unwrap();
        let config = SolveConfig::bdd().with_manager(&Manager::new());
        let solution = solve(&e, &config).unwrap();
        prop_assert_eq!(solution.is_satisfiable(), satisfiable(&c), "{}", e);
        if solution.is_satisfiable() {
            let (x, y) = vars.witness(&solution);
            prop_assert!(c.value(x, y), "witness ({}, {}) fails {}", x, y, e);
        }
    }

    #[test]
    fn smt_agrees_with_bdd(c in cond()) {
        if !ProcessSolver::default().is_available() {
            let _ = env_logger::builder().is_test(true).try_init();
            log::warn!("z3 not found, skipping SMT agreement case");
            return Ok(());
        }
        let vars = Vars::new();
        let e = c.build(&vars).unwrap();
        let smt = solve(&e, &SolveConfig::smt()).unwrap();
        let bdd = solve(&e, &SolveConfig::bdd().with_manager(&Manager::new())).unwrap();
        prop_assert_eq!(smt.is_satisfiable(), bdd.is_satisfiable(), "{}", e);
        if smt.is_satisfiable() {
            let (x, y) = vars.witness(&smt);
            prop_assert!(c.value(x, y), "witness ({}, {}) fails {}", x, y, e);
        }
    }
}
