//! End-to-end scenarios over the public API.

use num_bigint::BigUint;
use symlogic::error::Error;
use symlogic::expr::Context;
use symlogic::manager::Manager;
use symlogic::smt::ProcessSolver;
use symlogic::solve::{solve, SolveConfig};
use symlogic::stateset::{Function, StateSet, Transformer};
use symlogic::types::Type;
use symlogic::value::Value;
use test_log::test;

fn z3_available() -> bool {
    let available = ProcessSolver::default().is_available();
    if !available {
        log::warn!("z3 not found, skipping the SMT half of this scenario");
    }
    available
}

#[test]
fn test_input_set_of_a_comparison() -> color_eyre::Result<()> {
    let manager = Manager::new();
    let ctx = Context::new();
    let f = Function::unary(&ctx, Type::u8(), |i| i.le(&ctx.constant(Value::u8(10))))?;
    let t = Transformer::compile(&f, Some(&manager))?;

    let inputs = t.input_set(|_, out| out.eq(&ctx.tt()))?;
    assert_eq!(inputs.count()?, BigUint::from(11u32));
    for v in 0..=255u8 {
        assert_eq!(inputs.contains(&Value::u8(v))?, v <= 10, "value {}", v);
    }
    Ok(())
}

#[test]
fn test_backward_image_of_increment() -> color_eyre::Result<()> {
    let manager = Manager::new();
    let ctx = Context::new();
    let f = Function::unary(&ctx, Type::u8(), |i| i.add(&ctx.constant(Value::u8(1))))?;
    let t = Transformer::compile(&f, Some(&manager))?;

    let ten = StateSet::from_predicate(
        &Type::u8(),
        |x| x.eq(&x.context().constant(Value::u8(10))),
        Some(&manager),
    )?;
    let nine = StateSet::from_predicate(
        &Type::u8(),
        |x| x.eq(&x.context().constant(Value::u8(9))),
        Some(&manager),
    )?;
    assert!(t.transform_backwards(&ten)?.equals(&nine)?);
    Ok(())
}

#[test]
fn test_solve_signed_increment() -> color_eyre::Result<()> {
    let ctx = Context::new();
    let x = ctx.var(Type::i32(), "x")?;
    let e = x.add(&ctx.constant(Value::i32(1)))?.eq(&ctx.constant(Value::i32(5)))?;

    let solution = solve(&e, &SolveConfig::bdd().with_manager(&Manager::new()))?;
    assert_eq!(solution.get(&x)?, Value::i32(4));

    if z3_available() {
        let solution = solve(&e, &SolveConfig::smt())?;
        assert_eq!(solution.get(&x)?, Value::i32(4));
    }
    Ok(())
}

#[test]
fn test_contradiction_is_unsat() -> color_eyre::Result<()> {
    let ctx = Context::new();
    let a = ctx.var(Type::Bool, "a")?;
    let e = a.and(&a.not()?)?;

    let solution = solve(&e, &SolveConfig::bdd().with_manager(&Manager::new()))?;
    assert!(!solution.is_satisfiable());

    if z3_available() {
        assert!(!solve(&e, &SolveConfig::smt())?.is_satisfiable());
    }
    Ok(())
}

#[test]
fn test_unbounded_variable_rejected_by_bdd() -> color_eyre::Result<()> {
    let ctx = Context::new();
    let n = ctx.var(Type::BigInt, "n")?;
    let e = n.add(&ctx.constant(Value::int(1)))?.eq(&ctx.constant(Value::int(5)))?;

    for large_stack in [false, true] {
        let config = SolveConfig::bdd()
            .with_manager(&Manager::new())
            .with_large_stack(large_stack);
        let err = solve(&e, &config).unwrap_err();
        assert!(err.is_usage());
        assert!(matches!(err, Error::UnsupportedType { backend: "bdd", .. }));
    }

    let err = StateSet::from_predicate(&Type::BigInt, |x| Ok(x.context().tt()), Some(&Manager::new()));
    assert!(matches!(err, Err(Error::UnsupportedType { .. })));
    Ok(())
}

#[test]
fn test_smt_handles_rich_types() -> color_eyre::Result<()> {
    if !z3_available() {
        return Ok(());
    }
    let ctx = Context::new();
    let m = ctx.var(Type::map(Type::u8(), Type::option(Type::u8()))?, "m")?;
    let s = ctx.var(Type::string(), "s")?;
    let k = ctx.constant(Value::u8(7));
    let e = m
        .map_get(&k)?
        .eq(&ctx.some(&ctx.constant(Value::u8(3)))?)?
        .and(&s.length()?.eq(&ctx.constant(Value::int(2)))?)?
        .and(&s.starts_with(&ctx.string("a")?)?)?;

    let solution = solve(&e, &SolveConfig::smt())?;
    let map = solution.get(&m)?;
    assert_eq!(map.map_get(&Value::u8(7)), Some(Value::some(Value::u8(3))));
    let text = solution.get(&s)?.as_string().unwrap_or_default();
    assert_eq!(text.chars().count(), 2);
    assert!(text.starts_with('a'));
    Ok(())
}
