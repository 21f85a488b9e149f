//! Identity, isolation and caching across contexts and managers.

use num_bigint::BigUint;
use symlogic::error::Error;
use symlogic::eval::{evaluate, Valuation};
use symlogic::expr::{Context, Expr};
use symlogic::manager::Manager;
use symlogic::solve::{solve, SolveConfig};
use symlogic::stateset::{Function, StateSet, Transformer};
use symlogic::types::Type;
use symlogic::value::Value;
use test_log::test;

fn build(ctx: &Context, x: &Expr) -> Expr {
    x.add(&ctx.constant(Value::u8(1)))
        .unwrap()
        .lt(&ctx.constant(Value::u8(5)))
        .unwrap()
}

#[test]
fn test_identical_construction_shares_nodes() {
    let ctx = Context::new();
    let x = ctx.var(Type::u8(), "x").unwrap();
    let a = build(&ctx, &x);
    let b = build(&ctx, &x);
    assert_eq!(a, b);
    assert_eq!(a.id(), b.id());

    let other = Context::new();
    let y = other.var(Type::u8(), "x").unwrap();
    assert_ne!(build(&other, &y), a);
}

#[test]
fn test_rebuilt_nodes_keep_meaning() {
    let ctx = Context::new();
    let x = ctx.var(Type::u8(), "x").unwrap();
    let first = build(&ctx, &x);
    let id = first.id();
    let before: Vec<Value> = (0..=255u8)
        .map(|v| evaluate(&first, &Valuation::from([(x.clone(), Value::u8(v))])).unwrap())
        .collect();
    drop(first);

    let second = build(&ctx, &x);
    // After collection the identity may change, but never the meaning.
    assert!(second.id() >= id);
    let after: Vec<Value> = (0..=255u8)
        .map(|v| evaluate(&second, &Valuation::from([(x.clone(), Value::u8(v))])).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_concurrent_construction() {
    let ctx = Context::new();
    let x = ctx.var(Type::u16(), "x").unwrap();
    let (x, ctx) = (&x, &ctx);
    let built: Vec<Expr> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || {
                    let mut e = x.clone();
                    for k in 0..100u16 {
                        e = e.bitxor(&ctx.constant(Value::u16(k))).unwrap();
                    }
                    e
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(built.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_concurrent_solves_share_a_manager() {
    let manager = Manager::new();
    let ctx = Context::new();
    std::thread::scope(|scope| {
        for k in 0..4u8 {
            let (manager, ctx) = (&manager, &ctx);
            scope.spawn(move || {
                let x = ctx.var(Type::u8(), &format!("x{}", k)).unwrap();
                let e = x
                    .mul(&ctx.constant(Value::u8(3)))
                    .unwrap()
                    .eq(&ctx.constant(Value::u8(k * 3)))
                    .unwrap();
                let solution = solve(&e, &SolveConfig::bdd().with_manager(manager)).unwrap();
                let v = solution.get(&x).unwrap();
                let check = evaluate(&e, &Valuation::from([(x.clone(), v)])).unwrap();
                assert_eq!(check, Value::Bool(true));
            });
        }
    });
}

#[test]
fn test_managers_are_isolated() {
    let (m1, m2) = (Manager::new(), Manager::new());
    let small = |m: &Manager| {
        StateSet::from_predicate(&Type::u8(), |x| x.lt(&x.context().constant(Value::u8(3))), Some(m)).unwrap()
    };
    let (a, b) = (small(&m1), small(&m2));
    assert!(matches!(a.union(&b), Err(Error::ManagerMismatch)));
    assert!(matches!(a.intersect(&b), Err(Error::ManagerMismatch)));
    assert!(matches!(a.difference(&b), Err(Error::ManagerMismatch)));
    assert!(matches!(a.equals(&b), Err(Error::ManagerMismatch)));

    let ctx = Context::new();
    let f = Function::unary(&ctx, Type::u8(), |i| i.bitnot()).unwrap();
    let t1 = Transformer::compile(&f, Some(&m1)).unwrap();
    assert!(matches!(t1.transform_forward(&b), Err(Error::ManagerMismatch)));
    assert!(matches!(t1.transform_backwards(&b), Err(Error::ManagerMismatch)));
    assert!(t1.transform_forward(&a).is_ok());
}

#[test]
fn test_transformer_compile_is_idempotent() {
    let ctx = Context::new();
    let f = Function::unary(&ctx, Type::u8(), |i| i.mul(&ctx.constant(Value::u8(2)))).unwrap();

    let manager = Manager::new();
    let t1 = Transformer::compile(&f, Some(&manager)).unwrap();
    let t2 = Transformer::compile(&f, Some(&manager)).unwrap();
    assert!(t1.ptr_eq(&t2));

    let g1 = Transformer::compile(&f, None).unwrap();
    let g2 = Transformer::compile(&f, None).unwrap();
    assert!(g1.ptr_eq(&g2));
    assert!(g1.manager().ptr_eq(Manager::global()));
    assert!(!g1.ptr_eq(&t1));
}

#[test]
fn test_image_fixed_point() {
    let manager = Manager::new();
    let ctx = Context::new();
    let mask = ctx.constant(Value::u8(0xF0));
    let f = Function::unary(&ctx, Type::u8(), |i| i.bitand(&mask)?.add(&ctx.constant(Value::u8(7)))).unwrap();
    let t = Transformer::compile(&f, Some(&manager)).unwrap();
    let s = StateSet::from_predicate(
        &Type::u8(),
        |x| x.lt(&x.context().constant(Value::u8(100))),
        Some(&manager),
    )
    .unwrap();

    let image = t.transform_forward(&s).unwrap();
    let round_trip = t
        .transform_forward(&t.transform_backwards(&image).unwrap())
        .unwrap();
    assert!(round_trip.equals(&image).unwrap());
    // 0x00..=0x60 keep seven distinct high nibbles.
    assert_eq!(image.count().unwrap(), BigUint::from(7u32));
}

#[test]
fn test_images_of_pairs() {
    let manager = Manager::new();
    let ctx = Context::new();
    let a = ctx.var(Type::unsigned(3), "a").unwrap();
    let b = ctx.var(Type::Bool, "b").unwrap();
    let body = b.ite(&a, &a.bitnot().unwrap()).unwrap();
    let f = Function::new(vec![a.clone(), b.clone()], body).unwrap();
    let t = Transformer::compile(&f, Some(&manager)).unwrap();
    assert_eq!(t.input_type(), &Type::tuple([Type::unsigned(3), Type::Bool]));

    let all = StateSet::full(t.input_type(), Some(&manager)).unwrap();
    let outputs = t.transform_forward(&all).unwrap();
    assert!(outputs.is_full().unwrap());

    let zero = StateSet::from_predicate(
        &Type::unsigned(3),
        |x| x.eq(&x.context().constant(Value::bitvec(3, false, 0))),
        Some(&manager),
    )
    .unwrap();
    let pre = t.transform_backwards(&zero).unwrap();
    assert_eq!(pre.count().unwrap(), BigUint::from(2u32));
    assert!(pre
        .contains(&Value::tuple(vec![Value::bitvec(3, false, 7), Value::Bool(false)]))
        .unwrap());
    assert!(pre
        .contains(&Value::tuple(vec![Value::bitvec(3, false, 0), Value::Bool(true)]))
        .unwrap());
}
