//! Infinite expansion ends in `RecursiveInstantiation`.

use std::thread;

use asthra_ir::TypeId;
use asthra_mono::{CodegenError, InstantiationError, MonoConfig, Monomorphizer};

use super::Unit;

#[test]
fn nested_wrap_is_bounded() {
    let unit = Unit::new();
    let t = unit.param("T");
    let wrap_t = unit.applied("Wrap", &[t]);
    let wrap = unit.decl("Wrap", &["T"], &[("inner", unit.applied("Wrap", &[wrap_t]))]);
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());

    let err = mono.instantiate(&wrap, &[TypeId::I32]).unwrap_err();
    match err {
        InstantiationError::Codegen(CodegenError::RecursiveInstantiation { ty, depth }) => {
            assert_eq!(depth, MonoConfig::DEFAULT_MAX_DEPTH + 1);
            assert!(ty.starts_with("Wrap<Wrap<Wrap<"));
        }
        other => panic!("expected RecursiveInstantiation, got {other:?}"),
    }
    assert!(mono.registry().is_empty());
    assert_eq!(mono.teardown().live(), 0);
}

#[test]
fn mutual_embedding_across_threads() {
    let unit = Unit::new();
    let t = unit.param("T");
    let a = unit.decl("A", &["T"], &[("b", unit.applied("B", &[t]))]);
    let b = unit.decl("B", &["T"], &[("a", unit.applied("A", &[t]))]);
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());
    mono.register(&a).unwrap();
    mono.register(&b).unwrap();

    for _ in 0..8 {
        let (left, right) = thread::scope(|s| {
            let left = s.spawn(|| mono.instantiate(&a, &[TypeId::I64]));
            let right = s.spawn(|| mono.instantiate(&b, &[TypeId::I64]));
            (left.join().unwrap(), right.join().unwrap())
        });
        assert!(left.is_err_and(|e| e.is_recursive()));
        assert!(right.is_err_and(|e| e.is_recursive()));
        assert!(mono.registry().is_empty());
    }
}

#[test]
fn smaller_limit_fails_earlier() {
    let unit = Unit::new();
    let t = unit.param("T");
    let boxed = unit.boxed();
    let nest = unit.decl("Nest", &["T"], &[("inner", unit.applied("Box", &[t]))]);
    let deep = unit.decl("Deep", &["T"], &[("inner", unit.applied("Nest", &[t]))]);

    let shallow = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default().with_max_depth(1));
    shallow.register(&boxed).unwrap();
    shallow.register(&nest).unwrap();
    assert!(shallow.instantiate(&nest, &[TypeId::U8]).is_ok());
    // Box<u16> would sit two levels below Deep<u16>.
    assert!(shallow
        .instantiate(&deep, &[TypeId::U16])
        .is_err_and(|e| e.is_recursive()));

    let roomy = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());
    roomy.register(&boxed).unwrap();
    roomy.register(&nest).unwrap();
    assert!(roomy.instantiate(&deep, &[TypeId::U16]).is_ok());
}
