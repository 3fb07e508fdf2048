//! Refcounting: records are freed exactly when the last holder lets go.

use asthra_ir::TypeId;
use asthra_mono::memory::{release, retain};
use asthra_mono::{MonoConfig, Monomorphizer};

use super::Unit;

#[test]
fn freed_after_last_release_and_not_before() {
    let unit = Unit::new();
    let boxed = unit.boxed();
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());

    let h1 = mono.instantiate(&boxed, &[TypeId::I32]).unwrap();
    let weak = h1.downgrade();
    let tracker = mono.teardown();

    let h2 = retain(&h1);
    assert_eq!(h1.refcount(), 2);
    release(h1);
    assert!(!weak.is_freed());
    assert_eq!(tracker.live(), 1);

    release(h2);
    assert!(weak.is_freed());
    assert!(weak.upgrade().is_none());
    assert_eq!(tracker.live(), 0);
}

#[test]
fn teardown_releases_everything() {
    let unit = Unit::new();
    let boxed = unit.boxed();
    let t = unit.param("T");
    let list = unit.decl(
        "List",
        &["T"],
        &[
            ("head", unit.applied("Box", &[t])),
            ("next", unit.types.ptr(unit.applied("List", &[t]))),
        ],
    );
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());
    mono.register(&boxed).unwrap();

    let mut held = Vec::new();
    for arg in [TypeId::I8, TypeId::F32, TypeId::STRING] {
        held.push(mono.instantiate(&list, &[arg]).unwrap());
    }
    let observers: Vec<_> = mono
        .registry()
        .records()
        .iter()
        .map(|record| record.downgrade())
        .collect();
    assert_eq!(observers.len(), 6);

    let tracker = mono.teardown();
    assert_eq!(tracker.live(), 3);
    assert!(observers.iter().filter(|weak| weak.is_freed()).count() == 3);

    drop(held);
    assert!(observers.iter().all(|weak| weak.is_freed()));
    assert_eq!(tracker.created(), 6);
    assert_eq!(tracker.freed(), 6);
}

#[test]
fn failed_instantiations_leak_nothing() {
    let unit = Unit::new();
    let t = unit.param("T");
    let holder = unit.decl("Holder", &["T"], &[("value", t), ("missing", unit.applied("Nope", &[t]))]);
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());

    for _ in 0..3 {
        assert!(mono.instantiate(&holder, &[TypeId::BOOL]).is_err());
    }
    assert!(mono.registry().is_empty());
    assert_eq!(mono.stats().failed, 3);

    let tracker = mono.teardown();
    assert_eq!(tracker.created(), 3);
    assert_eq!(tracker.live(), 0);
}
