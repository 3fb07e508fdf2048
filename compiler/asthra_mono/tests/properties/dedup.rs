//! Deduplication: equal keys share one record and one definition.

use std::sync::Barrier;
use std::thread;

use asthra_ir::TypeId;
use asthra_mono::{MonoConfig, Monomorphizer, RecordHandle};

use super::{CountingSink, Unit};

const THREADS: usize = 16;

#[test]
fn concurrent_requests_generate_once() {
    let unit = Unit::new();
    let boxed = unit.boxed();
    let sink = CountingSink::default();
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default()).with_sink(&sink);
    let barrier = Barrier::new(THREADS);

    let handles: Vec<RecordHandle<'_>> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    mono.instantiate(&boxed, &[TypeId::I32]).unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(sink.count(), 1);
    assert_eq!(mono.stats().generated, 1);
    assert_eq!(mono.registry().len(), 1);
    assert!(handles.iter().all(|h| h.ptr_eq(&handles[0]) && h.is_ready()));
    assert_eq!(handles[0].refcount(), THREADS + 1);
}

#[test]
fn concurrent_nested_requests_share_dependencies() {
    let unit = Unit::new();
    let boxed = unit.boxed();
    let t = unit.param("T");
    let outer = unit.decl(
        "Outer",
        &["T"],
        &[("a", unit.applied("Box", &[t])), ("b", unit.types.ptr(unit.applied("Box", &[t])))],
    );
    let other = unit.decl("Other", &["T"], &[("boxed", unit.applied("Box", &[t]))]);
    let sink = CountingSink::default();
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default()).with_sink(&sink);
    mono.register(&boxed).unwrap();

    let mut requests = Vec::new();
    for arg in [TypeId::U8, TypeId::U16, TypeId::U32, TypeId::U64] {
        for _ in 0..4 {
            requests.push((&outer, vec![arg]));
            requests.push((&other, vec![arg]));
            requests.push((&boxed, vec![arg]));
        }
    }
    let results = mono.instantiate_all(&requests);

    assert!(results.iter().all(Result::is_ok));
    // Box, Outer and Other for each of four arguments.
    assert_eq!(sink.count(), 12);
    assert_eq!(mono.stats().generated, 12);
    assert_eq!(mono.registry().instantiations_of(unit.names.intern("Box")).len(), 4);
}

#[test]
fn equal_contents_hit_the_same_entry() {
    let unit = Unit::new();
    let pair = unit.decl(
        "Pair",
        &["A", "B"],
        &[("first", unit.param("A")), ("second", unit.param("B"))],
    );
    let mono = Monomorphizer::new(&unit.names, &unit.types, MonoConfig::default());

    // Built independently, so only structural interning makes them equal.
    let first = [unit.types.ptr(TypeId::I32), unit.types.slice(unit.types.array(TypeId::U8, 4))];
    let second = [unit.types.ptr(TypeId::I32), unit.types.slice(unit.types.array(TypeId::U8, 4))];

    let a = mono.instantiate(&pair, &first).unwrap();
    let b = mono.instantiate(&pair, &second).unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(a.key(), b.key());
    assert_eq!(mono.stats().hits, 1);
}
