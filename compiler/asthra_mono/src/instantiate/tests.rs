use asthra_ir::{FieldDecl, GenericStructDecl, StringInterner, TypeId, TypeInterner, TypeParam};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crate::error::{CodegenError, InstantiationError, ValidationError};
use crate::record::ConcreteStruct;
use crate::{MonoConfig, Monomorphizer, RecordStatus, StatsSnapshot, StructSink};

/// `Vec<T> { data: *T, len: usize, capacity: usize }` and
/// `Pair<T, U> { first: T, second: U }`.
fn decls(names: &StringInterner, types: &TypeInterner) -> (GenericStructDecl, GenericStructDecl) {
    let (t, u) = (names.intern("T"), names.intern("U"));
    let vec = GenericStructDecl::new(
        names.intern("Vec"),
        vec![TypeParam::new(t)],
        vec![
            FieldDecl::new(names.intern("data"), types.ptr(types.param(t))),
            FieldDecl::new(names.intern("len"), TypeId::USIZE),
            FieldDecl::new(names.intern("capacity"), TypeId::USIZE),
        ],
    );
    let pair = GenericStructDecl::new(
        names.intern("Pair"),
        vec![TypeParam::new(t), TypeParam::new(u)],
        vec![
            FieldDecl::new(names.intern("first"), types.param(t)),
            FieldDecl::new(names.intern("second"), types.param(u)),
        ],
    );
    (vec, pair)
}

#[test]
fn session_end_to_end() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, pair) = decls(&names, &types);
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    let vec_i32 = mono.instantiate(&vec, &[TypeId::I32]);
    let again = mono.instantiate(&vec, &[TypeId::I32]);
    let vec_f64 = mono.instantiate(&vec, &[TypeId::F64]);
    let pair = mono.instantiate(&pair, &[TypeId::I32, TypeId::STRING]);

    let (Ok(vec_i32), Ok(again), Ok(_), Ok(_)) = (vec_i32, again, vec_f64, pair) else {
        panic!("instantiation failed");
    };
    assert!(vec_i32.ptr_eq(&again));
    assert_eq!(vec_i32.status(), RecordStatus::Ready);
    assert_eq!(mono.declaration_count(), 2);
    assert_eq!(
        mono.stats(),
        StatsSnapshot {
            requests: 4,
            hits: 1,
            misses: 3,
            generated: 3,
            failed: 0,
            waits: 0,
            cycles: 0,
        }
    );

    let source = mono.emitted_source();
    assert!(source.contains("typedef struct"));
    assert!(source.contains("Vec_i32"));
    assert!(source.contains("// Generated from generic struct Vec<T> as Vec<i32>"));
    assert!(source.contains("// Generated from generic struct Pair<T, U> as Pair<i32, string>"));
    assert_eq!(source.matches("typedef struct").count(), 3);

    let dump = mono.debug_dump();
    assert_eq!(dump.lines().count(), 3);
    assert!(dump.lines().any(|line| line.starts_with("Vec<i32> => Vec_i32_h")
        && line.ends_with("[Ready, size=24, align=8, fields=3, refs=3]")));
}

#[test]
fn rejected_requests_never_reach_the_registry() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, _) = decls(&names, &types);
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    assert_eq!(
        mono.instantiate(&vec, &[TypeId::I32, TypeId::I32]).err(),
        Some(
            ValidationError::ArityMismatch {
                name: "Vec".into(),
                expected: 1,
                got: 2,
            }
            .into()
        )
    );
    assert_eq!(mono.stats().requests, 0);
    assert!(mono.registry().is_empty());
    assert!(mono.emitted_source().ends_with("#include <stdint.h>\n\n"));
}

#[test]
fn by_name_lookup() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, _) = decls(&names, &types);
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    assert_eq!(
        mono.instantiate_by_name(names.intern("NonExistent"), &[TypeId::I32]).err(),
        Some(InstantiationError::UnknownGeneric {
            name: "NonExistent".into()
        })
    );

    assert_eq!(mono.register(&vec), Ok(()));
    let handle = mono.instantiate_by_name(names.intern("Vec"), &[TypeId::U8]);
    assert!(handle.is_ok_and(|h| h.is_ready()));
}

#[test]
fn conflicting_declarations_are_rejected() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, _) = decls(&names, &types);
    let (same_vec, _) = decls(&names, &types);
    let other_vec = GenericStructDecl::new(
        names.intern("Vec"),
        vec![TypeParam::new(names.intern("T"))],
        Vec::new(),
    );
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    assert_eq!(mono.register(&vec), Ok(()));
    assert_eq!(mono.register(&vec), Ok(()));
    assert_eq!(mono.register(&same_vec), Ok(()));
    assert_eq!(
        mono.register(&other_vec),
        Err(InstantiationError::DuplicateDeclaration { name: "Vec".into() })
    );
    assert!(mono.instantiate(&other_vec, &[TypeId::I32]).is_err());
    assert_eq!(mono.declaration_count(), 1);
}

#[test]
fn rejected_requests_do_not_register() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, pair) = decls(&names, &types);
    let clashing = GenericStructDecl::new(
        names.intern("Vec"),
        vec![TypeParam::new(names.intern("T"))],
        Vec::new(),
    );
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    assert!(mono.instantiate(&pair, &[TypeId::I32]).is_err());
    assert_eq!(mono.declaration_count(), 0);
    assert_eq!(mono.declaration(names.intern("Pair")), None);

    assert_eq!(mono.register(&vec), Ok(()));
    assert_eq!(
        mono.instantiate(&clashing, &[]).err(),
        Some(
            ValidationError::ArityMismatch {
                name: "Vec".into(),
                expected: 1,
                got: 0,
            }
            .into()
        )
    );
    assert_eq!(mono.declaration_count(), 1);
}

#[test]
fn handles_keep_records_alive_past_teardown() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, _) = decls(&names, &types);
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    let Ok(handle) = mono.instantiate(&vec, &[TypeId::I64]) else {
        panic!("Vec<i64> failed");
    };
    assert_eq!(handle.refcount(), 2);
    let extra = mono.retain(&handle);
    assert_eq!(handle.refcount(), 3);
    mono.release(extra);
    assert_eq!(handle.refcount(), 2);

    let tracker = mono.teardown();
    assert_eq!(handle.refcount(), 1);
    assert_eq!(tracker.live(), 1);
    assert!(handle.definition().is_some());

    drop(handle);
    assert_eq!(tracker.live(), 0);
    assert_eq!(tracker.created(), tracker.freed());
}

/// Records emission order and can be told to fail.
#[derive(Default)]
struct Recording {
    emitted: Mutex<Vec<String>>,
    reject: Option<&'static str>,
}

impl StructSink for Recording {
    fn emit(&self, def: &ConcreteStruct, _: &GenericStructDecl) -> Result<(), CodegenError> {
        if self.reject.is_some_and(|source| source == def.source) {
            return Err(CodegenError::Emit {
                symbol: def.symbol.clone(),
                message: "rejected".into(),
            });
        }
        self.emitted.lock().push(def.source.clone());
        Ok(())
    }
}

#[test]
fn dependencies_are_emitted_first() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, pair) = decls(&names, &types);
    let t = names.intern("T");
    let vec_t = types.applied(names.intern("Vec"), vec![types.param(t)]);
    let pair_t = types.applied(names.intern("Pair"), vec![types.param(t), vec_t]);
    let outer = GenericStructDecl::new(
        names.intern("Outer"),
        vec![TypeParam::new(t)],
        vec![FieldDecl::new(names.intern("pair"), pair_t)],
    );
    let sink = Recording::default();
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default()).with_sink(&sink);
    assert_eq!(mono.register(&vec), Ok(()));
    assert_eq!(mono.register(&pair), Ok(()));

    assert!(mono.instantiate(&outer, &[TypeId::BOOL]).is_ok());
    assert_eq!(
        *sink.emitted.lock(),
        vec!["Vec<bool>", "Pair<bool, Vec<bool>>", "Outer<bool>"]
    );
    assert_eq!(mono.emitted_source(), "");
}

#[test]
fn sink_failure_fails_the_instantiation() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, _) = decls(&names, &types);
    let sink = Recording {
        reject: Some("Vec<u32>"),
        ..Recording::default()
    };
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default()).with_sink(&sink);

    let err = mono.instantiate(&vec, &[TypeId::U32]).err();
    assert!(matches!(
        err,
        Some(InstantiationError::Codegen(CodegenError::Emit { .. }))
    ));
    assert!(mono.registry().is_empty());
    assert_eq!(mono.stats().failed, 1);
    assert!(mono.instantiate(&vec, &[TypeId::U16]).is_ok());
}

#[test]
fn batches_run_in_parallel_and_keep_order() {
    let (names, types) = (StringInterner::new(), TypeInterner::new());
    let (vec, pair) = decls(&names, &types);
    let mono = Monomorphizer::new(&names, &types, MonoConfig::default());

    let mut requests = Vec::new();
    for _ in 0..8 {
        requests.push((&vec, vec![TypeId::I32]));
        requests.push((&pair, vec![TypeId::U8, TypeId::CHAR]));
        requests.push((&vec, vec![TypeId::I32, TypeId::I32]));
    }
    let results = mono.instantiate_all(&requests);

    assert_eq!(results.len(), 24);
    for chunk in results.chunks(3) {
        assert!(chunk[0]
            .as_ref()
            .is_ok_and(|h| h.definition().is_some_and(|def| def.source == "Vec<i32>")));
        assert!(chunk[1].is_ok());
        assert!(chunk[2].is_err());
    }
    assert_eq!(mono.stats().generated, 2);
    assert_eq!(mono.registry().len(), 2);
}
