use asthra_ir::{FieldDecl, StringInterner, TypeId, TypeInterner, TypeParam};
use pretty_assertions::assert_eq;

use super::*;

struct Fixture {
    names: StringInterner,
    types: TypeInterner,
}

impl Fixture {
    fn new() -> Self {
        Self {
            names: StringInterner::new(),
            types: TypeInterner::new(),
        }
    }

    /// `struct Map<K: Hash + Eq, V> { key: K, value: V }`
    fn map_decl(&self) -> GenericStructDecl {
        let (k, v) = (self.names.intern("K"), self.names.intern("V"));
        GenericStructDecl::new(
            self.names.intern("Map"),
            vec![
                TypeParam::new(k)
                    .with_bound(self.names.intern("Hash"))
                    .with_bound(self.names.intern("Eq")),
                TypeParam::new(v),
            ],
            vec![
                FieldDecl::new(self.names.intern("key"), self.types.param(k)),
                FieldDecl::new(self.names.intern("value"), self.types.param(v)),
            ],
        )
    }

    fn check(&self, decl: &GenericStructDecl, args: &[TypeId]) -> Result<(), ValidationError> {
        let bounds = BuiltinBounds::new(&self.names);
        validate(&self.names, &self.types, decl, args, &bounds)
    }
}

#[test]
fn accepts_matching_arguments() {
    let fx = Fixture::new();
    let decl = fx.map_decl();
    assert_eq!(fx.check(&decl, &[TypeId::STRING, TypeId::F64]), Ok(()));
}

#[test]
fn rejects_plain_struct() {
    let fx = Fixture::new();
    let decl = GenericStructDecl::new(fx.names.intern("Point"), Vec::new(), Vec::new());
    assert_eq!(
        fx.check(&decl, &[]),
        Err(ValidationError::NotGeneric {
            name: "Point".into()
        })
    );
}

#[test]
fn arity_is_checked_first() {
    let fx = Fixture::new();
    let decl = fx.map_decl();
    // The single argument is also unresolved; arity still wins.
    let t = fx.types.param(fx.names.intern("T"));
    assert_eq!(
        fx.check(&decl, &[t]),
        Err(ValidationError::ArityMismatch {
            name: "Map".into(),
            expected: 2,
            got: 1,
        })
    );
}

#[test]
fn rejects_argument_with_type_variable_inside() {
    let fx = Fixture::new();
    let decl = fx.map_decl();
    let t = fx.types.param(fx.names.intern("T"));
    let nested = fx.types.slice(fx.types.ptr(t));
    assert_eq!(
        fx.check(&decl, &[TypeId::I32, nested]),
        Err(ValidationError::UnresolvedTypeArgument {
            name: "Map".into(),
            index: 1,
            ty: "[]*T".into(),
        })
    );
}

#[test]
fn reports_first_violated_bound_with_index() {
    let fx = Fixture::new();
    let decl = fx.map_decl();
    assert_eq!(
        fx.check(&decl, &[TypeId::F32, TypeId::I32]),
        Err(ValidationError::ConstraintViolation {
            index: 0,
            param: "K".into(),
            bound: "Hash".into(),
            ty: "f32".into(),
        })
    );
}

#[test]
fn compound_capabilities_are_the_intersection_of_parts() {
    let fx = Fixture::new();
    let bounds = BuiltinBounds::new(&fx.names);
    let copy = fx.names.intern("Copy");

    let ints = fx.types.tuple(vec![TypeId::I32, TypeId::U8]);
    let mixed = fx.types.tuple(vec![TypeId::I32, TypeId::STRING]);
    let strings = fx.types.array(TypeId::STRING, 4);

    assert!(bounds.satisfies(&fx.types, ints, copy));
    assert!(!bounds.satisfies(&fx.types, mixed, copy));
    assert!(!bounds.satisfies(&fx.types, strings, copy));
    assert!(bounds.satisfies(&fx.types, fx.types.ptr(TypeId::STRING), copy));
}

#[test]
fn numeric_bounds() {
    let fx = Fixture::new();
    let bounds = BuiltinBounds::new(&fx.names);
    let (numeric, integer, float) = (
        fx.names.intern("Numeric"),
        fx.names.intern("Integer"),
        fx.names.intern("Float"),
    );

    assert!(bounds.satisfies(&fx.types, TypeId::U64, numeric));
    assert!(bounds.satisfies(&fx.types, TypeId::U64, integer));
    assert!(!bounds.satisfies(&fx.types, TypeId::U64, float));
    assert!(bounds.satisfies(&fx.types, TypeId::F32, float));
    assert!(!bounds.satisfies(&fx.types, TypeId::BOOL, numeric));
}

#[test]
fn user_bounds_come_from_declared_impls() {
    let fx = Fixture::new();
    let point = fx.names.intern("Point");
    let display = fx.names.intern("Display");
    let copy = fx.names.intern("Copy");
    let bounds = BuiltinBounds::new(&fx.names)
        .with_impl(point, display)
        .with_capabilities(point, Capabilities::COPY | Capabilities::SIZED);

    let point_ty = fx.types.named(point);
    assert!(bounds.satisfies(&fx.types, point_ty, display));
    assert!(bounds.satisfies(&fx.types, point_ty, copy));
    assert!(!bounds.satisfies(&fx.types, TypeId::I32, display));

    let other = fx.types.named(fx.names.intern("Other"));
    assert!(!bounds.satisfies(&fx.types, other, copy));
    assert_eq!(
        bounds.capabilities(&fx.types, other),
        Capabilities::SIZED | Capabilities::SEND
    );
}
