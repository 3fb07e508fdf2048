//! Symbol names for concrete instantiations.
//!
//! `Pair<i32, *Node<string>>` becomes `Pair_i32_ptr_Node_string_h<16 hex>`:
//! a readable rendering of the key followed by the xxh64 of its canonical
//! source form. The readable part alone can collide (`Vec<i32_x>` against a
//! user struct named `i32_x`); the hash is what keeps symbols unique. Both
//! parts depend only on names, never on interner ids, so every translation
//! unit derives the same symbol.

use std::fmt::Write as _;

use asthra_ir::{stack::ensure_sufficient_stack, StringInterner, TypeData, TypeId, TypeInterner};
use xxhash_rust::xxh64::xxh64;

use crate::record::InstantiationKey;

const SEED: u64 = 0;

pub fn mangle(names: &StringInterner, types: &TypeInterner, key: &InstantiationKey) -> String {
    let canonical = key.display(types, names);
    let mut out = String::with_capacity(canonical.len() + 20);
    push_ident(&mut out, names.lookup(key.generic()));
    for &arg in key.args() {
        out.push('_');
        readable(names, types, arg, &mut out);
    }
    let _ = write!(out, "_h{:016x}", xxh64(canonical.as_bytes(), SEED));
    out
}

/// Symbol for the applied type `ty`, if it is one.
pub fn mangle_applied(names: &StringInterner, types: &TypeInterner, ty: TypeId) -> Option<String> {
    match types.lookup(ty) {
        TypeData::Applied { name, args } => {
            Some(mangle(names, types, &InstantiationKey::new(name, &args)))
        }
        _ => None,
    }
}

fn readable(names: &StringInterner, types: &TypeInterner, ty: TypeId, out: &mut String) {
    ensure_sufficient_stack(|| match types.lookup(ty) {
        TypeData::Int(kind) => out.push_str(kind.name()),
        TypeData::Float(kind) => out.push_str(kind.name()),
        TypeData::Bool => out.push_str("bool"),
        TypeData::Char => out.push_str("char"),
        TypeData::String => out.push_str("string"),
        TypeData::Void => out.push_str("void"),
        TypeData::Ptr { pointee, mutable } => {
            out.push_str(if mutable { "ptrmut_" } else { "ptr_" });
            readable(names, types, pointee, out);
        }
        TypeData::Slice(elem) => {
            out.push_str("slice_");
            readable(names, types, elem, out);
        }
        TypeData::Array { elem, len } => {
            let _ = write!(out, "arr{len}_");
            readable(names, types, elem, out);
        }
        TypeData::Tuple(elems) => {
            out.push_str("tup");
            let _ = write!(out, "{}", elems.len());
            for &elem in elems.iter() {
                out.push('_');
                readable(names, types, elem, out);
            }
        }
        TypeData::Named(name) | TypeData::Param(name) => push_ident(out, names.lookup(name)),
        TypeData::Applied { name, args } => {
            push_ident(out, names.lookup(name));
            for &arg in args.iter() {
                out.push('_');
                readable(names, types, arg, out);
            }
        }
    });
}

/// Copy `s`, replacing anything that is not a C identifier character.
fn push_ident(out: &mut String, s: &str) {
    out.extend(s.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        }
    }));
}
