//! Appending concrete structs to the compilation unit's output.

use std::fmt::Write as _;

use asthra_ir::{GenericStructDecl, IntKind, StringInterner, TypeData, TypeId, TypeInterner};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::mangle::mangle_applied;
use crate::error::CodegenError;
use crate::record::ConcreteStruct;

/// Receives each concrete struct exactly once, after all of its by-value
/// dependencies.
pub trait StructSink: Send + Sync {
    fn emit(&self, def: &ConcreteStruct, origin: &GenericStructDecl) -> Result<(), CodegenError>;

    /// Rendered output so far, for sinks that keep one.
    fn source(&self) -> String {
        String::new()
    }
}

impl<T: StructSink + ?Sized> StructSink for &T {
    fn emit(&self, def: &ConcreteStruct, origin: &GenericStructDecl) -> Result<(), CodegenError> {
        (**self).emit(def, origin)
    }

    fn source(&self) -> String {
        (**self).source()
    }
}

const PRELUDE: &str = "#include <stdbool.h>\n#include <stddef.h>\n#include <stdint.h>\n\n";

/// Renders C `typedef struct` definitions.
pub struct CEmitter<'a> {
    names: &'a StringInterner,
    types: &'a TypeInterner,
    comments: bool,
    state: Mutex<EmitState>,
}

#[derive(Default)]
struct EmitState {
    writer: CWriter,
    defined: FxHashSet<String>,
    declared: FxHashSet<String>,
}

impl<'a> CEmitter<'a> {
    pub fn new(names: &'a StringInterner, types: &'a TypeInterner, comments: bool) -> Self {
        Self {
            names,
            types,
            comments,
            state: Mutex::new(EmitState::default()),
        }
    }

    /// Number of definitions written.
    pub fn len(&self) -> usize {
        self.state.lock().defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn origin_signature(&self, origin: &GenericStructDecl) -> String {
        let params: Vec<&str> = origin
            .type_params
            .iter()
            .map(|p| self.names.lookup(p.name))
            .collect();
        format!("{}<{}>", self.names.lookup(origin.name), params.join(", "))
    }

    /// C declaration of `name` with type `ty`.
    fn declare(&self, ty: TypeId, name: &str) -> String {
        asthra_ir::stack::ensure_sufficient_stack(|| match self.types.lookup(ty) {
            TypeData::Ptr { pointee, .. } => {
                let inner = if matches!(self.types.lookup(pointee), TypeData::Array { .. }) {
                    format!("(*{name})")
                } else {
                    format!("*{name}")
                };
                self.declare(pointee, &inner)
            }
            TypeData::Array { elem, len } => self.declare(elem, &format!("{name}[{len}]")),
            _ => format!("{} {name}", self.base(ty)),
        })
    }

    /// Type specifier for a non-declarator type.
    fn base(&self, ty: TypeId) -> String {
        match self.types.lookup(ty) {
            TypeData::Int(kind) => c_int(kind).to_owned(),
            TypeData::Float(kind) => match kind {
                asthra_ir::FloatKind::F32 => "float".to_owned(),
                asthra_ir::FloatKind::F64 => "double".to_owned(),
            },
            TypeData::Bool => "bool".to_owned(),
            TypeData::Char => "uint32_t".to_owned(),
            TypeData::String => "asthra_string_t".to_owned(),
            TypeData::Void => "void".to_owned(),
            TypeData::Slice(elem) => {
                let ptr = self.types.ptr(elem);
                format!("struct {{ {}; size_t len; }}", self.declare(ptr, "ptr"))
            }
            TypeData::Tuple(elems) => {
                let mut out = String::from("struct {");
                for (i, &elem) in elems.iter().enumerate() {
                    let _ = write!(out, " {};", self.declare(elem, &format!("_{i}")));
                }
                out.push_str(" }");
                out
            }
            TypeData::Named(name) | TypeData::Param(name) => self.names.lookup(name).to_owned(),
            TypeData::Applied { .. } => {
                let symbol = mangle_applied(self.names, self.types, ty).unwrap_or_default();
                format!("struct {symbol}")
            }
            TypeData::Ptr { .. } | TypeData::Array { .. } => {
                self.declare(ty, "").trim_end().to_owned()
            }
        }
    }
}

fn c_int(kind: IntKind) -> &'static str {
    match kind {
        IntKind::I8 => "int8_t",
        IntKind::I16 => "int16_t",
        IntKind::I32 => "int32_t",
        IntKind::I64 => "int64_t",
        IntKind::Isize => "intptr_t",
        IntKind::U8 => "uint8_t",
        IntKind::U16 => "uint16_t",
        IntKind::U32 => "uint32_t",
        IntKind::U64 => "uint64_t",
        IntKind::Usize => "uintptr_t",
    }
}

impl StructSink for CEmitter<'_> {
    fn emit(&self, def: &ConcreteStruct, origin: &GenericStructDecl) -> Result<(), CodegenError> {
        // Render outside the lock; only bookkeeping and the append are serialized.
        let mut body = CWriter::default();
        if self.comments {
            body.writeln(&format!(
                "// Generated from generic struct {} as {}",
                self.origin_signature(origin),
                def.source
            ));
        }
        body.writeln(&format!("typedef struct {} {{", def.symbol));
        body.indent();
        let mut stored = 0usize;
        for field in &def.fields {
            let name = self.names.lookup(field.name);
            if field.ty == TypeId::VOID {
                body.writeln(&format!("/* void {name} */"));
            } else {
                body.writeln(&format!("{};", self.declare(field.ty, name)));
                stored += 1;
            }
        }
        if stored == 0 {
            body.writeln("uint8_t _empty;");
        }
        body.dedent();
        body.writeln(&format!("}} {};", def.symbol));
        body.newline();

        let mut state = self.state.lock();
        if state.defined.contains(&def.symbol) {
            return Err(CodegenError::NameCollision {
                symbol: def.symbol.clone(),
            });
        }
        let forwards: Vec<String> = def
            .pointer_deps
            .iter()
            .filter(|dep| !state.defined.contains(*dep) && !state.declared.contains(*dep))
            .cloned()
            .collect();
        for dep in forwards {
            state.writer.writeln(&format!("struct {dep};"));
            state.declared.insert(dep);
        }
        state.writer.write(&body.take_output());
        state.defined.insert(def.symbol.clone());

        tracing::trace!(symbol = %def.symbol, "emitted C definition");
        Ok(())
    }

    fn source(&self) -> String {
        let state = self.state.lock();
        let mut out = String::with_capacity(PRELUDE.len() + state.writer.output.len());
        out.push_str(PRELUDE);
        out.push_str(&state.writer.output);
        out
    }
}

/// Indented line writer.
#[derive(Default)]
struct CWriter {
    indent: usize,
    output: String,
}

impl CWriter {
    fn indent(&mut self) {
        self.indent += 1;
    }

    fn dedent(&mut self) {
        debug_assert!(self.indent > 0, "dedent called with zero indent");
        self.indent = self.indent.saturating_sub(1);
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn writeln(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
