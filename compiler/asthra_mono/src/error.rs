//! Structured errors for instantiation requests.
//!
//! Names and types are rendered to strings when the error is built, so an
//! error can outlive the interners and be handed straight to diagnostics.

use thiserror::Error;

/// Rejections found before the registry is consulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("'{name}' is not a generic struct")]
    NotGeneric { name: String },

    #[error("'{name}' expects {expected} type argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Semantic analysis handed over an argument that still contains a type
    /// parameter. A compiler bug rather than a user error.
    #[error("type argument {index} of '{name}' is not fully resolved: {ty}")]
    UnresolvedTypeArgument {
        name: String,
        index: usize,
        ty: String,
    },

    #[error(
        "type argument {index} ({ty}) does not satisfy required constraint '{bound}' on parameter '{param}'"
    )]
    ConstraintViolation {
        index: usize,
        param: String,
        bound: String,
        ty: String,
    },
}

/// Failures while generating a concrete struct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("unknown generic struct '{name}'")]
    UnknownGeneric { name: String },

    #[error("no layout known for type '{ty}'")]
    UnknownType { ty: String },

    #[error("field '{field}' of '{owner}' has unresolved type {ty}")]
    UnresolvedFieldType {
        owner: String,
        field: String,
        ty: String,
    },

    #[error("infinite generic expansion while instantiating '{ty}' (depth {depth})")]
    RecursiveInstantiation { ty: String, depth: usize },

    #[error("layout of '{ty}' overflows the address space")]
    LayoutOverflow { ty: String },

    /// The target reported an alignment that is zero or not a power of two.
    #[error("invalid layout for '{ty}': alignment {align} is not a power of two")]
    InvalidLayout { ty: String, align: u64 },

    #[error("generated symbol '{symbol}' collides with an existing definition")]
    NameCollision { symbol: String },

    #[error("failed to emit '{symbol}': {message}")]
    Emit { symbol: String, message: String },
}

/// Error returned from `Monomorphizer::instantiate` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("generic struct '{name}' is already declared with a different definition")]
    DuplicateDeclaration { name: String },

    #[error("unknown generic struct '{name}'")]
    UnknownGeneric { name: String },
}

impl InstantiationError {
    /// Errors that should be reported to the user as compile errors.
    ///
    /// The rest are compiler-internal: still recoverable, but they point at
    /// a bug upstream of monomorphization or in the backend.
    pub fn is_user_facing(&self) -> bool {
        match self {
            InstantiationError::Validation(err) => {
                !matches!(err, ValidationError::UnresolvedTypeArgument { .. })
            }
            InstantiationError::Codegen(err) => matches!(
                err,
                CodegenError::RecursiveInstantiation { .. } | CodegenError::UnknownGeneric { .. }
            ),
            InstantiationError::DuplicateDeclaration { .. }
            | InstantiationError::UnknownGeneric { .. } => true,
        }
    }

    pub fn is_recursive(&self) -> bool {
        matches!(
            self,
            InstantiationError::Codegen(CodegenError::RecursiveInstantiation { .. })
        )
    }
}
