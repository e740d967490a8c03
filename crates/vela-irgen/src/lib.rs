// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Vela code generator — typed AST → Cranelift IR.
//!
//! The input AST arrives parsed, name-resolved, and type-annotated; this
//! crate walks it and emits SSA-form IR into an in-memory module. It covers
//! allocation policy for locals and globals, the memory semantics of the
//! three assignment flavours (copy, reference bind, move), closure
//! conversion for nested functions, and control-flow emission for
//! conditionals and returns. The resulting module can be printed as CLIF
//! text or compiled down to a native object file.

mod builder;
mod closures;
mod env;
mod lower;
mod types;

pub use builder::{FuncHandle, InsertPoint, IrBuilder, PTR_TYPE};
pub use lower::{lower, IrGen};

use thiserror::Error;

/// Errors surfaced by the lowering pass.
///
/// All of these abort the pass synchronously; no partial IR module is
/// handed back to the caller.
#[derive(Debug, Error)]
pub enum IrGenError {
    #[error("untyped node reached during lowering")]
    UntypedNode,
    #[error("invalid lvalue for assignment")]
    InvalidLvalue,
    #[error("reference assignment to non-identifier rvalue")]
    RefRvalueNotIdentifier,
    #[error("call of a non-identifier callee")]
    InvalidCallee,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("invalid number of arguments for `{name}`: expected {expected}, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),
    #[error("return statement outside of a function body")]
    ReturnOutsideFunction,
    #[error("no insertion point for top-level statement")]
    NoInsertionPoint,
    #[error("unsupported operator")]
    UnsupportedOperator,
    #[error("value stack imbalance after statement")]
    ValueStackImbalance,
    #[error("emission into a terminated block")]
    TerminatedBlock,
    #[error("module error: {0}")]
    Module(String),
    #[error("verifier error: {0}")]
    Verifier(String),
}

pub type IrGenResult<T> = Result<T, IrGenError>;
