// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Typed AST for the Vela source language.
//!
//! Nodes arrive here already parsed, name-resolved, and type-annotated; the
//! `ty` slots are filled by the type checker and consumed verbatim by the IR
//! lowering pass. Ownership is tree-shaped: a parent node exclusively owns
//! its children. Capture lists refer to enclosing declarations by name, not
//! by pointer.

mod decl;
mod expr;
mod stmt;

pub use decl::{Capture, FunctionDecl, Mutability, ParamDecl, PropertyDecl};
pub use expr::{BinOp, CallArg, Expr, ExprKind};
pub use stmt::{AssignOp, Assignment, Block, If, Return, Stmt};
