// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Type descriptors for the Vela source language.
//!
//! The type checker annotates every AST expression and declaration with one
//! of these descriptors before the IR lowering pass runs. Descriptors are
//! value-like and cheap to clone; identity is semantic (two `Int`s compare
//! equal, `Ref(T)` is distinct from `T`).

mod types;

pub use types::Ty;
