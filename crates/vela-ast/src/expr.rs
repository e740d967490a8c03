// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression AST nodes.

use crate::stmt::AssignOp;
use vela_types::Ty;

/// An expression in the AST.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Expr {
    pub kind: ExprKind,
    /// Type annotation attached by the type checker. Lowering an expression
    /// whose slot is still empty is an error.
    pub ty: Option<Ty>,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty) -> Expr {
        Expr { kind, ty: Some(ty) }
    }

    /// An expression with an empty type slot (pre-checking).
    pub fn untyped(kind: ExprKind) -> Expr {
        Expr { kind, ty: None }
    }
}

/// The kind of expression.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprKind {
    /// Integer literal
    Int(i64),
    /// Boolean literal
    Bool(bool),
    /// Identifier
    Ident(String),
    /// Binary operation
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call
    Call {
        callee: Box<Expr>,
        args: Vec<CallArg>,
    },
}

/// A labelled call argument.
///
/// The label and passing operator are recorded by the parser but not checked
/// during lowering; only copy-passing (`=`) is lowered today.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallArg {
    pub label: Option<String>,
    pub op: AssignOp,
    pub value: Expr,
}

impl CallArg {
    pub fn new(label: Option<String>, value: Expr) -> CallArg {
        CallArg {
            label,
            op: AssignOp::Copy,
            value,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Parse a source operator token.
    pub fn from_token(token: &str) -> Option<BinOp> {
        match token {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            "*" => Some(BinOp::Mul),
            "/" => Some(BinOp::Div),
            _ => None,
        }
    }
}
