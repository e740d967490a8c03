// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement AST nodes.

use crate::decl::{FunctionDecl, PropertyDecl};
use crate::expr::Expr;

/// A block of statements (a function body or the module body).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Block {
        Block { stmts }
    }
}

/// A statement.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stmt {
    Property(PropertyDecl),
    Function(FunctionDecl),
    Assign(Assignment),
    If(If),
    Return(Return),
    /// An expression in statement position (a call whose value is dropped).
    Expr(Expr),
}

/// An assignment statement.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub lvalue: Expr,
    pub op: AssignOp,
    pub rvalue: Expr,
}

/// The three assignment flavours of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AssignOp {
    /// Value copy (`=`)
    Copy,
    /// Reference bind (`&-`)
    Ref,
    /// Move (`<-`) — preserved in the AST for later passes; the back-end
    /// currently lowers it like a copy.
    Move,
}

impl AssignOp {
    /// Parse a source operator token.
    pub fn from_token(token: &str) -> Option<AssignOp> {
        match token {
            "=" => Some(AssignOp::Copy),
            "&-" => Some(AssignOp::Ref),
            "<-" => Some(AssignOp::Move),
            _ => None,
        }
    }
}

/// A conditional statement. An absent else branch is an empty block.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct If {
    pub condition: Expr,
    pub then_block: Block,
    pub else_block: Block,
}

/// A return statement.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Return {
    pub value: Expr,
}
