// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Declaration AST nodes.

use crate::stmt::Block;
use vela_types::Ty;

/// Mutability of a property or parameter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mutability {
    Cst,
    Mut,
}

impl Mutability {
    /// Parse a source mutability token.
    pub fn from_token(token: &str) -> Option<Mutability> {
        match token {
            "cst" => Some(Mutability::Cst),
            "mut" => Some(Mutability::Mut),
            _ => None,
        }
    }
}

/// A property (variable) declaration, local or module-level.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyDecl {
    pub name: String,
    pub mutability: Mutability,
    pub ty: Option<Ty>,
}

/// A formal function parameter.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamDecl {
    pub name: String,
    pub mutability: Mutability,
    pub ty: Option<Ty>,
}

/// One entry of a function's capture list.
///
/// Refers to a declaration of an enclosing function by name. The capture
/// analysis that builds these lists runs before lowering; the list order is
/// the environment field order.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capture {
    pub name: String,
    /// Set when the declaration is captured by a non-escaping closure.
    /// Escaping closures must capture by value.
    pub noescape: bool,
    pub ty: Ty,
}

/// A function declaration, global or nested.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub body: Block,
    /// Ordered list of enclosing declarations this function captures.
    pub captures: Vec<Capture>,
    pub ty: Option<Ty>,
}
