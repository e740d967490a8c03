// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! JSON AST loader.
//!
//! Reads the typed-AST interchange format produced by the front-end. Every
//! node is an object carrying a `"kind"` tag from a closed set; expressions
//! and declarations additionally carry the `"type"` descriptor the type
//! checker attached. How those types were derived is the front-end's
//! business — they are consumed verbatim here.

use serde_json::Value;
use thiserror::Error;

use vela_ast::{
    Assignment, AssignOp, BinOp, Block, CallArg, Capture, Expr, ExprKind, FunctionDecl, If,
    Mutability, ParamDecl, PropertyDecl, Return, Stmt,
};
use vela_types::Ty;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid AST JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed AST at {at}: {msg}")]
    Malformed { at: String, msg: String },
}

fn malformed(at: &str, msg: impl Into<String>) -> LoaderError {
    LoaderError::Malformed {
        at: at.to_string(),
        msg: msg.into(),
    }
}

/// Parse a module body (a `Block` node) from JSON text.
pub fn load_module(source: &str) -> Result<Block, LoaderError> {
    let value: Value = serde_json::from_str(source)?;
    block(&value, "$")
}

fn kind<'a>(node: &'a Value, at: &str) -> Result<&'a str, LoaderError> {
    node.get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(at, "missing \"kind\" tag"))
}

fn str_field<'a>(node: &'a Value, field: &str, at: &str) -> Result<&'a str, LoaderError> {
    node.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(at, format!("missing \"{}\" string", field)))
}

fn node_field<'a>(node: &'a Value, field: &str, at: &str) -> Result<&'a Value, LoaderError> {
    node.get(field)
        .ok_or_else(|| malformed(at, format!("missing \"{}\" node", field)))
}

fn array_field<'a>(node: &'a Value, field: &str, at: &str) -> Result<&'a Vec<Value>, LoaderError> {
    node.get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(at, format!("missing \"{}\" array", field)))
}

// ── Types ───────────────────────────────────────────────────────

fn ty(node: &Value, at: &str) -> Result<Ty, LoaderError> {
    let name = str_field(node, "name", at)?;
    match name {
        "Int" => Ok(Ty::Int),
        "Bool" => Ok(Ty::Bool),
        "Ref" => {
            let to = node_field(node, "to", at)?;
            Ok(Ty::reference(ty(to, &format!("{}.to", at))?))
        }
        "Function" => {
            let domain = array_field(node, "domain", at)?
                .iter()
                .enumerate()
                .map(|(i, d)| ty(d, &format!("{}.domain[{}]", at, i)))
                .collect::<Result<Vec<_>, _>>()?;
            let labels = array_field(node, "labels", at)?
                .iter()
                .map(|l| {
                    l.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| malformed(at, "non-string label"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let codomain = ty(node_field(node, "codomain", at)?, &format!("{}.codomain", at))?;
            Ok(Ty::function(domain, labels, codomain))
        }
        other => Err(malformed(at, format!("unknown type \"{}\"", other))),
    }
}

/// The optional `"type"` slot of a node.
fn ty_slot(node: &Value, at: &str) -> Result<Option<Ty>, LoaderError> {
    match node.get("type") {
        Some(t) => Ok(Some(ty(t, &format!("{}.type", at))?)),
        None => Ok(None),
    }
}

// ── Statements ──────────────────────────────────────────────────

fn block(node: &Value, at: &str) -> Result<Block, LoaderError> {
    match kind(node, at)? {
        "Block" => {
            let stmts = array_field(node, "statements", at)?
                .iter()
                .enumerate()
                .map(|(i, s)| stmt(s, &format!("{}.statements[{}]", at, i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Block::new(stmts))
        }
        other => Err(malformed(at, format!("expected Block, found {}", other))),
    }
}

fn stmt(node: &Value, at: &str) -> Result<Stmt, LoaderError> {
    match kind(node, at)? {
        "PropertyDecl" => {
            let mutability = mutability(node, at)?;
            Ok(Stmt::Property(PropertyDecl {
                name: str_field(node, "name", at)?.to_string(),
                mutability,
                ty: ty_slot(node, at)?,
            }))
        }
        "FunctionDecl" => Ok(Stmt::Function(function_decl(node, at)?)),
        "Assignment" => {
            let op_token = str_field(node, "operator", at)?;
            let op = AssignOp::from_token(op_token).ok_or_else(|| {
                malformed(at, format!("unsupported assignment operator \"{}\"", op_token))
            })?;
            Ok(Stmt::Assign(Assignment {
                lvalue: expr(node_field(node, "lvalue", at)?, &format!("{}.lvalue", at))?,
                op,
                rvalue: expr(node_field(node, "rvalue", at)?, &format!("{}.rvalue", at))?,
            }))
        }
        "If" => {
            let else_block = match node.get("else") {
                Some(e) => block(e, &format!("{}.else", at))?,
                None => Block::default(),
            };
            Ok(Stmt::If(If {
                condition: expr(
                    node_field(node, "condition", at)?,
                    &format!("{}.condition", at),
                )?,
                then_block: block(node_field(node, "then", at)?, &format!("{}.then", at))?,
                else_block,
            }))
        }
        "Return" => Ok(Stmt::Return(Return {
            value: expr(node_field(node, "value", at)?, &format!("{}.value", at))?,
        })),
        "Call" => Ok(Stmt::Expr(expr(node, at)?)),
        other => Err(malformed(at, format!("unexpected statement kind {}", other))),
    }
}

fn mutability(node: &Value, at: &str) -> Result<Mutability, LoaderError> {
    let token = str_field(node, "mutability", at)?;
    Mutability::from_token(token)
        .ok_or_else(|| malformed(at, format!("unknown mutability \"{}\"", token)))
}

fn function_decl(node: &Value, at: &str) -> Result<FunctionDecl, LoaderError> {
    let params = array_field(node, "parameters", at)?
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let p_at = format!("{}.parameters[{}]", at, i);
            match kind(p, &p_at)? {
                "FunctionParameter" => Ok(ParamDecl {
                    name: str_field(p, "name", &p_at)?.to_string(),
                    mutability: mutability(p, &p_at)?,
                    ty: ty_slot(p, &p_at)?,
                }),
                other => Err(malformed(
                    &p_at,
                    format!("expected FunctionParameter, found {}", other),
                )),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    // The capture list is produced by an earlier analysis; a missing field
    // means the function captures nothing.
    let captures = match node.get("captures") {
        Some(list) => list
            .as_array()
            .ok_or_else(|| malformed(at, "\"captures\" is not an array"))?
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let c_at = format!("{}.captures[{}]", at, i);
                Ok::<Capture, LoaderError>(Capture {
                    name: str_field(c, "name", &c_at)?.to_string(),
                    noescape: c.get("noescape").and_then(Value::as_bool).unwrap_or(true),
                    ty: ty(node_field(c, "type", &c_at)?, &format!("{}.type", c_at))?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(FunctionDecl {
        name: str_field(node, "name", at)?.to_string(),
        params,
        body: block(node_field(node, "body", at)?, &format!("{}.body", at))?,
        captures,
        ty: ty_slot(node, at)?,
    })
}

// ── Expressions ─────────────────────────────────────────────────

fn expr(node: &Value, at: &str) -> Result<Expr, LoaderError> {
    let slot = ty_slot(node, at)?;
    let kind = match kind(node, at)? {
        "Identifier" => ExprKind::Ident(str_field(node, "name", at)?.to_string()),
        "Literal" => {
            let value = node_field(node, "value", at)?;
            if let Some(b) = value.as_bool() {
                ExprKind::Bool(b)
            } else if let Some(n) = value.as_i64() {
                ExprKind::Int(n)
            } else {
                return Err(malformed(at, "literal value is neither integer nor boolean"));
            }
        }
        "Call" => {
            let args = array_field(node, "arguments", at)?
                .iter()
                .enumerate()
                .map(|(i, a)| call_arg(a, &format!("{}.arguments[{}]", at, i)))
                .collect::<Result<Vec<_>, _>>()?;
            ExprKind::Call {
                callee: Box::new(expr(
                    node_field(node, "callee", at)?,
                    &format!("{}.callee", at),
                )?),
                args,
            }
        }
        "BinaryExpr" => {
            let op_token = str_field(node, "operator", at)?;
            let op = BinOp::from_token(op_token).ok_or_else(|| {
                malformed(at, format!("unknown binary operator \"{}\"", op_token))
            })?;
            ExprKind::Binary {
                op,
                left: Box::new(expr(node_field(node, "left", at)?, &format!("{}.left", at))?),
                right: Box::new(expr(
                    node_field(node, "right", at)?,
                    &format!("{}.right", at),
                )?),
            }
        }
        other => return Err(malformed(at, format!("unexpected expression kind {}", other))),
    };

    // Literals may leave the slot implicit; everything else carries what
    // the checker attached (possibly nothing — lowering will fail fast).
    let slot = match (&kind, slot) {
        (_, Some(ty)) => Some(ty),
        (ExprKind::Int(_), None) => Some(Ty::Int),
        (ExprKind::Bool(_), None) => Some(Ty::Bool),
        (_, None) => None,
    };

    Ok(match slot {
        Some(ty) => Expr::new(kind, ty),
        None => Expr::untyped(kind),
    })
}

fn call_arg(node: &Value, at: &str) -> Result<CallArg, LoaderError> {
    match kind(node, at)? {
        "CallArgument" => {
            let op = match node.get("operator").and_then(Value::as_str) {
                Some(token) => AssignOp::from_token(token).ok_or_else(|| {
                    malformed(at, format!("unsupported argument operator \"{}\"", token))
                })?,
                None => AssignOp::Copy,
            };
            let label = node
                .get("label")
                .and_then(Value::as_str)
                .map(str::to_string);
            let mut arg = CallArg::new(
                label,
                expr(node_field(node, "value", at)?, &format!("{}.value", at))?,
            );
            arg.op = op;
            Ok(arg)
        }
        other => Err(malformed(
            at,
            format!("expected CallArgument, found {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_property_and_assignment() {
        let source = r#"{
            "kind": "Block",
            "statements": [
                { "kind": "PropertyDecl", "name": "x", "mutability": "mut",
                  "type": { "name": "Int" } },
                { "kind": "Assignment", "operator": "=",
                  "lvalue": { "kind": "Identifier", "name": "x",
                              "type": { "name": "Int" } },
                  "rvalue": { "kind": "Literal", "value": 5 } }
            ]
        }"#;
        let block = load_module(source).unwrap();
        assert_eq!(block.stmts.len(), 2);
        assert!(matches!(&block.stmts[0], Stmt::Property(p) if p.name == "x"));
        assert!(matches!(
            &block.stmts[1],
            Stmt::Assign(a) if a.op == AssignOp::Copy
        ));
    }

    #[test]
    fn loads_function_with_captures() {
        let source = r#"{
            "kind": "Block",
            "statements": [
                { "kind": "FunctionDecl", "name": "g",
                  "parameters": [
                      { "kind": "FunctionParameter", "name": "y",
                        "mutability": "cst", "type": { "name": "Int" } }
                  ],
                  "captures": [
                      { "name": "x", "noescape": true, "type": { "name": "Int" } }
                  ],
                  "body": { "kind": "Block", "statements": [
                      { "kind": "Return",
                        "value": { "kind": "Identifier", "name": "x",
                                   "type": { "name": "Int" } } }
                  ] },
                  "type": { "name": "Function",
                            "domain": [ { "name": "Int" } ],
                            "labels": [ "y" ],
                            "codomain": { "name": "Int" } } }
            ]
        }"#;
        let block = load_module(source).unwrap();
        let Stmt::Function(decl) = &block.stmts[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(decl.captures.len(), 1);
        assert_eq!(decl.captures[0].name, "x");
        assert!(decl.captures[0].noescape);
        assert!(matches!(decl.ty, Some(Ty::Function { .. })));
    }

    #[test]
    fn reference_types_nest() {
        let source = r#"{
            "kind": "Block",
            "statements": [
                { "kind": "PropertyDecl", "name": "r", "mutability": "mut",
                  "type": { "name": "Ref", "to": { "name": "Int" } } }
            ]
        }"#;
        let block = load_module(source).unwrap();
        let Stmt::Property(p) = &block.stmts[0] else {
            panic!("expected a property declaration");
        };
        assert_eq!(p.ty, Some(Ty::reference(Ty::Int)));
    }

    #[test]
    fn assignment_operator_tokens_map_to_flavours() {
        for (token, expected) in [
            ("=", AssignOp::Copy),
            ("&-", AssignOp::Ref),
            ("<-", AssignOp::Move),
        ] {
            let source = format!(
                r#"{{
                    "kind": "Block",
                    "statements": [
                        {{ "kind": "Assignment", "operator": "{}",
                           "lvalue": {{ "kind": "Identifier", "name": "x" }},
                           "rvalue": {{ "kind": "Identifier", "name": "y" }} }}
                    ]
                }}"#,
                token
            );
            let block = load_module(&source).unwrap();
            assert!(matches!(&block.stmts[0], Stmt::Assign(a) if a.op == expected));
        }
    }

    #[test]
    fn unknown_kind_is_rejected_with_path() {
        let source = r#"{
            "kind": "Block",
            "statements": [ { "kind": "WhileLoop" } ]
        }"#;
        let err = load_module(source).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("$.statements[0]"));
        assert!(text.contains("WhileLoop"));
    }

    #[test]
    fn reserved_assignment_operator_is_rejected() {
        let source = r#"{
            "kind": "Block",
            "statements": [
                { "kind": "Assignment", "operator": "?=",
                  "lvalue": { "kind": "Identifier", "name": "x" },
                  "rvalue": { "kind": "Literal", "value": 1 } }
            ]
        }"#;
        let err = load_module(source).unwrap_err();
        assert!(err.to_string().contains("unsupported assignment operator"));
    }

    #[test]
    fn loaded_module_lowers_end_to_end() {
        let source = r#"{
            "kind": "Block",
            "statements": [
                { "kind": "PropertyDecl", "name": "z", "mutability": "mut",
                  "type": { "name": "Int" } },
                { "kind": "FunctionDecl", "name": "f",
                  "parameters": [
                      { "kind": "FunctionParameter", "name": "x",
                        "mutability": "cst", "type": { "name": "Int" } }
                  ],
                  "body": { "kind": "Block", "statements": [
                      { "kind": "PropertyDecl", "name": "y", "mutability": "mut",
                        "type": { "name": "Ref", "to": { "name": "Int" } } },
                      { "kind": "Assignment", "operator": "&-",
                        "lvalue": { "kind": "Identifier", "name": "y",
                                    "type": { "name": "Ref", "to": { "name": "Int" } } },
                        "rvalue": { "kind": "Identifier", "name": "z",
                                    "type": { "name": "Int" } } },
                      { "kind": "Assignment", "operator": "=",
                        "lvalue": { "kind": "Identifier", "name": "y",
                                    "type": { "name": "Ref", "to": { "name": "Int" } } },
                        "rvalue": { "kind": "Identifier", "name": "x",
                                    "type": { "name": "Int" } } },
                      { "kind": "Return",
                        "value": { "kind": "Identifier", "name": "y",
                                   "type": { "name": "Ref", "to": { "name": "Int" } } } }
                  ] },
                  "type": { "name": "Function",
                            "domain": [ { "name": "Int" } ],
                            "labels": [ "x" ],
                            "codomain": { "name": "Int" } } },
                { "kind": "Call",
                  "callee": { "kind": "Identifier", "name": "f",
                              "type": { "name": "Function",
                                        "domain": [ { "name": "Int" } ],
                                        "labels": [ "x" ],
                                        "codomain": { "name": "Int" } } },
                  "arguments": [
                      { "kind": "CallArgument", "label": "x", "operator": "=",
                        "value": { "kind": "Literal", "value": 42 } }
                  ],
                  "type": { "name": "Int" } }
            ]
        }"#;
        let ast = load_module(source).unwrap();
        let gen = vela_irgen::lower("e2e", &ast).unwrap();
        let text = gen.display();
        assert!(text.contains("function %f(i64) -> i64"));
        assert!(text.contains("; global z: 8 bytes"));
        assert!(text.contains("call fn"));
    }
}
