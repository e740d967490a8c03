// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Lowering visitor — walks the typed AST and emits IR.
//!
//! Every expression pushes its value onto the visitor's value stack for the
//! parent node to consume; the stack must drain to empty after each
//! statement. Statements either emit into the current insertion point or,
//! at module scope, redirect into `main`'s entry block. The insertion point
//! never survives the boundary between one top-level statement and the
//! next module-level declaration.

use cranelift::prelude::*;
use cranelift_module::Linkage;
use log::debug;

use vela_ast::{
    Assignment, AssignOp, Block as AstBlock, Expr, ExprKind, FunctionDecl, If, PropertyDecl,
    Return, Stmt,
};
use vela_types::Ty;

use crate::builder::{FuncHandle, IrBuilder, PTR_TYPE};
use crate::closures::{copy_record, load_func_ptr, store_record, CLOSURE_SIZE};
use crate::env::{ClosureInfo, SymbolEnv};
use crate::types::{
    byte_size, capture_param_type, function_signature, lifted_signature, lowered_type,
};
use crate::{IrGenError, IrGenResult};

/// The return space of a function under emission.
struct ReturnCtx {
    slot: Value,
    ty: Ty,
}

/// Lower a whole module body: create `main`, walk the block, seal `main`
/// with a zero exit status.
pub fn lower(module_name: &str, body: &AstBlock) -> IrGenResult<IrGen> {
    let mut gen = IrGen::new(module_name)?;
    gen.add_main_function()?;
    gen.visit_module_body(body)?;
    gen.finish_main_function(None)?;
    Ok(gen)
}

pub struct IrGen {
    builder: IrBuilder,
    env: SymbolEnv,
    /// Values of already-emitted child expressions, awaiting their parent.
    pub(crate) stack: Vec<Value>,
    /// Return contexts, parallel to the local frames.
    rets: Vec<ReturnCtx>,
    main: Option<FuncHandle>,
    /// The open tail block of `main` that the next top-level statement
    /// resumes in (entry until top-level control flow moves it).
    main_tail: Option<Block>,
}

impl std::fmt::Debug for IrGen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrGen").finish_non_exhaustive()
    }
}

impl IrGen {
    pub fn new(module_name: &str) -> IrGenResult<Self> {
        Ok(IrGen {
            builder: IrBuilder::new(module_name)?,
            env: SymbolEnv::new(),
            stack: Vec::new(),
            rets: Vec::new(),
            main: None,
            main_tail: None,
        })
    }

    /// Add a `main` function to the module under generation:
    /// `(i32, i8**) -> i32` with an empty entry block. The insertion point
    /// stays inactive until a top-level statement needs it.
    pub fn add_main_function(&mut self) -> IrGenResult<()> {
        let mut sig = self.builder.make_signature();
        sig.params.push(AbiParam::new(types::I32));
        sig.params.push(AbiParam::new(PTR_TYPE));
        sig.returns.push(AbiParam::new(types::I32));
        let f = self.builder.declare_function("main", sig, Linkage::Export)?;
        let entry = self.builder.create_entry_block(f);
        self.main = Some(f);
        self.main_tail = Some(entry);
        debug!("added main function");
        Ok(())
    }

    /// Seal `main` with a return of `exit_status` (zero by default) in its
    /// open tail block.
    pub fn finish_main_function(&mut self, exit_status: Option<i64>) -> IrGenResult<()> {
        let f = self.main.ok_or(IrGenError::NoInsertionPoint)?;
        let tail = self.main_tail.ok_or(IrGenError::NoInsertionPoint)?;
        self.builder.set_insert_point(f, tail);
        let status = self.builder.iconst(types::I32, exit_status.unwrap_or(0))?;
        self.builder.ret(&[status])?;
        self.builder.clear_insert_point();
        self.builder.verify(f)
    }

    /// Visit the module body, dropping the insertion point at every
    /// statement boundary so module-level declarations never observe a
    /// stale one.
    pub fn visit_module_body(&mut self, block: &AstBlock) -> IrGenResult<()> {
        for stmt in &block.stmts {
            self.visit_stmt(stmt)?;
            if let Some(ip) = self.builder.insert_point() {
                if Some(ip.func) == self.main {
                    self.main_tail = Some(ip.block);
                }
                self.builder.clear_insert_point();
            }
        }
        Ok(())
    }

    /// The module as CLIF text.
    pub fn display(&self) -> String {
        self.builder.display()
    }

    /// Compile every function and emit the native object file.
    pub fn finish(self) -> IrGenResult<Vec<u8>> {
        self.builder.finish()
    }

    // ── Statements ──────────────────────────────────────────────

    fn visit_block(&mut self, block: &AstBlock) -> IrGenResult<()> {
        for stmt in &block.stmts {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> IrGenResult<()> {
        match stmt {
            Stmt::Property(node) => self.visit_property(node)?,
            Stmt::Function(node) => self.visit_function(node)?,
            Stmt::Assign(node) => self.visit_assignment(node)?,
            Stmt::If(node) => self.visit_if(node)?,
            Stmt::Return(node) => self.visit_return(node)?,
            Stmt::Expr(expr) => {
                // Statement position: the value is produced and dropped.
                self.visit_expr(expr)?;
                self.pop_value()?;
            }
        }
        if !self.stack.is_empty() {
            return Err(IrGenError::ValueStackImbalance);
        }
        Ok(())
    }

    fn visit_property(&mut self, node: &PropertyDecl) -> IrGenResult<()> {
        let ty = node.ty.as_ref().ok_or(IrGenError::UntypedNode)?;

        if !self.builder.is_active() {
            // Module scope: a zero-initialised storage slot with module
            // linkage. Integers start at zero, references at null.
            self.builder.declare_global(&node.name, byte_size(ty))?;
            self.env.insert_global(&node.name);
        } else {
            // Function scope: an entry-block slot. Reference-typed
            // properties get a pointer-sized slot and no initialiser; the
            // reference bind that follows will set it.
            let slot = self.builder.alloca(byte_size(ty), &node.name)?;
            self.env.insert_local(&node.name, slot);
        }
        Ok(())
    }

    fn visit_assignment(&mut self, node: &Assignment) -> IrGenResult<()> {
        if !self.builder.is_active() {
            self.move_to_main()?;
        }

        // Until select and subscript expressions land, the lvalue is
        // always an identifier.
        let ExprKind::Ident(name) = &node.lvalue.kind else {
            return Err(IrGenError::InvalidLvalue);
        };
        let var_loc = self.address_of(name)?;

        match node.op {
            // Move currently has the same observable semantics as copy for
            // the supported scalar types; a later pass may specialise it.
            AssignOp::Copy | AssignOp::Move => self.emit_copy_assignment(node, var_loc),
            AssignOp::Ref => self.emit_reference_assignment(node, var_loc),
        }
    }

    fn emit_copy_assignment(&mut self, node: &Assignment, var_loc: Value) -> IrGenResult<()> {
        self.visit_expr(&node.rvalue)?;
        let mut value = self.pop_value()?;

        let lvalue_ty = node.lvalue.ty.as_ref().ok_or(IrGenError::UntypedNode)?;
        let rvalue_ty = node.rvalue.ty.as_ref().ok_or(IrGenError::UntypedNode)?;

        // Dereference either side once if it is a reference. A reference to
        // a function value already holds the record address the copy below
        // reads from, so only primitive pointees load through.
        let mut dest = var_loc;
        if lvalue_ty.is_reference() {
            dest = self.builder.load(PTR_TYPE, dest)?;
        }
        if let Some(inner) = rvalue_ty.referred() {
            if inner.is_primitive() {
                value = self.builder.load(lowered_type(inner), value)?;
            }
        }

        let assigned = lvalue_ty.referred().unwrap_or(lvalue_ty);
        if assigned.is_primitive() {
            self.builder.store(value, dest)
        } else {
            // Function values are whole closure records; move both words.
            copy_record(&mut self.builder, value, dest)
        }
    }

    fn emit_reference_assignment(&mut self, node: &Assignment, var_loc: Value) -> IrGenResult<()> {
        let ExprKind::Ident(rvalue_name) = &node.rvalue.kind else {
            return Err(IrGenError::RefRvalueNotIdentifier);
        };
        let ref_loc = self.address_of(rvalue_name)?;
        self.builder.store(ref_loc, var_loc)
    }

    fn visit_if(&mut self, node: &If) -> IrGenResult<()> {
        if !self.builder.is_active() {
            self.move_to_main()?;
        }

        self.visit_expr(&node.condition)?;
        let condition = self.pop_value()?;

        let f = self
            .builder
            .insert_point()
            .ok_or(IrGenError::NoInsertionPoint)?
            .func;

        let then_block = self.builder.create_block(f);
        self.builder.append_block(f, then_block);
        let else_block = self.builder.create_block(f);
        let cont_block = self.builder.create_block(f);

        self.builder.cond_br(condition, then_block, else_block)?;

        self.builder.set_insert_point(f, then_block);
        self.visit_block(&node.then_block)?;
        self.builder.br(cont_block)?;

        self.builder.append_block(f, else_block);
        self.builder.set_insert_point(f, else_block);
        self.visit_block(&node.else_block)?;
        self.builder.br(cont_block)?;

        // The continuation block becomes the insertion point; an `If` has
        // no value and emits no phi.
        self.builder.append_block(f, cont_block);
        self.builder.set_insert_point(f, cont_block);
        Ok(())
    }

    fn visit_return(&mut self, node: &Return) -> IrGenResult<()> {
        if !self.builder.is_active() || self.rets.is_empty() {
            return Err(IrGenError::ReturnOutsideFunction);
        }

        self.visit_expr(&node.value)?;
        let mut value = self.pop_value()?;

        let value_ty = node.value.ty.as_ref().ok_or(IrGenError::UntypedNode)?;
        if let Some(inner) = value_ty.referred() {
            if inner.is_primitive() {
                value = self.builder.load(lowered_type(inner), value)?;
            }
        }

        // Store into the return space; the terminator that hands it back
        // is emitted once, at the end of the function body.
        let slot = match self.rets.last() {
            Some(ctx) => ctx.slot,
            None => return Err(IrGenError::ReturnOutsideFunction),
        };
        let returned = value_ty.referred().unwrap_or(value_ty);
        if returned.is_primitive() {
            self.builder.store(value, slot)
        } else {
            copy_record(&mut self.builder, value, slot)
        }
    }

    fn visit_function(&mut self, node: &FunctionDecl) -> IrGenResult<()> {
        let fn_ty = node.ty.as_ref().ok_or(IrGenError::UntypedNode)?;
        let (domain, codomain) = match fn_ty {
            Ty::Function { domain, codomain, .. } => (domain.as_slice(), codomain.as_ref()),
            _ => return Err(IrGenError::UntypedNode),
        };

        let nested = self.builder.is_active();

        // With captures, the signature is lifted: one leading parameter per
        // capture-list entry. Non-escaping captures are taken by reference
        // (a pointer into the enclosing frame); escaping ones by value.
        let free_types: Vec<Type> = node.captures.iter().map(capture_param_type).collect();
        let base = self.builder.make_signature();
        let sig = if node.captures.is_empty() {
            function_signature(base, domain, codomain)
        } else {
            lifted_signature(base, &free_types, domain, codomain)
        };

        let linkage = if nested { Linkage::Local } else { Linkage::Export };
        let f = self.builder.declare_function(&node.name, sig.clone(), linkage)?;
        debug!("lowering function `{}`", node.name);

        let entry = self.builder.create_entry_block(f);
        let saved = self.builder.insert_point();
        self.builder.set_insert_point(f, entry);

        // Return space.
        let ret_slot = self.builder.alloca(byte_size(codomain), "rv")?;
        self.rets.push(ReturnCtx {
            slot: ret_slot,
            ty: codomain.clone(),
        });

        // Each formal parameter — capture parameters first when the
        // signature is lifted — gets an entry-block slot holding the
        // incoming argument.
        self.env.push_frame();
        let mut incoming = self.builder.block_params(f, entry).into_iter();

        for capture in &node.captures {
            let value = incoming
                .next()
                .ok_or_else(|| IrGenError::Module("parameter list too short".to_string()))?;
            if capture.noescape {
                // Captured by reference: the slot holds a pointer into the
                // enclosing frame, and lookups dereference it once.
                let slot = self.builder.alloca(PTR_TYPE.bytes(), &capture.name)?;
                self.builder.store(value, slot)?;
                self.env.insert_local(&capture.name, slot);
                self.env.mark_captured(&capture.name);
            } else {
                // Escaping: captured by value.
                let slot = self.builder.alloca(byte_size(&capture.ty), &capture.name)?;
                if capture.ty.is_primitive() {
                    self.builder.store(value, slot)?;
                } else {
                    copy_record(&mut self.builder, value, slot)?;
                }
                self.env.insert_local(&capture.name, slot);
            }
        }
        for param in &node.params {
            let ty = param.ty.as_ref().ok_or(IrGenError::UntypedNode)?;
            let value = incoming
                .next()
                .ok_or_else(|| IrGenError::Module("parameter list too short".to_string()))?;
            let slot = self.builder.alloca(byte_size(ty), &param.name)?;
            if ty.is_primitive() {
                self.builder.store(value, slot)?;
            } else {
                // Function-typed arguments arrive as a record pointer.
                copy_record(&mut self.builder, value, slot)?;
            }
            self.env.insert_local(&param.name, slot);
        }

        self.visit_block(&node.body)?;

        // A single post-body terminator hands the return space back.
        // Return statements only store into it; a body whose last
        // statement was a Return falls through to here. Function-typed
        // results travel as a pointer to the record.
        let ctx = self
            .rets
            .pop()
            .ok_or(IrGenError::ReturnOutsideFunction)?;
        let result = if ctx.ty.is_primitive() {
            self.builder.load(lowered_type(&ctx.ty), ctx.slot)?
        } else {
            ctx.slot
        };
        self.builder.ret(&[result])?;

        self.env.pop_frame();

        match saved {
            Some(ip) => self.builder.set_insert_point(ip.func, ip.block),
            None => self.builder.clear_insert_point(),
        }

        // Structural well-formedness check of the emitted code.
        self.builder.verify(f)?;

        // A nested function becomes a first-class value in the enclosing
        // frame: a closure record of the lifted code address and a null
        // environment. Escaping closures would heap-allocate and populate
        // an environment struct here instead.
        if nested {
            let slot = self.builder.alloca(CLOSURE_SIZE, &node.name)?;
            let code = self.builder.func_addr(f)?;
            let raw = self.builder.bitcast(code);
            let null = self.builder.iconst(PTR_TYPE, 0)?;
            store_record(&mut self.builder, slot, raw, null)?;

            self.env.record_closure(
                &node.name,
                ClosureInfo {
                    captures: node.captures.clone(),
                    sig,
                },
            );
            self.env.insert_local(&node.name, slot);
        }

        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────

    fn visit_expr(&mut self, expr: &Expr) -> IrGenResult<()> {
        match &expr.kind {
            ExprKind::Int(value) => {
                let constant = self.builder.iconst(types::I64, *value)?;
                self.stack.push(constant);
            }
            ExprKind::Bool(value) => {
                let constant = self.builder.iconst(types::I8, i64::from(*value))?;
                self.stack.push(constant);
            }
            ExprKind::Ident(name) => {
                let ty = expr.ty.as_ref().ok_or(IrGenError::UntypedNode)?;
                let addr = self.address_of(name)?;
                // Function values are whole closure records and travel as
                // the address of their storage.
                let value = if ty.is_primitive() {
                    self.builder.load(lowered_type(ty), addr)?
                } else {
                    addr
                };
                self.stack.push(value);
            }
            ExprKind::Binary { op, left, right } => {
                self.visit_expr(left)?;
                self.visit_expr(right)?;
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                let result = match op {
                    vela_ast::BinOp::Add => self.builder.iadd(lhs, rhs)?,
                    vela_ast::BinOp::Sub => self.builder.isub(lhs, rhs)?,
                    vela_ast::BinOp::Mul => self.builder.imul(lhs, rhs)?,
                    vela_ast::BinOp::Div => self.builder.sdiv(lhs, rhs)?,
                };
                self.stack.push(result);
            }
            ExprKind::Call { .. } => self.visit_call(expr)?,
        }
        Ok(())
    }

    fn visit_call(&mut self, expr: &Expr) -> IrGenResult<()> {
        if !self.builder.is_active() {
            self.move_to_main()?;
        }

        let ExprKind::Call { callee, args } = &expr.kind else {
            return Err(IrGenError::InvalidCallee);
        };
        let ExprKind::Ident(name) = &callee.kind else {
            return Err(IrGenError::InvalidCallee);
        };

        // Call arguments are passed by copy; the other operator flavours
        // are reserved.
        for arg in args {
            if arg.op != AssignOp::Copy {
                return Err(IrGenError::UnsupportedOperator);
            }
        }

        if !self.env.current_frame_contains(name) {
            // Module-level function: direct call by symbol.
            let callee = self
                .builder
                .function(name)
                .ok_or_else(|| IrGenError::UnknownFunction(name.clone()))?;
            let expected = self.builder.arity(callee);
            if args.len() != expected {
                return Err(IrGenError::ArityMismatch {
                    name: name.clone(),
                    expected,
                    got: args.len(),
                });
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                self.visit_expr(&arg.value)?;
                values.push(self.pop_value()?);
            }
            let result = self.builder.call(callee, &values)?;
            self.stack.push(result);
        } else {
            // Local closure: load the code pointer out of the record, cast
            // it to the lifted function-pointer type, and call indirectly
            // with the captures prepended in capture-list order.
            let info = self
                .env
                .closure(name)
                .cloned()
                .ok_or_else(|| IrGenError::UnknownFunction(name.clone()))?;
            let closure_loc = self.address_of(name)?;
            let raw = load_func_ptr(&mut self.builder, closure_loc)?;
            let code = self.builder.bitcast(raw);

            let mut values = Vec::with_capacity(info.captures.len() + args.len());
            for capture in &info.captures {
                let addr = self.address_of(&capture.name)?;
                let value = if capture.noescape {
                    // Captured by reference: pass the slot's address. When
                    // the current function captured the name itself, the
                    // resolved address is already the original slot.
                    addr
                } else if capture.ty.is_primitive() {
                    // Escaping: captured by value.
                    self.builder.load(lowered_type(&capture.ty), addr)?
                } else {
                    // Function-typed records travel by address either way.
                    addr
                };
                values.push(value);
            }
            for arg in args {
                self.visit_expr(&arg.value)?;
                values.push(self.pop_value()?);
            }
            let result = self.builder.call_indirect(info.sig, code, &values)?;
            self.stack.push(result);
        }
        Ok(())
    }

    // ── Symbol resolution ───────────────────────────────────────

    /// The address of `name`, usable as a store destination or load source.
    ///
    /// Resolution order: the current frame — with one extra dereference
    /// for captured-by-reference entries, whose slots hold a pointer into
    /// the enclosing frame — then the module-level globals.
    fn address_of(&mut self, name: &str) -> IrGenResult<Value> {
        if let Some(slot) = self.env.lookup_local(name) {
            if self.env.is_captured(name) {
                return self.builder.load(PTR_TYPE, slot);
            }
            return Ok(slot);
        }

        if self.env.is_global(name) {
            return self.builder.global_addr(name);
        }

        Err(IrGenError::UndefinedSymbol(name.to_string()))
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn pop_value(&mut self) -> IrGenResult<Value> {
        self.stack.pop().ok_or(IrGenError::ValueStackImbalance)
    }

    /// Redirect emission into `main`'s open tail block for a statement at
    /// module scope.
    fn move_to_main(&mut self) -> IrGenResult<()> {
        match (self.main, self.main_tail) {
            (Some(f), Some(block)) => {
                self.builder.set_insert_point(f, block);
                Ok(())
            }
            _ => Err(IrGenError::NoInsertionPoint),
        }
    }
}
