// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Thin IR builder over Cranelift — module, functions, blocks, slots.
//!
//! Wraps an `ObjectModule` and raw `cranelift-codegen` functions driven by
//! cursors. The lowering pass is slot-based (every local lives in a stack
//! slot addressed by pointer), so no SSA variable book-keeping is needed,
//! and several functions stay in flight at once: `main` plus a global
//! function plus whatever nested functions it declares. The insertion point
//! is either `active(block)` inside one of them or inactive between
//! module-level declarations.

use cranelift::prelude::*;
use cranelift_codegen::cursor::{Cursor, FuncCursor};
use cranelift_codegen::ir::{self, FuncRef, GlobalValue, StackSlotData, StackSlotKind, UserFuncName};
use cranelift_codegen::verifier::verify_function;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::{IrGenError, IrGenResult};

/// Pointer representation on the 64-bit targets this back-end addresses.
pub const PTR_TYPE: Type = types::I64;

/// Handle to a function under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncHandle(usize);

/// An active insertion point: the block currently receiving instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub func: FuncHandle,
    pub block: Block,
}

struct FuncState {
    name: String,
    id: FuncId,
    func: ir::Function,
    entry: Option<Block>,
    /// Imported callees (module function name → function-local FuncRef)
    func_refs: HashMap<String, FuncRef>,
    /// Imported data objects (global name → function-local GlobalValue)
    data_refs: HashMap<String, GlobalValue>,
    /// Blocks already closed by a terminator
    terminated: HashSet<Block>,
}

pub struct IrBuilder {
    module: ObjectModule,
    flags: settings::Flags,
    /// Functions in creation order; module text and definition order follow it.
    funcs: Vec<FuncState>,
    func_index: HashMap<String, FuncHandle>,
    data_ids: HashMap<String, DataId>,
    /// Globals in declaration order, for deterministic module text.
    data_order: Vec<(String, u32)>,
    insert: Option<InsertPoint>,
}

impl IrBuilder {
    pub fn new(module_name: &str) -> IrGenResult<Self> {
        let flags = settings::Flags::new(settings::builder());
        let isa_builder =
            cranelift_native::builder().map_err(|e| IrGenError::Module(e.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(settings::builder()))
            .map_err(|e| IrGenError::Module(e.to_string()))?;

        let builder = ObjectBuilder::new(
            isa,
            module_name,
            cranelift_module::default_libcall_names(),
        )
        .map_err(|e| IrGenError::Module(e.to_string()))?;

        Ok(IrBuilder {
            module: ObjectModule::new(builder),
            flags,
            funcs: Vec::new(),
            func_index: HashMap::new(),
            data_ids: HashMap::new(),
            data_order: Vec::new(),
            insert: None,
        })
    }

    /// An empty signature with the target's default calling convention.
    pub fn make_signature(&self) -> Signature {
        self.module.make_signature()
    }

    // ── Functions and blocks ────────────────────────────────────

    /// Declare a function in the module and start building its body.
    pub fn declare_function(
        &mut self,
        name: &str,
        sig: Signature,
        linkage: Linkage,
    ) -> IrGenResult<FuncHandle> {
        let id = self
            .module
            .declare_function(name, linkage, &sig)
            .map_err(|e| IrGenError::Module(e.to_string()))?;
        let func = ir::Function::with_name_signature(UserFuncName::testcase(name), sig);

        let handle = FuncHandle(self.funcs.len());
        self.funcs.push(FuncState {
            name: name.to_string(),
            id,
            func,
            entry: None,
            func_refs: HashMap::new(),
            data_refs: HashMap::new(),
            terminated: HashSet::new(),
        });
        self.func_index.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Create the entry block of a function, with one block parameter per
    /// signature parameter, and append it to the layout.
    pub fn create_entry_block(&mut self, f: FuncHandle) -> Block {
        let state = &mut self.funcs[f.0];
        let block = state.func.dfg.make_block();
        state.func.layout.append_block(block);
        let param_types: Vec<Type> = state
            .func
            .signature
            .params
            .iter()
            .map(|p| p.value_type)
            .collect();
        for ty in param_types {
            state.func.dfg.append_block_param(block, ty);
        }
        state.entry = Some(block);
        block
    }

    /// Create a block without placing it in the function layout yet.
    pub fn create_block(&mut self, f: FuncHandle) -> Block {
        self.funcs[f.0].func.dfg.make_block()
    }

    /// Append a previously created block to the function layout.
    pub fn append_block(&mut self, f: FuncHandle, block: Block) {
        self.funcs[f.0].func.layout.append_block(block);
    }

    /// The incoming argument values of a block.
    pub fn block_params(&self, f: FuncHandle, block: Block) -> Vec<Value> {
        self.funcs[f.0].func.dfg.block_params(block).to_vec()
    }

    pub fn function(&self, name: &str) -> Option<FuncHandle> {
        self.func_index.get(name).copied()
    }

    /// Declared parameter count of a function.
    pub fn arity(&self, f: FuncHandle) -> usize {
        self.funcs[f.0].func.signature.params.len()
    }

    // ── Insertion point ─────────────────────────────────────────

    pub fn set_insert_point(&mut self, f: FuncHandle, block: Block) {
        self.insert = Some(InsertPoint { func: f, block });
    }

    pub fn clear_insert_point(&mut self) {
        self.insert = None;
    }

    pub fn insert_point(&self) -> Option<InsertPoint> {
        self.insert
    }

    pub fn is_active(&self) -> bool {
        self.insert.is_some()
    }

    fn point(&self) -> IrGenResult<InsertPoint> {
        self.insert.ok_or(IrGenError::NoInsertionPoint)
    }

    fn open_point(&self) -> IrGenResult<InsertPoint> {
        let ip = self.point()?;
        if self.funcs[ip.func.0].terminated.contains(&ip.block) {
            return Err(IrGenError::TerminatedBlock);
        }
        Ok(ip)
    }

    // ── Storage ─────────────────────────────────────────────────

    /// Allocate a stack slot in the current function and materialise its
    /// address at the top of the entry block, so the slot is addressable
    /// from every block regardless of where the insertion point sits.
    pub fn alloca(&mut self, bytes: u32, name: &str) -> IrGenResult<Value> {
        let ip = self.point()?;
        let state = &mut self.funcs[ip.func.0];
        let entry = state
            .entry
            .ok_or_else(|| IrGenError::Module("function has no entry block".to_string()))?;
        let slot = state.func.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            bytes,
            0,
        ));
        log::trace!("alloca `{}`: {} bytes in {}", name, bytes, state.name);
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_first_insertion_point(entry);
        Ok(cur.ins().stack_addr(PTR_TYPE, slot, 0))
    }

    /// Create (or fetch) a zero-initialised module-level storage slot.
    pub fn declare_global(&mut self, name: &str, bytes: u32) -> IrGenResult<()> {
        if self.data_ids.contains_key(name) {
            return Ok(());
        }
        let id = self
            .module
            .declare_data(name, Linkage::Export, true, false)
            .map_err(|e| IrGenError::Module(e.to_string()))?;
        let mut desc = DataDescription::new();
        desc.define_zeroinit(bytes as usize);
        self.module
            .define_data(id, &desc)
            .map_err(|e| IrGenError::Module(e.to_string()))?;
        self.data_ids.insert(name.to_string(), id);
        self.data_order.push((name.to_string(), bytes));
        Ok(())
    }

    /// The address of a module-level storage slot, as a value in the
    /// current function.
    pub fn global_addr(&mut self, name: &str) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let data_id = *self
            .data_ids
            .get(name)
            .ok_or_else(|| IrGenError::UndefinedSymbol(name.to_string()))?;
        let state = &mut self.funcs[ip.func.0];
        let gv = match state.data_refs.get(name) {
            Some(gv) => *gv,
            None => {
                let gv = self.module.declare_data_in_func(data_id, &mut state.func);
                state.data_refs.insert(name.to_string(), gv);
                gv
            }
        };
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().global_value(PTR_TYPE, gv))
    }

    // ── Instructions ────────────────────────────────────────────

    pub fn iconst(&mut self, ty: Type, value: i64) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().iconst(ty, value))
    }

    pub fn load(&mut self, ty: Type, addr: Value) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().load(ty, MemFlags::new(), addr, 0))
    }

    pub fn store(&mut self, value: Value, addr: Value) -> IrGenResult<()> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        cur.ins().store(MemFlags::new(), value, addr, 0);
        Ok(())
    }

    /// Address of a struct field at a constant byte offset from `base`.
    pub fn field_addr(&mut self, base: Value, offset: i32) -> IrGenResult<Value> {
        if offset == 0 {
            return Ok(base);
        }
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().iadd_imm(base, offset as i64))
    }

    /// Pointer/bit cast. CLIF pointers are untyped `i64`, so this is the
    /// identity; it marks the places where a typed IR would re-type a value.
    pub fn bitcast(&self, value: Value) -> Value {
        value
    }

    /// Arithmetic on 64-bit integers.
    pub fn iadd(&mut self, lhs: Value, rhs: Value) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().iadd(lhs, rhs))
    }

    pub fn isub(&mut self, lhs: Value, rhs: Value) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().isub(lhs, rhs))
    }

    pub fn imul(&mut self, lhs: Value, rhs: Value) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().imul(lhs, rhs))
    }

    pub fn sdiv(&mut self, lhs: Value, rhs: Value) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let mut cur = FuncCursor::new(&mut self.funcs[ip.func.0].func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().sdiv(lhs, rhs))
    }

    // ── Control flow ────────────────────────────────────────────

    /// Conditional branch; closes the current block.
    pub fn cond_br(&mut self, cond: Value, then_block: Block, else_block: Block) -> IrGenResult<()> {
        let ip = self.open_point()?;
        let state = &mut self.funcs[ip.func.0];
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        cur.ins().brif(cond, then_block, &[], else_block, &[]);
        state.terminated.insert(ip.block);
        Ok(())
    }

    /// Unconditional branch; closes the current block.
    pub fn br(&mut self, target: Block) -> IrGenResult<()> {
        let ip = self.open_point()?;
        let state = &mut self.funcs[ip.func.0];
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        cur.ins().jump(target, &[]);
        state.terminated.insert(ip.block);
        Ok(())
    }

    /// Return terminator; closes the current block.
    pub fn ret(&mut self, values: &[Value]) -> IrGenResult<()> {
        let ip = self.open_point()?;
        let state = &mut self.funcs[ip.func.0];
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        cur.ins().return_(values);
        state.terminated.insert(ip.block);
        Ok(())
    }

    // ── Calls ───────────────────────────────────────────────────

    /// Direct call to a module-level function by symbol.
    pub fn call(&mut self, callee: FuncHandle, args: &[Value]) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let callee_id = self.funcs[callee.0].id;
        let callee_name = self.funcs[callee.0].name.clone();
        let state = &mut self.funcs[ip.func.0];
        let func_ref = match state.func_refs.get(&callee_name) {
            Some(r) => *r,
            None => {
                let r = self.module.declare_func_in_func(callee_id, &mut state.func);
                state.func_refs.insert(callee_name, r);
                r
            }
        };
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        let inst = cur.ins().call(func_ref, args);
        state
            .func
            .dfg
            .inst_results(inst)
            .first()
            .copied()
            .ok_or_else(|| IrGenError::Module("call to a function without a result".to_string()))
    }

    /// Indirect call through a function-pointer value.
    pub fn call_indirect(
        &mut self,
        sig: Signature,
        callee: Value,
        args: &[Value],
    ) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let state = &mut self.funcs[ip.func.0];
        let sig_ref = state.func.import_signature(sig);
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        let inst = cur.ins().call_indirect(sig_ref, callee, args);
        state
            .func
            .dfg
            .inst_results(inst)
            .first()
            .copied()
            .ok_or_else(|| IrGenError::Module("call to a function without a result".to_string()))
    }

    /// Address of a function's code, as a generic pointer value.
    pub fn func_addr(&mut self, target: FuncHandle) -> IrGenResult<Value> {
        let ip = self.open_point()?;
        let target_id = self.funcs[target.0].id;
        let target_name = self.funcs[target.0].name.clone();
        let state = &mut self.funcs[ip.func.0];
        let func_ref = match state.func_refs.get(&target_name) {
            Some(r) => *r,
            None => {
                let r = self.module.declare_func_in_func(target_id, &mut state.func);
                state.func_refs.insert(target_name, r);
                r
            }
        };
        let mut cur = FuncCursor::new(&mut state.func);
        cur.goto_bottom(ip.block);
        Ok(cur.ins().func_addr(PTR_TYPE, func_ref))
    }

    // ── Validation and output ───────────────────────────────────

    /// Structural well-formedness check of one function.
    pub fn verify(&self, f: FuncHandle) -> IrGenResult<()> {
        verify_function(&self.funcs[f.0].func, &self.flags)
            .map_err(|e| IrGenError::Verifier(e.to_string()))
    }

    /// The whole module as CLIF text: data objects, then functions, both in
    /// creation order. Lowering the same AST twice yields identical text.
    pub fn display(&self) -> String {
        let mut out = String::new();
        for (name, bytes) in &self.data_order {
            let _ = writeln!(out, "; global {}: {} bytes, zero-initialised", name, bytes);
        }
        for state in &self.funcs {
            let _ = writeln!(out, "{}", state.func.display());
        }
        out
    }

    /// Define every function in the object module and emit the object file.
    /// Consumes the builder.
    pub fn finish(self) -> IrGenResult<Vec<u8>> {
        let mut module = self.module;
        for state in self.funcs {
            let mut ctx = cranelift_codegen::Context::for_function(state.func);
            module
                .define_function(state.id, &mut ctx)
                .map_err(|e| IrGenError::Module(e.to_string()))?;
        }
        let product = module.finish();
        product
            .emit()
            .map_err(|e| IrGenError::Module(e.to_string()))
    }
}
