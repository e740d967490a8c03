// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Closure record support — layout, initialisation, and value copies.
//!
//! A first-class function value is a 16-byte record:
//!   [0..8]  raw function pointer (lifted function, cast to generic pointer)
//!   [8..16] environment pointer
//!
//! Non-escaping closures capture by reference: each captured declaration is
//! passed as a leading argument holding a pointer into the enclosing frame,
//! and the environment pointer stays null. An escaping closure would
//! heap-allocate an environment struct and store it in the second word; the
//! lowering pass does not produce those yet.
//!
//! The record travels as a pointer to its storage; copying one (assignment,
//! return, argument passing) moves both words.

use cranelift::prelude::*;

use crate::builder::{IrBuilder, PTR_TYPE};
use crate::IrGenResult;

/// Closure record layout: { raw_fn_ptr, env_ptr }
pub const CLOSURE_SIZE: u32 = 16;
pub const CLOSURE_FUNC_OFFSET: i32 = 0;
pub const CLOSURE_ENV_OFFSET: i32 = 8;

/// Initialise a closure record in place: code pointer in the first word,
/// environment pointer in the second.
pub fn store_record(
    builder: &mut IrBuilder,
    record: Value,
    code: Value,
    env: Value,
) -> IrGenResult<()> {
    let code_addr = builder.field_addr(record, CLOSURE_FUNC_OFFSET)?;
    builder.store(code, code_addr)?;
    let env_addr = builder.field_addr(record, CLOSURE_ENV_OFFSET)?;
    builder.store(env, env_addr)
}

/// Extract the raw code pointer from a closure record.
pub fn load_func_ptr(builder: &mut IrBuilder, record: Value) -> IrGenResult<Value> {
    let code_addr = builder.field_addr(record, CLOSURE_FUNC_OFFSET)?;
    builder.load(PTR_TYPE, code_addr)
}

/// Copy a closure record between two storage slots, one word at a time.
pub fn copy_record(builder: &mut IrBuilder, src: Value, dest: Value) -> IrGenResult<()> {
    let code = builder.load(PTR_TYPE, src)?;
    builder.store(code, dest)?;
    let src_env = builder.field_addr(src, CLOSURE_ENV_OFFSET)?;
    let dest_env = builder.field_addr(dest, CLOSURE_ENV_OFFSET)?;
    let env = builder.load(PTR_TYPE, src_env)?;
    builder.store(env, dest_env)
}
