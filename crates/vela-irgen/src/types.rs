// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Ty → Cranelift type translation.

use cranelift::prelude::*;
use vela_ast::Capture;
use vela_types::Ty;

use crate::closures::CLOSURE_SIZE;
use crate::PTR_TYPE;

/// Translate a Vela type to the Cranelift IR type its values occupy when
/// they travel through registers, signatures, and the value stack.
///
/// CLIF has no `i1`; booleans use `i8` holding 0 or 1, which conditional
/// branches accept directly. References are pointers. A function value is
/// a two-word closure record and travels as a pointer to that record; its
/// storage slot is record-sized (see [`byte_size`]) and copies move both
/// words.
pub fn lowered_type(ty: &Ty) -> Type {
    match ty {
        Ty::Int => types::I64,
        Ty::Bool => types::I8,
        Ty::Ref(_) => PTR_TYPE,
        Ty::Function { .. } => PTR_TYPE,
    }
}

/// Byte size of the storage slot holding a value of this type.
///
/// A first-class function value is stored as the full two-word closure
/// record, not as the bare code pointer it travels as.
pub fn byte_size(ty: &Ty) -> u32 {
    match ty {
        Ty::Int => 8,
        Ty::Bool => 1,
        Ty::Ref(_) => 8,
        Ty::Function { .. } => CLOSURE_SIZE,
    }
}

/// The machine type a capture occupies in a lifted signature.
///
/// A non-escaping closure captures by reference: the parameter is a
/// pointer into the enclosing frame's slot. An escaping closure must
/// capture the value itself.
pub fn capture_param_type(capture: &Capture) -> Type {
    if capture.noescape {
        PTR_TYPE
    } else {
        lowered_type(&capture.ty)
    }
}

/// Fill a signature with the lowered parameter and return types of a
/// function type.
pub fn function_signature(mut sig: Signature, domain: &[Ty], codomain: &Ty) -> Signature {
    for d in domain {
        sig.params.push(AbiParam::new(lowered_type(d)));
    }
    sig.returns.push(AbiParam::new(lowered_type(codomain)));
    sig
}

/// Same as [`function_signature`], with the free-variable types prepended
/// as leading parameters (one per capture-list entry).
pub fn lifted_signature(mut sig: Signature, free: &[Type], domain: &[Ty], codomain: &Ty) -> Signature {
    for ty in free {
        sig.params.push(AbiParam::new(*ty));
    }
    function_signature(sig, domain, codomain)
}
