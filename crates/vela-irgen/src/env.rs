// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Symbol environment — stacked local frames, globals, closures.
//!
//! A local frame maps a name to the address value of its entry-block slot.
//! Frames are pushed when a function body starts emitting and popped when
//! it completes, so the top frame always belongs to the function currently
//! under emission. The parallel capture set names frame entries whose slot
//! holds a pointer into an enclosing frame rather than direct storage —
//! every non-escaping capture is bound that way — and address lookup
//! dereferences those once.

use cranelift::prelude::*;
use std::collections::{HashMap, HashSet};
use vela_ast::Capture;

/// Descriptor of a lowered nested function recorded for call sites.
///
/// Non-escaping closures carry no environment struct (the record's second
/// word stays null); the capture list alone drives argument passing.
#[derive(Debug, Clone)]
pub struct ClosureInfo {
    /// The declaration's capture list, in parameter order.
    pub captures: Vec<Capture>,
    /// The lifted signature (plain signature when the capture list is empty).
    pub sig: Signature,
}

#[derive(Default)]
pub struct SymbolEnv {
    /// Module-level storage slots, by name.
    globals: HashSet<String>,
    /// Stack of function-scope frames: name → slot address value.
    locals: Vec<HashMap<String, Value>>,
    /// Parallel stack naming captured-by-reference entries of each frame.
    captured: Vec<HashSet<String>>,
    /// Lowered nested functions, by name.
    closures: HashMap<String, ClosureInfo>,
}

impl SymbolEnv {
    pub fn new() -> SymbolEnv {
        SymbolEnv::default()
    }

    /// Open a fresh frame for a function body.
    pub fn push_frame(&mut self) {
        self.locals.push(HashMap::new());
        self.captured.push(HashSet::new());
    }

    /// Close the top frame.
    pub fn pop_frame(&mut self) {
        self.locals.pop();
        self.captured.pop();
    }

    /// Record a local slot in the top frame. Statements emitted into `main`
    /// outside any function declaration live in an implicit base frame.
    pub fn insert_local(&mut self, name: &str, slot: Value) {
        if self.locals.is_empty() {
            self.push_frame();
        }
        if let Some(frame) = self.locals.last_mut() {
            frame.insert(name.to_string(), slot);
        }
    }

    /// The slot of `name` in the current frame, if any.
    pub fn lookup_local(&self, name: &str) -> Option<Value> {
        self.locals.last().and_then(|frame| frame.get(name)).copied()
    }

    /// Whether the current frame binds `name`.
    pub fn current_frame_contains(&self, name: &str) -> bool {
        self.locals
            .last()
            .is_some_and(|frame| frame.contains_key(name))
    }

    /// Flag `name` in the current frame as a captured-by-reference pointer;
    /// lookups will dereference it before use.
    pub fn mark_captured(&mut self, name: &str) {
        if self.captured.is_empty() {
            self.push_frame();
        }
        if let Some(set) = self.captured.last_mut() {
            set.insert(name.to_string());
        }
    }

    /// Whether `name` in the current frame needs the extra dereference.
    pub fn is_captured(&self, name: &str) -> bool {
        self.captured.last().is_some_and(|set| set.contains(name))
    }

    pub fn insert_global(&mut self, name: &str) {
        self.globals.insert(name.to_string());
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn record_closure(&mut self, name: &str, info: ClosureInfo) {
        self.closures.insert(name.to_string(), info);
    }

    pub fn closure(&self, name: &str) -> Option<&ClosureInfo> {
        self.closures.get(name)
    }
}
