//! sable language runtime.
//!
//! Object/class model, one mark-sweep heap per task, a stack-based bytecode
//! VM, and OS-thread tasks that exchange packed messages through mailboxes.

#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

#[macro_use]
mod macros;

pub mod config;
pub mod core;
pub mod errors;
pub mod module;
pub mod task;
pub mod vm;

mod builtins;
mod runtime;

// Re-exports from core/
pub use crate::core::class::{Class, Slot, Slots};
pub use crate::core::heap::{Heap, HeapStats, Obj, ObjKind, Ref, Trace, Tracer};
pub use crate::core::value::{Code, ErrorObj, Frame, HashTable, Method, MethodKind, Module, NativeFn, TaskRef};

// Re-exports from vm/ and task/
pub use task::pack::{PackError, Packed};
pub use task::{Joined, Outcome, TaskHandle, TaskState};
pub use vm::Vm;

pub use builtins::{BuiltinProvider, BuiltinRegistry, Core, StdBuiltinProvider};
pub use config::{RuntimeConfig, TraceFlags};
pub use errors::{Error, Result};
pub use module::{Member, ModuleSpec, NativeModule, Registry};
pub use runtime::{Process, Runtime};

pub use sable_ir::{Assembler, CodeUnit, Constant, Instr, Label, Op};
