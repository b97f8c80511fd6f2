//! Recoverable runtime errors.
//!
//! Protocol helpers and natives return `Result<Ref>` and propagate with `?`.
//! When an error reaches the VM loop it becomes a task panic; see
//! `Vm::error_to_panic`.

use thiserror::Error;

use crate::core::heap::Ref;
use crate::task::pack::PackError;

pub mod messages {
    pub const NOT_AN_INT: &str = "int";
    pub const NOT_A_NUMBER: &str = "number";
    pub const NOT_A_STRING: &str = "string";
    pub const NOT_AN_ARRAY: &str = "array";
    pub const NOT_A_CLASS: &str = "class";
    pub const NOT_A_TASK: &str = "task";
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{class} has no attribute `{name}`")]
    NoAttribute { class: String, name: String },
    #[error("{class} has no item {key}")]
    NoItem { class: String, key: String },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{left} is not comparable with {right}")]
    NotComparable { left: String, right: String },
    #[error("unbound name `{0}`")]
    Unbound(String),
    #[error("`{method}` expects {expected} argument(s), got {got}")]
    Arity { method: String, expected: usize, got: usize },
    #[error("{0} cannot be instantiated")]
    NotInstantiable(String),
    #[error("stack overflow ({0} frames)")]
    StackOverflow(usize),
    #[error("module `{0}` not found")]
    NoModule(String),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error("a task cannot join itself")]
    JoinSelf,
    #[error("the main task cannot be joined")]
    JoinMain,
    /// A raised value unwinding the current task.
    #[error("panic")]
    Panic(Ref),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panic(_))
    }

    /// The raised value, when this error is a panic.
    pub fn panic_value(&self) -> Option<Ref> {
        match self {
            Error::Panic(v) => Some(*v),
            _ => None,
        }
    }
}
