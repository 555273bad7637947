//! Graph Evaluation
//!
//! # Overview
//!
//! Folding collapses a frozen expression graph to a single [`Value`] by
//! running one handler activation per node on an explicit trampoline
//! stack. The pieces:
//!
//! - [`handler`]: the coroutine protocol ([`Handler`], [`Activation`],
//!   [`Step`], [`Resume`]) plus the [`Strict`] shortcut for
//!   evaluate-all-children handlers.
//! - [`driver`]: the trampoline itself with memoization, taint tracking,
//!   scope stack, resumable exceptions.
//! - [`interp`]: the kind → handler table and plugin composition.
//! - [`fiber`]: `flow/par`, `flow/race`, and `flow/seq` handlers running
//!   branches on scoped threads.
//! - [`kit`]: the built-in handlers and the [`kit::standard`]
//!   interpreter.
//!
//! # Design Decisions
//!
//! Handlers never call back into the driver recursively (fibers excepted,
//! via [`FoldCx::fork`]); they *describe* what they need next and the
//! driver performs it. That keeps evaluation depth bounded by the explicit
//! frame stack rather than the native call stack.
//!
//! [`Value`]: crate::value::Value

mod driver;
pub mod fiber;
mod handler;
mod interp;
pub mod kit;

pub use driver::{fold, fold_from, FoldCx};
pub use handler::{Activation, Bindings, Handler, Resume, Step, Strict};
pub use interp::{compose, Interpreter, Plugin};
