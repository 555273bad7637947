//! Arbor Core
//!
//! This crate provides the core runtime for Arbor, an evaluator for
//! content-addressed, shared-structure computation graphs. It implements:
//!
//! - A frozen/dirty expression graph with structural sharing
//! - Transactional editing with reachability GC and commit validation
//! - Predicate-based query and transform operations
//! - A stack-safe fold evaluator with memoization, taint tracking,
//!   lexical scoping, and resumable exceptions
//! - Fiber combinators for in-graph parallelism
//! - Plugin composition for handler tables
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node entries, the frozen/dirty lifecycle, commit, GC, and
//!   the query/transform operations
//! - `fold`: the handler protocol, the trampoline driver, interpreter
//!   composition, fibers, and the built-in handler kit
//! - `value`: the JSON-like value model flowing through graphs and folds
//! - `error`: every failure the graph and fold layers can raise
//!
//! # Example
//!
//! ```rust
//! use arbor_core::fold::{fold, kit};
//! use arbor_core::graph::GraphBuilder;
//! use arbor_core::value::Value;
//!
//! // Build (3 + 4) * 5 with content-addressed sharing.
//! let mut b = GraphBuilder::new();
//! let three = b.num(3.0);
//! let four = b.num(4.0);
//! let five = b.num(5.0);
//! let add = b.node("num/add", [three, four]);
//! let mul = b.node("num/mul", [add, five]);
//! let expr = b.freeze(mul).unwrap();
//!
//! // Evaluate with the built-in handlers.
//! let value = fold(&expr, &kit::standard()).unwrap();
//! assert_eq!(value, Value::Num(35.0));
//! ```

pub mod error;
pub mod fold;
pub mod graph;
pub mod value;

pub use error::GraphError;
pub use fold::{fold, fold_from, Interpreter};
pub use graph::{DirtyExpr, Expr, GraphBuilder, NodeId};
pub use value::Value;
