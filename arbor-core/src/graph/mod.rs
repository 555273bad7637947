//! Expression Graphs
//!
//! This module implements the graph side of the system: the data model
//! (entries, ids, payloads), the frozen/dirty expression lifecycle, the
//! transaction primitives, garbage collection, commit validation, and the
//! higher-level query/transform operations.
//!
//! # Overview
//!
//! A graph is an adjacency map from node id to [`Entry`]. Entries reference
//! each other only by id: through their ordered `children` list and, for
//! structural (record/tuple) kinds, through `Value::Ref` leaves nested in
//! their payload. The shared scanner in [`refs`] is the single source of
//! truth for "what does this entry reference", used identically by GC,
//! rewiring, splicing, wrapping, and commit.
//!
//! # Design Decisions
//!
//! 1. The adjacency map is an `IndexMap` so that traversals and query
//!    results are deterministic across runs.
//!
//! 2. Frozen graphs are never mutated in place. `Expr::dirty` takes a
//!    structural copy; `commit` freezes it back after validating
//!    referential integrity and acyclicity.
//!
//! 3. Structural payload references are a typed `Value::Ref` variant, so
//!    reference scanning is exhaustive rather than duck-typed over strings.

mod build;
mod commit;
mod entry;
mod expr;
mod ops;
pub mod refs;

pub use build::GraphBuilder;
pub use entry::{Entry, NodeId, Payload, ALIAS_KIND};
pub use expr::{Adjacency, DirtyExpr, Expr};
pub use ops::{
    map_where, name, replace_where, select_where, splice_where, wrap_by_name, Pred,
};
