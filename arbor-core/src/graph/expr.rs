//! Expressions
//!
//! An expression is a (root id, adjacency map) pair in one of two lifecycle
//! states over the same map type:
//!
//! - [`Expr`] (*frozen*): immutable, guaranteed acyclic and fully resolved
//!   (the invariant is enforced by `commit`). Safe to fold concurrently
//!   from multiple callers.
//! - [`DirtyExpr`] (*dirty*): a private, single-owner structural copy being
//!   edited mid-transaction. Dangling references and cycles are permitted
//!   here; they are caught by `commit`, never silently folded.
//!
//! # Editing Flow
//!
//! frozen → [`Expr::dirty`] → zero or more primitive edits or query/transform
//! ops → optional [`DirtyExpr::gc`] → [`DirtyExpr::commit`] → frozen again.
//!
//! The primitives are cheap, local, composable steps. None of them validate
//! the graph; validation is `commit`'s job.

use indexmap::IndexMap;

use super::entry::{Entry, NodeId};
use super::refs;

/// The adjacency map: id → entry. `IndexMap` keeps iteration deterministic,
/// which GC, rewiring, and the query ops all rely on.
pub type Adjacency = IndexMap<NodeId, Entry>;

/// A frozen, validated expression graph.
#[derive(Debug, Clone)]
pub struct Expr {
    pub(crate) root: NodeId,
    pub(crate) adj: Adjacency,
    pub(crate) counter: u64,
}

impl Expr {
    /// The root node id.
    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// The adjacency map.
    pub fn adj(&self) -> &Adjacency {
        &self.adj
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &NodeId) -> Option<&Entry> {
        self.adj.get(id)
    }

    /// Number of entries in the graph.
    pub fn len(&self) -> usize {
        self.adj.len()
    }

    /// Whether the graph has no entries. A committed graph never is, but
    /// the accessor pairs with `len`.
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// Resolve an alias name to the id it points at.
    pub fn by_name(&self, alias: &str) -> Option<&NodeId> {
        let entry = self.adj.get(&NodeId::alias(alias))?;
        if entry.is_alias() {
            entry.children.first()
        } else {
            None
        }
    }

    /// Begin a transaction: a structural copy with no validity guarantees.
    /// The frozen graph is never mutated in place.
    pub fn dirty(&self) -> DirtyExpr {
        DirtyExpr {
            root: self.root.clone(),
            adj: self.adj.clone(),
            counter: self.counter,
        }
    }
}

/// Structural equality: same root and same entries. The sequential-id
/// counter is bookkeeping, not structure.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.adj == other.adj
    }
}

/// A mutable, unvalidated expression graph mid-transaction.
#[derive(Debug, Clone)]
pub struct DirtyExpr {
    pub(crate) root: NodeId,
    pub(crate) adj: Adjacency,
    pub(crate) counter: u64,
}

impl DirtyExpr {
    /// Start a transaction from scratch. `root` may be dangling until the
    /// matching entry is added.
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            adj: Adjacency::new(),
            counter: 0,
        }
    }

    /// The current root id.
    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// The adjacency map.
    pub fn adj(&self) -> &Adjacency {
        &self.adj
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &NodeId) -> Option<&Entry> {
        self.adj.get(id)
    }

    /// Number of entries in the graph.
    pub fn len(&self) -> usize {
        self.adj.len()
    }

    /// Whether the graph has no entries.
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// Insert an entry. An id collision overwrites the previous entry.
    pub fn add_entry(&mut self, id: NodeId, entry: Entry) {
        self.adj.insert(id, entry);
    }

    /// Delete an entry. References to it are left dangling for GC or
    /// commit to catch.
    pub fn remove_entry(&mut self, id: &NodeId) {
        self.adj.shift_remove(id);
    }

    /// Replace an entry's contents in place, preserving its id and every
    /// existing reference to it.
    pub fn swap_entry(&mut self, id: &NodeId, entry: Entry) {
        if let Some(slot) = self.adj.get_mut(id) {
            *slot = entry;
        }
    }

    /// For every entry, replace every occurrence of `old` with `new`, in
    /// `children` and inside structural payloads. Returns the number of
    /// references rewritten. The root id is not touched; use `set_root`.
    pub fn rewire(&mut self, old: &NodeId, new: &NodeId) -> usize {
        let mut hits = 0;
        for entry in self.adj.values_mut() {
            hits += refs::rewire_entry(entry, old, new);
        }
        tracing::trace!(%old, %new, hits, "rewired references");
        hits
    }

    /// Change which id is considered the graph's root.
    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    /// Allocate a fresh sequential id, skipping any that are already
    /// occupied (content ids could in principle collide with short
    /// letter-only ids).
    pub fn fresh_id(&mut self) -> NodeId {
        loop {
            let id = NodeId::seq(self.counter);
            self.counter += 1;
            if !self.adj.contains_key(&id) {
                return id;
            }
        }
    }
}
