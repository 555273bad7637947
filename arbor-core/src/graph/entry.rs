//! Graph Entries
//!
//! This module defines the unit of the graph: [`Entry`]: a kind tag, an
//! ordered list of child ids, and an opaque [`Payload`], plus the
//! [`NodeId`] type that entries reference each other by.
//!
//! # Node Ids
//!
//! Ids are strings with three origins:
//!
//! 1. **Content-derived**: a 16-hex-char blake3 hash over the kind, the
//!    child ids, and a canonical JSON encoding of the payload. Two equal
//!    sub-expressions hash to the same id and therefore share one entry
//!    (structural sharing).
//! 2. **Sequential**: a bijective base-26 counter (`a`, `b`, ... `z`, `aa`)
//!    allocated while editing a dirty graph, where content hashing would be
//!    premature.
//! 3. **Alias**: reserved `@name:<alias>` ids for alias entries, giving a
//!    node a stable name across structural edits.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::value::Value;

/// Reserved kind tag for alias entries. An alias entry's single child is
/// the aliased node.
pub const ALIAS_KIND: &str = "@alias";

/// Prefix of reserved alias ids.
const ALIAS_ID_PREFIX: &str = "@name:";

/// Identifier of a node in the adjacency map. Ids are the only inter-entry
/// reference mechanism; there are no direct pointers between entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an arbitrary string as an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a content id from an entry's constituents.
    ///
    /// The payload is encoded as canonical JSON (`Value` maps are ordered),
    /// so equal content always produces equal ids.
    pub fn content(kind: &str, children: &[NodeId], payload: &Payload) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update(&[0]);
        for child in children {
            hasher.update(child.0.as_bytes());
            hasher.update(&[0]);
        }
        // Payload is a closed tree of serializable data, so encoding
        // cannot fail.
        let encoded = serde_json::to_vec(payload).unwrap_or_default();
        hasher.update(&encoded);
        let hash = hasher.finalize();
        Self(hash.to_hex().as_str()[..16].to_owned())
    }

    /// The `n`-th sequential id: `a`, `b`, ... `z`, `aa`, `ab`, ...
    pub fn seq(mut n: u64) -> Self {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            buf.push(b'a' + (n % 26) as u8);
            n /= 26;
            if n == 0 {
                break;
            }
            n -= 1; // bijective base-26: `z` is followed by `aa`, not `ba`
        }
        buf.reverse();
        // buf is ASCII by construction.
        Self(String::from_utf8(buf).unwrap_or_default())
    }

    /// The reserved id of the alias entry for `alias`.
    pub fn alias(alias: &str) -> Self {
        Self(format!("{ALIAS_ID_PREFIX}{alias}"))
    }

    /// Whether this id is a reserved alias id.
    pub fn is_alias(&self) -> bool {
        self.0.starts_with(ALIAS_ID_PREFIX)
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The opaque payload of an entry.
///
/// Structural payloads are the one place where references exist outside
/// `children`; every component that walks the graph (GC, rewiring, splice,
/// commit) special-cases them through the shared scanner in `graph::refs`.
/// Literal payloads are never scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// No payload. The default for interior operation nodes.
    Empty,
    /// An opaque literal value for leaf kinds. Any `Value::Ref` inside is
    /// treated as inert data, not a graph reference.
    Literal(Value),
    /// A nested value whose `Value::Ref` leaves reference other entries.
    /// Used by record/tuple aggregate kinds.
    Structural(Value),
}

/// One operation node in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Namespaced tag identifying which handler interprets this node,
    /// e.g. `"num/add"` or `"core/record"`.
    pub kind: String,
    /// Ordered child references, addressed positionally by handlers.
    pub children: SmallVec<[NodeId; 4]>,
    /// Leaf literal or structural aggregate payload.
    pub payload: Payload,
}

impl Entry {
    /// An interior node with children and no payload.
    pub fn new(kind: impl Into<String>, children: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            kind: kind.into(),
            children: children.into_iter().collect(),
            payload: Payload::Empty,
        }
    }

    /// A leaf node carrying a literal payload.
    pub fn leaf(kind: impl Into<String>, value: Value) -> Self {
        Self {
            kind: kind.into(),
            children: SmallVec::new(),
            payload: Payload::Literal(value),
        }
    }

    /// A structural node whose payload's `Ref` leaves are graph references.
    pub fn structural(kind: impl Into<String>, value: Value) -> Self {
        Self {
            kind: kind.into(),
            children: SmallVec::new(),
            payload: Payload::Structural(value),
        }
    }

    /// An alias entry pointing at `target`.
    pub fn alias(target: NodeId) -> Self {
        Self::new(ALIAS_KIND, [target])
    }

    /// Whether this entry is an alias entry.
    pub fn is_alias(&self) -> bool {
        self.kind == ALIAS_KIND
    }

    /// Whether this entry has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_bijective_base26() {
        assert_eq!(NodeId::seq(0).as_str(), "a");
        assert_eq!(NodeId::seq(1).as_str(), "b");
        assert_eq!(NodeId::seq(25).as_str(), "z");
        assert_eq!(NodeId::seq(26).as_str(), "aa");
        assert_eq!(NodeId::seq(27).as_str(), "ab");
        assert_eq!(NodeId::seq(26 + 26 * 26).as_str(), "aaa");
    }

    #[test]
    fn content_ids_share_structure() {
        let payload = Payload::Literal(Value::Num(3.0));
        let a = NodeId::content("core/lit", &[], &payload);
        let b = NodeId::content("core/lit", &[], &payload);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);

        let c = NodeId::content("core/lit", &[], &Payload::Literal(Value::Num(4.0)));
        assert_ne!(a, c);
    }

    #[test]
    fn content_ids_distinguish_child_order() {
        let x = NodeId::new("x");
        let y = NodeId::new("y");
        let a = NodeId::content("num/sub", &[x.clone(), y.clone()], &Payload::Empty);
        let b = NodeId::content("num/sub", &[y, x], &Payload::Empty);
        assert_ne!(a, b);
    }

    #[test]
    fn alias_ids_are_reserved() {
        let id = NodeId::alias("result");
        assert_eq!(id.as_str(), "@name:result");
        assert!(id.is_alias());
        assert!(!NodeId::new("result").is_alias());
    }

    #[test]
    fn alias_entries() {
        let entry = Entry::alias(NodeId::new("target"));
        assert!(entry.is_alias());
        assert_eq!(entry.children.len(), 1);
    }
}
