//! Graph Construction
//!
//! [`GraphBuilder`] assembles frozen expressions with content-derived ids:
//! the id of every node is a hash of its kind, child ids, and payload, so
//! two equal sub-expressions collapse into one shared entry automatically.
//! `freeze` runs the normal commit validation, so a builder cannot produce
//! an invalid graph.

use crate::error::GraphError;
use crate::value::Value;

use super::entry::{Entry, NodeId, Payload};
use super::expr::{Adjacency, DirtyExpr, Expr};

/// Builds content-addressed expression graphs.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    adj: Adjacency,
}

impl GraphBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry under its content id, returning the id. Equal
    /// content re-uses the existing entry.
    fn intern(&mut self, entry: Entry) -> NodeId {
        let id = NodeId::content(&entry.kind, &entry.children, &entry.payload);
        self.adj.entry(id.clone()).or_insert(entry);
        id
    }

    /// A leaf node with a literal payload.
    pub fn leaf(&mut self, kind: &str, value: Value) -> NodeId {
        self.intern(Entry::leaf(kind, value))
    }

    /// A numeric literal, the most common leaf.
    pub fn num(&mut self, n: f64) -> NodeId {
        self.leaf("core/lit", Value::Num(n))
    }

    /// An interior operation node over existing children.
    pub fn node(&mut self, kind: &str, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.intern(Entry::new(kind, children))
    }

    /// An interior node carrying a literal payload alongside its children,
    /// e.g. a binder naming the parameter it introduces.
    pub fn tagged(
        &mut self,
        kind: &str,
        value: Value,
        children: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        let mut entry = Entry::new(kind, children);
        entry.payload = Payload::Literal(value);
        self.intern(entry)
    }

    /// A structural aggregate whose payload's `Ref` leaves point at
    /// existing nodes.
    pub fn structural(&mut self, kind: &str, payload: Value) -> NodeId {
        self.intern(Entry::structural(kind, payload))
    }

    /// Validate and freeze with `root` as the graph's root.
    pub fn freeze(self, root: NodeId) -> Result<Expr, GraphError> {
        let mut d = DirtyExpr::new(root);
        for (id, entry) in self.adj {
            d.add_entry(id, entry);
        }
        d.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_subexpressions_share_one_entry() {
        // (3 + 3) built twice: the two `3` leaves and the two adds collapse.
        let mut b = GraphBuilder::new();
        let three_a = b.num(3.0);
        let three_b = b.num(3.0);
        assert_eq!(three_a, three_b);

        let add_a = b.node("num/add", [three_a.clone(), three_b.clone()]);
        let add_b = b.node("num/add", [three_a, three_b]);
        assert_eq!(add_a, add_b);

        let root = b.node("num/mul", [add_a.clone(), add_b]);
        let expr = b.freeze(root).expect("valid graph");
        // One literal, one add, one mul.
        assert_eq!(expr.len(), 3);
    }

    #[test]
    fn freeze_validates_roots() {
        let b = GraphBuilder::new();
        let err = b.freeze(NodeId::new("nothing")).expect_err("empty graph");
        assert!(matches!(err, GraphError::MissingNode { .. }));
    }

    #[test]
    fn structural_nodes_reference_existing_entries() {
        let mut b = GraphBuilder::new();
        let one = b.num(1.0);
        let two = b.num(2.0);
        let rec = b.structural(
            "core/record",
            Value::List(vec![Value::Ref(one), Value::Ref(two)]),
        );
        let expr = b.freeze(rec).expect("valid graph");
        assert_eq!(expr.len(), 3);
    }
}
