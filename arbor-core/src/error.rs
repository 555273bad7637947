//! Error Taxonomy
//!
//! Every failure mode of the fold evaluator, the transaction layer, and
//! plugin composition is a distinct [`GraphError`] variant carrying the
//! offending node id and/or kind, so callers can localize faults in large
//! graphs.
//!
//! # Fatal vs. Recoverable
//!
//! Structural errors raised by the fold driver itself ([`MissingNode`],
//! [`MissingHandler`], [`InvalidChildIndex`]) abort the fold: no handler can
//! observe them. Handler-raised errors and [`UnboundParam`] are delivered to
//! the parent activation as a resumable exception and may be caught there.
//! [`DanglingReference`] and [`CycleDetected`] are raised only by `commit`,
//! never by `fold`.
//!
//! [`MissingNode`]: GraphError::MissingNode
//! [`MissingHandler`]: GraphError::MissingHandler
//! [`InvalidChildIndex`]: GraphError::InvalidChildIndex
//! [`UnboundParam`]: GraphError::UnboundParam
//! [`DanglingReference`]: GraphError::DanglingReference
//! [`CycleDetected`]: GraphError::CycleDetected

use thiserror::Error;

use crate::graph::NodeId;

/// Errors produced by folding, editing, committing, or composing plugins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An id was referenced but is absent from the adjacency map.
    #[error("missing node `{id}`{}", wanted_by.as_ref().map(|w| format!(" (referenced by `{w}`)")).unwrap_or_default())]
    MissingNode {
        /// The id that could not be resolved.
        id: NodeId,
        /// The entry that referenced it, when known.
        wanted_by: Option<NodeId>,
    },

    /// No handler is registered for a node's kind.
    #[error("no handler registered for kind `{kind}` (node `{id}`)")]
    MissingHandler {
        /// The unhandled kind tag.
        kind: String,
        /// The node whose evaluation required it.
        id: NodeId,
    },

    /// A handler yielded a child index beyond the node's child count.
    #[error("child index {index} out of range for node `{id}` ({len} children)")]
    InvalidChildIndex {
        /// The node whose activation misbehaved.
        id: NodeId,
        /// The requested index.
        index: usize,
        /// The actual child count.
        len: usize,
    },

    /// A scoped-parameter read found no binding in any enclosing scope.
    #[error("unbound parameter `{name}` read by node `{id}`")]
    UnboundParam {
        /// The parameter name that was looked up.
        name: String,
        /// The reading node.
        id: NodeId,
    },

    /// Commit found a reference to an id that does not exist.
    #[error("dangling reference from `{from}` to `{to}`")]
    DanglingReference {
        /// The entry holding the reference.
        from: NodeId,
        /// The missing target.
        to: NodeId,
    },

    /// Commit found a cycle in the reference relation.
    #[error("cycle detected through node `{id}`")]
    CycleDetected {
        /// A node on the cycle.
        id: NodeId,
    },

    /// Two plugins declared the same kind during composition.
    #[error("plugins `{first}` and `{second}` both declare kind `{kind}`")]
    PluginConflict {
        /// The contested kind tag.
        kind: String,
        /// The plugin registered first.
        first: String,
        /// The plugin that collided with it.
        second: String,
    },

    /// A plugin declared a kind but supplied neither a default handler nor
    /// an override.
    #[error("plugin `{plugin}` declares kind `{kind}` but supplies no handler")]
    PluginConfiguration {
        /// The offending plugin.
        plugin: String,
        /// The unresolved kind tag.
        kind: String,
    },

    /// An error raised by a handler itself. Catchable by ancestor handlers.
    #[error("handler for `{kind}` failed at node `{id}`: {message}")]
    Handler {
        /// The failing node.
        id: NodeId,
        /// Its kind tag.
        kind: String,
        /// Handler-supplied description.
        message: String,
    },
}

impl GraphError {
    /// Whether this error aborts a fold outright. Fatal errors are never
    /// delivered to parent activations.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GraphError::MissingNode { .. }
                | GraphError::MissingHandler { .. }
                | GraphError::InvalidChildIndex { .. }
        )
    }

    /// Shorthand for a handler-raised error.
    pub fn handler(id: &NodeId, kind: &str, message: impl Into<String>) -> Self {
        GraphError::Handler {
            id: id.clone(),
            kind: kind.to_owned(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        let id = NodeId::new("a");
        assert!(GraphError::MissingNode { id: id.clone(), wanted_by: None }.is_fatal());
        assert!(GraphError::MissingHandler { kind: "k".into(), id: id.clone() }.is_fatal());
        assert!(GraphError::InvalidChildIndex { id: id.clone(), index: 3, len: 1 }.is_fatal());
        assert!(!GraphError::UnboundParam { name: "x".into(), id: id.clone() }.is_fatal());
        assert!(!GraphError::handler(&id, "k", "boom").is_fatal());
    }

    #[test]
    fn display_names_the_offender() {
        let err = GraphError::DanglingReference {
            from: NodeId::new("a"),
            to: NodeId::new("b"),
        };
        assert_eq!(err.to_string(), "dangling reference from `a` to `b`");

        let err = GraphError::MissingNode {
            id: NodeId::new("c"),
            wanted_by: Some(NodeId::new("d")),
        };
        assert_eq!(err.to_string(), "missing node `c` (referenced by `d`)");
    }
}
