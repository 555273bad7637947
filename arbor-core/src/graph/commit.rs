//! Garbage Collection & Commit
//!
//! # GC
//!
//! [`DirtyExpr::gc`] computes the set of ids reachable from the current root
//! by breadth-first traversal following both `children` and structural
//! payload references, and drops everything else. Dangling references are
//! tolerated (they simply lead nowhere); commit is where they become
//! errors. Alias entries are dead weight unless independently reachable;
//! [`DirtyExpr::gc_keep_aliases`] seeds every alias entry as an extra root.
//!
//! # Commit
//!
//! [`DirtyExpr::commit`] validates and freezes:
//!
//! 1. The root id must exist in the map.
//! 2. Every reference any entry makes must resolve to an existing entry.
//! 3. A depth-first cycle check over the same reference relation must find
//!    no cycle.
//!
//! On success the map instance is reused unchanged, copy-on-write style; further
//! edits must start a fresh `dirty` transaction. Commit failures are fatal
//! to the transaction; there is no partial commit state to inspect.
//!
//! Both traversals are iterative (explicit queue/stack) so graphs tens of
//! thousands of nodes deep survive without native recursion.

use std::collections::{HashSet, VecDeque};

use crate::error::GraphError;

use super::entry::NodeId;
use super::expr::{DirtyExpr, Expr};
use super::refs;

impl DirtyExpr {
    /// Drop every entry not reachable from the root. Aliases are not roots.
    pub fn gc(&mut self) {
        self.collect(false);
    }

    /// Like [`gc`](Self::gc), but additionally treats every alias entry as
    /// a GC root, preserving named nodes across edits that orphan them.
    pub fn gc_keep_aliases(&mut self) {
        self.collect(true);
    }

    fn collect(&mut self, keep_aliases: bool) {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(self.root.clone());
        if keep_aliases {
            for (id, entry) in self.adj.iter() {
                if entry.is_alias() {
                    queue.push_back(id.clone());
                }
            }
        }

        let mut reachable: HashSet<NodeId> = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            // Dangling ids are skipped here; commit reports them.
            if let Some(entry) = self.adj.get(&id) {
                for target in refs::entry_refs(entry) {
                    if !reachable.contains(target) {
                        queue.push_back(target.clone());
                    }
                }
            }
        }

        let before = self.adj.len();
        self.adj.retain(|id, _| reachable.contains(id));
        tracing::debug!(
            dropped = before - self.adj.len(),
            kept = self.adj.len(),
            keep_aliases,
            "gc finished"
        );
    }

    /// Validate referential integrity and acyclicity, then freeze.
    pub fn commit(self) -> Result<Expr, GraphError> {
        if !self.adj.contains_key(&self.root) {
            return Err(GraphError::MissingNode {
                id: self.root.clone(),
                wanted_by: None,
            });
        }

        for (id, entry) in self.adj.iter() {
            for target in refs::entry_refs(entry) {
                if !self.adj.contains_key(target) {
                    return Err(GraphError::DanglingReference {
                        from: id.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        self.check_acyclic()?;

        tracing::debug!(entries = self.adj.len(), root = %self.root, "commit validated");
        Ok(Expr {
            root: self.root,
            adj: self.adj,
            counter: self.counter,
        })
    }

    /// Iterative DFS with visiting/visited sets over the full reference
    /// relation (children + structural payload refs).
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut visiting: HashSet<&NodeId> = HashSet::new();

        for (start, entry) in self.adj.iter() {
            if visited.contains(start) {
                continue;
            }
            // Frame: (node, its outgoing refs, index of next ref to follow).
            let mut stack: Vec<(&NodeId, Vec<&NodeId>, usize)> = Vec::new();
            visiting.insert(start);
            stack.push((start, refs::entry_refs(entry), 0));

            loop {
                // Advance the top frame by one reference, or mark it done.
                let followed = {
                    let Some((_, targets, next)) = stack.last_mut() else {
                        break;
                    };
                    if *next < targets.len() {
                        let target = targets[*next];
                        *next += 1;
                        Some(target)
                    } else {
                        None
                    }
                };

                match followed {
                    Some(target) => {
                        if visiting.contains(target) {
                            return Err(GraphError::CycleDetected { id: target.clone() });
                        }
                        if visited.contains(target) {
                            continue;
                        }
                        // Presence was established by the dangling pass.
                        if let Some(entry) = self.adj.get(target) {
                            visiting.insert(target);
                            stack.push((target, refs::entry_refs(entry), 0));
                        }
                    }
                    None => {
                        if let Some((id, _, _)) = stack.pop() {
                            visiting.remove(id);
                            visited.insert(id);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Entry;
    use crate::value::Value;

    fn lit(n: f64) -> Entry {
        Entry::leaf("core/lit", Value::Num(n))
    }

    fn chain() -> DirtyExpr {
        // root -> mid -> leaf, plus an unreachable orphan
        let mut d = DirtyExpr::new(NodeId::new("root"));
        d.add_entry(NodeId::new("leaf"), lit(1.0));
        d.add_entry(NodeId::new("mid"), Entry::new("wrap", [NodeId::new("leaf")]));
        d.add_entry(NodeId::new("root"), Entry::new("wrap", [NodeId::new("mid")]));
        d.add_entry(NodeId::new("orphan"), lit(2.0));
        d
    }

    #[test]
    fn gc_drops_exactly_the_unreachable() {
        let mut d = chain();
        d.gc();
        assert_eq!(d.len(), 3);
        assert!(d.get(&NodeId::new("orphan")).is_none());
        assert!(d.get(&NodeId::new("leaf")).is_some());
    }

    #[test]
    fn gc_follows_structural_payload_refs() {
        let mut d = DirtyExpr::new(NodeId::new("rec"));
        d.add_entry(NodeId::new("inner"), lit(7.0));
        d.add_entry(
            NodeId::new("rec"),
            Entry::structural(
                "core/record",
                Value::List(vec![Value::List(vec![Value::Ref(NodeId::new("inner"))])]),
            ),
        );
        d.add_entry(NodeId::new("stray"), lit(8.0));
        d.gc();
        assert_eq!(d.len(), 2);
        assert!(d.get(&NodeId::new("inner")).is_some());
    }

    #[test]
    fn gc_prunes_aliases_unless_preserving() {
        let mut d = chain();
        d.add_entry(NodeId::alias("kept"), Entry::alias(NodeId::new("orphan")));

        let mut plain = d.clone();
        plain.gc();
        assert!(plain.get(&NodeId::alias("kept")).is_none());
        assert!(plain.get(&NodeId::new("orphan")).is_none());

        d.gc_keep_aliases();
        assert!(d.get(&NodeId::alias("kept")).is_some());
        // The alias keeps its target alive too.
        assert!(d.get(&NodeId::new("orphan")).is_some());
    }

    #[test]
    fn commit_requires_the_root() {
        let mut d = DirtyExpr::new(NodeId::new("nowhere"));
        d.add_entry(NodeId::new("a"), lit(1.0));
        let err = d.commit().expect_err("root is missing");
        assert_eq!(
            err,
            GraphError::MissingNode {
                id: NodeId::new("nowhere"),
                wanted_by: None
            }
        );
    }

    #[test]
    fn commit_reports_dangling_references() {
        let mut d = chain();
        d.remove_entry(&NodeId::new("leaf"));
        let err = d.commit().expect_err("mid points at a removed entry");
        assert_eq!(
            err,
            GraphError::DanglingReference {
                from: NodeId::new("mid"),
                to: NodeId::new("leaf"),
            }
        );
    }

    #[test]
    fn commit_reports_dangling_structural_references() {
        let mut d = DirtyExpr::new(NodeId::new("rec"));
        d.add_entry(
            NodeId::new("rec"),
            Entry::structural("core/record", Value::Ref(NodeId::new("ghost"))),
        );
        let err = d.commit().expect_err("payload points at nothing");
        assert_eq!(
            err,
            GraphError::DanglingReference {
                from: NodeId::new("rec"),
                to: NodeId::new("ghost"),
            }
        );
    }

    #[test]
    fn commit_rejects_cycles() {
        let mut d = chain();
        // Introduce a back-edge: leaf -> root.
        d.swap_entry(&NodeId::new("leaf"), Entry::new("wrap", [NodeId::new("root")]));
        let err = d.commit().expect_err("graph has a cycle");
        assert!(matches!(err, GraphError::CycleDetected { .. }));
    }

    #[test]
    fn commit_rejects_self_reference() {
        let mut d = DirtyExpr::new(NodeId::new("loop"));
        d.add_entry(NodeId::new("loop"), Entry::new("wrap", [NodeId::new("loop")]));
        let err = d.commit().expect_err("self-edge is a cycle");
        assert_eq!(err, GraphError::CycleDetected { id: NodeId::new("loop") });
    }

    #[test]
    fn round_trip_is_structurally_identical() {
        let mut d = chain();
        d.gc();
        let frozen = d.commit().expect("valid graph");
        let again = frozen.dirty().commit().expect("still valid");
        assert_eq!(frozen, again);
    }

    #[test]
    fn deep_chains_survive_validation() {
        let mut d = DirtyExpr::new(NodeId::new("n0"));
        d.add_entry(NodeId::new("end"), lit(0.0));
        let mut below = NodeId::new("end");
        for i in (0..20_000).rev() {
            let id = NodeId::new(format!("n{i}"));
            d.add_entry(id.clone(), Entry::new("wrap", [below]));
            below = id;
        }
        let frozen = d.commit().expect("deep but acyclic");
        assert_eq!(frozen.len(), 20_001);
    }
}
