//! Graph Query & Transform Operations
//!
//! Higher-level edits built from the transaction primitives. Each op takes a
//! frozen [`Expr`], runs a transaction internally, and returns a freshly
//! committed [`Expr`], so the result of every op is again guaranteed valid.
//!
//! # Predicates
//!
//! [`Pred`] matches entries by kind (exact or `prefix/*` glob), by alias
//! name, by leaf-ness, or by exact child count, with `and`/`or`/`not`
//! combinators. Predicates are evaluated against `(id, entry, adjacency)`
//! so alias matching can consult the rest of the graph.

use indexmap::IndexSet;
use std::collections::HashMap;

use crate::error::GraphError;
use crate::value::Value;

use super::entry::{Entry, NodeId};
use super::expr::{Adjacency, Expr};

/// A predicate over graph entries.
#[derive(Debug, Clone)]
pub enum Pred {
    /// Exact kind match.
    Kind(String),
    /// Kind prefix match: `Pred::kind_glob("num/*")` matches `num/add`.
    KindGlob(String),
    /// Matches the node that the named alias points at.
    Alias(String),
    /// Matches entries with no children.
    Leaf,
    /// Matches entries with exactly this many children.
    ChildCount(usize),
    /// Both predicates must match.
    And(Box<Pred>, Box<Pred>),
    /// Either predicate must match.
    Or(Box<Pred>, Box<Pred>),
    /// The predicate must not match.
    Not(Box<Pred>),
}

impl Pred {
    /// Exact kind match.
    pub fn kind(kind: impl Into<String>) -> Self {
        Pred::Kind(kind.into())
    }

    /// Glob kind match. A trailing `*` matches any suffix; without one this
    /// degenerates to an exact match.
    pub fn kind_glob(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Pred::KindGlob(prefix.to_owned()),
            None => Pred::Kind(pattern.to_owned()),
        }
    }

    /// Match the target of the named alias.
    pub fn alias(name: impl Into<String>) -> Self {
        Pred::Alias(name.into())
    }

    /// Match entries with no children.
    pub fn leaf() -> Self {
        Pred::Leaf
    }

    /// Match entries with exactly `n` children.
    pub fn child_count(n: usize) -> Self {
        Pred::ChildCount(n)
    }

    /// Combinator: both.
    pub fn and(self, other: Pred) -> Self {
        Pred::And(Box::new(self), Box::new(other))
    }

    /// Combinator: either.
    pub fn or(self, other: Pred) -> Self {
        Pred::Or(Box::new(self), Box::new(other))
    }

    /// Combinator: negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Pred::Not(Box::new(self))
    }

    /// Evaluate against one entry.
    pub fn matches(&self, id: &NodeId, entry: &Entry, adj: &Adjacency) -> bool {
        match self {
            Pred::Kind(kind) => entry.kind == *kind,
            Pred::KindGlob(prefix) => entry.kind.starts_with(prefix),
            Pred::Alias(name) => adj
                .get(&NodeId::alias(name))
                .filter(|alias| alias.is_alias())
                .and_then(|alias| alias.children.first())
                .is_some_and(|target| target == id),
            Pred::Leaf => entry.is_leaf(),
            Pred::ChildCount(n) => entry.children.len() == *n,
            Pred::And(a, b) => a.matches(id, entry, adj) && b.matches(id, entry, adj),
            Pred::Or(a, b) => a.matches(id, entry, adj) || b.matches(id, entry, adj),
            Pred::Not(inner) => !inner.matches(id, entry, adj),
        }
    }
}

/// Ids of all entries matching the predicate, in insertion order.
pub fn select_where(expr: &Expr, pred: &Pred) -> Vec<NodeId> {
    expr.adj()
        .iter()
        .filter(|(id, entry)| pred.matches(id, entry, expr.adj()))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Replace each matching entry with `rewrite(entry)`, preserving its id and
/// every reference to it.
pub fn map_where(
    expr: &Expr,
    pred: &Pred,
    rewrite: impl Fn(&Entry) -> Entry,
) -> Result<Expr, GraphError> {
    let matched = select_where(expr, pred);
    let mut d = expr.dirty();
    for id in matched {
        if let Some(entry) = expr.get(&id) {
            d.swap_entry(&id, rewrite(entry));
        }
    }
    d.commit()
}

/// Substitute only the kind tag of matching entries, holding children and
/// payload fixed.
pub fn replace_where(expr: &Expr, pred: &Pred, new_kind: &str) -> Result<Expr, GraphError> {
    map_where(expr, pred, |entry| {
        let mut entry = entry.clone();
        entry.kind = new_kind.to_owned();
        entry
    })
}

/// Remove every matching node and reconnect its parents directly to its
/// children, resolving recursively through chains of spliced nodes.
///
/// In `children` lists a spliced reference fans out to all of its resolved
/// replacements. In structural payloads, where a single `Ref` slot cannot
/// fan out, the slot becomes the single replacement, a `List` of
/// replacements, or `Null` when nothing survives. A spliced root is replaced
/// by its first surviving child.
pub fn splice_where(expr: &Expr, pred: &Pred) -> Result<Expr, GraphError> {
    let matched: IndexSet<NodeId> = select_where(expr, pred).into_iter().collect();
    if matched.is_empty() {
        return expr.dirty().commit();
    }

    let mut memo: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for id in &matched {
        resolve_replacements(id, expr, &matched, &mut memo);
    }

    let mut d = expr.dirty();
    let survivors: Vec<NodeId> = expr
        .adj()
        .keys()
        .filter(|id| !matched.contains(*id))
        .cloned()
        .collect();

    for id in &survivors {
        let Some(original) = expr.get(id) else { continue };
        let mut entry = original.clone();
        entry.children = entry
            .children
            .iter()
            .flat_map(|child| match memo.get(child) {
                Some(replacements) => replacements.clone(),
                None => vec![child.clone()],
            })
            .collect();
        if let super::entry::Payload::Structural(value) = &mut entry.payload {
            splice_value(value, &memo);
        }
        d.swap_entry(id, entry);
    }

    for id in &matched {
        d.remove_entry(id);
    }

    if matched.contains(expr.root()) {
        let replacements = memo.get(expr.root()).cloned().unwrap_or_default();
        match replacements.first() {
            Some(new_root) => d.set_root(new_root.clone()),
            None => {
                // Splicing consumed the whole graph; surface it as the root
                // going missing rather than committing an empty graph.
                return Err(GraphError::MissingNode {
                    id: expr.root().clone(),
                    wanted_by: None,
                });
            }
        }
    }

    d.gc_keep_aliases();
    d.commit()
}

/// Resolve what a spliced node's reference should be replaced with: its
/// children, looking through any child that is itself spliced. Post-order
/// over an explicit stack; splice-chain depth is caller data.
fn resolve_replacements<'a>(
    start: &'a NodeId,
    expr: &'a Expr,
    matched: &IndexSet<NodeId>,
    memo: &mut HashMap<NodeId, Vec<NodeId>>,
) {
    if !matched.contains(start) || memo.contains_key(start) {
        return;
    }
    let mut stack: Vec<(&'a NodeId, usize)> = vec![(start, 0)];
    while let Some(&(id, next)) = stack.last() {
        let children: &[NodeId] = expr
            .get(id)
            .map(|entry| entry.children.as_slice())
            .unwrap_or_default();
        if let Some(child) = children.get(next) {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if matched.contains(child) && !memo.contains_key(child) {
                stack.push((child, 0));
            }
        } else {
            stack.pop();
            let mut replacements = Vec::new();
            for child in children {
                if matched.contains(child) {
                    replacements.extend(memo.get(child).cloned().unwrap_or_default());
                } else {
                    replacements.push(child.clone());
                }
            }
            memo.insert(id.clone(), replacements);
        }
    }
}

/// Rewrite spliced `Ref` leaves inside a structural payload value.
fn splice_value(value: &mut Value, memo: &HashMap<NodeId, Vec<NodeId>>) {
    let mut work = vec![value];
    while let Some(value) = work.pop() {
        match value {
            Value::Ref(id) => {
                if let Some(replacements) = memo.get(id) {
                    *value = match replacements.as_slice() {
                        [] => Value::Null,
                        [only] => Value::Ref(only.clone()),
                        many => Value::List(many.iter().cloned().map(Value::Ref).collect()),
                    };
                }
            }
            Value::List(items) => work.extend(items.iter_mut()),
            Value::Map(entries) => work.extend(entries.values_mut()),
            Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_) => {}
        }
    }
}

/// Insert a fresh single-child entry of `wrapper_kind` around `target`,
/// rewiring every other reference to `target` (children and structural
/// payloads) to the wrapper. If `target` was the root, the wrapper becomes
/// the new root. Inverse partner of [`splice_where`].
pub fn wrap_by_name(expr: &Expr, target: &NodeId, wrapper_kind: &str) -> Result<Expr, GraphError> {
    let mut d = expr.dirty();
    let wrapper_id = d.fresh_id();
    d.rewire(target, &wrapper_id);
    d.add_entry(wrapper_id.clone(), Entry::new(wrapper_kind, [target.clone()]));
    if expr.root() == target {
        d.set_root(wrapper_id);
    }
    d.commit()
}

/// Insert an alias entry naming `target`, enabling `by_name` lookups that
/// survive structural edits.
pub fn name(expr: &Expr, alias: &str, target: &NodeId) -> Result<Expr, GraphError> {
    let mut d = expr.dirty();
    d.add_entry(NodeId::alias(alias), Entry::alias(target.clone()));
    d.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DirtyExpr, Payload};

    fn lit(n: f64) -> Entry {
        Entry::leaf("core/lit", Value::Num(n))
    }

    /// mul(add(3, 4), 5)
    fn arith() -> Expr {
        let mut d = DirtyExpr::new(NodeId::new("mul"));
        d.add_entry(NodeId::new("three"), lit(3.0));
        d.add_entry(NodeId::new("four"), lit(4.0));
        d.add_entry(NodeId::new("five"), lit(5.0));
        d.add_entry(
            NodeId::new("add"),
            Entry::new("num/add", [NodeId::new("three"), NodeId::new("four")]),
        );
        d.add_entry(
            NodeId::new("mul"),
            Entry::new("num/mul", [NodeId::new("add"), NodeId::new("five")]),
        );
        d.commit().expect("valid graph")
    }

    #[test]
    fn predicates_match_kinds_and_shapes() {
        let expr = arith();
        let add = expr.get(&NodeId::new("add")).expect("entry exists");

        assert!(Pred::kind("num/add").matches(&NodeId::new("add"), add, expr.adj()));
        assert!(Pred::kind_glob("num/*").matches(&NodeId::new("add"), add, expr.adj()));
        assert!(!Pred::kind_glob("core/*").matches(&NodeId::new("add"), add, expr.adj()));
        assert!(Pred::child_count(2).matches(&NodeId::new("add"), add, expr.adj()));
        assert!(!Pred::leaf().matches(&NodeId::new("add"), add, expr.adj()));

        let three = expr.get(&NodeId::new("three")).expect("entry exists");
        assert!(Pred::leaf().matches(&NodeId::new("three"), three, expr.adj()));
        assert!(Pred::leaf()
            .and(Pred::kind("core/lit"))
            .matches(&NodeId::new("three"), three, expr.adj()));
        assert!(Pred::kind("num/mul")
            .or(Pred::leaf())
            .matches(&NodeId::new("three"), three, expr.adj()));
        assert!(Pred::leaf().not().matches(&NodeId::new("add"), add, expr.adj()));
    }

    #[test]
    fn alias_predicate_matches_the_target() {
        let expr = name(&arith(), "sum", &NodeId::new("add")).expect("alias inserted");
        let hits = select_where(&expr, &Pred::alias("sum"));
        assert_eq!(hits, vec![NodeId::new("add")]);
        assert_eq!(expr.by_name("sum"), Some(&NodeId::new("add")));
    }

    #[test]
    fn select_where_finds_all_leaves() {
        let expr = arith();
        let leaves = select_where(&expr, &Pred::leaf());
        assert_eq!(
            leaves,
            vec![NodeId::new("three"), NodeId::new("four"), NodeId::new("five")]
        );
    }

    #[test]
    fn replace_where_swaps_only_the_kind() {
        let expr = arith();
        let replaced = replace_where(&expr, &Pred::kind("num/add"), "num/sub")
            .expect("valid rewrite");
        let entry = replaced.get(&NodeId::new("add")).expect("entry exists");
        assert_eq!(entry.kind, "num/sub");
        assert_eq!(entry.children.len(), 2);
        // Everything else untouched.
        assert_eq!(replaced.get(&NodeId::new("mul")), expr.get(&NodeId::new("mul")));
    }

    #[test]
    fn map_where_rewrites_matched_entries() {
        let expr = arith();
        let doubled = map_where(&expr, &Pred::kind("core/lit"), |entry| {
            match &entry.payload {
                Payload::Literal(Value::Num(n)) => lit(n * 2.0),
                _ => entry.clone(),
            }
        })
        .expect("valid rewrite");
        let three = doubled.get(&NodeId::new("three")).expect("entry exists");
        assert_eq!(three.payload, Payload::Literal(Value::Num(6.0)));
    }

    #[test]
    fn splice_leaves_keeps_operators_with_rewired_children() {
        let expr = arith();
        let spliced = splice_where(&expr, &Pred::leaf()).expect("valid splice");
        assert_eq!(spliced.len(), 2);
        let add = spliced.get(&NodeId::new("add")).expect("entry exists");
        assert!(add.children.is_empty());
        let mul = spliced.get(&NodeId::new("mul")).expect("entry exists");
        // five was spliced away entirely; add survives as mul's only child.
        assert_eq!(mul.children.as_slice(), [NodeId::new("add")].as_slice());
    }

    #[test]
    fn splice_resolves_through_chains() {
        // top -> mid -> bottom -> leaf; splice mid and bottom together.
        let mut d = DirtyExpr::new(NodeId::new("top"));
        d.add_entry(NodeId::new("leaf"), lit(1.0));
        d.add_entry(NodeId::new("bottom"), Entry::new("pass", [NodeId::new("leaf")]));
        d.add_entry(NodeId::new("mid"), Entry::new("pass", [NodeId::new("bottom")]));
        d.add_entry(NodeId::new("top"), Entry::new("wrap", [NodeId::new("mid")]));
        let expr = d.commit().expect("valid graph");

        let spliced = splice_where(&expr, &Pred::kind("pass")).expect("valid splice");
        let top = spliced.get(&NodeId::new("top")).expect("entry exists");
        assert_eq!(top.children.as_slice(), [NodeId::new("leaf")].as_slice());
        assert_eq!(spliced.len(), 2);
    }

    #[test]
    fn splice_resolves_deep_chains_without_recursion() {
        // top -> pass x 10_000 -> leaf, spliced down to top -> leaf.
        let mut d = DirtyExpr::new(NodeId::new("top"));
        d.add_entry(NodeId::new("leaf"), lit(1.0));
        let mut below = NodeId::new("leaf");
        for i in 0..10_000 {
            let id = NodeId::new(format!("p{i}"));
            d.add_entry(id.clone(), Entry::new("pass", [below]));
            below = id;
        }
        d.add_entry(NodeId::new("top"), Entry::new("wrap", [below]));
        let expr = d.commit().expect("valid graph");

        let spliced = splice_where(&expr, &Pred::kind("pass")).expect("valid splice");
        let top = spliced.get(&NodeId::new("top")).expect("entry exists");
        assert_eq!(top.children.as_slice(), [NodeId::new("leaf")].as_slice());
        assert_eq!(spliced.len(), 2);
    }

    #[test]
    fn splice_fans_out_multi_child_nodes() {
        // wrap(pair(a, b)): splicing pair gives wrap two children.
        let mut d = DirtyExpr::new(NodeId::new("wrap"));
        d.add_entry(NodeId::new("a"), lit(1.0));
        d.add_entry(NodeId::new("b"), lit(2.0));
        d.add_entry(
            NodeId::new("pair"),
            Entry::new("pass", [NodeId::new("a"), NodeId::new("b")]),
        );
        d.add_entry(NodeId::new("wrap"), Entry::new("wrap", [NodeId::new("pair")]));
        let expr = d.commit().expect("valid graph");

        let spliced = splice_where(&expr, &Pred::kind("pass")).expect("valid splice");
        let wrap = spliced.get(&NodeId::new("wrap")).expect("entry exists");
        assert_eq!(
            wrap.children.as_slice(),
            [NodeId::new("a"), NodeId::new("b")].as_slice()
        );
    }

    #[test]
    fn splice_of_root_promotes_first_surviving_child() {
        let expr = arith();
        let spliced = splice_where(&expr, &Pred::kind("num/mul")).expect("valid splice");
        assert_eq!(spliced.root(), &NodeId::new("add"));
        // five became unreachable and was collected.
        assert!(spliced.get(&NodeId::new("five")).is_none());
    }

    #[test]
    fn splice_rewrites_structural_payloads() {
        let mut d = DirtyExpr::new(NodeId::new("rec"));
        d.add_entry(NodeId::new("a"), lit(1.0));
        d.add_entry(NodeId::new("b"), lit(2.0));
        d.add_entry(
            NodeId::new("pair"),
            Entry::new("pass", [NodeId::new("a"), NodeId::new("b")]),
        );
        d.add_entry(
            NodeId::new("rec"),
            Entry::structural("core/record", Value::Ref(NodeId::new("pair"))),
        );
        let expr = d.commit().expect("valid graph");

        let spliced = splice_where(&expr, &Pred::kind("pass")).expect("valid splice");
        let rec = spliced.get(&NodeId::new("rec")).expect("entry exists");
        match &rec.payload {
            Payload::Structural(Value::List(items)) => {
                assert_eq!(
                    items.as_slice(),
                    [Value::Ref(NodeId::new("a")), Value::Ref(NodeId::new("b"))].as_slice()
                );
            }
            other => panic!("expected fan-out list, got {other:?}"),
        }
    }

    #[test]
    fn wrap_then_splice_round_trips() {
        let expr = arith();
        let wrapped = wrap_by_name(&expr, &NodeId::new("add"), "trace/span")
            .expect("valid wrap");

        // The wrapper sits between mul and add.
        let wrapper_id = select_where(&wrapped, &Pred::kind("trace/span"))
            .into_iter()
            .next()
            .expect("wrapper exists");
        let mul = wrapped.get(&NodeId::new("mul")).expect("entry exists");
        assert_eq!(mul.children[0], wrapper_id);
        let wrapper = wrapped.get(&wrapper_id).expect("entry exists");
        assert_eq!(wrapper.children.as_slice(), [NodeId::new("add")].as_slice());

        let restored = splice_where(&wrapped, &Pred::kind("trace/span"))
            .expect("valid splice");
        assert_eq!(restored, expr);
    }

    #[test]
    fn wrap_of_root_moves_the_root() {
        let expr = arith();
        let wrapped = wrap_by_name(&expr, &NodeId::new("mul"), "trace/span")
            .expect("valid wrap");
        let root_entry = wrapped.get(wrapped.root()).expect("entry exists");
        assert_eq!(root_entry.kind, "trace/span");
        assert_eq!(root_entry.children.as_slice(), [NodeId::new("mul")].as_slice());
    }

    #[test]
    fn name_requires_an_existing_target() {
        let expr = arith();
        let err = name(&expr, "ghost", &NodeId::new("missing")).expect_err("dangling alias");
        assert_eq!(
            err,
            GraphError::DanglingReference {
                from: NodeId::alias("ghost"),
                to: NodeId::new("missing"),
            }
        );
    }
}
