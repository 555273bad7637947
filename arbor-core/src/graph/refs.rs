//! Structural Reference Scanner
//!
//! The one shared implementation that enumerates (and rewrites) the graph
//! references an entry makes: its `children` plus every `Value::Ref` nested
//! inside a structural payload, at arbitrary depth through lists and maps.
//!
//! GC, `rewire`, `splice_where`, `wrap_by_name`, and `commit` all walk
//! references through this module. Keeping a single scanner is what prevents
//! the drift where rewiring updates `children` but misses payload
//! references.

use crate::graph::{Entry, NodeId, Payload};
use crate::value::Value;

/// Collect every reference a structural payload makes. Literal and empty
/// payloads contribute nothing.
pub fn payload_refs(payload: &Payload) -> Vec<&NodeId> {
    match payload {
        Payload::Structural(value) => {
            let mut refs = Vec::new();
            collect_value_refs(value, &mut refs);
            refs
        }
        Payload::Empty | Payload::Literal(_) => Vec::new(),
    }
}

/// Collect every reference an entry makes: children first, then structural
/// payload references in value order.
pub fn entry_refs(entry: &Entry) -> Vec<&NodeId> {
    let mut refs: Vec<&NodeId> = entry.children.iter().collect();
    refs.extend(payload_refs(&entry.payload));
    refs
}

/// Replace every occurrence of `old` with `new` in an entry's children and
/// structural payload. Returns how many references were rewritten.
pub fn rewire_entry(entry: &mut Entry, old: &NodeId, new: &NodeId) -> usize {
    let mut hits = 0;
    for child in entry.children.iter_mut() {
        if child == old {
            *child = new.clone();
            hits += 1;
        }
    }
    if let Payload::Structural(value) = &mut entry.payload {
        hits += rewire_value(value, old, new);
    }
    hits
}

fn collect_value_refs<'a>(value: &'a Value, refs: &mut Vec<&'a NodeId>) {
    // Worklist instead of recursion: payload nesting depth is caller data.
    let mut work = vec![value];
    while let Some(value) = work.pop() {
        match value {
            Value::Ref(id) => refs.push(id),
            Value::List(items) => work.extend(items.iter().rev()),
            Value::Map(entries) => work.extend(entries.values().rev()),
            Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_) => {}
        }
    }
}

fn rewire_value(value: &mut Value, old: &NodeId, new: &NodeId) -> usize {
    let mut hits = 0;
    let mut work = vec![value];
    while let Some(value) = work.pop() {
        match value {
            Value::Ref(id) => {
                if id == old {
                    *id = new.clone();
                    hits += 1;
                }
            }
            Value::List(items) => work.extend(items.iter_mut()),
            Value::Map(entries) => work.extend(entries.values_mut()),
            Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_) => {}
        }
    }
    hits
}
