//! Values
//!
//! This module defines [`Value`], the type that flows through the fold
//! evaluator: handler results, literal payloads, and the leaves of
//! structural (record/tuple) payloads.
//!
//! # Structural References
//!
//! The [`Value::Ref`] variant is how a structural payload points at other
//! entries in the graph. Keeping references as a dedicated variant (instead
//! of strings that "happen to be" node ids) makes reference scanning in
//! `graph::refs` exhaustive and compiler-checked: a new variant cannot be
//! added without the scanner's `match` failing to compile.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// A value produced by evaluation or stored in a node payload.
///
/// Maps use `BTreeMap` so that iteration order, and therefore content-id
/// hashing and structural-payload evaluation order, is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All arithmetic in the built-in kit is f64.
    Num(f64),
    /// A string.
    Str(String),
    /// A reference to another entry in the same graph. Only meaningful
    /// inside structural payloads.
    Ref(NodeId),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// View this value as a number, if it is one.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// View this value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// View this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// View this value as a node reference, if it is one.
    pub fn as_ref_id(&self) -> Option<&NodeId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Truthiness used by conditional handlers: `Null` and `false` are
    /// false, everything else is true.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Ref(id) => write!(f, "&{id}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
