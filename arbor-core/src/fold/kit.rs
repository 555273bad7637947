//! Built-in Handler Kit
//!
//! Default handlers for the core node kinds: literals, arithmetic, lazy
//! conditionals, error recovery, scoped parameters, shared-state reads,
//! and structural aggregates. [`standard`] bundles them (plus the fiber
//! kinds from `fold::fiber`) into a ready-to-use [`Interpreter`].
//!
//! Domain-specific handlers (HTTP, SQL, object storage, ...) live outside
//! this crate and are registered the same way, directly or via plugins.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::GraphError;
use crate::graph::{refs, NodeId, Payload};
use crate::value::Value;

use super::driver::FoldCx;
use super::fiber::{Par, Race, Seq};
use super::handler::{Activation, Bindings, Handler, Resume, Step, Strict};
use super::interp::Interpreter;

/// Literal leaf.
pub const LIT_KIND: &str = "core/lit";
/// Scoped-parameter read. Volatile.
pub const PARAM_KIND: &str = "core/param";
/// Shared mutable state read. Volatile.
pub const STATE_KIND: &str = "core/state";
/// Evaluate a value, bind it by name for the body's subtree.
pub const BIND_KIND: &str = "core/bind";
/// Structural record aggregate.
pub const RECORD_KIND: &str = "core/record";
/// Structural tuple aggregate.
pub const TUPLE_KIND: &str = "core/tuple";
/// Lazy conditional.
pub const IF_KIND: &str = "flow/if";
/// Catch a child's failure and evaluate a fallback.
pub const TRY_KIND: &str = "flow/try";
/// Wait-all fiber.
pub const PAR_KIND: &str = "flow/par";
/// Wait-first-settled fiber.
pub const RACE_KIND: &str = "flow/race";
/// Sequential fiber.
pub const SEQ_KIND: &str = "flow/seq";
/// Addition over all children.
pub const ADD_KIND: &str = "num/add";
/// Binary subtraction.
pub const SUB_KIND: &str = "num/sub";
/// Multiplication over all children.
pub const MUL_KIND: &str = "num/mul";
/// Binary division.
pub const DIV_KIND: &str = "num/div";

/// All built-in handlers, with a private state store for `core/state`.
pub fn standard() -> Interpreter {
    standard_with_state(StateStore::default())
}

/// All built-in handlers, reading `core/state` nodes from the given store.
pub fn standard_with_state(store: StateStore) -> Interpreter {
    Interpreter::new()
        .with_handler(LIT_KIND, Arc::new(Lit))
        .with_handler(PARAM_KIND, Arc::new(ParamRead))
        .with_handler(STATE_KIND, Arc::new(StateRead::new(store)))
        .with_handler(BIND_KIND, Arc::new(Bind))
        .with_handler(RECORD_KIND, Arc::new(Structural))
        .with_handler(TUPLE_KIND, Arc::new(Structural))
        .with_handler(IF_KIND, Arc::new(If))
        .with_handler(TRY_KIND, Arc::new(Try))
        .with_handler(PAR_KIND, Arc::new(Par))
        .with_handler(RACE_KIND, Arc::new(Race))
        .with_handler(SEQ_KIND, Arc::new(Seq))
        .with_handler(ADD_KIND, Arc::new(Strict::new(add)))
        .with_handler(SUB_KIND, Arc::new(Strict::new(sub)))
        .with_handler(MUL_KIND, Arc::new(Strict::new(mul)))
        .with_handler(DIV_KIND, Arc::new(Strict::new(div)))
}

fn nums(cx: &FoldCx<'_>, values: &[Value]) -> Result<Vec<f64>, GraphError> {
    values
        .iter()
        .map(|value| {
            value
                .as_num()
                .ok_or_else(|| cx.error(format!("expected a number, got {value}")))
        })
        .collect()
}

fn add(cx: &FoldCx<'_>, values: Vec<Value>) -> Result<Value, GraphError> {
    Ok(Value::Num(nums(cx, &values)?.into_iter().sum()))
}

fn mul(cx: &FoldCx<'_>, values: Vec<Value>) -> Result<Value, GraphError> {
    Ok(Value::Num(nums(cx, &values)?.into_iter().product()))
}

fn sub(cx: &FoldCx<'_>, values: Vec<Value>) -> Result<Value, GraphError> {
    match nums(cx, &values)?.as_slice() {
        [a, b] => Ok(Value::Num(a - b)),
        other => Err(cx.error(format!("num/sub takes 2 children, got {}", other.len()))),
    }
}

fn div(cx: &FoldCx<'_>, values: Vec<Value>) -> Result<Value, GraphError> {
    match nums(cx, &values)?.as_slice() {
        [_, b] if *b == 0.0 => Err(cx.error("division by zero")),
        [a, b] => Ok(Value::Num(a / b)),
        other => Err(cx.error(format!("num/div takes 2 children, got {}", other.len()))),
    }
}

/// Returns the node's literal payload.
pub struct Lit;

impl Handler for Lit {
    fn activate(&self) -> Box<dyn Activation> {
        struct Act;
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, _: Resume) -> Result<Step, GraphError> {
                match &cx.entry().payload {
                    Payload::Literal(value) => Ok(Step::Done(value.clone())),
                    Payload::Empty => Ok(Step::Done(Value::Null)),
                    Payload::Structural(_) => {
                        Err(cx.error("core/lit requires a literal payload"))
                    }
                }
            }
        }
        Box::new(Act)
    }
}

/// Reads a name from the scope stack. The payload names the parameter.
pub struct ParamRead;

impl Handler for ParamRead {
    fn activate(&self) -> Box<dyn Activation> {
        struct Act;
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
                match input {
                    Resume::Start => Ok(Step::Param(payload_name(cx)?)),
                    Resume::Value(value) => Ok(Step::Done(value)),
                    Resume::Failed(err) => Err(err),
                }
            }
        }
        Box::new(Act)
    }
}

/// Evaluates child 0, binds it under the payload name, then evaluates
/// child 1 (the body) with that binding in scope.
pub struct Bind;

impl Handler for Bind {
    fn activate(&self) -> Box<dyn Activation> {
        #[derive(Clone, Copy)]
        enum Stage {
            Value,
            Body,
        }
        struct Act(Stage);
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
                match input {
                    Resume::Start => {
                        if cx.entry().children.len() != 2 {
                            return Err(cx.error("core/bind takes 2 children (value, body)"));
                        }
                        Ok(Step::Child(0))
                    }
                    Resume::Value(value) => match self.0 {
                        Stage::Value => {
                            self.0 = Stage::Body;
                            let mut bindings = Bindings::new();
                            bindings.insert(payload_name(cx)?, value);
                            Ok(Step::ChildScoped(1, bindings))
                        }
                        Stage::Body => Ok(Step::Done(value)),
                    },
                    Resume::Failed(err) => Err(err),
                }
            }
        }
        Box::new(Act(Stage::Value))
    }
}

/// Lazy conditional over children `[cond, then, else]`. Only the taken
/// branch is ever evaluated.
pub struct If;

impl Handler for If {
    fn activate(&self) -> Box<dyn Activation> {
        #[derive(Clone, Copy)]
        enum Stage {
            Cond,
            Branch,
        }
        struct Act(Stage);
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
                match input {
                    Resume::Start => {
                        if cx.entry().children.len() != 3 {
                            return Err(cx.error("flow/if takes 3 children (cond, then, else)"));
                        }
                        Ok(Step::Child(0))
                    }
                    Resume::Value(value) => match self.0 {
                        Stage::Cond => {
                            self.0 = Stage::Branch;
                            Ok(Step::Child(if value.truthy() { 1 } else { 2 }))
                        }
                        Stage::Branch => Ok(Step::Done(value)),
                    },
                    Resume::Failed(err) => Err(err),
                }
            }
        }
        Box::new(Act(Stage::Cond))
    }
}

/// Structured exception handling inside the graph: evaluate child 0; if
/// it fails, recover by evaluating child 1 instead.
pub struct Try;

impl Handler for Try {
    fn activate(&self) -> Box<dyn Activation> {
        #[derive(Clone, Copy)]
        enum Stage {
            Primary,
            Fallback,
        }
        struct Act(Stage);
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
                match input {
                    Resume::Start => {
                        if cx.entry().children.len() != 2 {
                            return Err(cx.error("flow/try takes 2 children (primary, fallback)"));
                        }
                        Ok(Step::Child(0))
                    }
                    Resume::Value(value) => Ok(Step::Done(value)),
                    Resume::Failed(err) => match self.0 {
                        Stage::Primary => {
                            self.0 = Stage::Fallback;
                            tracing::trace!(id = %cx.id(), %err, "try recovering");
                            Ok(Step::Child(1))
                        }
                        Stage::Fallback => Err(err),
                    },
                }
            }
        }
        Box::new(Act(Stage::Primary))
    }
}

/// Record/tuple aggregate: evaluates every reference in the structural
/// payload (via explicit-id requests) and rebuilds the payload with the
/// referenced values substituted in place.
pub struct Structural;

impl Handler for Structural {
    fn activate(&self) -> Box<dyn Activation> {
        struct Act {
            targets: Vec<NodeId>,
            values: Vec<Value>,
            next: usize,
        }
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
                match input {
                    Resume::Start => {
                        let Payload::Structural(_) = &cx.entry().payload else {
                            return Err(cx.error("aggregate kinds require a structural payload"));
                        };
                        self.targets = refs::payload_refs(&cx.entry().payload)
                            .into_iter()
                            .cloned()
                            .collect();
                    }
                    Resume::Value(value) => self.values.push(value),
                    Resume::Failed(err) => return Err(err),
                }
                if self.next < self.targets.len() {
                    let index = self.next;
                    self.next += 1;
                    Ok(Step::Node(self.targets[index].clone()))
                } else {
                    let Payload::Structural(shape) = &cx.entry().payload else {
                        return Err(cx.error("aggregate kinds require a structural payload"));
                    };
                    let values = std::mem::take(&mut self.values);
                    Ok(Step::Done(substitute(shape, values)))
                }
            }
        }
        Box::new(Act {
            targets: Vec::new(),
            values: Vec::new(),
            next: 0,
        })
    }
}

/// Replace `Ref` leaves with evaluated values, in the scanner's traversal
/// order. Explicit worklist; payload nesting depth is caller data.
fn substitute(shape: &Value, values: Vec<Value>) -> Value {
    let mut out = shape.clone();
    let mut values = values.into_iter();
    let mut work: Vec<&mut Value> = vec![&mut out];
    while let Some(slot) = work.pop() {
        match slot {
            Value::Ref(_) => *slot = values.next().unwrap_or(Value::Null),
            Value::List(items) => work.extend(items.iter_mut().rev()),
            Value::Map(entries) => work.extend(entries.values_mut().rev()),
            Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_) => {}
        }
    }
    out
}

/// Shared mutable cells read by `core/state` nodes. Cloning shares the
/// underlying storage.
#[derive(Clone, Default)]
pub struct StateStore {
    cells: Arc<RwLock<HashMap<String, Value>>>,
}

impl StateStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a cell.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.cells.write().insert(key.into(), value);
    }

    /// Read a cell.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.cells.read().get(key).cloned()
    }
}

/// Reads the store cell named by the payload. Volatile: every read sees
/// the store's current value, never a memoized one.
pub struct StateRead {
    store: StateStore,
}

impl StateRead {
    /// A reader over the given store.
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl Handler for StateRead {
    fn activate(&self) -> Box<dyn Activation> {
        struct Act(StateStore);
        impl Activation for Act {
            fn resume(&mut self, cx: &FoldCx<'_>, _: Resume) -> Result<Step, GraphError> {
                let key = payload_name(cx)?;
                Ok(Step::Done(self.0.get(&key).unwrap_or(Value::Null)))
            }
        }
        Box::new(Act(self.store.clone()))
    }
}

/// The string payload used by parameter and state reads to name their
/// target.
fn payload_name(cx: &FoldCx<'_>) -> Result<String, GraphError> {
    match &cx.entry().payload {
        Payload::Literal(Value::Str(name)) => Ok(name.clone()),
        _ => Err(cx.error("expected a string literal payload naming the target")),
    }
}
