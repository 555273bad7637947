//! Handler Protocol
//!
//! A handler is a resumable computation for one node kind. The coroutine
//! contract is expressed as an enum-returning step function: the driver
//! calls [`Activation::resume`] with what happened since the last step
//! ([`Resume`]), and the activation answers with what it wants next
//! ([`Step`]).
//!
//! # Protocol
//!
//! 1. The driver creates one [`Activation`] per frame via
//!    [`Handler::activate`].
//! 2. The first `resume` receives [`Resume::Start`].
//! 3. Each subsequent `resume` receives either the requested child's value
//!    ([`Resume::Value`]) or its failure ([`Resume::Failed`]), the
//!    resumable exception. Returning `Err` rethrows; anything else
//!    recovers.
//! 4. The activation ends by returning [`Step::Done`] or `Err`.

use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::graph::NodeId;
use crate::value::Value;

use super::driver::FoldCx;

/// Scope bindings supplied with a scoped child request. Visible to every
/// parameter read in the child's subtree until that child's frame pops.
pub type Bindings = BTreeMap<String, Value>;

/// What an activation asks the driver to do next.
#[derive(Debug)]
pub enum Step {
    /// Evaluate the child at this position in `children` and resume with
    /// its value.
    Child(usize),
    /// Like [`Step::Child`], but push a scope frame for the duration of
    /// the child's (and its descendants') evaluation.
    ChildScoped(usize, Bindings),
    /// Evaluate an explicit node id, used for references outside the
    /// `children` list, e.g. inside structural payloads.
    Node(NodeId),
    /// Look up a name on the scope stack (innermost binding wins) and
    /// resume with its value, or with `UnboundParam`.
    Param(String),
    /// This activation is finished; its result is the node's value.
    Done(Value),
}

/// What the driver feeds back into an activation.
#[derive(Debug)]
pub enum Resume {
    /// First entry into the activation.
    Start,
    /// The previously requested child's value.
    Value(Value),
    /// The previously requested child failed. Return `Err` to rethrow, or
    /// any `Step` to recover.
    Failed(GraphError),
}

/// One in-flight evaluation of one node.
pub trait Activation: Send {
    /// Drive the activation one step.
    fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError>;
}

/// Evaluation semantics for one node kind.
pub trait Handler: Send + Sync {
    /// Create a fresh activation for one node.
    fn activate(&self) -> Box<dyn Activation>;
}

/// The common strict-evaluation shape: evaluate all children left to
/// right, then combine their values. Most leaf and arithmetic handlers are
/// a `Strict` around a plain function.
pub struct Strict<F> {
    combine: F,
}

impl<F> Strict<F>
where
    F: Fn(&FoldCx<'_>, Vec<Value>) -> Result<Value, GraphError> + Clone + Send + Sync + 'static,
{
    /// Wrap a combining function as a handler.
    pub fn new(combine: F) -> Self {
        Self { combine }
    }
}

impl<F> Handler for Strict<F>
where
    F: Fn(&FoldCx<'_>, Vec<Value>) -> Result<Value, GraphError> + Clone + Send + Sync + 'static,
{
    fn activate(&self) -> Box<dyn Activation> {
        Box::new(StrictActivation {
            combine: self.combine.clone(),
            values: Vec::new(),
            next: 0,
        })
    }
}

struct StrictActivation<F> {
    combine: F,
    values: Vec<Value>,
    next: usize,
}

impl<F> Activation for StrictActivation<F>
where
    F: Fn(&FoldCx<'_>, Vec<Value>) -> Result<Value, GraphError> + Send,
{
    fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
        match input {
            Resume::Start => {}
            Resume::Value(value) => self.values.push(value),
            Resume::Failed(err) => return Err(err),
        }
        if self.next < cx.entry().children.len() {
            let index = self.next;
            self.next += 1;
            Ok(Step::Child(index))
        } else {
            let values = std::mem::take(&mut self.values);
            Ok(Step::Done((self.combine)(cx, values)?))
        }
    }
}
