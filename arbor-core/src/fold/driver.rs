//! Fold Driver
//!
//! The trampoline that evaluates a node graph against an interpreter's
//! kind → handler table. Evaluation uses an explicit LIFO stack of
//! activation frames, never native recursion, so graphs tens of thousands
//! of nodes deep fold safely.
//!
//! # Algorithm
//!
//! Each frame holds a node id, its activation, the pending resume input, a
//! taint flag, and the scope-stack depth at which it was pushed. The loop:
//!
//! 1. Resume the top activation with its pending input (`Start` on first
//!    entry, a child's value, or a child's failure thrown back in).
//! 2. If it raises uncaught, pop the frame, restore the scope stack to the
//!    frame's depth, record the frame's taint, and feed the error to the
//!    parent (or surface it as the fold's failure). Structural errors are
//!    fatal and abort instead.
//! 3. If it completes, memoize the value unless the frame is tainted,
//!    taint the node if its kind is volatile or any child was tainted,
//!    pop, restore scope depth, and feed the value to the parent.
//! 4. If it requests a child: resolve the id, push the supplied scope
//!    binding if any, serve from memo when the child is neither volatile
//!    nor tainted, otherwise evict any stale memo entry and push a fresh
//!    frame.
//!
//! # Memoization & Taint
//!
//! A volatile kind is always re-evaluated and never cached. Any node that
//! transitively depends on a volatile or tainted child is tainted itself
//! and also never cached, so reads of mutable or ambient state are never
//! silently reused from an unrelated evaluation path, while
//! purely-deterministic shared subexpressions still fold exactly once.
//! Taint survives failure: a frame that errors out records its own
//! volatility and child taint before the error is thrown to the parent,
//! so an ancestor that catches the failure is still marked impure.
//!
//! Memoizable nodes are claimed first-touch: the first request installs an
//! in-flight latch, and any concurrent request for the same node blocks on
//! it and then reads the memo. A shared pure node's handler therefore runs
//! exactly once per fold call even when fiber branches reach it at the
//! same time.
//!
//! # Fibers
//!
//! One `fold`/`fold_from` call owns one memo/taint state. Fiber handlers
//! re-enter the driver through [`FoldCx::fork`], which shares that state
//! (a shared leaf folds once across the whole call) but gets a fresh scope
//! stack and frame stack. Independent top-level `fold_from` calls are
//! fully isolated. The memo and taint tables are concurrent maps because
//! fiber branches run on scoped threads over the same read-only graph.

use std::sync::Arc;

use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::error::GraphError;
use crate::graph::{Adjacency, Entry, Expr, NodeId};
use crate::value::Value;

use super::handler::{Bindings, Resume, Step};
use super::interp::Interpreter;

/// Evaluate a frozen expression's root.
pub fn fold(expr: &Expr, interp: &Interpreter) -> Result<Value, GraphError> {
    fold_from(expr.root(), expr.adj(), interp)
}

/// Evaluate an arbitrary node of a (possibly shared) adjacency map with a
/// fresh, independent memo/taint state.
pub fn fold_from(
    root: &NodeId,
    adj: &Adjacency,
    interp: &Interpreter,
) -> Result<Value, GraphError> {
    let state = FoldState::default();
    let result = run(root, adj, interp, &state);
    match &result {
        Ok(value) => tracing::debug!(%root, %value, "fold finished"),
        Err(err) => tracing::debug!(%root, %err, "fold failed"),
    }
    result
}

/// First-touch latch for one in-flight node evaluation. The winning
/// branch opens it once its result (or taint) has landed; waiting
/// branches then re-read the memo.
#[derive(Default)]
struct Latch {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cv.wait(&mut done);
        }
    }

    fn open(&self) {
        *self.done.lock() = true;
        self.cv.notify_all();
    }
}

/// Per-fold memo, taint, and in-flight tables, shared by every fiber
/// forked within one fold call.
#[derive(Default)]
pub(crate) struct FoldState {
    memo: DashMap<NodeId, Value>,
    tainted: DashMap<NodeId, ()>,
    inflight: DashMap<NodeId, Arc<Latch>>,
}

/// Everything an activation can see about its surroundings: its own node,
/// the read-only graph, the interpreter, and the fold's shared state.
pub struct FoldCx<'a> {
    id: &'a NodeId,
    entry: &'a Entry,
    adj: &'a Adjacency,
    interp: &'a Interpreter,
    state: &'a FoldState,
}

impl<'a> FoldCx<'a> {
    /// The node being evaluated.
    pub fn id(&self) -> &NodeId {
        self.id
    }

    /// Its entry.
    pub fn entry(&self) -> &Entry {
        self.entry
    }

    /// Its kind tag.
    pub fn kind(&self) -> &str {
        &self.entry.kind
    }

    /// The graph under evaluation.
    pub fn adj(&self) -> &Adjacency {
        self.adj
    }

    /// The interpreter driving this fold.
    pub fn interp(&self) -> &Interpreter {
        self.interp
    }

    /// Shorthand for a handler error at this node.
    pub fn error(&self, message: impl Into<String>) -> GraphError {
        GraphError::handler(self.id, &self.entry.kind, message)
    }

    /// Run an isolated sub-evaluation of `root` on the caller's thread or
    /// a scoped worker. The fork shares this fold's memo/taint tables but
    /// owns a fresh scope stack and frame stack, so concurrent branches
    /// cannot cross-talk through scoping while shared pure subexpressions
    /// still fold once per call.
    pub fn fork(&self, root: &NodeId) -> Result<Value, GraphError> {
        let result = run(root, self.adj, self.interp, self.state);
        // Taint crosses the fork boundary: a branch that touched volatile
        // state taints the forking node too.
        if self.state.tainted.contains_key(root) {
            self.state.tainted.insert(self.id.clone(), ());
        }
        result
    }
}

/// One activation frame on the trampoline stack.
struct Frame {
    id: NodeId,
    kind: String,
    act: Box<dyn super::handler::Activation>,
    input: Resume,
    tainted: bool,
    scope_depth: usize,
}

/// Outcome of requesting a node's evaluation.
enum Requested {
    /// A fresh frame was pushed; the value will arrive via `Resume`.
    Pushed,
    /// Served from memo immediately.
    Memoized(Value),
}

pub(crate) fn run(
    root: &NodeId,
    adj: &Adjacency,
    interp: &Interpreter,
    state: &FoldState,
) -> Result<Value, GraphError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut scopes: Vec<Bindings> = Vec::new();
    let result = drive(root, adj, interp, state, &mut stack, &mut scopes);
    // A fatal exit leaves claimed frames behind; open their latches so
    // concurrent branches waiting on them wake up and fail on their own.
    for frame in stack.drain(..) {
        release(state, &frame.id);
    }
    result
}

fn drive(
    root: &NodeId,
    adj: &Adjacency,
    interp: &Interpreter,
    state: &FoldState,
    stack: &mut Vec<Frame>,
    scopes: &mut Vec<Bindings>,
) -> Result<Value, GraphError> {
    match request(root.clone(), None, None, adj, interp, state, stack, scopes)? {
        Requested::Memoized(value) => return Ok(value),
        Requested::Pushed => {}
    }

    loop {
        // Resume the top activation. Field borrows are split so the
        // context can reference the frame's id while the activation is
        // borrowed mutably.
        let step = {
            let frame = stack
                .last_mut()
                .expect("every pop either returns or feeds a parent");
            let entry = match adj.get(&frame.id) {
                Some(entry) => entry,
                None => {
                    return Err(GraphError::MissingNode {
                        id: frame.id.clone(),
                        wanted_by: None,
                    })
                }
            };
            let cx = FoldCx {
                id: &frame.id,
                entry,
                adj,
                interp,
                state,
            };
            let input = std::mem::replace(&mut frame.input, Resume::Start);
            frame.act.resume(&cx, input)
        };

        match step {
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                // Uncaught in this activation: unwind one frame and throw
                // the error into the parent. The frame's own volatility
                // and child taint are recorded first, so an ancestor that
                // catches the failure is never memoized as pure.
                let frame = pop(stack, scopes);
                let tainted = settle(interp, state, &frame, None);
                match stack.last_mut() {
                    Some(parent) => {
                        parent.tainted |= tainted;
                        parent.input = Resume::Failed(err);
                    }
                    None => return Err(err),
                }
            }
            Ok(Step::Done(value)) => {
                let frame = pop(stack, scopes);
                let tainted = settle(interp, state, &frame, Some(&value));
                match stack.last_mut() {
                    Some(parent) => {
                        parent.tainted |= tainted;
                        parent.input = Resume::Value(value);
                    }
                    None => return Ok(value),
                }
            }
            Ok(Step::Child(index)) => {
                let (child, requester) = resolve_child(stack, adj, index)?;
                if let Requested::Memoized(value) = request(
                    child,
                    Some(requester),
                    None,
                    adj,
                    interp,
                    state,
                    stack,
                    scopes,
                )? {
                    feed(stack, Resume::Value(value));
                }
            }
            Ok(Step::ChildScoped(index, bindings)) => {
                let (child, requester) = resolve_child(stack, adj, index)?;
                if let Requested::Memoized(value) = request(
                    child,
                    Some(requester),
                    Some(bindings),
                    adj,
                    interp,
                    state,
                    stack,
                    scopes,
                )? {
                    feed(stack, Resume::Value(value));
                }
            }
            Ok(Step::Node(child)) => {
                let requester = stack.last().map(|frame| frame.id.clone());
                if let Requested::Memoized(value) =
                    request(child, requester, None, adj, interp, state, stack, scopes)?
                {
                    feed(stack, Resume::Value(value));
                }
            }
            Ok(Step::Param(name)) => {
                // Innermost binding wins, so nested scopes shadow outer ones.
                let found = scopes
                    .iter()
                    .rev()
                    .find_map(|bindings| bindings.get(&name).cloned());
                let input = match found {
                    Some(value) => Resume::Value(value),
                    None => {
                        let id = stack
                            .last()
                            .map(|frame| frame.id.clone())
                            .unwrap_or_else(|| root.clone());
                        Resume::Failed(GraphError::UnboundParam { name, id })
                    }
                };
                feed(stack, input);
            }
        }
    }
}

/// Pop the top frame and restore the scope stack to its depth, including
/// on error paths.
fn pop(stack: &mut Vec<Frame>, scopes: &mut Vec<Bindings>) -> Frame {
    let frame = stack.pop().expect("pop is only called with a top frame");
    scopes.truncate(frame.scope_depth);
    tracing::trace!(id = %frame.id, tainted = frame.tainted, "pop frame");
    frame
}

/// Record a finished frame's taint and memo outcome, then open its
/// latch. `value` is `None` when the frame failed. Returns the frame's
/// final taint.
fn settle(
    interp: &Interpreter,
    state: &FoldState,
    frame: &Frame,
    value: Option<&Value>,
) -> bool {
    let tainted = frame.tainted
        || interp.is_volatile(&frame.kind)
        || state.tainted.contains_key(&frame.id);
    if tainted {
        state.tainted.insert(frame.id.clone(), ());
        state.memo.remove(&frame.id);
    } else if let Some(value) = value {
        state.memo.insert(frame.id.clone(), value.clone());
    }
    release(state, &frame.id);
    tainted
}

/// Open and drop a node's in-flight latch, if it holds one.
fn release(state: &FoldState, id: &NodeId) {
    if let Some((_, latch)) = state.inflight.remove(id) {
        latch.open();
    }
}

/// Set the pending input of the (necessarily present) top frame.
fn feed(stack: &mut [Frame], input: Resume) {
    if let Some(frame) = stack.last_mut() {
        frame.input = input;
    }
}

/// Resolve a positional child request against the top frame's entry.
fn resolve_child(
    stack: &[Frame],
    adj: &Adjacency,
    index: usize,
) -> Result<(NodeId, NodeId), GraphError> {
    let frame = stack.last().expect("child requests come from a top frame");
    let entry = adj.get(&frame.id).ok_or_else(|| GraphError::MissingNode {
        id: frame.id.clone(),
        wanted_by: None,
    })?;
    let child = entry
        .children
        .get(index)
        .cloned()
        .ok_or_else(|| GraphError::InvalidChildIndex {
            id: frame.id.clone(),
            index,
            len: entry.children.len(),
        })?;
    Ok((child, frame.id.clone()))
}

/// Request evaluation of a node: serve from memo when allowed, otherwise
/// claim it and push a fresh frame (with its scope binding, if one was
/// supplied). A claim already held by a concurrent branch is waited out.
#[allow(clippy::too_many_arguments)]
fn request(
    id: NodeId,
    wanted_by: Option<NodeId>,
    bindings: Option<Bindings>,
    adj: &Adjacency,
    interp: &Interpreter,
    state: &FoldState,
    stack: &mut Vec<Frame>,
    scopes: &mut Vec<Bindings>,
) -> Result<Requested, GraphError> {
    let entry = adj.get(&id).ok_or_else(|| GraphError::MissingNode {
        id: id.clone(),
        wanted_by,
    })?;

    let volatile = interp.is_volatile(&entry.kind);
    if volatile || state.tainted.contains_key(&id) {
        // Never serve an impure read from cache; drop anything stale.
        state.memo.remove(&id);
    } else {
        // First touch wins. A concurrent claim is waited out and the memo
        // re-read; if the winner ended tainted or failed, this branch
        // claims the node and evaluates it itself.
        loop {
            if let Some(value) = state.memo.get(&id) {
                return Ok(Requested::Memoized(value.clone()));
            }
            match state.inflight.entry(id.clone()) {
                Slot::Vacant(slot) => {
                    slot.insert(Arc::new(Latch::default()));
                    break;
                }
                Slot::Occupied(slot) => {
                    // Drop the shard guard before blocking.
                    let latch = Arc::clone(slot.get());
                    drop(slot);
                    latch.wait();
                }
            }
        }
    }

    let handler = interp
        .handler(&entry.kind)
        .ok_or_else(|| GraphError::MissingHandler {
            kind: entry.kind.clone(),
            id: id.clone(),
        })?;

    let scope_depth = scopes.len();
    if let Some(bindings) = bindings {
        scopes.push(bindings);
    }
    tracing::trace!(%id, kind = %entry.kind, depth = stack.len(), "push frame");
    stack.push(Frame {
        kind: entry.kind.clone(),
        id,
        act: handler.activate(),
        input: Resume::Start,
        tainted: false,
        scope_depth,
    });
    Ok(Requested::Pushed)
}
