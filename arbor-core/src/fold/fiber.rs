//! Fiber Handlers
//!
//! Parallelism is expressed inside the graph, not in the driver: the
//! fiber kinds are ordinary handlers that re-enter the evaluator through
//! [`FoldCx::fork`] once per branch and combine the results.
//!
//! - `flow/par`: evaluate all children concurrently, collect their values
//!   in child order into a list; the first failing branch (in child order)
//!   rethrows.
//! - `flow/race`: evaluate all children concurrently, return the first
//!   *settled* result, success or failure. Losing branches are **not**
//!   cancelled: they run to completion on their scoped threads and their
//!   results are discarded. Handlers with side effects will still perform
//!   them.
//! - `flow/seq`: evaluate children strictly one after another, returning
//!   the last value.
//!
//! Forks share the fold's memo/taint tables, so a pure subexpression
//! shared between branches folds once per `fold` call. The adjacency map
//! is read-only during a fold and shared across branch threads without
//! locking.

use std::sync::mpsc;
use std::thread;

use crate::error::GraphError;
use crate::value::Value;

use super::driver::FoldCx;
use super::handler::{Activation, Handler, Resume, Step};

#[derive(Clone, Copy)]
enum Mode {
    Par,
    Race,
    Seq,
}

/// Wait-all fiber combinator.
pub struct Par;

/// Wait-first-settled fiber combinator.
pub struct Race;

/// Strictly sequential fiber combinator.
pub struct Seq;

impl Handler for Par {
    fn activate(&self) -> Box<dyn Activation> {
        Box::new(FiberActivation { mode: Mode::Par })
    }
}

impl Handler for Race {
    fn activate(&self) -> Box<dyn Activation> {
        Box::new(FiberActivation { mode: Mode::Race })
    }
}

impl Handler for Seq {
    fn activate(&self) -> Box<dyn Activation> {
        Box::new(FiberActivation { mode: Mode::Seq })
    }
}

struct FiberActivation {
    mode: Mode,
}

impl Activation for FiberActivation {
    fn resume(&mut self, cx: &FoldCx<'_>, input: Resume) -> Result<Step, GraphError> {
        if let Resume::Failed(err) = input {
            return Err(err);
        }
        let children = &cx.entry().children;
        if children.is_empty() {
            return Err(cx.error("fiber node requires at least one child"));
        }

        let value = match self.mode {
            Mode::Seq => {
                let mut last = Value::Null;
                for child in children {
                    last = cx.fork(child)?;
                }
                last
            }
            Mode::Par => {
                let results: Vec<Result<Value, GraphError>> = thread::scope(|s| {
                    let handles: Vec<_> = children
                        .iter()
                        .map(|child| s.spawn(move || cx.fork(child)))
                        .collect();
                    handles
                        .into_iter()
                        .map(|handle| {
                            handle
                                .join()
                                .unwrap_or_else(|_| Err(cx.error("fiber branch panicked")))
                        })
                        .collect()
                });
                let mut values = Vec::with_capacity(results.len());
                for result in results {
                    values.push(result?);
                }
                Value::List(values)
            }
            Mode::Race => {
                let (tx, rx) = mpsc::channel();
                let winner = thread::scope(|s| {
                    for child in children {
                        let tx = tx.clone();
                        s.spawn(move || {
                            let _ = tx.send(cx.fork(child));
                        });
                    }
                    drop(tx);
                    // At least one branch exists and every branch sends,
                    // so a settled result always arrives. The scope then
                    // joins the losers; their results are dropped.
                    rx.recv()
                        .unwrap_or_else(|_| Err(cx.error("race produced no result")))
                });
                winner?
            }
        };
        Ok(Step::Done(value))
    }
}
