//! Interpreter & Plugin Composition
//!
//! An [`Interpreter`] is the kind → handler table a fold runs against,
//! plus the set of kinds declared volatile (always re-evaluated, never
//! memoized). Plugins bundle default handlers for the kinds they declare;
//! [`compose`] merges several plugins and a caller's overrides into one
//! interpreter, failing loudly instead of guessing:
//!
//! - an explicit override beats a plugin default;
//! - a declared kind with neither default nor override is a configuration
//!   error;
//! - two plugins declaring the same kind is a conflict error, not a silent
//!   last-one-wins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::GraphError;

use super::handler::Handler;
use super::kit::{PARAM_KIND, STATE_KIND};

/// The kind → handler table consumed by the fold driver.
#[derive(Clone, Default)]
pub struct Interpreter {
    handlers: HashMap<String, Arc<dyn Handler>>,
    volatile: HashSet<String>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .field("volatile", &self.volatile)
            .finish()
    }
}

impl Interpreter {
    /// An empty interpreter. The scoped-parameter and shared-state read
    /// kinds are volatile from the start; handlers for them still have to
    /// be registered.
    pub fn new() -> Self {
        let mut volatile = HashSet::new();
        volatile.insert(PARAM_KIND.to_owned());
        volatile.insert(STATE_KIND.to_owned());
        Self {
            handlers: HashMap::new(),
            volatile,
        }
    }

    /// Register a handler for a kind. Re-registration replaces.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler(mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Declare a kind volatile: always re-evaluated, never served from
    /// memo, and tainting everything that depends on it.
    pub fn mark_volatile(&mut self, kind: impl Into<String>) {
        self.volatile.insert(kind.into());
    }

    /// Builder-style [`mark_volatile`](Self::mark_volatile).
    pub fn with_volatile(mut self, kind: impl Into<String>) -> Self {
        self.mark_volatile(kind);
        self
    }

    /// The handler for a kind, if registered.
    pub fn handler(&self, kind: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(kind).cloned()
    }

    /// Whether a kind is volatile.
    pub fn is_volatile(&self, kind: &str) -> bool {
        self.volatile.contains(kind)
    }

    /// The kinds this interpreter can evaluate.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// A bundle of default handlers for the kinds it declares.
pub struct Plugin {
    name: String,
    declared: Vec<String>,
    defaults: HashMap<String, Arc<dyn Handler>>,
    volatile: HashSet<String>,
}

impl Plugin {
    /// An empty plugin with a diagnostic name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: Vec::new(),
            defaults: HashMap::new(),
            volatile: HashSet::new(),
        }
    }

    /// The plugin's name, used in composition diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a kind without supplying a default handler. Composition
    /// will demand an override for it.
    pub fn declare(mut self, kind: impl Into<String>) -> Self {
        self.declared.push(kind.into());
        self
    }

    /// Declare a kind and supply its default handler.
    pub fn with_default(mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        let kind = kind.into();
        self.declared.push(kind.clone());
        self.defaults.insert(kind, handler);
        self
    }

    /// Mark one of this plugin's kinds volatile.
    pub fn with_volatile(mut self, kind: impl Into<String>) -> Self {
        self.volatile.insert(kind.into());
        self
    }
}

/// Merge plugins and overrides into one interpreter.
///
/// Overrides may also introduce kinds no plugin declares; they are
/// registered as-is.
pub fn compose(
    plugins: Vec<Plugin>,
    overrides: HashMap<String, Arc<dyn Handler>>,
) -> Result<Interpreter, GraphError> {
    let mut owner: HashMap<&str, &str> = HashMap::new();
    for plugin in &plugins {
        for kind in &plugin.declared {
            if let Some(first) = owner.insert(kind.as_str(), plugin.name.as_str()) {
                return Err(GraphError::PluginConflict {
                    kind: kind.clone(),
                    first: first.to_owned(),
                    second: plugin.name.clone(),
                });
            }
        }
    }

    let mut interp = Interpreter::new();
    for plugin in &plugins {
        for kind in &plugin.declared {
            let handler = overrides
                .get(kind)
                .or_else(|| plugin.defaults.get(kind))
                .cloned()
                .ok_or_else(|| GraphError::PluginConfiguration {
                    plugin: plugin.name.clone(),
                    kind: kind.clone(),
                })?;
            interp.register(kind.clone(), handler);
        }
        for kind in &plugin.volatile {
            interp.mark_volatile(kind.clone());
        }
    }

    for (kind, handler) in overrides {
        if !interp.handlers.contains_key(&kind) {
            interp.register(kind, handler);
        }
    }

    tracing::debug!(kinds = interp.handlers.len(), "composed interpreter");
    Ok(interp)
}
