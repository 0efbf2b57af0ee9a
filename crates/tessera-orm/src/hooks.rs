//! Lifecycle hooks.
//!
//! Callbacks are registered per [`LifecycleEvent`] and run in registration
//! order. A callback returning [`HookAction::Stop`] ends the chain and the
//! surrounding save or destroy fails with [`OrmError::HookStopped`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{OrmError, Result};

/// Points in a model's save and destroy cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Before inserting or updating.
    BeforeSave,
    /// After inserting or updating.
    AfterSave,
    /// Before inserting.
    BeforeCreate,
    /// After inserting.
    AfterCreate,
    /// Before updating.
    BeforeUpdate,
    /// After updating.
    AfterUpdate,
    /// Before deleting.
    BeforeDestroy,
    /// After deleting.
    AfterDestroy,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeSave => "before_save",
            Self::AfterSave => "after_save",
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        };
        f.write_str(name)
    }
}

/// What a hook asks the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookAction {
    /// Run the next hook.
    #[default]
    Continue,
    /// Abort the operation.
    Stop,
}

/// A registered callback.
pub type Hook<M> = Arc<dyn Fn(&mut M) -> HookAction + Send + Sync>;

/// Hook chains for one model class.
pub struct Hooks<M> {
    chains: HashMap<LifecycleEvent, Vec<Hook<M>>>,
}

impl<M> Hooks<M> {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }

    /// Appends `hook` to the chain for `event`.
    pub fn register<F>(&mut self, event: LifecycleEvent, hook: F)
    where
        F: Fn(&mut M) -> HookAction + Send + Sync + 'static,
    {
        self.chains.entry(event).or_default().push(Arc::new(hook));
    }

    /// Number of hooks registered for `event`.
    #[must_use]
    pub fn len(&self, event: LifecycleEvent) -> usize {
        self.chains.get(&event).map_or(0, Vec::len)
    }

    /// Runs the chain for `event` against `model`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::HookStopped`] when a hook stops the chain.
    pub fn run(&self, event: LifecycleEvent, model: &mut M) -> Result<()> {
        let Some(chain) = self.chains.get(&event) else {
            return Ok(());
        };
        for (position, hook) in chain.iter().enumerate() {
            if hook(model) == HookAction::Stop {
                debug!(%event, position, "hook stopped the chain");
                return Err(OrmError::HookStopped(event));
            }
        }
        Ok(())
    }
}

impl<M> Default for Hooks<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Hooks<M> {
    fn clone(&self) -> Self {
        Self {
            chains: self.chains.clone(),
        }
    }
}

impl<M> fmt::Debug for Hooks<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(String, usize)> = self
            .chains
            .iter()
            .map(|(event, chain)| (event.to_string(), chain.len()))
            .collect();
        counts.sort();
        f.debug_struct("Hooks").field("chains", &counts).finish()
    }
}
