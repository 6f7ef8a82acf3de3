use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::workflow::Workflow;

/// Builds a fresh workflow for each session.
pub type WorkflowFactory = Arc<dyn Fn() -> Box<dyn Workflow> + Send + Sync>;

/// Registry of workflows by connection path name.
///
/// Populated at startup through `&mut self`, then frozen behind an `Arc`
/// and shared read-only by every session.
pub struct WorkflowRegistry {
    factories: HashMap<String, WorkflowFactory>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory. Registering a name twice replaces the first.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Workflow> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            tracing::debug!(workflow = %name, "replacing registered workflow");
        }
        self.factories.insert(name, Arc::new(factory));
    }

    /// Register a workflow type built with `Default::default()`.
    pub fn register_default<W>(&mut self, name: impl Into<String>)
    where
        W: Workflow + Default,
    {
        self.register(name, || Box::new(W::default()));
    }

    pub fn resolve(&self, name: &str) -> Result<WorkflowFactory, RuntimeError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownWorkflow(name.to_owned()))
    }

    /// Construct a new, independently owned workflow.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Workflow>, RuntimeError> {
        let factory = self.resolve(name)?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}
