use std::sync::Arc;

use futures::future::BoxFuture;

use penwright_core::error::Result;

/// Future returned by a node handler. It borrows the state for its lifetime.
pub type NodeFuture<'a> = BoxFuture<'a, Result<()>>;

/// Async step that reads and updates the workflow state.
pub trait NodeHandler<S>: Send + Sync {
    fn run<'a>(&'a self, state: &'a mut S) -> NodeFuture<'a>;
}

impl<S, F> NodeHandler<S> for F
where
    F: for<'a> Fn(&'a mut S) -> NodeFuture<'a> + Send + Sync,
{
    fn run<'a>(&'a self, state: &'a mut S) -> NodeFuture<'a> {
        self(state)
    }
}

/// A node in the workflow graph.
pub struct Node<S> {
    /// Unique identifier for this node.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// How many times the node may run in one execution.
    pub max_visits: usize,
    handler: Arc<dyn NodeHandler<S>>,
}

fn default_max_visits() -> usize {
    5
}

impl<S> Node<S> {
    /// Create a node backed by any handler.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        handler: impl NodeHandler<S> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_visits: default_max_visits(),
            handler: Arc::new(handler),
        }
    }

    /// Create a node from a closure returning a boxed future.
    pub fn from_fn<F>(id: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut S) -> NodeFuture<'a> + Send + Sync + 'static,
    {
        Self::new(id, name, f)
    }

    pub fn with_max_visits(mut self, visits: usize) -> Self {
        self.max_visits = visits;
        self
    }

    pub(crate) fn run<'a>(&'a self, state: &'a mut S) -> NodeFuture<'a> {
        self.handler.run(state)
    }
}

impl<S> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            max_visits: self.max_visits,
            handler: self.handler.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("max_visits", &self.max_visits)
            .finish()
    }
}
