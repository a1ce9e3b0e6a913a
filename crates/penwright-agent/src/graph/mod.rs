//! Workflow graph engine.
//!
//! A workflow is a directed graph of [`Node`]s connected by [`Edge`]s over a
//! typed state. Each node is an async handler that updates the state; edges
//! define transitions with conditions (Always, OnSuccess, OnFailure,
//! Conditional expression over the state's signals).
//!
//! The [`GraphExecutor`] walks the graph from an entry node, running each node
//! and following the first matching edge until it reaches [`END`].

pub mod edge;
pub mod executor;
pub mod handoff;
pub mod node;

pub use edge::{Edge, EdgeCondition, END};
pub use executor::{ExecutionResult, GraphExecutor, GraphState, NodeResult};
pub use handoff::HandoffContext;
pub use node::{Node, NodeFuture, NodeHandler};
