use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use penwright_core::error::{PenwrightError, Result};
use penwright_core::event::EventBus;
use penwright_core::types::PipelineEvent;

use super::edge::Edge;
use super::handoff::HandoffContext;
use super::node::Node;

/// State threaded through a workflow. The executor writes node outcomes
/// into its signals.
pub trait GraphState: Send {
    fn signals(&self) -> &HandoffContext;
    fn signals_mut(&mut self) -> &mut HandoffContext;
}

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node_id: String,
    /// Whether the node succeeded.
    pub succeeded: bool,
    /// Error message when the node failed.
    pub error: Option<String>,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult<S> {
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// The final state.
    pub state: S,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
    /// Whether every executed node succeeded.
    pub succeeded: bool,
}

impl<S> ExecutionResult<S> {
    /// The last node that failed, if any.
    pub fn failed_node(&self) -> Option<&NodeResult> {
        self.node_results.iter().rev().find(|r| !r.succeeded)
    }

    /// Ids of the executed nodes in order.
    pub fn path(&self) -> Vec<&str> {
        self.node_results.iter().map(|r| r.node_id.as_str()).collect()
    }

    /// Convert into the final state, or the failing node's error.
    pub fn into_state(self) -> Result<S> {
        match self.node_results.iter().rev().find(|r| !r.succeeded) {
            Some(failed) => Err(PenwrightError::NodeFailed {
                node: failed.node_id.clone(),
                message: failed.error.clone().unwrap_or_default(),
            }),
            None => Ok(self.state),
        }
    }
}

/// Executes a workflow graph over a typed state.
///
/// Starting from `entry_node`, it runs each node's handler, records
/// `{node}_status` (and `{node}_error` on failure) in the state's signals,
/// evaluates outgoing edge conditions, and follows the first matching edge.
/// The walk stops at [`END`](super::END), at a node without a matching edge, or when a
/// node exceeds its visit limit.
pub struct GraphExecutor<S> {
    nodes: HashMap<String, Node<S>>,
    edges: Vec<Edge>,
    entry_node: String,
    event_bus: Option<Arc<EventBus>>,
}

impl<S: GraphState> GraphExecutor<S> {
    /// Create a new graph executor.
    ///
    /// `entry_node` must be the id of a node in `nodes`.
    pub fn new(nodes: Vec<Node<S>>, edges: Vec<Edge>, entry_node: impl Into<String>) -> Self {
        let node_map = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: node_map,
            edges,
            entry_node: entry_node.into(),
            event_bus: None,
        }
    }

    /// Publish node start/finish events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn publish(&self, event: PipelineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Run the graph to completion on `state`.
    pub async fn execute(&self, mut state: S) -> Result<ExecutionResult<S>> {
        let start = Instant::now();
        let mut node_results = Vec::new();
        let mut visits: HashMap<String, usize> = HashMap::new();
        let mut current_node_id = self.entry_node.clone();

        loop {
            let node = self.nodes.get(&current_node_id).ok_or_else(|| {
                PenwrightError::Config(format!("Node '{}' not found in graph", current_node_id))
            })?;

            let count = visits.entry(node.id.clone()).or_insert(0);
            if *count >= node.max_visits {
                warn!(
                    node_id = %node.id,
                    max_visits = node.max_visits,
                    "Node visit limit reached, terminating graph"
                );
                break;
            }
            *count += 1;

            info!(node_id = %node.id, node_name = %node.name, "Executing graph node");
            self.publish(PipelineEvent::NodeStarted {
                node: node.id.clone(),
            });

            let node_start = Instant::now();
            let result = node.run(&mut state).await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            let succeeded = result.is_ok();
            let error = result.err().map(|e| e.to_string());
            let signals = state.signals_mut();
            signals.set_str(
                format!("{}_status", node.id),
                if succeeded { "success" } else { "failure" },
            );
            match &error {
                Some(message) => {
                    error!(node_id = %node.id, error = %message, "Graph node failed");
                    signals.set_str(format!("{}_error", node.id), message.clone());
                }
                None => {
                    signals.remove(&format!("{}_error", node.id));
                }
            }

            self.publish(PipelineEvent::NodeFinished {
                node: node.id.clone(),
                succeeded,
                elapsed_ms,
            });
            node_results.push(NodeResult {
                node_id: node.id.clone(),
                succeeded,
                error,
                elapsed_ms,
            });

            debug!(
                node_id = %node.id,
                succeeded,
                elapsed_ms,
                "Node execution complete"
            );

            let next = self
                .edges
                .iter()
                .filter(|e| e.from == current_node_id)
                .find(|e| e.matches(succeeded, state.signals().data()));

            match next {
                Some(edge) if edge.is_terminal() => {
                    debug!(node_id = %current_node_id, "Reached END");
                    break;
                }
                Some(edge) => current_node_id = edge.to.clone(),
                None => {
                    debug!(
                        node_id = %current_node_id,
                        "No edge conditions matched, graph complete"
                    );
                    break;
                }
            }
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        let succeeded = node_results.iter().all(|r| r.succeeded);

        Ok(ExecutionResult {
            node_results,
            state,
            total_elapsed_ms,
            succeeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::END;

    #[derive(Debug, Default)]
    struct Counter {
        hits: Vec<String>,
        signals: HandoffContext,
    }

    impl GraphState for Counter {
        fn signals(&self) -> &HandoffContext {
            &self.signals
        }
        fn signals_mut(&mut self) -> &mut HandoffContext {
            &mut self.signals
        }
    }

    fn record(id: &'static str) -> Node<Counter> {
        Node::from_fn(id, id, move |state: &mut Counter| {
            Box::pin(async move {
                state.hits.push(id.to_string());
                Ok(())
            })
        })
    }

    fn failing(id: &'static str) -> Node<Counter> {
        Node::from_fn(id, id, move |state: &mut Counter| {
            Box::pin(async move {
                state.hits.push(id.to_string());
                Err(PenwrightError::Workflow("boom".into()))
            })
        })
    }

    #[tokio::test]
    async fn test_linear_run_to_end() {
        let graph = GraphExecutor::new(
            vec![record("a"), record("b")],
            vec![Edge::on_success("a", "b"), Edge::always("b", END)],
            "a",
        );
        let result = graph.execute(Counter::default()).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.path(), vec!["a", "b"]);
        assert_eq!(result.state.signals.get_str("b_status"), Some("success"));
    }

    #[tokio::test]
    async fn test_failure_records_error_and_stops() {
        let graph = GraphExecutor::new(
            vec![failing("a"), record("b")],
            vec![Edge::on_success("a", "b")],
            "a",
        );
        let result = graph.execute(Counter::default()).await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.path(), vec!["a"]);
        assert_eq!(result.state.signals.get_str("a_status"), Some("failure"));
        assert!(result
            .state
            .signals
            .get_str("a_error")
            .unwrap()
            .contains("boom"));
        let failed = result.failed_node().unwrap();
        assert_eq!(failed.node_id, "a");

        match result.into_state() {
            Err(PenwrightError::NodeFailed { node, message }) => {
                assert_eq!(node, "a");
                assert!(message.contains("boom"));
            }
            _ => panic!("expected NodeFailed"),
        }
    }

    #[tokio::test]
    async fn test_on_failure_edge_routes() {
        let graph = GraphExecutor::new(
            vec![failing("a"), record("recover")],
            vec![Edge::on_success("a", END), Edge::on_failure("a", "recover")],
            "a",
        );
        let result = graph.execute(Counter::default()).await.unwrap();
        assert_eq!(result.path(), vec!["a", "recover"]);
    }

    #[tokio::test]
    async fn test_conditional_edges_take_first_match() {
        let route = Node::from_fn("route", "route", |state: &mut Counter| {
            Box::pin(async move {
                state.signals.set_str("choice", "left");
                Ok(())
            })
        });
        let graph = GraphExecutor::new(
            vec![route, record("left"), record("right")],
            vec![
                Edge::conditional("route", "right", r#"choice == "right""#),
                Edge::conditional("route", "left", r#"choice == "left""#),
                Edge::always("route", "right"),
            ],
            "route",
        );
        let result = graph.execute(Counter::default()).await.unwrap();
        assert_eq!(result.path(), vec!["route", "left"]);
    }

    #[tokio::test]
    async fn test_visit_limit_breaks_cycles() {
        let graph = GraphExecutor::new(
            vec![record("a").with_max_visits(3), record("b")],
            vec![Edge::always("a", "b"), Edge::always("b", "a")],
            "a",
        );
        let result = graph.execute(Counter::default()).await.unwrap();
        assert_eq!(result.state.hits.iter().filter(|h| *h == "a").count(), 3);
        assert_eq!(result.state.hits.iter().filter(|h| *h == "b").count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_node_is_config_error() {
        let graph = GraphExecutor::new(vec![record("a")], vec![Edge::always("a", "ghost")], "a");
        let err = graph.execute(Counter::default()).await.unwrap_err();
        assert!(matches!(err, PenwrightError::Config(_)));
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let graph = GraphExecutor::new(vec![record("a")], vec![], "a").with_events(bus);
        graph.execute(Counter::default()).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::NodeStarted { node } if node == "a"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::NodeFinished { succeeded: true, .. }
        ));
    }
}
