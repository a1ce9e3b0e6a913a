//! Multi-agent content pipeline: the workflow graph, the agents that run on
//! it and the chief editor that wires them together.

pub mod agents;
pub mod context;
pub mod graph;
pub mod orchestrator;
pub mod output_validator;
pub mod runner;
pub mod state;

pub use agents::{
    AutoApprove, ConsoleReviewer, Editor, HumanAgent, PlanReviewer, Publisher, Researcher, Reviewer,
    Reviser, ScriptedReviewer, SeoAgent, Writer,
};
pub use context::PipelineContext;
pub use graph::{Edge, EdgeCondition, ExecutionResult, GraphExecutor, HandoffContext, Node, NodeResult, END};
pub use orchestrator::{run_output_dir, ChiefEditor};
pub use output_validator::{OutputValidator, ValidationResult};
pub use runner::{apply_configured_author, BatchRunner, BatchSummary};
pub use state::{DraftState, ResearchState};
