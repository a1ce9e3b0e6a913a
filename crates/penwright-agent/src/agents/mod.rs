//! The agents that make up a pipeline run. Each one owns a slice of the
//! state and exposes async node functions for the graphs.

pub mod editor;
pub mod human;
pub mod publisher;
pub mod researcher;
pub mod reviewer;
pub mod reviser;
pub mod seo;
pub mod writer;

pub use editor::Editor;
pub use human::{interpret_feedback, AutoApprove, ConsoleReviewer, HumanAgent, PlanReviewer, ScriptedReviewer};
pub use publisher::Publisher;
pub use researcher::{Researcher, SectionContext};
pub use reviewer::Reviewer;
pub use reviser::Reviser;
pub use seo::SeoAgent;
pub use writer::Writer;
