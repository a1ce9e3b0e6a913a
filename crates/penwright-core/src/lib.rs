pub mod article;
pub mod config;
pub mod error;
pub mod event;
pub mod task;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{PenwrightError, Result};
pub use event::EventBus;
pub use task::{Author, ResearchSource, Task, TaskQueue};
pub use types::*;
