pub mod best_effort;
pub mod config;
pub mod context;
pub mod error;
pub mod runner;

pub use best_effort::{best_effort, BestEffort};
pub use config::PipelineConfig;
pub use context::{AnalysisOutcome, PipelineContext};
pub use error::{AnalysisFailure, PipelineError};
pub use runner::{Adapters, Pipeline};
