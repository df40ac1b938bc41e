use std::sync::Arc;

use docinspect::intake::SessionIntake;
use docinspect::pipeline::Pipeline;
use docinspect::worker::JobSink;
use docinspect::Database;

use crate::config::ServerConfig;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub intake: Arc<SessionIntake>,
    /// Where intake hands pipeline jobs; the worker pool in production.
    pub jobs: Arc<dyn JobSink>,
    /// Shared with the worker pool. Runs inline re-analysis and owns the
    /// analyzer used for chat.
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<ServerConfig>,
}
