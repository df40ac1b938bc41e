pub mod job;
pub mod pool;

pub use job::{Job, JobKind, JobResult};
pub use pool::{JobSink, PoolStats, WorkerPool};

// Re-export crossbeam_channel for the server's result drain
pub use crossbeam_channel;
