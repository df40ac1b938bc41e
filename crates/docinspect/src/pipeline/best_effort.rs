//! The one place pipeline errors are swallowed.

use std::fmt::Display;

use tracing::error;

/// A side effect whose failure must never escalate, such as marking a
/// document FAILED while already handling a failure.
pub struct BestEffort {
    what: &'static str,
}

impl BestEffort {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }

    /// Runs `op`, logging an error with context if it fails. Returns
    /// whether the operation succeeded.
    pub fn run<T, E, F>(self, op: F) -> bool
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        match op() {
            Ok(_) => true,
            Err(e) => {
                error!(operation = self.what, error = %e, "Best-effort operation failed");
                false
            }
        }
    }
}

pub fn best_effort<T, E, F>(what: &'static str, op: F)
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    BestEffort::new(what).run(op);
}
