//! Per-file progress of a deploy.
//!
//! A unit is one local file the planner is done with: skipped on the spot or
//! uploaded by a worker. Deleted keys are not counted. Rendering is up to the
//! binary; [`NullProgress`] drops everything.

use std::sync::Arc;

/// Sink for deploy progress. Called from the planner and from upload
/// workers running on other tasks, hence `Send + Sync`.
///
/// Every method defaults to doing nothing.
pub trait ProgressCallback: Send + Sync {
    /// Number of local files in the run, known once the walk is over.
    fn set_total(&self, _total: u64) {}

    /// `delta` more files skipped or uploaded.
    fn inc(&self, _delta: u64) {}

    /// Label for the current phase, such as `group 2/3`.
    fn set_message(&self, _msg: String) {}

    /// The run succeeded; `msg` is its summary line.
    fn finish(&self, _msg: String) {}

    /// The run failed; drop the indicator so the error is the last thing
    /// printed.
    fn finish_and_clear(&self) {}
}

/// Progress sink for tests and `--quiet` runs.
pub struct NullProgress;

impl ProgressCallback for NullProgress {}

/// The [`NullProgress`] every [`crate::Deployer`] starts with.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
