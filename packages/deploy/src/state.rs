//! State shared by the planner and the upload workers of one run.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::DeployError;
use crate::progress::ProgressCallback;
use crate::stats::{ChangedKeys, StatsCollector};
use crate::store::RemoteStore;

pub struct RunState {
    pub remote: Arc<dyn RemoteStore>,
    pub acl: Option<String>,
    pub stats: Arc<StatsCollector>,
    pub changed: ChangedKeys,
    pub progress: Arc<dyn ProgressCallback>,
    pub token: CancellationToken,
    first_error: Mutex<Option<DeployError>>,
}

impl RunState {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        acl: Option<String>,
        stats: Arc<StatsCollector>,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            remote,
            acl,
            stats,
            changed: ChangedKeys::default(),
            progress,
            token: CancellationToken::new(),
            first_error: Mutex::new(None),
        }
    }

    /// Records `err` and cancels the run. Only the first error is kept;
    /// later ones are usually fallout from the cancellation.
    pub fn fail(&self, err: DeployError) {
        {
            let mut slot = self
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            } else {
                log::debug!("Discarding error after cancellation: {err}");
            }
        }
        self.token.cancel();
    }

    pub fn take_error(&self) -> Option<DeployError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
