//! Bounded pool of upload workers.
//!
//! The planner submits files into a bounded channel sized to the worker
//! count, so it waits whenever every worker is busy and the queue is full.
//! Workers stop taking new files as soon as the run is cancelled, but an
//! upload that already started is never interrupted.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::DeployError;
use crate::local::LocalFile;
use crate::state::RunState;

pub struct UploadPool {
    sender: async_channel::Sender<LocalFile>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<RunState>,
}

impl UploadPool {
    /// Starts `workers` upload tasks (at least one).
    pub fn spawn(state: &Arc<RunState>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = async_channel::bounded(workers);

        let handles = (0..workers)
            .map(|_| tokio::spawn(worker(Arc::clone(state), receiver.clone())))
            .collect();

        Self {
            sender,
            workers: handles,
            state: Arc::clone(state),
        }
    }

    /// Queues `file` for upload, waiting for room in the queue.
    ///
    /// Returns `false` if the run was cancelled before the file was queued.
    pub async fn submit(&self, file: LocalFile) -> bool {
        tokio::select! {
            biased;
            () = self.state.token.cancelled() => false,
            sent = self.sender.send(file) => sent.is_ok(),
        }
    }

    /// Closes the queue and waits for every worker to drain it (or to
    /// observe cancellation).
    pub async fn finish(self) -> Result<(), DeployError> {
        self.sender.close();

        let mut first_error = None;
        for handle in self.workers {
            if let Err(e) = handle.await {
                log::error!("Upload worker failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), |e| Err(e.into()))
    }
}

async fn worker(state: Arc<RunState>, receiver: async_channel::Receiver<LocalFile>) {
    loop {
        let file = tokio::select! {
            biased;
            () = state.token.cancelled() => break,
            file = receiver.recv() => match file {
                Ok(file) => file,
                Err(_) => break,
            },
        };

        match state.remote.put(&file, state.acl.as_deref()).await {
            Ok(()) => {
                state.changed.track(file.key());
                state.stats.add_uploaded(1);
                state.progress.inc(1);
            }
            Err(source) => {
                log::error!("Failed to upload {}: {source}", file.key());
                state.fail(DeployError::Upload {
                    key: file.key().to_string(),
                    source,
                });
            }
        }
    }
}
