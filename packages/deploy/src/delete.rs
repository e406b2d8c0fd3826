//! Batched deletion of remote objects with no local counterpart.

use crate::DeployError;
use crate::stats::{ChangedKeys, StatsCollector};
use crate::store::RemoteStore;

/// Largest number of keys sent in one delete request.
pub const MAX_BATCH: usize = 1000;

/// How many delete candidates were removed and how many were left behind
/// by the max-delete ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Objects deleted.
    pub deleted: usize,
    /// Candidates not deleted.
    pub stale: usize,
}

/// Deletes at most `max_delete` of `keys`, in sequential batches of at most
/// [`MAX_BATCH`]. The rest are reported as stale.
///
/// Deleted keys are recorded in `changed` and counted in `stats` batch by
/// batch, so a failure still leaves earlier batches accounted for.
///
/// # Errors
///
/// Returns [`DeployError::Delete`] for the first batch that fails; no
/// further batches are sent.
pub async fn delete_in_batches(
    remote: &dyn RemoteStore,
    keys: &[String],
    max_delete: usize,
    stats: &StatsCollector,
    changed: &ChangedKeys,
) -> Result<DeleteOutcome, DeployError> {
    let limit = keys.len().min(max_delete);
    let mut deleted = 0;

    while deleted < limit {
        let batch = &keys[deleted..limit.min(deleted + MAX_BATCH)];

        for key in batch {
            log::info!("{key} not found in source, deleting");
        }

        remote
            .delete_objects(batch)
            .await
            .map_err(|source| DeployError::Delete {
                count: batch.len(),
                source,
            })?;

        stats.add_deleted(batch.len() as u64);
        changed.track_all(batch);
        deleted += batch.len();
    }

    let stale = keys.len() - deleted;
    if stale > 0 {
        log::warn!(
            "{stale} files not found in source were not deleted (max-delete is {max_delete})"
        );
        stats.add_stale(stale as u64);
    }

    Ok(DeleteOutcome { deleted, stale })
}
