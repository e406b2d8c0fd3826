//! Reconciliation of one processing group against the remote inventory.
//!
//! A blocking producer reads and transforms the group's files and hands them
//! over a bounded channel. The planner, on the calling task, looks each one
//! up in the inventory, removing the entry as it goes, and either skips it
//! or submits it to the upload pool. Whatever is left in the inventory once
//! every group has run is a delete candidate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Rules;
use crate::detector::classify;
use crate::local::{LocalFile, LocalStore, WalkedFile};
use crate::state::RunState;
use crate::upload::UploadPool;
use crate::{DeployError, RemoteObject};

/// Runs one processing group to completion: every upload of the group has
/// finished (or observed cancellation) when this returns. Failures are
/// recorded in `state`.
pub async fn plan_group(
    state: &Arc<RunState>,
    rules: &Arc<Rules>,
    local: &Arc<dyn LocalStore>,
    remote_map: &mut HashMap<String, RemoteObject>,
    files: Vec<WalkedFile>,
) {
    let (tx, mut rx) = mpsc::channel(rules.workers);
    let producer = spawn_producer(state, rules, local, files, tx);
    let pool = UploadPool::spawn(state, rules.workers);

    loop {
        let item = tokio::select! {
            biased;
            () = state.token.cancelled() => break,
            item = rx.recv() => item,
        };

        let Some(item) = item else {
            break;
        };

        let mut file = match item {
            Ok(file) => file,
            Err(e) => {
                log::error!("{e}");
                state.fail(e);
                break;
            }
        };

        let remote = remote_map.remove(file.key());
        match classify(&file, remote.as_ref(), rules.force) {
            Some(reason) => {
                log::info!("{} ({reason}) uploading", file.key());
                file.set_reason(reason);
                if !pool.submit(file).await {
                    break;
                }
            }
            None => {
                log::debug!("{} skipping", file.key());
                state.stats.add_skipped(1);
                state.progress.inc(1);
            }
        }
    }

    drop(rx);

    if let Err(e) = pool.finish().await {
        state.fail(e);
    }
    if let Err(e) = producer.await {
        state.fail(e.into());
    }
}

/// Reads the group's files on a blocking thread. Stops after the first read
/// error, on cancellation, or when the planner hangs up.
fn spawn_producer(
    state: &Arc<RunState>,
    rules: &Arc<Rules>,
    local: &Arc<dyn LocalStore>,
    files: Vec<WalkedFile>,
    tx: mpsc::Sender<Result<LocalFile, DeployError>>,
) -> tokio::task::JoinHandle<()> {
    let token = state.token.clone();
    let rules = Arc::clone(rules);
    let local = Arc::clone(local);

    tokio::task::spawn_blocking(move || {
        for walked in files {
            if token.is_cancelled() {
                break;
            }

            let item = read_local_file(local.as_ref(), &rules, walked);
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    })
}

fn read_local_file(
    local: &dyn LocalStore,
    rules: &Rules,
    walked: WalkedFile,
) -> Result<LocalFile, DeployError> {
    let raw = local.read(&walked.abs_path)?;
    let route = rules.routes.get(&walked.rel_path);
    let key = rules.bucket_key(&walked.rel_path);
    LocalFile::new(walked.rel_path, key, walked.abs_path, raw, route)
}

/// Remote keys left after planning that this deploy may delete: under the
/// bucket path and not ignored. Sorted.
pub fn delete_candidates(remote_map: HashMap<String, RemoteObject>, rules: &Rules) -> Vec<String> {
    let mut keys: Vec<String> = remote_map
        .into_keys()
        .filter(|key| rules.is_managed_remote(key) && !rules.should_ignore_remote(key))
        .collect();
    keys.sort();
    keys
}
