//! Orchestration of a deploy run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Rules;
use crate::delete::delete_in_batches;
use crate::local::{LocalStore, WalkedFile};
use crate::planner::{delete_candidates, plan_group};
use crate::progress::{ProgressCallback, null_progress};
use crate::state::RunState;
use crate::stats::StatsCollector;
use crate::store::{CdnClient, RemoteStore};
use crate::{DeployError, DeployStats, RemoteObject};

/// Runs a deploy: makes the remote store match the local tree described by
/// [`Rules`], then invalidates the CDN.
///
/// Counters accumulate across calls to [`Deployer::deploy`]; build one
/// deployer per run.
pub struct Deployer {
    rules: Arc<Rules>,
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
    cdn: Option<Arc<dyn CdnClient>>,
    progress: Arc<dyn ProgressCallback>,
    stats: Arc<StatsCollector>,
}

impl Deployer {
    /// Creates a deployer with no CDN and no progress reporting.
    #[must_use]
    pub fn new(rules: Rules, remote: Arc<dyn RemoteStore>, local: Arc<dyn LocalStore>) -> Self {
        Self {
            rules: Arc::new(rules),
            remote,
            local,
            cdn: None,
            progress: null_progress(),
            stats: Arc::new(StatsCollector::default()),
        }
    }

    /// Invalidates changed keys on `cdn` after the sync.
    #[must_use]
    pub fn with_cdn(mut self, cdn: Arc<dyn CdnClient>) -> Self {
        self.cdn = Some(cdn);
        self
    }

    /// Reports per-file progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Counters so far. Still meaningful after [`Self::deploy`] failed.
    #[must_use]
    pub fn stats(&self) -> DeployStats {
        self.stats.snapshot()
    }

    /// Runs the deploy.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: listing, walking, reading or uploading
    /// a file, deleting a batch, or invalidating the CDN. Work completed
    /// before the failure is not rolled back and shows in [`Self::stats`].
    pub async fn deploy(&self) -> Result<DeployStats, DeployError> {
        let result = self.run().await;

        match &result {
            Ok(stats) => self.progress.finish(stats.summary()),
            Err(_) => self.progress.finish_and_clear(),
        }

        result
    }

    async fn run(&self) -> Result<DeployStats, DeployError> {
        let prefix = self.rules.remote_prefix();
        let mut remote_map = self
            .remote
            .file_map(&prefix)
            .await
            .map_err(|source| DeployError::List {
                prefix: prefix.clone(),
                source,
            })?;
        log::debug!("Found {} remote objects under {prefix:?}", remote_map.len());

        let groups = self.group_local_files().await?;
        let total: usize = groups.iter().map(Vec::len).sum();
        self.progress.set_total(total as u64);

        let state = Arc::new(RunState::new(
            Arc::clone(&self.remote),
            self.rules.acl.clone(),
            Arc::clone(&self.stats),
            Arc::clone(&self.progress),
        ));

        self.upload(&state, groups, &mut remote_map).await?;

        let candidates = delete_candidates(remote_map, &self.rules);
        delete_in_batches(
            self.remote.as_ref(),
            &candidates,
            self.rules.max_delete,
            &self.stats,
            &state.changed,
        )
        .await?;

        if let Some(cdn) = &self.cdn {
            let changed = state.changed.sorted();
            cdn.invalidate_cdn_cache(&changed)
                .await
                .map_err(|source| DeployError::Cdn { source })?;
        }

        let stats = self.stats.snapshot();
        log::info!("{}", stats.summary());
        Ok(stats)
    }

    /// Walks the source tree and splits the retained files into processing
    /// groups, in group order.
    async fn group_local_files(&self) -> Result<Vec<Vec<WalkedFile>>, DeployError> {
        let local = Arc::clone(&self.local);
        let rules = Arc::clone(&self.rules);
        let walked =
            tokio::task::spawn_blocking(move || local.walk(&rules.source_path, &rules.walk_filter))
                .await??;

        let mut groups = vec![Vec::new(); self.rules.group_count()];
        for file in walked {
            if self.rules.should_ignore_local(&file.rel_path) {
                log::debug!("{} ignored", file.rel_path);
                continue;
            }
            groups[self.rules.group_of(&file.rel_path)].push(file);
        }

        Ok(groups)
    }

    /// Runs the processing groups strictly one after the other.
    async fn upload(
        &self,
        state: &Arc<RunState>,
        groups: Vec<Vec<WalkedFile>>,
        remote_map: &mut HashMap<String, RemoteObject>,
    ) -> Result<(), DeployError> {
        let group_count = groups.len();

        for (i, files) in groups.into_iter().enumerate() {
            if files.is_empty() {
                continue;
            }

            if group_count > 1 {
                log::debug!("Processing group {}/{group_count} ({} files)", i + 1, files.len());
                self.progress
                    .set_message(format!("group {}/{group_count}", i + 1));
            }

            plan_group(state, &self.rules, &self.local, remote_map, files).await;

            if let Some(err) = state.take_error() {
                return Err(err);
            }
        }

        Ok(())
    }
}
