#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the `site_deploy` binary.
//!
//! [`DeployBar`] renders the engine's per-file progress. [`init_logger`]
//! routes `log` records through `indicatif-log-bridge`, so the per-file
//! `uploading` and `deleting` lines scroll above the bar.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use site_deploy::progress::ProgressCallback;

pub use indicatif::MultiProgress;

const LISTING_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const FILES_TEMPLATE: &str =
    "  {msg} {wide_bar:.cyan/dim} {pos}/{len} files {percent}% [{elapsed_precise}]";

/// Deploy progress on the terminal.
///
/// Spins while the bucket is listed and the source walked, since the file
/// count is unknown until then, and turns into a file counter on
/// [`ProgressCallback::set_total`].
pub struct DeployBar {
    bar: ProgressBar,
    files_style: ProgressStyle,
}

impl DeployBar {
    /// Adds a deploy bar labelled `message` to `multi`.
    #[must_use]
    pub fn attach(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(LISTING_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let files_style = ProgressStyle::with_template(FILES_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        Arc::new(Self { bar, files_style })
    }
}

impl ProgressCallback for DeployBar {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.files_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// `RUST_LOG` overrides `default_level`. A logger installed earlier (tests
/// calling this twice) is kept. Every progress bar must be added to the
/// returned [`MultiProgress`] or log lines will tear it.
#[must_use]
pub fn init_logger(default_level: log::LevelFilter) -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(default_level)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}
