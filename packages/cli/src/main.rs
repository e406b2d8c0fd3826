#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `site_deploy`: deploys a local directory to an S3 bucket.
//!
//! Uploads new and changed files, deletes remote objects that no longer
//! exist locally (up to `--max-delete`), and invalidates the changed paths
//! on any CloudFront distributions given with `--distribution-id`.
//!
//! Settings not given as flags are read from the YAML config file
//! (`.s3deploy.yml` by default), which also holds the route table and
//! processing order.
//!
//! Uses `indicatif-log-bridge` (via [`site_deploy_cli_utils::init_logger`])
//! so the per-file log lines and the progress bar share the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use clap::Parser;
use site_deploy::config::{DEFAULT_CONFIG_FILE, DEFAULT_MAX_DELETE, read_file_config};
use site_deploy::local::{DEFAULT_SKIP_LOCAL_DIRS, DEFAULT_SKIP_LOCAL_FILES, OsStore};
use site_deploy::store::{CdnClient, DryRunCdn, DryRunStore, RemoteStore};
use site_deploy::{Config, Deployer};
use site_deploy_cdn::CloudFrontClient;
use site_deploy_cli_utils::DeployBar;
use site_deploy_s3::S3Store;

#[derive(Parser)]
#[command(
    name = "site_deploy",
    version,
    about = "Deploy a static site to S3 and invalidate CloudFront"
)]
struct Args {
    /// Destination bucket name
    #[arg(long)]
    bucket: Option<String>,

    /// Optional bucket sub path
    #[arg(long)]
    path: Option<String>,

    /// Path of files to upload [default: .]
    #[arg(long)]
    source: Option<PathBuf>,

    /// Optional config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Maximum number of files to delete per deploy
    #[arg(long, default_value_t = DEFAULT_MAX_DELETE)]
    max_delete: usize,

    /// Upload even if the fingerprints match
    #[arg(long)]
    force: bool,

    /// Trial run, no remote updates
    #[arg(long = "try")]
    try_run: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Only log warnings and errors, no progress bar or summary
    #[arg(long)]
    quiet: bool,

    /// Number of upload workers [default: available parallelism]
    #[arg(long)]
    workers: Option<usize>,

    /// Name of the AWS region
    #[arg(long)]
    region: Option<String>,

    /// Access key ID for AWS
    #[arg(long)]
    key: Option<String>,

    /// Secret access key for AWS
    #[arg(long)]
    secret: Option<String>,

    /// Custom endpoint for S3-compatible stores
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Canned ACL for uploads (e.g. `public-read`, `private`)
    #[arg(long, conflicts_with = "public_access")]
    acl: Option<String>,

    /// Deprecated: use `--acl public-read`
    #[arg(long)]
    public_access: bool,

    /// CloudFront distribution ID to invalidate (repeatable or
    /// comma-separated)
    #[arg(long = "distribution-id", value_delimiter = ',')]
    distribution_ids: Vec<String>,

    /// Regex of paths to ignore, locally and remotely
    #[arg(long)]
    ignore: Option<String>,

    /// Regex of local files to skip
    #[arg(long, default_value = DEFAULT_SKIP_LOCAL_FILES)]
    skip_local_files: String,

    /// Regex of local directories to skip
    #[arg(long, default_value = DEFAULT_SKIP_LOCAL_DIRS)]
    skip_local_dirs: String,
}

impl Args {
    fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            log::LevelFilter::Warn
        } else if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }

    fn into_config(self) -> Config {
        Config {
            source_path: self.source,
            bucket_name: self.bucket.unwrap_or_default(),
            bucket_path: self.path.unwrap_or_default(),
            region_name: self.region,
            endpoint_url: self.endpoint_url,
            access_key: self.key,
            secret_key: self.secret,
            config_file: self.config,
            workers: self.workers,
            max_delete: self.max_delete,
            force: self.force,
            try_run: self.try_run,
            acl: self.acl,
            public_access: self.public_access,
            ignore: self.ignore,
            skip_local_files: self.skip_local_files,
            skip_local_dirs: self.skip_local_dirs,
            cdn_distribution_ids: self.distribution_ids,
            ..Config::default()
        }
    }
}

/// Loads the AWS config, letting flags override the region and
/// credentials found in the environment.
async fn load_aws_config(config: &Config) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region_name {
        loader = loader.region(Region::new(region.clone()));
    }

    if let (Some(key), Some(secret)) = (&config.access_key, &config.secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            key,
            secret,
            None,
            None,
            "site-deploy-flags",
        ));
    }

    loader.load().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let quiet = args.quiet;
    let multi = site_deploy_cli_utils::init_logger(args.log_level());

    let mut config = args.into_config();
    let file_config = read_file_config(&config.config_file)?;
    config.merge_file_settings(&file_config.settings);
    config.file_config = file_config;

    let rules = config.check()?;
    let sdk_config = load_aws_config(&config).await;

    let s3: Arc<dyn RemoteStore> = Arc::new(S3Store::new(
        &sdk_config,
        &config.bucket_name,
        config.endpoint_url.as_deref(),
    ));
    let remote: Arc<dyn RemoteStore> = if config.try_run {
        Arc::new(DryRunStore::new(s3))
    } else {
        s3
    };

    let mut deployer = Deployer::new(rules, remote, Arc::new(OsStore));

    if !config.cdn_distribution_ids.is_empty() {
        let cdn: Arc<dyn CdnClient> = if config.try_run {
            Arc::new(DryRunCdn::new(&config.bucket_path, config.force))
        } else {
            Arc::new(CloudFrontClient::new(
                &sdk_config,
                config.cdn_distribution_ids.clone(),
                &config.bucket_path,
                config.force,
            ))
        };
        deployer = deployer.with_cdn(cdn);
    }

    if !quiet {
        deployer = deployer.with_progress(DeployBar::attach(&multi, "Deploying"));
    }

    log::info!(
        "Deploying {} to s3://{}/{}{}",
        config
            .source_path
            .as_deref()
            .unwrap_or_else(|| std::path::Path::new("."))
            .display(),
        config.bucket_name,
        config.bucket_path.trim_matches('/'),
        if config.try_run { " (dry run)" } else { "" }
    );

    let result = deployer.deploy().await;

    if !quiet {
        println!("{}", deployer.stats().summary());
    }

    result?;
    Ok(())
}
