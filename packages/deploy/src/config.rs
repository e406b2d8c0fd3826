//! Deploy configuration.
//!
//! [`Config`] is the raw, user-facing settings bag filled from command-line
//! flags and the optional YAML config file. [`Config::check`] validates it
//! and compiles every pattern once, producing the immutable [`Rules`] the
//! engine runs on.

use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use site_deploy_models::{FileConfig, FileSettings};

use crate::DeployError;
use crate::local::{DEFAULT_SKIP_LOCAL_DIRS, DEFAULT_SKIP_LOCAL_FILES, WalkFilter};
use crate::routes::{Routes, compile_pattern};

/// Default name of the YAML config file.
pub const DEFAULT_CONFIG_FILE: &str = ".s3deploy.yml";

/// Default ceiling on deletions per run.
pub const DEFAULT_MAX_DELETE: usize = 256;

/// Canned ACL applied when public access is requested without an explicit
/// ACL.
pub const PUBLIC_READ_ACL: &str = "public-read";

/// Settings for one deploy run, before validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local directory to deploy. `None` means the current directory.
    pub source_path: Option<PathBuf>,
    /// Destination bucket.
    pub bucket_name: String,
    /// Sub path inside the bucket, for several sites sharing one bucket.
    pub bucket_path: String,
    /// Bucket region.
    pub region_name: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint_url: Option<String>,
    /// Static access key id.
    pub access_key: Option<String>,
    /// Static secret access key.
    pub secret_key: Option<String>,
    /// YAML config file with routes, ordering and setting fallbacks.
    pub config_file: PathBuf,
    /// Upload concurrency. `None` uses the host's available parallelism.
    pub workers: Option<usize>,
    /// Maximum number of remote objects deleted per run.
    pub max_delete: usize,
    /// Upload every file without comparing it to the remote copy.
    pub force: bool,
    /// Report what would happen without touching the bucket or the CDN.
    pub try_run: bool,
    /// Canned ACL for uploads.
    pub acl: Option<String>,
    /// Shorthand for the `public-read` ACL.
    pub public_access: bool,
    /// Regex of relative paths to leave alone, locally and remotely.
    pub ignore: Option<String>,
    /// Regex of local files never deployed.
    pub skip_local_files: String,
    /// Regex of local directories never descended into.
    pub skip_local_dirs: String,
    /// CloudFront distributions to invalidate after the sync.
    pub cdn_distribution_ids: Vec<String>,
    /// Routes and processing order from the config file.
    pub file_config: FileConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: None,
            bucket_name: String::new(),
            bucket_path: String::new(),
            region_name: None,
            endpoint_url: None,
            access_key: None,
            secret_key: None,
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            workers: None,
            max_delete: DEFAULT_MAX_DELETE,
            force: false,
            try_run: false,
            acl: None,
            public_access: false,
            ignore: None,
            skip_local_files: DEFAULT_SKIP_LOCAL_FILES.to_string(),
            skip_local_dirs: DEFAULT_SKIP_LOCAL_DIRS.to_string(),
            cdn_distribution_ids: Vec::new(),
            file_config: FileConfig::default(),
        }
    }
}

/// Reads the YAML config file at `path`.
///
/// A missing file yields the default (empty) config.
///
/// # Errors
///
/// Returns [`DeployError::ConfigFile`] if the file exists but cannot be read
/// or parsed.
pub fn read_file_config(path: &Path) -> Result<FileConfig, DeployError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No config file at {}", path.display());
            return Ok(FileConfig::default());
        }
        Err(e) => {
            return Err(DeployError::ConfigFile {
                path: path.display().to_string(),
                source: Box::new(e),
            });
        }
    };

    let config = serde_yaml::from_str(&contents).map_err(|e| DeployError::ConfigFile {
        path: path.display().to_string(),
        source: Box::new(e),
    })?;

    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

impl Config {
    /// Fills settings that were not given on the command line from the
    /// config file.
    pub fn merge_file_settings(&mut self, settings: &FileSettings) {
        if self.bucket_name.is_empty()
            && let Some(bucket) = &settings.bucket
        {
            self.bucket_name.clone_from(bucket);
        }
        if self.bucket_path.is_empty()
            && let Some(path) = &settings.path
        {
            self.bucket_path.clone_from(path);
        }
        if self.source_path.is_none() {
            self.source_path = settings.source.as_ref().map(PathBuf::from);
        }
        if self.region_name.is_none() {
            self.region_name.clone_from(&settings.region);
        }
        if self.access_key.is_none() {
            self.access_key.clone_from(&settings.key);
        }
        if self.secret_key.is_none() {
            self.secret_key.clone_from(&settings.secret);
        }
    }

    /// Validates the settings and compiles every pattern.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Config`] for a missing bucket, a root source
    /// path, or both `acl` and `public_access`, and
    /// [`DeployError::InvalidPattern`] for any pattern that does not
    /// compile.
    pub fn check(&self) -> Result<Rules, DeployError> {
        if self.bucket_name.is_empty() {
            return Err(DeployError::config("AWS bucket is required"));
        }

        let source_path = self
            .source_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        if is_filesystem_root(&source_path) {
            return Err(DeployError::config(
                "invalid source path: cannot deploy from root",
            ));
        }

        if self.acl.is_some() && self.public_access {
            return Err(DeployError::config(
                "you passed a value for the flags public-access and acl, which is not supported. the public-access flag is deprecated. please use the acl flag moving forward",
            ));
        }

        let ignore = self
            .ignore
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| compile_pattern("'ignore' flag", pattern))
            .transpose()?;

        let order = self
            .file_config
            .order
            .iter()
            .map(|pattern| compile_pattern("order", pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let acl = self
            .acl
            .clone()
            .or_else(|| self.public_access.then(|| PUBLIC_READ_ACL.to_string()));

        let workers = self.workers.filter(|w| *w > 0).unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        });

        Ok(Rules {
            source_path,
            bucket_path: self.bucket_path.trim_matches('/').to_string(),
            routes: Routes::compile(&self.file_config.routes)?,
            order,
            ignore,
            walk_filter: WalkFilter::new(&self.skip_local_files, &self.skip_local_dirs)?,
            acl,
            workers,
            max_delete: self.max_delete,
            force: self.force,
        })
    }
}

/// Whether `path` names nothing but a filesystem root (`/`, `C:\`).
fn is_filesystem_root(path: &Path) -> bool {
    path.has_root()
        && path
            .components()
            .all(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
}

/// Validated, compiled settings for one run.
#[derive(Debug, Clone)]
pub struct Rules {
    /// Local directory to deploy.
    pub source_path: PathBuf,
    /// Bucket sub path, without leading or trailing slashes.
    pub bucket_path: String,
    /// Route table.
    pub routes: Routes,
    order: Vec<Regex>,
    ignore: Option<Regex>,
    /// Local skip rules.
    pub walk_filter: WalkFilter,
    /// Effective canned ACL.
    pub acl: Option<String>,
    /// Upload concurrency (at least 1).
    pub workers: usize,
    /// Maximum number of deletions per run.
    pub max_delete: usize,
    /// Upload without comparing.
    pub force: bool,
}

impl Rules {
    /// Key prefix for every object this deploy manages: the bucket path
    /// with a trailing slash, or empty.
    #[must_use]
    pub fn remote_prefix(&self) -> String {
        if self.bucket_path.is_empty() {
            String::new()
        } else {
            format!("{}/", self.bucket_path)
        }
    }

    /// Object key for a local relative path.
    #[must_use]
    pub fn bucket_key(&self, rel_path: &str) -> String {
        format!("{}{rel_path}", self.remote_prefix())
    }

    /// Whether a local relative path is excluded from the deploy, by the
    /// ignore pattern or by an `ignore` route.
    #[must_use]
    pub fn should_ignore_local(&self, rel_path: &str) -> bool {
        self.ignore.as_ref().is_some_and(|re| re.is_match(rel_path))
            || self.routes.is_ignored(rel_path)
    }

    /// Whether a remote key is excluded from the deploy. The bucket path is
    /// stripped before applying the local rules.
    #[must_use]
    pub fn should_ignore_remote(&self, key: &str) -> bool {
        let prefix = self.remote_prefix();
        let rel_path = key.strip_prefix(prefix.as_str()).unwrap_or(key);
        self.should_ignore_local(rel_path)
    }

    /// Whether a remote key falls under the bucket path this deploy owns.
    #[must_use]
    pub fn is_managed_remote(&self, key: &str) -> bool {
        key.starts_with(&self.remote_prefix())
    }

    /// Processing group of a local relative path: `i + 1` for the last
    /// order pattern `i` that matches, `0` if none does.
    #[must_use]
    pub fn group_of(&self, rel_path: &str) -> usize {
        self.order
            .iter()
            .rposition(|re| re.is_match(rel_path))
            .map_or(0, |i| i + 1)
    }

    /// Number of processing groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.order.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use site_deploy_models::RouteConfig;

    use super::*;

    fn config(bucket_path: &str, ignore: Option<&str>) -> Config {
        Config {
            bucket_name: "mybucket".to_string(),
            bucket_path: bucket_path.to_string(),
            ignore: ignore.map(ToString::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn bucket_is_required() {
        let err = Config::default().check().unwrap_err();
        assert_eq!(err.to_string(), "AWS bucket is required");
    }

    #[test]
    fn root_source_is_rejected() {
        let cfg = Config {
            source_path: Some(PathBuf::from("/")),
            ..config("", None)
        };
        let err = cfg.check().unwrap_err();
        assert!(err.to_string().contains("cannot deploy from root"));

        let cfg = Config {
            source_path: Some(PathBuf::from("/var/www")),
            ..config("", None)
        };
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn acl_and_public_access_conflict() {
        let cfg = Config {
            acl: Some("public-read".to_string()),
            public_access: true,
            ..config("", None)
        };
        let err = cfg.check().unwrap_err();
        assert!(
            err.to_string()
                .contains("you passed a value for the flags public-access and acl")
        );
    }

    #[test]
    fn effective_acl() {
        let public = Config {
            public_access: true,
            ..config("", None)
        };
        assert_eq!(public.check().unwrap().acl.as_deref(), Some("public-read"));

        let explicit = Config {
            acl: Some("private".to_string()),
            ..config("", None)
        };
        assert_eq!(explicit.check().unwrap().acl.as_deref(), Some("private"));

        assert_eq!(config("", None).check().unwrap().acl, None);
    }

    #[test]
    fn invalid_ignore_pattern() {
        let err = config("", Some("((INVALID_PATTERN")).check().unwrap_err();
        assert!(
            err.to_string()
                .contains("cannot compile 'ignore' flag pattern")
        );
    }

    #[test]
    fn should_ignore() {
        let default = config("my/path", None).check().unwrap();
        let ignore = config("my/path", Some("^ignored-prefix.*")).check().unwrap();

        assert!(!default.should_ignore_local("any"));
        assert!(!default.should_ignore_local("ignored-prefix/file.txt"));

        assert!(!ignore.should_ignore_local("any"));
        assert!(ignore.should_ignore_local("ignored-prefix/file.txt"));

        assert!(!default.should_ignore_remote("my/path/any"));
        assert!(!default.should_ignore_remote("my/path/ignored-prefix/file.txt"));

        assert!(!ignore.should_ignore_remote("my/path/any"));
        assert!(ignore.should_ignore_remote("my/path/ignored-prefix/file.txt"));
    }

    #[test]
    fn ignore_routes_count_as_ignored() {
        let mut cfg = config("", None);
        cfg.file_config.routes.push(RouteConfig {
            route: "^private/".to_string(),
            ignore: true,
            ..RouteConfig::default()
        });
        let rules = cfg.check().unwrap();
        assert!(rules.should_ignore_local("private/a.txt"));
        assert!(rules.should_ignore_remote("private/a.txt"));
        assert!(!rules.should_ignore_local("public/a.txt"));
    }

    #[test]
    fn keys_and_prefix() {
        let rules = config("/my/path/", None).check().unwrap();
        assert_eq!(rules.bucket_path, "my/path");
        assert_eq!(rules.remote_prefix(), "my/path/");
        assert_eq!(rules.bucket_key("css/main.css"), "my/path/css/main.css");
        assert!(rules.is_managed_remote("my/path/index.html"));
        assert!(!rules.is_managed_remote("other/index.html"));
        assert!(!rules.is_managed_remote("my/pathology.txt"));

        let root = config("", None).check().unwrap();
        assert_eq!(root.bucket_key("index.html"), "index.html");
        assert!(root.is_managed_remote("anything"));
    }

    #[test]
    fn processing_groups_use_last_match() {
        let mut cfg = config("", None);
        cfg.file_config.order = vec![r"\.html$".to_string(), r"^index\.html$".to_string()];
        let rules = cfg.check().unwrap();

        assert_eq!(rules.group_count(), 3);
        assert_eq!(rules.group_of("main.css"), 0);
        assert_eq!(rules.group_of("about.html"), 1);
        assert_eq!(rules.group_of("index.html"), 2);
    }

    #[test]
    fn workers_default_to_parallelism() {
        let rules = config("", None).check().unwrap();
        assert!(rules.workers >= 1);

        let cfg = Config {
            workers: Some(3),
            ..config("", None)
        };
        assert_eq!(cfg.check().unwrap().workers, 3);
    }

    #[test]
    fn file_settings_fill_only_missing_values() {
        let mut cfg = Config {
            bucket_name: "from-flag".to_string(),
            ..Config::default()
        };
        cfg.merge_file_settings(&FileSettings {
            bucket: Some("from-file".to_string()),
            region: Some("eu-west-1".to_string()),
            source: Some("public".to_string()),
            ..FileSettings::default()
        });

        assert_eq!(cfg.bucket_name, "from-flag");
        assert_eq!(cfg.region_name.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.source_path, Some(PathBuf::from("public")));
    }

    #[test]
    fn reads_yaml_config_file() {
        let tmp = std::env::temp_dir().join("site_deploy_read_file_config");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let path = tmp.join(".s3deploy.yml");
        std::fs::write(
            &path,
            r#"
bucket: mybucket
routes:
  - route: "^.+\\.(js|css|svg|ttf)$"
    headers:
      Cache-Control: "max-age=630720000, no-transform, public"
    gzip: true
  - route: "^.+\\.(png|jpg)$"
    headers:
      Cache-Control: "max-age=630720000, no-transform, public"
    gzip: false
order:
  - "^index\\.html$"
"#,
        )
        .unwrap();

        let file_config = read_file_config(&path).unwrap();
        assert_eq!(file_config.settings.bucket.as_deref(), Some("mybucket"));
        assert_eq!(file_config.routes.len(), 2);
        assert!(file_config.routes[0].gzip);
        assert_eq!(
            file_config.routes[1].headers["Cache-Control"],
            "max-age=630720000, no-transform, public"
        );
        assert_eq!(file_config.order, vec![r"^index\.html$"]);

        std::fs::write(&path, "routes: [[[").unwrap();
        assert!(matches!(
            read_file_config(&path),
            Err(DeployError::ConfigFile { .. })
        ));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_config_file_is_empty() {
        let missing = std::env::temp_dir().join("site_deploy_no_such_config.yml");
        assert_eq!(read_file_config(&missing).unwrap(), FileConfig::default());
    }
}
