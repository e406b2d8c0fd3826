//! Compiled route table.
//!
//! Routes come from the `routes:` section of the config file. Each one pairs
//! a regular expression (matched against the file's path relative to the
//! source root) with upload policy: extra headers, gzip, or ignore.

use std::collections::BTreeMap;

use regex::Regex;
use site_deploy_models::RouteConfig;

use crate::DeployError;

/// One compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: Regex,
    /// Compress the content before upload.
    pub gzip: bool,
    /// Files matching this route are neither uploaded nor deleted.
    pub ignore: bool,
    /// Headers applied to matching uploads.
    pub headers: BTreeMap<String, String>,
}

impl Route {
    /// Compiles a route from its config entry.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidPattern`] if the route regex is invalid.
    pub fn compile(config: &RouteConfig) -> Result<Self, DeployError> {
        Ok(Self {
            pattern: compile_pattern("route", &config.route)?,
            gzip: config.gzip,
            ignore: config.ignore,
            headers: config.headers.clone(),
        })
    }

    /// Whether the route applies to `rel_path`.
    #[must_use]
    pub fn is_match(&self, rel_path: &str) -> bool {
        self.pattern.is_match(rel_path)
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered list of routes, evaluated first-match-wins.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    /// Compiles every route in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidPattern`] for the first invalid route.
    pub fn compile(configs: &[RouteConfig]) -> Result<Self, DeployError> {
        let routes = configs
            .iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// The first route matching `rel_path`.
    #[must_use]
    pub fn get(&self, rel_path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.is_match(rel_path))
    }

    /// Whether any `ignore` route matches `rel_path`, wherever it sits in
    /// the table.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.routes
            .iter()
            .any(|r| r.ignore && r.is_match(rel_path))
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Compiles `pattern`, naming the setting it came from on failure.
pub(crate) fn compile_pattern(name: &str, pattern: &str) -> Result<Regex, DeployError> {
    Regex::new(pattern).map_err(|source| DeployError::InvalidPattern {
        name: name.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}
