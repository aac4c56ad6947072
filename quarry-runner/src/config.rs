//! Runner configuration
//!
//! Defines all configurable parameters for the runner including the backend
//! connection, routing group quotas, status cache tuning, and the reconcile
//! loop interval.

use quarry_cache::CacheConfig;
use std::time::Duration;

/// Admission capacity of one routing group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingGroupConfig {
    pub name: String,
    pub limit: usize,
}

impl RoutingGroupConfig {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
        }
    }
}

/// Runner configuration
///
/// All intervals and limits are configurable to allow tuning for different
/// backends (a busy shared cluster vs a dedicated one).
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (e.g., "http://localhost:8080")
    pub backend_url: String,

    /// User sent with every query that does not name one
    pub backend_user: String,

    /// Routing group used when a query names an unknown one
    pub default_routing_group: String,

    /// Per routing group admission limits
    pub routing_groups: Vec<RoutingGroupConfig>,

    /// Maximum active jobs across all routing groups
    pub global_active_limit: usize,

    /// How often each tracked query is re-queried
    pub resync_interval: Duration,

    /// Number of status sync workers
    pub sync_workers: usize,

    /// Maximum number of queries refreshed in one batch
    pub sync_batch_size: usize,

    /// Maximum number of queries tracked by the status cache
    pub cache_size: usize,

    /// Failed submissions tolerated before a job is given up
    pub max_creation_failures: u32,

    /// How often the reconcile loop visits every job
    pub tick_interval: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(backend_url: String) -> Self {
        Self {
            backend_url,
            backend_user: "quarry".to_string(),
            default_routing_group: "adhoc".to_string(),
            routing_groups: vec![
                RoutingGroupConfig::new("adhoc", 250),
                RoutingGroupConfig::new("etl", 100),
            ],
            global_active_limit: 500,
            resync_interval: quarry_cache::DEFAULT_RESYNC_INTERVAL,
            sync_workers: 15,
            sync_batch_size: 10,
            cache_size: 2000,
            max_creation_failures: 5,
            tick_interval: Duration::from_secs(5),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - BACKEND_URL (required)
    /// - BACKEND_USER (optional, default: quarry)
    /// - DEFAULT_ROUTING_GROUP (optional, default: adhoc)
    /// - ROUTING_GROUPS (optional, `name:limit,...`, default: adhoc:250,etl:100)
    /// - GLOBAL_ACTIVE_LIMIT (optional, default: 500)
    /// - RESYNC_INTERVAL (optional, seconds, default: 30)
    /// - SYNC_WORKERS (optional, default: 15)
    /// - SYNC_BATCH_SIZE (optional, default: 10)
    /// - CACHE_SIZE (optional, default: 2000)
    /// - MAX_CREATION_FAILURES (optional, default: 5)
    /// - TICK_INTERVAL (optional, seconds, default: 5)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates configuration from any variable source
    ///
    /// Variables that are set but malformed are errors, never silently
    /// replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("BACKEND_URL")
            .ok_or_else(|| anyhow::anyhow!("BACKEND_URL environment variable not set"))?;

        let mut config = Self::new(backend_url);

        if let Some(user) = lookup("BACKEND_USER") {
            config.backend_user = user;
        }

        if let Some(group) = lookup("DEFAULT_ROUTING_GROUP") {
            config.default_routing_group = group;
        }

        if let Some(groups) = lookup("ROUTING_GROUPS") {
            config.routing_groups = parse_routing_groups(&groups)?;
        }

        if let Some(limit) = parse_var(&lookup, "GLOBAL_ACTIVE_LIMIT")? {
            config.global_active_limit = limit;
        }
        if let Some(secs) = parse_var(&lookup, "RESYNC_INTERVAL")? {
            config.resync_interval = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_var(&lookup, "SYNC_WORKERS")? {
            config.sync_workers = workers;
        }
        if let Some(size) = parse_var(&lookup, "SYNC_BATCH_SIZE")? {
            config.sync_batch_size = size;
        }
        if let Some(size) = parse_var(&lookup, "CACHE_SIZE")? {
            config.cache_size = size;
        }
        if let Some(max) = parse_var(&lookup, "MAX_CREATION_FAILURES")? {
            config.max_creation_failures = max;
        }
        if let Some(secs) = parse_var(&lookup, "TICK_INTERVAL")? {
            config.tick_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Loads and validates configuration from the environment
    ///
    /// Defaults are used only when BACKEND_URL is unset.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::load`] over any variable source
    pub fn load_from<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = if lookup("BACKEND_URL").is_some() {
            Self::from_lookup(lookup)?
        } else {
            tracing::info!("BACKEND_URL not set, using default configuration");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Returns `name` if it is a configured routing group, else the default
    pub fn resolve_routing_group(&self, name: &str) -> String {
        if self.routing_groups.iter().any(|g| g.name == name) {
            return name.to_string();
        }

        tracing::debug!(
            "Routing group '{}' not configured, using default '{}'",
            name,
            self.default_routing_group
        );
        self.default_routing_group.clone()
    }

    /// Settings for the status cache
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new("query-status")
            .with_resync_interval(self.resync_interval)
            .with_workers(self.sync_workers)
            .with_batch_size(self.sync_batch_size)
            .with_max_items(self.cache_size)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend_url.is_empty() {
            anyhow::bail!("backend_url cannot be empty");
        }

        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            anyhow::bail!("backend_url must start with http:// or https://");
        }

        if self.routing_groups.is_empty() {
            anyhow::bail!("at least one routing group must be configured");
        }

        if !self
            .routing_groups
            .iter()
            .any(|g| g.name == self.default_routing_group)
        {
            anyhow::bail!(
                "default routing group '{}' is not configured",
                self.default_routing_group
            );
        }

        if self.global_active_limit == 0 {
            anyhow::bail!("global_active_limit must be greater than 0");
        }

        if self.tick_interval.is_zero() {
            anyhow::bail!("tick_interval must be greater than 0");
        }

        self.cache_config()
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8080".to_string())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("invalid value for {}: '{}'", name, value)),
        None => Ok(None),
    }
}

/// Parses `name:limit,name:limit`
fn parse_routing_groups(value: &str) -> anyhow::Result<Vec<RoutingGroupConfig>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (name, limit) = entry
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("routing group '{}' must be name:limit", entry))?;
            let limit = limit
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("invalid limit for routing group '{}'", name))?;
            Ok(RoutingGroupConfig::new(name.trim(), limit))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert_eq!(config.sync_workers, 15);
        assert_eq!(config.cache_size, 2000);
        assert_eq!(config.max_creation_failures, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid URL should fail
        config.backend_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.backend_url = "http://localhost:8080".to_string();

        // Default group must be one of the configured groups
        config.default_routing_group = "missing".to_string();
        assert!(config.validate().is_err());
        config.default_routing_group = "adhoc".to_string();

        config.sync_workers = 0;
        assert!(config.validate().is_err());
        config.sync_workers = 1;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_routing_group() {
        let config = Config::default();
        assert_eq!(config.resolve_routing_group("etl"), "etl");
        assert_eq!(config.resolve_routing_group("test"), "adhoc");
        assert_eq!(config.resolve_routing_group(""), "adhoc");
    }

    #[test]
    fn test_parse_routing_groups() {
        let groups = parse_routing_groups("adhoc:10, etl:3").unwrap();
        assert_eq!(
            groups,
            vec![
                RoutingGroupConfig::new("adhoc", 10),
                RoutingGroupConfig::new("etl", 3)
            ]
        );

        assert!(parse_routing_groups("adhoc").is_err());
        assert!(parse_routing_groups("adhoc:lots").is_err());
    }

    #[test]
    fn test_cache_config_follows_runner_config() {
        let mut config = Config::default();
        config.sync_batch_size = 4;
        config.resync_interval = Duration::from_secs(3);

        let cache = config.cache_config();
        assert_eq!(cache.batch_size, 4);
        assert_eq!(cache.resync_interval, Duration::from_secs(3));
        assert_eq!(cache.max_items, 2000);
    }

    #[test]
    fn test_load_reads_variables() {
        let config = Config::load_from(vars(&[
            ("BACKEND_URL", "http://presto:8080"),
            ("ROUTING_GROUPS", "adhoc:10,etl:3"),
            ("SYNC_WORKERS", "4"),
            ("TICK_INTERVAL", "2"),
        ]))
        .unwrap();

        assert_eq!(config.backend_url, "http://presto:8080");
        assert_eq!(config.routing_groups.len(), 2);
        assert_eq!(config.sync_workers, 4);
        assert_eq!(config.tick_interval, Duration::from_secs(2));
        assert_eq!(config.cache_size, 2000);
    }

    #[test]
    fn test_load_falls_back_only_without_backend_url() {
        let config = Config::load_from(vars(&[("ROUTING_GROUPS", "adhoc:lots")])).unwrap();
        assert_eq!(config.backend_url, "http://localhost:8080");
        assert_eq!(config.routing_groups, Config::default().routing_groups);
    }

    #[test]
    fn test_load_rejects_malformed_variables() {
        let err = Config::load_from(vars(&[
            ("BACKEND_URL", "http://presto:8080"),
            ("ROUTING_GROUPS", "adhoc:lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("adhoc"));

        let err = Config::load_from(vars(&[
            ("BACKEND_URL", "http://presto:8080"),
            ("SYNC_WORKERS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SYNC_WORKERS"));

        // Parsed but invalid values fail validation instead of falling back
        assert!(
            Config::load_from(vars(&[
                ("BACKEND_URL", "http://presto:8080"),
                ("DEFAULT_ROUTING_GROUP", "missing"),
            ]))
            .is_err()
        );
    }
}
