//! Per-job context handed to the execution state machine
//!
//! Contains everything the host knows about one job that does not change
//! between ticks:
//! - the job key (cache key and admission token)
//! - the admission namespace (the resolved routing group)
//! - the query to submit

use quarry_core::domain::job::JobKey;
use quarry_core::domain::query::QuerySpec;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct JobContext {
    pub key: JobKey,
    pub namespace: String,
    pub query: QuerySpec,
}

impl JobContext {
    /// Creates a context for `query`, resolving its routing group
    ///
    /// The resolved group is both the admission namespace and the group the
    /// query is routed to.
    pub fn new(key: JobKey, mut query: QuerySpec, config: &Config) -> Self {
        let namespace = config.resolve_routing_group(&query.routing_group);
        query.routing_group = namespace.clone();
        if query.user.is_empty() {
            query.user = config.backend_user.clone();
        }

        Self {
            key,
            namespace,
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_routing_group_falls_back_to_default() {
        let config = Config::default();
        let ctx = JobContext::new(
            JobKey::from("project:domain:exec"),
            QuerySpec {
                statement: "select 1".to_string(),
                routing_group: "nightly".to_string(),
                ..Default::default()
            },
            &config,
        );

        assert_eq!(ctx.namespace, "adhoc");
        assert_eq!(ctx.query.routing_group, "adhoc");
        assert_eq!(ctx.query.user, "quarry");
    }

    #[test]
    fn test_known_routing_group_is_kept() {
        let config = Config::default();
        let ctx = JobContext::new(
            JobKey::from("k"),
            QuerySpec {
                routing_group: "etl".to_string(),
                user: "analyst".to_string(),
                ..Default::default()
            },
            &config,
        );

        assert_eq!(ctx.namespace, "etl");
        assert_eq!(ctx.query.user, "analyst");
    }
}
