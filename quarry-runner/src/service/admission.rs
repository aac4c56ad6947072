//! Pooled admission controller
//!
//! In-memory implementation of the admission contract. Each routing group is
//! a namespace with its own capacity, and a global limit caps the total number
//! of tokens held across all namespaces.
//!
//! Tokens are keyed by job key, so allocating twice for the same job holds a
//! single token.

use async_trait::async_trait;
use quarry_core::admission::{AdmissionController, AllocationStatus};
use quarry_core::domain::job::JobKey;
use quarry_core::error::AdmissionError;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::{Config, RoutingGroupConfig};

#[derive(Default)]
struct Pools {
    /// Namespace each held token belongs to
    granted: HashMap<JobKey, String>,
    /// Tokens held per namespace
    in_use: HashMap<String, usize>,
}

pub struct PooledAdmissionController {
    limits: HashMap<String, usize>,
    global_limit: usize,
    pools: Mutex<Pools>,
}

impl PooledAdmissionController {
    pub fn new(groups: &[RoutingGroupConfig], global_limit: usize) -> Self {
        Self {
            limits: groups.iter().map(|g| (g.name.clone(), g.limit)).collect(),
            global_limit,
            pools: Mutex::new(Pools::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.routing_groups, config.global_active_limit)
    }

    /// Number of tokens currently held in `namespace`
    pub fn in_use(&self, namespace: &str) -> usize {
        self.lock().in_use.get(namespace).copied().unwrap_or(0)
    }

    /// Number of tokens currently held overall
    pub fn total_in_use(&self) -> usize {
        self.lock().granted.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pools> {
        self.pools.lock().expect("admission pool mutex poisoned")
    }
}

#[async_trait]
impl AdmissionController for PooledAdmissionController {
    async fn allocate(
        &self,
        namespace: &str,
        token: &JobKey,
    ) -> Result<AllocationStatus, AdmissionError> {
        let limit = *self
            .limits
            .get(namespace)
            .ok_or_else(|| AdmissionError::UnknownNamespace(namespace.to_string()))?;

        let mut pools = self.lock();

        if pools.granted.contains_key(token) {
            return Ok(AllocationStatus::Granted);
        }

        let used = pools.in_use.get(namespace).copied().unwrap_or(0);
        if used >= limit {
            debug!(
                "Namespace '{}' exhausted ({}/{}), denying {}",
                namespace, used, limit, token
            );
            return Ok(AllocationStatus::NamespaceExhausted);
        }

        if pools.granted.len() >= self.global_limit {
            debug!(
                "Global pool exhausted ({}), denying {}",
                self.global_limit, token
            );
            return Ok(AllocationStatus::Exhausted);
        }

        pools.granted.insert(token.clone(), namespace.to_string());
        *pools.in_use.entry(namespace.to_string()).or_insert(0) += 1;

        info!("Granted token {} in namespace '{}'", token, namespace);
        Ok(AllocationStatus::Granted)
    }

    async fn release(&self, namespace: &str, token: &JobKey) -> Result<(), AdmissionError> {
        let mut pools = self.lock();

        let Some(held_in) = pools.granted.remove(token) else {
            debug!("Token {} not held, nothing to release", token);
            return Ok(());
        };

        if held_in != namespace {
            debug!(
                "Token {} released from '{}' but was held in '{}'",
                token, namespace, held_in
            );
        }

        if let Some(count) = pools.in_use.get_mut(&held_in) {
            *count = count.saturating_sub(1);
        }

        info!("Released token {} in namespace '{}'", token, held_in);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PooledAdmissionController {
        PooledAdmissionController::new(
            &[
                RoutingGroupConfig::new("adhoc", 2),
                RoutingGroupConfig::new("etl", 5),
            ],
            3,
        )
    }

    #[tokio::test]
    async fn test_namespace_limit() {
        let admission = controller();

        for key in ["a", "b"] {
            let status = admission.allocate("adhoc", &JobKey::from(key)).await.unwrap();
            assert_eq!(status, AllocationStatus::Granted);
        }

        let status = admission.allocate("adhoc", &JobKey::from("c")).await.unwrap();
        assert_eq!(status, AllocationStatus::NamespaceExhausted);
        assert_eq!(admission.in_use("adhoc"), 2);
    }

    #[tokio::test]
    async fn test_global_limit() {
        let admission = controller();

        for key in ["a", "b", "c"] {
            admission.allocate("etl", &JobKey::from(key)).await.unwrap();
        }

        let status = admission.allocate("etl", &JobKey::from("d")).await.unwrap();
        assert_eq!(status, AllocationStatus::Exhausted);
        assert_eq!(admission.total_in_use(), 3);
    }

    #[tokio::test]
    async fn test_allocation_is_idempotent_per_token() {
        let admission = controller();
        let key = JobKey::from("a");

        admission.allocate("adhoc", &key).await.unwrap();
        let status = admission.allocate("adhoc", &key).await.unwrap();

        assert_eq!(status, AllocationStatus::Granted);
        assert_eq!(admission.in_use("adhoc"), 1);
    }

    #[tokio::test]
    async fn test_release_frees_capacity_and_is_idempotent() {
        let admission = controller();
        let a = JobKey::from("a");

        admission.allocate("adhoc", &a).await.unwrap();
        admission.allocate("adhoc", &JobKey::from("b")).await.unwrap();

        admission.release("adhoc", &a).await.unwrap();
        admission.release("adhoc", &a).await.unwrap();
        admission.release("adhoc", &JobKey::from("never")).await.unwrap();

        assert_eq!(admission.in_use("adhoc"), 1);
        let status = admission.allocate("adhoc", &JobKey::from("c")).await.unwrap();
        assert_eq!(status, AllocationStatus::Granted);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_an_error() {
        let admission = controller();
        let err = admission
            .allocate("nightly", &JobKey::from("a"))
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::UnknownNamespace("nightly".to_string()));
    }
}
