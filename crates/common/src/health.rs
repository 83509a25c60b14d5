//! Readiness reporting for background components.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health of a single component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ComponentHealth {
    /// Working normally.
    Healthy,
    /// Running, but currently failing and retrying.
    Degraded {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentHealth::Healthy)
    }
}

/// Shared registry the relay and projector report into, read by `/health`.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a component healthy.
    pub fn healthy(&self, component: &str) {
        self.set(component, ComponentHealth::Healthy);
    }

    /// Marks a component degraded. Keeps the original `since` if it was
    /// already degraded.
    pub fn degraded(&self, component: &str, reason: impl Into<String>) {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let since = match components.get(component) {
            Some(ComponentHealth::Degraded { since, .. }) => *since,
            _ => Utc::now(),
        };
        components.insert(
            component.to_string(),
            ComponentHealth::Degraded {
                reason: reason.into(),
                since,
            },
        );
    }

    fn set(&self, component: &str, health: ComponentHealth) {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(component.to_string(), health);
    }

    /// Returns the health of one component, if it ever reported.
    pub fn get(&self, component: &str) -> Option<ComponentHealth> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component)
            .cloned()
    }

    /// Copy of every component's health.
    pub fn snapshot(&self) -> BTreeMap<String, ComponentHealth> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True when no component is degraded.
    pub fn is_healthy(&self) -> bool {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(ComponentHealth::is_healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_is_healthy() {
        assert!(HealthRegistry::new().is_healthy());
    }

    #[test]
    fn degraded_component_makes_registry_unhealthy() {
        let registry = HealthRegistry::new();
        registry.healthy("relay");
        registry.degraded("projector", "store unreachable");

        assert!(!registry.is_healthy());
        assert!(registry.get("relay").unwrap().is_healthy());
    }

    #[test]
    fn degraded_keeps_first_since() {
        let registry = HealthRegistry::new();
        registry.degraded("relay", "broker down");
        let first = match registry.get("relay") {
            Some(ComponentHealth::Degraded { since, .. }) => since,
            other => panic!("unexpected {other:?}"),
        };

        registry.degraded("relay", "still down");
        match registry.get("relay") {
            Some(ComponentHealth::Degraded { since, reason }) => {
                assert_eq!(since, first);
                assert_eq!(reason, "still down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn recovery_clears_degradation() {
        let registry = HealthRegistry::new();
        registry.degraded("relay", "broker down");
        registry.healthy("relay");
        assert!(registry.is_healthy());
    }

    #[test]
    fn health_serializes_with_status_tag() {
        let json = serde_json::to_value(ComponentHealth::Healthy).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
