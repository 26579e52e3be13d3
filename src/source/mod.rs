//! Source API data model and client contract.
//!
//! The source is a storage-array management API queried for resource
//! metadata, performance samples, and the appliance event log. Everything
//! the rest of the pipeline needs from it goes through the [`SourceApi`]
//! trait so tests can substitute fakes without a process-wide singleton.

mod client;

pub use client::ApiClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::SourceError;

/// Resource categories whose usage samples are forwarded as metrics,
/// in fixed cycle priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Pools,
    Volumes,
    Servers,
    Controllers,
}

impl ResourceCategory {
    /// All categories in cycle priority order.
    pub const ALL: [ResourceCategory; 4] = [
        ResourceCategory::Pools,
        ResourceCategory::Volumes,
        ResourceCategory::Servers,
        ResourceCategory::Controllers,
    ];

    /// The collection name used in API paths and response envelopes.
    pub fn api_name(&self) -> &'static str {
        match self {
            ResourceCategory::Pools => "pools",
            ResourceCategory::Volumes => "volumes",
            ResourceCategory::Servers => "servers",
            ResourceCategory::Controllers => "vcontrollers",
        }
    }

    /// The dimension key attached to points from this category.
    pub fn dimension(&self) -> &'static str {
        match self {
            ResourceCategory::Pools => "pool",
            ResourceCategory::Volumes => "volume",
            ResourceCategory::Servers => "server",
            ResourceCategory::Controllers => "controller",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

/// The two fixed array-wide cache endpoints polled at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEndpoint {
    Performance,
    Stats,
}

impl CacheEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            CacheEndpoint::Performance => "vcontrollers/cache_performance.json",
            CacheEndpoint::Stats => "vcontrollers/cache_stats.json",
        }
    }
}

/// One resource instance returned by a listing query.
///
/// Only the fields the cycle's skip policies need are modeled; everything
/// else the API returns is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Server backing a volume; present on volume listings only.
    #[serde(default)]
    pub server_name: Option<String>,
    /// Controller state; present on controller listings only.
    #[serde(default)]
    pub state: Option<String>,
}

/// A timestamped mapping from metric name to numeric value, scoped to one
/// resource instance. Consumed once, never mutated after creation.
///
/// Values are ordered so point emission is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

/// One event from the appliance message log.
///
/// `id` is source-assigned, monotonically increasing, and is the checkpoint
/// unit; the source delivers records in non-decreasing `id` order.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: u64,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Contract for the source API.
///
/// Each call is a single authenticated request; retry policy lives in the
/// calling component.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// List the resources of one category.
    async fn list_resources(
        &self,
        category: ResourceCategory,
    ) -> Result<Vec<Resource>, SourceError>;

    /// Fetch the freshest usage samples for one resource.
    async fn fetch_usage(
        &self,
        category: ResourceCategory,
        resource_name: &str,
    ) -> Result<Vec<UsageSample>, SourceError>;

    /// Fetch the array-wide cache usage samples.
    async fn fetch_cache_usage(
        &self,
        endpoint: CacheEndpoint,
    ) -> Result<Vec<UsageSample>, SourceError>;

    /// Fetch one page of log records with `id > after_id`, ascending by id.
    async fn fetch_log(
        &self,
        after_id: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_order_is_fixed() {
        let names: Vec<_> = ResourceCategory::ALL.iter().map(|c| c.api_name()).collect();
        assert_eq!(names, ["pools", "volumes", "servers", "vcontrollers"]);
    }

    #[test]
    fn controller_dimension_is_not_the_api_name() {
        assert_eq!(ResourceCategory::Controllers.dimension(), "controller");
    }

    #[test]
    fn resource_parses_with_missing_optional_fields() {
        let resource: Resource = serde_json::from_value(serde_json::json!({
            "name": "pool-00010001",
            "capacity": 1024
        }))
        .unwrap();
        assert_eq!(resource.name, "pool-00010001");
        assert!(resource.server_name.is_none());
        assert!(resource.state.is_none());
    }
}
