//! Cycle orchestration.
//!
//! One forwarding cycle: ship logs to completion, then forward usage metrics
//! for each resource category in fixed priority order. Logs come first and a
//! shipping failure aborts the cycle, since logs are checkpointed and must
//! not be skipped silently. A failure on one resource during the metric
//! phase is
//! logged and skipped; the remaining resources still run.

use snafu::prelude::*;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::Config;
use crate::emit;
use crate::error::{CycleError, ForwardError, ShipError, ShipSnafu};
use crate::forwarder::MetricForwarder;
use crate::shipper::LogShipper;
use crate::sink::{Dimension, HttpLogSink, HttpMetricSink, LogSink, MetricSink};
use crate::source::{ApiClient, CacheEndpoint, Resource, ResourceCategory, SourceApi};
use crate::telemetry::events::{CycleCompleted, MetricBatchRejected, ResourceHandled, ResourceStatus};

/// Statistics about one forwarding cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub records_shipped: usize,
    pub points_forwarded: usize,
    pub resources_processed: usize,
    pub resources_skipped: usize,
    pub resources_failed: usize,
}

/// Drives one complete forwarding cycle over injected collaborators.
pub struct Orchestrator<'a> {
    source: &'a dyn SourceApi,
    metric_sink: &'a dyn MetricSink,
    log_sink: &'a dyn LogSink,
    checkpoint: &'a dyn CheckpointStore,
    config: &'a Config,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        metric_sink: &'a dyn MetricSink,
        log_sink: &'a dyn LogSink,
        checkpoint: &'a dyn CheckpointStore,
        config: &'a Config,
    ) -> Self {
        Self {
            source,
            metric_sink,
            log_sink,
            checkpoint,
            config,
        }
    }

    /// Run one cycle: logs first, then metrics per category, then the two
    /// array-wide cache endpoints.
    pub async fn run(&self) -> Result<CycleStats, CycleError> {
        let started = Instant::now();
        let mut stats = CycleStats::default();

        let shipper = LogShipper::new(
            self.source,
            self.log_sink,
            self.checkpoint,
            &self.config.log_sink.stream,
            self.config.checkpoint_key(),
            self.config.source.log_page_size,
        );
        stats.records_shipped = shipper.ship().await.context(ShipSnafu)?;

        let forwarder = MetricForwarder::new(self.metric_sink, &self.config.source.host);

        // Volumes name the servers backing them; collected while iterating
        // volumes, consulted by the server skip policy.
        let mut active_servers: HashSet<String> = HashSet::new();

        for category in ResourceCategory::ALL {
            let resources = match self.source.list_resources(category).await {
                Ok(resources) => resources,
                Err(e) => {
                    warn!(%category, "Skipping category, listing failed: {e}");
                    stats.resources_failed += 1;
                    continue;
                }
            };
            info!(%category, count = resources.len(), "Forwarding category metrics");

            for resource in &resources {
                if category == ResourceCategory::Volumes {
                    if let Some(server) = &resource.server_name {
                        active_servers.insert(server.clone());
                    }
                }

                if skip_resource(category, resource, &active_servers) {
                    info!(%category, name = %resource.name, "Skipping inactive resource");
                    stats.resources_skipped += 1;
                    emit!(ResourceHandled {
                        category: category.dimension(),
                        status: ResourceStatus::Skipped,
                    });
                    continue;
                }

                match self.forward_resource(&forwarder, category, resource).await {
                    Ok(points) => {
                        stats.resources_processed += 1;
                        stats.points_forwarded += points;
                        emit!(ResourceHandled {
                            category: category.dimension(),
                            status: ResourceStatus::Processed,
                        });
                    }
                    Err(e) => {
                        warn!(%category, name = %resource.name, "Skipping failed resource: {e}");
                        if matches!(e, ForwardError::ForwardSink { .. }) {
                            emit!(MetricBatchRejected);
                        }
                        stats.resources_failed += 1;
                        emit!(ResourceHandled {
                            category: category.dimension(),
                            status: ResourceStatus::Failed,
                        });
                    }
                }
            }
        }

        for endpoint in [CacheEndpoint::Performance, CacheEndpoint::Stats] {
            match self.forward_cache(&forwarder, endpoint).await {
                Ok(points) => stats.points_forwarded += points,
                Err(e) => warn!("Skipping cache endpoint {:?}: {e}", endpoint),
            }
        }

        emit!(CycleCompleted {
            duration: started.elapsed(),
        });
        Ok(stats)
    }

    async fn forward_resource(
        &self,
        forwarder: &MetricForwarder<'_>,
        category: ResourceCategory,
        resource: &Resource,
    ) -> Result<usize, ForwardError> {
        let samples = self.source.fetch_usage(category, &resource.name).await?;
        let dimensions = [Dimension::new(category.dimension(), resource.name.clone())];
        let points = forwarder.forward(&samples, &dimensions).await?;
        Ok(points)
    }

    /// The cache endpoints are array-wide; their points carry only the base
    /// host dimension.
    async fn forward_cache(
        &self,
        forwarder: &MetricForwarder<'_>,
        endpoint: CacheEndpoint,
    ) -> Result<usize, ForwardError> {
        let samples = self.source.fetch_cache_usage(endpoint).await?;
        let points = forwarder.forward(&samples, &[]).await?;
        Ok(points)
    }
}

/// Skip policy for the metric phase: servers not backing any volume and
/// controllers not in "active" state are excluded for this cycle.
fn skip_resource(
    category: ResourceCategory,
    resource: &Resource,
    active_servers: &HashSet<String>,
) -> bool {
    match category {
        ResourceCategory::Servers => resource
            .display_name
            .as_deref()
            .is_none_or(|name| !active_servers.contains(name)),
        ResourceCategory::Controllers => resource.state.as_deref() != Some("active"),
        _ => false,
    }
}

/// Run one cycle with the production collaborators built from configuration.
pub async fn run_cycle(config: &Config) -> Result<CycleStats, CycleError> {
    let source = ApiClient::new(&config.source)
        .map_err(ShipError::from)
        .context(ShipSnafu)?;
    let metric_sink = HttpMetricSink::new(
        &config.metric_sink.endpoint,
        config.metric_sink.namespace.clone(),
    );
    let log_sink = HttpLogSink::new(&config.log_sink.endpoint);
    let checkpoint = FileCheckpointStore::new(&config.checkpoint.path);

    let orchestrator = Orchestrator::new(&source, &metric_sink, &log_sink, &checkpoint, config);
    orchestrator.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str) -> Resource {
        Resource {
            name: name.to_string(),
            display_name: Some(name.to_string()),
            server_name: None,
            state: None,
        }
    }

    #[test]
    fn unreferenced_server_is_skipped() {
        let mut active = HashSet::new();
        active.insert("web-1".to_string());

        assert!(!skip_resource(
            ResourceCategory::Servers,
            &resource("web-1"),
            &active
        ));
        assert!(skip_resource(
            ResourceCategory::Servers,
            &resource("db-1"),
            &active
        ));
    }

    #[test]
    fn server_without_display_name_is_skipped() {
        let mut server = resource("srv");
        server.display_name = None;
        assert!(skip_resource(
            ResourceCategory::Servers,
            &server,
            &HashSet::new()
        ));
    }

    #[test]
    fn inactive_controller_is_skipped() {
        let mut controller = resource("vc-0");
        controller.state = Some("standby".to_string());
        assert!(skip_resource(
            ResourceCategory::Controllers,
            &controller,
            &HashSet::new()
        ));

        controller.state = Some("active".to_string());
        assert!(!skip_resource(
            ResourceCategory::Controllers,
            &controller,
            &HashSet::new()
        ));
    }

    #[test]
    fn pools_and_volumes_are_never_skipped() {
        let empty = HashSet::new();
        assert!(!skip_resource(ResourceCategory::Pools, &resource("p"), &empty));
        assert!(!skip_resource(
            ResourceCategory::Volumes,
            &resource("v"),
            &empty
        ));
    }
}
