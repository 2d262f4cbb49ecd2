//! Compute cluster lifecycle.
//!
//! Partition work always runs on a local worker pool owned by the
//! `ComputeCluster` handle. An ephemeral cluster is that pool alone, created
//! for this run and shut down when the run ends. A named cluster is only
//! health-checked through the cluster gateway: it must report `RUNNING`, its
//! dashboard link is logged, and it is never shut down. No partition work is
//! sent to it.
//!
//! `with_cluster` brackets a fallible job so the release happens on every
//! outcome, and `close()` is idempotent.
use std::time::Duration;

use rayon::ThreadPool;
use rayon::prelude::*;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::params::PipelineConfig;
use crate::io::geoparquet::Partition;
use crate::io::stac::join_url;
use crate::types::ClusterSelector;

/// Errors encountered while acquiring or using a compute cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("No gateway configured for named cluster '{0}' (set ACQMAP_GATEWAY_URL)")]
    NoGateway(String),
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),
    #[error("Gateway request failed: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("Cluster '{0}' not found on gateway")]
    NotFound(String),
    #[error("Cluster '{name}' is {status}, expected RUNNING")]
    NotRunning { name: String, status: String },
    #[error("Cluster '{0}' has already been released")]
    Released(String),
}

/// Cluster report as returned by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayClusterReport {
    pub name: String,
    pub status: String,
    pub dashboard_route: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Created by this run; shut down on release
    Owned,
    /// Pre-provisioned; left running on release
    Attached,
}

/// Handle to the local workers partition tasks are scheduled on
pub struct ComputeCluster {
    name: String,
    ownership: Ownership,
    pool: Option<ThreadPool>,
    dashboard_link: Option<String>,
}

impl ComputeCluster {
    /// Acquire the cluster selected at startup.
    pub fn acquire(
        selector: &ClusterSelector,
        config: &PipelineConfig,
    ) -> Result<Self, ClusterError> {
        match selector {
            ClusterSelector::Ephemeral => {
                info!("No cluster configured; starting a local cluster");
                Self::local(config.workers)
            }
            ClusterSelector::Named(name) => {
                let gateway = config
                    .gateway_url
                    .as_deref()
                    .ok_or_else(|| ClusterError::NoGateway(name.clone()))?;
                info!(
                    "Checking cluster '{}' through the gateway; partitions run on the local pool",
                    name
                );
                Self::connect(name, gateway, config.http_timeout, config.workers)
            }
        }
    }

    /// Start an ephemeral local cluster with `workers` threads (rayon's default when None).
    pub fn local(workers: Option<usize>) -> Result<Self, ClusterError> {
        let pool = build_pool("local", workers)?;
        info!("Local cluster started with {} worker(s)", pool.current_num_threads());
        Ok(Self {
            name: "local".to_string(),
            ownership: Ownership::Owned,
            pool: Some(pool),
            dashboard_link: None,
        })
    }

    /// Check that the named cluster registered with the gateway at `gateway_url`
    /// is running, then start the local pool partitions run on. The remote
    /// cluster only contributes its dashboard link.
    pub fn connect(
        name: &str,
        gateway_url: &str,
        timeout: Duration,
        workers: Option<usize>,
    ) -> Result<Self, ClusterError> {
        let url = join_url(gateway_url, &format!("api/v1/clusters/{}", name))
            .map_err(|e| ClusterError::InvalidUrl(e.to_string()))?;
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        debug!("GET {}", url);
        let response = http.get(url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound(name.to_string()));
        }
        let report: GatewayClusterReport = response.error_for_status()?.json()?;
        let dashboard_link = attach_report(name, gateway_url, &report)?;

        let pool = build_pool(name, workers)?;
        info!(
            "Cluster '{}' is running; scheduling on {} local worker(s)",
            name,
            pool.current_num_threads()
        );
        Ok(Self {
            name: name.to_string(),
            ownership: Ownership::Attached,
            pool: Some(pool),
            dashboard_link,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the cluster was created by this run and is shut down on release.
    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    pub fn is_released(&self) -> bool {
        self.pool.is_none()
    }

    pub fn dashboard_link(&self) -> Option<&str> {
        self.dashboard_link.as_deref()
    }

    /// Number of concurrently scheduled partition tasks; zero once released.
    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.current_num_threads())
    }

    /// Run `task` over every partition in parallel and block until all finish.
    /// Results keep partition order; the first error aborts the job.
    pub fn map_partitions<T, E, F>(&self, partitions: &[Partition], task: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send + From<ClusterError>,
        F: Fn(&Partition) -> Result<T, E> + Sync + Send,
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| ClusterError::Released(self.name.clone()))?;
        pool.install(|| partitions.par_iter().map(&task).collect())
    }

    /// Release the cluster. Returns true when this call shut down a cluster owned by the run;
    /// attached clusters are only disconnected, and repeated calls are no-ops.
    pub fn close(&mut self) -> bool {
        let Some(pool) = self.pool.take() else {
            return false;
        };
        drop(pool);
        match self.ownership {
            Ownership::Owned => {
                info!("Shut down local cluster");
                true
            }
            Ownership::Attached => {
                info!("Shut down local pool; cluster '{}' left running", self.name);
                false
            }
        }
    }
}

impl Drop for ComputeCluster {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run `job` against `cluster`, then release the cluster whatever the outcome.
pub fn with_cluster<T, E, F>(cluster: &mut ComputeCluster, job: F) -> Result<T, E>
where
    F: FnOnce(&ComputeCluster) -> Result<T, E>,
{
    if let Some(link) = cluster.dashboard_link() {
        info!("Cluster dashboard: {}", link);
    }
    let result = job(cluster);
    cluster.close();
    result
}

fn build_pool(name: &str, workers: Option<usize>) -> Result<ThreadPool, ClusterError> {
    let prefix = name.to_string();
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("{}-worker-{}", prefix, i));
    if let Some(n) = workers {
        builder = builder.num_threads(n);
    }
    Ok(builder.build()?)
}

/// Validate a gateway report and derive the dashboard link.
fn attach_report(
    name: &str,
    gateway_url: &str,
    report: &GatewayClusterReport,
) -> Result<Option<String>, ClusterError> {
    if !report.status.eq_ignore_ascii_case("running") {
        return Err(ClusterError::NotRunning {
            name: name.to_string(),
            status: report.status.clone(),
        });
    }
    Ok(report.dashboard_route.as_deref().map(|route| {
        format!(
            "{}/{}",
            gateway_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }))
}
