//! Metric collection for one target.
//!
//! Runs every probe in sequence, substitutes the documented default for any
//! probe that fails, and assembles a `MetricsReport`. Remote sessions are
//! opened and closed within a single collection.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ProbeError, SessionError};
use crate::exec::{CommandRunner, Credentials, LocalRunner, RemoteSession, SessionOptions};
use crate::probes::{HostProbes, LocalHost, RemoteHost};

/// Health metrics for one host at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub host: String,
    pub collected_at: DateTime<Utc>,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub inode_usage_percent: f64,
    pub fd_usage_percent: f64,
    pub failed_systemd_services: Vec<String>,
    /// Recent journal lines, keyed by failed service.
    pub systemd_logs: BTreeMap<String, Vec<String>>,
    pub top_cpu_processes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
}

impl Default for MetricsReport {
    fn default() -> Self {
        Self {
            host: String::new(),
            collected_at: Utc::now(),
            memory_usage_percent: 0.0,
            cpu_usage_percent: 0.0,
            disk_usage_percent: 0.0,
            inode_usage_percent: 0.0,
            fd_usage_percent: 0.0,
            failed_systemd_services: Vec::new(),
            systemd_logs: BTreeMap::new(),
            top_cpu_processes: Vec::new(),
            services: None,
        }
    }
}

/// Collection tuning.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Journal lines fetched per failed service.
    pub log_lines: usize,
    /// Number of processes listed by CPU usage.
    pub top_processes: usize,
    /// Whether to list every service unit in the report.
    pub include_services: bool,
    /// Local CPU sampling window.
    pub cpu_sample: Duration,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let session = SessionOptions::default();
        Self {
            log_lines: 20,
            top_processes: 5,
            include_services: false,
            cpu_sample: crate::probes::local::DEFAULT_CPU_SAMPLE,
            command_timeout: session.command_timeout,
            connect_timeout: session.connect_timeout,
        }
    }
}

/// Runs the probe set against a target and builds the report.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collects from the machine the agent runs on.
    pub async fn collect_local(&self) -> MetricsReport {
        let host = LocalHost::new(
            LocalRunner::new(self.config.command_timeout),
            self.config.cpu_sample,
        );
        self.collect(&host).await
    }

    /// Connects, collects and disconnects. A connection or authentication
    /// failure aborts the whole call.
    pub async fn collect_remote(
        &self,
        credentials: &Credentials,
    ) -> Result<MetricsReport, SessionError> {
        let options = SessionOptions {
            connect_timeout: self.config.connect_timeout,
            command_timeout: self.config.command_timeout,
        };
        let session = RemoteSession::connect(credentials, &options).await?;
        Ok(self.collect_scoped(RemoteHost::new(session)).await)
    }

    /// Collects through `host` and always closes its session afterwards.
    /// If collection panics, dropping the session tears the connection down.
    pub async fn collect_scoped<R: CommandRunner>(&self, host: RemoteHost<R>) -> MetricsReport {
        let report = self.collect(&host).await;
        host.session().close().await;
        report
    }

    /// Runs every probe. Never fails: each field falls back to its default.
    pub async fn collect(&self, probes: &dyn HostProbes) -> MetricsReport {
        let host = probes.describe();
        let started = Instant::now();
        info!(target_host = %host, "Collecting host metrics");

        let failed = or_default("failed_systemd_services", probes.failed_services().await);

        // Logs are only fetched for units that are actually failing.
        let mut systemd_logs = BTreeMap::new();
        for unit in &failed {
            let lines = or_default(
                "systemd_logs",
                probes.service_logs(unit, self.config.log_lines).await,
            );
            systemd_logs.insert(unit.clone(), lines);
        }

        let services = if self.config.include_services {
            Some(or_default("services", probes.services().await))
        } else {
            None
        };

        let report = MetricsReport {
            host: host.clone(),
            collected_at: Utc::now(),
            memory_usage_percent: or_default("memory_usage_percent", probes.memory_usage().await),
            cpu_usage_percent: or_default("cpu_usage_percent", probes.cpu_usage().await),
            disk_usage_percent: or_default("disk_usage_percent", probes.disk_usage().await),
            inode_usage_percent: or_default("inode_usage_percent", probes.inode_usage().await),
            fd_usage_percent: or_default("fd_usage_percent", probes.fd_usage().await),
            failed_systemd_services: failed,
            systemd_logs,
            top_cpu_processes: or_default(
                "top_cpu_processes",
                probes.top_processes(self.config.top_processes).await,
            ),
            services,
        };

        info!(
            target_host = %host,
            failed_services = report.failed_systemd_services.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Host metrics collected"
        );

        report
    }
}

fn or_default<T: Default>(field: &'static str, result: Result<T, ProbeError>) -> T {
    result.unwrap_or_else(|e| {
        warn!(field, error = %e, "Probe failed, using default value");
        T::default()
    })
}
