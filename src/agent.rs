use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::{Analyzer, DiagnosticReport};
use crate::collector::Collector;
use crate::config::AgentConfig;

pub const AGENT_NAME: &str = "rca_agent";
pub const AGENT_DESCRIPTION: &str = "Collect system metrics for RCA";

/// One response emitted by the agent per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub invocation_id: Uuid,
    pub author: String,
    /// Pretty-printed JSON diagnostic report.
    pub text: String,
}

/// RCA Agent
///
/// Plain callable wrapper around the collector and analyzer, usable from a CLI
/// or any host framework that wants one event per call.
pub struct RcaAgent {
    name: String,
    config: AgentConfig,
    collector: Collector,
    analyzer: Analyzer,
}

impl RcaAgent {
    /// Create new agent
    pub fn new(config: AgentConfig) -> Self {
        Self {
            name: AGENT_NAME.to_string(),
            collector: Collector::new(config.collector.clone()),
            analyzer: Analyzer::new(config.thresholds),
            config,
        }
    }

    /// Get agent name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        AGENT_DESCRIPTION
    }

    /// Collect from the configured target and attach analysis if enabled.
    pub async fn diagnose(&self) -> Result<DiagnosticReport> {
        let metrics = match &self.config.remote {
            Some(credentials) => self
                .collector
                .collect_remote(credentials)
                .await
                .with_context(|| format!("Remote collection from {} failed", credentials.label()))?,
            None => self.collector.collect_local().await,
        };

        if metrics.cpu_usage_percent == 0.0 && metrics.memory_usage_percent == 0.0 {
            warn!(target_host = %metrics.host, "CPU and memory both read 0.0; probes likely failed");
        }

        Ok(if self.config.analyze {
            DiagnosticReport::analyzed(metrics, &self.analyzer)
        } else {
            DiagnosticReport::new(metrics)
        })
    }

    /// Run one invocation and wrap the serialized report in an event.
    pub async fn run(&self, invocation_id: Uuid) -> Result<AgentEvent> {
        info!(agent = %self.name, %invocation_id, "Agent invocation started");

        let report = self.diagnose().await?;
        let text = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;

        info!(
            agent = %self.name,
            %invocation_id,
            hints = report.analysis.as_ref().map_or(0, Vec::len),
            "Agent invocation finished"
        );

        Ok(AgentEvent {
            invocation_id,
            author: self.name.clone(),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exec::{Auth, Credentials};

    #[test]
    fn agent_identity() {
        let agent = RcaAgent::new(AgentConfig::default());
        assert_eq!(agent.name(), "rca_agent");
        assert_eq!(agent.description(), "Collect system metrics for RCA");
    }

    #[tokio::test]
    async fn unreachable_remote_fails_the_invocation() {
        let mut config = AgentConfig::default();
        config.collector.connect_timeout = Duration::from_secs(5);
        config.remote = Some(Credentials::new("127.0.0.1", Auth::Password("x".into())).with_port(1));

        let agent = RcaAgent::new(config);
        let err = agent.run(Uuid::new_v4()).await.unwrap_err();
        assert!(err.to_string().contains("root@127.0.0.1:1"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn local_invocation_emits_json_event() {
        let mut config = AgentConfig::default();
        config.collector.cpu_sample = Duration::from_millis(250);

        let agent = RcaAgent::new(config);
        let id = Uuid::new_v4();
        let event = agent.run(id).await.unwrap();

        assert_eq!(event.invocation_id, id);
        assert_eq!(event.author, "rca_agent");
        let json: serde_json::Value = serde_json::from_str(&event.text).unwrap();
        assert!(json.get("memory_usage_percent").is_some());
        assert!(json.get("cpu_usage_percent").is_some());
        assert!(json["analysis"].as_array().is_some_and(|a| !a.is_empty()));
    }
}
