/*!
 * RCA Linux Agent Library
 *
 * Collects host health metrics locally or over SSH and derives root-cause
 * hints from them.
 */

pub mod agent;
pub mod analyzer;
pub mod collector;
pub mod config;
pub mod error;
pub mod exec;
pub mod probes;

// Re-export commonly used types
pub use agent::{AgentEvent, RcaAgent};
pub use analyzer::{Analyzer, DiagnosticReport, Thresholds};
pub use collector::{Collector, CollectorConfig, MetricsReport};
pub use config::AgentConfig;
pub use error::{ExecError, ProbeError, SessionError};
pub use exec::{Auth, CommandRunner, CommandSpec, Credentials, KeyMaterial, LocalRunner, RemoteSession};
