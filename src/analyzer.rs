//! Threshold rules that turn a `MetricsReport` into root-cause hints.

use serde::{Deserialize, Serialize};

use crate::collector::MetricsReport;

pub const DEFAULT_CPU_THRESHOLD: f64 = 80.0;
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 90.0;

pub const NO_ISSUES: &str = "No immediate issues detected.";
pub const MEMORY_PRESSURE: &str =
    "Memory usage is critically high; swapping may be driving up CPU usage.";

/// Usage levels above which a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: DEFAULT_CPU_THRESHOLD,
            memory_percent: DEFAULT_MEMORY_THRESHOLD,
        }
    }
}

/// Stateless rule engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer {
    thresholds: Thresholds,
}

impl Analyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Applies every rule in order; all matching rules contribute a hint.
    pub fn analyze(&self, report: &MetricsReport) -> Vec<String> {
        let mut hints = Vec::new();

        if report.cpu_usage_percent > self.thresholds.cpu_percent {
            let mut hint = format!(
                "High CPU usage detected ({:.1}%).",
                report.cpu_usage_percent
            );
            if !report.top_cpu_processes.is_empty() {
                hint.push_str(" Top processes: ");
                hint.push_str(&report.top_cpu_processes.join("; "));
            }
            hints.push(hint);
        }

        if report.memory_usage_percent > self.thresholds.memory_percent {
            hints.push(MEMORY_PRESSURE.to_string());
        }

        if !report.failed_systemd_services.is_empty() {
            hints.push(format!(
                "Failed systemd services detected: {}.",
                report.failed_systemd_services.join(", ")
            ));
        }

        if hints.is_empty() {
            hints.push(NO_ISSUES.to_string());
        }

        hints
    }
}

/// A report with its optional analysis, as emitted to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    #[serde(flatten)]
    pub metrics: MetricsReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Vec<String>>,
}

impl DiagnosticReport {
    pub fn new(metrics: MetricsReport) -> Self {
        Self {
            metrics,
            analysis: None,
        }
    }

    pub fn analyzed(metrics: MetricsReport, analyzer: &Analyzer) -> Self {
        let analysis = analyzer.analyze(&metrics);
        Self {
            metrics,
            analysis: Some(analysis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(cpu: f64, memory: f64, failed: &[&str]) -> MetricsReport {
        MetricsReport {
            cpu_usage_percent: cpu,
            memory_usage_percent: memory,
            failed_systemd_services: failed.iter().map(|s| s.to_string()).collect(),
            ..MetricsReport::default()
        }
    }

    #[test]
    fn high_cpu_without_processes() {
        let hints = Analyzer::default().analyze(&report(95.0, 50.0, &[]));
        assert_eq!(hints, vec!["High CPU usage detected (95.0%)."]);
    }

    #[test]
    fn high_cpu_lists_top_processes_inline() {
        let mut r = report(88.34, 10.0, &[]);
        r.top_cpu_processes = vec!["101 root 80.0 1.0 java".into(), "7 www 5.0 0.2 nginx".into()];
        let hints = Analyzer::default().analyze(&r);
        assert_eq!(
            hints,
            vec!["High CPU usage detected (88.3%). Top processes: 101 root 80.0 1.0 java; 7 www 5.0 0.2 nginx"]
        );
    }

    #[test]
    fn high_memory_only() {
        let hints = Analyzer::default().analyze(&report(10.0, 95.0, &[]));
        assert_eq!(hints, vec![MEMORY_PRESSURE]);
    }

    #[test]
    fn failed_services_are_listed() {
        let hints = Analyzer::default().analyze(&report(10.0, 10.0, &["nginx.service"]));
        assert_eq!(hints, vec!["Failed systemd services detected: nginx.service."]);

        let hints =
            Analyzer::default().analyze(&report(10.0, 10.0, &["a.service", "b.service"]));
        assert_eq!(hints, vec!["Failed systemd services detected: a.service, b.service."]);
    }

    #[test]
    fn quiet_host_reports_no_issues() {
        let hints = Analyzer::default().analyze(&report(10.0, 10.0, &[]));
        assert_eq!(hints, vec![NO_ISSUES]);
    }

    #[test]
    fn thresholds_are_exclusive_and_rules_keep_order() {
        let analyzer = Analyzer::default();
        assert_eq!(analyzer.analyze(&report(80.0, 90.0, &[])), vec![NO_ISSUES]);

        let hints = analyzer.analyze(&report(99.0, 99.0, &["x.service"]));
        assert_eq!(hints.len(), 3);
        assert!(hints[0].starts_with("High CPU usage detected (99.0%)"));
        assert_eq!(hints[1], MEMORY_PRESSURE);
        assert!(hints[2].starts_with("Failed systemd services detected"));
    }

    #[test]
    fn analysis_is_deterministic() {
        let r = report(91.0, 97.0, &["db.service"]);
        let analyzer = Analyzer::default();
        assert_eq!(analyzer.analyze(&r), analyzer.analyze(&r));
    }

    #[test]
    fn custom_thresholds() {
        let analyzer = Analyzer::new(Thresholds {
            cpu_percent: 50.0,
            memory_percent: 60.0,
        });
        assert_eq!(analyzer.analyze(&report(55.0, 65.0, &[])).len(), 2);
    }

    #[test]
    fn diagnostic_report_flattens_metrics() {
        let wrapped = DiagnosticReport::analyzed(report(10.0, 10.0, &[]), &Analyzer::default());
        let json = serde_json::to_value(&wrapped).unwrap();
        assert_eq!(json["cpu_usage_percent"], 10.0);
        assert_eq!(json["analysis"][0], NO_ISSUES);

        let plain = serde_json::to_value(DiagnosticReport::new(report(1.0, 1.0, &[]))).unwrap();
        assert!(plain.get("analysis").is_none());
    }
}
