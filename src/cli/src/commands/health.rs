//! `campus health`: is the portal up, and is it exporting metrics.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat, Tone};

/// Check that the portal answers
#[derive(Args)]
pub struct HealthArgs {
    /// Also probe /metrics
    #[arg(short, long)]
    metrics: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct HealthReport {
    status: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    metrics_status: Option<u16>,
}

impl HealthReport {
    fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.metrics_status.map_or(true, |s| s == 200)
    }
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let mut report: HealthReport = client.get_json("/health").await?;
    if args.metrics {
        report.metrics_status = Some(client.get_page("/metrics", None).await?.status);
    }

    if format != OutputFormat::Table {
        return output::document(&report, format);
    }

    output::section(client.base_url());
    output::field("Status", &report.status);
    for (label, value) in [("Version", &report.version), ("Checked at", &report.timestamp)] {
        if let Some(value) = value {
            output::field(label, value);
        }
    }
    if let Some(status) = report.metrics_status {
        output::field("Metrics", status);
    }

    if report.is_healthy() {
        output::say(Tone::Ok, "Portal is up");
    } else {
        output::say(Tone::Fail, format!("Portal reports {}", report.status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_server_body() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"healthy","version":"0.1.0","timestamp":"2026-10-19T08:00:00Z"}"#,
        )
        .unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.version.as_deref(), Some("0.1.0"));
    }

    #[test]
    fn test_failed_metrics_probe_is_unhealthy() {
        let mut report: HealthReport = serde_json::from_str(r#"{"status":"healthy"}"#).unwrap();
        report.metrics_status = Some(503);
        assert!(!report.is_healthy());
    }
}
