//! Aggregated health reporting.
//!
//! The overall daemon status is the worst status among enabled sources.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use logrelay_core::pipeline::HealthStatus;
use logrelay_pipeline::StatsSnapshot;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status of all enabled sources.
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    /// Per-source reports.
    pub modules: Vec<ModuleHealth>,
}

/// Health of a single source pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Source name.
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
    /// Counters at the time of the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
}

/// Worst status among enabled modules: Unhealthy > Degraded > Healthy.
///
/// Reasons are prefixed with the module name and joined with `; `.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for module in modules.iter().filter(|m| m.enabled) {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    worst = HealthStatus::Degraded(String::new());
                }
                reasons.push(format!("{}: {}", module.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", module.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

/// Emits one log line for the daemon and one per source.
pub fn log_health(health: &DaemonHealth) {
    match &health.status {
        HealthStatus::Healthy => tracing::info!(
            uptime_secs = health.uptime_secs,
            sources = health.modules.len(),
            "daemon healthy"
        ),
        HealthStatus::Degraded(reason) => tracing::warn!(
            uptime_secs = health.uptime_secs,
            reason = %reason,
            "daemon degraded"
        ),
        HealthStatus::Unhealthy(reason) => tracing::error!(
            uptime_secs = health.uptime_secs,
            reason = %reason,
            "daemon unhealthy"
        ),
    }

    for module in &health.modules {
        let Some(stats) = &module.stats else {
            continue;
        };
        tracing::info!(
            source = %module.name,
            healthy = module.status.is_healthy(),
            lines_read = stats.lines_read,
            events_classified = stats.events_classified,
            events_ignored = stats.events_ignored,
            deliveries_ok = stats.deliveries_ok,
            deliveries_failed = stats.deliveries_failed,
            restarts = stats.restarts,
            tail_reopens = stats.tail_reopens,
            offset = ?stats.offset,
            "source stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
        ModuleHealth {
            name: name.to_owned(),
            enabled,
            status,
            stats: None,
        }
    }

    #[test]
    fn unhealthy_wins_over_degraded() {
        let modules = vec![
            module("tron", true, HealthStatus::Degraded("backoff".into())),
            module("q3", true, HealthStatus::Unhealthy("runner exited".into())),
        ];
        let status = aggregate_status(&modules);
        let HealthStatus::Unhealthy(reason) = status else {
            panic!("expected unhealthy, got {status:?}");
        };
        assert!(reason.contains("tron: backoff"));
        assert!(reason.contains("q3: runner exited"));
    }

    #[test]
    fn disabled_modules_are_ignored() {
        let modules = vec![
            module("tron", true, HealthStatus::Healthy),
            module("old", false, HealthStatus::Unhealthy("stopped".into())),
        ];
        assert!(aggregate_status(&modules).is_healthy());
    }

    #[test]
    fn empty_is_healthy() {
        assert!(aggregate_status(&[]).is_healthy());
    }

    #[test]
    fn health_serializes_with_stats_omitted_when_absent() {
        let health = DaemonHealth {
            status: HealthStatus::Healthy,
            uptime_secs: 3,
            modules: vec![module("tron", true, HealthStatus::Healthy)],
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["uptime_secs"], 3);
        assert_eq!(json["modules"][0]["name"], "tron");
        assert!(json["modules"][0].get("stats").is_none());
    }
}
