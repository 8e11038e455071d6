// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use duelos_core::{CleanupReport, SweepObserver, SweepReport};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TelemetryState {
    requests_total: BTreeMap<(String, String), u64>,
    completions_total: BTreeMap<String, u64>,
    monitor_sweeps_total: u64,
    monitor_duels_total: BTreeMap<&'static str, u64>,
    monitor_last_scanned: u64,
    cleanup_deleted_total: BTreeMap<&'static str, u64>,
}

/// Process-local counters exposed as Prometheus text at `/metrics`.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    state: Arc<Mutex<TelemetryState>>,
}

fn bump<K: Ord>(map: &mut BTreeMap<K, u64>, key: K, by: u64) {
    let entry = map.entry(key).or_insert(0);
    *entry = entry.saturating_add(by);
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `outcome` is `ok` or the public error code returned to the client.
    pub fn record_request(&self, op: &str, outcome: &str) {
        let mut guard = self.state.lock();
        bump(
            &mut guard.requests_total,
            (op.to_string(), outcome.to_string()),
            1,
        );
    }

    pub fn record_completion(&self, reason: &str) {
        let mut guard = self.state.lock();
        bump(&mut guard.completions_total, reason.to_string(), 1);
    }

    pub fn record_cleanup(&self, report: &CleanupReport) {
        let mut guard = self.state.lock();
        for (status, count) in [
            ("PENDING", report.pending_deleted),
            ("ACCEPTED", report.accepted_deleted),
            ("ACTIVE", report.active_deleted),
        ] {
            bump(&mut guard.cleanup_deleted_total, status, count as u64);
        }
    }

    pub fn render(&self) -> String {
        let guard = self.state.lock();
        let mut out = String::new();

        out.push_str("# TYPE duelos_requests_total counter\n");
        for ((op, outcome), value) in &guard.requests_total {
            let _ = writeln!(
                out,
                "duelos_requests_total{{op=\"{}\",outcome=\"{}\"}} {}",
                op, outcome, value
            );
        }
        out.push_str("# TYPE duelos_completions_total counter\n");
        for (reason, value) in &guard.completions_total {
            let _ = writeln!(
                out,
                "duelos_completions_total{{reason=\"{}\"}} {}",
                reason, value
            );
        }
        out.push_str("# TYPE duelos_monitor_sweeps_total counter\n");
        let _ = writeln!(out, "duelos_monitor_sweeps_total {}", guard.monitor_sweeps_total);
        out.push_str("# TYPE duelos_monitor_duels_total counter\n");
        for (result, value) in &guard.monitor_duels_total {
            let _ = writeln!(
                out,
                "duelos_monitor_duels_total{{result=\"{}\"}} {}",
                result, value
            );
        }
        out.push_str("# TYPE duelos_monitor_last_scanned gauge\n");
        let _ = writeln!(
            out,
            "duelos_monitor_last_scanned {}",
            guard.monitor_last_scanned
        );
        out.push_str("# TYPE duelos_cleanup_deleted_total counter\n");
        for (status, value) in &guard.cleanup_deleted_total {
            let _ = writeln!(
                out,
                "duelos_cleanup_deleted_total{{status=\"{}\"}} {}",
                status, value
            );
        }
        out
    }
}

impl SweepObserver for Telemetry {
    fn on_sweep(&self, report: &SweepReport) {
        let mut guard = self.state.lock();
        guard.monitor_sweeps_total = guard.monitor_sweeps_total.saturating_add(1);
        guard.monitor_last_scanned = report.scanned as u64;
        for (result, count) in [
            ("timed_out", report.timed_out),
            ("expired", report.expired),
            ("finished", report.finished),
            ("lost_race", report.lost_race),
            ("failed", report.failed),
        ] {
            if count > 0 {
                bump(&mut guard.monitor_duels_total, result, count as u64);
            }
        }
        for (reason, count) in [
            ("TIMEOUT", report.timed_out),
            ("EXPIRED", report.expired),
            ("WIN", report.finished.saturating_sub(report.tied)),
            ("TIE", report.tied),
        ] {
            if count > 0 {
                bump(&mut guard.completions_total, reason.to_string(), count as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_recorded_counters() {
        let telemetry = Telemetry::new();
        telemetry.record_request("submit", "ok");
        telemetry.record_request("submit", "ok");
        telemetry.record_request("accept", "FORBIDDEN");
        telemetry.record_completion("WIN");

        let text = telemetry.render();
        assert!(text.contains("duelos_requests_total{op=\"submit\",outcome=\"ok\"} 2"));
        assert!(text.contains("duelos_requests_total{op=\"accept\",outcome=\"FORBIDDEN\"} 1"));
        assert!(text.contains("duelos_completions_total{reason=\"WIN\"} 1"));
    }

    #[test]
    fn sweep_reports_accumulate() {
        let telemetry = Telemetry::new();
        let report = SweepReport {
            scanned: 4,
            timed_out: 2,
            expired: 1,
            lost_race: 1,
            ..SweepReport::default()
        };
        telemetry.on_sweep(&report);
        telemetry.on_sweep(&SweepReport::default());

        let text = telemetry.render();
        assert!(text.contains("duelos_monitor_sweeps_total 2"));
        assert!(text.contains("duelos_monitor_duels_total{result=\"timed_out\"} 2"));
        assert!(text.contains("duelos_monitor_duels_total{result=\"lost_race\"} 1"));
        assert!(text.contains("duelos_completions_total{reason=\"TIMEOUT\"} 2"));
        assert!(text.contains("duelos_monitor_last_scanned 0"));
        assert!(!text.contains("result=\"failed\""));
    }

    #[test]
    fn sweep_counts_finished_duels_by_reason() {
        let telemetry = Telemetry::new();
        telemetry.on_sweep(&SweepReport {
            scanned: 3,
            finished: 3,
            tied: 1,
            ..SweepReport::default()
        });
        let text = telemetry.render();
        assert!(text.contains("duelos_completions_total{reason=\"WIN\"} 2"));
        assert!(text.contains("duelos_completions_total{reason=\"TIE\"} 1"));
        assert!(!text.contains("reason=\"TIMEOUT\""));
    }

    #[test]
    fn cleanup_counts_by_status() {
        let telemetry = Telemetry::new();
        telemetry.record_cleanup(&CleanupReport {
            pending_deleted: 3,
            active_deleted: 1,
            ..CleanupReport::default()
        });
        let text = telemetry.render();
        assert!(text.contains("duelos_cleanup_deleted_total{status=\"PENDING\"} 3"));
        assert!(text.contains("duelos_cleanup_deleted_total{status=\"ACCEPTED\"} 0"));
        assert!(text.contains("duelos_cleanup_deleted_total{status=\"ACTIVE\"} 1"));
    }
}
