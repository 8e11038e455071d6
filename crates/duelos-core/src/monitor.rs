// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Periodic sweep that forces stalled `ACTIVE` duels to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::duel::{CompletionReason, DuelStatus, Role};
use crate::engine::{Completion, DuelEngine};
use crate::error::DuelResult;
use crate::store::DuelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// A tick running longer than this is abandoned; the next tick resumes.
    /// Completions it already wrote are still paid out.
    pub tick_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            tick_timeout: Duration::from_secs(25),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub timed_out: usize,
    pub expired: usize,
    /// Duels with both times recorded whose submitter never wrote the completion.
    pub finished: usize,
    /// How many of `finished` ended in a tie.
    pub tied: usize,
    /// A submission or another sweep got there first.
    pub lost_race: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn resolved(&self) -> usize {
        self.timed_out + self.expired + self.finished
    }
}

pub trait SweepObserver: Send + Sync {
    fn on_sweep(&self, report: &SweepReport);
}

pub struct TimeoutMonitor {
    engine: Arc<DuelEngine>,
    config: MonitorConfig,
    observer: Option<Arc<dyn SweepObserver>>,
}

impl TimeoutMonitor {
    pub fn new(engine: Arc<DuelEngine>, config: MonitorConfig) -> Self {
        Self {
            engine,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SweepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// One pass over the `ACTIVE` duels.
    ///
    /// Listing failures abort the pass; a failure on one duel is logged and
    /// counted and the pass moves on.
    pub async fn sweep(&self) -> DuelResult<SweepReport> {
        let mut report = SweepReport::default();
        let active = DuelFilter::status(DuelStatus::Active);
        if self.engine.count(&active).await? == 0 {
            return Ok(report);
        }

        let duels = self.engine.list(&active).await?;
        let now = self.engine.now_ms();
        for duel in duels {
            report.scanned += 1;
            let Some(verdict) = self.engine.policy().timeout_verdict(&duel, now) else {
                continue;
            };
            let reason = verdict.reason;
            let open_roles: Vec<Role> = [Role::Challenger, Role::Challengee]
                .into_iter()
                .filter(|role| !duel.elapsed(*role).is_recorded())
                .collect();
            match self.engine.complete(&duel, verdict, Some(&open_roles)).await {
                Ok(Completion::Applied(_)) => match reason {
                    CompletionReason::Timeout => report.timed_out += 1,
                    CompletionReason::Expired => report.expired += 1,
                    CompletionReason::Win => report.finished += 1,
                    CompletionReason::Tie => {
                        report.finished += 1;
                        report.tied += 1;
                    }
                },
                Ok(Completion::AlreadyCompleted(_)) | Ok(Completion::Superseded(_)) => {
                    report.lost_race += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        target: "duelos.monitor",
                        duel_id = %duel.id,
                        reason = reason.as_str(),
                        error = %err,
                        "forced completion failed"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` resolves. A sweep already in
    /// progress when shutdown fires runs to the end of that tick.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            target: "duelos.monitor",
            interval_ms = self.config.interval.as_millis() as u64,
            "timeout monitor started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        tracing::info!(target: "duelos.monitor", "timeout monitor stopped");
    }

    async fn tick(&self) {
        match tokio::time::timeout(self.config.tick_timeout, self.sweep()).await {
            Ok(Ok(report)) => {
                if report.resolved() > 0 || report.failed > 0 {
                    tracing::info!(
                        target: "duelos.monitor",
                        scanned = report.scanned,
                        timed_out = report.timed_out,
                        expired = report.expired,
                        finished = report.finished,
                        lost_race = report.lost_race,
                        failed = report.failed,
                        "sweep finished"
                    );
                }
                if let Some(observer) = &self.observer {
                    observer.on_sweep(&report);
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(target: "duelos.monitor", error = %err, "sweep aborted");
            }
            Err(_) => {
                tracing::warn!(
                    target: "duelos.monitor",
                    timeout_ms = self.config.tick_timeout.as_millis() as u64,
                    "sweep exceeded tick timeout"
                );
            }
        }
    }
}
