// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use duelos_core::{AcceptPolicy, DuelPolicy, MonitorConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {0}")]
    Listen(String),

    #[error("invalid duel policy: {0}")]
    Policy(String),

    #[error("invalid monitor settings: {0}")]
    Monitor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreBackend {
    /// Process-local tables; everything is lost on exit.
    Memory,
    /// JSON files under the data directory.
    File,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: String,
    pub data_dir: PathBuf,
    pub store: StoreBackend,
    pub max_body_bytes: usize,
    pub store_call_timeout: Duration,
    pub policy: DuelPolicy,
    pub monitor: MonitorConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("./data"),
            store: StoreBackend::File,
            max_body_bytes: 16_384,
            store_call_timeout: duelos_core::engine::DEFAULT_STORE_CALL_TIMEOUT,
            policy: DuelPolicy::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by any `DUELOS_*` values `lookup` returns.
    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let read = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let positive = |name: &str, default: u64| read(name).filter(|v| *v > 0).unwrap_or(default);
        let secs = |name: &str, default: Duration| {
            Duration::from_secs(positive(name, default.as_secs()))
        };

        cfg.max_body_bytes = positive("DUELOS_MAX_BODY_BYTES", cfg.max_body_bytes as u64) as usize;
        cfg.store_call_timeout = Duration::from_millis(positive(
            "DUELOS_STORE_CALL_TIMEOUT_MS",
            cfg.store_call_timeout.as_millis() as u64,
        ));

        let policy = &mut cfg.policy;
        policy.win_bonus_xp = read("DUELOS_WIN_BONUS_XP").unwrap_or(policy.win_bonus_xp);
        policy.participation_xp =
            read("DUELOS_PARTICIPATION_XP").unwrap_or(policy.participation_xp);
        policy.timeout_win_xp = read("DUELOS_TIMEOUT_WIN_XP").unwrap_or(policy.timeout_win_xp);
        policy.timeout_participation_xp = read("DUELOS_TIMEOUT_PARTICIPATION_XP")
            .unwrap_or(policy.timeout_participation_xp);
        policy.one_sided_timeout = secs("DUELOS_ONE_SIDED_TIMEOUT_SECS", policy.one_sided_timeout);
        policy.max_duel_duration = secs("DUELOS_MAX_DUEL_DURATION_SECS", policy.max_duel_duration);
        policy.pending_stale_after =
            secs("DUELOS_PENDING_STALE_AFTER_SECS", policy.pending_stale_after);
        policy.active_stale_after =
            secs("DUELOS_ACTIVE_STALE_AFTER_SECS", policy.active_stale_after);
        policy.accept_policy = match lookup("DUELOS_ACCEPT_POLICY") {
            Some(v) if v.trim().eq_ignore_ascii_case("challengee_only") => {
                AcceptPolicy::ChallengeeOnly
            }
            _ => AcceptPolicy::AnyUser,
        };

        cfg.monitor.interval = secs("DUELOS_MONITOR_INTERVAL_SECS", cfg.monitor.interval);
        cfg.monitor.tick_timeout =
            secs("DUELOS_MONITOR_TICK_TIMEOUT_SECS", cfg.monitor.tick_timeout);
        cfg
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Listen(self.listen.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.policy
            .validate()
            .map_err(|err| ConfigError::Policy(err.to_string()))?;
        if self.monitor.interval.is_zero() || self.monitor.tick_timeout.is_zero() {
            return Err(ConfigError::Monitor(
                "interval and tick timeout must be > 0".to_string(),
            ));
        }
        if self.monitor.tick_timeout > self.monitor.interval {
            return Err(ConfigError::Monitor(
                "tick timeout must not exceed the sweep interval".to_string(),
            ));
        }
        Ok(())
    }
}
