// Copyright [2026] [Joseph Verdicchio]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use duelos_core::{
    DuelEngine, DuelStore, JsonFileDuelStore, JsonFileUserLedger, MemoryDuelStore,
    MemoryUserLedger, SystemClock, TimeoutMonitor, UserLedger,
};
use duelos_daemon::config::{DaemonConfig, StoreBackend};
use duelos_daemon::http;
use duelos_daemon::telemetry::Telemetry;

#[derive(Debug, Parser)]
#[command(name = "duelos-daemon")]
#[command(about = "Duel lifecycle and timeout coordination daemon")]
struct Args {
    #[arg(long, env = "DUELOS_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    #[arg(long, env = "DUELOS_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long, env = "DUELOS_STORE", value_enum, default_value_t = StoreBackend::File)]
    store: StoreBackend,

    #[arg(long, default_value = "info")]
    log: String,
}

async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let cfg = DaemonConfig {
        listen: args.listen,
        data_dir: args.data_dir,
        store: args.store,
        ..DaemonConfig::from_env()
    };
    cfg.validate()?;

    let (store, ledger): (Arc<dyn DuelStore>, Arc<dyn UserLedger>) = match cfg.store {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; duels and XP are lost on exit");
            (
                Arc::new(MemoryDuelStore::new()),
                Arc::new(MemoryUserLedger::new()),
            )
        }
        StoreBackend::File => {
            std::fs::create_dir_all(&cfg.data_dir)?;
            (
                Arc::new(JsonFileDuelStore::open(&cfg.data_dir)?),
                Arc::new(JsonFileUserLedger::open(&cfg.data_dir)?),
            )
        }
    };

    let engine = Arc::new(
        DuelEngine::new(store, ledger, Arc::new(SystemClock), cfg.policy.clone())
            .with_store_timeout(cfg.store_call_timeout),
    );
    let telemetry = Arc::new(Telemetry::new());
    let monitor =
        TimeoutMonitor::new(engine.clone(), cfg.monitor).with_observer(telemetry.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(err) => tracing::error!(error = %err, "failed to listen for ctrl-c"),
        }
        let _ = shutdown_tx.send(true);
    });

    let monitor_task = tokio::spawn(monitor.run(shutdown_signal(shutdown_rx.clone())));

    let addr = cfg.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        data_dir = %cfg.data_dir.display(),
        store = ?cfg.store,
        "starting duelos HTTP server"
    );
    let drain_budget = cfg.store_call_timeout.saturating_mul(3);
    let state = http::build_state(cfg, engine.clone(), telemetry);
    http::serve(listener, state, shutdown_signal(shutdown_rx)).await?;

    monitor_task.await?;
    if tokio::time::timeout(drain_budget, engine.wait_for_settlements())
        .await
        .is_err()
    {
        tracing::warn!("exiting with duel settlements still in flight");
    }
    tracing::info!("duelos stopped");
    Ok(())
}
