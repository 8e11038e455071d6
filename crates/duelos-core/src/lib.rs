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

//! duelos-core
//!
//! Lifecycle and timeout coordination for head-to-head coding duels.
//!
//! This crate implements:
//! - The duel state machine (`PENDING -> ACCEPTED -> ACTIVE -> COMPLETED`)
//! - Winner determination and XP payout policy
//! - A periodic timeout monitor for abandoned or one-sided duels
//! - Storage adapter contracts with in-memory and JSON-file implementations
//!
//! Every state change is a conditional write, so request handlers and any
//! number of monitors can act on the same duel without double-completing it
//! or paying XP twice.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod clock;
pub mod duel;
pub mod engine;
pub mod error;
pub mod file_store;
pub mod memory;
pub mod monitor;
pub mod policy;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use duel::{
    CompletionReason, Difficulty, Duel, DuelId, DuelStatus, ElapsedTime, ProblemRef, Role,
};
pub use engine::{CleanupReport, Completion, DuelEngine, SubmitOutcome};
pub use error::{DuelError, DuelResult, StorageError};
pub use file_store::{JsonFileDuelStore, JsonFileUserLedger};
pub use memory::{MemoryDuelStore, MemoryUserLedger};
pub use monitor::{MonitorConfig, SweepObserver, SweepReport, TimeoutMonitor};
pub use policy::{AcceptPolicy, DuelPolicy, Payout, Verdict};
pub use store::{
    Condition, DeleteOutcome, DuelFilter, DuelStore, Mutation, UpdateOutcome, UserLedger,
};
