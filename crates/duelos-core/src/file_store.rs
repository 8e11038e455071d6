// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! JSON-file adapters.
//!
//! Each adapter keeps its table in memory and rewrites one file after every
//! successful mutation. The write goes to a sibling temp file, is fsynced and
//! renamed over the target, then the directory is fsynced. If persisting
//! fails before the rename the in-memory change is rolled back, so callers
//! never observe a mutation that is not on disk. File work runs on the
//! blocking pool.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::duel::{Duel, DuelId};
use crate::error::StorageError;
use crate::memory::DuelTable;
use crate::store::{
    Condition, DeleteOutcome, DuelFilter, DuelStore, Mutation, UpdateOutcome, UserLedger,
};

const DUELS_FILE: &str = "duels.json";
const LEDGER_FILE: &str = "xp_ledger.json";

/// Runs file work on the blocking pool. Once started it finishes even if
/// the awaiting caller gives up, so memory and disk stay in step.
async fn blocking<T, F>(work: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| StorageError::Unavailable(format!("file store task failed: {err}")))?
}

#[derive(Debug)]
struct DuelFile {
    path: PathBuf,
    table: Mutex<DuelTable>,
}

impl DuelFile {
    fn persist(&self, table: &DuelTable) -> Result<(), StorageError> {
        let payload = serde_json::to_vec_pretty(table)?;
        write_file_atomic_durable(&self.path, &payload)
    }

    fn put(&self, duel: &Duel) -> Result<(), StorageError> {
        let mut table = self.table.lock();
        table.insert_new(duel)?;
        if let Err(err) = self.persist(&table) {
            table.restore(&duel.id, None);
            return Err(err);
        }
        Ok(())
    }

    fn conditional_update(
        &self,
        id: &DuelId,
        condition: &Condition,
        mutation: &Mutation,
    ) -> Result<UpdateOutcome, StorageError> {
        let mut table = self.table.lock();
        let previous = table.get(id);
        let outcome = table.update(id, condition, mutation);
        if matches!(outcome, UpdateOutcome::Applied(_)) {
            if let Err(err) = self.persist(&table) {
                table.restore(id, previous);
                return Err(err);
            }
        }
        Ok(outcome)
    }

    fn delete_if(
        &self,
        id: &DuelId,
        condition: &Condition,
    ) -> Result<DeleteOutcome, StorageError> {
        let mut table = self.table.lock();
        let outcome = table.delete_if(id, condition);
        if let DeleteOutcome::Deleted(removed) = &outcome {
            if let Err(err) = self.persist(&table) {
                table.restore(id, Some(removed.clone()));
                return Err(err);
            }
        }
        Ok(outcome)
    }
}

#[derive(Debug)]
pub struct JsonFileDuelStore {
    file: Arc<DuelFile>,
}

impl JsonFileDuelStore {
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        let path = root.join(DUELS_FILE);
        let table = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice::<DuelTable>(&bytes)?
        } else {
            DuelTable::default()
        };
        Ok(Self {
            file: Arc::new(DuelFile {
                path,
                table: Mutex::new(table),
            }),
        })
    }
}

#[async_trait]
impl DuelStore for JsonFileDuelStore {
    async fn get(&self, id: &DuelId) -> Result<Option<Duel>, StorageError> {
        Ok(self.file.table.lock().get(id))
    }

    async fn put(&self, duel: &Duel) -> Result<(), StorageError> {
        let file = self.file.clone();
        let duel = duel.clone();
        blocking(move || file.put(&duel)).await
    }

    async fn conditional_update(
        &self,
        id: &DuelId,
        condition: &Condition,
        mutation: &Mutation,
    ) -> Result<UpdateOutcome, StorageError> {
        let file = self.file.clone();
        let (id, condition, mutation) = (id.clone(), condition.clone(), mutation.clone());
        blocking(move || file.conditional_update(&id, &condition, &mutation)).await
    }

    async fn delete_if(
        &self,
        id: &DuelId,
        condition: &Condition,
    ) -> Result<DeleteOutcome, StorageError> {
        let file = self.file.clone();
        let (id, condition) = (id.clone(), condition.clone());
        blocking(move || file.delete_if(&id, &condition)).await
    }

    async fn list(&self, filter: &DuelFilter) -> Result<Vec<Duel>, StorageError> {
        Ok(self.file.table.lock().list(filter))
    }

    async fn count(&self, filter: &DuelFilter) -> Result<usize, StorageError> {
        Ok(self.file.table.lock().count(filter))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerFile {
    users: BTreeMap<String, u64>,
}

#[derive(Debug)]
struct LedgerState {
    path: PathBuf,
    ledger: Mutex<LedgerFile>,
}

impl LedgerState {
    fn increment(&self, username: &str, amount: u64) -> Result<u64, StorageError> {
        let mut ledger = self.ledger.lock();
        let previous = ledger.users.get(username).copied();
        let total = previous.unwrap_or(0).saturating_add(amount);
        ledger.users.insert(username.to_string(), total);
        let persisted = serde_json::to_vec_pretty(&*ledger)
            .map_err(StorageError::from)
            .and_then(|payload| write_file_atomic_durable(&self.path, &payload));
        if let Err(err) = persisted {
            match previous {
                Some(value) => ledger.users.insert(username.to_string(), value),
                None => ledger.users.remove(username),
            };
            return Err(err);
        }
        Ok(total)
    }
}

#[derive(Debug)]
pub struct JsonFileUserLedger {
    state: Arc<LedgerState>,
}

impl JsonFileUserLedger {
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        let path = root.join(LEDGER_FILE);
        let ledger = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice::<LedgerFile>(&bytes)?
        } else {
            LedgerFile::default()
        };
        Ok(Self {
            state: Arc::new(LedgerState {
                path,
                ledger: Mutex::new(ledger),
            }),
        })
    }
}

#[async_trait]
impl UserLedger for JsonFileUserLedger {
    async fn increment(&self, username: &str, amount: u64) -> Result<u64, StorageError> {
        let state = self.state.clone();
        let username = username.to_string();
        blocking(move || state.increment(&username, amount)).await
    }

    async fn xp(&self, username: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.state.ledger.lock().users.get(username).copied())
    }
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> Result<(), StorageError> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

pub(crate) fn write_file_atomic_durable(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    write_file_atomic_with(path, bytes, sync_directory)
}

/// Once the rename has happened the new contents are what a reader sees, so
/// a failed directory sync is logged and the write still counts.
fn write_file_atomic_with(
    path: &Path,
    bytes: &[u8],
    sync_dir: fn(&Path) -> Result<(), StorageError>,
) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::Unavailable("path parent missing".to_string()))?;
    let tmp = path.with_extension("tmp");
    let mut f = File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    std::fs::rename(&tmp, path)?;
    if let Err(err) = sync_dir(parent) {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "directory sync failed after rename; keeping the write"
        );
    }
    Ok(())
}
