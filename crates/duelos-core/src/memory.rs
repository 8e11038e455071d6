// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::duel::{Duel, DuelId};
use crate::error::StorageError;
use crate::store::{
    Condition, DeleteOutcome, DuelFilter, DuelStore, Mutation, UpdateOutcome, UserLedger,
};

/// Duel records keyed by id. Shared by the in-memory and file adapters; the
/// caller holds the lock for the whole read-evaluate-write step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct DuelTable {
    duels: BTreeMap<DuelId, Duel>,
}

impl DuelTable {
    pub(crate) fn get(&self, id: &DuelId) -> Option<Duel> {
        self.duels.get(id).cloned()
    }

    pub(crate) fn insert_new(&mut self, duel: &Duel) -> Result<(), StorageError> {
        if self.duels.contains_key(&duel.id) {
            return Err(StorageError::Conflict(duel.id.to_string()));
        }
        self.duels.insert(duel.id.clone(), duel.clone());
        Ok(())
    }

    pub(crate) fn restore(&mut self, id: &DuelId, previous: Option<Duel>) {
        match previous {
            Some(duel) => {
                self.duels.insert(id.clone(), duel);
            }
            None => {
                self.duels.remove(id);
            }
        }
    }

    pub(crate) fn update(
        &mut self,
        id: &DuelId,
        condition: &Condition,
        mutation: &Mutation,
    ) -> UpdateOutcome {
        let Some(duel) = self.duels.get_mut(id) else {
            return UpdateOutcome::NotFound;
        };
        if !condition.holds(duel) {
            return UpdateOutcome::PredicateFailed(duel.clone());
        }
        mutation.apply(duel);
        UpdateOutcome::Applied(duel.clone())
    }

    pub(crate) fn delete_if(&mut self, id: &DuelId, condition: &Condition) -> DeleteOutcome {
        match self.duels.get(id) {
            None => DeleteOutcome::NotFound,
            Some(duel) if !condition.holds(duel) => DeleteOutcome::PredicateFailed(duel.clone()),
            Some(_) => match self.duels.remove(id) {
                Some(duel) => DeleteOutcome::Deleted(duel),
                None => DeleteOutcome::NotFound,
            },
        }
    }

    pub(crate) fn list(&self, filter: &DuelFilter) -> Vec<Duel> {
        self.duels
            .values()
            .filter(|duel| filter.matches(duel))
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, filter: &DuelFilter) -> usize {
        self.duels.values().filter(|duel| filter.matches(duel)).count()
    }
}

#[derive(Debug, Default)]
pub struct MemoryDuelStore {
    table: Mutex<DuelTable>,
}

impl MemoryDuelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DuelStore for MemoryDuelStore {
    async fn get(&self, id: &DuelId) -> Result<Option<Duel>, StorageError> {
        Ok(self.table.lock().get(id))
    }

    async fn put(&self, duel: &Duel) -> Result<(), StorageError> {
        self.table.lock().insert_new(duel)
    }

    async fn conditional_update(
        &self,
        id: &DuelId,
        condition: &Condition,
        mutation: &Mutation,
    ) -> Result<UpdateOutcome, StorageError> {
        Ok(self.table.lock().update(id, condition, mutation))
    }

    async fn delete_if(
        &self,
        id: &DuelId,
        condition: &Condition,
    ) -> Result<DeleteOutcome, StorageError> {
        Ok(self.table.lock().delete_if(id, condition))
    }

    async fn list(&self, filter: &DuelFilter) -> Result<Vec<Duel>, StorageError> {
        Ok(self.table.lock().list(filter))
    }

    async fn count(&self, filter: &DuelFilter) -> Result<usize, StorageError> {
        Ok(self.table.lock().count(filter))
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserLedger {
    totals: Mutex<BTreeMap<String, u64>>,
}

impl MemoryUserLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserLedger for MemoryUserLedger {
    async fn increment(&self, username: &str, amount: u64) -> Result<u64, StorageError> {
        let mut totals = self.totals.lock();
        let entry = totals.entry(username.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(*entry)
    }

    async fn xp(&self, username: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.totals.lock().get(username).copied())
    }
}
