// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Adapter contracts for duel records and the XP ledger.
//!
//! Every duel mutation goes through [`DuelStore::conditional_update`]: the
//! adapter evaluates a [`Condition`] against the stored record and applies a
//! [`Mutation`] in one atomic step. Both are plain data so a remote adapter can
//! compile them into native condition expressions.

use async_trait::async_trait;

use crate::duel::{CompletionReason, Duel, DuelId, DuelStatus, ElapsedTime, Role};
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    StatusIs(DuelStatus),
    StatusIsNot(DuelStatus),
    /// The participant's elapsed time is not yet recorded (unset or started).
    Unrecorded(Role),
    All(Vec<Condition>),
}

impl Condition {
    pub fn holds(&self, duel: &Duel) -> bool {
        match self {
            Self::StatusIs(status) => duel.status == *status,
            Self::StatusIsNot(status) => duel.status != *status,
            Self::Unrecorded(role) => !duel.elapsed(*role).is_recorded(),
            Self::All(conditions) => conditions.iter().all(|c| c.holds(duel)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Accept {
        at: u64,
    },
    /// Marks the participant started and activates the duel; `started_at` is
    /// only set by the first start.
    Start {
        role: Role,
        at: u64,
    },
    RecordElapsed {
        role: Role,
        elapsed_ms: u64,
    },
    Complete {
        winner: Option<String>,
        reason: CompletionReason,
        xp_awarded: u64,
        at: u64,
    },
}

impl Mutation {
    pub fn apply(&self, duel: &mut Duel) {
        match self {
            Self::Accept { at } => {
                duel.status = DuelStatus::Accepted;
                duel.accepted_at.get_or_insert(*at);
            }
            Self::Start { role, at } => {
                let elapsed = duel.elapsed_mut(*role);
                if *elapsed == ElapsedTime::Unset {
                    *elapsed = ElapsedTime::Started;
                }
                if duel.status.rank() < DuelStatus::Active.rank() {
                    duel.status = DuelStatus::Active;
                }
                duel.started_at.get_or_insert(*at);
            }
            Self::RecordElapsed { role, elapsed_ms } => {
                let elapsed = duel.elapsed_mut(*role);
                if !elapsed.is_recorded() {
                    *elapsed = ElapsedTime::Recorded(*elapsed_ms);
                }
            }
            Self::Complete {
                winner,
                reason,
                xp_awarded,
                at,
            } => {
                duel.status = DuelStatus::Completed;
                duel.winner = winner.clone();
                duel.completion_reason = Some(*reason);
                duel.xp_awarded = Some(*xp_awarded);
                duel.completed_at = Some(*at);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Carries the record as stored after the mutation.
    Applied(Duel),
    /// Carries the record as currently stored.
    PredicateFailed(Duel),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Duel),
    PredicateFailed(Duel),
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuelFilter {
    pub status: Option<DuelStatus>,
    pub participant: Option<String>,
}

impl DuelFilter {
    pub fn status(status: DuelStatus) -> Self {
        Self {
            status: Some(status),
            participant: None,
        }
    }

    pub fn participant(user: impl Into<String>) -> Self {
        Self {
            status: None,
            participant: Some(user.into()),
        }
    }

    pub fn matches(&self, duel: &Duel) -> bool {
        if let Some(status) = self.status {
            if duel.status != status {
                return false;
            }
        }
        match &self.participant {
            Some(user) => duel.is_participant(user),
            None => true,
        }
    }
}

#[async_trait]
pub trait DuelStore: Send + Sync {
    async fn get(&self, id: &DuelId) -> Result<Option<Duel>, StorageError>;

    /// Stores a new record; an existing id is a [`StorageError::Conflict`].
    async fn put(&self, duel: &Duel) -> Result<(), StorageError>;

    async fn conditional_update(
        &self,
        id: &DuelId,
        condition: &Condition,
        mutation: &Mutation,
    ) -> Result<UpdateOutcome, StorageError>;

    async fn delete_if(
        &self,
        id: &DuelId,
        condition: &Condition,
    ) -> Result<DeleteOutcome, StorageError>;

    async fn list(&self, filter: &DuelFilter) -> Result<Vec<Duel>, StorageError>;

    async fn count(&self, filter: &DuelFilter) -> Result<usize, StorageError> {
        Ok(self.list(filter).await?.len())
    }
}

#[async_trait]
pub trait UserLedger: Send + Sync {
    /// Atomically adds `amount` and returns the new total. Creates the entry
    /// on first use.
    async fn increment(&self, username: &str, amount: u64) -> Result<u64, StorageError>;

    async fn xp(&self, username: &str) -> Result<Option<u64>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::ProblemRef;

    fn active_duel() -> Duel {
        let mut duel = Duel::new(
            DuelId::from("d-7"),
            "alice".to_string(),
            "bob".to_string(),
            ProblemRef::slug("lru-cache"),
            10,
        );
        Mutation::Start {
            role: Role::Challenger,
            at: 20,
        }
        .apply(&mut duel);
        duel
    }

    #[test]
    fn start_sets_started_at_once() {
        let mut duel = active_duel();
        assert_eq!(duel.status, DuelStatus::Active);
        assert_eq!(duel.started_at, Some(20));

        Mutation::Start {
            role: Role::Challengee,
            at: 99,
        }
        .apply(&mut duel);
        assert_eq!(duel.started_at, Some(20));
        assert_eq!(duel.challengee_elapsed_ms, ElapsedTime::Started);
    }

    #[test]
    fn start_after_record_keeps_recorded_time() {
        let mut duel = active_duel();
        Mutation::RecordElapsed {
            role: Role::Challenger,
            elapsed_ms: 1_500,
        }
        .apply(&mut duel);
        Mutation::Start {
            role: Role::Challenger,
            at: 30,
        }
        .apply(&mut duel);
        assert_eq!(duel.challenger_elapsed_ms, ElapsedTime::Recorded(1_500));
    }

    #[test]
    fn record_never_overwrites() {
        let mut duel = active_duel();
        for ms in [1_000, 2_000] {
            Mutation::RecordElapsed {
                role: Role::Challenger,
                elapsed_ms: ms,
            }
            .apply(&mut duel);
        }
        assert_eq!(duel.challenger_elapsed_ms, ElapsedTime::Recorded(1_000));
    }

    #[test]
    fn conditions_compose() {
        let mut duel = active_duel();
        let guard = Condition::All(vec![
            Condition::StatusIsNot(DuelStatus::Completed),
            Condition::Unrecorded(Role::Challenger),
        ]);
        assert!(guard.holds(&duel));

        Mutation::RecordElapsed {
            role: Role::Challenger,
            elapsed_ms: 5,
        }
        .apply(&mut duel);
        assert!(!guard.holds(&duel));
        assert!(Condition::Unrecorded(Role::Challengee).holds(&duel));
    }

    #[test]
    fn complete_writes_outcome_fields_together() {
        let mut duel = active_duel();
        Mutation::Complete {
            winner: Some("alice".to_string()),
            reason: CompletionReason::Timeout,
            xp_awarded: 75,
            at: 500,
        }
        .apply(&mut duel);
        assert!(duel.is_completed());
        assert_eq!(duel.winner.as_deref(), Some("alice"));
        assert_eq!(duel.completion_reason, Some(CompletionReason::Timeout));
        assert_eq!(duel.xp_awarded, Some(75));
        assert_eq!(duel.completed_at, Some(500));
        assert!(!Condition::StatusIsNot(DuelStatus::Completed).holds(&duel));
    }

    #[test]
    fn filter_matches_status_and_participant() {
        let duel = active_duel();
        assert!(DuelFilter::status(DuelStatus::Active).matches(&duel));
        assert!(!DuelFilter::status(DuelStatus::Pending).matches(&duel));
        assert!(DuelFilter::participant("bob").matches(&duel));
        assert!(!DuelFilter::participant("carol").matches(&duel));
        assert!(DuelFilter::default().matches(&duel));
    }
}
