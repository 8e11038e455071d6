// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::duel::{DuelId, DuelStatus};

pub type DuelResult<T> = Result<T, DuelError>;

/// Failures raised by a store or ledger adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage codec failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("storage call timed out: {0}")]
    Timeout(&'static str),

    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DuelError {
    #[error("duel not found: {0}")]
    NotFound(DuelId),

    #[error("user {user} is not part of duel {duel_id}")]
    NotPartOfDuel { duel_id: DuelId, user: String },

    #[error("user {user} may not accept duel {duel_id}; only the challengee can")]
    NotChallengee { duel_id: DuelId, user: String },

    #[error("user {user} already submitted a time for duel {duel_id}")]
    DuplicateSubmission { duel_id: DuelId, user: String },

    #[error("duel already completed: {0}")]
    AlreadyCompleted(DuelId),

    #[error("duel {duel_id} cannot {event} while {from}")]
    InvalidTransition {
        duel_id: DuelId,
        from: DuelStatus,
        event: &'static str,
    },

    #[error("conditional write lost for duel {0}")]
    PredicateFailed(DuelId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DuelError {
    /// Stable snake_case label used for logs and counters.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotPartOfDuel { .. } => "not_part_of_duel",
            Self::NotChallengee { .. } => "not_challengee",
            Self::DuplicateSubmission { .. } => "duplicate_submission",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::PredicateFailed(_) => "predicate_failed",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Storage(StorageError::Timeout(_)) => "storage_timeout",
            Self::Storage(_) => "storage",
        }
    }
}
