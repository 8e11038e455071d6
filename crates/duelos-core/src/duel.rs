// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Duel records and the value types they are built from.
//!
//! A [`Duel`] is the unit of storage: adapters persist it whole and mutate it
//! only through [`crate::store::Mutation`]s applied under a condition.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelId(String);

impl DuelId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DuelId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DuelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DuelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelStatus {
    Pending,
    Accepted,
    Active,
    Completed,
}

impl DuelStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }

    /// Position in the forward-only lifecycle.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Accepted => 1,
            Self::Active => 2,
            Self::Completed => 3,
        }
    }
}

impl fmt::Display for DuelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionReason {
    Win,
    Tie,
    Timeout,
    Expired,
}

impl CompletionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Tie => "TIE",
            Self::Timeout => "TIMEOUT",
            Self::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Challenger,
    Challengee,
}

impl Role {
    pub const fn other(self) -> Self {
        match self {
            Self::Challenger => Self::Challengee,
            Self::Challengee => Self::Challenger,
        }
    }
}

/// A participant's solve time.
///
/// Stored as an optional integer: absent is `Unset`, `0` is `Started`, and any
/// positive value is the recorded elapsed milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum ElapsedTime {
    #[default]
    Unset,
    Started,
    Recorded(u64),
}

impl ElapsedTime {
    pub const fn is_recorded(self) -> bool {
        matches!(self, Self::Recorded(_))
    }

    pub const fn recorded_ms(self) -> Option<u64> {
        match self {
            Self::Recorded(ms) => Some(ms),
            _ => None,
        }
    }
}

impl From<Option<u64>> for ElapsedTime {
    fn from(value: Option<u64>) -> Self {
        match value {
            None => Self::Unset,
            Some(0) => Self::Started,
            Some(ms) => Self::Recorded(ms),
        }
    }
}

impl From<ElapsedTime> for Option<u64> {
    fn from(value: ElapsedTime) -> Self {
        match value {
            ElapsedTime::Unset => None,
            ElapsedTime::Started => Some(0),
            ElapsedTime::Recorded(ms) => Some(ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRef {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl ProblemRef {
    pub fn slug(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: None,
            difficulty: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Duel {
    pub id: DuelId,
    pub challenger: String,
    pub challengee: String,
    pub problem: ProblemRef,
    pub status: DuelStatus,
    #[serde(default)]
    pub challenger_elapsed_ms: ElapsedTime,
    #[serde(default)]
    pub challengee_elapsed_ms: ElapsedTime,
    pub created_at: u64,
    #[serde(default)]
    pub accepted_at: Option<u64>,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub completed_at: Option<u64>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub xp_awarded: Option<u64>,
    #[serde(default)]
    pub completion_reason: Option<CompletionReason>,
}

impl Duel {
    /// A fresh `PENDING` duel. Participant ids must already be normalized.
    pub fn new(
        id: DuelId,
        challenger: String,
        challengee: String,
        problem: ProblemRef,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            challenger,
            challengee,
            problem,
            status: DuelStatus::Pending,
            challenger_elapsed_ms: ElapsedTime::Unset,
            challengee_elapsed_ms: ElapsedTime::Unset,
            created_at,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            winner: None,
            xp_awarded: None,
            completion_reason: None,
        }
    }

    pub fn role_of(&self, user: &str) -> Option<Role> {
        if self.challenger == user {
            Some(Role::Challenger)
        } else if self.challengee == user {
            Some(Role::Challengee)
        } else {
            None
        }
    }

    pub fn participant(&self, role: Role) -> &str {
        match role {
            Role::Challenger => &self.challenger,
            Role::Challengee => &self.challengee,
        }
    }

    pub fn is_participant(&self, user: &str) -> bool {
        self.role_of(user).is_some()
    }

    pub fn elapsed(&self, role: Role) -> ElapsedTime {
        match role {
            Role::Challenger => self.challenger_elapsed_ms,
            Role::Challengee => self.challengee_elapsed_ms,
        }
    }

    pub(crate) fn elapsed_mut(&mut self, role: Role) -> &mut ElapsedTime {
        match role {
            Role::Challenger => &mut self.challenger_elapsed_ms,
            Role::Challengee => &mut self.challengee_elapsed_ms,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DuelStatus::Completed
    }

    /// Roles that have a recorded time, challenger first.
    pub fn recorded_roles(&self) -> Vec<Role> {
        [Role::Challenger, Role::Challengee]
            .into_iter()
            .filter(|role| self.elapsed(*role).is_recorded())
            .collect()
    }
}

/// Canonical form of a user id: trimmed and lower-cased.
pub fn normalize_user(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duel() -> Duel {
        Duel::new(
            DuelId::from("d-1"),
            "alice".to_string(),
            "bob".to_string(),
            ProblemRef::slug("two-sum"),
            1_000,
        )
    }

    #[test]
    fn new_duel_is_pending_with_unset_times() {
        let d = duel();
        assert_eq!(d.status, DuelStatus::Pending);
        assert_eq!(d.challenger_elapsed_ms, ElapsedTime::Unset);
        assert_eq!(d.challengee_elapsed_ms, ElapsedTime::Unset);
        assert!(d.winner.is_none());
        assert!(d.recorded_roles().is_empty());
    }

    #[test]
    fn role_lookup_matches_participants_only() {
        let d = duel();
        assert_eq!(d.role_of("alice"), Some(Role::Challenger));
        assert_eq!(d.role_of("bob"), Some(Role::Challengee));
        assert_eq!(d.role_of("carol"), None);
        assert_eq!(d.participant(Role::Challenger.other()), "bob");
    }

    #[test]
    fn elapsed_time_uses_zero_as_started_marker() {
        assert_eq!(ElapsedTime::from(None), ElapsedTime::Unset);
        assert_eq!(ElapsedTime::from(Some(0)), ElapsedTime::Started);
        assert_eq!(ElapsedTime::from(Some(1_250)), ElapsedTime::Recorded(1_250));
        assert!(!ElapsedTime::Started.is_recorded());
        assert_eq!(ElapsedTime::Recorded(9).recorded_ms(), Some(9));
    }

    #[test]
    fn duel_json_uses_stored_attribute_names() {
        let mut d = duel();
        d.challenger_elapsed_ms = ElapsedTime::Started;
        let value = serde_json::to_value(&d).expect("encode");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["challengerElapsedMs"], 0);
        assert!(value["challengeeElapsedMs"].is_null());
        assert_eq!(value["problem"]["slug"], "two-sum");

        let decoded: Duel = serde_json::from_value(value).expect("decode");
        assert_eq!(decoded, d);
    }

    #[test]
    fn status_rank_is_forward_only() {
        assert!(DuelStatus::Pending.rank() < DuelStatus::Accepted.rank());
        assert!(DuelStatus::Accepted.rank() < DuelStatus::Active.rank());
        assert!(DuelStatus::Active.rank() < DuelStatus::Completed.rank());
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_user("  Alice "), "alice");
    }
}
