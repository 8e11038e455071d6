// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Winner determination, XP amounts and time thresholds.

use std::time::Duration;

use crate::duel::{CompletionReason, Duel, DuelStatus, Role};
use crate::error::{DuelError, DuelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptPolicy {
    /// Anyone holding the duel id may accept it.
    #[default]
    AnyUser,
    ChallengeeOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuelPolicy {
    pub win_bonus_xp: u64,
    pub participation_xp: u64,
    pub timeout_win_xp: u64,
    pub timeout_participation_xp: u64,
    /// Only one side finished: completed as TIMEOUT once this has passed since start.
    pub one_sided_timeout: Duration,
    /// Nobody finished: completed as EXPIRED once this has passed since start.
    pub max_duel_duration: Duration,
    pub pending_stale_after: Duration,
    /// Must exceed `max_duel_duration` so cleanup never competes with the monitor.
    pub active_stale_after: Duration,
    pub accept_policy: AcceptPolicy,
}

impl Default for DuelPolicy {
    fn default() -> Self {
        Self {
            win_bonus_xp: 50,
            participation_xp: 25,
            timeout_win_xp: 75,
            timeout_participation_xp: 15,
            one_sided_timeout: Duration::from_secs(30 * 60),
            max_duel_duration: Duration::from_secs(2 * 60 * 60),
            pending_stale_after: Duration::from_secs(3 * 60 * 60),
            active_stale_after: Duration::from_secs(3 * 60 * 60),
            accept_policy: AcceptPolicy::AnyUser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub username: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub winner: Option<String>,
    pub reason: CompletionReason,
    pub xp_awarded: u64,
    pub payouts: Vec<Payout>,
}

impl DuelPolicy {
    pub fn validate(&self) -> DuelResult<()> {
        if self.one_sided_timeout.is_zero() || self.max_duel_duration.is_zero() {
            return Err(DuelError::InvalidArgument(
                "duel timeouts must be > 0".to_string(),
            ));
        }
        if self.one_sided_timeout > self.max_duel_duration {
            return Err(DuelError::InvalidArgument(
                "one-sided timeout must not exceed max duel duration".to_string(),
            ));
        }
        if self.pending_stale_after.is_zero() {
            return Err(DuelError::InvalidArgument(
                "pending staleness threshold must be > 0".to_string(),
            ));
        }
        if self.active_stale_after <= self.max_duel_duration {
            return Err(DuelError::InvalidArgument(
                "active staleness threshold must exceed max duel duration".to_string(),
            ));
        }
        Ok(())
    }

    /// Verdict for a duel where both participants have recorded a time.
    pub fn judge_submissions(&self, duel: &Duel) -> Option<Verdict> {
        let challenger_ms = duel.challenger_elapsed_ms.recorded_ms()?;
        let challengee_ms = duel.challengee_elapsed_ms.recorded_ms()?;
        let winner_role = match challenger_ms.cmp(&challengee_ms) {
            std::cmp::Ordering::Less => Role::Challenger,
            std::cmp::Ordering::Greater => Role::Challengee,
            std::cmp::Ordering::Equal => {
                return Some(Verdict {
                    winner: None,
                    reason: CompletionReason::Tie,
                    xp_awarded: self.win_bonus_xp,
                    payouts: payouts([
                        (duel.challenger.as_str(), self.win_bonus_xp),
                        (duel.challengee.as_str(), self.win_bonus_xp),
                    ]),
                });
            }
        };
        let winner = duel.participant(winner_role);
        let loser = duel.participant(winner_role.other());
        Some(Verdict {
            winner: Some(winner.to_string()),
            reason: CompletionReason::Win,
            xp_awarded: self.win_bonus_xp,
            payouts: payouts([(winner, self.win_bonus_xp), (loser, self.participation_xp)]),
        })
    }

    /// Verdict the timeout monitor should force onto an `ACTIVE` duel at
    /// `now_ms`, if any.
    ///
    /// A duel with both times recorded but not yet completed is judged as a
    /// normal finish; that only happens when a submitter stopped between its
    /// two writes.
    pub fn timeout_verdict(&self, duel: &Duel, now_ms: u64) -> Option<Verdict> {
        if duel.status != DuelStatus::Active {
            return None;
        }
        let started_at = duel.started_at?;
        let running_ms = now_ms.saturating_sub(started_at);
        match duel.recorded_roles().as_slice() {
            [_, _] => self.judge_submissions(duel),
            [finisher] if running_ms > duration_ms(self.one_sided_timeout) => {
                let winner = duel.participant(*finisher);
                let straggler = duel.participant(finisher.other());
                Some(Verdict {
                    winner: Some(winner.to_string()),
                    reason: CompletionReason::Timeout,
                    xp_awarded: self.timeout_win_xp,
                    payouts: payouts([
                        (winner, self.timeout_win_xp),
                        (straggler, self.timeout_participation_xp),
                    ]),
                })
            }
            [] if running_ms > duration_ms(self.max_duel_duration) => Some(Verdict {
                winner: None,
                reason: CompletionReason::Expired,
                xp_awarded: 0,
                payouts: Vec::new(),
            }),
            _ => None,
        }
    }
}

fn payouts(entries: [(&str, u64); 2]) -> Vec<Payout> {
    entries
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(username, amount)| Payout {
            username: username.to_string(),
            amount,
        })
        .collect()
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::{DuelId, ElapsedTime, ProblemRef};
    use proptest::prelude::*;

    const MINUTE_MS: u64 = 60_000;

    fn active(challenger: ElapsedTime, challengee: ElapsedTime) -> Duel {
        let mut duel = Duel::new(
            DuelId::from("d-1"),
            "alice".to_string(),
            "bob".to_string(),
            ProblemRef::slug("two-sum"),
            0,
        );
        duel.status = DuelStatus::Active;
        duel.started_at = Some(0);
        duel.challenger_elapsed_ms = challenger;
        duel.challengee_elapsed_ms = challengee;
        duel
    }

    #[test]
    fn faster_submission_wins() {
        let policy = DuelPolicy::default();
        let duel = active(ElapsedTime::Recorded(1_000), ElapsedTime::Recorded(2_000));
        let verdict = policy.judge_submissions(&duel).expect("verdict");
        assert_eq!(verdict.winner.as_deref(), Some("alice"));
        assert_eq!(verdict.reason, CompletionReason::Win);
        assert_eq!(verdict.xp_awarded, 50);
        assert_eq!(
            verdict.payouts,
            vec![
                Payout {
                    username: "alice".to_string(),
                    amount: 50
                },
                Payout {
                    username: "bob".to_string(),
                    amount: 25
                },
            ]
        );
    }

    #[test]
    fn equal_times_tie_with_bonus_for_both() {
        let policy = DuelPolicy::default();
        let duel = active(ElapsedTime::Recorded(1_500), ElapsedTime::Recorded(1_500));
        let verdict = policy.judge_submissions(&duel).expect("verdict");
        assert_eq!(verdict.winner, None);
        assert_eq!(verdict.reason, CompletionReason::Tie);
        assert!(verdict.payouts.iter().all(|p| p.amount == 50));
        assert_eq!(verdict.payouts.len(), 2);
    }

    #[test]
    fn no_verdict_until_both_recorded() {
        let policy = DuelPolicy::default();
        let duel = active(ElapsedTime::Recorded(1_500), ElapsedTime::Started);
        assert!(policy.judge_submissions(&duel).is_none());
    }

    #[test]
    fn one_sided_duel_times_out_after_threshold() {
        let policy = DuelPolicy::default();
        let duel = active(ElapsedTime::Started, ElapsedTime::Recorded(4_000));
        assert!(policy.timeout_verdict(&duel, 30 * MINUTE_MS).is_none());

        let verdict = policy
            .timeout_verdict(&duel, 31 * MINUTE_MS)
            .expect("timeout");
        assert_eq!(verdict.reason, CompletionReason::Timeout);
        assert_eq!(verdict.winner.as_deref(), Some("bob"));
        assert_eq!(verdict.xp_awarded, 75);
        assert_eq!(verdict.payouts[0].username, "bob");
        assert_eq!(verdict.payouts[0].amount, 75);
        assert_eq!(verdict.payouts[1].username, "alice");
        assert_eq!(verdict.payouts[1].amount, 15);
    }

    #[test]
    fn unfinished_duel_expires_after_max_duration() {
        let policy = DuelPolicy::default();
        let duel = active(ElapsedTime::Started, ElapsedTime::Unset);
        assert!(policy.timeout_verdict(&duel, 120 * MINUTE_MS).is_none());
        let verdict = policy
            .timeout_verdict(&duel, 121 * MINUTE_MS)
            .expect("expired");
        assert_eq!(verdict.reason, CompletionReason::Expired);
        assert_eq!(verdict.winner, None);
        assert_eq!(verdict.xp_awarded, 0);
        assert!(verdict.payouts.is_empty());
    }

    #[test]
    fn non_active_duels_are_left_alone() {
        let policy = DuelPolicy::default();
        let mut duel = active(ElapsedTime::Unset, ElapsedTime::Unset);
        duel.status = DuelStatus::Accepted;
        assert!(policy.timeout_verdict(&duel, u64::MAX).is_none());
    }

    #[test]
    fn zero_participation_amounts_are_not_paid() {
        let policy = DuelPolicy {
            participation_xp: 0,
            ..DuelPolicy::default()
        };
        let duel = active(ElapsedTime::Recorded(1), ElapsedTime::Recorded(2));
        let verdict = policy.judge_submissions(&duel).expect("verdict");
        assert_eq!(verdict.payouts.len(), 1);
    }

    #[test]
    fn validate_rejects_overlapping_cleanup_threshold() {
        assert!(DuelPolicy::default().validate().is_ok());
        let policy = DuelPolicy {
            active_stale_after: Duration::from_secs(2 * 60 * 60),
            ..DuelPolicy::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(DuelError::InvalidArgument(_))
        ));
        let policy = DuelPolicy {
            one_sided_timeout: Duration::from_secs(3 * 60 * 60),
            ..DuelPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    proptest! {
        #[test]
        fn winner_has_strictly_smaller_time(a in 1u64..1_000_000, b in 1u64..1_000_000) {
            let policy = DuelPolicy::default();
            let duel = active(ElapsedTime::Recorded(a), ElapsedTime::Recorded(b));
            let verdict = policy.judge_submissions(&duel).expect("verdict");
            match verdict.winner.as_deref() {
                Some("alice") => prop_assert!(a < b),
                Some("bob") => prop_assert!(b < a),
                None => {
                    prop_assert_eq!(a, b);
                    prop_assert_eq!(verdict.reason, CompletionReason::Tie);
                }
                Some(other) => prop_assert!(false, "unexpected winner {}", other),
            }
            let paid: u64 = verdict.payouts.iter().map(|p| p.amount).sum();
            prop_assert!(paid == 75 || paid == 100);
        }
    }
}
