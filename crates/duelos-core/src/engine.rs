// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The duel state machine.
//!
//! `DuelEngine` holds no duel state of its own. Every transition is a single
//! conditional write against the [`DuelStore`], so any number of engines,
//! request tasks and monitors may act on the same duel concurrently. The
//! `COMPLETED` transition is always guarded by `status != COMPLETED`; whoever
//! loses that write reports the outcome the winner stored and pays nothing.
//!
//! The completion write and its XP payouts run as one spawned settlement
//! task. A caller that is dropped or times out stops waiting for it, but the
//! settlement still finishes, so a committed completion is always paid.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::duel::{
    normalize_user, CompletionReason, Duel, DuelId, DuelStatus, ElapsedTime, ProblemRef, Role,
};
use crate::error::{DuelError, DuelResult, StorageError};
use crate::policy::{duration_ms, AcceptPolicy, DuelPolicy, Payout, Verdict};
use crate::store::{
    Condition, DeleteOutcome, DuelFilter, DuelStore, Mutation, UpdateOutcome, UserLedger,
};

pub const DEFAULT_STORE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub completed: bool,
    /// This call wrote the completion. False when another writer won it.
    pub applied: bool,
    pub winner: Option<String>,
    pub reason: Option<CompletionReason>,
}

impl SubmitOutcome {
    fn waiting() -> Self {
        Self {
            completed: false,
            applied: false,
            winner: None,
            reason: None,
        }
    }

    fn from_completed(duel: &Duel, applied: bool) -> Self {
        Self {
            completed: true,
            applied,
            winner: duel.winner.clone(),
            reason: duel.completion_reason,
        }
    }
}

/// Result of a guarded completion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// This caller wrote the completion and paid out.
    Applied(Duel),
    /// Another writer completed the duel first.
    AlreadyCompleted(Duel),
    /// The duel changed underneath the verdict (a late submission) and is
    /// still open.
    Superseded(Duel),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub pending_deleted: usize,
    pub accepted_deleted: usize,
    pub active_deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CleanupReport {
    pub fn deleted(&self) -> usize {
        self.pending_deleted + self.accepted_deleted + self.active_deleted
    }
}

pub struct DuelEngine {
    store: Arc<dyn DuelStore>,
    ledger: Arc<dyn UserLedger>,
    clock: Arc<dyn Clock>,
    policy: DuelPolicy,
    store_timeout: Duration,
    /// Each settlement holds a read guard until its payouts are done.
    settlements: Arc<RwLock<()>>,
}

impl DuelEngine {
    pub fn new(
        store: Arc<dyn DuelStore>,
        ledger: Arc<dyn UserLedger>,
        clock: Arc<dyn Clock>,
        policy: DuelPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            policy,
            store_timeout: DEFAULT_STORE_CALL_TIMEOUT,
            settlements: Arc::new(RwLock::new(())),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &DuelPolicy {
        &self.policy
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Resolves once every settlement started so far has written its payouts.
    pub async fn wait_for_settlements(&self) {
        let _all = self.settlements.write().await;
    }

    pub async fn create(
        &self,
        challenger: &str,
        challengee: &str,
        problem: ProblemRef,
    ) -> DuelResult<DuelId> {
        let challenger = normalize_user(challenger);
        let challengee = normalize_user(challengee);
        if challenger.is_empty() || challengee.is_empty() {
            return Err(DuelError::InvalidArgument(
                "challenger and challengee are required".to_string(),
            ));
        }
        if challenger == challengee {
            return Err(DuelError::InvalidArgument(
                "a user cannot duel themselves".to_string(),
            ));
        }
        let problem = ProblemRef {
            slug: problem.slug.trim().to_string(),
            ..problem
        };
        if problem.slug.is_empty() {
            return Err(DuelError::InvalidArgument(
                "problem slug is required".to_string(),
            ));
        }

        let duel = Duel::new(
            DuelId::generate(),
            challenger,
            challengee,
            problem,
            self.clock.now_ms(),
        );
        self.bounded("put", self.store.put(&duel)).await?;
        tracing::info!(
            target: "duelos.lifecycle",
            duel_id = %duel.id,
            challenger = %duel.challenger,
            challengee = %duel.challengee,
            problem = %duel.problem.slug,
            "duel created"
        );
        Ok(duel.id)
    }

    pub async fn get_by_id(&self, duel_id: &DuelId) -> DuelResult<Duel> {
        self.bounded("get", self.store.get(duel_id))
            .await?
            .ok_or_else(|| DuelError::NotFound(duel_id.clone()))
    }

    pub async fn accept(&self, duel_id: &DuelId, acting_user: &str) -> DuelResult<()> {
        let user = normalize_user(acting_user);
        let duel = self.get_by_id(duel_id).await?;
        if duel.is_completed() {
            return Err(DuelError::AlreadyCompleted(duel.id));
        }
        if duel.challengee != user {
            match self.policy.accept_policy {
                AcceptPolicy::ChallengeeOnly => {
                    return Err(DuelError::NotChallengee {
                        duel_id: duel.id,
                        user,
                    });
                }
                AcceptPolicy::AnyUser => {
                    tracing::warn!(
                        target: "duelos.lifecycle",
                        duel_id = %duel.id,
                        user = %user,
                        challengee = %duel.challengee,
                        "duel accepted by someone other than the challengee"
                    );
                }
            }
        }
        if duel.status != DuelStatus::Pending {
            return Err(invalid_transition(&duel, "accept"));
        }

        let mutation = Mutation::Accept {
            at: self.clock.now_ms(),
        };
        let outcome = self
            .bounded(
                "conditional_update",
                self.store.conditional_update(
                    duel_id,
                    &Condition::StatusIs(DuelStatus::Pending),
                    &mutation,
                ),
            )
            .await?;
        match outcome {
            UpdateOutcome::Applied(post) => {
                log_transition(&post, DuelStatus::Pending, &user);
                Ok(())
            }
            UpdateOutcome::PredicateFailed(current) if current.is_completed() => {
                Err(DuelError::AlreadyCompleted(current.id))
            }
            UpdateOutcome::PredicateFailed(current) => Err(invalid_transition(&current, "accept")),
            UpdateOutcome::NotFound => Err(DuelError::NotFound(duel_id.clone())),
        }
    }

    /// Marks `acting_user` as started. Repeating it is a no-op.
    pub async fn start(&self, duel_id: &DuelId, acting_user: &str) -> DuelResult<()> {
        let user = normalize_user(acting_user);
        let duel = self.get_by_id(duel_id).await?;
        if duel.is_completed() {
            return Err(DuelError::AlreadyCompleted(duel.id));
        }
        let role = participant_role(&duel, &user)?;
        if duel.status == DuelStatus::Active && duel.elapsed(role) != ElapsedTime::Unset {
            return Ok(());
        }

        let mutation = Mutation::Start {
            role,
            at: self.clock.now_ms(),
        };
        let outcome = self
            .bounded(
                "conditional_update",
                self.store.conditional_update(
                    duel_id,
                    &Condition::StatusIsNot(DuelStatus::Completed),
                    &mutation,
                ),
            )
            .await?;
        match outcome {
            UpdateOutcome::Applied(post) => {
                if duel.status != DuelStatus::Active {
                    log_transition(&post, duel.status, &user);
                }
                Ok(())
            }
            UpdateOutcome::PredicateFailed(current) => Err(DuelError::AlreadyCompleted(current.id)),
            UpdateOutcome::NotFound => Err(DuelError::NotFound(duel_id.clone())),
        }
    }

    pub async fn submit(
        &self,
        duel_id: &DuelId,
        acting_user: &str,
        elapsed_ms: u64,
    ) -> DuelResult<SubmitOutcome> {
        if elapsed_ms == 0 {
            return Err(DuelError::InvalidArgument(
                "elapsed time must be positive".to_string(),
            ));
        }
        let user = normalize_user(acting_user);
        let duel = self.get_by_id(duel_id).await?;
        if duel.is_completed() {
            return Err(DuelError::AlreadyCompleted(duel.id));
        }
        let role = participant_role(&duel, &user)?;
        if duel.elapsed(role).is_recorded() {
            return Err(DuelError::DuplicateSubmission {
                duel_id: duel.id,
                user,
            });
        }
        if duel.status != DuelStatus::Active {
            return Err(invalid_transition(&duel, "submit"));
        }

        let guard = Condition::All(vec![
            Condition::StatusIsNot(DuelStatus::Completed),
            Condition::Unrecorded(role),
        ]);
        let mutation = Mutation::RecordElapsed { role, elapsed_ms };
        let outcome = self
            .bounded(
                "conditional_update",
                self.store.conditional_update(duel_id, &guard, &mutation),
            )
            .await?;
        let post = match outcome {
            UpdateOutcome::Applied(post) => post,
            UpdateOutcome::PredicateFailed(current) if current.is_completed() => {
                return Err(DuelError::AlreadyCompleted(current.id));
            }
            UpdateOutcome::PredicateFailed(current) if current.elapsed(role).is_recorded() => {
                return Err(DuelError::DuplicateSubmission {
                    duel_id: current.id,
                    user,
                });
            }
            UpdateOutcome::PredicateFailed(current) => {
                return Err(DuelError::PredicateFailed(current.id));
            }
            UpdateOutcome::NotFound => return Err(DuelError::NotFound(duel_id.clone())),
        };
        tracing::info!(
            target: "duelos.lifecycle",
            duel_id = %post.id,
            user = %user,
            elapsed_ms,
            "duel submission recorded"
        );

        // Only the write that records the second time sees both fields here.
        let Some(verdict) = self.policy.judge_submissions(&post) else {
            return Ok(SubmitOutcome::waiting());
        };
        match self.complete(&post, verdict, None).await? {
            Completion::Applied(done) => Ok(SubmitOutcome::from_completed(&done, true)),
            Completion::AlreadyCompleted(done) => Ok(SubmitOutcome::from_completed(&done, false)),
            Completion::Superseded(current) => Err(DuelError::PredicateFailed(current.id)),
        }
    }

    pub async fn reject(&self, duel_id: &DuelId) -> DuelResult<()> {
        let outcome = self
            .bounded(
                "delete_if",
                self.store
                    .delete_if(duel_id, &Condition::StatusIs(DuelStatus::Pending)),
            )
            .await?;
        match outcome {
            DeleteOutcome::Deleted(duel) => {
                tracing::info!(
                    target: "duelos.lifecycle",
                    duel_id = %duel.id,
                    from = DuelStatus::Pending.as_str(),
                    "duel rejected"
                );
                Ok(())
            }
            DeleteOutcome::PredicateFailed(current) if current.is_completed() => {
                Err(DuelError::AlreadyCompleted(current.id))
            }
            DeleteOutcome::PredicateFailed(current) => Err(invalid_transition(&current, "reject")),
            DeleteOutcome::NotFound => Err(DuelError::NotFound(duel_id.clone())),
        }
    }

    /// Open duels the user takes part in, oldest first.
    pub async fn duels_for_user(&self, username: &str) -> DuelResult<Vec<Duel>> {
        let user = normalize_user(username);
        let mut duels: Vec<Duel> = self
            .bounded("list", self.store.list(&DuelFilter::participant(user)))
            .await?
            .into_iter()
            .filter(|duel| !duel.is_completed())
            .collect();
        duels.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(duels)
    }

    /// Completed duels the user took part in, most recently completed first.
    pub async fn recent_duels(&self, username: &str, limit: usize) -> DuelResult<Vec<Duel>> {
        let user = normalize_user(username);
        let mut duels: Vec<Duel> = self
            .bounded("list", self.store.list(&DuelFilter::participant(user)))
            .await?
            .into_iter()
            .filter(Duel::is_completed)
            .collect();
        duels.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(a.id.cmp(&b.id)));
        duels.truncate(limit);
        Ok(duels)
    }

    pub async fn xp_of(&self, username: &str) -> DuelResult<u64> {
        let user = normalize_user(username);
        Ok(self
            .bounded("xp", self.ledger.xp(&user))
            .await?
            .unwrap_or(0))
    }

    /// Deletes duels that were never resolved.
    ///
    /// `ACTIVE` duels are only eligible past `active_stale_after`, which the
    /// policy keeps above the monitor's expiry threshold; every delete is
    /// conditional on the status the duel was selected for.
    pub async fn cleanup_stale(&self) -> DuelResult<CleanupReport> {
        let now = self.clock.now_ms();
        let pending_cutoff = now.saturating_sub(duration_ms(self.policy.pending_stale_after));
        let active_cutoff = now.saturating_sub(duration_ms(self.policy.active_stale_after));
        let mut report = CleanupReport::default();

        for status in [DuelStatus::Pending, DuelStatus::Accepted, DuelStatus::Active] {
            let candidates = self
                .bounded("list", self.store.list(&DuelFilter::status(status)))
                .await?;
            for duel in candidates {
                let stale = match status {
                    DuelStatus::Pending => duel.created_at < pending_cutoff,
                    DuelStatus::Accepted => {
                        duel.accepted_at.unwrap_or(duel.created_at) < pending_cutoff
                    }
                    DuelStatus::Active => duel.started_at.is_some_and(|at| at < active_cutoff),
                    DuelStatus::Completed => false,
                };
                if !stale {
                    continue;
                }
                let outcome = self
                    .bounded(
                        "delete_if",
                        self.store.delete_if(&duel.id, &Condition::StatusIs(status)),
                    )
                    .await;
                match outcome {
                    Ok(DeleteOutcome::Deleted(_)) => {
                        tracing::info!(
                            target: "duelos.lifecycle",
                            duel_id = %duel.id,
                            from = status.as_str(),
                            "stale duel deleted"
                        );
                        match status {
                            DuelStatus::Pending => report.pending_deleted += 1,
                            DuelStatus::Accepted => report.accepted_deleted += 1,
                            _ => report.active_deleted += 1,
                        }
                    }
                    Ok(DeleteOutcome::PredicateFailed(_)) | Ok(DeleteOutcome::NotFound) => {
                        report.skipped += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            duel_id = %duel.id,
                            error = %err,
                            "stale duel delete failed"
                        );
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    pub(crate) async fn count(&self, filter: &DuelFilter) -> DuelResult<usize> {
        self.bounded("count", self.store.count(filter)).await
    }

    pub(crate) async fn list(&self, filter: &DuelFilter) -> DuelResult<Vec<Duel>> {
        self.bounded("list", self.store.list(filter)).await
    }

    /// Writes `verdict` onto `snapshot`'s duel if it is still open and, when
    /// `unchanged_since` is given, the elapsed fields have not moved since the
    /// snapshot was taken.
    ///
    /// The caller waits at most one store timeout per write involved. Giving
    /// up early does not cancel the settlement.
    pub(crate) async fn complete(
        &self,
        snapshot: &Duel,
        verdict: Verdict,
        unchanged_since: Option<&[Role]>,
    ) -> DuelResult<Completion> {
        let mut guards = vec![Condition::StatusIsNot(DuelStatus::Completed)];
        if let Some(roles) = unchanged_since {
            guards.extend(roles.iter().map(|role| Condition::Unrecorded(*role)));
        }
        let mutation = Mutation::Complete {
            winner: verdict.winner.clone(),
            reason: verdict.reason,
            xp_awarded: verdict.xp_awarded,
            at: self.clock.now_ms(),
        };
        let writes = u32::try_from(verdict.payouts.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        let budget = self.store_timeout.saturating_mul(writes);

        let in_flight = self.settlements.clone().read_owned().await;
        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let duel_id = snapshot.id.clone();
        let settlement = tokio::spawn(async move {
            let result = settle(
                store.as_ref(),
                ledger.as_ref(),
                &duel_id,
                &Condition::All(guards),
                &mutation,
                &verdict,
            )
            .await;
            drop(in_flight);
            result
        });
        match tokio::time::timeout(budget, settlement).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(DuelError::Storage(StorageError::Unavailable(format!(
                "settlement task failed: {err}"
            )))),
            Err(_) => {
                tracing::warn!(
                    target: "duelos.lifecycle",
                    duel_id = %snapshot.id,
                    budget_ms = budget.as_millis() as u64,
                    "stopped waiting for duel settlement; it continues in the background"
                );
                Err(DuelError::Storage(StorageError::Timeout("complete")))
            }
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> DuelResult<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(DuelError::from),
            Err(_) => Err(DuelError::Storage(StorageError::Timeout(op))),
        }
    }
}

async fn settle(
    store: &dyn DuelStore,
    ledger: &dyn UserLedger,
    duel_id: &DuelId,
    condition: &Condition,
    mutation: &Mutation,
    verdict: &Verdict,
) -> DuelResult<Completion> {
    match store.conditional_update(duel_id, condition, mutation).await? {
        UpdateOutcome::Applied(done) => {
            tracing::info!(
                target: "duelos.lifecycle",
                duel_id = %done.id,
                from = DuelStatus::Active.as_str(),
                to = DuelStatus::Completed.as_str(),
                reason = verdict.reason.as_str(),
                winner = ?done.winner,
                xp_awarded = verdict.xp_awarded,
                "duel completed"
            );
            pay_out(ledger, &done.id, &verdict.payouts).await?;
            Ok(Completion::Applied(done))
        }
        UpdateOutcome::PredicateFailed(current) if current.is_completed() => {
            tracing::debug!(
                target: "duelos.lifecycle",
                duel_id = %current.id,
                reason = ?current.completion_reason,
                "completion lost to an earlier writer"
            );
            Ok(Completion::AlreadyCompleted(current))
        }
        UpdateOutcome::PredicateFailed(current) => Ok(Completion::Superseded(current)),
        UpdateOutcome::NotFound => Err(DuelError::NotFound(duel_id.clone())),
    }
}

/// Attempts every payout once; the first failure is returned after the rest
/// have been tried.
async fn pay_out(
    ledger: &dyn UserLedger,
    duel_id: &DuelId,
    payouts: &[Payout],
) -> DuelResult<()> {
    let mut first_err = None;
    for payout in payouts {
        match ledger.increment(&payout.username, payout.amount).await {
            Ok(total) => tracing::debug!(
                duel_id = %duel_id,
                user = %payout.username,
                amount = payout.amount,
                total,
                "xp awarded"
            ),
            Err(err) => {
                tracing::error!(
                    duel_id = %duel_id,
                    user = %payout.username,
                    amount = payout.amount,
                    error = %err,
                    "xp award failed after duel completion"
                );
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    match first_err {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn participant_role(duel: &Duel, user: &str) -> DuelResult<Role> {
    duel.role_of(user).ok_or_else(|| DuelError::NotPartOfDuel {
        duel_id: duel.id.clone(),
        user: user.to_string(),
    })
}

fn invalid_transition(duel: &Duel, event: &'static str) -> DuelError {
    DuelError::InvalidTransition {
        duel_id: duel.id.clone(),
        from: duel.status,
        event,
    }
}

fn log_transition(post: &Duel, from: DuelStatus, user: &str) {
    tracing::info!(
        target: "duelos.lifecycle",
        duel_id = %post.id,
        from = from.as_str(),
        to = post.status.as_str(),
        user = %user,
        "duel transition"
    );
}
