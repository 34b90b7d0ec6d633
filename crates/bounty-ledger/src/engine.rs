use crate::balance::Debit;
use crate::clients::{ClientReferral, ClientTask, RemovedClient};
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::links::{DeepLink, LinkBuilder};
use crate::referral::{ReferralBonus, ReferralReset};
use crate::state::LedgerState;
use crate::stats::LedgerStats;
use crate::storage::{PersistenceError, SaveReport, StateStore};
use crate::tasks::{CompletionStatus, PendingSubmission, Task, TaskCompletion};
use crate::tracking::{EngagementOutcome, TaskEngagement};
use crate::types::{Amount, ClientId, Section, TaskId, TaskKey, UserId, WithdrawalMethod};
use crate::withdrawal::WithdrawalRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// What opening a deep link did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Referral(ReferralBonus),
    ClientEngagement(EngagementOutcome),
    TaskEngagement(EngagementOutcome),
}

/// The ledger and tracking engine.
///
/// All state sits behind one async mutex. A mutating operation clones the
/// state into a draft, applies itself, and swaps the draft in only on
/// success, so a failed operation never leaves a partial change behind.
/// Events go out after the commit, outside the lock.
pub struct RewardEngine {
    config: LedgerConfig,
    state: Mutex<LedgerState>,
    store: Arc<dyn StateStore>,
    persist_lock: Mutex<()>,
    events: EventBus,
    links: LinkBuilder,
    save_timeout: Duration,
}

impl RewardEngine {
    /// Loads state synchronously; the engine does not exist until the load
    /// has finished.
    pub fn open(config: LedgerConfig, store: Arc<dyn StateStore>, save_timeout: Duration) -> Self {
        let (mut state, source) = store.load_with_source();
        state.strip_operator(config.operator_id);

        info!(
            store = %store.describe(),
            source = ?source,
            accounts = state.balances.len(),
            tasks = state.tasks.len(),
            clients = state.clients.len(),
            "🚀 Reward engine ready"
        );

        Self {
            links: LinkBuilder::new(config.links.clone()),
            config,
            state: Mutex::new(state),
            store,
            persist_lock: Mutex::new(()),
            events: EventBus::new(),
            save_timeout,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn links(&self) -> &LinkBuilder {
        &self.links
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn transact<T>(&self, op: impl FnOnce(&mut LedgerState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut draft = state.clone();
        let out = op(&mut draft)?;
        *state = draft;
        Ok(out)
    }

    async fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> T {
        let state = self.state.lock().await;
        f(&state)
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    /// Writes a snapshot through the store. Saves are serialized; the state
    /// lock is only held while cloning.
    pub async fn persist(&self) -> std::result::Result<SaveReport, PersistenceError> {
        let _order = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;
        let store = Arc::clone(&self.store);

        let task = tokio::task::spawn_blocking(move || store.save(&snapshot));
        match tokio::time::timeout(self.save_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PersistenceError::Join(e.to_string())),
            Err(_) => Err(PersistenceError::Timeout(self.save_timeout)),
        }
    }

    /// Persists after a committed change. Failures are logged, never returned:
    /// the in-memory state stays authoritative.
    async fn persist_logged(&self) {
        match self.persist().await {
            Ok(report) => debug!(
                accounts = report.accounts,
                bytes = report.bytes,
                "State persisted"
            ),
            Err(e @ PersistenceError::RestoreFailed { .. }) => {
                error!(error = %e, "🔥 CRITICAL: state file may be lost, serving from memory")
            }
            Err(e) => error!(error = %e, "❌ Failed to persist state"),
        }
    }

    // Balances

    pub async fn credit(&self, user: UserId, amount: f64) -> Result<Amount> {
        let amount = self.config.limits.validate(amount)?;
        let balance = self
            .transact(|s| s.credit(&self.config, user, amount))
            .await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::BalanceCredited {
            user,
            amount,
            balance,
        });
        Ok(balance)
    }

    /// Removes up to `amount`; the balance floors at zero.
    pub async fn debit(&self, user: UserId, amount: f64) -> Result<Debit> {
        let amount = self.config.limits.validate(amount)?;
        let debit = self.transact(|s| Ok(s.debit(user, amount))).await?;
        if !debit.removed.is_zero() {
            self.persist_logged().await;
            self.events.emit(EngineEvent::BalanceDebited {
                user,
                amount: debit.removed,
                balance: debit.balance,
            });
        }
        Ok(debit)
    }

    pub async fn balance(&self, user: UserId) -> Amount {
        self.read(|s| s.balances.get(user)).await
    }

    // Referrals

    pub async fn register_referral(&self, new_user: UserId, referrer: UserId) -> Result<ReferralBonus> {
        let bonus = self
            .transact(|s| s.register_referral(&self.config, new_user, referrer))
            .await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::ReferralRegistered {
            referrer,
            referred: new_user,
            bonus: bonus.bonus,
        });
        Ok(bonus)
    }

    pub async fn reset_referral(&self, user: UserId) -> ReferralReset {
        let mut state = self.state.lock().await;
        let outcome = state.reset_referral(user);
        drop(state);

        if let ReferralReset::Reset { previous_referrer } = outcome {
            self.persist_logged().await;
            self.events.emit(EngineEvent::ReferralReset {
                user,
                previous_referrer,
            });
        }
        outcome
    }

    pub async fn referral_leaderboard(&self) -> Vec<(UserId, usize)> {
        self.read(|s| s.referrals.leaderboard()).await
    }

    // Ban list

    pub async fn ban(&self, user: UserId) -> Result<bool> {
        let added = self.transact(|s| s.ban(&self.config, user)).await?;
        if added {
            self.persist_logged().await;
        }
        Ok(added)
    }

    pub async fn unban(&self, user: UserId) -> bool {
        let removed = self.state.lock().await.unban(user);
        if removed {
            self.persist_logged().await;
        }
        removed
    }

    pub async fn is_banned(&self, user: UserId) -> bool {
        self.read(|s| s.is_banned(user)).await
    }

    // Tasks

    pub async fn add_task(&self, section: Section, text: &str) -> Result<Task> {
        let task = self.transact(|s| s.add_task(section, text)).await?;
        self.persist_logged().await;
        Ok(task)
    }

    pub async fn remove_task(&self, section: Section, index: usize) -> Result<Task> {
        let task = self.transact(|s| s.remove_task(section, index)).await?;
        self.persist_logged().await;
        Ok(task)
    }

    pub async fn tasks(&self, section: Section) -> Vec<Task> {
        self.read(|s| s.tasks.section(section)).await
    }

    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.read(|s| s.tasks.get(id).cloned()).await
    }

    pub async fn complete_task(
        &self,
        user: UserId,
        section: Section,
        index: usize,
    ) -> Result<TaskCompletion> {
        let completion = self
            .transact(|s| s.complete_task(&self.config, user, section, index))
            .await?;
        if completion.status == CompletionStatus::AlreadyDone {
            return Ok(completion);
        }

        self.persist_logged().await;
        let task = &completion.task;
        let event = match completion.reward {
            Some(reward) if completion.auto_credited => EngineEvent::TaskAutoCredited {
                user,
                task: task.key(),
                title: task.title.clone(),
                reward,
            },
            _ => EngineEvent::SubmissionPending {
                user,
                task: task.key(),
                title: task.title.clone(),
                client_task: task.kind.is_client(),
            },
        };
        self.events.emit(event);
        Ok(completion)
    }

    pub async fn approve_submission(&self, user: UserId, task: TaskKey) -> Result<PendingSubmission> {
        let submission = self.transact(|s| s.approve_submission(user, task)).await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::SubmissionApproved { user, task });
        Ok(submission)
    }

    pub async fn reject_submission(&self, user: UserId, task: TaskKey) -> Result<PendingSubmission> {
        let submission = self.transact(|s| s.reject_submission(user, task)).await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::SubmissionRejected { user, task });
        Ok(submission)
    }

    pub async fn pending_submissions(&self) -> Vec<(UserId, PendingSubmission)> {
        self.read(|s| {
            s.tasks
                .pending_submissions()
                .map(|(u, sub)| (u, sub.clone()))
                .collect()
        })
        .await
    }

    // Clients

    pub async fn allocate_client_id(&self) -> ClientId {
        let id = self.state.lock().await.allocate_client_id();
        self.persist_logged().await;
        id
    }

    pub async fn create_client_task(&self, name: &str, urls: &[String]) -> Result<ClientTask> {
        let client = self.transact(|s| s.create_client_task(name, urls)).await?;
        self.persist_logged().await;
        Ok(client)
    }

    pub async fn remove_client_task(&self, client_id: &ClientId) -> Result<RemovedClient> {
        let removed = self.transact(|s| s.remove_client_task(client_id)).await?;
        self.persist_logged().await;
        Ok(removed)
    }

    pub async fn clients(&self) -> Vec<ClientTask> {
        self.read(|s| s.clients.clients().cloned().collect()).await
    }

    pub async fn client_engagements(&self, client_id: &ClientId) -> Vec<ClientReferral> {
        self.read(|s| s.clients.engagements(client_id).to_vec()).await
    }

    /// Persists only when a new engagement was recorded, so the per-user
    /// dedup survives a restart.
    pub async fn record_client_referral(
        &self,
        client_id: &ClientId,
        user: UserId,
        display_name: &str,
        task_type: &str,
    ) -> Result<EngagementOutcome> {
        let (outcome, client_name) = self
            .transact(|s| {
                let outcome = s.record_client_referral(client_id, user, display_name, task_type)?;
                let name = s
                    .clients
                    .get(client_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default();
                Ok((outcome, name))
            })
            .await?;

        if let EngagementOutcome::Recorded { total } = outcome {
            self.persist_logged().await;
            self.events.emit(EngineEvent::ClientEngagement {
                client_id: client_id.clone(),
                client_name,
                user,
                display_name: display_name.to_string(),
                task_type: task_type.to_string(),
                total,
            });
        }
        Ok(outcome)
    }

    pub async fn record_task_engagement(
        &self,
        user: UserId,
        display_name: &str,
        section: Section,
        task: TaskId,
        task_type: &str,
    ) -> Result<EngagementOutcome> {
        let outcome = self
            .transact(|s| s.record_task_engagement(user, display_name, section, task, task_type))
            .await?;

        if let EngagementOutcome::Recorded { total } = outcome {
            self.persist_logged().await;
            self.events.emit(EngineEvent::TaskEngagement {
                section,
                task,
                user,
                display_name: display_name.to_string(),
                task_type: task_type.to_string(),
                total,
            });
        }
        Ok(outcome)
    }

    pub async fn task_engagements(&self, section: Section, task: TaskId) -> Vec<TaskEngagement> {
        self.read(|s| s.tracking.engagements(TaskKey::new(section, task)).to_vec())
            .await
    }

    /// Dispatches a `start` payload to the matching operation.
    pub async fn open_deep_link(
        &self,
        user: UserId,
        display_name: &str,
        payload: &str,
    ) -> Result<LinkOutcome> {
        match payload.parse::<DeepLink>()? {
            DeepLink::Referral { referrer } => self
                .register_referral(user, referrer)
                .await
                .map(LinkOutcome::Referral),
            DeepLink::Client {
                client_id,
                task_type,
            } => self
                .record_client_referral(&client_id, user, display_name, &task_type)
                .await
                .map(LinkOutcome::ClientEngagement),
            DeepLink::Track {
                section,
                task,
                task_type,
            } => self
                .record_task_engagement(user, display_name, section, task, &task_type)
                .await
                .map(LinkOutcome::TaskEngagement),
        }
    }

    pub fn referral_link(&self, user: UserId) -> String {
        self.links.referral(user)
    }

    // Withdrawals

    pub async fn request_withdrawal(
        &self,
        user: UserId,
        method: WithdrawalMethod,
        payout_id: &str,
        amount: f64,
    ) -> Result<WithdrawalRequest> {
        let requested = self.config.limits.validate(amount)?;
        let request = self
            .transact(|s| s.request_withdrawal(&self.config, user, method, payout_id, requested))
            .await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::WithdrawalRequested {
            user,
            method,
            requested: request.requested,
            final_amount: request.final_amount,
        });
        Ok(request)
    }

    pub async fn approve_withdrawal(&self, user: UserId) -> Result<WithdrawalRequest> {
        let request = self.transact(|s| s.approve_withdrawal(user)).await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::WithdrawalApproved {
            user,
            method: request.method,
            final_amount: request.final_amount,
        });
        Ok(request)
    }

    pub async fn reject_withdrawal(&self, user: UserId) -> Result<WithdrawalRequest> {
        let (request, _) = self.transact(|s| s.reject_withdrawal(user)).await?;
        self.persist_logged().await;
        self.events.emit(EngineEvent::WithdrawalRejected {
            user,
            refunded: request.debited,
        });
        Ok(request)
    }

    pub async fn withdrawal(&self, user: UserId) -> Option<WithdrawalRequest> {
        self.read(|s| s.withdrawals.get(user).cloned()).await
    }

    pub async fn pending_withdrawals(&self) -> Vec<(UserId, WithdrawalRequest)> {
        self.read(|s| {
            s.withdrawals
                .pending()
                .map(|(u, r)| (u, r.clone()))
                .collect()
        })
        .await
    }

    pub async fn stats(&self) -> LedgerStats {
        self.read(LedgerStats::collect).await
    }
}
