//! Engine event bus.
//!
//! Events are emitted after a successful commit and fanned out over a tokio
//! broadcast channel. Consumers (notification delivery, audit logs) that
//! fall behind lose the oldest events; nothing is retried.

use crate::types::{Amount, ClientId, Section, TaskId, TaskKey, UserId, WithdrawalMethod};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    ReferralRegistered {
        referrer: UserId,
        referred: UserId,
        bonus: Amount,
    },
    ReferralReset {
        user: UserId,
        previous_referrer: UserId,
    },
    BalanceCredited {
        user: UserId,
        amount: Amount,
        balance: Amount,
    },
    BalanceDebited {
        user: UserId,
        amount: Amount,
        balance: Amount,
    },
    TaskAutoCredited {
        user: UserId,
        task: TaskKey,
        title: String,
        reward: Amount,
    },
    SubmissionPending {
        user: UserId,
        task: TaskKey,
        title: String,
        client_task: bool,
    },
    SubmissionApproved {
        user: UserId,
        task: TaskKey,
    },
    SubmissionRejected {
        user: UserId,
        task: TaskKey,
    },
    ClientEngagement {
        client_id: ClientId,
        client_name: String,
        user: UserId,
        display_name: String,
        task_type: String,
        total: usize,
    },
    TaskEngagement {
        section: Section,
        task: TaskId,
        user: UserId,
        display_name: String,
        task_type: String,
        total: usize,
    },
    WithdrawalRequested {
        user: UserId,
        method: WithdrawalMethod,
        requested: Amount,
        final_amount: Amount,
    },
    WithdrawalApproved {
        user: UserId,
        method: WithdrawalMethod,
        final_amount: Amount,
    },
    WithdrawalRejected {
        user: UserId,
        refunded: Amount,
    },
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::ReferralRegistered { .. } => "referral.registered",
            EngineEvent::ReferralReset { .. } => "referral.reset",
            EngineEvent::BalanceCredited { .. } => "balance.credited",
            EngineEvent::BalanceDebited { .. } => "balance.debited",
            EngineEvent::TaskAutoCredited { .. } => "task.auto_credited",
            EngineEvent::SubmissionPending { .. } => "submission.pending",
            EngineEvent::SubmissionApproved { .. } => "submission.approved",
            EngineEvent::SubmissionRejected { .. } => "submission.rejected",
            EngineEvent::ClientEngagement { .. } => "client.engagement",
            EngineEvent::TaskEngagement { .. } => "task.engagement",
            EngineEvent::WithdrawalRequested { .. } => "withdrawal.requested",
            EngineEvent::WithdrawalApproved { .. } => "withdrawal.approved",
            EngineEvent::WithdrawalRejected { .. } => "withdrawal.rejected",
        }
    }

    /// Users who should hear about this event.
    pub fn recipients(&self, operator: UserId) -> Vec<UserId> {
        match self {
            EngineEvent::ReferralRegistered {
                referrer, referred, ..
            } => vec![*referrer, *referred],
            EngineEvent::WithdrawalRequested { user, .. } => vec![*user, operator],
            EngineEvent::SubmissionPending { .. }
            | EngineEvent::ClientEngagement { .. }
            | EngineEvent::TaskEngagement { .. } => vec![operator],
            EngineEvent::ReferralReset { user, .. }
            | EngineEvent::BalanceCredited { user, .. }
            | EngineEvent::BalanceDebited { user, .. }
            | EngineEvent::TaskAutoCredited { user, .. }
            | EngineEvent::SubmissionApproved { user, .. }
            | EngineEvent::SubmissionRejected { user, .. }
            | EngineEvent::WithdrawalApproved { user, .. }
            | EngineEvent::WithdrawalRejected { user, .. } => vec![*user],
        }
    }

    /// One-line plain-text description.
    pub fn summary(&self) -> String {
        match self {
            EngineEvent::ReferralRegistered {
                referrer,
                referred,
                bonus,
            } => format!("Referral: {referred} joined via {referrer}, {bonus} each"),
            EngineEvent::ReferralReset {
                user,
                previous_referrer,
            } => format!("Referral of {user} (by {previous_referrer}) reset"),
            EngineEvent::BalanceCredited {
                user,
                amount,
                balance,
            } => format!("{amount} added to {user}, balance {balance}"),
            EngineEvent::BalanceDebited {
                user,
                amount,
                balance,
            } => format!("{amount} removed from {user}, balance {balance}"),
            EngineEvent::TaskAutoCredited {
                user,
                title,
                reward,
                ..
            } => format!("{user} completed \"{title}\", {reward} credited"),
            EngineEvent::SubmissionPending {
                user,
                task,
                title,
                client_task,
            } => format!(
                "{user} submitted \"{title}\" ({task}) for review{}",
                if *client_task { ", client task" } else { "" }
            ),
            EngineEvent::SubmissionApproved { user, task } => {
                format!("Submission {task} by {user} approved")
            }
            EngineEvent::SubmissionRejected { user, task } => {
                format!("Submission {task} by {user} rejected")
            }
            EngineEvent::ClientEngagement {
                client_id,
                client_name,
                user,
                display_name,
                task_type,
                total,
            } => format!(
                "Client {client_name} ({client_id}): {display_name} ({user}) opened {task_type}, {total} total"
            ),
            EngineEvent::TaskEngagement {
                section,
                task,
                user,
                display_name,
                task_type,
                total,
            } => format!(
                "Task {section}:{task}: {display_name} ({user}) opened {task_type}, {total} total"
            ),
            EngineEvent::WithdrawalRequested {
                user,
                method,
                requested,
                final_amount,
            } => format!(
                "{user} requested {requested} via {}, {final_amount} after fees",
                method.display_name()
            ),
            EngineEvent::WithdrawalApproved {
                user,
                method,
                final_amount,
            } => format!(
                "Withdrawal of {final_amount} via {} for {user} approved",
                method.display_name()
            ),
            EngineEvent::WithdrawalRejected { user, refunded } => {
                format!("Withdrawal for {user} rejected, {refunded} refunded")
            }
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(subscribers) => debug!(event_type, subscribers, "Event emitted"),
            Err(_) => debug!(event_type, "Event emitted but no subscribers listening"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        // Dropped silently without subscribers.
        bus.emit(EngineEvent::SubmissionApproved {
            user: UserId::new(1),
            task: TaskKey::new(Section::WatchAds, TaskId::new(1)),
        });

        let mut rx = bus.subscribe();
        bus.emit(EngineEvent::WithdrawalRejected {
            user: UserId::new(9),
            refunded: Amount::from_units(50),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "withdrawal.rejected");
        assert_eq!(event.summary(), "Withdrawal for 9 rejected, 50.00 refunded");
    }

    #[test]
    fn test_recipients() {
        let operator = UserId::new(1);
        let referral = EngineEvent::ReferralRegistered {
            referrer: UserId::new(200),
            referred: UserId::new(100),
            bonus: Amount::from_units(5),
        };
        assert_eq!(
            referral.recipients(operator),
            vec![UserId::new(200), UserId::new(100)]
        );

        let engagement = EngineEvent::TaskEngagement {
            section: Section::Promotional,
            task: TaskId::new(2),
            user: UserId::new(5),
            display_name: "Asha".into(),
            task_type: "general".into(),
            total: 1,
        };
        assert_eq!(engagement.recipients(operator), vec![operator]);
    }

    #[test]
    fn test_event_json_shape() {
        let event = EngineEvent::BalanceCredited {
            user: UserId::new(3),
            amount: Amount::from_cents(150),
            balance: Amount::from_cents(150),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BalanceCredited");
        assert_eq!(json["data"]["amount"], 150);
    }
}
