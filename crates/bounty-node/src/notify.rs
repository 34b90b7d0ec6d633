use async_trait::async_trait;
use bounty_ledger::{EngineEvent, UserId};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delivers engine events to users. Failures are logged by the pump and
/// never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: UserId, event: &EngineEvent) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Writes every notification to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: UserId, event: &EngineEvent) -> anyhow::Result<()> {
        info!(
            recipient = %recipient,
            event = event.event_type(),
            "📨 {}",
            event.summary()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Spawns the task that fans bus events out to the notifier. Ends when the
/// bus is dropped.
pub fn spawn_pump(
    mut events: broadcast::Receiver<EngineEvent>,
    notifier: Arc<dyn Notifier>,
    operator: UserId,
) -> JoinHandle<()> {
    info!(notifier = notifier.name(), "📨 Notification pump started");
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "⚠️ Notification pump lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            for recipient in event.recipients(operator) {
                if let Err(e) = notifier.notify(recipient, &event).await {
                    warn!(
                        recipient = %recipient,
                        event = event.event_type(),
                        error = %e,
                        "❌ Notification delivery failed"
                    );
                }
            }
        }
        debug!("🛑 Notification pump stopped");
    })
}
