use async_trait::async_trait;
use tracing::debug;

/// Fire-and-forget event for the push-notification pipeline. Delivery is
/// best-effort; chat correctness never depends on it.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    NewMessage {
        team_id: i64,
        sender_id: i64,
        message_id: i64,
    },
}

#[async_trait]
pub trait NotificationDispatcher: Sync + Send {
    async fn dispatch(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// Default dispatcher: records the event and nothing else. The real push
/// pipeline consumes these events in a separate service.
#[derive(Clone, Default)]
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> anyhow::Result<()> {
        debug!(?event, "notification event dispatched");
        Ok(())
    }
}
