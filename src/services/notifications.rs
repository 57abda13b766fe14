use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// How long a toast stays on screen unless the sender asks otherwise.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(3000);
const CHANNEL_CAPACITY: usize = 32;

/// Visual tone of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Positive feedback such as a finished board.
    Success,
    /// Degraded but recoverable situation.
    Warning,
    /// Failed user action.
    Danger,
}

/// User-facing message for whichever UI is listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Text shown to the player.
    pub message: String,
    /// Tone.
    pub kind: NotificationKind,
    /// Display time.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl Notification {
    /// Notification shown for [`DEFAULT_DURATION`].
    pub fn new(message: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            message: message.into(),
            kind,
            duration: DEFAULT_DURATION,
        }
    }

    /// Override the display time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Broadcast hub fanning notifications out to every subscriber.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    /// Construct a hub backed by a Tokio broadcast channel.
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a subscriber that receives subsequent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Send a notification, ignoring the absence of listeners.
    pub fn notify(&self, notification: Notification) {
        debug!(kind = ?notification.kind, message = %notification.message, "notification");
        let _ = self.sender.send(notification);
    }

    /// Shorthand for a [`NotificationKind::Success`] toast.
    pub fn success(&self, message: impl Into<String>) {
        self.notify(Notification::new(message, NotificationKind::Success));
    }

    /// Shorthand for a [`NotificationKind::Warning`] toast.
    pub fn warning(&self, message: impl Into<String>) {
        self.notify(Notification::new(message, NotificationKind::Warning));
    }

    /// Shorthand for a [`NotificationKind::Danger`] toast.
    pub fn danger(&self, message: impl Into<String>) {
        self.notify(Notification::new(message, NotificationKind::Danger));
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();

        hub.success("Done!");
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::Success);
        assert_eq!(received.duration, DEFAULT_DURATION);
    }

    #[test]
    fn notify_without_subscribers_is_silent() {
        NotificationHub::new().danger("nobody listens");
    }

    #[test]
    fn serializes_duration_as_millis() {
        let json = serde_json::to_value(
            Notification::new("hi", NotificationKind::Warning)
                .with_duration(Duration::from_millis(1500)),
        )
        .unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["kind"], "warning");
    }
}
