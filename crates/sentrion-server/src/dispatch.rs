use sentrion_arbiter::NullSink;
use sentrion_types::NotificationChannel;

/// Notification channel set and sink used by the escalation engine's
/// dispatch fan-out. Individual protocol adapters (email, Slack, WhatsApp,
/// Jira, webhook) are out of scope; the default configuration dispatches
/// to no channels, leaving only the selection/fan-out logic exercised.
#[derive(Default, Clone)]
pub struct StaticNotificationConfig {
    pub channels: Vec<NotificationChannel>,
}

pub fn sink() -> NullSink {
    NullSink
}
