use async_trait::async_trait;
use sentrion_types::NotificationChannel;

/// A destination a governance escalation payload can be fanned out to.
/// Wire-level protocol I/O (HTTP calls, SMTP, Slack webhooks, ...) is
/// intentionally not implemented here; only the selection and best-effort
/// fan-out logic is.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, channel: &NotificationChannel, payload: &str) -> Result<(), String>;
}

/// A sink that only records attempted sends, used where no real
/// downstream notification channel is wired up.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn send(&self, channel: &NotificationChannel, _payload: &str) -> Result<(), String> {
        tracing::debug!(channel = %channel.label, kind = ?channel.kind, "null sink: dropping notification");
        Ok(())
    }
}

/// What an escalation was raised for, used to filter which channels should
/// receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    Block,
    Review,
    AutoKs,
}

/// Outcome of fanning a payload out across a channel set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOutcome {
    pub sent: u32,
    pub failed: u32,
}

/// Sends `payload` to every active channel subscribed to `event`. Each
/// channel's failure is independent: one bad webhook never blocks
/// delivery to the rest, and no failure propagates to the caller.
pub async fn fan_out(
    sink: &dyn NotificationSink,
    channels: &[NotificationChannel],
    event: DispatchEvent,
    payload: &str,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    for channel in channels {
        if !channel.is_active || !wants(channel, event) {
            continue;
        }
        match sink.send(channel, payload).await {
            Ok(()) => outcome.sent += 1,
            Err(err) => {
                tracing::warn!(channel = %channel.label, error = %err, "notification channel dispatch failed");
                outcome.failed += 1;
            }
        }
    }
    outcome
}

fn wants(channel: &NotificationChannel, event: DispatchEvent) -> bool {
    match event {
        DispatchEvent::Block => channel.on_block,
        DispatchEvent::Review => channel.on_review,
        DispatchEvent::AutoKs => channel.on_auto_ks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_types::ChannelKind;
    use uuid::Uuid;

    fn channel(on_block: bool, on_auto_ks: bool, active: bool) -> NotificationChannel {
        NotificationChannel {
            id: Uuid::new_v4(),
            kind: ChannelKind::Webhook,
            label: "ops".to_string(),
            is_active: active,
            on_block,
            on_review: false,
            on_auto_ks,
            error_count: 0,
            last_sent_at: None,
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl NotificationSink for AlwaysFail {
        async fn send(&self, _channel: &NotificationChannel, _payload: &str) -> Result<(), String> {
            Err("connection refused".to_string())
        }
    }

    #[tokio::test]
    async fn inactive_channels_are_skipped() {
        let channels = vec![channel(true, false, false)];
        let outcome = fan_out(&NullSink, &channels, DispatchEvent::Block, "{}").await;
        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.failed, 0);
    }

    #[tokio::test]
    async fn unsubscribed_event_kind_is_skipped() {
        let channels = vec![channel(false, true, true)];
        let outcome = fan_out(&NullSink, &channels, DispatchEvent::Block, "{}").await;
        assert_eq!(outcome.sent, 0);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_block_others() {
        let channels = vec![channel(true, false, true), channel(true, false, true)];
        let outcome = fan_out(&AlwaysFail, &channels, DispatchEvent::Block, "{}").await;
        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.failed, 2);
    }
}
