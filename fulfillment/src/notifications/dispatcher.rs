use super::storage::NotificationStorage;
use super::templates::{self, RenderedMessage};
use super::transport::Transport;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::services::ProfileStore;
use crate::utils::{Clock, call_with_retry};
use futures::future::join_all;
use shared::models::{
    Channel, ChannelOutcome, Contact, DeliveryStatus, Notification, NotificationCategory,
    NotificationEvent, NotificationKind, NotificationPreferences,
};
use std::sync::Arc;
use std::time::Duration;

/// Feed page size when the caller does not pass one
pub const DEFAULT_FEED_LIMIT: usize = 50;

/// One transport per channel
#[derive(Clone)]
pub struct Transports {
    pub email: Arc<dyn Transport>,
    pub sms: Arc<dyn Transport>,
    pub push: Arc<dyn Transport>,
}

impl Transports {
    fn for_channel(&self, channel: Channel) -> &Arc<dyn Transport> {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Push => &self.push,
        }
    }
}

/// Which flag changes [`NotificationDispatcher::mark`] applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    Read,
    /// Clicking also marks the notification read
    Clicked,
    Dismissed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    storage: NotificationStorage,
    profiles: Arc<dyn ProfileStore>,
    transports: Transports,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn category_enabled(prefs: &NotificationPreferences, category: NotificationCategory) -> bool {
    match category {
        NotificationCategory::Order | NotificationCategory::Payment => prefs.order_updates,
        NotificationCategory::Rewards => prefs.rewards,
        NotificationCategory::Promotional => prefs.promotions,
    }
}

fn channel_enabled(prefs: &NotificationPreferences, channel: Channel) -> bool {
    match channel {
        Channel::Email => prefs.email,
        Channel::Sms => prefs.sms,
        Channel::Push => prefs.push,
    }
}

fn endpoint(contact: &Contact, channel: Channel) -> Option<&str> {
    let value = match channel {
        Channel::Email => contact.email.as_deref(),
        Channel::Sms => contact.phone.as_deref(),
        Channel::Push => contact.push_token.as_deref(),
    };
    value.filter(|s| !s.is_empty())
}

fn skipped(channel: Channel, reason: &str) -> ChannelOutcome {
    ChannelOutcome {
        channel,
        status: DeliveryStatus::Skipped,
        error: Some(reason.to_string()),
    }
}

impl NotificationDispatcher {
    pub fn new(
        storage: NotificationStorage,
        profiles: Arc<dyn ProfileStore>,
        transports: Transports,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            profiles,
            transports,
            clock,
            timeout,
        }
    }

    /// Deliver an event on every eligible channel and record it in the feed
    ///
    /// Channels are attempted concurrently and independently. The in-app
    /// record is written whatever the channel outcomes; only a storage
    /// failure is returned as an error.
    pub async fn dispatch(&self, event: &NotificationEvent) -> FulfillmentResult<Notification> {
        let prefs = self
            .profiles
            .preferences(&event.user_id)
            .await
            .unwrap_or_default();
        let contact = self.profiles.contact(&event.user_id).await.unwrap_or_default();
        let wanted = category_enabled(&prefs, event.kind.category());

        let attempts = Channel::ALL.into_iter().map(|channel| {
            let prefs = &prefs;
            let contact = &contact;
            async move {
                if !wanted || !channel_enabled(prefs, channel) {
                    return skipped(channel, "disabled by preference");
                }
                let Some(recipient) = endpoint(contact, channel) else {
                    return skipped(channel, "no contact endpoint");
                };
                let message = templates::render_for_channel(event.kind, channel, &contact.name, &event.data);
                self.send(channel, recipient, &message, event).await
            }
        });
        let channels = join_all(attempts).await;

        let (title, body) = templates::render(event.kind, &event.data);
        let notification = Notification {
            notification_id: uuid::Uuid::new_v4().to_string(),
            user_id: event.user_id.clone(),
            kind: event.kind,
            title,
            body,
            order_id: event.order_id.clone(),
            channels,
            read: false,
            clicked: false,
            dismissed: false,
            created_at: self.clock.now_millis(),
        };
        self.storage.insert(&notification)?;

        let sent = notification
            .channels
            .iter()
            .filter(|c| c.status == DeliveryStatus::Sent)
            .count();
        tracing::debug!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            sent,
            "Notification dispatched"
        );
        Ok(notification)
    }

    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        message: &RenderedMessage,
        event: &NotificationEvent,
    ) -> ChannelOutcome {
        let transport = self.transports.for_channel(channel);
        match call_with_retry("transport.send", self.timeout, || transport.send(recipient, message)).await {
            Ok(()) => ChannelOutcome {
                channel,
                status: DeliveryStatus::Sent,
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    user_id = %event.user_id,
                    kind = ?event.kind,
                    error = %e,
                    "Channel delivery failed"
                );
                ChannelOutcome {
                    channel,
                    status: DeliveryStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Send a promotion to every user who opted in
    ///
    /// Users without the promotions opt-in get nothing, not even a feed
    /// record. Returns the records written.
    pub async fn dispatch_promotion(
        &self,
        user_ids: &[String],
        title: &str,
        body: &str,
    ) -> FulfillmentResult<Vec<Notification>> {
        let mut sent = Vec::new();
        for user_id in user_ids {
            let prefs = self.profiles.preferences(user_id).await.unwrap_or_default();
            if !prefs.promotions {
                continue;
            }
            let event = NotificationEvent::new(NotificationKind::Promotion, user_id.as_str())
                .with("title", title)
                .with("body", body);
            sent.push(self.dispatch(&event).await?);
        }
        tracing::info!(targeted = user_ids.len(), sent = sent.len(), "Promotion dispatched");
        Ok(sent)
    }

    // ========================================================================
    // In-app feed
    // ========================================================================

    pub fn list_for_user(&self, user_id: &str, limit: Option<usize>) -> FulfillmentResult<Vec<Notification>> {
        Ok(self
            .storage
            .list_for_user(user_id, limit.unwrap_or(DEFAULT_FEED_LIMIT))?)
    }

    /// Neither read nor dismissed
    pub fn unread_count(&self, user_id: &str) -> FulfillmentResult<usize> {
        Ok(self.storage.unread_count(user_id)?)
    }

    /// Set a feed flag on one of the user's notifications
    ///
    /// Another user's notification is reported as not found.
    pub fn mark(&self, notification_id: &str, user_id: &str, action: FeedAction) -> FulfillmentResult<Notification> {
        let not_found = || FulfillmentError::NotificationNotFound(notification_id.to_string());
        let owned = self
            .storage
            .get(notification_id)?
            .is_some_and(|n| n.user_id == user_id);
        if !owned {
            return Err(not_found());
        }
        self.storage
            .update(notification_id, |n| match action {
                FeedAction::Read => n.read = true,
                FeedAction::Clicked => {
                    n.clicked = true;
                    n.read = true;
                }
                FeedAction::Dismissed => n.dismissed = true,
            })?
            .ok_or_else(not_found)
    }

    pub fn mark_read(&self, notification_id: &str, user_id: &str) -> FulfillmentResult<Notification> {
        self.mark(notification_id, user_id, FeedAction::Read)
    }

    pub fn mark_clicked(&self, notification_id: &str, user_id: &str) -> FulfillmentResult<Notification> {
        self.mark(notification_id, user_id, FeedAction::Clicked)
    }

    pub fn mark_dismissed(&self, notification_id: &str, user_id: &str) -> FulfillmentResult<Notification> {
        self.mark(notification_id, user_id, FeedAction::Dismissed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::InMemoryProfileStore;
    use crate::testing::RecordingTransport;
    use crate::utils::ManualClock;

    struct Fixture {
        dispatcher: NotificationDispatcher,
        profiles: Arc<InMemoryProfileStore>,
        email: Arc<RecordingTransport>,
        sms: Arc<RecordingTransport>,
        push: Arc<RecordingTransport>,
    }

    fn fixture() -> Fixture {
        let storage = NotificationStorage::new(db::open_in_memory().unwrap()).unwrap();
        let profiles = Arc::new(InMemoryProfileStore::new());
        let email = Arc::new(RecordingTransport::new());
        let sms = Arc::new(RecordingTransport::new());
        let push = Arc::new(RecordingTransport::new());
        let dispatcher = NotificationDispatcher::new(
            storage,
            profiles.clone(),
            Transports {
                email: email.clone(),
                sms: sms.clone(),
                push: push.clone(),
            },
            Arc::new(ManualClock::new(1_000)),
            Duration::from_secs(1),
        );
        profiles.set_contact(
            "cust-1",
            Contact {
                name: "Ana".to_string(),
                email: Some("ana@example.com".to_string()),
                phone: Some("+34600000000".to_string()),
                push_token: Some("tok-1".to_string()),
            },
        );
        Fixture {
            dispatcher,
            profiles,
            email,
            sms,
            push,
        }
    }

    fn ready_event() -> NotificationEvent {
        NotificationEvent::new(NotificationKind::OrderReady, "cust-1").for_order("o-1")
    }

    fn status_of(n: &Notification, channel: Channel) -> DeliveryStatus {
        n.channels
            .iter()
            .find(|c| c.channel == channel)
            .map(|c| c.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_preferences() {
        let f = fixture();
        let n = f.dispatcher.dispatch(&ready_event()).await.unwrap();
        assert_eq!(n.title, "Order ready");
        assert_eq!(status_of(&n, Channel::Email), DeliveryStatus::Sent);
        // SMS is opt-in
        assert_eq!(status_of(&n, Channel::Sms), DeliveryStatus::Skipped);
        assert_eq!(status_of(&n, Channel::Push), DeliveryStatus::Sent);

        assert_eq!(f.email.sent().len(), 1);
        assert_eq!(f.email.sent()[0].0, "ana@example.com");
        assert!(f.sms.sent().is_empty());
        assert_eq!(f.push.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_is_isolated_and_recorded() {
        let f = fixture();
        f.email.set_failing(true);
        let n = f.dispatcher.dispatch(&ready_event()).await.unwrap();
        assert_eq!(status_of(&n, Channel::Email), DeliveryStatus::Failed);
        assert_eq!(status_of(&n, Channel::Push), DeliveryStatus::Sent);

        let feed = f.dispatcher.list_for_user("cust-1", None).unwrap();
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn test_record_written_when_everything_is_off() {
        let f = fixture();
        f.profiles.set_preferences(
            "cust-1",
            NotificationPreferences {
                order_updates: false,
                ..NotificationPreferences::default()
            },
        );
        let n = f.dispatcher.dispatch(&ready_event()).await.unwrap();
        assert!(n.channels.iter().all(|c| c.status == DeliveryStatus::Skipped));
        assert_eq!(f.dispatcher.unread_count("cust-1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_contact_skips_channel() {
        let f = fixture();
        let event = NotificationEvent::new(NotificationKind::OrderPlaced, "stranger");
        let n = f.dispatcher.dispatch(&event).await.unwrap();
        assert!(n.channels.iter().all(|c| c.status == DeliveryStatus::Skipped));
        assert!(f.email.sent().is_empty());
    }

    #[tokio::test]
    async fn test_promotions_require_opt_in() {
        let f = fixture();
        let users = vec!["cust-1".to_string(), "cust-2".to_string()];
        let sent = f
            .dispatcher
            .dispatch_promotion(&users, "2x1 Tuesday", "Two burgers for one")
            .await
            .unwrap();
        assert!(sent.is_empty());

        f.profiles.set_preferences(
            "cust-1",
            NotificationPreferences {
                promotions: true,
                ..NotificationPreferences::default()
            },
        );
        let sent = f
            .dispatcher
            .dispatch_promotion(&users, "2x1 Tuesday", "Two burgers for one")
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "2x1 Tuesday");
        assert_eq!(sent[0].body, "Two burgers for one");
    }

    #[tokio::test]
    async fn test_feed_flags() {
        let f = fixture();
        let first = f.dispatcher.dispatch(&ready_event()).await.unwrap();
        let second = f.dispatcher.dispatch(&ready_event()).await.unwrap();

        let feed = f.dispatcher.list_for_user("cust-1", None).unwrap();
        assert_eq!(feed[0].notification_id, second.notification_id);
        assert_eq!(f.dispatcher.list_for_user("cust-1", Some(1)).unwrap().len(), 1);
        assert_eq!(f.dispatcher.unread_count("cust-1").unwrap(), 2);

        let clicked = f
            .dispatcher
            .mark_clicked(&first.notification_id, "cust-1")
            .unwrap();
        assert!(clicked.clicked && clicked.read);
        f.dispatcher
            .mark_dismissed(&second.notification_id, "cust-1")
            .unwrap();
        assert_eq!(f.dispatcher.unread_count("cust-1").unwrap(), 0);

        let err = f
            .dispatcher
            .mark_read(&first.notification_id, "cust-2")
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotificationNotFound(_)));
    }
}
