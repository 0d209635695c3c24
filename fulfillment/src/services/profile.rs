//! Identity/profile store (read-only)

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::models::{Contact, NotificationPreferences};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Stored preferences, or `None` for an unknown user
    async fn preferences(&self, user_id: &str) -> Option<NotificationPreferences>;

    async fn contact(&self, user_id: &str) -> Option<Contact>;

    /// User who referred `user_id`, if any
    async fn referrer_of(&self, user_id: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
struct Profile {
    preferences: NotificationPreferences,
    contact: Contact,
    referred_by: Option<String>,
}

/// Profile store held in memory; used by tests and single-node setups
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_contact(&self, user_id: &str, contact: Contact) {
        self.profiles
            .write()
            .entry(user_id.to_string())
            .or_default()
            .contact = contact;
    }

    pub fn set_preferences(&self, user_id: &str, preferences: NotificationPreferences) {
        self.profiles
            .write()
            .entry(user_id.to_string())
            .or_default()
            .preferences = preferences;
    }

    pub fn set_referrer(&self, user_id: &str, referrer_id: &str) {
        self.profiles
            .write()
            .entry(user_id.to_string())
            .or_default()
            .referred_by = Some(referrer_id.to_string());
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn preferences(&self, user_id: &str) -> Option<NotificationPreferences> {
        self.profiles.read().get(user_id).map(|p| p.preferences)
    }

    async fn contact(&self, user_id: &str) -> Option<Contact> {
        self.profiles.read().get(user_id).map(|p| p.contact.clone())
    }

    async fn referrer_of(&self, user_id: &str) -> Option<String> {
        self.profiles
            .read()
            .get(user_id)
            .and_then(|p| p.referred_by.clone())
    }
}

/// Profile store with every lookup bounded by a timeout
///
/// A lookup that does not answer in time reads as an unknown user.
pub struct TimeoutProfileStore {
    inner: Arc<dyn ProfileStore>,
    timeout: Duration,
}

impl std::fmt::Debug for TimeoutProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutProfileStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TimeoutProfileStore {
    pub fn new(inner: Arc<dyn ProfileStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, lookup: &'static str, user_id: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Option<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    lookup,
                    user_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Profile lookup timed out, using defaults"
                );
                None
            }
        }
    }
}

#[async_trait]
impl ProfileStore for TimeoutProfileStore {
    async fn preferences(&self, user_id: &str) -> Option<NotificationPreferences> {
        self.bounded("preferences", user_id, self.inner.preferences(user_id))
            .await
    }

    async fn contact(&self, user_id: &str) -> Option<Contact> {
        self.bounded("contact", user_id, self.inner.contact(user_id)).await
    }

    async fn referrer_of(&self, user_id: &str) -> Option<String> {
        self.bounded("referrer", user_id, self.inner.referrer_of(user_id))
            .await
    }
}
