use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tenantgate_core_types::{GateResult, ProjectId};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channel::{assert_subscription, build_channel, ChannelType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub channel: String,
    pub project_id: ProjectId,
    pub channel_type: ChannelType,
    pub identifier: Option<String>,
    pub subscribed_at: DateTime<Utc>,
}

/// Registry of active subscriptions, keyed by subscription id.
///
/// A single gateway can use [`InMemorySubscriptionStore`]; several gateways
/// need a shared implementation so clears on suspension reach every instance.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn add(&self, subscription: Subscription);
    async fn remove(&self, id: &str) -> Option<Subscription>;
    async fn get(&self, id: &str) -> Option<Subscription>;
    async fn list_by_project(&self, project: &ProjectId) -> Vec<Subscription>;
    /// Removes entries one by one. An add racing the clear may survive it.
    async fn clear_project(&self, project: &ProjectId) -> usize;
    async fn len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    entries: DashMap<String, Subscription>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn add(&self, subscription: Subscription) {
        self.entries.insert(subscription.id.clone(), subscription);
    }

    async fn remove(&self, id: &str) -> Option<Subscription> {
        self.entries.remove(id).map(|(_, subscription)| subscription)
    }

    async fn get(&self, id: &str) -> Option<Subscription> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    async fn list_by_project(&self, project: &ProjectId) -> Vec<Subscription> {
        let mut found: Vec<Subscription> = self
            .entries
            .iter()
            .filter(|entry| entry.value().project_id == *project)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.subscribed_at.cmp(&b.subscribed_at).then(a.id.cmp(&b.id)));
        found
    }

    async fn clear_project(&self, project: &ProjectId) -> usize {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().project_id == *project)
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter()
            .filter(|id| self.entries.remove(id.as_str()).is_some())
            .count()
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Validates channels against the caller before registering them.
pub struct SubscriptionManager {
    store: Arc<dyn SubscriptionStore>,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new(Arc::new(InMemorySubscriptionStore::new()))
    }
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn subscribe(
        &self,
        caller: Option<&ProjectId>,
        channel: &str,
    ) -> GateResult<Subscription> {
        let parsed = assert_subscription(channel, caller)?;
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            project_id: parsed.project_id,
            channel_type: parsed.channel_type,
            identifier: parsed.identifier,
            subscribed_at: Utc::now(),
        };
        self.store.add(subscription.clone()).await;
        info!(
            target: "isolation-guards",
            subscription_id = %subscription.id,
            project_id = %subscription.project_id,
            channel_type = %subscription.channel_type,
            "subscription registered"
        );
        Ok(subscription)
    }

    /// Builds the caller's own channel and subscribes to it.
    pub async fn subscribe_to(
        &self,
        caller: &ProjectId,
        channel_type: ChannelType,
        identifier: Option<&str>,
    ) -> GateResult<Subscription> {
        let channel = build_channel(caller, channel_type, identifier)?;
        self.subscribe(Some(caller), &channel).await
    }

    /// Removes a subscription owned by `caller`. Other projects' ids look absent.
    pub async fn unsubscribe(&self, caller: &ProjectId, id: &str) -> Option<Subscription> {
        let existing = self.store.get(id).await?;
        if existing.project_id != *caller {
            debug!(target: "isolation-guards", subscription_id = id, "unsubscribe of foreign subscription ignored");
            return None;
        }
        self.store.remove(id).await
    }

    pub async fn list(&self, caller: &ProjectId) -> Vec<Subscription> {
        self.store.list_by_project(caller).await
    }

    /// Drops every subscription of a suspended or deleted project.
    pub async fn clear_project(&self, project: &ProjectId) -> usize {
        let removed = self.store.clear_project(project).await;
        info!(target: "isolation-guards", project_id = %project, removed, "project subscriptions cleared");
        removed
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantgate_core_types::GateError;

    #[tokio::test]
    async fn foreign_channels_never_register() {
        let manager = SubscriptionManager::default();
        let owner = ProjectId::new_random();
        let intruder = ProjectId::new_random();
        let channel = build_channel(&owner, ChannelType::Table, Some("users")).unwrap();

        let err = manager.subscribe(Some(&intruder), &channel).await.unwrap_err();
        assert_eq!(err, GateError::CrossProjectChannel);
        assert_eq!(manager.store().len().await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_respects_ownership() {
        let manager = SubscriptionManager::default();
        let owner = ProjectId::new_random();
        let other = ProjectId::new_random();
        let sub = manager
            .subscribe_to(&owner, ChannelType::Broadcast, Some("room-1"))
            .await
            .unwrap();

        assert!(manager.unsubscribe(&other, &sub.id).await.is_none());
        assert_eq!(manager.list(&owner).await.len(), 1);
        assert_eq!(manager.unsubscribe(&owner, &sub.id).await.unwrap().id, sub.id);
        assert!(manager.list(&owner).await.is_empty());
    }

    #[tokio::test]
    async fn clearing_a_project_leaves_others_alone() {
        let manager = SubscriptionManager::default();
        let suspended = ProjectId::new_random();
        let active = ProjectId::new_random();
        for name in ["a", "b", "c"] {
            manager
                .subscribe_to(&suspended, ChannelType::Table, Some(name))
                .await
                .unwrap();
        }
        manager
            .subscribe_to(&active, ChannelType::Presence, None)
            .await
            .unwrap();

        assert_eq!(manager.clear_project(&suspended).await, 3);
        assert!(manager.list(&suspended).await.is_empty());
        assert_eq!(manager.list(&active).await.len(), 1);
    }
}
