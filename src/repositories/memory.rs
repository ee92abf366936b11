//! In-process implementations of the collaborator interfaces. They back the
//! test suites; none of them talk to the network.

use crate::common::context::Context;
use crate::entities::messages::{ChatMessage, HistoryCursor};
use crate::entities::users::User;
use crate::repositories::memberships::MembershipOracle;
use crate::repositories::messages::MessageStore;
use crate::repositories::notifications::{NotificationDispatcher, NotificationEvent};
use crate::repositories::users::UserInfoProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

pub struct InMemoryMessageStore {
    messages: RwLock<BTreeMap<i64, ChatMessage>>,
    receipts: RwLock<HashMap<(i64, i64), DateTime<Utc>>>,
    next_id: AtomicI64,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(BTreeMap::new()),
            receipts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Pins the id the next created message receives.
    pub fn set_next_message_id(&self, id: i64) {
        self.next_id.store(id, Ordering::SeqCst);
    }

    pub async fn receipt_count(&self) -> usize {
        self.receipts.read().await.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(
        &self,
        team_id: i64,
        sender_id: i64,
        content: &str,
        reply_to_id: Option<i64>,
        sent_at: DateTime<Utc>,
    ) -> anyhow::Result<ChatMessage> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = ChatMessage {
            id,
            team_id,
            sender_id,
            content: content.to_owned(),
            reply_to_id,
            sent_at,
            edited_at: None,
            deleted_at: None,
        };
        self.messages.write().await.insert(id, message.clone());
        Ok(message)
    }

    async fn get_message_by_id(&self, message_id: i64) -> anyhow::Result<Option<ChatMessage>> {
        Ok(self.messages.read().await.get(&message_id).cloned())
    }

    async fn update_message_text(
        &self,
        message_id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.get_mut(&message_id) {
            message.content = content.to_owned();
            message.edited_at = Some(edited_at);
        }
        Ok(())
    }

    async fn mark_deleted(
        &self,
        message_id: i64,
        deleted_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.get_mut(&message_id) {
            if message.deleted_at.is_none() {
                message.deleted_at = Some(deleted_at);
            }
        }
        Ok(())
    }

    async fn get_messages_by_team(
        &self,
        team_id: i64,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let mut page: Vec<ChatMessage> = messages
            .values()
            .filter(|m| m.team_id == team_id && m.deleted_at.is_none())
            .filter(|m| match before {
                Some(cursor) => (m.sent_at, m.id) < (cursor.sent_at, cursor.id),
                None => true,
            })
            .cloned()
            .collect();
        page.sort_by(|a, b| (b.sent_at, b.id).cmp(&(a.sent_at, a.id)));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn upsert_read_receipts(
        &self,
        reader_id: i64,
        message_ids: &[i64],
        read_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut receipts = self.receipts.write().await;
        for &message_id in message_ids {
            receipts.entry((message_id, reader_id)).or_insert(read_at);
        }
        Ok(())
    }

    async fn get_read_status(
        &self,
        reader_id: i64,
        message_ids: &[i64],
    ) -> anyhow::Result<HashSet<i64>> {
        let receipts = self.receipts.read().await;
        Ok(message_ids
            .iter()
            .copied()
            .filter(|&message_id| receipts.contains_key(&(message_id, reader_id)))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryMembershipOracle {
    members: RwLock<HashSet<(i64, i64)>>,
}

impl InMemoryMembershipOracle {
    pub async fn add_member(&self, user_id: i64, team_id: i64) {
        self.members.write().await.insert((user_id, team_id));
    }
}

#[async_trait]
impl MembershipOracle for InMemoryMembershipOracle {
    async fn is_member(&self, user_id: i64, team_id: i64) -> anyhow::Result<bool> {
        Ok(self.members.read().await.contains(&(user_id, team_id)))
    }
}

#[derive(Default)]
pub struct InMemoryUserInfoProvider {
    users: RwLock<HashMap<i64, User>>,
}

impl InMemoryUserInfoProvider {
    pub async fn add_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserInfoProvider for InMemoryUserInfoProvider {
    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingNotificationDispatcher {
    events: RwLock<Vec<NotificationEvent>>,
}

impl RecordingNotificationDispatcher {
    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotificationDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> anyhow::Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// [`Context`] over the in-memory collaborators.
#[derive(Default, Clone)]
pub struct MemoryContext {
    pub store: Arc<InMemoryMessageStore>,
    pub memberships: Arc<InMemoryMembershipOracle>,
    pub users: Arc<InMemoryUserInfoProvider>,
    pub notifications: Arc<RecordingNotificationDispatcher>,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user in the directory and as a member of `team_id`.
    pub async fn join_team(&self, user: User, team_id: i64) {
        self.memberships.add_member(user.id, team_id).await;
        self.users.add_user(user).await;
    }
}

impl Context for MemoryContext {
    fn store(&self) -> &dyn MessageStore {
        self.store.as_ref()
    }

    fn memberships(&self) -> &dyn MembershipOracle {
        self.memberships.as_ref()
    }

    fn users(&self) -> &dyn UserInfoProvider {
        self.users.as_ref()
    }

    fn notifications(&self) -> &dyn NotificationDispatcher {
        self.notifications.as_ref()
    }
}
