//! Broadcast messages and the per-user notification inbox.

use std::collections::HashMap;

use pmboard_state::{
    AuditAction, AuditEntity, AuditRecord, Message, MessagePriority, Notification, StateStore, User,
    new_id, unix_now,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::accounts::UserRef;
use crate::error::{AccessError, AccessResult};
use crate::page::{Page, PageRequest};
use crate::policy::Actor;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageInput {
    pub title: Option<String>,
    pub body: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub priority: MessagePriority,
    pub created_at: u64,
    pub sender: Option<UserRef>,
}

/// Message header shown next to a notification.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub title: String,
    pub priority: MessagePriority,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub read: bool,
    pub created_at: u64,
    pub message: Option<MessageSummary>,
}

fn message_view(message: Message, senders: &HashMap<String, User>) -> MessageView {
    let sender = senders.get(&message.sender_id).map(UserRef::from);
    MessageView {
        id: message.id,
        title: message.title,
        body: message.body,
        priority: message.priority,
        created_at: message.created_at,
        sender,
    }
}

#[derive(Clone)]
pub struct MessageService {
    store: StateStore,
}

impl MessageService {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    fn users_by_id(&self) -> AccessResult<HashMap<String, User>> {
        Ok(self
            .store
            .list_users()?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect())
    }

    /// Post a message and drop a notification into every user's inbox,
    /// the sender's included.
    pub fn post(&self, actor: &Actor, input: &MessageInput) -> AccessResult<MessageView> {
        let title = input.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return Err(AccessError::validation("title is required."));
        }
        let priority = input
            .priority
            .as_deref()
            .and_then(|p| MessagePriority::parse(p.trim()))
            .unwrap_or_default();
        let now = unix_now();

        let (message, delivered) = self.store.write(|txn| -> AccessResult<(Message, usize)> {
            let message = Message {
                id: new_id()?,
                sender_id: actor.user_id.clone(),
                title: title.to_string(),
                body: input.body.as_deref().map(str::trim).unwrap_or_default().to_string(),
                priority,
                seq: txn.next_seq()?,
                created_at: now,
            };
            txn.put_message(&message)?;
            txn.append_audit(
                AuditRecord::new(&actor.user_id, AuditEntity::Message, Some(&message.id), AuditAction::Create)
                    .new_value(json!({ "title": message.title, "priority": message.priority }).to_string()),
            )?;

            let users = txn.list_users()?;
            for user in &users {
                txn.put_notification(&Notification {
                    id: new_id()?,
                    user_id: user.id.clone(),
                    message_id: message.id.clone(),
                    read: false,
                    seq: txn.next_seq()?,
                    created_at: now,
                })?;
            }
            Ok((message, users.len()))
        })?;

        info!(id = %message.id, delivered, "message posted");
        Ok(message_view(message, &self.users_by_id()?))
    }

    /// Newest first, optionally restricted to one priority. An unknown
    /// priority value means no filter.
    pub fn list(&self, req: PageRequest, priority: Option<&str>) -> AccessResult<Page<MessageView>> {
        let priority = priority.and_then(|p| MessagePriority::parse(p.trim()));
        let messages: Vec<Message> = self
            .store
            .list_messages()?
            .into_iter()
            .filter(|m| priority.is_none_or(|p| m.priority == p))
            .collect();
        let users = self.users_by_id()?;
        Ok(Page::slice(messages, req).map(|m| message_view(m, &users)))
    }

    pub fn get(&self, id: &str) -> AccessResult<MessageView> {
        let message = self
            .store
            .get_message(id)?
            .ok_or_else(|| AccessError::not_found("Not found"))?;
        Ok(message_view(message, &self.users_by_id()?))
    }

    /// The actor's inbox, newest first.
    pub fn notifications(&self, actor: &Actor) -> AccessResult<Vec<NotificationView>> {
        let list = self.store.list_notifications_for_user(&actor.user_id)?;
        let mut out = Vec::with_capacity(list.len());
        for n in list {
            let message = self.store.get_message(&n.message_id)?.map(|m| MessageSummary {
                id: m.id,
                title: m.title,
                priority: m.priority,
                created_at: m.created_at,
            });
            out.push(NotificationView {
                id: n.id,
                read: n.read,
                created_at: n.created_at,
                message,
            });
        }
        Ok(out)
    }

    /// Mark one of the actor's own notifications read. Someone else's
    /// notification is indistinguishable from a missing one.
    pub fn mark_read(&self, actor: &Actor, id: &str) -> AccessResult<()> {
        self.store.write(|txn| -> AccessResult<()> {
            let mut n = txn
                .get_notification(&actor.user_id, id)?
                .ok_or_else(|| AccessError::not_found("Not found"))?;
            if !n.read {
                n.read = true;
                txn.put_notification(&n)?;
            }
            Ok(())
        })
    }
}
