use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_db::Database;
use courier_db::schema::{self, SchemaLayout};
use courier_types::events::MessageEvent;
use courier_types::models::{ConversationSummary, Message};

use crate::error::MessagingError;
use crate::normalize;
use crate::notifier::Notifier;
use crate::subscription::Subscription;

/// The layout-compatible messaging service.
///
/// The store layout is probed ONCE here and injected into every verb — no
/// call ever re-probes the schema. A store in neither layout is a
/// constructor error, not a silently degraded service.
#[derive(Clone)]
pub struct Messaging {
    db: Arc<Database>,
    layout: SchemaLayout,
    notifier: Notifier,
}

impl Messaging {
    pub fn connect(db: Arc<Database>) -> Result<Self, MessagingError> {
        let layout = db
            .with_conn(|conn| Ok(schema::detect_layout(conn)))?
            .ok_or(MessagingError::SchemaUndetected)?;

        info!("Message store layout: {:?}", layout);

        Ok(Self {
            db,
            layout,
            notifier: Notifier::new(),
        })
    }

    pub fn layout(&self) -> SchemaLayout {
        self.layout
    }

    /// Raw event stream, unfiltered. Verb-level subscribers should prefer
    /// [`Messaging::subscribe_to_messages`].
    pub fn events(&self) -> broadcast::Receiver<MessageEvent> {
        self.notifier.subscribe()
    }

    /// Ordered history between two users, ascending by creation time. An
    /// empty vec means no messages exist — failures are `Err`, never an
    /// empty result.
    pub async fn fetch_messages(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Vec<Message>, MessagingError> {
        let db = self.db.clone();
        let user = user_id.to_string();
        let other = other_user_id.to_string();

        match self.layout {
            SchemaLayout::Direct => {
                let rows =
                    tokio::task::spawn_blocking(move || db.direct_history(&user, &other)).await??;
                Ok(rows.into_iter().map(normalize::from_direct).collect())
            }
            SchemaLayout::Conversation => {
                let rows = tokio::task::spawn_blocking(move || {
                    // No shared conversation yet is a valid empty history
                    match db.oldest_shared_conversation(&user, &other)? {
                        Some(conversation_id) => db.conversation_history(&conversation_id),
                        None => Ok(Vec::new()),
                    }
                })
                .await??;

                Ok(rows
                    .into_iter()
                    .map(|row| normalize::from_conversation(row, user_id, other_user_id))
                    .collect())
            }
        }
    }

    /// Persist a message and publish it to live subscribers. In the
    /// conversation layout the shared conversation is found or created and
    /// the message inserted in one store transaction.
    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<Message, MessagingError> {
        let db = self.db.clone();
        let message_id = Uuid::new_v4().to_string();
        let sender = sender_id.to_string();
        let receiver = receiver_id.to_string();
        let body = content.to_string();

        let (message, conversation_id) = match self.layout {
            SchemaLayout::Direct => {
                let row = tokio::task::spawn_blocking(move || {
                    db.insert_direct_message(&message_id, &sender, &receiver, &body)
                })
                .await??;
                (normalize::from_direct(row), None)
            }
            SchemaLayout::Conversation => {
                let row = tokio::task::spawn_blocking(move || {
                    db.conversation_send(&message_id, &sender, &receiver, &body)
                })
                .await??;
                let conversation_id = row.conversation_id.clone();
                // The write path knows the receiver; no inference needed
                (
                    normalize::from_conversation(row, sender_id, receiver_id),
                    Some(conversation_id),
                )
            }
        };

        debug!(
            "{} -> {}: stored message {}",
            message.sender_id, message.receiver_id, message.id
        );

        self.notifier.publish(MessageEvent::MessageCreated {
            message: message.clone(),
            conversation_id,
        });

        Ok(message)
    }

    /// Flip all unread messages from `sender_id` to `user_id` to read.
    /// Idempotent: a second call flips nothing and publishes nothing.
    /// Returns the number of messages that changed state.
    pub async fn mark_messages_as_read(
        &self,
        user_id: &str,
        sender_id: &str,
    ) -> Result<u64, MessagingError> {
        let db = self.db.clone();
        let layout = self.layout;
        let user = user_id.to_string();
        let sender = sender_id.to_string();

        let updated = tokio::task::spawn_blocking(move || match layout {
            SchemaLayout::Direct => db.mark_direct_read(&user, &sender),
            SchemaLayout::Conversation => db.mark_conversation_read(&user, &sender),
        })
        .await??;

        if updated > 0 {
            self.notifier.publish(MessageEvent::MessagesRead {
                reader_id: user_id.to_string(),
                sender_id: sender_id.to_string(),
                count: updated,
            });
        }

        Ok(updated)
    }

    /// How many messages from `sender_id` the user has not read yet.
    pub async fn unread_count(
        &self,
        user_id: &str,
        sender_id: &str,
    ) -> Result<u64, MessagingError> {
        let db = self.db.clone();
        let layout = self.layout;
        let user = user_id.to_string();
        let sender = sender_id.to_string();

        let count = tokio::task::spawn_blocking(move || match layout {
            SchemaLayout::Direct => db.direct_unread_count(&user, &sender),
            SchemaLayout::Conversation => db.conversation_unread_count(&user, &sender),
        })
        .await??;

        Ok(count)
    }

    /// One summary per messaging partner, most recent activity first.
    pub async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, MessagingError> {
        let db = self.db.clone();
        let layout = self.layout;
        let user = user_id.to_string();

        let summaries = tokio::task::spawn_blocking(move || match layout {
            SchemaLayout::Direct => list_direct(&db, &user),
            SchemaLayout::Conversation => list_conversation(&db, &user),
        })
        .await??;

        Ok(summaries)
    }

    /// Invoke `on_message` for every new message addressed to `user_id`.
    /// Filtering rules are those of [`Messaging::subscribe_to_events`];
    /// read receipts are dropped here.
    pub async fn subscribe_to_messages<F>(
        &self,
        user_id: &str,
        on_message: F,
    ) -> Result<Subscription, MessagingError>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.subscribe_to_events(user_id, move |event| {
            if let MessageEvent::MessageCreated { message, .. } = event {
                on_message(message);
            }
        })
        .await
    }

    /// Invoke `on_event` for everything addressed to `user_id`: new messages
    /// and read receipts for messages the user sent.
    ///
    /// Direct layout filters created messages on the receiver column.
    /// Conversation layout resolves the user's membership set once, here —
    /// conversations joined after subscribing are not picked up — and never
    /// forwards the subscriber's own messages. The event receiver is taken
    /// before the membership lookup, so messages sent while the
    /// subscription is being set up are still delivered.
    pub async fn subscribe_to_events<F>(
        &self,
        user_id: &str,
        on_event: F,
    ) -> Result<Subscription, MessagingError>
    where
        F: Fn(MessageEvent) + Send + Sync + 'static,
    {
        let mut events = self.events();

        let filter = match self.layout {
            SchemaLayout::Direct => EventFilter::Direct {
                user_id: user_id.to_string(),
            },
            SchemaLayout::Conversation => {
                let db = self.db.clone();
                let user = user_id.to_string();
                let members =
                    tokio::task::spawn_blocking(move || db.conversations_for_user(&user))
                        .await??;

                EventFilter::Conversations {
                    user_id: user_id.to_string(),
                    members: members.into_iter().collect(),
                }
            }
        };

        let user = user_id.to_string();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let deliver = match &event {
                            MessageEvent::MessageCreated {
                                message,
                                conversation_id,
                            } => filter.matches(message, conversation_id.as_deref()),
                            // Receipts go to the user whose sent messages
                            // changed state
                            MessageEvent::MessagesRead { .. } => event.addressee() == user,
                        };
                        if deliver {
                            on_event(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Subscription receiver lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

enum EventFilter {
    Direct {
        user_id: String,
    },
    Conversations {
        user_id: String,
        members: HashSet<String>,
    },
}

impl EventFilter {
    fn matches(&self, message: &Message, conversation_id: Option<&str>) -> bool {
        match self {
            Self::Direct { user_id } => message.receiver_id == *user_id,
            // No self-notification, and nothing outside the membership set
            Self::Conversations { user_id, members } => {
                message.sender_id != *user_id
                    && conversation_id.is_some_and(|id| members.contains(id))
            }
        }
    }
}

fn list_direct(db: &Database, user_id: &str) -> anyhow::Result<Vec<ConversationSummary>> {
    let mut summaries = Vec::new();

    for partner in db.direct_partners(user_id)? {
        let last_message = db
            .direct_last_message(user_id, &partner)?
            .map(normalize::from_direct);
        let unread_count = db.direct_unread_count(user_id, &partner)?;

        summaries.push(ConversationSummary {
            other_user_id: partner,
            conversation_id: None,
            last_message,
            unread_count,
        });
    }

    Ok(summaries)
}

fn list_conversation(db: &Database, user_id: &str) -> anyhow::Result<Vec<ConversationSummary>> {
    let mut summaries = Vec::new();

    for conversation_id in db.conversations_for_user(user_id)? {
        let other_user_id = db
            .conversation_participants(&conversation_id)?
            .into_iter()
            .find(|participant| participant != user_id)
            // A self-conversation has one participant: the user
            .unwrap_or_else(|| user_id.to_string());

        let last_message = db
            .conversation_last_message(&conversation_id)?
            .map(|row| normalize::from_conversation(row, user_id, &other_user_id));
        let unread_count = db.conversation_unread_in(&conversation_id, user_id)?;

        summaries.push(ConversationSummary {
            other_user_id,
            conversation_id: Some(conversation_id),
            last_message,
            unread_count,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(sender: &str, receiver: &str) -> Message {
        Message {
            id: "m1".into(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            content: "hello".into(),
            created_at: Utc::now(),
            read: false,
        }
    }

    #[test]
    fn direct_filter_matches_receiver_only() {
        let filter = EventFilter::Direct { user_id: "b".into() };
        assert!(filter.matches(&message("a", "b"), None));
        assert!(!filter.matches(&message("b", "a"), None));
    }

    #[test]
    fn conversation_filter_excludes_own_messages_and_foreign_conversations() {
        let filter = EventFilter::Conversations {
            user_id: "a".into(),
            members: ["c1".to_string()].into_iter().collect(),
        };

        assert!(filter.matches(&message("b", "a"), Some("c1")));
        // Own message, even in a member conversation
        assert!(!filter.matches(&message("a", "b"), Some("c1")));
        // Conversation outside the membership set
        assert!(!filter.matches(&message("b", "a"), Some("c2")));
        // No conversation tag at all
        assert!(!filter.matches(&message("b", "a"), None));
    }
}
