// Direct messages between two users.
//
// A conversation is every message whose author and receiver are both one
// of the two participants, oldest first. Notes a user sends to themselves
// match that filter too; they only belong to the user's own thread. An open conversation reloads on
// every insert into `messages`; the change channel does not say which
// conversation a message belongs to.

use std::sync::{Arc, Mutex};

use market_shared::errors::{AppError, AppResult, ErrorCode};
use market_shared::store::{Relation, Select, Store};
use market_shared::types::event::{ChangeEvent, ChangeKind};
use market_shared::types::models::{Message, NewMessage, UserId};
use market_shared::types::pagination::SortDirection;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatLine {
    pub message: Message,
    pub mine: bool,
}

pub struct Conversation<S> {
    store: Arc<S>,
    me: UserId,
    other: UserId,
    messages: Mutex<Vec<Message>>,
}

impl<S: Store> Conversation<S> {
    pub fn new(store: Arc<S>, me: UserId, other: UserId) -> Self {
        Self {
            store,
            me,
            other,
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<ChatLine> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| ChatLine {
                message: m.clone(),
                mine: m.author == self.me,
            })
            .collect()
    }

    pub async fn load(&self) -> AppResult<usize> {
        let pair = [self.me.to_string(), self.other.to_string()];
        let query = Select::from(Relation::Messages)
            .one_of("author", pair.clone())
            .one_of("receiver", pair)
            .order("created_at", SortDirection::Asc);
        let mut messages: Vec<Message> = self.store.fetch(query).await?;
        if self.me != self.other {
            messages.retain(|m| m.author != m.receiver);
        }

        let n = messages.len();
        *self.messages.lock().unwrap() = messages;
        debug!(me = %self.me, other = %self.other, messages = n, "conversation loaded");
        Ok(n)
    }

    pub async fn send(&self, text: &str) -> AppResult<()> {
        let content = text.trim();
        if content.is_empty() {
            return Err(AppError::new(ErrorCode::EmptyMessage, "message is empty"));
        }

        let message = NewMessage {
            author: self.me,
            receiver: self.other,
            content: content.to_string(),
        };
        self.store.insert_row(Relation::Messages, &message).await?;
        self.load().await.map(drop)
    }

    /// Reload on every message insert until the channel closes.
    pub async fn watch(&self, mut changes: broadcast::Receiver<ChangeEvent>) {
        loop {
            let reload = match changes.recv().await {
                Ok(event) => event.relation == Relation::Messages && event.kind == ChangeKind::Insert,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "message watcher lagged");
                    true
                }
                Err(RecvError::Closed) => {
                    info!("change channel closed, message watcher stopping");
                    return;
                }
            };
            if reload {
                if let Err(e) = self.load().await {
                    warn!(error = %e, "conversation reload failed");
                }
            }
        }
    }
}
