// Change notifications.
//
// The hosted store pushes one event per insert/update/delete on a relation,
// without saying which rows changed. Consumers treat every event as
// "something changed, re-derive state". A `ChangeBus` backed by a
// `tokio::sync::broadcast` channel fans each event out to every subscriber
// (the feed watcher, open conversations).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::store::Relation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(format!("unknown change kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub relation: Relation,
    pub kind: ChangeKind,
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(relation: Relation, kind: ChangeKind) -> Self {
        Self {
            relation,
            kind,
            received_at: Utc::now(),
        }
    }
}

/// Broadcast fan-out of change events. Cheap to clone.
///
/// Subscribers that lag more than the capacity skip events and see
/// `RecvError::Lagged`, which they should treat as one more change.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(cap: usize) -> Self {
        let (tx, _) = broadcast::channel(cap);
        Self { tx }
    }

    /// Publish an event; returns how many subscribers will see it.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        debug!(relation = %event.relation, kind = event.kind.as_str(), "change event emitted");
        // send only fails when nobody is subscribed yet
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_wire_format() {
        assert_eq!(serde_json::to_string(&ChangeKind::Insert).unwrap(), "\"INSERT\"");
        assert_eq!("delete".parse::<ChangeKind>().unwrap(), ChangeKind::Delete);
        assert!("TRUNCATE".parse::<ChangeKind>().is_err());
    }

    #[tokio::test]
    async fn bus_fans_out_to_every_subscriber() {
        let bus = ChangeBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let n = bus.emit(ChangeEvent::new(Relation::Posts, ChangeKind::Update));
        assert_eq!(n, 2);

        assert_eq!(a.recv().await.unwrap().relation, Relation::Posts);
        assert_eq!(b.recv().await.unwrap().kind, ChangeKind::Update);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = ChangeBus::default();
        assert_eq!(bus.emit(ChangeEvent::new(Relation::Likes, ChangeKind::Insert)), 0);
    }
}
