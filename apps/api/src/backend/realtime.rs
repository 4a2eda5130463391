//! Realtime change feed: row-change notifications filtered by table, event kind and
//! one equality predicate. A subscriber that falls behind loses events and is told so
//! with [`StreamItem::Lagged`]; it must then resync from the source of truth.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::BackendError;

const FEED_CAPACITY: usize = 1024;
const REDIS_CHANNEL: &str = "redline:changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
}

impl ChangeEvent {
    pub fn insert<T: Serialize>(table: &str, record: &T) -> Result<Self, BackendError> {
        Ok(Self {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            record: serde_json::to_value(record)?,
        })
    }
}

/// Subscription predicate: `table` and optional `kind` must match, and
/// `record[column]` must equal `value` when compared as a string.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    pub table: String,
    pub kind: Option<ChangeKind>,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn inserts_where(table: &str, column: &str, value: impl ToString) -> Self {
        Self {
            table: table.to_string(),
            kind: Some(ChangeKind::Insert),
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        if self.kind.is_some_and(|k| k != event.kind) {
            return false;
        }
        match event.record.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(other) => other.to_string() == self.value,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped. Any of them may have
    /// matched the filter.
    Lagged(u64),
}

/// Receiving side of a subscription. Dropping it ends the subscription.
pub struct ChangeStream {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl ChangeStream {
    /// Waits for the next matching event or a lag notice. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<StreamItem> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(StreamItem::Event(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Change stream on {} lagged, skipped {skipped} events",
                        self.filter.table
                    );
                    return Some(StreamItem::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn publish(&self, event: ChangeEvent) -> Result<(), BackendError>;

    /// Registers synchronously, so events published after this returns are observed.
    fn subscribe(&self, filter: ChangeFilter) -> ChangeStream;
}

/// In-process feed. Also the local fan-out stage of [`RedisChangeFeed`].
pub struct BroadcastFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl BroadcastFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    fn deliver(&self, event: ChangeEvent) {
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for BroadcastFeed {
    async fn publish(&self, event: ChangeEvent) -> Result<(), BackendError> {
        self.deliver(event);
        Ok(())
    }

    fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        ChangeStream {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// Feed shared by every API instance through Redis pub/sub. Events are published to
/// Redis; a background task relays everything on the channel into a local
/// [`BroadcastFeed`] that subscribers read from.
pub struct RedisChangeFeed {
    publisher: redis::aio::MultiplexedConnection,
    local: Arc<BroadcastFeed>,
    relay: JoinHandle<()>,
}

impl RedisChangeFeed {
    pub async fn connect(client: &redis::Client) -> Result<Self, BackendError> {
        let publisher = client.get_multiplexed_tokio_connection().await?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(REDIS_CHANNEL).await?;

        let local = Arc::new(BroadcastFeed::new());
        let fanout = local.clone();
        let relay = tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Dropping unreadable change message: {e}");
                        continue;
                    }
                };
                match serde_json::from_str::<ChangeEvent>(&payload) {
                    Ok(event) => {
                        debug!("Relaying {:?} on {}", event.kind, event.table);
                        fanout.deliver(event);
                    }
                    Err(e) => warn!("Dropping malformed change message: {e}"),
                }
            }
            warn!("Redis change subscription closed");
        });

        Ok(Self {
            publisher,
            local,
            relay,
        })
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> Result<(), BackendError> {
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(REDIS_CHANNEL, payload).await?;
        Ok(())
    }

    fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        self.local.subscribe(filter)
    }
}

impl Drop for RedisChangeFeed {
    fn drop(&mut self) {
        self.relay.abort();
    }
}
