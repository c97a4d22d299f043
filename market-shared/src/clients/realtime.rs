// Change-notification channel of the hosted store.
//
// The store speaks the Phoenix channel protocol over a websocket: the
// client joins one topic per relation asking for `postgres_changes`, sends
// a heartbeat every 30 seconds, and receives one frame per row change.
// Each change frame is turned into a `ChangeEvent` and published on the
// local `ChangeBus`. The connection is re-established with a capped
// backoff when it drops. Changes made while the socket was down are not
// replayed, so every rejoin publishes one resync event per relation.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::store::Relation;
use crate::types::event::{ChangeBus, ChangeEvent, ChangeKind};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// A connection that lasted this long starts the backoff over.
const STABLE_UPTIME: Duration = Duration::from_secs(60);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RealtimeClient {
    url: String,
    relations: Vec<Relation>,
    bus: ChangeBus,
}

impl RealtimeClient {
    pub fn new(project_url: &str, api_key: &str, bus: ChangeBus) -> Self {
        Self {
            url: socket_url(project_url, api_key),
            relations: Vec::new(),
            bus,
        }
    }

    pub fn watch(mut self, relation: Relation) -> Self {
        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
        self
    }

    /// Keep the channel open in the background, reconnecting on failure.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = MIN_BACKOFF;
            let mut joined_before = false;
            loop {
                let uptime = match self.connect().await {
                    Ok(socket) => {
                        if joined_before {
                            let n = self.resync();
                            tracing::info!(relations = n, "realtime channel rejoined, resyncing");
                        }
                        joined_before = true;

                        let opened = Instant::now();
                        match self.pump(socket).await {
                            Ok(()) => tracing::info!("realtime channel closed by server"),
                            Err(e) => tracing::warn!(error = %e, "realtime channel dropped"),
                        }
                        Some(opened.elapsed())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "realtime connect failed");
                        None
                    }
                };

                let delay = retry_delay(backoff, uptime);
                tracing::debug!(retry_in = ?delay, "reconnecting realtime channel");
                tokio::time::sleep(delay).await;
                backoff = (delay * 2).min(MAX_BACKOFF);
            }
        })
    }

    /// Publish one change per watched relation, for subscribers to
    /// re-read whatever happened while the socket was down.
    pub fn resync(&self) -> usize {
        for relation in &self.relations {
            self.bus.emit(ChangeEvent::new(*relation, ChangeKind::Update));
        }
        self.relations.len()
    }

    /// Open the socket and join every watched relation.
    async fn connect(&self) -> anyhow::Result<Socket> {
        let (mut socket, _) = connect_async(self.url.as_str()).await?;
        for (i, relation) in self.relations.iter().enumerate() {
            socket.send(Message::Text(join_frame(*relation, i as u64 + 1).to_string().into())).await?;
            tracing::info!(relation = %relation, "joined change channel");
        }
        Ok(socket)
    }

    /// Pump frames until the socket closes.
    async fn pump(&self, socket: Socket) -> anyhow::Result<()> {
        let (mut sink, mut stream) = socket.split();
        let mut next_ref = self.relations.len() as u64 + 1;

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    sink.send(Message::Text(heartbeat_frame(next_ref).to_string().into())).await?;
                    next_ref += 1;
                }
                frame = stream.next() => {
                    let Some(frame) = frame else { return Ok(()) };
                    match frame? {
                        Message::Text(text) => {
                            if let Some(event) = parse_frame(text.as_str()) {
                                self.bus.emit(event);
                            }
                        }
                        Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
                        Message::Close(_) => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }
}

/// Wait before the next attempt: the current backoff, or the minimum when
/// the last connection had been up long enough to count as healthy.
fn retry_delay(backoff: Duration, uptime: Option<Duration>) -> Duration {
    match uptime {
        Some(up) if up >= STABLE_UPTIME => MIN_BACKOFF,
        _ => backoff,
    }
}

pub fn socket_url(project_url: &str, api_key: &str) -> String {
    let base = project_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/realtime/v1/websocket?apikey={api_key}&vsn=1.0.0")
}

pub fn topic(relation: Relation) -> String {
    format!("realtime:{relation}")
}

pub fn join_frame(relation: Relation, msg_ref: u64) -> Value {
    json!({
        "topic": topic(relation),
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [
                    {"event": "*", "schema": "public", "table": relation.as_str()}
                ]
            }
        },
        "ref": msg_ref.to_string(),
    })
}

pub fn heartbeat_frame(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

/// Change carried by a frame, if it is a row-change frame for a known
/// relation. Replies, heartbeats and presence frames yield `None`.
pub fn parse_frame(text: &str) -> Option<ChangeEvent> {
    let frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }

    let data = frame.get("payload")?.get("data")?;
    let relation = data.get("table")?.as_str()?.parse::<Relation>().ok()?;
    let kind = data.get("type")?.as_str()?.parse::<ChangeKind>().ok()?;
    Some(ChangeEvent::new(relation, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_uses_websocket_scheme() {
        assert_eq!(
            socket_url("https://abc.example.co/", "anon"),
            "wss://abc.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert!(socket_url("http://localhost:54321", "k").starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn join_asks_for_every_change_on_the_table() {
        let frame = join_frame(Relation::Posts, 3);
        assert_eq!(frame["topic"], "realtime:posts");
        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["ref"], "3");
        assert_eq!(frame["payload"]["config"]["postgres_changes"][0]["event"], "*");
        assert_eq!(frame["payload"]["config"]["postgres_changes"][0]["table"], "posts");
    }

    #[test]
    fn change_frames_become_events() {
        let text = r#"{
            "topic": "realtime:posts",
            "event": "postgres_changes",
            "payload": {"data": {"table": "posts", "type": "UPDATE", "schema": "public"}, "ids": [1]},
            "ref": null
        }"#;
        let event = parse_frame(text).unwrap();
        assert_eq!(event.relation, Relation::Posts);
        assert_eq!(event.kind, ChangeKind::Update);
    }

    #[test]
    fn other_frames_are_ignored() {
        let reply = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"2"}"#;
        assert!(parse_frame(reply).is_none());
        let unknown_table = r#"{"event":"postgres_changes","payload":{"data":{"table":"audit","type":"INSERT"}}}"#;
        assert!(parse_frame(unknown_table).is_none());
        assert!(parse_frame("not json").is_none());
    }

    #[test]
    fn healthy_connections_start_the_backoff_over() {
        let grown = Duration::from_secs(16);
        assert_eq!(retry_delay(grown, Some(Duration::from_secs(300))), MIN_BACKOFF);
        assert_eq!(retry_delay(grown, Some(Duration::from_secs(2))), grown);
        assert_eq!(retry_delay(grown, None), grown);
    }

    #[test]
    fn resync_emits_once_per_watched_relation() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();
        let client = RealtimeClient::new("http://localhost:54321", "anon", bus)
            .watch(Relation::Posts)
            .watch(Relation::Messages)
            .watch(Relation::Posts);

        assert_eq!(client.resync(), 2);
        assert_eq!(rx.try_recv().unwrap().relation, Relation::Posts);
        assert_eq!(rx.try_recv().unwrap().relation, Relation::Messages);
        assert!(rx.try_recv().is_err());
    }
}
