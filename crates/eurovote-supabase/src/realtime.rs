//! Realtime change feed over Phoenix channels.
//!
//! Each subscription owns one WebSocket connection and one channel joined with a
//! `postgres_changes` filter. A background task reads frames in order, calls the
//! handler inline, keeps the socket alive with heartbeats and rejoins after a
//! dropped connection. `unsubscribe` cancels the task and waits for it, so the
//! handler is never invoked after it returns. A heartbeat still unanswered when
//! the next one is due counts as a dropped connection.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::Mutex,
    task::JoinHandle,
    time::{interval_at, sleep, timeout, Instant},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use eurovote_core::{
    config::Config,
    domain::MessageEvent,
    errors::Error,
    feed::{ChangeFilter, ChangeKind, MessageHandler, SubscriptionId},
    ports::ChangeFeed,
    schema::{parse_timestamp, MessageRecord},
    Result,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// Full WebSocket url including `apikey` and `vsn` query params.
    pub url: String,
    /// Token presented on join so row-level security applies.
    pub access_token: String,
    pub heartbeat: Duration,
}

impl RealtimeConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            url: cfg.realtime_url(),
            access_token: cfg
                .access_token
                .clone()
                .unwrap_or_else(|| cfg.supabase_anon_key.clone()),
            heartbeat: cfg.realtime_heartbeat,
        }
    }
}

/// One Phoenix protocol frame (JSON serializer v1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

impl Frame {
    fn encode(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Channel identity and per-connection ref counter.
#[derive(Debug)]
struct Channel {
    topic: String,
    filter: ChangeFilter,
    access_token: String,
    next_ref: u64,
    join_ref: String,
}

impl Channel {
    fn new(filter: ChangeFilter, access_token: String) -> Self {
        Self {
            topic: format!("realtime:{}", filter.channel),
            filter,
            access_token,
            next_ref: 1,
            join_ref: String::new(),
        }
    }

    fn take_ref(&mut self) -> String {
        let r = self.next_ref.to_string();
        self.next_ref += 1;
        r
    }

    fn join_frame(&mut self) -> Frame {
        let reference = self.take_ref();
        self.join_ref = reference.clone();
        Frame {
            topic: self.topic.clone(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": self.filter.event.as_str(),
                        "schema": self.filter.schema,
                        "table": self.filter.table,
                    }],
                    "private": false,
                },
                "access_token": self.access_token,
            }),
            reference: Some(reference.clone()),
            join_ref: Some(reference),
        }
    }

    fn leave_frame(&mut self) -> Frame {
        Frame {
            topic: self.topic.clone(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(self.take_ref()),
            join_ref: Some(self.join_ref.clone()),
        }
    }

    fn heartbeat_frame(&mut self) -> Frame {
        Frame {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(self.take_ref()),
            join_ref: None,
        }
    }
}

struct ChannelTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// `ChangeFeed` backed by the Supabase realtime service.
#[derive(Clone)]
pub struct RealtimeFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    cfg: RealtimeConfig,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<SubscriptionId, ChannelTask>>,
}

impl RealtimeFeed {
    pub fn new(cfg: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                cfg,
                next_id: AtomicU64::new(1),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(
        &self,
        filter: ChangeFilter,
        handler: MessageHandler,
    ) -> Result<SubscriptionId> {
        if self.inner.cfg.heartbeat.is_zero() {
            return Err(Error::Config(
                "realtime heartbeat interval must be greater than zero".to_string(),
            ));
        }
        let mut channel = Channel::new(filter, self.inner.cfg.access_token.clone());
        let ws = join(&self.inner.cfg.url, &mut channel).await?;

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_channel(
            self.inner.cfg.clone(),
            channel,
            ws,
            handler,
            cancel.clone(),
        ));

        self.inner
            .tasks
            .lock()
            .await
            .insert(id, ChannelTask { cancel, handle });
        info!(subscription = %id, "realtime channel joined");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let Some(task) = self.inner.tasks.lock().await.remove(&id) else {
            return Ok(());
        };
        task.cancel.cancel();
        task.handle
            .await
            .map_err(|e| Error::Realtime(format!("channel task for {id} failed: {e}")))
    }
}

async fn connect(url: &str) -> Result<WsStream> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::Realtime(format!("connect failed: {e}")))?;
    Ok(ws)
}

/// Connect, send `phx_join` and wait for an `ok` reply.
async fn join(url: &str, channel: &mut Channel) -> Result<WsStream> {
    let mut ws = connect(url).await?;
    let frame = channel.join_frame();
    let join_ref = frame.reference.clone();
    ws.send(frame.encode()?)
        .await
        .map_err(|e| Error::Realtime(format!("join send failed: {e}")))?;

    let reply = timeout(JOIN_TIMEOUT, async {
        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| Error::Realtime(format!("join read failed: {e}")))?;
            let Message::Text(text) = msg else {
                continue;
            };
            let Ok(frame) = serde_json::from_str::<Frame>(text.as_str()) else {
                continue;
            };
            if frame.event == "phx_reply" && frame.reference == join_ref {
                return Ok(frame.payload);
            }
        }
        Err::<Value, Error>(Error::Realtime(
            "connection closed during join".to_string(),
        ))
    })
    .await
    .map_err(|_| Error::Realtime("join timed out".to_string()))??;

    check_join_reply(&reply)?;
    Ok(ws)
}

fn check_join_reply(payload: &Value) -> Result<()> {
    match payload.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        status => Err(Error::Realtime(format!(
            "join rejected ({}): {}",
            status.unwrap_or("no status"),
            payload
                .get("response")
                .map(Value::to_string)
                .unwrap_or_default()
        ))),
    }
}

enum PumpEnd {
    Cancelled,
    Disconnected(String),
}

async fn run_channel(
    cfg: RealtimeConfig,
    mut channel: Channel,
    mut ws: WsStream,
    handler: MessageHandler,
    cancel: CancellationToken,
) {
    loop {
        match pump(&cfg, &mut channel, ws, &handler, &cancel).await {
            PumpEnd::Cancelled => return,
            PumpEnd::Disconnected(reason) => {
                warn!(topic = %channel.topic, %reason, "realtime channel dropped");
            }
        }

        let mut delay = RECONNECT_MIN;
        ws = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
            channel.next_ref = 1;
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                joined = join(&cfg.url, &mut channel) => joined,
            };
            match joined {
                Ok(ws) => {
                    info!(topic = %channel.topic, "realtime channel rejoined");
                    break ws;
                }
                Err(e) => {
                    warn!(topic = %channel.topic, error = %e, ?delay, "rejoin failed");
                    delay = next_backoff(delay);
                }
            }
        };
    }
}

fn next_backoff(delay: Duration) -> Duration {
    (delay * 2).min(RECONNECT_MAX)
}

async fn pump(
    cfg: &RealtimeConfig,
    channel: &mut Channel,
    ws: WsStream,
    handler: &MessageHandler,
    cancel: &CancellationToken,
) -> PumpEnd {
    let (mut write, mut read) = ws.split();
    let mut heartbeat = interval_at(Instant::now() + cfg.heartbeat, cfg.heartbeat);
    let mut pending_heartbeat: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Ok(msg) = channel.leave_frame().encode() {
                    let _ = write.send(msg).await;
                }
                let _ = write.close().await;
                return PumpEnd::Cancelled;
            }
            _ = heartbeat.tick() => {
                if pending_heartbeat.is_some() {
                    return PumpEnd::Disconnected("heartbeat timed out".to_string());
                }
                let frame = channel.heartbeat_frame();
                let sent = match frame.encode() {
                    Ok(msg) => write.send(msg).await.is_ok(),
                    Err(_) => false,
                };
                if !sent {
                    return PumpEnd::Disconnected("heartbeat send failed".to_string());
                }
                pending_heartbeat = frame.reference;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(end) =
                        dispatch(channel, text.as_str(), handler, &mut pending_heartbeat)
                    {
                        return end;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return PumpEnd::Disconnected(format!("closed by server: {frame:?}"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpEnd::Disconnected(e.to_string()),
                None => return PumpEnd::Disconnected("stream ended".to_string()),
            },
        }
    }
}

/// Handle one inbound text frame. Returns `Some` when the channel is gone.
/// A reply to the outstanding heartbeat clears `pending_heartbeat`.
fn dispatch(
    channel: &Channel,
    text: &str,
    handler: &MessageHandler,
    pending_heartbeat: &mut Option<String>,
) -> Option<PumpEnd> {
    let frame = match serde_json::from_str::<Frame>(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(error = %e, "ignoring undecodable realtime frame");
            return None;
        }
    };
    if frame.topic == "phoenix" {
        if frame.event == "phx_reply"
            && pending_heartbeat.is_some()
            && frame.reference == *pending_heartbeat
        {
            *pending_heartbeat = None;
        }
        return None;
    }
    if frame.topic != channel.topic {
        return None;
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            if let Some(ev) = message_event_from_change(&frame.payload, &channel.filter) {
                handler(ev);
            }
            None
        }
        "phx_error" | "phx_close" => Some(PumpEnd::Disconnected(format!(
            "channel {}",
            frame.event
        ))),
        "system" => {
            if frame.payload.get("status").and_then(Value::as_str) == Some("error") {
                warn!(payload = %frame.payload, "realtime system error");
            }
            None
        }
        _ => None,
    }
}

/// Extract the inserted message from a `postgres_changes` payload, if it is a
/// change the filter asked for.
fn message_event_from_change(payload: &Value, filter: &ChangeFilter) -> Option<MessageEvent> {
    let data = payload.get("data")?;

    let kind: ChangeKind = serde_json::from_value(data.get("type")?.clone()).ok()?;
    if !filter.event.accepts(kind) {
        return None;
    }
    if data.get("schema").and_then(Value::as_str) != Some(filter.schema.as_str())
        || data.get("table").and_then(Value::as_str) != Some(filter.table.as_str())
    {
        return None;
    }

    let record = data.get("record")?;
    match serde_json::from_value::<MessageRecord>(record.clone()) {
        Ok(rec) => {
            let mut ev = rec.to_event()?;
            if ev.inserted_at.is_none() {
                ev.inserted_at = data
                    .get("commit_timestamp")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp);
            }
            Some(ev)
        }
        Err(e) => {
            debug!(error = %e, "message record did not decode");
            None
        }
    }
}
