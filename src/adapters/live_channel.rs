use axum::response::sse::{Event, Sse};
use futures::Stream;
use prometheus::IntGauge;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const CONNECTION_BUFFER: usize = 16;

/// Message pushed to live-update clients.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    Reload { generation: u64 },
    Ping,
}

impl LiveMessage {
    pub fn name(&self) -> &'static str {
        match self {
            LiveMessage::Reload { .. } => "reload",
            LiveMessage::Ping => "ping",
        }
    }

    pub fn to_event(&self) -> Event {
        let data = match self {
            LiveMessage::Reload { generation } => json!({ "generation": generation }),
            LiveMessage::Ping => json!({}),
        };
        Event::default().event(self.name()).data(data.to_string())
    }
}

struct Connections {
    senders: HashMap<u64, mpsc::Sender<LiveMessage>>,
    closed: bool,
}

/// Open server-sent-event connections.
pub struct LiveChannel {
    connections: Mutex<Connections>,
    next_id: AtomicU64,
    heartbeat: CancellationToken,
    gauge: Option<IntGauge>,
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self {
            connections: Mutex::new(Connections {
                senders: HashMap::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            heartbeat: CancellationToken::new(),
            gauge: None,
        }
    }
}

impl LiveChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the open connection count into `gauge`.
    pub fn with_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(0);
        self.gauge = Some(gauge);
        self
    }

    /// Register a connection. After [`close_all`](Self::close_all) the
    /// returned stream ends immediately.
    pub fn connect(&self) -> (u64, ReceiverStream<LiveMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let mut connections = self.lock();
        if !connections.closed {
            connections.senders.insert(id, tx);
            debug!("Live connection {} opened", id);
        }
        self.record(&connections);
        (id, ReceiverStream::new(rx))
    }

    /// Open a connection and wrap it as an SSE response body. The connection
    /// is released as soon as the client drops the stream.
    pub fn sse(self: &Arc<Self>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let (id, stream) = self.connect();
        debug!("Serving live updates on connection {}", id);
        let guard = ConnectionGuard {
            channel: Arc::downgrade(self),
            id,
        };
        Sse::new(stream.map(move |message| {
            let _held = &guard;
            Ok::<_, Infallible>(message.to_event())
        }))
    }

    /// Forget a connection whose client went away.
    pub fn disconnect(&self, id: u64) {
        let mut connections = self.lock();
        if connections.senders.remove(&id).is_some() {
            debug!("Live connection {} closed", id);
        }
        self.record(&connections);
    }

    /// Send to every connection, dropping those whose client went away.
    /// Returns the number of connections still open.
    pub fn broadcast(&self, message: LiveMessage) -> usize {
        let mut connections = self.lock();
        connections.senders.retain(|id, tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Live connection {} is lagging, skipping {}", id, message.name());
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Live connection {} closed", id);
                false
            }
        });
        self.record(&connections);
        connections.senders.len()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().senders.len()
    }

    /// Ping every connection on `interval` until [`close_all`](Self::close_all).
    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let channel = Arc::clone(self);
        let token = self.heartbeat.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        channel.broadcast(LiveMessage::Ping);
                    }
                }
            }
            debug!("Live heartbeat stopped");
        })
    }

    /// Stop the heartbeat and end every stream.
    pub fn close_all(&self) {
        self.heartbeat.cancel();
        let mut connections = self.lock();
        connections.closed = true;
        connections.senders.clear();
        self.record(&connections);
    }

    fn record(&self, connections: &Connections) {
        if let Some(gauge) = &self.gauge {
            gauge.set(connections.senders.len() as i64);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connections> {
        self.connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its connection when the SSE body is dropped.
struct ConnectionGuard {
    channel: Weak<LiveChannel>,
    id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.disconnect(self.id);
        }
    }
}
