// common/src/realtime.rs
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use uuid::Uuid;

use crate::models::events::EventEnvelope;

// Delay before the connection task dials the backend again after a drop.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
// Limit outbound frames buffered while the transport is down
const OUTBOUND_BUFFER: usize = 100;

type Handler = Arc<dyn Fn(Value) + Send + Sync>;
type HandlerMap = DashMap<String, Vec<(Uuid, Handler)>>;

/// Persistent bidirectional event connection to the backend.
///
/// One JSON envelope per text frame: `{"event": <name>, "data": <payload>}`.
/// Connecting, and reconnecting after a transport drop, happens on a
/// background task; callers never observe the transport state directly.
/// Events are dispatched in arrival order on that task.
pub struct RealtimeChannel {
    handlers: Arc<HandlerMap>,
    outbound: mpsc::Sender<WsMessage>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeChannel {
    /// Open a channel against `url`. Returns immediately; the first
    /// connection attempt runs in the background like any reconnect.
    pub fn open(url: &str) -> Self {
        let handlers: Arc<HandlerMap> = Arc::new(DashMap::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_connection(
            url.to_string(),
            Arc::clone(&handlers),
            outbound_rx,
            shutdown_rx,
        ));

        Self {
            handlers,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Register a handler for a named server event. The returned
    /// subscription unregisters the handler when cancelled or dropped.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            event: event.to_string(),
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Queue a client event for the backend. Frames are buffered while
    /// the transport is down; when the buffer is full the frame is
    /// dropped and logged.
    pub fn emit(&self, event: &str, data: Value) {
        let envelope = EventEnvelope {
            event: event.to_string(),
            data,
        };
        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!("failed to serialize {} event: {}", envelope.event, err);
                return;
            }
        };
        if self.outbound.try_send(WsMessage::Text(text)).is_err() {
            tracing::warn!("outbound buffer full, dropping {} event", event);
        }
    }

    /// Close the channel and wait for the connection task to finish.
    /// Safe to call any number of times.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!("realtime channel task ended abnormally: {}", err);
            }
        }
    }
}

/// Cancellation handle for one `on` registration
pub struct Subscription {
    event: String,
    id: Uuid,
    handlers: Weak<HandlerMap>,
}

impl Subscription {
    /// Unregister the handler now instead of at drop time
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            if let Some(mut entry) = handlers.get_mut(&self.event) {
                entry.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

async fn run_connection(
    url: String,
    handlers: Arc<HandlerMap>,
    mut outbound: mpsc::Receiver<WsMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = shutdown.changed() => return,
        };

        match connected {
            Ok((stream, _)) => {
                tracing::info!("realtime channel connected to {}", url);
                let (mut sink, mut source) = stream.split();
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            let _ = sink.send(WsMessage::Close(None)).await;
                            return;
                        }
                        queued = outbound.recv() => match queued {
                            Some(frame) => {
                                if let Err(err) = sink.send(frame).await {
                                    tracing::warn!("send on realtime channel failed: {}", err);
                                    break;
                                }
                            }
                            // All senders gone: the channel handle was dropped.
                            None => return,
                        },
                        incoming = source.next() => match incoming {
                            Some(Ok(WsMessage::Text(text))) => dispatch(&handlers, &text),
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                tracing::warn!("realtime channel transport error: {}", err);
                                break;
                            }
                        },
                    }
                }
                tracing::warn!("realtime channel dropped, reconnecting");
            }
            Err(err) => {
                tracing::warn!("realtime channel connect to {} failed: {}", url, err);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.changed() => return,
        }
    }
}

fn dispatch(handlers: &HandlerMap, text: &str) {
    let envelope: EventEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!("unparseable realtime frame: {}", err);
            return;
        }
    };

    // Clone the handler list out of the map so a handler that registers
    // or cancels subscriptions cannot deadlock the dispatch.
    let targets: Vec<Handler> = handlers
        .get(&envelope.event)
        .map(|entry| entry.iter().map(|(_, handler)| Arc::clone(handler)).collect())
        .unwrap_or_default();

    if targets.is_empty() {
        tracing::debug!("no handler registered for {} event", envelope.event);
        return;
    }
    for handler in targets {
        handler(envelope.data.clone());
    }
}
