//! In-process transport.
//!
//! `LocalTransport` connects both sides of the application inside one
//! process. Request primitives run their callback on the blocking pool and
//! enforce the configured timeout. Fire primitives deliver inline to connected
//! listeners and buffer into a bounded tokio channel while none is connected.
//! A send that finds the buffer full is dropped, never failed.
//!
//! Asking for the same `(communicator, channel)` twice returns the same
//! primitive, so an authoritative and a dependent network built over one
//! transport talk to each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use trellis_core::Value;

use crate::caller::Caller;
use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::transport::{
    ConnectionId, FireListener, FirePrimitive, InvokeCallback, RequestPrimitive, Transport,
};

type ChannelKey = (String, String);

/// A transport whose primitives live in this process.
pub struct LocalTransport {
    config: NetworkConfig,
    requests: Mutex<HashMap<ChannelKey, Arc<LocalRequest>>>,
    fires: Mutex<HashMap<ChannelKey, Arc<LocalFire>>>,
}

impl LocalTransport {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            requests: Mutex::new(HashMap::new()),
            fires: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn key(communicator: &str, channel: &str) -> ChannelKey {
        (communicator.to_string(), channel.to_string())
    }

    fn taken(communicator: &str, channel: &str, kind: &str) -> NetworkError {
        NetworkError::Transport {
            message: format!(
                "{}.{} is already allocated as a {} channel",
                communicator, channel, kind
            ),
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl Transport for LocalTransport {
    fn request_channel(
        &self,
        communicator: &str,
        channel: &str,
    ) -> Result<Arc<dyn RequestPrimitive>> {
        let key = Self::key(communicator, channel);
        if self
            .fires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
        {
            return Err(Self::taken(communicator, channel, "fire"));
        }

        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let primitive = requests
            .entry(key)
            .or_insert_with(|| {
                debug!(communicator = %communicator, channel = %channel, "allocating request primitive");
                Arc::new(LocalRequest::new(
                    communicator,
                    channel,
                    self.config.request_timeout(),
                ))
            })
            .clone();
        Ok(primitive)
    }

    fn fire_channel(&self, communicator: &str, channel: &str) -> Result<Arc<dyn FirePrimitive>> {
        let key = Self::key(communicator, channel);
        if self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
        {
            return Err(Self::taken(communicator, channel, "request"));
        }

        let mut fires = self.fires.lock().unwrap_or_else(PoisonError::into_inner);
        let primitive = fires
            .entry(key)
            .or_insert_with(|| {
                debug!(communicator = %communicator, channel = %channel, "allocating fire primitive");
                Arc::new(LocalFire::new(
                    communicator,
                    channel,
                    self.config.fire_queue_capacity,
                ))
            })
            .clone();
        Ok(primitive)
    }
}

/// In-process request primitive.
pub struct LocalRequest {
    communicator: String,
    name: String,
    timeout: Duration,
    callback: RwLock<Option<InvokeCallback>>,
}

impl LocalRequest {
    fn new(communicator: &str, name: &str, timeout: Duration) -> Self {
        Self {
            communicator: communicator.to_string(),
            name: name.to_string(),
            timeout,
            callback: RwLock::new(None),
        }
    }

    fn callback(&self) -> Option<InvokeCallback> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RequestPrimitive for LocalRequest {
    fn communicator(&self) -> &str {
        &self.communicator
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_invoke(&self, callback: InvokeCallback) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn clear_callback(&self) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn has_callback(&self) -> bool {
        self.callback().is_some()
    }

    async fn invoke(&self, caller: &Caller, args: Vec<Value>) -> Result<Value> {
        let callback = self.callback().ok_or_else(|| NetworkError::NoHandler {
            communicator: self.communicator.clone(),
            channel: self.name.clone(),
        })?;

        let caller = caller.clone();
        let task = tokio::task::spawn_blocking(move || callback(&caller, args));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(NetworkError::Timeout {
                communicator: self.communicator.clone(),
                channel: self.name.clone(),
                after: self.timeout,
            }),
            Ok(Err(join)) => Err(NetworkError::Transport {
                message: join.to_string(),
            }),
            Ok(Ok(response)) => response.map_err(NetworkError::from),
        }
    }
}

struct Queued {
    caller: Caller,
    args: Vec<Value>,
}

struct Listeners {
    next_id: u64,
    connected: Vec<(ConnectionId, FireListener)>,
    /// Set while the backlog is being handed to listeners. New sends queue
    /// behind it instead of overtaking it.
    draining: bool,
}

/// In-process fire primitive.
pub struct LocalFire {
    communicator: String,
    name: String,
    capacity: usize,
    listeners: Mutex<Listeners>,
    tx: mpsc::Sender<Queued>,
    rx: Mutex<mpsc::Receiver<Queued>>,
}

impl LocalFire {
    fn new(communicator: &str, name: &str, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            communicator: communicator.to_string(),
            name: name.to_string(),
            capacity,
            listeners: Mutex::new(Listeners {
                next_id: 0,
                connected: Vec::new(),
                draining: false,
            }),
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dropped(&self) {
        warn!(
            communicator = %self.communicator,
            channel = %self.name,
            capacity = self.capacity,
            "fire queue full, dropping message"
        );
    }

    /// Hand the backlog to the connected listeners, oldest first, until the
    /// queue is empty or every listener is gone.
    fn flush(&self) {
        loop {
            let targets: Vec<FireListener> = {
                let mut listeners = self.listeners();
                if listeners.connected.is_empty() {
                    listeners.draining = false;
                    return;
                }
                listeners.connected.iter().map(|(_, l)| l.clone()).collect()
            };

            let batch = self.drain();
            if batch.is_empty() {
                let mut listeners = self.listeners();
                // Lock order is listeners, then rx.
                if self.pending() == 0 {
                    listeners.draining = false;
                    return;
                }
                continue;
            }

            debug!(
                communicator = %self.communicator,
                channel = %self.name,
                count = batch.len(),
                "delivering queued fire messages"
            );
            for message in batch {
                for listener in &targets {
                    listener(&message.caller, message.args.clone());
                }
            }
        }
    }

    fn drain(&self) -> Vec<Queued> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drained = Vec::new();
        while let Ok(message) = rx.try_recv() {
            drained.push(message);
        }
        drained
    }
}

impl FirePrimitive for LocalFire {
    fn communicator(&self) -> &str {
        &self.communicator
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, listener: FireListener) -> ConnectionId {
        let (id, flush) = {
            let mut listeners = self.listeners();
            let id = ConnectionId(listeners.next_id);
            listeners.next_id += 1;
            // A flush already in progress picks the new listener up itself.
            let flush = listeners.connected.is_empty() && !listeners.draining;
            listeners.connected.push((id, listener));
            if flush {
                listeners.draining = true;
            }
            (id, flush)
        };

        if flush {
            self.flush();
        }
        id
    }

    fn disconnect(&self, id: ConnectionId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.connected.len();
        listeners.connected.retain(|(conn, _)| *conn != id);
        listeners.connected.len() != before
    }

    fn listener_count(&self) -> usize {
        self.listeners().connected.len()
    }

    fn pending(&self) -> usize {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn send(&self, caller: &Caller, args: Vec<Value>) -> Result<()> {
        let targets: Vec<FireListener> = {
            let listeners = self.listeners();
            if listeners.connected.is_empty() || listeners.draining {
                if listeners.connected.is_empty() && self.capacity == 0 {
                    self.dropped();
                    return Ok(());
                }
                let message = Queued {
                    caller: caller.clone(),
                    args,
                };
                return match self.tx.try_send(message) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.dropped();
                        Ok(())
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => Err(NetworkError::Transport {
                        message: "fire queue closed".to_string(),
                    }),
                };
            }
            listeners
                .connected
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };

        for listener in targets {
            listener(caller, args.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RemoteError, RemoteErrorKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transport() -> LocalTransport {
        LocalTransport::new(NetworkConfig {
            request_timeout_ms: 200,
            fire_queue_capacity: 2,
        })
    }

    #[test]
    fn same_channel_returns_same_primitive() {
        let t = transport();
        let a = t.request_channel("Shop", "Buy").unwrap();
        let b = t.request_channel("Shop", "Buy").unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(&a), Arc::as_ptr(&b)));
    }

    #[test]
    fn kinds_cannot_share_a_name() {
        let t = transport();
        t.request_channel("Shop", "Buy").unwrap();
        assert!(matches!(
            t.fire_channel("Shop", "Buy"),
            Err(NetworkError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn invoke_runs_callback() {
        let t = transport();
        let p = t.request_channel("Math", "Double").unwrap();
        p.on_invoke(Arc::new(|_: &Caller, args: Vec<Value>| {
            Ok(Value::Integer(args[0].as_i64().unwrap_or(0) * 2))
        }));
        let out = p.invoke(&Caller::new(), vec![Value::Integer(21)]).await.unwrap();
        assert_eq!(out, Value::Integer(42));
    }

    #[tokio::test]
    async fn invoke_without_callback() {
        let t = transport();
        let p = t.request_channel("Math", "Double").unwrap();
        assert!(!p.has_callback());
        let err = p.invoke(&Caller::new(), vec![]).await.unwrap_err();
        assert!(matches!(err, NetworkError::NoHandler { .. }));
    }

    #[tokio::test]
    async fn invoke_times_out() {
        let t = transport();
        let p = t.request_channel("Slow", "Wait").unwrap();
        p.on_invoke(Arc::new(|_: &Caller, _: Vec<Value>| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Value::Null)
        }));
        let err = p.invoke(&Caller::new(), vec![]).await.unwrap_err();
        assert!(matches!(err, NetworkError::Timeout { after, .. } if after == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn remote_error_is_carried_back() {
        let t = transport();
        let p = t.request_channel("Shop", "Buy").unwrap();
        p.on_invoke(Arc::new(|_: &Caller, _: Vec<Value>| {
            Err(RemoteError {
                kind: RemoteErrorKind::HandlerFailed,
                communicator: "Shop".to_string(),
                channel: "Buy".to_string(),
                message: "sold out".to_string(),
            })
        }));
        let err = p.invoke(&Caller::new(), vec![]).await.unwrap_err();
        assert_eq!(err.remote().unwrap().message, "sold out");
    }

    #[test]
    fn fire_buffers_until_connected() {
        let t = transport();
        let p = t.fire_channel("Chat", "Say").unwrap();
        let caller = Caller::new();
        p.send(&caller, vec![Value::from("a")]).unwrap();
        p.send(&caller, vec![Value::from("b")]).unwrap();
        assert_eq!(p.pending(), 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        p.connect(Arc::new(move |_: &Caller, args: Vec<Value>| {
            sink.lock().unwrap().push(args[0].clone());
        }));
        assert_eq!(p.pending(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![Value::from("a"), Value::from("b")]);

        p.send(&caller, vec![Value::from("c")]).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn overflow_is_dropped_not_raised() {
        let t = transport();
        let p = t.fire_channel("Chat", "Say").unwrap();
        let caller = Caller::new();
        for word in ["a", "b", "c", "d"] {
            assert!(p.send(&caller, vec![Value::from(word)]).is_ok());
        }
        assert_eq!(p.pending(), 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        p.connect(Arc::new(move |_: &Caller, args: Vec<Value>| {
            sink.lock().unwrap().push(args[0].clone());
        }));
        assert_eq!(*seen.lock().unwrap(), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn sends_during_flush_queue_behind_the_backlog() {
        let t = transport();
        let p = t.fire_channel("Chat", "Say").unwrap();
        let caller = Caller::new();
        p.send(&caller, vec![Value::from("a")]).unwrap();
        p.send(&caller, vec![Value::from("b")]).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let echo = p.clone();
        p.connect(Arc::new(move |caller: &Caller, args: Vec<Value>| {
            if args[0] == Value::from("a") {
                echo.send(caller, vec![Value::from("c")]).unwrap();
            }
            sink.lock().unwrap().push(args[0].clone());
        }));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
        assert_eq!(p.pending(), 0);

        p.send(&caller, vec![Value::from("d")]).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn disconnect_during_flush_keeps_later_sends_queued() {
        let t = transport();
        let p = t.fire_channel("Chat", "Say").unwrap();
        let caller = Caller::new();
        p.send(&caller, vec![Value::from("a")]).unwrap();
        p.send(&caller, vec![Value::from("b")]).unwrap();

        let first = Arc::new(Mutex::new(Vec::new()));
        let sink = first.clone();
        let this = p.clone();
        let id = p.connect(Arc::new(move |caller: &Caller, args: Vec<Value>| {
            if args[0] == Value::from("a") {
                this.disconnect(ConnectionId(0));
                this.send(caller, vec![Value::from("c")]).unwrap();
            }
            sink.lock().unwrap().push(args[0].clone());
        }));
        assert_eq!(id, ConnectionId(0));
        assert_eq!(*first.lock().unwrap(), vec![Value::from("a"), Value::from("b")]);
        assert_eq!(p.listener_count(), 0);
        assert_eq!(p.pending(), 1);

        let second = Arc::new(Mutex::new(Vec::new()));
        let sink = second.clone();
        p.connect(Arc::new(move |_: &Caller, args: Vec<Value>| {
            sink.lock().unwrap().push(args[0].clone());
        }));
        assert_eq!(*second.lock().unwrap(), vec![Value::from("c")]);
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn fire_reaches_every_listener() {
        let t = transport();
        let p = t.fire_channel("Chat", "Say").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let hits = hits.clone();
                p.connect(Arc::new(move |_: &Caller, _: Vec<Value>| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }))
            })
            .collect();
        assert_eq!(p.listener_count(), 3);

        p.send(&Caller::new(), vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert!(p.disconnect(ids[0]));
        assert!(!p.disconnect(ids[0]));
        p.send(&Caller::new(), vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn zero_capacity_never_buffers() {
        let t = LocalTransport::new(NetworkConfig {
            fire_queue_capacity: 0,
            ..NetworkConfig::default()
        });
        let p = t.fire_channel("Chat", "Say").unwrap();
        assert!(p.send(&Caller::new(), vec![Value::from("lost")]).is_ok());
        assert_eq!(p.pending(), 0);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        p.connect(Arc::new(move |_: &Caller, _: Vec<Value>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        p.send(&Caller::new(), vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
