//! An in-process bus.
//!
//! Objects are [`ObjectHandler`]s registered under a (destination, path)
//! pair. Calls are routed to them directly and every call that reaches the
//! bus is recorded, which makes it easy to assert that a proxy did or did not
//! perform I/O. Signals are pushed with [`MemoryBus::emit`].

use super::{Bus, MethodCall, SignalFeed, SignalMatch};
use crate::error::{ProxyError, Result};
use crate::value::{ObjectPath, Value};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, trace};

const DEFAULT_SIGNAL_BUFFER: usize = 64;

/// A D-Bus error reply produced by an object handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub name: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new("org.freedesktop.DBus.Error.Failed", message)
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new("org.freedesktop.DBus.Error.InvalidArgs", message)
    }

    pub fn unknown_method(interface: &str, member: &str) -> Self {
        Self::new(
            "org.freedesktop.DBus.Error.UnknownMethod",
            format!("No such method '{}' on interface '{}'", member, interface),
        )
    }

    pub fn unknown_object(path: &ObjectPath) -> Self {
        Self::new(
            "org.freedesktop.DBus.Error.UnknownObject",
            format!("No such object path '{}'", path),
        )
    }

    pub fn service_unknown(destination: &str) -> Self {
        Self::new(
            "org.freedesktop.DBus.Error.ServiceUnknown",
            format!("The name {} was not provided by any .service files", destination),
        )
    }
}

impl From<RemoteError> for ProxyError {
    fn from(e: RemoteError) -> Self {
        ProxyError::Remote {
            name: e.name,
            message: e.message,
        }
    }
}

/// A call as delivered to an object handler.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

/// A call as it reached the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub destination: String,
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

/// Serves calls for one or more object paths on a [`MemoryBus`].
#[async_trait]
pub trait ObjectHandler: Send + Sync {
    async fn handle(&self, bus: &MemoryBus, call: IncomingCall) -> Result<Vec<Value>, RemoteError>;
}

type ObjectKey = (String, ObjectPath);

struct Subscriber {
    sender: String,
    path: ObjectPath,
    interface: String,
    member: String,
    tx: mpsc::Sender<Result<Vec<Value>>>,
}

#[derive(Default)]
struct Inner {
    objects: RwLock<HashMap<ObjectKey, Arc<dyn ObjectHandler>>>,
    services: RwLock<HashSet<String>>,
    subscribers: Mutex<Vec<Subscriber>>,
    calls: Mutex<Vec<RecordedCall>>,
    closed: AtomicBool,
    signal_buffer: usize,
}

/// A bus living entirely inside this process. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_signal_buffer(DEFAULT_SIGNAL_BUFFER)
    }

    pub fn with_signal_buffer(signal_buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                signal_buffer: signal_buffer.max(1),
                ..Inner::default()
            }),
        }
    }

    /// Serve `path` on `destination` with `handler`, replacing any previous handler.
    ///
    /// The first registration also claims `destination`, which stays owned
    /// until [`MemoryBus::release_name`].
    pub async fn register_object(
        &self,
        destination: &str,
        path: impl Into<ObjectPath>,
        handler: Arc<dyn ObjectHandler>,
    ) {
        let path = path.into();
        debug!("Registering {} on {}", path, destination);
        self.inner
            .services
            .write()
            .await
            .insert(destination.to_string());
        self.inner
            .objects
            .write()
            .await
            .insert((destination.to_string(), path), handler);
    }

    /// Stop serving `path`. Later calls to it fail with `UnknownObject`.
    pub async fn unregister_object(&self, destination: &str, path: &ObjectPath) -> bool {
        debug!("Unregistering {} on {}", path, destination);
        self.inner
            .objects
            .write()
            .await
            .remove(&(destination.to_string(), path.clone()))
            .is_some()
    }

    /// Give up `destination` and every object served on it. Later calls fail
    /// with `ServiceUnknown`.
    pub async fn release_name(&self, destination: &str) -> bool {
        debug!("Releasing {}", destination);
        self.inner
            .objects
            .write()
            .await
            .retain(|(dest, _), _| dest != destination);
        self.inner.services.write().await.remove(destination)
    }

    /// Deliver a signal to every live matching subscriber. Returns how many received it.
    pub async fn emit(
        &self,
        sender: &str,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        payload: Vec<Value>,
    ) -> usize {
        let targets: Vec<mpsc::Sender<Result<Vec<Value>>>> = {
            let mut subscribers = self.inner.subscribers.lock().await;
            subscribers.retain(|s| !s.tx.is_closed());
            subscribers
                .iter()
                .filter(|s| {
                    s.sender == sender
                        && &s.path == path
                        && s.interface == interface
                        && s.member == member
                })
                .map(|s| s.tx.clone())
                .collect()
        };

        trace!("Emitting {}.{} from {} to {} subscriber(s)", interface, member, path, targets.len());
        let mut delivered = 0;
        for tx in targets {
            if tx.send(Ok(payload.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop the connection: pending subscriptions end and later calls fail.
    pub async fn close(&self) {
        debug!("Closing memory bus");
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subscribers.lock().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Every call that reached the bus, oldest first.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.inner.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.inner.calls.lock().await.len()
    }

    /// Number of subscriptions whose stream is still alive.
    pub async fn subscriber_count(&self) -> usize {
        let mut subscribers = self.inner.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            let err = io::Error::new(io::ErrorKind::BrokenPipe, "memory bus closed");
            return Err(ProxyError::Transport(zbus::Error::InputOutput(Arc::new(err))));
        }
        Ok(())
    }
}

// Object paths are validated here, like a real connection would.
fn check_path(path: &ObjectPath) -> Result<()> {
    zbus::zvariant::ObjectPath::try_from(path.as_str()).map_err(zbus::Error::from)?;
    Ok(())
}

#[async_trait]
impl Bus for MemoryBus {
    async fn call(&self, call: MethodCall<'_>) -> Result<Vec<Value>> {
        self.check_open()?;
        check_path(call.path)?;

        self.inner.calls.lock().await.push(RecordedCall {
            destination: call.destination.to_string(),
            path: call.path.clone(),
            interface: call.interface.to_string(),
            member: call.member.to_string(),
            args: call.args.clone(),
        });

        if !self.inner.services.read().await.contains(call.destination) {
            return Err(RemoteError::service_unknown(call.destination).into());
        }
        let handler = self
            .inner
            .objects
            .read()
            .await
            .get(&(call.destination.to_string(), call.path.clone()))
            .cloned()
            .ok_or_else(|| RemoteError::unknown_object(call.path))?;

        let reply = handler
            .handle(
                self,
                IncomingCall {
                    path: call.path.clone(),
                    interface: call.interface.to_string(),
                    member: call.member.to_string(),
                    args: call.args,
                },
            )
            .await?;
        Ok(reply)
    }

    async fn subscribe(&self, signal: SignalMatch<'_>) -> Result<SignalFeed> {
        self.check_open()?;
        check_path(signal.path)?;

        let (tx, rx) = mpsc::channel(self.inner.signal_buffer);
        self.inner.subscribers.lock().await.push(Subscriber {
            sender: signal.sender.to_string(),
            path: signal.path.clone(),
            interface: signal.interface.to_string(),
            member: signal.member.to_string(),
            tx,
        });
        Ok(SignalFeed::new(rx))
    }
}
