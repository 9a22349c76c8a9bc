//! The bus connection seam.
//!
//! Proxies never touch sockets. They hand fully addressed, type-checked
//! [`MethodCall`]s and [`SignalMatch`]es to a [`Bus`], which owns the wire:
//! serial numbers, reply correlation, encoding and match rules.
//!
//! Two implementations ship with the crate:
//! - [`crate::dbus::ZbusBus`] talks to a real session/system bus via `zbus`
//! - [`MemoryBus`] routes calls to in-process handlers (tests, fakes)

mod memory;

pub use memory::{IncomingCall, MemoryBus, ObjectHandler, RecordedCall, RemoteError};

use crate::error::Result;
use crate::signature::Signature;
use crate::value::{ObjectPath, Value};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Interface carrying the generic `Get`/`Set`/`GetAll` property methods.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// A bus connection shared by every proxy derived from it.
pub type SharedBus = Arc<dyn Bus>;

/// A fully addressed method call whose arguments already match `args_signature`.
#[derive(Debug, Clone)]
pub struct MethodCall<'a> {
    pub destination: &'a str,
    pub path: &'a ObjectPath,
    pub interface: &'a str,
    pub member: &'a str,
    pub args: Vec<Value>,
    pub args_signature: &'a Signature,
    /// Declared reply shape, used to decode the reply body.
    pub reply_signature: &'a Signature,
}

/// Which signal emissions a subscription wants.
#[derive(Debug, Clone)]
pub struct SignalMatch<'a> {
    pub sender: &'a str,
    pub path: &'a ObjectPath,
    pub interface: &'a str,
    pub member: &'a str,
    pub payload_signature: &'a Signature,
}

/// Decoded signal payloads flowing from the connection to one subscriber.
///
/// Dropping the feed unsubscribes: the receiving half closes and any reader
/// task the bus started for it is aborted.
#[derive(Debug)]
pub struct SignalFeed {
    receiver: mpsc::Receiver<Result<Vec<Value>>>,
    reader: Option<JoinHandle<()>>,
}

impl SignalFeed {
    pub fn new(receiver: mpsc::Receiver<Result<Vec<Value>>>) -> Self {
        Self {
            receiver,
            reader: None,
        }
    }

    /// A feed fed by a dedicated reader task.
    pub fn with_reader(receiver: mpsc::Receiver<Result<Vec<Value>>>, reader: JoinHandle<()>) -> Self {
        Self {
            receiver,
            reader: Some(reader),
        }
    }

    pub(crate) fn receiver_mut(&mut self) -> &mut mpsc::Receiver<Result<Vec<Value>>> {
        &mut self.receiver
    }
}

impl Drop for SignalFeed {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Send-call/await-reply and subscribe-signal primitives of a bus connection.
///
/// Implementations correlate replies to calls themselves, so any number of
/// calls may be in flight on one connection. Remote error replies must be
/// reported as [`crate::ProxyError::Remote`]; connection failures as
/// [`crate::ProxyError::Transport`].
#[async_trait]
pub trait Bus: Send + Sync {
    /// Send `call` and wait for its reply, decoded per `call.reply_signature`.
    async fn call(&self, call: MethodCall<'_>) -> Result<Vec<Value>>;

    /// Start delivering emissions matching `signal`. Earlier emissions are not replayed.
    async fn subscribe(&self, signal: SignalMatch<'_>) -> Result<SignalFeed>;
}
