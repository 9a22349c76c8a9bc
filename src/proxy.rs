//! Descriptor-driven dispatch.
//!
//! A [`Proxy`] pairs a target (bus, destination, object path) with the
//! descriptors of the interfaces it implements. Every operation is checked
//! against the descriptors before anything is sent, so lookups of unknown
//! members, arguments of the wrong type and writes to read-only properties
//! fail locally without bus I/O.

use crate::bus::{MethodCall, SharedBus, SignalFeed, SignalMatch, PROPERTIES_INTERFACE};
use crate::descriptor::{InterfaceDescriptor, MethodSpec, PropertySpec, SignalSpec};
use crate::error::{ProxyError, Result};
use crate::signature::{Signature, Type};
use crate::value::{ObjectPath, Value, ValueError, Variant};
use futures_util::Stream;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

static GET_ARGS: LazyLock<Signature> =
    LazyLock::new(|| Signature::from(vec![Type::String, Type::String]));
static GET_REPLY: LazyLock<Signature> = LazyLock::new(|| Signature::from(Type::Variant));
static SET_ARGS: LazyLock<Signature> =
    LazyLock::new(|| Signature::from(vec![Type::String, Type::String, Type::Variant]));
static GET_ALL_ARGS: LazyLock<Signature> = LazyLock::new(|| Signature::from(Type::String));
static GET_ALL_REPLY: LazyLock<Signature> =
    LazyLock::new(|| Signature::from(Type::dict_of(Type::String, Type::Variant)));
static EMPTY: LazyLock<Signature> = LazyLock::new(Signature::empty);

struct Target {
    bus: SharedBus,
    destination: String,
    path: ObjectPath,
    interfaces: Vec<Arc<InterfaceDescriptor>>,
}

/// A handle on one remote object. Cheap to clone.
#[derive(Clone)]
pub struct Proxy {
    target: Arc<Target>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("destination", &self.target.destination)
            .field("path", &self.target.path)
            .field(
                "interfaces",
                &self.target.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Proxy {
    pub fn new(
        bus: SharedBus,
        destination: impl Into<String>,
        path: impl Into<ObjectPath>,
        interface: Arc<InterfaceDescriptor>,
    ) -> Self {
        Self::with_interfaces(bus, destination, path, vec![interface])
    }

    /// A proxy for an object implementing several interfaces.
    /// Members are resolved in the order the descriptors are given.
    pub fn with_interfaces(
        bus: SharedBus,
        destination: impl Into<String>,
        path: impl Into<ObjectPath>,
        interfaces: Vec<Arc<InterfaceDescriptor>>,
    ) -> Self {
        Self {
            target: Arc::new(Target {
                bus,
                destination: destination.into(),
                path: path.into(),
                interfaces,
            }),
        }
    }

    /// The same destination and interfaces at another object path.
    pub fn at(&self, path: impl Into<ObjectPath>) -> Proxy {
        Self::with_interfaces(
            self.target.bus.clone(),
            self.target.destination.clone(),
            path,
            self.target.interfaces.clone(),
        )
    }

    pub fn bus(&self) -> &SharedBus {
        &self.target.bus
    }

    pub fn destination(&self) -> &str {
        &self.target.destination
    }

    pub fn path(&self) -> &ObjectPath {
        &self.target.path
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceDescriptor>] {
        &self.target.interfaces
    }

    fn primary_name(&self) -> String {
        self.target
            .interfaces
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_default()
    }

    fn find_method(&self, name: &str) -> Result<(&InterfaceDescriptor, &MethodSpec)> {
        self.target
            .interfaces
            .iter()
            .find_map(|i| i.method(name).map(|m| (i.as_ref(), m)))
            .ok_or_else(|| ProxyError::UnknownMethod {
                interface: self.primary_name(),
                member: name.to_string(),
            })
    }

    fn find_property(&self, name: &str) -> Result<(&InterfaceDescriptor, &PropertySpec)> {
        self.target
            .interfaces
            .iter()
            .find_map(|i| i.property(name).map(|p| (i.as_ref(), p)))
            .ok_or_else(|| ProxyError::UnknownProperty {
                interface: self.primary_name(),
                member: name.to_string(),
            })
    }

    fn find_signal(&self, name: &str) -> Result<(&InterfaceDescriptor, &SignalSpec)> {
        self.target
            .interfaces
            .iter()
            .find_map(|i| i.signal(name).map(|s| (i.as_ref(), s)))
            .ok_or_else(|| ProxyError::UnknownSignal {
                interface: self.primary_name(),
                member: name.to_string(),
            })
    }

    /// Call `method` on the first interface that declares it.
    pub async fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let (interface, spec) = self.find_method(method)?;
        self.dispatch(interface, spec, args).await
    }

    /// Call `method` on one specific interface.
    pub async fn call_method_on(
        &self,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let (descriptor, spec) = self
            .target
            .interfaces
            .iter()
            .find(|i| i.name() == interface)
            .and_then(|i| i.method(method).map(|m| (i.as_ref(), m)))
            .ok_or_else(|| ProxyError::UnknownMethod {
                interface: interface.to_string(),
                member: method.to_string(),
            })?;
        self.dispatch(descriptor, spec, args).await
    }

    async fn dispatch(
        &self,
        interface: &InterfaceDescriptor,
        spec: &MethodSpec,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        check_values(&spec.name, "argument", &spec.input, &args)?;

        debug!(
            "{}.{} on {} ({})",
            interface.name(),
            spec.name,
            self.target.path,
            self.target.destination
        );
        let reply = self
            .target
            .bus
            .call(MethodCall {
                destination: &self.target.destination,
                path: &self.target.path,
                interface: interface.name(),
                member: &spec.name,
                args,
                args_signature: &spec.input,
                reply_signature: &spec.output,
            })
            .await?;
        trace!("{} replied {:?}", spec.name, reply);

        check_values(&spec.name, "reply value", &spec.output, &reply)?;
        Ok(reply)
    }

    /// Read a property through `org.freedesktop.DBus.Properties.Get`.
    pub async fn get_property(&self, name: &str) -> Result<Value> {
        let (interface, spec) = self.find_property(name)?;
        debug!("Get {}.{} on {}", interface.name(), name, self.target.path);

        let reply = self
            .target
            .bus
            .call(MethodCall {
                destination: &self.target.destination,
                path: &self.target.path,
                interface: PROPERTIES_INTERFACE,
                member: "Get",
                args: vec![Value::from(interface.name()), Value::from(name)],
                args_signature: &GET_ARGS,
                reply_signature: &GET_REPLY,
            })
            .await?;
        trace!("{} = {:?}", name, reply);

        let variant = single_variant(name, reply)?;
        unwrap_property(spec, variant)
    }

    /// Write a property through `org.freedesktop.DBus.Properties.Set`.
    pub async fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let (interface, spec) = self.find_property(name)?;
        if !spec.access.is_writable() {
            return Err(ProxyError::PropertyReadOnly {
                interface: interface.name().to_string(),
                member: name.to_string(),
            });
        }
        let variant = Variant::with_type(spec.ty.clone(), value.into())
            .map_err(|e| ProxyError::mismatch(name, e))?;
        debug!("Set {}.{} on {}", interface.name(), name, self.target.path);

        let reply = self
            .target
            .bus
            .call(MethodCall {
                destination: &self.target.destination,
                path: &self.target.path,
                interface: PROPERTIES_INTERFACE,
                member: "Set",
                args: vec![
                    Value::from(interface.name()),
                    Value::from(name),
                    Value::from(variant),
                ],
                args_signature: &SET_ARGS,
                reply_signature: &EMPTY,
            })
            .await?;
        check_values(name, "reply value", &EMPTY, &reply)
    }

    /// Read every property of every bound interface.
    ///
    /// Declared properties are checked against their type; properties the
    /// descriptors do not know about are passed through as-is. When two
    /// interfaces report the same name, the earlier interface wins.
    pub async fn get_all_properties(&self) -> Result<BTreeMap<String, Value>> {
        let mut all = BTreeMap::new();
        for interface in &self.target.interfaces {
            debug!("GetAll {} on {}", interface.name(), self.target.path);
            let mut reply = self
                .target
                .bus
                .call(MethodCall {
                    destination: &self.target.destination,
                    path: &self.target.path,
                    interface: PROPERTIES_INTERFACE,
                    member: "GetAll",
                    args: vec![Value::from(interface.name())],
                    args_signature: &GET_ALL_ARGS,
                    reply_signature: &GET_ALL_REPLY,
                })
                .await?;
            check_values("GetAll", "reply value", &GET_ALL_REPLY, &reply)?;

            let properties = HashMap::<String, Variant>::try_from(reply.remove(0))
                .map_err(|e| ProxyError::mismatch("GetAll", e))?;
            for (name, variant) in properties {
                let value = match interface.property(&name) {
                    Some(spec) => unwrap_property(spec, variant)?,
                    None => variant.into_value(),
                };
                all.entry(name).or_insert(value);
            }
        }
        Ok(all)
    }

    /// Start receiving emissions of `signal`. Nothing emitted earlier is replayed.
    pub async fn subscribe_signal(&self, signal: &str) -> Result<SignalStream> {
        let (interface, spec) = self.find_signal(signal)?;
        debug!(
            "Subscribing to {}.{} on {}",
            interface.name(),
            signal,
            self.target.path
        );
        let feed = self
            .target
            .bus
            .subscribe(SignalMatch {
                sender: &self.target.destination,
                path: &self.target.path,
                interface: interface.name(),
                member: &spec.name,
                payload_signature: &spec.payload,
            })
            .await?;
        Ok(SignalStream {
            member: spec.name.clone(),
            payload: spec.payload.clone(),
            feed: Some(feed),
        })
    }
}

fn check_values(member: &str, what: &str, signature: &Signature, values: &[Value]) -> Result<()> {
    if values.len() != signature.len() {
        return Err(ProxyError::mismatch(
            member,
            format!(
                "expected {} {}(s) of '{}', found {}",
                signature.len(),
                what,
                signature,
                values.len()
            ),
        ));
    }
    for (i, (value, ty)) in values.iter().zip(signature.types()).enumerate() {
        if !value.conforms_to(ty) {
            return Err(ProxyError::mismatch(
                member,
                format!(
                    "{} {}: expected '{}', found '{}'",
                    what,
                    i,
                    ty,
                    value.value_type()
                ),
            ));
        }
    }
    Ok(())
}

fn single_variant(member: &str, mut reply: Vec<Value>) -> Result<Variant> {
    check_values(member, "reply value", &GET_REPLY, &reply)?;
    Variant::try_from(reply.remove(0)).map_err(|e| ProxyError::mismatch(member, e))
}

fn unwrap_property(spec: &PropertySpec, variant: Variant) -> Result<Value> {
    let value = variant.into_value();
    if !value.conforms_to(&spec.ty) {
        return Err(ProxyError::mismatch(
            &spec.name,
            ValueError::mismatch(&spec.ty, &value.value_type()),
        ));
    }
    Ok(value)
}

/// Decoded payloads of one signal subscription.
///
/// Yields one item per emission. Ends when the connection closes or after
/// the first error. Dropping the stream, or calling [`SignalStream::cancel`],
/// removes the subscription.
pub struct SignalStream {
    member: String,
    payload: Signature,
    feed: Option<SignalFeed>,
}

impl fmt::Debug for SignalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStream")
            .field("member", &self.member)
            .field("payload", &self.payload.to_string())
            .field("active", &self.feed.is_some())
            .finish()
    }
}

impl SignalStream {
    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn is_active(&self) -> bool {
        self.feed.is_some()
    }

    /// Unsubscribe now. The stream yields nothing afterwards.
    pub fn cancel(&mut self) {
        if self.feed.take().is_some() {
            debug!("Cancelled subscription to {}", self.member);
        }
    }

    /// Decode each payload with `decode`, ending the stream at the first failure.
    pub fn typed<T>(self, decode: fn(Vec<Value>) -> Result<T, ValueError>) -> TypedSignalStream<T> {
        TypedSignalStream {
            inner: self,
            decode,
        }
    }
}

impl Stream for SignalStream {
    type Item = Result<Vec<Value>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(feed) = this.feed.as_mut() else {
            return Poll::Ready(None);
        };

        match feed.receiver_mut().poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                debug!("Subscription to {} ended", this.member);
                this.feed = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.feed = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Some(Ok(payload))) => {
                trace!("{} emitted {:?}", this.member, payload);
                match check_values(&this.member, "payload value", &this.payload, &payload) {
                    Ok(()) => Poll::Ready(Some(Ok(payload))),
                    Err(e) => {
                        warn!("Dropping subscription to {}: {}", this.member, e);
                        this.feed = None;
                        Poll::Ready(Some(Err(e)))
                    }
                }
            }
        }
    }
}

/// A [`SignalStream`] whose payloads are decoded into `T`.
pub struct TypedSignalStream<T> {
    inner: SignalStream,
    decode: fn(Vec<Value>) -> Result<T, ValueError>,
}

impl<T> TypedSignalStream<T> {
    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

impl<T> fmt::Debug for TypedSignalStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedSignalStream").field(&self.inner).finish()
    }
}

impl<T> Stream for TypedSignalStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Some(Ok(payload))) => match (this.decode)(payload) {
                Ok(item) => Poll::Ready(Some(Ok(item))),
                Err(e) => {
                    this.inner.cancel();
                    Poll::Ready(Some(Err(ProxyError::mismatch(&this.inner.member, e))))
                }
            },
        }
    }
}
