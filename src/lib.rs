//! secretbus: descriptor-driven D-Bus proxies and a Secret Service client.
//!
//! The crate has three layers:
//!
//! - [`descriptor`]: immutable [`InterfaceDescriptor`]s listing the methods,
//!   properties and signals of a remote interface with their signatures
//! - [`proxy`]: a [`Proxy`] that checks every call against the descriptors,
//!   sends it over a [`bus::Bus`] and type-checks the reply
//! - [`binding`] / [`secrets`]: typed objects bound to a service name, here
//!   the freedesktop.org Secret Service
//!
//! Connections go through the [`bus::Bus`] trait. [`dbus::ZbusBus`] is a real
//! session or system bus connection; [`bus::MemoryBus`] keeps everything in
//! process for tests and fakes.

pub mod binding;
pub mod bus;
pub mod config;
pub mod dbus;
pub mod descriptor;
pub mod error;
pub mod proxy;
pub mod secrets;
pub mod signature;
pub mod value;

// Re-export commonly used types for convenience
pub use binding::{BoundObject, WellKnownObject};
pub use bus::{Bus, MemoryBus, SharedBus};
pub use config::{BusConfig, BusKind, Config, ConfigError};
pub use dbus::ZbusBus;
pub use descriptor::{Access, DefinitionError, InterfaceDescriptor};
pub use error::{ProxyError, Result};
pub use proxy::{Proxy, SignalStream, TypedSignalStream};
pub use signature::{Signature, SignatureError, Type};
pub use value::{ObjectPath, Value, ValueError, Variant};
