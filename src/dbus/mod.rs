//! `zbus` backend for the [`Bus`](crate::bus::Bus) seam.
//!
//! ```text
//! ┌─────────┐  MethodCall / SignalMatch  ┌─────────┐   D-Bus wire   ┌──────────┐
//! │  Proxy  │───────────────────────────>│ ZbusBus │<──────────────>│  daemon  │
//! │         │<───────────────────────────│         │                │          │
//! └─────────┘   Vec<Value> / SignalFeed  └─────────┘                └──────────┘
//! ```
//!
//! Everything above this module speaks [`Value`](crate::Value); the
//! translation to and from `zvariant` happens in [`convert`].

pub mod convert;
mod connection;

pub use connection::{ZbusBus, DEFAULT_SIGNAL_BUFFER};
