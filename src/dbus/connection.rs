//! [`Bus`] implementation on top of a `zbus` connection.

use super::convert::{from_body, to_body};
use crate::bus::{Bus, MethodCall, SignalFeed, SignalMatch};
use crate::config::{BusConfig, BusKind};
use crate::error::{ProxyError, Result};
use crate::signature::Signature;
use crate::value::Value;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use zbus::connection::Builder;
use zbus::fdo::DBusProxy;
use zbus::names::{BusName, OwnedUniqueName};
use zbus::{Connection, DBusError, MatchRule, MessageStream};

/// Default buffer between the connection and one signal subscriber.
pub const DEFAULT_SIGNAL_BUFFER: usize = 64;

/// A real D-Bus connection.
///
/// Cheap to clone. `zbus` correlates replies by serial, so concurrent calls
/// through clones of one `ZbusBus` share a single socket.
#[derive(Clone, Debug)]
pub struct ZbusBus {
    connection: Connection,
    signal_buffer: usize,
}

impl ZbusBus {
    /// Connect to the session bus.
    pub async fn session() -> Result<Self> {
        let connection = Connection::session().await?;
        info!("Connected to session bus");
        Ok(Self::from_connection(connection))
    }

    /// Connect to the system bus.
    pub async fn system() -> Result<Self> {
        let connection = Connection::system().await?;
        info!("Connected to system bus");
        Ok(Self::from_connection(connection))
    }

    /// Connect as described by `config`.
    pub async fn connect(config: &BusConfig) -> Result<Self> {
        let builder = match config.kind {
            BusKind::Session => Builder::session()?,
            BusKind::System => Builder::system()?,
            BusKind::Address => {
                let address = config.address.as_deref().ok_or_else(|| {
                    ProxyError::Transport(zbus::Error::Address(
                        "bus kind 'address' needs an address".to_string(),
                    ))
                })?;
                Builder::address(address)?
            }
        };
        let builder = match config.method_timeout_secs {
            Some(secs) => builder.method_timeout(Duration::from_secs(secs)),
            None => builder,
        };
        let connection = builder.build().await?;
        info!(
            "Connected to {:?} bus (unique name: {})",
            config.kind,
            connection
                .unique_name()
                .map(|n| n.as_str())
                .unwrap_or("<none>")
        );

        Ok(Self {
            connection,
            signal_buffer: config.signal_buffer.max(1),
        })
    }

    /// Wrap an existing connection.
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            connection,
            signal_buffer: DEFAULT_SIGNAL_BUFFER,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The unique name currently owning `sender`. Signals are filtered
    /// locally against the rule's sender, and only unique names can be
    /// compared there.
    async fn resolve_sender(&self, sender: &str) -> Result<String> {
        if sender.starts_with(':') {
            return Ok(sender.to_string());
        }
        let name = BusName::try_from(sender).map_err(zbus::Error::from)?;
        let dbus = DBusProxy::new(&self.connection).await?;
        owner_or_name(sender, dbus.get_name_owner(name).await)
    }
}

/// Match on the owner when there is one. An unowned name is kept as is, so
/// the bus still routes signals once a service starts.
fn owner_or_name(
    sender: &str,
    owner: std::result::Result<OwnedUniqueName, zbus::fdo::Error>,
) -> Result<String> {
    match owner {
        Ok(owner) => {
            trace!("{} is owned by {}", sender, owner);
            Ok(owner.to_string())
        }
        Err(zbus::fdo::Error::NameHasNoOwner(_)) => {
            debug!("{} has no owner yet, matching on the name", sender);
            Ok(sender.to_string())
        }
        Err(e) => Err(classify(e.into())),
    }
}

/// Split `zbus` errors into remote error replies and connection failures.
fn classify(err: zbus::Error) -> ProxyError {
    match err {
        zbus::Error::MethodError(name, detail, _) => ProxyError::Remote {
            name: name.as_str().to_string(),
            message: detail.unwrap_or_default(),
        },
        zbus::Error::FDO(fdo) => ProxyError::Remote {
            name: fdo.name().to_string(),
            message: fdo.description().unwrap_or_default().to_string(),
        },
        other => ProxyError::Transport(other),
    }
}

#[async_trait]
impl Bus for ZbusBus {
    async fn call(&self, call: MethodCall<'_>) -> Result<Vec<Value>> {
        trace!(
            "Calling {}.{} on {} at {} ({})",
            call.interface,
            call.member,
            call.destination,
            call.path,
            call.args_signature
        );
        let path = call.path.as_str();
        let reply = match to_body(&call.args)? {
            Some(body) => {
                self.connection
                    .call_method(
                        Some(call.destination),
                        path,
                        Some(call.interface),
                        call.member,
                        &body,
                    )
                    .await
            }
            None => {
                self.connection
                    .call_method(
                        Some(call.destination),
                        path,
                        Some(call.interface),
                        call.member,
                        &(),
                    )
                    .await
            }
        }
        .map_err(classify)?;

        from_body(&reply, call.reply_signature)
    }

    async fn subscribe(&self, signal: SignalMatch<'_>) -> Result<SignalFeed> {
        let sender = self.resolve_sender(signal.sender).await?;
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(sender.as_str())?
            .path(signal.path.as_str())?
            .interface(signal.interface)?
            .member(signal.member)?
            .build()
            .into_owned();
        debug!("Adding match rule: {}", rule);

        let mut stream =
            MessageStream::for_match_rule(rule, &self.connection, Some(self.signal_buffer))
                .await
                .map_err(classify)?;

        let (tx, rx) = mpsc::channel(self.signal_buffer);
        let payload: Signature = signal.payload_signature.clone();
        let member = signal.member.to_string();

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let decoded = match message {
                    Ok(message) => from_body(&message, &payload),
                    Err(e) => {
                        warn!("Signal stream for {} failed: {}", member, e);
                        let _ = tx.send(Err(ProxyError::Transport(e))).await;
                        break;
                    }
                };
                if tx.send(decoded).await.is_err() {
                    break;
                }
            }
            debug!("Signal reader for {} finished", member);
        });

        Ok(SignalFeed::with_reader(rx, reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_replaces_well_known_name() {
        let owner = OwnedUniqueName::try_from(":1.42").unwrap();
        let sender = owner_or_name("org.freedesktop.secrets", Ok(owner)).unwrap();
        assert_eq!(sender, ":1.42");
    }

    #[test]
    fn test_unowned_name_is_kept() {
        let missing = zbus::fdo::Error::NameHasNoOwner("no owner".into());
        let sender = owner_or_name("org.freedesktop.secrets", Err(missing)).unwrap();
        assert_eq!(sender, "org.freedesktop.secrets");
    }

    #[test]
    fn test_lookup_failure_is_remote() {
        let denied = zbus::fdo::Error::AccessDenied("nope".into());
        let err = owner_or_name("org.freedesktop.secrets", Err(denied)).unwrap_err();
        assert_eq!(err.remote_name(), Some("org.freedesktop.DBus.Error.AccessDenied"));
    }

    #[test]
    fn test_classify_splits_remote_and_transport() {
        let remote = classify(zbus::fdo::Error::ServiceUnknown("gone".into()).into());
        assert_eq!(remote.remote_name(), Some("org.freedesktop.DBus.Error.ServiceUnknown"));

        let transport = classify(zbus::Error::Address("bad".into()));
        assert!(matches!(transport, ProxyError::Transport(_)));
    }
}
