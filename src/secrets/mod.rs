//! Client bindings for the freedesktop.org Secret Service.
//!
//! The daemon (GNOME Keyring, KWallet, KeePassXC, ...) is served as
//! `org.freedesktop.secrets` on the session bus. The service object lives at
//! [`SECRET_SERVICE_PATH`]; collections, items, sessions and prompts live at
//! paths handed out by the daemon.
//!
//! # Usage
//!
//! ```ignore
//! let service = SecretService::connect().await?;
//! let session = service.open_plain_session().await?;
//! let collection: SecretCollection = service.default_collection().await?
//!     .ok_or("no default collection")?;
//!
//! let created = collection
//!     .create_item(
//!         item_properties("MyItem", [("service", "demo")]),
//!         &Secret::text(session.path().clone(), "my secret"),
//!         false,
//!     )
//!     .await?;
//! ```
//!
//! The root path `/` stands for "no object" and "no prompt needed"; see
//! [`ObjectPath::into_option`](crate::ObjectPath::into_option).

pub mod interfaces;
mod objects;
mod types;

pub use objects::{
    collection_properties, item_properties, SecretCollection, SecretItem, SecretPrompt,
    SecretService, SecretSession,
};
pub use types::{
    CreatedObject, LockResult, OpenedSession, PromptCompletion, SearchItemsResult, Secret,
};

/// Bus name of the Secret Service daemon.
pub const SECRET_SERVICE_BUS_NAME: &str = "org.freedesktop.secrets";

/// Object path of the service object.
pub const SECRET_SERVICE_PATH: &str = "/org/freedesktop/secrets";

/// Alias of the collection new items go to by default.
pub const DEFAULT_COLLECTION: &str = "default";

/// `CreateItem` property key: the item label (`s`).
pub const ITEM_LABEL: &str = "org.freedesktop.Secret.Item.Label";

/// `CreateItem` property key: the item type hint (`s`).
pub const ITEM_TYPE: &str = "org.freedesktop.Secret.Item.Type";

/// `CreateItem` property key: lookup attributes (`a{ss}`).
pub const ITEM_ATTRIBUTES: &str = "org.freedesktop.Secret.Item.Attributes";

/// `CreateCollection` property key: the collection label (`s`).
pub const COLLECTION_LABEL: &str = "org.freedesktop.Secret.Collection.Label";

/// Session algorithm transferring secrets unencrypted.
pub const ALGORITHM_PLAIN: &str = "plain";

/// Session algorithm with DH key exchange and AES-128-CBC.
pub const ALGORITHM_DH_AES: &str = "dh-ietf1024-sha256-aes128-cbc-pkcs7";

/// Default content type for text secrets.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf8";
