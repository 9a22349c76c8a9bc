use super::interfaces;
use super::types::{
    CreatedObject, LockResult, OpenedSession, PromptCompletion, SearchItemsResult, Secret,
};
use super::{
    ALGORITHM_PLAIN, COLLECTION_LABEL, DEFAULT_COLLECTION, ITEM_ATTRIBUTES, ITEM_LABEL,
    SECRET_SERVICE_BUS_NAME, SECRET_SERVICE_PATH,
};
use crate::binding::{BoundObject, WellKnownObject};
use crate::bus::SharedBus;
use crate::config::BusConfig;
use crate::dbus::ZbusBus;
use crate::descriptor::{DefinitionError, InterfaceDescriptor};
use crate::error::{ProxyError, Result};
use crate::proxy::{Proxy, TypedSignalStream};
use crate::value::{ObjectPath, Value, ValueError, Variant};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

fn single<T>(mut reply: Vec<Value>) -> Result<T>
where
    T: TryFrom<Value, Error = ValueError>,
{
    if reply.len() != 1 {
        return Err(ValueError::Arity {
            expected: 1,
            found: reply.len(),
        }
        .into());
    }
    Ok(reply.remove(0).try_into()?)
}

fn object_path_payload(mut payload: Vec<Value>) -> std::result::Result<ObjectPath, ValueError> {
    if payload.len() != 1 {
        return Err(ValueError::Arity {
            expected: 1,
            found: payload.len(),
        });
    }
    payload.remove(0).try_into()
}

fn object_paths(paths: &[ObjectPath]) -> Value {
    Value::object_paths(paths.iter())
}

/// `CreateItem` properties: a label plus lookup attributes.
pub fn item_properties<I, K, V>(label: &str, attributes: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    Value::variant_dict([
        (ITEM_LABEL, Variant::wrap(label)),
        (ITEM_ATTRIBUTES, Variant::wrap(Value::string_dict(attributes))),
    ])
}

/// `CreateCollection` properties: just a label.
pub fn collection_properties(label: &str) -> Value {
    Value::variant_dict([(COLLECTION_LABEL, Variant::wrap(label))])
}

macro_rules! bound_object {
    ($name:ident, $($iface:ident),+) => {
        impl BoundObject for $name {
            const SERVICE: &'static str = SECRET_SERVICE_BUS_NAME;

            fn interfaces() -> std::result::Result<Vec<Arc<InterfaceDescriptor>>, DefinitionError> {
                Ok(vec![$(interfaces::$iface()?),+])
            }

            fn from_proxy(proxy: Proxy) -> Self {
                $name(proxy)
            }

            fn proxy(&self) -> &Proxy {
                &self.0
            }
        }
    };
}

/// The Secret Service itself, at `/org/freedesktop/secrets`.
#[derive(Debug, Clone)]
pub struct SecretService(Proxy);

bound_object!(SecretService, service);

impl WellKnownObject for SecretService {
    const PATH: &'static str = SECRET_SERVICE_PATH;
}

impl SecretService {
    /// Bind to the service on the session bus.
    pub async fn connect() -> Result<Self> {
        let bus = ZbusBus::session().await?;
        Ok(Self::bind_default(Arc::new(bus))?)
    }

    /// Bind to the service on the bus described by `config`.
    pub async fn connect_with(config: &BusConfig) -> Result<Self> {
        let bus = ZbusBus::connect(config).await?;
        Ok(Self::bind_default(Arc::new(bus))?)
    }

    pub fn new(bus: SharedBus) -> Result<Self> {
        Ok(Self::bind_default(bus)?)
    }

    pub async fn open_session(&self, algorithm: &str, input: Variant) -> Result<OpenedSession> {
        let reply = self
            .0
            .call_method("OpenSession", vec![Value::from(algorithm), Value::from(input)])
            .await?;
        let opened = OpenedSession::try_from(reply)?;
        debug!("Opened {} session {}", algorithm, opened.session);
        Ok(opened)
    }

    /// Open a session transferring secrets unencrypted.
    pub async fn open_plain_session(&self) -> Result<SecretSession> {
        let opened = self.open_session(ALGORITHM_PLAIN, Variant::wrap("")).await?;
        Ok(self.sibling(opened.session)?)
    }

    pub async fn create_collection(&self, properties: Value, alias: &str) -> Result<CreatedObject> {
        let reply = self
            .0
            .call_method("CreateCollection", vec![properties, Value::from(alias)])
            .await?;
        Ok(CreatedObject::try_from(reply)?)
    }

    /// Create a collection labelled `label`, optionally under `alias`.
    pub async fn create_labelled_collection(&self, label: &str, alias: &str) -> Result<CreatedObject> {
        self.create_collection(collection_properties(label), alias).await
    }

    pub async fn search_items<I, K, V>(&self, attributes: I) -> Result<SearchItemsResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let reply = self
            .0
            .call_method("SearchItems", vec![Value::string_dict(attributes)])
            .await?;
        Ok(SearchItemsResult::try_from(reply)?)
    }

    pub async fn unlock(&self, objects: &[ObjectPath]) -> Result<LockResult> {
        let reply = self.0.call_method("Unlock", vec![object_paths(objects)]).await?;
        Ok(LockResult::try_from(reply)?)
    }

    pub async fn lock(&self, objects: &[ObjectPath]) -> Result<LockResult> {
        let reply = self.0.call_method("Lock", vec![object_paths(objects)]).await?;
        Ok(LockResult::try_from(reply)?)
    }

    /// Secrets of several items at once, keyed by item path.
    pub async fn get_secrets(
        &self,
        items: &[ObjectPath],
        session: &ObjectPath,
    ) -> Result<HashMap<ObjectPath, Secret>> {
        let reply = self
            .0
            .call_method(
                "GetSecrets",
                vec![object_paths(items), Value::ObjectPath(session.clone())],
            )
            .await?;
        match reply.into_iter().next() {
            Some(Value::Dict(dict)) => dict
                .into_entries()
                .into_iter()
                .map(|(k, v)| Ok((ObjectPath::try_from(k)?, Secret::try_from(v)?)))
                .collect(),
            _ => Err(ProxyError::mismatch("GetSecrets", "expected a{o(oayays)}")),
        }
    }

    /// The collection behind `name`, or `/` if there is none.
    pub async fn read_alias(&self, name: &str) -> Result<ObjectPath> {
        single(self.0.call_method("ReadAlias", vec![Value::from(name)]).await?)
    }

    /// Point `name` at `collection`; `/` removes the alias.
    pub async fn set_alias(&self, name: &str, collection: &ObjectPath) -> Result<()> {
        self.0
            .call_method(
                "SetAlias",
                vec![Value::from(name), Value::ObjectPath(collection.clone())],
            )
            .await?;
        Ok(())
    }

    pub async fn collections(&self) -> Result<Vec<ObjectPath>> {
        Ok(self.0.get_property("Collections").await?.try_into()?)
    }

    /// The collection aliased `default`, if any.
    pub async fn default_collection(&self) -> Result<Option<SecretCollection>> {
        match self.read_alias(DEFAULT_COLLECTION).await?.into_option() {
            Some(path) => Ok(Some(self.sibling(path)?)),
            None => Ok(None),
        }
    }

    pub async fn collection_created(&self) -> Result<TypedSignalStream<ObjectPath>> {
        Ok(self
            .0
            .subscribe_signal("CollectionCreated")
            .await?
            .typed(object_path_payload))
    }

    pub async fn collection_deleted(&self) -> Result<TypedSignalStream<ObjectPath>> {
        Ok(self
            .0
            .subscribe_signal("CollectionDeleted")
            .await?
            .typed(object_path_payload))
    }

    pub async fn collection_changed(&self) -> Result<TypedSignalStream<ObjectPath>> {
        Ok(self
            .0
            .subscribe_signal("CollectionChanged")
            .await?
            .typed(object_path_payload))
    }
}

/// A collection of items.
#[derive(Debug, Clone)]
pub struct SecretCollection(Proxy);

bound_object!(SecretCollection, collection);

impl SecretCollection {
    /// Delete the collection. Returns the prompt to run, or `/`.
    pub async fn delete(&self) -> Result<ObjectPath> {
        single(self.0.call_method("Delete", vec![]).await?)
    }

    pub async fn search_items<I, K, V>(&self, attributes: I) -> Result<Vec<ObjectPath>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        single(
            self.0
                .call_method("SearchItems", vec![Value::string_dict(attributes)])
                .await?,
        )
    }

    /// Store `secret` as a new item, or overwrite the item with the same
    /// attributes when `replace` is set.
    pub async fn create_item(
        &self,
        properties: Value,
        secret: &Secret,
        replace: bool,
    ) -> Result<CreatedObject> {
        let reply = self
            .0
            .call_method(
                "CreateItem",
                vec![properties, secret.to_value(), Value::from(replace)],
            )
            .await?;
        let created = CreatedObject::try_from(reply)?;
        info!("Created item {} in {}", created.path, self.path());
        Ok(created)
    }

    pub async fn items(&self) -> Result<Vec<ObjectPath>> {
        Ok(self.0.get_property("Items").await?.try_into()?)
    }

    pub async fn label(&self) -> Result<String> {
        Ok(self.0.get_property("Label").await?.try_into()?)
    }

    pub async fn set_label(&self, label: &str) -> Result<()> {
        self.0.set_property("Label", label).await
    }

    pub async fn locked(&self) -> Result<bool> {
        Ok(self.0.get_property("Locked").await?.try_into()?)
    }

    /// Creation time, seconds since the Unix epoch.
    pub async fn created(&self) -> Result<u64> {
        Ok(self.0.get_property("Created").await?.try_into()?)
    }

    pub async fn modified(&self) -> Result<u64> {
        Ok(self.0.get_property("Modified").await?.try_into()?)
    }

    pub async fn item_created(&self) -> Result<TypedSignalStream<ObjectPath>> {
        Ok(self
            .0
            .subscribe_signal("ItemCreated")
            .await?
            .typed(object_path_payload))
    }

    pub async fn item_deleted(&self) -> Result<TypedSignalStream<ObjectPath>> {
        Ok(self
            .0
            .subscribe_signal("ItemDeleted")
            .await?
            .typed(object_path_payload))
    }

    pub async fn item_changed(&self) -> Result<TypedSignalStream<ObjectPath>> {
        Ok(self
            .0
            .subscribe_signal("ItemChanged")
            .await?
            .typed(object_path_payload))
    }
}

/// One stored secret with its label and attributes.
#[derive(Debug, Clone)]
pub struct SecretItem(Proxy);

bound_object!(SecretItem, item);

impl SecretItem {
    /// Delete the item. Returns the prompt to run, or `/`.
    pub async fn delete(&self) -> Result<ObjectPath> {
        let prompt = single(self.0.call_method("Delete", vec![]).await?)?;
        info!("Deleted item {}", self.path());
        Ok(prompt)
    }

    /// The secret, encoded for `session`.
    pub async fn get_secret(&self, session: &ObjectPath) -> Result<Secret> {
        single(
            self.0
                .call_method("GetSecret", vec![Value::ObjectPath(session.clone())])
                .await?,
        )
    }

    pub async fn set_secret(&self, secret: &Secret) -> Result<()> {
        self.0.call_method("SetSecret", vec![secret.to_value()]).await?;
        Ok(())
    }

    pub async fn locked(&self) -> Result<bool> {
        Ok(self.0.get_property("Locked").await?.try_into()?)
    }

    pub async fn attributes(&self) -> Result<HashMap<String, String>> {
        Ok(self.0.get_property("Attributes").await?.try_into()?)
    }

    pub async fn set_attributes<I, K, V>(&self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.0
            .set_property("Attributes", Value::string_dict(attributes))
            .await
    }

    pub async fn label(&self) -> Result<String> {
        Ok(self.0.get_property("Label").await?.try_into()?)
    }

    pub async fn set_label(&self, label: &str) -> Result<()> {
        self.0.set_property("Label", label).await
    }

    pub async fn created(&self) -> Result<u64> {
        Ok(self.0.get_property("Created").await?.try_into()?)
    }

    pub async fn modified(&self) -> Result<u64> {
        Ok(self.0.get_property("Modified").await?.try_into()?)
    }
}

/// A session opened with `OpenSession`.
#[derive(Debug, Clone)]
pub struct SecretSession(Proxy);

bound_object!(SecretSession, session);

impl SecretSession {
    pub async fn close(&self) -> Result<()> {
        self.0.call_method("Close", vec![]).await?;
        debug!("Closed session {}", self.path());
        Ok(())
    }
}

/// A pending user interaction.
#[derive(Debug, Clone)]
pub struct SecretPrompt(Proxy);

bound_object!(SecretPrompt, prompt);

impl SecretPrompt {
    /// Show the prompt, parented to `window_id` (empty for none).
    pub async fn prompt(&self, window_id: &str) -> Result<()> {
        self.0.call_method("Prompt", vec![Value::from(window_id)]).await?;
        Ok(())
    }

    pub async fn dismiss(&self) -> Result<()> {
        self.0.call_method("Dismiss", vec![]).await?;
        Ok(())
    }

    pub async fn completed(&self) -> Result<TypedSignalStream<PromptCompletion>> {
        Ok(self
            .0
            .subscribe_signal("Completed")
            .await?
            .typed(<PromptCompletion as TryFrom<Vec<Value>>>::try_from))
    }

    /// Show the prompt and wait for the user to finish with it.
    ///
    /// Emissions are not replayed, so the subscription is in place before
    /// `Prompt` is called.
    pub async fn run(&self, window_id: &str) -> Result<PromptCompletion> {
        let mut completed = self.completed().await?;
        self.prompt(window_id).await?;
        debug!("Waiting for prompt {}", self.path());

        match completed.next().await {
            Some(result) => result,
            None => Err(ProxyError::Transport(zbus::Error::InputOutput(Arc::new(
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before the prompt completed",
                ),
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    #[test]
    fn test_item_properties_shape() {
        let props = item_properties("MyItem", [("Attribute1", "Value1")]);
        assert_eq!(props.value_type().to_string(), "a{sv}");
        let map: HashMap<String, Variant> = props.try_into().unwrap();
        assert_eq!(map[ITEM_LABEL].value().as_str(), Some("MyItem"));
        assert_eq!(map[ITEM_ATTRIBUTES].tag().to_string(), "a{ss}");
    }

    #[test]
    fn test_bindings_use_service_name() {
        let bus: SharedBus = Arc::new(MemoryBus::new());
        let service = SecretService::new(bus.clone()).unwrap();
        assert_eq!(service.proxy().destination(), SECRET_SERVICE_BUS_NAME);
        assert_eq!(service.path().as_str(), SECRET_SERVICE_PATH);

        let item = SecretItem::bind(bus, "/org/freedesktop/secrets/collection/login/7").unwrap();
        assert_eq!(item.proxy().destination(), SECRET_SERVICE_BUS_NAME);
        assert_eq!(
            item.proxy().interfaces()[0].name(),
            interfaces::ITEM_INTERFACE
        );
    }

    #[test]
    fn test_single_checks_arity() {
        let err = single::<ObjectPath>(vec![]).unwrap_err();
        assert!(matches!(err, ProxyError::SignatureMismatch { .. }));
        let path: ObjectPath = single(vec![Value::ObjectPath("/".into())]).unwrap();
        assert!(path.is_root());
    }
}
