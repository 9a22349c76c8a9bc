//! An in-process Secret Service daemon for integration tests.
//!
//! Serves the service object, one `login` collection aliased `default`, and
//! whatever sessions, items and prompts the client creates. Unlocking a
//! locked collection goes through a prompt so prompt handling can be tested.

#![allow(dead_code)]

use async_trait::async_trait;
use secretbus::bus::{IncomingCall, MemoryBus, ObjectHandler, RemoteError, PROPERTIES_INTERFACE};
use secretbus::secrets::interfaces::{
    COLLECTION_INTERFACE, ITEM_INTERFACE, PROMPT_INTERFACE, SERVICE_INTERFACE, SESSION_INTERFACE,
};
use secretbus::secrets::{
    Secret, ALGORITHM_PLAIN, COLLECTION_LABEL, ITEM_ATTRIBUTES, ITEM_LABEL,
    SECRET_SERVICE_BUS_NAME, SECRET_SERVICE_PATH,
};
use secretbus::{ObjectPath, Value, Variant};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const LOGIN: &str = "/org/freedesktop/secrets/collection/login";

const IS_LOCKED: &str = "org.freedesktop.Secret.Error.IsLocked";
const NO_SESSION: &str = "org.freedesktop.Secret.Error.NoSession";
const NOT_SUPPORTED: &str = "org.freedesktop.DBus.Error.NotSupported";

struct Collection {
    label: String,
    locked: bool,
    created: u64,
    modified: u64,
}

struct Item {
    collection: ObjectPath,
    label: String,
    attributes: HashMap<String, String>,
    parameters: Vec<u8>,
    value: Vec<u8>,
    content_type: String,
    created: u64,
    modified: u64,
}

enum PromptAction {
    Unlock(Vec<ObjectPath>),
}

#[derive(Default)]
struct State {
    clock: u64,
    counter: u64,
    collections: BTreeMap<ObjectPath, Collection>,
    aliases: HashMap<String, ObjectPath>,
    items: BTreeMap<ObjectPath, Item>,
    sessions: Vec<ObjectPath>,
    prompts: HashMap<ObjectPath, PromptAction>,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        1_700_000_000 + self.clock
    }

    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn item_locked(&self, item: &Item) -> bool {
        self.collections
            .get(&item.collection)
            .is_some_and(|c| c.locked)
    }

    fn matching(&self, attrs: &HashMap<String, String>, within: Option<&ObjectPath>) -> Vec<ObjectPath> {
        self.items
            .iter()
            .filter(|(_, item)| within.map_or(true, |c| &item.collection == c))
            .filter(|(_, item)| attrs.iter().all(|(k, v)| item.attributes.get(k) == Some(v)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn check_session(&self, session: &ObjectPath) -> Result<(), RemoteError> {
        if self.sessions.contains(session) {
            Ok(())
        } else {
            Err(RemoteError::new(NO_SESSION, format!("no session {}", session)))
        }
    }
}

/// Signal to emit once the state lock is released.
struct Emission {
    path: ObjectPath,
    interface: &'static str,
    member: &'static str,
    payload: Vec<Value>,
}

fn emission(path: &ObjectPath, interface: &'static str, member: &'static str, payload: Vec<Value>) -> Emission {
    Emission {
        path: path.clone(),
        interface,
        member,
        payload,
    }
}

#[derive(Clone)]
pub struct FakeSecretService {
    state: Arc<Mutex<State>>,
}

fn arg<T>(call: &IncomingCall, index: usize) -> Result<T, RemoteError>
where
    T: TryFrom<Value, Error = secretbus::ValueError>,
{
    call.args
        .get(index)
        .cloned()
        .ok_or_else(|| RemoteError::invalid_args(format!("missing argument {}", index)))?
        .try_into()
        .map_err(|e: secretbus::ValueError| RemoteError::invalid_args(e.to_string()))
}

fn path_value(path: &ObjectPath) -> Value {
    Value::ObjectPath(path.clone())
}

fn root() -> Value {
    Value::ObjectPath(ObjectPath::root())
}

impl FakeSecretService {
    /// Serve the daemon on `bus` with an unlocked, empty `login` collection.
    pub async fn start(bus: &MemoryBus) -> Self {
        let mut state = State::default();
        let login = ObjectPath::from(LOGIN);
        let now = state.tick();
        state.collections.insert(
            login.clone(),
            Collection {
                label: "Login".into(),
                locked: false,
                created: now,
                modified: now,
            },
        );
        state.aliases.insert("default".into(), login.clone());

        let fake = Self {
            state: Arc::new(Mutex::new(state)),
        };
        bus.register_object(SECRET_SERVICE_BUS_NAME, SECRET_SERVICE_PATH, Arc::new(fake.clone()))
            .await;
        bus.register_object(SECRET_SERVICE_BUS_NAME, login, Arc::new(fake.clone()))
            .await;
        fake
    }

    pub fn set_locked(&self, collection: &str, locked: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.collections.get_mut(&ObjectPath::from(collection)) {
            c.locked = locked;
        }
    }

    pub fn item_count(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    async fn register(&self, bus: &MemoryBus, path: &ObjectPath) {
        bus.register_object(SECRET_SERVICE_BUS_NAME, path.clone(), Arc::new(self.clone()))
            .await;
    }

    async fn service(&self, bus: &MemoryBus, call: &IncomingCall) -> Result<(Vec<Value>, Vec<Emission>), RemoteError> {
        match call.member.as_str() {
            "OpenSession" => {
                let algorithm: String = arg(call, 0)?;
                if algorithm != ALGORITHM_PLAIN {
                    return Err(RemoteError::new(
                        NOT_SUPPORTED,
                        format!("algorithm {} is not supported", algorithm),
                    ));
                }
                let path = {
                    let mut state = self.state.lock().unwrap();
                    let path = ObjectPath::new(format!(
                        "/org/freedesktop/secrets/session/{}",
                        state.sessions.len() + 1
                    ));
                    state.sessions.push(path.clone());
                    path
                };
                self.register(bus, &path).await;
                Ok((vec![Value::from(Variant::wrap("")), path_value(&path)], vec![]))
            }
            "CreateCollection" => {
                let props: HashMap<String, Variant> = arg(call, 0)?;
                let alias: String = arg(call, 1)?;
                let label = props
                    .get(COLLECTION_LABEL)
                    .and_then(|v| v.value().as_str())
                    .unwrap_or_default()
                    .to_string();
                let path = {
                    let mut state = self.state.lock().unwrap();
                    let id = state.next_id();
                    let path = ObjectPath::new(format!("/org/freedesktop/secrets/collection/c{}", id));
                    let now = state.tick();
                    state.collections.insert(
                        path.clone(),
                        Collection {
                            label,
                            locked: false,
                            created: now,
                            modified: now,
                        },
                    );
                    if !alias.is_empty() {
                        state.aliases.insert(alias, path.clone());
                    }
                    path
                };
                self.register(bus, &path).await;
                let service = ObjectPath::from(SECRET_SERVICE_PATH);
                Ok((
                    vec![path_value(&path), root()],
                    vec![emission(&service, SERVICE_INTERFACE, "CollectionCreated", vec![path_value(&path)])],
                ))
            }
            "SearchItems" => {
                let attrs: HashMap<String, String> = arg(call, 0)?;
                let state = self.state.lock().unwrap();
                let (mut unlocked, mut locked) = (Vec::new(), Vec::new());
                for path in state.matching(&attrs, None) {
                    if state.item_locked(&state.items[&path]) {
                        locked.push(path);
                    } else {
                        unlocked.push(path);
                    }
                }
                Ok((vec![Value::object_paths(unlocked), Value::object_paths(locked)], vec![]))
            }
            "Unlock" => {
                let objects: Vec<ObjectPath> = arg(call, 0)?;
                let (done, prompt) = {
                    let mut state = self.state.lock().unwrap();
                    let (pending, done): (Vec<_>, Vec<_>) = objects
                        .into_iter()
                        .partition(|p| state.collections.get(p).is_some_and(|c| c.locked));
                    if pending.is_empty() {
                        (done, None)
                    } else {
                        let id = state.next_id();
                        let prompt = ObjectPath::new(format!("/org/freedesktop/secrets/prompt/p{}", id));
                        state.prompts.insert(prompt.clone(), PromptAction::Unlock(pending));
                        (done, Some(prompt))
                    }
                };
                match prompt {
                    Some(prompt) => {
                        self.register(bus, &prompt).await;
                        Ok((vec![Value::object_paths(done), path_value(&prompt)], vec![]))
                    }
                    None => Ok((vec![Value::object_paths(done), root()], vec![])),
                }
            }
            "Lock" => {
                let objects: Vec<ObjectPath> = arg(call, 0)?;
                let mut state = self.state.lock().unwrap();
                for path in &objects {
                    if let Some(c) = state.collections.get_mut(path) {
                        c.locked = true;
                    }
                }
                Ok((vec![Value::object_paths(objects), root()], vec![]))
            }
            "GetSecrets" => {
                let items: Vec<ObjectPath> = arg(call, 0)?;
                let session: ObjectPath = arg(call, 1)?;
                let state = self.state.lock().unwrap();
                state.check_session(&session)?;
                let mut entries = Vec::new();
                for path in items {
                    if let Some(item) = state.items.get(&path).filter(|i| !state.item_locked(i)) {
                        entries.push((path_value(&path), secret_of(item, &session).to_value()));
                    }
                }
                let dict = secretbus::value::Dict::new(
                    secretbus::Type::ObjectPath,
                    Secret::struct_type().clone(),
                    entries,
                )
                .map_err(|e| RemoteError::failed(e.to_string()))?;
                Ok((vec![Value::Dict(dict)], vec![]))
            }
            "ReadAlias" => {
                let name: String = arg(call, 0)?;
                let state = self.state.lock().unwrap();
                let path = state.aliases.get(&name).cloned().unwrap_or_else(ObjectPath::root);
                Ok((vec![path_value(&path)], vec![]))
            }
            "SetAlias" => {
                let name: String = arg(call, 0)?;
                let target: ObjectPath = arg(call, 1)?;
                let mut state = self.state.lock().unwrap();
                match target.into_option() {
                    Some(path) if state.collections.contains_key(&path) => {
                        state.aliases.insert(name, path);
                    }
                    Some(path) => {
                        return Err(RemoteError::new(
                            "org.freedesktop.Secret.Error.NoSuchObject",
                            format!("no collection {}", path),
                        ))
                    }
                    None => {
                        state.aliases.remove(&name);
                    }
                }
                Ok((vec![], vec![]))
            }
            other => Err(RemoteError::unknown_method(SERVICE_INTERFACE, other)),
        }
    }

    async fn collection(&self, bus: &MemoryBus, call: &IncomingCall) -> Result<(Vec<Value>, Vec<Emission>), RemoteError> {
        let path = &call.path;
        match call.member.as_str() {
            "Delete" => {
                let removed: Vec<ObjectPath> = {
                    let mut state = self.state.lock().unwrap();
                    state.collections.remove(path);
                    state.aliases.retain(|_, target| target != path);
                    let items: Vec<_> = state
                        .items
                        .iter()
                        .filter(|(_, i)| &i.collection == path)
                        .map(|(p, _)| p.clone())
                        .collect();
                    for item in &items {
                        state.items.remove(item);
                    }
                    items
                };
                for item in removed.iter().chain(std::iter::once(path)) {
                    bus.unregister_object(SECRET_SERVICE_BUS_NAME, item).await;
                }
                let service = ObjectPath::from(SECRET_SERVICE_PATH);
                Ok((
                    vec![root()],
                    vec![emission(&service, SERVICE_INTERFACE, "CollectionDeleted", vec![path_value(path)])],
                ))
            }
            "SearchItems" => {
                let attrs: HashMap<String, String> = arg(call, 0)?;
                let state = self.state.lock().unwrap();
                Ok((vec![Value::object_paths(state.matching(&attrs, Some(path)))], vec![]))
            }
            "CreateItem" => {
                let props: HashMap<String, Variant> = arg(call, 0)?;
                let secret: Secret = arg(call, 1)?;
                let replace: bool = arg(call, 2)?;
                let label = props
                    .get(ITEM_LABEL)
                    .and_then(|v| v.value().as_str())
                    .unwrap_or_default()
                    .to_string();
                let attributes: HashMap<String, String> = match props.get(ITEM_ATTRIBUTES) {
                    Some(v) => v
                        .value()
                        .clone()
                        .try_into()
                        .map_err(|e: secretbus::ValueError| RemoteError::invalid_args(e.to_string()))?,
                    None => HashMap::new(),
                };

                let (item_path, member) = {
                    let mut state = self.state.lock().unwrap();
                    state.check_session(&secret.session)?;
                    if state.collections.get(path).is_some_and(|c| c.locked) {
                        return Err(RemoteError::new(IS_LOCKED, "collection is locked"));
                    }
                    let now = state.tick();
                    let existing = replace
                        .then(|| {
                            state
                                .matching(&attributes, Some(path))
                                .into_iter()
                                .find(|p| state.items[p].attributes == attributes)
                        })
                        .flatten();
                    match existing {
                        Some(existing) => {
                            let item = state.items.get_mut(&existing).unwrap();
                            item.label = label;
                            item.parameters = secret.parameters;
                            item.value = secret.value;
                            item.content_type = secret.content_type;
                            item.modified = now;
                            (existing, "ItemChanged")
                        }
                        None => {
                            let id = state.next_id();
                            let item_path = ObjectPath::new(format!("{}/{}", path, id));
                            state.items.insert(
                                item_path.clone(),
                                Item {
                                    collection: path.clone(),
                                    label,
                                    attributes,
                                    parameters: secret.parameters,
                                    value: secret.value,
                                    content_type: secret.content_type,
                                    created: now,
                                    modified: now,
                                },
                            );
                            (item_path, "ItemCreated")
                        }
                    }
                };
                if member == "ItemCreated" {
                    self.register(bus, &item_path).await;
                }
                Ok((
                    vec![path_value(&item_path), root()],
                    vec![emission(path, COLLECTION_INTERFACE, member, vec![path_value(&item_path)])],
                ))
            }
            other => Err(RemoteError::unknown_method(COLLECTION_INTERFACE, other)),
        }
    }

    async fn item(&self, bus: &MemoryBus, call: &IncomingCall) -> Result<(Vec<Value>, Vec<Emission>), RemoteError> {
        let path = &call.path;
        match call.member.as_str() {
            "Delete" => {
                let collection = {
                    let mut state = self.state.lock().unwrap();
                    let item = state
                        .items
                        .remove(path)
                        .ok_or_else(|| RemoteError::unknown_object(path))?;
                    item.collection
                };
                bus.unregister_object(SECRET_SERVICE_BUS_NAME, path).await;
                Ok((
                    vec![root()],
                    vec![emission(&collection, COLLECTION_INTERFACE, "ItemDeleted", vec![path_value(path)])],
                ))
            }
            "GetSecret" => {
                let session: ObjectPath = arg(call, 0)?;
                let state = self.state.lock().unwrap();
                state.check_session(&session)?;
                let item = state.items.get(path).ok_or_else(|| RemoteError::unknown_object(path))?;
                if state.item_locked(item) {
                    return Err(RemoteError::new(IS_LOCKED, "item is locked"));
                }
                Ok((vec![secret_of(item, &session).to_value()], vec![]))
            }
            "SetSecret" => {
                let secret: Secret = arg(call, 0)?;
                let collection = {
                    let mut state = self.state.lock().unwrap();
                    state.check_session(&secret.session)?;
                    let now = state.tick();
                    let item = state
                        .items
                        .get_mut(path)
                        .ok_or_else(|| RemoteError::unknown_object(path))?;
                    item.parameters = secret.parameters;
                    item.value = secret.value;
                    item.content_type = secret.content_type;
                    item.modified = now;
                    item.collection.clone()
                };
                Ok((
                    vec![],
                    vec![emission(&collection, COLLECTION_INTERFACE, "ItemChanged", vec![path_value(path)])],
                ))
            }
            other => Err(RemoteError::unknown_method(ITEM_INTERFACE, other)),
        }
    }

    async fn session(&self, bus: &MemoryBus, call: &IncomingCall) -> Result<(Vec<Value>, Vec<Emission>), RemoteError> {
        match call.member.as_str() {
            "Close" => {
                self.state.lock().unwrap().sessions.retain(|s| s != &call.path);
                bus.unregister_object(SECRET_SERVICE_BUS_NAME, &call.path).await;
                Ok((vec![], vec![]))
            }
            other => Err(RemoteError::unknown_method(SESSION_INTERFACE, other)),
        }
    }

    async fn prompt(&self, bus: &MemoryBus, call: &IncomingCall) -> Result<(Vec<Value>, Vec<Emission>), RemoteError> {
        let action = self
            .state
            .lock()
            .unwrap()
            .prompts
            .remove(&call.path)
            .ok_or_else(|| RemoteError::unknown_object(&call.path))?;
        bus.unregister_object(SECRET_SERVICE_BUS_NAME, &call.path).await;

        let completed = match (call.member.as_str(), action) {
            ("Prompt", PromptAction::Unlock(objects)) => {
                let mut state = self.state.lock().unwrap();
                for path in &objects {
                    if let Some(c) = state.collections.get_mut(path) {
                        c.locked = false;
                    }
                }
                vec![
                    Value::from(false),
                    Value::from(Variant::wrap(Value::object_paths(objects))),
                ]
            }
            ("Dismiss", _) => vec![Value::from(true), Value::from(Variant::wrap(""))],
            (other, _) => return Err(RemoteError::unknown_method(PROMPT_INTERFACE, other)),
        };
        Ok((
            vec![],
            vec![emission(&call.path, PROMPT_INTERFACE, "Completed", completed)],
        ))
    }

    fn properties(&self, call: &IncomingCall) -> Result<Vec<Value>, RemoteError> {
        let interface: String = arg(call, 0)?;
        let all = self.property_map(&call.path, &interface)?;
        match call.member.as_str() {
            "GetAll" => Ok(vec![Value::variant_dict(all)]),
            "Get" => {
                let name: String = arg(call, 1)?;
                all.into_iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| vec![Value::from(v)])
                    .ok_or_else(|| RemoteError::invalid_args(format!("no property {}", name)))
            }
            "Set" => {
                let name: String = arg(call, 1)?;
                let value: Variant = arg(call, 2)?;
                self.set_property(&call.path, &interface, &name, value)?;
                Ok(vec![])
            }
            other => Err(RemoteError::unknown_method(PROPERTIES_INTERFACE, other)),
        }
    }

    fn property_map(&self, path: &ObjectPath, interface: &str) -> Result<Vec<(String, Variant)>, RemoteError> {
        let state = self.state.lock().unwrap();
        let props = match interface {
            SERVICE_INTERFACE => vec![(
                "Collections".to_string(),
                Variant::wrap(Value::object_paths(state.collections.keys())),
            )],
            COLLECTION_INTERFACE => {
                let c = state
                    .collections
                    .get(path)
                    .ok_or_else(|| RemoteError::unknown_object(path))?;
                let items: Vec<&ObjectPath> = state
                    .items
                    .iter()
                    .filter(|(_, i)| &i.collection == path)
                    .map(|(p, _)| p)
                    .collect();
                vec![
                    ("Items".to_string(), Variant::wrap(Value::object_paths(items))),
                    ("Label".to_string(), Variant::wrap(c.label.as_str())),
                    ("Locked".to_string(), Variant::wrap(c.locked)),
                    ("Created".to_string(), Variant::wrap(c.created)),
                    ("Modified".to_string(), Variant::wrap(c.modified)),
                ]
            }
            ITEM_INTERFACE => {
                let i = state.items.get(path).ok_or_else(|| RemoteError::unknown_object(path))?;
                vec![
                    ("Locked".to_string(), Variant::wrap(state.item_locked(i))),
                    (
                        "Attributes".to_string(),
                        Variant::wrap(Value::string_dict(i.attributes.clone())),
                    ),
                    ("Label".to_string(), Variant::wrap(i.label.as_str())),
                    ("Created".to_string(), Variant::wrap(i.created)),
                    ("Modified".to_string(), Variant::wrap(i.modified)),
                ]
            }
            other => {
                return Err(RemoteError::invalid_args(format!(
                    "no properties on interface {}",
                    other
                )))
            }
        };
        Ok(props)
    }

    fn set_property(&self, path: &ObjectPath, interface: &str, name: &str, value: Variant) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let now = state.tick();
        let bad = |e: secretbus::ValueError| RemoteError::invalid_args(e.to_string());
        match (interface, name) {
            (COLLECTION_INTERFACE, "Label") => {
                let c = state
                    .collections
                    .get_mut(path)
                    .ok_or_else(|| RemoteError::unknown_object(path))?;
                c.label = value.into_value().try_into().map_err(bad)?;
                c.modified = now;
            }
            (ITEM_INTERFACE, "Label") | (ITEM_INTERFACE, "Attributes") => {
                let i = state
                    .items
                    .get_mut(path)
                    .ok_or_else(|| RemoteError::unknown_object(path))?;
                if name == "Label" {
                    i.label = value.into_value().try_into().map_err(bad)?;
                } else {
                    i.attributes = value.into_value().try_into().map_err(bad)?;
                }
                i.modified = now;
            }
            _ => {
                return Err(RemoteError::new(
                    "org.freedesktop.DBus.Error.PropertyReadOnly",
                    format!("{}.{} is read-only", interface, name),
                ))
            }
        }
        Ok(())
    }
}

fn secret_of(item: &Item, session: &ObjectPath) -> Secret {
    Secret {
        session: session.clone(),
        parameters: item.parameters.clone(),
        value: item.value.clone(),
        content_type: item.content_type.clone(),
    }
}

#[async_trait]
impl ObjectHandler for FakeSecretService {
    async fn handle(&self, bus: &MemoryBus, call: IncomingCall) -> Result<Vec<Value>, RemoteError> {
        if call.interface == PROPERTIES_INTERFACE {
            return self.properties(&call);
        }

        let (reply, emissions) = match call.interface.as_str() {
            SERVICE_INTERFACE if call.path.as_str() == SECRET_SERVICE_PATH => {
                self.service(bus, &call).await?
            }
            COLLECTION_INTERFACE => self.collection(bus, &call).await?,
            ITEM_INTERFACE => self.item(bus, &call).await?,
            SESSION_INTERFACE => self.session(bus, &call).await?,
            PROMPT_INTERFACE => self.prompt(bus, &call).await?,
            other => return Err(RemoteError::unknown_method(other, &call.member)),
        };

        for e in emissions {
            bus.emit(SECRET_SERVICE_BUS_NAME, &e.path, e.interface, e.member, e.payload)
                .await;
        }
        Ok(reply)
    }
}
