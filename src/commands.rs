//! Handlers for the `secretbus` subcommands.

use anyhow::{anyhow, bail, Context, Result};
use futures_util::stream::{self, LocalBoxStream};
use futures_util::StreamExt;
use secretbus::binding::BoundObject;
use secretbus::config::BusKind;
use secretbus::descriptor::InterfaceDescriptor;
use secretbus::proxy::TypedSignalStream;
use secretbus::secrets::{
    interfaces, item_properties, PromptCompletion, Secret, SecretCollection, SecretItem,
    SecretPrompt, SecretService, SecretSession, DEFAULT_COLLECTION, TEXT_CONTENT_TYPE,
};
use secretbus::{Config, ObjectPath, Value};
use std::path::Path;
use tracing::{debug, info};

/// Parse `key=value` attribute arguments.
pub fn parse_attributes(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("attribute '{}' is not in key=value form", pair))?;
            if k.is_empty() {
                bail!("attribute '{}' has an empty key", pair);
            }
            Ok((k.to_string(), v.to_string()))
        })
        .collect()
}

fn print_descriptor(iface: &InterfaceDescriptor) {
    println!("{}", iface.name());
    for m in iface.methods() {
        if m.output.is_empty() {
            println!("  method   {}({})", m.name, m.input);
        } else {
            println!("  method   {}({}) -> {}", m.name, m.input, m.output);
        }
    }
    for p in iface.properties() {
        let access = if p.access.is_writable() { "readwrite" } else { "read" };
        println!("  property {}: {} ({})", p.name, p.ty, access);
    }
    for s in iface.signals() {
        println!("  signal   {}({})", s.name, s.payload);
    }
}

fn matches_interface(name: &str, filter: &str) -> bool {
    name == filter
        || name
            .rsplit('.')
            .next()
            .is_some_and(|short| short.eq_ignore_ascii_case(filter))
}

/// Handle `secretbus describe [interface]`.
pub fn describe(filter: Option<&str>) -> Result<()> {
    let all = interfaces::all()?;
    let mut shown = 0;
    for iface in all
        .iter()
        .filter(|i| filter.map_or(true, |f| matches_interface(i.name(), f)))
    {
        if shown > 0 {
            println!();
        }
        print_descriptor(iface);
        shown += 1;
    }
    if shown == 0 {
        bail!("no interface matches '{}'", filter.unwrap_or_default());
    }
    Ok(())
}

/// Handle `secretbus config --show`.
pub fn show_config(config: &Config, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# defaults (no config file)"),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Settings changed by `secretbus config`.
#[derive(Debug, Default)]
pub struct ConfigChanges {
    pub log_level: Option<String>,
    pub bus: Option<String>,
    pub address: Option<String>,
    pub timeout: Option<u64>,
}

/// Handle `secretbus config --log-level ..`: apply changes, validate and save to `path`.
pub fn update_config(mut config: Config, path: &Path, changes: ConfigChanges) -> Result<()> {
    let mut changed = false;

    if let Some(level) = changes.log_level {
        config.log_level = level.to_ascii_lowercase();
        changed = true;
    }

    if let Some(kind) = changes.bus {
        config.bus.kind = match kind.to_ascii_lowercase().as_str() {
            "session" => BusKind::Session,
            "system" => BusKind::System,
            _ => bail!("unknown bus '{}' (use 'session' or 'system')", kind),
        };
        config.bus.address = None;
        changed = true;
    }

    if let Some(address) = changes.address {
        config.bus.kind = BusKind::Address;
        config.bus.address = Some(address);
        changed = true;
    }

    if let Some(secs) = changes.timeout {
        config.bus.method_timeout_secs = (secs > 0).then_some(secs);
        changed = true;
    }

    if !changed {
        bail!("nothing to do (try --show, or set an option)");
    }
    config.validate()?;
    config.save_to(path)?;
    println!("Configuration updated.");
    Ok(())
}

async fn complete_prompt(service: &SecretService, prompt: &ObjectPath) -> Result<PromptCompletion> {
    info!("Waiting for user confirmation ({})", prompt);
    let prompt: SecretPrompt = service.sibling(prompt.clone())?;
    let completion = prompt.run("").await?;
    if completion.dismissed {
        bail!("prompt was dismissed");
    }
    Ok(completion)
}

async fn unlock_all(service: &SecretService, objects: &[ObjectPath]) -> Result<()> {
    if objects.is_empty() {
        return Ok(());
    }
    let result = service.unlock(objects).await?;
    if let Some(prompt) = result.prompt() {
        complete_prompt(service, prompt).await?;
    }
    Ok(())
}

/// Handle `secretbus alias <name>`.
pub async fn alias(service: &SecretService, name: &str) -> Result<()> {
    match service.read_alias(name).await?.into_option() {
        Some(path) => println!("{}", path),
        None => bail!("no collection is aliased '{}'", name),
    }
    Ok(())
}

/// Handle `secretbus collections`.
pub async fn collections(service: &SecretService) -> Result<()> {
    for path in service.collections().await? {
        let collection: SecretCollection = service.sibling(path.clone())?;
        let label = collection.label().await?;
        let locked = collection.locked().await?;
        println!(
            "{}\t{}{}",
            path,
            label,
            if locked { "\t(locked)" } else { "" }
        );
    }
    Ok(())
}

/// Handle `secretbus search --attr k=v`.
pub async fn search(service: &SecretService, attributes: &[(String, String)]) -> Result<()> {
    let found = service.search_items(attributes.iter().cloned()).await?;
    for path in &found.unlocked {
        let item: SecretItem = service.sibling(path.clone())?;
        println!("{}\t{}", path, item.label().await?);
    }
    for path in &found.locked {
        println!("{}\t(locked)", path);
    }
    if found.is_empty() {
        eprintln!("No matching items.");
    }
    Ok(())
}

/// Handle `secretbus store`.
pub async fn store(
    service: &SecretService,
    label: &str,
    attributes: &[(String, String)],
    alias: &str,
    secret: &str,
    replace: bool,
) -> Result<()> {
    let collection_path = service
        .read_alias(alias)
        .await?
        .into_option()
        .ok_or_else(|| anyhow!("no collection is aliased '{}'", alias))?;
    let collection: SecretCollection = service.sibling(collection_path.clone())?;
    if collection.locked().await? {
        unlock_all(service, &[collection_path]).await?;
    }

    let session = service.open_plain_session().await?;
    let secret = Secret::new(session.path().clone(), secret.as_bytes(), TEXT_CONTENT_TYPE);
    let properties = item_properties(label, attributes.iter().cloned());
    let item = close_after(
        &session,
        create_item(service, &collection, properties, &secret, replace),
    )
    .await?;
    println!("{}", item);
    Ok(())
}

async fn create_item(
    service: &SecretService,
    collection: &SecretCollection,
    properties: Value,
    secret: &Secret,
    replace: bool,
) -> Result<ObjectPath> {
    let created = collection.create_item(properties, secret, replace).await?;
    match (created.path(), created.prompt()) {
        (Some(path), _) => Ok(path.clone()),
        (None, Some(prompt)) => complete_prompt(service, prompt)
            .await?
            .object_path()
            .cloned()
            .ok_or_else(|| anyhow!("prompt completed without an item path")),
        (None, None) => bail!("service created nothing and asked for no prompt"),
    }
}

/// Run `work`, then close `session` whether or not it succeeded.
async fn close_after<T>(
    session: &SecretSession,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let result = work.await;
    let closed = session.close().await;
    let value = result?;
    closed?;
    Ok(value)
}

/// Handle `secretbus lookup --attr k=v`.
pub async fn lookup(service: &SecretService, attributes: &[(String, String)]) -> Result<()> {
    let found = service.search_items(attributes.iter().cloned()).await?;
    unlock_all(service, &found.locked).await?;

    let Some(path) = found.unlocked.first().or(found.locked.first()) else {
        bail!("no item matches the given attributes");
    };
    debug!("Reading secret of {}", path);

    let session = service.open_plain_session().await?;
    let item: SecretItem = service.sibling(path.clone())?;
    let secret = close_after(&session, async {
        item.get_secret(session.path()).await.map_err(anyhow::Error::from)
    })
    .await?;

    match secret.value_as_str() {
        Some(text) => println!("{}", text),
        None => println!("{}", String::from_utf8_lossy(&secret.value)),
    }
    Ok(())
}

/// Handle `secretbus delete <item-path>`.
pub async fn delete(service: &SecretService, path: &str) -> Result<()> {
    let item: SecretItem = service.sibling(path)?;
    let prompt = item
        .delete()
        .await
        .with_context(|| format!("could not delete {}", path))?;
    if let Some(prompt) = prompt.into_option() {
        complete_prompt(service, &prompt).await?;
    }
    println!("Deleted {}", path);
    Ok(())
}

type Events = LocalBoxStream<'static, (&'static str, secretbus::Result<ObjectPath>)>;

fn tagged(event: &'static str, stream: TypedSignalStream<ObjectPath>) -> Events {
    stream.map(move |r| (event, r)).boxed_local()
}

/// Handle `secretbus watch [--alias A]`: print collection and item events until
/// interrupted. Fails once every event stream has ended, e.g. when the bus
/// connection is lost.
pub async fn watch(service: &SecretService, alias: Option<&str>) -> Result<()> {
    let mut streams = vec![
        tagged("collection created", service.collection_created().await?),
        tagged("collection deleted", service.collection_deleted().await?),
        tagged("collection changed", service.collection_changed().await?),
    ];

    let alias = alias.unwrap_or(DEFAULT_COLLECTION);
    match service.read_alias(alias).await?.into_option() {
        Some(path) => {
            let collection: SecretCollection = service.sibling(path)?;
            streams.push(tagged("item created", collection.item_created().await?));
            streams.push(tagged("item deleted", collection.item_deleted().await?));
            streams.push(tagged("item changed", collection.item_changed().await?));
        }
        None => debug!("No collection is aliased '{}', not watching items", alias),
    }
    let mut events = stream::select_all(streams);

    info!("Watching for Secret Service events (Ctrl-C to stop)");
    loop {
        tokio::select! {
            next = events.next() => match next {
                Some((event, result)) => println!("{}: {}", event, result?),
                None => bail!("event streams ended (bus connection closed)"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
