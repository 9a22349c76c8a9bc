use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secretbus::secrets::{SecretService, DEFAULT_COLLECTION};
use secretbus::Config;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "secretbus")]
#[command(author, version, about = "Secret Service client over D-Bus", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Secret Service interface descriptors
    Describe {
        /// Only this interface (full name or last component, e.g. "Item")
        interface: Option<String>,
    },

    /// Show or update configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set the log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,

        /// Connect to this bus ("session" or "system")
        #[arg(long, conflicts_with = "address")]
        bus: Option<String>,

        /// Connect to an explicit D-Bus address instead
        #[arg(long)]
        address: Option<String>,

        /// Method call timeout in seconds (0 removes it)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Resolve a collection alias
    Alias {
        /// Alias name (e.g. "default")
        name: String,
    },

    /// List collections
    Collections,

    /// Find items by attributes
    Search {
        /// Lookup attribute, key=value (repeatable)
        #[arg(short, long = "attr", required = true)]
        attrs: Vec<String>,
    },

    /// Store a secret
    Store {
        /// Item label
        #[arg(short, long)]
        label: String,

        /// Lookup attribute, key=value (repeatable)
        #[arg(short, long = "attr")]
        attrs: Vec<String>,

        /// Collection alias to store into
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        alias: String,

        /// Secret value (prompted for with hidden input when omitted)
        #[arg(long)]
        secret: Option<String>,

        /// Replace an existing item with the same attributes
        #[arg(long)]
        replace: bool,
    },

    /// Print the secret of the first item matching the attributes
    Lookup {
        /// Lookup attribute, key=value (repeatable)
        #[arg(short, long = "attr", required = true)]
        attrs: Vec<String>,
    },

    /// Delete an item
    Delete {
        /// Item object path
        path: String,
    },

    /// Print collection and item events until interrupted
    Watch {
        /// Collection alias whose item events to show
        #[arg(long)]
        alias: Option<String>,
    },
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("secretbus=debug")
    } else {
        EnvFilter::new(format!("secretbus={}", level.to_ascii_lowercase()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the config and report which file it came from, if any.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    match path {
        Some(path) => {
            let config = Config::load_from(path)
                .with_context(|| format!("could not load config {}", path.display()))?;
            Ok((config, Some(path.clone())))
        }
        None => {
            let config = Config::load().context("could not load config")?;
            let source = Config::config_path().ok().filter(|p| p.exists());
            Ok((config, source))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(cli.config.as_ref());
    let level = loaded
        .as_ref()
        .map(|(config, _)| config.log_level.as_str())
        .unwrap_or("info");
    init_logging(cli.verbose, level);

    let (config, source) = loaded?;
    match &source {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => debug!("No config file, using defaults"),
    }

    // Offline commands first; everything else needs the bus.
    let service = match &cli.command {
        Commands::Describe { interface } => return commands::describe(interface.as_deref()),
        Commands::Config {
            show,
            log_level,
            bus,
            address,
            timeout,
        } => {
            if *show {
                return commands::show_config(&config, source.as_deref());
            }
            let path = match source {
                Some(path) => path,
                None => Config::config_path()?,
            };
            return commands::update_config(
                config,
                &path,
                commands::ConfigChanges {
                    log_level: log_level.clone(),
                    bus: bus.clone(),
                    address: address.clone(),
                    timeout: *timeout,
                },
            );
        }
        _ => {
            info!("Connecting to {:?} bus", config.bus.kind);
            SecretService::connect_with(&config.bus)
                .await
                .context("could not reach the Secret Service")?
        }
    };

    match cli.command {
        Commands::Describe { .. } | Commands::Config { .. } => {}

        Commands::Alias { name } => commands::alias(&service, &name).await?,

        Commands::Collections => commands::collections(&service).await?,

        Commands::Search { attrs } => {
            let attrs = commands::parse_attributes(&attrs)?;
            commands::search(&service, &attrs).await?;
        }

        Commands::Store {
            label,
            attrs,
            alias,
            secret,
            replace,
        } => {
            let attrs = commands::parse_attributes(&attrs)?;
            let secret = match secret {
                Some(secret) => secret,
                None => rpassword::prompt_password("Secret: ")?,
            };
            if secret.is_empty() {
                bail!("secret cannot be empty");
            }
            commands::store(&service, &label, &attrs, &alias, &secret, replace).await?;
        }

        Commands::Lookup { attrs } => {
            let attrs = commands::parse_attributes(&attrs)?;
            commands::lookup(&service, &attrs).await?;
        }

        Commands::Delete { path } => commands::delete(&service, &path).await?,

        Commands::Watch { alias } => commands::watch(&service, alias.as_deref()).await?,
    }

    Ok(())
}
