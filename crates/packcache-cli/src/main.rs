//! packcache - download city travel packs and open them without a network.
//!
//! The binary plays the client shell: it registers the caching agent,
//! talks to it through the coordinator, and reads launch content straight
//! from the agent's cache.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use packcache_core::agent::Fetcher;
use packcache_core::models::parse_city_pack;
use packcache_core::offline::{pack_data_path, pack_page_path};
use packcache_core::{
    AgentConfig, AgentRegistrar, AgentTransport, ApiPackProvider, CacheStorage, CachingAgent,
    Config, HttpFetcher, OfflinePackCoordinator, PackProvider, PackRepository,
    StaticPackProvider, StorageArea,
};

/// How long `launch` waits for the agent to take control.
const CONTROLLER_WAIT: Duration = Duration::from_secs(5);

/// Key-value store file inside the data directory
const LOCAL_STORAGE_FILE: &str = "local_storage.json";

/// Partition directory inside the data directory
const CACHES_DIR: &str = "caches";

#[derive(Parser)]
#[command(name = "packcache", version, about = "Offline city travel packs")]
struct Cli {
    /// Skip the content API and use only the static pack documents
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the packs that can be downloaded
    Catalog,
    /// Download a pack for offline use and make it the launch pack
    Download { slug: String },
    /// Open this pack on launch
    Activate { slug: String },
    /// Show the launch pack from the offline cache
    Launch,
    /// Show the launch pack and downloaded packs
    Status,
    /// Sync local state with the agent's registry and print it
    Registry,
    /// Re-download the mandatory packs
    Seed,
    /// Print the effective configuration
    Config {
        /// Save it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "packcache.log"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

/// Everything a command might need, wired the same way for every command.
struct Shell {
    registrar: Arc<AgentRegistrar>,
    coordinator: OfflinePackCoordinator,
    repository: PackRepository,
}

impl Shell {
    async fn start(config: &Config, data_dir: &Path, offline: bool) -> Result<Self> {
        let origin = config.origin_url()?;

        let storage = StorageArea::open(data_dir.join(LOCAL_STORAGE_FILE));
        let caches = CacheStorage::open(data_dir.join(CACHES_DIR))
            .context("Failed to open pack cache")?;

        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
        let agent_config = AgentConfig {
            mandatory_packs: config.mandatory_packs.clone(),
            ..AgentConfig::new(origin.clone())
        };
        let agent = CachingAgent::new(agent_config, Arc::new(caches), fetcher);

        let registrar = Arc::new(AgentRegistrar::new());
        registrar.register(agent).await;

        let transport = AgentTransport::new(Arc::clone(&registrar)).with_timeout(config.rpc_timeout());
        let coordinator = OfflinePackCoordinator::new(storage.context(), transport)
            .with_mandatory_packs(config.mandatory_packs.clone());

        let remote: Option<Arc<dyn PackProvider>> = match &config.api_base_url {
            Some(base_url) => Some(Arc::new(ApiPackProvider::new(base_url)?)),
            None => None,
        };
        let repository = PackRepository::new(Arc::new(StaticPackProvider::new(origin)?), remote);
        repository.set_online(!offline);

        Ok(Self {
            registrar,
            coordinator,
            repository,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let _log_guard = init_tracing(&data_dir);
    info!(origin = %config.origin, "packcache starting");

    if let Command::Config { write } = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        if write {
            config.save()?;
            println!("Saved to {}", Config::config_path()?.display());
        }
        return Ok(());
    }

    let shell = Shell::start(&config, &data_dir, cli.offline).await?;
    match cli.command {
        Command::Catalog => catalog(&shell).await,
        Command::Download { slug } => download(&shell, &slug).await,
        Command::Activate { slug } => {
            shell.coordinator.set_active_launch_identifier(&slug)?;
            println!("{} will open on launch", slug);
            Ok(())
        }
        Command::Launch => launch(&shell).await,
        Command::Status => {
            status(&shell);
            Ok(())
        }
        Command::Registry => registry(&shell).await,
        Command::Seed => {
            shell.coordinator.seed_mandatory_packs().await?;
            println!("Mandatory packs refreshed");
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    }
}

async fn catalog(shell: &Shell) -> Result<()> {
    let downloaded = shell.coordinator.downloaded_packs();
    for entry in shell.repository.get_catalog().await? {
        let offline = match downloaded.get(&entry.slug) {
            Some(record) => format!("offline {}", record.version),
            None => String::new(),
        };
        println!(
            "{:<14} {:<20} {:<16} {:>5.1}M {}{}",
            entry.slug,
            entry.city,
            entry.country,
            entry.international_arrivals_millions,
            if entry.mandatory { "* " } else { "" },
            offline
        );
    }
    Ok(())
}

async fn download(shell: &Shell, slug: &str) -> Result<()> {
    let Some(pack) = shell.repository.get_pack(slug).await? else {
        bail!("No pack named {}", slug);
    };
    let record = shell.coordinator.download_pack(&pack).await?;
    println!(
        "{} {} is available offline ({} resources)",
        pack.display_name(),
        record.version,
        pack.offline_resources.len()
    );
    Ok(())
}

/// Read the launch pack from the agent's cache only.
async fn launch(shell: &Shell) -> Result<()> {
    let slug = shell.coordinator.launch_target();
    let controller = shell
        .registrar
        .wait_for_controller(CONTROLLER_WAIT)
        .await
        .context("Caching agent did not take control")?;

    if controller.intercept(&pack_page_path(&slug)).await.is_none() {
        bail!("Pack {} is not available offline", slug);
    }
    let data = controller
        .intercept(&pack_data_path(&slug))
        .await
        .with_context(|| format!("Pack {} data is not available offline", slug))?;

    let value: serde_json::Value =
        serde_json::from_slice(&data.body).context("Cached pack data is not JSON")?;
    let pack = parse_city_pack(&value)?;

    println!("{}", pack.display_name());
    println!("{} - {}", pack.hero.title, pack.hero.subtitle);
    for section in &pack.sections {
        println!();
        println!("{}: {}", section.title, section.summary);
        for action in &section.actions {
            println!("  - {}", action);
        }
    }
    if !pack.emergency.is_empty() {
        println!();
        for contact in &pack.emergency {
            println!("{}: {}", contact.label, contact.value);
        }
    }
    Ok(())
}

fn status(shell: &Shell) {
    match shell.coordinator.active_launch_identifier() {
        Some(slug) => println!("Launch pack: {}", slug),
        None => println!("Launch pack: {} (default)", shell.coordinator.launch_target()),
    }
    let downloaded = shell.coordinator.downloaded_packs();
    if downloaded.is_empty() {
        println!("No packs downloaded");
    }
    for record in downloaded.values() {
        println!("{:<14} {:<12} cached {}", record.slug, record.version, record.age_display());
    }
}

async fn registry(shell: &Shell) -> Result<()> {
    let registry = shell.coordinator.reconcile_with_registry().await?;
    println!("{}", serde_json::to_string_pretty(&registry)?);
    Ok(())
}
