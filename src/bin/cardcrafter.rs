//! cardcrafter: card pipeline CLI
//!
//! Fetches and normalizes sources against a file-backed store, and runs
//! the refresh and cleanup jobs a host would otherwise schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use tracing::info;

use cardcrafter::store::default_store_path;
use cardcrafter::version::{PKG_VERSION, version_string};
use cardcrafter::{
    CardCrafter, CardError, CardService, Config, FieldMapping, FileStore, Secrets,
    SourceDescriptor, StaticContentStore,
};

/// CardCrafter CLI
#[derive(Parser)]
#[command(name = "cardcrafter")]
#[command(version = PKG_VERSION)]
#[command(about = "Fetch, cache and normalize card sources")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "CARDCRAFTER_CONFIG")]
    config: Option<PathBuf>,

    /// Store file (default: from config, else ~/.cache/cardcrafter/store.json)
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct MappingArgs {
    /// Source field for the card title
    #[arg(long)]
    title: Option<String>,
    /// Source field for the card subtitle
    #[arg(long)]
    subtitle: Option<String>,
    /// Source field for the card description
    #[arg(long)]
    description: Option<String>,
    /// Source field for the card image
    #[arg(long)]
    image: Option<String>,
    /// Source field for the card link
    #[arg(long)]
    link: Option<String>,
}

impl MappingArgs {
    fn mapping(&self) -> FieldMapping {
        let mut mapping = FieldMapping::default();
        if let Some(field) = &self.title {
            mapping = mapping.title(field);
        }
        if let Some(field) = &self.subtitle {
            mapping = mapping.subtitle(field);
        }
        if let Some(field) = &self.description {
            mapping = mapping.description(field);
        }
        if let Some(field) = &self.image {
            mapping = mapping.image(field);
        }
        if let Some(field) = &self.link {
            mapping = mapping.link(field);
        }
        mapping
    }
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a remote JSON source through the cache and print its cards
    Fetch {
        url: String,
        /// Print the raw JSON instead of normalized cards
        #[arg(long)]
        raw: bool,
        #[command(flatten)]
        mapping: MappingArgs,
    },

    /// Refresh every tracked URL once
    Refresh,

    /// List tracked URLs
    Tracked,

    /// Refresh tracked URLs periodically until interrupted
    Watch,

    /// Query an exported content file and print its cards
    RenderPosts {
        /// Content export (JSON with `posts`, `media`, `authors`)
        export: PathBuf,
        #[arg(long, default_value = "post")]
        post_type: String,
        /// Extra filters, e.g. `category_name=news`
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value_t = cardcrafter::types::DEFAULT_PAGE_SIZE)]
        page_size: u32,
        #[command(flatten)]
        mapping: MappingArgs,
    },

    /// Drop expired store entries
    Purge,

    /// Issue an anti-forgery token for an action
    Token {
        #[arg(default_value = cardcrafter::security::PROXY_ACTION)]
        action: String,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    if let Command::Version = args.command {
        println!("cardcrafter {}", version_string());
        return Ok(());
    }

    let config = Config::load_or_default(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let store_path = args
        .store
        .or_else(|| config.store.path.clone())
        .unwrap_or_else(default_store_path);

    let mut builder = CardCrafter::builder()
        .config(&config)
        .store(Arc::new(FileStore::new(&store_path)));
    builder = match secrets.anti_forgery_secret() {
        Some(secret) => builder.secret(secret),
        None if matches!(args.command, Command::Token { .. }) => {
            return Err(CardError::Configuration(format!(
                "no anti-forgery secret: set {} or add anti_forgery_secret to secrets.toml",
                cardcrafter::config::SECRET_ENV_VAR
            ))
            .into());
        }
        None => builder.secret(ephemeral_secret()),
    };

    match args.command {
        Command::Fetch { url, raw, mapping } => {
            let service = builder.build()?;
            if raw {
                let value = service.fetcher().fetch_cached(&url).await?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let cards = service
                    .fetch_cards(&SourceDescriptor::remote(url), &mapping.mapping())
                    .await?;
                println!("{}", serde_json::to_string_pretty(&cards)?);
            }
        }

        Command::Refresh => {
            let report = builder.build()?.refresh_tracked().await?;
            println!("refreshed: {}", report.refreshed);
            println!("failed: {}", report.failed);
        }

        Command::Tracked => {
            let service = builder.build()?;
            let urls = service.fetcher().tracked().list().await?;
            if urls.is_empty() {
                println!("no tracked URLs");
            }
            for url in urls {
                println!("{url}");
            }
        }

        Command::Watch => watch(builder.build()?, &config).await?,

        Command::RenderPosts {
            export,
            post_type,
            query,
            page_size,
            mapping,
        } => {
            let content = StaticContentStore::from_path(&export).await?;
            let service = builder.content_store(Arc::new(content)).build()?;
            let source = SourceDescriptor::wordpress(post_type)
                .with_query(query)
                .with_page_size(page_size);
            let cards = service.fetch_cards(&source, &mapping.mapping()).await?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }

        Command::Purge => {
            let removed = builder.build()?.purge_expired().await?;
            println!("removed {removed} expired entries");
        }

        Command::Token { action } => {
            println!("{}", builder.build()?.issue_token(&action));
        }

        Command::Version => {}
    }

    Ok(())
}

async fn watch(service: CardService, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let every = config.refresh_interval();
    info!(version = version_string(), interval_secs = every.as_secs(), "refresh loop starting");

    // First sweep immediately; the task takes over one period later.
    let report = service.refresh_tracked().await?;
    println!("refreshed: {} failed: {}", report.refreshed, report.failed);

    let handle = service.spawn_refresh_task(every);
    tokio::signal::ctrl_c().await?;
    handle.abort();
    info!("refresh loop stopped");
    Ok(())
}

/// Per-process secret for commands that never hand tokens to a client.
fn ephemeral_secret() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_be_bytes());
    hasher.update(nanos.to_be_bytes());
    hex::encode(hasher.finalize())
}
