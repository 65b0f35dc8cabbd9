//! airtree CLI
//!
//! Reads and writes a tree kept in a local data directory, using the
//! filesystem backend as the durable tier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use airtree::manifest::Manifest;
use airtree::{AirError, Config, FsBackend, PageLayout, Result, Session, StorageClient};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// airtree CLI
#[derive(Parser, Debug)]
#[command(name = "airtree")]
#[command(about = "Copy-on-write B-tree over content-addressed blobs")]
#[command(version)]
struct Args {
    /// Data directory (manifest + blobs)
    #[arg(short, long, default_value = "./airtree_data")]
    data_dir: PathBuf,

    /// Interpret keys as hex instead of UTF-8 text
    #[arg(long)]
    hex: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty tree
    Init {
        /// Fixed key width in bytes
        #[arg(short, long, default_value = "8")]
        key_size: usize,

        /// Page fan-out
        #[arg(short, long, default_value = "32")]
        base: usize,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Show the tree layout and root
    Info,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,airtree=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("airtree v{}, data directory {}", airtree::VERSION, args.data_dir.display());

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Init { key_size, base } => {
            if Manifest::load(&args.data_dir)?.is_some() {
                return Err(AirError::Config(format!(
                    "{} already holds a tree",
                    args.data_dir.display()
                )));
            }
            let layout = PageLayout::new(*key_size, *base)?;
            config_for(&args.data_dir, layout).validate()?;
            Manifest::new(layout).save(&args.data_dir)?;
            tracing::info!("Initialized tree: key size {}, base {}", key_size, base);
        }
        Commands::Get { key } => {
            let manifest = require_manifest(&args.data_dir)?;
            let session = Session::open(
                open_client(&args.data_dir, &manifest)?,
                manifest.layout()?,
                manifest.root,
            );
            let key = parse_key(key, args.hex)?;
            match session.get(&key)? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(nil)"),
            }
        }
        Commands::Put { key, value } => {
            let mut manifest = require_manifest(&args.data_dir)?;
            let mut session = Session::open(
                open_client(&args.data_dir, &manifest)?,
                manifest.layout()?,
                manifest.root,
            );
            let key = parse_key(key, args.hex)?;
            session.put(&key, value.as_bytes())?;
            manifest.root = Some(session.commit()?);
            manifest.save(&args.data_dir)?;
            println!("OK");
        }
        Commands::Info => {
            let manifest = require_manifest(&args.data_dir)?;
            println!("key size: {}", manifest.key_size);
            println!("base:     {}", manifest.base);
            match manifest.root {
                Some(root) => println!("root:     {}", root),
                None => println!("root:     (empty)"),
            }
        }
    }
    Ok(())
}

fn config_for(data_dir: &Path, layout: PageLayout) -> Config {
    Config::builder()
        .data_dir(data_dir)
        .key_size(layout.key_size())
        .base(layout.base())
        .build()
}

fn require_manifest(data_dir: &Path) -> Result<Manifest> {
    Manifest::load(data_dir)?.ok_or_else(|| {
        AirError::Config(format!(
            "no tree in {}, run `airtree init` first",
            data_dir.display()
        ))
    })
}

fn open_client(data_dir: &Path, manifest: &Manifest) -> Result<Arc<StorageClient>> {
    let config = config_for(data_dir, manifest.layout()?);
    let backend = FsBackend::open(&config.data_dir.join("blobs"))?;
    Ok(Arc::new(StorageClient::with_backend(&config, Arc::new(backend))?))
}

fn parse_key(key: &str, hex: bool) -> Result<Vec<u8>> {
    if hex {
        ::hex::decode(key).map_err(|e| AirError::Config(format!("invalid hex key {}: {}", key, e)))
    } else {
        Ok(key.as_bytes().to_vec())
    }
}
