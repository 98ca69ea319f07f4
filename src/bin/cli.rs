//! StashKV CLI
//!
//! Command-line interface for inspecting and editing a storage directory.

use clap::{Parser, Subcommand};
use stashkv::bridge::pairs_to_value;
use stashkv::{Config, Store, SyncStrategy, DEFAULT_INLINE_THRESHOLD};
use tracing_subscriber::{fmt, EnvFilter};

/// StashKV CLI
#[derive(Parser, Debug)]
#[command(name = "stashkv")]
#[command(about = "CLI for the StashKV key-value store")]
#[command(version)]
struct Args {
    /// Storage directory
    #[arg(short, long, default_value = "./stashkv_data")]
    dir: String,

    /// Largest value (bytes) kept inline in the manifest
    #[arg(short = 't', long, default_value_t = DEFAULT_INLINE_THRESHOLD)]
    inline_threshold: usize,

    /// Skip fsync on commit
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get values by key (prints [[key, value|null], ...])
    Get {
        /// The keys to get
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Shallow-merge a JSON object into the stored value
    Merge {
        /// The key to merge into
        key: String,

        /// A JSON object
        value: String,
    },

    /// Delete keys
    Del {
        /// The keys to delete
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List all keys
    Keys,

    /// Delete everything
    Clear,

    /// Show how keys are stored
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stashkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> stashkv::Result<()> {
    let sync_strategy = if args.no_sync {
        SyncStrategy::OsBuffered
    } else {
        SyncStrategy::EveryWrite
    };

    let config = Config::builder()
        .storage_dir(&args.dir)
        .inline_threshold(args.inline_threshold)
        .sync_strategy(sync_strategy)
        .build();

    let store = Store::open(config)?;

    match args.command {
        Commands::Get { keys } => {
            let pairs = store.multi_get(keys).wait()?;
            println!("{}", pairs_to_value(&pairs));
        }
        Commands::Set { key, value } => {
            store.set(key, value).wait()?;
            println!("OK");
        }
        Commands::Merge { key, value } => {
            store.multi_merge(vec![(key, value)]).wait()?;
            println!("OK");
        }
        Commands::Del { keys } => {
            store.multi_remove(keys).wait()?;
            println!("OK");
        }
        Commands::Keys => {
            for key in store.get_all_keys().wait()? {
                println!("{}", key);
            }
        }
        Commands::Clear => {
            store.clear().wait()?;
            println!("OK");
        }
        Commands::Stats => {
            let (total, inline, external) = store
                .with_engine(|engine| {
                    Ok((engine.len(), engine.inline_count(), engine.external_count()))
                })
                .wait()?;
            println!("keys:     {}", total);
            println!("inline:   {}", inline);
            println!("external: {}", external);
        }
    }

    store.invalidate();
    Ok(())
}
