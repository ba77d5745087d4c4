//! Catalog server binary.
//!
//! Serves the product catalog over HTTP and streams committed changes to
//! connected observers.

use std::path::PathBuf;
use std::sync::Arc;

use catalog_sync::http::{self, AppState, ServerConfig};
use catalog_sync::{
    ChannelConfig, FanoutChannel, FileStore, MemoryStore, MutationService, ObserverConfig,
    RecordStore, StoreConfig,
};
use clap::Parser;
use tracing::info;

/// Server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "catalogd")]
#[command(about = "Product catalog with live change fan-out")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:4000")]
    bind: String,

    /// Store directory
    #[arg(short, long, value_name = "PATH", default_value = "./catalog")]
    data_dir: PathBuf,

    /// Keep the catalog in memory only
    #[arg(long)]
    in_memory: bool,

    /// Rewrite the log down to live records before serving
    #[arg(long)]
    compact: bool,

    /// Fsync the log every N writes
    #[arg(long, default_value_t = 1)]
    sync_interval: u64,

    /// Recent events kept for replay to connecting observers
    #[arg(long, default_value_t = 256)]
    replay_capacity: usize,

    /// Per-observer delivery queue size
    #[arg(long, default_value_t = 1024)]
    observer_buffer: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> (ServerConfig, bool) {
        let config = ServerConfig {
            bind_addr: self.bind,
            in_memory: self.in_memory,
            store: StoreConfig {
                path: self.data_dir,
                sync_interval: self.sync_interval,
                ..Default::default()
            },
            channel: ChannelConfig {
                replay_capacity: self.replay_capacity,
            },
            observer: ObserverConfig {
                buffer_size: self.observer_buffer,
            },
        };
        (config, self.compact)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_tracing(args.verbose);

    info!("starting catalogd");

    let (config, compact) = args.into_config();
    if config.in_memory {
        info!("using in-memory store");
        let store = MemoryStore::with_timeout(config.store.op_timeout);
        run(store, config).await
    } else {
        info!(path = %config.store.path.display(), "opening store");
        let store = FileStore::open_or_create(config.store.clone())?;
        if compact {
            store.compact()?;
        }
        run(store, config).await
    }
}

async fn run<S: RecordStore + 'static>(
    store: S,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let channel = Arc::new(FanoutChannel::with_config(config.channel));
    let service = MutationService::new(store, channel);
    let state = Arc::new(AppState::new(service, config.observer));

    http::serve(state, &config.bind_addr).await?;
    Ok(())
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("catalog_sync=debug,catalogd=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
