use clap::Parser;
use helpers::{enable_logging, set_full_stacktrace_as_default, wait_on_ctrl_c};

use std::{error::Error, net::SocketAddr, path::PathBuf};

use crate::{
    app_context::AppContext,
    config::{ConfigToml, DataDir, PersistentDataDir},
    resolution::DnsSocket,
};

mod app_context;
mod config;
mod helpers;
mod resolution;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "cachedns - A caching DNS forwarder. Answers repeated queries from memory."
)]
struct Cli {
    /// Upstream DNS server. Format: IP:Port. [default: 8.8.8.8:53]
    #[arg(short, long)]
    forward: Option<SocketAddr>,

    /// Socket to listen on for DNS queries. Format: IP:Port. [default: 0.0.0.0:53]
    #[arg(short, long)]
    socket: Option<SocketAddr>,

    /// Show verbose output. Overrides `verbose = false` in the config file.
    #[arg(short, long)]
    verbose: bool,

    /// The base directory that contains the configuration file.
    #[arg(short, long, default_value = "~/.cachedns")]
    data_dir: PathBuf,
}

impl Cli {
    /// Flags that are given override the config file.
    fn apply_to(&self, config: &mut ConfigToml) {
        if self.verbose {
            config.general.verbose = true;
        }
        if let Some(forward) = self.forward {
            config.general.forward = forward;
        }
        if let Some(socket) = self.socket {
            config.general.socket = socket;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    set_full_stacktrace_as_default();
    let cli = Cli::parse();

    let data_dir = PersistentDataDir::new(cli.data_dir.clone());
    let mut app_context = AppContext::from_data_dir(data_dir.clone())?;
    cli.apply_to(&mut app_context.config);

    enable_logging(app_context.config.general.verbose);
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    tracing::info!("Starting cachedns v{VERSION}");
    tracing::info!("Data directory {}", data_dir.path().display());
    tracing::debug!("Configuration:\n{:?}", app_context.config);
    tracing::info!(
        "Forward queries to {} ({:?} exchange)",
        app_context.config.general.forward,
        app_context.config.upstream.mode
    );

    // Exit the main thread if anything panics
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Thread paniced. Stop main thread too.");
        orig_hook(panic_info);
        std::process::exit(1);
    }));

    let dns_socket = DnsSocket::new(&app_context).await?;
    let stop_receive_loop = dns_socket.start_receive_loop();

    tracing::info!("Listening on {}. Waiting for Ctrl-C...", dns_socket.local_addr()?);

    wait_on_ctrl_c().await;
    println!();
    tracing::info!("Got it! Exiting...");
    let cache = dns_socket.resolver().cache();
    tracing::debug!(
        "Cache holds {} responses (~{} bytes).",
        cache.entry_count(),
        cache.approx_size_bytes()
    );
    if stop_receive_loop.send(()).is_err() {
        tracing::warn!("Receive loop already stopped.");
    }

    Ok(())
}
