//! zipd - AppleTalk Zone Information Protocol responder
//!
//! Runs a router-resident ZIP responder that answers zone queries from
//! AppleTalk nodes, on ports and zones taken from the configuration.

mod config;
mod network;
mod protocol;
mod router;
mod service;
#[cfg(test)]
mod testing;
mod zone;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{Config, ZoneConfig};
use network::{Datagram, Port, VirtualNetwork, VirtualPort};
use router::{Router, StaticRouter};
use service::echo::{EchoResponder, EchoService, ECHO_SAS};
use service::zip::{ZipResponder, ZipRespondingService};
use service::Service;
use zone::{ZoneInformationTable, ZoneResult};

/// zipd - AppleTalk zone information responder
#[derive(Parser)]
#[command(name = "zipd")]
#[command(author = "zipd Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Answer AppleTalk zone queries on behalf of a router", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router and its services until Ctrl+C
    ///
    /// Ports attach to in-process virtual links, one per segment name.
    /// Ports that name the same `segment` share a link; a port without one
    /// gets a link of its own.
    Run,

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Write the configuration (or the sample) to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the zone information table seeded from the configuration
    Zones {
        /// Only list the networks of this zone
        zone: Option<String>,
    },

    /// Show protocol constants
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // RUST_LOG wins over the command line and the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(cli.verbose, &config)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run => {
            run_router(config).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else if let Some(path) = output {
                config.save(&path)?;
                println!("Configuration written to: {}", path.display());
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Zones { zone } => {
            let segments = build_segments(&config);
            let router = build_router(&config, &segments)?;
            match zone {
                Some(zone_name) => print_zone(&router, &zone_name),
                None => print_zones(&router),
            }
        }
        Commands::Info => {
            print_info();
        }
    }

    Ok(())
}

/// Default log level when `RUST_LOG` is unset
fn log_level(cli_verbose: bool, config: &Config) -> &'static str {
    if cli_verbose || config.general.verbose {
        "debug"
    } else {
        "info"
    }
}

/// One virtual link per distinct segment name
fn build_segments(config: &Config) -> BTreeMap<String, Arc<VirtualNetwork>> {
    let mut segments = BTreeMap::new();
    for port in &config.ports {
        segments
            .entry(port.segment().to_string())
            .or_insert_with(|| Arc::new(VirtualNetwork::new()));
    }
    segments
}

/// Add the configured zones in the order they are listed
///
/// The first zone added for a network becomes its default zone.
fn seed_zones(zit: &ZoneInformationTable, zones: &[ZoneConfig]) -> ZoneResult<()> {
    for zone in zones {
        zit.add_networks(zone.name.as_bytes(), zone.networks.iter().copied())?;
    }
    Ok(())
}

/// Build the router, its ports and services, and seed its zone table
fn build_router(
    config: &Config,
    segments: &BTreeMap<String, Arc<VirtualNetwork>>,
) -> anyhow::Result<Arc<StaticRouter>> {
    let mut ports: Vec<Arc<dyn Port>> = Vec::with_capacity(config.ports.len());
    for port in &config.ports {
        let Some(link) = segments.get(port.segment()) else {
            anyhow::bail!("port {}: no link for segment {}", port.name, port.segment());
        };
        let port = VirtualPort::new(port.name.clone(), port.kind, port.address(), link.clone());
        ports.push(Arc::new(port));
    }

    let responder = ZipResponder::with_max_data_length(config.service.max_data_length);
    let zip: Arc<dyn Service> = Arc::new(ZipRespondingService::new(responder));
    let mut services = vec![(Some(protocol::ZIP_SAS), zip)];
    if config.service.echo {
        let echo: Arc<dyn Service> = Arc::new(EchoService::new(EchoResponder));
        services.push((Some(ECHO_SAS), echo));
    }

    let router = Arc::new(StaticRouter::new(config.general.name.clone(), ports, services));
    seed_zones(router.zone_information_table(), &config.zones)?;
    Ok(router)
}

/// Run the router until interrupted
async fn run_router(config: Config) -> anyhow::Result<()> {
    if config.ports.is_empty() {
        anyhow::bail!("No ports configured. Generate a sample with `zipd config --generate`.");
    }

    let segments = build_segments(&config);
    let router = build_router(&config, &segments)?;
    tracing::info!(
        "Starting router '{}' with {} port(s) and {} zone(s)",
        router.name(),
        router.ports().len(),
        router.zone_information_table().zone_count()
    );

    router.start().await?;

    println!("\n========================================");
    println!("  zipd Running");
    println!("========================================");
    println!("  Router: {}", router.name());
    for port in router.ports() {
        println!(
            "  Port {}: {}.{} ({}-{})",
            port.name(),
            port.network(),
            port.node(),
            port.network_min(),
            port.network_max()
        );
    }
    for (name, link) in &segments {
        println!("  Segment {}: {} receiver(s)", name, link.receiver_count());
    }
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    router.stop().await?;
    tracing::info!("Router stopped");

    Ok(())
}

/// Print the zone table
fn print_zones(router: &StaticRouter) {
    let zit = router.zone_information_table();
    println!("Zone Information Table ({} zones)", zit.zone_count());
    println!("==============================\n");

    for (zone_name, networks) in zit.zones_and_networks() {
        let networks: Vec<String> = networks.iter().map(|n| n.to_string()).collect();
        println!("  {:<32} {}", String::from_utf8_lossy(&zone_name), networks.join(", "));
    }
}

/// Print the networks of one zone
fn print_zone(router: &StaticRouter, zone_name: &str) {
    let networks = router
        .zone_information_table()
        .networks_in_zone(zone_name.as_bytes());
    if networks.is_empty() {
        println!("Zone {:?} is not in the table", zone_name);
        return;
    }

    let networks: Vec<String> = networks.iter().map(|n| n.to_string()).collect();
    println!("{}: {}", zone_name, networks.join(", "));
}

/// Print protocol constants
fn print_info() {
    println!("zipd Protocol Information");
    println!("=========================\n");

    println!("ZIP socket: {}", protocol::ZIP_SAS);
    println!("ZIP DDP type: {}", protocol::ZIP_DDP_TYPE);
    println!("ATP DDP type: {}", protocol::ATP_DDP_TYPE);
    println!("Echo socket: {}", ECHO_SAS);
    println!("Max datagram payload: {} bytes", Datagram::MAX_DATA_LENGTH);
    println!("Max zone name: {} bytes", zone::MAX_ZONE_NAME_LENGTH);
}
