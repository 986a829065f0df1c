//! simnet CLI
//!
//! Brings up the simulated device pair on an in-memory host stack, drives
//! traffic through it and reports interface statistics. A tokio task plays
//! the part of the host's transmit watchdog.

mod config;
mod traffic;

use clap::{Parser, Subcommand};
use simnet_core::{CaptureStack, DeviceRegistry, NetDevice, RxMode, Watchdog, Wiring};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use config::Config;
use traffic::{DeviceSummary, Generator, TrafficSummary};

/// simnet - simulated loopback Ethernet pair
#[derive(Parser)]
#[command(name = "simnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a fixed number of frames and print statistics
    Run {
        /// Number of frames (overrides traffic.frames)
        #[arg(short, long)]
        frames: Option<u64>,

        /// Fixed frame size in bytes (overrides traffic.min_size/max_size)
        #[arg(short, long)]
        size: Option<usize>,

        /// Simulate a transmitter lockup on every frame
        #[arg(long)]
        lockup: bool,

        /// Deliver received frames from polls of this weight
        #[arg(long)]
        poll: Option<usize>,

        /// Loop each device back onto itself
        #[arg(long)]
        reflect: bool,

        /// Seed for frame sizes and payloads
        #[arg(long)]
        seed: Option<u64>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate traffic until Ctrl+C, reporting periodically
    Daemon {
        /// Seconds between status reports
        #[arg(short, long, default_value = "5")]
        report: u64,

        /// Simulate a transmitter lockup on every frame
        #[arg(long)]
        lockup: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the default configuration
    Default,

    /// Validate the configuration file
    Check,
}

/// Overrides from the `run` command line
struct RunOverrides {
    frames: Option<u64>,
    size: Option<usize>,
    lockup: bool,
    poll: Option<usize>,
    reflect: bool,
    seed: Option<u64>,
}

impl RunOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(frames) = self.frames {
            config.traffic.frames = frames;
        }
        if let Some(size) = self.size {
            config.traffic.min_size = size;
            config.traffic.max_size = size;
        }
        if self.lockup {
            config.driver.lockup_simulated = true;
        }
        if let Some(weight) = self.poll {
            config.driver.rx_mode = RxMode::Poll { weight };
        }
        if self.reflect {
            config.driver.wiring = Wiring::Reflect;
        }
        if self.seed.is_some() {
            config.traffic.seed = self.seed;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let mut config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            frames,
            size,
            lockup,
            poll,
            reflect,
            seed,
            json,
        } => {
            RunOverrides {
                frames,
                size,
                lockup,
                poll,
                reflect,
                seed,
            }
            .apply(&mut config);
            config.validate()?;
            run(&config, json).await?;
        }
        Commands::Daemon { report, lockup } => {
            if lockup {
                config.driver.lockup_simulated = true;
            }
            config.validate()?;
            run_daemon(&config, Duration::from_secs(report.max(1))).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Default => print!("{}", Config::default().to_toml()?),
            ConfigAction::Check => {
                config.validate()?;
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}

/// Bring the pair up and open both devices
fn bring_up(config: &Config) -> anyhow::Result<(Arc<CaptureStack>, DeviceRegistry)> {
    let stack = Arc::new(CaptureStack::new());
    let registry = DeviceRegistry::bring_up(config.driver.clone(), stack.clone())?;
    for dev in registry.devices() {
        dev.open();
    }
    Ok((stack, registry))
}

/// Spawn the watchdog timer. It checks the devices once per tick.
fn spawn_watchdog(registry: &DeviceRegistry) -> tokio::task::JoinHandle<()> {
    let devices = registry.devices().to_vec();
    let watchdog = Watchdog::from_config(registry.config());
    let tick = registry.config().tick_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            let fired = watchdog.check(&devices, Instant::now());
            if fired > 0 {
                tracing::info!(fired, "transmit watchdog recovered stalled devices");
            }
        }
    })
}

async fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let (stack, mut registry) = bring_up(config)?;
    let watchdog = spawn_watchdog(&registry);

    let started = Instant::now();
    let mut generator = Generator::new(&config.traffic, registry.config().tick_interval());
    generator
        .run(&registry, &stack, config.traffic.frames)
        .await;
    let summary = generator.summary(&registry, started);

    watchdog.abort();
    registry.shutdown();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn run_daemon(config: &Config, report_every: Duration) -> anyhow::Result<()> {
    let (stack, mut registry) = bring_up(config)?;
    let watchdog = spawn_watchdog(&registry);

    println!("simnet daemon");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    for dev in registry.devices() {
        println!("{}: {}", dev.name(), dev.mac_address());
    }
    println!("Lockup simulation: {}", config.driver.lockup_simulated);
    println!();
    println!("Daemon ready. Press Ctrl+C to stop");
    println!();

    let started = Instant::now();
    let mut generator = Generator::new(&config.traffic, registry.config().tick_interval());
    let mut last_report = Instant::now();
    let count = registry.devices().len();

    let traffic = async {
        let mut n = 0usize;
        loop {
            generator.send_one(&registry, &stack, n % count).await;
            n = n.wrapping_add(1);
            if last_report.elapsed() >= report_every {
                last_report = Instant::now();
                for dev in DeviceSummary::collect(&registry) {
                    tracing::info!(
                        device = %dev.name,
                        tx_packets = dev.stats.tx_packets,
                        rx_packets = dev.stats.rx_packets,
                        tx_errors = dev.stats.tx_errors,
                        rx_dropped = dev.stats.rx_dropped,
                        "status"
                    );
                }
            }
        }
    };

    tokio::select! {
        _ = traffic => {}
        result = tokio::signal::ctrl_c() => result?,
    }
    println!("\nShutting down...");

    let summary = generator.summary(&registry, started);
    watchdog.abort();
    registry.shutdown();
    print_summary(&summary);
    println!("Daemon stopped");

    Ok(())
}

fn print_summary(summary: &TrafficSummary) {
    println!("Traffic");
    println!("  Sent:      {}", summary.sent);
    println!("  Dropped:   {}", summary.dropped);
    println!("  Delivered: {}", summary.delivered);
    println!("  Offered:   {} bytes", summary.offered_bytes);
    println!("  Elapsed:   {} ms", summary.elapsed_ms);

    for dev in &summary.devices {
        let s = &dev.stats;
        println!();
        println!("{} ({})", dev.name, dev.mac);
        println!(
            "  RX packets: {:<10} bytes: {:<12} dropped: {}",
            s.rx_packets, s.rx_bytes, s.rx_dropped
        );
        println!(
            "  TX packets: {:<10} bytes: {:<12} dropped: {:<6} errors: {}",
            s.tx_packets, s.tx_bytes, s.tx_dropped, s.tx_errors
        );
        println!(
            "  Pool:       {}/{} free",
            dev.pool_available, dev.pool_capacity
        );
    }
}
