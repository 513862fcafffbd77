//! tun-dns: fake-IP DNS interception daemon
//!
//! This is the main entry point for the DNS interception service.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! ./tun-dns
//!
//! # Run with custom configuration
//! ./tun-dns -c /path/to/config.json
//!
//! # Run with environment overrides
//! TUN_DNS_LOG_LEVEL=debug ./tun-dns
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use tun_dns::config::{load_config_with_env, Config};
use tun_dns::dns::{DnsMode, DnsService, ServerOptions};
use tun_dns::TunDnsError;

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: PathBuf,
    /// Generate default configuration
    generate_config: bool,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = PathBuf::from("/etc/tun-dns/config.json");
        let mut generate_config = false;
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = PathBuf::from(path);
                    }
                }
                "-g" | "--generate-config" => {
                    generate_config = true;
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("tun-dns v{}", tun_dns::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            generate_config,
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"tun-dns v{}

Fake-IP DNS interception for transparent tunnels.

USAGE:
    tun-dns [OPTIONS]

OPTIONS:
    -c, --config <PATH>     Configuration file path [default: /etc/tun-dns/config.json]
    -g, --generate-config   Generate default configuration and exit
    --check                 Check configuration and exit
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT:
    TUN_DNS_LISTEN_ADDR     Override DNS listen address (port 0 disables the listener)
    TUN_DNS_LOG_LEVEL       Override log level (trace, debug, info, warn, error)
    TUN_DNS_MODE            Override DNS mode (virtual, upstream)
    TUN_DNS_UPSTREAM        Override upstream resolver

EXAMPLE:
    # Point the tunnel's DNS at the service and route the fake range into the tunnel
    ip route add 198.18.0.0/16 dev tun0

    # Run the service
    tun-dns -c /etc/tun-dns/config.json
"#,
        tun_dns::VERSION
    );
}

/// Initialize logging
fn init_logging(config: &Config) {
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hickory_proto=warn".parse() {
        filter = filter.add_directive(directive);
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.log.target)
        .with_span_events(FmtSpan::CLOSE);

    if config.log.is_json() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    if args.generate_config {
        tun_dns::config::create_default_config(&args.config_path)?;
        println!("Generated default configuration at {:?}", args.config_path);
        return Ok(());
    }

    let config = load_config_with_env(&args.config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {:?}: {}",
            args.config_path,
            e
        )
    })?;

    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    init_logging(&config);

    info!("tun-dns v{}", tun_dns::VERSION);
    info!("Configuration loaded from {:?}", args.config_path);

    let mut service = start_service(&config).await.map_err(|e| {
        error!(error = %e, recoverable = e.is_recoverable(), "DNS service failed to start");
        anyhow::anyhow!("Failed to start DNS service: {e}")
    })?;

    // Interface geometry for whoever configures the tunnel device
    if let Some(pool) = service.pool() {
        info!(
            range = %pool.range(),
            gateway = %pool.gateway(),
            broadcast = %pool.broadcast(),
            "fake-IP pool ready"
        );
    } else if config.dns.mode == DnsMode::Upstream {
        info!(upstream = %config.dns.upstream, "upstream mode, fake-IP pool disabled");
    }

    info!(
        "Startup complete in {:.2}ms",
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, initiating shutdown...");
        }
        () = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    info!("Shutting down...");

    if let Some(stats) = service.server_stats() {
        info!(
            "DNS stats: {} packets received, {} sent, {} dropped",
            stats.packets_received, stats.packets_sent, stats.packets_dropped
        );
    }
    if let Some(pool) = service.pool() {
        let stats = pool.stats().snapshot();
        info!(
            "Fake-IP stats: {} allocations, {} hits, {} wraparounds",
            stats.allocations, stats.hits, stats.wraparounds
        );
    }

    service.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Validate the configuration and start the DNS service
async fn start_service(config: &Config) -> Result<DnsService, TunDnsError> {
    config.validate()?;

    let mut service = DnsService::new();
    service.start(ServerOptions::new(config.dns.clone())).await?;
    Ok(service)
}

/// Wait for SIGTERM signal
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await;
}
