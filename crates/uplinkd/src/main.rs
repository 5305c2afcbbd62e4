//! uplinkd: automatic ISP failover for an FDM-managed firewall.
//!
//! Probes the primary uplink and installs or withdraws a backup static
//! route through the firewall's management API.
//!
//! # Usage
//!
//! ```text
//! uplinkd --config /etc/uplink/uplink.toml run
//! uplinkd cycle --json
//! uplinkd status
//! uplinkd init-config > uplink.toml
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use uplink_controller::{Direction, FailoverController};
use uplink_core::UplinkConfig;
use uplink_fdm::HttpTransport;
use uplink_health::SystemPing;

mod commands;
mod daemon;

const DEFAULT_CONFIG: &str = "/etc/uplink/uplink.toml";
const DEFAULT_LOG_FILTER: &str = "info,uplinkd=debug,uplink=debug";

#[derive(Parser)]
#[command(
    name = "uplinkd",
    about = "ISP failover for FDM-managed firewalls",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, global = true, env = "UPLINK_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Firewall password; takes precedence over the configuration file.
    #[arg(long, global = true, env = "UPLINK_FDM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run monitoring cycles until interrupted.
    Run,
    /// Run a single monitoring cycle.
    ///
    /// Exit status: 0 when the routing state is correct, 2 on partial
    /// failure, 1 on fatal error.
    Cycle {
        /// Print the cycle report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show whether the backup route is installed.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Install the backup route now, regardless of probe results.
    Failover,
    /// Withdraw the backup route now, regardless of probe results.
    Restore,
    /// Log in and resolve the virtual router and failover interface.
    Check,
    /// Print a configuration file to start from.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Command::InitConfig = cli.command {
        commands::init_config()?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli.config, cli.password.as_deref())?;
    let controller = build_controller(config)?;

    match cli.command {
        Command::Run => run(&controller).await.map(|()| ExitCode::SUCCESS),
        Command::Cycle { json } => commands::cycle(&controller, json).await,
        Command::Status { json } => commands::status(&controller, json).await,
        Command::Failover => Ok(commands::force(&controller, Direction::Failover).await),
        Command::Restore => Ok(commands::force(&controller, Direction::Restore).await),
        Command::Check => commands::check(&controller).await,
        Command::InitConfig => Ok(ExitCode::SUCCESS),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: &Path, password: Option<&str>) -> anyhow::Result<UplinkConfig> {
    let mut config = UplinkConfig::from_file(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    if let Some(password) = password {
        config = config.with_password(password);
    }
    if config.firewall.password.is_empty() {
        anyhow::bail!(
            "no firewall password: set firewall.password in {} or UPLINK_FDM_PASSWORD",
            path.display()
        );
    }
    info!(
        path = %path.display(),
        firewall = %config.firewall.address,
        target = %config.probe.target,
        route = %config.failover.route,
        "configuration loaded"
    );
    Ok(config)
}

fn build_controller(config: UplinkConfig) -> anyhow::Result<FailoverController> {
    let transport = HttpTransport::new(&config.firewall).context("building HTTPS client")?;
    Ok(FailoverController::new(
        config,
        Arc::new(transport),
        Arc::new(SystemPing::default()),
    ))
}

async fn run(controller: &FailoverController) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "failed to install CTRL+C handler");
                // Keep the sender alive so the daemon is not stopped.
                std::future::pending::<()>().await;
            }
        }
    });

    let interval = controller.config().schedule.interval();
    daemon::run(controller, interval, shutdown_rx).await?;
    info!("uplink daemon stopped");
    Ok(())
}
