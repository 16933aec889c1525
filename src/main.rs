use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deskserver_agent::config::{self, AgentConfig};
use deskserver_agent::handoff;
use deskserver_agent::supervisor::Supervisor;

/// Log level for the agent
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// DeskServer agent command line arguments
#[derive(Parser, Debug)]
#[command(name = "deskserver-agent")]
#[command(version, about = "Headless P2P remote-desktop host agent", long_about = None)]
struct CliArgs {
    /// Show a window (compatibility flag; this build is always headless)
    #[arg(long)]
    hide: bool,

    /// Path to the agent's JSON config file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);
    install_panic_hook();

    if args.hide {
        tracing::debug!("--hide is a no-op on this headless build");
    }

    let guard = match handoff::acquire_single_instance_guard() {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            tracing::info!("another instance is already running, exiting");
            return Ok(());
        }
        Err(e) => {
            tracing::error!("failed to acquire single-instance guard: {e}");
            return Ok(());
        }
    };

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let agent_config = AgentConfig::load_or_init(&config_path)?;
    tracing::info!(
        server = %agent_config.server.ip,
        port = agent_config.server.port,
        uuid = %agent_config.uuid,
        "loaded agent configuration"
    );

    let mut supervisor = Supervisor::new(&agent_config);
    let mut events = supervisor.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "agent event");
        }
    });

    supervisor.start(agent_config).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    supervisor.stop().await;
    drop(guard);

    Ok(())
}

/// Cross-platform stand-in for the original's `MyUnhandledExceptionFilter`
/// minidump writer: a panic is logged through the same structured sink as
/// everything else and the process exits non-zero, rather than crashing
/// with no trace at all.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(%info, "agent panicked");
        std::process::exit(1);
    }));
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "deskserver_agent=error",
        LogLevel::Warn => "deskserver_agent=warn",
        LogLevel::Info => "deskserver_agent=info",
        LogLevel::Verbose => "deskserver_agent=debug",
        LogLevel::Debug => "deskserver_agent=debug",
        LogLevel::Trace => "deskserver_agent=trace",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {err}");
    }
}
