//! logview - append lines to a log file and serve it as a web page.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use logview::{
    sensors, shutdown_signal, ConnectionServer, InstanceMarker, LogWriter, PageService,
    RemoteLogger, SensorSource, ServerConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "logview")]
#[command(about = "Minimal log viewer: append lines to a log file and serve it as a web page")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log file to append to and display [default: log.txt]
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,

    /// Bind address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Page server port [default: 28885]
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Line logger socket port [default: 28886]
    #[arg(long, global = true)]
    remote_port: Option<u16>,

    /// Instance marker (PID file) location
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the log page (default)
    Serve(ServeArgs),

    /// Append a message to the log; without words, read lines from stdin
    Log(LogArgs),

    /// Accept log lines over TCP, one line per connection
    Listen,

    /// Stop the running server
    Stop(StopArgs),

    /// Render the page once and print it
    Snapshot(SnapshotArgs),

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args, Default)]
struct PageArgs {
    /// Client refresh interval in seconds [default: 5]
    #[arg(long)]
    refresh: Option<u32>,

    /// Show the log in file order instead of newest first
    #[arg(long)]
    oldest_first: bool,

    /// External sensor command [default: sensors]
    #[arg(long, conflicts_with = "native_sensors")]
    sensor_command: Option<String>,

    /// Read temperatures natively instead of running a command
    #[arg(long)]
    native_sensors: bool,
}

#[derive(Args, Default)]
struct ServeArgs {
    #[command(flatten)]
    page: PageArgs,

    /// Maximum connections handled at once [default: 64]
    #[arg(long)]
    max_connections: Option<usize>,

    /// Stop an already running instance instead of refusing to start
    #[arg(long)]
    replace: bool,
}

#[derive(Args)]
struct LogArgs {
    /// Message words, joined with spaces
    message: Vec<String>,
}

#[derive(Args)]
struct StopArgs {
    /// Seconds to wait after SIGTERM before sending SIGKILL
    #[arg(long, default_value_t = 5)]
    grace: u64,
}

#[derive(Args)]
struct SnapshotArgs {
    #[command(flatten)]
    page: PageArgs,

    /// Include the HTTP status line and headers
    #[arg(long)]
    headers: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Log(args)) => log_command(&cli, args).await,
        Some(Commands::Listen) => listen_command(&cli).await,
        Some(Commands::Stop(args)) => stop_command(&cli, args).await,
        Some(Commands::Snapshot(args)) => snapshot_command(&cli, args).await,
        Some(Commands::Config) => config_command(&cli),
        None => serve_command(&cli, &ServeArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Start from the config file (or defaults) and apply command-line overrides.
fn base_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServerConfig::default(),
    };

    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(port) = cli.remote_port {
        config = config.with_remote_port(port);
    }
    if let Some(path) = &cli.log_file {
        config = config.with_log_path(path.clone());
    }
    Ok(config)
}

fn apply_page_args(mut config: ServerConfig, args: &PageArgs) -> ServerConfig {
    if let Some(secs) = args.refresh {
        config = config.with_refresh_interval(secs);
    }
    if args.oldest_first {
        config = config.with_newest_first(false);
    }
    if args.native_sensors {
        config = config.with_sensor_command(None);
    } else if let Some(command) = &args.sensor_command {
        config = config.with_sensor_command(Some(command.clone()));
    }
    config
}

fn instance_marker(cli: &Cli) -> InstanceMarker {
    InstanceMarker::new(
        cli.pid_file
            .clone()
            .unwrap_or_else(InstanceMarker::default_path),
    )
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let mut config = apply_page_args(base_config(cli)?, &args.page);
    if let Some(max) = args.max_connections {
        config = config.with_max_connections(max);
    }
    config.validate()?;

    let marker = instance_marker(cli);
    marker
        .acquire_or_replace(args.replace, Duration::from_secs(5))
        .await?;

    let sensor = sensors::from_config(&config);
    info!("Log file: {}", config.log_path.display());
    info!("Sensors: {}", sensor.name());
    info!("Refresh interval: {}s", config.refresh_interval_secs);
    info!("Newest first: {}", config.newest_first);
    info!("Max connections: {}", config.max_connections);

    marker
        .hold(async {
            let server = ConnectionServer::bind(&config, sensor).await?;
            if let Ok(addr) = server.local_addr() {
                println!("Webserver running on port {}...", addr.port());
            }
            server.run_until(shutdown_signal()).await
        })
        .await?;
    println!("Shutting down webserver...");
    Ok(())
}

async fn log_command(cli: &Cli, args: &LogArgs) -> anyhow::Result<()> {
    let config = base_config(cli)?;
    let writer = LogWriter::new(&config.log_path);

    if !args.message.is_empty() {
        writer
            .append_words(args.message.as_slice())
            .await
            .with_context(|| format!("Failed to log to {}", config.log_path.display()))?;
        return Ok(());
    }

    let input = BufReader::new(tokio::io::stdin());
    let count = writer.run_interactive(input, tokio::io::stdout()).await?;
    info!("Logged {} lines", count);
    Ok(())
}

async fn listen_command(cli: &Cli) -> anyhow::Result<()> {
    let config = base_config(cli)?;
    let logger = RemoteLogger::bind(&config).await?;
    println!(
        "Logging lines received on port {} to {}",
        logger.local_addr()?.port(),
        config.log_path.display()
    );
    logger.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn stop_command(cli: &Cli, args: &StopArgs) -> anyhow::Result<()> {
    let marker = instance_marker(cli);
    if marker
        .stop_running_instance(Duration::from_secs(args.grace))
        .await?
    {
        println!("Stopped running instance");
    } else {
        println!("No running instance found");
    }
    Ok(())
}

async fn snapshot_command(cli: &Cli, args: &SnapshotArgs) -> anyhow::Result<()> {
    let config = apply_page_args(base_config(cli)?, &args.page);
    config.validate()?;

    let service = PageService::new(&config, sensors::from_config(&config));
    let page = service.render().await;

    let mut stdout = tokio::io::stdout();
    if args.headers {
        stdout.write_all(page.as_bytes()).await?;
    } else {
        stdout.write_all(page.body()).await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

fn config_command(cli: &Cli) -> anyhow::Result<()> {
    let config = base_config(cli)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
