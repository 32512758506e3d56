use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use motorwatch::{build_router, initialize, open_store, RootConfig, RootError};

/// Motorwatch: motor telemetry behind named permissions
#[derive(Parser, Debug)]
#[command(name = "motorwatch", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// SQLite database for readings
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Start the HTTP server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Fetch the feed and append new readings
    Ingest {
        /// Keep polling on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Print the latest stored readings
    Readings {
        /// Maximum number of readings to display
        #[arg(short, long, default_value = "6")]
        limit: usize,
    },

    /// List registered policies and the endpoints they guard
    Policies,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("motorwatch=debug,motorwatch_perms=debug,motorwatch_telemetry=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("motorwatch=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    match cli.command {
        Commands::Init { database } => cmd_init(cli.config.as_ref(), database),
        Commands::Serve { bind, port } => cmd_serve(cli.config.as_ref(), bind, port).await,
        Commands::Ingest { watch } => cmd_ingest(cli.config.as_ref(), watch).await,
        Commands::Readings { limit } => cmd_readings(cli.config.as_ref(), limit),
        Commands::Policies => cmd_policies(cli.config.as_ref()),
    }
}

fn cmd_init(config_path: Option<&PathBuf>, database: Option<PathBuf>) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(db) = database {
        config.storage.database = db;
    }
    config.validate()?;
    open_store(&config)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(RootConfig::default_config_path);
    config.save(&save_path)?;

    println!("Motorwatch initialized.");
    println!("  Database: {}", config.storage.database.display());
    println!("  Feed:     {}", config.feed.url);
    println!("  Config:   {}", save_path.display());
    Ok(())
}

async fn cmd_serve(
    config_path: Option<&PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let state = Arc::new(initialize(config)?);
    let app = build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");
    println!("Motorwatch listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn cmd_ingest(config_path: Option<&PathBuf>, watch: bool) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let interval = config.feed.poll_interval();
    let state = initialize(config)?;

    if watch {
        info!(interval_secs = interval.as_secs(), "watching feed");
        state.ingestor.watch(interval, shutdown_signal()).await;
        return Ok(());
    }

    let report = state.ingestor.run_once().await?;
    println!(
        "Fetched {} entries, skipped {}, added {}.",
        report.fetched, report.skipped, report.added
    );
    Ok(())
}

fn cmd_readings(config_path: Option<&PathBuf>, limit: usize) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let readings = store.latest(limit)?;

    if readings.is_empty() {
        println!("No readings stored.");
        return Ok(());
    }
    for r in &readings {
        println!(
            "[{}] #{} {} temp={} V={} I={} pos=({}, {}, {}) status={}",
            r.recorded_at, r.id, r.motor_id, r.temperature, r.voltage, r.current, r.x, r.y, r.z,
            r.status
        );
    }
    Ok(())
}

fn cmd_policies(config_path: Option<&PathBuf>) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let state = initialize(config)?;

    for name in state.registry.names() {
        let entry = state.registry.entry(name)?;
        let endpoints: Vec<String> = entry
            .protected_endpoints()
            .iter()
            .map(|id| id.to_string())
            .collect();
        println!("{}", entry.name());
        println!(
            "  subject: {}  staff: {}  superuser: {}  anonymous: {}",
            entry.subject_type().map_or("-".to_string(), |t| t.to_string()),
            entry.allow_staff(),
            entry.allow_superuser(),
            entry.allow_anonymous()
        );
        println!("  guards:  {}", endpoints.join(", "));
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}
