use anyhow::{Context, Result};
use clap::Parser;
use crowdwatch::{CrowdwatchApp, CrowdwatchConfig};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "crowdwatch")]
#[command(about = "Real-time crowd monitoring with person and face detection")]
#[command(version)]
#[command(long_about = "Watches a camera feed, detects people and faces, and pushes live crowd \
statistics to browser clients over WebSocket and SSE. Uploaded images and videos can be \
analyzed on demand, and the same processing is available from the command line.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "crowdwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file
    #[arg(long, value_name = "PATH", help = "Write logs to a daily rolling file at PATH")]
    log_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Load models at startup instead of on first use
    #[arg(long, help = "Load detection models at startup")]
    preload: bool,

    /// Analyze one image and print the report
    #[arg(long, value_name = "PATH", conflicts_with = "process_video")]
    process_image: Option<PathBuf>,

    /// Analyze one video and print the report
    #[arg(long, value_name = "PATH")]
    process_video: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting crowdwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match CrowdwatchConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.preload {
        config.system.preload_models = true;
    }

    let mut app = CrowdwatchApp::new(config).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    if let Some(path) = &args.process_image {
        let report = app
            .media()
            .process_image(path)
            .await
            .with_context(|| format!("processing image {}", path.display()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(path) = &args.process_video {
        let report = app
            .media()
            .process_video(path)
            .await
            .with_context(|| format!("processing video {}", path.display()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    app.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("crowdwatch exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("crowdwatch={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(path));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

fn rolling_appender(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "crowdwatch.log".to_string());
    tracing_appender::rolling::daily(dir, prefix)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# crowdwatch configuration file");
    println!("# Defaults for every option; environment overrides use CROWDWATCH_<SECTION>__<KEY>");
    println!();
    println!("{}", toml::to_string_pretty(&CrowdwatchConfig::default())?);
    Ok(())
}
