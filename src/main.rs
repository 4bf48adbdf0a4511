use clap::{Parser, Subcommand};
use portlink::config::{default_config_path, AgentConfig, ConfigLoader, LogFormat, LoggingConfig};
use portlink::{PortInfo, Scanner, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "portlink",
    version,
    about = "Background agent that exposes host serial ports to remote clients.",
    long_about = "Discovers serial ports, arbitrates exclusive and shared access, and \
                  manages open port sessions with streaming reads. A protocol layer \
                  embedding this agent maps remote calls onto its sessions."
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent until interrupted
    Serve {
        /// Force debug logging regardless of configuration
        #[arg(long)]
        debug: bool,
    },
    /// Scan and list available serial ports
    Scan {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Show detailed port information
        #[arg(short, long)]
        verbose: bool,
    },
    /// Manage agent configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init {
        /// Output path for the config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Display the current configuration
    Show,
    /// Show the default configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { debug } => serve(load_config(cli.config.as_deref())?, debug).await,
        Command::Scan { json, verbose } => scan(json, verbose),
        Command::Config { action } => manage_config(cli.config.as_deref(), action),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader.into_config())
}

fn init_logging(logging: &LoggingConfig, debug: bool) {
    let level = if debug { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn serve(config: AgentConfig, debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&config.logging, debug);

    info!(version = env!("CARGO_PKG_VERSION"), "starting portlink agent");
    info!(
        bind_address = %config.server.bind_address,
        tls = config.tls.enabled,
        "listener settings for the embedding protocol layer"
    );

    let defaults = config.serial.defaults.to_port_config()?;
    let manager = Arc::new(SessionManager::new(
        config.serial.allow_shared_access,
        defaults,
    ));
    let scanner = Arc::new(Scanner::new(
        &config.serial.exclude_patterns,
        Some(Arc::clone(&manager)),
    )?);

    match scanner.scan() {
        Ok(ports) => {
            info!(count = ports.len(), "initial port scan complete");
            for port in &ports {
                info!(port = %port.name, description = %port.description, "found serial port");
            }
        }
        Err(e) => warn!(error = %e, "initial port scan failed"),
    }

    let scan_interval = config.serial.scan_interval();
    let mut watch = if scan_interval.is_zero() {
        None
    } else {
        Some(Arc::clone(&scanner).watch_ports(scan_interval, |ports| {
            info!(count = ports.len(), "port change detected");
        }))
    };

    shutdown_signal().await;
    info!("shutdown signal received");

    if let Some(watch) = watch.as_mut() {
        watch.stop();
    }
    manager.close_all();
    info!("agent stopped");

    Ok(())
}

fn scan(json: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let scanner = Scanner::new(&[], None)?;
    let ports = scanner.scan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Found {} serial port(s):\n", ports.len());
    for port in &ports {
        if verbose {
            print_port_verbose(port);
        } else {
            print_port_simple(port);
        }
    }

    Ok(())
}

fn print_port_simple(port: &PortInfo) {
    let status = if port.is_open { " [OPEN]" } else { "" };
    println!("  {} - {}{}", port.name, port.description, status);
}

fn print_port_verbose(port: &PortInfo) {
    println!("  {}", port.name);
    println!("    Description:  {}", port.description);
    println!("    Type:         {}", port.port_type);
    if !port.hardware_id.is_empty() {
        println!("    Hardware ID:  {}", port.hardware_id);
    }
    if !port.manufacturer.is_empty() {
        println!("    Manufacturer: {}", port.manufacturer);
    }
    if !port.product.is_empty() {
        println!("    Product:      {}", port.product);
    }
    if !port.serial_number.is_empty() {
        println!("    Serial:       {}", port.serial_number);
    }
    if !port.vid.is_empty() && !port.pid.is_empty() {
        println!("    VID/PID:      {}:{}", port.vid, port.pid);
    }
    if port.is_open {
        println!("    Status:       OPEN (locked by {})", port.locked_by);
    } else {
        println!("    Status:       Available");
    }
    println!();
}

fn manage_config(
    config_path: Option<&std::path::Path>,
    action: ConfigAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Init { output } => {
            let path = output
                .or_else(default_config_path)
                .ok_or("cannot determine a configuration directory")?;
            ConfigLoader::with_defaults().save_to(&path)?;
            println!("Configuration file created: {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => match default_config_path() {
            Some(path) => println!("{}", path.display()),
            None => println!("No configuration directory available."),
        },
    }
    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
