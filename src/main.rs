use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use waypost::{
    adapters::{GatewayServer, HttpClientAdapter},
    config::{ServerConfig, ServerConfigValidator, load_config},
    ports::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Optional configuration file (TOML, YAML or JSON); defaults and
    /// environment variables apply without one
    #[clap(short, long, global = true)]
    config: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Start the gateway server (default)
    Serve,
    /// Validate the effective configuration and exit
    Validate,
    /// Write a starter configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "waypost.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    waypost::core::health::process_start();
    color_eyre::install()?;
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config_path).await,
        Commands::Validate => validate_config_command(config_path),
        Commands::Init { output } => init_config_command(&output).await,
    }
}

async fn serve(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration:\n{e}"))?;

    tracing_setup::init_tracing(config.log_format)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!(
        "Starting Waypost API Gateway v{} on {} ({} services)",
        env!("CARGO_PKG_VERSION"),
        config.listen_addr(),
        config.enabled_services().count()
    );

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);

    let server = GatewayServer::bind(&config, http_client).await?;
    println!(
        "Waypost API Gateway listening on {}",
        server.local_addr()?
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let mut server_task = tokio::spawn(server.run(graceful_shutdown.shutdown_token()));

    tokio::select! {
        joined = &mut server_task => {
            joined.context("Server task panicked")??;
        }
        _ = graceful_shutdown.run_signal_handler() => {
            match tokio::time::timeout(graceful_shutdown.drain_timeout(), server_task).await {
                Ok(joined) => joined.context("Server task panicked")??,
                Err(_) => tracing::warn!(
                    "In-flight requests did not finish within {}, exiting anyway",
                    humantime::format_duration(graceful_shutdown.drain_timeout())
                ),
            }
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate the effective configuration and exit
fn validate_config_command(config_path: Option<&str>) -> Result<()> {
    match config_path {
        Some(path) => println!("🔍 Validating configuration file: {path}"),
        None => println!("🔍 Validating configuration from defaults and environment"),
    }

    #[allow(clippy::collapsible_if)]
    if let Some(path) = config_path {
        if !Path::new(path).exists() {
            eprintln!("❌ Error: Configuration file '{path}' not found");
            std::process::exit(1);
        }
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            print_summary(&config);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all service URLs start with http:// or https://");
            println!("   • Prefixes start with '/' and have no trailing '/'");
            println!("   • Use humantime durations such as '30s' or '500ms'");
            println!("   • HOST must be an IP address such as 0.0.0.0 or 127.0.0.1");
            std::process::exit(1);
        }
    }
}

fn print_summary(config: &ServerConfig) {
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr());
    println!("   • Request Timeout: {}", config.request_timeout);
    println!("   • Max Body Bytes: {}", config.max_body_bytes);
    for (key, service) in config.enabled_services() {
        println!(
            "   • {} ({}): {} -> {}",
            service.display_name(key),
            key,
            service.prefixes.join(", "),
            service.url
        );
    }
}

/// Write a starter configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Waypost API Gateway Configuration

host = "0.0.0.0"
port = 3000

# Default forwarding timeout for every service
request_timeout = "30s"

# Largest accepted request body in bytes
max_body_bytes = 1048576

# "json" or "pretty"
log_format = "json"

[services.users]
name = "User service"
url = "http://localhost:3001"
prefixes = ["/users", "/api/users"]

[services.products]
name = "Product service"
url = "http://localhost:3002"
prefixes = ["/products", "/api/products"]

[services.notes]
name = "Notes service"
url = "http://localhost:3003"
prefixes = ["/notes"]
# timeout = "10s"
# strip_prefix = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'waypost --config {config_path} serve' to start the server");
    Ok(())
}
