use std::path::Path;

use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use portico::{
    config::{GatewayConfigValidator, load_config},
    metrics, server, tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "portico.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "portico.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "portico.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "portico.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Determine the command to run
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path);
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    let config = load_config(&config_path)?;

    tracing_setup::init_tracing_with_config(&config.log.level, config.log.json)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics();

    tracing::info!("Loaded configuration from {config_path}");

    GatewayConfigValidator::validate(&config)?;

    server::serve(config).await?;

    Ok(())
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    // First check if file exists and is readable
    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    // Try to parse the configuration
    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    // Validate the configuration
    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Resources: {}", config.resources.len());
            let chains = config
                .resources
                .iter()
                .filter(|m| matches!(m.resource, portico::config::Resource::Chain(_)))
                .count();
            println!("   • Chains: {chains}");
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure chain patterns start with '/'");
            println!("   • Check that every reference names a declared resource");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Portico API Gateway Configuration

listen_addr: "127.0.0.1:8080"

log:
  level: info
  json: false

resources:
  - apiVersion: app/v1
    kind: BodyLimit
    metadata:
      name: limit-1mb
    spec:
      max_size: 1048576
      mem_limit: 262144

  - apiVersion: app/v1
    kind: Echo
    metadata:
      name: echo
    spec: {}

  - apiVersion: app/v1
    kind: Health
    metadata:
      name: health
    spec:
      timeout_ms: 5000

  - apiVersion: core/v1
    kind: Chain
    metadata:
      name: echo-chain
    spec:
      pattern: /echo
      middleware:
        - apiVersion: app/v1
          kind: BodyLimit
          name: limit-1mb
      handler:
        apiVersion: app/v1
        kind: Echo
        name: echo

  - apiVersion: core/v1
    kind: Chain
    metadata:
      name: health-chain
    spec:
      pattern: /
      middleware: []
      handler:
        apiVersion: app/v1
        kind: Health
        name: health
"#;

    tokio::fs::write(path, default_config)
        .await
        .map_err(|e| eyre!("Failed to write config file: {}", e))?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'portico serve --config {config_path}' to start the server");
    Ok(())
}
