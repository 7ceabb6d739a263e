//! qbo-gateway CLI binary entry point.

use clap::Parser;
use qbo_gateway::cli::{AuthCommands, Cli, Commands};
use qbo_gateway::config::GatewayConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match GatewayConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Url => qbo_gateway::cli::auth::handle_url(&config),
            AuthCommands::Complete(args) => {
                qbo_gateway::cli::auth::handle_complete(&config, args).await
            }
            AuthCommands::Status => qbo_gateway::cli::auth::handle_status(&config).await,
            AuthCommands::Refresh => qbo_gateway::cli::auth::handle_refresh(&config).await,
            AuthCommands::Disconnect => qbo_gateway::cli::auth::handle_disconnect(&config).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
