mod cli;
mod config;
mod error;
mod output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use crate::{
    cli::{Args, Commands, OutputFormat},
    config::AppConfig,
    error::{AppError, Result},
    output::{GarageReport, OutputManager},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use volvo_connector::model::InMemoryGarage;
use volvo_connector::{
    ConnectionState, Connector, ConnectorHost, JsonFileStore, ReqwestTransport,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let output_format = args.command.output_format();

    if let Err(e) = run(args).await {
        match output_format {
            Some(OutputFormat::Json) | Some(OutputFormat::JsonCompact) => {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                });
                println!("{error_json}");
            }
            _ => {
                error!("Application error: {}", e);
                #[cfg(feature = "colored-output")]
                {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
                #[cfg(not(feature = "colored-output"))]
                {
                    eprintln!("Error: {}", e);
                }
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;

    match args.command {
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }

        Commands::Config { show, init } => {
            if init {
                let path = AppConfig::init(args.config.as_deref())?;
                println!("Configuration template written to {}", path.display());
            } else if show {
                let config = AppConfig::load(args.config.as_deref())?;
                println!("{}", config.show()?);
            } else {
                println!("Use --show to display the current configuration or --init to create one");
            }
        }

        Commands::Once { output } => {
            let config = AppConfig::load(args.config.as_deref())?;
            let (connector, garage) = start_connector(config, args.state).await?;
            let printer = OutputManager::new(std::io::stdout().is_terminal());

            let mut states = connector.subscribe_connection_state();
            connector.startup();
            let state = states
                .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Error))
                .await
                .map(|s| *s)
                .unwrap_or(ConnectionState::Error);

            let report = GarageReport::collect(&connector, garage.vehicles());
            println!("{}", printer.format_report(&report, &output)?);
            connector.shutdown().await?;

            if state == ConnectionState::Error {
                return Err(AppError::UpdateFailed);
            }
        }

        Commands::Run { output, interval } => {
            let config = AppConfig::load(args.config.as_deref())?.with_interval(interval)?;
            let (connector, garage) = start_connector(config, args.state).await?;
            let printer = OutputManager::new(std::io::stdout().is_terminal());

            let mut updates = connector.subscribe_last_update();
            let mut healthy = connector.subscribe_healthy();
            connector.startup();

            let interrupted = tokio::signal::ctrl_c();
            tokio::pin!(interrupted);
            loop {
                tokio::select! {
                    _ = &mut interrupted => {
                        info!("Interrupted, shutting down");
                        break;
                    }
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let report = GarageReport::collect(&connector, garage.vehicles());
                        match printer.format_report(&report, &output) {
                            Ok(text) => println!("{text}"),
                            Err(e) => warn!(error = %e, "Failed to render report"),
                        }
                    }
                    changed = healthy.changed() => {
                        if changed.is_err() || !*healthy.borrow() {
                            warn!("Connector stopped polling");
                            break;
                        }
                    }
                }
            }

            connector.shutdown().await?;
        }
    }

    Ok(())
}

async fn start_connector(
    config: AppConfig,
    state: Option<PathBuf>,
) -> Result<(Connector, Arc<InMemoryGarage>)> {
    let state = match state {
        Some(path) => path,
        None => AppConfig::default_state_path()?,
    };
    info!(state = %state.display(), "Using state file");

    let store = Arc::new(JsonFileStore::new(state));
    let garage = Arc::new(InMemoryGarage::new());
    let host = ConnectorHost {
        garage: garage.clone(),
        token_store: store.clone(),
        cache_store: store,
        transport: Arc::new(ReqwestTransport::new()?),
    };

    let connector = Connector::new(config.id, config.connector, host).await?;
    Ok((connector, garage))
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    subscriber
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
    Ok(())
}
