use clap::{Parser, Subcommand};
use pulse::config::Config;
use pulse::observability::{init_logging, init_metrics};
use pulse::server;
use shared::storage::connect;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start the public and admin listeners
    Run {
        #[arg(long, default_value = "pulse.yaml")]
        config: PathBuf,
    },
    /// Create the storage schema and exit
    Migrate {
        #[arg(long, default_value = "pulse.yaml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let path = match &cli.command {
        CliCommand::Run { config } | CliCommand::Migrate { config } => config,
    };
    let config = match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let _sentry = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            process::exit(1);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            CliCommand::Run { .. } => {
                init_metrics(config.metrics.as_ref())?;
                tracing::info!("Starting pulse");
                server::run(config).await?;
            }
            CliCommand::Migrate { .. } => {
                let pool = connect(&config.storage).await?;
                server::migrate(&pool).await?;
                pool.close().await;
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    });

    if let Err(e) = result {
        tracing::error!(error = %e, "Pulse exited with error");
        process::exit(1);
    }
}
