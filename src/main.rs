//! diabetes-mlops entry point

use clap::Parser;
use diabetes_mlops::cli::{
    cmd_ingest, cmd_predict, cmd_run, cmd_serve, cmd_status, cmd_train, cmd_validate, Cli, Commands,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diabetes_mlops=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => cmd_run(&cli.config, &cli.schema)?,
        Commands::Ingest => cmd_ingest(&cli.config)?,
        Commands::Validate => cmd_validate(&cli.config, &cli.schema)?,
        Commands::Train => cmd_train(&cli.config)?,
        Commands::Serve { host, port } => cmd_serve(&cli.config, host, port).await?,
        Commands::Predict { url, form } => cmd_predict(&url, form).await?,
        Commands::Status => cmd_status(&cli.config)?,
    }

    Ok(())
}
