use clap::Parser;
use tracing::{error, warn};

use agri_yield::cli::{Cli, Commands, ServeArgs};
use agri_yield::commands::{
    apply_serve_overrides, run_create_model, run_probe, run_repair, run_serve,
};
use agri_yield::config::AppConfig;
use agri_yield::error::{AgriError, Result};
use agri_yield::logging::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => serve(ServeArgs::default()).await?,
        Some(Commands::Serve(args)) => serve(args).await?,
        Some(Commands::Repair(args)) => {
            init_logging_simple();
            if !run_repair(&args)? {
                return Err(AgriError::Validation(format!(
                    "could not repair {}",
                    args.input.display()
                )));
            }
        }
        Some(Commands::CreateModel {
            kind,
            input_dim,
            output,
        }) => {
            init_logging_simple();
            let output = output.unwrap_or_else(|| kind.default_output());
            run_create_model(kind, input_dim, &output)?;
        }
        Some(Commands::Probe {
            model,
            schema,
            feature_dim,
        }) => {
            init_logging_simple();
            if !run_probe(&model, schema, feature_dim) {
                return Err(AgriError::Model(format!(
                    "no load strategy accepted {}",
                    model.display()
                )));
            }
        }
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let loaded = if args.config_dir.as_os_str().is_empty() {
        AppConfig::load()
    } else {
        AppConfig::load_from(&args.config_dir)
    };

    let (mut config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default_config(), Some(e)),
    };
    apply_serve_overrides(&mut config, &args);

    let _guard = init_logging(&config.logging);
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load configuration, using defaults");
    }

    if let Err(e) = run_serve(config).await {
        error!(error = %e, "Server exited with error");
        return Err(e);
    }
    Ok(())
}
