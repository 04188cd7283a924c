//! Entry points behind each CLI command.

use std::path::Path;

use tracing::{error, info, warn};

use crate::api::{start_api_server, AppState};
use crate::cli::{PlaceholderKind, RepairArgs, ServeArgs};
use crate::config::AppConfig;
use crate::domain::RequestSchema;
use crate::error::{AgriError, Result};
use crate::graph::{self, RepairOutcome};
use crate::ml::{self, LoadOptions};

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_serve_overrides(config: &mut AppConfig, args: &ServeArgs) {
    if let Some(model) = &args.model {
        config.model.path = model.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(schema) = args.schema {
        config.model.schema = schema;
    }
}

/// Load the model once and wrap it in router state.
pub fn build_state(config: &AppConfig) -> AppState {
    let options = LoadOptions {
        schema: config.model.schema,
        feature_dim: config.model.feature_dim,
        fallback_to_mock: config.model.fallback_to_mock,
    };
    let model = ml::load_model(&config.model.path, options);
    match &model {
        Some(handle) => info!(
            kind = handle.kind().as_str(),
            schema = %config.model.schema,
            "Model ready"
        ),
        None => error!(path = %config.model.path.display(), "Serving without a model"),
    }
    AppState::new(model, config.model.schema)
}

pub async fn run_serve(config: AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| AgriError::Validation(errors.join("; ")))?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.model.path.display(),
        schema = %config.model.schema,
        "Starting prediction service"
    );
    let state = build_state(&config);
    start_api_server(&config.server, state).await
}

/// Repair a model file. Returns whether the repair succeeded (and, with
/// `verify`, whether the result loads in the runtime).
pub fn run_repair(args: &RepairArgs) -> Result<bool> {
    let mut success = if !args.input.exists() {
        error!(path = %args.input.display(), "Input model not found");
        false
    } else {
        match graph::repair_file(&args.input, &args.output) {
            Ok(RepairOutcome::NoChanges) => false,
            Ok(outcome) => outcome.success(),
            Err(e) => {
                error!(error = %e, "Model repair failed");
                false
            }
        }
    };

    if success && args.verify {
        if let Err(e) = ml::verify_loadable(&args.output) {
            error!(error = %e, "Repaired model does not load in the runtime");
            success = false;
        }
    }

    if success {
        info!(path = %args.output.display(), "Fixed model saved");
    } else if args.placeholder_on_failure {
        warn!("Repair did not succeed, writing placeholder model");
        let model = graph::identity_model(args.placeholder_dim);
        graph::write_checked(&model, &args.placeholder_output)?;
    }

    Ok(success)
}

pub fn run_create_model(kind: PlaceholderKind, input_dim: usize, output: &Path) -> Result<()> {
    let model = match kind {
        PlaceholderKind::Agronomic => graph::agronomic_yield_model(),
        PlaceholderKind::Identity => {
            if input_dim == 0 {
                return Err(AgriError::Validation("input dim must be > 0".to_string()));
            }
            graph::identity_model(input_dim)
        }
    };
    graph::write_checked(&model, output)?;
    // The file must also be accepted by the runtime it is meant for.
    ml::verify_loadable(output)?;
    Ok(())
}

/// Print a per-strategy load report. Returns whether any strategy loaded.
pub fn run_probe(model: &Path, schema: RequestSchema, feature_dim: usize) -> bool {
    let report = ml::probe(model, schema, feature_dim);

    println!("Probe of {} ({} schema)", model.display(), schema);
    for attempt in &report.attempts {
        match &attempt.result {
            Ok(()) => println!("  {:<12} ok", attempt.strategy.as_str()),
            Err(e) => println!("  {:<12} failed: {}", attempt.strategy.as_str(), e),
        }
    }
    match &report.sample {
        Some(Ok(rows)) => println!("  sample prediction: {:?}", rows),
        Some(Err(e)) => println!("  sample prediction failed: {}", e),
        None => println!("  no strategy loaded the model"),
    }

    report.any_loaded()
}
