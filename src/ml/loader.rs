//! Startup model loading with a fixed fallback chain.
//!
//! Strategies are tried in order; each failure is logged and swallowed.
//! Only when every strategy fails does the loader degrade to the mock
//! predictor (or to no model at all when fallback is disabled).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{AgronomicFeatures, FeatureList, NamedInput, RequestSchema};
use crate::error::Result;
use crate::ml::backend::InferenceBackend;
use crate::ml::mock::MockPredictor;
use crate::ml::onnx::{InputLayout, OnnxModel};

/// Shared, read-only model handle.
pub type ModelHandle = Arc<dyn InferenceBackend>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Pinned `f32` input facts, full graph optimization.
    Optimized,
    /// Pinned input facts, typed CPU plan without optimization passes.
    Unoptimized,
    /// The file as declared, no options.
    Bare,
}

impl LoadStrategy {
    /// Fallback order.
    pub const ALL: [LoadStrategy; 3] = [Self::Optimized, Self::Unoptimized, Self::Bare];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimized => "optimized",
            Self::Unoptimized => "unoptimized",
            Self::Bare => "bare",
        }
    }

    pub(crate) fn pins_input_facts(&self) -> bool {
        !matches!(self, Self::Bare)
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for the startup load.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub schema: RequestSchema,
    pub feature_dim: usize,
    pub fallback_to_mock: bool,
}

impl LoadOptions {
    fn layout(&self) -> InputLayout {
        InputLayout::for_schema(self.schema, self.feature_dim)
    }
}

/// Run `attempt` once per strategy in fallback order and keep the first
/// success. Failures are logged and swallowed.
fn first_loaded<T>(
    path: &Path,
    mut attempt: impl FnMut(LoadStrategy) -> Result<T>,
) -> Option<(LoadStrategy, T)> {
    for strategy in LoadStrategy::ALL {
        match attempt(strategy) {
            Ok(loaded) => return Some((strategy, loaded)),
            Err(e) => {
                warn!(path = %path.display(), strategy = %strategy, error = %e, "Model load attempt failed");
            }
        }
    }
    None
}

/// Try each strategy in order and return the first model that loads.
pub fn load_onnx(path: &Path, layout: InputLayout) -> Option<OnnxModel> {
    let (strategy, model) =
        first_loaded(path, |strategy| OnnxModel::load(path, strategy, layout))?;
    info!(
        path = %path.display(),
        strategy = %strategy,
        inputs = ?model.input_names(),
        outputs = ?model.output_names(),
        "Model loaded"
    );
    Some(model)
}

/// Build the process-wide model handle.
///
/// Returns `None` only when every strategy failed and mock fallback is off.
pub fn load_model(path: &Path, options: LoadOptions) -> Option<ModelHandle> {
    if let Some(model) = load_onnx(path, options.layout()) {
        return Some(Arc::new(model));
    }

    if options.fallback_to_mock {
        warn!(path = %path.display(), "All load strategies failed, serving mock predictor");
        Some(Arc::new(MockPredictor::new()))
    } else {
        warn!(path = %path.display(), "All load strategies failed, no model available");
        None
    }
}

/// Load `path` with the bare strategy, as a plain runtime session would.
///
/// Used to confirm that a repaired file is accepted by the runtime.
pub fn verify_loadable(path: &Path) -> Result<OnnxModel> {
    let model = OnnxModel::load(path, LoadStrategy::Bare, InputLayout::Agronomic)?;
    info!(
        path = %path.display(),
        inputs = ?model.input_names(),
        outputs = ?model.output_names(),
        "Model loads in the runtime"
    );
    Ok(model)
}

/// Outcome of one strategy in a probe run.
#[derive(Debug)]
pub struct StrategyProbe {
    pub strategy: LoadStrategy,
    pub result: std::result::Result<(), String>,
}

/// Diagnostic report over every load strategy.
#[derive(Debug)]
pub struct ProbeReport {
    pub attempts: Vec<StrategyProbe>,
    /// Sample inference through the first strategy that loaded.
    pub sample: Option<std::result::Result<Vec<Vec<f32>>, String>>,
}

impl ProbeReport {
    pub fn any_loaded(&self) -> bool {
        self.attempts.iter().any(|a| a.result.is_ok())
    }
}

/// Sample request for a schema, as shaped for `handle`.
pub fn sample_inputs(schema: RequestSchema, handle: &dyn InferenceBackend) -> Result<Vec<NamedInput>> {
    match schema {
        RequestSchema::Agronomic => Ok(AgronomicFeatures::example().to_inputs()),
        RequestSchema::Features => {
            let name = handle
                .input_names()
                .into_iter()
                .next()
                .unwrap_or_else(|| "input".to_string());
            let list = FeatureList {
                features: vec![6.5, 0.0, 1.0, 2.0],
            };
            Ok(vec![list.to_input(&name)?])
        }
    }
}

/// Try every strategy independently (no short-circuit) and run one sample
/// inference through the first model that loaded.
pub fn probe(path: &Path, schema: RequestSchema, feature_dim: usize) -> ProbeReport {
    let layout = InputLayout::for_schema(schema, feature_dim);
    let mut attempts = Vec::with_capacity(LoadStrategy::ALL.len());
    let mut first: Option<OnnxModel> = None;

    for strategy in LoadStrategy::ALL {
        match OnnxModel::load(path, strategy, layout) {
            Ok(model) => {
                info!(strategy = %strategy, "Probe load succeeded");
                attempts.push(StrategyProbe {
                    strategy,
                    result: Ok(()),
                });
                if first.is_none() {
                    first = Some(model);
                }
            }
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Probe load failed");
                attempts.push(StrategyProbe {
                    strategy,
                    result: Err(e.to_string()),
                });
            }
        }
    }

    let sample = first.map(|model| {
        sample_inputs(schema, &model)
            .and_then(|inputs| model.run(&inputs))
            .map(|out| out.to_rows())
            .map_err(|e| e.to_string())
    });

    ProbeReport { attempts, sample }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::error::AgriError;
    use crate::graph::builder;

    fn options(schema: RequestSchema, fallback_to_mock: bool) -> LoadOptions {
        LoadOptions {
            schema,
            feature_dim: 4,
            fallback_to_mock,
        }
    }

    #[test]
    fn missing_file_degrades_to_mock() {
        let handle = load_model(
            Path::new("/nonexistent/agri_yield.onnx"),
            options(RequestSchema::Features, true),
        )
        .unwrap();
        assert_eq!(handle.kind(), ModelKind::Mock);
    }

    #[test]
    fn corrupt_file_without_fallback_yields_nothing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"definitely not protobuf").unwrap();
        assert!(load_model(file.path(), options(RequestSchema::Features, false)).is_none());
    }

    #[test]
    fn valid_model_loads_with_first_strategy() {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        builder::save_model(&builder::agronomic_yield_model(), file.path()).unwrap();

        let model = load_onnx(file.path(), InputLayout::Agronomic).unwrap();
        assert_eq!(model.strategy(), LoadStrategy::Optimized);
    }

    #[test]
    fn second_strategy_wins_when_first_fails() {
        let mut tried = Vec::new();
        let loaded = first_loaded(Path::new("model.onnx"), |strategy| {
            tried.push(strategy);
            match strategy {
                LoadStrategy::Optimized => Err(AgriError::Model("optimize failed".into())),
                other => Ok(other.as_str()),
            }
        });

        assert_eq!(loaded, Some((LoadStrategy::Unoptimized, "unoptimized")));
        assert_eq!(tried, vec![LoadStrategy::Optimized, LoadStrategy::Unoptimized]);
    }

    #[test]
    fn chain_yields_nothing_when_every_strategy_fails() {
        let mut tried = 0;
        let loaded: Option<(LoadStrategy, ())> = first_loaded(Path::new("model.onnx"), |_| {
            tried += 1;
            Err(AgriError::Model("unreadable".into()))
        });
        assert!(loaded.is_none());
        assert_eq!(tried, LoadStrategy::ALL.len());
    }

    #[test]
    fn unoptimized_strategy_pins_inputs_and_runs() {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        builder::save_model(&builder::identity_model(4), file.path()).unwrap();

        let model = OnnxModel::load(
            file.path(),
            LoadStrategy::Unoptimized,
            InputLayout::Features { dim: 4 },
        )
        .unwrap();
        assert_eq!(model.strategy(), LoadStrategy::Unoptimized);

        let out = model
            .run(&[NamedInput::new("input", vec![1, 4], vec![7.0, 10.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(out.to_rows(), vec![vec![7.0, 10.0, 0.0, 0.0]]);
    }

    #[test]
    fn layout_mismatch_falls_through_to_bare() {
        // The agronomic model declares six inputs; the features layout cannot
        // pin them, but the bare strategy does not pin anything.
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        builder::save_model(&builder::agronomic_yield_model(), file.path()).unwrap();

        let model = load_onnx(file.path(), InputLayout::Features { dim: 4 }).unwrap();
        assert_eq!(model.strategy(), LoadStrategy::Bare);
    }

    #[test]
    fn probe_reports_every_strategy() {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        builder::save_model(&builder::identity_model(4), file.path()).unwrap();

        let report = probe(file.path(), RequestSchema::Features, 4);
        assert_eq!(report.attempts.len(), 3);
        assert!(report.any_loaded());
        let rows = report.sample.unwrap().unwrap();
        assert_eq!(rows, vec![vec![6.5, 0.0, 1.0, 2.0]]);
    }

    #[test]
    fn verify_loadable_ignores_layout() {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        builder::save_model(&builder::identity_model(6), file.path()).unwrap();
        let model = verify_loadable(file.path()).unwrap();
        assert_eq!(model.input_names(), vec!["input".to_string()]);

        std::fs::write(file.path(), b"garbage").unwrap();
        assert!(verify_loadable(file.path()).is_err());
    }

    #[test]
    fn probe_of_missing_file_has_no_sample() {
        let report = probe(Path::new("/nonexistent.onnx"), RequestSchema::Agronomic, 4);
        assert!(!report.any_loaded());
        assert!(report.sample.is_none());
    }
}
