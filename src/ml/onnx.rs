//! ONNX inference wrapper (pure Rust via `tract-onnx`).
//!
//! One `OnnxModel` is built per process by the loader and then shared
//! read-only by the request handlers.

use std::path::Path;

use anyhow::Context;
use tract_onnx::prelude::*;

use crate::domain::{ModelKind, NamedInput, OutputTensor, RequestSchema, AGRONOMIC_FIELDS};
use crate::error::{AgriError, Result};
use crate::ml::backend::InferenceBackend;
use crate::ml::loader::LoadStrategy;

/// Input shapes a deployment feeds its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// One `[1, dim]` tensor.
    Features { dim: usize },
    /// Six `[1, 1]` tensors, one per agronomic field.
    Agronomic,
}

impl InputLayout {
    pub fn for_schema(schema: RequestSchema, feature_dim: usize) -> Self {
        match schema {
            RequestSchema::Features => Self::Features { dim: feature_dim },
            RequestSchema::Agronomic => Self::Agronomic,
        }
    }

    /// Pinned shape for each of the model's `count` inputs.
    fn shapes(&self, count: usize) -> Result<Vec<Vec<usize>>> {
        match *self {
            Self::Features { dim } => {
                if dim == 0 {
                    return Err(AgriError::Validation("feature dim must be > 0".to_string()));
                }
                if count != 1 {
                    return Err(AgriError::Model(format!(
                        "features layout expects 1 model input, model declares {count}"
                    )));
                }
                Ok(vec![vec![1, dim]])
            }
            Self::Agronomic => {
                if count != AGRONOMIC_FIELDS.len() {
                    return Err(AgriError::Model(format!(
                        "agronomic layout expects {} model inputs, model declares {count}",
                        AGRONOMIC_FIELDS.len()
                    )));
                }
                Ok(vec![vec![1, 1]; count])
            }
        }
    }
}

#[derive(Debug, Clone)]
struct InputSlot {
    name: String,
    /// `None` when the strategy left the declared facts untouched.
    shape: Option<Vec<usize>>,
}

#[derive(Clone)]
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
    strategy: LoadStrategy,
    inputs: Vec<InputSlot>,
    output_names: Vec<String>,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("strategy", &self.strategy)
            .field("inputs", &self.inputs)
            .field("output_names", &self.output_names)
            .finish()
    }
}

impl OnnxModel {
    /// Load an ONNX model from `path` using one load strategy.
    pub fn load(path: &Path, strategy: LoadStrategy, layout: InputLayout) -> Result<Self> {
        let mut model = tract_onnx::onnx()
            .model_for_path(path)
            .context("onnx load failed")?;

        let input_names = outlet_names(&model, true)?;
        let output_names = outlet_names(&model, false)?;
        if output_names.is_empty() {
            return Err(AgriError::Model("onnx model declares no outputs".to_string()));
        }

        let pinned = if strategy.pins_input_facts() {
            let shapes = layout.shapes(input_names.len())?;
            for (ix, shape) in shapes.iter().enumerate() {
                let mut fact_shape = tvec!();
                for d in shape {
                    fact_shape.push(*d);
                }
                model = model
                    .with_input_fact(ix, InferenceFact::dt_shape(f32::datum_type(), fact_shape))
                    .with_context(|| format!("onnx input fact failed for input {ix}"))?;
            }
            Some(shapes)
        } else {
            None
        };

        let typed = match strategy {
            LoadStrategy::Optimized => model
                .into_optimized()
                .context("onnx optimize failed")?,
            LoadStrategy::Unoptimized | LoadStrategy::Bare => model
                .into_typed()
                .context("onnx typing failed")?,
        };

        let plan = typed
            .into_runnable()
            .context("onnx runnable failed")?;

        let inputs = input_names
            .into_iter()
            .enumerate()
            .map(|(ix, name)| InputSlot {
                name,
                shape: pinned.as_ref().map(|shapes| shapes[ix].clone()),
            })
            .collect();

        Ok(Self {
            plan,
            strategy,
            inputs,
            output_names,
        })
    }

    pub fn strategy(&self) -> LoadStrategy {
        self.strategy
    }

    fn bind_inputs(&self, inputs: &[NamedInput]) -> Result<TVec<TValue>> {
        if let Some(unknown) = inputs
            .iter()
            .find(|i| !self.inputs.iter().any(|slot| slot.name == i.name))
        {
            return Err(AgriError::Validation(format!(
                "model has no input named '{}'",
                unknown.name
            )));
        }

        let mut bound = tvec!();
        for slot in &self.inputs {
            let input = inputs.iter().find(|i| i.name == slot.name).ok_or_else(|| {
                AgriError::Validation(format!("missing model input '{}'", slot.name))
            })?;

            let shape = slot.shape.as_deref().unwrap_or(input.shape.as_slice());
            let expected: usize = shape.iter().product();
            if input.values.len() != expected {
                return Err(AgriError::Validation(format!(
                    "onnx input dim mismatch for '{}': got {}, expected {} (shape={:?})",
                    slot.name,
                    input.values.len(),
                    expected,
                    shape
                )));
            }

            let tensor = tract_ndarray::ArrayD::<f32>::from_shape_vec(
                tract_ndarray::IxDyn(shape),
                input.values.clone(),
            )
            .with_context(|| format!("onnx input reshape failed for '{}'", slot.name))?
            .into_tvalue();
            bound.push(tensor);
        }
        Ok(bound)
    }
}

/// Names of the graph's input (or output) outlets, in binding order.
fn outlet_names(model: &InferenceModel, inputs: bool) -> Result<Vec<String>> {
    let outlets = if inputs {
        model.input_outlets()
    } else {
        model.output_outlets()
    }
    .context("onnx outlet lookup failed")?;

    Ok(outlets
        .iter()
        .map(|outlet| {
            model
                .outlet_label(*outlet)
                .map(str::to_string)
                .unwrap_or_else(|| model.node(outlet.node).name.clone())
        })
        .collect())
}

impl InferenceBackend for OnnxModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Onnx
    }

    fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|slot| slot.name.clone()).collect()
    }

    fn output_names(&self) -> Vec<String> {
        self.output_names.clone()
    }

    fn run(&self, inputs: &[NamedInput]) -> Result<OutputTensor> {
        let bound = self.bind_inputs(inputs)?;

        let outputs = self
            .plan
            .run(bound)
            .context("onnx run failed")?;
        if outputs.is_empty() {
            return Err(AgriError::Model("onnx produced no outputs".to_string()));
        }

        let out0 = outputs[0]
            .cast_to::<f32>()
            .context("onnx output cast failed")?;
        let arr = out0
            .to_array_view::<f32>()
            .context("onnx output decode failed")?;

        Ok(OutputTensor::new(
            arr.shape().to_vec(),
            arr.iter().copied().collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgronomicFeatures;
    use crate::graph::builder;

    fn write_model(model: &crate::graph::proto::ModelProto) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        builder::save_model(model, file.path()).unwrap();
        file
    }

    #[test]
    fn layout_shapes_match_schema() {
        assert_eq!(
            InputLayout::Features { dim: 4 }.shapes(1).unwrap(),
            vec![vec![1, 4]]
        );
        assert!(InputLayout::Features { dim: 4 }.shapes(2).is_err());
        assert_eq!(InputLayout::Agronomic.shapes(6).unwrap().len(), 6);
        assert!(InputLayout::Agronomic.shapes(1).is_err());
    }

    #[test]
    fn agronomic_model_runs_under_every_strategy() {
        let file = write_model(&builder::agronomic_yield_model());
        for strategy in LoadStrategy::ALL {
            let model = OnnxModel::load(file.path(), strategy, InputLayout::Agronomic)
                .unwrap_or_else(|e| panic!("{strategy:?} failed: {e}"));
            assert_eq!(model.input_names(), AGRONOMIC_FIELDS.to_vec());
            assert_eq!(model.output_names(), vec!["yield_prediction".to_string()]);

            let out = model.run(&AgronomicFeatures::example().to_inputs()).unwrap();
            assert_eq!(out.values.len(), 1);
            assert!(out.values[0] > 0.0 && out.values[0] <= 1.0);
        }
    }

    #[test]
    fn identity_model_echoes_features() {
        let file = write_model(&builder::identity_model(4));
        let model =
            OnnxModel::load(file.path(), LoadStrategy::Optimized, InputLayout::Features { dim: 4 })
                .unwrap();
        let input = NamedInput::new("input", vec![1, 4], vec![6.5, 0.0, 1.0, 2.0]);
        let out = model.run(&[input]).unwrap();
        assert_eq!(out.shape, vec![1, 4]);
        assert_eq!(out.values, vec![6.5, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn wrong_width_is_a_validation_error() {
        let file = write_model(&builder::identity_model(4));
        let model =
            OnnxModel::load(file.path(), LoadStrategy::Optimized, InputLayout::Features { dim: 4 })
                .unwrap();
        let input = NamedInput::new("input", vec![1, 3], vec![6.5, 0.0, 1.0]);
        let err = model.run(&[input]).unwrap_err();
        assert!(matches!(err, AgriError::Validation(_)));
    }

    #[test]
    fn unknown_input_name_is_rejected() {
        let file = write_model(&builder::identity_model(4));
        let model =
            OnnxModel::load(file.path(), LoadStrategy::Bare, InputLayout::Features { dim: 4 })
                .unwrap();
        let input = NamedInput::new("rainfall", vec![1, 1], vec![1.0]);
        assert!(model.run(&[input]).is_err());
    }

    #[test]
    fn missing_file_fails_to_load() {
        let err = OnnxModel::load(
            Path::new("/nonexistent/model.onnx"),
            LoadStrategy::Bare,
            InputLayout::Agronomic,
        )
        .unwrap_err();
        assert!(matches!(err, AgriError::Runtime(_)));
        assert!(err.to_string().starts_with("Model error: onnx load failed: "));
    }
}
