//! Core value types shared by the model handles and the HTTP layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AgriError, Result};

/// Request contract served by one deployment.
///
/// The two schemas belong to different model versions and are never mixed:
/// `features` feeds a single `[1, k]` tensor, `agronomic` feeds six named
/// `[1, 1]` tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RequestSchema {
    Features,
    Agronomic,
}

impl RequestSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Features => "features",
            Self::Agronomic => "agronomic",
        }
    }
}

impl fmt::Display for RequestSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of model sits behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Onnx,
    Mock,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Mock => "mock",
        }
    }
}

/// Input names of the agronomic model, in declaration order.
pub const AGRONOMIC_FIELDS: [&str; 6] = [
    "rainfall",
    "temperature",
    "humidity",
    "soil_ph",
    "fertilizer_usage",
    "risk_score",
];

/// Six named agronomic measurements for one field plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgronomicFeatures {
    pub rainfall: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_ph: f64,
    pub fertilizer_usage: f64,
    pub risk_score: f64,
}

impl AgronomicFeatures {
    /// Example record used by documentation and the load probe.
    pub fn example() -> Self {
        Self {
            rainfall: 100.0,
            temperature: 25.0,
            humidity: 70.0,
            soil_ph: 6.5,
            fertilizer_usage: 50.0,
            risk_score: 0.3,
        }
    }

    /// One `[1, 1]` input per field, named after the field.
    pub fn to_inputs(&self) -> Vec<NamedInput> {
        let values = [
            self.rainfall,
            self.temperature,
            self.humidity,
            self.soil_ph,
            self.fertilizer_usage,
            self.risk_score,
        ];
        AGRONOMIC_FIELDS
            .iter()
            .zip(values)
            .map(|(name, v)| NamedInput::new(*name, vec![1, 1], vec![v as f32]))
            .collect()
    }
}

/// Generic encoded feature list (soil pH, crop code, season code, region code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureList {
    pub features: Vec<f64>,
}

impl FeatureList {
    /// Shape the list as a single `[1, k]` tensor bound to `input_name`.
    pub fn to_input(&self, input_name: &str) -> Result<NamedInput> {
        if self.features.is_empty() {
            return Err(AgriError::Validation(
                "features must not be empty".to_string(),
            ));
        }
        let values: Vec<f32> = self.features.iter().map(|v| *v as f32).collect();
        Ok(NamedInput::new(input_name, vec![1, values.len()], values))
    }
}

/// A named input tensor handed to a model handle.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedInput {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NamedInput {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            values,
        }
    }
}

/// First output tensor of a model run.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Render as a list of rows, the shape of every `/predict` response.
    ///
    /// Served models emit `[1, 1]` or `[1, k]`, which map directly. Other
    /// ranks are reshaped rather than preserved: rank 0 and rank 1 become a
    /// single row (`[3]` renders as `[[a, b, c]]`), and rank 3 or higher keeps
    /// the leading dimension and flattens the rest into each row.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        let rows = match self.shape.len() {
            0 | 1 => 1,
            _ => self.shape[0],
        };
        if rows == 0 || self.values.is_empty() {
            return Vec::new();
        }
        let width = (self.values.len() / rows).max(1);
        self.values.chunks(width).map(|c| c.to_vec()).collect()
    }
}
