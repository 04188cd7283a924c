//! The seam between the HTTP layer and whatever model is loaded.

use crate::domain::{ModelKind, NamedInput, OutputTensor};
use crate::error::Result;

/// A loaded model handle: a tract session or the mock predictor.
///
/// Handles are built once at startup and shared read-only across requests,
/// so `run` takes `&self`.
#[cfg_attr(test, mockall::automock)]
pub trait InferenceBackend: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Declared input names, in the order the model binds them.
    fn input_names(&self) -> Vec<String>;

    fn output_names(&self) -> Vec<String>;

    /// Run one inference and return the first output tensor.
    fn run(&self, inputs: &[NamedInput]) -> Result<OutputTensor>;
}
