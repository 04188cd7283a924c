//! Model handles for the prediction service.
//!
//! A handle is either a tract session over the deployment's ONNX file or the
//! closed-form mock predictor, chosen once at startup by the loader.

pub mod backend;
pub mod loader;
pub mod mock;
pub mod onnx;

pub use backend::InferenceBackend;
pub use loader::{
    load_model, probe, verify_loadable, LoadOptions, LoadStrategy, ModelHandle, ProbeReport,
};
pub use mock::MockPredictor;
pub use onnx::{InputLayout, OnnxModel};
