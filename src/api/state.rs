use crate::domain::{ModelKind, RequestSchema};
use crate::ml::ModelHandle;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Model loaded at startup; `None` when loading failed without fallback
    pub model: Option<ModelHandle>,

    /// Request contract accepted by `/predict`
    pub schema: RequestSchema,
}

impl AppState {
    pub fn new(model: Option<ModelHandle>, schema: RequestSchema) -> Self {
        Self { model, schema }
    }

    pub fn model_kind(&self) -> Option<ModelKind> {
        self.model.as_ref().map(|m| m.kind())
    }
}
