//! ONNX model files: wire schema, validation, repair and placeholders.

pub mod builder;
pub mod checker;
pub mod proto;
pub mod repair;

pub use builder::{agronomic_yield_model, identity_model, load_model_file, save_model, write_checked};
pub use checker::check_model;
pub use proto::ModelProto;
pub use repair::{repair_file, RepairOutcome, RepairReport};
