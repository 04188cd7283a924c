//! Placeholder ONNX models for deployments without a usable artifact.

use std::path::Path;

use tracing::info;

use crate::domain::AGRONOMIC_FIELDS;
use crate::error::{AgriError, Result};
use crate::graph::checker::check_model;
use crate::graph::proto::{
    data_type, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    ValueInfoProto,
};

pub const IR_VERSION: i64 = 8;
pub const OPSET_VERSION: i64 = 17;

pub const AGRONOMIC_OUTPUT: &str = "yield_prediction";

/// Per-field weights of the agronomic placeholder, in field order.
pub const AGRONOMIC_WEIGHTS: [f32; 6] = [0.2, 0.25, 0.15, 0.2, 0.15, 0.05];

/// Short names used for the weight initializers and intermediate values.
const AGRONOMIC_SHORT: [&str; 6] = ["rainfall", "temp", "humidity", "ph", "fertilizer", "risk"];

fn wrap(graph: GraphProto, producer: &str) -> ModelProto {
    ModelProto {
        ir_version: IR_VERSION,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET_VERSION,
        }],
        producer_name: producer.to_string(),
        graph: Some(graph),
        ..Default::default()
    }
}

/// Weighted sum of the six agronomic inputs squashed through a sigmoid.
///
/// Every input and the output are `float[1, 1]`.
pub fn agronomic_yield_model() -> ModelProto {
    let mut nodes = Vec::new();
    let mut initializers = Vec::new();
    let mut scaled = Vec::new();

    for ((field, short), weight) in AGRONOMIC_FIELDS
        .iter()
        .zip(AGRONOMIC_SHORT)
        .zip(AGRONOMIC_WEIGHTS)
    {
        let weight_name = format!("{short}_weight");
        let scaled_name = format!("{short}_scaled");
        initializers.push(TensorProto::from_f32(&weight_name, &[1], &[weight]));
        nodes.push(NodeProto::new(
            "Mul",
            &format!("mul_{short}"),
            &[*field, weight_name.as_str()],
            &[scaled_name.as_str()],
        ));
        scaled.push(scaled_name);
    }

    // sum1 = s0 + s1, sum2 = sum1 + s2, ..., last add feeds the sigmoid.
    let mut acc = scaled[0].clone();
    for (ix, term) in scaled.iter().enumerate().skip(1) {
        let out = if ix == scaled.len() - 1 {
            "raw_prediction".to_string()
        } else {
            format!("sum{ix}")
        };
        nodes.push(NodeProto::new(
            "Add",
            &format!("add{ix}"),
            &[acc.as_str(), term.as_str()],
            &[out.as_str()],
        ));
        acc = out;
    }
    nodes.push(NodeProto::new(
        "Sigmoid",
        "sigmoid_output",
        &[acc.as_str()],
        &[AGRONOMIC_OUTPUT],
    ));

    let graph = GraphProto {
        name: "agricultural_yield_model".to_string(),
        node: nodes,
        initializer: initializers,
        input: AGRONOMIC_FIELDS
            .iter()
            .map(|f| ValueInfoProto::tensor(f, data_type::FLOAT, &[1, 1]))
            .collect(),
        output: vec![ValueInfoProto::tensor(
            AGRONOMIC_OUTPUT,
            data_type::FLOAT,
            &[1, 1],
        )],
        ..Default::default()
    };

    wrap(graph, "agricultural_yield_predictor")
}

/// `float[1, dim]` passed straight through an `Identity` node.
pub fn identity_model(dim: usize) -> ModelProto {
    let dims = [1, dim as i64];
    let graph = GraphProto {
        name: "simple_model".to_string(),
        node: vec![NodeProto::new("Identity", "identity_node", &["input"], &["output"])],
        input: vec![ValueInfoProto::tensor("input", data_type::FLOAT, &dims)],
        output: vec![ValueInfoProto::tensor("output", data_type::FLOAT, &dims)],
        ..Default::default()
    };
    wrap(graph, "simple_model")
}

pub fn load_model_file(path: &Path) -> Result<ModelProto> {
    let bytes = std::fs::read(path)?;
    ModelProto::decode_bytes(&bytes)
}

pub fn save_model(model: &ModelProto, path: &Path) -> Result<()> {
    std::fs::write(path, model.to_bytes())?;
    Ok(())
}

/// Validate `model` and write it to `path`.
pub fn write_checked(model: &ModelProto, path: &Path) -> Result<()> {
    check_model(model).map_err(AgriError::InvalidModel)?;
    save_model(model, path)?;
    info!(
        path = %path.display(),
        producer = %model.producer_name,
        "Placeholder model written"
    );
    Ok(())
}
