//! Rewrite double-precision tensors in an ONNX model to single precision.
//!
//! Covers initializers, declared input/output/value_info element types,
//! tensor-valued node attributes, `Cast` nodes targeting double, and float
//! array attributes holding values outside the `f32` range. Subgraphs are
//! rewritten recursively. The input file is never modified.

use std::path::Path;

use tracing::{error, info, warn};

use crate::error::{RepairError, Result};
use crate::graph::builder::{load_model_file, save_model};
use crate::graph::checker::check_model;
use crate::graph::proto::{
    attribute_type, data_type, type_proto, GraphProto, ModelProto, NodeProto, SparseTensorProto,
    TensorProto, TypeProto, ValueInfoProto,
};

/// Changes made by one repair pass, by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub initializers: usize,
    pub value_types: usize,
    pub attribute_tensors: usize,
    pub float_attributes: usize,
    pub cast_targets: usize,
}

impl RepairReport {
    pub fn total(&self) -> usize {
        self.initializers
            + self.value_types
            + self.attribute_tensors
            + self.float_attributes
            + self.cast_targets
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// Nothing to convert; no file was written.
    NoChanges,
    /// The rewritten model was written to the output path.
    Repaired {
        report: RepairReport,
        /// Structural validation issues of the written model (empty = valid).
        issues: Vec<String>,
    },
}

impl RepairOutcome {
    /// Changes were made and the written model validated.
    pub fn success(&self) -> bool {
        matches!(self, Self::Repaired { issues, .. } if issues.is_empty())
    }
}

/// Repair `input` into `output`, validating the written model.
pub fn repair_file(input: &Path, output: &Path) -> Result<RepairOutcome> {
    if same_file(input, output) {
        return Err(RepairError::OverwriteInput {
            path: input.display().to_string(),
        }
        .into());
    }

    info!(path = %input.display(), "Loading model");
    let mut model = load_model_file(input)?;
    info!(
        ir_version = model.ir_version,
        opset = ?model.default_opset(),
        "Analyzing model"
    );

    let report = convert_model(&mut model)?;
    if report.total() == 0 {
        info!("No double tensors found to convert");
        return Ok(RepairOutcome::NoChanges);
    }

    info!(changes = report.total(), ?report, "Converted double to float");
    info!(path = %output.display(), "Saving fixed model");
    save_model(&model, output)?;

    let issues = match check_model(&model) {
        Ok(()) => {
            info!("Fixed model is valid");
            Vec::new()
        }
        Err(issues) => {
            for issue in &issues {
                error!(%issue, "Fixed model validation failed");
            }
            issues
        }
    };

    Ok(RepairOutcome::Repaired { report, issues })
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Rewrite every double-precision element of `model` in place.
pub fn convert_model(model: &mut ModelProto) -> std::result::Result<RepairReport, RepairError> {
    let mut report = RepairReport::default();
    if let Some(graph) = model.graph.as_mut() {
        convert_graph(graph, &mut report)?;
    }

    for function in &mut model.functions {
        for value in &mut function.value_info {
            if narrow_value_info(value) {
                info!(function = %function.name, name = %value.name, "Converting declared type from double to float");
                report.value_types += 1;
            }
        }
        for node in &mut function.node {
            convert_node(node, &mut report)?;
        }
    }

    for training in &mut model.training_info {
        for graph in [training.initialization.as_mut(), training.algorithm.as_mut()]
            .into_iter()
            .flatten()
        {
            convert_graph(graph, &mut report)?;
        }
    }
    Ok(report)
}

fn convert_graph(
    graph: &mut GraphProto,
    report: &mut RepairReport,
) -> std::result::Result<(), RepairError> {
    for init in &mut graph.initializer {
        if narrow_tensor(init)? {
            info!(initializer = %init.name, "Converting initializer from double to float");
            report.initializers += 1;
        }
    }
    for sparse in &mut graph.sparse_initializer {
        if narrow_sparse(sparse)? {
            report.initializers += 1;
        }
    }

    for (role, values) in [
        ("input", &mut graph.input),
        ("output", &mut graph.output),
        ("value", &mut graph.value_info),
    ] {
        for value in values.iter_mut() {
            if narrow_value_info(value) {
                info!(role, name = %value.name, "Converting declared type from double to float");
                report.value_types += 1;
            }
        }
    }

    for node in &mut graph.node {
        convert_node(node, report)?;
    }
    Ok(())
}

fn convert_node(
    node: &mut NodeProto,
    report: &mut RepairReport,
) -> std::result::Result<(), RepairError> {
    let is_cast = node.op_type == "Cast" && node.domain.is_empty();

    for attr in &mut node.attribute {
        if let Some(t) = attr.t.as_mut() {
            if narrow_tensor(t)? {
                info!(node = %node.name, attribute = %attr.name, "Converting attribute tensor to float");
                report.attribute_tensors += 1;
            }
        }
        for t in &mut attr.tensors {
            if narrow_tensor(t)? {
                info!(node = %node.name, attribute = %attr.name, "Converting attribute tensor to float");
                report.attribute_tensors += 1;
            }
        }
        for sparse in attr.sparse_tensor.iter_mut().chain(attr.sparse_tensors.iter_mut()) {
            if narrow_sparse(sparse)? {
                report.attribute_tensors += 1;
            }
        }

        if attr.r#type == attribute_type::FLOATS && saturate(&mut attr.floats) {
            warn!(node = %node.name, attribute = %attr.name, "Saturated out-of-range float values");
            report.float_attributes += 1;
        }

        if is_cast && attr.name == "to" && attr.i == i64::from(data_type::DOUBLE) {
            info!(node = %node.name, "Retargeting Cast from double to float");
            attr.i = i64::from(data_type::FLOAT);
            report.cast_targets += 1;
        }

        if let Some(g) = attr.g.as_mut() {
            convert_graph(g, report)?;
        }
        for g in &mut attr.graphs {
            convert_graph(g, report)?;
        }
    }
    Ok(())
}

/// Narrow a double tensor to float, re-emitting the payload as raw bytes.
fn narrow_tensor(tensor: &mut TensorProto) -> std::result::Result<bool, RepairError> {
    if tensor.data_type != data_type::DOUBLE {
        return Ok(false);
    }
    if tensor.is_external() {
        return Err(RepairError::ExternalData {
            name: tensor.name.clone(),
        });
    }

    let doubles: Vec<f64> = if !tensor.double_data.is_empty() {
        std::mem::take(&mut tensor.double_data)
    } else {
        if tensor.raw_data.len() % 8 != 0 {
            return Err(RepairError::MisalignedPayload {
                name: tensor.name.clone(),
                len: tensor.raw_data.len(),
            });
        }
        tensor
            .raw_data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect()
    };

    tensor.data_type = data_type::FLOAT;
    tensor.float_data.clear();
    tensor.raw_data = doubles
        .iter()
        .flat_map(|v| narrow(*v).to_le_bytes())
        .collect();
    Ok(true)
}

/// Narrow the values of a sparse tensor; indices are integers and stay as is.
fn narrow_sparse(sparse: &mut SparseTensorProto) -> std::result::Result<bool, RepairError> {
    match sparse.values.as_mut() {
        Some(values) => {
            let changed = narrow_tensor(values)?;
            if changed {
                info!(tensor = %values.name, "Converting sparse tensor values from double to float");
            }
            Ok(changed)
        }
        None => Ok(false),
    }
}

/// Finite doubles beyond the `f32` range saturate instead of becoming infinite.
fn narrow(v: f64) -> f32 {
    if v.is_finite() {
        v.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32
    } else {
        v as f32
    }
}

fn narrow_value_info(value: &mut ValueInfoProto) -> bool {
    value.r#type.as_mut().is_some_and(narrow_type)
}

fn narrow_type(ty: &mut TypeProto) -> bool {
    match ty.value.as_mut() {
        Some(type_proto::Value::TensorType(t)) if t.elem_type == data_type::DOUBLE => {
            t.elem_type = data_type::FLOAT;
            true
        }
        Some(type_proto::Value::SparseTensorType(t)) if t.elem_type == data_type::DOUBLE => {
            t.elem_type = data_type::FLOAT;
            true
        }
        Some(type_proto::Value::TensorType(_))
        | Some(type_proto::Value::SparseTensorType(_))
        | None => false,
        Some(type_proto::Value::SequenceType(s)) => {
            s.elem_type.as_deref_mut().is_some_and(narrow_type)
        }
        Some(type_proto::Value::OptionalType(o)) => {
            o.elem_type.as_deref_mut().is_some_and(narrow_type)
        }
        Some(type_proto::Value::MapType(m)) => {
            m.value_type.as_deref_mut().is_some_and(narrow_type)
        }
    }
}

/// Replace infinities (the result of narrowing an out-of-range double) with
/// the nearest finite `f32`.
///
/// FLOATS values are already single precision on the wire, so infinities are
/// the only values counted as a change. Finite values, integral or not, are
/// left alone and do not count.
fn saturate(values: &mut [f32]) -> bool {
    let mut changed = false;
    for v in values.iter_mut().filter(|v| v.is_infinite()) {
        *v = if v.is_sign_positive() { f32::MAX } else { f32::MIN };
        changed = true;
    }
    changed
}
