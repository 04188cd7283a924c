//! Structural validation of a decoded ONNX model.
//!
//! Checks that the graph is well formed: versions declared, every tensor
//! typed, payload sizes consistent with dims, nodes in topological order,
//! each value assigned once, and every graph output produced. Shapes are not
//! inferred and operator schemas are not consulted.

use std::collections::HashSet;

use crate::graph::proto::{
    attribute_type, data_type, type_proto, FunctionProto, GraphProto, ModelProto, TensorProto,
    TypeProto, ValueInfoProto,
};

/// Highest IR version accepted.
pub const MAX_IR_VERSION: i64 = 11;

/// Validate a model, returning every issue found.
pub fn check_model(model: &ModelProto) -> Result<(), Vec<String>> {
    let mut issues = Vec::new();

    if model.ir_version <= 0 {
        issues.push("model ir_version is not set".to_string());
    } else if model.ir_version > MAX_IR_VERSION {
        issues.push(format!(
            "model ir_version {} is newer than supported {}",
            model.ir_version, MAX_IR_VERSION
        ));
    }

    if model.opset_import.is_empty() {
        issues.push("model has no opset_import".to_string());
    } else if model.default_opset().is_none() {
        issues.push("model does not import the default operator set".to_string());
    }

    match &model.graph {
        Some(graph) => check_graph(graph, &HashSet::new(), &mut issues),
        None => issues.push("model has no graph".to_string()),
    }

    for function in &model.functions {
        check_function(function, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_graph(graph: &GraphProto, outer_scope: &HashSet<String>, issues: &mut Vec<String>) {
    let scope = if graph.name.is_empty() {
        issues.push("graph has no name".to_string());
        "<unnamed>".to_string()
    } else {
        graph.name.clone()
    };

    // Names visible to nodes, growing as nodes are visited in order.
    let mut defined: HashSet<String> = outer_scope.clone();
    let mut local: HashSet<String> = HashSet::new();

    for input in &graph.input {
        check_value_info(&scope, "input", input, issues);
        if !input.name.is_empty() && !local.insert(input.name.clone()) {
            issues.push(format!("{scope}: duplicate graph input '{}'", input.name));
        }
        defined.insert(input.name.clone());
    }

    for init in &graph.initializer {
        check_tensor(&scope, init, issues);
        // An initializer may also be listed as a graph input (default value).
        if !init.name.is_empty() && !local.insert(init.name.clone()) && !is_input(graph, &init.name)
        {
            issues.push(format!("{scope}: duplicate initializer '{}'", init.name));
        }
        defined.insert(init.name.clone());
    }

    for sparse in &graph.sparse_initializer {
        match (&sparse.values, &sparse.indices) {
            (Some(values), Some(indices)) => {
                check_tensor(&scope, values, issues);
                check_tensor(&scope, indices, issues);
                if !values.name.is_empty() && !local.insert(values.name.clone()) {
                    issues.push(format!(
                        "{scope}: duplicate sparse initializer '{}'",
                        values.name
                    ));
                }
                defined.insert(values.name.clone());
            }
            _ => issues.push(format!(
                "{scope}: sparse initializer is missing values or indices"
            )),
        }
    }

    for output in &graph.output {
        check_value_info(&scope, "output", output, issues);
    }

    for value in &graph.value_info {
        check_value_info(&scope, "value_info", value, issues);
    }

    for (ix, node) in graph.node.iter().enumerate() {
        let label = if node.name.is_empty() {
            format!("node #{ix}")
        } else {
            format!("node '{}'", node.name)
        };

        if node.op_type.is_empty() {
            issues.push(format!("{scope}: {label} has no op_type"));
        }

        for input in node.input.iter().filter(|i| !i.is_empty()) {
            if !defined.contains(input) {
                issues.push(format!(
                    "{scope}: {label} input '{input}' is not defined before use"
                ));
            }
        }

        for attr in &node.attribute {
            if attr.name.is_empty() {
                issues.push(format!("{scope}: {label} has an unnamed attribute"));
            }
            if let Some(t) = &attr.t {
                check_tensor(&scope, t, issues);
            }
            for t in &attr.tensors {
                check_tensor(&scope, t, issues);
            }
            // Subgraphs see everything defined so far in the enclosing graph.
            if attr.r#type == attribute_type::GRAPH {
                if let Some(g) = &attr.g {
                    check_graph(g, &defined, issues);
                }
            }
            if attr.r#type == attribute_type::GRAPHS {
                for g in &attr.graphs {
                    check_graph(g, &defined, issues);
                }
            }
        }

        for output in node.output.iter().filter(|o| !o.is_empty()) {
            if !local.insert(output.clone()) {
                issues.push(format!(
                    "{scope}: {label} output '{output}' is assigned more than once"
                ));
            }
            defined.insert(output.clone());
        }
    }

    for output in &graph.output {
        if !output.name.is_empty() && !defined.contains(&output.name) {
            issues.push(format!(
                "{scope}: graph output '{}' is never produced",
                output.name
            ));
        }
    }
}

/// Node ordering inside a model-local function body.
fn check_function(function: &FunctionProto, issues: &mut Vec<String>) {
    let scope = format!("function '{}'", function.name);
    if function.name.is_empty() {
        issues.push("model-local function has no name".to_string());
    }

    let mut defined: HashSet<String> = function.input.iter().cloned().collect();
    for (ix, node) in function.node.iter().enumerate() {
        if node.op_type.is_empty() {
            issues.push(format!("{scope}: node #{ix} has no op_type"));
        }
        for input in node.input.iter().filter(|i| !i.is_empty()) {
            if !defined.contains(input) {
                issues.push(format!(
                    "{scope}: node #{ix} input '{input}' is not defined before use"
                ));
            }
        }
        defined.extend(node.output.iter().filter(|o| !o.is_empty()).cloned());
    }

    for output in &function.output {
        if !defined.contains(output) {
            issues.push(format!("{scope}: output '{output}' is never produced"));
        }
    }
}

fn is_input(graph: &GraphProto, name: &str) -> bool {
    graph.input.iter().any(|i| i.name == name)
}

fn check_value_info(scope: &str, role: &str, value: &ValueInfoProto, issues: &mut Vec<String>) {
    if value.name.is_empty() {
        issues.push(format!("{scope}: {role} has no name"));
        return;
    }
    match &value.r#type {
        Some(ty) => check_type(scope, role, &value.name, ty, issues),
        // Intermediate annotations may omit the type.
        None if role == "value_info" => {}
        None => issues.push(format!("{scope}: {role} '{}' has no type", value.name)),
    }
}

fn check_type(scope: &str, role: &str, name: &str, ty: &TypeProto, issues: &mut Vec<String>) {
    match &ty.value {
        Some(type_proto::Value::TensorType(t)) => {
            if !is_known_type(t.elem_type) {
                issues.push(format!(
                    "{scope}: {role} '{name}' has invalid element type {}",
                    t.elem_type
                ));
            }
        }
        Some(type_proto::Value::SparseTensorType(t)) => {
            if !is_known_type(t.elem_type) {
                issues.push(format!(
                    "{scope}: {role} '{name}' has invalid sparse element type {}",
                    t.elem_type
                ));
            }
        }
        Some(type_proto::Value::SequenceType(s)) => match &s.elem_type {
            Some(inner) => check_type(scope, role, name, inner, issues),
            None => issues.push(format!("{scope}: {role} '{name}' sequence has no element type")),
        },
        Some(type_proto::Value::OptionalType(o)) => match &o.elem_type {
            Some(inner) => check_type(scope, role, name, inner, issues),
            None => issues.push(format!("{scope}: {role} '{name}' optional has no element type")),
        },
        Some(type_proto::Value::MapType(m)) => {
            if !is_known_type(m.key_type) {
                issues.push(format!("{scope}: {role} '{name}' map has invalid key type"));
            }
            match &m.value_type {
                Some(inner) => check_type(scope, role, name, inner, issues),
                None => issues.push(format!("{scope}: {role} '{name}' map has no value type")),
            }
        }
        None => issues.push(format!("{scope}: {role} '{name}' has an empty type")),
    }
}

fn is_known_type(dt: i32) -> bool {
    dt > data_type::UNDEFINED && dt <= data_type::MAX_KNOWN
}

fn check_tensor(scope: &str, tensor: &TensorProto, issues: &mut Vec<String>) {
    let name = if tensor.name.is_empty() {
        "<unnamed tensor>"
    } else {
        tensor.name.as_str()
    };

    if !is_known_type(tensor.data_type) {
        issues.push(format!(
            "{scope}: tensor '{name}' has invalid data type {}",
            tensor.data_type
        ));
        return;
    }

    let Some(count) = tensor.element_count() else {
        issues.push(format!("{scope}: tensor '{name}' has negative or overflowing dims"));
        return;
    };

    if tensor.is_external() {
        return;
    }

    let typed_len = typed_payload_len(tensor);
    if !tensor.raw_data.is_empty() {
        if typed_len > 0 {
            issues.push(format!(
                "{scope}: tensor '{name}' has both raw_data and typed data"
            ));
        }
        if let Some(size) = data_type::element_size(tensor.data_type) {
            if tensor.raw_data.len() != count * size {
                issues.push(format!(
                    "{scope}: tensor '{name}' raw_data is {} bytes, dims need {}",
                    tensor.raw_data.len(),
                    count * size
                ));
            }
        } else if tensor.data_type == data_type::STRING {
            issues.push(format!("{scope}: string tensor '{name}' cannot use raw_data"));
        }
        return;
    }

    // Complex types store two scalars per element.
    let expected = match tensor.data_type {
        data_type::COMPLEX64 | data_type::COMPLEX128 => count * 2,
        _ => count,
    };
    if typed_len != expected {
        issues.push(format!(
            "{scope}: tensor '{name}' holds {typed_len} {} values, dims need {expected}",
            data_type::name(tensor.data_type)
        ));
    }
}

/// Length of the typed field that `data_type` stores its values in.
fn typed_payload_len(tensor: &TensorProto) -> usize {
    match tensor.data_type {
        data_type::FLOAT | data_type::COMPLEX64 => tensor.float_data.len(),
        data_type::DOUBLE | data_type::COMPLEX128 => tensor.double_data.len(),
        data_type::INT64 => tensor.int64_data.len(),
        data_type::UINT32 | data_type::UINT64 => tensor.uint64_data.len(),
        data_type::STRING => tensor.string_data.len(),
        _ => tensor.int32_data.len(),
    }
}
