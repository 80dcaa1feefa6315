// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph manifest parsing.
//!
//! The manifest describes a computation graph as flat value and op lists.
//! Weight data never appears — the scheduler only needs shapes and dtypes to
//! compute byte sizes.
//!
//! # Format
//! ```json
//! {
//!   "name": "mobilenet_v2",
//!   "values": [
//!     { "name": "input", "kind": "input", "dtype": "f32", "shape": [1, 3, 224, 224] },
//!     { "name": "conv1_w", "kind": "param", "shape": [32, 3, 3, 3] },
//!     { "name": "conv1_out", "kind": "intermediate", "shape": [1, 32, 112, 112] },
//!     ...
//!   ],
//!   "ops": [
//!     { "name": "conv1", "op_type": "conv", "inputs": ["input", "conv1_w"], "outputs": ["conv1_out"] },
//!     ...
//!   ]
//! }
//! ```

use crate::{GraphError, OpKind, ValueKind};
use std::path::Path;
use tensor_core::DType;

/// Top-level graph manifest, deserialized from a model JSON file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphManifest {
    /// Human-readable model name (e.g. `"mobilenet_v2"`).
    pub name: String,
    /// All tensor values in the graph.
    pub values: Vec<ManifestValue>,
    /// All operators, in a construction order consistent with execution.
    pub ops: Vec<ManifestOp>,
}

/// A single value entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestValue {
    /// Unique value name.
    pub name: String,
    /// Kind string (`"param"`, `"input"`, `"intermediate"`, `"output"`).
    pub kind: String,
    /// Dtype string (e.g. `"f32"`); defaults to `"f32"`.
    #[serde(default = "default_dtype")]
    pub dtype: String,
    /// Dimensions.
    pub shape: Vec<u64>,
}

fn default_dtype() -> String {
    "f32".to_string()
}

/// A single op entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestOp {
    /// Unique op name.
    pub name: String,
    /// Op type string (e.g. `"conv"`, `"mat_mul"`, `"relu"`).
    pub op_type: String,
    /// Consumed value names, in positional order.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Produced value names, in positional order.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl GraphManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// # Checks
    /// - At least one op is defined.
    /// - All kind, dtype, and op-type strings are recognised.
    /// - No duplicate value or op names.
    /// - Every value name referenced by an op is declared.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.ops.is_empty() {
            return Err(GraphError::InvalidGraph("manifest contains no ops".into()));
        }

        let mut value_names = std::collections::HashSet::new();
        for val in &self.values {
            if !value_names.insert(val.name.as_str()) {
                return Err(GraphError::DuplicateValue {
                    name: val.name.clone(),
                });
            }
            if ValueKind::from_str_loose(&val.kind).is_none() {
                return Err(GraphError::InvalidValue {
                    value: val.name.clone(),
                    detail: format!("unrecognised kind '{}'", val.kind),
                });
            }
            if DType::from_str_loose(&val.dtype).is_none() {
                return Err(GraphError::InvalidValue {
                    value: val.name.clone(),
                    detail: format!("unsupported dtype '{}'", val.dtype),
                });
            }
        }

        let mut op_names = std::collections::HashSet::new();
        for op in &self.ops {
            if !op_names.insert(op.name.as_str()) {
                return Err(GraphError::InvalidGraph(format!(
                    "duplicate op name '{}'",
                    op.name,
                )));
            }
            if OpKind::from_str_loose(&op.op_type).is_none() {
                return Err(GraphError::UnknownOpType {
                    op: op.name.clone(),
                    op_type: op.op_type.clone(),
                });
            }
            for v in op.inputs.iter().chain(op.outputs.iter()) {
                if !value_names.contains(v.as_str()) {
                    return Err(GraphError::UnknownValue {
                        op: op.name.clone(),
                        value: v.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
