// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph loading from a JSON manifest.
//!
//! The loader turns a [`GraphManifest`] into a validated [`Graph`]: it
//! resolves value names to ids, parses kind/dtype/op-type strings, and runs
//! the full structural validation of [`Graph::validate`].

use crate::graph::Validated;
use crate::{Graph, GraphBuilder, GraphError, GraphManifest, OpKind, ValueId, ValueKind};
use std::path::Path;
use tensor_core::{DType, Shape};

/// Loads a model from disk into a validated [`Graph`].
///
/// # Example
/// ```no_run
/// use graph_ir::GraphLoader;
/// use std::path::Path;
///
/// let graph = GraphLoader::load(Path::new("./models/mobilenet_v2.json")).unwrap();
/// println!("Loaded {} ops", graph.num_ops());
/// ```
pub struct GraphLoader;

impl GraphLoader {
    /// Loads and validates a model from the given JSON file.
    ///
    /// Steps:
    /// 1. Parse the manifest and validate it.
    /// 2. Resolve names and build the op/value arena.
    /// 3. Run the structural validation (`Loaded` → `Validated`).
    pub fn load(path: &Path) -> Result<Graph<Validated>, GraphError> {
        let manifest = GraphManifest::from_file(path)?;
        Self::from_manifest(&manifest)
    }

    /// Builds a validated graph from an in-memory manifest.
    pub fn from_manifest(manifest: &GraphManifest) -> Result<Graph<Validated>, GraphError> {
        manifest.validate()?;

        let mut builder = GraphBuilder::new(&manifest.name);

        for val in &manifest.values {
            // validate() above guarantees these strings parse.
            let kind = ValueKind::from_str_loose(&val.kind).ok_or_else(|| {
                GraphError::InvalidValue {
                    value: val.name.clone(),
                    detail: format!("unrecognised kind '{}'", val.kind),
                }
            })?;
            let dtype = DType::from_str_loose(&val.dtype).ok_or_else(|| {
                GraphError::InvalidValue {
                    value: val.name.clone(),
                    detail: format!("unsupported dtype '{}'", val.dtype),
                }
            })?;
            builder.value(&val.name, kind, dtype, Shape::new(val.shape.clone()))?;
        }

        for op in &manifest.ops {
            let kind = OpKind::from_str_loose(&op.op_type).ok_or_else(|| {
                GraphError::UnknownOpType {
                    op: op.name.clone(),
                    op_type: op.op_type.clone(),
                }
            })?;
            let resolve = |names: &[String]| -> Result<Vec<ValueId>, GraphError> {
                names
                    .iter()
                    .map(|n| {
                        builder.lookup(n).ok_or_else(|| GraphError::UnknownValue {
                            op: op.name.clone(),
                            value: n.clone(),
                        })
                    })
                    .collect()
            };
            let inputs = resolve(&op.inputs)?;
            let outputs = resolve(&op.outputs)?;
            builder.op(&op.name, kind, &inputs, &outputs);
        }

        let graph = builder.build()?;
        tracing::debug!("loaded {}", graph.summary());
        Ok(graph)
    }
}
