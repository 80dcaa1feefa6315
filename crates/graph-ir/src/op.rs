// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator definitions and per-type semantics.
//!
//! Each [`OpDef`] is one node of the computation graph. The only behavioral
//! question the scheduler ever asks of an operator is whether its output may
//! **overlap** (alias) one of its inputs for in-place execution; that query
//! is answered by [`OpSemantics`], dispatched per [`OpKind`].

use crate::value::{ValueDef, ValueId};

/// Index of an op in [`crate::Graph::ops`]. Stable for the lifetime of the
/// graph and used as the scheduler's op identity.
pub type OpId = usize;

/// The kind of computation an operator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// 2-D convolution (and depthwise variants).
    Conv,
    /// Matrix multiply / fully-connected projection.
    MatMul,
    /// Elementwise addition.
    Add,
    /// Elementwise multiplication.
    Mul,
    /// Rectified linear unit.
    Relu,
    /// Logistic sigmoid.
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
    /// Value clamping (e.g. ReLU6).
    Clip,
    /// Softmax along an axis.
    Softmax,
    /// Max/average pooling.
    Pool,
    /// Inference-mode batch normalization.
    BatchNorm,
    /// Shape change without data movement.
    Reshape,
    /// Axis permutation.
    Transpose,
    /// Concatenation along an axis.
    Concat,
    /// Axis-range extraction.
    Slice,
    /// Index lookup.
    Gather,
    /// Constant padding.
    Pad,
    /// Axis reduction (sum/mean/max).
    Reduce,
}

impl OpKind {
    /// Parses an op type from a manifest string.
    ///
    /// Accepts snake_case (`"mat_mul"`), ONNX-style CamelCase (`"MatMul"`),
    /// and common aliases (`"gemm"`, `"maxpool"`, `"relu6"`).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "").as_str() {
            "conv" | "conv2d" | "convolution" | "depthwiseconv" => Some(Self::Conv),
            "matmul" | "gemm" | "linear" | "fullyconnected" | "fc" => Some(Self::MatMul),
            "add" | "sum2" => Some(Self::Add),
            "mul" | "multiply" => Some(Self::Mul),
            "relu" => Some(Self::Relu),
            "sigmoid" | "logistic" => Some(Self::Sigmoid),
            "tanh" => Some(Self::Tanh),
            "clip" | "relu6" | "clamp" => Some(Self::Clip),
            "softmax" => Some(Self::Softmax),
            "pool" | "maxpool" | "averagepool" | "avgpool" | "globalaveragepool" => {
                Some(Self::Pool)
            }
            "batchnorm" | "batchnormalization" | "bn" => Some(Self::BatchNorm),
            "reshape" | "flatten" | "squeeze" | "unsqueeze" => Some(Self::Reshape),
            "transpose" | "permute" => Some(Self::Transpose),
            "concat" | "concatenate" => Some(Self::Concat),
            "slice" | "split" => Some(Self::Slice),
            "gather" | "embedding" => Some(Self::Gather),
            "pad" => Some(Self::Pad),
            "reduce" | "reducesum" | "reducemean" | "reducemax" => Some(Self::Reduce),
            _ => None,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::MatMul => "mat_mul",
            Self::Add => "add",
            Self::Mul => "mul",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Clip => "clip",
            Self::Softmax => "softmax",
            Self::Pool => "pool",
            Self::BatchNorm => "batch_norm",
            Self::Reshape => "reshape",
            Self::Transpose => "transpose",
            Self::Concat => "concat",
            Self::Slice => "slice",
            Self::Gather => "gather",
            Self::Pad => "pad",
            Self::Reduce => "reduce",
        }
    }

    /// Returns the semantics implementation for this op kind.
    pub fn semantics(self) -> &'static dyn OpSemantics {
        match self {
            Self::Relu
            | Self::Sigmoid
            | Self::Tanh
            | Self::Clip
            | Self::Softmax
            | Self::Add
            | Self::Mul
            | Self::BatchNorm => &InPlaceEltwise,
            Self::Reshape => &ViewLike,
            _ => &NoOverlap,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-op-kind behavioral queries.
///
/// Implementations must be pure: the answer depends only on the op and the
/// value table, never on scheduler state. New kinds plug in by adding an
/// implementation and a dispatch arm, without touching the scheduler.
pub trait OpSemantics: Send + Sync {
    /// Returns the input position whose buffer the (sole) output may alias
    /// for in-place execution, or `None` if the op cannot run in place.
    ///
    /// Aliasing is *admissible* only when that input dies at this op; that
    /// liveness check is the scheduler's job, not this one's.
    fn overlap_input(&self, op: &OpDef, values: &[ValueDef]) -> Option<usize>;
}

/// Elementwise ops: the output may reuse input 0's storage when the byte
/// sizes agree (a broadcast operand cannot be written in place).
struct InPlaceEltwise;

impl OpSemantics for InPlaceEltwise {
    fn overlap_input(&self, op: &OpDef, values: &[ValueDef]) -> Option<usize> {
        let (first_in, first_out) = (*op.inputs.first()?, *op.outputs.first()?);
        if op.outputs.len() == 1
            && values[first_in].size_bytes() == values[first_out].size_bytes()
        {
            Some(0)
        } else {
            None
        }
    }
}

/// Metadata-only ops: the output is a reinterpretation of input 0.
struct ViewLike;

impl OpSemantics for ViewLike {
    fn overlap_input(&self, op: &OpDef, _values: &[ValueDef]) -> Option<usize> {
        if op.inputs.is_empty() || op.outputs.len() != 1 {
            None
        } else {
            Some(0)
        }
    }
}

/// Ops whose output must live in fresh storage.
struct NoOverlap;

impl OpSemantics for NoOverlap {
    fn overlap_input(&self, _op: &OpDef, _values: &[ValueDef]) -> Option<usize> {
        None
    }
}

/// A single operator node in the graph.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpDef {
    /// Unique name (e.g. `"conv1"`).
    pub name: String,
    /// The kind of computation.
    pub kind: OpKind,
    /// Index in [`crate::Graph::ops`]; equals this op's [`OpId`].
    pub index: OpId,
    /// Consumed values, in positional order. A value may appear more than
    /// once.
    pub inputs: Vec<ValueId>,
    /// Produced values, in positional order.
    pub outputs: Vec<ValueId>,
    /// Ops that define any of this op's non-parameter inputs. Deduplicated,
    /// sorted; derived by [`crate::Graph::validate`].
    pub preds: Vec<OpId>,
    /// Ops that consume any of this op's outputs. Deduplicated, sorted;
    /// derived by [`crate::Graph::validate`].
    pub succs: Vec<OpId>,
}

impl OpDef {
    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} ({}) — {} in, {} out",
            self.index,
            self.name,
            self.kind,
            self.inputs.len(),
            self.outputs.len(),
        )
    }
}
