// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor value definitions.
//!
//! A [`ValueDef`] describes one typed tensor flowing through the graph: its
//! kind, element type, shape, the op that defines it, and the ordered list of
//! ops that consume it. The scheduler's use-count bookkeeping is driven
//! entirely by `uses`, so the list holds **one entry per consuming input
//! occurrence** — an op that reads the same value twice appears twice.

use crate::op::OpId;
use tensor_core::{DType, Shape};

/// Index of a value in [`crate::Graph::values`]. Stable for the lifetime of
/// the graph.
pub type ValueId = usize;

/// What role a value plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A weight or other constant. Resident for the whole run; excluded from
    /// live-memory accounting.
    Param,
    /// A graph input, live from the start of the schedule.
    Input,
    /// A transient value produced and consumed inside the graph.
    Intermediate,
    /// A graph output, live until the end of the schedule.
    Output,
}

impl ValueKind {
    /// Parses a kind from a manifest string.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "param" | "parameter" | "weight" | "const" | "constant" => Some(Self::Param),
            "input" | "in" => Some(Self::Input),
            "intermediate" | "temp" | "activation" => Some(Self::Intermediate),
            "output" | "out" => Some(Self::Output),
            _ => None,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Param => "param",
            Self::Input => "input",
            Self::Intermediate => "intermediate",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed tensor value in the graph.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValueDef {
    /// Unique name (e.g. `"conv1_out"`).
    pub name: String,
    /// Role of this value.
    pub kind: ValueKind,
    /// Element type.
    pub dtype: DType,
    /// Dimensions.
    pub shape: Shape,
    /// The op producing this value. `None` for parameters and graph inputs;
    /// filled in by [`crate::Graph::validate`].
    pub def: Option<OpId>,
    /// Consuming ops, one entry per input occurrence, in execution order.
    /// Filled in by [`crate::Graph::validate`].
    pub uses: Vec<OpId>,
}

impl ValueDef {
    /// The storage footprint of this value in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.shape.size_bytes(self.dtype)
    }

    /// `true` for weights/constants, which are excluded from live-memory
    /// accounting.
    pub fn is_param(&self) -> bool {
        self.kind == ValueKind::Param
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "{} ({}, {} {}, {} B, {} uses)",
            self.name,
            self.kind,
            self.dtype,
            self.shape,
            self.size_bytes(),
            self.uses.len(),
        )
    }
}
