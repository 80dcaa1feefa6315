// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph loading and IR construction.

/// Errors that can occur when working with graph representations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The model manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestRead(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// An op references a value name that is not declared in the manifest.
    #[error("op '{op}' references unknown value '{value}'")]
    UnknownValue { op: String, value: String },

    /// Two values share the same name.
    #[error("duplicate value name: '{name}'")]
    DuplicateValue { name: String },

    /// An op type string is not recognised.
    #[error("op '{op}' has unrecognised type '{op_type}'")]
    UnknownOpType { op: String, op_type: String },

    /// A value kind or dtype string is not recognised.
    #[error("value '{value}' is invalid: {detail}")]
    InvalidValue { value: String, detail: String },

    /// A non-parameter, non-input value has no defining op.
    #[error("value '{value}' has no defining op")]
    MissingDefiner { value: String },

    /// A value is produced by more than one op.
    #[error("value '{value}' is defined by more than one op")]
    DuplicateDefiner { value: String },

    /// The operator graph contains a cycle.
    #[error("operator graph is cyclic (op '{op}' is on a cycle)")]
    CyclicGraph { op: String },

    /// The graph is structurally invalid for some other reason.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}
