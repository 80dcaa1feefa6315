// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! A lightweight intermediate representation (IR) for inference computation
//! graphs. Rather than depending on a full ONNX toolchain, this crate defines
//! the minimal IR the memory-aware scheduler needs:
//!
//! - [`ValueDef`] / [`ValueKind`] — a typed tensor value with its definer and
//!   its ordered use list.
//! - [`OpDef`] / [`OpKind`] — an operator node with input/output values and
//!   derived predecessor/successor links.
//! - [`Graph`] — the full model as a DAG of operators, with a **type-state
//!   pattern** (`Loaded` → `Validated`) so the scheduler can only ever
//!   receive a graph whose def/use structure has been checked.
//! - [`GraphBuilder`] — programmatic construction (used by the loader and
//!   by tests).
//! - [`GraphLoader`] / [`GraphManifest`] — loads graphs from a JSON model
//!   description.
//! - [`dot`] — Graphviz DOT export of a (scheduled) graph.
//!
//! # Supported Model Format
//! A model is a single JSON file listing values (name, kind, dtype, shape)
//! and ops (name, type, input/output value names). See [`GraphManifest`].
//!
//! # Example
//! ```no_run
//! use graph_ir::GraphLoader;
//! use std::path::Path;
//!
//! let graph = GraphLoader::load(Path::new("./models/mobilenet_v2.json")).unwrap();
//! println!("{}", graph.summary());
//! ```

pub mod dot;
mod error;
pub mod graph;
mod loader;
pub(crate) mod manifest;
mod op;
mod value;

pub use error::GraphError;
pub use graph::{Graph, GraphBuilder};
pub use loader::GraphLoader;
pub use manifest::{GraphManifest, ManifestOp, ManifestValue};
pub use op::{OpDef, OpId, OpKind, OpSemantics};
pub use value::{ValueDef, ValueId, ValueKind};
