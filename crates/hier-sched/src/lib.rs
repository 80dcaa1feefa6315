// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # hier-sched
//!
//! A hierarchical, memory-aware operator scheduler for inference graphs:
//! given a validated [`graph_ir::Graph`], it computes a topological op
//! order whose peak live tensor memory is as small as the solver can reach.
//!
//! # Pipeline
//!
//! ```text
//! Graph<Validated>
//!       │  HierGraph::build        (join sequences, make groups)
//!       ▼
//! HierGraph ──► HierScheduler ──► op order ──► Lifetime (peak residents)
//!       ▲                                            │
//!       └──────────── ungroup refinement ◄───────────┘
//! ```
//!
//! - [`MemStateVec`] — the live-memory trajectory of a partial schedule.
//! - [`HierGraph`] / [`Sequence`] / [`Group`] — the two-level graph.
//! - [`HierScheduler`] — one DP scheduling pass; [`GroupContext`] keys the
//!   cross-iteration group memo.
//! - [`Lifetime`] — per-value birth/death analysis of a finished order.
//! - [`hierarchical_schedule`] — the full loop; the one call most users
//!   need.
//! - [`reverse_post_order`] / [`random_sample`] — non-memory-aware
//!   baselines for comparison.
//!
//! # Example
//! ```no_run
//! use graph_ir::GraphLoader;
//! use std::path::Path;
//!
//! let graph = GraphLoader::load(Path::new("./model.json")).unwrap();
//! let order = hier_sched::hierarchical_schedule(&graph).unwrap();
//! let peak = hier_sched::estimate_peak(&order, &graph);
//! println!("peak: {} KiB", peak / 1024);
//! ```

mod baseline;
mod build;
mod error;
pub mod hier;
pub mod lifetime;
mod mem_state;
mod refine;
pub mod schedule;

pub use baseline::{random_sample, reverse_post_order};
pub use error::SchedError;
pub use hier::{Group, HierGraph, HierVert, Sequence, VertId};
pub use lifetime::{estimate_peak, Lifetime};
pub use mem_state::MemStateVec;
pub use refine::hierarchical_schedule;
pub use schedule::{GroupContext, HierScheduler, SchedResult, UseCnt};
