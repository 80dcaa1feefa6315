// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the hierarchical scheduler.

/// Errors that can occur during scheduling.
///
/// All of these indicate a defect in the input graph or in the hierarchy
/// build — there are no retriable conditions. Partial schedules are
/// discarded when an error surfaces.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// The graph contains no schedulable ops.
    #[error("cannot schedule an empty graph")]
    EmptyGraph,

    /// The dynamic program finished without covering every vertex, which
    /// means the dependency structure handed to it was inconsistent.
    #[error("schedule covers {scheduled} of {total} ops — dependency structure is inconsistent")]
    IncompleteSchedule { scheduled: usize, total: usize },

    /// A hierarchical vertex in an impossible state reached per-vertex
    /// scheduling (e.g. a dissolved group still linked from the top level).
    #[error("broken hierarchy: {0}")]
    BrokenHierarchy(String),
}
