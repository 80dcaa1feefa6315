// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Baseline schedulers, for comparison and benchmarking.
//!
//! Neither is memory-aware: [`reverse_post_order`] is the deterministic
//! order a compiler would emit anyway, and [`random_sample`] draws a
//! uniformly random topological order from an explicit, caller-seeded RNG
//! so benchmark runs are reproducible.

use graph_ir::{graph::Validated, Graph, OpId};
use rand::Rng;

/// The graph's deterministic reverse post-order (a valid topological
/// order).
pub fn reverse_post_order(graph: &Graph<Validated>) -> Vec<OpId> {
    graph.reverse_post_order()
}

/// A random topological order: repeatedly picks a uniformly random ready
/// op. Takes the RNG explicitly so callers control the seed.
pub fn random_sample<R: Rng>(graph: &Graph<Validated>, rng: &mut R) -> Vec<OpId> {
    let mut pending: Vec<usize> = graph.ops.iter().map(|op| op.preds.len()).collect();
    let mut ready: Vec<OpId> = (0..graph.num_ops()).filter(|&op| pending[op] == 0).collect();
    let mut sched = Vec::with_capacity(graph.num_ops());

    while !ready.is_empty() {
        let pick = rng.gen_range(0..ready.len());
        let op = ready.swap_remove(pick);
        sched.push(op);
        for &succ in &graph.op(op).succs {
            pending[succ] -= 1;
            if pending[succ] == 0 {
                ready.push(succ);
            }
        }
    }

    sched
}
