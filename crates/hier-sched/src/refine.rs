// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The ungroup refinement loop and the top-level entry point.
//!
//! One scheduling pass treats every group as an atomic block; the block
//! boundary can hide better interleavings. After each pass the loop finds
//! the *peak residents* — the values alive where the schedule hits its peak
//! — and dissolves the groups around the sequences defining them: the group
//! containing such a sequence, and every group among its successors (the
//! consumers keeping the resident alive). The next pass then schedules
//! those sequences at the top level, with full DP freedom. The loop stops
//! once a pass reproduces the previous peak and resident set with no
//! further dissolution available, and returns the first schedule achieving
//! that peak.

use crate::hier::{HierGraph, VertId};
use crate::lifetime::Lifetime;
use crate::schedule::{GroupContext, HierScheduler, SchedResult};
use crate::SchedError;
use graph_ir::{graph::Validated, Graph, OpId, ValueId};
use std::collections::{BTreeSet, HashMap};

/// One refinement iteration's outcome, kept for the termination test.
struct Iteration {
    sched: Vec<OpId>,
    peak: u64,
    peak_values: BTreeSet<ValueId>,
}

/// Computes an execution order for `graph` minimizing peak live tensor
/// memory: builds the hierarchy, then alternates scheduling passes with
/// ungroup refinement until no further improvement is possible.
///
/// The group memo is shared across iterations — groups untouched by
/// refinement keep their results, so later passes only re-solve what
/// changed.
pub fn hierarchical_schedule(graph: &Graph<Validated>) -> Result<Vec<OpId>, SchedError> {
    let mut hier = HierGraph::build(graph);
    let mut group_memo: HashMap<GroupContext, SchedResult> = HashMap::new();
    let mut prev: Option<Iteration> = None;

    loop {
        let sched = HierScheduler::new(graph, &hier, &mut group_memo).schedule()?;
        let lifetime = Lifetime::compute(&sched, graph);
        let peak = lifetime.peak();

        let mut peak_values: BTreeSet<ValueId> = BTreeSet::new();
        for (step, size) in lifetime.size_range() {
            if size == peak {
                peak_values.extend(lifetime.alive_at(step));
            }
        }
        tracing::info!(
            peak_kib = peak / 1024,
            residents = peak_values.len(),
            "scheduling pass complete",
        );

        // The sequences defining the peak residents (inputs have no
        // definer and anchor no sequence).
        let peak_seqs: BTreeSet<VertId> = peak_values
            .iter()
            .filter_map(|&v| graph.value(v).def)
            .map(|op| hier.op_to_seq[op])
            .collect();

        let mut changed = false;
        for &seq in &peak_seqs {
            if let Some(group) = hier.seq_group(seq) {
                hier.ungroup(group);
                changed = true;
            }
            changed |= ungroup_successors(&mut hier, seq);
        }

        if let Some(last) = prev.take() {
            if last.peak == peak && last.peak_values == peak_values && !changed {
                tracing::info!(peak_kib = peak / 1024, "refinement converged");
                return Ok(last.sched);
            }
        }
        prev = Some(Iteration {
            sched,
            peak,
            peak_values,
        });
    }
}

/// Dissolves every group among `seq`'s successors, repeating until none
/// remains (dissolution can surface new group successors).
fn ungroup_successors(hier: &mut HierGraph, seq: VertId) -> bool {
    let mut changed = false;
    loop {
        let next = hier
            .succs_of(seq)
            .iter()
            .copied()
            .find(|&v| hier.is_live_group(v));
        match next {
            Some(group) => {
                hier.ungroup(group);
                changed = true;
            }
            None => break,
        }
    }
    changed
}

impl HierGraph {
    /// The group owning a sequence, if any. (Scheduling-internal vertices
    /// are always sequences here; a group id yields `None`.)
    fn seq_group(&self, id: VertId) -> Option<VertId> {
        self.try_seq(id).and_then(|s| s.group)
    }
}
