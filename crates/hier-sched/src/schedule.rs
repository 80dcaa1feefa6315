// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Peak-minimizing schedulers over the hierarchical graph.
//!
//! Three scheduling layers build on each other:
//!
//! 1. **Sequence** ([`schedule_sequence`]): a sequence has exactly one
//!    admissible order, so scheduling it only means computing memory deltas
//!    — kill sets, in-place overlap, transient/stable steps — against a
//!    mutable use-count map.
//! 2. **Group**: the fast path ([`schedule_group_rpo`]) visits member
//!    sequences in reverse post-order from the exit frontier; the exact
//!    path ([`schedule_group_dp`]) runs a dynamic program over all
//!    topological member orders, memoized by ready-set.
//! 3. **Hierarchy** ([`HierScheduler`]): the same DP over the top-level
//!    vertices, dispatching per vertex and deciding per group between the
//!    memo, the RPO fast path, and the exact DP.
//!
//! # Determinism
//!
//! DP memo tables are ordered maps keyed by the *sorted* ready-set, and
//! collisions resolve by the explicit ordering of [`SchedResult`]s (peak,
//! then final stable size, then lexicographic op order), so a given
//! hierarchy and memo always produce the same schedule.

use crate::hier::{Group, HierGraph, HierVert, Sequence, VertId};
use crate::mem_state::MemStateVec;
use crate::SchedError;
use graph_ir::{graph::Validated, Graph, OpId, ValueId};
use std::collections::{BTreeMap, HashMap};

/// Remaining-use counts of live values, the scheduler's central bookkeeping
/// structure. Parameters never appear in it.
pub type UseCnt = HashMap<ValueId, u32>;

/// Hard bound on DP memo entries per group. Group regions are built small,
/// but their antichain width is what the memo actually grows with; past the
/// bound the group falls back to its reverse-post-order schedule.
pub(crate) const GROUP_MEMO_LIMIT: usize = 4096;

// ── Results ────────────────────────────────────────────────────────

/// An op order together with its memory trajectory.
#[derive(Debug, Clone, Default)]
pub struct SchedResult {
    /// Scheduled ops.
    pub ops: Vec<OpId>,
    /// Memory states of the scheduled ops.
    pub states: MemStateVec,
}

impl SchedResult {
    /// `true` if `self` should replace `incumbent` under the deterministic
    /// ordering: lower peak, then lower final stable size, then
    /// lexicographically smaller op order.
    fn beats(&self, incumbent: &SchedResult) -> bool {
        let lhs = (self.states.peak(), self.states.latest(), &self.ops);
        let rhs = (incumbent.states.peak(), incumbent.states.latest(), &incumbent.ops);
        lhs < rhs
    }
}

/// A partial schedule in a DP memo entry: the result so far plus the
/// serialized graph state needed to extend it without re-traversal.
#[derive(Debug, Clone)]
struct PartialSched {
    ops: Vec<OpId>,
    states: MemStateVec,
    /// Remaining predecessor counts of unscheduled vertices.
    pred_cnt: HashMap<VertId, u32>,
    /// Remaining use counts of live values.
    use_cnt: UseCnt,
}

impl PartialSched {
    fn result(&self) -> SchedResult {
        SchedResult {
            ops: self.ops.clone(),
            states: self.states.clone(),
        }
    }
}

/// Moves vertices whose predecessor count reached zero out of `pred_cnt`
/// and into the sorted ready list. Sorting keeps the list canonical so two
/// exploration paths reaching the same ready set collide in the memo.
fn extract_zero_in(pred_cnt: &mut HashMap<VertId, u32>, zero_in: &mut Vec<VertId>) {
    let before = zero_in.len();
    for (&vert, &cnt) in pred_cnt.iter() {
        if cnt == 0 {
            zero_in.push(vert);
        }
    }
    for &vert in &zero_in[before..] {
        pred_cnt.remove(&vert);
    }
    zero_in.sort_unstable();
}

// ── Sequence scheduling ────────────────────────────────────────────

/// Schedules a sequence (trivially — it has one order) and computes its
/// memory trajectory. `use_cnt` is decremented in place: killed values are
/// removed and produced values inserted with their total use counts.
pub fn schedule_sequence(
    graph: &Graph<Validated>,
    seq: &Sequence,
    use_cnt: &mut UseCnt,
) -> SchedResult {
    let mut states = MemStateVec::new();
    for &op_id in &seq.ops {
        let op = graph.op(op_id);

        // Consume uses; a value is killed at the occurrence that zeroes its
        // count (parameters are never tracked).
        let mut killed: Vec<ValueId> = Vec::new();
        for &val in &op.inputs {
            if graph.value(val).is_param() {
                continue;
            }
            if let Some(cnt) = use_cnt.get_mut(&val) {
                debug_assert!(*cnt > 0, "use count of '{}' underflowed", graph.value(val).name);
                *cnt -= 1;
                if *cnt == 0 {
                    killed.push(val);
                }
            }
        }

        // In-place execution is admissible only when the aliased input dies
        // here.
        let mut overlap = graph.overlap_input(op);
        if let Some(idx) = overlap {
            if !killed.contains(&op.inputs[idx]) {
                overlap = None;
            }
        }

        // Transient increase: fresh storage for the outputs, unless they
        // reuse the dying input's buffer.
        let inc: u64 = match overlap {
            None => op.outputs.iter().map(|&v| graph.value(v).size_bytes()).sum(),
            Some(_) => 0,
        };

        // Stable decrease: storage of the killed values, except the
        // overlapped one (retained, renamed to the output).
        let overlap_val = overlap.map(|idx| op.inputs[idx]);
        let dec: u64 = killed
            .iter()
            .filter(|&&v| Some(v) != overlap_val)
            .map(|&v| graph.value(v).size_bytes())
            .sum();

        states.append(inc, dec);

        for &val in &killed {
            use_cnt.remove(&val);
        }
        for &val in &op.outputs {
            use_cnt.insert(val, graph.value(val).uses.len() as u32);
        }
    }

    SchedResult {
        ops: seq.ops.clone(),
        states,
    }
}

// ── Group scheduling ───────────────────────────────────────────────

/// Schedules a group in reverse post-order from its exit frontier. Fast
/// but almost always suboptimal; the caller accepts it only when its peak
/// cannot lift the ambient peak.
pub fn schedule_group_rpo(
    graph: &Graph<Validated>,
    hier: &HierGraph,
    group: &Group,
    use_cnt: &mut UseCnt,
) -> SchedResult {
    let mut ops = Vec::new();
    let mut states = MemStateVec::new();
    for vert in hier.rpo_seqs_from(&group.out_front) {
        let vert_result = schedule_sequence(graph, hier.seq(vert), use_cnt);
        ops.extend(vert_result.ops);
        states.extend(&vert_result.states);
    }
    SchedResult { ops, states }
}

/// The exact path: a dynamic program over all topological orders of the
/// group's sequences, memoized by canonical ready-set. Returns `None` when
/// the memo exceeds [`GROUP_MEMO_LIMIT`] (the caller then falls back to the
/// RPO order).
pub fn schedule_group_dp(
    graph: &Graph<Validated>,
    hier: &HierGraph,
    group: &Group,
    use_cnt: &UseCnt,
) -> Option<(SchedResult, UseCnt)> {
    let mut pred_cnt: HashMap<VertId, u32> = group
        .seqs
        .iter()
        .map(|&s| (s, hier.seq(s).preds.len() as u32))
        .collect();
    let mut zero_in = Vec::new();
    extract_zero_in(&mut pred_cnt, &mut zero_in);

    let mut memo: BTreeMap<Vec<VertId>, PartialSched> = BTreeMap::new();
    memo.insert(
        zero_in,
        PartialSched {
            ops: Vec::new(),
            states: MemStateVec::new(),
            pred_cnt,
            use_cnt: use_cnt.clone(),
        },
    );

    for _ in 0..group.seqs.len() {
        let mut next: BTreeMap<Vec<VertId>, PartialSched> = BTreeMap::new();
        for (zero_in, partial) in &memo {
            for &vert in zero_in {
                let mut use_cnt = partial.use_cnt.clone();
                let vert_result = schedule_sequence(graph, hier.seq(vert), &mut use_cnt);
                advance(hier, vert, zero_in, partial, vert_result, use_cnt, &mut next);
            }
        }
        if next.len() > GROUP_MEMO_LIMIT {
            return None;
        }
        memo = next;
    }

    memo.remove(&Vec::new())
        .map(|p| (p.result(), p.use_cnt))
}

/// Extends a partial schedule by one vertex result and merges it into the
/// next round's memo under the [`SchedResult`] ordering.
fn advance(
    hier: &HierGraph,
    vert: VertId,
    zero_in: &[VertId],
    partial: &PartialSched,
    vert_result: SchedResult,
    use_cnt: UseCnt,
    memo: &mut BTreeMap<Vec<VertId>, PartialSched>,
) {
    let mut ops = partial.ops.clone();
    ops.extend(&vert_result.ops);
    let mut states = partial.states.clone();
    states.extend(&vert_result.states);

    let mut pred_cnt = partial.pred_cnt.clone();
    for &succ in hier.succs_of(vert) {
        if let Some(cnt) = pred_cnt.get_mut(&succ) {
            *cnt -= 1;
        }
    }
    let mut new_zero_in: Vec<VertId> = zero_in.iter().copied().filter(|&v| v != vert).collect();
    extract_zero_in(&mut pred_cnt, &mut new_zero_in);

    let candidate = PartialSched {
        ops,
        states,
        pred_cnt,
        use_cnt,
    };
    match memo.entry(new_zero_in) {
        std::collections::btree_map::Entry::Occupied(mut entry) => {
            if candidate.result().beats(&entry.get().result()) {
                entry.insert(candidate);
            }
        }
        std::collections::btree_map::Entry::Vacant(entry) => {
            entry.insert(candidate);
        }
    }
}

/// Applies a group's net effect to the ambient use counts: consumed values
/// lose the group's uses (killed ones drop out), produced values appear
/// with their external use counts.
pub fn update_group_use_count(group: &Group, use_cnt: &mut UseCnt) {
    for &(val, num) in &group.consumed {
        if let Some(cnt) = use_cnt.get_mut(&val) {
            *cnt = cnt.saturating_sub(num);
            if *cnt == 0 {
                use_cnt.remove(&val);
            }
        }
    }
    for &(val, num) in &group.produced {
        use_cnt.insert(val, num);
    }
}

// ── Group context ──────────────────────────────────────────────────

/// The minimal ambient state that determines a group's memory trajectory:
/// for each consumed value (in the group's sorted `consumed` order),
/// whether the group kills it. Two schedules of a group in equal contexts
/// are identical, which makes this the memoization key shared across
/// refinement iterations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupContext {
    /// The group this context describes.
    pub group: VertId,
    /// Per-consumed-value: does the ambient use count equal the group's?
    pub kill: Vec<bool>,
}

impl GroupContext {
    /// Builds the context of `group` under the given ambient use counts.
    pub fn new(group: &Group, use_cnt: &UseCnt) -> Self {
        Self {
            group: group.id,
            kill: group
                .consumed
                .iter()
                .map(|&(val, num)| use_cnt.get(&val).copied().unwrap_or(0) == num)
                .collect(),
        }
    }
}

// ── Hierarchical scheduling ────────────────────────────────────────

/// One scheduling pass over the hierarchical graph: the ready-set DP over
/// top-level vertices, with per-group dispatch between the cross-iteration
/// memo, the RPO fast path, and the exact group DP.
pub struct HierScheduler<'a> {
    graph: &'a Graph<Validated>,
    hier: &'a HierGraph,
    /// Scheduling result of each group under each context; owned by the
    /// refinement loop so it survives across iterations.
    group_memo: &'a mut HashMap<GroupContext, SchedResult>,
}

impl<'a> HierScheduler<'a> {
    /// Creates a scheduler for one pass.
    pub fn new(
        graph: &'a Graph<Validated>,
        hier: &'a HierGraph,
        group_memo: &'a mut HashMap<GroupContext, SchedResult>,
    ) -> Self {
        Self {
            graph,
            hier,
            group_memo,
        }
    }

    /// Computes a full op order minimizing peak live memory over the
    /// current hierarchy.
    pub fn schedule(&mut self) -> Result<Vec<OpId>, SchedError> {
        let hier = self.hier;
        let graph = self.graph;

        let mut pred_cnt: HashMap<VertId, u32> = hier
            .top_verts()
            .into_iter()
            .map(|v| (v, hier.preds_of(v).len() as u32))
            .collect();
        let n_vert = pred_cnt.len();
        if n_vert == 0 {
            return Err(SchedError::EmptyGraph);
        }

        let mut use_cnt: UseCnt = UseCnt::new();
        let mut init_size: u64 = 0;
        for &val in &hier.inputs {
            use_cnt.insert(val, graph.value(val).uses.len() as u32);
            init_size += graph.value(val).size_bytes();
        }

        let mut zero_in = Vec::new();
        extract_zero_in(&mut pred_cnt, &mut zero_in);
        let mut memo: BTreeMap<Vec<VertId>, PartialSched> = BTreeMap::new();
        memo.insert(
            zero_in,
            PartialSched {
                ops: Vec::new(),
                states: MemStateVec::with_initial(init_size),
                pred_cnt,
                use_cnt,
            },
        );

        for _ in 0..n_vert {
            let mut next: BTreeMap<Vec<VertId>, PartialSched> = BTreeMap::new();
            for (zero_in, partial) in &memo {
                for &vert in zero_in {
                    let mut use_cnt = partial.use_cnt.clone();
                    let vert_result = self.schedule_vertex(vert, &mut use_cnt, &partial.states)?;
                    advance(hier, vert, zero_in, partial, vert_result, use_cnt, &mut next);
                }
            }
            memo = next;
        }

        let full = memo
            .remove(&Vec::new())
            .ok_or(SchedError::IncompleteSchedule {
                scheduled: 0,
                total: graph.num_ops(),
            })?;
        if full.ops.len() != graph.num_ops() {
            return Err(SchedError::IncompleteSchedule {
                scheduled: full.ops.len(),
                total: graph.num_ops(),
            });
        }
        tracing::debug!(
            peak = full.states.peak(),
            latest = full.states.latest(),
            "hierarchical pass complete",
        );
        Ok(full.ops)
    }

    /// Per-vertex dispatch. For groups: memo hit → replay; RPO peak within
    /// ambient headroom → accept without memoizing; otherwise the exact DP,
    /// memoized under the group context.
    fn schedule_vertex(
        &mut self,
        vert: VertId,
        use_cnt: &mut UseCnt,
        prev_states: &MemStateVec,
    ) -> Result<SchedResult, SchedError> {
        let hier = self.hier;
        let graph = self.graph;
        match hier.vert(vert) {
            HierVert::Seq(seq) => Ok(schedule_sequence(graph, seq, use_cnt)),
            HierVert::Group(group) => {
                if group.dissolved {
                    return Err(SchedError::BrokenHierarchy(format!(
                        "dissolved group {vert} reached per-vertex scheduling",
                    )));
                }

                let ctx = GroupContext::new(group, use_cnt);
                if let Some(hit) = self.group_memo.get(&ctx) {
                    let result = hit.clone();
                    update_group_use_count(group, use_cnt);
                    return Ok(result);
                }

                // Fast path: if the RPO trajectory cannot raise the ambient
                // peak, any valid order suffices.
                let mut rpo_use_cnt = use_cnt.clone();
                let rpo = schedule_group_rpo(graph, hier, group, &mut rpo_use_cnt);
                if rpo.states.peak() + prev_states.latest() <= prev_states.peak() {
                    *use_cnt = rpo_use_cnt;
                    return Ok(rpo);
                }

                match schedule_group_dp(graph, hier, group, use_cnt) {
                    Some((dp, dp_use_cnt)) => {
                        // The DP and RPO orders consume the same values, so
                        // their exit use counts must agree.
                        debug_assert_eq!(dp_use_cnt, rpo_use_cnt);
                        *use_cnt = rpo_use_cnt;
                        self.group_memo.insert(ctx, dp.clone());
                        Ok(dp)
                    }
                    None => {
                        tracing::warn!(
                            group = vert,
                            "group DP memo overflow, falling back to RPO order",
                        );
                        *use_cnt = rpo_use_cnt;
                        Ok(rpo)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hier::HierGraph;
    use graph_ir::{GraphBuilder, OpKind, ValueKind};
    use tensor_core::{DType, Shape};

    fn val(b: &mut GraphBuilder, name: &str, kind: ValueKind, bytes: u64) -> ValueId {
        // U8 elements, so the element count is the byte size.
        b.value(name, kind, DType::U8, Shape::vector(bytes)).unwrap()
    }

    /// in(4) → a → b → c → out, all tensors 4 bytes, conv ops (no overlap).
    fn chain() -> Graph<Validated> {
        let mut b = GraphBuilder::new("chain");
        let inp = val(&mut b, "in", ValueKind::Input, 4);
        let t0 = val(&mut b, "t0", ValueKind::Intermediate, 4);
        let t1 = val(&mut b, "t1", ValueKind::Intermediate, 4);
        let out = val(&mut b, "out", ValueKind::Output, 4);
        b.op("a", OpKind::Conv, &[inp], &[t0]);
        b.op("b", OpKind::Conv, &[t0], &[t1]);
        b.op("c", OpKind::Conv, &[t1], &[out]);
        b.build().unwrap()
    }

    fn input_use_counts(g: &Graph<Validated>) -> UseCnt {
        g.inputs
            .iter()
            .map(|&v| (v, g.value(v).uses.len() as u32))
            .collect()
    }

    #[test]
    fn test_sequence_order_is_construction_order() {
        let g = chain();
        let hier = HierGraph::build(&g);
        let mut uc = input_use_counts(&g);
        let result = schedule_sequence(&g, hier.seq(0), &mut uc);
        assert_eq!(result.ops, vec![0, 1, 2]);
    }

    #[test]
    fn test_sequence_memory_trace() {
        let g = chain();
        let hier = HierGraph::build(&g);
        let mut uc = input_use_counts(&g);
        let result = schedule_sequence(&g, hier.seq(0), &mut uc);
        // Each step allocates 4 and frees the killed 4-byte predecessor:
        // relative trace (4, 0), (4, 0), (4, 0).
        let steps: Vec<_> = result.states.steps().collect();
        assert_eq!(steps, vec![(4, 0), (4, 0), (4, 0)]);
        assert_eq!(result.states.peak(), 4);
        // Only the graph output remains live.
        assert_eq!(uc.len(), 1);
        assert!(uc.contains_key(&3));
    }

    #[test]
    fn test_overlap_elides_allocation() {
        // p: in → t (conv), r: t → out (relu, in-place capable, t killed).
        let mut b = GraphBuilder::new("inplace");
        let inp = val(&mut b, "in", ValueKind::Input, 8);
        let t = val(&mut b, "t", ValueKind::Intermediate, 8);
        let out = val(&mut b, "out", ValueKind::Output, 8);
        b.op("p", OpKind::Conv, &[inp], &[t]);
        b.op("r", OpKind::Relu, &[t], &[out]);
        let g = b.build().unwrap();

        let hier = HierGraph::build(&g);
        let mut uc = input_use_counts(&g);
        let result = schedule_sequence(&g, hier.seq(0), &mut uc);
        let steps: Vec<_> = result.states.steps().collect();
        // p: +8 transient, -8 on killing the input. r: inc 0, dec 0 — the
        // relu reuses the dying tensor's storage, so the level is flat.
        assert_eq!(steps, vec![(8, 0), (0, 0)]);
    }

    #[test]
    fn test_overlap_invalid_when_input_survives() {
        // t feeds both the relu and a second consumer, so it is not killed
        // at the relu and in-place execution is inadmissible.
        let mut b = GraphBuilder::new("no-inplace");
        let inp = val(&mut b, "in", ValueKind::Input, 8);
        let t = val(&mut b, "t", ValueKind::Intermediate, 8);
        let r_out = val(&mut b, "r_out", ValueKind::Intermediate, 8);
        let s_out = val(&mut b, "s_out", ValueKind::Intermediate, 8);
        let out = val(&mut b, "out", ValueKind::Output, 16);
        b.op("p", OpKind::Conv, &[inp], &[t]);
        b.op("r", OpKind::Relu, &[t], &[r_out]);
        b.op("s", OpKind::Sigmoid, &[t], &[s_out]);
        b.op("j", OpKind::Concat, &[r_out, s_out], &[out]);
        let g = b.build().unwrap();

        let hier = HierGraph::build(&g);
        let mut uc = input_use_counts(&g);
        // Schedule just the relu sequence after its producer.
        let seq_p = hier.op_to_seq[0];
        let seq_r = hier.op_to_seq[1];
        schedule_sequence(&g, hier.seq(seq_p), &mut uc);
        let result = schedule_sequence(&g, hier.seq(seq_r), &mut uc);
        // t survives (one use left), so the relu allocates fresh storage
        // and frees nothing.
        assert_eq!(result.states.steps().collect::<Vec<_>>(), vec![(8, 8)]);
    }

    #[test]
    fn test_duplicate_input_killed_once() {
        // add consumes t twice; both occurrences retire at one op and the
        // storage is freed once.
        let mut b = GraphBuilder::new("dup");
        let inp = val(&mut b, "in", ValueKind::Input, 8);
        let t = val(&mut b, "t", ValueKind::Intermediate, 8);
        let out = val(&mut b, "out", ValueKind::Output, 8);
        b.op("p", OpKind::Conv, &[inp], &[t]);
        b.op("dbl", OpKind::Add, &[t, t], &[out]);
        let g = b.build().unwrap();

        assert_eq!(g.value(t).uses, vec![1, 1]);
        let hier = HierGraph::build(&g);
        let mut uc = input_use_counts(&g);
        let result = schedule_sequence(&g, hier.seq(0), &mut uc);
        let steps: Vec<_> = result.states.steps().collect();
        // dbl overlaps input 0 (t is killed there): inc 0; dec counts the
        // other 0 bytes — t's storage is renamed, not freed twice.
        assert_eq!(steps, vec![(8, 0), (0, 0)]);
    }

    /// Asymmetric diamond where branch order matters: the wide branch must
    /// run before the narrow one.
    ///
    /// a: in(4) → t0(10); heavy: t0 → h1(100) → h2(5); light: t0 → l(50);
    /// d: (h2, l) → out(10). Ops are inserted light-first so the naive
    /// reverse post-order inside the group visits the light branch first.
    fn asymmetric_diamond() -> Graph<Validated> {
        let mut b = GraphBuilder::new("asym");
        let inp = val(&mut b, "in", ValueKind::Input, 4);
        let t0 = val(&mut b, "t0", ValueKind::Intermediate, 10);
        let l = val(&mut b, "l", ValueKind::Intermediate, 50);
        let h1 = val(&mut b, "h1", ValueKind::Intermediate, 100);
        let h2 = val(&mut b, "h2", ValueKind::Intermediate, 5);
        let out = val(&mut b, "out", ValueKind::Output, 10);
        b.op("a", OpKind::Conv, &[inp], &[t0]);
        b.op("light", OpKind::Conv, &[t0], &[l]);
        b.op("heavy1", OpKind::Conv, &[t0], &[h1]);
        b.op("heavy2", OpKind::Pool, &[h1], &[h2]);
        b.op("d", OpKind::Concat, &[h2, l], &[out]);
        b.build().unwrap()
    }

    #[test]
    fn test_group_rpo_vs_dp() {
        let g = asymmetric_diamond();
        let hier = HierGraph::build(&g);
        let gid = hier.top_verts()[0];
        let group = hier.try_group(gid).expect("diamond should group");

        let ambient = input_use_counts(&g);

        let mut rpo_uc = ambient.clone();
        let rpo = schedule_group_rpo(&g, &hier, group, &mut rpo_uc);
        let (dp, dp_uc) = schedule_group_dp(&g, &hier, group, &ambient).expect("within memo bound");

        // Light-first order: a 10, l 60, h1 150(!), h2 …; heavy-first
        // keeps the 50-byte light tensor out of the heavy transient.
        assert_eq!(rpo.states.peak(), 156);
        assert_eq!(dp.states.peak(), 111);
        assert!(dp.states.peak() < rpo.states.peak());
        // Both orders drain the same values.
        assert_eq!(rpo_uc, dp_uc);
        // Heavy branch scheduled before the light one.
        let order = dp.ops.clone();
        let pos =
            |op: OpId| order.iter().position(|&o| o == op).expect("op scheduled");
        assert!(pos(2) < pos(1), "heavy1 before light");
    }

    #[test]
    fn test_dp_complete_and_topological() {
        let g = asymmetric_diamond();
        let hier = HierGraph::build(&g);
        let gid = hier.top_verts()[0];
        let group = hier.try_group(gid).unwrap();
        let (dp, _) = schedule_group_dp(&g, &hier, group, &input_use_counts(&g)).unwrap();

        assert_eq!(dp.ops.len(), g.num_ops());
        let pos: HashMap<OpId, usize> =
            dp.ops.iter().enumerate().map(|(i, &o)| (o, i)).collect();
        for op in &g.ops {
            for &p in &op.preds {
                assert!(pos[&p] < pos[&op.index]);
            }
        }
    }

    #[test]
    fn test_update_group_use_count_matches_replay() {
        let g = asymmetric_diamond();
        let hier = HierGraph::build(&g);
        let gid = hier.top_verts()[0];
        let group = hier.try_group(gid).unwrap();

        let mut replayed = input_use_counts(&g);
        schedule_group_rpo(&g, &hier, group, &mut replayed);

        let mut shortcut = input_use_counts(&g);
        update_group_use_count(group, &mut shortcut);

        assert_eq!(replayed, shortcut);
    }

    #[test]
    fn test_group_context_distinguishes_kill_patterns() {
        let g = asymmetric_diamond();
        let hier = HierGraph::build(&g);
        let gid = hier.top_verts()[0];
        let group = hier.try_group(gid).unwrap();

        // Context A: the group's use of the input is the last one.
        let killing = input_use_counts(&g);
        // Context B: something outside still holds the input.
        let mut surviving = killing.clone();
        for cnt in surviving.values_mut() {
            *cnt += 1;
        }

        let ctx_a = GroupContext::new(group, &killing);
        let ctx_b = GroupContext::new(group, &surviving);
        assert_eq!(ctx_a.kill, vec![true]);
        assert_eq!(ctx_b.kill, vec![false]);
        assert_ne!(ctx_a, ctx_b);
        assert_eq!(ctx_a, GroupContext::new(group, &killing.clone()));
    }

    #[test]
    fn test_hier_scheduler_end_to_end() {
        let g = asymmetric_diamond();
        let hier = HierGraph::build(&g);
        let mut memo = HashMap::new();
        let order = HierScheduler::new(&g, &hier, &mut memo).schedule().unwrap();
        assert_eq!(order.len(), g.num_ops());
        // The group peak (111) exceeds the input headroom, so the DP path
        // ran and its result was memoized.
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_memoized_group_replay_is_identical() {
        let g = asymmetric_diamond();
        let hier = HierGraph::build(&g);
        let mut memo = HashMap::new();
        let first = HierScheduler::new(&g, &hier, &mut memo).schedule().unwrap();
        let memo_len = memo.len();
        let second = HierScheduler::new(&g, &hier, &mut memo).schedule().unwrap();
        assert_eq!(first, second);
        assert_eq!(memo.len(), memo_len, "replay adds no memo entries");
    }

    #[test]
    fn test_empty_graph_rejected() {
        let b = GraphBuilder::new("empty");
        let g = b.build();
        // An opless graph fails validation upstream; guard the scheduler
        // path with a single-value graph carrying no ops.
        assert!(g.is_err() || g.unwrap().num_ops() == 0);
    }
}
