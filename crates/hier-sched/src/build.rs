// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Hierarchy construction: the sequence-joining and group-making passes.
//!
//! # Sequence joining
//!
//! A maximal chain of ops — each non-terminal member having exactly one
//! successor whose only predecessor it is — collapses into one
//! [`Sequence`]. Afterwards the hierarchical edge lists are derived and
//! frozen as the *original* edges that ungrouping restores against.
//!
//! # Group making
//!
//! For every fork sequence (two or more successors) whose immediate
//! postdominator closes a region with no edges entering or leaving through
//! its interior, the region becomes a [`Group`]: boundary edges are rewired
//! to the group vertex and the group's consumed/produced value tallies are
//! computed. Regions are kept small (≤ [`MAX_GROUP_SEQS`] sequences) so the
//! per-group DP stays tractable.

use crate::hier::{add_unique, remove_item, Group, HierGraph, HierVert, Sequence, VertId};
use graph_ir::{graph::Validated, Graph, OpId, ValueId};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Upper bound on sequences per group. The group DP is exponential in the
/// group's antichain width, so regions are kept small at construction.
pub(crate) const MAX_GROUP_SEQS: usize = 10;

/// Sentinel for the virtual exit vertex in postdominator computation.
const EXIT: usize = usize::MAX;

impl HierGraph {
    /// Builds the hierarchical graph: joins sequences, freezes original
    /// edges, then forms groups.
    pub fn build(graph: &Graph<Validated>) -> Self {
        let mut hier = join_sequences(graph);
        make_groups(graph, &mut hier);
        tracing::debug!(
            seqs = hier.num_verts(),
            groups = hier
                .top_verts()
                .iter()
                .filter(|&&v| hier.is_live_group(v))
                .count(),
            "hierarchy built",
        );
        hier
    }
}

// ── Sequence joining ───────────────────────────────────────────────

/// `true` if `op` starts a chain: it is not the sole successor of a
/// single-successor predecessor.
fn is_chain_head(graph: &Graph<Validated>, op: OpId) -> bool {
    let preds = &graph.op(op).preds;
    !(preds.len() == 1 && graph.op(preds[0]).succs.len() == 1)
}

/// The unique chain continuation of `op`, if any.
fn chain_next(graph: &Graph<Validated>, op: OpId) -> Option<OpId> {
    let succs = &graph.op(op).succs;
    if succs.len() != 1 {
        return None;
    }
    let next = succs[0];
    if graph.op(next).preds.len() == 1 {
        Some(next)
    } else {
        None
    }
}

fn join_sequences(graph: &Graph<Validated>) -> HierGraph {
    let num_ops = graph.num_ops();
    let mut verts: Vec<HierVert> = Vec::new();
    let mut op_to_seq: Vec<VertId> = vec![0; num_ops];

    // Collapse chains, scanning heads in op order for stable ids.
    for head in 0..num_ops {
        if !is_chain_head(graph, head) {
            continue;
        }
        let id = verts.len();
        let mut ops = vec![head];
        op_to_seq[head] = id;
        let mut cur = head;
        while let Some(next) = chain_next(graph, cur) {
            ops.push(next);
            op_to_seq[next] = id;
            cur = next;
        }
        verts.push(HierVert::Seq(Sequence {
            id,
            ops,
            preds: Vec::new(),
            succs: Vec::new(),
            orig_preds: Vec::new(),
            orig_succs: Vec::new(),
            group: None,
        }));
    }

    // Derive hierarchical edges from the chain endpoints and freeze the
    // originals.
    for id in 0..verts.len() {
        let (head, tail) = match &verts[id] {
            HierVert::Seq(s) => (s.ops[0], s.ops[s.ops.len() - 1]),
            HierVert::Group(_) => continue,
        };
        let mut preds: Vec<VertId> = graph.op(head).preds.iter().map(|&p| op_to_seq[p]).collect();
        preds.sort_unstable();
        preds.dedup();
        let mut succs: Vec<VertId> = graph.op(tail).succs.iter().map(|&s| op_to_seq[s]).collect();
        succs.sort_unstable();
        succs.dedup();
        if let HierVert::Seq(s) = &mut verts[id] {
            s.preds = preds.clone();
            s.succs = succs.clone();
            s.orig_preds = preds;
            s.orig_succs = succs;
        }
    }

    HierGraph {
        inputs: graph.inputs.clone(),
        outputs: graph.outputs.clone(),
        verts,
        op_to_seq,
    }
}

// ── Group making ───────────────────────────────────────────────────

fn make_groups(graph: &Graph<Validated>, hier: &mut HierGraph) {
    let n_seqs = hier.num_verts();
    if n_seqs < 3 {
        return;
    }

    let topo = topo_order(hier, n_seqs);
    let mut pos = vec![0usize; n_seqs];
    for (i, &v) in topo.iter().enumerate() {
        pos[v] = i;
    }
    let ipdom = compute_ipdoms(hier, &topo, &pos);

    // Scan forks in dependency order; regions already swallowed by an
    // earlier group are skipped by the membership checks.
    for &fork in &topo {
        let seq = hier.seq(fork);
        if seq.group.is_some() || seq.succs.len() < 2 {
            continue;
        }
        let join = ipdom[fork];
        if join == EXIT {
            continue;
        }
        if let Some(region) = closed_region(hier, fork, join) {
            form_group(graph, hier, region);
        }
    }
}

/// Deterministic topological order of the first `n` vertices.
fn topo_order(hier: &HierGraph, n: usize) -> Vec<VertId> {
    let mut pending: Vec<usize> = (0..n).map(|v| hier.preds_of(v).len()).collect();
    let mut queue: VecDeque<VertId> = (0..n).filter(|&v| pending[v] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &succ in hier.succs_of(v) {
            pending[succ] -= 1;
            if pending[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }
    order
}

/// Immediate postdominators over the sequence graph, with a virtual exit
/// ([`EXIT`]) postdominating every sink. Cooper–Harvey–Kennedy on the
/// reversed graph: process vertices sinks-first; the candidate for a vertex
/// is the intersection of its successors in the (partial) postdominator
/// tree.
fn compute_ipdoms(hier: &HierGraph, topo: &[VertId], pos: &[usize]) -> Vec<usize> {
    let posn = |v: usize| if v == EXIT { usize::MAX } else { pos[v] };
    let mut ipdom = vec![EXIT; topo.len()];

    for &v in topo.iter().rev() {
        let succs = hier.succs_of(v);
        if succs.is_empty() {
            ipdom[v] = EXIT;
            continue;
        }
        let mut candidate = succs[0];
        for &s in &succs[1..] {
            // Intersect: walk both candidates toward the exit until they
            // meet.
            let (mut a, mut b) = (candidate, s);
            while a != b {
                while posn(a) < posn(b) {
                    a = ipdom[a];
                }
                while posn(b) < posn(a) {
                    b = ipdom[b];
                }
            }
            candidate = a;
            if candidate == EXIT {
                break;
            }
        }
        ipdom[v] = candidate;
    }

    ipdom
}

/// The single-exit-shaped region between `fork` and `join`, if it is
/// admissible: every member is an ungrouped sequence, no edge *leaves*
/// through the interior (the join postdominates every member), and the
/// region is small enough to DP over. Edges may *enter* the interior from
/// outside — such members join the input frontier alongside the fork.
/// Returns the members sorted by id (including `fork` and `join`).
fn closed_region(hier: &HierGraph, fork: VertId, join: VertId) -> Option<Vec<VertId>> {
    if hier.try_seq(join)?.group.is_some() {
        return None;
    }

    let mut region: BTreeSet<VertId> = BTreeSet::new();
    region.insert(fork);
    region.insert(join);
    let mut queue: VecDeque<VertId> = hier.seq(fork).succs.iter().copied().collect();
    while let Some(v) = queue.pop_front() {
        if region.contains(&v) {
            continue;
        }
        let seq = hier.try_seq(v)?;
        if seq.group.is_some() {
            return None;
        }
        region.insert(v);
        if region.len() > MAX_GROUP_SEQS {
            return None;
        }
        for &s in &seq.succs {
            if s != join {
                queue.push_back(s);
            }
        }
    }

    // `join` postdominates `fork`, so the breadth-first walk cannot escape:
    // every successor chain folds back into the region. It remains to check
    // that no *other* member leaks a successor past the join.
    for &v in &region {
        if v == join {
            continue;
        }
        if hier.succs_of(v).iter().any(|s| !region.contains(s)) {
            return None;
        }
    }

    Some(region.into_iter().collect())
}

fn form_group(graph: &Graph<Validated>, hier: &mut HierGraph, region: Vec<VertId>) {
    let gid = hier.num_verts();
    let rset: BTreeSet<VertId> = region.iter().copied().collect();

    // Frontiers, before any edge is rewired. Entry sequences with no
    // predecessors at all (graph roots) still belong to the input frontier.
    let in_front: Vec<VertId> = region
        .iter()
        .copied()
        .filter(|&v| {
            let preds = hier.preds_of(v);
            preds.is_empty() || preds.iter().any(|p| !rset.contains(p))
        })
        .collect();
    let out_front: Vec<VertId> = region
        .iter()
        .copied()
        .filter(|&v| {
            let succs = hier.succs_of(v);
            succs.is_empty() || succs.iter().any(|s| !rset.contains(s))
        })
        .collect();

    // Consumed/produced tallies over the member ops.
    let ops_in: HashSet<OpId> = region
        .iter()
        .flat_map(|&v| hier.seq(v).ops.iter().copied())
        .collect();
    let mut consumed: BTreeMap<ValueId, u32> = BTreeMap::new();
    let mut produced: BTreeMap<ValueId, u32> = BTreeMap::new();
    for &op_id in &ops_in {
        let op = graph.op(op_id);
        for &val in &op.inputs {
            let value = graph.value(val);
            if value.is_param() {
                continue;
            }
            let defined_inside = value.def.is_some_and(|d| ops_in.contains(&d));
            if !defined_inside {
                *consumed.entry(val).or_insert(0) += 1;
            }
        }
        for &val in &op.outputs {
            let uses = &graph.value(val).uses;
            let external = uses.iter().filter(|u| !ops_in.contains(u)).count() as u32;
            if external > 0 || uses.is_empty() {
                produced.insert(val, external);
            }
        }
    }

    // Rewire boundary edges to the group vertex.
    let mut g_preds: Vec<VertId> = Vec::new();
    let mut g_succs: Vec<VertId> = Vec::new();
    for &v in &region {
        let ext_preds: Vec<VertId> = hier
            .preds_of(v)
            .iter()
            .copied()
            .filter(|p| !rset.contains(p))
            .collect();
        for p in ext_preds {
            let succs = hier.succs_of_mut(p);
            remove_item(succs, v);
            add_unique(succs, gid);
            add_unique(&mut g_preds, p);
            remove_item(&mut hier.seq_mut(v).preds, p);
        }
        let ext_succs: Vec<VertId> = hier
            .succs_of(v)
            .iter()
            .copied()
            .filter(|s| !rset.contains(s))
            .collect();
        for s in ext_succs {
            let preds = hier.preds_of_mut(s);
            remove_item(preds, v);
            add_unique(preds, gid);
            add_unique(&mut g_succs, s);
            remove_item(&mut hier.seq_mut(v).succs, s);
        }
    }

    for &v in &region {
        hier.seq_mut(v).group = Some(gid);
    }

    hier.verts.push(HierVert::Group(Group {
        id: gid,
        seqs: region,
        in_front,
        out_front,
        consumed: consumed.into_iter().collect(),
        produced: produced.into_iter().collect(),
        preds: g_preds,
        succs: g_succs,
        dissolved: false,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{GraphBuilder, OpKind, ValueKind};
    use tensor_core::{DType, Shape};

    fn val(b: &mut GraphBuilder, name: &str, kind: ValueKind, elems: u64) -> ValueId {
        b.value(name, kind, DType::F32, Shape::vector(elems)).unwrap()
    }

    /// in → a → b → c → out, all size 4 elements.
    fn chain_graph() -> Graph<Validated> {
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

    /// a → {b, c} → d, a diamond of four single-op sequences.
    fn diamond_graph() -> Graph<Validated> {
        let mut b = GraphBuilder::new("diamond");
        let inp = val(&mut b, "in", ValueKind::Input, 10);
        let t0 = val(&mut b, "t0", ValueKind::Intermediate, 10);
        let t1 = val(&mut b, "t1", ValueKind::Intermediate, 10);
        let t2 = val(&mut b, "t2", ValueKind::Intermediate, 10);
        let out = val(&mut b, "out", ValueKind::Output, 10);
        b.op("a", OpKind::Conv, &[inp], &[t0]);
        b.op("b", OpKind::Conv, &[t0], &[t1]);
        b.op("c", OpKind::Conv, &[t0], &[t2]);
        b.op("d", OpKind::Concat, &[t1, t2], &[out]);
        b.build().unwrap()
    }

    #[test]
    fn test_chain_joins_to_single_sequence() {
        let g = chain_graph();
        let hier = HierGraph::build(&g);
        assert_eq!(hier.num_verts(), 1);
        let seq = hier.try_seq(0).unwrap();
        assert_eq!(seq.ops, vec![0, 1, 2]);
        assert!(seq.preds.is_empty());
        assert!(seq.succs.is_empty());
        assert_eq!(hier.op_to_seq, vec![0, 0, 0]);
    }

    #[test]
    fn test_diamond_sequences_and_edges() {
        let g = diamond_graph();
        let hier = join_sequences(&g);
        assert_eq!(hier.num_verts(), 4);
        assert_eq!(hier.seq(0).succs, vec![1, 2]);
        assert_eq!(hier.seq(3).preds, vec![1, 2]);
        assert_eq!(hier.seq(1).orig_preds, vec![0]);
        assert_eq!(hier.seq(1).orig_succs, vec![3]);
    }

    #[test]
    fn test_diamond_forms_group() {
        let g = diamond_graph();
        let hier = HierGraph::build(&g);
        assert_eq!(hier.num_verts(), 5);
        let group = hier.try_group(4).expect("diamond should group");
        assert_eq!(group.seqs, vec![0, 1, 2, 3]);
        assert_eq!(group.in_front, vec![0]);
        assert_eq!(group.out_front, vec![3]);
        assert!(group.preds.is_empty());
        assert!(group.succs.is_empty());
        assert_eq!(hier.top_verts(), vec![4]);
    }

    #[test]
    fn test_diamond_consumed_produced() {
        let g = diamond_graph();
        let hier = HierGraph::build(&g);
        let group = hier.try_group(4).unwrap();
        // The graph input (value 0) is consumed once, by op a.
        assert_eq!(group.consumed, vec![(0, 1)]);
        // Only the graph output (value 4) survives, with no external uses.
        assert_eq!(group.produced, vec![(4, 0)]);
    }

    #[test]
    fn test_group_boundary_rewired() {
        // pre → a → {b, c} → d → post: the diamond groups, the outer chain
        // sequences become the group's neighbors.
        let mut b = GraphBuilder::new("flanked");
        let inp = val(&mut b, "in", ValueKind::Input, 8);
        let t = val(&mut b, "t", ValueKind::Intermediate, 8);
        let t0 = val(&mut b, "t0", ValueKind::Intermediate, 8);
        let t1 = val(&mut b, "t1", ValueKind::Intermediate, 8);
        let t2 = val(&mut b, "t2", ValueKind::Intermediate, 8);
        let t3 = val(&mut b, "t3", ValueKind::Intermediate, 8);
        let out = val(&mut b, "out", ValueKind::Output, 8);
        b.op("pre", OpKind::Pool, &[inp], &[t]);
        b.op("a", OpKind::Conv, &[t], &[t0]);
        b.op("b", OpKind::Conv, &[t0], &[t1]);
        b.op("c", OpKind::Conv, &[t0], &[t2]);
        b.op("d", OpKind::Concat, &[t1, t2], &[t3]);
        b.op("post", OpKind::Pool, &[t3], &[out]);
        let g = b.build().unwrap();

        let hier = HierGraph::build(&g);
        // pre+a join (pre has one succ a, a has one pred pre): the fork is
        // the [pre, a] sequence itself, so the group contains it and the
        // [d, post] tail sequence.
        let tops = hier.top_verts();
        assert_eq!(tops.len(), 1);
        let group = hier.try_group(tops[0]).expect("fork region should group");
        assert_eq!(group.seqs.len(), 4);
        assert!(group.preds.is_empty());
        assert!(group.succs.is_empty());
    }

    #[test]
    fn test_wide_region_not_grouped() {
        // A fork wider than MAX_GROUP_SEQS stays ungrouped.
        let mut b = GraphBuilder::new("wide");
        let inp = val(&mut b, "in", ValueKind::Input, 4);
        let t = val(&mut b, "t", ValueKind::Intermediate, 4);
        b.op("fork", OpKind::Conv, &[inp], &[t]);
        let mut mids = Vec::new();
        for i in 0..MAX_GROUP_SEQS + 1 {
            let m = val(&mut b, &format!("m{i}"), ValueKind::Intermediate, 4);
            b.op(&format!("mid{i}"), OpKind::Conv, &[t], &[m]);
            mids.push(m);
        }
        let out = val(&mut b, "out", ValueKind::Output, 4);
        b.op("join", OpKind::Concat, &mids, &[out]);
        let g = b.build().unwrap();

        let hier = HierGraph::build(&g);
        assert!(hier.top_verts().iter().all(|&v| !hier.is_live_group(v)));
    }

    #[test]
    fn test_side_entry_joins_frontier() {
        // A value produced outside the region and consumed by an interior
        // member does not break grouping: the member joins the input
        // frontier and its producer becomes a group predecessor.
        let mut b = GraphBuilder::new("side");
        let inp = val(&mut b, "in", ValueKind::Input, 4);
        let in2 = val(&mut b, "in2", ValueKind::Input, 4);
        let sv = val(&mut b, "sv", ValueKind::Intermediate, 4);
        let t0 = val(&mut b, "t0", ValueKind::Intermediate, 4);
        let t1 = val(&mut b, "t1", ValueKind::Intermediate, 4);
        let t2 = val(&mut b, "t2", ValueKind::Intermediate, 4);
        let out = val(&mut b, "out", ValueKind::Output, 4);
        b.op("a", OpKind::Conv, &[inp], &[t0]);
        b.op("side", OpKind::Pool, &[in2], &[sv]);
        b.op("b", OpKind::Conv, &[t0], &[t1]);
        b.op("c", OpKind::Concat, &[t0, sv], &[t2]);
        b.op("d", OpKind::Concat, &[t1, t2], &[out]);
        let g = b.build().unwrap();

        let hier = HierGraph::build(&g);
        let groups: Vec<VertId> = hier
            .top_verts()
            .into_iter()
            .filter(|&v| hier.is_live_group(v))
            .collect();
        assert_eq!(groups.len(), 1);
        let group = hier.try_group(groups[0]).unwrap();
        // Members: a, b, c, d (seq ids 0, 2, 3, 4); the side producer
        // (seq 1) stays outside and feeds the group.
        assert_eq!(group.seqs, vec![0, 2, 3, 4]);
        assert_eq!(group.in_front, vec![0, 3]);
        assert_eq!(group.out_front, vec![4]);
        assert_eq!(group.preds, vec![1]);
    }

    #[test]
    fn test_ungroup_restores_flat_graph() {
        let g = diamond_graph();
        let mut hier = HierGraph::build(&g);
        let gid = hier.top_verts()[0];
        assert!(hier.is_live_group(gid));

        hier.ungroup(gid);
        assert_eq!(hier.top_verts(), vec![0, 1, 2, 3]);
        for v in 0..4 {
            let seq = hier.seq(v);
            assert_eq!(seq.group, None);
            assert_eq!(seq.preds, seq.orig_preds, "seq {v} preds restored");
            assert_eq!(seq.succs, seq.orig_succs, "seq {v} succs restored");
        }
        // op_to_seq is untouched by grouping.
        assert_eq!(hier.op_to_seq, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_ungroup_on_flat_graph_is_noop() {
        // A chain builds no groups; dissolving any vertex changes nothing.
        let g = chain_graph();
        let mut hier = HierGraph::build(&g);
        let tops = hier.top_verts();
        let ops_map = hier.op_to_seq.clone();
        hier.ungroup(0);
        assert_eq!(hier.top_verts(), tops);
        assert_eq!(hier.op_to_seq, ops_map);
    }

    #[test]
    fn test_ungroup_twice_is_noop() {
        let g = diamond_graph();
        let mut hier = HierGraph::build(&g);
        let gid = hier.top_verts()[0];
        hier.ungroup(gid);
        let tops = hier.top_verts();
        hier.ungroup(gid);
        assert_eq!(hier.top_verts(), tops);
    }

    #[test]
    fn test_ungroup_with_external_neighbors() {
        // pre fans out to a small diamond and to enough bypass branches
        // that the region enclosing everything exceeds MAX_GROUP_SEQS. Only
        // the inner diamond groups, with pre/post as external neighbors.
        let mut b = GraphBuilder::new("neighbored");
        let inp = val(&mut b, "in", ValueKind::Input, 8);
        let t = val(&mut b, "t", ValueKind::Intermediate, 8);
        let t0 = val(&mut b, "t0", ValueKind::Intermediate, 8);
        let t1 = val(&mut b, "t1", ValueKind::Intermediate, 8);
        let t2 = val(&mut b, "t2", ValueKind::Intermediate, 8);
        let t3 = val(&mut b, "t3", ValueKind::Intermediate, 8);
        b.op("pre", OpKind::Pool, &[inp], &[t]);
        b.op("a", OpKind::Conv, &[t], &[t0]);
        b.op("b", OpKind::Conv, &[t0], &[t1]);
        b.op("c", OpKind::Conv, &[t0], &[t2]);
        b.op("d", OpKind::Concat, &[t1, t2], &[t3]);
        let mut post_ins = vec![t3];
        for i in 0..MAX_GROUP_SEQS {
            let u = val(&mut b, &format!("u{i}"), ValueKind::Intermediate, 8);
            b.op(&format!("bypass{i}"), OpKind::Pool, &[t], &[u]);
            post_ins.push(u);
        }
        let out = val(&mut b, "out", ValueKind::Output, 8);
        b.op("post", OpKind::Concat, &post_ins, &[out]);
        let g = b.build().unwrap();

        let mut hier = HierGraph::build(&g);
        let groups: Vec<VertId> = hier
            .top_verts()
            .into_iter()
            .filter(|&v| hier.is_live_group(v))
            .collect();
        assert_eq!(groups.len(), 1, "inner diamond should group");
        let gid = groups[0];
        let (g_preds, g_succs) = {
            let grp = hier.try_group(gid).unwrap();
            assert_eq!(grp.seqs.len(), 4);
            (grp.preds.clone(), grp.succs.clone())
        };
        assert_eq!(g_preds.len(), 1, "group fed by the pre sequence");
        assert_eq!(g_succs.len(), 1, "group feeds the post sequence");

        hier.ungroup(gid);
        // The pre sequence's successor set names the diamond entry again
        // (plus the bypasses), and post's pred set names the diamond exit.
        let pre = hier.seq(g_preds[0]);
        assert!(pre.succs.iter().all(|&s| !hier.is_live_group(s)));
        let mut pre_succs = pre.succs.clone();
        pre_succs.sort_unstable();
        assert_eq!(pre_succs, pre.orig_succs);
        let post = hier.seq(g_succs[0]);
        let mut post_preds = post.preds.clone();
        post_preds.sort_unstable();
        assert_eq!(post_preds, post.orig_preds);
    }
}
