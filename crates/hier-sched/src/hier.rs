// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The hierarchical graph: sequences and groups over the flat op graph.
//!
//! # Vertex arena
//!
//! Hierarchical vertices live in a single arena indexed by [`VertId`]
//! (construction order, stable for the run). Groups own their member
//! sequences *by id*; the sequence→group back-link is a nullable handle that
//! [`HierGraph::ungroup`] clears. This sidesteps the cyclic-ownership
//! problem the two-level structure would otherwise have.
//!
//! # Original edges
//!
//! Every sequence carries two edge sets: the *current* `preds`/`succs`,
//! which group construction and dissolution mutate, and the *original*
//! `orig_preds`/`orig_succs`, frozen right after sequence joining. Ungroup
//! consults the originals to restore precise cross-boundary edges no matter
//! how many neighboring groups have come and gone since.

use graph_ir::{OpId, ValueId};
use std::collections::BTreeMap;

/// Index of a vertex in the hierarchy arena.
pub type VertId = usize;

/// A maximal branch-free chain of ops, collapsed into one vertex.
///
/// The internal op order is fixed at construction; scheduling a sequence
/// can only ever emit `ops` as-is.
#[derive(Debug, Clone)]
pub struct Sequence {
    /// This vertex's arena id.
    pub id: VertId,
    /// Member ops, in dependency order.
    pub ops: Vec<OpId>,
    /// Current hierarchical predecessors.
    pub preds: Vec<VertId>,
    /// Current hierarchical successors.
    pub succs: Vec<VertId>,
    /// Predecessors as of hierarchy construction (immutable).
    pub orig_preds: Vec<VertId>,
    /// Successors as of hierarchy construction (immutable).
    pub orig_succs: Vec<VertId>,
    /// The group owning this sequence, if any.
    pub group: Option<VertId>,
}

/// A single-entry/single-exit-shaped cluster of sequences (a diamond),
/// treated as one DP sub-problem by the scheduler.
#[derive(Debug, Clone)]
pub struct Group {
    /// This vertex's arena id.
    pub id: VertId,
    /// Member sequences.
    pub seqs: Vec<VertId>,
    /// Members with predecessors outside the group.
    pub in_front: Vec<VertId>,
    /// Members with successors outside the group.
    pub out_front: Vec<VertId>,
    /// Outside-defined value → number of use occurrences inside the group.
    /// Sorted by value id; the order defines the kill-vector layout of
    /// [`crate::GroupContext`].
    pub consumed: Vec<(ValueId, u32)>,
    /// Inside-defined value → number of uses outside the group (0 for
    /// values that survive with no consumer, e.g. graph outputs). Sorted by
    /// value id.
    pub produced: Vec<(ValueId, u32)>,
    /// Current hierarchical predecessors.
    pub preds: Vec<VertId>,
    /// Current hierarchical successors.
    pub succs: Vec<VertId>,
    /// Set by [`HierGraph::ungroup`]; a dissolved group is no longer a
    /// top-level vertex.
    pub dissolved: bool,
}

/// A vertex of the hierarchical graph.
#[derive(Debug, Clone)]
pub enum HierVert {
    Seq(Sequence),
    Group(Group),
}

/// The two-level graph the scheduler works on.
#[derive(Debug, Clone)]
pub struct HierGraph {
    /// Graph input values, in declaration order.
    pub inputs: Vec<ValueId>,
    /// Graph output values, in declaration order.
    pub outputs: Vec<ValueId>,
    /// Vertex arena; sequences first (from joining), then groups.
    pub(crate) verts: Vec<HierVert>,
    /// For each op, the sequence containing it.
    pub op_to_seq: Vec<VertId>,
}

impl HierGraph {
    /// Returns the vertex with the given id.
    pub fn vert(&self, id: VertId) -> &HierVert {
        &self.verts[id]
    }

    /// Returns the sequence with the given id, or `None` if the vertex is a
    /// group.
    pub fn try_seq(&self, id: VertId) -> Option<&Sequence> {
        match &self.verts[id] {
            HierVert::Seq(s) => Some(s),
            HierVert::Group(_) => None,
        }
    }

    /// Returns the group with the given id, or `None` if the vertex is a
    /// sequence.
    pub fn try_group(&self, id: VertId) -> Option<&Group> {
        match &self.verts[id] {
            HierVert::Group(g) => Some(g),
            HierVert::Seq(_) => None,
        }
    }

    /// `true` if the vertex is a group that has not been dissolved.
    pub fn is_live_group(&self, id: VertId) -> bool {
        matches!(&self.verts[id], HierVert::Group(g) if !g.dissolved)
    }

    /// Total number of vertices ever created (including dissolved groups).
    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    /// Current predecessors of a vertex.
    pub fn preds_of(&self, id: VertId) -> &[VertId] {
        match &self.verts[id] {
            HierVert::Seq(s) => &s.preds,
            HierVert::Group(g) => &g.preds,
        }
    }

    /// Current successors of a vertex.
    pub fn succs_of(&self, id: VertId) -> &[VertId] {
        match &self.verts[id] {
            HierVert::Seq(s) => &s.succs,
            HierVert::Group(g) => &g.succs,
        }
    }

    /// The vertices the top-level scheduler iterates: ungrouped sequences
    /// and live groups, in id order.
    pub fn top_verts(&self) -> Vec<VertId> {
        self.verts
            .iter()
            .enumerate()
            .filter(|(_, v)| match v {
                HierVert::Seq(s) => s.group.is_none(),
                HierVert::Group(g) => !g.dissolved,
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub(crate) fn seq(&self, id: VertId) -> &Sequence {
        match &self.verts[id] {
            HierVert::Seq(s) => s,
            HierVert::Group(_) => panic!("vertex {id} is not a sequence"),
        }
    }

    pub(crate) fn seq_mut(&mut self, id: VertId) -> &mut Sequence {
        match &mut self.verts[id] {
            HierVert::Seq(s) => s,
            HierVert::Group(_) => panic!("vertex {id} is not a sequence"),
        }
    }

    pub(crate) fn group_mut(&mut self, id: VertId) -> &mut Group {
        match &mut self.verts[id] {
            HierVert::Group(g) => g,
            HierVert::Seq(_) => panic!("vertex {id} is not a group"),
        }
    }

    /// Member sequences of a group in dependency order: a post-order DFS
    /// from the exit frontier along current (intra-group) predecessor
    /// edges, which for a DAG emits every sequence after all of its
    /// predecessors.
    pub fn rpo_seqs_from(&self, exits: &[VertId]) -> Vec<VertId> {
        let mut visited = std::collections::HashSet::new();
        let mut order = Vec::new();
        for &exit in exits {
            if !visited.insert(exit) {
                continue;
            }
            let mut stack: Vec<(VertId, usize)> = vec![(exit, 0)];
            while let Some((vert, child)) = stack.last_mut() {
                let preds = self.preds_of(*vert);
                if *child < preds.len() {
                    let next = preds[*child];
                    *child += 1;
                    if visited.insert(next) {
                        stack.push((next, 0));
                    }
                } else {
                    order.push(*vert);
                    stack.pop();
                }
            }
        }
        order
    }

    /// Dissolves a group: restores edges between its frontier sequences and
    /// its external neighbors, clears the member back-links, and removes
    /// the group from the top level. A no-op on already-dissolved groups
    /// and on sequences, so applying it to a flat graph changes nothing.
    ///
    /// Edge restoration consults the *original* pred/succ lists: an
    /// external sequence neighbor is linked to exactly the frontier
    /// sequences it fed before grouping; an external group neighbor is
    /// linked according to its own frontier members' original edges.
    pub fn ungroup(&mut self, id: VertId) {
        let group = match &self.verts[id] {
            HierVert::Group(g) if !g.dissolved => g.clone(),
            _ => return,
        };

        // Reconnect external predecessors with the input frontier.
        let restore_in = self.edges_to_restore(&group.in_front, &group.preds, Side::In);
        for (front, neighbors) in restore_in {
            for n in neighbors {
                add_unique(&mut self.seq_mut(front).preds, n);
                let succs = self.succs_of_mut(n);
                remove_item(succs, id);
                add_unique(succs, front);
            }
        }

        // Reconnect external successors with the output frontier.
        let restore_out = self.edges_to_restore(&group.out_front, &group.succs, Side::Out);
        for (front, neighbors) in restore_out {
            for n in neighbors {
                add_unique(&mut self.seq_mut(front).succs, n);
                let preds = self.preds_of_mut(n);
                remove_item(preds, id);
                add_unique(preds, front);
            }
        }

        for &s in &group.seqs {
            self.seq_mut(s).group = None;
        }
        self.group_mut(id).dissolved = true;
    }

    /// For each frontier sequence, the external neighbors whose edge to it
    /// must be restored. A neighbor that is itself a group is matched
    /// through its own frontier members' original edges.
    fn edges_to_restore(
        &self,
        frontier: &[VertId],
        neighbors: &[VertId],
        side: Side,
    ) -> BTreeMap<VertId, Vec<VertId>> {
        let mut restore: BTreeMap<VertId, Vec<VertId>> =
            frontier.iter().map(|&f| (f, Vec::new())).collect();

        for &n in neighbors {
            match &self.verts[n] {
                HierVert::Group(ng) => {
                    let n_front = match side {
                        Side::In => &ng.out_front,
                        Side::Out => &ng.in_front,
                    };
                    for &fv in n_front {
                        for &linked in self.original_links(fv, side) {
                            if let Some(list) = restore.get_mut(&linked) {
                                add_unique(list, n);
                            }
                        }
                    }
                }
                HierVert::Seq(_) => {
                    for &linked in self.original_links(n, side) {
                        if let Some(list) = restore.get_mut(&linked) {
                            add_unique(list, n);
                        }
                    }
                }
            }
        }

        restore
    }

    /// The original edges of a sequence pointing *toward* the frontier
    /// being restored: successors when restoring the input side,
    /// predecessors when restoring the output side.
    fn original_links(&self, seq: VertId, side: Side) -> &[VertId] {
        let s = self.seq(seq);
        match side {
            Side::In => &s.orig_succs,
            Side::Out => &s.orig_preds,
        }
    }

    pub(crate) fn preds_of_mut(&mut self, id: VertId) -> &mut Vec<VertId> {
        match &mut self.verts[id] {
            HierVert::Seq(s) => &mut s.preds,
            HierVert::Group(g) => &mut g.preds,
        }
    }

    pub(crate) fn succs_of_mut(&mut self, id: VertId) -> &mut Vec<VertId> {
        match &mut self.verts[id] {
            HierVert::Seq(s) => &mut s.succs,
            HierVert::Group(g) => &mut g.succs,
        }
    }
}

/// Which boundary of a group an edge restoration concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    In,
    Out,
}

pub(crate) fn add_unique(list: &mut Vec<VertId>, item: VertId) {
    if !list.contains(&item) {
        list.push(item);
    }
}

pub(crate) fn remove_item(list: &mut Vec<VertId>, item: VertId) {
    list.retain(|&v| v != item);
}
