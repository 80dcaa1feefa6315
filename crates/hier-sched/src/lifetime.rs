// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Value-lifetime analysis of a complete schedule.
//!
//! Given an op order, [`Lifetime::compute`] replays it with the same
//! kill/overlap accounting the scheduler uses and records, per value, the
//! birth and death steps, and per step, the transient live size. The
//! refinement loop uses this to locate *peak residents* — the values alive
//! at the steps whose live size equals the schedule's peak — and the CLI
//! uses the [`std::fmt::Display`] table for lifetime pretty-printing.
//!
//! Conventions: a value is alive *at* the step that kills it (its storage
//! is still held while that op executes); graph inputs are alive from
//! before step 0; values that are never killed (graph outputs, dead
//! intermediates) survive to the end. Parameters are never tracked.

use graph_ir::{graph::Validated, Graph, OpId, ValueId};
use std::collections::HashMap;
use std::fmt;

/// Birth step of a value that is live at schedule entry (graph inputs).
const BIRTH_ENTRY: i64 = -1;
/// Birth sentinel for values that never become live (parameters).
const NEVER: i64 = i64::MAX;

/// Per-value lifetimes and the per-step size trace of one schedule.
#[derive(Debug, Clone)]
pub struct Lifetime {
    order: Vec<OpId>,
    initial: u64,
    /// Per value: step defining it, [`BIRTH_ENTRY`] for inputs, [`NEVER`]
    /// for untracked values.
    births: Vec<i64>,
    /// Per value: step killing it, `order.len()` when it survives.
    deaths: Vec<i64>,
    /// Per value: byte size (0 for untracked values).
    sizes: Vec<u64>,
    /// Per step: transient live size while the op executes.
    transients: Vec<u64>,
}

impl Lifetime {
    /// Replays `order` over `graph` and computes all lifetimes. The order
    /// must be a topologically valid permutation of the graph's ops.
    pub fn compute(order: &[OpId], graph: &Graph<Validated>) -> Self {
        let end = order.len() as i64;
        let mut births = vec![NEVER; graph.num_values()];
        let mut deaths = vec![end; graph.num_values()];
        let sizes: Vec<u64> = (0..graph.num_values())
            .map(|v| graph.value(v).size_bytes())
            .collect();
        let mut use_cnt: HashMap<ValueId, u32> = HashMap::new();

        let mut initial = 0u64;
        for &val in &graph.inputs {
            use_cnt.insert(val, graph.value(val).uses.len() as u32);
            births[val] = BIRTH_ENTRY;
            initial += graph.value(val).size_bytes();
        }

        let mut transients = Vec::with_capacity(order.len());
        let mut latest = initial;
        for (step, &op_id) in order.iter().enumerate() {
            let op = graph.op(op_id);

            let mut killed: Vec<ValueId> = Vec::new();
            for &val in &op.inputs {
                if graph.value(val).is_param() {
                    continue;
                }
                if let Some(cnt) = use_cnt.get_mut(&val) {
                    *cnt -= 1;
                    if *cnt == 0 {
                        killed.push(val);
                    }
                }
            }

            let mut overlap = graph.overlap_input(op);
            if let Some(idx) = overlap {
                if !killed.contains(&op.inputs[idx]) {
                    overlap = None;
                }
            }

            let inc: u64 = match overlap {
                None => op.outputs.iter().map(|&v| graph.value(v).size_bytes()).sum(),
                Some(_) => 0,
            };
            let overlap_val = overlap.map(|idx| op.inputs[idx]);
            let dec: u64 = killed
                .iter()
                .filter(|&&v| Some(v) != overlap_val)
                .map(|&v| graph.value(v).size_bytes())
                .sum();

            transients.push(latest + inc);
            latest = latest + inc - dec;

            for &val in &killed {
                use_cnt.remove(&val);
                deaths[val] = step as i64;
            }
            for &val in &op.outputs {
                use_cnt.insert(val, graph.value(val).uses.len() as u32);
                births[val] = step as i64;
            }
        }

        Self {
            order: order.to_vec(),
            initial,
            births,
            deaths,
            sizes,
            transients,
        }
    }

    /// The peak live size over the whole schedule.
    pub fn peak(&self) -> u64 {
        self.transients
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .max(self.initial)
    }

    /// The live size before the first op runs (sum of input sizes).
    pub fn initial(&self) -> u64 {
        self.initial
    }

    /// Iterates `(step, transient_live_size)` pairs in schedule order.
    pub fn size_range(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.transients.iter().copied().enumerate()
    }

    /// The values alive while the op at `step` executes.
    pub fn alive_at(&self, step: usize) -> Vec<ValueId> {
        let step = step as i64;
        (0..self.births.len())
            .filter(|&v| self.births[v] != NEVER && self.births[v] <= step && step <= self.deaths[v])
            .collect()
    }

    /// The lifetime `(birth, death)` of a value, or `None` if it is never
    /// live (a parameter). Birth is −1 for graph inputs; death is the
    /// schedule length for surviving values.
    pub fn of(&self, val: ValueId) -> Option<(i64, i64)> {
        if self.births[val] == NEVER {
            None
        } else {
            Some((self.births[val], self.deaths[val]))
        }
    }

    /// Number of scheduled steps.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` for an empty schedule.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Display for Lifetime {
    /// A per-value table of birth, death, and size, in birth order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>6} {:>6} {:>12}  value", "birth", "death", "bytes")?;
        let mut rows: Vec<ValueId> = (0..self.births.len())
            .filter(|&v| self.births[v] != NEVER)
            .collect();
        rows.sort_by_key(|&v| (self.births[v], v));
        for v in rows {
            writeln!(
                f,
                "{:>6} {:>6} {:>12}  #{v}",
                self.births[v], self.deaths[v], self.sizes[v],
            )?;
        }
        Ok(())
    }
}

/// The peak live size of an order without keeping the full analysis.
pub fn estimate_peak(order: &[OpId], graph: &Graph<Validated>) -> u64 {
    Lifetime::compute(order, graph).peak()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{GraphBuilder, OpKind, ValueKind};
    use tensor_core::{DType, Shape};

    fn val(b: &mut GraphBuilder, name: &str, kind: ValueKind, bytes: u64) -> ValueId {
        b.value(name, kind, DType::U8, Shape::vector(bytes)).unwrap()
    }

    /// in(4) → a → t0(4) → b → t1(4) → c → out(4), conv ops.
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

    #[test]
    fn test_chain_peak_two_live_tensors() {
        let g = chain();
        let lt = Lifetime::compute(&[0, 1, 2], &g);
        // At every handoff exactly two 4-byte tensors are live.
        assert_eq!(lt.peak(), 8);
        assert_eq!(lt.size_range().map(|(_, s)| s).collect::<Vec<_>>(), vec![8, 8, 8]);
    }

    #[test]
    fn test_chain_birth_death() {
        let g = chain();
        let lt = Lifetime::compute(&[0, 1, 2], &g);
        assert_eq!(lt.of(0), Some((-1, 0))); // input dies at a
        assert_eq!(lt.of(1), Some((0, 1))); // t0: born at a, dies at b
        assert_eq!(lt.of(2), Some((1, 2))); // t1: born at b, dies at c
        assert_eq!(lt.of(3), Some((2, 3))); // out survives to the end
    }

    #[test]
    fn test_alive_at() {
        let g = chain();
        let lt = Lifetime::compute(&[0, 1, 2], &g);
        assert_eq!(lt.alive_at(0), vec![0, 1]);
        assert_eq!(lt.alive_at(1), vec![1, 2]);
        assert_eq!(lt.alive_at(2), vec![2, 3]);
    }

    #[test]
    fn test_param_never_tracked() {
        let mut b = GraphBuilder::new("weighted");
        let inp = val(&mut b, "in", ValueKind::Input, 4);
        let w = val(&mut b, "w", ValueKind::Param, 64);
        let out = val(&mut b, "out", ValueKind::Output, 4);
        b.op("fc", OpKind::MatMul, &[inp, w], &[out]);
        let g = b.build().unwrap();

        let lt = Lifetime::compute(&[0], &g);
        assert_eq!(lt.of(w), None);
        // Peak counts only the input and output.
        assert_eq!(lt.peak(), 8);
    }

    #[test]
    fn test_overlap_keeps_level_flat() {
        let mut b = GraphBuilder::new("inplace");
        let inp = val(&mut b, "in", ValueKind::Input, 8);
        let t = val(&mut b, "t", ValueKind::Intermediate, 8);
        let out = val(&mut b, "out", ValueKind::Output, 8);
        b.op("p", OpKind::Conv, &[inp], &[t]);
        b.op("r", OpKind::Relu, &[t], &[out]);
        let g = b.build().unwrap();

        let lt = Lifetime::compute(&[0, 1], &g);
        // p holds in+t (16); the relu runs in place, so the level stays 8.
        assert_eq!(lt.size_range().map(|(_, s)| s).collect::<Vec<_>>(), vec![16, 8]);
        assert_eq!(lt.peak(), 16);
    }

    #[test]
    fn test_estimate_peak_matches_lifetime() {
        let g = chain();
        assert_eq!(estimate_peak(&[0, 1, 2], &g), Lifetime::compute(&[0, 1, 2], &g).peak());
    }

    #[test]
    fn test_display_table() {
        let g = chain();
        let lt = Lifetime::compute(&[0, 1, 2], &g);
        let table = format!("{lt}");
        assert!(table.contains("birth"));
        assert!(table.lines().count() >= 5);
    }
}
