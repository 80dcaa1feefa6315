// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The operator graph: a DAG of ops over typed tensor values.
//!
//! # Type-State Pattern
//!
//! The graph transitions through states enforced at compile time:
//!
//! ```text
//! Graph<Loaded>     — ops and values assembled, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated>  — def/use structure checked, links derived,
//!                     acyclicity proven. Ready for scheduling.
//! ```
//!
//! This prevents the scheduler from ever receiving a malformed graph. The
//! transition consumes the old state and returns the new one, so there is
//! zero runtime cost — the marker types are `PhantomData` (ZST).

use crate::op::{OpDef, OpId, OpKind};
use crate::value::{ValueDef, ValueId, ValueKind};
use crate::GraphError;
use std::collections::HashMap;
use std::fmt;
use tensor_core::{DType, Shape};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been assembled but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph has been validated and is ready for scheduling.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── Graph ──────────────────────────────────────────────────────────

/// The complete model as a DAG of operators. The generic parameter `S`
/// encodes the validation state at compile time.
///
/// Ops and values are arena-stored; [`OpId`] and [`ValueId`] are indices
/// into the respective vectors and remain stable for the graph's lifetime.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Loaded> {
    /// Human-readable model name (e.g. `"mobilenet_v2"`).
    pub name: String,
    /// All operators, indexed by [`OpId`], in construction order.
    pub ops: Vec<OpDef>,
    /// All values, indexed by [`ValueId`].
    pub values: Vec<ValueDef>,
    /// Graph input values, in declaration order.
    pub inputs: Vec<ValueId>,
    /// Graph output values, in declaration order.
    pub outputs: Vec<ValueId>,
    /// State marker (zero-sized, compile-time only).
    _state: std::marker::PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl Graph<Loaded> {
    /// Creates a new graph in the `Loaded` state.
    pub fn new(
        name: String,
        ops: Vec<OpDef>,
        values: Vec<ValueDef>,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    ) -> Self {
        Self {
            name,
            ops,
            values,
            inputs,
            outputs,
            _state: std::marker::PhantomData,
        }
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - All op input/output ids and the graph input/output lists are in
    ///   range, and op indices are consecutive.
    /// - Every parameter/input value has no definer; every intermediate/
    ///   output value has exactly one.
    /// - The graph input list is exactly the set of `Input`-kind values
    ///   (dually for outputs).
    /// - The operator graph is acyclic.
    ///
    /// # Derived state
    /// Rebuilds every value's `def`/`uses` from the op lists (one use entry
    /// per input occurrence, in execution order) and every op's
    /// `preds`/`succs` as the projection of value dependencies onto ops
    /// (deduplicated, sorted).
    pub fn validate(mut self) -> Result<Graph<Validated>, GraphError> {
        let num_ops = self.ops.len();
        let num_values = self.values.len();

        // Range and index checks.
        for (i, op) in self.ops.iter().enumerate() {
            if op.index != i {
                return Err(GraphError::InvalidGraph(format!(
                    "op '{}': expected index {i}, got {}",
                    op.name, op.index,
                )));
            }
            for &v in op.inputs.iter().chain(op.outputs.iter()) {
                if v >= num_values {
                    return Err(GraphError::UnknownValue {
                        op: op.name.clone(),
                        value: format!("#{v}"),
                    });
                }
            }
        }
        for &v in self.inputs.iter().chain(self.outputs.iter()) {
            if v >= num_values {
                return Err(GraphError::InvalidGraph(format!(
                    "graph boundary references unknown value #{v}",
                )));
            }
        }

        // Rebuild def/uses from the op lists.
        for val in &mut self.values {
            val.def = None;
            val.uses.clear();
        }
        for op in &self.ops {
            for &out in &op.outputs {
                let val = &mut self.values[out];
                if matches!(val.kind, ValueKind::Param | ValueKind::Input) {
                    return Err(GraphError::InvalidValue {
                        value: val.name.clone(),
                        detail: format!("{} value produced by op '{}'", val.kind, op.name),
                    });
                }
                if val.def.is_some() {
                    return Err(GraphError::DuplicateDefiner {
                        value: val.name.clone(),
                    });
                }
                val.def = Some(op.index);
            }
            for &inp in &op.inputs {
                self.values[inp].uses.push(op.index);
            }
        }
        for val in &self.values {
            if matches!(val.kind, ValueKind::Intermediate | ValueKind::Output)
                && val.def.is_none()
            {
                return Err(GraphError::MissingDefiner {
                    value: val.name.clone(),
                });
            }
            if val.kind == ValueKind::Intermediate && val.uses.is_empty() {
                tracing::warn!("intermediate value '{}' is never consumed", val.name);
            }
        }

        // The boundary lists must agree with value kinds.
        for (list, kind) in [(&self.inputs, ValueKind::Input), (&self.outputs, ValueKind::Output)]
        {
            for &v in list.iter() {
                if self.values[v].kind != kind {
                    return Err(GraphError::InvalidValue {
                        value: self.values[v].name.clone(),
                        detail: format!("listed as graph {kind} but has kind {}", self.values[v].kind),
                    });
                }
            }
            let declared = self.values.iter().filter(|v| v.kind == kind).count();
            if declared != list.len() {
                return Err(GraphError::InvalidGraph(format!(
                    "{declared} values of kind {kind} but {} listed at the graph boundary",
                    list.len(),
                )));
            }
        }

        // Derive op-level preds/succs from value dependencies.
        for i in 0..num_ops {
            let mut preds: Vec<OpId> = self.ops[i]
                .inputs
                .iter()
                .filter_map(|&v| self.values[v].def)
                .collect();
            preds.sort_unstable();
            preds.dedup();
            let mut succs: Vec<OpId> = self.ops[i]
                .outputs
                .iter()
                .flat_map(|&v| self.values[v].uses.iter().copied())
                .collect();
            succs.sort_unstable();
            succs.dedup();
            self.ops[i].preds = preds;
            self.ops[i].succs = succs;
        }

        // Acyclicity (Kahn).
        let mut pending: Vec<usize> = self.ops.iter().map(|op| op.preds.len()).collect();
        let mut ready: Vec<OpId> = (0..num_ops).filter(|&i| pending[i] == 0).collect();
        let mut done = 0;
        while let Some(op) = ready.pop() {
            done += 1;
            for &succ in &self.ops[op].succs {
                pending[succ] -= 1;
                if pending[succ] == 0 {
                    ready.push(succ);
                }
            }
        }
        if done != num_ops {
            let stuck = (0..num_ops)
                .find(|&i| pending[i] > 0)
                .map(|i| self.ops[i].name.clone())
                .unwrap_or_default();
            return Err(GraphError::CyclicGraph { op: stuck });
        }

        Ok(Graph {
            name: self.name,
            ops: self.ops,
            values: self.values,
            inputs: self.inputs,
            outputs: self.outputs,
            _state: std::marker::PhantomData,
        })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    /// Returns the total number of ops.
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Returns the total number of values.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Returns a reference to an op by id.
    pub fn op(&self, id: OpId) -> &OpDef {
        &self.ops[id]
    }

    /// Returns a reference to a value by id.
    pub fn value(&self, id: ValueId) -> &ValueDef {
        &self.values[id]
    }

    /// Queries the in-place execution opportunity for an op: the input
    /// position its output may alias, if any. Pure; dispatched per op kind.
    pub fn overlap_input(&self, op: &OpDef) -> Option<usize> {
        op.kind.semantics().overlap_input(op, &self.values)
    }

    /// Sum of the byte sizes of all graph input values.
    pub fn total_input_bytes(&self) -> u64 {
        self.inputs.iter().map(|&v| self.values[v].size_bytes()).sum()
    }

    /// A deterministic reverse post-order of the ops. For a DAG this is a
    /// valid topological order: every op appears after all its predecessors.
    pub fn reverse_post_order(&self) -> Vec<OpId> {
        let mut visited = vec![false; self.ops.len()];
        let mut post: Vec<OpId> = Vec::with_capacity(self.ops.len());
        for root in 0..self.ops.len() {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            let mut stack: Vec<(OpId, usize)> = vec![(root, 0)];
            while let Some((op, child)) = stack.last_mut() {
                let succs = &self.ops[*op].succs;
                if *child < succs.len() {
                    let next = succs[*child];
                    *child += 1;
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, 0));
                    }
                } else {
                    post.push(*op);
                    stack.pop();
                }
            }
        }
        post.reverse();
        post
    }

    /// Returns a human-readable summary of the graph.
    pub fn summary(&self) -> String {
        let input_kb = self.total_input_bytes() as f64 / 1024.0;
        format!(
            "Graph '{}': {} ops, {} values, {} inputs ({:.1} KB), {} outputs",
            self.name,
            self.ops.len(),
            self.values.len(),
            self.inputs.len(),
            input_kb,
            self.outputs.len(),
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph '{}' ({} ops):", self.name, self.ops.len())?;
        for op in &self.ops {
            writeln!(f, "  {}", op.summary())?;
        }
        Ok(())
    }
}

// ── Builder ────────────────────────────────────────────────────────

/// Incremental graph construction, used by the loader and by tests.
///
/// Values and ops are registered by name; the builder assigns ids in
/// registration order and derives the graph input/output lists from value
/// kinds.
pub struct GraphBuilder {
    name: String,
    values: Vec<ValueDef>,
    ops: Vec<OpDef>,
    by_name: HashMap<String, ValueId>,
}

impl GraphBuilder {
    /// Creates a builder for a graph with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: Vec::new(),
            ops: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registers a value. Names must be unique.
    pub fn value(
        &mut self,
        name: &str,
        kind: ValueKind,
        dtype: DType,
        shape: Shape,
    ) -> Result<ValueId, GraphError> {
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateValue {
                name: name.to_string(),
            });
        }
        let id = self.values.len();
        self.values.push(ValueDef {
            name: name.to_string(),
            kind,
            dtype,
            shape,
            def: None,
            uses: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Registers an op consuming and producing the given values.
    pub fn op(&mut self, name: &str, kind: OpKind, inputs: &[ValueId], outputs: &[ValueId]) -> OpId {
        let index = self.ops.len();
        self.ops.push(OpDef {
            name: name.to_string(),
            kind,
            index,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            preds: Vec::new(),
            succs: Vec::new(),
        });
        index
    }

    /// Looks up a previously registered value by name.
    pub fn lookup(&self, name: &str) -> Option<ValueId> {
        self.by_name.get(name).copied()
    }

    /// Assembles the graph without validating (for tests that need a
    /// malformed graph).
    pub fn finish(self) -> Graph<Loaded> {
        let inputs = ids_of_kind(&self.values, ValueKind::Input);
        let outputs = ids_of_kind(&self.values, ValueKind::Output);
        Graph::new(self.name, self.ops, self.values, inputs, outputs)
    }

    /// Assembles and validates the graph.
    pub fn build(self) -> Result<Graph<Validated>, GraphError> {
        self.finish().validate()
    }
}

fn ids_of_kind(values: &[ValueDef], kind: ValueKind) -> Vec<ValueId> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.kind == kind)
        .map(|(i, _)| i)
        .collect()
}
