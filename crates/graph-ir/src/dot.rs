// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graphviz DOT export.
//!
//! Renders a validated graph — optionally annotated with a schedule — to DOT
//! text. Ops appear as boxes labelled `position:type` when a schedule is
//! given (`name:type` otherwise); graph inputs and outputs appear as
//! ellipses. Writing the text to a file or invoking `dot` is the caller's
//! concern.

use crate::graph::Validated;
use crate::{Graph, OpId};
use std::fmt::Write;

/// Renders the graph to DOT. `schedule`, when given, must be a permutation
/// of the op ids; each op label is then prefixed with its position.
pub fn render(graph: &Graph<Validated>, schedule: Option<&[OpId]>) -> String {
    let mut position = vec![None; graph.num_ops()];
    if let Some(order) = schedule {
        for (i, &op) in order.iter().enumerate() {
            position[op] = Some(i);
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", graph.name);
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(out, "  node [fontsize=10];");

    // Boundary values as ellipses.
    for &v in graph.inputs.iter().chain(graph.outputs.iter()) {
        let val = graph.value(v);
        let _ = writeln!(out, "  \"v{v}\" [shape=ellipse, label=\"{}\"];", val.name);
    }

    // Ops as boxes.
    for op in &graph.ops {
        let label = match position[op.index] {
            Some(i) => format!("{i}:{}", op.kind),
            None => format!("{}:{}", op.name, op.kind),
        };
        let _ = writeln!(out, "  \"op{}\" [shape=box, label=\"{label}\"];", op.index);
    }

    // Dependency edges between ops.
    for op in &graph.ops {
        for &pred in &op.preds {
            let _ = writeln!(out, "  \"op{pred}\" -> \"op{}\";", op.index);
        }
    }

    // Boundary edges.
    for &v in &graph.inputs {
        for &succ in &graph.value(v).uses {
            let _ = writeln!(out, "  \"v{v}\" -> \"op{succ}\";");
        }
    }
    for &v in &graph.outputs {
        if let Some(def) = graph.value(v).def {
            let _ = writeln!(out, "  \"op{def}\" -> \"v{v}\";");
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GraphBuilder, OpKind, ValueKind};
    use tensor_core::{DType, Shape};

    fn tiny() -> Graph<Validated> {
        let mut b = GraphBuilder::new("tiny");
        let sh = Shape::vector(4);
        let i = b.value("in", ValueKind::Input, DType::F32, sh.clone()).unwrap();
        let t = b.value("t", ValueKind::Intermediate, DType::F32, sh.clone()).unwrap();
        let o = b.value("out", ValueKind::Output, DType::F32, sh).unwrap();
        b.op("a", OpKind::Relu, &[i], &[t]);
        b.op("b", OpKind::Softmax, &[t], &[o]);
        b.build().unwrap()
    }

    #[test]
    fn test_render_unscheduled() {
        let dot = render(&tiny(), None);
        assert!(dot.starts_with("digraph \"tiny\""));
        assert!(dot.contains("a:relu"));
        assert!(dot.contains("\"op0\" -> \"op1\""));
        assert!(dot.contains("\"v0\" -> \"op0\""));
        assert!(dot.contains("\"op1\" -> \"v2\""));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_render_with_schedule() {
        let dot = render(&tiny(), Some(&[0, 1]));
        assert!(dot.contains("label=\"0:relu\""));
        assert!(dot.contains("label=\"1:softmax\""));
    }
}
