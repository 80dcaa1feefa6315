// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory-state vectors.
//!
//! A [`MemStateVec`] records the live-memory trajectory of a (partial)
//! schedule, one `(transient, stable)` pair per scheduled op:
//!
//! - the *transient* size is reached while the op executes, when its inputs
//!   are still held and its outputs have been allocated;
//! - the *stable* size remains after the op retires and its dead inputs are
//!   released.
//!
//! Levels are **relative to the trajectory's start** and therefore signed: a
//! group trajectory starts at zero but may kill values whose storage the
//! enclosing schedule accounts for, dipping below its own starting level.
//! Composition via [`extend`] shifts the appended trajectory by the current
//! latest stable level, which restores absolute sizes at the top level.
//!
//! Every scheduling candidate needs O(1) delta updates ([`append`]) and
//! O(n) concatenation when gluing per-vertex trajectories ([`extend`]).
//!
//! [`append`]: MemStateVec::append
//! [`extend`]: MemStateVec::extend

/// The live-memory trajectory of a partial schedule.
///
/// Invariants: `peak()` is the maximum over the initial level and all
/// transient entries; `latest()` is the last stable entry (or the initial
/// level while the trace is empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStateVec {
    /// `(transient, stable)` per scheduled op, relative to the start level.
    states: Vec<(i64, i64)>,
    latest: i64,
    peak: i64,
}

impl MemStateVec {
    /// An empty trajectory starting from level zero (the state inside a
    /// group, whose inputs are accounted by the enclosing schedule).
    pub fn new() -> Self {
        Self::with_initial(0)
    }

    /// An empty trajectory starting from `initial` live bytes (at the top
    /// level: the sum of the graph-input tensor sizes).
    pub fn with_initial(initial: u64) -> Self {
        Self {
            states: Vec::new(),
            latest: initial as i64,
            peak: initial as i64,
        }
    }

    /// Extends the trajectory by one op: the live level rises by `inc` to
    /// the transient state, then falls by `dec` to the stable state.
    pub fn append(&mut self, inc: u64, dec: u64) {
        let transient = self.latest + inc as i64;
        let stable = transient - dec as i64;
        self.states.push((transient, stable));
        self.peak = self.peak.max(transient);
        self.latest = stable;
    }

    /// Appends another trajectory, shifted by the current latest stable
    /// level. `other` must start from level zero (group trajectories do).
    pub fn extend(&mut self, other: &MemStateVec) {
        let base = self.latest;
        for &(transient, stable) in &other.states {
            self.states.push((base + transient, base + stable));
            self.peak = self.peak.max(base + transient);
        }
        self.latest = base + other.latest;
    }

    /// The maximum live level seen anywhere in the trajectory.
    pub fn peak(&self) -> i64 {
        self.peak
    }

    /// The stable live level after the last scheduled op.
    pub fn latest(&self) -> i64 {
        self.latest
    }

    /// Number of scheduled steps.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// `true` if no op has been scheduled yet.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterates the `(transient, stable)` pairs in schedule order.
    pub fn steps(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.states.iter().copied()
    }
}
