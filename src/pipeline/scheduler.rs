use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::foundation::error::{GraphError, GraphResult};

/// Deterministic dependency-count scheduler over pipeline atoms.
///
/// Determinism rule: when several atoms are ready, the smallest atom index is returned first.
#[derive(Clone, Debug)]
pub struct DagScheduler {
    indeg: Vec<u32>,
    dependents: Vec<Vec<usize>>,
    ready: BinaryHeap<Reverse<usize>>,
    remaining: usize,
}

impl DagScheduler {
    /// `edges` are `(upstream, downstream)` atom index pairs. Duplicates count once per pair.
    pub fn new(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut indeg = vec![0u32; n];
        let mut dependents = vec![Vec::<usize>::new(); n];

        for &(from, to) in edges {
            if from >= n || to >= n || dependents[from].contains(&to) {
                continue;
            }
            dependents[from].push(to);
            indeg[to] = indeg[to].saturating_add(1);
        }

        let ready = indeg
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        Self {
            indeg,
            dependents,
            ready,
            remaining: n,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn pop_ready(&mut self) -> Option<usize> {
        let Reverse(id) = self.ready.pop()?;
        Some(id)
    }

    pub fn mark_done(&mut self, done: usize) {
        self.remaining = self.remaining.saturating_sub(1);
        for &dep in &self.dependents[done] {
            let d = &mut self.indeg[dep];
            *d = d.saturating_sub(1);
            if *d == 0 {
                self.ready.push(Reverse(dep));
            }
        }
    }

    /// Drain the schedule into a full order. A leftover atom means the graph has a cycle.
    pub fn into_order(mut self) -> GraphResult<Vec<usize>> {
        let mut out = Vec::with_capacity(self.remaining);
        while let Some(next) = self.pop_ready() {
            out.push(next);
            self.mark_done(next);
        }
        if self.remaining > 0 {
            let stuck: Vec<String> = self
                .indeg
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| i.to_string())
                .collect();
            return Err(GraphError::validation(format!(
                "pipeline graph has a cycle through atoms [{}]",
                stuck.join(", ")
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/scheduler.rs"]
mod tests;
