//! Hop-count BFS and isochrones over a [`SectorGraph`].
//!
//! Every query is a fresh search over the current graph. Admissibility is
//! injected per call: `can_enter(id)` gates the destination of each step and
//! `can_traverse(from, to)` gates the edge itself. Neither is consulted for the
//! start sector. Edge weights are not summed; one edge is one step.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::graph::SectorGraph;
use crate::types::SectorId;

/// Distances and parent pointers for every sector within a step budget.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Isochrone {
    pub start: Option<SectorId>,
    pub distances: HashMap<SectorId, u32>,
    pub parents: HashMap<SectorId, SectorId>,
}

impl Isochrone {
    pub fn contains(&self, id: SectorId) -> bool {
        self.distances.contains_key(&id)
    }

    pub fn distance(&self, id: SectorId) -> Option<u32> {
        self.distances.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Route from the start to `id` following parent pointers.
    pub fn path_to(&self, id: SectorId) -> Option<Vec<SectorId>> {
        let start = self.start?;
        if !self.contains(id) {
            return None;
        }
        Some(reconstruct(&self.parents, start, id))
    }

    /// Reached sectors in ascending id order.
    pub fn sectors(&self) -> Vec<SectorId> {
        let mut out: Vec<SectorId> = self.distances.keys().copied().collect();
        out.sort_unstable();
        out
    }
}

pub struct PathFinder<'g> {
    graph: &'g SectorGraph,
    deterministic: bool,
}

impl<'g> PathFinder<'g> {
    /// Pathfinder that expands neighbours in ascending id order.
    pub fn new(graph: &'g SectorGraph) -> Self {
        Self::with_order(graph, true)
    }

    pub fn with_order(graph: &'g SectorGraph, deterministic: bool) -> Self {
        Self {
            graph,
            deterministic,
        }
    }

    pub fn try_find_path(&self, start: SectorId, goal: SectorId) -> Option<Vec<SectorId>> {
        self.try_find_path_with(start, goal, |_| true, |_, _| true)
    }

    /// Shortest path by hop count from `start` to `goal`, both included.
    ///
    /// `start == goal` succeeds with `[start]` without consulting either
    /// predicate. Unknown endpoints and unreachable goals return `None`.
    pub fn try_find_path_with<E, T>(
        &self,
        start: SectorId,
        goal: SectorId,
        can_enter: E,
        can_traverse: T,
    ) -> Option<Vec<SectorId>>
    where
        E: Fn(SectorId) -> bool,
        T: Fn(SectorId, SectorId) -> bool,
    {
        if start == goal {
            return Some(vec![start]);
        }
        if !self.graph.contains(start) || !self.graph.contains(goal) {
            return None;
        }

        let mut visited = HashSet::from([start]);
        let mut parents: HashMap<SectorId, SectorId> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut neighbors = Vec::with_capacity(8);

        while let Some(current) = queue.pop_front() {
            self.collect_neighbors(current, &mut neighbors);
            for &next in &neighbors {
                if visited.contains(&next)
                    || !self.graph.contains(next)
                    || !can_traverse(current, next)
                    || !can_enter(next)
                {
                    continue;
                }
                visited.insert(next);
                parents.insert(next, current);
                if next == goal {
                    let path = reconstruct(&parents, start, goal);
                    debug!(
                        "path {start} -> {goal}: {} hop(s), {} visited",
                        path.len() - 1,
                        visited.len()
                    );
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        debug!("path {start} -> {goal}: unreachable, {} visited", visited.len());
        None
    }

    pub fn build_isochrone(&self, start: SectorId, max_steps: u32) -> Isochrone {
        self.build_isochrone_with(start, max_steps, |_| true, |_, _| true)
    }

    /// Every sector reachable from `start` within `max_steps` hops.
    ///
    /// Sectors at exactly `max_steps` are included but not expanded. An
    /// unknown start yields an empty isochrone.
    pub fn build_isochrone_with<E, T>(
        &self,
        start: SectorId,
        max_steps: u32,
        can_enter: E,
        can_traverse: T,
    ) -> Isochrone
    where
        E: Fn(SectorId) -> bool,
        T: Fn(SectorId, SectorId) -> bool,
    {
        let mut isochrone = Isochrone::default();
        if !self.graph.contains(start) {
            return isochrone;
        }

        isochrone.start = Some(start);
        isochrone.distances.insert(start, 0);
        let mut queue = VecDeque::from([start]);
        let mut neighbors = Vec::with_capacity(8);

        while let Some(current) = queue.pop_front() {
            let distance = isochrone.distances[&current];
            if distance >= max_steps {
                continue;
            }
            self.collect_neighbors(current, &mut neighbors);
            for &next in &neighbors {
                if isochrone.distances.contains_key(&next)
                    || !self.graph.contains(next)
                    || !can_traverse(current, next)
                    || !can_enter(next)
                {
                    continue;
                }
                isochrone.distances.insert(next, distance + 1);
                isochrone.parents.insert(next, current);
                queue.push_back(next);
            }
        }

        isochrone
    }

    /// Sum of edge weights along `path`, or `None` if a hop has no edge.
    pub fn path_weight(&self, path: &[SectorId]) -> Option<f32> {
        path.windows(2).try_fold(0.0f32, |total, hop| {
            self.graph
                .try_get_edge(hop[0], hop[1])
                .map(|edge| total + edge.weight)
        })
    }

    fn collect_neighbors(&self, id: SectorId, out: &mut Vec<SectorId>) {
        out.clear();
        out.extend(self.graph.neighbors(id));
        if self.deterministic {
            out.sort_unstable();
        }
    }
}

/// Edge predicate for movement and vision: the edge must be unlocked and its
/// destination not blocked.
pub fn lock_aware(graph: &SectorGraph) -> impl Fn(SectorId, SectorId) -> bool + '_ {
    move |from, to| !graph.is_edge_locked(from, to) && !graph.is_blocked(to)
}

fn reconstruct(
    parents: &HashMap<SectorId, SectorId>,
    start: SectorId,
    goal: SectorId,
) -> Vec<SectorId> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match parents.get(&current) {
            Some(&parent) => {
                path.push(parent);
                current = parent;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
