//! Sector arena and the directed, lockable edges between sectors.
//!
//! Sectors are indexed by their dense id. Edges live on their source sector,
//! keyed by the neighbour id, so there is at most one edge per ordered pair
//! and the reverse direction is an independent edge.

use std::collections::HashMap;

use log::{debug, warn};
use serde::Serialize;

use crate::constants::DEFAULT_EDGE_WEIGHT;
use crate::layout::GridLayout;
use crate::types::{Cell, KeyType, SectorId, WorldPos};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectorEdge {
    pub from: SectorId,
    pub to: SectorId,
    pub weight: f32,
    pub locked: bool,
    #[serde(rename = "requiredKey")]
    pub required_key: Option<KeyType>,
}

#[derive(Clone, Debug)]
pub struct Sector {
    id: SectorId,
    cells: Vec<Cell>,
    center: WorldPos,
    blocked: bool,
    edges: HashMap<SectorId, SectorEdge>,
}

impl Sector {
    pub fn id(&self) -> SectorId {
        self.id
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn center(&self) -> WorldPos {
        self.center
    }

    pub fn blocked(&self) -> bool {
        self.blocked
    }

    pub fn contains_cell(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    /// Outgoing edges in unspecified order.
    pub fn edges(&self) -> impl Iterator<Item = &SectorEdge> + '_ {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SectorGraph {
    sectors: Vec<Sector>,
    cell_index: HashMap<Cell, SectorId>,
}

impl SectorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sector and returns its id, which is always the previous length.
    pub fn add_sector(&mut self, cells: Vec<Cell>, center: WorldPos) -> SectorId {
        let id = self.sectors.len();
        for cell in &cells {
            self.cell_index.insert(*cell, id);
        }
        self.sectors.push(Sector {
            id,
            cells,
            center,
            blocked: false,
            edges: HashMap::new(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn contains(&self, id: SectorId) -> bool {
        id < self.sectors.len()
    }

    pub fn sector(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(id)
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn sector_by_cell(&self, cell: Cell) -> Option<SectorId> {
        self.cell_index.get(&cell).copied()
    }

    pub fn add_edge(&mut self, from: SectorId, to: SectorId) {
        self.add_or_update_edge(from, to, DEFAULT_EDGE_WEIGHT, false, None);
    }

    /// Inserts or overwrites the edge `from -> to`. Last write wins.
    ///
    /// The target id is not validated; traversal skips targets that are not in
    /// the graph. A missing source sector makes this a no-op.
    pub fn add_or_update_edge(
        &mut self,
        from: SectorId,
        to: SectorId,
        weight: f32,
        locked: bool,
        required_key: Option<KeyType>,
    ) {
        let Some(sector) = self.sectors.get_mut(from) else {
            warn!("add_or_update_edge ignored: unknown source sector {from} (to {to})");
            return;
        };
        sector.edges.insert(
            to,
            SectorEdge {
                from,
                to,
                weight,
                locked,
                required_key,
            },
        );
    }

    pub fn remove_edge(&mut self, from: SectorId, to: SectorId) -> bool {
        self.sectors
            .get_mut(from)
            .map(|sector| sector.edges.remove(&to).is_some())
            .unwrap_or(false)
    }

    pub fn try_get_edge(&self, from: SectorId, to: SectorId) -> Option<&SectorEdge> {
        self.sectors.get(from)?.edges.get(&to)
    }

    /// Outgoing neighbour ids in unspecified order; empty for an unknown id.
    pub fn neighbors(&self, id: SectorId) -> impl Iterator<Item = SectorId> + '_ {
        self.sectors
            .get(id)
            .into_iter()
            .flat_map(|sector| sector.edges.keys().copied())
    }

    pub fn are_neighbors(&self, a: SectorId, b: SectorId) -> bool {
        self.contains(b) && self.try_get_edge(a, b).is_some()
    }

    /// A missing edge or sector counts as locked.
    pub fn is_edge_locked(&self, from: SectorId, to: SectorId) -> bool {
        self.try_get_edge(from, to)
            .map(|edge| edge.locked)
            .unwrap_or(true)
    }

    /// An unknown sector counts as blocked.
    pub fn is_blocked(&self, id: SectorId) -> bool {
        self.sectors
            .get(id)
            .map(|sector| sector.blocked)
            .unwrap_or(true)
    }

    pub fn set_blocked(&mut self, id: SectorId, blocked: bool) {
        match self.sectors.get_mut(id) {
            Some(sector) => sector.blocked = blocked,
            None => warn!("set_blocked ignored: unknown sector {id}"),
        }
    }

    /// Recomputes a sector's center as the centroid of its cells.
    pub fn recompute_center(&mut self, id: SectorId, layout: &GridLayout) {
        if let Some(sector) = self.sectors.get_mut(id) {
            if sector.cells.is_empty() {
                return;
            }
            sector.center = layout.centroid(&sector.cells);
        }
    }

    /// Adds the link in both directions when absent, removes both when present.
    ///
    /// Returns whether `a -> b` exists afterwards.
    pub fn toggle_link(&mut self, a: SectorId, b: SectorId) -> bool {
        if a == b || !self.contains(a) || !self.contains(b) {
            return false;
        }
        if self.are_neighbors(a, b) {
            self.remove_edge(a, b);
            self.remove_edge(b, a);
            false
        } else {
            self.add_edge(a, b);
            self.add_edge(b, a);
            true
        }
    }

    /// Locks both directions behind `key`, or unlocks them when `key` is `None`.
    /// Existing weights are kept.
    pub fn set_link_lock(&mut self, a: SectorId, b: SectorId, key: Option<KeyType>) {
        let locked = key.is_some();
        for (from, to) in [(a, b), (b, a)] {
            let weight = self
                .try_get_edge(from, to)
                .map(|edge| edge.weight)
                .unwrap_or(DEFAULT_EDGE_WEIGHT);
            self.add_or_update_edge(from, to, weight, locked, key);
        }
    }

    /// Unlocks every locked edge that requires `key` and returns the changed
    /// edges in ascending `(from, to)` order. The key tag stays on the edge.
    pub fn unlock_edges_with_key(&mut self, key: KeyType) -> Vec<(SectorId, SectorId)> {
        let mut changed = Vec::new();
        for sector in &mut self.sectors {
            for edge in sector.edges.values_mut() {
                if edge.locked && edge.required_key == Some(key) {
                    edge.locked = false;
                    changed.push((edge.from, edge.to));
                }
            }
        }
        changed.sort_unstable();
        debug!("unlocked {} edge(s) requiring {}", changed.len(), key.as_str());
        changed
    }

    pub fn locked_edge_count(&self) -> usize {
        self.sectors
            .iter()
            .flat_map(|sector| sector.edges.values())
            .filter(|edge| edge.locked)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_sectors() -> SectorGraph {
        let mut graph = SectorGraph::new();
        for x in 0..3 {
            graph.add_sector(vec![Cell::new(x, 0)], WorldPos::new(x as f32 + 0.5, 0.5));
        }
        graph
    }

    #[test]
    fn sector_ids_are_dense_in_insertion_order() {
        let graph = three_sectors();
        assert_eq!(graph.len(), 3);
        for (idx, sector) in graph.sectors().iter().enumerate() {
            assert_eq!(sector.id(), idx);
        }
        assert_eq!(graph.sector_by_cell(Cell::new(2, 0)), Some(2));
        assert_eq!(graph.sector_by_cell(Cell::new(9, 9)), None);
    }

    #[test]
    fn add_or_update_edge_last_write_wins() {
        let mut graph = three_sectors();
        graph.add_or_update_edge(0, 1, 1.0, false, None);
        graph.add_or_update_edge(0, 1, 3.5, true, Some(KeyType::Red));

        let edge = graph.try_get_edge(0, 1).unwrap();
        assert_eq!(edge.weight, 3.5);
        assert!(edge.locked);
        assert_eq!(edge.required_key, Some(KeyType::Red));
        assert_eq!(graph.sector(0).unwrap().edge_count(), 1);
    }

    #[test]
    fn edges_are_directed_and_independent() {
        let mut graph = three_sectors();
        graph.add_edge(0, 1);
        assert!(graph.try_get_edge(0, 1).is_some());
        assert!(graph.try_get_edge(1, 0).is_none());

        graph.add_or_update_edge(1, 0, 1.0, true, Some(KeyType::Blue));
        graph.remove_edge(0, 1);
        assert!(graph.try_get_edge(0, 1).is_none());
        assert!(graph.try_get_edge(1, 0).unwrap().locked);
    }

    #[test]
    fn remove_missing_edge_is_noop() {
        let mut graph = three_sectors();
        assert!(!graph.remove_edge(0, 2));
        assert!(!graph.remove_edge(42, 0));
    }

    #[test]
    fn unknown_ids_are_absent_not_errors() {
        let mut graph = three_sectors();
        graph.add_edge(99, 0);
        assert_eq!(graph.neighbors(99).count(), 0);
        assert!(graph.try_get_edge(99, 0).is_none());
        assert!(graph.is_blocked(99));
        assert!(graph.is_edge_locked(99, 0));
    }

    #[test]
    fn neighbors_lists_outgoing_keys() {
        let mut graph = three_sectors();
        graph.add_edge(1, 2);
        graph.add_edge(1, 0);
        let mut neighbors: Vec<_> = graph.neighbors(1).collect();
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![0, 2]);
    }

    #[test]
    fn toggle_link_adds_then_removes_both_directions() {
        let mut graph = three_sectors();
        assert!(graph.toggle_link(0, 2));
        assert!(graph.are_neighbors(0, 2));
        assert!(graph.are_neighbors(2, 0));

        assert!(!graph.toggle_link(2, 0));
        assert!(!graph.are_neighbors(0, 2));
        assert!(!graph.are_neighbors(2, 0));

        assert!(!graph.toggle_link(1, 1));
        assert!(!graph.toggle_link(1, 7));
    }

    #[test]
    fn set_link_lock_keeps_weight() {
        let mut graph = three_sectors();
        graph.add_or_update_edge(0, 1, 2.0, false, None);
        graph.set_link_lock(0, 1, Some(KeyType::Yellow));

        let forward = graph.try_get_edge(0, 1).unwrap();
        assert_eq!(forward.weight, 2.0);
        assert!(forward.locked);
        let backward = graph.try_get_edge(1, 0).unwrap();
        assert_eq!(backward.weight, DEFAULT_EDGE_WEIGHT);
        assert_eq!(backward.required_key, Some(KeyType::Yellow));

        graph.set_link_lock(0, 1, None);
        assert!(!graph.is_edge_locked(0, 1));
        assert!(!graph.is_edge_locked(1, 0));
    }

    #[test]
    fn unlock_edges_with_key_only_touches_matching_locks() {
        let mut graph = three_sectors();
        graph.add_or_update_edge(0, 1, 1.0, true, Some(KeyType::Red));
        graph.add_or_update_edge(1, 2, 1.0, true, Some(KeyType::Red));
        graph.add_or_update_edge(2, 1, 1.0, true, Some(KeyType::Blue));

        let changed = graph.unlock_edges_with_key(KeyType::Red);
        assert_eq!(changed, vec![(0, 1), (1, 2)]);
        assert!(!graph.is_edge_locked(0, 1));
        assert_eq!(
            graph.try_get_edge(0, 1).unwrap().required_key,
            Some(KeyType::Red)
        );
        assert!(graph.is_edge_locked(2, 1));
        assert_eq!(graph.locked_edge_count(), 1);

        assert!(graph.unlock_edges_with_key(KeyType::Red).is_empty());
    }

    #[test]
    fn recompute_center_uses_layout_centroid() {
        let mut graph = SectorGraph::new();
        let id = graph.add_sector(vec![Cell::new(0, 0), Cell::new(0, 2)], WorldPos::ORIGIN);
        graph.recompute_center(id, &GridLayout::default());
        assert_eq!(graph.sector(id).unwrap().center(), WorldPos::new(0.5, 1.5));
    }

    #[test]
    fn blocked_flag_is_independent_of_edges() {
        let mut graph = three_sectors();
        graph.add_edge(0, 1);
        graph.set_blocked(1, true);
        assert!(graph.is_blocked(1));
        assert!(!graph.is_edge_locked(0, 1));
    }
}
