//! Per-sector standing slots so units sharing a sector do not overlap.
//!
//! Slot positions are picked once per sector from cells near its center and
//! cached. Assignment scans slot indices in order and takes the first free one;
//! when every slot is taken the sector center is handed out without recording
//! an assignment.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::constants::{
    MIN_SLOT_DISTANCE, SLOTS_PER_SECTOR, SLOT_CORE_PERCENT, SLOT_CORE_PERCENT_MAX,
    SLOT_CORE_PERCENT_MIN, SLOT_PICK_STEP,
};
use crate::graph::{Sector, SectorGraph};
use crate::layout::GridLayout;
use crate::types::{Cell, SectorId, UnitId, WorldPos};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    #[serde(rename = "slotsPerSector")]
    pub slots_per_sector: usize,
    /// Share of the center-ranked cells that slots may be picked from.
    #[serde(rename = "corePercent")]
    pub core_percent: f32,
    #[serde(rename = "pickStep")]
    pub pick_step: usize,
    #[serde(rename = "minSlotDistance")]
    pub min_slot_distance: f32,
    pub layout: GridLayout,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            slots_per_sector: SLOTS_PER_SECTOR,
            core_percent: SLOT_CORE_PERCENT,
            pick_step: SLOT_PICK_STEP,
            min_slot_distance: MIN_SLOT_DISTANCE,
            layout: GridLayout::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SlotAllocator {
    config: SlotConfig,
    slot_cache: HashMap<SectorId, Vec<WorldPos>>,
    assignments: HashMap<SectorId, BTreeMap<UnitId, usize>>,
}

impl SlotAllocator {
    pub fn new(config: SlotConfig) -> Self {
        Self {
            config,
            slot_cache: HashMap::new(),
            assignments: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// Position for `unit` in `sector_id`, assigning the first free slot.
    ///
    /// Idempotent while the unit holds a slot. Falls back to the sector center
    /// when all slots are taken, and to the world origin for an unknown sector.
    pub fn reserve(&mut self, graph: &SectorGraph, sector_id: SectorId, unit: UnitId) -> WorldPos {
        let Some(sector) = graph.sector(sector_id) else {
            warn!("reserve ignored: unknown sector {sector_id} for unit {unit}");
            return WorldPos::ORIGIN;
        };
        let config = &self.config;
        let slots = self
            .slot_cache
            .entry(sector_id)
            .or_insert_with(|| build_slots(sector, config));
        let assigned = self.assignments.entry(sector_id).or_default();

        if let Some(&existing) = assigned.get(&unit) {
            return slots[existing.min(slots.len() - 1)];
        }

        let taken: HashSet<usize> = assigned.values().copied().collect();
        match (0..slots.len()).find(|idx| !taken.contains(idx)) {
            Some(idx) => {
                assigned.insert(unit, idx);
                slots[idx]
            }
            None => {
                debug!(
                    "sector {sector_id} slots exhausted ({}), unit {unit} placed at center",
                    slots.len()
                );
                sector.center()
            }
        }
    }

    pub fn release(&mut self, sector_id: SectorId, unit: UnitId) -> bool {
        let Some(assigned) = self.assignments.get_mut(&sector_id) else {
            return false;
        };
        let removed = assigned.remove(&unit).is_some();
        if assigned.is_empty() {
            self.assignments.remove(&sector_id);
        }
        removed
    }

    /// Releases the slot held in `from` (if any) and reserves one in `to`.
    pub fn move_unit(
        &mut self,
        graph: &SectorGraph,
        unit: UnitId,
        from: Option<SectorId>,
        to: SectorId,
    ) -> WorldPos {
        if let Some(from) = from {
            self.release(from, unit);
        }
        self.reserve(graph, to, unit)
    }

    /// Drops every slot `unit` holds; returns how many were released.
    pub fn release_everywhere(&mut self, unit: UnitId) -> usize {
        let mut released = 0;
        self.assignments.retain(|_, assigned| {
            if assigned.remove(&unit).is_some() {
                released += 1;
            }
            !assigned.is_empty()
        });
        released
    }

    pub fn assigned_position_or_center(
        &mut self,
        graph: &SectorGraph,
        sector_id: SectorId,
        unit: UnitId,
    ) -> WorldPos {
        let Some(sector) = graph.sector(sector_id) else {
            return WorldPos::ORIGIN;
        };
        let config = &self.config;
        let slots = self
            .slot_cache
            .entry(sector_id)
            .or_insert_with(|| build_slots(sector, config));
        self.assignments
            .get(&sector_id)
            .and_then(|assigned| assigned.get(&unit))
            .and_then(|idx| slots.get(*idx).copied())
            .unwrap_or_else(|| sector.center())
    }

    pub fn assigned_slot(&self, sector_id: SectorId, unit: UnitId) -> Option<usize> {
        self.assignments.get(&sector_id)?.get(&unit).copied()
    }

    /// `(unit, slot index)` pairs in ascending unit order.
    pub fn occupants(&self, sector_id: SectorId) -> Vec<(UnitId, usize)> {
        self.assignments
            .get(&sector_id)
            .map(|assigned| assigned.iter().map(|(u, i)| (*u, *i)).collect())
            .unwrap_or_default()
    }

    /// Slot positions of a sector, building them on first use.
    pub fn slot_positions(&mut self, graph: &SectorGraph, sector_id: SectorId) -> &[WorldPos] {
        let Some(sector) = graph.sector(sector_id) else {
            return &[];
        };
        let config = &self.config;
        self.slot_cache
            .entry(sector_id)
            .or_insert_with(|| build_slots(sector, config))
    }

    /// Forgets the cached positions of a sector whose geometry changed.
    /// Assignments are kept and clamped to the rebuilt slot list.
    pub fn invalidate(&mut self, sector_id: SectorId) {
        self.slot_cache.remove(&sector_id);
    }

    pub fn is_built(&self, sector_id: SectorId) -> bool {
        self.slot_cache.contains_key(&sector_id)
    }
}

fn build_slots(sector: &Sector, config: &SlotConfig) -> Vec<WorldPos> {
    let target = config.slots_per_sector.max(1);
    let center = sector.center();
    if sector.cells().is_empty() {
        return vec![center];
    }

    let mut ranked: Vec<(Cell, f32, WorldPos)> = sector
        .cells()
        .iter()
        .map(|cell| {
            let world = config.layout.cell_center(*cell);
            (*cell, world.distance(center), world)
        })
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let total = ranked.len();
    let core_percent = config
        .core_percent
        .clamp(SLOT_CORE_PERCENT_MIN, SLOT_CORE_PERCENT_MAX);
    let min_core = total.min(target * 2);
    let core_count = ((total as f32 * core_percent).ceil() as usize)
        .max(min_core)
        .max(1);

    let mut result: Vec<WorldPos> = Vec::with_capacity(target);
    let mut used: HashSet<Cell> = HashSet::new();
    let mut try_add = |idx: usize, result: &mut Vec<WorldPos>| {
        let (cell, _, world) = ranked[idx];
        if !used.insert(cell) {
            return;
        }
        if result
            .iter()
            .any(|slot| slot.distance(world) < config.min_slot_distance)
        {
            return;
        }
        result.push(world);
    };

    try_add(0, &mut result);

    let step = config.pick_step.max(1);
    let mut idx = step;
    while result.len() < target && idx < core_count {
        try_add(idx, &mut result);
        idx += step;
    }

    let mut idx = 0;
    while result.len() < target && idx < core_count {
        try_add(idx, &mut result);
        idx += 1;
    }

    if result.is_empty() {
        result.push(center);
    }
    result
}
