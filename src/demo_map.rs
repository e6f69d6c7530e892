use std::collections::BTreeSet;

use crate::constants::{
    get_demo_side_by_enemy_count, get_gate_chance, DEFAULT_EDGE_WEIGHT, DEMO_SECTOR_SIZE,
};
use crate::graph::SectorGraph;
use crate::layout::GridLayout;
use crate::map::{EdgeRecord, EnemyPlacement, KeyPlacement, MapDescription, SectorRecord};
use crate::pathfinder::PathFinder;
use crate::rng::Rng;
use crate::types::{Cell, EnemyKind, KeyType, SectorId};

const HERO_START: SectorId = 0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemoMapOptions {
    pub enemy_count: usize,
    /// Sectors per row and column; derived from `enemy_count` when unset.
    pub side: Option<usize>,
    pub layout: GridLayout,
    pub blocked_chance: f32,
    pub strong_enemy_chance: f32,
}

impl Default for DemoMapOptions {
    fn default() -> Self {
        Self {
            enemy_count: 3,
            side: None,
            layout: GridLayout::default(),
            blocked_chance: 0.08,
            strong_enemy_chance: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SectorKind {
    Open,
    Pillared,
    Cramped,
}

/// Square grid of sectors joined to their four neighbours, some links gated
/// behind keys. Keys are placed so that every gate reachable from the hero
/// start can eventually be opened.
pub fn generate_demo_map(options: &DemoMapOptions, seed: u32) -> MapDescription {
    let mut rng = Rng::new(seed);
    let side = options
        .side
        .unwrap_or_else(|| get_demo_side_by_enemy_count(options.enemy_count))
        .max(2);

    let mut sectors = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let id = row * side + col;
            let kind = pick_sector_kind(&mut rng);
            let cells = carve_sector(row, col, kind, &mut rng);
            let blocked = id != HERO_START && rng.bool(options.blocked_chance);
            sectors.push(SectorRecord {
                id,
                center: Some(options.layout.centroid(&cells)),
                cells,
                blocked,
                edges: Vec::new(),
            });
        }
    }

    let gate_chance = get_gate_chance(side);
    for row in 0..side {
        for col in 0..side {
            let id = row * side + col;
            if col < side - 1 {
                connect(&mut sectors, id, id + 1, gate_chance, &mut rng);
            }
            if row < side - 1 {
                connect(&mut sectors, id, id + side, gate_chance, &mut rng);
            }
        }
    }

    let mut map = MapDescription {
        layout: options.layout,
        hero_start: HERO_START,
        sectors,
        keys: Vec::new(),
        enemies: Vec::new(),
    };
    map.keys = place_keys(&map, &mut rng);
    map.enemies = place_enemies(&map, options, &mut rng);
    map
}

fn pick_sector_kind(rng: &mut Rng) -> SectorKind {
    let roll = rng.next_f32();
    if roll < 0.6 {
        SectorKind::Open
    } else if roll < 0.85 {
        SectorKind::Pillared
    } else {
        SectorKind::Cramped
    }
}

fn carve_sector(row: usize, col: usize, kind: SectorKind, rng: &mut Rng) -> Vec<Cell> {
    let size = DEMO_SECTOR_SIZE;
    let x0 = col as i32 * size;
    let y0 = row as i32 * size;
    let mid = size / 2;
    let mut cells = Vec::with_capacity((size * size) as usize);
    for dy in 0..size {
        for dx in 0..size {
            let border = dx == 0 || dy == 0 || dx == size - 1 || dy == size - 1;
            let keep = match kind {
                SectorKind::Open => true,
                SectorKind::Pillared => border || (dx + dy) % 2 == 1,
                // mid row and column stay open so every side keeps a doorway
                SectorKind::Cramped => dx == mid || dy == mid || !rng.bool(0.45),
            };
            if keep {
                cells.push(Cell::new(x0 + dx, y0 + dy));
            }
        }
    }
    cells
}

fn connect(sectors: &mut [SectorRecord], a: SectorId, b: SectorId, gate_chance: f32, rng: &mut Rng) {
    let required_key = if rng.bool(gate_chance) {
        Some(KeyType::ALL[rng.pick_index(KeyType::ALL.len())])
    } else {
        None
    };
    for (from, to) in [(a, b), (b, a)] {
        sectors[from].edges.push(EdgeRecord {
            to,
            weight: DEFAULT_EDGE_WEIGHT,
            locked: required_key.is_some(),
            required_key,
        });
    }
}

fn reachable_with(graph: &SectorGraph, held: &BTreeSet<KeyType>) -> BTreeSet<SectorId> {
    let iso = PathFinder::new(graph).build_isochrone_with(
        HERO_START,
        u32::MAX,
        |id| !graph.is_blocked(id),
        |from, to| match graph.try_get_edge(from, to) {
            Some(edge) if edge.locked => edge
                .required_key
                .map(|key| held.contains(&key))
                .unwrap_or(false),
            Some(_) => true,
            None => false,
        },
    );
    iso.sectors().into_iter().collect()
}

/// Repeatedly finds the lowest key type that opens a gate on the frontier of
/// what is reachable so far and drops it somewhere already reachable.
fn place_keys(map: &MapDescription, rng: &mut Rng) -> Vec<KeyPlacement> {
    let Ok(graph) = map.build_graph() else {
        return Vec::new();
    };
    let mut held = BTreeSet::new();
    let mut placements: Vec<KeyPlacement> = Vec::new();

    loop {
        let reachable = reachable_with(&graph, &held);
        let needed: BTreeSet<KeyType> = reachable
            .iter()
            .flat_map(|&id| graph.sector(id).into_iter().flat_map(|s| s.edges()))
            .filter(|edge| edge.locked && !graph.is_blocked(edge.to) && !reachable.contains(&edge.to))
            .filter_map(|edge| edge.required_key)
            .filter(|key| !held.contains(key))
            .collect();
        let Some(key) = needed.into_iter().next() else {
            break;
        };

        let taken: BTreeSet<SectorId> = placements.iter().map(|p| p.sector_id).collect();
        let mut candidates: Vec<SectorId> = reachable
            .iter()
            .copied()
            .filter(|id| *id != HERO_START && !taken.contains(id))
            .collect();
        if candidates.is_empty() {
            candidates = reachable.iter().copied().collect();
        }
        let sector_id = candidates[rng.pick_index(candidates.len())];
        placements.push(KeyPlacement { sector_id, key });
        held.insert(key);
    }
    placements
}

fn place_enemies(map: &MapDescription, options: &DemoMapOptions, rng: &mut Rng) -> Vec<EnemyPlacement> {
    let mut candidates: Vec<SectorId> = map
        .sectors
        .iter()
        .filter(|s| s.id != map.hero_start && !s.blocked)
        .map(|s| s.id)
        .collect();
    if candidates.is_empty() {
        return Vec::new();
    }
    rng.shuffle(&mut candidates);

    (0..options.enemy_count)
        .map(|idx| {
            let kind = if rng.bool(options.strong_enemy_chance) {
                EnemyKind::Strong
            } else {
                EnemyKind::Basic
            };
            EnemyPlacement {
                sector_id: candidates[idx % candidates.len()],
                kind,
            }
        })
        .collect()
}
