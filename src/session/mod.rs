use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use crate::constants::{DEFAULT_VISION_RANGE, FIRST_ENEMY_ID, HERO_ID};
use crate::graph::SectorGraph;
use crate::layout::GridLayout;
use crate::map::{MapDescription, MapError};
use crate::pathfinder::{lock_aware, Isochrone, PathFinder};
use crate::slots::{SlotAllocator, SlotConfig};
use crate::types::{
    EnemyKind, KeyOnMap, KeyType, SectorId, SessionEvent, SessionSnapshot, UnitId, UnitRole,
    UnitView, WorldPos,
};

mod enemy_system;
mod key_system;

#[derive(Clone, Debug)]
struct UnitInternal {
    view: UnitView,
    /// Set while an enemy has the hero within vision range.
    tracking: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionOptions {
    pub slots: SlotConfig,
    pub vision_range: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            slots: SlotConfig::default(),
            vision_range: DEFAULT_VISION_RANGE,
        }
    }
}

/// One play session: the sector graph, the slot allocator, the units standing
/// on the graph and the keys lying on it.
///
/// Turns are explicit. [`Session::advance_turn`] moves the hero at most one
/// edge toward its goal, then each enemy in ascending id order at most one
/// edge. Everything that happens is queued as a [`SessionEvent`] until the
/// caller drains it.
#[derive(Clone, Debug)]
pub struct Session {
    graph: SectorGraph,
    slots: SlotAllocator,
    options: SessionOptions,
    units: BTreeMap<UnitId, UnitInternal>,
    keys: Vec<KeyOnMap>,
    inventory: BTreeSet<KeyType>,
    events: Vec<SessionEvent>,
    hero_goal: Option<SectorId>,
    next_enemy_id: UnitId,
    turn: u64,
}

impl Session {
    pub fn new(graph: SectorGraph, options: SessionOptions) -> Self {
        Self {
            graph,
            slots: SlotAllocator::new(options.slots),
            options,
            units: BTreeMap::new(),
            keys: Vec::new(),
            inventory: BTreeSet::new(),
            events: Vec::new(),
            hero_goal: None,
            next_enemy_id: FIRST_ENEMY_ID,
            turn: 0,
        }
    }

    /// Builds the graph from `map`, then drops its keys, hero and enemies on it.
    /// The map layout replaces the layout in `options.slots`.
    pub fn from_map(map: &MapDescription, mut options: SessionOptions) -> Result<Self, MapError> {
        let graph = map.build_graph()?;
        options.slots.layout = map.layout;
        let mut session = Self::new(graph, options);
        for placement in &map.keys {
            session.place_key(placement.sector_id, placement.key);
        }
        session.spawn_hero(map.hero_start);
        for placement in &map.enemies {
            session.spawn_enemy(placement.sector_id, placement.kind);
        }
        Ok(session)
    }

    pub fn graph(&self) -> &SectorGraph {
        &self.graph
    }

    pub fn layout(&self) -> &GridLayout {
        &self.slots.config().layout
    }

    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn hero_goal(&self) -> Option<SectorId> {
        self.hero_goal
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitView> {
        self.units.get(&id).map(|unit| &unit.view)
    }

    pub fn unit_sector(&self, id: UnitId) -> Option<SectorId> {
        self.units.get(&id).map(|unit| unit.view.sector_id)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitView> + '_ {
        self.units.values().map(|unit| &unit.view)
    }

    pub fn spawn_hero(&mut self, sector_id: SectorId) -> Option<WorldPos> {
        if self.units.contains_key(&HERO_ID) {
            warn!("spawn_hero ignored: hero already on sector {:?}", self.unit_sector(HERO_ID));
            return None;
        }
        let view = UnitView {
            id: HERO_ID,
            name: "Hero".to_string(),
            role: UnitRole::Hero,
            sector_id,
            position: WorldPos::ORIGIN,
            vision_range: self.options.vision_range,
        };
        let position = self.spawn(view)?;
        self.collect_keys_at(sector_id);
        Some(position)
    }

    pub fn spawn_enemy(&mut self, sector_id: SectorId, kind: EnemyKind) -> Option<UnitId> {
        let id = self.next_enemy_id;
        let view = UnitView {
            id,
            name: format!("Enemy {id}"),
            role: UnitRole::Enemy { kind },
            sector_id,
            position: WorldPos::ORIGIN,
            vision_range: self.options.vision_range,
        };
        self.spawn(view)?;
        self.next_enemy_id += 1;
        Some(id)
    }

    fn spawn(&mut self, mut view: UnitView) -> Option<WorldPos> {
        if !self.graph.contains(view.sector_id) {
            warn!("spawn of unit {} ignored: unknown sector {}", view.id, view.sector_id);
            return None;
        }
        let position = self.slots.reserve(&self.graph, view.sector_id, view.id);
        view.position = position;
        self.events.push(SessionEvent::UnitSpawned {
            unit_id: view.id,
            sector_id: view.sector_id,
        });
        self.units.insert(
            view.id,
            UnitInternal {
                view,
                tracking: false,
            },
        );
        Some(position)
    }

    /// Removes a unit and frees every slot it held.
    pub fn despawn(&mut self, id: UnitId) -> bool {
        if self.units.remove(&id).is_none() {
            return false;
        }
        self.slots.release_everywhere(id);
        if id == HERO_ID {
            self.hero_goal = None;
        }
        true
    }

    /// Moves a unit across one edge: releases its old slot, reserves one in
    /// `to`, updates its sector and queues `UnitArrived`.
    ///
    /// `to` must be the unit's current sector or one of its out-neighbours.
    /// Lock state is not checked here; callers pick `to` from a lock-aware path.
    pub fn step_unit(&mut self, id: UnitId, to: SectorId) -> Option<WorldPos> {
        let from = self.unit_sector(id)?;
        if from == to {
            return self.unit(id).map(|view| view.position);
        }
        if !self.graph.are_neighbors(from, to) {
            warn!("unit {id} cannot step {from} -> {to}: no edge");
            return None;
        }

        let position = self.slots.move_unit(&self.graph, id, Some(from), to);
        if let Some(unit) = self.units.get_mut(&id) {
            unit.view.sector_id = to;
            unit.view.position = position;
        }
        self.events.push(SessionEvent::UnitArrived {
            unit_id: id,
            sector_id: to,
            position,
        });
        if id == HERO_ID {
            self.collect_keys_at(to);
        }
        Some(position)
    }

    /// Lock-aware shortest path for movement: blocked sectors cannot be
    /// entered and locked edges cannot be crossed.
    pub fn find_path(&self, from: SectorId, to: SectorId) -> Option<Vec<SectorId>> {
        let graph = &self.graph;
        PathFinder::new(graph).try_find_path_with(
            from,
            to,
            |id| !graph.is_blocked(id),
            lock_aware(graph),
        )
    }

    /// Sectors a unit standing on `from` could reach within `max_steps` moves.
    pub fn isochrone(&self, from: SectorId, max_steps: u32) -> Isochrone {
        let graph = &self.graph;
        PathFinder::new(graph).build_isochrone_with(
            from,
            max_steps,
            |id| !graph.is_blocked(id),
            lock_aware(graph),
        )
    }

    /// Sets the hero's destination and returns the current route to it.
    ///
    /// An unreachable goal clears the destination and queues `RouteBlocked`.
    pub fn order_hero_move(&mut self, goal: SectorId) -> Option<Vec<SectorId>> {
        let from = self.unit_sector(HERO_ID)?;
        match self.find_path(from, goal) {
            Some(path) => {
                debug!("hero ordered {from} -> {goal}: {} hop(s)", path.len() - 1);
                self.hero_goal = (path.len() > 1).then_some(goal);
                Some(path)
            }
            None => {
                self.hero_goal = None;
                self.events.push(SessionEvent::RouteBlocked {
                    unit_id: HERO_ID,
                    goal,
                });
                None
            }
        }
    }

    pub fn advance_turn(&mut self) {
        self.turn += 1;
        self.update_hero();
        self.update_enemies();
    }

    fn update_hero(&mut self) {
        let (Some(goal), Some(from)) = (self.hero_goal, self.unit_sector(HERO_ID)) else {
            return;
        };
        // replanned every turn: edges may have been edited or unlocked since the order
        let Some(path) = self.find_path(from, goal) else {
            self.hero_goal = None;
            self.events.push(SessionEvent::RouteBlocked {
                unit_id: HERO_ID,
                goal,
            });
            return;
        };
        if let Some(&next) = path.get(1) {
            self.step_unit(HERO_ID, next);
        }
        if self.unit_sector(HERO_ID) == Some(goal) {
            self.hero_goal = None;
        }
    }

    /// Adds or removes the link between `a` and `b` in both directions.
    pub fn toggle_link(&mut self, a: SectorId, b: SectorId) -> bool {
        let linked = self.graph.toggle_link(a, b);
        self.events.push(SessionEvent::EdgesRebuilt {
            changed: vec![(a, b), (b, a)],
        });
        linked
    }

    /// Locks the link between `a` and `b` behind `key`, or unlocks it for `None`.
    pub fn set_link_lock(&mut self, a: SectorId, b: SectorId, key: Option<KeyType>) {
        if !self.graph.are_neighbors(a, b) && !self.graph.are_neighbors(b, a) {
            warn!("set_link_lock ignored: {a} and {b} are not linked");
            return;
        }
        self.graph.set_link_lock(a, b, key);
        self.events.push(SessionEvent::EdgesRebuilt {
            changed: vec![(a, b), (b, a)],
        });
    }

    pub fn set_sector_blocked(&mut self, id: SectorId, blocked: bool) {
        self.graph.set_blocked(id, blocked);
    }

    /// Re-derives a sector's center from its cells and rebuilds its slots.
    pub fn recompute_center(&mut self, id: SectorId) {
        let layout = self.slots.config().layout;
        self.graph.recompute_center(id, &layout);
        self.slots.invalidate(id);
        let units: Vec<UnitId> = self.slots.occupants(id).into_iter().map(|(u, _)| u).collect();
        for unit_id in units {
            let position = self.slots.assigned_position_or_center(&self.graph, id, unit_id);
            if let Some(unit) = self.units.get_mut(&unit_id) {
                unit.view.position = position;
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&mut self, include_events: bool) -> SessionSnapshot {
        SessionSnapshot {
            turn: self.turn,
            units: self.units().cloned().collect(),
            keys: self.keys.clone(),
            inventory: self.inventory.iter().copied().collect(),
            locked_edges: self.graph.locked_edge_count(),
            events: if include_events {
                self.drain_events()
            } else {
                Vec::new()
            },
        }
    }

    /// Slot conflicts: two units holding the same slot index in one sector, or
    /// a unit holding a slot in a sector it is not standing on.
    pub fn slot_anomalies(&self) -> Vec<String> {
        let mut anomalies = Vec::new();
        for sector in self.graph.sectors() {
            let mut seen = BTreeMap::new();
            for (unit_id, slot) in self.slots.occupants(sector.id()) {
                if let Some(other) = seen.insert(slot, unit_id) {
                    anomalies.push(format!(
                        "sector {} slot {slot} held by units {other} and {unit_id}",
                        sector.id()
                    ));
                }
                if self.unit_sector(unit_id) != Some(sector.id()) {
                    anomalies.push(format!(
                        "unit {unit_id} holds slot {slot} in sector {} but stands on {:?}",
                        sector.id(),
                        self.unit_sector(unit_id)
                    ));
                }
            }
        }
        if !anomalies.is_empty() {
            info!("{} slot anomalies on turn {}", anomalies.len(), self.turn);
        }
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::{FIRST_ENEMY_ID, HERO_ID};
    use crate::graph::SectorGraph;
    use crate::map::MapDescription;
    use crate::types::{Cell, EnemyKind, KeyType, SessionEvent, WorldPos};

    use super::{Session, SessionOptions};

    /// `len` sectors of four cells each laid out left to right, linked both ways.
    pub(super) fn corridor(len: usize) -> SectorGraph {
        let mut graph = SectorGraph::new();
        for idx in 0..len {
            let x0 = idx as i32 * 2;
            let cells = vec![
                Cell::new(x0, 0),
                Cell::new(x0 + 1, 0),
                Cell::new(x0, 1),
                Cell::new(x0 + 1, 1),
            ];
            graph.add_sector(cells, WorldPos::new(x0 as f32 + 1.0, 1.0));
        }
        for idx in 1..len {
            graph.add_edge(idx - 1, idx);
            graph.add_edge(idx, idx - 1);
        }
        graph
    }

    #[test]
    fn locked_link_opens_after_hero_picks_up_key() {
        let mut graph = corridor(3);
        graph.set_link_lock(1, 2, Some(KeyType::Red));
        let mut session = Session::new(graph, SessionOptions::default());
        session.spawn_hero(0).unwrap();

        assert_eq!(session.find_path(0, 2), None);
        assert_eq!(session.order_hero_move(2), None);
        assert!(session
            .drain_events()
            .contains(&SessionEvent::RouteBlocked { unit_id: HERO_ID, goal: 2 }));

        assert!(session.place_key(1, KeyType::Red));
        assert_eq!(session.order_hero_move(1), Some(vec![0, 1]));
        session.advance_turn();

        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::KeyPickedUp {
            unit_id: HERO_ID,
            sector_id: 1,
            key: KeyType::Red,
        }));
        assert!(events.contains(&SessionEvent::EdgesRebuilt {
            changed: vec![(1, 2), (2, 1)],
        }));
        assert_eq!(session.find_path(0, 2), Some(vec![0, 1, 2]));
        assert_eq!(session.order_hero_move(2), Some(vec![1, 2]));
        session.advance_turn();
        assert_eq!(session.unit_sector(HERO_ID), Some(2));
        assert_eq!(session.hero_goal(), None);
    }

    #[test]
    fn step_releases_old_slot_before_reserving_new_one() {
        let mut session = Session::new(corridor(3), SessionOptions::default());
        session.spawn_hero(0).unwrap();
        assert_eq!(session.slots().assigned_slot(0, HERO_ID), Some(0));

        let position = session.step_unit(HERO_ID, 1).unwrap();
        assert_eq!(session.slots().assigned_slot(0, HERO_ID), None);
        assert_eq!(session.slots().assigned_slot(1, HERO_ID), Some(0));
        assert_eq!(session.unit(HERO_ID).unwrap().position, position);
        assert!(session.drain_events().contains(&SessionEvent::UnitArrived {
            unit_id: HERO_ID,
            sector_id: 1,
            position,
        }));
    }

    #[test]
    fn step_to_non_neighbour_is_rejected() {
        let mut session = Session::new(corridor(3), SessionOptions::default());
        session.spawn_hero(0).unwrap();
        assert_eq!(session.step_unit(HERO_ID, 2), None);
        assert_eq!(session.unit_sector(HERO_ID), Some(0));
        assert_eq!(session.step_unit(99, 1), None);
    }

    #[test]
    fn hero_route_is_replanned_when_link_is_cut() {
        let mut session = Session::new(corridor(4), SessionOptions::default());
        session.spawn_hero(0).unwrap();
        session.order_hero_move(3).unwrap();
        session.advance_turn();
        assert_eq!(session.unit_sector(HERO_ID), Some(1));

        assert!(!session.toggle_link(2, 3));
        session.drain_events();
        session.advance_turn();
        assert_eq!(session.unit_sector(HERO_ID), Some(1));
        assert_eq!(session.hero_goal(), None);
        assert_eq!(
            session.drain_events(),
            vec![SessionEvent::RouteBlocked { unit_id: HERO_ID, goal: 3 }]
        );
    }

    #[test]
    fn blocked_sector_cannot_be_entered_but_start_is_fine() {
        let mut session = Session::new(corridor(3), SessionOptions::default());
        session.spawn_hero(0).unwrap();
        session.set_sector_blocked(0, true);
        assert_eq!(session.find_path(0, 0), Some(vec![0]));
        assert_eq!(session.find_path(0, 2), Some(vec![0, 1, 2]));
        session.set_sector_blocked(1, true);
        assert_eq!(session.find_path(0, 2), None);
        assert!(session.isochrone(0, 5).sectors() == vec![0]);
    }

    #[test]
    fn crowded_sector_falls_back_to_center_and_despawn_frees_slots() {
        let options = SessionOptions::default();
        let mut session = Session::new(corridor(2), options);
        session.spawn_hero(1).unwrap();
        let mut enemies = Vec::new();
        for _ in 0..6 {
            enemies.push(session.spawn_enemy(1, EnemyKind::Basic).unwrap());
        }
        assert_eq!(enemies[0], FIRST_ENEMY_ID);
        assert!(session.slot_anomalies().is_empty());

        let center = session.graph().sector(1).unwrap().center();
        let last = *enemies.last().unwrap();
        assert_eq!(session.unit(last).unwrap().position, center);
        assert_eq!(session.slots().assigned_slot(1, last), None);

        assert!(session.despawn(HERO_ID));
        assert_eq!(session.slots().assigned_slot(1, HERO_ID), None);
        assert!(!session.despawn(HERO_ID));
    }

    #[test]
    fn snapshot_drains_events_when_requested() {
        let mut session = Session::new(corridor(2), SessionOptions::default());
        session.spawn_hero(0).unwrap();
        let first = session.snapshot(false);
        assert!(first.events.is_empty());
        let second = session.snapshot(true);
        assert_eq!(
            second.events,
            vec![SessionEvent::UnitSpawned { unit_id: HERO_ID, sector_id: 0 }]
        );
        assert!(session.snapshot(true).events.is_empty());
        assert_eq!(second.units.len(), 1);
    }

    #[test]
    fn from_map_places_everything() {
        let text = r#"{
            "heroStart": 1,
            "sectors": [
                {"id": 0, "cells": [{"x": 0, "y": 0}], "edges": [{"to": 1}]},
                {"id": 1, "cells": [{"x": 1, "y": 0}], "edges": [{"to": 0}]}
            ],
            "keys": [{"sectorId": 0, "key": "blue"}],
            "enemies": [{"sectorId": 0, "kind": "strong"}]
        }"#;
        let map = MapDescription::from_json_str(text).unwrap();
        let mut session = Session::from_map(&map, SessionOptions::default()).unwrap();
        assert_eq!(session.unit_sector(HERO_ID), Some(1));
        assert_eq!(session.unit_sector(FIRST_ENEMY_ID), Some(0));
        let snapshot = session.snapshot(true);
        assert_eq!(snapshot.keys.len(), 1);
        assert!(snapshot.inventory.is_empty());
        assert_eq!(snapshot.events.len(), 2);
    }

    #[test]
    fn recompute_center_moves_units_to_rebuilt_slots() {
        let mut graph = corridor(2);
        let strip: Vec<Cell> = (10..19).map(|x| Cell::new(x, 10)).collect();
        graph.add_sector(strip, WorldPos::ORIGIN);
        graph.add_edge(1, 2);
        let mut session = Session::new(graph, SessionOptions::default());
        session.spawn_hero(2).unwrap();
        assert_eq!(
            session.unit(HERO_ID).unwrap().position,
            WorldPos::new(10.5, 10.5)
        );

        session.recompute_center(2);
        assert_eq!(
            session.unit(HERO_ID).unwrap().position,
            WorldPos::new(14.5, 10.5)
        );
    }
}
