use super::*;

impl Session {
    pub(super) fn update_enemies(&mut self) {
        let Some(hero_sector) = self.unit_sector(HERO_ID) else {
            return;
        };
        let enemy_ids: Vec<UnitId> = self
            .units
            .values()
            .filter(|unit| matches!(unit.view.role, UnitRole::Enemy { .. }))
            .map(|unit| unit.view.id)
            .collect();
        for enemy_id in enemy_ids {
            // the hero never moves during the enemy phase
            self.update_enemy(enemy_id, hero_sector);
        }
    }

    /// One chase step: if the hero is within `vision_range` hops over
    /// unlocked edges, step one edge along that route.
    fn update_enemy(&mut self, enemy_id: UnitId, hero_sector: SectorId) {
        let Some(unit) = self.units.get(&enemy_id) else {
            return;
        };
        let from = unit.view.sector_id;
        let vision = unit.view.vision_range as usize;

        let route = self
            .chase_path(from, hero_sector)
            .filter(|path| path.len() - 1 <= vision);
        let in_sight = route.is_some();
        let was_tracking = self
            .units
            .get_mut(&enemy_id)
            .map(|unit| std::mem::replace(&mut unit.tracking, in_sight))
            .unwrap_or(false);

        let Some(path) = route else {
            if was_tracking {
                debug!("enemy {enemy_id} lost sight of the hero");
            }
            return;
        };
        let distance = path.len() - 1;
        if !was_tracking {
            self.events.push(SessionEvent::EnemySpotted { enemy_id, distance });
        }
        if let Some(&next) = path.get(1) {
            self.step_unit(enemy_id, next);
        }
    }

    fn chase_path(&self, from: SectorId, to: SectorId) -> Option<Vec<SectorId>> {
        PathFinder::new(&self.graph).try_find_path_with(from, to, |_| true, lock_aware(&self.graph))
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::{FIRST_ENEMY_ID, HERO_ID};
    use crate::types::{EnemyKind, KeyType, SessionEvent};

    use super::super::tests::corridor;
    use super::super::{Session, SessionOptions};

    #[test]
    fn enemy_waits_until_hero_is_within_vision() {
        let options = SessionOptions {
            vision_range: 2,
            ..SessionOptions::default()
        };
        let mut session = Session::new(corridor(6), options);
        session.spawn_hero(0).unwrap();
        let enemy = session.spawn_enemy(5, EnemyKind::Basic).unwrap();
        session.drain_events();

        session.advance_turn();
        assert_eq!(session.unit_sector(enemy), Some(5));
        assert!(session.drain_events().is_empty());

        session.order_hero_move(5).unwrap();
        session.advance_turn();
        session.advance_turn();
        // hero on 2 is still three hops out
        assert_eq!(session.unit_sector(HERO_ID), Some(2));
        assert_eq!(session.unit_sector(enemy), Some(5));

        session.advance_turn();
        assert_eq!(session.unit_sector(HERO_ID), Some(3));
        assert_eq!(session.unit_sector(enemy), Some(4));
        let spotted: Vec<_> = session
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, SessionEvent::EnemySpotted { .. }))
            .collect();
        assert_eq!(
            spotted,
            vec![SessionEvent::EnemySpotted {
                enemy_id: FIRST_ENEMY_ID,
                distance: 2,
            }]
        );
    }

    #[test]
    fn enemy_does_not_chase_through_locked_gate() {
        let mut graph = corridor(3);
        graph.set_link_lock(1, 2, Some(KeyType::Red));
        let mut session = Session::new(graph, SessionOptions::default());
        session.spawn_hero(0).unwrap();
        let enemy = session.spawn_enemy(2, EnemyKind::Strong).unwrap();

        for _ in 0..3 {
            session.advance_turn();
        }
        assert_eq!(session.unit_sector(enemy), Some(2));

        session.grant_key(KeyType::Red);
        session.advance_turn();
        assert_eq!(session.unit_sector(enemy), Some(1));
        session.advance_turn();
        assert_eq!(session.unit_sector(enemy), Some(0));
        assert!(session.slot_anomalies().is_empty());
    }

    #[test]
    fn enemies_move_in_ascending_id_order() {
        let mut session = Session::new(corridor(3), SessionOptions::default());
        session.spawn_hero(0).unwrap();
        let first = session.spawn_enemy(2, EnemyKind::Basic).unwrap();
        let second = session.spawn_enemy(2, EnemyKind::Basic).unwrap();
        session.drain_events();

        session.advance_turn();
        let arrivals: Vec<u32> = session
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::UnitArrived { unit_id, .. } => Some(unit_id),
                _ => None,
            })
            .collect();
        assert_eq!(arrivals, vec![first, second]);
    }

    #[test]
    fn enemy_on_hero_sector_stays_put() {
        let mut session = Session::new(corridor(2), SessionOptions::default());
        session.spawn_hero(1).unwrap();
        let enemy = session.spawn_enemy(1, EnemyKind::Basic).unwrap();
        session.advance_turn();
        assert_eq!(session.unit_sector(enemy), Some(1));
    }
}
