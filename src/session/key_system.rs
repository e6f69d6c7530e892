use super::*;

impl Session {
    /// Drops a key on a sector for the hero to pick up.
    pub fn place_key(&mut self, sector_id: SectorId, key: KeyType) -> bool {
        if !self.graph.contains(sector_id) {
            warn!("key {} not placed: unknown sector {sector_id}", key.as_str());
            return false;
        }
        self.keys.push(KeyOnMap { sector_id, key });
        if self.unit_sector(HERO_ID) == Some(sector_id) {
            self.collect_keys_at(sector_id);
        }
        true
    }

    /// Hands a key to the hero directly, unlocking its gates.
    pub fn grant_key(&mut self, key: KeyType) {
        self.inventory.insert(key);
        self.unlock_with_key(key);
    }

    pub fn inventory(&self) -> impl Iterator<Item = KeyType> + '_ {
        self.inventory.iter().copied()
    }

    pub fn keys_on_map(&self) -> &[KeyOnMap] {
        &self.keys
    }

    pub(super) fn collect_keys_at(&mut self, sector_id: SectorId) {
        let (picked, remaining): (Vec<KeyOnMap>, Vec<KeyOnMap>) = std::mem::take(&mut self.keys)
            .into_iter()
            .partition(|key| key.sector_id == sector_id);
        self.keys = remaining;

        for KeyOnMap { sector_id, key } in picked {
            info!("hero picked up {} key on sector {sector_id}", key.as_str());
            self.inventory.insert(key);
            self.events.push(SessionEvent::KeyPickedUp {
                unit_id: HERO_ID,
                sector_id,
                key,
            });
            self.unlock_with_key(key);
        }
    }

    fn unlock_with_key(&mut self, key: KeyType) {
        let changed = self.graph.unlock_edges_with_key(key);
        if changed.is_empty() {
            return;
        }
        info!("{} key opened {} edge(s)", key.as_str(), changed.len());
        self.events.push(SessionEvent::EdgesRebuilt { changed });
    }
}
