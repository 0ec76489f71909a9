use crate::entities::creature::{Creature, CreatureId, CreatureKind};
use crate::entities::item::ItemId;
use crate::entities::player::Player;
use crate::persistence::autosave::{AutosaveConfig, AutosaveReport};
use crate::persistence::store::{EquippedItem, PlayerRecord, SavedItem, StoreError};
use crate::world::engine::WorldEngine;
use crate::world::holder::{HolderRef, SlotHint, ThingRef};
use crate::world::outcome::ReturnValue;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} is banned")]
    Banned(String),
    #[error("{0} is already online")]
    AlreadyOnline(String),
    #[error("no position to place {0}")]
    NoSpawn(String),
    #[error("cannot place {name}: {reason}")]
    Placement { name: String, reason: ReturnValue },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorldEngine {
    /// Brings a character into the world: checks bans, loads the saved
    /// record and places the player with their equipment.
    pub fn login_player(&mut self, name: &str, account: u32, ip: u32) -> Result<CreatureId, SessionError> {
        if self.player_by_name(name).is_ok() {
            return Err(SessionError::AlreadyOnline(name.to_string()));
        }
        let (banned, record) = match self.store.as_ref() {
            Some(store) => {
                let banned = store.is_banned(name, account, ip).unwrap_or_else(|err| {
                    error!(target: "error", %name, error = %err, "ban check failed");
                    false
                });
                (banned, store.load_player(name)?)
            }
            None => (false, None),
        };
        if banned {
            info!(target: "game", %name, account, "banned character refused");
            return Err(SessionError::Banned(name.to_string()));
        }

        let saved_position = record
            .as_ref()
            .map(|record| record.position)
            .filter(|position| self.holders.map.has_tile(*position));
        let position = saved_position
            .or(self.holders.map.spawn)
            .ok_or_else(|| SessionError::NoSpawn(name.to_string()))?;

        let id = self.allocate_creature_id();
        let mut creature = Creature::new(id, name, CreatureKind::Player, position);
        let mut capacity = self.config.player_capacity;
        if let Some(record) = record.as_ref() {
            creature.name = record.name.clone();
            creature.stats.max_health = record.max_health;
            creature.stats.health = record.health.min(record.max_health);
            creature.stats.max_mana = record.max_mana;
            creature.stats.mana = record.mana.min(record.max_mana);
            if record.capacity > 0 {
                capacity = record.capacity;
            }
        }
        self.enter_world(creature, Player::new(id, account, ip, capacity))
            .map_err(|reason| SessionError::Placement {
                name: name.to_string(),
                reason,
            })?;

        for equipped in record.map(|record| record.equipment).unwrap_or_default() {
            if let Err(reason) = self.restore_equipment(id, &equipped) {
                warn!(target: "error", %name, slot = ?equipped.slot, %reason, "saved item could not be restored");
            }
        }
        info!(target: "game", %name, player = id.0, %position, "player logged in");
        Ok(id)
    }

    /// Places a player creature together with its player state.
    pub(crate) fn enter_world(&mut self, creature: Creature, player: Player) -> Result<CreatureId, ReturnValue> {
        let id = creature.id;
        self.holders.players.insert(id, player);
        match self.place_creature(creature, false) {
            Ok(id) => Ok(id),
            Err(reason) => {
                self.holders.players.remove(&id);
                Err(reason)
            }
        }
    }

    fn restore_equipment(&mut self, player: CreatureId, equipped: &EquippedItem) -> Result<(), ReturnValue> {
        let item = self.restore_item(&equipped.item)?;
        let holder = HolderRef::Inventory(player);
        self.attach(holder, SlotHint::Slot(equipped.slot), ThingRef::Item(item))?;
        self.notify_add(holder, ThingRef::Item(item));
        Ok(())
    }

    fn restore_item(&mut self, saved: &SavedItem) -> Result<ItemId, ReturnValue> {
        let id = self.create_item(saved.type_id, saved.count)?;
        if let Some(item) = self.item_mut(id) {
            item.text = saved.text.clone();
            item.action_id = saved.action_id;
        }
        if !self.holders.containers.contains_key(&id) {
            return Ok(id);
        }
        // Containers insert at the front, so rebuild from the back.
        for child in saved.contents.iter().rev() {
            let child = self.restore_item(child)?;
            let holder = HolderRef::Container(id);
            self.attach(holder, SlotHint::Anywhere, ThingRef::Item(child))?;
            self.notify_add(holder, ThingRef::Item(child));
        }
        Ok(id)
    }

    fn save_item(&self, id: ItemId) -> Option<SavedItem> {
        let item = self.item(id)?;
        let mut saved = SavedItem::new(item.type_id, item.count);
        saved.text = item.text.clone();
        saved.action_id = item.action_id;
        if let Some(container) = self.container(id) {
            saved.contents = container
                .items()
                .iter()
                .filter_map(|child| self.save_item(*child))
                .collect();
        }
        Some(saved)
    }

    /// Snapshot of an online player as the store keeps it.
    pub fn player_record(&self, id: CreatureId) -> Option<PlayerRecord> {
        let creature = self.creature(id)?;
        let player = self.player(id)?;
        let equipment = player
            .inventory
            .items()
            .filter_map(|(slot, item)| self.save_item(item).map(|item| EquippedItem { slot, item }))
            .collect();
        Some(PlayerRecord {
            name: creature.name.clone(),
            account: player.account,
            position: creature.position,
            health: creature.stats.health,
            max_health: creature.stats.max_health,
            mana: creature.stats.mana,
            max_mana: creature.stats.max_mana,
            capacity: player.inventory.capacity,
            equipment,
        })
    }

    fn save_player(&mut self, id: CreatureId) -> Result<(), String> {
        let record = self.player_record(id).ok_or_else(|| format!("player {} is not online", id.0))?;
        match self.store.as_mut() {
            Some(store) => store
                .save_player(&record)
                .map_err(|err| format!("saving {} failed: {}", record.name, err)),
            None => Ok(()),
        }
    }

    /// Saves and removes a player. A failed save is logged; the player
    /// leaves regardless.
    pub fn logout_player(&mut self, id: CreatureId) -> Result<(), ReturnValue> {
        if !self.holders.players.contains_key(&id) {
            return Err(ReturnValue::NotPossible);
        }
        if let Err(err) = self.save_player(id) {
            error!(target: "error", player = id.0, error = %err, "player save failed");
        }
        let name = self.creature(id).map(|creature| creature.name.clone()).unwrap_or_default();
        self.remove_creature(id)?;
        info!(target: "game", %name, player = id.0, "player logged out");
        Ok(())
    }

    /// Saves every online player and the global table.
    pub fn global_save(&mut self) -> AutosaveReport {
        let mut report = AutosaveReport::default();
        for id in self.online_players() {
            match self.save_player(id) {
                Ok(()) => report.saved_players += 1,
                Err(err) => report.player_errors.push(err),
            }
        }
        let globals = self.globals.clone();
        if let Some(store) = self.store.as_mut() {
            if let Err(err) = store.save_globals(&globals) {
                report.globals_error = Some(err.to_string());
            }
        }
        for err in report.player_errors.iter().chain(report.globals_error.iter()) {
            error!(target: "error", error = %err, "global save");
        }
        info!(target: "game", saved = report.saved_players, "global save done");
        report
    }

    /// Pulls the global table from the store, replacing what is in memory.
    pub fn load_globals(&mut self) -> Result<(), StoreError> {
        if let Some(store) = self.store.as_ref() {
            self.globals = store.load_globals()?;
        }
        Ok(())
    }

    /// Schedules periodic global saves; a zero interval disables them.
    pub fn start_autosave(&mut self) {
        let config = AutosaveConfig {
            interval_seconds: self.config.save_interval_secs,
        };
        if let Some(interval) = config.interval() {
            self.defer(interval, move |world| world.autosave_tick(interval));
        }
    }

    fn autosave_tick(&mut self, interval: Duration) {
        self.global_save();
        if !self.shutdown_requested() {
            self.defer(interval, move |world| world.autosave_tick(interval));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::inventory::InventorySlot;
    use crate::persistence::store::{MemoryStore, PlayerStore};
    use crate::world::testkit::{self, *};
    use std::sync::{Arc, Mutex};

    /// Shares a memory store between the engine and the test.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<Mutex<MemoryStore>>);

    impl PlayerStore for SharedStore {
        fn load_player(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
            self.0.lock().expect("store").load_player(name)
        }
        fn save_player(&mut self, record: &PlayerRecord) -> Result<(), StoreError> {
            self.0.lock().expect("store").save_player(record)
        }
        fn is_banned(&self, name: &str, account: u32, ip: u32) -> Result<bool, StoreError> {
            self.0.lock().expect("store").is_banned(name, account, ip)
        }
        fn load_globals(&self) -> Result<std::collections::BTreeMap<String, String>, StoreError> {
            self.0.lock().expect("store").load_globals()
        }
        fn save_globals(&mut self, globals: &std::collections::BTreeMap<String, String>) -> Result<(), StoreError> {
            self.0.lock().expect("store").save_globals(globals)
        }
    }

    fn world_with_store() -> (WorldEngine, SharedStore) {
        let mut world = testkit::world();
        world.holders.map.spawn = Some(CENTER);
        let store = SharedStore::default();
        world.set_store(Box::new(store.clone()));
        (world, store)
    }

    #[test]
    fn new_characters_start_at_the_spawn() {
        let (mut world, _store) = world_with_store();
        let id = world.login_player("Newbie", 1, 0).expect("login");
        assert_eq!(world.creature(id).map(|c| c.position), Some(CENTER));
        assert_eq!(world.player_by_name("newbie"), Ok(id));
        assert!(matches!(
            world.login_player("Newbie", 1, 0),
            Err(SessionError::AlreadyOnline(_))
        ));
    }

    #[test]
    fn logout_then_login_restores_equipment() {
        let (mut world, store) = world_with_store();
        let id = world.login_player("Alice", 3, 0).expect("login");
        let backpack = testkit::equip(&mut world, id, InventorySlot::Backpack, BACKPACK);
        testkit::put_in_container(&mut world, backpack, GOLD, 40);
        testkit::put_in_container(&mut world, backpack, SWORD, 1);
        world.change_health(id, -30).expect("hurt");

        world.logout_player(id).expect("logout");
        world.cleanup();
        assert!(world.player(id).is_none());
        assert_eq!(store.0.lock().expect("store").saves, 1);

        let again = world.login_player("Alice", 3, 0).expect("login again");
        let holder = HolderRef::Inventory(again);
        assert_eq!(world.get_money(holder), 40);
        assert_eq!(world.item_type_count(holder, SWORD, None), 1);
        let restored = world
            .player(again)
            .and_then(|player| player.inventory.slot(InventorySlot::Backpack))
            .and_then(|backpack| world.container(backpack))
            .map(|container| container.items().to_vec())
            .expect("backpack");
        assert_eq!(world.item(restored[0]).map(|item| item.type_id), Some(SWORD));
        assert_eq!(world.creature(again).map(|c| c.stats.health), Some(70));
    }

    #[test]
    fn banned_characters_are_refused() {
        let (mut world, store) = world_with_store();
        store.0.lock().expect("store").bans.accounts.push(9);
        assert!(matches!(world.login_player("Mallory", 9, 0), Err(SessionError::Banned(_))));
        assert!(world.online_players().is_empty());
    }

    #[test]
    fn global_save_writes_players_and_globals() {
        let (mut world, store) = world_with_store();
        world.login_player("Alice", 1, 0).expect("login");
        world.login_player("Bob", 2, 0).expect("login");
        world.set_global("last_raid", "orcs");

        let report = world.global_save();
        assert_eq!(report.saved_players, 2);
        assert!(report.is_clean());
        let store = store.0.lock().expect("store");
        assert_eq!(store.globals.get("last_raid").map(String::as_str), Some("orcs"));
        assert!(store.players.contains_key("bob"));
    }
}
