use crate::config::EngineConfig;
use crate::entities::creature::{ActionToken, Creature, CreatureId};
use crate::entities::item::{DecayState, Item, ItemId, ItemTypeId};
use crate::entities::player::Player;
use crate::persistence::store::PlayerStore;
use crate::scripting::handles::{ScriptBridge, ScriptHandles};
use crate::tasks::{Deferred, TaskHost};
use crate::world::container::Container;
use crate::world::creatures::CreatureChecks;
use crate::world::decay::DecayQueue;
use crate::world::events::{Notifications, WorldEvent, WorldObserver};
use crate::world::holder::{
    HolderRef, HolderStore, SlotHint, ThingRef, ThingStore, ThingView, WorldView,
};
use crate::world::item_types::{ItemType, ItemTypeIndex};
use crate::world::map::{Map, Tile};
use crate::world::outcome::ReturnValue;
use crate::world::pathfinding::{DirectPathFinder, PathFinder};
use crate::world::position::Position;
use crate::world::time::{GameClock, GameTick};
use crate::world::trade::TradeRegistry;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

/// The world and all per-tick bookkeeping. Only the dispatcher worker ever
/// holds a mutable reference to it.
pub struct WorldEngine {
    pub(crate) config: EngineConfig,
    pub(crate) catalog: ItemTypeIndex,
    pub(crate) things: ThingStore,
    pub(crate) holders: HolderStore,
    pub(crate) clock: GameClock,
    pub(crate) decay: DecayQueue,
    pub(crate) checks: CreatureChecks,
    pub(crate) trades: TradeRegistry,
    pub(crate) scripts: ScriptHandles,
    pub(crate) bridge: Option<Box<dyn ScriptBridge>>,
    pub(crate) pathfinder: Box<dyn PathFinder>,
    pub(crate) store: Option<Box<dyn PlayerStore>>,
    pub(crate) notifications: Notifications,
    pub(crate) globals: BTreeMap<String, String>,
    release: Vec<ThingRef>,
    observers: Vec<Box<dyn WorldObserver>>,
    outbox: Vec<Deferred<WorldEngine>>,
    next_token: u64,
    shutdown_requested: bool,
}

impl WorldEngine {
    pub fn new(catalog: ItemTypeIndex, config: EngineConfig) -> Self {
        let checks = CreatureChecks::new(config.check_buckets);
        Self {
            config,
            catalog,
            things: ThingStore::default(),
            holders: HolderStore::default(),
            clock: GameClock::system(),
            decay: DecayQueue::default(),
            checks,
            trades: TradeRegistry::default(),
            scripts: ScriptHandles::default(),
            bridge: None,
            pathfinder: Box::new(DirectPathFinder),
            store: None,
            notifications: Notifications::default(),
            globals: BTreeMap::new(),
            release: Vec::new(),
            observers: Vec::new(),
            outbox: Vec::new(),
            next_token: 0,
            shutdown_requested: false,
        }
    }

    pub fn with_clock(mut self, clock: GameClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_pathfinder(&mut self, pathfinder: Box<dyn PathFinder>) {
        self.pathfinder = pathfinder;
    }

    pub fn set_store(&mut self, store: Box<dyn PlayerStore>) {
        self.store = Some(store);
    }

    pub fn set_script_bridge(&mut self, bridge: Box<dyn ScriptBridge>) {
        self.bridge = Some(bridge);
    }

    pub fn add_observer(&mut self, observer: Box<dyn WorldObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ItemTypeIndex {
        &self.catalog
    }

    pub fn now(&self) -> GameTick {
        self.clock.now()
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn advance_clock(&mut self, duration: Duration) -> GameTick {
        self.clock.advance(duration)
    }

    pub fn view(&self) -> WorldView<'_> {
        WorldView {
            catalog: &self.catalog,
            things: &self.things,
            holders: &self.holders,
        }
    }

    pub fn map(&self) -> &Map {
        &self.holders.map
    }

    pub fn ensure_tile(&mut self, position: Position) -> &mut Tile {
        self.holders.map.ensure_tile(position)
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        self.holders.map.tile(position)
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.things.item(id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.things.item_mut(id)
    }

    pub fn item_type_of(&self, id: ItemId) -> Option<&ItemType> {
        self.things
            .item(id)
            .and_then(|item| self.catalog.get(item.type_id))
    }

    pub fn container(&self, id: ItemId) -> Option<&Container> {
        self.holders.containers.get(&id)
    }

    pub fn creature(&self, id: CreatureId) -> Option<&Creature> {
        self.things.creature(id)
    }

    pub fn creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.things.creature_mut(id)
    }

    pub fn player(&self, id: CreatureId) -> Option<&Player> {
        self.holders.players.get(&id)
    }

    pub fn player_mut(&mut self, id: CreatureId) -> Option<&mut Player> {
        self.holders.players.get_mut(&id)
    }

    pub fn online_players(&self) -> Vec<CreatureId> {
        let mut ids: Vec<CreatureId> = self.holders.players.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn live_item_count(&self) -> usize {
        self.things.item_count()
    }

    /// Creates a detached item. Unknown type ids are a caller bug: logged and refused.
    pub fn create_item(&mut self, type_id: ItemTypeId, count: u16) -> Result<ItemId, ReturnValue> {
        let Some(item_type) = self.catalog.get(type_id) else {
            error!(target: "error", type_id = type_id.0, "item factory called with unknown type");
            return Err(ReturnValue::NotPossible);
        };
        let count = item_type.clamp_count(count);
        let capacity = item_type.container_capacity;
        let duration = item_type.decay_time_ms.min(i64::MAX as u64) as i64;
        let id = self.things.allocate_item(type_id, count);
        if let Some(item) = self.things.item_mut(id) {
            item.duration_ms = duration;
        }
        if let Some(capacity) = capacity {
            self.holders.containers.insert(id, Container::new(id, capacity));
        }
        Ok(id)
    }

    pub fn holder_of(&self, thing: ThingRef) -> Option<HolderRef> {
        match thing {
            ThingRef::Item(id) => self.things.item(id).and_then(|item| item.holder),
            ThingRef::Creature(id) => self
                .things
                .creature(id)
                .filter(|creature| !creature.removed)
                .map(|creature| HolderRef::Tile(creature.position)),
        }
    }

    /// Places `thing` into `holder` and points its back-reference there.
    pub(crate) fn attach(&mut self, holder: HolderRef, slot: SlotHint, thing: ThingRef) -> Result<(), ReturnValue> {
        let view = ThingView {
            catalog: &self.catalog,
            things: &self.things,
        };
        let target = self.holders.get_mut(holder).ok_or(ReturnValue::NotPossible)?;
        target.add_thing(&view, slot, thing)?;
        match thing {
            ThingRef::Item(id) => {
                if let Some(item) = self.things.item_mut(id) {
                    item.holder = Some(holder);
                    item.removed = false;
                }
            }
            ThingRef::Creature(id) => {
                if let (HolderRef::Tile(position), Some(creature)) = (holder, self.things.creature_mut(id)) {
                    creature.position = position;
                    creature.removed = false;
                }
            }
        }
        Ok(())
    }

    /// Takes `thing` out of `holder`, returning the index it occupied.
    pub(crate) fn detach(&mut self, holder: HolderRef, thing: ThingRef) -> Option<usize> {
        let index = self.holders.get_mut(holder)?.remove_thing(thing)?;
        if let ThingRef::Item(id) = thing {
            if let Some(item) = self.things.item_mut(id) {
                item.holder = None;
                item.removed = true;
            }
        }
        Some(index)
    }

    pub(crate) fn notify_add(&mut self, holder: HolderRef, thing: ThingRef) {
        if let Some(target) = self.holders.get(holder) {
            if let Some(index) = target.index_of(thing) {
                target.post_add_notification(thing, index, &mut self.notifications);
            }
        }
        if let ThingRef::Item(id) = thing {
            self.start_decay(id);
        }
    }

    pub(crate) fn notify_remove(&mut self, holder: HolderRef, thing: ThingRef, index: usize, complete: bool) {
        if let Some(target) = self.holders.get(holder) {
            target.post_remove_notification(thing, index, complete, &mut self.notifications);
        }
        if let ThingRef::Item(id) = thing {
            self.queue_detach_followups(holder, id);
        }
    }

    pub(crate) fn emit(&mut self, event: WorldEvent) {
        self.notifications.push(event);
    }

    /// Events produced since the last drain, in commit order.
    pub fn take_events(&mut self) -> Vec<WorldEvent> {
        self.notifications.drain()
    }

    /// Marks a detached thing for destruction at the next cleanup point.
    pub(crate) fn free_thing(&mut self, thing: ThingRef) {
        self.release.push(thing);
    }

    pub(crate) fn use_ref(&mut self, id: ItemId) {
        if let Some(item) = self.things.item_mut(id) {
            item.refs += 1;
        }
    }

    pub(crate) fn release_ref(&mut self, id: ItemId) {
        if let Some(item) = self.things.item_mut(id) {
            item.refs = item.refs.saturating_sub(1);
            if item.refs == 0 && item.holder.is_none() {
                self.release.push(ThingRef::Item(id));
            }
        }
    }

    fn destroy_item(&mut self, id: ItemId) {
        let Some(item) = self.things.drop_item(id) else {
            return;
        };
        self.scripts.forget(ThingRef::Item(id));
        if let Some(container) = self.holders.containers.remove(&id) {
            for child in container.items() {
                let destroyable = match self.things.item_mut(*child) {
                    Some(child_item) => {
                        child_item.holder = None;
                        child_item.removed = true;
                        child_item.refs == 0
                    }
                    None => false,
                };
                if destroyable {
                    self.destroy_item(*child);
                }
            }
        }
        debug!(target: "game", item = item.id.0, type_id = item.type_id.0, "item destroyed");
    }

    /// End-of-task cleanup: releases staged script items, destroys detached
    /// things nobody references any more and admits newly decaying items.
    pub fn cleanup(&mut self) {
        for thing in self.holders.staging.take_all() {
            if let ThingRef::Item(id) = thing {
                if let Some(item) = self.things.item_mut(id) {
                    item.holder = None;
                    item.removed = true;
                }
                self.free_thing(thing);
            }
        }

        self.admit_pending_decay();

        let released = std::mem::take(&mut self.release);
        for thing in released {
            match thing {
                ThingRef::Item(id) => {
                    let destroyable = self
                        .things
                        .item(id)
                        .map_or(false, |item| item.holder.is_none() && item.refs == 0);
                    if destroyable {
                        self.destroy_item(id);
                    }
                }
                ThingRef::Creature(id) => {
                    if self.things.creature(id).map_or(false, |creature| creature.removed) {
                        self.things.drop_creature(id);
                        self.scripts.forget(thing);
                    }
                }
            }
        }
        self.scripts.reset();
    }

    pub fn defer<F>(&mut self, delay: Duration, task: F)
    where
        F: FnOnce(&mut WorldEngine) + Send + 'static,
    {
        self.outbox.push(Deferred {
            delay,
            task: Box::new(task),
        });
    }

    pub fn take_deferred(&mut self) -> Vec<Deferred<WorldEngine>> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn next_token(&mut self) -> ActionToken {
        self.next_token += 1;
        ActionToken(self.next_token)
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn creature_by_name(&self, name: &str) -> Option<CreatureId> {
        self.things
            .creatures()
            .find(|creature| !creature.removed && creature.name.eq_ignore_ascii_case(name))
            .map(|creature| creature.id)
    }

    /// Finds an online player by name. A trailing `~` matches a unique prefix.
    pub fn player_by_name(&self, name: &str) -> Result<CreatureId, ReturnValue> {
        let players = self.holders.players.keys().filter_map(|id| self.things.creature(*id));
        match name.strip_suffix('~') {
            Some(prefix) => {
                let prefix = prefix.to_ascii_lowercase();
                let matches: Vec<&Creature> = players
                    .filter(|creature| creature.name.to_ascii_lowercase().starts_with(&prefix))
                    .collect();
                match matches.as_slice() {
                    [] => Err(ReturnValue::PlayerNotOnline),
                    [only] => Ok(only.id),
                    several => several
                        .iter()
                        .find(|creature| creature.name.eq_ignore_ascii_case(&prefix))
                        .map(|creature| creature.id)
                        .ok_or(ReturnValue::NameIsTooAmbiguous),
                }
            }
            None => players
                .filter(|creature| creature.name.eq_ignore_ascii_case(name))
                .map(|creature| creature.id)
                .next()
                .ok_or(ReturnValue::PlayerNotOnline),
        }
    }

    pub fn players_by_account(&self, account: u32) -> Vec<CreatureId> {
        let mut ids: Vec<CreatureId> = self
            .holders
            .players
            .values()
            .filter(|player| player.account == account)
            .map(|player| player.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn players_by_ip(&self, ip: u32, mask: u32) -> Vec<CreatureId> {
        let mut ids: Vec<CreatureId> = self
            .holders
            .players
            .values()
            .filter(|player| player.ip & mask == ip & mask)
            .map(|player| player.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(String::as_str)
    }

    pub fn set_global(&mut self, key: &str, value: &str) {
        self.globals.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn decay_state(&self, id: ItemId) -> Option<DecayState> {
        self.things.item(id).map(|item| item.decay)
    }

    fn publish_events(&mut self) {
        let events = self.notifications.drain();
        if self.observers.is_empty() {
            return;
        }
        for event in &events {
            for observer in self.observers.iter_mut() {
                observer.on_event(event);
            }
        }
    }
}

impl TaskHost for WorldEngine {
    fn take_deferred(&mut self) -> Vec<Deferred<Self>> {
        WorldEngine::take_deferred(self)
    }

    fn end_of_task(&mut self) {
        self.cleanup();
        self.publish_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testkit::{self, GOLD, SWORD};

    #[test]
    fn factory_rejects_unknown_types() {
        let mut world = testkit::world();
        assert_eq!(world.create_item(ItemTypeId(9999), 1), Err(ReturnValue::NotPossible));
        assert!(world.create_item(SWORD, 1).is_ok());
    }

    #[test]
    fn factory_clamps_stack_counts() {
        let mut world = testkit::world();
        let coins = world.create_item(GOLD, 250).expect("coins");
        assert_eq!(world.item(coins).map(|item| item.count), Some(100));
    }

    #[test]
    fn released_items_survive_until_cleanup() {
        let mut world = testkit::world();
        let tile = testkit::CENTER;
        let sword = testkit::put_on_tile(&mut world, tile, SWORD, 1);

        world.remove_item(sword, None, false).expect("remove");
        let item = world.item(sword).expect("still allocated");
        assert!(item.removed);
        assert!(item.holder.is_none());

        world.cleanup();
        assert!(world.item(sword).is_none());
    }

    #[test]
    fn referenced_items_outlive_cleanup() {
        let mut world = testkit::world();
        let sword = testkit::put_on_tile(&mut world, testkit::CENTER, SWORD, 1);
        world.use_ref(sword);
        world.remove_item(sword, None, false).expect("remove");
        world.cleanup();
        assert!(world.item(sword).is_some());

        world.release_ref(sword);
        world.cleanup();
        assert!(world.item(sword).is_none());
    }

    #[test]
    fn wildcard_name_lookup_requires_a_unique_prefix() {
        let mut world = testkit::world();
        let alice = testkit::spawn_player(&mut world, "Alice", testkit::CENTER);
        let _alfred = testkit::spawn_player(&mut world, "Alfred", testkit::east_of(testkit::CENTER));

        assert_eq!(world.player_by_name("alice"), Ok(alice));
        assert_eq!(world.player_by_name("Alic~"), Ok(alice));
        assert_eq!(world.player_by_name("Al~"), Err(ReturnValue::NameIsTooAmbiguous));
        assert_eq!(world.player_by_name("Bob"), Err(ReturnValue::PlayerNotOnline));
    }

    #[test]
    fn players_are_found_by_account_and_masked_ip() {
        let mut world = testkit::world();
        let alice = testkit::spawn_player(&mut world, "Alice", testkit::CENTER);
        if let Some(player) = world.player_mut(alice) {
            player.account = 42;
            player.ip = 0x0A00_0005;
        }
        assert_eq!(world.players_by_account(42), vec![alice]);
        assert_eq!(world.players_by_ip(0x0A00_0099, 0xFFFF_FF00), vec![alice]);
        assert!(world.players_by_ip(0x0B00_0005, 0xFFFF_FF00).is_empty());
    }
}
