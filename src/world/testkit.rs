//! Small catalog and map shared by the unit tests.

use crate::config::EngineConfig;
use crate::entities::creature::{Creature, CreatureId, CreatureKind};
use crate::entities::inventory::InventorySlot;
use crate::entities::item::{ItemId, ItemKind, ItemTypeId};
use crate::entities::player::Player;
use crate::tasks::Deferred;
use crate::world::engine::WorldEngine;
use crate::world::holder::{HolderRef, SlotHint, ThingRef};
use crate::world::item_types::{ItemType, ItemTypeIndex};
use crate::world::position::Position;
use crate::world::time::{GameClock, GameTick};

pub const CENTER: Position = Position::new(100, 100, 7);
const FLOOR_RADIUS: u16 = 5;

pub const GROUND: ItemTypeId = ItemTypeId(100);
pub const SAND: ItemTypeId = ItemTypeId(101);
pub const HOLE: ItemTypeId = ItemTypeId(102);
pub const STATUE: ItemTypeId = ItemTypeId(1444);
pub const CRATE: ItemTypeId = ItemTypeId(2471);
pub const ANVIL: ItemTypeId = ItemTypeId(2555);
pub const BAG: ItemTypeId = ItemTypeId(2853);
pub const BACKPACK: ItemTypeId = ItemTypeId(2854);
pub const TORCH: ItemTypeId = ItemTypeId(2920);
pub const BURNT_TORCH: ItemTypeId = ItemTypeId(2922);
pub const EMBERS: ItemTypeId = ItemTypeId(2994);
pub const GOLD: ItemTypeId = ItemTypeId(3031);
pub const PLATINUM: ItemTypeId = ItemTypeId(3035);
pub const CRYSTAL: ItemTypeId = ItemTypeId(3043);
pub const SCROLL: ItemTypeId = ItemTypeId(3058);
pub const SWORD: ItemTypeId = ItemTypeId(3264);
pub const CLUB: ItemTypeId = ItemTypeId(3270);
pub const RAT_CORPSE: ItemTypeId = ItemTypeId(4240);

pub const BAG_CAPACITY: u16 = 8;
pub const TORCH_DECAY_MS: u64 = 30_000;
pub const EMBERS_DECAY_MS: u64 = 20_000;

fn coin(id: ItemTypeId, name: &str, worth: u32) -> ItemType {
    let mut coin = ItemType::new(id, name, ItemKind::Currency);
    coin.stackable = true;
    coin.weight = 10;
    coin.worth = worth;
    coin
}

fn ground(id: ItemTypeId, name: &str) -> ItemType {
    let mut ground = ItemType::new(id, name, ItemKind::Ground);
    ground.moveable = false;
    ground.pickupable = false;
    ground
}

fn container(id: ItemTypeId, name: &str, capacity: u16) -> ItemType {
    let mut container = ItemType::new(id, name, ItemKind::Container);
    container.container_capacity = Some(capacity);
    container.weight = 1_800;
    container
}

pub fn catalog() -> ItemTypeIndex {
    let mut hole = ground(HOLE, "hole");
    hole.floor_change_down = true;

    let mut statue = ItemType::new(STATUE, "statue", ItemKind::Misc);
    statue.moveable = false;
    statue.pickupable = false;
    statue.block_solid = true;

    let mut crate_ = ItemType::new(CRATE, "crate", ItemKind::Misc);
    crate_.has_height = true;
    crate_.pickupable = false;
    crate_.weight = 3_000;

    let mut anvil = ItemType::new(ANVIL, "anvil", ItemKind::Misc);
    anvil.weight = 500_000;

    let mut backpack = container(BACKPACK, "backpack", 20);
    backpack.slot = Some(InventorySlot::Backpack);

    let mut torch = ItemType::new(TORCH, "lit torch", ItemKind::Misc);
    torch.decay_to = Some(BURNT_TORCH);
    torch.decay_time_ms = TORCH_DECAY_MS;
    torch.weight = 500;

    let mut burnt_torch = ItemType::new(BURNT_TORCH, "burnt torch", ItemKind::Misc);
    burnt_torch.weight = 400;

    let mut embers = ItemType::new(EMBERS, "embers", ItemKind::Misc);
    embers.decay_time_ms = EMBERS_DECAY_MS;

    let mut scroll = ItemType::new(SCROLL, "scroll", ItemKind::Misc);
    scroll.weight = 50;

    let mut sword = ItemType::new(SWORD, "sword", ItemKind::Weapon);
    sword.weight = 3_500;

    let mut club = ItemType::new(CLUB, "club", ItemKind::Weapon);
    club.weight = 2_500;

    let mut corpse = ItemType::new(RAT_CORPSE, "dead rat", ItemKind::Corpse);
    corpse.corpse = true;
    corpse.container_capacity = Some(5);

    ItemTypeIndex::from_types([
        ground(GROUND, "grass"),
        ground(SAND, "sand"),
        hole,
        statue,
        crate_,
        anvil,
        container(BAG, "bag", BAG_CAPACITY),
        backpack,
        torch,
        burnt_torch,
        embers,
        coin(GOLD, "gold coin", 1),
        coin(PLATINUM, "platinum coin", 100),
        coin(CRYSTAL, "crystal coin", 10_000),
        scroll,
        sword,
        club,
        corpse,
    ])
    .expect("test catalog")
}

/// Engine on a manual clock with grass around `CENTER`.
pub fn world() -> WorldEngine {
    let mut world = WorldEngine::new(catalog(), EngineConfig::default()).with_clock(GameClock::manual());
    for x in CENTER.x - FLOOR_RADIUS..=CENTER.x + FLOOR_RADIUS {
        for y in CENTER.y - FLOOR_RADIUS..=CENTER.y + FLOOR_RADIUS {
            floor(&mut world, Position::new(x, y, CENTER.z));
        }
    }
    world.cleanup();
    world.take_events();
    world
}

pub fn east_of(position: Position) -> Position {
    Position::new(position.x + 1, position.y, position.z)
}

pub fn south_of(position: Position) -> Position {
    Position::new(position.x, position.y + 1, position.z)
}

/// Makes `position` a grass tile.
pub fn floor(world: &mut WorldEngine, position: Position) {
    if world.ensure_tile(position).has_ground() {
        return;
    }
    place(world, HolderRef::Tile(position), SlotHint::Anywhere, GROUND, 1);
}

/// Replaces the ground at `position` with a hole over a grass tile.
pub fn make_hole(world: &mut WorldEngine, position: Position) {
    floor(world, position.down().expect("floor below"));
    if let Some(old) = world.ensure_tile(position).ground() {
        world.remove_item(old, None, false).expect("remove ground");
    }
    place(world, HolderRef::Tile(position), SlotHint::Anywhere, HOLE, 1);
}

fn place(world: &mut WorldEngine, holder: HolderRef, slot: SlotHint, type_id: ItemTypeId, count: u16) -> ItemId {
    let item = world.create_item(type_id, count).expect("item type");
    world.attach(holder, slot, ThingRef::Item(item)).expect("attach");
    world.notify_add(holder, ThingRef::Item(item));
    item
}

/// Places a new item on the tile without merging or redirecting.
pub fn put_on_tile(world: &mut WorldEngine, position: Position, type_id: ItemTypeId, count: u16) -> ItemId {
    world.ensure_tile(position);
    place(world, HolderRef::Tile(position), SlotHint::Anywhere, type_id, count)
}

/// Places a new item at the front of a container without merging.
pub fn put_in_container(world: &mut WorldEngine, container: ItemId, type_id: ItemTypeId, count: u16) -> ItemId {
    place(world, HolderRef::Container(container), SlotHint::Anywhere, type_id, count)
}

pub fn equip(world: &mut WorldEngine, player: CreatureId, slot: InventorySlot, type_id: ItemTypeId) -> ItemId {
    place(world, HolderRef::Inventory(player), SlotHint::Slot(slot), type_id, 1)
}

pub fn spawn_player(world: &mut WorldEngine, name: &str, position: Position) -> CreatureId {
    let id = world.allocate_creature_id();
    let capacity = world.config().player_capacity;
    let creature = Creature::new(id, name, CreatureKind::Player, position);
    world
        .enter_world(creature, Player::new(id, 0, 0, capacity))
        .expect("player placed")
}

pub fn spawn_monster(world: &mut WorldEngine, name: &str, position: Position) -> CreatureId {
    let id = world.allocate_creature_id();
    let creature = Creature::new(id, name, CreatureKind::Monster, position);
    world.place_creature(creature, false).expect("monster placed")
}

pub fn units_of_type(world: &WorldEngine, holder: HolderRef, type_id: ItemTypeId) -> u32 {
    world.item_type_count(holder, type_id, None)
}

/// Runs deferred tasks in due order, moving the manual clock forward to
/// each one, until none are left.
pub fn run_deferred(world: &mut WorldEngine) {
    let mut queue: Vec<(GameTick, u64, Deferred<WorldEngine>)> = Vec::new();
    let mut sequence = 0;
    for _ in 0..10_000 {
        let now = world.now();
        for deferred in world.take_deferred() {
            queue.push((now.after(deferred.delay), sequence, deferred));
            sequence += 1;
        }
        let Some(next) = queue
            .iter()
            .enumerate()
            .min_by_key(|(_, (due, seq, _))| (*due, *seq))
            .map(|(index, _)| index)
        else {
            return;
        };
        let (due, _, deferred) = queue.remove(next);
        if due > world.now() {
            let wait = std::time::Duration::from_millis(due.0 - world.now().0);
            world.advance_clock(wait);
        }
        (deferred.task)(world);
        world.cleanup();
    }
    panic!("deferred tasks keep rescheduling themselves");
}
