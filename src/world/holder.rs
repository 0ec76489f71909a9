//! The holder protocol: every place a thing can live (map tile, player
//! inventory, container, staging area) answers the same admission queries and
//! applies the same primitive mutations. Transactions in the engine are built
//! purely on top of this trait.

use crate::entities::creature::{Creature, CreatureId};
use crate::entities::inventory::InventorySlot;
use crate::entities::item::{Item, ItemId, ItemTypeId};
use crate::entities::player::Player;
use crate::world::container::Container;
use crate::world::events::Notifications;
use crate::world::item_types::{ItemType, ItemTypeIndex};
use crate::world::map::Map;
use crate::world::outcome::{AddQuery, ReturnValue};
use crate::world::position::Position;
use crate::world::staging::TemporaryHolding;
use std::collections::HashMap;
use std::ops::BitOr;

/// Upper bound on redirect chains and holder nesting walks.
pub const MAX_HOLDER_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThingRef {
    Item(ItemId),
    Creature(CreatureId),
}

impl ThingRef {
    pub fn item(self) -> Option<ItemId> {
        match self {
            ThingRef::Item(id) => Some(id),
            ThingRef::Creature(_) => None,
        }
    }

    pub fn creature(self) -> Option<CreatureId> {
        match self {
            ThingRef::Creature(id) => Some(id),
            ThingRef::Item(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolderRef {
    Tile(Position),
    Inventory(CreatureId),
    Container(ItemId),
    /// Per-task scratch area for items created by scripts.
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotHint {
    #[default]
    Anywhere,
    Index(usize),
    Slot(InventorySlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveFlags(u32);

impl MoveFlags {
    pub const NONE: MoveFlags = MoveFlags(0);
    /// Skip capacity, room and blocking checks.
    pub const NO_LIMIT: MoveFlags = MoveFlags(1 << 0);
    pub const IGNORE_BLOCK_ITEM: MoveFlags = MoveFlags(1 << 1);
    pub const IGNORE_BLOCK_CREATURE: MoveFlags = MoveFlags(1 << 2);
    /// The moved item already belongs to the destination's owner.
    pub const CHILD_IS_OWNER: MoveFlags = MoveFlags(1 << 3);

    pub fn contains(self, other: MoveFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MoveFlags {
    type Output = MoveFlags;

    fn bitor(self, rhs: MoveFlags) -> MoveFlags {
        MoveFlags(self.0 | rhs.0)
    }
}

/// Final placement chosen by `Holder::query_destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub holder: HolderRef,
    pub slot: SlotHint,
    /// Existing stack the moved units should merge into.
    pub to_item: Option<ItemId>,
}

impl Destination {
    pub fn at(holder: HolderRef, slot: SlotHint) -> Self {
        Self {
            holder,
            slot,
            to_item: None,
        }
    }
}

/// Arena of every live thing, keyed by id.
#[derive(Debug, Default)]
pub struct ThingStore {
    items: HashMap<ItemId, Item>,
    creatures: HashMap<CreatureId, Creature>,
    next_item: u32,
    next_creature: u32,
}

impl ThingStore {
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub fn creature(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn allocate_item(&mut self, type_id: ItemTypeId, count: u16) -> ItemId {
        self.next_item += 1;
        let id = ItemId(self.next_item);
        self.items.insert(id, Item::new(id, type_id, count));
        id
    }

    pub fn allocate_creature_id(&mut self) -> CreatureId {
        self.next_creature += 1;
        CreatureId(self.next_creature)
    }

    pub fn insert_creature(&mut self, creature: Creature) {
        self.creatures.insert(creature.id, creature);
    }

    pub fn drop_item(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    pub fn drop_creature(&mut self, id: CreatureId) -> Option<Creature> {
        self.creatures.remove(&id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// Every holder in the world, keyed by the reference that names it.
#[derive(Debug, Default)]
pub struct HolderStore {
    pub map: Map,
    pub containers: HashMap<ItemId, Container>,
    pub players: HashMap<CreatureId, Player>,
    pub staging: TemporaryHolding,
}

impl HolderStore {
    pub fn get(&self, holder: HolderRef) -> Option<&dyn Holder> {
        match holder {
            HolderRef::Tile(position) => self.map.tile(position).map(|tile| tile as &dyn Holder),
            HolderRef::Inventory(id) => self
                .players
                .get(&id)
                .map(|player| &player.inventory as &dyn Holder),
            HolderRef::Container(id) => self
                .containers
                .get(&id)
                .map(|container| container as &dyn Holder),
            HolderRef::Staging => Some(&self.staging),
        }
    }

    pub fn get_mut(&mut self, holder: HolderRef) -> Option<&mut dyn Holder> {
        match holder {
            HolderRef::Tile(position) => self
                .map
                .tile_mut(position)
                .map(|tile| tile as &mut dyn Holder),
            HolderRef::Inventory(id) => self
                .players
                .get_mut(&id)
                .map(|player| &mut player.inventory as &mut dyn Holder),
            HolderRef::Container(id) => self
                .containers
                .get_mut(&id)
                .map(|container| container as &mut dyn Holder),
            HolderRef::Staging => Some(&mut self.staging),
        }
    }
}

/// Read access to items and their types, enough to classify things.
#[derive(Clone, Copy)]
pub struct ThingView<'a> {
    pub catalog: &'a ItemTypeIndex,
    pub things: &'a ThingStore,
}

impl<'a> ThingView<'a> {
    pub fn item(&self, id: ItemId) -> Option<&'a Item> {
        self.things.item(id)
    }

    pub fn item_type(&self, id: ItemId) -> Option<&'a ItemType> {
        self.things
            .item(id)
            .and_then(|item| self.catalog.get(item.type_id))
    }

    /// Units a thing represents: the stack size for stackables, one otherwise.
    pub fn units(&self, id: ItemId) -> u16 {
        match (self.item(id), self.item_type(id)) {
            (Some(item), Some(item_type)) if item_type.stackable => item.count,
            _ => 1,
        }
    }

    pub fn is_stackable(&self, id: ItemId) -> bool {
        self.item_type(id).map_or(false, |t| t.stackable)
    }

    /// Weight of `count` units of an item, including container contents.
    pub fn weight_of(&self, holders: &HolderStore, id: ItemId, count: u16) -> u32 {
        let Some(item_type) = self.item_type(id) else {
            return 0;
        };
        let base = if item_type.stackable {
            item_type.weight.saturating_mul(u32::from(count))
        } else {
            item_type.weight
        };
        let contents = holders
            .containers
            .get(&id)
            .map(|container| {
                container
                    .items()
                    .iter()
                    .map(|child| self.weight_of(holders, *child, self.units(*child)))
                    .sum::<u32>()
            })
            .unwrap_or(0);
        base.saturating_add(contents)
    }
}

/// Read-only snapshot of the whole world handed to holder queries.
#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    pub catalog: &'a ItemTypeIndex,
    pub things: &'a ThingStore,
    pub holders: &'a HolderStore,
}

impl<'a> WorldView<'a> {
    pub fn things(&self) -> ThingView<'a> {
        ThingView {
            catalog: self.catalog,
            things: self.things,
        }
    }

    pub fn item(&self, id: ItemId) -> Option<&'a Item> {
        self.things.item(id)
    }

    pub fn item_type(&self, id: ItemId) -> Option<&'a ItemType> {
        self.things().item_type(id)
    }

    pub fn creature(&self, id: CreatureId) -> Option<&'a Creature> {
        self.things.creature(id)
    }

    pub fn units(&self, id: ItemId) -> u16 {
        self.things().units(id)
    }

    pub fn weight_of(&self, id: ItemId, count: u16) -> u32 {
        self.things().weight_of(self.holders, id, count)
    }

    pub fn holder(&self, holder: HolderRef) -> Option<&'a dyn Holder> {
        self.holders.get(holder)
    }

    /// Walks out of nested containers to the holder that is not a container.
    pub fn top_holder(&self, start: HolderRef) -> HolderRef {
        let mut current = start;
        for _ in 0..MAX_HOLDER_DEPTH {
            match current {
                HolderRef::Container(id) => match self.item(id).and_then(|item| item.holder) {
                    Some(parent) => current = parent,
                    None => return current,
                },
                other => return other,
            }
        }
        current
    }

    /// True when `ancestor` is `holder` itself or one of the containers above it.
    pub fn holder_is_within(&self, holder: HolderRef, ancestor: ItemId) -> bool {
        let mut current = holder;
        for _ in 0..MAX_HOLDER_DEPTH {
            match current {
                HolderRef::Container(id) if id == ancestor => return true,
                HolderRef::Container(id) => match self.item(id).and_then(|item| item.holder) {
                    Some(parent) => current = parent,
                    None => return false,
                },
                _ => return false,
            }
        }
        false
    }

    /// True when item `id` sits somewhere inside container `ancestor`.
    pub fn item_is_within(&self, id: ItemId, ancestor: ItemId) -> bool {
        self.item(id)
            .and_then(|item| item.holder)
            .map_or(false, |holder| self.holder_is_within(holder, ancestor))
    }

    /// Position in the world a holder is attached to, if any.
    pub fn holder_position(&self, holder: HolderRef) -> Option<Position> {
        match self.top_holder(holder) {
            HolderRef::Tile(position) => Some(position),
            HolderRef::Inventory(id) => self.creature(id).map(|creature| creature.position),
            HolderRef::Container(_) | HolderRef::Staging => None,
        }
    }
}

pub trait Holder {
    fn holder_ref(&self) -> HolderRef;

    /// May `count` units of `thing` be placed at `slot`?
    fn query_add(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        count: u16,
        flags: MoveFlags,
    ) -> AddQuery;

    /// How many of `count` units fit, and why not all of them if they don't.
    fn query_max_count(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        count: u16,
        flags: MoveFlags,
    ) -> (u16, Result<(), ReturnValue>);

    fn query_remove(&self, view: &WorldView<'_>, thing: ThingRef, count: u16) -> Result<(), ReturnValue>;

    /// Final placement for `thing`, possibly redirecting into another holder
    /// or onto an existing stack.
    fn query_destination(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        flags: MoveFlags,
    ) -> Destination;

    fn index_of(&self, thing: ThingRef) -> Option<usize>;

    fn thing_at(&self, index: usize) -> Option<ThingRef>;

    fn thing_count(&self) -> usize;

    /// Stores `thing`. Fails without touching the holder when it has no place
    /// for it.
    fn add_thing(&mut self, view: &ThingView<'_>, slot: SlotHint, thing: ThingRef) -> Result<(), ReturnValue>;

    /// Detaches `thing`, returning the index it occupied.
    fn remove_thing(&mut self, thing: ThingRef) -> Option<usize>;

    /// Swaps whatever sits at `index` for `thing`, returning the old occupant.
    fn replace_thing(&mut self, view: &ThingView<'_>, index: usize, thing: ThingRef) -> Option<ThingRef>;

    fn post_add_notification(&self, thing: ThingRef, index: usize, sink: &mut Notifications) {
        sink.holder_added(self.holder_ref(), thing, index);
    }

    fn post_remove_notification(
        &self,
        thing: ThingRef,
        index: usize,
        complete: bool,
        sink: &mut Notifications,
    ) {
        sink.holder_removed(self.holder_ref(), thing, index, complete);
    }
}

/// Shared removal rule: the holder must contain the item, enough units must be
/// present and the type must be moveable.
pub fn query_remove_item(
    holder: &dyn Holder,
    view: &WorldView<'_>,
    thing: ThingRef,
    count: u16,
) -> Result<(), ReturnValue> {
    let ThingRef::Item(id) = thing else {
        return Err(ReturnValue::NotPossible);
    };
    if holder.index_of(thing).is_none() {
        return Err(ReturnValue::NotPossible);
    }
    let item_type = view.item_type(id).ok_or(ReturnValue::NotPossible)?;
    if item_type.stackable && count > view.units(id) {
        return Err(ReturnValue::NotPossible);
    }
    if !item_type.moveable {
        return Err(ReturnValue::NotMoveable);
    }
    Ok(())
}

/// Capacity check for holders owned by a player: `count` units of `item`
/// must fit the owner's remaining carry weight unless they are already carried.
pub fn check_owner_capacity(
    view: &WorldView<'_>,
    owner: CreatureId,
    item: ItemId,
    count: u16,
    flags: MoveFlags,
) -> Result<(), ReturnValue> {
    if flags.contains(MoveFlags::NO_LIMIT) || flags.contains(MoveFlags::CHILD_IS_OWNER) {
        return Ok(());
    }
    let already_carried = view
        .item(item)
        .and_then(|item| item.holder)
        .map_or(false, |holder| view.top_holder(holder) == HolderRef::Inventory(owner));
    if already_carried {
        return Ok(());
    }
    let Some(player) = view.holders.players.get(&owner) else {
        return Ok(());
    };
    if view.weight_of(item, count) > player.inventory.free_capacity(view) {
        return Err(ReturnValue::NotEnoughCapacity);
    }
    Ok(())
}

/// Largest number of `item` units the owner can still carry.
pub fn owner_capacity_units(view: &WorldView<'_>, owner: CreatureId, item: ItemId, count: u16) -> u16 {
    let already_carried = view
        .item(item)
        .and_then(|item| item.holder)
        .map_or(false, |holder| view.top_holder(holder) == HolderRef::Inventory(owner));
    let Some(player) = view.holders.players.get(&owner) else {
        return count;
    };
    if already_carried {
        return count;
    }
    let unit = view.item_type(item).map_or(0, |t| t.weight);
    if unit == 0 {
        return count;
    }
    let free = player.inventory.free_capacity(view);
    let fits = (free / unit).min(u32::from(count));
    fits as u16
}
