use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::world::holder::{
    query_remove_item, Destination, Holder, HolderRef, MoveFlags, SlotHint, ThingRef, ThingView,
    WorldView,
};
use crate::world::item_types::MAX_STACK;
use crate::world::outcome::{AddQuery, ReturnValue};
use crate::world::position::Position;
use std::collections::HashMap;

/// One map square. Things are indexed ground first, then always-on-top items,
/// then creatures, then ordinary items with the newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub position: Position,
    pub protection_zone: bool,
    ground: Option<ItemId>,
    top_items: Vec<ItemId>,
    creatures: Vec<CreatureId>,
    down_items: Vec<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Ground,
    Top,
    Creatures,
    Down,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            protection_zone: false,
            ground: None,
            top_items: Vec::new(),
            creatures: Vec::new(),
            down_items: Vec::new(),
        }
    }

    pub fn ground(&self) -> Option<ItemId> {
        self.ground
    }

    pub fn has_ground(&self) -> bool {
        self.ground.is_some()
    }

    pub fn creatures(&self) -> &[CreatureId] {
        &self.creatures
    }

    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.ground
            .iter()
            .copied()
            .chain(self.top_items.iter().copied())
            .chain(self.down_items.iter().copied())
    }

    /// Newest ordinary item, the one a player picks up first.
    pub fn top_down_item(&self) -> Option<ItemId> {
        self.down_items.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ground.is_none()
            && self.top_items.is_empty()
            && self.creatures.is_empty()
            && self.down_items.is_empty()
    }

    pub fn is_block_solid(&self, view: &WorldView<'_>) -> bool {
        self.items()
            .any(|id| view.item_type(id).map_or(false, |t| t.block_solid))
    }

    /// Number of stacked items that raise the floor (crates, parcels and the like).
    pub fn height(&self, view: &WorldView<'_>) -> usize {
        self.items()
            .filter(|id| view.item_type(*id).map_or(false, |t| t.has_height))
            .count()
    }

    pub fn floor_change_down(&self, view: &WorldView<'_>) -> bool {
        self.items()
            .any(|id| view.item_type(id).map_or(false, |t| t.floor_change_down))
    }

    fn layer_len(&self, layer: Layer) -> usize {
        match layer {
            Layer::Ground => usize::from(self.ground.is_some()),
            Layer::Top => self.top_items.len(),
            Layer::Creatures => self.creatures.len(),
            Layer::Down => self.down_items.len(),
        }
    }

    fn locate(&self, index: usize) -> Option<(Layer, usize)> {
        let mut offset = index;
        for layer in [Layer::Ground, Layer::Top, Layer::Creatures, Layer::Down] {
            let len = self.layer_len(layer);
            if offset < len {
                return Some((layer, offset));
            }
            offset -= len;
        }
        None
    }

    fn layer_start(&self, layer: Layer) -> usize {
        let mut start = 0;
        for candidate in [Layer::Ground, Layer::Top, Layer::Creatures, Layer::Down] {
            if candidate == layer {
                return start;
            }
            start += self.layer_len(candidate);
        }
        start
    }

    fn layer_of(view: &ThingView<'_>, thing: ThingRef) -> Layer {
        match thing {
            ThingRef::Creature(_) => Layer::Creatures,
            ThingRef::Item(id) => match view.item_type(id) {
                Some(t) if t.is_ground() => Layer::Ground,
                Some(t) if t.always_on_top => Layer::Top,
                _ => Layer::Down,
            },
        }
    }
}

impl Holder for Tile {
    fn holder_ref(&self) -> HolderRef {
        HolderRef::Tile(self.position)
    }

    fn query_add(
        &self,
        view: &WorldView<'_>,
        _slot: SlotHint,
        thing: ThingRef,
        _count: u16,
        flags: MoveFlags,
    ) -> AddQuery {
        if flags.contains(MoveFlags::NO_LIMIT) {
            return AddQuery::Ok;
        }
        match thing {
            ThingRef::Creature(id) => {
                if !self.has_ground() {
                    return AddQuery::Fail(ReturnValue::NotPossible);
                }
                if !flags.contains(MoveFlags::IGNORE_BLOCK_CREATURE)
                    && self.creatures.iter().any(|other| *other != id)
                {
                    return AddQuery::Fail(ReturnValue::NotEnoughRoom);
                }
                if !flags.contains(MoveFlags::IGNORE_BLOCK_ITEM) && self.is_block_solid(view) {
                    return AddQuery::Fail(ReturnValue::NotEnoughRoom);
                }
                AddQuery::Ok
            }
            ThingRef::Item(id) => {
                let Some(item_type) = view.item_type(id) else {
                    return AddQuery::Fail(ReturnValue::NotPossible);
                };
                if item_type.is_ground() && self.has_ground() {
                    return AddQuery::Fail(ReturnValue::NotEnoughRoom);
                }
                if !self.has_ground() && !item_type.is_ground() {
                    return AddQuery::Fail(ReturnValue::NotPossible);
                }
                if !flags.contains(MoveFlags::IGNORE_BLOCK_ITEM) && self.is_block_solid(view) {
                    return AddQuery::Fail(ReturnValue::NotEnoughRoom);
                }
                AddQuery::Ok
            }
        }
    }

    fn query_max_count(
        &self,
        view: &WorldView<'_>,
        _slot: SlotHint,
        thing: ThingRef,
        count: u16,
        _flags: MoveFlags,
    ) -> (u16, Result<(), ReturnValue>) {
        match thing {
            ThingRef::Item(id) if view.things().is_stackable(id) => (count, Ok(())),
            _ => (1, Ok(())),
        }
    }

    fn query_remove(&self, view: &WorldView<'_>, thing: ThingRef, count: u16) -> Result<(), ReturnValue> {
        match thing {
            ThingRef::Creature(_) => {
                if self.index_of(thing).is_some() {
                    Ok(())
                } else {
                    Err(ReturnValue::NotPossible)
                }
            }
            ThingRef::Item(_) => query_remove_item(self, view, thing, count),
        }
    }

    fn query_destination(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        _flags: MoveFlags,
    ) -> Destination {
        if self.floor_change_down(view) {
            if let Some(below) = self.position.down() {
                if view.holders.map.has_tile(below) {
                    return Destination::at(HolderRef::Tile(below), SlotHint::Anywhere);
                }
            }
        }
        if let ThingRef::Item(id) = thing {
            let moving_type = view.item(id).map(|item| item.type_id);
            if view.things().is_stackable(id) && slot == SlotHint::Anywhere {
                let stack = self.down_items.iter().copied().find(|candidate| {
                    *candidate != id
                        && view.item(*candidate).map_or(false, |existing| {
                            Some(existing.type_id) == moving_type && existing.count < MAX_STACK
                        })
                });
                if let Some(stack) = stack {
                    return Destination {
                        holder: self.holder_ref(),
                        slot,
                        to_item: Some(stack),
                    };
                }
            }
        }
        Destination::at(self.holder_ref(), slot)
    }

    fn index_of(&self, thing: ThingRef) -> Option<usize> {
        match thing {
            ThingRef::Creature(id) => self
                .creatures
                .iter()
                .position(|other| *other == id)
                .map(|pos| self.layer_start(Layer::Creatures) + pos),
            ThingRef::Item(id) => {
                if self.ground == Some(id) {
                    return Some(0);
                }
                if let Some(pos) = self.top_items.iter().position(|other| *other == id) {
                    return Some(self.layer_start(Layer::Top) + pos);
                }
                self.down_items
                    .iter()
                    .position(|other| *other == id)
                    .map(|pos| self.layer_start(Layer::Down) + pos)
            }
        }
    }

    fn thing_at(&self, index: usize) -> Option<ThingRef> {
        let (layer, offset) = self.locate(index)?;
        match layer {
            Layer::Ground => self.ground.map(ThingRef::Item),
            Layer::Top => self.top_items.get(offset).copied().map(ThingRef::Item),
            Layer::Creatures => self.creatures.get(offset).copied().map(ThingRef::Creature),
            Layer::Down => self.down_items.get(offset).copied().map(ThingRef::Item),
        }
    }

    fn thing_count(&self) -> usize {
        self.layer_len(Layer::Ground)
            + self.top_items.len()
            + self.creatures.len()
            + self.down_items.len()
    }

    fn add_thing(&mut self, view: &ThingView<'_>, _slot: SlotHint, thing: ThingRef) -> Result<(), ReturnValue> {
        match (Self::layer_of(view, thing), thing) {
            (_, ThingRef::Creature(id)) => self.creatures.insert(0, id),
            (Layer::Ground, ThingRef::Item(id)) if self.ground.is_none() => self.ground = Some(id),
            (Layer::Top, ThingRef::Item(id)) => self.top_items.push(id),
            (_, ThingRef::Item(id)) => self.down_items.insert(0, id),
        }
        Ok(())
    }

    fn remove_thing(&mut self, thing: ThingRef) -> Option<usize> {
        let index = self.index_of(thing)?;
        match thing {
            ThingRef::Creature(id) => self.creatures.retain(|other| *other != id),
            ThingRef::Item(id) => {
                if self.ground == Some(id) {
                    self.ground = None;
                } else {
                    self.top_items.retain(|other| *other != id);
                    self.down_items.retain(|other| *other != id);
                }
            }
        }
        Some(index)
    }

    fn replace_thing(&mut self, view: &ThingView<'_>, index: usize, thing: ThingRef) -> Option<ThingRef> {
        let (layer, offset) = self.locate(index)?;
        let old = self.thing_at(index)?;
        let ThingRef::Item(new_id) = thing else {
            return None;
        };
        if Self::layer_of(view, thing) == layer {
            match layer {
                Layer::Ground => self.ground = Some(new_id),
                Layer::Top => self.top_items[offset] = new_id,
                Layer::Down => self.down_items[offset] = new_id,
                Layer::Creatures => return None,
            }
        } else {
            self.remove_thing(old);
            self.add_thing(view, SlotHint::Anywhere, thing).ok()?;
        }
        Some(old)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Map {
    pub name: String,
    pub spawn: Option<Position>,
    tiles: HashMap<Position, Tile>,
}

impl Map {
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn has_tile(&self, position: Position) -> bool {
        self.tiles.contains_key(&position)
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        self.tiles.get(&position)
    }

    pub fn tile_mut(&mut self, position: Position) -> Option<&mut Tile> {
        self.tiles.get_mut(&position)
    }

    /// Returns the tile at `position`, creating an empty one if needed.
    pub fn ensure_tile(&mut self, position: Position) -> &mut Tile {
        self.tiles
            .entry(position)
            .or_insert_with(|| Tile::new(position))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }
}
