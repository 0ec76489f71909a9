//! Containment transactions: every change of ownership between holders goes
//! through one of these. Each one runs every query first, so a refusal leaves
//! the world untouched, and fires notifications only after committing.

use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::entities::inventory::InventorySlot;
use crate::entities::item::ItemTypeId;
use crate::world::engine::WorldEngine;
use crate::world::holder::{
    Destination, Holder, HolderRef, MoveFlags, SlotHint, ThingRef, ThingView, WorldView,
    MAX_HOLDER_DEPTH,
};
use crate::world::item_types::MAX_STACK;
use crate::world::outcome::{AddQuery, MoveOutcome, ReturnValue};
use crate::world::position::Position;
use tracing::{error, warn};

impl WorldEngine {
    pub(crate) fn with_holder<R>(
        &self,
        holder: HolderRef,
        query: impl FnOnce(&dyn Holder, &WorldView<'_>) -> R,
    ) -> Result<R, ReturnValue> {
        let view = self.view();
        let target = view.holder(holder).ok_or(ReturnValue::NotPossible)?;
        Ok(query(target, &view))
    }

    /// Follows `query_destination` redirects until a holder keeps the thing.
    pub fn resolve_destination(
        &self,
        start: HolderRef,
        slot: SlotHint,
        thing: ThingRef,
        flags: MoveFlags,
    ) -> Result<Destination, ReturnValue> {
        let view = self.view();
        let mut current = Destination::at(start, slot);
        for _ in 0..MAX_HOLDER_DEPTH {
            let holder = view.holder(current.holder).ok_or(ReturnValue::NotPossible)?;
            let next = holder.query_destination(&view, current.slot, thing, flags);
            if next.holder == current.holder {
                return Ok(next);
            }
            current = next;
        }
        warn!(target: "error", ?start, ?thing, "destination redirect chain too deep");
        Err(ReturnValue::NotPossible)
    }

    /// Slot hint that puts a thing back where `index` points in `holder`.
    fn slot_hint_at(holder: HolderRef, index: usize) -> SlotHint {
        match holder {
            HolderRef::Inventory(_) => InventorySlot::from_index(index)
                .map(SlotHint::Slot)
                .unwrap_or(SlotHint::Anywhere),
            HolderRef::Container(_) => SlotHint::Index(index),
            HolderRef::Tile(_) | HolderRef::Staging => SlotHint::Anywhere,
        }
    }

    /// Moves `count` units of `item` from `from` to `to`.
    ///
    /// A destination that only takes part of a stack does not fail the move:
    /// the part that fits is moved and the destination's reason is reported in
    /// [`MoveOutcome::clamped`].
    pub fn move_item(
        &mut self,
        from: HolderRef,
        to: HolderRef,
        slot: SlotHint,
        item: ItemId,
        count: u16,
        flags: MoveFlags,
    ) -> Result<MoveOutcome, ReturnValue> {
        let thing = ThingRef::Item(item);
        let item_type = self.item_type_of(item).cloned().ok_or(ReturnValue::NotPossible)?;
        if self.item(item).and_then(|current| current.holder) != Some(from) {
            return Err(ReturnValue::NotPossible);
        }
        let stackable = item_type.stackable;
        let available = self.view().units(item);
        let count = if stackable { count } else { 1 };
        if count == 0 {
            return Err(ReturnValue::NotPossible);
        }

        let destination = self.resolve_destination(to, slot, thing, flags)?;
        if destination.to_item == Some(item) {
            return Ok(MoveOutcome {
                moved: 0,
                item: Some(item),
                clamped: None,
            });
        }
        let to = destination.holder;
        let slot = destination.slot;
        let mut to_item = destination.to_item;

        let mut query = self.with_holder(to, |h, v| h.query_add(v, slot, thing, count, flags))?;
        if let AddQuery::NeedExchange(existing) = query {
            if !self.try_exchange(from, to, item, existing)? {
                return Err(ReturnValue::NeedExchange);
            }
            to_item = None;
            query = self.with_holder(to, |h, v| h.query_add(v, slot, thing, count, flags))?;
        }
        query.into_result()?;

        let (max, max_result) =
            self.with_holder(to, |h, v| h.query_max_count(v, slot, thing, count, flags))?;
        if max == 0 {
            return Err(max_result.err().unwrap_or(ReturnValue::NotPossible));
        }
        let moved = if stackable { count.min(max) } else { 1 };

        self.with_holder(from, |h, v| h.query_remove(v, thing, moved))??;

        let merge = if stackable {
            to_item
                .and_then(|target| self.item(target))
                .filter(|target| target.type_id == item_type.id && target.id != item)
                .map(|target| (target.id, MAX_STACK.saturating_sub(target.count).min(moved)))
                .filter(|(_, merged)| *merged > 0)
        } else {
            None
        };
        let merged = merge.map_or(0, |(_, merged)| merged);
        let remainder = moved - merged;
        let whole = !stackable || moved >= available;
        let reuse_original = !stackable || (whole && merged == 0);

        // Created before anything is touched so a factory failure aborts cleanly.
        let fresh_stack = if stackable && remainder > 0 && !reuse_original {
            Some(self.create_item(item_type.id, remainder)?)
        } else {
            None
        };

        let from_index = self
            .with_holder(from, |h, _| h.index_of(thing))?
            .ok_or(ReturnValue::NotPossible)?;
        if whole {
            self.detach(from, thing);
        } else if let Some(source) = self.item_mut(item) {
            source.count -= moved;
        }

        if let Some((target, merged)) = merge {
            if let Some(target) = self.item_mut(target) {
                target.count += merged;
            }
        }

        let placed = if reuse_original { Some(item) } else { fresh_stack };
        if let Some(placed) = placed {
            let add_slot = if merge.is_some() { SlotHint::Anywhere } else { slot };
            self.attach(to, add_slot, ThingRef::Item(placed))?;
        }
        if whole && placed != Some(item) {
            self.free_thing(thing);
        }

        self.notify_remove(from, thing, from_index, whole);
        if let Some(placed) = placed {
            self.notify_add(to, ThingRef::Item(placed));
        }
        if let Some((target, _)) = merge {
            self.notify_add(to, ThingRef::Item(target));
        }

        let clamped = if moved < count { max_result.err() } else { None };
        Ok(MoveOutcome {
            moved,
            item: placed.or(merge.map(|(target, _)| target)),
            clamped,
        })
    }

    /// Swaps `existing` out of `to` and into the slot `moving` occupies in `from`.
    fn try_exchange(
        &mut self,
        from: HolderRef,
        to: HolderRef,
        moving: ItemId,
        existing: ItemId,
    ) -> Result<bool, ReturnValue> {
        let existing_thing = ThingRef::Item(existing);
        let from_index = self
            .with_holder(from, |h, _| h.index_of(ThingRef::Item(moving)))?
            .ok_or(ReturnValue::NotPossible)?;
        let back_slot = Self::slot_hint_at(from, from_index);
        let units = self.view().units(existing);

        let back = self.with_holder(from, |h, v| {
            h.query_add(v, back_slot, existing_thing, units, MoveFlags::NONE)
        })?;
        if !back.is_ok() {
            return Ok(false);
        }
        let (max, max_result) = self.with_holder(from, |h, v| {
            h.query_max_count(v, back_slot, existing_thing, units, MoveFlags::NONE)
        })?;
        if max == 0 || max_result.is_err() {
            return Ok(false);
        }
        if self
            .with_holder(to, |h, v| h.query_remove(v, existing_thing, units))?
            .is_err()
        {
            return Ok(false);
        }

        let old_index = self.detach(to, existing_thing).ok_or(ReturnValue::NotPossible)?;
        self.attach(from, back_slot, existing_thing)?;
        self.notify_remove(to, existing_thing, old_index, true);
        self.notify_add(from, existing_thing);
        Ok(true)
    }

    /// Places a detached item. With `test` set only the queries run.
    /// Returns the object now holding the units, which is an existing stack
    /// when the item merged completely.
    pub fn add_item(
        &mut self,
        to: HolderRef,
        item: ItemId,
        slot: SlotHint,
        flags: MoveFlags,
        test: bool,
    ) -> Result<ItemId, ReturnValue> {
        let thing = ThingRef::Item(item);
        let current = self.item(item).ok_or(ReturnValue::NotPossible)?;
        if !test && current.holder.is_some() {
            return Err(ReturnValue::NotPossible);
        }
        let item_type = self.item_type_of(item).cloned().ok_or(ReturnValue::NotPossible)?;
        let count = self.view().units(item);

        let destination = self.resolve_destination(to, slot, thing, flags)?;
        let to = destination.holder;
        let slot = destination.slot;
        self.with_holder(to, |h, v| h.query_add(v, slot, thing, count, flags))?
            .into_result()?;
        let (max, max_result) =
            self.with_holder(to, |h, v| h.query_max_count(v, slot, thing, count, flags))?;
        if max == 0 || (item_type.stackable && max < count) {
            return Err(max_result.err().unwrap_or(ReturnValue::NotPossible));
        }
        if test {
            return Ok(item);
        }

        let merge = if item_type.stackable {
            destination
                .to_item
                .and_then(|target| self.item(target))
                .filter(|target| target.type_id == item_type.id && target.id != item)
                .map(|target| (target.id, MAX_STACK.saturating_sub(target.count).min(count)))
                .filter(|(_, merged)| *merged > 0)
        } else {
            None
        };

        if let Some((target, merged)) = merge {
            if let Some(target) = self.item_mut(target) {
                target.count += merged;
            }
            if merged == count {
                if let Some(source) = self.item_mut(item) {
                    source.removed = true;
                }
                self.free_thing(thing);
                self.notify_add(to, ThingRef::Item(target));
                return Ok(target);
            }
            if let Some(source) = self.item_mut(item) {
                source.count = count - merged;
            }
        }

        let add_slot = if merge.is_some() { SlotHint::Anywhere } else { slot };
        self.attach(to, add_slot, thing)?;
        self.notify_add(to, thing);
        if let Some((target, _)) = merge {
            self.notify_add(to, ThingRef::Item(target));
        }
        Ok(item)
    }

    /// Removes `count` units (the whole item when `None`). Unmoveable items may
    /// still be removed here; only players are bound by that rule.
    pub fn remove_item(&mut self, item: ItemId, count: Option<u16>, test: bool) -> Result<(), ReturnValue> {
        let thing = ThingRef::Item(item);
        let holder = self
            .item(item)
            .and_then(|current| current.holder)
            .ok_or(ReturnValue::NotPossible)?;
        let stackable = self.view().things().is_stackable(item);
        let available = self.view().units(item);
        let count = count.unwrap_or(available);
        if count == 0 || count > available {
            return Err(ReturnValue::NotPossible);
        }
        match self.with_holder(holder, |h, v| h.query_remove(v, thing, count))? {
            Ok(()) | Err(ReturnValue::NotMoveable) => {}
            Err(reason) => return Err(reason),
        }
        if test {
            return Ok(());
        }

        let index = self
            .with_holder(holder, |h, _| h.index_of(thing))?
            .ok_or(ReturnValue::NotPossible)?;
        if stackable && count < available {
            if let Some(current) = self.item_mut(item) {
                current.count -= count;
            }
            self.notify_remove(holder, thing, index, false);
        } else {
            self.detach(holder, thing);
            self.free_thing(thing);
            self.notify_remove(holder, thing, index, true);
        }
        Ok(())
    }

    /// Turns an item into another type.
    ///
    /// Returns the item that now stands in its place, or `None` when the
    /// transform consumed it.
    pub fn transform_item(
        &mut self,
        item: ItemId,
        new_type: ItemTypeId,
        new_count: Option<u16>,
    ) -> Result<Option<ItemId>, ReturnValue> {
        let thing = ThingRef::Item(item);
        let (type_id, count, holder) = {
            let current = self.item(item).ok_or(ReturnValue::NotPossible)?;
            (current.type_id, current.count, current.holder)
        };
        if type_id == new_type && new_count.map_or(true, |requested| requested == count) {
            return Ok(Some(item));
        }
        let holder = holder.ok_or(ReturnValue::NotPossible)?;
        let index = self
            .with_holder(holder, |h, _| h.index_of(thing))?
            .ok_or(ReturnValue::NotPossible)?;
        let current_type = self.catalog.get(type_id).cloned().ok_or(ReturnValue::NotPossible)?;
        let Some(next_type) = self.catalog.get(new_type).cloned() else {
            error!(target: "error", item = item.0, type_id = new_type.0, "transform to unknown item type");
            return Err(ReturnValue::NotPossible);
        };

        if current_type.always_on_top != next_type.always_on_top {
            let replacement = self.create_item(new_type, new_count.unwrap_or(count))?;
            self.copy_item_attributes(item, replacement);
            if let Err(reason) = self
                .add_item(holder, replacement, SlotHint::Anywhere, MoveFlags::NO_LIMIT, true)
                .and_then(|_| self.remove_item(item, None, false))
            {
                self.free_thing(ThingRef::Item(replacement));
                return Err(reason);
            }
            return match self.add_item(holder, replacement, SlotHint::Anywhere, MoveFlags::NO_LIMIT, false) {
                Ok(placed) => Ok(Some(placed)),
                Err(reason) => {
                    self.free_thing(ThingRef::Item(replacement));
                    Err(reason)
                }
            };
        }

        if current_type.kind == next_type.kind {
            if new_count == Some(0) && (next_type.stackable || next_type.has_charges) {
                if !next_type.stackable {
                    let successor = if type_id == new_type {
                        current_type.decay_to
                    } else {
                        Some(new_type)
                    };
                    if let Some(successor) = successor.filter(|successor| *successor != new_type) {
                        return self.transform_item(item, successor, None);
                    }
                }
                self.remove_item(item, None, false)?;
                return Ok(None);
            }

            self.notify_remove(holder, thing, index, false);
            if let Some(current) = self.item_mut(item) {
                if current.type_id != new_type {
                    current.duration_ms = next_type.decay_time_ms.min(i64::MAX as u64) as i64;
                }
                current.type_id = new_type;
                current.count = next_type.clamp_count(new_count.unwrap_or(current.count));
            }
            self.notify_add(holder, thing);
            return Ok(Some(item));
        }

        let replacement = self.create_item(new_type, new_count.unwrap_or(count))?;
        self.copy_item_attributes(item, replacement);
        let view = ThingView {
            catalog: &self.catalog,
            things: &self.things,
        };
        let replaced = self
            .holders
            .get_mut(holder)
            .and_then(|target| target.replace_thing(&view, index, ThingRef::Item(replacement)));
        if replaced != Some(thing) {
            error!(target: "error", item = item.0, "replace_thing did not find the transformed item");
            self.free_thing(ThingRef::Item(replacement));
            return Err(ReturnValue::NotPossible);
        }
        if let Some(target) = self.item_mut(replacement) {
            target.holder = Some(holder);
        }
        if let Some(source) = self.item_mut(item) {
            source.holder = None;
            source.removed = true;
        }
        self.notify_remove(holder, thing, index, true);
        self.notify_add(holder, ThingRef::Item(replacement));
        self.free_thing(thing);
        Ok(Some(replacement))
    }

    fn copy_item_attributes(&mut self, from: ItemId, to: ItemId) {
        if let Some(source) = self.item(from).cloned() {
            if let Some(target) = self.item_mut(to) {
                target.copy_attributes_from(&source);
            }
        }
    }

    /// Gives a detached item to a player, dropping it at their feet if it does not fit.
    pub fn player_add_item(&mut self, player: CreatureId, item: ItemId) -> Result<ItemId, ReturnValue> {
        let position = self
            .creature(player)
            .map(|creature| creature.position)
            .ok_or(ReturnValue::NotPossible)?;
        match self.add_item(
            HolderRef::Inventory(player),
            item,
            SlotHint::Anywhere,
            MoveFlags::NONE,
            false,
        ) {
            Ok(placed) => Ok(placed),
            Err(_) => self.add_item(
                HolderRef::Tile(position),
                item,
                SlotHint::Anywhere,
                MoveFlags::NO_LIMIT,
                false,
            ),
        }
    }

    /// Moves an item or creature to `destination` regardless of blocking.
    pub fn teleport(&mut self, thing: ThingRef, destination: Position) -> Result<(), ReturnValue> {
        if !self.holders.map.has_tile(destination) {
            return Err(ReturnValue::NotPossible);
        }
        match thing {
            ThingRef::Item(item) => {
                let from = self.holder_of(thing).ok_or(ReturnValue::NotPossible)?;
                let units = self.view().units(item);
                self.move_item(
                    from,
                    HolderRef::Tile(destination),
                    SlotHint::Anywhere,
                    item,
                    units,
                    MoveFlags::NO_LIMIT,
                )
                .map(|_| ())
            }
            ThingRef::Creature(creature) => {
                self.move_creature_to(creature, destination, MoveFlags::NO_LIMIT)
            }
        }
    }
}
