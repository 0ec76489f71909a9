use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::world::holder::{
    check_owner_capacity, owner_capacity_units, query_remove_item, Destination, Holder, HolderRef,
    MoveFlags, SlotHint, ThingRef, ThingView, WorldView,
};
use crate::world::item_types::{ItemType, MAX_STACK};
use crate::world::outcome::{AddQuery, ReturnValue};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventorySlot {
    Head,
    Necklace,
    Backpack,
    Armor,
    RightHand,
    LeftHand,
    Legs,
    Feet,
    Ring,
    Ammo,
}

impl InventorySlot {
    const COUNT: usize = 10;

    pub fn index(self) -> usize {
        match self {
            InventorySlot::Head => 0,
            InventorySlot::Necklace => 1,
            InventorySlot::Backpack => 2,
            InventorySlot::Armor => 3,
            InventorySlot::RightHand => 4,
            InventorySlot::LeftHand => 5,
            InventorySlot::Legs => 6,
            InventorySlot::Feet => 7,
            InventorySlot::Ring => 8,
            InventorySlot::Ammo => 9,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(InventorySlot::Head),
            1 => Some(InventorySlot::Necklace),
            2 => Some(InventorySlot::Backpack),
            3 => Some(InventorySlot::Armor),
            4 => Some(InventorySlot::RightHand),
            5 => Some(InventorySlot::LeftHand),
            6 => Some(InventorySlot::Legs),
            7 => Some(InventorySlot::Feet),
            8 => Some(InventorySlot::Ring),
            9 => Some(InventorySlot::Ammo),
            _ => None,
        }
    }

    /// Hands and the ammo slot take anything; the rest only take matching equipment.
    pub fn accepts(self, item_type: &ItemType) -> bool {
        match self {
            InventorySlot::RightHand | InventorySlot::LeftHand | InventorySlot::Ammo => true,
            slot => item_type.slot == Some(slot),
        }
    }
}

pub const INVENTORY_SLOTS: [InventorySlot; 10] = [
    InventorySlot::Head,
    InventorySlot::Necklace,
    InventorySlot::Backpack,
    InventorySlot::Armor,
    InventorySlot::RightHand,
    InventorySlot::LeftHand,
    InventorySlot::Legs,
    InventorySlot::Feet,
    InventorySlot::Ring,
    InventorySlot::Ammo,
];

/// Equipment slots of one player, acting as a holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    owner: CreatureId,
    slots: [Option<ItemId>; InventorySlot::COUNT],
    /// Carry limit in the same unit as item weights.
    pub capacity: u32,
}

impl Inventory {
    pub fn new(owner: CreatureId, capacity: u32) -> Self {
        Self {
            owner,
            slots: [None; InventorySlot::COUNT],
            capacity,
        }
    }

    pub fn owner(&self) -> CreatureId {
        self.owner
    }

    pub fn slot(&self, slot: InventorySlot) -> Option<ItemId> {
        self.slots[slot.index()]
    }

    pub fn items(&self) -> impl Iterator<Item = (InventorySlot, ItemId)> + '_ {
        INVENTORY_SLOTS
            .iter()
            .filter_map(|slot| self.slots[slot.index()].map(|id| (*slot, id)))
    }

    pub fn carried_weight(&self, view: &WorldView<'_>) -> u32 {
        self.items()
            .map(|(_, id)| view.weight_of(id, view.units(id)))
            .sum()
    }

    pub fn free_capacity(&self, view: &WorldView<'_>) -> u32 {
        self.capacity.saturating_sub(self.carried_weight(view))
    }

    fn slot_from_hint(slot: SlotHint) -> Option<InventorySlot> {
        match slot {
            SlotHint::Slot(slot) => Some(slot),
            SlotHint::Index(index) => InventorySlot::from_index(index),
            SlotHint::Anywhere => None,
        }
    }

    /// Free slot an item lands in when no slot is named.
    fn auto_slot(&self, item_type: Option<&ItemType>) -> Option<InventorySlot> {
        let preferred = item_type.and_then(|t| t.slot);
        preferred
            .into_iter()
            .chain([InventorySlot::RightHand, InventorySlot::LeftHand])
            .find(|slot| self.slots[slot.index()].is_none())
    }

    /// Containers reachable from the equipment slots, breadth first.
    fn reachable_containers(&self, view: &WorldView<'_>) -> Vec<ItemId> {
        let mut found = Vec::new();
        let mut queue: VecDeque<ItemId> = self
            .items()
            .map(|(_, id)| id)
            .filter(|id| view.holders.containers.contains_key(id))
            .collect();
        while let Some(id) = queue.pop_front() {
            found.push(id);
            if let Some(container) = view.holders.containers.get(&id) {
                queue.extend(
                    container
                        .items()
                        .iter()
                        .filter(|child| view.holders.containers.contains_key(child)),
                );
            }
        }
        found
    }

    fn same_stack_with_room(view: &WorldView<'_>, existing: ItemId, moving: ItemId) -> bool {
        existing != moving
            && view.things().is_stackable(moving)
            && view
                .item(existing)
                .zip(view.item(moving))
                .map_or(false, |(a, b)| a.type_id == b.type_id && a.count < MAX_STACK)
    }
}

impl Holder for Inventory {
    fn holder_ref(&self) -> HolderRef {
        HolderRef::Inventory(self.owner)
    }

    fn query_add(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        count: u16,
        flags: MoveFlags,
    ) -> AddQuery {
        let ThingRef::Item(id) = thing else {
            return AddQuery::Fail(ReturnValue::NotPossible);
        };
        let Some(item_type) = view.item_type(id) else {
            return AddQuery::Fail(ReturnValue::NotPossible);
        };
        if !item_type.pickupable {
            return AddQuery::Fail(ReturnValue::NotPickupable);
        }
        match Self::slot_from_hint(slot) {
            Some(target) => {
                if !target.accepts(item_type) {
                    return AddQuery::Fail(ReturnValue::CannotBeDressed);
                }
                if let Some(occupant) = self.slots[target.index()] {
                    if occupant != id && !Self::same_stack_with_room(view, occupant, id) {
                        return AddQuery::NeedExchange(occupant);
                    }
                }
            }
            None => {
                if self.auto_slot(Some(item_type)).is_none() && !flags.contains(MoveFlags::NO_LIMIT) {
                    return AddQuery::Fail(ReturnValue::NotEnoughRoom);
                }
            }
        }
        match check_owner_capacity(view, self.owner, id, count, flags) {
            Ok(()) => AddQuery::Ok,
            Err(reason) => AddQuery::Fail(reason),
        }
    }

    fn query_max_count(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        count: u16,
        flags: MoveFlags,
    ) -> (u16, Result<(), ReturnValue>) {
        let ThingRef::Item(id) = thing else {
            return (0, Err(ReturnValue::NotPossible));
        };
        if !view.things().is_stackable(id) {
            return (1, Ok(()));
        }
        // A merge remainder becomes a new stack in a free hand.
        let new_stack_room = if self.auto_slot(view.item_type(id)).is_some() {
            MAX_STACK
        } else {
            0
        };
        let room = match Self::slot_from_hint(slot) {
            Some(target) => match self.slots[target.index()] {
                None => MAX_STACK,
                Some(occupant) if occupant == id => count,
                Some(occupant) if Self::same_stack_with_room(view, occupant, id) => view
                    .item(occupant)
                    .map_or(0, |existing| MAX_STACK.saturating_sub(existing.count))
                    .saturating_add(new_stack_room),
                Some(_) => 0,
            },
            None => new_stack_room,
        };
        let mut max = room.min(count);
        let mut reason = ReturnValue::NotEnoughRoom;
        if !flags.contains(MoveFlags::NO_LIMIT) && !flags.contains(MoveFlags::CHILD_IS_OWNER) {
            let carry = owner_capacity_units(view, self.owner, id, count);
            if carry < max {
                max = carry;
                reason = ReturnValue::NotEnoughCapacity;
            }
        }
        if max < count {
            (max, Err(reason))
        } else {
            (max, Ok(()))
        }
    }

    fn query_remove(&self, view: &WorldView<'_>, thing: ThingRef, count: u16) -> Result<(), ReturnValue> {
        query_remove_item(self, view, thing, count)
    }

    fn query_destination(
        &self,
        view: &WorldView<'_>,
        slot: SlotHint,
        thing: ThingRef,
        _flags: MoveFlags,
    ) -> Destination {
        let here = self.holder_ref();
        let ThingRef::Item(id) = thing else {
            return Destination::at(here, slot);
        };

        if let Some(target) = Self::slot_from_hint(slot) {
            if let Some(occupant) = self.slots[target.index()] {
                if occupant == id {
                    return Destination {
                        holder: here,
                        slot: SlotHint::Slot(target),
                        to_item: Some(id),
                    };
                }
                if view.holders.containers.contains_key(&occupant)
                    && !view.holder_is_within(HolderRef::Container(occupant), id)
                {
                    return Destination::at(HolderRef::Container(occupant), SlotHint::Anywhere);
                }
                if Self::same_stack_with_room(view, occupant, id) {
                    return Destination {
                        holder: here,
                        slot: SlotHint::Slot(target),
                        to_item: Some(occupant),
                    };
                }
            }
            return Destination::at(here, SlotHint::Slot(target));
        }

        let containers: Vec<ItemId> = self
            .reachable_containers(view)
            .into_iter()
            .filter(|container| {
                *container != id && !view.holder_is_within(HolderRef::Container(*container), id)
            })
            .collect();

        if view.things().is_stackable(id) {
            if let Some((slot, stack)) = self
                .items()
                .find(|(_, existing)| Self::same_stack_with_room(view, *existing, id))
            {
                return Destination {
                    holder: here,
                    slot: SlotHint::Slot(slot),
                    to_item: Some(stack),
                };
            }
            for container_id in &containers {
                let Some(container) = view.holders.containers.get(container_id) else {
                    continue;
                };
                let stack = container
                    .items()
                    .iter()
                    .enumerate()
                    .find(|(_, existing)| Self::same_stack_with_room(view, **existing, id));
                if let Some((index, stack)) = stack {
                    return Destination {
                        holder: HolderRef::Container(*container_id),
                        slot: SlotHint::Index(index),
                        to_item: Some(*stack),
                    };
                }
            }
        }

        if let Some(free) = self.auto_slot(view.item_type(id)) {
            return Destination::at(here, SlotHint::Slot(free));
        }

        let open = containers.iter().find(|container_id| {
            view.holders
                .containers
                .get(container_id)
                .map_or(false, |container| !container.is_full())
        });
        if let Some(container_id) = open {
            return Destination::at(HolderRef::Container(*container_id), SlotHint::Anywhere);
        }
        Destination::at(here, SlotHint::Anywhere)
    }

    fn index_of(&self, thing: ThingRef) -> Option<usize> {
        let ThingRef::Item(id) = thing else {
            return None;
        };
        self.slots.iter().position(|slot| *slot == Some(id))
    }

    fn thing_at(&self, index: usize) -> Option<ThingRef> {
        self.slots.get(index).copied().flatten().map(ThingRef::Item)
    }

    fn thing_count(&self) -> usize {
        InventorySlot::COUNT
    }

    fn add_thing(&mut self, view: &ThingView<'_>, slot: SlotHint, thing: ThingRef) -> Result<(), ReturnValue> {
        let ThingRef::Item(id) = thing else {
            return Err(ReturnValue::NotPossible);
        };
        let target = match Self::slot_from_hint(slot) {
            Some(target) if self.slots[target.index()].is_some() => return Err(ReturnValue::NotEnoughRoom),
            Some(target) => target,
            None => self
                .auto_slot(view.item_type(id))
                .ok_or(ReturnValue::NotEnoughRoom)?,
        };
        self.slots[target.index()] = Some(id);
        Ok(())
    }

    fn remove_thing(&mut self, thing: ThingRef) -> Option<usize> {
        let index = self.index_of(thing)?;
        self.slots[index] = None;
        Some(index)
    }

    fn replace_thing(&mut self, _view: &ThingView<'_>, index: usize, thing: ThingRef) -> Option<ThingRef> {
        let ThingRef::Item(id) = thing else {
            return None;
        };
        let slot = self.slots.get_mut(index)?;
        slot.replace(id).map(ThingRef::Item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::item::{ItemKind, ItemTypeId};

    #[test]
    fn slot_index_round_trips_for_every_slot() {
        for slot in INVENTORY_SLOTS {
            assert_eq!(InventorySlot::from_index(slot.index()), Some(slot));
        }
        assert_eq!(InventorySlot::from_index(10), None);
    }

    #[test]
    fn equipment_slots_require_matching_items() {
        let mut helmet = ItemType::new(ItemTypeId(1), "helmet", ItemKind::Armor);
        helmet.slot = Some(InventorySlot::Head);
        let sword = ItemType::new(ItemTypeId(2), "sword", ItemKind::Weapon);

        assert!(InventorySlot::Head.accepts(&helmet));
        assert!(!InventorySlot::Head.accepts(&sword));
        assert!(InventorySlot::LeftHand.accepts(&sword));
        assert!(InventorySlot::RightHand.accepts(&helmet));
    }
}
