use crate::entities::item::ItemId;
use crate::world::holder::{
    check_owner_capacity, owner_capacity_units, query_remove_item, Destination, Holder, HolderRef,
    MoveFlags, SlotHint, ThingRef, ThingView, WorldView,
};
use crate::world::item_types::MAX_STACK;
use crate::world::outcome::{AddQuery, ReturnValue};

/// Contents of a container item. Newly added things go to index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    id: ItemId,
    capacity: u16,
    items: Vec<ItemId>,
}

impl Container {
    pub fn new(id: ItemId, capacity: u16) -> Self {
        Self {
            id,
            capacity,
            items: Vec::new(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= usize::from(self.capacity)
    }

    pub fn free_slots(&self) -> u16 {
        self.capacity
            .saturating_sub(self.items.len().min(usize::from(u16::MAX)) as u16)
    }

    /// Player whose inventory (eventually) holds this container.
    fn owner(&self, view: &WorldView<'_>) -> Option<crate::entities::creature::CreatureId> {
        match view.top_holder(HolderRef::Container(self.id)) {
            HolderRef::Inventory(owner) => Some(owner),
            _ => None,
        }
    }

    fn mergeable_stack(&self, view: &WorldView<'_>, moving: ItemId) -> Option<(usize, ItemId)> {
        let moving_type = view.item(moving)?.type_id;
        self.items.iter().enumerate().find_map(|(index, candidate)| {
            let existing = view.item(*candidate)?;
            (*candidate != moving && existing.type_id == moving_type && existing.count < MAX_STACK)
                .then_some((index, *candidate))
        })
    }
}

impl Holder for Container {
    fn holder_ref(&self) -> HolderRef {
        HolderRef::Container(self.id)
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
        if id == self.id || view.holder_is_within(self.holder_ref(), id) {
            return AddQuery::Fail(ReturnValue::ThisIsImpossible);
        }
        let Some(item_type) = view.item_type(id) else {
            return AddQuery::Fail(ReturnValue::NotPossible);
        };
        if !item_type.pickupable {
            return AddQuery::Fail(ReturnValue::NotPickupable);
        }
        if flags.contains(MoveFlags::NO_LIMIT) {
            return AddQuery::Ok;
        }
        if slot == SlotHint::Anywhere && self.is_full() {
            return AddQuery::Fail(ReturnValue::ContainerNotEnoughRoom);
        }
        if let Some(owner) = self.owner(view) {
            if let Err(reason) = check_owner_capacity(view, owner, id, count, flags) {
                return AddQuery::Fail(reason);
            }
        }
        AddQuery::Ok
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
            if slot == SlotHint::Anywhere && self.is_full() && !flags.contains(MoveFlags::NO_LIMIT) {
                return (0, Err(ReturnValue::ContainerNotEnoughRoom));
            }
            return (1, Ok(()));
        }
        if flags.contains(MoveFlags::NO_LIMIT) {
            return (count, Ok(()));
        }

        let moving_type = view.item(id).map(|item| item.type_id);
        let stack_room = match slot {
            SlotHint::Index(index) => self
                .items
                .get(index)
                .and_then(|existing| view.item(*existing))
                .filter(|existing| Some(existing.type_id) == moving_type && existing.id != id)
                .map_or(0, |existing| MAX_STACK.saturating_sub(existing.count)),
            _ => 0,
        };
        let new_stack_room = if self.is_full() { 0 } else { MAX_STACK };
        let room = stack_room.saturating_add(new_stack_room).min(count);
        let mut max = room;
        let mut reason = ReturnValue::ContainerNotEnoughRoom;
        if let Some(owner) = self.owner(view) {
            if !flags.contains(MoveFlags::CHILD_IS_OWNER) {
                let carry = owner_capacity_units(view, owner, id, count);
                if carry < max {
                    max = carry;
                    reason = ReturnValue::NotEnoughCapacity;
                }
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
        let ThingRef::Item(id) = thing else {
            return Destination::at(self.holder_ref(), slot);
        };
        if let SlotHint::Index(index) = slot {
            if let Some(target) = self.items.get(index).copied() {
                if target != id {
                    if view.holders.containers.contains_key(&target) {
                        return Destination::at(HolderRef::Container(target), SlotHint::Anywhere);
                    }
                    let same_stack = view.things().is_stackable(id)
                        && view.item(target).zip(view.item(id)).map_or(false, |(a, b)| {
                            a.type_id == b.type_id && a.count < MAX_STACK
                        });
                    if same_stack {
                        return Destination {
                            holder: self.holder_ref(),
                            slot,
                            to_item: Some(target),
                        };
                    }
                }
            }
            return Destination::at(self.holder_ref(), SlotHint::Anywhere);
        }
        if view.things().is_stackable(id) {
            if let Some((index, stack)) = self.mergeable_stack(view, id) {
                return Destination {
                    holder: self.holder_ref(),
                    slot: SlotHint::Index(index),
                    to_item: Some(stack),
                };
            }
        }
        Destination::at(self.holder_ref(), SlotHint::Anywhere)
    }

    fn index_of(&self, thing: ThingRef) -> Option<usize> {
        let ThingRef::Item(id) = thing else {
            return None;
        };
        self.items.iter().position(|other| *other == id)
    }

    fn thing_at(&self, index: usize) -> Option<ThingRef> {
        self.items.get(index).copied().map(ThingRef::Item)
    }

    fn thing_count(&self) -> usize {
        self.items.len()
    }

    fn add_thing(&mut self, _view: &ThingView<'_>, _slot: SlotHint, thing: ThingRef) -> Result<(), ReturnValue> {
        let ThingRef::Item(id) = thing else {
            return Err(ReturnValue::NotPossible);
        };
        self.items.insert(0, id);
        Ok(())
    }

    fn remove_thing(&mut self, thing: ThingRef) -> Option<usize> {
        let index = self.index_of(thing)?;
        self.items.remove(index);
        Some(index)
    }

    fn replace_thing(&mut self, _view: &ThingView<'_>, index: usize, thing: ThingRef) -> Option<ThingRef> {
        let ThingRef::Item(id) = thing else {
            return None;
        };
        let slot = self.items.get_mut(index)?;
        let old = *slot;
        *slot = id;
        Some(ThingRef::Item(old))
    }
}
