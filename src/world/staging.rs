use crate::world::events::Notifications;
use crate::world::holder::{
    Destination, Holder, HolderRef, MoveFlags, SlotHint, ThingRef, ThingView, WorldView,
};
use crate::world::outcome::{AddQuery, ReturnValue};

/// Scratch holder for items a script creates before it decides where they go.
/// Accepts anything and stays invisible to observers; whatever is still here
/// when the task ends is released.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TemporaryHolding {
    things: Vec<ThingRef>,
}

impl TemporaryHolding {
    pub fn things(&self) -> &[ThingRef] {
        &self.things
    }

    pub fn take_all(&mut self) -> Vec<ThingRef> {
        std::mem::take(&mut self.things)
    }
}

impl Holder for TemporaryHolding {
    fn holder_ref(&self) -> HolderRef {
        HolderRef::Staging
    }

    fn query_add(
        &self,
        _view: &WorldView<'_>,
        _slot: SlotHint,
        thing: ThingRef,
        _count: u16,
        _flags: MoveFlags,
    ) -> AddQuery {
        match thing {
            ThingRef::Item(_) => AddQuery::Ok,
            ThingRef::Creature(_) => AddQuery::Fail(ReturnValue::NotPossible),
        }
    }

    fn query_max_count(
        &self,
        _view: &WorldView<'_>,
        _slot: SlotHint,
        _thing: ThingRef,
        count: u16,
        _flags: MoveFlags,
    ) -> (u16, Result<(), ReturnValue>) {
        (count, Ok(()))
    }

    fn query_remove(&self, _view: &WorldView<'_>, thing: ThingRef, _count: u16) -> Result<(), ReturnValue> {
        if self.things.contains(&thing) {
            Ok(())
        } else {
            Err(ReturnValue::NotPossible)
        }
    }

    fn query_destination(
        &self,
        _view: &WorldView<'_>,
        slot: SlotHint,
        _thing: ThingRef,
        _flags: MoveFlags,
    ) -> Destination {
        Destination::at(HolderRef::Staging, slot)
    }

    fn index_of(&self, thing: ThingRef) -> Option<usize> {
        self.things.iter().position(|other| *other == thing)
    }

    fn thing_at(&self, index: usize) -> Option<ThingRef> {
        self.things.get(index).copied()
    }

    fn thing_count(&self) -> usize {
        self.things.len()
    }

    fn add_thing(&mut self, _view: &ThingView<'_>, _slot: SlotHint, thing: ThingRef) -> Result<(), ReturnValue> {
        self.things.push(thing);
        Ok(())
    }

    fn remove_thing(&mut self, thing: ThingRef) -> Option<usize> {
        let index = self.index_of(thing)?;
        self.things.remove(index);
        Some(index)
    }

    fn replace_thing(&mut self, _view: &ThingView<'_>, index: usize, thing: ThingRef) -> Option<ThingRef> {
        let slot = self.things.get_mut(index)?;
        Some(std::mem::replace(slot, thing))
    }

    fn post_add_notification(&self, _thing: ThingRef, _index: usize, _sink: &mut Notifications) {}

    fn post_remove_notification(
        &self,
        _thing: ThingRef,
        _index: usize,
        _complete: bool,
        _sink: &mut Notifications,
    ) {
    }
}
