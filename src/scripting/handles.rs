//! Integer handles for the scripting runtime. Scripts never hold ids into the
//! arena directly; every handle is minted during a task and forgotten when
//! the task ends.

use crate::entities::item::{ItemId, ItemTypeId};
use crate::world::engine::WorldEngine;
use crate::world::holder::{HolderRef, MoveFlags, SlotHint, ThingRef};
use crate::world::outcome::{MoveOutcome, ReturnValue};
use std::collections::HashMap;

pub const FIRST_HANDLE: u32 = 70_000;

#[derive(Debug)]
pub struct ScriptHandles {
    by_handle: HashMap<u32, ThingRef>,
    by_thing: HashMap<ThingRef, u32>,
    next: u32,
}

impl Default for ScriptHandles {
    fn default() -> Self {
        Self {
            by_handle: HashMap::new(),
            by_thing: HashMap::new(),
            next: FIRST_HANDLE,
        }
    }
}

impl ScriptHandles {
    /// Same thing, same handle, for the rest of the task.
    pub fn mint(&mut self, thing: ThingRef) -> u32 {
        if let Some(handle) = self.by_thing.get(&thing) {
            return *handle;
        }
        let handle = self.next;
        self.next = self.next.wrapping_add(1).max(FIRST_HANDLE);
        self.by_handle.insert(handle, thing);
        self.by_thing.insert(thing, handle);
        handle
    }

    pub fn resolve(&self, handle: u32) -> Option<ThingRef> {
        self.by_handle.get(&handle).copied()
    }

    /// Drops the handle of a destroyed thing so it cannot be resolved again.
    pub fn forget(&mut self, thing: ThingRef) {
        if let Some(handle) = self.by_thing.remove(&thing) {
            self.by_handle.remove(&handle);
        }
    }

    pub fn reset(&mut self) {
        self.by_handle.clear();
        self.by_thing.clear();
        self.next = FIRST_HANDLE;
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

/// Hook the scripting runtime installs into the engine.
pub trait ScriptBridge: Send {
    /// `None` leaves the use to the default behaviour.
    fn on_use(&mut self, world: &mut WorldEngine, player: u32, item: u32) -> Option<Result<(), ReturnValue>>;
}

impl WorldEngine {
    pub fn resolve_handle(&self, handle: u32) -> Option<ThingRef> {
        let thing = self.scripts.resolve(handle)?;
        let live = match thing {
            ThingRef::Item(id) => self.item(id).map_or(false, |item| !item.removed),
            ThingRef::Creature(id) => self.creature(id).map_or(false, |creature| !creature.removed),
        };
        live.then_some(thing)
    }

    pub fn mint_handle(&mut self, thing: ThingRef) -> u32 {
        self.scripts.mint(thing)
    }

    /// Creates an item in the staging area. Unless a script places it, the
    /// item is released when the task ends.
    pub fn script_create_item(&mut self, type_id: ItemTypeId, count: u16) -> Result<u32, ReturnValue> {
        let item = self.create_item(type_id, count)?;
        self.attach(HolderRef::Staging, SlotHint::Anywhere, ThingRef::Item(item))?;
        Ok(self.scripts.mint(ThingRef::Item(item)))
    }

    /// Moves a staged item to its final holder. Units the holder cannot take
    /// are dropped on the tile below it and the clamp is reported in the
    /// outcome.
    pub fn script_place_item(&mut self, handle: u32, to: HolderRef, slot: SlotHint) -> Result<MoveOutcome, ReturnValue> {
        let item = self
            .resolve_handle(handle)
            .and_then(ThingRef::item)
            .ok_or(ReturnValue::NotPossible)?;
        if self.holder_of(ThingRef::Item(item)) != Some(HolderRef::Staging) {
            return Err(ReturnValue::NotPossible);
        }
        let count = self.view().units(item);
        let outcome = self.move_item(HolderRef::Staging, to, slot, item, count, MoveFlags::NONE)?;
        if outcome.clamped.is_some() && self.holder_of(ThingRef::Item(item)) == Some(HolderRef::Staging) {
            let position = self.view().holder_position(to).ok_or(ReturnValue::NotPossible)?;
            let leftover = self.view().units(item);
            self.move_item(
                HolderRef::Staging,
                HolderRef::Tile(position),
                SlotHint::Anywhere,
                item,
                leftover,
                MoveFlags::NO_LIMIT,
            )?;
        }
        Ok(outcome)
    }
}
