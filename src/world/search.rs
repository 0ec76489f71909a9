use crate::entities::item::{ItemId, ItemTypeId};
use crate::world::engine::WorldEngine;
use crate::world::holder::{HolderRef, ThingRef};
use crate::world::outcome::ReturnValue;
use std::collections::VecDeque;

impl WorldEngine {
    /// Every item inside `holder`, breadth first through nested containers.
    pub fn holder_items_bfs(&self, holder: HolderRef) -> Vec<ItemId> {
        let view = self.view();
        let mut found = Vec::new();
        let mut queue = VecDeque::from([holder]);
        while let Some(current) = queue.pop_front() {
            let Some(target) = view.holder(current) else {
                continue;
            };
            for index in 0..target.thing_count() {
                let Some(id) = target.thing_at(index).and_then(ThingRef::item) else {
                    continue;
                };
                found.push(id);
                if self.holders.containers.contains_key(&id) {
                    queue.push_back(HolderRef::Container(id));
                }
            }
        }
        found
    }

    fn matches_type(&self, id: ItemId, type_id: ItemTypeId, subtype: Option<u16>) -> bool {
        let Some(item) = self.item(id) else {
            return false;
        };
        if item.type_id != type_id {
            return false;
        }
        match (subtype, self.catalog.get(type_id)) {
            (Some(wanted), Some(item_type)) if !item_type.stackable => item.count == wanted,
            _ => true,
        }
    }

    /// First item of `type_id` in `holder`; `subtype` narrows non-stackables
    /// by their charges or fluid kind.
    pub fn find_item_of_type(&self, holder: HolderRef, type_id: ItemTypeId, subtype: Option<u16>) -> Option<ItemId> {
        self.holder_items_bfs(holder)
            .into_iter()
            .find(|id| self.matches_type(*id, type_id, subtype))
    }

    pub fn item_type_count(&self, holder: HolderRef, type_id: ItemTypeId, subtype: Option<u16>) -> u32 {
        let view = self.view();
        self.holder_items_bfs(holder)
            .into_iter()
            .filter(|id| self.matches_type(*id, type_id, subtype))
            .map(|id| u32::from(view.units(id)))
            .sum()
    }

    /// Removes `count` units of a type spread over any number of items.
    /// Nothing is removed unless the holder has enough.
    pub fn remove_item_of_type(
        &mut self,
        holder: HolderRef,
        type_id: ItemTypeId,
        count: u32,
        subtype: Option<u16>,
    ) -> Result<(), ReturnValue> {
        if self.item_type_count(holder, type_id, subtype) < count {
            return Err(ReturnValue::NotPossible);
        }
        let mut remaining = count;
        for id in self.holder_items_bfs(holder) {
            if remaining == 0 {
                break;
            }
            if !self.matches_type(id, type_id, subtype) {
                continue;
            }
            let units = u32::from(self.view().units(id));
            let take = units.min(remaining);
            self.remove_item(id, Some(take as u16), false)?;
            remaining -= take;
        }
        Ok(())
    }
}
