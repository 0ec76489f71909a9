use crate::entities::item::ItemId;
use crate::world::engine::WorldEngine;
use crate::world::holder::{HolderRef, MoveFlags, SlotHint};
use crate::world::item_types::MAX_STACK;
use crate::world::outcome::ReturnValue;
use tracing::warn;

impl WorldEngine {
    fn coin_value(&self, id: ItemId) -> Option<u64> {
        let item = self.item(id)?;
        let item_type = self.catalog.get(item.type_id)?;
        item_type
            .is_currency()
            .then(|| u64::from(item_type.worth) * u64::from(item.count))
    }

    /// Total value of the currency inside `holder`, nested containers included.
    pub fn get_money(&self, holder: HolderRef) -> u64 {
        self.holder_items_bfs(holder)
            .into_iter()
            .filter_map(|id| self.coin_value(id))
            .sum()
    }

    /// Takes `amount` out of `holder`, smallest coin stacks first. The last
    /// stack is taken whole and the excess paid back as change.
    pub fn remove_money(&mut self, holder: HolderRef, amount: u64) -> Result<(), ReturnValue> {
        if amount == 0 {
            return Ok(());
        }
        let mut coins: Vec<(u64, ItemId)> = self
            .holder_items_bfs(holder)
            .into_iter()
            .filter_map(|id| self.coin_value(id).map(|value| (value, id)))
            .collect();
        let total: u64 = coins.iter().map(|(value, _)| value).sum();
        if total < amount {
            return Err(ReturnValue::NotEnoughMoney);
        }
        coins.sort();

        let mut remaining = amount;
        for (value, id) in coins {
            if remaining == 0 {
                break;
            }
            self.remove_item(id, None, false)?;
            if value <= remaining {
                remaining -= value;
            } else {
                let change = value - remaining;
                remaining = 0;
                self.add_money(holder, change)?;
            }
        }
        Ok(())
    }

    /// Pays `amount` into `holder` using the largest coins first. Stacks that
    /// do not fit are dropped on the tile the holder belongs to.
    pub fn add_money(&mut self, holder: HolderRef, amount: u64) -> Result<(), ReturnValue> {
        let currencies: Vec<_> = self
            .catalog
            .currencies()
            .into_iter()
            .map(|coin| (coin.id, u64::from(coin.worth)))
            .collect();
        let mut remaining = amount;
        for (coin, worth) in currencies {
            let mut coins = remaining / worth;
            remaining %= worth;
            while coins > 0 {
                let stack = coins.min(u64::from(MAX_STACK)) as u16;
                coins -= u64::from(stack);
                let item = self.create_item(coin, stack)?;
                if self
                    .add_item(holder, item, SlotHint::Anywhere, MoveFlags::NONE, false)
                    .is_ok()
                {
                    continue;
                }
                let Some(position) = self.view().holder_position(holder) else {
                    self.free_thing(crate::world::holder::ThingRef::Item(item));
                    return Err(ReturnValue::NotEnoughRoom);
                };
                self.add_item(
                    HolderRef::Tile(position),
                    item,
                    SlotHint::Anywhere,
                    MoveFlags::NO_LIMIT,
                    false,
                )?;
            }
        }
        if remaining > 0 {
            warn!(target: "game", remaining, "amount below the smallest coin was not paid out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testkit::{self, *};

    #[test]
    fn change_is_minted_from_the_last_coin() {
        let mut world = testkit::world();
        let player = testkit::spawn_player(&mut world, "Alice", CENTER);
        let backpack = testkit::equip(&mut world, player, crate::entities::inventory::InventorySlot::Backpack, BACKPACK);
        testkit::put_in_container(&mut world, backpack, GOLD, 100);
        testkit::put_in_container(&mut world, backpack, CRYSTAL, 1);
        let holder = HolderRef::Inventory(player);
        assert_eq!(world.get_money(holder), 10_100);

        world.remove_money(holder, 150).expect("paid");

        assert_eq!(world.get_money(holder), 9_950);
        assert_eq!(world.item_type_count(holder, CRYSTAL, None), 0);
        assert_eq!(world.item_type_count(holder, PLATINUM, None), 99);
        assert_eq!(world.item_type_count(holder, GOLD, None), 50);
    }

    #[test]
    fn insufficient_funds_remove_nothing() {
        let mut world = testkit::world();
        let bag = testkit::put_on_tile(&mut world, CENTER, BAG, 1);
        testkit::put_in_container(&mut world, bag, GOLD, 20);
        let holder = HolderRef::Container(bag);

        assert_eq!(world.remove_money(holder, 21), Err(ReturnValue::NotEnoughMoney));
        assert_eq!(world.get_money(holder), 20);
    }

    #[test]
    fn removed_money_can_be_paid_back() {
        let mut world = testkit::world();
        let bag = testkit::put_on_tile(&mut world, CENTER, BAG, 1);
        testkit::put_in_container(&mut world, bag, PLATINUM, 3);
        testkit::put_in_container(&mut world, bag, GOLD, 7);
        let holder = HolderRef::Container(bag);
        let before = world.get_money(holder);

        world.remove_money(holder, 123).expect("remove");
        world.add_money(holder, 123).expect("add");
        assert_eq!(world.get_money(holder), before);
    }

    #[test]
    fn overflow_spills_onto_the_tile() {
        let mut world = testkit::world();
        let bag = testkit::put_on_tile(&mut world, CENTER, BAG, 1);
        for _ in 0..BAG_CAPACITY {
            testkit::put_in_container(&mut world, bag, SWORD, 1);
        }
        world.add_money(HolderRef::Container(bag), 250).expect("paid");
        assert_eq!(world.get_money(HolderRef::Container(bag)), 0);
        assert_eq!(world.get_money(HolderRef::Tile(CENTER)), 250);
    }
}
