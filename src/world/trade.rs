use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::entities::player::{TradePhase, TradeSession};
use crate::world::engine::WorldEngine;
use crate::world::events::WorldEvent;
use crate::world::holder::{HolderRef, MoveFlags, SlotHint};
use crate::world::outcome::ReturnValue;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};

/// Items currently offered in a trade, mapped to the player offering them.
/// Each entry holds a reference on the item so it outlives a detach.
#[derive(Debug, Default)]
pub struct TradeRegistry {
    items: HashMap<ItemId, CreatureId>,
}

impl TradeRegistry {
    pub fn owner_of(&self, item: ItemId) -> Option<CreatureId> {
        self.items.get(&item).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn offered(&self) -> impl Iterator<Item = (ItemId, CreatureId)> + '_ {
        self.items.iter().map(|(item, owner)| (*item, *owner))
    }
}

impl WorldEngine {
    fn trade_session(&self, player: CreatureId) -> Result<TradeSession, ReturnValue> {
        self.player(player)
            .map(|player| player.trade)
            .ok_or(ReturnValue::NotPossible)
    }

    fn set_trade_session(&mut self, player: CreatureId, session: TradeSession) {
        if let Some(player) = self.player_mut(player) {
            player.trade = session;
        }
    }

    /// Offers `item` to `partner`. The item must be carried by the player and
    /// must not already be part of any trade, alone or through a container.
    pub fn request_trade(&mut self, player: CreatureId, partner: CreatureId, item: ItemId) -> Result<(), ReturnValue> {
        if player == partner || !self.holders.players.contains_key(&partner) {
            return Err(ReturnValue::NotPossible);
        }
        let own = self.trade_session(player)?;
        let theirs = self.trade_session(partner)?;
        let answering = own.phase == TradePhase::Acknowledge && own.partner == Some(partner);
        if own.phase != TradePhase::None && !answering {
            return Err(ReturnValue::AlreadyTrading);
        }
        let partner_busy = matches!(theirs.phase, TradePhase::Accept | TradePhase::Transfer)
            || (theirs.phase != TradePhase::None && theirs.partner != Some(player));
        if partner_busy {
            return Err(ReturnValue::ThisPlayerAlreadyTrading);
        }

        let view = self.view();
        let (Some(own_position), Some(partner_position)) = (
            self.creature(player).map(|creature| creature.position),
            self.creature(partner).map(|creature| creature.position),
        ) else {
            return Err(ReturnValue::NotPossible);
        };
        if !own_position.is_in_range(partner_position, 2, 2, 0) {
            return Err(ReturnValue::TooFarAway);
        }
        let carried = view
            .item(item)
            .and_then(|offered| offered.holder)
            .map_or(false, |holder| view.top_holder(holder) == HolderRef::Inventory(player));
        if !carried {
            return Err(ReturnValue::NotPossible);
        }
        let entangled = self.trades.offered().any(|(traded, _)| {
            traded == item || view.item_is_within(item, traded) || view.item_is_within(traded, item)
        });
        if entangled {
            return Err(ReturnValue::ItemAlreadyTraded);
        }

        self.use_ref(item);
        self.trades.items.insert(item, player);
        self.set_trade_session(
            player,
            TradeSession {
                phase: TradePhase::Initiated,
                partner: Some(partner),
                item: Some(item),
            },
        );
        if theirs.phase == TradePhase::None {
            self.set_trade_session(
                partner,
                TradeSession {
                    phase: TradePhase::Acknowledge,
                    partner: Some(player),
                    item: None,
                },
            );
        }
        self.emit(WorldEvent::TradeOffered { player, partner, item });
        Ok(())
    }

    /// Marks the player's side as accepted; once both sides accept, the
    /// offered items change hands.
    pub fn accept_trade(&mut self, player: CreatureId) -> Result<(), ReturnValue> {
        let own = self.trade_session(player)?;
        if !matches!(own.phase, TradePhase::Initiated | TradePhase::Acknowledge) {
            return Err(ReturnValue::NotPossible);
        }
        let (Some(partner), Some(_)) = (own.partner, own.item) else {
            return Err(ReturnValue::NotPossible);
        };
        self.set_trade_session(player, TradeSession { phase: TradePhase::Accept, ..own });
        if self.trade_session(partner)?.phase == TradePhase::Accept {
            self.transfer_trade(player, partner);
        }
        Ok(())
    }

    fn transfer_trade(&mut self, player: CreatureId, partner: CreatureId) {
        let (Ok(own), Ok(theirs)) = (self.trade_session(player), self.trade_session(partner)) else {
            return;
        };
        let (Some(own_item), Some(their_item)) = (own.item, theirs.item) else {
            self.finish_trade(player);
            return;
        };
        self.set_trade_session(player, TradeSession { phase: TradePhase::Transfer, ..own });
        self.set_trade_session(partner, TradeSession { phase: TradePhase::Transfer, ..theirs });

        let checks = self
            .add_item(HolderRef::Inventory(partner), own_item, SlotHint::Anywhere, MoveFlags::NONE, true)
            .and_then(|_| {
                self.add_item(HolderRef::Inventory(player), their_item, SlotHint::Anywhere, MoveFlags::NONE, true)
            })
            .and_then(|_| self.remove_item(own_item, None, true))
            .and_then(|_| self.remove_item(their_item, None, true));

        match checks {
            Ok(()) => {
                for (item, receiver) in [(own_item, partner), (their_item, player)] {
                    if let Err(reason) = self.hand_over(item, receiver) {
                        error!(target: "error", item = item.0, %reason, "trade transfer failed after checks passed");
                    }
                }
                info!(target: "game", player = player.0, partner = partner.0, "trade completed");
            }
            Err(reason) => {
                self.emit(WorldEvent::Cancel { player, reason });
                self.emit(WorldEvent::Cancel { player: partner, reason });
            }
        }
        self.finish_trade(player);
    }

    fn hand_over(&mut self, item: ItemId, receiver: CreatureId) -> Result<(), ReturnValue> {
        let from = self
            .item(item)
            .and_then(|traded| traded.holder)
            .ok_or(ReturnValue::NotPossible)?;
        let units = self.view().units(item);
        self.move_item(
            from,
            HolderRef::Inventory(receiver),
            SlotHint::Anywhere,
            item,
            units,
            MoveFlags::NONE,
        )
        .map(|_| ())
    }

    /// Cancels the trade the player takes part in, for both sides. Ignored
    /// while items are changing hands.
    pub fn close_trade(&mut self, player: CreatureId) {
        let Ok(own) = self.trade_session(player) else {
            return;
        };
        if own.phase == TradePhase::None {
            return;
        }
        let partner_phase = own
            .partner
            .and_then(|partner| self.trade_session(partner).ok())
            .map(|session| session.phase);
        if own.phase == TradePhase::Transfer || partner_phase == Some(TradePhase::Transfer) {
            return;
        }
        self.finish_trade(player);
    }

    fn finish_trade(&mut self, player: CreatureId) {
        let partner = self.trade_session(player).ok().and_then(|session| session.partner);
        for side in std::iter::once(player).chain(partner) {
            let Ok(session) = self.trade_session(side) else {
                continue;
            };
            if session.phase == TradePhase::None {
                continue;
            }
            if session.partner.is_some() && side != player && session.partner != Some(player) {
                continue;
            }
            if let Some(item) = session.item {
                if self.trades.items.remove(&item).is_some() {
                    self.release_ref(item);
                }
            }
            self.set_trade_session(side, TradeSession::default());
            self.emit(WorldEvent::TradeClosed { player: side });
        }
    }

    /// Follow-up work after an item left a holder: trades involving it and
    /// container windows showing it are re-checked in a later task.
    pub(crate) fn queue_detach_followups(&mut self, holder: HolderRef, item: ItemId) {
        let view = self.view();
        let mut owners: Vec<CreatureId> = self
            .trades
            .offered()
            .filter(|(traded, _)| {
                *traded == item || view.item_is_within(*traded, item) || view.holder_is_within(holder, *traded)
            })
            .map(|(_, owner)| owner)
            .collect();
        owners.sort();
        owners.dedup();

        let watchers: Vec<CreatureId> = self
            .holders
            .players
            .values()
            .filter(|player| {
                player
                    .open_containers
                    .values()
                    .any(|open| *open == item || view.item_is_within(*open, item))
            })
            .map(|player| player.id)
            .collect();

        for owner in owners {
            if self
                .player(owner)
                .map_or(false, |player| player.trade.phase == TradePhase::Transfer)
            {
                continue;
            }
            self.defer(Duration::ZERO, move |world| world.close_trade(owner));
        }
        for watcher in watchers {
            self.defer(Duration::ZERO, move |world| world.check_open_containers(watcher));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::inventory::InventorySlot;
    use crate::world::testkit::{self, *};

    fn trading_pair(world: &mut WorldEngine) -> (CreatureId, ItemId, CreatureId, ItemId) {
        let alice = testkit::spawn_player(world, "Alice", CENTER);
        let bob = testkit::spawn_player(world, "Bob", testkit::east_of(CENTER));
        let sword = testkit::equip(world, alice, InventorySlot::RightHand, SWORD);
        let club = testkit::equip(world, bob, InventorySlot::RightHand, CLUB);
        (alice, sword, bob, club)
    }

    #[test]
    fn accepted_trades_swap_the_items() {
        let mut world = testkit::world();
        let (alice, sword, bob, club) = trading_pair(&mut world);

        world.request_trade(alice, bob, sword).expect("offer");
        world.request_trade(bob, alice, club).expect("counter offer");
        world.accept_trade(alice).expect("accept");
        world.accept_trade(bob).expect("accept");

        assert_eq!(world.item(sword).and_then(|item| item.holder), Some(HolderRef::Inventory(bob)));
        assert_eq!(world.item(club).and_then(|item| item.holder), Some(HolderRef::Inventory(alice)));
        assert!(world.trades.is_empty());
        assert!(world.player(alice).expect("alice").trade.is_idle());
        assert!(world.player(bob).expect("bob").trade.is_idle());
        assert_eq!(world.item(sword).map(|item| item.refs), Some(0));
    }

    #[test]
    fn busy_players_cannot_be_asked() {
        let mut world = testkit::world();
        let (alice, sword, bob, _) = trading_pair(&mut world);
        let carol = testkit::spawn_player(&mut world, "Carol", testkit::south_of(CENTER));
        let torch = testkit::equip(&mut world, carol, InventorySlot::LeftHand, TORCH);

        world.request_trade(alice, bob, sword).expect("offer");
        assert_eq!(world.request_trade(carol, bob, torch), Err(ReturnValue::ThisPlayerAlreadyTrading));
        assert_eq!(world.request_trade(alice, carol, sword), Err(ReturnValue::AlreadyTrading));
    }

    #[test]
    fn moving_a_traded_item_cancels_the_trade() {
        let mut world = testkit::world();
        let (alice, sword, bob, _) = trading_pair(&mut world);
        world.request_trade(alice, bob, sword).expect("offer");

        world
            .move_item(
                HolderRef::Inventory(alice),
                HolderRef::Tile(CENTER),
                SlotHint::Anywhere,
                sword,
                1,
                MoveFlags::NONE,
            )
            .expect("drop");
        assert!(!world.player(alice).expect("alice").trade.is_idle());

        testkit::run_deferred(&mut world);
        assert!(world.player(alice).expect("alice").trade.is_idle());
        assert!(world.player(bob).expect("bob").trade.is_idle());
        assert!(world.trades.is_empty());
    }

    #[test]
    fn closing_from_either_side_releases_the_offer() {
        let mut world = testkit::world();
        let (alice, _, bob, _) = trading_pair(&mut world);
        let backpack = testkit::equip(&mut world, alice, InventorySlot::Backpack, BACKPACK);
        testkit::put_in_container(&mut world, backpack, GOLD, 10);

        world.request_trade(alice, bob, backpack).expect("offer");
        assert_eq!(world.trades.owner_of(backpack), Some(alice));
        assert_eq!(world.item(backpack).map(|item| item.refs), Some(1));

        world.close_trade(bob);
        assert!(world.trades.is_empty());
        assert_eq!(world.item(backpack).map(|item| item.refs), Some(0));
        assert!(world.player(alice).expect("alice").trade.is_idle());

        world.request_trade(alice, bob, backpack).expect("offer again");
    }
}
