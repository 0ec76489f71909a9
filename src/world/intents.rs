//! Player intents as they arrive from the protocol layer: positional,
//! unvalidated requests. Every public entry point reports a refusal to the
//! player as a `Cancel` event and hands the outcome back to the caller.

use crate::entities::creature::{ActionToken, CreatureId};
use crate::entities::inventory::InventorySlot;
use crate::entities::item::ItemId;
use crate::world::engine::WorldEngine;
use crate::world::events::WorldEvent;
use crate::world::holder::{Holder, HolderRef, MoveFlags, SlotHint, ThingRef};
use crate::world::outcome::ReturnValue;
use crate::world::position::{Direction, Position};
use std::time::Duration;
use tracing::debug;

/// Where the client says a thing is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingLocation {
    Map { position: Position, stack_index: usize },
    Slot(InventorySlot),
    /// Index inside the container shown in window `cid`.
    Container { cid: u8, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Done,
    /// Not possible yet; a retry has been scheduled.
    Retrying,
    /// Done for fewer units than requested.
    Partial(ReturnValue),
}

impl WorldEngine {
    fn player_position(&self, player: CreatureId) -> Result<Position, ReturnValue> {
        if !self.holders.players.contains_key(&player) {
            return Err(ReturnValue::NotPossible);
        }
        self.creature(player)
            .filter(|creature| !creature.removed)
            .map(|creature| creature.position)
            .ok_or(ReturnValue::NotPossible)
    }

    /// Holder and slot a location addresses.
    pub fn resolve_holder(&self, player: CreatureId, location: ThingLocation) -> Result<(HolderRef, SlotHint), ReturnValue> {
        match location {
            ThingLocation::Map { position, .. } => {
                if self.holders.map.has_tile(position) {
                    Ok((HolderRef::Tile(position), SlotHint::Anywhere))
                } else {
                    Err(ReturnValue::NotPossible)
                }
            }
            ThingLocation::Slot(slot) => Ok((HolderRef::Inventory(player), SlotHint::Slot(slot))),
            ThingLocation::Container { cid, index } => {
                let container = self
                    .player(player)
                    .and_then(|player| player.open_containers.get(&cid).copied())
                    .ok_or(ReturnValue::NotPossible)?;
                Ok((HolderRef::Container(container), SlotHint::Index(index)))
            }
        }
    }

    /// Thing a location addresses.
    pub fn resolve_thing(&self, player: CreatureId, location: ThingLocation) -> Result<ThingRef, ReturnValue> {
        let found = match location {
            ThingLocation::Map { position, stack_index } => self
                .tile(position)
                .and_then(|tile| tile.thing_at(stack_index)),
            ThingLocation::Slot(slot) => self
                .player(player)
                .and_then(|player| player.inventory.slot(slot))
                .map(ThingRef::Item),
            ThingLocation::Container { cid, index } => self
                .player(player)
                .and_then(|player| player.open_containers.get(&cid).copied())
                .and_then(|container| self.container(container))
                .and_then(|container| container.items().get(index).copied())
                .map(ThingRef::Item),
        };
        found.ok_or(ReturnValue::NotPossible)
    }

    fn report(&mut self, player: CreatureId, result: Result<IntentStatus, ReturnValue>) -> Result<IntentStatus, ReturnValue> {
        self.cancel_on_failure(player, &result);
        result
    }

    fn cancel_on_failure(&mut self, player: CreatureId, result: &Result<IntentStatus, ReturnValue>) {
        if let Err(reason) | Ok(IntentStatus::Partial(reason)) = *result {
            self.emit(WorldEvent::Cancel { player, reason });
        }
    }

    fn action_token_is(&self, player: CreatureId, token: ActionToken) -> bool {
        self.creature(player).and_then(|creature| creature.next_action) == Some(token)
    }

    /// Installs a new next-action task; any older one becomes stale.
    fn schedule_action<F>(&mut self, player: CreatureId, delay: Duration, task: F)
    where
        F: FnOnce(&mut WorldEngine) + Send + 'static,
    {
        let token = self.next_token();
        if let Some(creature) = self.creature_mut(player) {
            creature.next_action = Some(token);
        }
        self.defer(delay, move |world| {
            if !world.action_token_is(player, token) {
                return;
            }
            if let Some(creature) = world.creature_mut(player) {
                creature.next_action = None;
            }
            task(world);
        });
    }

    fn exhaust(&mut self, player: CreatureId) {
        let delay = Duration::from_millis(self.config.action_exhaust_ms);
        let clock = self.clock.clone();
        if let Some(player) = self.player_mut(player) {
            player.action_cooldown.reset_from_now(&clock, delay);
        }
    }

    fn is_walking(&self, player: CreatureId) -> bool {
        let queued = self
            .player(player)
            .map_or(false, |player| !player.walk_queue.is_empty());
        let pending = self
            .creature(player)
            .map_or(false, |creature| creature.next_walk.is_some());
        queued || pending
    }

    /// Walks the player next to `target` and runs `retry` once the walk had
    /// time to finish. With `retrying` set the player has already walked and
    /// a failure to arrive is final.
    fn walk_then_retry<F>(
        &mut self,
        player: CreatureId,
        target: Position,
        retrying: bool,
        retry: F,
    ) -> Result<IntentStatus, ReturnValue>
    where
        F: FnOnce(&mut WorldEngine) + Send + 'static,
    {
        let delay = Duration::from_millis(self.config.action_retry_ms);
        if retrying {
            if self.is_walking(player) {
                self.schedule_action(player, delay, retry);
                return Ok(IntentStatus::Retrying);
            }
            return Err(ReturnValue::TooFarAway);
        }
        let view = self.view();
        let path = self
            .pathfinder
            .find_path(&view, player, target)
            .ok_or(ReturnValue::NoWay)?;
        if path.is_empty() {
            return Err(ReturnValue::TooFarAway);
        }
        self.start_walk(player, path);
        self.schedule_action(player, delay, retry);
        Ok(IntentStatus::Retrying)
    }

    /// Moves the thing at `from` to `to`. Creatures found at `from` are pushed.
    pub fn player_move_item(
        &mut self,
        player: CreatureId,
        from: ThingLocation,
        to: ThingLocation,
        count: u16,
    ) -> Result<IntentStatus, ReturnValue> {
        let result = self.move_item_intent(player, from, to, count, false);
        self.report(player, result)
    }

    fn move_item_intent(
        &mut self,
        player: CreatureId,
        from: ThingLocation,
        to: ThingLocation,
        count: u16,
        retrying: bool,
    ) -> Result<IntentStatus, ReturnValue> {
        let standing = self.player_position(player)?;
        let cooldown = self.player(player).map(|p| p.action_cooldown).unwrap_or_default();
        if !cooldown.is_ready(&self.clock) {
            let delay = cooldown.remaining(&self.clock);
            self.schedule_action(player, delay, move |world| {
                let result = world.move_item_intent(player, from, to, count, false);
                world.cancel_on_failure(player, &result);
            });
            return Ok(IntentStatus::Retrying);
        }

        let item = match self.resolve_thing(player, from)? {
            ThingRef::Item(item) => item,
            ThingRef::Creature(creature) => {
                let ThingLocation::Map { position, .. } = to else {
                    return Err(ReturnValue::NotPossible);
                };
                return self.move_creature_intent(player, creature, position, retrying);
            }
        };
        let (from_holder, _) = self.resolve_holder(player, from)?;
        let (to_holder, to_slot) = self.resolve_holder(player, to)?;
        let item_type = self.item_type_of(item).cloned().ok_or(ReturnValue::NotPossible)?;
        if !item_type.moveable || self.item(item).map_or(true, |it| it.unique_id != 0) {
            return Err(ReturnValue::NotMoveable);
        }

        let view = self.view();
        let from_position = view.holder_position(from_holder).ok_or(ReturnValue::NotPossible)?;
        let to_position = view.holder_position(to_holder).ok_or(ReturnValue::NotPossible)?;
        if standing.z > from_position.z {
            return Err(ReturnValue::FirstGoUpstairs);
        }
        if standing.z < from_position.z {
            return Err(ReturnValue::FirstGoDownstairs);
        }
        if !standing.is_adjacent(from_position) {
            return self.walk_then_retry(player, from_position, retrying, move |world| {
                let result = world.move_item_intent(player, from, to, count, true);
                world.cancel_on_failure(player, &result);
            });
        }
        if let HolderRef::Tile(_) = view.top_holder(to_holder) {
            let throw_range = item_type.throw_range;
            if standing.z != to_position.z || standing.distance(to_position) > throw_range {
                return Err(ReturnValue::OutOfRange);
            }
        }

        let outcome = self.move_item(from_holder, to_holder, to_slot, item, count, MoveFlags::NONE)?;
        debug!(target: "game", player = player.0, item = item.0, moved = outcome.moved, "player moved item");
        Ok(match outcome.clamped {
            Some(reason) => IntentStatus::Partial(reason),
            None => IntentStatus::Done,
        })
    }

    /// Pushes `creature` onto the adjacent position `to`.
    pub fn player_move_creature(
        &mut self,
        player: CreatureId,
        creature: CreatureId,
        to: Position,
    ) -> Result<IntentStatus, ReturnValue> {
        let result = self.move_creature_intent(player, creature, to, false);
        self.report(player, result)
    }

    fn move_creature_intent(
        &mut self,
        player: CreatureId,
        creature: CreatureId,
        to: Position,
        retrying: bool,
    ) -> Result<IntentStatus, ReturnValue> {
        let standing = self.player_position(player)?;
        let cooldown = self.player(player).map(|p| p.action_cooldown).unwrap_or_default();
        if !cooldown.is_ready(&self.clock) {
            let delay = cooldown.remaining(&self.clock);
            self.schedule_action(player, delay, move |world| {
                let result = world.move_creature_intent(player, creature, to, false);
                world.cancel_on_failure(player, &result);
            });
            return Ok(IntentStatus::Retrying);
        }
        let position = self
            .creature(creature)
            .filter(|target| !target.removed)
            .map(|target| target.position)
            .ok_or(ReturnValue::NotPossible)?;
        if creature == player {
            return Err(ReturnValue::NotMoveable);
        }
        if !standing.is_adjacent(position) {
            return self.walk_then_retry(player, position, retrying, move |world| {
                let result = world.move_creature_intent(player, creature, to, true);
                world.cancel_on_failure(player, &result);
            });
        }
        if !position.is_adjacent(to) || position == to {
            return Err(ReturnValue::OutOfRange);
        }
        let protected = self.tile(position).map_or(false, |tile| tile.protection_zone);
        if protected && self.holders.players.contains_key(&creature) {
            return Err(ReturnValue::NotMoveable);
        }
        self.move_creature_to(creature, to, MoveFlags::NONE)?;
        self.exhaust(player);
        Ok(IntentStatus::Done)
    }

    /// One manual step. Cancels any auto-walk in progress.
    pub fn player_move(&mut self, player: CreatureId, direction: Direction) -> Result<IntentStatus, ReturnValue> {
        let result = self.player_position(player).and_then(|_| {
            if let Some(state) = self.player_mut(player) {
                state.walk_queue.clear();
                state.walk_queue.push_back(direction);
            }
            self.walk_step(player)
        });
        self.report(player, result)
    }

    /// Queues a path to walk step by step.
    pub fn player_auto_walk(&mut self, player: CreatureId, path: Vec<Direction>) -> Result<IntentStatus, ReturnValue> {
        let result = self.player_position(player).and_then(|_| {
            if path.is_empty() {
                return Err(ReturnValue::NotPossible);
            }
            self.start_walk(player, path);
            Ok(IntentStatus::Retrying)
        });
        self.report(player, result)
    }

    pub fn stop_auto_walk(&mut self, player: CreatureId) {
        if let Some(state) = self.player_mut(player) {
            state.walk_queue.clear();
        }
        if let Some(creature) = self.creature_mut(player) {
            creature.next_walk = None;
        }
    }

    fn start_walk(&mut self, player: CreatureId, path: Vec<Direction>) {
        if let Some(state) = self.player_mut(player) {
            state.walk_queue = path.into_iter().collect();
        }
        self.schedule_walk(player, Duration::ZERO);
    }

    fn schedule_walk(&mut self, player: CreatureId, delay: Duration) {
        let token = self.next_token();
        if let Some(creature) = self.creature_mut(player) {
            creature.next_walk = Some(token);
        }
        self.defer(delay, move |world| {
            let current = world.creature(player).and_then(|creature| creature.next_walk);
            if current != Some(token) {
                return;
            }
            if let Some(creature) = world.creature_mut(player) {
                creature.next_walk = None;
            }
            let result = world.walk_step(player);
            world.cancel_on_failure(player, &result);
        });
    }

    /// Takes the next queued step if the walk cooldown allows it, otherwise
    /// schedules itself for when it does.
    fn walk_step(&mut self, player: CreatureId) -> Result<IntentStatus, ReturnValue> {
        let Some(state) = self.player(player) else {
            return Err(ReturnValue::NotPossible);
        };
        let Some(direction) = state.walk_queue.front().copied() else {
            return Ok(IntentStatus::Done);
        };
        let cooldown = state.walk_cooldown;
        if !cooldown.is_ready(&self.clock) {
            let delay = cooldown.remaining(&self.clock);
            self.schedule_walk(player, delay);
            return Ok(IntentStatus::Retrying);
        }
        if let Some(state) = self.player_mut(player) {
            state.walk_queue.pop_front();
        }
        if let Err(reason) = self.move_creature(player, direction, MoveFlags::NONE) {
            self.stop_auto_walk(player);
            return Err(reason);
        }

        let step = self
            .creature(player)
            .map(|creature| creature.step_duration(direction))
            .unwrap_or_default();
        let clock = self.clock.clone();
        let more = match self.player_mut(player) {
            Some(state) => {
                state.walk_cooldown.reset_from_now(&clock, step);
                !state.walk_queue.is_empty()
            }
            None => false,
        };
        if more {
            self.schedule_walk(player, step);
        }
        Ok(IntentStatus::Done)
    }

    /// Uses an item: scripts get the first say, containers open by default.
    pub fn player_use_item(&mut self, player: CreatureId, location: ThingLocation) -> Result<IntentStatus, ReturnValue> {
        let result = self.use_item_intent(player, location, false);
        self.report(player, result)
    }

    fn use_item_intent(&mut self, player: CreatureId, location: ThingLocation, retrying: bool) -> Result<IntentStatus, ReturnValue> {
        let standing = self.player_position(player)?;
        let cooldown = self.player(player).map(|p| p.action_cooldown).unwrap_or_default();
        if !cooldown.is_ready(&self.clock) {
            let delay = cooldown.remaining(&self.clock);
            self.schedule_action(player, delay, move |world| {
                let result = world.use_item_intent(player, location, retrying);
                world.cancel_on_failure(player, &result);
            });
            return Ok(IntentStatus::Retrying);
        }
        let item = self
            .resolve_thing(player, location)?
            .item()
            .ok_or(ReturnValue::NotPossible)?;
        let holder = self.holder_of(ThingRef::Item(item)).ok_or(ReturnValue::NotPossible)?;
        let position = self.view().holder_position(holder).ok_or(ReturnValue::NotPossible)?;
        if standing.z != position.z {
            return Err(if standing.z > position.z {
                ReturnValue::FirstGoUpstairs
            } else {
                ReturnValue::FirstGoDownstairs
            });
        }
        if !standing.is_adjacent(position) {
            return self.walk_then_retry(player, position, retrying, move |world| {
                let result = world.use_item_intent(player, location, true);
                world.cancel_on_failure(player, &result);
            });
        }

        let handled = match self.bridge.take() {
            Some(mut bridge) => {
                let player_handle = self.scripts.mint(ThingRef::Creature(player));
                let item_handle = self.scripts.mint(ThingRef::Item(item));
                let outcome = bridge.on_use(self, player_handle, item_handle);
                self.bridge = Some(bridge);
                outcome
            }
            None => None,
        };
        let outcome = match handled {
            Some(outcome) => outcome,
            None if self.holders.containers.contains_key(&item) => self.open_container(player, item).map(|_| ()),
            None => Err(ReturnValue::NotPossible),
        };
        self.exhaust(player);
        outcome.map(|()| IntentStatus::Done)
    }

    /// Opens `container` in a window, reusing its window if already open.
    pub fn open_container(&mut self, player: CreatureId, container: ItemId) -> Result<u8, ReturnValue> {
        let cid = self
            .player_mut(player)
            .ok_or(ReturnValue::NotPossible)?
            .open_container(container)
            .ok_or(ReturnValue::NotPossible)?;
        self.emit(WorldEvent::ContainerOpened { player, cid, container });
        Ok(cid)
    }

    pub(crate) fn close_container_window(&mut self, player: CreatureId, cid: u8) -> bool {
        let closed = self
            .player_mut(player)
            .and_then(|state| state.close_container(cid))
            .is_some();
        if closed {
            self.emit(WorldEvent::ContainerClosed { player, cid });
        }
        closed
    }

    pub fn player_close_container(&mut self, player: CreatureId, cid: u8) -> Result<IntentStatus, ReturnValue> {
        let result = if self.close_container_window(player, cid) {
            Ok(IntentStatus::Done)
        } else {
            Err(ReturnValue::NotPossible)
        };
        self.report(player, result)
    }

    /// Shows the parent of the container in window `cid` in the same window.
    pub fn player_move_up_container(&mut self, player: CreatureId, cid: u8) -> Result<IntentStatus, ReturnValue> {
        let result = self.move_up_container(player, cid);
        self.report(player, result)
    }

    fn move_up_container(&mut self, player: CreatureId, cid: u8) -> Result<IntentStatus, ReturnValue> {
        let current = self
            .player(player)
            .and_then(|state| state.open_containers.get(&cid).copied())
            .ok_or(ReturnValue::NotPossible)?;
        let Some(HolderRef::Container(parent)) = self.item(current).and_then(|item| item.holder) else {
            return Err(ReturnValue::NotPossible);
        };
        if let Some(state) = self.player_mut(player) {
            state.open_containers.insert(cid, parent);
        }
        self.emit(WorldEvent::ContainerOpened {
            player,
            cid,
            container: parent,
        });
        Ok(IntentStatus::Done)
    }

    /// Closes every window showing a container the player can no longer reach.
    pub fn check_open_containers(&mut self, player: CreatureId) {
        let Ok(standing) = self.player_position(player) else {
            return;
        };
        let windows: Vec<(u8, ItemId)> = self
            .player(player)
            .map(|state| state.open_containers.iter().map(|(cid, id)| (*cid, *id)).collect())
            .unwrap_or_default();
        let view = self.view();
        let unreachable: Vec<u8> = windows
            .into_iter()
            .filter(|(_, container)| {
                if view.item(*container).and_then(|item| item.holder).is_none() {
                    return true;
                }
                match view.top_holder(HolderRef::Container(*container)) {
                    HolderRef::Inventory(owner) => owner != player,
                    HolderRef::Tile(position) => !standing.is_adjacent(position),
                    _ => true,
                }
            })
            .map(|(cid, _)| cid)
            .collect();
        for cid in unreachable {
            self.close_container_window(player, cid);
        }
    }

    /// Chooses whom the player attacks; `None` stops attacking.
    pub fn player_set_attack_target(
        &mut self,
        player: CreatureId,
        target: Option<CreatureId>,
    ) -> Result<IntentStatus, ReturnValue> {
        let result = self.set_attack_target(player, target);
        self.report(player, result)
    }

    fn set_attack_target(&mut self, player: CreatureId, target: Option<CreatureId>) -> Result<IntentStatus, ReturnValue> {
        let standing = self.player_position(player)?;
        if let Some(target) = target {
            let position = self
                .creature(target)
                .filter(|creature| !creature.removed && creature.is_alive())
                .map(|creature| creature.position)
                .ok_or(ReturnValue::NotPossible)?;
            if target == player {
                return Err(ReturnValue::YouMayNotAttackThisCreature);
            }
            let protected = |at: Position| self.tile(at).map_or(false, |tile| tile.protection_zone);
            if self.holders.players.contains_key(&target) && (protected(standing) || protected(position)) {
                return Err(ReturnValue::YouMayNotAttackThisCreature);
            }
            if !standing.is_in_range(position, 8, 6, 0) {
                return Err(ReturnValue::TooFarAway);
            }
        }
        if let Some(creature) = self.creature_mut(player) {
            creature.attack_target = target;
        }
        Ok(IntentStatus::Done)
    }

    /// Offers the item at `location` to `partner`.
    pub fn player_request_trade(
        &mut self,
        player: CreatureId,
        location: ThingLocation,
        partner: CreatureId,
    ) -> Result<IntentStatus, ReturnValue> {
        let result = self
            .resolve_thing(player, location)
            .and_then(|thing| thing.item().ok_or(ReturnValue::NotPossible))
            .and_then(|item| self.request_trade(player, partner, item))
            .map(|()| IntentStatus::Done);
        self.report(player, result)
    }

    pub fn player_accept_trade(&mut self, player: CreatureId) -> Result<IntentStatus, ReturnValue> {
        let result = self.accept_trade(player).map(|()| IntentStatus::Done);
        self.report(player, result)
    }

    pub fn player_close_trade(&mut self, player: CreatureId) {
        self.close_trade(player);
    }
}
