use crate::entities::creature::{Creature, CreatureId};
use crate::world::engine::WorldEngine;
use crate::world::events::WorldEvent;
use crate::world::holder::{Holder, HolderRef, MoveFlags, SlotHint, ThingRef};
use crate::world::outcome::ReturnValue;
use crate::world::position::{Direction, Position, SEA_LEVEL_FLOOR};
use std::time::Duration;
use tracing::{debug, info};

/// Items stacked this high let a creature climb to the floor above.
const CLIMB_HEIGHT: usize = 3;

/// Round-robin think buckets. A new creature joins the smallest bucket and
/// each check advances to the next one, so every creature thinks once per
/// full rotation.
#[derive(Debug, Clone)]
pub struct CreatureChecks {
    buckets: Vec<Vec<CreatureId>>,
    cursor: usize,
}

impl CreatureChecks {
    pub fn new(count: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); count.max(1)],
            cursor: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn enroll(&mut self, id: CreatureId) -> usize {
        let mut smallest = 0;
        for (index, bucket) in self.buckets.iter().enumerate() {
            if bucket.len() < self.buckets[smallest].len() {
                smallest = index;
            }
        }
        self.buckets[smallest].push(id);
        smallest
    }

    pub fn withdraw(&mut self, bucket: usize, id: CreatureId) {
        if let Some(bucket) = self.buckets.get_mut(bucket) {
            bucket.retain(|other| *other != id);
        }
    }

    /// Members of the current bucket; moves the cursor on.
    pub fn advance(&mut self) -> Vec<CreatureId> {
        let members = self.buckets[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.buckets.len();
        members
    }

    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.buckets.iter().map(Vec::len).collect()
    }
}

impl WorldEngine {
    pub fn allocate_creature_id(&mut self) -> CreatureId {
        self.things.allocate_creature_id()
    }

    /// Puts a creature on the map at its position, or on the first free
    /// neighbour. `forced` ignores anything that would block it.
    pub fn place_creature(&mut self, creature: Creature, forced: bool) -> Result<CreatureId, ReturnValue> {
        let id = creature.id;
        let thing = ThingRef::Creature(id);
        let origin = creature.position;
        let master = creature.master;
        self.things.insert_creature(creature);

        let flags = if forced { MoveFlags::NO_LIMIT } else { MoveFlags::NONE };
        let candidates: Vec<Position> = std::iter::once(origin)
            .chain(Direction::ALL.iter().filter_map(|direction| origin.step(*direction)))
            .collect();
        let view = self.view();
        let target = candidates.into_iter().find(|position| {
            view.holder(HolderRef::Tile(*position))
                .map_or(false, |tile| tile.query_add(&view, SlotHint::Anywhere, thing, 1, flags).is_ok())
        });
        let Some(target) = target else {
            self.things.drop_creature(id);
            return Err(ReturnValue::NotEnoughRoom);
        };

        self.attach(HolderRef::Tile(target), SlotHint::Anywhere, thing)?;
        self.notify_add(HolderRef::Tile(target), thing);
        let bucket = self.checks.enroll(id);
        if let Some(creature) = self.creature_mut(id) {
            creature.check_bucket = Some(bucket);
        }
        if let Some(master) = master {
            self.add_summon(master, id);
        }
        debug!(target: "game", creature = id.0, position = %target, "creature placed");
        Ok(id)
    }

    pub fn add_summon(&mut self, master: CreatureId, summon: CreatureId) {
        if let Some(controller) = self.creature_mut(master) {
            if !controller.summons.contains(&summon) {
                controller.summons.push(summon);
            }
        }
        if let Some(creature) = self.creature_mut(summon) {
            creature.master = Some(master);
        }
    }

    /// Takes a creature off the map. Summons go with their master; a player's
    /// trade, open containers and equipment are torn down as well.
    pub fn remove_creature(&mut self, id: CreatureId) -> Result<(), ReturnValue> {
        let thing = ThingRef::Creature(id);
        let (position, summons, master, bucket) = {
            let creature = self
                .creature(id)
                .filter(|creature| !creature.removed)
                .ok_or(ReturnValue::NotPossible)?;
            (
                creature.position,
                creature.summons.clone(),
                creature.master,
                creature.check_bucket,
            )
        };
        for summon in summons {
            let _ = self.remove_creature(summon);
        }

        if self.holders.players.contains_key(&id) {
            self.close_trade(id);
            let windows: Vec<u8> = self
                .player(id)
                .map(|player| player.open_containers.keys().copied().collect())
                .unwrap_or_default();
            for cid in windows {
                self.close_container_window(id, cid);
            }
            let equipment: Vec<_> = self
                .player(id)
                .map(|player| player.inventory.items().map(|(_, item)| item).collect())
                .unwrap_or_default();
            for item in equipment {
                if self.detach(HolderRef::Inventory(id), ThingRef::Item(item)).is_some() {
                    self.free_thing(ThingRef::Item(item));
                }
            }
            self.holders.players.remove(&id);
        }

        if let Some(index) = self.detach(HolderRef::Tile(position), thing) {
            self.notify_remove(HolderRef::Tile(position), thing, index, true);
        }
        if let Some(creature) = self.creature_mut(id) {
            creature.removed = true;
            creature.check_bucket = None;
            creature.next_action = None;
            creature.next_walk = None;
        }
        if let Some(bucket) = bucket {
            self.checks.withdraw(bucket, id);
        }
        if let Some(master) = master {
            if let Some(controller) = self.creature_mut(master) {
                controller.summons.retain(|other| *other != id);
            }
        }
        self.free_thing(thing);
        Ok(())
    }

    /// One step in `direction`, climbing or descending a floor where the
    /// terrain allows it.
    pub fn move_creature(&mut self, id: CreatureId, direction: Direction, flags: MoveFlags) -> Result<(), ReturnValue> {
        let from = self
            .creature(id)
            .filter(|creature| !creature.removed)
            .map(|creature| creature.position)
            .ok_or(ReturnValue::NotPossible)?;
        let mut to = from.step(direction).ok_or(ReturnValue::NotPossible)?;
        let mut flags = flags;

        let view = self.view();
        let map = &view.holders.map;
        let open = |position: Option<Position>| {
            position
                .and_then(|position| map.tile(position))
                .map_or(true, |tile| !tile.has_ground() && !tile.is_block_solid(&view))
        };
        let walkable = |position: Option<Position>| {
            position
                .and_then(|position| map.tile(position))
                .map_or(false, |tile| tile.has_ground() && !tile.is_block_solid(&view))
        };
        let standing_high = map
            .tile(from)
            .map_or(false, |tile| tile.height(&view) >= CLIMB_HEIGHT);

        if from.z != SEA_LEVEL_FLOOR + 1 && standing_high && open(from.up()) && walkable(to.up()) {
            if let Some(above) = to.up() {
                to = above;
                flags = flags | MoveFlags::IGNORE_BLOCK_ITEM | MoveFlags::IGNORE_BLOCK_CREATURE;
            }
        } else if from.z != SEA_LEVEL_FLOOR && open(Some(to)) && walkable(to.down()) {
            if let Some(below) = to.down() {
                to = below;
                flags = flags | MoveFlags::IGNORE_BLOCK_ITEM | MoveFlags::IGNORE_BLOCK_CREATURE;
            }
        }

        if let Some(creature) = self.creature_mut(id) {
            creature.direction = direction;
        }
        self.move_creature_to(id, to, flags)
    }

    /// Moves a creature onto the tile at `to`, following tile redirects.
    pub fn move_creature_to(&mut self, id: CreatureId, to: Position, flags: MoveFlags) -> Result<(), ReturnValue> {
        let thing = ThingRef::Creature(id);
        let from = self
            .creature(id)
            .filter(|creature| !creature.removed)
            .map(|creature| creature.position)
            .ok_or(ReturnValue::NotPossible)?;
        let source = HolderRef::Tile(from);
        let destination = self.resolve_destination(HolderRef::Tile(to), SlotHint::Anywhere, thing, flags)?;
        let HolderRef::Tile(target) = destination.holder else {
            return Err(ReturnValue::NotPossible);
        };
        if target == from {
            return Ok(());
        }

        self.with_holder(destination.holder, |h, v| {
            h.query_add(v, SlotHint::Anywhere, thing, 1, flags)
        })?
        .into_result()?;
        self.with_holder(source, |h, v| h.query_remove(v, thing, 1))??;

        let index = self.detach(source, thing).ok_or(ReturnValue::NotPossible)?;
        self.attach(destination.holder, SlotHint::Anywhere, thing)?;
        self.notify_remove(source, thing, index, true);
        self.notify_add(destination.holder, thing);
        self.emit(WorldEvent::CreatureMoved {
            creature: id,
            from,
            to: target,
        });
        if self.holders.players.contains_key(&id) {
            self.defer(Duration::ZERO, move |world| world.check_open_containers(id));
        }
        Ok(())
    }

    /// Processes the next think bucket.
    pub fn check_creatures(&mut self) {
        for id in self.checks.advance() {
            self.think(id);
        }
    }

    fn think(&mut self, id: CreatureId) {
        let Some(creature) = self.creature(id).filter(|creature| !creature.removed) else {
            return;
        };
        if !creature.is_alive() {
            self.handle_death(id);
            return;
        }
        if let Some(master) = creature.master {
            if self.creature(master).map_or(true, |controller| controller.removed) {
                debug!(target: "game", creature = id.0, "summon lost its master");
                let _ = self.remove_creature(id);
                return;
            }
        }

        let target_gone = creature.attack_target.map_or(false, |target| {
            self.creature(target)
                .map_or(true, |target| target.removed || !target.is_alive())
        });
        if let Some(creature) = self.creature_mut(id) {
            let regeneration = i32::try_from(creature.regeneration).unwrap_or(i32::MAX);
            creature.stats.change_health(regeneration);
            creature.stats.change_mana(regeneration);
            if target_gone {
                creature.attack_target = None;
            }
        }
    }

    fn handle_death(&mut self, id: CreatureId) {
        let Some((position, corpse_type, name)) = self
            .creature(id)
            .map(|creature| (creature.position, creature.corpse, creature.name.clone()))
        else {
            return;
        };
        let corpse = corpse_type.and_then(|type_id| self.create_item(type_id, 0).ok());
        if let Some(corpse) = corpse {
            if self
                .add_item(HolderRef::Tile(position), corpse, SlotHint::Anywhere, MoveFlags::NO_LIMIT, false)
                .is_err()
            {
                self.free_thing(ThingRef::Item(corpse));
            }
        }
        self.emit(WorldEvent::CreatureDied { creature: id, corpse });
        info!(target: "game", creature = id.0, %name, %position, "creature died");

        if self.holders.players.contains_key(&id) {
            if let Some(creature) = self.creature_mut(id) {
                creature.stats.health = creature.stats.max_health;
                creature.stats.mana = creature.stats.max_mana;
            }
            let _ = self.logout_player(id);
        } else {
            let _ = self.remove_creature(id);
        }
    }

    /// Applies a health change, clamped to the creature's range. Death is
    /// handled by the next think.
    pub fn change_health(&mut self, id: CreatureId, delta: i32) -> Result<u32, ReturnValue> {
        let creature = self
            .creature_mut(id)
            .filter(|creature| !creature.removed)
            .ok_or(ReturnValue::NotPossible)?;
        Ok(creature.stats.change_health(delta))
    }

    pub fn change_mana(&mut self, id: CreatureId, delta: i32) -> Result<u32, ReturnValue> {
        let creature = self
            .creature_mut(id)
            .filter(|creature| !creature.removed)
            .ok_or(ReturnValue::NotPossible)?;
        Ok(creature.stats.change_mana(delta))
    }

    /// Runs one bucket check and schedules the next, spreading a full
    /// rotation over the think interval.
    pub fn think_tick(&mut self) {
        self.check_creatures();
        if self.shutdown_requested() {
            return;
        }
        let buckets = self.checks.bucket_count().max(1) as u64;
        let delay = Duration::from_millis((self.config.think_interval_ms / buckets).max(1));
        self.defer(delay, |world| world.think_tick());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::creature::CreatureKind;
    use crate::world::events::HolderEventKind;
    use crate::world::testkit::{self, *};

    #[test]
    fn new_creatures_join_the_smallest_bucket() {
        let mut checks = CreatureChecks::new(3);
        for id in 1..=7 {
            checks.enroll(CreatureId(id));
        }
        assert_eq!(checks.bucket_sizes(), vec![3, 2, 2]);
        checks.withdraw(1, CreatureId(2));
        assert_eq!(checks.enroll(CreatureId(8)), 1);
    }

    #[test]
    fn each_check_thinks_one_bucket() {
        let mut checks = CreatureChecks::new(2);
        checks.enroll(CreatureId(1));
        checks.enroll(CreatureId(2));
        checks.enroll(CreatureId(3));
        assert_eq!(checks.advance(), vec![CreatureId(1), CreatureId(3)]);
        assert_eq!(checks.advance(), vec![CreatureId(2)]);
        assert_eq!(checks.advance(), vec![CreatureId(1), CreatureId(3)]);
    }

    #[test]
    fn walking_off_a_ledge_lands_one_floor_down() {
        let mut world = testkit::world();
        let upper = Position::new(CENTER.x, CENTER.y, CENTER.z - 1);
        testkit::floor(&mut world, upper);
        let ledge = testkit::east_of(upper);
        world.ensure_tile(ledge);
        let landing = testkit::east_of(CENTER);
        let rat = testkit::spawn_monster(&mut world, "rat", upper);
        world.take_events();

        world.move_creature(rat, Direction::East, MoveFlags::NONE).expect("step");

        assert_eq!(world.creature(rat).map(|c| c.position), Some(landing));
        let holder_events: Vec<_> = world
            .take_events()
            .iter()
            .filter_map(WorldEvent::as_holder_event)
            .map(|event| (event.holder, event.kind))
            .collect();
        assert_eq!(
            holder_events,
            vec![
                (HolderRef::Tile(upper), HolderEventKind::Removed { complete: true }),
                (HolderRef::Tile(landing), HolderEventKind::Added),
            ]
        );
    }

    #[test]
    fn climbing_needs_a_high_pile() {
        let mut world = testkit::world();
        let upper_landing = Position::new(CENTER.x + 1, CENTER.y, CENTER.z - 1);
        testkit::floor(&mut world, upper_landing);
        let rat = testkit::spawn_monster(&mut world, "rat", CENTER);
        let east = testkit::east_of(CENTER);
        let blocker = testkit::put_on_tile(&mut world, east, STATUE, 1);
        assert_eq!(
            world.move_creature(rat, Direction::East, MoveFlags::NONE),
            Err(ReturnValue::NotEnoughRoom)
        );

        world.remove_item(blocker, None, false).expect("clear");
        for _ in 0..CLIMB_HEIGHT {
            testkit::put_on_tile(&mut world, CENTER, CRATE, 1);
        }
        world.move_creature(rat, Direction::East, MoveFlags::NONE).expect("climb");
        assert_eq!(world.creature(rat).map(|c| c.position), Some(upper_landing));
    }

    #[test]
    fn occupied_tiles_block_walking() {
        let mut world = testkit::world();
        let rat = testkit::spawn_monster(&mut world, "rat", CENTER);
        testkit::spawn_monster(&mut world, "cat", testkit::east_of(CENTER));
        assert_eq!(
            world.move_creature(rat, Direction::East, MoveFlags::NONE),
            Err(ReturnValue::NotEnoughRoom)
        );
        assert_eq!(world.creature(rat).map(|c| c.position), Some(CENTER));
    }

    #[test]
    fn placement_falls_back_to_a_neighbour() {
        let mut world = testkit::world();
        testkit::spawn_monster(&mut world, "rat", CENTER);
        let cat = testkit::spawn_monster(&mut world, "cat", CENTER);
        let position = world.creature(cat).map(|c| c.position).expect("placed");
        assert!(position.is_adjacent(CENTER));
    }

    #[test]
    fn summons_leave_with_their_master() {
        let mut world = testkit::world();
        let master = testkit::spawn_monster(&mut world, "necromancer", CENTER);
        let id = world.allocate_creature_id();
        let mut skeleton = Creature::new(id, "skeleton", CreatureKind::Summon, testkit::east_of(CENTER));
        skeleton.master = Some(master);
        world.place_creature(skeleton, false).expect("summon");
        assert_eq!(world.creature(master).map(|c| c.summons.clone()), Some(vec![id]));

        world.remove_creature(master).expect("remove");
        assert!(world.creature(id).map_or(true, |c| c.removed));
        assert!(world.tile(testkit::east_of(CENTER)).expect("tile").creatures().is_empty());
        world.cleanup();
        assert!(world.creature(id).is_none());
    }

    #[test]
    fn dead_creatures_leave_a_corpse_on_their_think() {
        let mut world = testkit::world();
        let rat = testkit::spawn_monster(&mut world, "rat", CENTER);
        if let Some(creature) = world.creature_mut(rat) {
            creature.corpse = Some(RAT_CORPSE);
        }
        world.change_health(rat, -1000).expect("hit");
        assert_eq!(world.creature(rat).map(|c| c.stats.health), Some(0));

        for _ in 0..world.checks.bucket_count() {
            world.check_creatures();
        }
        assert!(world.creature(rat).map_or(true, |c| c.removed));
        assert!(world.find_item_of_type(HolderRef::Tile(CENTER), RAT_CORPSE, None).is_some());
    }
}
