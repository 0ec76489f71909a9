use crate::entities::item::{DecayState, ItemId};
use crate::world::engine::WorldEngine;
use std::time::Duration;
use tracing::{debug, warn};

/// Items counting down towards their decay target. New entries wait in
/// `pending` until the task that started them has finished.
#[derive(Debug, Default)]
pub struct DecayQueue {
    active: Vec<ItemId>,
    pending: Vec<ItemId>,
}

impl DecayQueue {
    pub fn active(&self) -> &[ItemId] {
        &self.active
    }

    pub fn pending(&self) -> &[ItemId] {
        &self.pending
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.active.contains(&id) || self.pending.contains(&id)
    }
}

enum DecayStep {
    Drop,
    Keep,
    Due,
}

impl WorldEngine {
    /// Enrolls a placed item whose type decays. Called after every add.
    pub(crate) fn start_decay(&mut self, id: ItemId) {
        let Some(item) = self.things.item(id) else {
            return;
        };
        if item.decay != DecayState::Idle || item.holder.is_none() {
            return;
        }
        if !self.catalog.get(item.type_id).map_or(false, |t| t.can_decay()) {
            return;
        }
        if item.duration_ms > 0 {
            if let Some(item) = self.things.item_mut(id) {
                item.decay = DecayState::Pending;
            }
            self.use_ref(id);
            self.decay.pending.push(id);
        } else {
            self.defer(Duration::ZERO, move |world| world.decay_item(id));
        }
    }

    pub(crate) fn admit_pending_decay(&mut self) {
        for id in std::mem::take(&mut self.decay.pending) {
            let pending = self
                .things
                .item_mut(id)
                .filter(|item| item.decay == DecayState::Pending)
                .map(|item| item.decay = DecayState::Active)
                .is_some();
            if pending {
                self.decay.active.push(id);
            } else {
                self.release_ref(id);
            }
        }
    }

    /// One decay interval: counts every active item down and decays those
    /// that reach zero.
    pub fn check_decay(&mut self) {
        let interval = self.config.decay_interval_ms.min(i64::MAX as u64) as i64;
        let mut keep = Vec::new();
        let mut due = Vec::new();
        for id in std::mem::take(&mut self.decay.active) {
            let step = match self.things.item_mut(id) {
                None => continue,
                Some(item) => {
                    let decays = self.catalog.get(item.type_id).map_or(false, |t| t.can_decay());
                    if item.decay != DecayState::Active || item.holder.is_none() || !decays {
                        if item.decay == DecayState::Active {
                            item.decay = DecayState::Idle;
                        }
                        DecayStep::Drop
                    } else {
                        item.duration_ms -= interval;
                        if item.duration_ms <= 0 {
                            item.decay = DecayState::Idle;
                            DecayStep::Due
                        } else {
                            DecayStep::Keep
                        }
                    }
                }
            };
            match step {
                DecayStep::Drop => self.release_ref(id),
                DecayStep::Keep => keep.push(id),
                DecayStep::Due => due.push(id),
            }
        }
        self.decay.active = keep;

        for id in due {
            self.decay_item(id);
            self.release_ref(id);
        }
    }

    /// Turns an item into its decay target, or removes it when it has none.
    pub fn decay_item(&mut self, id: ItemId) {
        let Some(item_type) = self.item_type_of(id).cloned() else {
            return;
        };
        if self.item(id).map_or(true, |item| item.holder.is_none()) {
            return;
        }
        let result = match item_type.decay_to {
            Some(next) if next == item_type.id => Ok(()),
            Some(next) => self.transform_item(id, next, None).map(|_| ()),
            None => self.remove_item(id, None, false),
        };
        match result {
            Ok(()) => debug!(target: "decay", item = id.0, type_id = item_type.id.0, "item decayed"),
            Err(reason) => warn!(target: "decay", item = id.0, %reason, "decay failed"),
        }
    }

    /// Runs one decay check and schedules the next one.
    pub fn decay_tick(&mut self) {
        self.check_decay();
        if self.shutdown_requested() {
            return;
        }
        let interval = Duration::from_millis(self.config.decay_interval_ms);
        self.defer(interval, |world| world.decay_tick());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testkit::{self, *};

    #[test]
    fn decay_waits_for_the_end_of_the_task() {
        let mut world = testkit::world();
        let torch = testkit::put_on_tile(&mut world, CENTER, TORCH, 1);
        assert_eq!(world.decay_state(torch), Some(DecayState::Pending));
        assert!(world.decay.active().is_empty());

        world.cleanup();
        assert_eq!(world.decay_state(torch), Some(DecayState::Active));
        assert_eq!(world.decay.active(), &[torch]);
    }

    #[test]
    fn item_decays_exactly_once_after_its_duration() {
        let mut world = testkit::world();
        let torch = testkit::put_on_tile(&mut world, CENTER, TORCH, 1);
        world.cleanup();

        let ticks = TORCH_DECAY_MS / world.config().decay_interval_ms;
        for _ in 0..ticks - 1 {
            world.check_decay();
            world.cleanup();
        }
        assert_eq!(world.item(torch).map(|item| item.type_id), Some(TORCH));

        world.check_decay();
        world.cleanup();
        assert_eq!(world.item(torch).map(|item| item.type_id), Some(BURNT_TORCH));
        assert!(!world.decay.contains(torch));

        world.check_decay();
        world.cleanup();
        assert_eq!(world.item(torch).map(|item| item.type_id), Some(BURNT_TORCH));
    }

    #[test]
    fn items_without_a_successor_disappear() {
        let mut world = testkit::world();
        let ash = testkit::put_on_tile(&mut world, CENTER, EMBERS, 1);
        world.cleanup();
        for _ in 0..EMBERS_DECAY_MS / world.config().decay_interval_ms {
            world.check_decay();
        }
        world.cleanup();
        assert!(world.item(ash).is_none());
    }

    #[test]
    fn removed_items_leave_the_list_and_are_freed() {
        let mut world = testkit::world();
        let torch = testkit::put_on_tile(&mut world, CENTER, TORCH, 1);
        world.cleanup();
        world.remove_item(torch, None, false).expect("remove");
        world.cleanup();
        assert!(world.item(torch).is_some());

        world.check_decay();
        world.cleanup();
        assert!(world.item(torch).is_none());
        assert!(world.decay.active().is_empty());
    }
}
