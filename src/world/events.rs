use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::world::holder::{HolderRef, ThingRef};
use crate::world::outcome::ReturnValue;
use crate::world::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderEventKind {
    Added,
    /// `complete` is false when only part of a stack left the holder.
    Removed { complete: bool },
}

/// Post-commit notification emitted by a holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderEvent {
    pub holder: HolderRef,
    pub thing: ThingRef,
    pub index: usize,
    pub kind: HolderEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Holder(HolderEvent),
    CreatureMoved {
        creature: CreatureId,
        from: Position,
        to: Position,
    },
    Cancel {
        player: CreatureId,
        reason: ReturnValue,
    },
    ContainerOpened {
        player: CreatureId,
        cid: u8,
        container: ItemId,
    },
    ContainerClosed {
        player: CreatureId,
        cid: u8,
    },
    TradeOffered {
        player: CreatureId,
        partner: CreatureId,
        item: ItemId,
    },
    TradeClosed {
        player: CreatureId,
    },
    TextMessage {
        player: CreatureId,
        text: String,
    },
    CreatureDied {
        creature: CreatureId,
        corpse: Option<ItemId>,
    },
}

impl WorldEvent {
    pub fn as_holder_event(&self) -> Option<&HolderEvent> {
        match self {
            WorldEvent::Holder(event) => Some(event),
            _ => None,
        }
    }
}

/// Receives every event once the task that produced it has committed.
pub trait WorldObserver: Send {
    fn on_event(&mut self, event: &WorldEvent);
}

#[derive(Debug, Default)]
pub struct Notifications {
    events: Vec<WorldEvent>,
}

impl Notifications {
    pub fn push(&mut self, event: WorldEvent) {
        self.events.push(event);
    }

    pub fn holder_added(&mut self, holder: HolderRef, thing: ThingRef, index: usize) {
        self.push(WorldEvent::Holder(HolderEvent {
            holder,
            thing,
            index,
            kind: HolderEventKind::Added,
        }));
    }

    pub fn holder_removed(&mut self, holder: HolderRef, thing: ThingRef, index: usize, complete: bool) {
        self.push(WorldEvent::Holder(HolderEvent {
            holder,
            thing,
            index,
            kind: HolderEventKind::Removed { complete },
        }));
    }

    pub fn drain(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
