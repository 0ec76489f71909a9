use crate::entities::creature::CreatureId;
use crate::entities::inventory::Inventory;
use crate::entities::item::ItemId;
use crate::world::position::Direction;
use crate::world::time::Cooldown;
use std::collections::{BTreeMap, VecDeque};

/// Highest number of container windows a player may keep open.
pub const MAX_OPEN_CONTAINERS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradePhase {
    #[default]
    None,
    /// Offer sent, waiting for the partner to answer with an offer of their own.
    Initiated,
    /// Both offers are on the table.
    Acknowledge,
    Accept,
    /// Items are changing hands; cancellations are ignored.
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TradeSession {
    pub phase: TradePhase,
    pub partner: Option<CreatureId>,
    pub item: Option<ItemId>,
}

impl TradeSession {
    pub fn is_idle(&self) -> bool {
        self.phase == TradePhase::None
    }
}

/// Player-only state layered over the creature record with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: CreatureId,
    pub account: u32,
    pub ip: u32,
    pub inventory: Inventory,
    pub open_containers: BTreeMap<u8, ItemId>,
    pub trade: TradeSession,
    pub action_cooldown: Cooldown,
    pub walk_cooldown: Cooldown,
    pub walk_queue: VecDeque<Direction>,
}

impl Player {
    pub fn new(id: CreatureId, account: u32, ip: u32, capacity: u32) -> Self {
        Self {
            id,
            account,
            ip,
            inventory: Inventory::new(id, capacity),
            open_containers: BTreeMap::new(),
            trade: TradeSession::default(),
            action_cooldown: Cooldown::default(),
            walk_cooldown: Cooldown::default(),
            walk_queue: VecDeque::new(),
        }
    }

    pub fn next_container_id(&self) -> Option<u8> {
        (0..MAX_OPEN_CONTAINERS).find(|cid| !self.open_containers.contains_key(cid))
    }

    pub fn container_window(&self, container: ItemId) -> Option<u8> {
        self.open_containers
            .iter()
            .find_map(|(cid, open)| (*open == container).then_some(*cid))
    }

    /// Opens `container` in a window, reusing its window if already open.
    pub fn open_container(&mut self, container: ItemId) -> Option<u8> {
        if let Some(cid) = self.container_window(container) {
            return Some(cid);
        }
        let cid = self.next_container_id()?;
        self.open_containers.insert(cid, container);
        Some(cid)
    }

    pub fn close_container(&mut self, cid: u8) -> Option<ItemId> {
        self.open_containers.remove(&cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_windows_are_reused_and_bounded() {
        let mut player = Player::new(CreatureId(1), 1, 0, 400);
        assert_eq!(player.open_container(ItemId(10)), Some(0));
        assert_eq!(player.open_container(ItemId(11)), Some(1));
        assert_eq!(player.open_container(ItemId(10)), Some(0));

        assert_eq!(player.close_container(0), Some(ItemId(10)));
        assert_eq!(player.open_container(ItemId(12)), Some(0));

        for id in 13..40 {
            player.open_container(ItemId(id));
        }
        assert_eq!(player.open_containers.len(), usize::from(MAX_OPEN_CONTAINERS));
        assert_eq!(player.next_container_id(), None);
    }
}
