use crate::entities::item::ItemTypeId;
use crate::entities::stats::Stats;
use crate::world::position::{Direction, Position};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureKind {
    Player,
    Npc,
    Monster,
    Summon,
}

/// Generation number guarding a scheduled self-action. A task carrying an
/// older token than the creature's current one is stale and does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub position: Position,
    pub direction: Direction,
    pub stats: Stats,
    pub speed: u16,
    /// Health and mana restored on every think.
    pub regeneration: u32,
    pub master: Option<CreatureId>,
    pub summons: Vec<CreatureId>,
    pub attack_target: Option<CreatureId>,
    pub corpse: Option<ItemTypeId>,
    pub next_action: Option<ActionToken>,
    pub next_walk: Option<ActionToken>,
    /// Bucket in the periodic check rotation, if enrolled.
    pub check_bucket: Option<usize>,
    pub removed: bool,
}

impl Creature {
    pub fn new(id: CreatureId, name: &str, kind: CreatureKind, position: Position) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            position,
            direction: Direction::South,
            stats: Stats::new(100, 0),
            speed: 220,
            regeneration: 0,
            master: None,
            summons: Vec::new(),
            attack_target: None,
            corpse: None,
            next_action: None,
            next_walk: None,
            check_bucket: None,
            removed: false,
        }
    }

    pub fn is_player(&self) -> bool {
        self.kind == CreatureKind::Player
    }

    pub fn is_alive(&self) -> bool {
        self.stats.is_alive()
    }

    /// Time one step takes at the current speed; diagonal steps cost three times as much.
    pub fn step_duration(&self, direction: Direction) -> Duration {
        let speed = u64::from(self.speed.max(1));
        let base = (1000 * 220 / speed).max(50);
        if direction.is_diagonal() {
            Duration::from_millis(base * 3)
        } else {
            Duration::from_millis(base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faster_creatures_step_sooner() {
        let mut creature = Creature::new(CreatureId(1), "rat", CreatureKind::Monster, Position::new(1, 1, 7));
        creature.speed = 220;
        assert_eq!(creature.step_duration(Direction::North), Duration::from_millis(1000));
        assert_eq!(creature.step_duration(Direction::Northeast), Duration::from_millis(3000));
        creature.speed = 440;
        assert_eq!(creature.step_duration(Direction::North), Duration::from_millis(500));
    }
}
