use crate::entities::creature::CreatureId;
use crate::world::holder::{Holder, HolderRef, MoveFlags, SlotHint, ThingRef, WorldView};
use crate::world::position::{Direction, Position};

/// Upper bound on the length of any path handed out.
pub const MAX_PATH_STEPS: usize = 64;

/// Finds a walk that ends next to `target`. An empty path means the mover
/// is already adjacent; `None` means there is no way there.
pub trait PathFinder: Send {
    fn find_path(&self, view: &WorldView<'_>, mover: CreatureId, target: Position) -> Option<Vec<Direction>>;
}

/// Greedy walker: always steps straight towards the target and gives up as
/// soon as that step is blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPathFinder;

impl PathFinder for DirectPathFinder {
    fn find_path(&self, view: &WorldView<'_>, mover: CreatureId, target: Position) -> Option<Vec<Direction>> {
        let mut at = view.creature(mover)?.position;
        if at.z != target.z {
            return None;
        }
        let thing = ThingRef::Creature(mover);
        let mut path = Vec::new();
        while !at.is_adjacent(target) {
            if path.len() >= MAX_PATH_STEPS {
                return None;
            }
            let direction = at.direction_to(target)?;
            let next = at.step(direction)?;
            let passable = view
                .holder(HolderRef::Tile(next))
                .map_or(false, |tile| {
                    tile.query_add(view, SlotHint::Anywhere, thing, 1, MoveFlags::NONE).is_ok()
                });
            if !passable {
                return None;
            }
            path.push(direction);
            at = next;
        }
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testkit::{self, *};

    #[test]
    fn path_stops_next_to_the_target() {
        let mut world = testkit::world();
        let rat = testkit::spawn_monster(&mut world, "rat", CENTER);
        let target = Position::new(CENTER.x + 3, CENTER.y + 1, CENTER.z);
        let path = DirectPathFinder.find_path(&world.view(), rat, target).expect("path");
        assert_eq!(path, vec![Direction::Southeast, Direction::East]);
    }

    #[test]
    fn adjacent_targets_need_no_steps() {
        let mut world = testkit::world();
        let rat = testkit::spawn_monster(&mut world, "rat", CENTER);
        let path = DirectPathFinder.find_path(&world.view(), rat, testkit::east_of(CENTER));
        assert_eq!(path, Some(Vec::new()));
    }

    #[test]
    fn blocked_steps_mean_no_way() {
        let mut world = testkit::world();
        let rat = testkit::spawn_monster(&mut world, "rat", CENTER);
        testkit::put_on_tile(&mut world, testkit::east_of(CENTER), STATUE, 1);
        let target = Position::new(CENTER.x + 3, CENTER.y, CENTER.z);
        assert_eq!(DirectPathFinder.find_path(&world.view(), rat, target), None);
    }
}
