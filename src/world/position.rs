use serde::{Deserialize, Serialize};

/// Deepest floor index a map may use.
pub const MAX_FLOOR: u8 = 15;

/// Ground level; stepping off a ledge from here never drops into the underground.
pub const SEA_LEVEL_FLOOR: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i16,
    pub dy: i16,
    pub dz: i8,
}

impl Position {
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: PositionDelta) -> Option<Self> {
        let x = i32::from(self.x) + i32::from(delta.dx);
        let y = i32::from(self.y) + i32::from(delta.dy);
        let z = i16::from(self.z) + i16::from(delta.dz);

        if x < 0 || y < 0 || z < 0 {
            return None;
        }

        if x > i32::from(u16::MAX) || y > i32::from(u16::MAX) || z > i16::from(MAX_FLOOR) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }

    pub fn step(self, direction: Direction) -> Option<Self> {
        self.offset(direction.delta())
    }

    /// One floor up (towards the sky).
    pub fn up(self) -> Option<Self> {
        self.offset(PositionDelta { dx: 0, dy: 0, dz: -1 })
    }

    /// One floor down.
    pub fn down(self) -> Option<Self> {
        self.offset(PositionDelta { dx: 0, dy: 0, dz: 1 })
    }

    pub fn is_in_range(self, other: Position, range_x: u16, range_y: u16, range_z: u8) -> bool {
        self.x.abs_diff(other.x) <= range_x
            && self.y.abs_diff(other.y) <= range_y
            && self.z.abs_diff(other.z) <= range_z
    }

    /// Adjacent on the same floor (or the same tile).
    pub fn is_adjacent(self, other: Position) -> bool {
        self.is_in_range(other, 1, 1, 0)
    }

    pub fn distance(self, other: Position) -> u16 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Direction of a single step that brings `self` closer to `target`.
    pub fn direction_to(self, target: Position) -> Option<Direction> {
        let dx = i32::from(target.x) - i32::from(self.x);
        let dy = i32::from(target.y) - i32::from(self.y);
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, 1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            (1, -1) => Some(Direction::Northeast),
            (-1, -1) => Some(Direction::Northwest),
            (1, 1) => Some(Direction::Southeast),
            (-1, 1) => Some(Direction::Southwest),
            _ => None,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Northeast,
        Direction::Northwest,
        Direction::Southeast,
        Direction::Southwest,
    ];

    pub fn delta(self) -> PositionDelta {
        match self {
            Direction::North => PositionDelta { dx: 0, dy: -1, dz: 0 },
            Direction::East => PositionDelta { dx: 1, dy: 0, dz: 0 },
            Direction::South => PositionDelta { dx: 0, dy: 1, dz: 0 },
            Direction::West => PositionDelta { dx: -1, dy: 0, dz: 0 },
            Direction::Northeast => PositionDelta { dx: 1, dy: -1, dz: 0 },
            Direction::Northwest => PositionDelta { dx: -1, dy: -1, dz: 0 },
            Direction::Southeast => PositionDelta { dx: 1, dy: 1, dz: 0 },
            Direction::Southwest => PositionDelta { dx: -1, dy: 1, dz: 0 },
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::Northeast
                | Direction::Northwest
                | Direction::Southeast
                | Direction::Southwest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_and_direction_to_agree() {
        let origin = Position::new(100, 100, 7);
        for direction in Direction::ALL {
            let next = origin.step(direction).expect("step");
            assert_eq!(origin.direction_to(next), Some(direction));
        }
        assert_eq!(origin.direction_to(origin), None);
    }

    #[test]
    fn floor_changes_are_bounded() {
        assert_eq!(Position::new(1, 1, 0).up(), None);
        assert_eq!(Position::new(1, 1, MAX_FLOOR).down(), None);
        assert_eq!(Position::new(1, 1, 7).down(), Some(Position::new(1, 1, 8)));
    }

    #[test]
    fn adjacency_ignores_other_floors() {
        let a = Position::new(10, 10, 7);
        assert!(a.is_adjacent(Position::new(11, 9, 7)));
        assert!(!a.is_adjacent(Position::new(11, 9, 6)));
        assert!(!a.is_adjacent(Position::new(12, 10, 7)));
        assert_eq!(a.distance(Position::new(13, 8, 7)), 3);
    }
}
