/// Grid coordinates and movement directions.
///
/// Coordinates are signed: a planned target one step past the map edge
/// must be representable so the rules layer can reject it.

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Cell { x, y }
    }

    /// The neighbouring cell one step in `dir`.
    #[inline]
    pub fn step(self, dir: Direction) -> Cell {
        let (dx, dy) = dir.delta();
        Cell { x: self.x + dx, y: self.y + dy }
    }

    #[inline]
    pub fn below(self) -> Cell {
        Cell { x: self.x, y: self.y + 1 }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    #[cfg(test)]
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit delta; screen coordinates, so `Up` decreases y.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Direction a chain faces, given its head and the segment behind it.
    pub fn facing(head: Cell, next: Cell) -> Direction {
        if head.y == next.y {
            if next.x < head.x { Direction::Right } else { Direction::Left }
        } else if next.y < head.y {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}
