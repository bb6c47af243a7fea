/// Support and gravity: single source of truth for "what holds what up".
///
/// ## Support grid
///
/// A boolean matrix, rebuilt on demand from current state. A cell is SOLID if
/// it holds any of:
///   - a wall
///   - an apple
///   - a push-block
///   - a chain segment (push-block support only; the chain never rests on itself)
///
/// Outside the grid is never solid. A segment on the bottom row therefore has
/// no support from below: it is one drop away from leaving the map.
///
/// ## Chain support modes
///
/// ┌──────────────┬──────────────────────────────────────────────┐
/// │ Mode         │ Supported iff                                 │
/// ├──────────────┼──────────────────────────────────────────────┤
/// │ Any          │ at least one segment has a solid cell below   │
/// │ All (bridge) │ every segment has a solid cell below          │
/// └──────────────┴──────────────────────────────────────────────┘
///
/// ## Chain gravity
///
/// The chain drops as a rigid body, one row per iteration, while the chosen
/// test fails. A drop is feasible only if every segment's cell below is in
/// bounds and not solid. Whenever a drop is needed and any segment sits on
/// the bottom row, the chain has fallen off the map, whatever the mode.
/// An infeasible drop with no segment on the bottom row stops the fall
/// (the bridge pass on a partly supported chain ends here).

use std::collections::BTreeSet;

use super::cell::Cell;
use super::entity::{Apples, Chain, PushBlocks};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SupportMode {
    Any,
    All,
}

/// Result of one chain gravity resolution.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ChainFall {
    /// Rows dropped; each is one animation stage.
    pub drops: u32,
    pub fell_off: bool,
}

impl ChainFall {
    pub fn changed(&self) -> bool {
        self.drops > 0
    }
}

// ══════════════════════════════════════════════════════════════
// Support grid
// ══════════════════════════════════════════════════════════════

pub struct SupportGrid {
    cols: usize,
    rows: usize,
    solid: Vec<Vec<bool>>,
}

impl SupportGrid {
    /// Solids for the chain: walls, apples, push-blocks.
    pub fn for_chain(
        cols: usize,
        rows: usize,
        walls: &BTreeSet<Cell>,
        apples: &Apples,
        blocks: &PushBlocks,
    ) -> Self {
        let mut grid = SupportGrid::empty(cols, rows);
        for &c in walls {
            grid.mark(c);
        }
        for &c in apples.positions() {
            grid.mark(c);
        }
        for c in blocks.positions() {
            grid.mark(c);
        }
        grid
    }

    /// Static solids for push-blocks: walls, apples and the chain.
    /// Blocks themselves are checked live by the block collection.
    pub fn for_blocks(
        cols: usize,
        rows: usize,
        walls: &BTreeSet<Cell>,
        apples: &Apples,
        chain: &Chain,
    ) -> Self {
        let mut grid = SupportGrid::empty(cols, rows);
        for &c in walls {
            grid.mark(c);
        }
        for &c in apples.positions() {
            grid.mark(c);
        }
        for &c in chain.segments() {
            grid.mark(c);
        }
        grid
    }

    fn empty(cols: usize, rows: usize) -> Self {
        SupportGrid { cols, rows, solid: vec![vec![false; cols]; rows] }
    }

    fn mark(&mut self, c: Cell) {
        if self.in_bounds(c) {
            self.solid[c.y as usize][c.x as usize] = true;
        }
    }

    #[inline]
    pub fn in_bounds(&self, c: Cell) -> bool {
        c.x >= 0 && c.y >= 0 && (c.x as usize) < self.cols && (c.y as usize) < self.rows
    }

    /// Out of bounds is never solid.
    #[inline]
    pub fn is_solid(&self, c: Cell) -> bool {
        self.in_bounds(c) && self.solid[c.y as usize][c.x as usize]
    }

    /// Is the segment at `c` resting on something?
    #[inline]
    pub fn supports(&self, c: Cell) -> bool {
        self.is_solid(c.below())
    }

    #[inline]
    fn on_bottom_row(&self, c: Cell) -> bool {
        c.y + 1 >= self.rows as i32
    }
}

// ══════════════════════════════════════════════════════════════
// Chain queries
// ══════════════════════════════════════════════════════════════

pub fn chain_supported(grid: &SupportGrid, chain: &Chain, mode: SupportMode) -> bool {
    let mut segs = chain.segments().iter();
    match mode {
        SupportMode::Any => segs.any(|&s| grid.supports(s)),
        SupportMode::All => segs.all(|&s| grid.supports(s)),
    }
}

/// Can the whole chain drop by one row?
pub fn drop_feasible(grid: &SupportGrid, chain: &Chain) -> bool {
    chain.segments().iter().all(|&s| {
        let below = s.below();
        grid.in_bounds(below) && !grid.is_solid(below)
    })
}

fn touches_bottom(grid: &SupportGrid, chain: &Chain) -> bool {
    chain.segments().iter().any(|&s| grid.on_bottom_row(s))
}

/// Drop the chain until the `mode` test holds, it gets stuck, or it leaves
/// the map. The grid must be a chain grid (`SupportGrid::for_chain`); it does
/// not change while the chain falls, since nothing else moves meanwhile.
pub fn resolve_chain_gravity(grid: &SupportGrid, chain: &mut Chain, mode: SupportMode) -> ChainFall {
    let mut fall = ChainFall::default();
    if chain_supported(grid, chain, mode) {
        return fall;
    }
    if touches_bottom(grid, chain) {
        fall.fell_off = true;
        return fall;
    }
    while !chain_supported(grid, chain, mode) {
        if !drop_feasible(grid, chain) {
            fall.fell_off = touches_bottom(grid, chain);
            break;
        }
        chain.shift_down();
        fall.drops += 1;
    }
    fall
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Build a chain grid from a diagram.
    /// Legend: '#'=wall  'o'=apple  'B'=push-block  anything else=empty
    fn grid_from(rows: &[&str]) -> SupportGrid {
        let h = rows.len();
        let w = rows[0].len();
        let mut walls = BTreeSet::new();
        let mut apples = vec![];
        let mut blocks = vec![];
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let c = Cell::new(x as i32, y as i32);
                match ch {
                    '#' => { walls.insert(c); }
                    'o' => apples.push(c),
                    'B' => blocks.push(c),
                    _ => {}
                }
            }
        }
        SupportGrid::for_chain(w, h, &walls, &Apples::new(apples), &PushBlocks::new(blocks))
    }

    fn chain(cells: &[(i32, i32)]) -> Chain {
        Chain::new(cells.iter().map(|&(x, y)| Cell::new(x, y)).collect()).unwrap()
    }

    // ── support tests ──

    #[test]
    fn any_support_needs_one_segment() {
        let g = grid_from(&[
            "...",
            "#..",
        ]);
        let ch = chain(&[(1, 0), (0, 0)]);
        assert!(chain_supported(&g, &ch, SupportMode::Any));
        assert!(!chain_supported(&g, &ch, SupportMode::All));
    }

    #[test]
    fn apples_and_blocks_are_solid() {
        let g = grid_from(&[
            "..",
            "oB",
        ]);
        let ch = chain(&[(1, 0), (0, 0)]);
        assert!(chain_supported(&g, &ch, SupportMode::All));
    }

    #[test]
    fn bottom_row_is_not_supported() {
        let g = grid_from(&["..", ".."]);
        assert!(!g.supports(Cell::new(0, 1)));
        assert!(!g.is_solid(Cell::new(0, 2)));
    }

    #[test]
    fn chain_segments_support_blocks_only() {
        let ch = chain(&[(0, 1)]);
        let g = SupportGrid::for_blocks(1, 3, &BTreeSet::new(), &Apples::default(), &ch);
        assert!(g.supports(Cell::new(0, 0)));
        let cg = SupportGrid::for_chain(1, 3, &BTreeSet::new(), &Apples::default(), &PushBlocks::default());
        assert!(!cg.supports(Cell::new(0, 0)));
    }

    // ── gravity resolution ──

    #[test]
    fn supported_chain_stays() {
        let g = grid_from(&[
            "...",
            "###",
        ]);
        let mut ch = chain(&[(1, 0), (0, 0)]);
        let fall = resolve_chain_gravity(&g, &mut ch, SupportMode::Any);
        assert_eq!(fall, ChainFall::default());
        assert!(!fall.changed());
    }

    #[test]
    fn chain_falls_onto_floor() {
        let g = grid_from(&[
            "...",
            "...",
            "...",
            "###",
        ]);
        let mut ch = chain(&[(1, 0), (0, 0)]);
        let fall = resolve_chain_gravity(&g, &mut ch, SupportMode::Any);
        assert_eq!(fall.drops, 2);
        assert!(!fall.fell_off);
        assert_eq!(ch.head(), Cell::new(1, 2));
    }

    #[test]
    fn chain_without_floor_falls_off() {
        let g = grid_from(&[
            "...",
            "...",
            "...",
        ]);
        let mut ch = chain(&[(1, 0), (0, 0)]);
        let fall = resolve_chain_gravity(&g, &mut ch, SupportMode::Any);
        assert!(fall.fell_off);
        assert_eq!(fall.drops, 2);
    }

    #[test]
    fn bridge_on_partly_supported_chain_stops() {
        let g = grid_from(&[
            "...",
            "#..",
            "...",
        ]);
        let mut ch = chain(&[(1, 0), (0, 0)]);
        let fall = resolve_chain_gravity(&g, &mut ch, SupportMode::All);
        assert_eq!(fall.drops, 0);
        assert!(!fall.fell_off);
    }

    #[test]
    fn bridge_with_segment_on_bottom_row_is_a_loss() {
        let g = grid_from(&[
            "...",
            "...",
            "#..",
        ]);
        // first segment rests on the wall, the tail hangs on the bottom row
        let mut ch = chain(&[(0, 1), (1, 1), (1, 2)]);
        assert!(chain_supported(&g, &ch, SupportMode::Any));
        let fall = resolve_chain_gravity(&g, &mut ch, SupportMode::All);
        assert!(fall.fell_off);
        assert_eq!(fall.drops, 0);
    }

    proptest! {
        #[test]
        fn gravity_converges_within_rows(
            rows in 2usize..10,
            cols in 1usize..8,
            floor in proptest::collection::vec(any::<bool>(), 8),
            head_x in 0i32..8,
        ) {
            let head_x = head_x % cols as i32;
            let mut walls = BTreeSet::new();
            for (x, present) in floor.iter().enumerate().take(cols) {
                if *present { walls.insert(Cell::new(x as i32, rows as i32 - 1)); }
            }
            let grid = SupportGrid::for_chain(cols, rows, &walls, &Apples::default(), &PushBlocks::default());
            let mut ch = chain(&[(head_x, 0)]);
            let fall = resolve_chain_gravity(&grid, &mut ch, SupportMode::Any);
            prop_assert!(fall.drops as usize <= rows);
            prop_assert!(fall.fell_off || chain_supported(&grid, &ch, SupportMode::Any));
        }
    }
}
