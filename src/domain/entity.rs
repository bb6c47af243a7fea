/// Entities: the chain, the apple collection and the push-block collection.
///
/// Apples and push-blocks are the two mutable collections the step pipeline
/// talks to through narrow interfaces (`has_at`, `eat_at`, `relocate`,
/// `resolve_gravity`). None of them know about animation: operations that
/// move things report what moved, and the pipeline turns that into stages.

use std::collections::{BTreeMap, BTreeSet};

use super::cell::Cell;

// ══════════════════════════════════════════════════════════════
// Chain
// ══════════════════════════════════════════════════════════════

/// The player-controlled chain. Segment 0 is the head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    segments: Vec<Cell>,
}

impl Chain {
    /// Build a chain from head-first segments. Empty input is not a chain.
    pub fn new(segments: Vec<Cell>) -> Option<Self> {
        if segments.is_empty() { return None; }
        Some(Chain { segments })
    }

    pub fn single(cell: Cell) -> Self {
        Chain { segments: vec![cell] }
    }

    pub fn head(&self) -> Cell {
        self.segments[0]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Cell] {
        &self.segments
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.segments.contains(&cell)
    }

    /// Cells that stay occupied while the head moves: every segment except
    /// the tail, or all of them when the chain is growing this step.
    pub fn body_after_move(&self, grows: bool) -> &[Cell] {
        if grows { &self.segments } else { &self.segments[..self.segments.len() - 1] }
    }

    /// The chain after the head enters `target`.
    pub fn advanced(&self, target: Cell, grows: bool) -> Chain {
        let body = self.body_after_move(grows);
        let mut segments = Vec::with_capacity(body.len() + 1);
        segments.push(target);
        segments.extend_from_slice(body);
        Chain { segments }
    }

    /// Every segment shares the head's column.
    pub fn is_vertical(&self) -> bool {
        let x = self.head().x;
        self.segments.iter().all(|s| s.x == x)
    }

    pub fn shift_down(&mut self) {
        for seg in &mut self.segments {
            seg.y += 1;
        }
    }

    /// No two segments share a cell.
    pub fn is_settled(&self) -> bool {
        let unique: BTreeSet<Cell> = self.segments.iter().copied().collect();
        unique.len() == self.segments.len()
    }
}

// ══════════════════════════════════════════════════════════════
// Apples
// ══════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Apples {
    cells: BTreeSet<Cell>,
}

impl Apples {
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Self {
        Apples { cells: cells.into_iter().collect() }
    }

    pub fn count(&self) -> usize {
        self.cells.len()
    }

    pub fn has_at(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    /// Remove the apple at `cell`. Returns whether one was there.
    pub fn eat_at(&mut self, cell: Cell) -> bool {
        self.cells.remove(&cell)
    }

    pub fn positions(&self) -> &BTreeSet<Cell> {
        &self.cells
    }
}

// ══════════════════════════════════════════════════════════════
// Push-blocks
// ══════════════════════════════════════════════════════════════

/// Stable identity of a push-block, kept across relocations so the
/// presentation layer can follow one block through a fall.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockId(pub u32);

/// Outcome of one iteration of push-block gravity.
/// Every block in `fell` dropped by one row concurrently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GravityRound {
    /// (block, cell it left); the block now sits one row lower.
    pub fell: Vec<(BlockId, Cell)>,
    /// Blocks that dropped past the bottom edge and no longer exist.
    pub lost: Vec<(BlockId, Cell)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushBlocks {
    by_cell: BTreeMap<Cell, BlockId>,
}

impl PushBlocks {
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Self {
        let by_cell = cells
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, BlockId(i as u32)))
            .collect();
        PushBlocks { by_cell }
    }

    pub fn has_at(&self, cell: Cell) -> bool {
        self.by_cell.contains_key(&cell)
    }

    pub fn count(&self) -> usize {
        self.by_cell.len()
    }

    pub fn positions(&self) -> impl Iterator<Item = Cell> + '_ {
        self.by_cell.keys().copied()
    }

    /// Move the block at `from` to `to`. Returns the moved block's id,
    /// or None when there is no block at `from`.
    pub fn relocate(&mut self, from: Cell, to: Cell) -> Option<BlockId> {
        let id = self.by_cell.remove(&from)?;
        self.by_cell.insert(to, id);
        Some(id)
    }

    /// Drop blocks one row at a time until none moves.
    ///
    /// `static_solid(cell)` answers for everything except blocks (walls,
    /// apples, chain segments); blocks are checked against the live
    /// collection. A block whose cell below is outside the map is removed
    /// immediately, so later blocks in the same iteration no longer rest on it.
    /// Fallers are collected first and moved together, which means a stack
    /// settles one block per iteration from the bottom up.
    pub fn resolve_gravity(
        &mut self,
        static_solid: impl Fn(Cell) -> bool,
        in_bounds: impl Fn(Cell) -> bool,
    ) -> Vec<GravityRound> {
        let mut rounds = Vec::new();
        loop {
            let mut round = GravityRound::default();
            let snapshot: Vec<(Cell, BlockId)> =
                self.by_cell.iter().map(|(c, id)| (*c, *id)).collect();

            for (cell, id) in snapshot {
                let below = cell.below();
                if !in_bounds(below) {
                    self.by_cell.remove(&cell);
                    round.lost.push((id, cell));
                    continue;
                }
                if !static_solid(below) && !self.by_cell.contains_key(&below) {
                    round.fell.push((id, cell));
                }
            }

            for &(_, cell) in &round.fell {
                self.by_cell.remove(&cell);
            }
            for &(id, cell) in &round.fell {
                self.by_cell.insert(cell.below(), id);
            }

            let done = round.fell.is_empty();
            if !round.fell.is_empty() || !round.lost.is_empty() {
                rounds.push(round);
            }
            if done { break; }
        }
        rounds
    }
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
