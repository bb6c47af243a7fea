/// WorldState: the authoritative model of one level in play.
///
/// ## Layers
///
///   - `base`: the parsed level. **Never mutated** after load.
///   - the rest: the live entities (chain, apples, push-blocks) and the
///     direction memory.
///
/// Walls, portal and dimensions never change during play.
/// `restart()` rebuilds every live entity from `base`.
///
/// The world holds no animation or timing state; the step pipeline is its
/// only mutator during play.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::domain::cell::{Cell, Direction};
use crate::domain::entity::{Apples, BlockId, Chain, GravityRound, PushBlocks};
use crate::domain::rules::MoveView;
use crate::domain::support::SupportGrid;
use super::anim::Frame;
use super::level::{ParsedLevel, FALLBACK_CHAIN};

pub struct WorldState {
    // ── Static terrain ──
    pub cols: usize,
    pub rows: usize,
    pub walls: BTreeSet<Cell>,
    pub portal: Option<Cell>,

    // ── Entities ──
    pub apples: Apples,
    pub blocks: PushBlocks,
    pub chain: Chain,

    // ── Direction memory ──
    /// Direction of the current (or last attempted) move.
    pub direction: Direction,
    /// Direction of the last committed step; None right after load.
    pub previous: Option<Direction>,

    base: ParsedLevel,
}

// ── Construction ──

impl WorldState {
    pub fn from_level(base: ParsedLevel) -> Self {
        let chain = initial_chain(&base);
        let direction = initial_direction(&chain);
        let apples = Apples::new(base.apples.iter().copied());
        let blocks = PushBlocks::new(base.push_blocks.iter().copied());
        debug!(
            "{}x{} level: chain of {}, {} apples, {} push-blocks",
            base.cols, base.rows, chain.len(), apples.count(), blocks.count(),
        );
        WorldState {
            cols: base.cols,
            rows: base.rows,
            walls: base.walls.clone(),
            portal: base.portal,
            apples,
            blocks,
            chain,
            direction,
            previous: None,
            base,
        }
    }

    /// Rebuild chain, apples and push-blocks from the parsed level.
    pub fn restart(&mut self) {
        self.chain = initial_chain(&self.base);
        self.direction = initial_direction(&self.chain);
        self.previous = None;
        self.apples = Apples::new(self.base.apples.iter().copied());
        self.blocks = PushBlocks::new(self.base.push_blocks.iter().copied());
    }
}

fn initial_chain(level: &ParsedLevel) -> Chain {
    if let Some(chain) = level.chain.clone().and_then(Chain::new) {
        return chain;
    }
    warn!("level has no start marker; using the fallback chain");
    let mut segments = FALLBACK_CHAIN.to_vec();
    segments.retain(|&c| in_bounds(level.cols, level.rows, c));
    // Even an empty map gets a one-cell chain at the origin.
    Chain::new(segments).unwrap_or_else(|| Chain::single(Cell::new(0, 0)))
}

fn initial_direction(chain: &Chain) -> Direction {
    match chain.segments() {
        [head, next, ..] => Direction::facing(*head, *next),
        _ => Direction::Right,
    }
}

#[inline]
fn in_bounds(cols: usize, rows: usize, c: Cell) -> bool {
    c.x >= 0 && c.y >= 0 && (c.x as usize) < cols && (c.y as usize) < rows
}

// ── Read queries ──

impl WorldState {
    #[inline]
    pub fn is_wall(&self, c: Cell) -> bool {
        self.walls.contains(&c)
    }

    /// The portal only counts once every apple is eaten.
    pub fn portal_active(&self) -> bool {
        self.portal.is_some() && self.apples.count() == 0
    }

    pub fn is_win_position(&self) -> bool {
        self.portal_active() && self.portal == Some(self.chain.head())
    }

    pub fn move_view(&self) -> MoveView<'_> {
        MoveView {
            cols: self.cols,
            rows: self.rows,
            walls: &self.walls,
            apples: &self.apples,
            blocks: &self.blocks,
            chain: &self.chain,
        }
    }

    /// Support grid for the chain (walls, apples, push-blocks).
    pub fn chain_grid(&self) -> SupportGrid {
        SupportGrid::for_chain(self.cols, self.rows, &self.walls, &self.apples, &self.blocks)
    }

    pub fn snapshot(&self) -> Frame {
        Frame {
            chain: self.chain.segments().to_vec(),
            apples: self.apples.positions().iter().copied().collect(),
            blocks: self.blocks.positions().collect(),
            portal_active: self.portal_active(),
        }
    }
}

// ── Narrow mutations ──

impl WorldState {
    /// Eat the apple at `c`. Returns whether one was there.
    pub fn consume_apple(&mut self, c: Cell) -> bool {
        self.apples.eat_at(c)
    }

    pub fn relocate_block(&mut self, from: Cell, to: Cell) -> Option<BlockId> {
        self.blocks.relocate(from, to)
    }

    pub fn replace_chain(&mut self, chain: Chain) {
        self.chain = chain;
    }

    /// Let push-blocks fall until none moves. Blocks rest on walls, apples,
    /// chain segments and each other; blocks past the bottom are removed.
    pub fn settle_blocks(&mut self) -> Vec<GravityRound> {
        let grid = SupportGrid::for_blocks(self.cols, self.rows, &self.walls, &self.apples, &self.chain);
        let (cols, rows) = (self.cols, self.rows);
        self.blocks.resolve_gravity(
            |c| grid.is_solid(c),
            |c| in_bounds(cols, rows, c),
        )
    }
}
