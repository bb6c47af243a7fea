/// Move rules: truth-table driven.
///
/// Pure functions over a read-only view of the world. They decide whether a
/// requested direction is legal and what it would do, without doing it.
///
/// ## Head move
/// ┌────────────────────────────────┬───────────┐
/// │ Condition (checked in order)    │ Result    │
/// ├────────────────────────────────┼───────────┤
/// │ target out of bounds            │ REJECT    │
/// │ target is a wall                │ REJECT    │
/// │ target in body (see below)      │ REJECT    │
/// │ target holds a push-block       │ → push    │
/// │ otherwise                       │ ALLOW     │
/// └────────────────────────────────┴───────────┘
///
/// Body = every segment except the tail. When the target holds an apple the
/// chain grows and the tail stays put, so the tail counts as body too.
///
/// ## Push (target holds a block; dest = target + same delta)
/// ┌────────────────────────────────┬───────────┐
/// │ dest out of bounds              │ REJECT    │
/// │ dest is a wall                  │ REJECT    │
/// │ dest holds an apple             │ REJECT    │
/// │ dest holds another block        │ REJECT    │
/// │ dest in the post-move chain     │ REJECT    │
/// │ otherwise                       │ ALLOW     │
/// └────────────────────────────────┴───────────┘
///
/// ## Growth
/// Apple at target → new chain = [target, ..all segments].
/// Otherwise       → new chain = [target, ..all but the tail].
///
/// Reversing straight back is not special-cased: it lands on the neck and is
/// rejected as a body collision, except for a two-segment chain whose tail
/// vacates the cell.

use std::collections::BTreeSet;

use super::cell::{Cell, Direction};
use super::entity::{Apples, Chain, PushBlocks};

/// Immutable view of the world for rule queries.
pub struct MoveView<'a> {
    pub cols: usize,
    pub rows: usize,
    pub walls: &'a BTreeSet<Cell>,
    pub apples: &'a Apples,
    pub blocks: &'a PushBlocks,
    pub chain: &'a Chain,
}

impl<'a> MoveView<'a> {
    #[inline]
    pub fn in_bounds(&self, c: Cell) -> bool {
        c.x >= 0 && c.y >= 0 && (c.x as usize) < self.cols && (c.y as usize) < self.rows
    }

    #[inline]
    pub fn is_wall(&self, c: Cell) -> bool {
        self.walls.contains(&c)
    }
}

/// Why a move was refused. Never surfaced to the player; useful in logs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rejection {
    OutOfBounds,
    Wall,
    SelfCollision,
    PushOutOfBounds,
    PushIntoWall,
    PushIntoApple,
    PushIntoBlock,
    PushIntoChain,
}

/// A validated head move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovePlan {
    pub target: Cell,
    pub grows: bool,
    pub chain: Chain,
    /// (from, to) of a block pushed by the head.
    pub push: Option<(Cell, Cell)>,
}

/// Validate a head move in `dir` and compute its effects.
pub fn plan_move(view: &MoveView, dir: Direction) -> Result<MovePlan, Rejection> {
    let target = view.chain.head().step(dir);
    if !view.in_bounds(target) { return Err(Rejection::OutOfBounds); }
    if view.is_wall(target) { return Err(Rejection::Wall); }

    let grows = view.apples.has_at(target);
    if view.chain.body_after_move(grows).contains(&target) {
        return Err(Rejection::SelfCollision);
    }

    let chain = view.chain.advanced(target, grows);

    let push = if view.blocks.has_at(target) {
        let dest = target.step(dir);
        check_push(view, &chain, dest)?;
        Some((target, dest))
    } else {
        None
    };

    Ok(MovePlan { target, grows, chain, push })
}

fn check_push(view: &MoveView, moved: &Chain, dest: Cell) -> Result<(), Rejection> {
    if !view.in_bounds(dest) { return Err(Rejection::PushOutOfBounds); }
    if view.is_wall(dest) { return Err(Rejection::PushIntoWall); }
    if view.apples.has_at(dest) { return Err(Rejection::PushIntoApple); }
    if view.blocks.has_at(dest) { return Err(Rejection::PushIntoBlock); }
    if moved.contains(dest) { return Err(Rejection::PushIntoChain); }
    Ok(())
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
