/// Events emitted during a simulation step.
/// Released in pipeline order, each when its animation stage completes.

use crate::domain::cell::Cell;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    /// The head moved one cell. Drives the step counter.
    StepCompleted,
    ApplesRemaining(usize),
    LevelWon { elapsed_ms: u64, steps: u32 },
    /// An upward move on a vertical chain was refused with a bounce.
    Bounced,
    BlockPushed { from: Cell, to: Cell },
    BlockFellAway { from: Cell },
    LevelLost,
    LevelRestarted,
}
