/// Animation timeline: completion tokens for the step pipeline.
///
/// A step is computed against the model all at once and recorded as a queue
/// of stages. Each stage is a join of motions that start together; the stage
/// completes when its longest motion does. Completing a stage releases the
/// events queued with it and publishes its frame.
///
///   Stage 1: [chain slide | block slide]   → StepCompleted
///   Stage 2: [block drop  | block drop ]
///   Stage 3: [chain drop]
///   Stage 4: []                            → LevelLost
///   Stage 5: [loss flash | restart delay]  → (restart) LevelRestarted
///
/// Zero-length stages complete on the next `advance`, in order.

use std::collections::VecDeque;

use crate::domain::cell::Cell;
use crate::domain::entity::{BlockId, GravityRound};
use super::event::GameEvent;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MotionKind {
    ChainSlide,
    ChainDrop,
    BlockSlide(BlockId),
    BlockDrop(BlockId),
    BlockLost(BlockId),
    Bounce,
    LossFlash,
    WinFlash,
    RestartDelay,
}

/// One running animation. Done once `duration_ms` has elapsed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Motion {
    pub kind: MotionKind,
    pub duration_ms: u32,
}

impl Motion {
    pub fn new(kind: MotionKind, duration_ms: u32) -> Self {
        Motion { kind, duration_ms }
    }
}

/// Dynamic part of the world as the renderer shows it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub chain: Vec<Cell>,
    pub apples: Vec<Cell>,
    pub blocks: Vec<Cell>,
    pub portal_active: bool,
}

impl Frame {
    /// The frame after one round of push-block gravity.
    pub fn apply_round(&mut self, round: &GravityRound) {
        let gone: Vec<Cell> = round.fell.iter().chain(&round.lost).map(|&(_, c)| c).collect();
        self.blocks.retain(|c| !gone.contains(c));
        self.blocks.extend(round.fell.iter().map(|&(_, c)| c.below()));
        self.blocks.sort();
    }

    pub fn shift_chain_down(&mut self) {
        for seg in &mut self.chain {
            *seg = seg.below();
        }
    }
}

/// A join of motions plus what becomes visible when it completes.
#[derive(Clone, Debug, Default)]
pub struct Stage {
    pub motions: Vec<Motion>,
    pub events: Vec<GameEvent>,
    /// Model state after this stage; None keeps the previous frame.
    pub frame: Option<Frame>,
    /// Completing this stage wins the level.
    pub wins: bool,
    /// Completing this stage rebuilds the level.
    pub restarts: bool,
    elapsed_ms: u32,
}

impl Stage {
    pub fn join(motions: Vec<Motion>) -> Self {
        Stage { motions, ..Stage::default() }
    }

    pub fn single(kind: MotionKind, duration_ms: u32) -> Self {
        Stage::join(vec![Motion::new(kind, duration_ms)])
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_event(mut self, event: GameEvent) -> Self {
        self.events.push(event);
        self
    }

    /// The longest motion; an empty join completes immediately.
    pub fn duration_ms(&self) -> u32 {
        self.motions.iter().map(|m| m.duration_ms).max().unwrap_or(0)
    }

    pub fn has(&self, kind: MotionKind) -> bool {
        self.motions.iter().any(|m| m.kind == kind)
    }

    /// 0.0 at start, 1.0 when done.
    pub fn progress(&self) -> f32 {
        let total = self.duration_ms();
        if total == 0 { return 1.0; }
        self.elapsed_ms as f32 / total as f32
    }
}

#[derive(Debug, Default)]
pub struct Timeline {
    stages: VecDeque<Stage>,
}

impl Timeline {
    pub fn push(&mut self, stage: Stage) {
        self.stages.push_back(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The stage currently playing.
    pub fn current(&self) -> Option<&Stage> {
        self.stages.front()
    }

    /// The most recently queued stage.
    pub fn last_mut(&mut self) -> Option<&mut Stage> {
        self.stages.back_mut()
    }

    /// Move the clock forward by `dt_ms` and return the stages that
    /// completed, oldest first. Leftover time carries into the next stage.
    pub fn advance(&mut self, dt_ms: u32) -> Vec<Stage> {
        let mut done = vec![];
        let mut budget = dt_ms;
        while let Some(front) = self.stages.front_mut() {
            let remaining = front.duration_ms().saturating_sub(front.elapsed_ms);
            if budget < remaining {
                front.elapsed_ms += budget;
                break;
            }
            budget -= remaining;
            if let Some(stage) = self.stages.pop_front() {
                done.push(stage);
            }
        }
        done
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_lasts_as_long_as_slowest_motion() {
        let stage = Stage::join(vec![
            Motion::new(MotionKind::ChainSlide, 140),
            Motion::new(MotionKind::BlockSlide(BlockId(0)), 200),
        ]);
        assert_eq!(stage.duration_ms(), 200);
        assert!(stage.has(MotionKind::ChainSlide));
        assert!(!stage.has(MotionKind::Bounce));
    }

    #[test]
    fn stages_complete_in_order() {
        let mut tl = Timeline::default();
        tl.push(Stage::single(MotionKind::ChainSlide, 100).with_event(GameEvent::StepCompleted));
        tl.push(Stage::single(MotionKind::ChainDrop, 50).with_event(GameEvent::LevelLost));

        assert!(tl.advance(60).is_empty());
        assert!(tl.current().map_or(false, |s| s.progress() > 0.5));

        let done = tl.advance(40);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].events, vec![GameEvent::StepCompleted]);

        let done = tl.advance(1000);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].events, vec![GameEvent::LevelLost]);
        assert!(tl.is_empty());
    }

    #[test]
    fn leftover_time_carries_over() {
        let mut tl = Timeline::default();
        tl.push(Stage::single(MotionKind::ChainSlide, 100));
        tl.push(Stage::single(MotionKind::ChainDrop, 100));
        tl.push(Stage::single(MotionKind::ChainDrop, 100));
        assert_eq!(tl.advance(250).len(), 2);
        assert!(!tl.is_empty());
        assert_eq!(tl.advance(50).len(), 1);
        assert!(tl.is_empty());
    }

    #[test]
    fn frame_follows_gravity_round() {
        let mut frame = Frame { blocks: vec![Cell::new(1, 0), Cell::new(3, 2)], ..Frame::default() };
        frame.apply_round(&GravityRound {
            fell: vec![(BlockId(0), Cell::new(1, 0))],
            lost: vec![(BlockId(1), Cell::new(3, 2))],
        });
        assert_eq!(frame.blocks, vec![Cell::new(1, 1)]);
    }

    #[test]
    fn zero_length_stages_drain_at_once() {
        let mut tl = Timeline::default();
        tl.push(Stage::join(vec![]));
        tl.push(Stage::single(MotionKind::ChainDrop, 0));
        assert_eq!(tl.advance(0).len(), 2);
        assert!(tl.is_empty());
    }
}
