/// The step pipeline: turns one requested direction into one game turn.
///
/// States:
///   Idle:      accepts input
///   Resolving: a step is playing back; input is dropped, not queued
///   Won:       terminal; all input ignored
///
/// Processing order (`request_move`, only while Idle):
///   1. Bounce guard (up on a vertical chain: cosmetic bounce, no change)
///   2. Plan head move (bounds → wall → body)
///   3. Push check (the block ahead must have a free destination)
///   4. Growth (apple ahead keeps the tail)
///   5. Commit chain + push as one joined stage → StepCompleted
///   6. Win check A
///   7. Block gravity, chain gravity (any-support), and
///      block gravity again if the chain dropped          → loss?
///   8. Direction changed: chain gravity (bridge)         → loss?
///   9. Grew: eat apple, block gravity, chain gravity     → loss?
///  10. Win check B
///  11. Remember direction
///
/// Rejected moves change nothing, not even the remembered direction.
///
/// The whole turn is resolved against the model immediately and recorded as
/// a timeline of stages. `advance` plays the timeline back; events reach the
/// caller only when their stage completes, and a loss rebuilds the level
/// only once its flash and restart delay (started together) have run out.

use log::{debug, info};

use crate::config::TimingConfig;
use crate::domain::cell::Direction;
use crate::domain::rules::{self, Rejection};
use crate::domain::support::{self, SupportMode};
use super::anim::{Frame, Motion, MotionKind, Stage, Timeline};
use super::event::GameEvent;
use super::session::Session;
use super::world::WorldState;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PipelineState {
    Idle,
    Resolving,
    Won,
}

/// What `request_move` did with the input.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MoveOutcome {
    Accepted,
    Bounced,
    Rejected(Rejection),
    /// Dropped: a step is still resolving, or the level is won.
    Ignored,
}

/// Whether the turn may continue after a settle phase.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Settle {
    Stable,
    FellOff,
}

pub struct Pipeline {
    timing: TimingConfig,
    timeline: Timeline,
    won: bool,
    /// Frame of the last completed stage.
    shown: Frame,
}

// ══════════════════════════════════════════════════════════════
// Main entry points
// ══════════════════════════════════════════════════════════════

impl Pipeline {
    pub fn new(timing: TimingConfig, world: &WorldState) -> Self {
        Pipeline {
            timing,
            timeline: Timeline::default(),
            won: false,
            shown: world.snapshot(),
        }
    }

    /// Drop any playback and show the world as it is (level switch or
    /// manual restart).
    pub fn reset(&mut self, world: &WorldState) {
        self.timeline.clear();
        self.won = false;
        self.shown = world.snapshot();
    }

    pub fn state(&self) -> PipelineState {
        if self.won {
            PipelineState::Won
        } else if !self.timeline.is_empty() {
            PipelineState::Resolving
        } else {
            PipelineState::Idle
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.shown
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.timeline.current()
    }

    /// The single entry point for every input source.
    pub fn request_move(&mut self, world: &mut WorldState, dir: Direction) -> MoveOutcome {
        if self.state() != PipelineState::Idle {
            return MoveOutcome::Ignored;
        }

        if dir == Direction::Up && world.chain.is_vertical() {
            self.timeline.push(
                Stage::single(MotionKind::Bounce, self.timing.bounce_ms)
                    .with_event(GameEvent::Bounced),
            );
            return MoveOutcome::Bounced;
        }

        let plan = match rules::plan_move(&world.move_view(), dir) {
            Ok(plan) => plan,
            Err(why) => {
                debug!("move {:?} rejected: {:?}", dir, why);
                return MoveOutcome::Rejected(why);
            }
        };
        world.direction = dir;

        // ── commit: chain translation joined with the push ──
        let mut stage = Stage::single(MotionKind::ChainSlide, self.timing.move_ms);
        world.replace_chain(plan.chain);
        debug_assert!(world.chain.is_settled());
        if let Some((from, to)) = plan.push {
            if let Some(id) = world.relocate_block(from, to) {
                stage.motions.push(Motion::new(MotionKind::BlockSlide(id), self.timing.move_ms));
                stage.events.push(GameEvent::BlockPushed { from, to });
            }
        }
        stage.events.push(GameEvent::StepCompleted);
        self.timeline.push(stage.with_frame(world.snapshot()));

        if self.check_win(world) {
            return MoveOutcome::Accepted;
        }

        // ── settle ──
        if self.settle(world, SupportMode::Any) == Settle::FellOff {
            self.lose(world);
            return MoveOutcome::Accepted;
        }

        if world.previous.map_or(false, |prev| prev != dir)
            && self.settle_chain(world, SupportMode::All) == Settle::FellOff
        {
            self.lose(world);
            return MoveOutcome::Accepted;
        }

        if plan.grows {
            world.consume_apple(plan.target);
            let remaining = world.apples.count();
            self.timeline.push(
                Stage::join(vec![])
                    .with_event(GameEvent::ApplesRemaining(remaining))
                    .with_frame(world.snapshot()),
            );
            if self.settle(world, SupportMode::Any) == Settle::FellOff {
                self.lose(world);
                return MoveOutcome::Accepted;
            }
        }

        if !self.check_win(world) {
            world.previous = Some(dir);
        }
        MoveOutcome::Accepted
    }

    /// Play the timeline forward. Returns the events of every stage that
    /// completed, in order, after applying them to the session.
    pub fn advance(&mut self, world: &mut WorldState, session: &mut Session, dt_ms: u32) -> Vec<GameEvent> {
        session.tick(dt_ms as u64);

        let mut events = vec![];
        for stage in self.timeline.advance(dt_ms) {
            if let Some(frame) = stage.frame {
                self.shown = frame;
            }
            for event in stage.events {
                if event == GameEvent::StepCompleted {
                    session.record_step();
                }
                events.push(event);
            }
            if stage.wins {
                session.stop();
                info!("level won: {} steps, {} ms", session.steps(), session.elapsed_ms());
                events.push(GameEvent::LevelWon {
                    elapsed_ms: session.elapsed_ms(),
                    steps: session.steps(),
                });
            }
            if stage.restarts {
                world.restart();
                session.reset();
                self.shown = world.snapshot();
                events.push(GameEvent::LevelRestarted);
            }
        }
        events
    }
}

// ══════════════════════════════════════════════════════════════
// Settle phases
// ══════════════════════════════════════════════════════════════

impl Pipeline {
    /// Push-block gravity, then chain gravity in `mode`. Blocks that rested
    /// on the chain fall after it; a falling block never takes support away
    /// from the chain, so one more block pass leaves everything stable.
    fn settle(&mut self, world: &mut WorldState, mode: SupportMode) -> Settle {
        self.settle_blocks(world);
        let head = world.chain.head();
        let settled = self.settle_chain(world, mode);
        if settled == Settle::Stable && world.chain.head() != head {
            self.settle_blocks(world);
        }
        settled
    }

    /// One concurrent stage per gravity round.
    fn settle_blocks(&mut self, world: &mut WorldState) {
        let mut frame = world.snapshot();
        for round in world.settle_blocks() {
            let drop_ms = self.timing.block_fall_ms;
            let mut motions: Vec<Motion> = round.fell.iter()
                .map(|&(id, _)| Motion::new(MotionKind::BlockDrop(id), drop_ms))
                .collect();
            motions.extend(round.lost.iter().map(|&(id, _)| Motion::new(MotionKind::BlockLost(id), drop_ms)));

            let mut stage = Stage::join(motions);
            for &(_, from) in &round.lost {
                stage.events.push(GameEvent::BlockFellAway { from });
            }
            frame.apply_round(&round);
            self.timeline.push(stage.with_frame(frame.clone()));
        }
    }

    /// One stage per row dropped.
    fn settle_chain(&mut self, world: &mut WorldState, mode: SupportMode) -> Settle {
        let grid = world.chain_grid();
        let mut frame = world.snapshot();
        let fall = support::resolve_chain_gravity(&grid, &mut world.chain, mode);
        for _ in 0..fall.drops {
            frame.shift_chain_down();
            self.timeline.push(
                Stage::single(MotionKind::ChainDrop, self.timing.fall_ms).with_frame(frame.clone()),
            );
        }
        if fall.changed() {
            debug!("chain dropped {} rows ({:?})", fall.drops, mode);
        }
        if fall.fell_off { Settle::FellOff } else { Settle::Stable }
    }
}

// ══════════════════════════════════════════════════════════════
// Win / loss
// ══════════════════════════════════════════════════════════════

impl Pipeline {
    /// Head on an active portal: the stage that got it there wins the level.
    fn check_win(&mut self, world: &mut WorldState) -> bool {
        if !world.is_win_position() { return false; }
        if let Some(stage) = self.timeline.last_mut() {
            stage.wins = true;
        }
        self.timeline.push(Stage::single(MotionKind::WinFlash, self.timing.win_flash_ms));
        self.won = true;
        world.previous = Some(world.direction);
        true
    }

    /// Signal the loss at once, then flash and wait side by side; the level
    /// is rebuilt when the longer of the two ends.
    fn lose(&mut self, world: &WorldState) {
        info!("chain fell off the map at {}", world.chain.head());
        self.timeline.push(Stage::join(vec![]).with_event(GameEvent::LevelLost));
        let mut hold = Stage::join(vec![
            Motion::new(MotionKind::LossFlash, self.timing.loss_flash_ms),
            Motion::new(MotionKind::RestartDelay, self.timing.restart_delay_ms),
        ]);
        hold.restarts = true;
        self.timeline.push(hold);
    }
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::Cell;
    use crate::sim::level::parse_level;
    use proptest::prelude::*;

    fn instant() -> TimingConfig {
        TimingConfig {
            frame_ms: 1,
            move_ms: 0,
            fall_ms: 0,
            block_fall_ms: 0,
            bounce_ms: 0,
            win_flash_ms: 0,
            loss_flash_ms: 0,
            restart_delay_ms: 0,
        }
    }

    struct Game {
        world: WorldState,
        session: Session,
        pipeline: Pipeline,
    }

    impl Game {
        /// Helper: a game from a map diagram with zero-length animations.
        /// Legend:  '#'=wall  'o'=apple  'B'=push-block  'P'=portal
        ///          'S'=head  '1'..'9'=followers
        fn new(map: &[&str]) -> Self {
            Game::with_timing(map, instant())
        }

        fn with_timing(map: &[&str], timing: TimingConfig) -> Self {
            let world = WorldState::from_level(parse_level(map));
            let pipeline = Pipeline::new(timing, &world);
            Game { world, session: Session::new(), pipeline }
        }

        /// Request a move and play it back to the end.
        fn play(&mut self, dir: Direction) -> (MoveOutcome, Vec<GameEvent>) {
            let outcome = self.pipeline.request_move(&mut self.world, dir);
            let events = self.pipeline.advance(&mut self.world, &mut self.session, 0);
            (outcome, events)
        }

        fn chain(&self) -> Vec<Cell> {
            self.world.chain.segments().to_vec()
        }
    }

    fn cells(list: &[(i32, i32)]) -> Vec<Cell> {
        list.iter().map(|&(x, y)| Cell::new(x, y)).collect()
    }

    // ── scenarios ──

    #[test]
    fn apple_growth_then_rest_on_floor() {
        let mut g = Game::new(&[
            ".....",
            ".....",
            "1So..",
            ".....",
            "#####",
        ]);

        let (outcome, events) = g.play(Direction::Right);
        assert_eq!(outcome, MoveOutcome::Accepted);
        assert!(events.contains(&GameEvent::ApplesRemaining(0)));
        assert_eq!(g.chain(), cells(&[(2, 3), (1, 3), (0, 3)]));

        let (outcome, events) = g.play(Direction::Right);
        assert_eq!(outcome, MoveOutcome::Accepted);
        assert_eq!(events, vec![GameEvent::StepCompleted]);
        assert_eq!(g.chain(), cells(&[(3, 3), (2, 3), (1, 3)]));

        // the floor is a wall
        let (outcome, _) = g.play(Direction::Down);
        assert_eq!(outcome, MoveOutcome::Rejected(Rejection::Wall));
        assert_eq!(g.chain().len(), 3);
        assert_eq!(g.world.apples.count(), 0);
        assert_eq!(g.session.steps(), 2);
        assert_eq!(g.pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn falling_off_restarts_the_level() {
        let mut g = Game::new(&[
            ".S.",
            ".1.",
            "...",
            "...",
            "...",
        ]);
        let start = g.chain();

        let (outcome, events) = g.play(Direction::Down);
        assert_eq!(outcome, MoveOutcome::Accepted);
        assert_eq!(events, vec![
            GameEvent::StepCompleted,
            GameEvent::LevelLost,
            GameEvent::LevelRestarted,
        ]);
        assert_eq!(g.chain(), start);
        assert_eq!(g.world.previous, None);
        assert_eq!(g.session.steps(), 0);
        assert_eq!(g.pipeline.state(), PipelineState::Idle);
        assert_eq!(g.pipeline.frame(), &g.world.snapshot());
    }

    #[test]
    fn push_into_wall_is_rejected() {
        let mut g = Game::new(&[
            "1SB#",
            "####",
        ]);
        let before = g.world.snapshot();

        let (outcome, events) = g.play(Direction::Right);
        assert_eq!(outcome, MoveOutcome::Rejected(Rejection::PushIntoWall));
        assert!(events.is_empty());
        assert_eq!(g.world.snapshot(), before);
        assert_eq!(g.world.direction, Direction::Right);
    }

    #[test]
    fn push_moves_block_with_chain() {
        let mut g = Game::new(&[
            "1SB.",
            "####",
        ]);
        let (_, events) = g.play(Direction::Right);
        assert_eq!(events, vec![
            GameEvent::BlockPushed { from: Cell::new(2, 0), to: Cell::new(3, 0) },
            GameEvent::StepCompleted,
        ]);
        assert!(g.world.blocks.has_at(Cell::new(3, 0)));
    }

    #[test]
    fn block_on_eaten_apple_falls() {
        let mut g = Game::new(&[
            "...B..",
            "21So..",
            "......",
            "######",
        ]);

        let (_, events) = g.play(Direction::Right);
        // the chain drops off the apple before it is eaten
        assert_eq!(g.chain(), cells(&[(3, 2), (2, 2), (1, 2), (0, 2)]));
        assert!(events.contains(&GameEvent::ApplesRemaining(0)));
        // the block lost its apple and now rests on the head
        assert!(g.world.blocks.has_at(Cell::new(3, 1)));
        assert!(!g.world.blocks.has_at(Cell::new(3, 0)));
        assert_eq!(g.pipeline.frame().blocks, vec![Cell::new(3, 1)]);
    }

    #[test]
    fn pushed_block_falls_away() {
        let mut g = Game::new(&[
            "1SB.",
            "##..",
        ]);
        let (_, events) = g.play(Direction::Right);
        assert!(events.contains(&GameEvent::BlockFellAway { from: Cell::new(3, 1) }));
        assert_eq!(g.world.blocks.count(), 0);
    }

    #[test]
    fn growth_accounting() {
        let mut g = Game::new(&[
            "21Soo..",
            "#######",
        ]);
        let (_, first) = g.play(Direction::Right);
        let (_, second) = g.play(Direction::Right);
        assert!(first.contains(&GameEvent::ApplesRemaining(1)));
        assert!(second.contains(&GameEvent::ApplesRemaining(0)));
        assert_eq!(g.world.chain.len(), 5);
        assert_eq!(g.world.apples.count(), 0);

        g.play(Direction::Right);
        assert_eq!(g.world.chain.len(), 5);
    }

    #[test]
    fn portal_ignored_while_apples_remain() {
        let mut g = Game::new(&[
            "21SP.o",
            "######",
        ]);
        let (_, events) = g.play(Direction::Right);
        assert_eq!(g.world.chain.head(), Cell::new(3, 0));
        assert!(!events.iter().any(|e| matches!(e, GameEvent::LevelWon { .. })));
        assert_eq!(g.pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn win_on_portal_stops_everything() {
        let mut g = Game::new(&[
            "21SoP",
            "#####",
        ]);
        g.play(Direction::Right);
        g.session.tick(500);
        let (_, events) = g.play(Direction::Right);
        assert_eq!(events.last(), Some(&GameEvent::LevelWon { elapsed_ms: 500, steps: 2 }));
        assert_eq!(g.pipeline.state(), PipelineState::Won);
        assert!(!g.session.is_running());

        let before = g.world.snapshot();
        assert_eq!(g.pipeline.request_move(&mut g.world, Direction::Down), MoveOutcome::Ignored);
        assert_eq!(g.world.snapshot(), before);
    }

    #[test]
    fn gravity_can_deliver_the_win() {
        let mut g = Game::new(&[
            "21S.",
            "...P",
            "####",
        ]);
        let (_, events) = g.play(Direction::Right);
        assert_eq!(g.world.chain.head(), Cell::new(3, 1));
        assert!(matches!(events.last(), Some(GameEvent::LevelWon { steps: 1, .. })));
        assert_eq!(g.pipeline.state(), PipelineState::Won);
    }

    #[test]
    fn turning_onto_the_bottom_row_fails_the_bridge() {
        let mut g = Game::new(&[
            ".....",
            ".....",
            "..S12",
            "#.#..",
        ]);
        let (_, events) = g.play(Direction::Left);
        assert_eq!(events, vec![GameEvent::StepCompleted]);
        assert_eq!(g.world.previous, Some(Direction::Left));

        // any-support holds through (2,2), but the head hangs on the bottom row
        let (_, events) = g.play(Direction::Down);
        assert!(events.contains(&GameEvent::LevelLost));
        assert_eq!(g.chain(), cells(&[(2, 2), (3, 2), (4, 2)]));
    }

    #[test]
    fn first_move_skips_the_bridge() {
        let mut g = Game::new(&[
            "....",
            ".S..",
            "#12.",
        ]);
        // the tail ends up on the bottom row: a bridge pass would lose here
        let (_, events) = g.play(Direction::Left);
        assert_eq!(events, vec![GameEvent::StepCompleted]);
        assert_eq!(g.chain(), cells(&[(0, 1), (1, 1), (1, 2)]));
    }

    #[test]
    fn vertical_chain_bounces() {
        let mut g = Game::new(&[
            "...",
            ".S.",
            ".1.",
            "###",
        ]);
        let before = g.world.snapshot();
        let (outcome, events) = g.play(Direction::Up);
        assert_eq!(outcome, MoveOutcome::Bounced);
        assert_eq!(events, vec![GameEvent::Bounced]);
        assert_eq!(g.world.snapshot(), before);
        assert_eq!(g.session.steps(), 0);
    }

    #[test]
    fn input_is_dropped_while_resolving() {
        let mut g = Game::with_timing(&[
            "21S...",
            "######",
        ], TimingConfig::default());

        assert_eq!(g.pipeline.request_move(&mut g.world, Direction::Right), MoveOutcome::Accepted);
        assert_eq!(g.pipeline.state(), PipelineState::Resolving);
        assert_eq!(g.pipeline.request_move(&mut g.world, Direction::Right), MoveOutcome::Ignored);

        // half way: nothing released, old frame still shown
        let events = g.pipeline.advance(&mut g.world, &mut g.session, 70);
        assert!(events.is_empty());
        assert_eq!(g.pipeline.frame().chain[0], Cell::new(2, 0));

        let events = g.pipeline.advance(&mut g.world, &mut g.session, 70);
        assert_eq!(events, vec![GameEvent::StepCompleted]);
        assert_eq!(g.pipeline.state(), PipelineState::Idle);
        assert_eq!(g.world.chain.head(), Cell::new(3, 0));
        assert_eq!(g.session.elapsed_ms(), 140);
    }

    #[test]
    fn loss_flash_and_delay_run_together() {
        let mut g = Game::with_timing(&[
            "S1",
            "..",
        ], TimingConfig::default());
        g.pipeline.request_move(&mut g.world, Direction::Down);

        // slide (140), then flash (220) alongside the restart delay (250)
        let events = g.pipeline.advance(&mut g.world, &mut g.session, 140);
        assert_eq!(events, vec![GameEvent::StepCompleted, GameEvent::LevelLost]);
        assert!(g.pipeline.current_stage().map_or(false, |s| {
            s.has(MotionKind::LossFlash) && s.duration_ms() == 250
        }));

        let events = g.pipeline.advance(&mut g.world, &mut g.session, 249);
        assert!(events.is_empty());
        assert_eq!(g.pipeline.state(), PipelineState::Resolving);

        let events = g.pipeline.advance(&mut g.world, &mut g.session, 1);
        assert_eq!(events, vec![GameEvent::LevelRestarted]);
        assert_eq!(g.chain(), cells(&[(0, 0), (1, 0)]));
    }

    #[test]
    fn block_resting_on_chain_follows_it_down() {
        let mut g = Game::new(&[
            ".B....",
            "..S12.",
            "....#.",
            "......",
            "######",
        ]);

        // head steps under the block, then the chain drops two rows
        let (outcome, _) = g.play(Direction::Left);
        assert_eq!(outcome, MoveOutcome::Accepted);
        assert_eq!(g.chain(), cells(&[(1, 3), (2, 3), (3, 3)]));
        assert!(!g.world.blocks.has_at(Cell::new(1, 0)));
        assert!(g.world.blocks.has_at(Cell::new(1, 2)));
        assert_eq!(g.pipeline.state(), PipelineState::Idle);
        assert_eq!(g.pipeline.frame(), &g.world.snapshot());
    }

    #[test]
    fn reset_clears_playback() {
        let mut g = Game::with_timing(&["21S..", "#####"], TimingConfig::default());
        g.pipeline.request_move(&mut g.world, Direction::Right);
        g.world.restart();
        g.pipeline.reset(&g.world);
        assert_eq!(g.pipeline.state(), PipelineState::Idle);
        assert_eq!(g.pipeline.frame(), &g.world.snapshot());
    }

    proptest! {
        #[test]
        fn blocked_moves_change_nothing(
            cols in 1usize..7,
            rows in 1usize..7,
            walls in proptest::collection::vec(any::<bool>(), 49),
            hx in 0usize..7,
            hy in 0usize..7,
        ) {
            let (hx, hy) = (hx % cols, hy % rows);
            let map: Vec<String> = (0..rows).map(|y| {
                (0..cols).map(|x| {
                    if (x, y) == (hx, hy) { 'S' }
                    else if walls[y * 7 + x] { '#' }
                    else { '.' }
                }).collect()
            }).collect();
            let map: Vec<&str> = map.iter().map(|s| s.as_str()).collect();

            for dir in Direction::ALL {
                let mut g = Game::new(&map);
                let target = g.world.chain.head().step(dir);
                if g.world.move_view().in_bounds(target) && !g.world.is_wall(target) { continue; }

                let before = g.world.snapshot();
                let direction = g.world.direction;
                let (outcome, _) = g.play(dir);
                prop_assert!(matches!(outcome, MoveOutcome::Rejected(_) | MoveOutcome::Bounced));
                prop_assert_eq!(g.world.snapshot(), before);
                prop_assert_eq!(g.world.direction, direction);
            }
        }
    }
}
