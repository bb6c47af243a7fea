/// Entry point and game loop.

mod config;
mod domain;
mod sim;
mod ui;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use env_logger::{Env, Target};
use log::{error, info};

use config::GameConfig;
use sim::event::GameEvent;
use sim::level::{load_pack, LevelPack};
use sim::progress::{self, Progress};
use sim::session::Session;
use sim::step::Pipeline;
use sim::world::WorldState;
use ui::input::{Command, InputState};
use ui::renderer::{Hud, Renderer};

fn main() -> anyhow::Result<()> {
    // stderr would draw over the alternate screen
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .target(Target::Pipe(log_sink(&progress::log_path())))
        .init();

    let config = GameConfig::load();
    let pack = load_pack(config.levels_path.as_deref());
    if pack.levels.is_empty() {
        bail!("level pack '{}' has no levels", pack.name);
    }
    info!("pack '{}' by '{}': {} levels", pack.name, pack.author, pack.levels.len());

    let progress_path = config.progress_file.clone().unwrap_or_else(progress::default_path);
    let progress = Progress::load_or_default(&progress_path);

    let mut renderer = Renderer::new();
    renderer.init().context("terminal init failed")?;

    let mut game = Game::new(&config, pack, progress, progress_path);
    let result = game_loop(&mut game, &mut renderer, &config);

    renderer.cleanup().context("terminal cleanup failed")?;
    result?;

    println!();
    println!("Thanks for playing Chain Drop!");
    println!("Levels completed: {}/{}", game.completed_count(), game.pack.levels.len());
    Ok(())
}

/// Log output goes to a file; without one it is discarded.
fn log_sink(path: &Path) -> Box<dyn Write + Send> {
    match File::create(path) {
        Ok(file) => Box::new(file),
        Err(_) => Box::new(io::sink()),
    }
}

// ══════════════════════════════════════════════════════════════
// Game: the level in play plus everything that spans levels
// ══════════════════════════════════════════════════════════════

struct Game {
    pack: LevelPack,
    current: usize,
    world: WorldState,
    pipeline: Pipeline,
    session: Session,
    progress: Progress,
    progress_path: PathBuf,
    player_name: String,
    /// Banner under the map; cleared by the next level switch or restart.
    message: Option<String>,
}

impl Game {
    fn new(config: &GameConfig, pack: LevelPack, progress: Progress, progress_path: PathBuf) -> Self {
        let world = WorldState::from_level(pack.levels[0].parse());
        let pipeline = Pipeline::new(config.timing, &world);
        Game {
            pack,
            current: 0,
            world,
            pipeline,
            session: Session::new(),
            progress,
            progress_path,
            player_name: config.player_name.clone(),
            message: None,
        }
    }

    /// Load level `index` fresh; wraps around the pack.
    fn load_level(&mut self, index: usize) {
        let total = self.pack.levels.len();
        self.current = index % total;
        let def = &self.pack.levels[self.current];
        info!("loading level '{}' ({}/{})", def.key, self.current + 1, total);
        self.world = WorldState::from_level(def.parse());
        self.pipeline.reset(&self.world);
        self.session.reset();
        self.message = None;
    }

    fn restart(&mut self) {
        self.world.restart();
        self.pipeline.reset(&self.world);
        self.session.reset();
        self.message = None;
    }

    fn apply(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Move(dir) => {
                self.pipeline.request_move(&mut self.world, dir);
            }
            Command::Restart => self.restart(),
            Command::NextLevel => self.load_level(self.current + 1),
            Command::PrevLevel => {
                let total = self.pack.levels.len();
                self.load_level(self.current + total - 1);
            }
            Command::Quit => return true,
        }
        false
    }

    fn on_events(&mut self, events: &[GameEvent]) {
        for event in events {
            if let GameEvent::LevelWon { elapsed_ms, steps } = *event {
                self.record_win(elapsed_ms, steps);
            }
        }
    }

    fn record_win(&mut self, elapsed_ms: u64, steps: u32) {
        let key = self.pack.levels[self.current].key.clone();
        let rank = self.progress.add_result(&key, &self.player_name, elapsed_ms, steps);
        if let Err(e) = self.progress.save(&self.progress_path) {
            error!("{}", e);
        }

        let placed = match rank {
            Some(r) => format!("  #{} on the board", r + 1),
            None => String::new(),
        };
        self.message = Some(format!(
            "Portal reached in {:.1}s, {} steps.{}  [N] next  [R] retry",
            elapsed_ms as f64 / 1000.0,
            steps,
            placed,
        ));
    }

    fn completed_count(&self) -> usize {
        self.pack.levels.iter().filter(|l| self.progress.is_completed(&l.key)).count()
    }

    fn hud(&self) -> Hud<'_> {
        let def = &self.pack.levels[self.current];
        Hud {
            pack: &self.pack.name,
            level: &def.name,
            index: self.current,
            total: self.pack.levels.len(),
            completed: self.progress.is_completed(&def.key),
            steps: self.session.steps(),
            elapsed_ms: self.session.elapsed_ms(),
            clock_running: self.session.is_running(),
            best_ms: self.progress.leaderboard(&def.key).first().map(|e| e.time_ms),
            message: self.message.as_deref(),
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Frame loop
// ══════════════════════════════════════════════════════════════

fn game_loop(game: &mut Game, renderer: &mut Renderer, config: &GameConfig) -> anyhow::Result<()> {
    let mut input = InputState::new();
    input.honor_release = renderer.reports_release();
    let frame = Duration::from_millis(config.timing.frame_ms);
    let mut last = Instant::now();

    loop {
        input.drain_events();
        let level_before = game.current;
        for cmd in input.commands() {
            if game.apply(cmd) {
                return Ok(());
            }
        }
        if game.current != level_before {
            renderer.invalidate();
        }

        let now = Instant::now();
        let dt_ms = now.duration_since(last).as_millis().min(u32::MAX as u128) as u32;
        last = now;
        let events = game.pipeline.advance(&mut game.world, &mut game.session, dt_ms);
        game.on_events(&events);

        renderer.render(&game.world, &game.pipeline, &game.hud())?;

        let spent = now.elapsed();
        if spent < frame {
            std::thread::sleep(frame - spent);
        }
    }
}
