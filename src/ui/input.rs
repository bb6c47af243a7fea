/// Keyboard adapter: terminal key events → game commands.
///
/// | Key              | Command            |
/// |------------------|--------------------|
/// | ←↑→↓ / WASD      | Move(direction)    |
/// | R                | Restart            |
/// | N / P            | Next / Prev level  |
/// | Q / Esc / Ctrl+C | Quit               |
///
/// One press, one command: holding a key never walks the chain. Terminals
/// with keyboard enhancement mark auto-repeat as Repeat and report
/// releases. Elsewhere auto-repeat arrives as plain presses, so a press of
/// a key already down counts as repeat, and a key counts as released after
/// `HOLD_TIMEOUT` without a Press.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, poll, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::domain::cell::Direction;

const HOLD_TIMEOUT: Duration = Duration::from_millis(160);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    Move(Direction),
    Restart,
    NextLevel,
    PrevLevel,
    Quit,
}

/// Fixed key map.
pub fn command_for(key: &KeyEvent) -> Option<Command> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(Command::Quit),
            _ => None,
        };
    }
    direction_for(key.code).map(Command::Move).or(match key.code {
        KeyCode::Char('r') | KeyCode::Char('R') => Some(Command::Restart),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(Command::NextLevel),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(Command::PrevLevel),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Command::Quit),
        _ => None,
    })
}

fn direction_for(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => Some(Direction::Up),
        KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => Some(Direction::Down),
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Some(Direction::Left),
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Some(Direction::Right),
        _ => None,
    }
}

pub struct InputState {
    /// Last Press per key that is down.
    held: HashMap<KeyCode, Instant>,
    /// Commands from keys that went down during the last drain, in order.
    fresh: Vec<Command>,
    /// Only true when the terminal is known to send Release events.
    pub honor_release: bool,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            held: HashMap::with_capacity(8),
            fresh: Vec::with_capacity(8),
            honor_release: false,
        }
    }

    /// Read every pending terminal event without blocking.
    /// Call once per frame, before the pipeline is advanced.
    pub fn drain_events(&mut self) {
        self.fresh.clear();
        while poll(Duration::ZERO).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                self.record(key, Instant::now());
            }
        }
        self.expire(Instant::now());
    }

    /// Commands from keys that went down during the last drain, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.fresh.clone()
    }

    // ── Internal ──

    fn record(&mut self, key: KeyEvent, now: Instant) {
        match key.kind {
            KeyEventKind::Release if self.honor_release => {
                self.held.remove(&key.code);
            }
            KeyEventKind::Release | KeyEventKind::Repeat => {}
            KeyEventKind::Press => {
                let was_held = self.is_held(key.code, now);
                self.held.insert(key.code, now);
                if !was_held {
                    if let Some(cmd) = command_for(&key) {
                        self.fresh.push(cmd);
                    }
                }
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        self.held.retain(|_, t| now.duration_since(*t) < HOLD_TIMEOUT);
    }

    fn is_held(&self, code: KeyCode, now: Instant) -> bool {
        self.held
            .get(&code)
            .map_or(false, |t| now.duration_since(*t) < HOLD_TIMEOUT)
    }
}
