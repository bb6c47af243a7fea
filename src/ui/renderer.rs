/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Compose the next screen into the `front` buffer
///   2. Compare each screen cell with `back` (previous screen)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// Static terrain (walls, portal) comes from the world; everything that
/// moves comes from the pipeline's published frame, so the screen never
/// runs ahead of the animation timeline. Halfway through a stage the
/// stage's own frame is shown, which gives each step a visible slide.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use crate::domain::cell::Cell;
use crate::domain::glyph::Glyph;
use crate::sim::anim::{Frame, MotionKind, Stage};
use crate::sim::step::{Pipeline, PipelineState};
use crate::sim::world::WorldState;

// ── ScreenCell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq)]
struct ScreenCell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl ScreenCell {
    /// Explicit background for every empty cell. Using the same RGB for
    /// `Clear` and cell backgrounds avoids gap lines on VTE terminals.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };

    const BLANK: ScreenCell = ScreenCell { ch: ' ', fg: Color::White, bg: ScreenCell::BASE_BG };

    /// Never equal to a real cell, so every position gets repainted.
    const INVALID: ScreenCell = ScreenCell { ch: '?', fg: Color::Magenta, bg: Color::Magenta };

    fn new(ch: char, fg: Color, bg: Color) -> Self {
        let bg = match bg {
            Color::Reset => Self::BASE_BG,
            other => other,
        };
        ScreenCell { ch, fg, bg }
    }
}

// ── FrameBuffer: a 2D grid of ScreenCells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<ScreenCell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer { width: w, height: h, cells: vec![ScreenCell::BLANK; w * h] }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![ScreenCell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(ScreenCell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: ScreenCell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> ScreenCell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            ScreenCell::BLANK
        }
    }

    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (i, ch) in s.chars().enumerate() {
            if x + i >= self.width { break; }
            self.set(x + i, y, ScreenCell::new(ch, fg, bg));
        }
    }

    fn fill_row(&mut self, y: usize, bg: Color) {
        for x in 0..self.width {
            self.set(x, y, ScreenCell::new(' ', Color::White, bg));
        }
    }
}

// ── HUD data supplied by the game loop ──

pub struct Hud<'a> {
    pub pack: &'a str,
    pub level: &'a str,
    /// 0-based position in the pack.
    pub index: usize,
    pub total: usize,
    pub completed: bool,
    pub steps: u32,
    pub elapsed_ms: u64,
    /// False once the level is won; the time shown is final.
    pub clock_running: bool,
    /// Fastest recorded time for this level.
    pub best_ms: Option<u64>,
    /// Banner under the map (win summary, notices).
    pub message: Option<&'a str>,
}

// ── Renderer ──

/// Each game cell is two terminal columns wide.
const CELL_W: usize = 2;
const MAP_COL: usize = 1;

const HUD_ROW: usize = 0;
const MAP_ROW: usize = 2;

const HUD_BG: Color = Color::Rgb { r: 20, g: 20, b: 60 };
const MSG_BG: Color = Color::Rgb { r: 200, g: 180, b: 50 };

/// Visual effects for the stage currently playing.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
struct Effects {
    bounce: bool,
    /// Loss flash, on-phase of the blink.
    loss: bool,
    /// Win flash, on-phase of the blink.
    win: bool,
}

impl Effects {
    fn of(stage: Option<&Stage>) -> Self {
        let Some(stage) = stage else { return Effects::default() };
        // Two blinks per flash stage.
        let blink_on = ((stage.progress() * 4.0) as u32) % 2 == 0;
        Effects {
            bounce: stage.has(MotionKind::Bounce),
            loss: stage.has(MotionKind::LossFlash) && blink_on,
            win: stage.has(MotionKind::WinFlash) && blink_on,
        }
    }
}

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
    /// Key release events requested from the terminal.
    keyboard_enhanced: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
            keyboard_enhanced: false,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            SetBackgroundColor(ScreenCell::BASE_BG),
            Clear(ClearType::All)
        )?;
        if terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                self.writer,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
            self.keyboard_enhanced = true;
        }
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.resize(tw as usize, th as usize);
        Ok(())
    }

    /// True when the terminal reports key releases.
    pub fn reports_release(&self) -> bool {
        self.keyboard_enhanced
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        if self.keyboard_enhanced {
            execute!(self.writer, PopKeyboardEnhancementFlags)?;
            self.keyboard_enhanced = false;
        }
        execute!(self.writer, ResetColor, cursor::Show, terminal::LeaveAlternateScreen)?;
        terminal::disable_raw_mode()
    }

    /// Force a full repaint on the next frame (level switch).
    pub fn invalidate(&mut self) {
        self.back.cells.fill(ScreenCell::INVALID);
    }

    pub fn render(&mut self, world: &WorldState, pipeline: &Pipeline, hud: &Hud) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.resize(tw as usize, th as usize);
            queue!(self.writer, SetBackgroundColor(ScreenCell::BASE_BG), Clear(ClearType::All))?;
        }

        self.compose(world, pipeline, hud);
        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    fn resize(&mut self, w: usize, h: usize) {
        self.term_w = w;
        self.term_h = h;
        self.front.resize(w, h);
        self.back.resize(w, h);
        self.invalidate();
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = ScreenCell::BASE_BG;
        let mut cursor_at: Option<(usize, usize)> = None;

        // Explicit base colors; ResetColor would fall back to the terminal's
        // own default and leave line artifacts.
        queue!(self.writer, SetForegroundColor(last_fg), SetBackgroundColor(last_bg))?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) {
                    continue;
                }
                if cursor_at != Some((x, y)) {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                queue!(self.writer, Print(cell.ch))?;
                cursor_at = Some((x + 1, y));
            }
        }

        self.writer.flush()
    }

    // ── Compose: build front buffer content ──

    fn compose(&mut self, w: &WorldState, pipeline: &Pipeline, hud: &Hud) {
        self.front.clear();

        let stage = pipeline.current_stage();
        let effects = Effects::of(stage);
        let frame = visible_frame(pipeline.frame(), stage);

        self.compose_hud(hud, frame);

        for gy in 0..w.rows {
            let row = MAP_ROW + gy;
            if row >= self.front.height { break; }
            for gx in 0..w.cols {
                let col = MAP_COL + gx * CELL_W;
                if col + 1 >= self.front.width { break; }
                let cell = Cell::new(gx as i32, gy as i32);
                self.compose_cell(glyph_at(w, frame, cell), frame, effects, col, row);
            }
        }

        let msg_row = MAP_ROW + w.rows + 1;
        let banner = match pipeline.state() {
            PipelineState::Won => hud.message,
            _ if effects.loss => Some("Fell off the map!"),
            _ => hud.message,
        };
        if let Some(msg) = banner {
            if msg_row < self.front.height {
                self.front.fill_row(msg_row, MSG_BG);
                self.front.put_str(0, msg_row, &format!(" ◈ {} ", msg), Color::Black, MSG_BG);
            }
        }

        let help_row = msg_row + 2;
        if help_row < self.front.height {
            self.front.put_str(0, help_row, &help_line(), Color::DarkGrey, Color::Reset);
        }
    }

    fn compose_hud(&mut self, hud: &Hud, frame: &Frame) {
        let done = if hud.completed { "✓" } else { " " };
        let portal = if frame.portal_active { "PORTAL OPEN" } else { "" };
        let clock = if hud.clock_running { "Time " } else { "Final" };
        let best = match hud.best_ms {
            Some(ms) => format!("Best {:.1}s", ms as f64 / 1000.0),
            None => String::new(),
        };
        let line = format!(
            " {} {}/{} {}{}  {} {:>5.1}s  Steps {:<4}  Apples {:<3} {}  {} ",
            hud.pack,
            hud.index + 1,
            hud.total,
            hud.level,
            done,
            clock,
            hud.elapsed_ms as f64 / 1000.0,
            hud.steps,
            frame.apples.len(),
            best,
            portal,
        );
        self.front.fill_row(HUD_ROW, HUD_BG);
        self.front.put_str(0, HUD_ROW, &line, Color::White, HUD_BG);
    }

    /// Write game cell visuals at (col, row); two terminal columns.
    fn compose_cell(&mut self, glyph: Glyph, frame: &Frame, fx: Effects, col: usize, row: usize) {
        let (c0, c1, fg, bg) = match glyph {
            Glyph::Empty => (' ', ' ', Color::Reset, Color::Reset),
            Glyph::Wall => ('█', '█', Color::Rgb { r: 120, g: 120, b: 120 }, Color::Rgb { r: 70, g: 70, b: 70 }),
            Glyph::Apple => ('●', ' ', Color::Rgb { r: 230, g: 60, b: 60 }, Color::Reset),
            Glyph::PushBlock => ('▓', '▓', Color::Rgb { r: 180, g: 120, b: 60 }, Color::Rgb { r: 100, g: 65, b: 30 }),
            Glyph::Portal if fx.win => ('◎', ' ', Color::White, Color::Rgb { r: 120, g: 40, b: 160 }),
            Glyph::Portal if frame.portal_active => ('◎', ' ', Color::Rgb { r: 220, g: 90, b: 255 }, Color::Reset),
            Glyph::Portal => ('○', ' ', Color::DarkGrey, Color::Reset),
            Glyph::Start => {
                let fg = if fx.loss {
                    Color::Rgb { r: 255, g: 60, b: 60 }
                } else if fx.bounce {
                    Color::Rgb { r: 255, g: 220, b: 50 }
                } else if fx.win {
                    Color::White
                } else {
                    Color::Rgb { r: 80, g: 255, b: 80 }
                };
                ('◉', ' ', fg, Color::Reset)
            }
            Glyph::Follower(_) => {
                let fg = if fx.loss { Color::Rgb { r: 200, g: 40, b: 40 } } else { Color::Rgb { r: 40, g: 180, b: 60 } };
                ('■', ' ', fg, Color::Reset)
            }
        };
        self.front.set(col, row, ScreenCell::new(c0, fg, bg));
        self.front.set(col + 1, row, ScreenCell::new(c1, fg, bg));
    }
}

/// The frame to draw: the stage's own frame once it is half done.
fn visible_frame<'a>(shown: &'a Frame, stage: Option<&'a Stage>) -> &'a Frame {
    match stage {
        Some(s) if s.progress() >= 0.5 => s.frame.as_ref().unwrap_or(shown),
        _ => shown,
    }
}

/// What occupies `cell`. Chain over everything, then blocks, apples,
/// portal and walls. Followers are numbered 1..9 and then stay at 9.
fn glyph_at(w: &WorldState, frame: &Frame, cell: Cell) -> Glyph {
    if let Some(i) = frame.chain.iter().position(|&c| c == cell) {
        return if i == 0 { Glyph::Start } else { Glyph::Follower(i.min(9) as u8) };
    }
    if frame.blocks.contains(&cell) {
        Glyph::PushBlock
    } else if frame.apples.contains(&cell) {
        Glyph::Apple
    } else if w.portal == Some(cell) {
        Glyph::Portal
    } else if w.is_wall(cell) {
        Glyph::Wall
    } else {
        Glyph::Empty
    }
}

fn help_line() -> String {
    format!(
        " ←↑→↓/WASD move  R restart  N/P level  Q quit  │  {} wall  {} apple  {} block  {} portal",
        Glyph::Wall.to_char(),
        Glyph::Apple.to_char(),
        Glyph::PushBlock.to_char(),
        Glyph::Portal.to_char(),
    )
}
