/// Level parser and loader with pack support.
///
/// ## Sources (priority order):
///   1. Configured `levels_path`: a pack file, or a directory of `.txt` files
///   2. `levels/` directory next to the executable or in the CWD
///   3. Built-in embedded levels
///
/// ## Pack format:
///   ```
///   ;; Pack Name
///   ;; Author: name
///   ---
///   ; key: first-steps
///   ; name: First Steps
///   <map rows>
///   ---
///   ; name: Second
///   <map rows>
///   ```
///
/// Levels are separated by a line containing only `---`.
/// Pack metadata lines (before the first `---`) start with `;;`.
/// Level metadata lines start with `;`. Every other line is a map row.
///
/// ## Single-level format (`.txt`):
///   Same as one pack section. The key defaults to the file stem.
///
/// ## Map legend:
///   '#' = Wall          'o' = Apple         'B' = Push-block
///   'P' = Portal        'S' = Chain head    '1'..'9' = Followers
///   anything else = Empty

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::config::candidate_dirs;
use crate::domain::cell::Cell;
use crate::domain::glyph::Glyph;

/// Chain used when a map has no start marker: horizontal, facing right.
pub const FALLBACK_CHAIN: [Cell; 3] = [Cell::new(2, 1), Cell::new(1, 1), Cell::new(0, 1)];

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} contains no levels")]
    Empty(PathBuf),
}

/// Typed entity sets of one map. Pure data, identical for identical input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedLevel {
    pub rows: usize,
    pub cols: usize,
    pub walls: BTreeSet<Cell>,
    pub apples: BTreeSet<Cell>,
    pub push_blocks: BTreeSet<Cell>,
    pub portal: Option<Cell>,
    /// Head first. None when the map has no `S`.
    pub chain: Option<Vec<Cell>>,
}

/// Runtime level data (owned strings, loaded from file or embedded).
#[derive(Clone, Debug)]
pub struct LevelDef {
    /// Stable identity, used for progress tracking.
    pub key: String,
    pub name: String,
    pub rows: Vec<String>,
}

impl LevelDef {
    pub fn parse(&self) -> ParsedLevel {
        parse_level(&self.rows)
    }
}

#[derive(Clone, Debug)]
pub struct LevelPack {
    pub name: String,
    pub author: String,
    pub levels: Vec<LevelDef>,
}

// ══════════════════════════════════════════════════════════════
// Map parsing
// ══════════════════════════════════════════════════════════════

/// Parse map rows into entity sets.
///
/// `cols` is the widest row; shorter rows read as padded with empty cells.
/// Followers are ordered by digit; equal digits keep reading order.
pub fn parse_level<S: AsRef<str>>(map: &[S]) -> ParsedLevel {
    let rows = map.len();
    let widths: Vec<usize> = map.iter().map(|r| r.as_ref().chars().count()).collect();
    let cols = widths.iter().copied().max().unwrap_or(0);
    if widths.iter().any(|&w| w != cols) {
        warn!("ragged map: row widths {:?}, padding to {}", widths, cols);
    }

    let mut level = ParsedLevel { rows, cols, ..ParsedLevel::default() };
    let mut start = None;
    let mut followers: Vec<(u8, Cell)> = vec![];

    for (y, row) in map.iter().enumerate() {
        for (x, ch) in row.as_ref().chars().enumerate() {
            let c = Cell::new(x as i32, y as i32);
            match Glyph::from_char(ch) {
                Glyph::Wall => { level.walls.insert(c); }
                Glyph::Apple => { level.apples.insert(c); }
                Glyph::PushBlock => { level.push_blocks.insert(c); }
                Glyph::Portal => level.portal = Some(c),
                Glyph::Start => start = Some(c),
                Glyph::Follower(n) => followers.push((n, c)),
                Glyph::Empty => {}
            }
        }
    }

    if let Some(head) = start {
        followers.sort_by_key(|&(n, _)| n);
        let mut chain = vec![head];
        chain.extend(followers.into_iter().map(|(_, c)| c));
        level.chain = Some(chain);
    }

    level
}

// ══════════════════════════════════════════════════════════════
// Public loading API
// ══════════════════════════════════════════════════════════════

/// Load the level pack. Never fails: problems are logged and the
/// next source is tried, down to the embedded levels.
pub fn load_pack(levels_path: Option<&Path>) -> LevelPack {
    if let Some(path) = levels_path {
        match read_source(path) {
            Ok(pack) => return pack,
            Err(e) => warn!("{}; falling back", e),
        }
    }

    for base in candidate_dirs() {
        let dir = base.join("levels");
        if !dir.is_dir() { continue; }
        match read_directory(&dir) {
            Ok(pack) => return pack,
            Err(e) => debug!("{}", e),
        }
    }

    embedded_pack()
}

/// Read a pack file or a directory of level files.
pub fn read_source(path: &Path) -> Result<LevelPack, LevelError> {
    if path.is_dir() {
        return read_directory(path);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|source| LevelError::Io { path: path.to_path_buf(), source })?;
    let mut pack = parse_pack(&content);
    if pack.levels.is_empty() {
        return Err(LevelError::Empty(path.to_path_buf()));
    }
    if pack.name.is_empty() {
        pack.name = file_stem(path);
    }
    Ok(pack)
}

// ══════════════════════════════════════════════════════════════
// Pack parsing
// ══════════════════════════════════════════════════════════════

/// Parse all levels from pack text.
pub fn parse_pack(content: &str) -> LevelPack {
    let mut pack = LevelPack { name: String::new(), author: String::new(), levels: vec![] };
    let mut section = String::new();
    let mut in_levels = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed == "---" {
            if in_levels {
                flush_section(&mut pack.levels, &section);
            }
            section.clear();
            in_levels = true;
            continue;
        }

        if !in_levels {
            if let Some(meta) = trimmed.strip_prefix(";;") {
                let meta = meta.trim();
                if let Some(author) = meta.strip_prefix("Author:") {
                    pack.author = author.trim().to_string();
                } else if pack.name.is_empty() {
                    pack.name = meta.to_string();
                }
            }
            continue;
        }

        section.push_str(line);
        section.push('\n');
    }

    if in_levels {
        flush_section(&mut pack.levels, &section);
    } else {
        // No separators: the whole file is a single level.
        let body: String = content
            .lines()
            .filter(|l| !l.trim_start().starts_with(";;"))
            .map(|l| format!("{}\n", l))
            .collect();
        flush_section(&mut pack.levels, &body);
    }

    pack
}

fn flush_section(levels: &mut Vec<LevelDef>, section: &str) {
    let default_key = format!("level_{}", levels.len() + 1);
    if let Some(def) = parse_level_text(section, default_key) {
        levels.push(def);
    }
}

/// Parse one level: `;` metadata lines plus map rows.
fn parse_level_text(content: &str, default_key: String) -> Option<LevelDef> {
    let mut key = None;
    let mut name = None;
    let mut rows: Vec<String> = vec![];

    for line in content.lines() {
        if let Some(meta) = line.trim_start().strip_prefix(';') {
            let meta = meta.trim();
            if let Some(v) = meta.strip_prefix("key:") {
                key = Some(v.trim().to_string());
            } else if let Some(v) = meta.strip_prefix("name:") {
                name = Some(v.trim().to_string());
            }
            continue;
        }
        rows.push(line.trim_end_matches('\r').to_string());
    }

    while rows.first().map_or(false, |r| r.trim().is_empty()) {
        rows.remove(0);
    }
    while rows.last().map_or(false, |r| r.trim().is_empty()) {
        rows.pop();
    }
    if rows.is_empty() {
        return None;
    }

    let key = key.filter(|k| !k.is_empty()).unwrap_or(default_key);
    let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| key.clone());
    Some(LevelDef { key, name, rows })
}

// ══════════════════════════════════════════════════════════════
// Directory loading (individual .txt files)
// ══════════════════════════════════════════════════════════════

fn read_directory(dir: &Path) -> Result<LevelPack, LevelError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|source| LevelError::Io { path: dir.to_path_buf(), source })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |e| e == "txt"))
        .collect();
    files.sort();

    let mut levels = vec![];
    for path in files {
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                if let Some(def) = parse_level_text(&content, file_stem(&path)) {
                    levels.push(def);
                }
            }
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }

    if levels.is_empty() {
        return Err(LevelError::Empty(dir.to_path_buf()));
    }
    Ok(LevelPack { name: file_stem(dir), author: String::new(), levels })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

// ══════════════════════════════════════════════════════════════
// Embedded fallback levels
// ══════════════════════════════════════════════════════════════

pub fn embedded_pack() -> LevelPack {
    LevelPack {
        name: "Built-in Levels".to_string(),
        author: "Chain Drop".to_string(),
        levels: vec![
            make_embedded("first-bite", "First Bite", &[
                "............",
                "............",
                "......o.....",
                "......#.....",
                "..21S.....P.",
                "############",
            ]),
            make_embedded("fill-the-gap", "Fill the Gap", &[
                "..............",
                "..............",
                "..21S..B...P..",
                "##########.###",
                "##############",
            ]),
            make_embedded("pillar", "Pillar", &[
                "................",
                ".......o........",
                ".......#........",
                "...............P",
                ".21S...#........",
                "################",
            ]),
            make_embedded("drop-zone", "Drop Zone", &[
                "..............",
                ".21S.....o....",
                "#####..######.",
                "..........#..P",
                "..........####",
            ]),
        ],
    }
}

fn make_embedded(key: &str, name: &str, map: &[&str]) -> LevelDef {
    LevelDef {
        key: key.to_string(),
        name: name.to_string(),
        rows: map.iter().map(|s| s.to_string()).collect(),
    }
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
