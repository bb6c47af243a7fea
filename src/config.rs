/// External configuration loader.
///
/// Reads `config.toml` from the executable's directory, the CWD or the user
/// data directory.
/// Falls back to sensible defaults if the file is missing or incomplete.
///
/// ```toml
/// [timing]
/// move_ms = 140
/// restart_delay_ms = 250
///
/// [general]
/// levels_path = "packs/classic.txt"
/// player_name = "ada"
/// ```

use log::warn;
use serde::Deserialize;
use std::path::PathBuf;

// ── Public Config Struct ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub timing: TimingConfig,
    /// Pack file or level directory. None searches `levels/` then
    /// falls back to the built-in levels.
    pub levels_path: Option<PathBuf>,
    /// Override for the progress file location.
    pub progress_file: Option<PathBuf>,
    pub player_name: String,
}

/// Animation durations in milliseconds. They pace playback only;
/// outcomes never depend on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingConfig {
    pub frame_ms: u64,
    pub move_ms: u32,
    pub fall_ms: u32,
    pub block_fall_ms: u32,
    pub bounce_ms: u32,
    pub win_flash_ms: u32,
    pub loss_flash_ms: u32,
    pub restart_delay_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TomlTiming::default().into()
    }
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    timing: TomlTiming,
    #[serde(default)]
    general: TomlGeneral,
}

#[derive(Deserialize, Debug)]
struct TomlTiming {
    #[serde(default = "default_frame")]
    frame_ms: u64,
    #[serde(default = "default_move")]
    move_ms: u32,
    #[serde(default = "default_fall")]
    fall_ms: u32,
    #[serde(default = "default_block_fall")]
    block_fall_ms: u32,
    #[serde(default = "default_bounce")]
    bounce_ms: u32,
    #[serde(default = "default_win_flash")]
    win_flash_ms: u32,
    #[serde(default = "default_loss_flash")]
    loss_flash_ms: u32,
    #[serde(default = "default_restart_delay")]
    restart_delay_ms: u32,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default)]
    levels_path: Option<String>,
    #[serde(default)]
    progress_file: Option<String>,
    #[serde(default = "default_player_name")]
    player_name: String,
}

// ── Defaults ──

fn default_frame() -> u64 { 16 }
fn default_move() -> u32 { 140 }
fn default_fall() -> u32 { 100 }
fn default_block_fall() -> u32 { 100 }
fn default_bounce() -> u32 { 84 }         // max(80, 0.6 * move)
fn default_win_flash() -> u32 { 200 }
fn default_loss_flash() -> u32 { 220 }
fn default_restart_delay() -> u32 { 250 }
fn default_player_name() -> String { "Player".into() }

impl Default for TomlTiming {
    fn default() -> Self {
        TomlTiming {
            frame_ms: default_frame(),
            move_ms: default_move(),
            fall_ms: default_fall(),
            block_fall_ms: default_block_fall(),
            bounce_ms: default_bounce(),
            win_flash_ms: default_win_flash(),
            loss_flash_ms: default_loss_flash(),
            restart_delay_ms: default_restart_delay(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            levels_path: None,
            progress_file: None,
            player_name: default_player_name(),
        }
    }
}

impl From<TomlTiming> for TimingConfig {
    fn from(t: TomlTiming) -> Self {
        TimingConfig {
            frame_ms: t.frame_ms.max(1),
            move_ms: t.move_ms,
            fall_ms: t.fall_ms,
            block_fall_ms: t.block_fall_ms,
            bounce_ms: t.bounce_ms,
            win_flash_ms: t.win_flash_ms,
            loss_flash_ms: t.loss_flash_ms,
            restart_delay_ms: t.restart_delay_ms,
        }
    }
}

// ── Loading ──

impl GameConfig {
    /// Load config from `config.toml`.
    /// Search order: (1) exe directory, (2) current working directory,
    /// (3) user data directory.
    /// Missing file or missing keys gracefully fall back to defaults.
    pub fn load() -> Self {
        let search_dirs = candidate_dirs();
        let toml_cfg = load_toml(&search_dirs);
        GameConfig::from_toml(toml_cfg, &search_dirs)
    }

    fn from_toml(toml_cfg: TomlConfig, search_dirs: &[PathBuf]) -> Self {
        // Relative level paths are searched like config.toml itself
        let levels_path = toml_cfg.general.levels_path.map(|p| {
            let path = PathBuf::from(&p);
            if path.is_absolute() {
                path
            } else {
                search_dirs.iter()
                    .map(|d| d.join(&p))
                    .find(|c| c.exists())
                    .unwrap_or(path)
            }
        });

        GameConfig {
            timing: toml_cfg.timing.into(),
            levels_path,
            progress_file: toml_cfg.general.progress_file.map(PathBuf::from),
            player_name: toml_cfg.general.player_name,
        }
    }
}

/// Candidate directories to search: exe dir + CWD + user data (deduplicated).
pub fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    // 1. Directory of the running executable
    if let Ok(exe) = std::env::current_exe() {
        // Resolve symlinks so data next to the real binary is found.
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    // 2. Current working directory
    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    // 3. XDG data home (~/.local/share/chain-drop)
    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/chain-drop");
        if xdg.is_dir() && !dirs.iter().any(|d| d == &xdg) {
            dirs.push(xdg);
        }
    }

    // 4. Fallback
    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }

    dirs
}

/// Search for config.toml in candidate directories.
fn load_toml(search_dirs: &[PathBuf]) -> TomlConfig {
    for dir in search_dirs {
        let path = dir.join("config.toml");
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(text) => return parse_toml(&text),
                Err(e) => warn!("could not read {}: {e}", path.display()),
            }
        }
    }
    TomlConfig::default()
}

fn parse_toml(text: &str) -> TomlConfig {
    match toml::from_str::<TomlConfig>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config.toml parse error: {e}; using default settings");
            TomlConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = GameConfig::from_toml(parse_toml(""), &[]);
        assert_eq!(cfg.timing, TimingConfig::default());
        assert_eq!(cfg.timing.move_ms, 140);
        assert_eq!(cfg.timing.bounce_ms, 84);
        assert_eq!(cfg.timing.restart_delay_ms, 250);
        assert_eq!(cfg.levels_path, None);
        assert_eq!(cfg.player_name, "Player");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg = GameConfig::from_toml(parse_toml("[timing]\nmove_ms = 60\n"), &[]);
        assert_eq!(cfg.timing.move_ms, 60);
        assert_eq!(cfg.timing.fall_ms, 100);
    }

    #[test]
    fn broken_file_falls_back() {
        let cfg = GameConfig::from_toml(parse_toml("[timing\nmove_ms = "), &[]);
        assert_eq!(cfg.timing, TimingConfig::default());
    }

    #[test]
    fn zero_frame_is_clamped() {
        let cfg = GameConfig::from_toml(parse_toml("[timing]\nframe_ms = 0\n"), &[]);
        assert_eq!(cfg.timing.frame_ms, 1);
    }

    #[test]
    fn general_section() {
        let cfg = GameConfig::from_toml(
            parse_toml("[general]\nlevels_path = \"/abs/pack.txt\"\nprogress_file = \"p.toml\"\n"),
            &[],
        );
        assert_eq!(cfg.levels_path, Some(PathBuf::from("/abs/pack.txt")));
        assert_eq!(cfg.progress_file, Some(PathBuf::from("p.toml")));
    }
}
