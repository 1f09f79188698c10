//! Registered multi-player games.
//!
//! A game fixes the ROM, the mode used for each supported player count and
//! the versioned environment name. Everything else comes from the shared
//! session adapter.

use crate::config::AtariConfig;
use crate::emulator::{Emulator, GameMode};
use crate::env::wrappers::{base_env, BaseEnv};
use crate::env::ParallelAtariEnv;
use crate::{AleZooError, Result};

/// Static description of a registered game
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameEntry {
    pub name: &'static str,
    /// ROM basename looked up by the ROM search
    pub rom: &'static str,
    pub version: u32,
    pub default_players: usize,
    /// Mode to select for each supported player count
    pub player_modes: &'static [(usize, GameMode)],
    pub summary: &'static str,
}

/// Four player team battle on the Video Olympics cartridge.
///
/// `first_0` and `third_0` play against `second_0` and `fourth_0`.
pub const FOOZPONG: GameEntry = GameEntry {
    name: "foozpong",
    rom: "pong",
    version: 3,
    default_players: 4,
    player_modes: &[(2, 19), (4, 21)],
    summary: "Foozball-style pong where teammates pass the ball between paddle layers",
};

static GAMES: [GameEntry; 1] = [FOOZPONG];

impl GameEntry {
    /// Versioned name, e.g. `foozpong_v3`
    pub fn env_name(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }

    pub fn supported_players(&self) -> Vec<usize> {
        self.player_modes.iter().map(|(players, _)| *players).collect()
    }

    pub fn mode_for(&self, num_players: usize) -> Option<GameMode> {
        self.player_modes
            .iter()
            .find(|(players, _)| *players == num_players)
            .map(|(_, mode)| *mode)
    }

    /// Base configuration for `num_players` agents
    pub fn config(&self, num_players: usize) -> Result<AtariConfig> {
        let mode = self.mode_for(num_players).ok_or_else(|| {
            AleZooError::Configuration(format!(
                "{} only supports {:?} players, got {num_players}",
                self.name,
                self.supported_players()
            ))
        })?;
        Ok(AtariConfig::new(self.rom, num_players)
            .with_mode(mode)
            .with_env_name(self.env_name()))
    }
}

/// Every registered game
pub fn all() -> &'static [GameEntry] {
    &GAMES
}

/// Find a registered game by name, with or without its version suffix
pub fn lookup(name: &str) -> Result<&'static GameEntry> {
    GAMES
        .iter()
        .find(|game| game.name == name || game.env_name() == name)
        .ok_or_else(|| AleZooError::Configuration(format!("unknown game '{name}'")))
}

/// Parallel-API environment for `config`
pub fn parallel_env<E: Emulator>(ale: E, config: AtariConfig) -> Result<ParallelAtariEnv<E>> {
    ParallelAtariEnv::new(ale, config)
}

/// Agent-by-agent environment for `config`, with bounds and ordering checks
pub fn env<E: Emulator>(ale: E, config: AtariConfig) -> Result<BaseEnv<ParallelAtariEnv<E>>> {
    Ok(base_env(ParallelAtariEnv::new(ale, config)?))
}
