//! Per-ROM behaviour of the mock emulator.

use ale_zoo::emulator::{GameMode, NativeAction};

/// Slots the mock console exposes, whatever the mode
pub const MAX_SLOTS: usize = 4;

/// What a loaded ROM looks like to `MockAle`
#[derive(Clone, Debug, PartialEq)]
pub struct GameProfile {
    /// ROM file stem this profile answers to
    pub name: String,
    /// Mode -> number of players it drives, in enumeration order
    pub modes: Vec<(GameMode, usize)>,
    pub minimal_actions: Vec<NativeAction>,
    pub width: usize,
    pub height: usize,
    /// Lives each active player starts with
    pub lives: i32,
    /// Frame at which the game ends on its own
    pub game_length: Option<u64>,
    /// `(slot, frame)`: the slot is eliminated once `frame` is reached
    pub eliminations: Vec<(usize, u64)>,
}

impl GameProfile {
    /// Video Olympics, the cartridge behind the pong family
    pub fn pong() -> Self {
        Self {
            name: "pong".into(),
            modes: vec![(1, 2), (2, 2), (19, 2), (20, 2), (21, 4), (22, 4)],
            minimal_actions: vec![
                NativeAction::Noop,
                NativeAction::Fire,
                NativeAction::Up,
                NativeAction::Right,
                NativeAction::Left,
                NativeAction::Down,
            ],
            width: 160,
            height: 210,
            lives: 0,
            game_length: None,
            eliminations: Vec::new(),
        }
    }

    /// Single-player fallback for ROMs without a dedicated profile
    pub fn generic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modes: vec![(0, 1)],
            minimal_actions: NativeAction::ALL.to_vec(),
            width: 160,
            height: 210,
            lives: 3,
            game_length: None,
            eliminations: Vec::new(),
        }
    }

    pub fn with_modes(mut self, modes: Vec<(GameMode, usize)>) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_lives(mut self, lives: i32) -> Self {
        self.lives = lives;
        self
    }

    pub fn with_game_length(mut self, frames: u64) -> Self {
        self.game_length = Some(frames);
        self
    }

    pub fn with_elimination(mut self, slot: usize, frame: u64) -> Self {
        self.eliminations.push((slot, frame));
        self
    }

    pub fn available_modes(&self, num_players: usize) -> Vec<GameMode> {
        self.modes
            .iter()
            .filter(|(_, players)| *players == num_players)
            .map(|(mode, _)| *mode)
            .collect()
    }

    pub fn players_for(&self, mode: GameMode) -> Option<usize> {
        self.modes
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, players)| *players)
    }

    /// Mode the console boots into after a ROM load
    pub fn default_mode(&self) -> Option<(GameMode, usize)> {
        self.modes.first().copied()
    }
}
