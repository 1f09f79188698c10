//! Capability interface of the wrapped Atari emulator.
//!
//! Everything cycle-accurate (CPU, TIA, cartridge mapping) happens behind
//! this trait. The session adapter only needs the narrow surface below.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Game mode selector as enumerated by the emulator
pub type GameMode = u32;

/// Verbosity of the emulator's own logger. Process-wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoggerMode {
    Info,
    Warning,
    Error,
}

/// The 18 native Atari joystick actions, in emulator code order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NativeAction {
    Noop = 0,
    Fire = 1,
    Up = 2,
    Right = 3,
    Left = 4,
    Down = 5,
    UpRight = 6,
    UpLeft = 7,
    DownRight = 8,
    DownLeft = 9,
    UpFire = 10,
    RightFire = 11,
    LeftFire = 12,
    DownFire = 13,
    UpRightFire = 14,
    UpLeftFire = 15,
    DownRightFire = 16,
    DownLeftFire = 17,
}

impl NativeAction {
    /// Every action in code order; the full action space maps index n to code n
    pub const ALL: [NativeAction; 18] = [
        NativeAction::Noop,
        NativeAction::Fire,
        NativeAction::Up,
        NativeAction::Right,
        NativeAction::Left,
        NativeAction::Down,
        NativeAction::UpRight,
        NativeAction::UpLeft,
        NativeAction::DownRight,
        NativeAction::DownLeft,
        NativeAction::UpFire,
        NativeAction::RightFire,
        NativeAction::LeftFire,
        NativeAction::DownFire,
        NativeAction::UpRightFire,
        NativeAction::UpLeftFire,
        NativeAction::DownRightFire,
        NativeAction::DownLeftFire,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Horizontal and vertical joystick deflection, screen coordinates
    pub fn direction(self) -> (i32, i32) {
        use NativeAction::*;
        match self {
            Noop | Fire => (0, 0),
            Up | UpFire => (0, -1),
            Down | DownFire => (0, 1),
            Right | RightFire => (1, 0),
            Left | LeftFire => (-1, 0),
            UpRight | UpRightFire => (1, -1),
            UpLeft | UpLeftFire => (-1, -1),
            DownRight | DownRightFire => (1, 1),
            DownLeft | DownLeftFire => (-1, 1),
        }
    }

    pub fn fires(self) -> bool {
        use NativeAction::*;
        matches!(
            self,
            Fire | UpFire
                | RightFire
                | LeftFire
                | DownFire
                | UpRightFire
                | UpLeftFire
                | DownRightFire
                | DownLeftFire
        )
    }
}

/// Multi-player Atari emulator.
///
/// Slots are 0-indexed player positions. Vectors returned per slot (rewards,
/// lives) cover every slot the emulator knows about; slots not taking part in
/// the current mode report negative lives.
///
/// Fallible methods surface backend failures through
/// [`AleZooError::Emulator`](crate::AleZooError::Emulator) or
/// [`AleZooError::Io`](crate::AleZooError::Io); the adapter never retries.
pub trait Emulator {
    /// Opaque handle to a cloned emulator state
    type State;

    /// Set the process-wide logger verbosity of the backend
    fn set_logger_mode(mode: LoggerMode)
    where
        Self: Sized;

    /// Load cartridge data from `path`
    fn load_rom(&mut self, path: &Path) -> Result<()>;

    /// Select a game mode; takes effect on the next reset
    fn set_mode(&mut self, mode: GameMode) -> Result<()>;

    fn set_int(&mut self, key: &str, value: i32);

    fn set_float(&mut self, key: &str, value: f32);

    fn reset_game(&mut self);

    /// Modes supported for the given number of players
    fn available_modes(&self, num_players: usize) -> Vec<GameMode>;

    /// Number of players the current mode drives
    fn num_players_active(&self) -> usize;

    fn minimal_action_set(&self) -> Vec<NativeAction>;

    /// Screen dimensions as `(width, height)`
    fn screen_dims(&self) -> (usize, usize);

    /// Advance one tick with one action per slot, returning one reward per slot.
    ///
    /// Fails when the backend cannot run a frame, e.g. before a ROM is loaded.
    fn act(&mut self, actions: &[NativeAction]) -> Result<Vec<i32>>;

    fn game_over(&self) -> bool;

    fn all_lives(&self) -> Vec<i32>;

    fn ram(&self) -> Vec<u8>;

    /// Row-major `height * width * 3` pixels
    fn screen_rgb(&self) -> Vec<u8>;

    /// Row-major `height * width` luminance values
    fn screen_grayscale(&self) -> Vec<u8>;

    /// Clone emulator state without pseudorandom internals
    fn clone_state(&mut self) -> Self::State;

    /// Clone emulator state including pseudorandom internals
    fn clone_system_state(&mut self) -> Self::State;

    fn encode_state(&self, state: &Self::State) -> Result<Vec<u8>>;

    fn decode_state(&self, bytes: &[u8]) -> Result<Self::State>;

    fn restore_state(&mut self, state: &Self::State);

    fn restore_system_state(&mut self, state: &Self::State);

    /// Release a state handle
    fn delete_state(&mut self, state: Self::State);
}
