//! Deterministic stand-in for the Arcade Learning Environment.
//!
//! `MockAle` plays a small paddle-and-ball game on a 160x210 screen. Each
//! player slot owns a paddle, slots alternate between the left and right
//! team, and a point scored against a team is +1 for the scorers and -1 for
//! the conceding side. Everything random (serves, sticky actions) is drawn
//! from one `ChaCha8Rng` reseeded from `random_seed` on every ROM load.

use crate::profile::{GameProfile, MAX_SLOTS};
use ale_zoo::emulator::{Emulator, GameMode, LoggerMode, NativeAction};
use ale_zoo::{AleZooError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

const RAM_BYTES: usize = 128;
const PADDLE_WIDTH: i32 = 4;
const PADDLE_HEIGHT: i32 = 16;
const PADDLE_SPEED: i32 = 3;
const BALL_SIZE: i32 = 2;
const BALL_SPEED: i32 = 2;
const PADDLE_COLUMNS: [i32; MAX_SLOTS] = [16, 140, 48, 108];
const SERVE_SLOPES: [i32; 4] = [-2, -1, 1, 2];

const BACKGROUND: [u8; 3] = [144, 72, 17];
const BALL_COLOUR: [u8; 3] = [236, 236, 236];
const SLOT_COLOURS: [[u8; 3]; MAX_SLOTS] = [
    [92, 186, 92],
    [213, 130, 74],
    [84, 92, 214],
    [200, 72, 72],
];

static LOGGER_MODE: AtomicU8 = AtomicU8::new(0);

/// Logger verbosity last set through [`Emulator::set_logger_mode`]
pub fn logger_mode() -> LoggerMode {
    match LOGGER_MODE.load(Ordering::Relaxed) {
        1 => LoggerMode::Warning,
        2 => LoggerMode::Error,
        _ => LoggerMode::Info,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("no ROM loaded")]
    NoRom,

    #[error("ROM file {0:?} is empty")]
    EmptyRom(PathBuf),

    #[error("mode {mode} is not supported by {rom}")]
    UnsupportedMode { mode: GameMode, rom: String },

    #[error("malformed state: {0}")]
    State(#[from] serde_json::Error),
}

/// Everything that changes while a game runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Machine {
    frame: u64,
    paddles: Vec<(i32, i32)>,
    ball: (i32, i32),
    velocity: (i32, i32),
    lives: Vec<i32>,
    scores: Vec<i32>,
    last_actions: Vec<NativeAction>,
}

impl Machine {
    fn idle() -> Self {
        Self {
            frame: 0,
            paddles: Vec::new(),
            ball: (0, 0),
            velocity: (0, 0),
            lives: vec![-1; MAX_SLOTS],
            scores: vec![0; MAX_SLOTS],
            last_actions: vec![NativeAction::Noop; MAX_SLOTS],
        }
    }

    fn boot(profile: &GameProfile, players: usize, rng: &mut ChaCha8Rng) -> Self {
        let top = (profile.height as i32 - PADDLE_HEIGHT) / 2;
        let mut machine = Self {
            paddles: PADDLE_COLUMNS.iter().map(|&x| (x, top)).collect(),
            lives: (0..MAX_SLOTS)
                .map(|slot| if slot < players { profile.lives } else { -1 })
                .collect(),
            ..Self::idle()
        };
        machine.serve(profile, rng);
        machine
    }

    fn serve(&mut self, profile: &GameProfile, rng: &mut ChaCha8Rng) {
        self.ball = (profile.width as i32 / 2, profile.height as i32 / 2);
        let dx = if rng.gen_bool(0.5) { BALL_SPEED } else { -BALL_SPEED };
        let dy = SERVE_SLOPES[rng.gen_range(0..SERVE_SLOPES.len())];
        self.velocity = (dx, dy);
    }

    fn alive(&self, slot: usize) -> bool {
        self.lives.get(slot).map_or(false, |&lives| lives >= 0)
    }

    /// Even slots defend the left goal, odd slots the right one
    fn blocks(&self, slot: usize) -> bool {
        let defending = if slot % 2 == 0 {
            self.velocity.0 < 0
        } else {
            self.velocity.0 > 0
        };
        defending && self.alive(slot) && self.hits_paddle(slot)
    }

    fn hits_paddle(&self, slot: usize) -> bool {
        let (px, py) = self.paddles[slot];
        let (bx, by) = self.ball;
        bx + BALL_SIZE > px && bx < px + PADDLE_WIDTH && by + BALL_SIZE > py && by < py + PADDLE_HEIGHT
    }
}

/// Cloned machine state, optionally carrying the random generator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MockState {
    machine: Machine,
    rng: Option<ChaCha8Rng>,
}

impl MockState {
    /// Whether the state was taken with [`Emulator::clone_system_state`]
    pub fn includes_rng(&self) -> bool {
        self.rng.is_some()
    }

    pub fn frame(&self) -> u64 {
        self.machine.frame
    }
}

/// Reference emulator backend
pub struct MockAle {
    profiles: Vec<GameProfile>,
    profile: Option<GameProfile>,
    rom_path: Option<PathBuf>,
    mode: Option<GameMode>,
    players: usize,
    random_seed: i32,
    repeat_action_probability: f32,
    machine: Machine,
    rng: ChaCha8Rng,
    live_handles: Cell<usize>,
    loads: usize,
}

impl Default for MockAle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAle {
    /// Create an emulator that knows the built-in `pong` profile
    pub fn new() -> Self {
        Self {
            profiles: vec![GameProfile::pong()],
            profile: None,
            rom_path: None,
            mode: None,
            players: 0,
            random_seed: 0,
            repeat_action_probability: 0.25,
            machine: Machine::idle(),
            rng: ChaCha8Rng::seed_from_u64(0),
            live_handles: Cell::new(0),
            loads: 0,
        }
    }

    /// Register `profile`, replacing any profile with the same name
    pub fn with_profile(mut self, profile: GameProfile) -> Self {
        self.profiles.retain(|p| p.name != profile.name);
        self.profiles.push(profile);
        self
    }

    /// Profile of the loaded ROM
    pub fn profile(&self) -> Option<&GameProfile> {
        self.profile.as_ref()
    }

    pub fn rom_path(&self) -> Option<&Path> {
        self.rom_path.as_deref()
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    pub fn random_seed(&self) -> i32 {
        self.random_seed
    }

    pub fn repeat_action_probability(&self) -> f32 {
        self.repeat_action_probability
    }

    /// Frames emulated since the last reset
    pub fn frame(&self) -> u64 {
        self.machine.frame
    }

    /// Running score per slot
    pub fn scores(&self) -> &[i32] {
        &self.machine.scores
    }

    /// State handles cloned or decoded but not yet deleted
    pub fn live_handles(&self) -> usize {
        self.live_handles.get()
    }

    /// Number of successful ROM loads
    pub fn loads(&self) -> usize {
        self.loads
    }

    fn loaded(&self) -> Result<&GameProfile> {
        self.profile
            .as_ref()
            .ok_or_else(|| AleZooError::emulator(MockError::NoRom))
    }

    fn reboot(&mut self) {
        self.machine = match &self.profile {
            Some(profile) => Machine::boot(profile, self.players, &mut self.rng),
            None => Machine::idle(),
        };
    }

    fn point(&mut self, scoring_team: usize, rewards: &mut [i32]) {
        let lose_lives = self.profile.as_ref().map_or(false, |p| p.lives > 0);
        for slot in 0..self.players {
            if !self.machine.alive(slot) {
                continue;
            }
            if slot % 2 == scoring_team {
                rewards[slot] += 1;
                self.machine.scores[slot] += 1;
            } else {
                rewards[slot] -= 1;
                self.machine.scores[slot] -= 1;
                if lose_lives {
                    self.machine.lives[slot] -= 1;
                }
            }
        }
    }

    fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let (x, y) = (x as i32, y as i32);
        let (bx, by) = self.machine.ball;
        if x >= bx && x < bx + BALL_SIZE && y >= by && y < by + BALL_SIZE {
            return BALL_COLOUR;
        }
        for (slot, &(px, py)) in self.machine.paddles.iter().enumerate() {
            if self.machine.alive(slot)
                && x >= px
                && x < px + PADDLE_WIDTH
                && y >= py
                && y < py + PADDLE_HEIGHT
            {
                return SLOT_COLOURS[slot];
            }
        }
        BACKGROUND
    }
}

impl Emulator for MockAle {
    type State = MockState;

    fn set_logger_mode(mode: LoggerMode) {
        let code = match mode {
            LoggerMode::Info => 0,
            LoggerMode::Warning => 1,
            LoggerMode::Error => 2,
        };
        LOGGER_MODE.store(code, Ordering::Relaxed);
    }

    fn load_rom(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        if data.is_empty() {
            return Err(AleZooError::emulator(MockError::EmptyRom(path.to_path_buf())));
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let profile = self
            .profiles
            .iter()
            .find(|p| p.name == stem)
            .cloned()
            .unwrap_or_else(|| GameProfile::generic(stem));

        let (mode, players) = profile.default_mode().unwrap_or((0, 1));
        tracing::debug!(rom = %path.display(), profile = %profile.name, seed = self.random_seed, "loaded ROM");

        self.rng = ChaCha8Rng::seed_from_u64(self.random_seed as u64);
        self.profile = Some(profile);
        self.rom_path = Some(path.to_path_buf());
        self.mode = Some(mode);
        self.players = players.min(MAX_SLOTS);
        self.loads += 1;
        self.reboot();
        Ok(())
    }

    fn set_mode(&mut self, mode: GameMode) -> Result<()> {
        let profile = self.loaded()?;
        let players = profile.players_for(mode).ok_or_else(|| {
            AleZooError::emulator(MockError::UnsupportedMode {
                mode,
                rom: profile.name.clone(),
            })
        })?;
        self.mode = Some(mode);
        self.players = players.min(MAX_SLOTS);
        self.reboot();
        Ok(())
    }

    fn set_int(&mut self, key: &str, value: i32) {
        match key {
            "random_seed" => self.random_seed = value,
            _ => tracing::debug!(key, value, "ignoring unknown integer setting"),
        }
    }

    fn set_float(&mut self, key: &str, value: f32) {
        match key {
            "repeat_action_probability" => self.repeat_action_probability = value.clamp(0.0, 1.0),
            _ => tracing::debug!(key, value, "ignoring unknown float setting"),
        }
    }

    fn reset_game(&mut self) {
        self.reboot();
    }

    fn available_modes(&self, num_players: usize) -> Vec<GameMode> {
        self.profile
            .as_ref()
            .map(|p| p.available_modes(num_players))
            .unwrap_or_default()
    }

    fn num_players_active(&self) -> usize {
        self.players
    }

    fn minimal_action_set(&self) -> Vec<NativeAction> {
        self.profile
            .as_ref()
            .map(|p| p.minimal_actions.clone())
            .unwrap_or_default()
    }

    fn screen_dims(&self) -> (usize, usize) {
        self.profile
            .as_ref()
            .map_or((160, 210), |p| (p.width, p.height))
    }

    fn act(&mut self, actions: &[NativeAction]) -> Result<Vec<i32>> {
        let profile = self.loaded()?.clone();
        let mut rewards = vec![0; MAX_SLOTS];
        if self.game_over() {
            return Ok(rewards);
        }
        let (width, height) = (profile.width as i32, profile.height as i32);

        for slot in 0..self.players {
            if !self.machine.alive(slot) {
                continue;
            }
            let mut action = actions.get(slot).copied().unwrap_or(NativeAction::Noop);
            if self.repeat_action_probability > 0.0
                && self.rng.gen::<f32>() < self.repeat_action_probability
            {
                action = self.machine.last_actions[slot];
            }
            self.machine.last_actions[slot] = action;

            let (_, dy) = action.direction();
            let paddle = &mut self.machine.paddles[slot];
            paddle.1 = (paddle.1 + dy * PADDLE_SPEED).clamp(0, height - PADDLE_HEIGHT);
        }

        let (vx, vy) = self.machine.velocity;
        let (mut bx, mut by) = (self.machine.ball.0 + vx, self.machine.ball.1 + vy);
        if by <= 0 || by + BALL_SIZE >= height {
            self.machine.velocity.1 = -vy;
            by = by.clamp(0, height - BALL_SIZE);
        }
        self.machine.ball = (bx, by);

        let struck = (0..self.players).any(|slot| self.machine.blocks(slot));
        if struck {
            self.machine.velocity.0 = -vx;
            bx += self.machine.velocity.0;
            self.machine.ball.0 = bx;
        }

        if bx < 0 {
            self.point(1, &mut rewards);
            self.machine.serve(&profile, &mut self.rng);
        } else if bx + BALL_SIZE > width {
            self.point(0, &mut rewards);
            self.machine.serve(&profile, &mut self.rng);
        }

        self.machine.frame += 1;
        for &(slot, at) in &profile.eliminations {
            if slot < self.players && self.machine.frame >= at {
                self.machine.lives[slot] = -1;
            }
        }
        Ok(rewards)
    }

    fn game_over(&self) -> bool {
        let Some(profile) = &self.profile else {
            return false;
        };
        let timed_out = profile
            .game_length
            .map_or(false, |length| self.machine.frame >= length);
        let everyone_out = self.players > 0 && (0..self.players).all(|slot| !self.machine.alive(slot));
        timed_out || everyone_out
    }

    fn all_lives(&self) -> Vec<i32> {
        self.machine.lives.clone()
    }

    fn ram(&self) -> Vec<u8> {
        let mut ram = vec![0u8; RAM_BYTES];
        ram[..4].copy_from_slice(&(self.machine.frame as u32).to_le_bytes());
        ram[4] = self.machine.ball.0 as u8;
        ram[5] = self.machine.ball.1 as u8;
        ram[6] = self.machine.velocity.0 as i8 as u8;
        ram[7] = self.machine.velocity.1 as i8 as u8;
        for (slot, &(x, y)) in self.machine.paddles.iter().enumerate() {
            let base = 8 + slot * 4;
            ram[base] = x as u8;
            ram[base + 1] = y as u8;
            ram[base + 2] = self.machine.lives[slot] as i8 as u8;
            ram[base + 3] = self.machine.scores[slot] as i8 as u8;
        }
        ram[24] = self.mode.unwrap_or_default() as u8;
        ram[25] = self.players as u8;
        ram
    }

    fn screen_rgb(&self) -> Vec<u8> {
        let (width, height) = self.screen_dims();
        let mut screen = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                screen.extend_from_slice(&self.pixel(x, y));
            }
        }
        screen
    }

    fn screen_grayscale(&self) -> Vec<u8> {
        self.screen_rgb()
            .chunks_exact(3)
            .map(|rgb| {
                let luma = 299 * rgb[0] as u32 + 587 * rgb[1] as u32 + 114 * rgb[2] as u32;
                (luma / 1000) as u8
            })
            .collect()
    }

    fn clone_state(&mut self) -> MockState {
        self.live_handles.set(self.live_handles.get() + 1);
        MockState {
            machine: self.machine.clone(),
            rng: None,
        }
    }

    fn clone_system_state(&mut self) -> MockState {
        self.live_handles.set(self.live_handles.get() + 1);
        MockState {
            machine: self.machine.clone(),
            rng: Some(self.rng.clone()),
        }
    }

    fn encode_state(&self, state: &MockState) -> Result<Vec<u8>> {
        serde_json::to_vec(state).map_err(|e| AleZooError::emulator(MockError::State(e)))
    }

    fn decode_state(&self, bytes: &[u8]) -> Result<MockState> {
        let state: MockState = serde_json::from_slice(bytes)
            .map_err(|e| AleZooError::emulator(MockError::State(e)))?;
        self.live_handles.set(self.live_handles.get() + 1);
        Ok(state)
    }

    fn restore_state(&mut self, state: &MockState) {
        self.machine = state.machine.clone();
    }

    fn restore_system_state(&mut self, state: &MockState) {
        self.machine = state.machine.clone();
        if let Some(rng) = &state.rng {
            self.rng = rng.clone();
        }
    }

    fn delete_state(&mut self, _state: MockState) {
        self.live_handles.set(self.live_handles.get().saturating_sub(1));
    }
}
