//! Session adapter mapping one emulator onto a roster of agents.

use super::{AgentMap, EnvInfo, Observation, ParallelEnv, ParallelStepResult};
use crate::agent::{self, AgentId};
use crate::config::{AtariConfig, EnvMetadata, ObsType, RenderMode};
use crate::emulator::{Emulator, GameMode, LoggerMode, NativeAction};
use crate::render::{self, Surface, SurfaceFactory, ZOOM_FACTOR};
use crate::spaces::{Box as BoxSpace, Discrete, DynSpace};
use crate::{rom, AleZooError, Result};
use ndarray::{Array3, ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

/// Bytes of console RAM exposed by the `ram` observation
pub const RAM_SIZE: usize = 128;

static LOGGER_INIT: Once = Once::new();

/// Encoded emulator state returned by the snapshot operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateBuffer(Vec<u8>);

impl StateBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for StateBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Multi-agent Atari environment using the parallel API.
///
/// Owns its emulator exclusively. Agents map positionally onto emulator
/// slots; the active set only ever shrinks within an episode.
pub struct ParallelAtariEnv<E: Emulator> {
    ale: E,
    config: AtariConfig,
    rom_path: PathBuf,
    mode: GameMode,
    /// Logical action index -> native action
    action_mapping: Vec<NativeAction>,
    possible_agents: Vec<AgentId>,
    /// Per-slot membership of the active set
    active: Vec<bool>,
    frame: u64,
    truncated: bool,
    screen_dims: (usize, usize),
    observation_space: DynSpace,
    action_space: DynSpace,
    metadata: EnvMetadata,
    rng: ChaCha8Rng,
    surface: Option<Box<dyn Surface>>,
    surface_factory: SurfaceFactory,
}

impl<E: Emulator> ParallelAtariEnv<E> {
    /// Bind `ale` to the configured ROM, mode and roster.
    ///
    /// # Errors
    /// * `Configuration` if the player count or mode is unsupported
    /// * `ResourceNotFound` if the ROM is absent from every search location
    pub fn new(mut ale: E, config: AtariConfig) -> Result<Self> {
        let possible_agents = agent::roster(config.num_players)?;

        LOGGER_INIT.call_once(|| E::set_logger_mode(LoggerMode::Error));

        ale.set_float("repeat_action_probability", 0.0);

        let rom_path = rom::locate(config.rom_dir.as_deref(), &config.game)?;
        ale.load_rom(&rom_path)?;

        let all_modes = ale.available_modes(config.num_players);
        let mode = match config.mode {
            Some(mode) if all_modes.contains(&mode) => mode,
            Some(mode) => {
                return Err(AleZooError::Configuration(format!(
                    "mode {mode} selected, only {all_modes:?} modes are supported for {} players",
                    config.num_players
                )))
            }
            None => *all_modes.first().ok_or_else(|| {
                AleZooError::Configuration(format!(
                    "{} does not support {} players",
                    config.game, config.num_players
                ))
            })?,
        };
        ale.set_mode(mode)?;

        let active_players = ale.num_players_active();
        if active_players != config.num_players {
            return Err(AleZooError::Configuration(format!(
                "mode {mode} drives {active_players} players, {} requested",
                config.num_players
            )));
        }

        let action_mapping = if config.full_action_space {
            NativeAction::ALL.to_vec()
        } else {
            ale.minimal_action_set()
        };
        if action_mapping.is_empty() {
            return Err(AleZooError::Configuration(format!(
                "{} reports an empty minimal action set",
                config.game
            )));
        }

        let screen_dims = ale.screen_dims();
        let observation_space = DynSpace::Box(BoxSpace::bytes(&observation_shape(
            config.obs_type,
            screen_dims,
        )));
        let action_space = DynSpace::Discrete(Discrete::new(action_mapping.len()));

        tracing::debug!(
            rom = %rom_path.display(),
            mode,
            actions = action_mapping.len(),
            obs_type = %config.obs_type,
            "bound emulator"
        );

        let num_players = possible_agents.len();
        let metadata = EnvMetadata::new(config.resolved_name());
        let seed = config.seed;
        let mut env = Self {
            ale,
            config,
            rom_path,
            mode,
            action_mapping,
            possible_agents,
            active: vec![true; num_players],
            frame: 0,
            truncated: false,
            screen_dims,
            observation_space,
            action_space,
            metadata,
            rng: ChaCha8Rng::from_entropy(),
            surface: None,
            surface_factory: render::default_factory(),
        };
        env.seed(seed)?;
        Ok(env)
    }

    /// Replace the factory used to open the `human` render surface
    pub fn with_surface_factory(mut self, factory: SurfaceFactory) -> Self {
        self.surface_factory = factory;
        self
    }

    /// Reseed the adapter and the emulator, then reload ROM and mode.
    fn seed(&mut self, seed: Option<u64>) -> Result<()> {
        self.rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        let ale_seed = match seed {
            Some(s) => (s & i32::MAX as u64) as i32,
            None => self.rng.gen_range(0..i32::MAX),
        };
        self.ale.set_int("random_seed", ale_seed);
        self.ale.load_rom(&self.rom_path)?;
        self.ale.set_mode(self.mode)?;
        Ok(())
    }

    fn observe(&self) -> Result<Observation> {
        let (width, height) = self.screen_dims;
        let data = match self.config.obs_type {
            ObsType::Ram => self.ale.ram(),
            ObsType::RgbImage => self.ale.screen_rgb(),
            ObsType::GrayscaleImage => self.ale.screen_grayscale(),
        };
        let shape = observation_shape(self.config.obs_type, (width, height));
        let array = ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(AleZooError::emulator)?;
        Ok(Arc::new(array))
    }

    fn rgb_frame(&self) -> Result<Array3<u8>> {
        let (width, height) = self.screen_dims;
        Array3::from_shape_vec((height, width, 3), self.ale.screen_rgb())
            .map_err(AleZooError::emulator)
    }

    fn active_slots(&self) -> impl Iterator<Item = (usize, &AgentId)> + '_ {
        self.possible_agents
            .iter()
            .enumerate()
            .filter(move |(slot, _)| self.active[*slot])
    }

    /// Capture emulator state without pseudorandom internals.
    ///
    /// Restoring it does not guarantee an identical future trajectory; see
    /// [`clone_full_state`](Self::clone_full_state) for that.
    pub fn clone_state(&mut self) -> Result<StateBuffer> {
        let handle = self.ale.clone_state();
        let encoded = self.ale.encode_state(&handle);
        self.ale.delete_state(handle);
        encoded.map(StateBuffer)
    }

    /// Restore state captured by [`clone_state`](Self::clone_state)
    pub fn restore_state(&mut self, state: &StateBuffer) -> Result<()> {
        let handle = self.ale.decode_state(state.as_bytes())?;
        self.ale.restore_state(&handle);
        self.ale.delete_state(handle);
        Ok(())
    }

    /// Capture emulator state including pseudorandom internals.
    ///
    /// Restoring it reproduces bit-identical trajectories for the same actions.
    pub fn clone_full_state(&mut self) -> Result<StateBuffer> {
        let handle = self.ale.clone_system_state();
        let encoded = self.ale.encode_state(&handle);
        self.ale.delete_state(handle);
        encoded.map(StateBuffer)
    }

    /// Restore state captured by [`clone_full_state`](Self::clone_full_state)
    pub fn restore_full_state(&mut self, state: &StateBuffer) -> Result<()> {
        let handle = self.ale.decode_state(state.as_bytes())?;
        self.ale.restore_system_state(&handle);
        self.ale.delete_state(handle);
        Ok(())
    }

    /// Steps taken in the current episode
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn rom_path(&self) -> &Path {
        &self.rom_path
    }

    pub fn config(&self) -> &AtariConfig {
        &self.config
    }

    /// Native action behind each logical action index
    pub fn action_mapping(&self) -> &[NativeAction] {
        &self.action_mapping
    }

    /// Whether the episode has ended by elimination or truncation
    pub fn is_done(&self) -> bool {
        self.truncated || !self.active.iter().any(|&a| a)
    }

    /// Adapter-level random source, reseeded on every reset
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Read-only view of the wrapped emulator
    pub fn emulator(&self) -> &E {
        &self.ale
    }

    pub fn metadata_mut(&mut self) -> &mut EnvMetadata {
        &mut self.metadata
    }

    fn check_agent(&self, agent: &str) -> Result<()> {
        if self.possible_agents.iter().any(|a| a.as_str() == agent) {
            Ok(())
        } else {
            Err(AleZooError::UnknownAgent(agent.to_string()))
        }
    }
}

impl<E: Emulator> ParallelEnv for ParallelAtariEnv<E> {
    fn possible_agents(&self) -> &[AgentId] {
        &self.possible_agents
    }

    fn agents(&self) -> Vec<AgentId> {
        self.active_slots().map(|(_, agent)| agent.clone()).collect()
    }

    fn observation_space(&self, agent: &str) -> Result<DynSpace> {
        self.check_agent(agent)?;
        Ok(self.observation_space.clone())
    }

    fn action_space(&self, agent: &str) -> Result<DynSpace> {
        self.check_agent(agent)?;
        Ok(self.action_space.clone())
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(AgentMap<Observation>, AgentMap<EnvInfo>)> {
        match seed {
            Some(s) => {
                tracing::info!(seed = s, env = %self.metadata.name, "reseeding");
                self.seed(Some(s))?;
            }
            None => self.rng = ChaCha8Rng::from_entropy(),
        }
        self.ale.reset_game();
        self.active.fill(true);
        self.frame = 0;
        self.truncated = false;

        let obs = self.observe()?;
        let observations = self
            .possible_agents
            .iter()
            .map(|agent| (agent.clone(), Arc::clone(&obs)))
            .collect();
        let infos = self
            .possible_agents
            .iter()
            .map(|agent| (agent.clone(), EnvInfo::new()))
            .collect();
        Ok((observations, infos))
    }

    fn step(&mut self, actions: &AgentMap<usize>) -> Result<ParallelStepResult> {
        let mut native = Vec::with_capacity(self.possible_agents.len());
        for (slot, agent) in self.possible_agents.iter().enumerate() {
            let index = match actions.get(agent) {
                Some(&index) => index,
                None => {
                    if self.active[slot] {
                        tracing::debug!(agent = %agent, "no action supplied, using noop");
                    }
                    0
                }
            };
            let action = self.action_mapping.get(index).copied().ok_or_else(|| {
                AleZooError::Validation(format!(
                    "action {index} for {agent} outside 0..{}",
                    self.action_mapping.len()
                ))
            })?;
            native.push(action);
        }

        let rewards = self.ale.act(&native)?;
        self.frame += 1;
        let truncate = self.frame >= self.config.max_cycles;

        // An inactive slot reports negative lives.
        let lives = if self.ale.game_over() {
            None
        } else {
            Some(self.ale.all_lives())
        };

        let obs = self.observe()?;
        let mut result = ParallelStepResult::default();
        let mut eliminated = Vec::new();
        for (slot, agent) in self.active_slots() {
            let terminated = match &lives {
                None => true,
                Some(lives) => lives.get(slot).map_or(true, |&life| life < 0),
            };
            if terminated {
                eliminated.push(slot);
            }
            let reward = rewards.get(slot).copied().unwrap_or(0) as f32;
            result.observations.insert(agent.clone(), Arc::clone(&obs));
            result.rewards.insert(agent.clone(), reward);
            result.terminations.insert(agent.clone(), terminated);
            result.truncations.insert(agent.clone(), truncate);
            result.infos.insert(agent.clone(), EnvInfo::new());
        }

        for slot in eliminated {
            tracing::debug!(agent = %self.possible_agents[slot], frame = self.frame, "agent terminated");
            self.active[slot] = false;
        }
        self.truncated = truncate;

        // Agents are already pruned; a display failure must not lose the step.
        if self.config.render_mode == Some(RenderMode::Human) {
            if let Err(err) = self.render() {
                tracing::warn!(error = %err, "failed to present frame");
            }
        }
        Ok(result)
    }

    fn render(&mut self) -> Result<Option<Array3<u8>>> {
        let Some(mode) = self.config.render_mode else {
            tracing::warn!("You are calling render method without specifying any render mode.");
            return Ok(None);
        };
        assert!(
            self.metadata.render_modes.contains(&mode),
            "{mode} is not a valid render mode"
        );

        let image = self.rgb_frame()?;
        match mode {
            RenderMode::RgbArray => Ok(Some(image)),
            RenderMode::Human => {
                if self.surface.is_none() {
                    let (width, height) = self.screen_dims;
                    let surface =
                        (self.surface_factory)(width * ZOOM_FACTOR, height * ZOOM_FACTOR)?;
                    self.surface = Some(surface);
                }
                if let Some(surface) = self.surface.as_mut() {
                    surface.present(&render::scale(&image, ZOOM_FACTOR))?;
                }
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if self.surface.take().is_some() {
            tracing::debug!("closed render surface");
        }
    }

    fn metadata(&self) -> &EnvMetadata {
        &self.metadata
    }
}

fn observation_shape(obs_type: ObsType, (width, height): (usize, usize)) -> Vec<usize> {
    match obs_type {
        ObsType::Ram => vec![RAM_SIZE],
        ObsType::RgbImage => vec![height, width, 3],
        ObsType::GrayscaleImage => vec![height, width, 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const WIDTH: usize = 8;
    const HEIGHT: usize = 6;

    /// Emulator stub with scripted lives and a frame counter painted on screen
    #[derive(Default)]
    struct StubAle {
        modes: HashMap<usize, Vec<GameMode>>,
        players_for_mode: HashMap<GameMode, usize>,
        mode: GameMode,
        frame: u8,
        lives: Vec<i32>,
        /// Slot -> frame at which its lives drop to -1
        eliminate_at: HashMap<usize, u8>,
        game_over_at: Option<u8>,
        last_actions: Vec<NativeAction>,
        ints: Vec<(String, i32)>,
        loads: usize,
        live_handles: usize,
        fail_act: bool,
    }

    impl StubAle {
        fn two_and_four() -> Self {
            Self {
                modes: HashMap::from([(2, vec![19, 20]), (4, vec![21])]),
                players_for_mode: HashMap::from([(19, 2), (20, 2), (21, 4)]),
                ..Default::default()
            }
        }
    }

    impl Emulator for StubAle {
        type State = u8;

        fn set_logger_mode(_mode: LoggerMode) {}

        fn load_rom(&mut self, _path: &Path) -> Result<()> {
            self.loads += 1;
            Ok(())
        }

        fn set_mode(&mut self, mode: GameMode) -> Result<()> {
            self.mode = mode;
            let players = self.players_for_mode.get(&mode).copied().unwrap_or(0);
            self.lives = (0..4).map(|s| if s < players { 3 } else { -1 }).collect();
            Ok(())
        }

        fn set_int(&mut self, key: &str, value: i32) {
            self.ints.push((key.to_string(), value));
        }

        fn set_float(&mut self, _key: &str, _value: f32) {}

        fn reset_game(&mut self) {
            self.frame = 0;
            let mode = self.mode;
            let _ = self.set_mode(mode);
        }

        fn available_modes(&self, num_players: usize) -> Vec<GameMode> {
            self.modes.get(&num_players).cloned().unwrap_or_default()
        }

        fn num_players_active(&self) -> usize {
            self.players_for_mode.get(&self.mode).copied().unwrap_or(0)
        }

        fn minimal_action_set(&self) -> Vec<NativeAction> {
            NativeAction::ALL[..6].to_vec()
        }

        fn screen_dims(&self) -> (usize, usize) {
            (WIDTH, HEIGHT)
        }

        fn act(&mut self, actions: &[NativeAction]) -> Result<Vec<i32>> {
            if self.fail_act {
                return Err(AleZooError::emulator("act failed"));
            }
            self.frame += 1;
            self.last_actions = actions.to_vec();
            for (&slot, &at) in &self.eliminate_at {
                if self.frame >= at {
                    self.lives[slot] = -1;
                }
            }
            Ok((0..4).map(|s| s as i32 + 1).collect())
        }

        fn game_over(&self) -> bool {
            self.game_over_at.is_some_and(|at| self.frame >= at)
        }

        fn all_lives(&self) -> Vec<i32> {
            self.lives.clone()
        }

        fn ram(&self) -> Vec<u8> {
            vec![self.frame; RAM_SIZE]
        }

        fn screen_rgb(&self) -> Vec<u8> {
            vec![self.frame; WIDTH * HEIGHT * 3]
        }

        fn screen_grayscale(&self) -> Vec<u8> {
            vec![self.frame; WIDTH * HEIGHT]
        }

        fn clone_state(&mut self) -> u8 {
            self.live_handles += 1;
            self.frame
        }

        fn clone_system_state(&mut self) -> u8 {
            self.live_handles += 1;
            self.frame
        }

        fn encode_state(&self, state: &u8) -> Result<Vec<u8>> {
            Ok(vec![*state])
        }

        fn decode_state(&self, bytes: &[u8]) -> Result<u8> {
            bytes
                .first()
                .copied()
                .ok_or_else(|| AleZooError::emulator("empty state"))
        }

        fn restore_state(&mut self, state: &u8) {
            self.frame = *state;
        }

        fn restore_system_state(&mut self, state: &u8) {
            self.frame = *state;
        }

        // Decoded handles are not counted, so deletes may outnumber clones.
        fn delete_state(&mut self, _state: u8) {
            self.live_handles = self.live_handles.saturating_sub(1);
        }
    }

    fn rom_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pong.bin"), b"\0").unwrap();
        dir
    }

    fn make_env(ale: StubAle, config: AtariConfig) -> ParallelAtariEnv<StubAle> {
        ParallelAtariEnv::new(ale, config).unwrap()
    }

    fn noops(env: &ParallelAtariEnv<StubAle>) -> AgentMap<usize> {
        env.agents().into_iter().map(|a| (a, 0)).collect()
    }

    #[test]
    fn test_construction_picks_first_mode() {
        let dir = rom_dir();
        let env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        assert_eq!(env.mode(), 19);
        assert_eq!(env.possible_agents().len(), 2);
        assert_eq!(env.action_space("first_0").unwrap().n(), Some(6));
        assert_eq!(env.metadata().name, "custom_pong");
        assert_eq!(env.rom_path(), dir.path().join("pong.bin"));
    }

    #[test]
    fn test_unsupported_mode_and_player_count() {
        let dir = rom_dir();
        let bad_mode = ParallelAtariEnv::new(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_mode(21).with_rom_dir(dir.path()),
        );
        assert!(matches!(bad_mode, Err(AleZooError::Configuration(_))));

        let bad_players = ParallelAtariEnv::new(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 3).with_rom_dir(dir.path()),
        );
        assert!(matches!(bad_players, Err(AleZooError::Configuration(_))));
    }

    #[test]
    fn test_mode_driving_wrong_player_count() {
        let dir = rom_dir();
        let mut ale = StubAle::two_and_four();
        ale.players_for_mode.insert(20, 4);
        let result = ParallelAtariEnv::new(
            ale,
            AtariConfig::new("pong", 2).with_mode(20).with_rom_dir(dir.path()),
        );
        assert!(matches!(result, Err(AleZooError::Configuration(_))));
    }

    #[test]
    fn test_missing_rom() {
        let dir = tempfile::tempdir().unwrap();
        let result = ParallelAtariEnv::new(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        assert!(matches!(result, Err(AleZooError::ResourceNotFound { .. })));
    }

    #[test]
    fn test_seed_reloads_rom() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_seed(7).with_rom_dir(dir.path()),
        );
        // construction load + construction seed
        assert_eq!(env.emulator().loads, 2);
        assert_eq!(env.emulator().ints, vec![("random_seed".to_string(), 7)]);

        env.reset(None).unwrap();
        assert_eq!(env.emulator().loads, 2);

        env.reset(Some(11)).unwrap();
        assert_eq!(env.emulator().loads, 3);
        assert_eq!(env.emulator().ints.last().unwrap().1, 11);
    }

    #[test]
    fn test_step_maps_actions_and_fills_missing() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 4).with_rom_dir(dir.path()),
        );
        env.reset(Some(0)).unwrap();

        let actions = HashMap::from([(AgentId::from("first_0"), 5), (AgentId::from("third_0"), 1)]);
        let result = env.step(&actions).unwrap();
        assert_eq!(
            env.emulator().last_actions,
            vec![
                NativeAction::Down,
                NativeAction::Noop,
                NativeAction::Fire,
                NativeAction::Noop
            ]
        );
        assert_eq!(result.rewards["first_0"], 1.0);
        assert_eq!(result.rewards["fourth_0"], 4.0);
    }

    #[test]
    fn test_out_of_range_action() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        env.reset(None).unwrap();
        let actions = HashMap::from([(AgentId::from("second_0"), 6)]);
        assert!(matches!(env.step(&actions), Err(AleZooError::Validation(_))));
        assert_eq!(env.frame(), 0);
    }

    #[test]
    fn test_full_action_space_is_identity() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2)
                .with_full_action_space(true)
                .with_rom_dir(dir.path()),
        );
        assert_eq!(env.action_space("second_0").unwrap().n(), Some(18));
        env.reset(None).unwrap();
        let actions = HashMap::from([(AgentId::from("first_0"), 17), (AgentId::from("second_0"), 9)]);
        env.step(&actions).unwrap();
        assert_eq!(
            env.emulator().last_actions,
            vec![NativeAction::DownLeftFire, NativeAction::DownLeft]
        );
    }

    #[test]
    fn test_elimination_is_reported_once_then_pruned() {
        let dir = rom_dir();
        let mut ale = StubAle::two_and_four();
        ale.eliminate_at.insert(1, 2);
        let mut env = make_env(ale, AtariConfig::new("pong", 4).with_rom_dir(dir.path()));
        env.reset(None).unwrap();

        let first = env.step(&noops(&env)).unwrap();
        assert!(!first.terminations["second_0"]);

        let second = env.step(&noops(&env)).unwrap();
        assert!(second.terminations["second_0"]);
        assert!(second.observations.contains_key("second_0"));
        assert_eq!(env.agents().len(), 3);

        let third = env.step(&noops(&env)).unwrap();
        assert!(!third.rewards.contains_key("second_0"));
        assert!(!third.terminations.contains_key("second_0"));
        assert!(!env.agents().iter().any(|a| a.as_str() == "second_0"));

        env.reset(None).unwrap();
        assert_eq!(env.agents(), env.possible_agents().to_vec());
    }

    #[test]
    fn test_game_over_terminates_everyone() {
        let dir = rom_dir();
        let mut ale = StubAle::two_and_four();
        ale.game_over_at = Some(3);
        let mut env = make_env(ale, AtariConfig::new("pong", 2).with_rom_dir(dir.path()));
        env.reset(None).unwrap();

        for _ in 0..2 {
            let result = env.step(&noops(&env)).unwrap();
            assert!(result.terminations.values().all(|t| !t));
        }
        let result = env.step(&noops(&env)).unwrap();
        assert!(result.terminations.values().all(|&t| t));
        assert!(result.all_done());
        assert!(env.agents().is_empty());
        assert!(env.is_done());
    }

    #[test]
    fn test_truncation_fires_at_max_cycles() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2)
                .with_max_cycles(3)
                .with_rom_dir(dir.path()),
        );
        env.reset(None).unwrap();
        for step in 1..=3 {
            let result = env.step(&noops(&env)).unwrap();
            assert!(result.truncations.values().all(|&t| t == (step == 3)));
            assert!(result.terminations.values().all(|&t| !t));
        }
        assert!(env.is_done());
        assert_eq!(env.agents().len(), 2);
    }

    #[test]
    fn test_observation_shapes_and_sharing() {
        let dir = rom_dir();
        for (obs_type, shape) in [
            (ObsType::Ram, vec![RAM_SIZE]),
            (ObsType::RgbImage, vec![HEIGHT, WIDTH, 3]),
            (ObsType::GrayscaleImage, vec![HEIGHT, WIDTH, 1]),
        ] {
            let mut env = make_env(
                StubAle::two_and_four(),
                AtariConfig::new("pong", 2)
                    .with_obs_type(obs_type)
                    .with_rom_dir(dir.path()),
            );
            assert_eq!(env.observation_space("first_0").unwrap().shape(), shape);

            let (obs, infos) = env.reset(None).unwrap();
            assert_eq!(obs["first_0"].shape(), shape.as_slice());
            assert!(Arc::ptr_eq(&obs["first_0"], &obs["second_0"]));
            assert!(infos.values().all(EnvInfo::is_empty));
        }
    }

    #[test]
    fn test_unknown_agent_space() {
        let dir = rom_dir();
        let env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        assert!(matches!(
            env.observation_space("third_0"),
            Err(AleZooError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_snapshots_release_handles() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        env.reset(None).unwrap();
        env.step(&noops(&env)).unwrap();

        let partial = env.clone_state().unwrap();
        let full = env.clone_full_state().unwrap();
        env.step(&noops(&env)).unwrap();
        env.restore_state(&partial).unwrap();
        env.restore_full_state(&full).unwrap();
        assert_eq!(env.emulator().live_handles, 0);
        assert_eq!(full.as_bytes(), &[1]);

        let empty = StateBuffer::from(Vec::new());
        assert!(matches!(
            env.restore_state(&empty),
            Err(AleZooError::Emulator(_))
        ));
    }

    #[test]
    fn test_render_without_mode_returns_none() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        env.reset(None).unwrap();
        assert!(env.render().unwrap().is_none());
    }

    #[test]
    fn test_render_rgb_array() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2)
                .with_render_mode(RenderMode::RgbArray)
                .with_rom_dir(dir.path()),
        );
        env.reset(None).unwrap();
        env.step(&noops(&env)).unwrap();
        let frame = env.render().unwrap().unwrap();
        assert_eq!(frame.dim(), (HEIGHT, WIDTH, 3));
        assert_eq!(env.frame(), 1);
    }

    #[test]
    #[should_panic(expected = "is not a valid render mode")]
    fn test_render_mode_outside_metadata_panics() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2)
                .with_render_mode(RenderMode::RgbArray)
                .with_rom_dir(dir.path()),
        );
        env.metadata_mut().render_modes = vec![RenderMode::Human];
        let _ = env.render();
    }

    struct RecordingSurface(Arc<Mutex<Vec<(usize, usize)>>>);

    impl Surface for RecordingSurface {
        fn present(&mut self, frame: &Array3<u8>) -> Result<()> {
            let (h, w, _) = frame.dim();
            self.0.lock().unwrap().push((w, h));
            Ok(())
        }
    }

    #[test]
    fn test_human_render_opens_surface_lazily() {
        let dir = rom_dir();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let opened = Arc::new(Mutex::new(0usize));

        let (frames_in, opened_in) = (Arc::clone(&frames), Arc::clone(&opened));
        let factory: SurfaceFactory = Box::new(move |_w, _h| {
            *opened_in.lock().unwrap() += 1;
            Ok(Box::new(RecordingSurface(Arc::clone(&frames_in))) as Box<dyn Surface>)
        });
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2)
                .with_render_mode(RenderMode::Human)
                .with_rom_dir(dir.path()),
        )
        .with_surface_factory(factory);

        env.reset(None).unwrap();
        assert_eq!(*opened.lock().unwrap(), 0);

        env.step(&noops(&env)).unwrap();
        env.step(&noops(&env)).unwrap();
        assert_eq!(*opened.lock().unwrap(), 1);
        assert_eq!(
            frames.lock().unwrap().as_slice(),
            &[(WIDTH * ZOOM_FACTOR, HEIGHT * ZOOM_FACTOR); 2]
        );
        assert_eq!(env.frame(), 2);

        env.close();
        env.close();
        env.render().unwrap();
        assert_eq!(*opened.lock().unwrap(), 2);
    }

    struct FailingSurface;

    impl Surface for FailingSurface {
        fn present(&mut self, _frame: &Array3<u8>) -> Result<()> {
            Err(AleZooError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "display closed",
            )))
        }
    }

    #[test]
    fn test_human_render_failure_keeps_step_result() {
        let dir = rom_dir();
        let mut ale = StubAle::two_and_four();
        ale.eliminate_at.insert(1, 1);
        let factory: SurfaceFactory =
            Box::new(|_w, _h| Ok(Box::new(FailingSurface) as Box<dyn Surface>));
        let mut env = make_env(
            ale,
            AtariConfig::new("pong", 2)
                .with_render_mode(RenderMode::Human)
                .with_rom_dir(dir.path()),
        )
        .with_surface_factory(factory);
        env.reset(None).unwrap();

        let result = env.step(&noops(&env)).unwrap();
        assert!(result.terminations["second_0"]);
        assert!(!result.terminations["first_0"]);
        assert_eq!(result.rewards["second_0"], 2.0);
        assert!(result.infos.values().all(EnvInfo::is_empty));
        assert_eq!(env.agents(), vec![AgentId::from("first_0")]);
        assert_eq!(env.frame(), 1);

        // A failing factory is reported the same way.
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2)
                .with_render_mode(RenderMode::Human)
                .with_rom_dir(dir.path()),
        )
        .with_surface_factory(Box::new(|_w, _h| {
            Err::<Box<dyn Surface>, _>(AleZooError::emulator("no display"))
        }));
        env.reset(None).unwrap();
        assert_eq!(env.step(&noops(&env)).unwrap().rewards.len(), 2);
    }

    #[test]
    fn test_emulator_act_failure_propagates() {
        let dir = rom_dir();
        let mut env = make_env(
            StubAle::two_and_four(),
            AtariConfig::new("pong", 2).with_rom_dir(dir.path()),
        );
        env.reset(None).unwrap();
        env.ale.fail_act = true;
        assert!(matches!(
            env.step(&noops(&env)),
            Err(AleZooError::Emulator(_))
        ));
        assert_eq!(env.frame(), 0);
        assert_eq!(env.agents().len(), 2);
    }
}
