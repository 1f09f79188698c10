//! Core environment trait definitions.

use crate::agent::AgentId;
use crate::config::EnvMetadata;
use crate::spaces::DynSpace;
use crate::Result;
use ndarray::{Array3, ArrayD};
use std::collections::HashMap;
use std::sync::Arc;

/// Observation shared by every agent of a step.
///
/// The emulator exposes one frame (or one RAM snapshot) per tick, so all
/// agents receive clones of the same allocation.
pub type Observation = Arc<ArrayD<u8>>;

/// Per-agent results keyed by identity
pub type AgentMap<T> = HashMap<AgentId, T>;

/// Auxiliary per-agent information. Atari environments leave it empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvInfo {
    /// Custom metrics (kept minimal for performance)
    pub extra: smallvec::SmallVec<[(&'static str, f32); 4]>,
}

impl EnvInfo {
    /// Create empty info
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.extra.is_empty()
    }
}

/// Result of one parallel step.
///
/// Every map is keyed by the agents that were active when the step began,
/// so an agent terminated by this step still appears here once.
#[derive(Clone, Debug, Default)]
pub struct ParallelStepResult {
    pub observations: AgentMap<Observation>,
    pub rewards: AgentMap<f32>,
    pub terminations: AgentMap<bool>,
    pub truncations: AgentMap<bool>,
    pub infos: AgentMap<EnvInfo>,
}

impl ParallelStepResult {
    /// Whether `agent` is out of the episode after this step
    pub fn done(&self, agent: &str) -> bool {
        self.terminations.get(agent).copied().unwrap_or(false)
            || self.truncations.get(agent).copied().unwrap_or(false)
    }

    /// Whether every reported agent is out of the episode
    pub fn all_done(&self) -> bool {
        self.terminations.keys().all(|agent| self.done(agent.as_str()))
    }
}

/// What `AecEnv::last` reports for the selected agent
#[derive(Clone, Debug)]
pub struct LastStep {
    pub observation: Observation,
    /// Reward accumulated since the agent last acted
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: EnvInfo,
}

impl LastStep {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Multi-agent environment where every live agent acts each step.
pub trait ParallelEnv {
    /// Every agent that could ever take part, fixed at construction
    fn possible_agents(&self) -> &[AgentId];

    /// Agents still playing the current episode, in roster order
    fn agents(&self) -> Vec<AgentId>;

    fn observation_space(&self, agent: &str) -> Result<DynSpace>;

    fn action_space(&self, agent: &str) -> Result<DynSpace>;

    /// Start a new episode
    ///
    /// # Arguments
    /// * `seed` - Optional random seed for reproducibility
    fn reset(&mut self, seed: Option<u64>) -> Result<(AgentMap<Observation>, AgentMap<EnvInfo>)>;

    /// Advance all agents one step with an action index per agent
    fn step(&mut self, actions: &AgentMap<usize>) -> Result<ParallelStepResult>;

    /// Render according to the configured render mode
    fn render(&mut self) -> Result<Option<Array3<u8>>>;

    /// Release rendering resources. Safe to call repeatedly.
    fn close(&mut self);

    fn metadata(&self) -> &EnvMetadata;

    fn num_agents(&self) -> usize {
        self.agents().len()
    }

    fn max_num_agents(&self) -> usize {
        self.possible_agents().len()
    }
}

/// Multi-agent environment where agents act one at a time.
pub trait AecEnv {
    fn possible_agents(&self) -> &[AgentId];

    /// Agents still listed in the cycle, including ones awaiting a dead step
    fn agents(&self) -> &[AgentId];

    /// Agent whose turn it is; `None` once the episode has fully ended
    fn agent_selection(&self) -> Option<&AgentId>;

    fn observation_space(&self, agent: &str) -> Result<DynSpace>;

    fn action_space(&self, agent: &str) -> Result<DynSpace>;

    fn reset(&mut self, seed: Option<u64>) -> Result<()>;

    /// Latest observation delivered to `agent`
    fn observe(&self, agent: &str) -> Result<Observation>;

    /// Observation, accumulated reward and flags of the selected agent
    fn last(&self) -> Result<LastStep>;

    /// Act for the selected agent; dead agents must pass `None`
    fn step(&mut self, action: Option<usize>) -> Result<()>;

    fn render(&mut self) -> Result<Option<Array3<u8>>>;

    fn close(&mut self);
}
