//! Protocol-checking wrappers for agent-environment cycle envs.

use super::{AecEnv, LastStep, Observation, ParallelEnv, ParallelToAec};
use crate::agent::AgentId;
use crate::spaces::DynSpace;
use crate::{AleZooError, Result};
use ndarray::Array3;

/// Standard wrapping of a parallel env for agent-by-agent use
pub type BaseEnv<P> = OrderEnforcing<AssertOutOfBounds<ParallelToAec<P>>>;

/// Convert `env` to the AEC API with bounds and ordering checks
pub fn base_env<P: ParallelEnv>(env: P) -> BaseEnv<P> {
    OrderEnforcing::new(AssertOutOfBounds::new(ParallelToAec::new(env)))
}

/// Wrapper that rejects actions outside the selected agent's action space.
pub struct AssertOutOfBounds<E: AecEnv> {
    env: E,
}

impl<E: AecEnv> AssertOutOfBounds<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }
}

impl<E: AecEnv> AecEnv for AssertOutOfBounds<E> {
    fn possible_agents(&self) -> &[AgentId] {
        self.env.possible_agents()
    }

    fn agents(&self) -> &[AgentId] {
        self.env.agents()
    }

    fn agent_selection(&self) -> Option<&AgentId> {
        self.env.agent_selection()
    }

    fn observation_space(&self, agent: &str) -> Result<DynSpace> {
        self.env.observation_space(agent)
    }

    fn action_space(&self, agent: &str) -> Result<DynSpace> {
        self.env.action_space(agent)
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<()> {
        self.env.reset(seed)
    }

    fn observe(&self, agent: &str) -> Result<Observation> {
        self.env.observe(agent)
    }

    fn last(&self) -> Result<LastStep> {
        self.env.last()
    }

    fn step(&mut self, action: Option<usize>) -> Result<()> {
        if let (Some(action), Some(agent)) = (action, self.env.agent_selection()) {
            if !self.env.action_space(agent.as_str())?.contains_action(action) {
                return Err(AleZooError::Validation(format!(
                    "action {action} is outside the action space of {agent}"
                )));
            }
        }
        self.env.step(action)
    }

    fn render(&mut self) -> Result<Option<Array3<u8>>> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }
}

/// Wrapper that refuses to step, observe or render before the first reset.
pub struct OrderEnforcing<E: AecEnv> {
    env: E,
    has_reset: bool,
}

impl<E: AecEnv> OrderEnforcing<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            has_reset: false,
        }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }

    fn ensure_reset(&self, operation: &str) -> Result<()> {
        if self.has_reset {
            Ok(())
        } else {
            Err(AleZooError::Validation(format!(
                "cannot call {operation} before reset"
            )))
        }
    }
}

impl<E: AecEnv> AecEnv for OrderEnforcing<E> {
    fn possible_agents(&self) -> &[AgentId] {
        self.env.possible_agents()
    }

    fn agents(&self) -> &[AgentId] {
        self.env.agents()
    }

    fn agent_selection(&self) -> Option<&AgentId> {
        self.env.agent_selection()
    }

    fn observation_space(&self, agent: &str) -> Result<DynSpace> {
        self.env.observation_space(agent)
    }

    fn action_space(&self, agent: &str) -> Result<DynSpace> {
        self.env.action_space(agent)
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<()> {
        self.env.reset(seed)?;
        self.has_reset = true;
        Ok(())
    }

    fn observe(&self, agent: &str) -> Result<Observation> {
        self.ensure_reset("observe")?;
        self.env.observe(agent)
    }

    fn last(&self) -> Result<LastStep> {
        self.ensure_reset("last")?;
        self.env.last()
    }

    fn step(&mut self, action: Option<usize>) -> Result<()> {
        self.ensure_reset("step")?;
        self.env.step(action)
    }

    fn render(&mut self) -> Result<Option<Array3<u8>>> {
        self.ensure_reset("render")?;
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }
}
