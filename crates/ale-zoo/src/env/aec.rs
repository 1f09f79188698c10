//! Agent-environment cycle on top of a parallel environment.

use super::{AecEnv, AgentMap, EnvInfo, LastStep, Observation, ParallelEnv};
use crate::agent::AgentId;
use crate::spaces::DynSpace;
use crate::{AleZooError, Result};
use ndarray::Array3;

/// Cycles through a fixed agent order
#[derive(Clone, Debug, Default)]
struct AgentSelector {
    order: Vec<AgentId>,
    /// Index of the selected agent
    pos: usize,
}

impl AgentSelector {
    fn reinit(&mut self, order: Vec<AgentId>) -> Option<AgentId> {
        self.order = order;
        self.pos = 0;
        self.order.first().cloned()
    }

    fn next(&mut self) -> Option<AgentId> {
        if self.order.is_empty() {
            return None;
        }
        self.pos = (self.pos + 1) % self.order.len();
        Some(self.order[self.pos].clone())
    }

    fn is_first(&self) -> bool {
        self.pos == 0
    }

    fn is_last(&self) -> bool {
        self.pos + 1 == self.order.len()
    }
}

/// Presents a [`ParallelEnv`] as an [`AecEnv`].
///
/// Actions are buffered until the last live agent of the cycle acts, then
/// the parallel env is stepped once with all of them. Agents that ended in
/// that step are surfaced first and must be stepped with `None` to leave.
pub struct ParallelToAec<P: ParallelEnv> {
    env: P,
    agents: Vec<AgentId>,
    selector: AgentSelector,
    agent_selection: Option<AgentId>,
    /// Live agent to return to once every dead agent has been stepped
    skip_agent_selection: Option<AgentId>,
    pending: AgentMap<usize>,
    observations: AgentMap<Observation>,
    rewards: AgentMap<f32>,
    cumulative_rewards: AgentMap<f32>,
    terminations: AgentMap<bool>,
    truncations: AgentMap<bool>,
    infos: AgentMap<EnvInfo>,
}

impl<P: ParallelEnv> ParallelToAec<P> {
    pub fn new(env: P) -> Self {
        Self {
            env,
            agents: Vec::new(),
            selector: AgentSelector::default(),
            agent_selection: None,
            skip_agent_selection: None,
            pending: AgentMap::new(),
            observations: AgentMap::new(),
            rewards: AgentMap::new(),
            cumulative_rewards: AgentMap::new(),
            terminations: AgentMap::new(),
            truncations: AgentMap::new(),
            infos: AgentMap::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.env
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.env
    }

    pub fn into_inner(self) -> P {
        self.env
    }

    /// Reward of the latest parallel step for every listed agent
    pub fn rewards(&self) -> &AgentMap<f32> {
        &self.rewards
    }

    fn is_dead(&self, agent: &AgentId) -> bool {
        self.terminations.get(agent).copied().unwrap_or(false)
            || self.truncations.get(agent).copied().unwrap_or(false)
    }

    fn first_dead(&self) -> Option<AgentId> {
        self.agents.iter().find(|a| self.is_dead(a)).cloned()
    }

    fn clear_rewards(&mut self) {
        self.rewards.values_mut().for_each(|r| *r = 0.0);
    }

    fn deads_step_first(&mut self) {
        if let Some(dead) = self.first_dead() {
            self.skip_agent_selection = self.agent_selection.take();
            self.agent_selection = Some(dead);
        }
    }

    fn was_dead_step(&mut self, agent: &AgentId) {
        self.terminations.remove(agent);
        self.truncations.remove(agent);
        self.rewards.remove(agent);
        self.cumulative_rewards.remove(agent);
        self.infos.remove(agent);
        self.agents.retain(|a| a != agent);

        match self.first_dead() {
            Some(dead) => {
                if self.skip_agent_selection.is_none() {
                    self.skip_agent_selection = self.agent_selection.take();
                }
                self.agent_selection = Some(dead);
            }
            None => {
                if let Some(skipped) = self.skip_agent_selection.take() {
                    self.agent_selection = Some(skipped);
                }
            }
        }
        if self.agents.is_empty() {
            self.agent_selection = None;
        }
        self.clear_rewards();
    }

    fn selected(&self) -> Result<&AgentId> {
        self.agent_selection
            .as_ref()
            .ok_or_else(|| AleZooError::Validation("no agent selected, episode is over".into()))
    }

    fn lookup<'a, T>(map: &'a AgentMap<T>, agent: &str) -> Result<&'a T> {
        map.get(agent)
            .ok_or_else(|| AleZooError::UnknownAgent(agent.to_string()))
    }
}

impl<P: ParallelEnv> AecEnv for ParallelToAec<P> {
    fn possible_agents(&self) -> &[AgentId] {
        self.env.possible_agents()
    }

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn agent_selection(&self) -> Option<&AgentId> {
        self.agent_selection.as_ref()
    }

    fn observation_space(&self, agent: &str) -> Result<DynSpace> {
        self.env.observation_space(agent)
    }

    fn action_space(&self, agent: &str) -> Result<DynSpace> {
        self.env.action_space(agent)
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<()> {
        let (observations, infos) = self.env.reset(seed)?;
        self.agents = self.env.agents();
        self.agent_selection = self.selector.reinit(self.agents.clone());
        self.skip_agent_selection = None;
        self.pending.clear();
        self.observations = observations;
        self.infos = infos;
        self.rewards = self.agents.iter().map(|a| (a.clone(), 0.0)).collect();
        self.cumulative_rewards = self.rewards.clone();
        self.terminations = self.agents.iter().map(|a| (a.clone(), false)).collect();
        self.truncations = self.terminations.clone();
        Ok(())
    }

    fn observe(&self, agent: &str) -> Result<Observation> {
        Self::lookup(&self.observations, agent).cloned()
    }

    fn last(&self) -> Result<LastStep> {
        let agent = self.selected()?.as_str();
        Ok(LastStep {
            observation: self.observe(agent)?,
            reward: *Self::lookup(&self.cumulative_rewards, agent)?,
            terminated: *Self::lookup(&self.terminations, agent)?,
            truncated: *Self::lookup(&self.truncations, agent)?,
            info: Self::lookup(&self.infos, agent)?.clone(),
        })
    }

    fn step(&mut self, action: Option<usize>) -> Result<()> {
        let agent = self.selected()?.clone();

        if self.is_dead(&agent) {
            if action.is_some() {
                return Err(AleZooError::Validation(format!(
                    "{agent} is done, step it with no action"
                )));
            }
            self.pending.remove(&agent);
            self.was_dead_step(&agent);
            return Ok(());
        }

        let action = action.ok_or_else(|| {
            AleZooError::Validation(format!("{agent} is still live and must act"))
        })?;
        self.pending.insert(agent, action);

        if self.selector.is_last() {
            let result = self.env.step(&self.pending)?;
            self.pending.clear();

            let live = self.env.agents();
            let mut newly_done: Vec<AgentId> = result
                .observations
                .keys()
                .filter(|a| !live.contains(*a))
                .cloned()
                .collect();
            newly_done.sort();

            self.observations = result.observations;
            self.terminations = result.terminations;
            self.truncations = result.truncations;
            self.infos = result.infos;
            self.cumulative_rewards = result.rewards.clone();
            self.rewards = result.rewards;

            self.agents = live.iter().cloned().chain(newly_done).collect();
            if !live.is_empty() {
                self.agent_selection = self.selector.reinit(live);
            }
            self.deads_step_first();
        } else {
            if self.selector.is_first() {
                self.clear_rewards();
            }
            self.agent_selection = self.selector.next();
        }
        Ok(())
    }

    fn render(&mut self) -> Result<Option<Array3<u8>>> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close();
    }
}
