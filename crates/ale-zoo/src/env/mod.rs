//! Environment traits and implementations.
//!
//! Provides the `ParallelEnv` and `AecEnv` traits, the Atari session adapter
//! that implements the former, the conversion to the latter, and the
//! protocol-checking wrappers.

mod aec;
mod parallel;
mod traits;
pub mod wrappers;

pub use aec::ParallelToAec;
pub use parallel::{ParallelAtariEnv, StateBuffer, RAM_SIZE};
pub use traits::{
    AecEnv, AgentMap, EnvInfo, LastStep, Observation, ParallelEnv, ParallelStepResult,
};
