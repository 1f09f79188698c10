//! # ale-zoo
//!
//! Multi-agent Atari 2600 environments in Rust.
//!
//! ## Overview
//!
//! ale-zoo maps a single emulator instance onto a roster of agents:
//! - `ParallelAtariEnv` exposes the parallel API where every agent acts at once
//! - `ParallelToAec` converts any `ParallelEnv` into the agent-environment cycle
//! - `Emulator` is the narrow capability trait an emulator backend implements
//! - `games` registers ready-made game configurations such as Foozpong
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ale_zoo::prelude::*;
//! use ale_zoo_envs::MockAle;
//!
//! let config = games::FOOZPONG.config(2)?.with_max_cycles(500);
//! let mut env = games::parallel_env(MockAle::new(), config)?;
//! let (obs, _) = env.reset(Some(42))?;
//!
//! let actions = env.agents().into_iter().map(|a| (a, 0)).collect();
//! let result = env.step(&actions)?;
//! ```

pub mod agent;
pub mod config;
pub mod emulator;
pub mod env;
pub mod games;
pub mod render;
pub mod rom;
pub mod spaces;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::AgentId;
    pub use crate::config::{AtariConfig, EnvMetadata, ObsType, RenderMode};
    pub use crate::emulator::{Emulator, LoggerMode, NativeAction};
    pub use crate::env::{
        AecEnv, EnvInfo, LastStep, Observation, ParallelAtariEnv, ParallelEnv,
        ParallelStepResult, ParallelToAec, StateBuffer,
    };
    pub use crate::games;
    pub use crate::spaces::{Box as BoxSpace, Discrete, DynSpace, Space};
    pub use crate::{AleZooError, Result};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::path::PathBuf;

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum AleZooError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("ROM `{game}` not found, searched: {searched:?}")]
    ResourceNotFound {
        game: String,
        searched: Vec<PathBuf>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error(transparent)]
    Emulator(Box<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AleZooError {
    /// Wrap a backend failure so it reaches the caller unmodified
    pub fn emulator<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        AleZooError::Emulator(err.into())
    }
}

pub type Result<T> = core::result::Result<T, AleZooError>;
