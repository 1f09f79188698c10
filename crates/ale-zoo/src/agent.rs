//! Agent identities and the fixed roster built from them.

use crate::{AleZooError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Role names, one per emulator player slot.
pub const PLAYER_NAMES: [&str; 4] = ["first", "second", "third", "fourth"];

/// Maximum number of players an Atari roster can hold
pub const MAX_PLAYERS: usize = PLAYER_NAMES.len();

/// Opaque agent identity such as `first_0`.
///
/// The identity-to-slot mapping is positional: the n-th agent of a roster
/// always drives emulator slot n.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an identity from any string token
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity of the player occupying `slot`
    pub fn for_slot(slot: usize) -> Result<Self> {
        PLAYER_NAMES
            .get(slot)
            .map(|name| Self(format!("{name}_0")))
            .ok_or_else(|| {
                AleZooError::Configuration(format!(
                    "slot {slot} exceeds the {MAX_PLAYERS} supported players"
                ))
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Build the ordered roster for `num_players` slots
pub fn roster(num_players: usize) -> Result<Vec<AgentId>> {
    if num_players == 0 {
        return Err(AleZooError::Configuration(
            "num_players must be at least 1".into(),
        ));
    }
    (0..num_players).map(AgentId::for_slot).collect()
}
