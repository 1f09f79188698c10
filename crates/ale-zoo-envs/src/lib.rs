//! Emulator backends for ale-zoo.
//!
//! Provides a deterministic reference emulator for tests and demos:
//! - `MockAle` - paddle-and-ball console implementing `Emulator`
//! - `GameProfile` - per-ROM modes, action set, lives and scripted events

mod mock_ale;
mod profile;

pub use mock_ale::{logger_mode, MockAle, MockError, MockState};
pub use profile::{GameProfile, MAX_SLOTS};
