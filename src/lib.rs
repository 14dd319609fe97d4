//! Real-time multi-tap delay engine.
//! effect : includes the effect contract, tap lists, and typed parameters.
//! delay : includes the multi-tap delay.
//! control : includes the lock-free control/audio split.
//! player : includes pull-based playback through a filter.
//! realtime : includes a callback-driven stream driver.
//! ffi : includes the C ABI.

//! # License
//! The library is offered under GPLv3.0 license.

/// includes engine error types.
pub mod error;
/// includes circular history buffer.
pub mod buffer;
/// includes effect trait, tap list and parameters.
pub mod effect;
/// includes multi-tap delay.
pub mod delay;
/// includes serializable delay presets.
pub mod config;
/// includes command queue between control and audio threads.
pub mod control;
/// includes pull-based player and transport.
pub mod player;
/// includes stream driver.
#[cfg(feature = "realtime")]
pub mod realtime;
/// includes C ABI.
pub mod ffi;

pub use delay::MultiTapDelay;
pub use effect::{Effect, Parameter, TapList};
pub use error::{EngineError, EngineResult};
