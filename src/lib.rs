//! A live multi-track audio looper.
//!
//! Loops are circular buffers of fixed-width chunks. A capture callback
//! records into the current loop, a playback thread mixes every audible loop
//! (optionally through a gate, a pitch shifter and a reverb routed between
//! loops) and feeds the output device, and a control surface issues commands
//! through [`audio_engine::EngineHandle`].

pub mod audio_device;
pub mod audio_engine;
pub mod audio_io;
pub mod error;
pub mod fx;
pub mod fx_components;
pub mod looper;
pub mod mixer;
pub mod settings;

pub use audio_engine::{AudioEngine, EngineConfig, EngineHandle, EngineSnapshot};
pub use error::{LooperError, Result};
pub use fx::{FxComponentType, Routing};
pub use looper::{LoopId, LoopStore};
