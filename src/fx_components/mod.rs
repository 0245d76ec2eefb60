// src/fx_components/mod.rs

pub mod gate;
pub mod pitch_shift;
pub mod reverb;

pub use gate::{Gate, Params as GateParams};
pub use pitch_shift::{Params as PitchShiftParams, PitchShifter, Quality};
pub use reverb::{Params as ReverbParams, Reverb};

/// A common interface for the chunk-based DSP units used by the effect rack.
///
/// `process_chunk` sees one cycle's chunk and writes the same number of
/// samples into `output`. Internal state (envelopes, delay lines) carries over
/// from one call to the next.
pub trait DspComponent: Send {
    fn process_chunk(&mut self, input: &[f32], output: &mut [f32]);

    /// Drops any internal state so the next chunk starts from silence.
    fn reset(&mut self);
}

/// Clamps every sample to the canonical `[-1.0, 1.0]` range.
#[inline]
pub fn clamp_chunk(buffer: &mut [f32]) {
    buffer.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));
}
