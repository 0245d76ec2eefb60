// src/fx_components/pitch_shift.rs

//! Resampling pitch shifter.
//!
//! Each chunk is resampled by the rational factor `round(100 * r) : 100`
//! with `r = 2^(-semitones / 12)` and then cut or zero-padded back to the
//! chunk length. When `r < 1` the chunk is first smoothed with a short FIR
//! to keep the decimation from aliasing. Any resampler failure degrades to
//! passing the chunk through untouched.

use crate::fx_components::DspComponent;
use anyhow::{anyhow, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MAX_SEMITONES: f32 = 24.0;
const RATIO_DENOMINATOR: usize = 100;
const OVERSAMPLING_FACTOR: usize = 256;
const ANTI_ALIAS_KERNEL: [f32; 7] = [0.05, 0.1, 0.2, 0.3, 0.2, 0.1, 0.05];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Length of the windowed-sinc kernel.
    pub fn window_size(self) -> usize {
        match self {
            Quality::Low => 64,
            Quality::Medium => 128,
            Quality::High => 256,
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Shift in semitones, -24 to +24. Zero is an exact passthrough.
    pub semitones: f32,
    pub quality: Quality,
    /// Amount of the destination's previous content mixed back in when the
    /// shifter writes onto its own input loop (0.0 to 0.99).
    pub feedback: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            semitones: 0.0,
            quality: Quality::Medium,
            feedback: 0.0,
        }
    }
}

impl Params {
    pub fn clamped(self) -> Self {
        Self {
            semitones: self.semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES),
            quality: self.quality,
            feedback: self.feedback.clamp(0.0, 0.99),
        }
    }

    /// Numerator of the `up : 100` resampling factor.
    pub fn ratio_numerator(&self) -> usize {
        let ratio = 2f64.powf(-self.semitones as f64 / 12.0);
        ((RATIO_DENOMINATOR as f64 * ratio).round() as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResamplerKey {
    up: usize,
    quality: Quality,
    chunk_len: usize,
}

pub struct PitchShifter {
    params: Params,
    resampler: Option<(ResamplerKey, SincFixedIn<f32>)>,
    filtered: Vec<f32>,
    /// Output of one resampler call.
    frames: Vec<f32>,
    /// Chunk output plus the flushed tail, before delay alignment.
    resampled: Vec<f32>,
    failing: bool,
}

impl std::fmt::Debug for PitchShifter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PitchShifter")
            .field("params", &self.params)
            .field("failing", &self.failing)
            .finish()
    }
}

impl PitchShifter {
    pub fn new(params: Params) -> Self {
        Self {
            params: params.clamped(),
            resampler: None,
            filtered: Vec::new(),
            frames: Vec::new(),
            resampled: Vec::new(),
            failing: false,
        }
    }

    pub fn params(&self) -> Params {
        self.params
    }

    pub fn feedback(&self) -> f32 {
        self.params.feedback
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params.clamped();
    }

    pub fn set_semitones(&mut self, semitones: f32) {
        self.set_params(Params { semitones, ..self.params });
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.set_params(Params { quality, ..self.params });
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.set_params(Params { feedback, ..self.params });
    }

    /// 7-tap smoothing with "same"-length output, centred on each sample.
    fn anti_alias(input: &[f32], output: &mut Vec<f32>) {
        let half = ANTI_ALIAS_KERNEL.len() / 2;
        output.clear();
        output.extend((0..input.len()).map(|i| {
            ANTI_ALIAS_KERNEL
                .iter()
                .enumerate()
                .filter_map(|(k, &coeff)| {
                    (i + half)
                        .checked_sub(k)
                        .and_then(|j| input.get(j))
                        .map(|&x| x * coeff)
                })
                .sum::<f32>()
        }));
    }

    /// Rebuilds the resampler when the ratio, quality or chunk length changed,
    /// and sizes the scratch buffers for it.
    fn ensure_resampler(&mut self, up: usize, chunk_len: usize) -> Result<()> {
        let key = ResamplerKey {
            up,
            quality: self.params.quality,
            chunk_len,
        };
        if self.resampler.as_ref().is_some_and(|(k, _)| *k == key) {
            return Ok(());
        }
        let params = SincInterpolationParameters {
            sinc_len: key.quality.window_size(),
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: OVERSAMPLING_FACTOR,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = up as f64 / RATIO_DENOMINATOR as f64;
        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_len, 1)?;
        let max_frames = resampler.output_frames_max();
        self.frames.resize(max_frames, 0.0);
        self.resampled.clear();
        self.resampled.reserve(2 * max_frames);
        debug!(up, quality = ?key.quality, chunk_len, "built pitch resampler");
        self.resampler = Some((key, resampler));
        Ok(())
    }

    fn shift(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        let up = self.params.ratio_numerator();
        self.ensure_resampler(up, input.len())?;

        let source: &[f32] = if up < RATIO_DENOMINATOR {
            Self::anti_alias(input, &mut self.filtered);
            &self.filtered
        } else {
            input
        };
        let Some((_, resampler)) = self.resampler.as_mut() else {
            return Err(anyhow!("resampler unavailable"));
        };

        resampler.reset();
        let delay = resampler.output_delay();
        let (_, written) =
            resampler.process_into_buffer(&[source], &mut [&mut self.frames[..]], None)?;
        self.resampled.clear();
        self.resampled.extend_from_slice(&self.frames[..written]);
        // flush the kernel so the delayed tail of this chunk comes out too
        let (_, flushed) = resampler.process_partial_into_buffer(
            None::<&[&[f32]]>,
            &mut [&mut self.frames[..]],
            None,
        )?;
        self.resampled.extend_from_slice(&self.frames[..flushed]);

        if self.resampled.iter().any(|s| !s.is_finite()) {
            return Err(anyhow!("resampler produced non-finite samples"));
        }

        let aligned = self.resampled.get(delay..).unwrap_or(&[]);
        let copied = aligned.len().min(output.len());
        output[..copied].copy_from_slice(&aligned[..copied]);
        output[copied..].iter_mut().for_each(|s| *s = 0.0);
        output.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));
        Ok(())
    }
}

impl DspComponent for PitchShifter {
    fn process_chunk(&mut self, input: &[f32], output: &mut [f32]) {
        if self.params.semitones == 0.0 || input.is_empty() {
            output.copy_from_slice(input);
            return;
        }
        match self.shift(input, output) {
            Ok(()) => self.failing = false,
            Err(e) => {
                if !self.failing {
                    warn!("pitch shift failed, passing chunk through: {}", e);
                }
                self.failing = true;
                output.copy_from_slice(input);
            }
        }
    }

    fn reset(&mut self) {
        if let Some((_, resampler)) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.failing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / rate).sin() * 0.5)
            .collect()
    }

    #[test]
    fn zero_semitones_is_identity() {
        let mut shifter = PitchShifter::new(Params::default());
        let input = sine(512, 440.0, 44100.0);
        let mut out = vec![0.0; 512];
        shifter.process_chunk(&input, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn ratio_uses_rounded_hundredths() {
        let p = |semitones| Params { semitones, ..Params::default() };
        assert_eq!(p(0.0).ratio_numerator(), 100);
        assert_eq!(p(12.0).ratio_numerator(), 50);
        assert_eq!(p(-12.0).ratio_numerator(), 200);
        // 2^(-1/12) = 0.9439 -> 94
        assert_eq!(p(1.0).ratio_numerator(), 94);
        assert_eq!(p(99.0).clamped().ratio_numerator(), 25);
    }

    #[test]
    fn octave_up_fills_half_the_chunk() {
        let mut shifter = PitchShifter::new(Params {
            semitones: 12.0,
            ..Params::default()
        });
        let input = vec![0.5; 512];
        let mut out = vec![0.0; 512];
        shifter.process_chunk(&input, &mut out);

        assert_eq!(out.len(), 512);
        let head: f32 = out[64..192].iter().sum::<f32>() / 128.0;
        assert!((head - 0.5).abs() < 0.05, "head mean {}", head);
        assert!(out[420..].iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn octave_down_keeps_chunk_length() {
        let mut shifter = PitchShifter::new(Params {
            semitones: -12.0,
            quality: Quality::Low,
            ..Params::default()
        });
        let input = sine(256, 1000.0, 44100.0);
        let mut out = vec![0.0; 256];
        shifter.process_chunk(&input, &mut out);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn repeated_chunks_reuse_the_resampler_buffers() {
        let mut shifter = PitchShifter::new(Params {
            semitones: 5.0,
            quality: Quality::Low,
            ..Params::default()
        });
        let input = sine(256, 440.0, 44100.0);
        let mut first = vec![0.0; 256];
        shifter.process_chunk(&input, &mut first);
        let frames_capacity = shifter.frames.capacity();
        let resampled_capacity = shifter.resampled.capacity();

        let mut again = vec![0.0; 256];
        for _ in 0..4 {
            shifter.process_chunk(&input, &mut again);
            assert_eq!(again, first);
        }
        assert_eq!(shifter.frames.capacity(), frames_capacity);
        assert_eq!(shifter.resampled.capacity(), resampled_capacity);
    }

    #[test]
    fn anti_alias_matches_centred_convolution() {
        let mut impulse = vec![0.0; 9];
        impulse[4] = 1.0;
        let mut out = Vec::new();
        PitchShifter::anti_alias(&impulse, &mut out);
        assert_eq!(out.len(), 9);
        assert_eq!(&out[1..8], &ANTI_ALIAS_KERNEL[..]);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn parameters_are_clamped() {
        let shifter = PitchShifter::new(Params {
            semitones: -40.0,
            quality: Quality::High,
            feedback: 2.0,
        });
        assert_eq!(shifter.params().semitones, -24.0);
        assert_eq!(shifter.feedback(), 0.99);
    }

    #[test]
    fn quality_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Quality>(), Ok(Quality::High));
        assert!("ultra".parse::<Quality>().is_err());
    }
}
