// src/fx_components/gate.rs

//! Noise gate driven by a linear attack/release envelope.
use crate::fx_components::DspComponent;
use serde::{Deserialize, Serialize};

/// Parameters for the Gate component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Absolute level above which the gate opens (0.0 to 1.0).
    pub threshold: f32,
    /// Time for the gain to ramp from 0 to 1, in milliseconds.
    pub attack_ms: f32,
    /// Time for the gain to ramp from 1 to 0, in milliseconds.
    pub release_ms: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            attack_ms: 10.0,
            release_ms: 100.0,
        }
    }
}

impl Params {
    pub fn clamped(self) -> Self {
        Self {
            threshold: self.threshold.clamp(0.0, 1.0),
            attack_ms: self.attack_ms.max(0.1),
            release_ms: self.release_ms.max(0.1),
        }
    }
}

/// The audio-thread state for the Gate component.
#[derive(Debug)]
pub struct Gate {
    params: Params,
    sample_rate: f32,
    gain: f32,
    attack_step: f32,
    release_step: f32,
}

impl Gate {
    pub fn new(sample_rate: f32, params: Params) -> Self {
        let mut gate = Self {
            params: params.clamped(),
            sample_rate,
            gain: 0.0,
            attack_step: 0.0,
            release_step: 0.0,
        };
        gate.update_steps();
        gate
    }

    pub fn params(&self) -> Params {
        self.params
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params.clamped();
        self.update_steps();
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.set_params(Params { threshold, ..self.params });
    }

    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        self.set_params(Params { attack_ms, ..self.params });
    }

    pub fn set_release_ms(&mut self, release_ms: f32) {
        self.set_params(Params { release_ms, ..self.params });
    }

    /// Current envelope gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Number of samples the gain needs to travel the full 0..1 range.
    #[inline]
    fn ms_to_samples(time_ms: f32, sample_rate: f32) -> f32 {
        (sample_rate * time_ms / 1000.0).max(1.0)
    }

    fn update_steps(&mut self) {
        self.attack_step = 1.0 / Self::ms_to_samples(self.params.attack_ms, self.sample_rate);
        self.release_step = 1.0 / Self::ms_to_samples(self.params.release_ms, self.sample_rate);
    }
}

impl DspComponent for Gate {
    fn process_chunk(&mut self, input: &[f32], output: &mut [f32]) {
        let threshold = self.params.threshold;
        for (out, &sample) in output.iter_mut().zip(input) {
            if sample.abs() > threshold {
                self.gain = (self.gain + self.attack_step).min(1.0);
            } else {
                self.gain = (self.gain - self.release_step).max(0.0);
            }
            *out = (sample * self.gain).clamp(-1.0, 1.0);
        }
    }

    fn reset(&mut self) {
        self.gain = 0.0;
    }
}
