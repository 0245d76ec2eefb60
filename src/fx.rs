// src/fx.rs

//! Effect identities and their loop routing.

use crate::looper::LoopId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of effects. `ORDER` is the order the rack runs them in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FxComponentType {
    Gate,
    PitchShift,
    Reverb,
}

impl FxComponentType {
    pub const ORDER: [FxComponentType; 3] = [
        FxComponentType::Gate,
        FxComponentType::PitchShift,
        FxComponentType::Reverb,
    ];

    pub fn index(self) -> usize {
        match self {
            FxComponentType::Gate => 0,
            FxComponentType::PitchShift => 1,
            FxComponentType::Reverb => 2,
        }
    }
}

impl fmt::Display for FxComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FxComponentType::Gate => write!(f, "Gate"),
            FxComponentType::PitchShift => write!(f, "Pitch Shift"),
            FxComponentType::Reverb => write!(f, "Reverb"),
        }
    }
}

impl FromStr for FxComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gate" => Ok(FxComponentType::Gate),
            "pitch" | "pitch_shift" | "pitchshift" => Ok(FxComponentType::PitchShift),
            "reverb" => Ok(FxComponentType::Reverb),
            other => Err(format!("unknown effect '{}'", other)),
        }
    }
}

/// Where an effect takes its input from and where its output goes.
///
/// Either loop may name a loop that no longer exists; the rack then skips
/// that half of the routing instead of failing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Routing {
    pub bypass: bool,
    pub input_loop: LoopId,
    pub output_loop: LoopId,
    /// Add the processed chunk onto the destination instead of replacing it.
    pub overdub: bool,
}

impl Routing {
    /// Bypassed, reading from and writing back to `loop_id`.
    pub fn bypassed_on(loop_id: LoopId) -> Self {
        Self {
            bypass: true,
            input_loop: loop_id,
            output_loop: loop_id,
            overdub: false,
        }
    }

    /// True when this effect is active and listens to `loop_id`.
    #[inline]
    pub fn claims(&self, loop_id: LoopId) -> bool {
        !self.bypass && self.input_loop == loop_id
    }

    pub fn is_self_routed(&self) -> bool {
        self.input_loop == self.output_loop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_gate_pitch_reverb() {
        let indices: Vec<usize> = FxComponentType::ORDER.iter().map(|k| k.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn bypassed_routing_claims_nothing() {
        let mut routing = Routing::bypassed_on(LoopId(3));
        assert!(!routing.claims(LoopId(3)));
        routing.bypass = false;
        assert!(routing.claims(LoopId(3)));
        assert!(!routing.claims(LoopId(4)));
        assert!(routing.is_self_routed());
    }

    #[test]
    fn effect_names_parse() {
        assert_eq!("Pitch".parse(), Ok(FxComponentType::PitchShift));
        assert_eq!("reverb".parse(), Ok(FxComponentType::Reverb));
        assert!("chorus".parse::<FxComponentType>().is_err());
    }
}
