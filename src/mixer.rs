use serde::{Deserialize, Serialize};

/// Per-loop mute/solo flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerTrackState {
    pub is_muted: bool,
    pub is_soloed: bool,
}

impl MixerTrackState {
    /// A track is audible iff nothing is soloed and it is unmuted, or
    /// something is soloed and it is one of the soloed tracks.
    #[inline]
    pub fn is_audible(&self, any_soloed: bool) -> bool {
        if any_soloed {
            self.is_soloed
        } else {
            !self.is_muted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_only_applies_without_solo() {
        let muted = MixerTrackState { is_muted: true, is_soloed: false };
        let plain = MixerTrackState::default();
        assert!(!muted.is_audible(false));
        assert!(plain.is_audible(false));
    }

    #[test]
    fn solo_overrides_mute() {
        let soloed_and_muted = MixerTrackState { is_muted: true, is_soloed: true };
        let plain = MixerTrackState::default();
        assert!(soloed_and_muted.is_audible(true));
        assert!(!plain.is_audible(true));
    }
}
