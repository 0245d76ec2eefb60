// src/looper.rs

//! Circular loop buffers and the store that owns them.
//!
//! Each loop holds `size` chunks of `chunk_size` samples in one flat buffer and
//! a playhead (`position`) counted in chunks. Loop ids are handed out from a
//! monotonic counter and never reused, so effect routings that still name a
//! deleted loop simply stop resolving.

use crate::error::{LooperError, Result};
use crate::mixer::MixerTrackState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoopId(pub u32);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allowed range for requested loop lengths, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min_seconds: f32,
    pub max_seconds: f32,
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self {
            min_seconds: 1.0,
            max_seconds: 10.0,
        }
    }
}

impl LengthBounds {
    fn clamp(&self, seconds: f32) -> f32 {
        seconds.clamp(self.min_seconds, self.max_seconds.max(self.min_seconds))
    }
}

#[derive(Debug, Clone)]
pub struct Loop {
    id: LoopId,
    audio: Vec<f32>,
    chunk_size: usize,
    size: usize,
    position: usize,
    pub mixer: MixerTrackState,
}

impl Loop {
    fn new(id: LoopId, size: usize, chunk_size: usize) -> Self {
        Self {
            id,
            audio: vec![0.0; size * chunk_size],
            chunk_size,
            size,
            position: 0,
            mixer: MixerTrackState::default(),
        }
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    /// Number of chunks in the loop.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the chunk that the next mix cycle reads.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn chunk(&self, index: usize) -> &[f32] {
        let start = index * self.chunk_size;
        &self.audio[start..start + self.chunk_size]
    }

    pub fn current_chunk(&self) -> &[f32] {
        self.chunk(self.position)
    }

    pub fn current_chunk_mut(&mut self) -> &mut [f32] {
        let start = self.position * self.chunk_size;
        &mut self.audio[start..start + self.chunk_size]
    }

    /// Writes `samples` into the current chunk, replacing it or adding to it.
    /// The stored result is always clamped to `[-1.0, 1.0]`.
    pub fn write_current(&mut self, samples: &[f32], overdub: bool) {
        let slot = self.current_chunk_mut();
        for (dst, &src) in slot.iter_mut().zip(samples) {
            let value = if overdub { *dst + src } else { src };
            *dst = value.clamp(-1.0, 1.0);
        }
    }

    pub(crate) fn advance(&mut self) {
        self.position = (self.position + 1) % self.size;
    }

    fn clear(&mut self) {
        self.audio.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Rebuilds the buffer at `new_size` chunks. Shrinking keeps the head of
    /// the loop; growing repeats the old content and ends with a partial tile.
    fn resize(&mut self, new_size: usize) {
        let old_len = self.audio.len();
        let new_len = new_size * self.chunk_size;
        let audio = if new_len <= old_len {
            self.audio[..new_len].to_vec()
        } else {
            self.audio.iter().copied().cycle().take(new_len).collect()
        };
        self.audio = audio;
        self.size = new_size;
        self.position = 0;
    }
}

#[derive(Debug)]
pub struct LoopStore {
    loops: BTreeMap<LoopId, Loop>,
    current: Option<LoopId>,
    next_id: u32,
    sample_rate: u32,
    chunk_size: usize,
    bounds: LengthBounds,
}

impl LoopStore {
    /// Creates a store with one loop per entry in `initial_lengths`. An empty
    /// list still produces a single loop of the minimum length.
    pub fn new(
        sample_rate: u32,
        chunk_size: usize,
        bounds: LengthBounds,
        initial_lengths: &[f32],
    ) -> Result<Self> {
        if chunk_size == 0 || sample_rate == 0 {
            return Err(LooperError::InvariantViolation(
                "sample rate and chunk size must be non-zero".to_string(),
            ));
        }
        let mut store = Self {
            loops: BTreeMap::new(),
            current: None,
            next_id: 0,
            sample_rate,
            chunk_size,
            bounds,
        };
        if initial_lengths.is_empty() {
            store.add_loop(bounds.min_seconds)?;
        }
        for &seconds in initial_lengths {
            store.add_loop(seconds)?;
        }
        Ok(store)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// `round(rate / chunk * seconds)` after clamping the length, never below one chunk.
    pub fn chunks_for(&self, seconds: f32) -> Result<usize> {
        if !seconds.is_finite() {
            return Err(LooperError::InvariantViolation(format!(
                "loop length must be finite, got {}",
                seconds
            )));
        }
        let seconds = self.bounds.clamp(seconds) as f64;
        let chunks = (self.sample_rate as f64 / self.chunk_size as f64 * seconds).round();
        Ok((chunks as usize).max(1))
    }

    pub fn seconds_for(&self, chunks: usize) -> f32 {
        (chunks * self.chunk_size) as f32 / self.sample_rate as f32
    }

    pub fn add_loop(&mut self, seconds: f32) -> Result<LoopId> {
        let size = self.chunks_for(seconds)?;
        let id = LoopId(self.next_id);
        self.next_id += 1;
        self.loops.insert(id, Loop::new(id, size, self.chunk_size));
        if self.current.is_none() {
            self.current = Some(id);
        }
        debug!(loop_id = %id, size, "added loop");
        Ok(id)
    }

    pub fn delete_loop(&mut self, id: LoopId) -> Result<()> {
        if !self.loops.contains_key(&id) {
            return Err(LooperError::UnknownLoop(id));
        }
        if self.loops.len() == 1 {
            return Err(LooperError::InvariantViolation(
                "cannot delete the last remaining loop".to_string(),
            ));
        }
        self.loops.remove(&id);
        if self.current == Some(id) {
            self.current = self.loops.keys().next().copied();
        }
        debug!(loop_id = %id, "deleted loop");
        Ok(())
    }

    pub fn update_length(&mut self, id: LoopId, seconds: f32) -> Result<()> {
        let new_size = self.chunks_for(seconds)?;
        let lp = self.loops.get_mut(&id).ok_or(LooperError::UnknownLoop(id))?;
        lp.resize(new_size);
        debug!(loop_id = %id, new_size, "resized loop");
        Ok(())
    }

    pub fn clear(&mut self, id: LoopId) -> Result<()> {
        self.get_mut(id)?.clear();
        Ok(())
    }

    pub fn set_mute(&mut self, id: LoopId, muted: bool) -> Result<()> {
        self.get_mut(id)?.mixer.is_muted = muted;
        Ok(())
    }

    pub fn set_solo(&mut self, id: LoopId, soloed: bool) -> Result<()> {
        self.get_mut(id)?.mixer.is_soloed = soloed;
        Ok(())
    }

    pub fn toggle_mute(&mut self, id: LoopId) -> Result<bool> {
        let mixer = &mut self.get_mut(id)?.mixer;
        mixer.is_muted = !mixer.is_muted;
        Ok(mixer.is_muted)
    }

    pub fn toggle_solo(&mut self, id: LoopId) -> Result<bool> {
        let mixer = &mut self.get_mut(id)?.mixer;
        mixer.is_soloed = !mixer.is_soloed;
        Ok(mixer.is_soloed)
    }

    pub fn select_current(&mut self, id: LoopId) -> Result<()> {
        if !self.loops.contains_key(&id) {
            return Err(LooperError::UnknownLoop(id));
        }
        self.current = Some(id);
        Ok(())
    }

    pub fn current(&self) -> Option<LoopId> {
        self.current
    }

    pub fn any_soloed(&self) -> bool {
        self.loops.values().any(|l| l.mixer.is_soloed)
    }

    pub fn is_audible(&self, id: LoopId) -> bool {
        let any_soloed = self.any_soloed();
        self.loops
            .get(&id)
            .is_some_and(|l| l.mixer.is_audible(any_soloed))
    }

    pub fn contains(&self, id: LoopId) -> bool {
        self.loops.contains_key(&id)
    }

    pub fn get(&self, id: LoopId) -> Result<&Loop> {
        self.loops.get(&id).ok_or(LooperError::UnknownLoop(id))
    }

    pub fn get_mut(&mut self, id: LoopId) -> Result<&mut Loop> {
        self.loops.get_mut(&id).ok_or(LooperError::UnknownLoop(id))
    }

    /// Loop ids in ascending order, which is also the mix order.
    pub fn ids(&self) -> Vec<LoopId> {
        self.loops.keys().copied().collect()
    }

    pub fn first_id(&self) -> Option<LoopId> {
        self.loops.keys().next().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Loop> {
        self.loops.values()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(lengths: &[f32]) -> LoopStore {
        LoopStore::new(44100, 512, LengthBounds::default(), lengths).unwrap()
    }

    #[test]
    fn initial_loops_use_rounded_size() {
        let s = store(&[2.0, 4.0, 8.0]);
        let sizes: Vec<usize> = s.iter().map(|l| l.size()).collect();
        // 44100 / 512 = 86.13...
        assert_eq!(sizes, vec![172, 345, 689]);
        assert_eq!(s.current(), Some(LoopId(0)));
    }

    #[test]
    fn empty_initial_list_still_has_one_loop() {
        let s = store(&[]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.current(), s.first_id());
    }

    #[test]
    fn lengths_are_clamped_into_bounds() {
        let s = store(&[2.0]);
        assert_eq!(s.chunks_for(0.01).unwrap(), s.chunks_for(1.0).unwrap());
        assert_eq!(s.chunks_for(60.0).unwrap(), s.chunks_for(10.0).unwrap());
        assert!(matches!(
            s.chunks_for(f32::NAN),
            Err(LooperError::InvariantViolation(_))
        ));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut s = store(&[2.0, 2.0]);
        let third = s.add_loop(2.0).unwrap();
        s.delete_loop(third).unwrap();
        let fourth = s.add_loop(2.0).unwrap();
        assert!(fourth > third);
    }

    #[test]
    fn deleting_last_loop_is_rejected() {
        let mut s = store(&[2.0]);
        let only = s.first_id().unwrap();
        let err = s.delete_loop(only).unwrap_err();
        assert!(matches!(err, LooperError::InvariantViolation(_)));
        assert_eq!(s.len(), 1);
        assert_eq!(s.current(), Some(only));
    }

    #[test]
    fn deleting_current_reassigns_target() {
        let mut s = store(&[2.0, 4.0]);
        s.select_current(LoopId(1)).unwrap();
        s.delete_loop(LoopId(1)).unwrap();
        assert_eq!(s.current(), Some(LoopId(0)));
    }

    #[test]
    fn unknown_loop_commands_are_rejected() {
        let mut s = store(&[2.0]);
        assert!(matches!(s.clear(LoopId(9)), Err(LooperError::UnknownLoop(_))));
        assert!(matches!(
            s.update_length(LoopId(9), 3.0),
            Err(LooperError::UnknownLoop(_))
        ));
        assert!(matches!(
            s.select_current(LoopId(9)),
            Err(LooperError::UnknownLoop(_))
        ));
    }

    #[test]
    fn shrinking_truncates_and_resets_position() {
        let mut s = store(&[2.0]);
        let id = s.first_id().unwrap();
        {
            let lp = s.get_mut(id).unwrap();
            for i in 0..lp.size() {
                let value = i as f32 / 1000.0;
                lp.current_chunk_mut().iter_mut().for_each(|x| *x = value);
                lp.advance();
            }
            lp.advance();
        }
        s.update_length(id, 1.0).unwrap();
        let lp = s.get(id).unwrap();
        assert_eq!(lp.size(), 86);
        assert_eq!(lp.position(), 0);
        assert_eq!(lp.chunk(85)[0], 85.0 / 1000.0);
    }

    #[test]
    fn clear_zeroes_without_resizing() {
        let mut s = store(&[2.0]);
        let id = s.first_id().unwrap();
        s.get_mut(id).unwrap().write_current(&[0.5; 512], false);
        s.clear(id).unwrap();
        let lp = s.get(id).unwrap();
        assert_eq!(lp.size(), 172);
        assert!(lp.current_chunk().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn overdub_write_accumulates_and_clamps() {
        let mut s = store(&[1.0]);
        let id = s.first_id().unwrap();
        let lp = s.get_mut(id).unwrap();
        lp.write_current(&[0.75; 512], false);
        lp.write_current(&[0.5; 512], true);
        assert!(lp.current_chunk().iter().all(|&x| x == 1.0));
        lp.write_current(&[-0.25; 512], false);
        assert!(lp.current_chunk().iter().all(|&x| x == -0.25));
    }

    #[test]
    fn solo_is_additive_and_overrides_mute() {
        let mut s = store(&[1.0, 1.0, 1.0]);
        s.set_mute(LoopId(0), true).unwrap();
        assert!(!s.is_audible(LoopId(0)));
        assert!(s.is_audible(LoopId(1)));

        s.set_solo(LoopId(0), true).unwrap();
        s.set_solo(LoopId(1), true).unwrap();
        assert!(s.is_audible(LoopId(0)));
        assert!(s.is_audible(LoopId(1)));
        assert!(!s.is_audible(LoopId(2)));

        s.set_solo(LoopId(0), false).unwrap();
        s.set_solo(LoopId(1), false).unwrap();
        assert!(!s.is_audible(LoopId(0)));
        assert!(s.is_audible(LoopId(2)));
    }
}
