// src/audio_engine.rs

//! The looper engine.
//!
//! All mutable state (loops, effect rack, capture flags, session recording)
//! lives in one [`EngineState`] behind a single mutex. The capture callback,
//! the playback thread and control commands each take that lock for the
//! length of one chunk of work or one mutation, and never do I/O while
//! holding it.

pub mod command;
pub mod fx_rack;
pub mod helpers;
pub mod recording;

use crate::audio_io::AudioBackend;
use crate::error::{LooperError, Result};
use crate::fx::{FxComponentType, Routing};
use crate::fx_components::{
    clamp_chunk, Gate, GateParams, PitchShiftParams, PitchShifter, Quality, Reverb, ReverbParams,
};
use crate::looper::{LengthBounds, LoopId, LoopStore};
use fx_rack::{EffectUnit, FxRack};
use helpers::SessionWriter;
use parking_lot::Mutex;
use recording::RecordingSession;
use ringbuf::{HeapProducer, HeapRb};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PLAYBACK_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to build an engine without touching the filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub initial_loop_lengths: Vec<f32>,
    pub length_bounds: LengthBounds,
    pub ring_buffer_chunks: usize,
    pub gate: GateParams,
    pub pitch_shift: PitchShiftParams,
    pub reverb: ReverbParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            chunk_size: 512,
            initial_loop_lengths: vec![2.0, 4.0, 8.0],
            length_bounds: LengthBounds::default(),
            ring_buffer_chunks: 4,
            gate: GateParams::default(),
            pitch_shift: PitchShiftParams::default(),
            reverb: ReverbParams::default(),
        }
    }
}

/// The lock-protected engine state.
#[derive(Debug)]
pub struct EngineState {
    pub store: LoopStore,
    pub rack: FxRack,
    pub session: RecordingSession,
    /// Live capture into the current loop.
    pub recording_enabled: bool,
    /// Captured chunks are added onto the loop instead of replacing it.
    pub overdub_enabled: bool,
    mix_slots: Vec<MixSlot>,
    /// One chunk per loop, copied before any effect writes in the cycle.
    dry: Vec<f32>,
    master: Vec<f32>,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let store = LoopStore::new(
            config.sample_rate,
            config.chunk_size,
            config.length_bounds,
            &config.initial_loop_lengths,
        )?;
        let routed_loop = store.first_id().unwrap_or(LoopId(0));
        let rack = FxRack::new(
            config.sample_rate as f32,
            config.chunk_size,
            routed_loop,
            config.gate,
            config.pitch_shift,
            config.reverb,
        );
        Ok(Self {
            store,
            rack,
            session: RecordingSession::default(),
            recording_enabled: false,
            overdub_enabled: false,
            mix_slots: Vec::with_capacity(config.initial_loop_lengths.len().max(1)),
            dry: Vec::with_capacity(config.chunk_size * config.initial_loop_lengths.len().max(1)),
            master: vec![0.0; config.chunk_size],
        })
    }

    /// Writes a captured chunk into the current loop's current slot. The
    /// position is left alone; the next mix cycle reads this slot.
    pub fn capture(&mut self, chunk: &[f32]) {
        if !self.recording_enabled {
            return;
        }
        let Some(id) = self.store.current() else {
            return;
        };
        if let Ok(target) = self.store.get_mut(id) {
            target.write_current(chunk, self.overdub_enabled);
        }
    }

    /// Produces one master chunk and advances every loop by one chunk.
    ///
    /// The cycle runs in two passes. The first copies every audible loop's
    /// current chunk and runs the effect rack on it, so all routed writes
    /// land in their destinations' current slots whatever the id order. The
    /// second mixes the loops that kept their place in the mix and advances
    /// every loop. Inaudible loops skip effects and the mix but still advance,
    /// so all loops keep `position == cycles % size`.
    pub fn mix_cycle(&mut self) -> &[f32] {
        let chunk = self.store.chunk_size();
        let any_soloed = self.store.any_soloed();

        self.mix_slots.clear();
        self.mix_slots.extend(self.store.iter().map(|lp| MixSlot {
            id: lp.id(),
            audible: lp.mixer.is_audible(any_soloed),
            in_mix: false,
        }));

        self.dry.resize(self.mix_slots.len() * chunk, 0.0);
        for (slot, dry) in self.mix_slots.iter().zip(self.dry.chunks_exact_mut(chunk)) {
            if !slot.audible {
                continue;
            }
            if let Ok(lp) = self.store.get(slot.id) {
                dry.copy_from_slice(lp.current_chunk());
            }
        }

        for (slot, dry) in self.mix_slots.iter_mut().zip(self.dry.chunks_exact(chunk)) {
            slot.in_mix =
                slot.audible && self.rack.process_loop(slot.id, dry, &mut self.store).keeps_dry();
        }

        self.master.clear();
        self.master.resize(chunk, 0.0);
        for slot in &self.mix_slots {
            if let Ok(lp) = self.store.get_mut(slot.id) {
                if slot.in_mix {
                    for (m, &s) in self.master.iter_mut().zip(lp.current_chunk()) {
                        *m += s;
                    }
                }
                lp.advance();
            }
        }

        clamp_chunk(&mut self.master);
        self.session.append(&self.master);
        &self.master
    }
}

/// Per-loop bookkeeping for one mix cycle.
#[derive(Debug, Clone, Copy)]
struct MixSlot {
    id: LoopId,
    audible: bool,
    in_mix: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopSnapshot {
    pub id: LoopId,
    pub size: usize,
    pub position: usize,
    pub seconds: f32,
    pub muted: bool,
    pub soloed: bool,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectParams {
    Gate(GateParams),
    PitchShift(PitchShiftParams),
    Reverb(ReverbParams),
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectSnapshot {
    pub kind: FxComponentType,
    pub routing: Routing,
    pub params: EffectParams,
}

/// A read-only view of the engine for control surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub running: bool,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub loops: Vec<LoopSnapshot>,
    pub recording_enabled: bool,
    pub overdub_enabled: bool,
    pub session_active: bool,
    pub session_samples: usize,
    pub effects: Vec<EffectSnapshot>,
    pub xruns: usize,
}

struct Shared {
    state: Mutex<EngineState>,
    running: AtomicBool,
    xrun_count: Arc<AtomicUsize>,
    sample_rate: u32,
    chunk_size: usize,
}

/// Cheap, clonable command/query surface over the shared engine state.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let state = EngineState::new(config)?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                running: AtomicBool::new(false),
                xrun_count: Arc::new(AtomicUsize::new(0)),
                sample_rate: config.sample_rate,
                chunk_size: config.chunk_size,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn xrun_counter(&self) -> Arc<AtomicUsize> {
        self.shared.xrun_count.clone()
    }

    /// Runs `f` with the engine lock held.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.shared.state.lock();
        f(&mut state)
    }

    // --- Real-time entry points ---

    pub fn capture(&self, chunk: &[f32]) {
        self.shared.state.lock().capture(chunk);
    }

    pub fn mix_cycle(&self) -> Vec<f32> {
        self.shared.state.lock().mix_cycle().to_vec()
    }

    /// Runs one mix cycle and copies the master chunk into `out`, reusing
    /// its allocation.
    pub fn mix_into(&self, out: &mut Vec<f32>) {
        let mut state = self.shared.state.lock();
        out.clear();
        out.extend_from_slice(state.mix_cycle());
    }

    /// Runs `cycles` mix cycles without any hardware and returns the
    /// concatenated master output.
    pub fn render_cycles(&self, cycles: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(cycles * self.chunk_size());
        for _ in 0..cycles {
            out.extend_from_slice(self.shared.state.lock().mix_cycle());
        }
        out
    }

    // --- Loop commands ---

    pub fn add_loop(&self, seconds: f32) -> Result<LoopId> {
        self.with_state(|s| s.store.add_loop(seconds))
    }

    pub fn delete_loop(&self, id: LoopId) -> Result<()> {
        self.with_state(|s| s.store.delete_loop(id))
    }

    pub fn update_loop_length(&self, id: LoopId, seconds: f32) -> Result<()> {
        self.with_state(|s| s.store.update_length(id, seconds))
    }

    pub fn clear_loop(&self, id: LoopId) -> Result<()> {
        self.with_state(|s| s.store.clear(id))
    }

    pub fn set_mute(&self, id: LoopId, muted: bool) -> Result<()> {
        self.with_state(|s| s.store.set_mute(id, muted))
    }

    pub fn set_solo(&self, id: LoopId, soloed: bool) -> Result<()> {
        self.with_state(|s| s.store.set_solo(id, soloed))
    }

    pub fn toggle_mute(&self, id: LoopId) -> Result<bool> {
        self.with_state(|s| s.store.toggle_mute(id))
    }

    pub fn toggle_solo(&self, id: LoopId) -> Result<bool> {
        self.with_state(|s| s.store.toggle_solo(id))
    }

    pub fn select_current_loop(&self, id: LoopId) -> Result<()> {
        self.with_state(|s| s.store.select_current(id))
    }

    pub fn loop_ids(&self) -> Vec<LoopId> {
        self.with_state(|s| s.store.ids())
    }

    pub fn current_loop(&self) -> Option<LoopId> {
        self.with_state(|s| s.store.current())
    }

    // --- Live capture ---

    pub fn set_recording_enabled(&self, enabled: bool) {
        self.with_state(|s| s.recording_enabled = enabled);
    }

    pub fn set_overdub_enabled(&self, enabled: bool) {
        self.with_state(|s| s.overdub_enabled = enabled);
    }

    pub fn toggle_recording(&self) -> bool {
        self.with_state(|s| {
            s.recording_enabled = !s.recording_enabled;
            s.recording_enabled
        })
    }

    pub fn toggle_overdub(&self) -> bool {
        self.with_state(|s| {
            s.overdub_enabled = !s.overdub_enabled;
            s.overdub_enabled
        })
    }

    // --- Session recording ---

    pub fn start_session(&self) {
        self.with_state(|s| s.session.start());
        info!("Session recording started");
    }

    pub fn stop_session(&self) {
        let (samples, cycles) = self.with_state(|s| {
            s.session.stop();
            (s.session.samples().len(), s.session.cycles())
        });
        info!(samples, cycles, "Session recording stopped");
    }

    pub fn session_len(&self) -> usize {
        self.with_state(|s| s.session.samples().len())
    }

    /// Copies the accumulated session out under the lock, then encodes it
    /// with `writer` after the lock is released.
    pub fn save_session(&self, path: &Path, writer: &dyn SessionWriter) -> Result<()> {
        let samples = self.with_state(|s| {
            if s.session.is_empty() {
                None
            } else {
                Some(s.session.samples().to_vec())
            }
        });
        let samples = samples.ok_or(LooperError::EmptyRecording)?;
        writer.write_session(&samples, self.sample_rate(), path)?;
        info!("Saved session ({} samples) to {}", samples.len(), path.display());
        Ok(())
    }

    // --- Effect routing ---

    pub fn routing(&self, kind: FxComponentType) -> Routing {
        self.with_state(|s| s.rack.slot(kind).routing)
    }

    fn update_routing(&self, kind: FxComponentType, f: impl FnOnce(&mut Routing)) {
        self.with_state(|s| f(&mut s.rack.slot_mut(kind).routing));
    }

    pub fn set_bypass(&self, kind: FxComponentType, bypass: bool) {
        self.update_routing(kind, |r| r.bypass = bypass);
    }

    pub fn toggle_bypass(&self, kind: FxComponentType) -> bool {
        self.with_state(|s| {
            let routing = &mut s.rack.slot_mut(kind).routing;
            routing.bypass = !routing.bypass;
            routing.bypass
        })
    }

    pub fn set_effect_overdub(&self, kind: FxComponentType, overdub: bool) {
        self.update_routing(kind, |r| r.overdub = overdub);
    }

    /// Any id is accepted; a loop that does not exist just makes the route inert.
    pub fn set_input_loop(&self, kind: FxComponentType, id: LoopId) {
        self.update_routing(kind, |r| r.input_loop = id);
    }

    pub fn set_output_loop(&self, kind: FxComponentType, id: LoopId) {
        self.update_routing(kind, |r| r.output_loop = id);
    }

    /// Clears an effect's internal state (envelope, delay line, resampler).
    pub fn reset_effect(&self, kind: FxComponentType) {
        self.with_state(|s| s.rack.slot_mut(kind).unit.reset());
    }

    // --- Effect parameters ---

    fn with_gate(&self, f: impl FnOnce(&mut Gate)) {
        self.with_state(|s| {
            if let Some(g) = s.rack.gate_mut() {
                f(g);
            }
        });
    }

    fn with_pitch_shift(&self, f: impl FnOnce(&mut PitchShifter)) {
        self.with_state(|s| {
            if let Some(p) = s.rack.pitch_shift_mut() {
                f(p);
            }
        });
    }

    fn with_reverb(&self, f: impl FnOnce(&mut Reverb)) {
        self.with_state(|s| {
            if let Some(r) = s.rack.reverb_mut() {
                f(r);
            }
        });
    }

    pub fn set_gate_threshold(&self, threshold: f32) {
        self.with_gate(|g| g.set_threshold(threshold));
    }

    pub fn set_gate_attack_ms(&self, attack_ms: f32) {
        self.with_gate(|g| g.set_attack_ms(attack_ms));
    }

    pub fn set_gate_release_ms(&self, release_ms: f32) {
        self.with_gate(|g| g.set_release_ms(release_ms));
    }

    pub fn set_pitch_semitones(&self, semitones: f32) {
        self.with_pitch_shift(|p| p.set_semitones(semitones));
    }

    pub fn set_pitch_quality(&self, quality: Quality) {
        self.with_pitch_shift(|p| p.set_quality(quality));
    }

    pub fn set_pitch_feedback(&self, feedback: f32) {
        self.with_pitch_shift(|p| p.set_feedback(feedback));
    }

    pub fn set_reverb_decay(&self, decay: f32) {
        self.with_reverb(|r| r.set_decay(decay));
    }

    pub fn set_reverb_wet(&self, wet: f32) {
        self.with_reverb(|r| r.set_wet(wet));
    }

    pub fn set_reverb_delay_ms(&self, delay_ms: f32) {
        self.with_reverb(|r| r.set_delay_ms(delay_ms));
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let running = self.is_running();
        let xruns = self.shared.xrun_count.load(Ordering::Relaxed);
        self.with_state(|s| {
            let current = s.store.current();
            let loops = s
                .store
                .iter()
                .map(|lp| LoopSnapshot {
                    id: lp.id(),
                    size: lp.size(),
                    position: lp.position(),
                    seconds: s.store.seconds_for(lp.size()),
                    muted: lp.mixer.is_muted,
                    soloed: lp.mixer.is_soloed,
                    current: current == Some(lp.id()),
                })
                .collect();
            let effects = s
                .rack
                .slots()
                .map(|slot| EffectSnapshot {
                    kind: slot.unit.kind(),
                    routing: slot.routing,
                    params: match &slot.unit {
                        EffectUnit::Gate(g) => EffectParams::Gate(g.params()),
                        EffectUnit::PitchShift(p) => EffectParams::PitchShift(p.params()),
                        EffectUnit::Reverb(r) => EffectParams::Reverb(r.params()),
                    },
                })
                .collect();
            EngineSnapshot {
                running,
                sample_rate: self.sample_rate(),
                chunk_size: self.chunk_size(),
                loops,
                recording_enabled: s.recording_enabled,
                overdub_enabled: s.overdub_enabled,
                session_active: s.session.is_active(),
                session_samples: s.session.samples().len(),
                effects,
                xruns,
            }
        })
    }
}

struct PlaybackThread {
    join: JoinHandle<()>,
    finished: mpsc::Receiver<()>,
}

/// Owns the audio backend and the playback thread around an [`EngineHandle`].
pub struct AudioEngine<B: AudioBackend> {
    handle: EngineHandle,
    backend: B,
    ring_buffer_chunks: usize,
    playback: Option<PlaybackThread>,
}

impl<B: AudioBackend> AudioEngine<B> {
    pub fn new(config: &EngineConfig, backend: B) -> Result<Self> {
        Ok(Self::with_handle(
            EngineHandle::new(config)?,
            backend,
            config.ring_buffer_chunks,
        ))
    }

    /// Wraps an existing handle, e.g. one whose xrun counter the backend already shares.
    pub fn with_handle(handle: EngineHandle, backend: B, ring_buffer_chunks: usize) -> Self {
        Self {
            handle,
            backend,
            ring_buffer_chunks: ring_buffer_chunks.max(1),
            playback: None,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Opens the output stream, the input stream and the playback thread.
    /// If any step fails everything already opened is closed again.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(LooperError::AlreadyRunning);
        }
        let chunk_size = self.handle.chunk_size();
        let ring = HeapRb::<f32>::new(chunk_size * self.ring_buffer_chunks);
        let (producer, consumer) = ring.split();

        self.handle.shared.running.store(true, Ordering::Release);

        if let Err(e) = self.backend.start_output(consumer) {
            self.abort_start();
            return Err(e);
        }

        let capture_handle = self.handle.clone();
        let sink = Box::new(move |chunk: &[f32]| capture_handle.capture(chunk));
        if let Err(e) = self.backend.start_input(sink) {
            self.abort_start();
            return Err(e);
        }

        match spawn_playback(self.handle.clone(), producer) {
            Ok(playback) => self.playback = Some(playback),
            Err(e) => {
                self.abort_start();
                return Err(e);
            }
        }

        info!(
            sample_rate = self.handle.sample_rate(),
            chunk_size, "Audio engine started"
        );
        Ok(())
    }

    fn abort_start(&mut self) {
        self.handle.shared.running.store(false, Ordering::Release);
        self.backend.stop_input();
        self.backend.stop_output();
        error!("Audio engine failed to start; streams closed");
    }

    /// Stops the playback loop, then the input and output streams.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        let was_running = self.handle.shared.running.swap(false, Ordering::AcqRel);
        if let Some(playback) = self.playback.take() {
            match playback.finished.recv_timeout(PLAYBACK_JOIN_TIMEOUT) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if playback.join.join().is_err() {
                        error!("Playback thread panicked");
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!("Playback thread did not exit in time; detaching it");
                }
            }
        }
        self.backend.stop_input();
        self.backend.stop_output();
        if was_running {
            info!("Audio engine stopped");
        }
    }
}

impl<B: AudioBackend> Drop for AudioEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_playback(handle: EngineHandle, mut producer: HeapProducer<f32>) -> Result<PlaybackThread> {
    let (finished_tx, finished) = mpsc::channel();
    let chunk_size = handle.chunk_size();
    let idle = Duration::from_secs_f64(chunk_size as f64 / handle.sample_rate() as f64 / 4.0);

    let join = thread::Builder::new()
        .name("looper-playback".to_string())
        .spawn(move || {
            debug!("Playback thread running");
            let mut mixed = Vec::with_capacity(chunk_size);
            while handle.is_running() {
                if producer.free_len() >= chunk_size {
                    handle.mix_into(&mut mixed);
                    producer.push_slice(&mixed);
                } else {
                    thread::sleep(idle);
                }
            }
            let _ = finished_tx.send(());
            debug!("Playback thread exited");
        })
        .map_err(|e| LooperError::device("Failed to spawn playback thread", e))?;
    Ok(PlaybackThread { join, finished })
}
