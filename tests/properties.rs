//! Property-based tests for loop sizing, circular playback and the DSP units.

use ostinato::fx_components::{DspComponent, Gate, GateParams, PitchShiftParams, PitchShifter, Quality};
use ostinato::{EngineConfig, EngineHandle, LoopId};
use proptest::prelude::*;

const RATE: u32 = 800;
const CHUNK: usize = 8;

fn small_engine(lengths: Vec<f32>) -> EngineHandle {
    EngineHandle::new(&EngineConfig {
        sample_rate: RATE,
        chunk_size: CHUNK,
        initial_loop_lengths: lengths,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn quality(index: usize) -> Quality {
    [Quality::Low, Quality::Medium, Quality::High][index % 3]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every added loop gets `round(rate / chunk * seconds)` chunks and an id
    /// that was never handed out before, even after deletions.
    #[test]
    fn loop_size_formula_and_fresh_ids(
        rate in prop::sample::select(vec![22050u32, 44100, 48000]),
        chunk in prop::sample::select(vec![64usize, 128, 256, 512]),
        lengths in prop::collection::vec(1.0f32..=10.0f32, 1..6),
    ) {
        let handle = EngineHandle::new(&EngineConfig {
            sample_rate: rate,
            chunk_size: chunk,
            initial_loop_lengths: vec![1.0],
            ..EngineConfig::default()
        })
        .unwrap();

        let mut issued = vec![LoopId(0)];
        for &seconds in &lengths {
            let id = handle.add_loop(seconds).unwrap();
            prop_assert!(!issued.contains(&id));
            prop_assert!(id > *issued.last().unwrap());
            issued.push(id);

            let expected = (rate as f64 / chunk as f64 * seconds as f64).round() as usize;
            let snap = handle.snapshot();
            let lp = snap.loops.iter().find(|l| l.id == id).unwrap();
            prop_assert_eq!(lp.size, expected);

            // deleting must not free the id for reuse
            handle.delete_loop(id).unwrap();
        }
    }

    /// After N mix cycles every loop sits at `N mod size`.
    #[test]
    fn position_wraps_after_n_cycles(
        lengths in prop::collection::vec(1.0f32..3.0f32, 1..4),
        cycles in 0usize..700,
    ) {
        let handle = small_engine(lengths);
        handle.render_cycles(cycles);
        for lp in handle.snapshot().loops {
            prop_assert_eq!(lp.position, cycles % lp.size);
        }
    }

    /// Growing a loop repeats the old content whole, then a partial prefix.
    #[test]
    fn growing_a_loop_tiles_its_content(
        start_seconds in 1.0f32..3.0f32,
        extra_seconds in 0.0f32..7.0f32,
    ) {
        let handle = small_engine(vec![start_seconds]);
        let id = LoopId(0);
        let old_size = handle.snapshot().loops[0].size;

        handle.set_recording_enabled(true);
        for i in 0..old_size {
            handle.capture(&[i as f32 / 1000.0; CHUNK]);
            handle.mix_cycle();
        }
        handle.set_recording_enabled(false);

        handle.update_loop_length(id, start_seconds + extra_seconds).unwrap();
        handle.with_state(|s| {
            let lp = s.store.get(id).unwrap();
            prop_assert_eq!(lp.position(), 0);
            prop_assert!(lp.size() >= old_size);
            for j in 0..lp.size() {
                prop_assert_eq!(lp.chunk(j)[0], (j % old_size) as f32 / 1000.0);
            }
            Ok(())
        })?;
    }

    /// Zero semitones is an exact passthrough at every quality.
    #[test]
    fn pitch_shift_zero_is_identity(
        input in prop::collection::vec(-1.0f32..=1.0f32, 1..512),
        q in 0usize..3,
    ) {
        let mut shifter = PitchShifter::new(PitchShiftParams {
            semitones: 0.0,
            quality: quality(q),
            feedback: 0.0,
        });
        let mut output = vec![0.5; input.len()];
        shifter.process_chunk(&input, &mut output);
        prop_assert_eq!(output, input);
    }

    /// Shifting never produces non-finite or out-of-range samples.
    #[test]
    fn pitch_shift_output_stays_in_range(
        input in prop::collection::vec(-1.0f32..=1.0f32, 64..=256),
        semitones in -24.0f32..=24.0f32,
    ) {
        let mut shifter = PitchShifter::new(PitchShiftParams {
            semitones,
            ..PitchShiftParams::default()
        });
        let mut output = vec![0.0; input.len()];
        shifter.process_chunk(&input, &mut output);
        prop_assert!(output.iter().all(|s| s.is_finite() && (-1.0..=1.0).contains(s)));
    }

    /// A constant sub-threshold signal held longer than the release time is
    /// gated to exact silence, whatever the gate was doing before.
    #[test]
    fn gate_silences_sustained_quiet_input(
        level in 0.0f32..0.1f32,
        release_ms in 1.0f32..200.0f32,
        opened in any::<bool>(),
    ) {
        let rate = 1000.0;
        let mut gate = Gate::new(rate, GateParams {
            threshold: 0.1,
            attack_ms: 1.0,
            release_ms,
        });
        if opened {
            let mut scratch = [0.0; 32];
            gate.process_chunk(&[0.9; 32], &mut scratch);
        }

        let release_samples = (rate * release_ms / 1000.0).ceil() as usize;
        let len = release_samples + 64;
        let mut out = vec![1.0; len];
        gate.process_chunk(&vec![level; len], &mut out);
        prop_assert!(out[release_samples + 2..].iter().all(|&s| s == 0.0));
    }
}
