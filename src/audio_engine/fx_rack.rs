// FILE: src\audio_engine\fx_rack.rs
// ==================================

use crate::fx::{FxComponentType, Routing};
use crate::fx_components::{
    DspComponent, Gate, GateParams, PitchShiftParams, PitchShifter, Reverb, ReverbParams,
};
use crate::looper::{LoopId, LoopStore};

/// One of the three effect units.
#[derive(Debug)]
pub enum EffectUnit {
    Gate(Gate),
    PitchShift(PitchShifter),
    Reverb(Reverb),
}

impl EffectUnit {
    pub fn kind(&self) -> FxComponentType {
        match self {
            EffectUnit::Gate(_) => FxComponentType::Gate,
            EffectUnit::PitchShift(_) => FxComponentType::PitchShift,
            EffectUnit::Reverb(_) => FxComponentType::Reverb,
        }
    }

    fn component(&mut self) -> &mut dyn DspComponent {
        match self {
            EffectUnit::Gate(g) => g,
            EffectUnit::PitchShift(p) => p,
            EffectUnit::Reverb(r) => r,
        }
    }

    /// Share of the destination's previous content fed back on self-routing.
    fn feedback(&self) -> f32 {
        match self {
            EffectUnit::PitchShift(p) => p.feedback(),
            _ => 0.0,
        }
    }

    pub fn process_chunk(&mut self, input: &[f32], output: &mut [f32]) {
        self.component().process_chunk(input, output);
    }

    pub fn reset(&mut self) {
        self.component().reset();
    }
}

/// An effect unit plus its routing.
#[derive(Debug)]
pub struct FxSlot {
    pub routing: Routing,
    pub unit: EffectUnit,
}

/// What running the rack on one loop did to that loop's place in the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RackOutcome {
    /// Some active effect sent this loop's sound to a different, existing loop.
    pub redirected: bool,
    /// Some active effect wrote its output back onto this loop.
    pub self_routed: bool,
}

impl RackOutcome {
    /// The loop stays in the master mix unless its sound was moved elsewhere.
    pub fn keeps_dry(&self) -> bool {
        !self.redirected || self.self_routed
    }
}

/// Holds the Gate, PitchShift and Reverb slots and runs them in that order.
#[derive(Debug)]
pub struct FxRack {
    slots: [FxSlot; 3],
    /// What the next effect in the chain hears.
    signal: Vec<f32>,
    processed: Vec<f32>,
}

impl FxRack {
    pub fn new(
        sample_rate: f32,
        chunk_size: usize,
        routed_loop: LoopId,
        gate: GateParams,
        pitch_shift: PitchShiftParams,
        reverb: ReverbParams,
    ) -> Self {
        let slot = |unit| FxSlot {
            routing: Routing::bypassed_on(routed_loop),
            unit,
        };
        Self {
            slots: [
                slot(EffectUnit::Gate(Gate::new(sample_rate, gate))),
                slot(EffectUnit::PitchShift(PitchShifter::new(pitch_shift))),
                slot(EffectUnit::Reverb(Reverb::new(sample_rate, reverb))),
            ],
            signal: Vec::with_capacity(chunk_size),
            processed: vec![0.0; chunk_size],
        }
    }

    pub fn slot(&self, kind: FxComponentType) -> &FxSlot {
        &self.slots[kind.index()]
    }

    pub fn slot_mut(&mut self, kind: FxComponentType) -> &mut FxSlot {
        &mut self.slots[kind.index()]
    }

    pub fn slots(&self) -> impl Iterator<Item = &FxSlot> {
        self.slots.iter()
    }

    pub fn gate_mut(&mut self) -> Option<&mut Gate> {
        match &mut self.slot_mut(FxComponentType::Gate).unit {
            EffectUnit::Gate(g) => Some(g),
            _ => None,
        }
    }

    pub fn pitch_shift_mut(&mut self) -> Option<&mut PitchShifter> {
        match &mut self.slot_mut(FxComponentType::PitchShift).unit {
            EffectUnit::PitchShift(p) => Some(p),
            _ => None,
        }
    }

    pub fn reverb_mut(&mut self) -> Option<&mut Reverb> {
        match &mut self.slot_mut(FxComponentType::Reverb).unit {
            EffectUnit::Reverb(r) => Some(r),
            _ => None,
        }
    }

    /// Runs every active effect whose input is `source`, in rack order, and
    /// writes each result into the destination loop's current chunk.
    ///
    /// `dry` is the source's chunk as it was before this cycle. The first
    /// claiming effect hears it; an effect that writes back onto `source`
    /// hands what it wrote to the next one, so self-routed effects chain.
    /// Pitch feedback mixes in `dry`, never a chunk already rewritten this
    /// cycle.
    pub fn process_loop(
        &mut self,
        source: LoopId,
        dry: &[f32],
        store: &mut LoopStore,
    ) -> RackOutcome {
        let mut outcome = RackOutcome::default();
        self.signal.clear();
        self.signal.extend_from_slice(dry);
        self.processed.resize(dry.len(), 0.0);

        for kind in FxComponentType::ORDER {
            let slot = &mut self.slots[kind.index()];
            if !slot.routing.claims(source) {
                continue;
            }
            slot.unit.process_chunk(&self.signal, &mut self.processed);

            let Ok(target) = store.get_mut(slot.routing.output_loop) else {
                continue;
            };
            if slot.routing.is_self_routed() {
                outcome.self_routed = true;
                let feedback = slot.unit.feedback();
                if feedback > 0.0 {
                    for (s, &previous) in self.processed.iter_mut().zip(dry) {
                        *s += previous * feedback;
                    }
                }
                target.write_current(&self.processed, slot.routing.overdub);
                self.signal.copy_from_slice(target.current_chunk());
            } else {
                outcome.redirected = true;
                target.write_current(&self.processed, slot.routing.overdub);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::LengthBounds;

    const CHUNK: usize = 8;

    fn setup() -> (LoopStore, FxRack) {
        let store = LoopStore::new(800, CHUNK, LengthBounds::default(), &[1.0, 1.0]).unwrap();
        let rack = FxRack::new(
            800.0,
            CHUNK,
            LoopId(0),
            GateParams::default(),
            PitchShiftParams::default(),
            ReverbParams::default(),
        );
        (store, rack)
    }

    #[test]
    fn bypassed_rack_leaves_loops_alone() {
        let (mut store, mut rack) = setup();
        let outcome = rack.process_loop(LoopId(0), &[0.5; CHUNK], &mut store);
        assert_eq!(outcome, RackOutcome::default());
        assert!(outcome.keeps_dry());
        assert!(store.get(LoopId(0)).unwrap().current_chunk().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn routing_to_another_loop_redirects() {
        let (mut store, mut rack) = setup();
        let slot = rack.slot_mut(FxComponentType::PitchShift);
        slot.routing = Routing {
            bypass: false,
            input_loop: LoopId(0),
            output_loop: LoopId(1),
            overdub: false,
        };
        let outcome = rack.process_loop(LoopId(0), &[0.5; CHUNK], &mut store);
        assert!(outcome.redirected);
        assert!(!outcome.keeps_dry());
        // zero semitones copies the chunk verbatim
        assert_eq!(store.get(LoopId(1)).unwrap().current_chunk(), &[0.5; CHUNK]);
    }

    #[test]
    fn missing_destination_is_a_no_op() {
        let (mut store, mut rack) = setup();
        rack.slot_mut(FxComponentType::Reverb).routing = Routing {
            bypass: false,
            input_loop: LoopId(0),
            output_loop: LoopId(42),
            overdub: true,
        };
        let outcome = rack.process_loop(LoopId(0), &[0.5; CHUNK], &mut store);
        assert!(outcome.keeps_dry());
        assert!(store.get(LoopId(1)).unwrap().current_chunk().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn pitch_feedback_mixes_previous_content_on_self_routing() {
        let (mut store, mut rack) = setup();
        store
            .get_mut(LoopId(0))
            .unwrap()
            .write_current(&[0.4; CHUNK], false);
        rack.pitch_shift_mut().unwrap().set_feedback(0.5);
        rack.slot_mut(FxComponentType::PitchShift).routing = Routing {
            bypass: false,
            input_loop: LoopId(0),
            output_loop: LoopId(0),
            overdub: false,
        };
        let dry = store.get(LoopId(0)).unwrap().current_chunk().to_vec();
        let outcome = rack.process_loop(LoopId(0), &dry, &mut store);
        assert!(outcome.self_routed && outcome.keeps_dry());
        for &s in store.get(LoopId(0)).unwrap().current_chunk() {
            approx::assert_relative_eq!(s, 0.6, epsilon = 1e-6);
        }
    }

    #[test]
    fn overdub_adds_onto_destination() {
        let (mut store, mut rack) = setup();
        store
            .get_mut(LoopId(1))
            .unwrap()
            .write_current(&[0.3; CHUNK], false);
        rack.slot_mut(FxComponentType::PitchShift).routing = Routing {
            bypass: false,
            input_loop: LoopId(0),
            output_loop: LoopId(1),
            overdub: true,
        };
        rack.process_loop(LoopId(0), &[0.9; CHUNK], &mut store);
        assert!(store
            .get(LoopId(1))
            .unwrap()
            .current_chunk()
            .iter()
            .all(|&s| s == 1.0));
    }

    fn self_route(rack: &mut FxRack, kind: FxComponentType) {
        rack.slot_mut(kind).routing = Routing {
            bypass: false,
            input_loop: LoopId(0),
            output_loop: LoopId(0),
            overdub: false,
        };
    }

    #[test]
    fn self_routed_effects_chain_in_rack_order() {
        let (mut store, mut rack) = setup();
        store
            .get_mut(LoopId(0))
            .unwrap()
            .write_current(&[0.4; CHUNK], false);
        // a closed gate feeds silence to a fully dry reverb
        rack.gate_mut().unwrap().set_threshold(1.0);
        rack.reverb_mut().unwrap().set_wet(0.0);
        self_route(&mut rack, FxComponentType::Gate);
        self_route(&mut rack, FxComponentType::Reverb);

        let dry = store.get(LoopId(0)).unwrap().current_chunk().to_vec();
        rack.process_loop(LoopId(0), &dry, &mut store);
        assert!(store.get(LoopId(0)).unwrap().current_chunk().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn pitch_feedback_reads_content_from_before_the_cycle() {
        let (mut store, mut rack) = setup();
        store
            .get_mut(LoopId(0))
            .unwrap()
            .write_current(&[0.4; CHUNK], false);
        rack.gate_mut().unwrap().set_threshold(1.0);
        rack.pitch_shift_mut().unwrap().set_feedback(0.5);
        self_route(&mut rack, FxComponentType::Gate);
        self_route(&mut rack, FxComponentType::PitchShift);

        let dry = store.get(LoopId(0)).unwrap().current_chunk().to_vec();
        rack.process_loop(LoopId(0), &dry, &mut store);
        // the gate already zeroed the slot; feedback still sees 0.4
        for &s in store.get(LoopId(0)).unwrap().current_chunk() {
            approx::assert_relative_eq!(s, 0.2, epsilon = 1e-6);
        }
    }
}
