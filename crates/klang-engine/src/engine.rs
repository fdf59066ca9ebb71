//! The polyphonic voice engine.
//!
//! [`VoiceEngine`] owns a prototype [`Circuit`] and a fixed pool of voice
//! clones. Note events bind notes to voices; each audio sample every
//! sounding voice runs its circuit and the stereo results are summed.
//! Structural edits arrive through the SPSC command queue and are applied
//! between samples, first to the prototype and then to every voice, so all
//! clones stay structurally identical.
//!
//! The steady-state tick path performs no allocation, locking, or
//! blocking. `SetMaxVoices` and `SwapPrototype` rebuild the pool and are
//! explicitly not glitch-free.

use klang_core::Circuit;
use rtrb::Consumer;

use crate::command::{Command, CommandSender, DEFAULT_QUEUE_CAPACITY};
use crate::voice::{StealPolicy, Voice, VoiceState};

/// Polyphonic host for clones of one prototype circuit.
pub struct VoiceEngine {
    prototype: Circuit,
    voices: Vec<Voice>,
    /// Indices of sounding voices, oldest activation first.
    active_order: Vec<usize>,
    /// Stack of idle voice indices.
    idle: Vec<usize>,
    /// Reclamation scratch, pre-allocated to pool size.
    garbage: Vec<usize>,
    consumer: Consumer<Command>,
    steal: StealPolicy,
    legato: bool,
    sample_rate: f64,
    tempo: f64,
    block_size: usize,
    ticks: u64,
}

impl VoiceEngine {
    /// Build an engine around `prototype` with a pool of `max_voices`
    /// clones (clamped to at least 1) and the default command queue
    /// capacity. Returns the engine and the control-thread sender half.
    pub fn new(prototype: Circuit, max_voices: usize) -> (Self, CommandSender) {
        Self::with_queue_capacity(prototype, max_voices, DEFAULT_QUEUE_CAPACITY)
    }

    /// [`new`](Self::new) with an explicit command queue capacity.
    pub fn with_queue_capacity(
        prototype: Circuit,
        max_voices: usize,
        queue_capacity: usize,
    ) -> (Self, CommandSender) {
        let (sender, consumer) = CommandSender::new(queue_capacity);
        let mut engine = Self {
            prototype,
            voices: Vec::new(),
            active_order: Vec::new(),
            idle: Vec::new(),
            garbage: Vec::new(),
            consumer,
            steal: StealPolicy::default(),
            legato: false,
            sample_rate: 48_000.0,
            tempo: 120.0,
            block_size: 64,
            ticks: 0,
        };
        engine.rebuild_pool(max_voices);
        (engine, sender)
    }

    /// Rebuild the pool as `n` fresh prototype clones, dropping all
    /// sounding notes. Not glitch-free.
    pub fn set_max_voices(&mut self, n: usize) {
        self.rebuild_pool(n);
        #[cfg(feature = "tracing")]
        tracing::debug!(voices = self.voices.len(), "voice_pool_rebuilt");
    }

    fn rebuild_pool(&mut self, n: usize) {
        let n = n.max(1);
        self.voices.clear();
        self.voices.reserve(n);
        for _ in 0..n {
            self.voices.push(Voice::new(self.prototype.clone()));
        }
        self.active_order.clear();
        self.active_order.reserve(n);
        self.idle.clear();
        self.idle.reserve(n);
        // Reverse so allocation hands out voice 0 first.
        self.idle.extend((0..n).rev());
        self.garbage.clear();
        self.garbage.reserve(n);
    }

    /// Number of voices in the pool.
    pub fn max_voices(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices currently sounding (active or released).
    pub fn num_sounding(&self) -> usize {
        self.active_order.len()
    }

    /// The voice pool, for inspection.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// The prototype circuit.
    pub fn prototype(&self) -> &Circuit {
        &self.prototype
    }

    /// Samples produced since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Current steal policy.
    pub fn steal_policy(&self) -> StealPolicy {
        self.steal
    }

    /// Select the voice sacrificed when the pool is exhausted.
    pub fn set_steal_policy(&mut self, policy: StealPolicy) {
        self.steal = policy;
    }

    /// Whether legato renoting is enabled.
    pub fn legato(&self) -> bool {
        self.legato
    }

    /// Enable or disable legato renoting.
    pub fn set_legato(&mut self, on: bool) {
        self.legato = on;
    }

    /// Fan the sample rate out to the prototype and every voice. External
    /// configuration; never called from inside `tick`.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.prototype.set_sample_rate(sample_rate);
        for v in &mut self.voices {
            v.circuit.set_sample_rate(sample_rate);
        }
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Fan the tempo out to the prototype and every voice.
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        self.prototype.set_tempo(tempo);
        for v in &mut self.voices {
            v.circuit.set_tempo(tempo);
        }
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Record the host's processing block size, the buffer length
    /// [`process_block`](Self::process_block) is expected to receive.
    /// External configuration; never called from inside the audio path.
    pub fn set_block_size(&mut self, n: usize) {
        self.block_size = n.max(1);
    }

    /// Host block size last recorded via [`set_block_size`](Self::set_block_size).
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Start a note.
    ///
    /// With legato enabled, a note already bound to a sounding voice
    /// renotes that exact voice in place (no reset, so circuit state such
    /// as envelope levels carries over). Otherwise an idle voice is
    /// claimed, or - with the pool exhausted - one is stolen per the steal
    /// policy and renoted without a reset.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        if self.legato
            && let Some(pos) = self
                .active_order
                .iter()
                .position(|&i| self.voices[i].note() == note)
        {
            let idx = self.active_order.remove(pos);
            self.voices[idx].bind(note, velocity);
            self.active_order.push(idx);
            return;
        }
        let idx = match self.idle.pop() {
            Some(idx) => idx,
            None => {
                let idx = self.steal_target();
                // Stolen voices are renoted, not reset; remove the old
                // activation entry before re-pushing below.
                self.active_order.retain(|&i| i != idx);
                #[cfg(feature = "tracing")]
                tracing::debug!(voice = idx, note, "voice_stolen");
                idx
            }
        };
        self.voices[idx].bind(note, velocity);
        self.active_order.push(idx);
    }

    /// Release every active voice bound to `note`. The voices keep
    /// sounding until their circuits report inactive.
    pub fn note_off(&mut self, note: u8, velocity: u8) {
        for &i in &self.active_order {
            let v = &mut self.voices[i];
            if v.state() == VoiceState::Active && v.note() == note {
                v.release(velocity);
            }
        }
    }

    /// Write a sticky control value to boundary input channel `channel` of
    /// the prototype and every voice.
    pub fn control_change(&mut self, channel: usize, value: f64) {
        self.prototype.set_external_input(channel, value);
        for v in &mut self.voices {
            v.circuit.set_external_input(channel, value);
        }
    }

    fn steal_target(&self) -> usize {
        let order = &self.active_order;
        let Some(&oldest) = order.first() else {
            return 0;
        };
        match self.steal {
            StealPolicy::Oldest => oldest,
            StealPolicy::Newest => order.last().copied().unwrap_or(oldest),
            StealPolicy::Lowest => {
                let mut best = oldest;
                for &i in order {
                    // Strict comparison keeps the oldest among ties.
                    if self.voices[i].note() < self.voices[best].note() {
                        best = i;
                    }
                }
                best
            }
            StealPolicy::Highest => {
                let mut best = oldest;
                for &i in order {
                    if self.voices[i].note() > self.voices[best].note() {
                        best = i;
                    }
                }
                best
            }
        }
    }

    /// Produce one stereo sample.
    ///
    /// Drains the command queue completely (FIFO, each command applied to
    /// the prototype then every voice before the next), runs every
    /// sounding voice in activation order with the stereo input on
    /// boundary input channels 0 and 1, sums voice outputs into
    /// `left_out`/`right_out` (zeroed first), then reclaims voices whose
    /// circuits report inactive. A command enqueued before this call is
    /// audible in this call; one enqueued after it begins takes effect no
    /// earlier than the next. [`process_block`](Self::process_block) is the
    /// buffer-sized form of the same contract.
    pub fn tick(&mut self, left_in: f64, right_in: f64, left_out: &mut f64, right_out: &mut f64) {
        self.drain_commands();
        self.tick_sample(left_in, right_in, left_out, right_out);
    }

    /// Produce one block of stereo audio, the host-facing entry point.
    ///
    /// Drains the command queue once at block start, then runs the
    /// per-sample core over the buffers. The frame count is the shorter of
    /// the two output slices; input slices shorter than that read as
    /// silence, so an instrument host can pass empty inputs. Commands
    /// enqueued before this call are audible from the block's first sample;
    /// those enqueued after it begins wait for the next block.
    pub fn process_block(
        &mut self,
        left_in: &[f64],
        right_in: &[f64],
        left_out: &mut [f64],
        right_out: &mut [f64],
    ) {
        self.drain_commands();
        let frames = left_out.len().min(right_out.len());
        for i in 0..frames {
            let l_in = left_in.get(i).copied().unwrap_or(0.0);
            let r_in = right_in.get(i).copied().unwrap_or(0.0);
            let (mut l, mut r) = (0.0, 0.0);
            self.tick_sample(l_in, r_in, &mut l, &mut r);
            left_out[i] = l;
            right_out[i] = r;
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.consumer.pop() {
            self.apply(command);
        }
    }

    fn tick_sample(
        &mut self,
        left_in: f64,
        right_in: f64,
        left_out: &mut f64,
        right_out: &mut f64,
    ) {
        *left_out = 0.0;
        *right_out = 0.0;
        for &i in &self.active_order {
            let circuit = &mut self.voices[i].circuit;
            let inputs = circuit.num_inputs();
            if inputs > 0 {
                circuit.set_external_input(0, left_in);
            }
            if inputs > 1 {
                circuit.set_external_input(1, right_in);
            }
            circuit.tick();
            let left = circuit.read_output(0);
            // Mono circuits feed both sides.
            let right = if circuit.num_outputs() > 1 {
                circuit.read_output(1)
            } else {
                left
            };
            *left_out += left;
            *right_out += right;
        }

        self.garbage.clear();
        for &i in &self.active_order {
            if !self.voices[i].circuit.is_active() {
                self.garbage.push(i);
            }
        }
        if !self.garbage.is_empty() {
            for gi in 0..self.garbage.len() {
                let i = self.garbage[gi];
                self.voices[i].reclaim();
                self.idle.push(i);
            }
            let garbage = &self.garbage;
            self.active_order.retain(|i| !garbage.contains(i));
        }

        self.ticks += 1;
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Circuit(mut f) => {
                f(&mut self.prototype);
                for v in &mut self.voices {
                    f(&mut v.circuit);
                }
            }
            Command::SetMaxVoices(n) => self.set_max_voices(n),
            Command::SetStealPolicy(policy) => self.steal = policy,
            Command::SetLegato(on) => self.legato = on,
            Command::SwapPrototype(circuit) => {
                let size = self.voices.len();
                self.prototype = *circuit;
                self.prototype.set_sample_rate(self.sample_rate);
                self.prototype.set_tempo(self.tempo);
                self.rebuild_pool(size);
                #[cfg(feature = "tracing")]
                tracing::debug!("prototype_swapped");
            }
        }
    }
}

impl core::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("voices", &self.voices.len())
            .field("sounding", &self.active_order.len())
            .field("steal", &self.steal)
            .field("legato", &self.legato)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klang_core::{Const, GateEnvelope, Port, Unit};

    /// Prototype with an always-sounding constant behind an envelope, so a
    /// voice's audibility tracks its gate and release tail.
    fn prototype() -> Circuit {
        let mut c = Circuit::new();
        c.add_boundary_output("out");
        let src = c.add_unit(Unit::of(Const::new(1.0)));
        let env = c.add_unit(Unit::of(GateEnvelope::default()));
        c.connect(Port::new(src, 0), Port::new(env, 0)).unwrap();
        c.connect_output(Port::new(env, 0), 0).unwrap();
        c
    }

    fn run(engine: &mut VoiceEngine, samples: usize) -> (f64, f64) {
        let (mut l, mut r) = (0.0, 0.0);
        for _ in 0..samples {
            engine.tick(0.0, 0.0, &mut l, &mut r);
        }
        (l, r)
    }

    #[test]
    fn notes_claim_idle_voices_in_order() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 4);
        engine.note_on(60, 100);
        engine.note_on(64, 100);
        assert_eq!(engine.num_sounding(), 2);
        assert_eq!(engine.voices()[0].note(), 60);
        assert_eq!(engine.voices()[1].note(), 64);
    }

    #[test]
    fn oldest_steal_takes_the_front_of_activation_order() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 2);
        engine.note_on(60, 100);
        engine.note_on(62, 100);
        engine.note_on(64, 100); // steals the voice holding 60
        assert_eq!(engine.num_sounding(), 2);
        let notes: Vec<u8> = engine.voices().iter().map(Voice::note).collect();
        assert!(notes.contains(&64));
        assert!(!notes.contains(&60));
    }

    #[test]
    fn lowest_steal_prefers_lowest_note_then_oldest() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 3);
        engine.set_steal_policy(StealPolicy::Lowest);
        engine.note_on(70, 100);
        engine.note_on(50, 100);
        engine.note_on(60, 100);
        engine.note_on(80, 100); // steals the voice holding 50
        let notes: Vec<u8> = engine.voices().iter().map(Voice::note).collect();
        assert!(!notes.contains(&50));
        assert!(notes.contains(&70) && notes.contains(&60) && notes.contains(&80));
    }

    #[test]
    fn newest_steal_takes_the_back_of_activation_order() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 2);
        engine.set_steal_policy(StealPolicy::Newest);
        engine.note_on(60, 100);
        engine.note_on(62, 100);
        engine.note_on(64, 100); // steals the voice holding 62
        assert_eq!(engine.num_sounding(), 2);
        let notes: Vec<u8> = engine.voices().iter().map(Voice::note).collect();
        assert!(notes.contains(&60) && notes.contains(&64));
        assert!(!notes.contains(&62));
    }

    #[test]
    fn highest_steal_prefers_highest_note_then_oldest() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 3);
        engine.set_steal_policy(StealPolicy::Highest);
        engine.note_on(70, 100);
        engine.note_on(90, 100);
        engine.note_on(60, 100);
        engine.note_on(80, 100); // steals the voice holding 90
        let notes: Vec<u8> = engine.voices().iter().map(Voice::note).collect();
        assert!(!notes.contains(&90));
        assert!(notes.contains(&70) && notes.contains(&60) && notes.contains(&80));
        assert!(engine.voices().iter().all(Voice::is_sounding));
    }

    #[test]
    fn legato_renotes_the_bound_voice() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 4);
        engine.set_legato(true);
        engine.note_on(60, 100);
        assert_eq!(engine.num_sounding(), 1);
        engine.note_on(60, 80);
        assert_eq!(engine.num_sounding(), 1);
        assert_eq!(engine.voices()[0].velocity(), 80);
    }

    #[test]
    fn released_voice_sounds_until_decayed_then_reclaims() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 2);
        engine.note_on(60, 100);
        run(&mut engine, 1_000);
        engine.note_off(60, 0);
        let (l, _) = run(&mut engine, 1);
        assert!(l > 0.0, "release tail should still be audible");
        run(&mut engine, 100_000);
        assert_eq!(engine.num_sounding(), 0);
        assert_eq!(engine.voices()[0].state(), VoiceState::Idle);
        assert!(!engine.voices()[0].is_sounding());
    }

    #[test]
    fn process_block_matches_per_sample_ticks() {
        let (mut blocked, _s1) = VoiceEngine::new(prototype(), 2);
        let (mut sampled, _s2) = VoiceEngine::new(prototype(), 2);
        blocked.note_on(60, 100);
        sampled.note_on(60, 100);
        let silence = [0.0; 32];
        let (mut left, mut right) = ([0.0; 32], [0.0; 32]);
        blocked.process_block(&silence, &silence, &mut left, &mut right);
        for i in 0..32 {
            let (mut l, mut r) = (0.0, 0.0);
            sampled.tick(0.0, 0.0, &mut l, &mut r);
            assert_eq!(left[i], l);
            assert_eq!(right[i], r);
        }
        assert_eq!(blocked.ticks(), 32);
    }

    #[test]
    fn process_block_reads_short_inputs_as_silence() {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 1);
        engine.note_on(60, 100);
        let (mut left, mut right) = ([0.0; 16], [0.0; 16]);
        engine.process_block(&[], &[], &mut left, &mut right);
        assert_eq!(engine.ticks(), 16);
        assert!(left[15] > 0.0, "envelope attack should be under way");
    }

    #[test]
    fn commands_apply_before_audio_in_the_same_tick() {
        let (mut engine, mut sender) = VoiceEngine::new(prototype(), 2);
        assert!(sender.send(Command::SetLegato(true)));
        assert!(sender.send(Command::SetStealPolicy(StealPolicy::Highest)));
        let (mut l, mut r) = (0.0, 0.0);
        engine.tick(0.0, 0.0, &mut l, &mut r);
        assert!(engine.legato());
        assert_eq!(engine.steal_policy(), StealPolicy::Highest);
    }

    #[test]
    fn circuit_commands_reach_prototype_and_all_voices() {
        let (mut engine, mut sender) = VoiceEngine::new(prototype(), 3);
        sender.send(Command::circuit(|c| {
            c.add_boundary_input("cc", 0.25);
        }));
        let (mut l, mut r) = (0.0, 0.0);
        engine.tick(0.0, 0.0, &mut l, &mut r);
        assert_eq!(engine.prototype().num_inputs(), 1);
        for v in engine.voices() {
            assert_eq!(v.circuit().num_inputs(), 1);
        }
    }

    #[test]
    fn swap_prototype_rebuilds_pool_and_drops_notes() {
        let (mut engine, mut sender) = VoiceEngine::new(prototype(), 2);
        engine.note_on(60, 100);
        let mut replacement = Circuit::new();
        replacement.add_boundary_output("out");
        sender.send(Command::SwapPrototype(Box::new(replacement)));
        let (mut l, mut r) = (0.0, 0.0);
        engine.tick(0.0, 0.0, &mut l, &mut r);
        assert_eq!(engine.num_sounding(), 0);
        assert_eq!(engine.max_voices(), 2);
        assert_eq!(engine.prototype().num_units(), 0);
    }

    #[test]
    fn max_voices_clamps_to_one() {
        let (engine, _sender) = VoiceEngine::new(prototype(), 0);
        assert_eq!(engine.max_voices(), 1);
    }
}
