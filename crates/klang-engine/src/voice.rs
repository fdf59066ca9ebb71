//! A single polyphonic voice: one clone of the prototype circuit bound to
//! one note at a time.

use klang_core::Circuit;

/// Lifecycle of a voice within the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Unbound and silent, available for allocation.
    #[default]
    Idle,
    /// Bound to a held note.
    Active,
    /// Note released; still sounding until its circuit reports inactive.
    Released,
}

/// Which voice to sacrifice when a note arrives and no voice is idle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StealPolicy {
    /// The longest-sounding voice (front of the activation order).
    #[default]
    Oldest,
    /// The most recently activated voice.
    Newest,
    /// The voice bound to the lowest note (ties broken by age).
    Lowest,
    /// The voice bound to the highest note (ties broken by age).
    Highest,
}

/// One pool slot. The circuit clone persists across notes; binding state is
/// overwritten on each allocation.
#[derive(Debug)]
pub struct Voice {
    pub(crate) circuit: Circuit,
    pub(crate) state: VoiceState,
    pub(crate) note: u8,
    pub(crate) velocity: u8,
}

impl Voice {
    pub(crate) fn new(circuit: Circuit) -> Self {
        Self {
            circuit,
            state: VoiceState::Idle,
            note: 0,
            velocity: 0,
        }
    }

    /// The voice's circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Bound note number. Meaningful only while not [`VoiceState::Idle`].
    pub fn note(&self) -> u8 {
        self.note
    }

    /// Bound note-on velocity. Meaningful only while not idle.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Bind to a note and gate the circuit on. A sounding voice is renoted
    /// in place without a reset, so its circuit state carries over (legato
    /// and stealing both rely on this).
    pub(crate) fn bind(&mut self, note: u8, velocity: u8) {
        self.note = note;
        self.velocity = velocity;
        self.state = VoiceState::Active;
        self.circuit.note_on(note, velocity);
    }

    /// Gate the circuit off; the voice keeps sounding until its circuit
    /// reports inactive.
    pub(crate) fn release(&mut self, velocity: u8) {
        self.state = VoiceState::Released;
        self.circuit.note_off(self.note, velocity);
    }

    /// Return to the idle pool, clearing circuit transients.
    pub(crate) fn reclaim(&mut self) {
        self.state = VoiceState::Idle;
        self.circuit.reset();
    }

    /// True while Active or Released, i.e. while the voice contributes to
    /// the engine's output sum.
    pub fn is_sounding(&self) -> bool {
        self.state != VoiceState::Idle
    }
}
