//! Klang Engine - polyphonic voice management for klang circuits
//!
//! Multiplexes note events across a fixed pool of clones of one prototype
//! [`Circuit`](klang_core::Circuit), with a lock-free command queue for
//! applying structural edits from a control thread.
//!
//! # Core Abstractions
//!
//! - [`VoiceEngine`] - owns the prototype and the voice pool; runs every
//!   sounding voice and sums stereo output, block-wise through
//!   [`VoiceEngine::process_block`] or one sample at a time through
//!   [`VoiceEngine::tick`]
//! - [`Voice`] / [`VoiceState`] - one circuit clone bound to one note
//! - [`StealPolicy`] - which voice to sacrifice when the pool is exhausted
//! - [`Command`] / [`CommandSender`] - deferred operations pushed through a
//!   bounded wait-free SPSC ring buffer, drained at the top of each tick
//!
//! # Threading model
//!
//! The engine lives on the audio thread; the [`CommandSender`] lives on a
//! single control thread. Note events use dedicated methods
//! ([`VoiceEngine::note_on`], [`VoiceEngine::note_off`],
//! [`VoiceEngine::control_change`]) called on the audio thread, typically
//! from the host's own event queue. Everything structural goes through the
//! command queue.
//!
//! # Example
//!
//! ```rust
//! use klang_core::{Circuit, Const, GateEnvelope, Port, Unit};
//! use klang_engine::{Command, VoiceEngine};
//!
//! let mut proto = Circuit::new();
//! proto.add_boundary_output("out");
//! let src = proto.add_unit(Unit::of(Const::new(0.5)));
//! let env = proto.add_unit(Unit::of(GateEnvelope::default()));
//! proto.connect(Port::new(src, 0), Port::new(env, 0)).unwrap();
//! proto.connect_output(Port::new(env, 0), 0).unwrap();
//!
//! let (mut engine, mut sender) = VoiceEngine::new(proto, 8);
//! engine.note_on(60, 100);
//! sender.send(Command::SetLegato(true));
//!
//! let silence = [0.0; 64];
//! let (mut left, mut right) = ([0.0; 64], [0.0; 64]);
//! engine.process_block(&silence, &silence, &mut left, &mut right);
//! assert!(left[63] > 0.0);
//! ```

pub mod command;
pub mod engine;
pub mod voice;

pub use command::{Command, CommandSender, DEFAULT_QUEUE_CAPACITY};
pub use engine::VoiceEngine;
pub use voice::{StealPolicy, Voice, VoiceState};
