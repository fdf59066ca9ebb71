//! Cross-thread command queue.
//!
//! Structural edits (adding units, changing connections, resizing the pool)
//! originate on a control thread but must take effect on the audio thread
//! without locks. Commands are owned, self-contained closures or plain
//! values pushed through a bounded wait-free SPSC ring buffer; the engine
//! drains the queue at the top of every [`tick`](crate::VoiceEngine::tick).

use klang_core::Circuit;
use rtrb::{Producer, RingBuffer};

use crate::voice::StealPolicy;

/// Default command queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A deferred operation executed on the audio thread.
pub enum Command {
    /// Applied uniformly to the prototype circuit and then to every voice's
    /// circuit, in that order. This is how parameter and topology edits
    /// reach all clones coherently.
    Circuit(Box<dyn FnMut(&mut Circuit) + Send>),
    /// Rebuild the voice pool at a new size. Drops all sounding notes.
    SetMaxVoices(usize),
    /// Change which voice is sacrificed when the pool is exhausted.
    SetStealPolicy(StealPolicy),
    /// Enable or disable legato renoting of an already-bound note.
    SetLegato(bool),
    /// Replace the prototype circuit wholesale and rebuild the pool from
    /// it. Validation belongs on the sending side; the audio thread only
    /// swaps. Drops all sounding notes.
    SwapPrototype(Box<Circuit>),
}

impl Command {
    /// Convenience constructor for the closure variant.
    pub fn circuit(f: impl FnMut(&mut Circuit) + Send + 'static) -> Self {
        Self::Circuit(Box::new(f))
    }
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Circuit(_) => f.write_str("Command::Circuit(..)"),
            Self::SetMaxVoices(n) => f.debug_tuple("Command::SetMaxVoices").field(n).finish(),
            Self::SetStealPolicy(p) => f.debug_tuple("Command::SetStealPolicy").field(p).finish(),
            Self::SetLegato(on) => f.debug_tuple("Command::SetLegato").field(on).finish(),
            Self::SwapPrototype(_) => f.write_str("Command::SwapPrototype(..)"),
        }
    }
}

/// Control-thread handle to the engine's command queue.
///
/// Single logical producer: if several control-side owners need to send,
/// serialize access externally (e.g. behind a mutex on the control side).
pub struct CommandSender {
    producer: Producer<Command>,
}

impl CommandSender {
    pub(crate) fn new(capacity: usize) -> (Self, rtrb::Consumer<Command>) {
        let (producer, consumer) = RingBuffer::new(capacity);
        (Self { producer }, consumer)
    }

    /// Enqueue a command for the next audio tick.
    ///
    /// Wait-free. Returns `false` - and returns nothing to the queue - when
    /// the ring buffer is full; retrying later is the caller's decision.
    pub fn send(&mut self, command: Command) -> bool {
        match self.producer.push(command) {
            Ok(()) => true,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("command queue full, command dropped");
                false
            }
        }
    }

    /// Number of free queue slots.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }

    /// True once the engine half has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

impl core::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandSender")
            .field("slots", &self.producer.slots())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_fails_without_blocking_when_full() {
        let (mut sender, _consumer) = CommandSender::new(2);
        assert!(sender.send(Command::SetLegato(true)));
        assert!(sender.send(Command::SetLegato(false)));
        assert!(!sender.send(Command::SetMaxVoices(4)));
        assert_eq!(sender.slots(), 0);
    }

    #[test]
    fn commands_arrive_in_order() {
        let (mut sender, mut consumer) = CommandSender::new(8);
        sender.send(Command::SetMaxVoices(2));
        sender.send(Command::SetLegato(true));
        assert!(matches!(consumer.pop(), Ok(Command::SetMaxVoices(2))));
        assert!(matches!(consumer.pop(), Ok(Command::SetLegato(true))));
        assert!(consumer.pop().is_err());
    }
}
