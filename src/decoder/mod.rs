//! Binary decoders for the CPI events emitted by the tracked programs.
//!
//! Anchor self-CPI events start with a 16-byte discriminator: the 8-byte
//! `event_cpi` instruction tag followed by the 8-byte event tag. Different
//! events of one program share the first half, so matching is always done over
//! all 16 bytes.

pub mod jupiter;
pub mod pump;

pub use jupiter::JupiterSwapEvent;
pub use pump::PumpTradeEvent;

/// Length of an Anchor CPI event discriminator.
pub const DISCRIMINATOR_LEN: usize = 16;

/// Program family an instruction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Jupiter,
    Pump,
}

/// A decoded trade event. Only the decoders construct these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    JupiterSwap(JupiterSwapEvent),
    PumpTrade(PumpTradeEvent),
}

impl Event {
    pub fn program(&self) -> ProgramKind {
        match self {
            Event::JupiterSwap(_) => ProgramKind::Jupiter,
            Event::PumpTrade(_) => ProgramKind::Pump,
        }
    }
}

/// Decode `data` with the decoder of `program`.
///
/// Returns `None` for anything that is not that program's trade event,
/// including truncated or corrupt payloads.
pub fn decode(program: ProgramKind, data: &[u8]) -> Option<Event> {
    match program {
        ProgramKind::Jupiter => jupiter::decode(data).map(Event::JupiterSwap),
        ProgramKind::Pump => pump::decode(data).map(Event::PumpTrade),
    }
}

/// Return the payload after `discriminator` if `data` starts with all 16 bytes of it.
pub(crate) fn strip_discriminator<'a>(
    data: &'a [u8],
    discriminator: &[u8; DISCRIMINATOR_LEN],
) -> Option<&'a [u8]> {
    if data.len() < DISCRIMINATOR_LEN {
        return None;
    }
    let (head, payload) = data.split_at(DISCRIMINATOR_LEN);
    (head == discriminator).then_some(payload)
}
