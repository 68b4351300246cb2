mod local;
mod message;

pub use local::*;
pub use message::*;

use crate::components::{AttentionElement, CommunicationError, KeyValueChunk};

/// Blocking point-to-point exchange between ring neighbours.
///
/// One call sends the held chunk to the next rank and returns once the chunk of the
/// previous rank has been received. Every rank of the ring calls it once per round,
/// with the same `round`.
pub trait RingExchange<E: AttentionElement> {
    fn exchange(
        &mut self,
        round: usize,
        outgoing: KeyValueChunk<E>,
    ) -> Result<KeyValueChunk<E>, CommunicationError>;
}

impl<E: AttentionElement, X: RingExchange<E> + ?Sized> RingExchange<E> for &mut X {
    fn exchange(
        &mut self,
        round: usize,
        outgoing: KeyValueChunk<E>,
    ) -> Result<KeyValueChunk<E>, CommunicationError> {
        (**self).exchange(round, outgoing)
    }
}

/// Exchange of a ring with a single rank, which never has to rotate.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoExchange;

impl<E: AttentionElement> RingExchange<E> for NoExchange {
    fn exchange(
        &mut self,
        _round: usize,
        _outgoing: KeyValueChunk<E>,
    ) -> Result<KeyValueChunk<E>, CommunicationError> {
        Err(CommunicationError::NoPeer)
    }
}
