use derive_new::new;

use crate::components::{
    AttentionElement, CommunicationError, RingAttentionError, RingState, TensorHandleRef,
    TensorLayout, try_with_capacity,
};
use crate::exchange::RingExchange;

#[derive(new, Clone, Debug, PartialEq)]
/// Key and value data of one rank, the unit travelling around the ring.
///
/// Both tensors are contiguous `[batch, heads, seq, head_dim]`.
pub struct KeyValueChunk<E> {
    /// Rank that owns this part of the sequence.
    pub source_rank: usize,
    /// `[batch, heads, seq, head_dim]`
    pub shape: [usize; 4],
    pub key: Vec<E>,
    pub value: Vec<E>,
}

impl<E: AttentionElement> KeyValueChunk<E> {
    /// Gathers the key and value handles of `source_rank` into a contiguous chunk.
    pub fn from_handles(
        key: &TensorHandleRef<'_, E>,
        value: &TensorHandleRef<'_, E>,
        source_rank: usize,
    ) -> Result<Self, RingAttentionError> {
        let shape = key.layout.shape;

        Ok(Self {
            source_rank,
            shape,
            key: gather(key, "key ring buffer")?,
            value: gather(value, "value ring buffer")?,
        })
    }

    pub fn layout(&self) -> TensorLayout {
        let [batch, heads, seq, dim] = self.shape;
        TensorLayout::bhsd(batch, heads, seq, dim)
    }

    pub fn seq_len(&self) -> usize {
        self.shape[2]
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn key_row(&self, batch: usize, head: usize, position: usize) -> &[E] {
        let start = self.layout().index(batch, head, position, 0);
        &self.key[start..start + self.shape[3]]
    }

    pub fn value_row(&self, batch: usize, head: usize, position: usize) -> &[E] {
        let start = self.layout().index(batch, head, position, 0);
        &self.value[start..start + self.shape[3]]
    }
}

fn gather<E: AttentionElement>(
    handle: &TensorHandleRef<'_, E>,
    buffer: &'static str,
) -> Result<Vec<E>, RingAttentionError> {
    let [batch, heads, seq, dim] = handle.layout.shape;
    let mut data = try_with_capacity(buffer, handle.layout.num_elements())?;

    for b in 0..batch {
        for h in 0..heads {
            for s in 0..seq {
                data.extend((0..dim).map(|d| handle.get(b, h, s, d)));
            }
        }
    }

    Ok(data)
}

/// Holds the chunk this worker computes against in the current round.
///
/// The chunk is handed over by value to the exchange, so it can't be read while an
/// exchange is in flight. The source rank of the held chunk always matches the ring order.
pub struct KeyValueRingBuffer<E> {
    chunk: KeyValueChunk<E>,
    ring: RingState,
    round: usize,
}

impl<E: AttentionElement> KeyValueRingBuffer<E> {
    /// Buffer at round 0, holding the worker's own chunk.
    pub fn new(chunk: KeyValueChunk<E>, ring: RingState) -> Self {
        Self {
            chunk,
            ring,
            round: 0,
        }
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn current(&self) -> &KeyValueChunk<E> {
        &self.chunk
    }

    /// Sends the held chunk to the next rank and holds the one received from the previous rank.
    pub fn rotate<X: RingExchange<E>>(self, exchange: &mut X) -> Result<Self, RingAttentionError> {
        let round = self.round;
        let shape = self.chunk.shape;
        let expected = self.ring.source_rank(round + 1);

        log::trace!(
            "Rank {} sends chunk of rank {} to rank {} at round {round}",
            self.ring.rank,
            self.chunk.source_rank,
            self.ring.next_rank(),
        );

        let received = exchange.exchange(round, self.chunk)?;

        if received.source_rank != expected {
            return Err(CommunicationError::UnexpectedSource {
                round,
                expected,
                received: received.source_rank,
            }
            .into());
        }

        let num_elements = received.num_elements();
        if received.shape != shape
            || received.key.len() != num_elements
            || received.value.len() != num_elements
        {
            return Err(CommunicationError::Malformed {
                round,
                reason: format!(
                    "chunk of shape {:?} with {} key and {} value elements, expected shape {shape:?}",
                    received.shape,
                    received.key.len(),
                    received.value.len(),
                ),
            }
            .into());
        }

        Ok(Self {
            chunk: received,
            ring: self.ring,
            round: round + 1,
        })
    }
}
