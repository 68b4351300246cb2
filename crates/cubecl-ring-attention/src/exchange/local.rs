use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::components::{AttentionElement, CommunicationError, KeyValueChunk};
use crate::exchange::{ChunkMessage, RingExchange};

/// In-process ring where every rank runs on its own thread.
///
/// Rank `r` sends to rank `r + 1` over a channel holding a single message, so a rank
/// can't overwrite a chunk its neighbour has not consumed yet.
pub struct LocalRing {
    rank: usize,
    world_size: usize,
    timeout: Duration,
    sender: Sender<ChunkMessage>,
    receiver: Receiver<ChunkMessage>,
}

impl LocalRing {
    /// One endpoint per rank, in rank order.
    pub fn endpoints(world_size: usize, timeout: Duration) -> Vec<LocalRing> {
        let (mut senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| bounded(1)).unzip();

        // the channel of rank r + 1 is fed by rank r
        if world_size > 0 {
            senders.rotate_left(1);
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (sender, receiver))| LocalRing {
                rank,
                world_size,
                timeout,
                sender,
                receiver,
            })
            .collect()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    fn next_rank(&self) -> usize {
        (self.rank + 1) % self.world_size
    }

    fn prev_rank(&self) -> usize {
        (self.rank + self.world_size - 1) % self.world_size
    }
}

impl<E: AttentionElement> RingExchange<E> for LocalRing {
    fn exchange(
        &mut self,
        round: usize,
        outgoing: KeyValueChunk<E>,
    ) -> Result<KeyValueChunk<E>, CommunicationError> {
        let message = ChunkMessage::encode(round, &outgoing);
        drop(outgoing);

        self.sender
            .send_timeout(message, self.timeout)
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => CommunicationError::Timeout {
                    round,
                    peer: self.next_rank(),
                },
                SendTimeoutError::Disconnected(_) => CommunicationError::Disconnected {
                    round,
                    peer: self.next_rank(),
                },
            })?;

        let message = self
            .receiver
            .recv_timeout(self.timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => CommunicationError::Timeout {
                    round,
                    peer: self.prev_rank(),
                },
                RecvTimeoutError::Disconnected => CommunicationError::Disconnected {
                    round,
                    peer: self.prev_rank(),
                },
            })?;

        log::trace!(
            "Rank {} received chunk of rank {} at round {round}",
            self.rank,
            message.source_rank
        );

        message.decode(round)
    }
}
