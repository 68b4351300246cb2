use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::components::AttentionSetupError;

/// How the global sequence is split between the ranks of the ring.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RingSchedule {
    /// Rank `r` owns the `r`-th contiguous slice of the sequence.
    #[default]
    Contiguous,
    /// The sequence is cut into `2 * world_size` blocks and rank `r` owns blocks
    /// `r` and `2 * world_size - 1 - r`. Under a causal mask every rank then does
    /// the same amount of work.
    ZigZag,
}

impl RingSchedule {
    pub fn blocks_per_rank(&self) -> usize {
        match self {
            RingSchedule::Contiguous => 1,
            RingSchedule::ZigZag => 2,
        }
    }
}

#[derive(new, Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// Position of one worker in the ring.
pub struct RingState {
    pub rank: usize,
    pub world_size: usize,
    #[new(default)]
    pub schedule: RingSchedule,
}

impl RingState {
    pub fn with_schedule(mut self, schedule: RingSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn validate(&self) -> Result<(), AttentionSetupError> {
        if self.world_size == 0 || self.rank >= self.world_size {
            return Err(AttentionSetupError::InvalidRing {
                rank: self.rank,
                world_size: self.world_size,
            });
        }

        Ok(())
    }

    /// Checks that a global sequence length splits evenly between the ranks.
    pub fn check_divisible(&self, seq_len: usize) -> Result<(), AttentionSetupError> {
        let blocks_per_rank = self.schedule.blocks_per_rank();
        let num_blocks = self.world_size.checked_mul(blocks_per_rank);

        if num_blocks.is_none_or(|num_blocks| seq_len % num_blocks != 0) {
            return Err(AttentionSetupError::SequenceNotDivisible {
                seq_len,
                world_size: self.world_size,
                blocks_per_rank,
            });
        }

        Ok(())
    }

    /// Rank receiving this worker's chunk at every exchange.
    pub fn next_rank(&self) -> usize {
        (self.rank + 1) % self.world_size
    }

    /// Rank sending its chunk to this worker at every exchange.
    pub fn prev_rank(&self) -> usize {
        (self.rank + self.world_size - 1) % self.world_size
    }

    /// Rank whose key/value chunk is held at the given step.
    pub fn source_rank(&self, step: usize) -> usize {
        (self.rank + self.world_size - step % self.world_size) % self.world_size
    }

    /// Global positions of the chunk owned by `owner`, of length `local_len`.
    pub fn positions(&self, owner: usize, local_len: usize) -> SequencePositions {
        SequencePositions {
            owner,
            local_len,
            world_size: self.world_size,
            schedule: self.schedule,
        }
    }
}

/// Maps the local indices of one rank's chunk to global sequence positions.
///
/// The mapping is strictly increasing in the local index for both schedules, so the
/// positions of a contiguous local range are bounded by those of its endpoints.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequencePositions {
    pub owner: usize,
    pub local_len: usize,
    world_size: usize,
    schedule: RingSchedule,
}

impl SequencePositions {
    #[inline]
    pub fn global(&self, local: usize) -> usize {
        match self.schedule {
            RingSchedule::Contiguous => self.owner * self.local_len + local,
            RingSchedule::ZigZag => {
                let block = self.local_len / 2;
                if local < block {
                    self.owner * block + local
                } else {
                    (2 * self.world_size - 1 - self.owner) * block + local - block
                }
            }
        }
    }

    /// Smallest and largest global positions of a non-empty local range.
    pub fn bounds(&self, start: usize, end: usize) -> (usize, usize) {
        (self.global(start), self.global(end - 1))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.local_len).map(|local| self.global(local))
    }
}
