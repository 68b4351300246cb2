use crate::components::{AttentionProblem, AttentionSetupError, RingState};
use crate::config::RingAttentionSettings;

/// Head dimensions with a compiled tile specialization.
pub const SUPPORTED_HEAD_DIMS: &[usize] = &[64, 128];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// Number of rows and columns of one (query block, key/value block) tile.
pub struct AttentionTileSize {
    pub seq_q: usize,
    pub seq_kv: usize,
    pub head_dim: usize,
}

impl AttentionTileSize {
    /// Default tile for a head dimension.
    ///
    /// Wider heads get fewer key columns so the scratch workspace stays the same size.
    pub fn for_head_dim(head_dim: usize) -> Option<Self> {
        match head_dim {
            64 => Some(Self {
                seq_q: 32,
                seq_kv: 64,
                head_dim,
            }),
            128 => Some(Self {
                seq_q: 32,
                seq_kv: 32,
                head_dim,
            }),
            _ => None,
        }
    }

    pub fn num_elements_score(&self) -> usize {
        self.seq_q * self.seq_kv
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Everything decided before launching the rounds of one call.
pub struct AttentionSelection {
    pub tile_size: AttentionTileSize,
    pub skip_masked_tiles: bool,
    pub num_threads: Option<usize>,
}

impl AttentionSelection {
    pub fn select(
        problem: &AttentionProblem,
        ring: &RingState,
        settings: &RingAttentionSettings,
    ) -> Result<Self, AttentionSetupError> {
        settings.validate()?;

        let default = AttentionTileSize::for_head_dim(problem.head_dim).ok_or(
            AttentionSetupError::HeadDimUnsupported {
                head_dim: problem.head_dim,
                supported: SUPPORTED_HEAD_DIMS,
            },
        )?;

        let clamp = |tile: usize, local: usize| tile.min(local).max(1);
        let seq_q = settings.tile_seq_q.unwrap_or(default.seq_q);
        let seq_kv = settings.tile_seq_kv.unwrap_or(default.seq_kv);

        Ok(Self {
            tile_size: AttentionTileSize {
                seq_q: clamp(seq_q, problem.local_seq_q(ring)),
                seq_kv: clamp(seq_kv, problem.local_seq_kv(ring)),
                head_dim: default.head_dim,
            },
            skip_masked_tiles: settings.skip_masked_tiles,
            num_threads: settings.num_threads,
        })
    }
}
