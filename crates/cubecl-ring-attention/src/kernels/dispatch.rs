use rayon::prelude::*;

use crate::components::{
    AccumulatorUnit, AttentionPrecision, AttentionSetupError, KeyValueChunk, RingAttentionError,
    SUPPORTED_HEAD_DIMS, TensorHandleRef,
};
use crate::kernels::{RoundContext, RoundStats, UnitAttention};

/// Launches one round over every accumulator unit, with the kernel specialized for `head_dim`.
pub fn launch_round<AP: AttentionPrecision>(
    head_dim: usize,
    units: &mut [AccumulatorUnit<AP::EA>],
    query: &TensorHandleRef<'_, AP::EI>,
    chunk: &KeyValueChunk<AP::EI>,
    context: &RoundContext,
) -> Result<RoundStats, RingAttentionError> {
    match head_dim {
        64 => launch_round_specialized::<AP, 64>(units, query, chunk, context),
        128 => launch_round_specialized::<AP, 128>(units, query, chunk, context),
        _ => Err(AttentionSetupError::HeadDimUnsupported {
            head_dim,
            supported: SUPPORTED_HEAD_DIMS,
        }
        .into()),
    }
}

fn launch_round_specialized<AP: AttentionPrecision, const HEAD_DIM: usize>(
    units: &mut [AccumulatorUnit<AP::EA>],
    query: &TensorHandleRef<'_, AP::EI>,
    chunk: &KeyValueChunk<AP::EI>,
    context: &RoundContext,
) -> Result<RoundStats, RingAttentionError> {
    let unit_stats = units
        .par_iter_mut()
        .map(|unit| UnitAttention::<AP, HEAD_DIM>::execute(unit, query, chunk, context))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stats = RoundStats::default();
    for unit in unit_stats {
        stats += unit;
    }

    Ok(stats)
}
