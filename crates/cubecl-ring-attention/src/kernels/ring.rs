use std::marker::PhantomData;

use crate::components::{
    AttentionAccumulator, AttentionIdent, AttentionMask, AttentionOutput, AttentionPrecision,
    AttentionProblem, AttentionSelection, KeyValueChunk, KeyValueRingBuffer, ResourceError,
    RingAttentionError, RingState, TensorHandleRef,
};
use crate::config::RingAttentionSettings;
use crate::exchange::RingExchange;
use crate::kernels::{RoundContext, launch_round};

/// Phase of one ring attention call.
///
/// `Init -> {Compute(r) -> Exchange(r)}* -> Finalize -> Done`, the last round going
/// from `Compute` straight to `Finalize`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingPhase {
    Init,
    Compute(usize),
    Exchange(usize),
    Finalize,
    Done,
}

impl RingPhase {
    pub fn next(self, world_size: usize) -> RingPhase {
        match self {
            RingPhase::Init => RingPhase::Compute(0),
            RingPhase::Compute(round) if round + 1 < world_size => RingPhase::Exchange(round),
            RingPhase::Compute(_) => RingPhase::Finalize,
            RingPhase::Exchange(round) => RingPhase::Compute(round + 1),
            RingPhase::Finalize | RingPhase::Done => RingPhase::Done,
        }
    }
}

/// Drives the rounds of ring attention for one worker.
pub struct RingAttention<AP: AttentionPrecision> {
    _phantom: PhantomData<AP>,
}

impl<AP: AttentionPrecision> RingAttention<AP> {
    /// Computes attention of the local query chunk against the whole key/value sequence.
    ///
    /// Every rank of the ring must call this with the same problem and settings. The call
    /// blocks during each exchange and aborts on the first failure, dropping every buffer
    /// it allocated.
    pub fn run<X: RingExchange<AP::EI>>(
        problem: &AttentionProblem,
        ring: &RingState,
        query: &TensorHandleRef<'_, AP::EI>,
        key: &TensorHandleRef<'_, AP::EI>,
        value: &TensorHandleRef<'_, AP::EI>,
        settings: &RingAttentionSettings,
        exchange: &mut X,
    ) -> Result<AttentionOutput<AP::EO, AP::EA>, RingAttentionError> {
        problem.validate(ring)?;

        let local_seq_q = problem.local_seq_q(ring);
        let local_seq_kv = problem.local_seq_kv(ring);
        let [batch, heads, dim] = [problem.batch, problem.num_heads, problem.head_dim];

        query.validate(AttentionIdent::Query, [batch, heads, local_seq_q, dim])?;
        key.validate(AttentionIdent::Key, [batch, heads, local_seq_kv, dim])?;
        value.validate(AttentionIdent::Value, [batch, heads, local_seq_kv, dim])?;

        let selection = AttentionSelection::select(problem, ring, settings)?;
        let pool = match selection.num_threads {
            Some(num_threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|err| ResourceError::ThreadPool(err.to_string()))?,
            ),
            None => None,
        };

        let mut phase = RingPhase::Init;
        log::debug!(
            "Rank {}/{} {phase:?}: {} x {} local positions, tile {:?}",
            ring.rank,
            ring.world_size,
            local_seq_q,
            local_seq_kv,
            selection.tile_size
        );

        let mut accumulator =
            AttentionAccumulator::<AP::EA>::try_new(batch, heads, local_seq_q, dim)?;
        let mut buffer =
            KeyValueRingBuffer::new(KeyValueChunk::from_handles(key, value, ring.rank)?, *ring);
        let query_positions = ring.positions(ring.rank, local_seq_q);

        phase = phase.next(ring.world_size);
        loop {
            match phase {
                RingPhase::Compute(_) => {
                    let source_rank = buffer.current().source_rank;
                    let context = RoundContext {
                        tile_size: selection.tile_size,
                        mask: AttentionMask::new(
                            problem.causal,
                            query_positions,
                            ring.positions(source_rank, local_seq_kv),
                        ),
                        scale: problem.scale(),
                        skip_masked_tiles: selection.skip_masked_tiles,
                    };

                    let units = accumulator.units_mut();
                    let chunk = buffer.current();
                    let stats = match &pool {
                        Some(pool) => {
                            pool.install(|| launch_round::<AP>(dim, units, query, chunk, &context))
                        }
                        None => launch_round::<AP>(dim, units, query, chunk, &context),
                    }?;

                    log::debug!(
                        "Rank {} {phase:?}: chunk of rank {source_rank}, {} tiles computed, {} skipped",
                        ring.rank,
                        stats.computed_tiles,
                        stats.skipped_tiles
                    );
                }
                RingPhase::Exchange(_) => {
                    buffer = buffer.rotate(exchange)?;
                    log::debug!(
                        "Rank {} {phase:?}: holding chunk of rank {} for round {}",
                        ring.rank,
                        buffer.current().source_rank,
                        buffer.round()
                    );
                }
                _ => break,
            }

            phase = phase.next(ring.world_size);
        }

        log::debug!("Rank {} {phase:?}", ring.rank);
        let output = accumulator.finalize::<AP::EO>(query.layout.axis_order())?;

        phase = phase.next(ring.world_size);
        log::debug!("Rank {} {phase:?}", ring.rank);

        Ok(output)
    }
}
