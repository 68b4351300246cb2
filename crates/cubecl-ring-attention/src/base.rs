use std::sync::Arc;

use crate::components::{
    AttentionOutput, AttentionPrecision, AttentionProblem, FormattedConfigError,
    RingAttentionError, RingState, TensorHandleRef, TensorLayout,
};
use crate::config::{GlobalSettings, RingAttentionSettings};
use crate::exchange::{NoExchange, RingExchange};
use crate::kernels::RingAttention;

/// Output of ring attention for precision `AP`.
pub type RingAttentionOutput<AP> =
    AttentionOutput<<AP as AttentionPrecision>::EO, <AP as AttentionPrecision>::EA>;

pub enum Strategy {
    /// Settings from [`GlobalSettings`].
    Default,
    /// Explicit settings for this call.
    Custom(RingAttentionSettings),
}

impl Strategy {
    pub fn settings(&self) -> Arc<RingAttentionSettings> {
        match self {
            Strategy::Default => GlobalSettings::get(),
            Strategy::Custom(settings) => Arc::new(settings.clone()),
        }
    }
}

/// Launches ring attention on the local chunks of separate query, key and value tensors.
///
/// Each handle holds `seq / world_size` positions of the global sequence. Blocks until
/// every round has completed, exchanging key/value chunks through `exchange`.
pub fn launch<AP: AttentionPrecision, X: RingExchange<AP::EI>>(
    strategy: &Strategy,
    problem: &AttentionProblem,
    ring: &RingState,
    query: &TensorHandleRef<'_, AP::EI>,
    key: &TensorHandleRef<'_, AP::EI>,
    value: &TensorHandleRef<'_, AP::EI>,
    exchange: &mut X,
) -> Result<RingAttentionOutput<AP>, RingAttentionError> {
    let settings = strategy.settings();
    RingAttention::<AP>::run(problem, ring, query, key, value, &settings, exchange)
}

/// Launches ring attention on a packed `(batch, seq, 3, heads, dim)` local buffer.
pub fn launch_qkv_packed<AP: AttentionPrecision, X: RingExchange<AP::EI>>(
    strategy: &Strategy,
    problem: &AttentionProblem,
    ring: &RingState,
    qkv: &[AP::EI],
    exchange: &mut X,
) -> Result<RingAttentionOutput<AP>, RingAttentionError> {
    problem.validate(ring)?;

    if problem.seq_q != problem.seq_kv {
        let (seq_q, seq_kv) = (problem.seq_q, problem.seq_kv);
        return Err(FormattedConfigError::new(move || {
            format!("Packed qkv needs equal query and key lengths, got {seq_q} and {seq_kv}")
        })
        .into());
    }

    let [query, key, value] = TensorLayout::qkv_packed(
        problem.batch,
        problem.local_seq_q(ring),
        problem.num_heads,
        problem.head_dim,
    );

    launch::<AP, X>(
        strategy,
        problem,
        ring,
        &TensorHandleRef::new(qkv, query),
        &TensorHandleRef::new(qkv, key),
        &TensorHandleRef::new(qkv, value),
        exchange,
    )
}

/// Launches ring attention on a query tensor and a packed `(batch, seq, 2, heads, dim)` key/value buffer.
pub fn launch_kv_packed<AP: AttentionPrecision, X: RingExchange<AP::EI>>(
    strategy: &Strategy,
    problem: &AttentionProblem,
    ring: &RingState,
    query: &TensorHandleRef<'_, AP::EI>,
    kv: &[AP::EI],
    exchange: &mut X,
) -> Result<RingAttentionOutput<AP>, RingAttentionError> {
    problem.validate(ring)?;

    let [key, value] = TensorLayout::kv_packed(
        problem.batch,
        problem.local_seq_kv(ring),
        problem.num_heads,
        problem.head_dim,
    );

    launch::<AP, X>(
        strategy,
        problem,
        ring,
        query,
        &TensorHandleRef::new(kv, key),
        &TensorHandleRef::new(kv, value),
        exchange,
    )
}

/// Launches attention on a ring of one, where every tensor holds the whole sequence.
pub fn launch_local<AP: AttentionPrecision>(
    strategy: &Strategy,
    problem: &AttentionProblem,
    query: &TensorHandleRef<'_, AP::EI>,
    key: &TensorHandleRef<'_, AP::EI>,
    value: &TensorHandleRef<'_, AP::EI>,
) -> Result<RingAttentionOutput<AP>, RingAttentionError> {
    launch::<AP, NoExchange>(
        strategy,
        problem,
        &RingState::new(0, 1),
        query,
        key,
        value,
        &mut NoExchange,
    )
}
