use crate::components::{AccumulatorElement, AttentionTileSize, ResourceError, try_filled_vec};

/// Kernel-local workspace holding one tile widened to the accumulator precision.
///
/// Rows are `HEAD_DIM` wide. The query part is filled once per query block and the
/// key/value part once per key/value block. Partial tiles at the end of a chunk only
/// use the first `rows` or `cols` rows.
pub struct TileScratch<E: AccumulatorElement, const HEAD_DIM: usize> {
    pub(crate) query: Vec<E>,
    pub(crate) key: Vec<E>,
    pub(crate) value: Vec<E>,
    pub(crate) score: Vec<E>,
    pub(crate) rows: usize,
    pub(crate) cols: usize,
}

impl<E: AccumulatorElement, const HEAD_DIM: usize> TileScratch<E, HEAD_DIM> {
    pub fn try_new(tile_size: AttentionTileSize) -> Result<Self, ResourceError> {
        Ok(Self {
            query: try_filled_vec("query tile", tile_size.seq_q * HEAD_DIM, E::zero())?,
            key: try_filled_vec("key tile", tile_size.seq_kv * HEAD_DIM, E::zero())?,
            value: try_filled_vec("value tile", tile_size.seq_kv * HEAD_DIM, E::zero())?,
            score: try_filled_vec("score tile", tile_size.num_elements_score(), E::zero())?,
            rows: 0,
            cols: 0,
        })
    }
}
