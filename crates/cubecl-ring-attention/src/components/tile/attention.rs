use std::marker::PhantomData;
use std::ops::Range;

use num_traits::{Float, Zero};

use crate::components::tile::{RunningState, TileScratch, row_max, to_prob};
use crate::components::{
    AccumulatorElement, AttentionMask, AttentionPrecision, KeyValueChunk, TensorHandleRef,
    TileMask,
};

/// Online-softmax attention of one query block against one key/value block.
///
/// The block contribution is folded into the running `(m, l, out)` triple of every query
/// row of the block. Nothing outside the triple survives between two calls.
pub struct TileAttention<AP: AttentionPrecision, const HEAD_DIM: usize> {
    _phantom: PhantomData<AP>,
}

impl<AP: AttentionPrecision, const HEAD_DIM: usize> TileAttention<AP, HEAD_DIM> {
    /// Loads the local query `rows` of one (batch, head) into the workspace.
    pub fn fill_query(
        scratch: &mut TileScratch<AP::EA, HEAD_DIM>,
        query: &TensorHandleRef<'_, AP::EI>,
        batch: usize,
        head: usize,
        rows: Range<usize>,
    ) {
        for (row, position) in rows.clone().enumerate() {
            let line = &mut scratch.query[row * HEAD_DIM..(row + 1) * HEAD_DIM];
            for (feature, elem) in line.iter_mut().enumerate() {
                *elem = AP::EA::cast_from(query.get(batch, head, position, feature));
            }
        }

        scratch.rows = rows.len();
    }

    /// Loads the key and value `cols` of the held chunk for one (batch, head) into the workspace.
    pub fn fill_key_value(
        scratch: &mut TileScratch<AP::EA, HEAD_DIM>,
        chunk: &KeyValueChunk<AP::EI>,
        batch: usize,
        head: usize,
        cols: Range<usize>,
    ) {
        for (col, position) in cols.clone().enumerate() {
            let dst = col * HEAD_DIM..(col + 1) * HEAD_DIM;

            let key = chunk.key_row(batch, head, position);
            for (elem, value) in scratch.key[dst.clone()].iter_mut().zip(key) {
                *elem = AP::EA::cast_from(*value);
            }

            let value = chunk.value_row(batch, head, position);
            for (elem, value) in scratch.value[dst].iter_mut().zip(value) {
                *elem = AP::EA::cast_from(*value);
            }
        }

        scratch.cols = cols.len();
    }

    /// Folds the tile currently in the workspace into the triple of its query rows.
    ///
    /// `rows` and `cols` are the local positions the workspace was filled with, used to
    /// look up the mask. `states` and `out` hold the triple of exactly those query rows.
    pub fn execute(
        scratch: &mut TileScratch<AP::EA, HEAD_DIM>,
        rows: &Range<usize>,
        cols: &Range<usize>,
        mask: &AttentionMask,
        tile_mask: TileMask,
        scale: AP::EA,
        states: &mut [RunningState<AP::EA>],
        out: &mut [AP::EA],
    ) {
        let num_rows = scratch.rows;
        let num_cols = scratch.cols;

        for row in 0..num_rows {
            let query = &scratch.query[row * HEAD_DIM..(row + 1) * HEAD_DIM];
            let scores = &mut scratch.score[row * num_cols..(row + 1) * num_cols];

            for (col, score) in scores.iter_mut().enumerate() {
                let masked = match tile_mask {
                    TileMask::Visible => false,
                    TileMask::Partial => mask.should_mask(rows.start + row, cols.start + col),
                    TileMask::Masked => true,
                };

                *score = if masked {
                    AP::EA::neg_infinity()
                } else {
                    scale * dot::<AP::EA, HEAD_DIM>(query, &scratch.key[col * HEAD_DIM..])
                };
            }

            let state = &mut states[row];
            let m = row_max(scores, state.m);
            let stats = to_prob(scores, m);
            let exp_m_diff = state.update(&stats);

            let acc = &mut out[row * HEAD_DIM..(row + 1) * HEAD_DIM];
            for elem in acc.iter_mut() {
                *elem = *elem * exp_m_diff;
            }

            for (col, prob) in scores.iter().enumerate() {
                if prob.is_zero() {
                    continue;
                }

                let value = &scratch.value[col * HEAD_DIM..(col + 1) * HEAD_DIM];
                for (elem, v) in acc.iter_mut().zip(value) {
                    *elem = *elem + *prob * *v;
                }
            }
        }
    }
}

#[inline]
fn dot<E: AccumulatorElement, const N: usize>(lhs: &[E], rhs: &[E]) -> E {
    lhs[..N]
        .iter()
        .zip(&rhs[..N])
        .fold(E::zero(), |acc, (l, r)| acc + *l * *r)
}
