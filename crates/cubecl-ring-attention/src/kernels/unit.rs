use std::marker::PhantomData;
use std::ops::{AddAssign, Range};

use crate::components::tile::{TileAttention, TileScratch};
use crate::components::{
    AccumulatorElement, AccumulatorUnit, AttentionMask, AttentionPrecision, AttentionTileSize,
    KeyValueChunk, ResourceError, TensorHandleRef, TileMask,
};

/// Parameters shared by every unit of one round.
#[derive(Copy, Clone, Debug)]
pub struct RoundContext {
    pub tile_size: AttentionTileSize,
    pub mask: AttentionMask,
    pub scale: f64,
    pub skip_masked_tiles: bool,
}

/// Tiles visited by the units of a round.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub computed_tiles: usize,
    pub skipped_tiles: usize,
}

impl AddAssign for RoundStats {
    fn add_assign(&mut self, rhs: Self) {
        self.computed_tiles += rhs.computed_tiles;
        self.skipped_tiles += rhs.skipped_tiles;
    }
}

/// Folds the held chunk into the accumulator of one (batch, head).
pub struct UnitAttention<AP: AttentionPrecision, const HEAD_DIM: usize> {
    _phantom: PhantomData<AP>,
}

impl<AP: AttentionPrecision, const HEAD_DIM: usize> UnitAttention<AP, HEAD_DIM> {
    pub fn execute(
        unit: &mut AccumulatorUnit<AP::EA>,
        query: &TensorHandleRef<'_, AP::EI>,
        chunk: &KeyValueChunk<AP::EI>,
        context: &RoundContext,
    ) -> Result<RoundStats, ResourceError> {
        let mut scratch = TileScratch::<AP::EA, HEAD_DIM>::try_new(context.tile_size)?;
        let scale = AP::EA::from_scalar(context.scale);
        let mut stats = RoundStats::default();

        let seq_q = unit.states.len();
        let seq_kv = chunk.seq_len();

        for rows in blocks(seq_q, context.tile_size.seq_q) {
            TileAttention::<AP, HEAD_DIM>::fill_query(
                &mut scratch,
                query,
                unit.batch,
                unit.head,
                rows.clone(),
            );

            let states = &mut unit.states[rows.clone()];
            let out = &mut unit.out[rows.start * HEAD_DIM..rows.end * HEAD_DIM];

            for cols in blocks(seq_kv, context.tile_size.seq_kv) {
                let tile_mask = match context.mask.to_tile(&rows, &cols) {
                    TileMask::Masked if context.skip_masked_tiles => {
                        stats.skipped_tiles += 1;
                        continue;
                    }
                    TileMask::Masked => TileMask::Partial,
                    tile_mask => tile_mask,
                };

                TileAttention::<AP, HEAD_DIM>::fill_key_value(
                    &mut scratch,
                    chunk,
                    unit.batch,
                    unit.head,
                    cols.clone(),
                );
                TileAttention::<AP, HEAD_DIM>::execute(
                    &mut scratch,
                    &rows,
                    &cols,
                    &context.mask,
                    tile_mask,
                    scale,
                    states,
                    out,
                );
                stats.computed_tiles += 1;
            }
        }

        log::trace!(
            "Unit (batch {}, head {}) computed {} tiles and skipped {}",
            unit.batch,
            unit.head,
            stats.computed_tiles,
            stats.skipped_tiles
        );

        Ok(stats)
    }
}

/// Consecutive ranges of at most `block` elements covering `0..len`.
pub(crate) fn blocks(len: usize, block: usize) -> impl Iterator<Item = Range<usize>> {
    (0..len)
        .step_by(block.max(1))
        .map(move |start| start..(start + block).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AttentionAccumulator, AxisOrder, RingState};

    #[test]
    fn blocks_cover_range_with_remainder() {
        let ranges: Vec<_> = blocks(10, 4).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(blocks(0, 4).count(), 0);
    }

    #[test]
    fn masked_tiles_are_skipped_without_changing_result() {
        let seq = 8;
        let query: Vec<f32> = (0..seq * 64).map(|i| ((i % 13) as f32 - 6.0) * 0.1).collect();
        let key: Vec<f32> = (0..seq * 64).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect();
        let value: Vec<f32> = (0..seq * 64).map(|i| (i % 5) as f32).collect();

        let handle = TensorHandleRef::contiguous(&query, AxisOrder::Bhsd, 1, 1, seq, 64);
        let chunk = KeyValueChunk::new(0, [1, 1, seq, 64], key, value);
        let ring = RingState::new(0, 1);

        let run = |skip_masked_tiles: bool| {
            let context = RoundContext {
                tile_size: AttentionTileSize {
                    seq_q: 2,
                    seq_kv: 2,
                    head_dim: 64,
                },
                mask: AttentionMask::new(true, ring.positions(0, seq), ring.positions(0, seq)),
                scale: 0.125,
                skip_masked_tiles,
            };
            let mut acc = AttentionAccumulator::<f32>::try_new(1, 1, seq, 64).unwrap();
            let stats =
                UnitAttention::<f32, 64>::execute(&mut acc.units_mut()[0], &handle, &chunk, &context)
                    .unwrap();
            (stats, acc.finalize::<f32>(AxisOrder::Bhsd).unwrap())
        };

        let (skipping, out_skipping) = run(true);
        let (full, out_full) = run(false);

        // 4x4 grid of tiles, 6 above the diagonal
        assert_eq!(
            skipping,
            RoundStats {
                computed_tiles: 10,
                skipped_tiles: 6,
            }
        );
        assert_eq!(full.computed_tiles, 16);
        assert_eq!(out_skipping, out_full);
    }
}
