use std::ops::Range;

use crate::components::SequencePositions;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttentionMask {
    /// Mask is applied logically, from the global positions of queries and keys.
    Logical(LogicalMask),

    /// No mask is applied at all.
    None,
}

impl AttentionMask {
    /// Mask between the query chunk of this rank and the key chunk held in the current round.
    pub fn new(causal: bool, query: SequencePositions, key: SequencePositions) -> AttentionMask {
        if causal {
            AttentionMask::Logical(LogicalMask { query, key })
        } else {
            AttentionMask::None
        }
    }

    /// Whether the score between local query `row` and local key `col` is suppressed.
    #[inline]
    pub fn should_mask(&self, row: usize, col: usize) -> bool {
        match self {
            AttentionMask::Logical(mask) => mask.should_mask(row, col),
            AttentionMask::None => false,
        }
    }

    /// How a tile of local query `rows` and local key `cols` is affected by the mask.
    ///
    /// Both ranges must be non-empty.
    pub fn to_tile(&self, rows: &Range<usize>, cols: &Range<usize>) -> TileMask {
        match self {
            AttentionMask::Logical(mask) => mask.to_tile(rows, cols),
            AttentionMask::None => TileMask::Visible,
        }
    }
}

/// Causal mask over global positions.
///
/// A key is masked when its global position is after the global position of the query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LogicalMask {
    query: SequencePositions,
    key: SequencePositions,
}

impl LogicalMask {
    #[inline]
    pub fn should_mask(&self, row: usize, col: usize) -> bool {
        self.key.global(col) > self.query.global(row)
    }

    pub fn to_tile(&self, rows: &Range<usize>, cols: &Range<usize>) -> TileMask {
        let (q_min, q_max) = self.query.bounds(rows.start, rows.end);
        let (k_min, k_max) = self.key.bounds(cols.start, cols.end);

        if k_min > q_max {
            TileMask::Masked
        } else if k_max <= q_min {
            TileMask::Visible
        } else {
            TileMask::Partial
        }
    }
}

/// Effect of the mask on a whole tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileMask {
    /// Every score of the tile is kept.
    Visible,
    /// Some scores are kept, others must be checked one by one.
    Partial,
    /// Every score of the tile is suppressed.
    Masked,
}
