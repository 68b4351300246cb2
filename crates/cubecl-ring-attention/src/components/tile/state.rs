use crate::components::AccumulatorElement;
use crate::components::tile::exp_m_diff;

/// Running max and running sum of one query row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RunningState<E: AccumulatorElement> {
    pub m: E,
    pub l: E,
}

impl<E: AccumulatorElement> RunningState<E> {
    /// State of a row that has not seen any key yet.
    pub fn init() -> Self {
        RunningState {
            m: E::neg_infinity(),
            l: E::zero(),
        }
    }

    /// Folds the statistics of one tile into the state.
    ///
    /// Returns the factor by which the previous weighted output must be rescaled.
    pub fn update(&mut self, stats: &RowStats<E>) -> E {
        let exp_m_diff = exp_m_diff(self.m, stats.m);

        self.l = exp_m_diff * self.l + stats.prob_row_sum;
        self.m = stats.m;

        exp_m_diff
    }
}

/// Statistics of one row of a tile, taken relative to the updated max.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RowStats<E: AccumulatorElement> {
    /// Max of the previous running max and every kept score of the row.
    pub m: E,
    /// Sum of `exp(score - m)` over the kept scores of the row.
    pub prob_row_sum: E,
}
