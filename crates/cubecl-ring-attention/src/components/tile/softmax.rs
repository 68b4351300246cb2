use crate::components::AccumulatorElement;
use crate::components::tile::RowStats;

/// `exp(prev_m - new_m)`, with a row that has never seen a key rescaled by zero.
///
/// Without the special case `-inf - -inf` would produce NaN.
#[inline]
pub fn exp_m_diff<E: AccumulatorElement>(prev_m: E, new_m: E) -> E {
    if prev_m == E::neg_infinity() {
        E::zero()
    } else {
        (prev_m - new_m).exp()
    }
}

/// Max of `prev_m` and every kept score of the row. Masked scores hold `-inf`.
#[inline]
pub fn row_max<E: AccumulatorElement>(scores: &[E], prev_m: E) -> E {
    scores.iter().fold(prev_m, |max, score| max.max(*score))
}

/// Turns the scores of one row into probabilities relative to the row max `m`, in place.
///
/// Masked scores become zero. Returns the statistics of the row.
pub fn to_prob<E: AccumulatorElement>(scores: &mut [E], m: E) -> RowStats<E> {
    let mut prob_row_sum = E::zero();

    if m == E::neg_infinity() {
        scores.fill(E::zero());
    } else {
        for score in scores.iter_mut() {
            *score = if *score == E::neg_infinity() {
                E::zero()
            } else {
                (*score - m).exp()
            };
            prob_row_sum = prob_row_sum + *score;
        }
    }

    RowStats { m, prob_row_sum }
}
