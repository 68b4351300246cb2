use crate::components::tile::RunningState;
use crate::components::{
    AccumulatorElement, AttentionElement, AxisOrder, ResourceError, TensorLayout,
    try_filled_vec, try_with_capacity,
};

/// Accumulator triples of every local query row of one (batch, head).
///
/// Units are independent. Exactly one worker thread writes a unit during a round.
pub struct AccumulatorUnit<E: AccumulatorElement> {
    pub batch: usize,
    pub head: usize,
    /// Running `(m, l)` of each query row.
    pub states: Vec<RunningState<E>>,
    /// Un-normalized weighted output, `[seq, head_dim]`.
    pub out: Vec<E>,
}

/// Accumulator triples of one attention call, created at the start of the ring run
/// and finalized once after the last round.
pub struct AttentionAccumulator<E: AccumulatorElement> {
    units: Vec<AccumulatorUnit<E>>,
    batch: usize,
    num_heads: usize,
    seq_q: usize,
    head_dim: usize,
}

impl<E: AccumulatorElement> AttentionAccumulator<E> {
    pub fn try_new(
        batch: usize,
        num_heads: usize,
        seq_q: usize,
        head_dim: usize,
    ) -> Result<Self, ResourceError> {
        let mut units = try_with_capacity("accumulator units", batch * num_heads)?;

        for b in 0..batch {
            for h in 0..num_heads {
                units.push(AccumulatorUnit {
                    batch: b,
                    head: h,
                    states: try_filled_vec("running state", seq_q, RunningState::init())?,
                    out: try_filled_vec("accumulator", seq_q * head_dim, E::zero())?,
                });
            }
        }

        Ok(Self {
            units,
            batch,
            num_heads,
            seq_q,
            head_dim,
        })
    }

    pub fn units(&self) -> &[AccumulatorUnit<E>] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [AccumulatorUnit<E>] {
        &mut self.units
    }

    /// Normalizes every triple into the attention output and its log-sum-exp.
    ///
    /// A row that never kept a score has `l == 0`. Its output is set to zero, so the
    /// output never holds NaN or an infinity. Its log-sum-exp stays `-inf`, the log of
    /// an empty normalizer, which keeps merging it with other partial results exact.
    pub fn finalize<EO: AttentionElement>(
        &self,
        order: AxisOrder,
    ) -> Result<AttentionOutput<EO, E>, ResourceError> {
        let out_layout =
            TensorLayout::contiguous(order, self.batch, self.num_heads, self.seq_q, self.head_dim);
        let mut out = try_filled_vec("output", out_layout.num_elements(), EO::from_f64(0.0))?;
        let mut lse = try_filled_vec("log-sum-exp", self.units.len() * self.seq_q, E::zero())?;

        for unit in self.units.iter() {
            for (position, state) in unit.states.iter().enumerate() {
                let lse_index = (unit.batch * self.num_heads + unit.head) * self.seq_q + position;

                if state.l == E::zero() {
                    lse[lse_index] = E::neg_infinity();
                    continue;
                }

                let inv_l = state.l.recip();
                let acc = &unit.out[position * self.head_dim..(position + 1) * self.head_dim];
                for (feature, elem) in acc.iter().enumerate() {
                    let index = out_layout.index(unit.batch, unit.head, position, feature);
                    out[index] = (*elem * inv_l).cast_into();
                }

                lse[lse_index] = state.m + state.l.ln();
            }
        }

        Ok(AttentionOutput {
            out,
            out_layout,
            lse,
        })
    }
}

/// Normalized attention output of the local query chunk, with its log-sum-exp.
#[derive(Clone, Debug, PartialEq)]
pub struct AttentionOutput<EO, EL> {
    /// Same shape as the local query chunk.
    pub out: Vec<EO>,
    pub out_layout: TensorLayout,
    /// `[batch, heads, seq]`, `-inf` for rows without any kept score.
    pub lse: Vec<EL>,
}

impl<EO: AttentionElement, EL: AccumulatorElement> AttentionOutput<EO, EL> {
    pub fn out_at(&self, batch: usize, head: usize, position: usize, feature: usize) -> EO {
        self.out[self.out_layout.index(batch, head, position, feature)]
    }

    pub fn lse_at(&self, batch: usize, head: usize, position: usize) -> EL {
        let seq = self.out_layout.seq_len();
        self.lse[(batch * self.out_layout.num_heads() + head) * seq + position]
    }
}
