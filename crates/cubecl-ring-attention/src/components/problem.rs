use derive_new::new;

use crate::components::{
    AttentionSetupError, FormattedConfigError, RingState, SUPPORTED_HEAD_DIMS,
};

#[derive(new, Clone, Debug, PartialEq)]
/// Description of an attention problem to solve, regardless of actual data
///
/// Sequence lengths are global: they count every position of the ring, not only
/// the chunk held by one rank.
pub struct AttentionProblem {
    /// Batch size
    pub batch: usize,
    /// Number of attention heads
    pub num_heads: usize,

    /// Global query sequence length
    pub seq_q: usize,
    /// Global key/value sequence length
    pub seq_kv: usize,
    /// Dimension of each head (d)
    pub head_dim: usize,

    /// Whether a query may only attend to keys at or before its own position
    pub causal: bool,

    /// Factor applied to every `q·k` score. Defaults to `1 / sqrt(head_dim)`.
    #[new(default)]
    pub softmax_scale: Option<f64>,
}

impl AttentionProblem {
    pub fn with_softmax_scale(mut self, softmax_scale: f64) -> Self {
        self.softmax_scale = Some(softmax_scale);
        self
    }

    /// Effective softmax scale.
    pub fn scale(&self) -> f64 {
        self.softmax_scale
            .unwrap_or_else(|| 1.0 / (self.head_dim as f64).sqrt())
    }

    /// Query length held by one rank.
    pub fn local_seq_q(&self, ring: &RingState) -> usize {
        self.seq_q / ring.world_size
    }

    /// Key/value length held by one rank.
    pub fn local_seq_kv(&self, ring: &RingState) -> usize {
        self.seq_kv / ring.world_size
    }

    /// Checks the problem against the ring it runs on.
    pub fn validate(&self, ring: &RingState) -> Result<(), AttentionSetupError> {
        if !SUPPORTED_HEAD_DIMS.contains(&self.head_dim) {
            return Err(AttentionSetupError::HeadDimUnsupported {
                head_dim: self.head_dim,
                supported: SUPPORTED_HEAD_DIMS,
            });
        }

        ring.validate()?;
        ring.check_divisible(self.seq_q)?;
        ring.check_divisible(self.seq_kv)?;

        if let Some(scale) = self.softmax_scale.filter(|scale| !scale.is_finite()) {
            return Err(FormattedConfigError::new(move || {
                format!("Softmax scale must be finite, got {scale}")
            })
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::RingSchedule;

    #[test]
    fn default_scale_is_inverse_sqrt_head_dim() {
        let problem = AttentionProblem::new(1, 1, 8, 8, 64, false);
        assert_eq!(problem.scale(), 0.125);

        let problem = problem.with_softmax_scale(0.5);
        assert_eq!(problem.scale(), 0.5);
    }

    #[test]
    fn unsupported_head_dim_is_rejected() {
        let problem = AttentionProblem::new(1, 1, 8, 8, 96, false);
        let err = problem.validate(&RingState::new(0, 2)).unwrap_err();

        assert!(matches!(
            err,
            AttentionSetupError::HeadDimUnsupported { head_dim: 96, .. }
        ));
    }

    #[test]
    fn uneven_sequence_is_rejected() {
        let problem = AttentionProblem::new(1, 1, 10, 10, 64, false);
        let err = problem.validate(&RingState::new(0, 4)).unwrap_err();

        assert!(matches!(
            err,
            AttentionSetupError::SequenceNotDivisible {
                seq_len: 10,
                world_size: 4,
                blocks_per_rank: 1,
            }
        ));
    }

    #[test]
    fn zigzag_needs_two_blocks_per_rank() {
        let problem = AttentionProblem::new(1, 1, 9, 9, 64, true);

        assert!(problem.validate(&RingState::new(0, 3)).is_ok());
        assert!(
            problem
                .validate(&RingState::new(0, 3).with_schedule(RingSchedule::ZigZag))
                .is_err()
        );
    }

    #[test]
    fn non_finite_scale_is_rejected() {
        let problem = AttentionProblem::new(1, 1, 4, 4, 64, false).with_softmax_scale(f64::NAN);
        let err = problem.validate(&RingState::new(0, 1)).unwrap_err();

        assert!(matches!(err, AttentionSetupError::InvalidConfig(_)));
    }

    #[test]
    fn oversized_ring_is_a_config_error() {
        let problem = AttentionProblem::new(1, 1, 8, 8, 64, true);
        let ring = RingState::new(0, usize::MAX).with_schedule(RingSchedule::ZigZag);

        assert!(matches!(
            problem.validate(&ring),
            Err(AttentionSetupError::SequenceNotDivisible { .. })
        ));
    }
}
