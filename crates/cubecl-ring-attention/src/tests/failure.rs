use std::time::Duration;

use crate::components::{
    AttentionProblem, AttentionSetupError, AxisOrder, CommunicationError, KeyValueChunk,
    RingAttentionError, RingSchedule, RingState, TensorHandleRef,
};
use crate::config::RingAttentionSettings;
use crate::exchange::{LocalRing, RingExchange};
use crate::tests::test_utils::{
    AttentionInputs, SimulatedRing, assert_equals_approx, attention_cpu_reference, run_rank,
    run_ranks,
};
use crate::{Strategy, launch};

/// Fails the test if any exchange is attempted.
struct Unreachable;

impl RingExchange<f32> for Unreachable {
    fn exchange(
        &mut self,
        round: usize,
        _outgoing: KeyValueChunk<f32>,
    ) -> Result<KeyValueChunk<f32>, CommunicationError> {
        panic!("Exchange attempted at round {round} on an invalid configuration");
    }
}

fn run_invalid(
    problem: &AttentionProblem,
    ring: &RingState,
    settings: &RingAttentionSettings,
) -> RingAttentionError {
    let (b, h, d) = (problem.batch, problem.num_heads, problem.head_dim);
    let local_q = problem.seq_q / ring.world_size.max(1);
    let local_kv = problem.seq_kv / ring.world_size.max(1);
    let query = vec![0.0f32; b * h * local_q * d];
    let kv = vec![0.0f32; b * h * local_kv * d];

    launch::<f32, _>(
        &Strategy::Custom(settings.clone()),
        problem,
        ring,
        &TensorHandleRef::contiguous(&query, AxisOrder::Bhsd, b, h, local_q, d),
        &TensorHandleRef::contiguous(&kv, AxisOrder::Bhsd, b, h, local_kv, d),
        &TensorHandleRef::contiguous(&kv, AxisOrder::Bhsd, b, h, local_kv, d),
        &mut Unreachable,
    )
    .unwrap_err()
}

#[test]
fn unsupported_head_dim_is_rejected() {
    let problem = AttentionProblem::new(1, 1, 8, 8, 96, false);
    let err = run_invalid(&problem, &RingState::new(0, 2), &Default::default());

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::HeadDimUnsupported { head_dim: 96, .. })
    ));
}

#[test]
fn indivisible_sequence_is_rejected() {
    let problem = AttentionProblem::new(1, 1, 10, 10, 64, true);
    let err = run_invalid(&problem, &RingState::new(0, 4), &Default::default());

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::SequenceNotDivisible {
            seq_len: 10,
            world_size: 4,
            blocks_per_rank: 1,
        })
    ));

    // 12 splits across 4 ranks but not across 8 zigzag blocks.
    let problem = AttentionProblem::new(1, 1, 12, 12, 64, true);
    let ring = RingState::new(0, 4).with_schedule(RingSchedule::ZigZag);
    let err = run_invalid(&problem, &ring, &Default::default());

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::SequenceNotDivisible {
            blocks_per_rank: 2,
            ..
        })
    ));
}

#[test]
fn rank_outside_ring_is_rejected() {
    let problem = AttentionProblem::new(1, 1, 8, 8, 64, false);
    let err = run_invalid(&problem, &RingState::new(2, 2), &Default::default());

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::InvalidRing {
            rank: 2,
            world_size: 2
        })
    ));
}

#[test]
fn invalid_settings_are_rejected() {
    let problem = AttentionProblem::new(1, 1, 8, 8, 64, false);
    let settings = RingAttentionSettings {
        tile_seq_kv: Some(0),
        ..Default::default()
    };
    let err = run_invalid(&problem, &RingState::new(0, 2), &settings);

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::InvalidConfig(_))
    ));
}

#[test]
fn wrong_query_shape_is_rejected() {
    let problem = AttentionProblem::new(1, 1, 8, 8, 64, false);
    // A rank of a ring of 2 holds 4 positions, not the whole sequence.
    let query = vec![0.0f32; 8 * 64];
    let kv = vec![0.0f32; 4 * 64];

    let err = launch::<f32, _>(
        &Strategy::Custom(Default::default()),
        &problem,
        &RingState::new(0, 2),
        &TensorHandleRef::contiguous(&query, AxisOrder::Bhsd, 1, 1, 8, 64),
        &TensorHandleRef::contiguous(&kv, AxisOrder::Bhsd, 1, 1, 4, 64),
        &TensorHandleRef::contiguous(&kv, AxisOrder::Bhsd, 1, 1, 4, 64),
        &mut Unreachable,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::InvalidConfig(_))
    ));
}

#[test]
fn simulated_ring_sends_held_chunks() {
    let problem = AttentionProblem::new(1, 2, 16, 16, 64, true);
    let inputs = AttentionInputs::random(&problem, 13);
    let ring = RingState::new(1, 4);
    let mut exchange = SimulatedRing::<f64>::new(&inputs, &problem, &ring);

    let output = run_rank::<f64, _>(
        &inputs,
        &problem,
        &ring,
        AxisOrder::Bhsd,
        &Default::default(),
        &mut exchange,
    )
    .unwrap();

    assert_eq!(exchange.rounds, vec![0, 1, 2]);
    assert_eq!(exchange.sent_sources, vec![1, 0, 3]);

    // Rank 1 holds positions 4..8.
    let expected = attention_cpu_reference(&inputs, &problem);
    for h in 0..2 {
        for s in 0..4 {
            let row = (h * 16 + 4 + s) * 64;
            let actual: Vec<f64> = (0..64).map(|d| output.out_at(0, h, s, d)).collect();
            assert_equals_approx(&actual, &expected.out[row..row + 64], 1e-12).unwrap();
        }
    }
}

#[test]
fn transport_failure_aborts_the_call() {
    let problem = AttentionProblem::new(1, 1, 16, 16, 64, false);
    let inputs = AttentionInputs::random(&problem, 1);
    let ring = RingState::new(0, 4);
    let mut exchange = SimulatedRing::<f32>::new(&inputs, &problem, &ring);
    exchange.fail_at = Some((1, CommunicationError::Transport("link down".to_string())));

    let err = run_rank::<f32, _>(
        &inputs,
        &problem,
        &ring,
        AxisOrder::Bhsd,
        &Default::default(),
        &mut exchange,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RingAttentionError::Communication(CommunicationError::Transport(_))
    ));
    // No exchange is attempted after the failure.
    assert_eq!(exchange.rounds, vec![0, 1]);
}

#[test]
fn chunk_from_wrong_rank_is_rejected() {
    let problem = AttentionProblem::new(1, 1, 12, 12, 64, false);
    let inputs = AttentionInputs::random(&problem, 1);
    let ring = RingState::new(2, 3);
    let mut exchange = SimulatedRing::<f32>::new(&inputs, &problem, &ring);
    exchange.wrong_source_at = Some(0);

    let err = run_rank::<f32, _>(
        &inputs,
        &problem,
        &ring,
        AxisOrder::Bhsd,
        &Default::default(),
        &mut exchange,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RingAttentionError::Communication(CommunicationError::UnexpectedSource {
            round: 0,
            expected: 1,
            received: 2,
        })
    ));
}

#[test]
fn silent_peer_times_out() {
    let problem = AttentionProblem::new(1, 1, 8, 8, 64, false);
    let inputs = AttentionInputs::random(&problem, 2);
    let settings = RingAttentionSettings {
        exchange_timeout_ms: 50,
        ..Default::default()
    };
    let mut endpoints = LocalRing::endpoints(2, Duration::from_millis(50));
    // Rank 1 stays connected but never takes part.
    let _silent = endpoints.pop();
    let mut endpoint = endpoints.pop().unwrap();

    let err = run_rank::<f32, _>(
        &inputs,
        &problem,
        &RingState::new(0, 2),
        AxisOrder::Bhsd,
        &settings,
        &mut endpoint,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RingAttentionError::Communication(CommunicationError::Timeout { round: 0, peer: 1 })
    ));
}

#[test]
fn failing_rank_releases_its_peers() {
    let problem = AttentionProblem::new(1, 1, 12, 12, 64, true);
    let inputs = AttentionInputs::random(&problem, 4);
    let settings = RingAttentionSettings {
        exchange_timeout_ms: 10_000,
        ..Default::default()
    };

    let results = run_ranks(3, &settings, |rank, endpoint| {
        let ring = RingState::new(rank, 3);
        // Rank 1 rejects its settings and leaves the ring before any exchange.
        let settings = match rank {
            1 => RingAttentionSettings {
                tile_seq_q: Some(0),
                ..settings.clone()
            },
            _ => settings.clone(),
        };
        run_rank::<f32, _>(&inputs, &problem, &ring, AxisOrder::Bhsd, &settings, endpoint)
    });

    assert!(matches!(
        results[1],
        Err(RingAttentionError::Setup(AttentionSetupError::InvalidConfig(_)))
    ));
    for rank in [0, 2] {
        assert!(
            matches!(
                results[rank],
                Err(RingAttentionError::Communication(
                    CommunicationError::Disconnected { .. }
                ))
            ),
            "rank {rank} returned {:?}",
            results[rank].as_ref().map(|_| ())
        );
    }
}

#[test]
fn empty_ring_is_rejected() {
    let problem = AttentionProblem::new(1, 1, 8, 8, 64, false);
    let err = run_invalid(&problem, &RingState::new(0, 0), &Default::default());

    assert!(matches!(
        err,
        RingAttentionError::Setup(AttentionSetupError::InvalidRing { world_size: 0, .. })
    ));
}
