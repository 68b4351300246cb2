use std::fmt::{Debug, Display};

/// Errors that can occur while validating a ring attention call, before any buffer is allocated.
pub enum AttentionSetupError {
    /// The head dimension has no compiled tile specialization.
    HeadDimUnsupported {
        head_dim: usize,
        supported: &'static [usize],
    },

    /// A global sequence length cannot be split evenly across the ring.
    SequenceNotDivisible {
        seq_len: usize,
        world_size: usize,
        /// Number of blocks each rank owns, `2` for the zigzag schedule.
        blocks_per_rank: usize,
    },

    /// The rank does not belong to the ring.
    InvalidRing { rank: usize, world_size: usize },

    /// The provided configuration is invalid or rejected by a component.
    InvalidConfig(InvalidConfigError),
}

/// Errors raised when a buffer or worker pool needed by the call cannot be acquired.
pub enum ResourceError {
    /// A buffer could not be allocated.
    AllocationFailed {
        buffer: &'static str,
        elements: usize,
    },

    /// The dedicated worker pool could not be built.
    ThreadPool(String),
}

/// Errors raised by the exchange between ring neighbours.
pub enum CommunicationError {
    /// A peer did not answer within the exchange timeout.
    Timeout { round: usize, peer: usize },

    /// A peer endpoint has been dropped.
    Disconnected { round: usize, peer: usize },

    /// The received chunk is not the one the ring order expects at this round.
    UnexpectedSource {
        round: usize,
        expected: usize,
        received: usize,
    },

    /// The received payload could not be decoded into a key/value chunk.
    Malformed { round: usize, reason: String },

    /// An exchange was requested on a ring without peers.
    NoPeer,

    /// Failure reported by an external transport.
    Transport(String),
}

/// Error returned by every ring attention entry point.
pub enum RingAttentionError {
    Setup(AttentionSetupError),
    Resource(ResourceError),
    Communication(CommunicationError),
}

impl From<AttentionSetupError> for RingAttentionError {
    fn from(value: AttentionSetupError) -> Self {
        Self::Setup(value)
    }
}

impl From<ResourceError> for RingAttentionError {
    fn from(value: ResourceError) -> Self {
        Self::Resource(value)
    }
}

impl From<CommunicationError> for RingAttentionError {
    fn from(value: CommunicationError) -> Self {
        Self::Communication(value)
    }
}

impl From<InvalidConfigError> for AttentionSetupError {
    fn from(value: InvalidConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<InvalidConfigError> for RingAttentionError {
    fn from(value: InvalidConfigError) -> Self {
        Self::Setup(AttentionSetupError::InvalidConfig(value))
    }
}

impl Display for RingAttentionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for RingAttentionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RingAttentionError::Setup(err) => {
                write!(
                    f,
                    "Unable to launch ring attention because the config is invalid: {err:?}"
                )
            }
            RingAttentionError::Resource(err) => {
                write!(
                    f,
                    "Unable to launch ring attention because a resource could not be acquired: {err:?}"
                )
            }
            RingAttentionError::Communication(err) => {
                write!(f, "Ring attention aborted during exchange: {err:?}")
            }
        }
    }
}

impl std::error::Error for RingAttentionError {}

impl Display for AttentionSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for AttentionSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttentionSetupError::HeadDimUnsupported {
                head_dim,
                supported,
            } => write!(
                f,
                "Head dimension {head_dim} unsupported. Only {supported:?} are supported."
            ),
            AttentionSetupError::SequenceNotDivisible {
                seq_len,
                world_size,
                blocks_per_rank,
            } => write!(
                f,
                "Sequence length {seq_len} is not divisible into {blocks_per_rank} block(s) for each of {world_size} rank(s)."
            ),
            AttentionSetupError::InvalidRing { rank, world_size } => {
                write!(f, "Rank {rank} is outside of a ring of size {world_size}.")
            }
            AttentionSetupError::InvalidConfig(err) => write!(f, "{:?}", err.to_string()),
        }
    }
}

impl Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceError::AllocationFailed { buffer, elements } => {
                write!(f, "Could not allocate {elements} elements for the {buffer}.")
            }
            ResourceError::ThreadPool(reason) => {
                write!(f, "Could not build the worker pool: {reason}")
            }
        }
    }
}

impl Display for CommunicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for CommunicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommunicationError::Timeout { round, peer } => {
                write!(f, "Timed out waiting for rank {peer} at round {round}.")
            }
            CommunicationError::Disconnected { round, peer } => {
                write!(f, "Rank {peer} disconnected at round {round}.")
            }
            CommunicationError::UnexpectedSource {
                round,
                expected,
                received,
            } => write!(
                f,
                "Expected the chunk of rank {expected} after round {round}, received the chunk of rank {received}."
            ),
            CommunicationError::Malformed { round, reason } => {
                write!(f, "Malformed chunk received at round {round}: {reason}")
            }
            CommunicationError::NoPeer => write!(f, "No peer to exchange with."),
            CommunicationError::Transport(reason) => write!(f, "Transport failure: {reason}"),
        }
    }
}

/// Error that arises from invalid configurations
pub type InvalidConfigError = Box<dyn Display + Send + Sync>;

/// Error that arises from invalid configurations
pub struct FormattedConfigError {
    func: Box<dyn Fn() -> String + Send + Sync>,
}

impl FormattedConfigError {
    #[allow(clippy::new_ret_no_self)]
    pub fn new<F: Fn() -> String + Send + Sync + 'static>(func: F) -> InvalidConfigError {
        Box::new(Self {
            func: Box::new(func),
        })
    }
}

impl Display for FormattedConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = (self.func)();
        write!(f, "{string}")
    }
}
