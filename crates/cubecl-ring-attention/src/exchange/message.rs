use crate::components::{AttentionElement, CommunicationError, KeyValueChunk};

/// Key/value chunk as it crosses a transport: shape metadata plus raw element bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkMessage {
    pub round: usize,
    pub source_rank: usize,
    pub shape: [usize; 4],
    pub elem_size: usize,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl ChunkMessage {
    pub fn encode<E: AttentionElement>(round: usize, chunk: &KeyValueChunk<E>) -> Self {
        Self {
            round,
            source_rank: chunk.source_rank,
            shape: chunk.shape,
            elem_size: size_of::<E>(),
            key: bytemuck::cast_slice::<E, u8>(&chunk.key).to_vec(),
            value: bytemuck::cast_slice::<E, u8>(&chunk.value).to_vec(),
        }
    }

    /// Decodes the message received at `round`.
    pub fn decode<E: AttentionElement>(
        self,
        round: usize,
    ) -> Result<KeyValueChunk<E>, CommunicationError> {
        let malformed = |reason: String| CommunicationError::Malformed { round, reason };

        if self.round != round {
            return Err(malformed(format!(
                "message of round {} received at round {round}",
                self.round
            )));
        }

        if self.elem_size != size_of::<E>() {
            return Err(malformed(format!(
                "elements of {} bytes, expected {} bytes",
                self.elem_size,
                size_of::<E>()
            )));
        }

        let num_bytes = self
            .shape
            .iter()
            .try_fold(size_of::<E>(), |acc, dim| acc.checked_mul(*dim));
        let Some(num_bytes) = num_bytes else {
            return Err(malformed(format!("shape {:?} overflows", self.shape)));
        };

        if self.key.len() != num_bytes || self.value.len() != num_bytes {
            return Err(malformed(format!(
                "{} key and {} value bytes for shape {:?}, expected {num_bytes}",
                self.key.len(),
                self.value.len(),
                self.shape
            )));
        }

        Ok(KeyValueChunk::new(
            self.source_rank,
            self.shape,
            bytemuck::allocation::pod_collect_to_vec::<u8, E>(&self.key),
            bytemuck::allocation::pod_collect_to_vec::<u8, E>(&self.value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn chunk() -> KeyValueChunk<f16> {
        let key = (0..8).map(|x| f16::from_f32(x as f32)).collect();
        let value = (0..8).map(|x| f16::from_f32(-(x as f32))).collect();
        KeyValueChunk::new(1, [1, 2, 2, 2], key, value)
    }

    #[test]
    fn decoded_chunk_keeps_provenance() {
        let message = ChunkMessage::encode(3, &chunk());

        assert_eq!(message.key.len(), 16);
        assert_eq!(message.decode::<f16>(3).unwrap(), chunk());
    }

    #[test]
    fn wrong_round_is_malformed() {
        let message = ChunkMessage::encode(0, &chunk());
        let err = message.decode::<f16>(1).unwrap_err();

        assert!(matches!(err, CommunicationError::Malformed { round: 1, .. }));
    }

    #[test]
    fn wrong_element_type_is_malformed() {
        let message = ChunkMessage::encode(0, &chunk());

        assert!(message.decode::<f32>(0).is_err());
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let mut message = ChunkMessage::encode(0, &chunk());
        message.value.truncate(10);

        assert!(message.decode::<f16>(0).is_err());
    }
}
