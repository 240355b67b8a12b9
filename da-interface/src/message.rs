//! The on-chain sequencer message encoding and the batch payload it carries.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::DaError;

/// Length of the fixed sequencer message header.
pub const SEQUENCER_HEADER_LEN: usize = 40;

/// The fixed 40-byte big-endian header prepended to every payload posted to the inbox.
///
/// The bounds cover every message contained in the batch. The inbox contract re-checks them
/// on-chain and every reader re-validates them after recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencerMessageHeader {
    /// Smallest timestamp of any message in the batch.
    pub min_timestamp: u64,
    /// Largest timestamp of any message in the batch.
    pub max_timestamp: u64,
    /// Smallest parent chain block number of any message in the batch.
    pub min_block_number: u64,
    /// Largest parent chain block number of any message in the batch.
    pub max_block_number: u64,
    /// Number of delayed messages consumed once this batch is applied.
    pub after_delayed_messages_read: u64,
}

impl SequencerMessageHeader {
    /// Encodes the header into its 40-byte wire form.
    pub fn to_bytes(&self) -> [u8; SEQUENCER_HEADER_LEN] {
        let mut out = [0u8; SEQUENCER_HEADER_LEN];
        for (i, field) in [
            self.min_timestamp,
            self.max_timestamp,
            self.min_block_number,
            self.max_block_number,
            self.after_delayed_messages_read,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 8..(i + 1) * 8].copy_from_slice(&field.to_be_bytes());
        }
        out
    }

    /// Decodes the header from the start of a sequencer message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DaError> {
        if bytes.len() < SEQUENCER_HEADER_LEN {
            return Err(DaError::MalformedCertificate(format!(
                "sequencer message of {} bytes is shorter than its {SEQUENCER_HEADER_LEN} byte header",
                bytes.len()
            )));
        }
        let field = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            u64::from_be_bytes(buf)
        };
        Ok(Self {
            min_timestamp: field(0),
            max_timestamp: field(1),
            min_block_number: field(2),
            max_block_number: field(3),
            after_delayed_messages_read: field(4),
        })
    }

    /// Checks that both ranges are well ordered.
    pub fn validate(&self) -> Result<(), DaError> {
        if self.min_timestamp > self.max_timestamp {
            return Err(DaError::MalformedCertificate(format!(
                "timestamp range {}..{} is inverted",
                self.min_timestamp, self.max_timestamp
            )));
        }
        if self.min_block_number > self.max_block_number {
            return Err(DaError::MalformedCertificate(format!(
                "block range {}..{} is inverted",
                self.min_block_number, self.max_block_number
            )));
        }
        Ok(())
    }

    /// Computes the tightest header that bounds all `messages`.
    pub fn bounding(messages: &[BatchMessage], after_delayed_messages_read: u64) -> Self {
        let mut header = SequencerMessageHeader {
            min_timestamp: u64::MAX,
            max_timestamp: 0,
            min_block_number: u64::MAX,
            max_block_number: 0,
            after_delayed_messages_read,
        };
        if messages.is_empty() {
            header.min_timestamp = 0;
            header.min_block_number = 0;
            return header;
        }
        for msg in messages {
            header.min_timestamp = header.min_timestamp.min(msg.timestamp);
            header.max_timestamp = header.max_timestamp.max(msg.timestamp);
            header.min_block_number = header.min_block_number.min(msg.block_number);
            header.max_block_number = header.max_block_number.max(msg.block_number);
        }
        header
    }

    /// Returns true if the message lies within the header's bounds.
    pub fn contains(&self, msg: &BatchMessage) -> bool {
        (self.min_timestamp..=self.max_timestamp).contains(&msg.timestamp)
            && (self.min_block_number..=self.max_block_number).contains(&msg.block_number)
    }
}

/// A sequencer message split into its header and the provider-owned body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerMessage<'a> {
    /// The decoded 40-byte header.
    pub header: SequencerMessageHeader,
    /// The body. Its first byte is the header byte of the owning scheme.
    pub body: &'a [u8],
}

impl<'a> SequencerMessage<'a> {
    /// Splits a raw sequencer message.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DaError> {
        let header = SequencerMessageHeader::from_bytes(bytes)?;
        Ok(Self {
            header,
            body: &bytes[SEQUENCER_HEADER_LEN..],
        })
    }

    /// The header byte of the body, if the body is not empty.
    pub fn header_byte(&self) -> Option<u8> {
        self.body.first().copied()
    }

    /// Concatenates a header and a body into the bytes posted to the inbox.
    pub fn encode(header: &SequencerMessageHeader, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(SEQUENCER_HEADER_LEN + body.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(body);
        out
    }
}

/// A single L2 message produced by the execution engine, as carried inside a batch.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BatchMessage {
    /// Timestamp assigned by the sequencer.
    pub timestamp: u64,
    /// Parent chain block number the message was sequenced against.
    pub block_number: u64,
    /// Delayed messages read once this message is applied.
    pub delayed_messages_read: u64,
    /// Opaque message bytes.
    pub data: Vec<u8>,
}

impl BatchMessage {
    /// The number of bytes this message adds to an encoded batch.
    pub fn encoded_len(&self) -> usize {
        // three u64 fields plus the u32 length prefix of `data`
        8 * 3 + 4 + self.data.len()
    }
}

/// Size of an encoded batch with no messages.
pub const EMPTY_BATCH_LEN: usize = 4;

/// Encodes a batch of messages into the payload handed to writers.
pub fn encode_batch(messages: &[BatchMessage]) -> Result<Vec<u8>, DaError> {
    messages
        .try_to_vec()
        .map_err(|e| DaError::Internal(format!("failed to encode batch: {e}")))
}

/// Decodes a payload produced by [`encode_batch`].
pub fn decode_batch(payload: &[u8]) -> Result<Vec<BatchMessage>, DaError> {
    Vec::<BatchMessage>::try_from_slice(payload)
        .map_err(|e| DaError::MalformedPayload(format!("payload is not a batch: {e}")))
}

/// Decodes a recovered payload and checks every message against the sequencer header bounds.
pub fn validate_batch(
    header: &SequencerMessageHeader,
    payload: &[u8],
) -> Result<Vec<BatchMessage>, DaError> {
    let messages = decode_batch(payload)?;
    if let Some((i, _)) = messages
        .iter()
        .enumerate()
        .find(|(_, msg)| !header.contains(msg))
    {
        return Err(DaError::MalformedPayload(format!(
            "message {i} lies outside the sequencer header bounds"
        )));
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(timestamp: u64, block_number: u64, data: &[u8]) -> BatchMessage {
        BatchMessage {
            timestamp,
            block_number,
            delayed_messages_read: 0,
            data: data.to_vec(),
        }
    }

    #[test]
    fn header_layout_is_big_endian() {
        let header = SequencerMessageHeader {
            min_timestamp: 1,
            max_timestamp: 2,
            min_block_number: 3,
            max_block_number: 4,
            after_delayed_messages_read: 5,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[7], 1);
        assert_eq!(bytes[15], 2);
        assert_eq!(bytes[39], 5);
        assert_eq!(SequencerMessageHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn short_message_is_malformed() {
        let err = SequencerMessage::parse(&[0u8; 39]).unwrap_err();
        assert!(matches!(err, DaError::MalformedCertificate(_)));
    }

    #[test]
    fn encoded_len_matches_borsh() {
        let messages = vec![message(1, 1, b"abc"), message(2, 2, &[7u8; 100])];
        let encoded = encode_batch(&messages).unwrap();
        let expected: usize =
            EMPTY_BATCH_LEN + messages.iter().map(BatchMessage::encoded_len).sum::<usize>();
        assert_eq!(encoded.len(), expected);
        assert_eq!(decode_batch(&encoded).unwrap(), messages);
    }

    #[test]
    fn validation_rejects_messages_outside_bounds() {
        let messages = vec![message(10, 5, b"a"), message(20, 6, b"b")];
        let header = SequencerMessageHeader::bounding(&messages, 0);
        let payload = encode_batch(&messages).unwrap();
        assert_eq!(validate_batch(&header, &payload).unwrap(), messages);

        let narrow = SequencerMessageHeader {
            max_timestamp: 15,
            ..header
        };
        assert!(matches!(
            validate_batch(&narrow, &payload),
            Err(DaError::MalformedPayload(_))
        ));
    }
}
