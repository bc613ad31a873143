/*
    codec.rs - Tagged binary envelope used on every provider message

    Layout (lib0-style unsigned varints, byte strings are length-prefixed):

        data     = varuint(protocol) • payload
        protocol = 0 sync | 1 awareness | 2 ping | 3 pong

        sync payload      = varuint(kind) • varbytes(crdt payload)
        kind              = 1 step1 (state vector) | 2 step2 (update) | 3 update
        awareness payload = varbytes(opaque)
        ping / pong       = (empty)

    Decoding never panics on hostile input; every failure is a CodecError.
*/

use thiserror::Error;

pub const PROTOCOL_SYNC: u64 = 0;
pub const PROTOCOL_AWARENESS: u64 = 1;
pub const PROTOCOL_PING: u64 = 2;
pub const PROTOCOL_PONG: u64 = 3;

pub const SYNC_STEP1: u64 = 1;
pub const SYNC_STEP2: u64 = 2;
pub const SYNC_UPDATE: u64 = 3;

/// Longest varint accepted for a u64 (ceil(64 / 7)).
const MAX_VARINT_LEN: usize = 10;

/// Errors produced while decoding an envelope
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("varint does not fit in 64 bits")]
    VarintOverflow,

    #[error("unknown protocol type {0}")]
    UnknownProtocol(u64),

    #[error("unknown sync message type {0}")]
    UnknownSyncMessage(u64),

    #[error("byte string length {0} exceeds remaining input")]
    LengthOverflow(u64),
}

/// Append-only writer for varints and length-prefixed byte strings
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_var_uint(&mut self, mut value: u64) {
        while value > 0x7f {
            self.buf.push(0x80 | (value & 0x7f) as u8);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_uint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded envelope
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn read_var_uint(&mut self) -> Result<u64, CodecError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or(CodecError::UnexpectedEof(self.pos))?;
            self.pos += 1;

            let bits = u64::from(byte & 0x7f);
            let shift = 7 * i as u32;
            // The tenth byte may only carry the single remaining bit.
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(CodecError::VarintOverflow);
            }
            value |= bits << shift;

            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::VarintOverflow)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_var_uint()?;
        if len > self.remaining() as u64 {
            return Err(CodecError::LengthOverflow(len));
        }
        let start = self.pos;
        self.pos += len as usize;
        Ok(&self.data[start..self.pos])
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Payload of a sync-protocol envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Sender's encoded state vector
    Step1(Vec<u8>),
    /// Updates the receiver of a step-1 was missing
    Step2(Vec<u8>),
    /// Incremental update produced by a local change
    Update(Vec<u8>),
}

impl SyncMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Step1(_) => "sync_step1",
            SyncMessage::Step2(_) => "sync_step2",
            SyncMessage::Update(_) => "update",
        }
    }

    fn tag(&self) -> u64 {
        match self {
            SyncMessage::Step1(_) => SYNC_STEP1,
            SyncMessage::Step2(_) => SYNC_STEP2,
            SyncMessage::Update(_) => SYNC_UPDATE,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            SyncMessage::Step1(p) | SyncMessage::Step2(p) | SyncMessage::Update(p) => p,
        }
    }
}

/// A fully decoded envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    Sync(SyncMessage),
    /// Presence/cursor state. Received but not supported.
    Awareness(Vec<u8>),
    Ping,
    Pong,
}

impl ProtocolMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMessage::Sync(sync) => sync.kind(),
            ProtocolMessage::Awareness(_) => "awareness",
            ProtocolMessage::Ping => "ping",
            ProtocolMessage::Pong => "pong",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        match self {
            ProtocolMessage::Sync(sync) => {
                encoder.write_var_uint(PROTOCOL_SYNC);
                encoder.write_var_uint(sync.tag());
                encoder.write_var_bytes(sync.payload());
            }
            ProtocolMessage::Awareness(state) => {
                encoder.write_var_uint(PROTOCOL_AWARENESS);
                encoder.write_var_bytes(state);
            }
            ProtocolMessage::Ping => encoder.write_var_uint(PROTOCOL_PING),
            ProtocolMessage::Pong => encoder.write_var_uint(PROTOCOL_PONG),
        }
        encoder.into_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut decoder = Decoder::new(data);
        match decoder.read_var_uint()? {
            PROTOCOL_SYNC => {
                let kind = decoder.read_var_uint()?;
                let payload = decoder.read_var_bytes()?.to_vec();
                let sync = match kind {
                    SYNC_STEP1 => SyncMessage::Step1(payload),
                    SYNC_STEP2 => SyncMessage::Step2(payload),
                    SYNC_UPDATE => SyncMessage::Update(payload),
                    other => return Err(CodecError::UnknownSyncMessage(other)),
                };
                Ok(ProtocolMessage::Sync(sync))
            }
            PROTOCOL_AWARENESS => Ok(ProtocolMessage::Awareness(decoder.read_var_bytes()?.to_vec())),
            PROTOCOL_PING => Ok(ProtocolMessage::Ping),
            PROTOCOL_PONG => Ok(ProtocolMessage::Pong),
            other => Err(CodecError::UnknownProtocol(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_var_uint_known_encodings() {
        let cases: [(u64, &[u8]); 4] = [
            (0, &[0x00]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (300, &[0xac, 0x02]),
        ];
        for (value, expected) in cases {
            let mut enc = Encoder::new();
            enc.write_var_uint(value);
            assert_eq!(enc.into_bytes(), expected, "encoding of {}", value);
        }
    }

    #[test]
    fn test_ping_and_pong_are_single_byte() {
        assert_eq!(ProtocolMessage::Ping.encode(), vec![2]);
        assert_eq!(ProtocolMessage::Pong.encode(), vec![3]);
    }

    #[test]
    fn test_sync_layout() {
        let data = ProtocolMessage::Sync(SyncMessage::Step1(vec![9, 9])).encode();
        assert_eq!(data, vec![0, 1, 2, 9, 9]);

        let data = ProtocolMessage::Sync(SyncMessage::Update(vec![])).encode();
        assert_eq!(data, vec![0, 3, 0]);
    }

    #[test]
    fn test_decode_sync_step2() {
        let decoded = ProtocolMessage::decode(&[0, 2, 3, 1, 2, 3]).unwrap();
        assert_eq!(decoded, ProtocolMessage::Sync(SyncMessage::Step2(vec![1, 2, 3])));
        assert_eq!(decoded.kind(), "sync_step2");
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        assert_eq!(ProtocolMessage::decode(&[7]), Err(CodecError::UnknownProtocol(7)));
    }

    #[test]
    fn test_unknown_sync_message_rejected() {
        assert_eq!(
            ProtocolMessage::decode(&[0, 9, 0]),
            Err(CodecError::UnknownSyncMessage(9))
        );
    }

    #[test]
    fn test_truncated_input_rejected() {
        assert_eq!(ProtocolMessage::decode(&[]), Err(CodecError::UnexpectedEof(0)));
        assert_eq!(ProtocolMessage::decode(&[0]), Err(CodecError::UnexpectedEof(1)));
        assert_eq!(ProtocolMessage::decode(&[0x80]), Err(CodecError::UnexpectedEof(1)));
        assert_eq!(ProtocolMessage::decode(&[0, 1, 5, 1]), Err(CodecError::LengthOverflow(5)));
    }

    #[test]
    fn test_varint_overflow_rejected() {
        let data = [0xff; 11];
        assert_eq!(Decoder::new(&data).read_var_uint(), Err(CodecError::VarintOverflow));

        let mut max = Encoder::new();
        max.write_var_uint(u64::MAX);
        let bytes = max.into_bytes();
        assert_eq!(bytes.len(), MAX_VARINT_LEN);
        assert_eq!(Decoder::new(&bytes).read_var_uint(), Ok(u64::MAX));
    }

    #[test]
    fn test_awareness_payload_preserved() {
        let msg = ProtocolMessage::Awareness(b"cursor".to_vec());
        assert_eq!(ProtocolMessage::decode(&msg.encode()).unwrap(), msg);
    }

    proptest! {
        #[test]
        fn prop_var_uint_round_trips(value in any::<u64>()) {
            let mut enc = Encoder::new();
            enc.write_var_uint(value);
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            prop_assert_eq!(dec.read_var_uint().unwrap(), value);
            prop_assert_eq!(dec.remaining(), 0);
        }

        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = ProtocolMessage::decode(&data);
        }
    }
}
