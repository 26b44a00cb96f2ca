use thiserror::Error as ThisError;

/// Errors produced while encoding or decoding MQTT packets.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("stream needs {0} more bytes")]
    InsufficientBytes(usize),
    #[error("packet of {0} bytes exceeds the configured maximum")]
    PayloadSizeLimitExceeded(usize),
    #[error("remaining length field is malformed")]
    MalformedRemainingLength,
    #[error("remaining length does not match the payload")]
    PayloadSizeIncorrect,
    #[error("encoded payload would exceed 256MB")]
    PayloadTooLong,
    #[error("packet is structurally invalid")]
    MalformedPacket,
    #[error("packet type {0} is not recognised")]
    InvalidPacketType(u8),
    #[error("connect return code {0} is not recognised")]
    InvalidConnectReturnCode(u8),
    #[error("qos value {0} is not recognised")]
    InvalidQoS(u8),
    #[error("topic filter is not valid utf-8 or violates wildcard rules")]
    InvalidTopicFilter,
}
