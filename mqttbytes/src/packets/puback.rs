use crate::{Error, FixedHeader};
use bytes::{Buf, Bytes, BytesMut};

/// Acknowledgement to a QoS-1 PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub pkid: u16,
}

impl PubAck {
    pub fn new(pkid: u16) -> PubAck {
        PubAck { pkid }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }

        bytes.advance(fixed_header.header_len);
        let pkid = bytes.get_u16();
        Ok(PubAck { pkid })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        buf.extend_from_slice(&[0b0100_0000, 2]);
        buf.extend_from_slice(&self.pkid.to_be_bytes());
        Ok(4)
    }
}
