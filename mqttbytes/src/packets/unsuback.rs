use crate::{Error, FixedHeader};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAck {
    pub pkid: u16,
}

impl UnsubAck {
    pub fn new(pkid: u16) -> UnsubAck {
        UnsubAck { pkid }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }

        bytes.advance(fixed_header.header_len);
        let pkid = bytes.get_u16();
        Ok(UnsubAck { pkid })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        buf.extend_from_slice(&[0b1011_0000, 2]);
        buf.extend_from_slice(&self.pkid.to_be_bytes());
        Ok(4)
    }
}
