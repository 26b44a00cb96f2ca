use crate::{Error, FixedHeader};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    RefusedProtocolVersion,
    BadClientId,
    ServiceUnavailable,
    BadUserNamePassword,
    NotAuthorized,
}

impl ConnectReturnCode {
    fn from_u8(byte: u8) -> Result<Self, Error> {
        Ok(match byte {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::RefusedProtocolVersion,
            2 => ConnectReturnCode::BadClientId,
            3 => ConnectReturnCode::ServiceUnavailable,
            4 => ConnectReturnCode::BadUserNamePassword,
            5 => ConnectReturnCode::NotAuthorized,
            num => return Err(Error::InvalidConnectReturnCode(num)),
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::RefusedProtocolVersion => 1,
            ConnectReturnCode::BadClientId => 2,
            ConnectReturnCode::ServiceUnavailable => 3,
            ConnectReturnCode::BadUserNamePassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

impl ConnAck {
    pub fn new(code: ConnectReturnCode, session_present: bool) -> ConnAck {
        ConnAck { session_present, code }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }

        bytes.advance(fixed_header.header_len);
        let flags = bytes.get_u8();
        let session_present = (flags & 0x01) == 1;
        let code = ConnectReturnCode::from_u8(bytes.get_u8())?;

        Ok(ConnAck { session_present, code })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        buf.extend_from_slice(&[0b0010_0000, 2, self.session_present as u8, self.code.to_u8()]);
        Ok(4)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{mqtt_read, Packet};

    #[test]
    fn connack_round_trips() {
        let connack = ConnAck::new(ConnectReturnCode::Accepted, true);
        let mut buf = BytesMut::new();
        connack.write(&mut buf).unwrap();

        match mqtt_read(&mut buf, 1024).unwrap() {
            Packet::ConnAck(out) => assert_eq!(out, connack),
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
