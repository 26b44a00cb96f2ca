use crate::Error;
use bytes::BytesMut;

pub struct PingResp;

impl PingResp {
    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        buf.extend_from_slice(&[0b1101_0000, 0]);
        Ok(2)
    }
}
