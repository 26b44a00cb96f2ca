use crate::Error;
use bytes::BytesMut;

pub struct PingReq;

impl PingReq {
    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        buf.extend_from_slice(&[0b1100_0000, 0]);
        Ok(2)
    }
}
