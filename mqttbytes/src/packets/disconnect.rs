use crate::Error;
use bytes::BytesMut;

pub struct Disconnect;

impl Disconnect {
    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        buf.extend_from_slice(&[0b1110_0000, 0]);
        Ok(2)
    }
}
