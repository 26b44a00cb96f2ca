use crate::{read_mqtt_string, write_mqtt_string, write_remaining_length, Error, FixedHeader};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub pkid: u16,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub fn new(pkid: u16, filters: Vec<String>) -> Unsubscribe {
        Unsubscribe { pkid, filters }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        bytes.advance(fixed_header.header_len);
        let pkid = bytes.get_u16();

        let mut filters = Vec::new();
        while bytes.has_remaining() {
            filters.push(read_mqtt_string(&mut bytes)?);
        }

        if filters.is_empty() {
            return Err(Error::MalformedPacket);
        }

        Ok(Unsubscribe { pkid, filters })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        let mut remaining_len = 2;
        for filter in &self.filters {
            remaining_len += 2 + filter.len();
        }

        buf.extend_from_slice(&[0b1010_0010]);
        write_remaining_length(remaining_len, buf)?;
        buf.extend_from_slice(&self.pkid.to_be_bytes());

        for filter in &self.filters {
            write_mqtt_string(buf, filter);
        }

        Ok(1 + remaining_len)
    }
}
