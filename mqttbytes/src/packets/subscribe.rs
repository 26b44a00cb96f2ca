use crate::{qos::qos, read_mqtt_string, write_mqtt_string, write_remaining_length, Error, FixedHeader, QoS};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeFilter {
    pub path: String,
    pub qos: QoS,
}

impl SubscribeFilter {
    pub fn new(path: impl Into<String>, qos: QoS) -> SubscribeFilter {
        SubscribeFilter { path: path.into(), qos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub pkid: u16,
    pub filters: Vec<SubscribeFilter>,
}

impl Subscribe {
    pub fn new(pkid: u16, filters: Vec<SubscribeFilter>) -> Subscribe {
        Subscribe { pkid, filters }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        bytes.advance(fixed_header.header_len);
        let pkid = bytes.get_u16();

        let mut filters = Vec::new();
        while bytes.has_remaining() {
            let path = read_mqtt_string(&mut bytes)?;
            let options = bytes.get_u8();
            filters.push(SubscribeFilter::new(path, qos(options & 0b11)?));
        }

        if filters.is_empty() {
            return Err(Error::MalformedPacket);
        }

        Ok(Subscribe { pkid, filters })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        let mut remaining_len = 2;
        for filter in &self.filters {
            remaining_len += 2 + filter.path.len() + 1;
        }

        buf.extend_from_slice(&[0b1000_0010]);
        write_remaining_length(remaining_len, buf)?;
        buf.extend_from_slice(&self.pkid.to_be_bytes());

        for filter in &self.filters {
            write_mqtt_string(buf, &filter.path);
            buf.extend_from_slice(&[filter.qos.to_u8()]);
        }

        Ok(1 + remaining_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{mqtt_read, Packet};

    #[test]
    fn multi_filter_subscribe_round_trips() {
        let subscribe = Subscribe::new(
            9,
            vec![
                SubscribeFilter::new("a/b", QoS::AtLeastOnce),
                SubscribeFilter::new("c/+/d", QoS::AtMostOnce),
            ],
        );

        let mut buf = BytesMut::new();
        subscribe.write(&mut buf).unwrap();

        match mqtt_read(&mut buf, 1024).unwrap() {
            Packet::Subscribe(out) => assert_eq!(out, subscribe),
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
