use crate::{qos::qos, read_mqtt_string, write_mqtt_string, write_remaining_length, Error, FixedHeader, QoS};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Wire packet id. 0 for QoS 0 (meaningless on the wire, never sent).
    pub pkid: u16,
    pub payload: Bytes,
}

impl Publish {
    pub fn new<S: Into<String>>(topic: S, qos: QoS, payload: impl Into<Bytes>) -> Publish {
        Publish {
            dup: false,
            qos,
            retain: false,
            topic: topic.into(),
            pkid: 0,
            payload: payload.into(),
        }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        let byte1 = fixed_header.byte1;
        let qos_bits = (byte1 & 0b0110) >> 1;
        let qos_val = qos(qos_bits)?;
        let dup = (byte1 & 0b1000) != 0;
        let retain = (byte1 & 0b0001) != 0;

        bytes.advance(fixed_header.header_len);

        let topic = read_mqtt_string(&mut bytes)?;
        let pkid = if qos_val == QoS::AtMostOnce { 0 } else { bytes.get_u16() };

        Ok(Publish {
            dup,
            qos: qos_val,
            retain,
            topic,
            pkid,
            payload: bytes,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        let mut remaining_len = 2 + self.topic.len() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            remaining_len += 2;
        }

        let mut byte1 = 0b0011_0000;
        if self.dup {
            byte1 |= 0b1000;
        }
        byte1 |= self.qos.to_u8() << 1;
        if self.retain {
            byte1 |= 0b0001;
        }

        buf.extend_from_slice(&[byte1]);
        write_remaining_length(remaining_len, buf)?;
        write_mqtt_string(buf, &self.topic);

        if self.qos != QoS::AtMostOnce {
            buf.extend_from_slice(&self.pkid.to_be_bytes());
        }

        buf.extend_from_slice(&self.payload);
        Ok(1 + remaining_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{mqtt_read, Packet};

    #[test]
    fn qos0_publish_carries_no_pkid_on_the_wire() {
        let mut publish = Publish::new("a/b", QoS::AtMostOnce, &b"hi"[..]);
        publish.pkid = 7; // should be ignored on the wire
        let mut buf = BytesMut::new();
        publish.write(&mut buf).unwrap();

        match mqtt_read(&mut buf, 1024).unwrap() {
            Packet::Publish(out) => assert_eq!(out.pkid, 0),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn qos1_publish_round_trips_dup_flag() {
        let mut publish = Publish::new("a/b", QoS::AtLeastOnce, &b"hi"[..]);
        publish.pkid = 42;
        publish.dup = true;

        let mut buf = BytesMut::new();
        publish.write(&mut buf).unwrap();

        match mqtt_read(&mut buf, 1024).unwrap() {
            Packet::Publish(out) => {
                assert_eq!(out.pkid, 42);
                assert!(out.dup);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
