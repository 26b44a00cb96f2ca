//! Minimal MQTT 3.1.1 packet encoder/decoder.
//!
//! Covers exactly the packet types the client core needs: CONNECT, CONNACK,
//! PUBLISH, PUBACK, SUBSCRIBE, SUBACK, UNSUBSCRIBE, UNSUBACK, PINGREQ,
//! PINGRESP, DISCONNECT. QoS 2 / PUBREC / PUBREL / PUBCOMP are intentionally
//! absent.

mod error;
mod qos;
mod topic;

pub mod packets;

pub use error::Error;
pub use qos::QoS;
pub use topic::valid_filter;

pub use packets::connack::{ConnAck, ConnectReturnCode};
pub use packets::connect::{Connect, LastWill, Login};
pub use packets::disconnect::Disconnect;
pub use packets::pingreq::PingReq;
pub use packets::pingresp::PingResp;
pub use packets::puback::PubAck;
pub use packets::publish::Publish;
pub use packets::suback::{SubAck, SubscribeReturnCodes};
pub use packets::subscribe::{Subscribe, SubscribeFilter};
pub use packets::unsuback::UnsubAck;
pub use packets::unsubscribe::Unsubscribe;

use bytes::{Buf, BytesMut};

/// Every packet type this crate can round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// The packet id carried by this packet, if any. PINGREQ, PINGRESP,
    /// DISCONNECT, CONNECT and CONNACK do not carry one.
    pub fn pkid(&self) -> Option<u16> {
        match self {
            Packet::Publish(p) if p.qos != QoS::AtMostOnce => Some(p.pkid),
            Packet::PubAck(p) => Some(p.pkid),
            Packet::Subscribe(p) => Some(p.pkid),
            Packet::SubAck(p) => Some(p.pkid),
            Packet::Unsubscribe(p) => Some(p.pkid),
            Packet::UnsubAck(p) => Some(p.pkid),
            _ => None,
        }
    }
}

/// Packet type + flags + remaining length, parsed once per packet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedHeader {
    pub byte1: u8,
    pub header_len: usize,
    pub remaining_len: usize,
}

impl FixedHeader {
    pub fn packet_type(&self) -> Result<u8, Error> {
        Ok(self.byte1 >> 4)
    }

    pub fn frame_len(&self) -> usize {
        self.header_len + self.remaining_len
    }
}

/// Parses a fixed header out of `stream` without consuming it. Returns
/// `Error::InsufficientBytes` if the full frame hasn't arrived yet.
pub(crate) fn parse_fixed_header(stream: &[u8]) -> Result<FixedHeader, Error> {
    if stream.is_empty() {
        return Err(Error::InsufficientBytes(2));
    }

    let byte1 = stream[0];
    let (remaining_len, header_len) = decode_remaining_length(&stream[1..])?;

    Ok(FixedHeader {
        byte1,
        header_len: header_len + 1,
        remaining_len,
    })
}

fn decode_remaining_length(stream: &[u8]) -> Result<(usize, usize), Error> {
    let mut multiplier = 1usize;
    let mut value = 0usize;
    let mut pos = 0usize;

    loop {
        if pos >= stream.len() {
            return Err(Error::InsufficientBytes(pos + 2));
        }

        let byte = stream[pos];
        value += (byte as usize & 0x7F) * multiplier;
        pos += 1;

        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }

        multiplier *= 128;
        if multiplier > 128 * 128 * 128 {
            return Err(Error::MalformedRemainingLength);
        }
    }
}

pub(crate) fn write_remaining_length(len: usize, buf: &mut bytes::BytesMut) -> Result<(), Error> {
    if len > 268_435_455 {
        return Err(Error::PayloadTooLong);
    }

    let mut len = len;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.extend_from_slice(&[byte]);
        if len == 0 {
            break;
        }
    }

    Ok(())
}

/// Attempts to read one complete packet out of `stream`. `stream` is left
/// untouched (no bytes advanced) when the frame is incomplete so the caller
/// can retry after reading more from the network.
pub fn mqtt_read(stream: &mut BytesMut, max_size: usize) -> Result<Packet, Error> {
    let fixed_header = parse_fixed_header(&stream[..])?;
    let frame_len = fixed_header.frame_len();

    if frame_len > max_size {
        return Err(Error::PayloadSizeLimitExceeded(frame_len));
    }

    if stream.len() < frame_len {
        return Err(Error::InsufficientBytes(frame_len));
    }

    let packet = stream.split_to(frame_len).freeze();
    let packet_type = fixed_header.packet_type()?;

    let packet = match packet_type {
        1 => Packet::Connect(Connect::assemble(fixed_header, packet)?),
        2 => Packet::ConnAck(ConnAck::assemble(fixed_header, packet)?),
        3 => Packet::Publish(Publish::assemble(fixed_header, packet)?),
        4 => Packet::PubAck(PubAck::assemble(fixed_header, packet)?),
        8 => Packet::Subscribe(Subscribe::assemble(fixed_header, packet)?),
        9 => Packet::SubAck(SubAck::assemble(fixed_header, packet)?),
        10 => Packet::Unsubscribe(Unsubscribe::assemble(fixed_header, packet)?),
        11 => Packet::UnsubAck(UnsubAck::assemble(fixed_header, packet)?),
        12 => Packet::PingReq,
        13 => Packet::PingResp,
        14 => Packet::Disconnect,
        num => return Err(Error::InvalidPacketType(num)),
    };

    Ok(packet)
}

/// Encodes `packet` onto the end of `buf`.
pub fn mqtt_write(packet: &Packet, buf: &mut BytesMut) -> Result<usize, Error> {
    match packet {
        Packet::Connect(p) => p.write(buf),
        Packet::ConnAck(p) => p.write(buf),
        Packet::Publish(p) => p.write(buf),
        Packet::PubAck(p) => p.write(buf),
        Packet::Subscribe(p) => p.write(buf),
        Packet::SubAck(p) => p.write(buf),
        Packet::Unsubscribe(p) => p.write(buf),
        Packet::UnsubAck(p) => p.write(buf),
        Packet::PingReq => PingReq.write(buf),
        Packet::PingResp => PingResp.write(buf),
        Packet::Disconnect => Disconnect.write(buf),
    }
}

pub(crate) fn read_mqtt_bytes(bytes: &mut bytes::Bytes) -> Result<bytes::Bytes, Error> {
    if bytes.len() < 2 {
        return Err(Error::MalformedPacket);
    }

    let len = bytes.get_u16() as usize;
    if bytes.len() < len {
        return Err(Error::MalformedPacket);
    }

    Ok(bytes.split_to(len))
}

pub(crate) fn read_mqtt_string(bytes: &mut bytes::Bytes) -> Result<String, Error> {
    let raw = read_mqtt_bytes(bytes)?;
    String::from_utf8(raw.to_vec()).map_err(|_| Error::MalformedPacket)
}

pub(crate) fn write_mqtt_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

pub(crate) fn write_mqtt_string(buf: &mut BytesMut, string: &str) {
    write_mqtt_bytes(buf, string.as_bytes());
}
