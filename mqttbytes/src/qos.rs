use crate::Error;

/// Quality of service. QoS 2 is not implemented by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

impl QoS {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

pub(crate) fn qos(byte: u8) -> Result<QoS, Error> {
    match byte {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        num => Err(Error::InvalidQoS(num)),
    }
}
