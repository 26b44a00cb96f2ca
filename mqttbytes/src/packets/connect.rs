use crate::{
    read_mqtt_bytes, read_mqtt_string, write_mqtt_bytes, write_mqtt_string,
    write_remaining_length, Error, FixedHeader, QoS,
};
use bytes::{Buf, Bytes, BytesMut};

/// Username/password credentials carried in CONNECT.
#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub username: String,
    pub password: String,
}

/// The broker-published message sent on the client's behalf on ungraceful
/// disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    pub keep_alive: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub last_will: Option<LastWill>,
    pub login: Option<Login>,
}

impl Connect {
    pub fn new<S: Into<String>>(client_id: S) -> Connect {
        Connect {
            keep_alive: 60,
            client_id: client_id.into(),
            clean_session: true,
            last_will: None,
            login: None,
        }
    }

    pub(crate) fn assemble(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Self, Error> {
        bytes.advance(fixed_header.header_len);

        let protocol_name = read_mqtt_string(&mut bytes)?;
        let protocol_level = bytes.get_u8();
        if protocol_name != "MQTT" || protocol_level != 4 {
            return Err(Error::MalformedPacket);
        }

        let connect_flags = bytes.get_u8();
        let clean_session = (connect_flags & 0b10) != 0;
        let keep_alive = bytes.get_u16();

        let client_id = read_mqtt_string(&mut bytes)?;

        let last_will = if connect_flags & 0b100 != 0 {
            let will_topic = read_mqtt_string(&mut bytes)?;
            let will_message = read_mqtt_bytes(&mut bytes)?;
            let will_qos = crate::qos::qos((connect_flags & 0b11000) >> 3)?;
            let will_retain = (connect_flags & 0b0010_0000) != 0;
            Some(LastWill {
                topic: will_topic,
                message: will_message,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let login = if connect_flags & 0b1000_0000 != 0 {
            let username = read_mqtt_string(&mut bytes)?;
            let password = if connect_flags & 0b0100_0000 != 0 {
                read_mqtt_string(&mut bytes)?
            } else {
                String::new()
            };
            Some(Login { username, password })
        } else {
            None
        };

        Ok(Connect {
            keep_alive,
            client_id,
            clean_session,
            last_will,
            login,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<usize, Error> {
        let mut remaining_len = 2 + 4 + 1 + 1 + 2 + 2 + self.client_id.len();

        let last_will_len = self.last_will.as_ref().map(|will| {
            2 + will.topic.len() + 2 + will.message.len()
        });
        remaining_len += last_will_len.unwrap_or(0);

        let login_len = self.login.as_ref().map(|login| {
            let mut len = 2 + login.username.len();
            if !login.password.is_empty() {
                len += 2 + login.password.len();
            }
            len
        });
        remaining_len += login_len.unwrap_or(0);

        buf.extend_from_slice(&[0b0001_0000]);
        write_remaining_length(remaining_len, buf)?;

        write_mqtt_string(buf, "MQTT");
        buf.extend_from_slice(&[4]);

        let mut connect_flags = 0u8;
        if self.clean_session {
            connect_flags |= 0b10;
        }
        if let Some(will) = &self.last_will {
            connect_flags |= 0b100;
            connect_flags |= (will.qos.to_u8()) << 3;
            if will.retain {
                connect_flags |= 0b0010_0000;
            }
        }
        if let Some(login) = &self.login {
            connect_flags |= 0b1000_0000;
            if !login.password.is_empty() {
                connect_flags |= 0b0100_0000;
            }
        }
        buf.extend_from_slice(&[connect_flags]);

        buf.extend_from_slice(&self.keep_alive.to_be_bytes());
        write_mqtt_string(buf, &self.client_id);

        if let Some(will) = &self.last_will {
            write_mqtt_string(buf, &will.topic);
            write_mqtt_bytes(buf, &will.message);
        }

        if let Some(login) = &self.login {
            write_mqtt_string(buf, &login.username);
            if !login.password.is_empty() {
                write_mqtt_string(buf, &login.password);
            }
        }

        Ok(1 + remaining_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{mqtt_read, Packet};
    use pretty_assertions::assert_eq;

    #[test]
    fn connect_round_trips_with_will_and_login() {
        let mut connect = Connect::new("test-client");
        connect.keep_alive = 30;
        connect.clean_session = false;
        connect.last_will = Some(LastWill {
            topic: "a/will".into(),
            message: Bytes::from_static(b"bye"),
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        connect.login = Some(Login {
            username: "u".into(),
            password: "p".into(),
        });

        let mut buf = BytesMut::new();
        connect.write(&mut buf).unwrap();

        let packet = mqtt_read(&mut buf, 1024).unwrap();
        match packet {
            Packet::Connect(out) => assert_eq!(out, connect),
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
