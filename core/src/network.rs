//! The byte-level transport is an external collaborator (§1): TCP, TLS or
//! WebSocket framed streams all satisfy this trait. Construction (TLS
//! config, HTTP-proxy CONNECT, WebSocket upgrade) lives outside the core.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub trait Network: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> Network for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Reads bytes off `reader` until `buf` holds one complete frame, then
/// decodes it. `buf` carries any already-buffered bytes between calls (a
/// read can land more than one frame, or less than one).
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<mqttbytes::Packet, crate::error::ConnectionError> {
    loop {
        match mqttbytes::mqtt_read(buf, max_size) {
            Ok(packet) => return Ok(packet),
            Err(mqttbytes::Error::InsufficientBytes(_)) => {
                let n = reader.read_buf(buf).await?;
                if n == 0 {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    packet: &mqttbytes::Packet,
) -> Result<(), crate::error::ConnectionError> {
    let mut buf = BytesMut::new();
    mqttbytes::mqtt_write(packet, &mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}
