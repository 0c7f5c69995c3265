//! Length-prefixed framing and envelope codec (§4.1, §6.1).
//!
//! A frame is `u32 big-endian length | payload`. The payload is a
//! Protocol-Buffers `Message` whose `content` field holds the serialized
//! sub-message selected by `type`. Readers get back one of a decoded frame
//! or a clean EOF; anything else is an error that ends the connection.

use bytes::{Bytes, BytesMut};
use prost::Message as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;
use crate::proto;

/// Ceiling on a single frame's payload length, per §4.1.
pub const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

/// Outcome of reading one frame off a connection.
pub enum Frame {
    /// A complete frame, still holding its original bytes (without the
    /// length prefix). Routing forwards these bytes verbatim.
    Data(Bytes),
    /// The peer closed the connection cleanly between frames.
    Eof,
}

/// Reads exactly one frame, or reports clean EOF.
///
/// A frame of length 0 is well-formed: it decodes to an empty `Message`,
/// which is rejected downstream by the type-specific decoder rather than
/// here (§8 boundary behavior).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, WireError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Frame::Eof),
        Err(err) => return Err(err.into()),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Frame::Data(Bytes::from(payload)))
}

/// Prefixes `payload` with its big-endian length, ready for a single write.
pub fn frame_bytes(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Writes a single already-framed buffer (length prefix included) in one
/// syscall, per the "no additional lock required" framed-write property.
pub async fn write_framed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    framed: &[u8],
) -> Result<(), WireError> {
    writer.write_all(framed).await?;
    Ok(())
}

/// A decoded envelope, tagged by the variant selected on the wire.
#[derive(Debug)]
pub enum Envelope {
    Register(proto::Register),
    Request(proto::Request),
    Reply(proto::Reply),
    Subscribe(proto::Subscribe),
    Publish(proto::Publish),
}

/// Decodes the outer `Message` and then its `content` as the sub-message
/// indicated by `type`. Unknown type tags and malformed content both
/// produce a [`WireError`]; callers log the hex dump of `raw` and drop the
/// message without tearing down the connection (§7).
pub fn decode_envelope(raw: &[u8]) -> Result<Envelope, WireError> {
    let message = proto::Message::decode(raw)?;
    let ty = proto::message::Type::try_from(message.r#type)
        .map_err(|_| WireError::UnknownType(message.r#type))?;
    let content = message.content.as_slice();

    Ok(match ty {
        proto::message::Type::Register => Envelope::Register(proto::Register::decode(content)?),
        proto::message::Type::Request => Envelope::Request(proto::Request::decode(content)?),
        proto::message::Type::Reply => Envelope::Reply(proto::Reply::decode(content)?),
        proto::message::Type::Subscribe => Envelope::Subscribe(proto::Subscribe::decode(content)?),
        proto::message::Type::Publish => Envelope::Publish(proto::Publish::decode(content)?),
    })
}

/// Encodes a sub-message as a fully framed `Message` of the given type,
/// ready to hand to [`write_framed`]. Used only for broker-originated
/// frames (cellaserv replies, synthesized errors, cellaserv publishes) —
/// client-originated frames are always forwarded as the bytes read off the
/// wire, never re-encoded (§4.7, §9 "Outbound write discipline").
pub fn encode_message_frame(ty: proto::message::Type, content: Vec<u8>) -> Bytes {
    let message = proto::Message {
        r#type: ty as i32,
        content,
    };
    frame_bytes(&message.encode_to_vec())
}
