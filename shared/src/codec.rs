//! Length-prefixed JSON framing over any tokio byte stream.
//!
//! A frame is a 4-byte big-endian body length followed by exactly that many
//! bytes. `write_frame` emits prefix and body from a single buffer so one
//! message never interleaves with another written through the same writer.
//! `read_frame` uses `read_exact` for both parts; a short read on either is an
//! `UnexpectedEof` and means the peer is gone.

use crate::message::Envelope;
use crate::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted body. Guards the allocation in `read_frame` against a
/// garbage length prefix.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Write one frame: length prefix then body, flushed.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame body.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Serialise an envelope into a complete frame, prefix included.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(envelope)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(envelope)?;
    write_frame(writer, &body).await
}

pub async fn read_envelope<R>(reader: &mut R) -> Result<Envelope, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let body = read_frame(reader).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;

    #[tokio::test]
    async fn test_envelope_roundtrip() {
        let original = Envelope::new("deploy", json!({ "troop": "knight" }));

        let mut buf: Vec<u8> = Vec::new();
        write_envelope(&mut buf, &original).await.unwrap();

        let mut cursor = buf.as_slice();
        let recovered = read_envelope(&mut cursor).await.unwrap();
        assert_eq!(recovered, original);
        assert!(cursor.is_empty());
    }

    #[tokio::test]
    async fn test_roundtrip_large_body() {
        // Well past a single 64 KiB socket read.
        let blob = "x".repeat(200 * 1024);
        let original = Envelope::new("error", json!({ "msg": blob }));

        let (mut client, mut server) = tokio::io::duplex(4096);
        let sent = original.clone();
        let writer = tokio::spawn(async move {
            write_envelope(&mut client, &sent).await.unwrap();
        });

        let recovered = read_envelope(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(recovered, original);
    }

    #[tokio::test]
    async fn test_empty_frame_roundtrip() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, b"").await.unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0]);

        let mut cursor = buf.as_slice();
        let body = read_frame(&mut cursor).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_is_big_endian() {
        let envelope = Envelope::new("match_pending", json!({}));
        let frame = encode_envelope(&envelope).unwrap();

        let body_len = frame.len() - 4;
        assert_eq!(&frame[..4], &(body_len as u32).to_be_bytes());

        let mut written: Vec<u8> = Vec::new();
        write_envelope(&mut written, &envelope).await.unwrap();
        assert_eq!(written, frame);
    }

    #[tokio::test]
    async fn test_truncated_prefix_is_eof() {
        let mut cursor: &[u8] = &[0u8, 1];
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_truncated_body_is_eof() {
        let mut bytes = 10u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut cursor = bytes.as_slice();

        match read_frame(&mut cursor).await {
            Err(ProtocolError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_oversized_prefix() {
        let fake_len = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        let mut cursor: &[u8] = &fake_len;
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized_write() {
        let big = vec![0u8; MAX_FRAME_SIZE + 1];
        let mut buf: Vec<u8> = Vec::new();
        let err = write_frame(&mut buf, &big).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_body_is_rejected() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, b"not json at all").await.unwrap();

        let mut cursor = buf.as_slice();
        let err = read_envelope(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[tokio::test]
    async fn test_multiple_envelopes_in_sequence() {
        let envelopes = vec![
            Envelope::new("login", json!({ "username": "a", "secret": "b" })),
            Envelope::new("deploy", json!({ "troop": "pawn" })),
            Envelope::new("deploy", json!({ "troop": "rook" })),
        ];

        let mut buf: Vec<u8> = Vec::new();
        for envelope in &envelopes {
            write_envelope(&mut buf, envelope).await.unwrap();
        }

        let mut cursor = buf.as_slice();
        for expected in &envelopes {
            let recovered = read_envelope(&mut cursor).await.unwrap();
            assert_eq!(&recovered, expected);
        }
    }

    #[test]
    fn test_missing_data_decodes_as_null() {
        let body = br#"{"type":"match_pending"}"#;
        let envelope: Envelope = serde_json::from_slice(body).unwrap();
        assert_eq!(envelope.kind, "match_pending");
        assert!(envelope.data.is_null());
    }

    #[test]
    fn test_blocking_roundtrip_with_tokio_test() {
        let envelope = Envelope::new("game_start", json!({ "players": [1, 2] }));
        let frame = encode_envelope(&envelope).unwrap();

        let recovered = tokio_test::block_on(async {
            let mut cursor = frame.as_slice();
            read_envelope(&mut cursor).await
        })
        .unwrap();
        assert_eq!(recovered, envelope);
    }
}
