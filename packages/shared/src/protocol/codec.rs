//! Frame reader and writer.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{
    error::{ProtocolError, ReadError},
    metadata::Metadata,
};

/// Byte separating the metadata block from the payload.
pub const METADATA_TERMINATOR: u8 = 0x00;

/// Upper bound on the metadata block, terminator excluded.
pub const MAX_METADATA_LEN: usize = 1024 * 1024;

// Payload buffers grow past this on demand instead of trusting `size` up front.
const PAYLOAD_PREALLOC_LIMIT: usize = 64 * 1024;

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends before the first byte of a new
/// frame. A stream that ends anywhere inside a frame is a
/// [`ProtocolError`], never a short object.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<(Metadata, Vec<u8>)>, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut block = Vec::new();
    let read = (&mut *reader)
        .take(MAX_METADATA_LEN as u64 + 1)
        .read_until(METADATA_TERMINATOR, &mut block)
        .await?;

    if read == 0 {
        return Ok(None);
    }

    if block.last() != Some(&METADATA_TERMINATOR) {
        if block.len() > MAX_METADATA_LEN {
            return Err(ProtocolError::MetadataTooLarge {
                limit: MAX_METADATA_LEN,
            }
            .into());
        }
        return Err(ProtocolError::UnterminatedMetadata(block.len()).into());
    }
    block.pop();

    let metadata = Metadata::from_json_slice(&block)?;
    let size = metadata.size()?.unwrap_or(0);

    let mut payload = Vec::with_capacity(size.min(PAYLOAD_PREALLOC_LIMIT));
    let received = (&mut *reader)
        .take(size as u64)
        .read_to_end(&mut payload)
        .await?;

    if received < size {
        return Err(ProtocolError::Truncated {
            expected: size,
            received,
        }
        .into());
    }

    Ok(Some((metadata, payload)))
}

/// Encode a frame. `size` is always rewritten to the payload length, and
/// appended last when `metadata` has none.
pub fn serialize(metadata: &Metadata, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut metadata = metadata.clone();
    metadata.set_size(payload.len());

    let mut frame = metadata.to_json_vec()?;
    frame.reserve(payload.len() + 1);
    frame.push(METADATA_TERMINATOR);
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BusinessObject;
    use serde_json::json;
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::{AsyncRead, BufReader, ReadBuf};

    /// Transport that fails every read with the given error kind
    struct FailingReader(io::ErrorKind);

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::from(self.0)))
        }
    }

    fn frame(metadata: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = metadata.as_bytes().to_vec();
        bytes.push(METADATA_TERMINATOR);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_metadata_and_payload() {
        // テスト項目: size を持つメタデータはそのまま往復し、ペイロードも一致する
        // given (前提条件):
        let mut object = BusinessObject::with_type("image/jpeg", vec![0, 255, 0, 10, 13]);
        object.metadata_mut().insert("channel", "lobby");
        object.metadata_mut().insert("nested", json!({"a": [1, 2]}));
        let (metadata, payload) = object.into_parts();

        // when (操作):
        let bytes = serialize(&metadata, &payload).unwrap();
        let mut stream: &[u8] = &bytes;
        let decoded = read_packet(&mut stream).await.unwrap();

        // then (期待する結果):
        assert_eq!(decoded, Some((metadata, payload)));
        assert!(stream.is_empty());
    }

    #[tokio::test]
    async fn test_roundtrip_without_size_adds_only_size() {
        // テスト項目: size を持たないメタデータは size だけが末尾に追加されて往復する
        // given (前提条件):
        let mut metadata = Metadata::new();
        metadata.set_type("text");
        metadata.insert("user", "alice");
        let payload = b"hello".to_vec();

        // when (操作):
        let bytes = serialize(&metadata, &payload).unwrap();
        let mut stream: &[u8] = &bytes;
        let (decoded, decoded_payload) = read_packet(&mut stream).await.unwrap().unwrap();

        // then (期待する結果):
        let mut expected = metadata.clone();
        expected.set_size(payload.len());
        assert_eq!(decoded, expected);
        assert_eq!(decoded_payload, payload);
        let keys: Vec<&str> = decoded.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["type", "user", "size"]);
        assert!(!metadata.contains_key("size"));
    }

    #[tokio::test]
    async fn test_roundtrip_rewrites_stale_size() {
        // テスト項目: ペイロード長と異なる size は送信時にペイロード長へ書き換えられる
        // given (前提条件):
        let mut metadata = Metadata::new();
        metadata.set_type("text");
        metadata.set_size(99);

        // when (操作):
        let bytes = serialize(&metadata, b"abc").unwrap();
        let mut stream: &[u8] = &bytes;
        let (decoded, payload) = read_packet(&mut stream).await.unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(decoded.size().unwrap(), Some(3));
        assert_eq!(payload, b"abc");
        assert!(stream.is_empty());
    }

    #[tokio::test]
    async fn test_roundtrip_empty_payload() {
        // テスト項目: ペイロードが空のオブジェクトも往復できる
        // given (前提条件):
        let object = BusinessObject::registration("probe", crate::protocol::ReceiveMode::All);
        let bytes = object.to_bytes().unwrap();

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let (metadata, payload) = read_packet(&mut stream).await.unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(&metadata, object.metadata());
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_serialize_wire_format() {
        // テスト項目: JSON メタデータ、0x00、ペイロードの順にバイト列が出力される
        // given (前提条件):
        let object = BusinessObject::with_type("text", b"hello".to_vec());

        // when (操作):
        let bytes = object.to_bytes().unwrap();

        // then (期待する結果):
        assert_eq!(&bytes[..], &b"{\"type\":\"text\",\"size\":5}\0hello"[..]);
    }

    #[tokio::test]
    async fn test_consecutive_frames_are_read_in_order() {
        // テスト項目: 連続したフレームが送信順に読み出され、最後に EOF となる
        // given (前提条件):
        let mut bytes = frame(r#"{"type":"text","size":3}"#, b"one");
        bytes.extend(frame(r#"{"type":"text","size":3}"#, b"two"));

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let first = read_packet(&mut stream).await.unwrap().unwrap();
        let second = read_packet(&mut stream).await.unwrap().unwrap();
        let end = read_packet(&mut stream).await.unwrap();

        // then (期待する結果):
        assert_eq!(first.1, b"one");
        assert_eq!(second.1, b"two");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_empty_stream_is_clean_eof() {
        // テスト項目: フレーム開始前にストリームが終わった場合は正常な EOF となる
        // given (前提条件):
        let mut stream: &[u8] = &[];

        // when (操作):
        let result = read_packet(&mut stream).await;

        // then (期待する結果):
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_missing_size_means_empty_payload() {
        // テスト項目: size がないメタデータは空ペイロードとして読まれる
        // given (前提条件):
        let bytes = frame(r#"{"event":"service/state-changed"}"#, b"");

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let (metadata, payload) = read_packet(&mut stream).await.unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(metadata.get_str("event"), Some("service/state-changed"));
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_short_payload_is_truncation_error() {
        // テスト項目: 宣言より短いペイロードは短いオブジェクトではなく Truncated エラーになる
        // given (前提条件): size 10 declared, only 4 bytes follow
        let bytes = frame(r#"{"type":"text","size":10}"#, b"abcd");

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let result = read_packet(&mut stream).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ReadError::Protocol(ProtocolError::Truncated {
                expected: 10,
                received: 4
            }))
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_metadata_is_protocol_error() {
        // テスト項目: メタデータの途中で終わったストリームはプロトコルエラーになる
        // given (前提条件):
        let mut stream: &[u8] = br#"{"type":"te"#;

        // when (操作):
        let result = read_packet(&mut stream).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ReadError::Protocol(ProtocolError::UnterminatedMetadata(11)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_metadata_is_rejected() {
        // テスト項目: 上限内に終端がないメタデータは MetadataTooLarge になる
        // given (前提条件):
        let bytes = vec![b' '; MAX_METADATA_LEN + 10];

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let result = read_packet(&mut stream).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ReadError::Protocol(ProtocolError::MetadataTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_protocol_error() {
        // テスト項目: JSON として不正なメタデータは InvalidJson になる
        // given (前提条件):
        let bytes = frame("not json", b"");

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let result = read_packet(&mut stream).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ReadError::Protocol(ProtocolError::InvalidJson(_)))
        ));
    }

    #[tokio::test]
    async fn test_negative_size_is_protocol_error() {
        // テスト項目: 負の size は InvalidSize になる
        // given (前提条件):
        let bytes = frame(r#"{"size":-3}"#, b"");

        // when (操作):
        let mut stream: &[u8] = &bytes;
        let result = read_packet(&mut stream).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ReadError::Protocol(ProtocolError::InvalidSize(_)))
        ));
    }

    #[tokio::test]
    async fn test_peer_reset_is_surfaced_distinctly() {
        // テスト項目: 接続リセットは一般の I/O エラーと区別して返される
        // given (前提条件):
        let mut reader = BufReader::new(FailingReader(io::ErrorKind::ConnectionReset));

        // when (操作):
        let result = read_packet(&mut reader).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ReadError::ConnectionReset(_))));
    }

    #[tokio::test]
    async fn test_other_transport_errors_are_io() {
        // テスト項目: リセット以外の転送エラーは Io として返される
        // given (前提条件):
        let mut reader = BufReader::new(FailingReader(io::ErrorKind::TimedOut));

        // when (操作):
        let result = read_packet(&mut reader).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ReadError::Io(_))));
    }
}
