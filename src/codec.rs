//! Framed message codec.
//!
//! Every message on the wire is a fixed-width, zero-padded decimal length
//! header followed by the payload:
//!
//! ```text
//! 0000000020TEST_REQUEST_DATA_1234
//! ^^^^^^^^^^ 10 ASCII digits = payload length in EUC-KR bytes
//! ```
//!
//! The length always counts encoded bytes, never characters. EUC-KR stores
//! ASCII in one byte and Hangul/Hanja in two, so the reader walks the stream
//! one character at a time and keeps a running byte count.

use crate::config::HEADER_SIZE;
use crate::error::FrameError;
use bytes::{BufMut, Bytes, BytesMut};
use encoding_rs::EUC_KR;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Length declared by the header.
    pub declared_len: usize,
    /// Raw payload bytes as received.
    pub raw: Bytes,
    /// Payload decoded from EUC-KR.
    pub payload: String,
    /// The stream ended before `declared_len` bytes arrived.
    pub truncated: bool,
}

impl Frame {
    /// Number of payload bytes actually received.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Encoded byte length of `text` in EUC-KR.
pub fn encoded_len(text: &str) -> usize {
    encode(text).len()
}

/// Encode text as EUC-KR.
///
/// Characters EUC-KR cannot represent are replaced with numeric character
/// references, so the result is always well-formed.
pub fn encode(text: &str) -> Bytes {
    let (bytes, _, _) = EUC_KR.encode(text);
    Bytes::copy_from_slice(&bytes)
}

/// Decode EUC-KR bytes, substituting U+FFFD for malformed sequences.
pub fn decode(bytes: &[u8]) -> String {
    let (text, _) = EUC_KR.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Format the zero-padded length header for a payload of `len` bytes.
pub fn length_header(len: usize) -> String {
    format!("{len:0width$}", width = HEADER_SIZE)
}

/// Build a complete wire message: header followed by the encoded payload.
pub fn encode_frame(payload: &str) -> Bytes {
    let body = encode(payload);
    let header = length_header(body.len());

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body.len());
    frame.put_slice(header.as_bytes());
    frame.put_slice(&body);
    frame.freeze()
}

/// Write one framed message and flush it. Returns the number of bytes written.
pub async fn write_frame<W>(writer: &mut W, payload: &str) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(frame.len())
}

/// Write an already encoded message (header included) and flush it.
pub async fn write_encoded<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message).await?;
    writer.flush().await
}

/// Number of bytes the EUC-KR character starting with `lead` occupies.
///
/// `next` is the byte after `lead`, if any. A lead byte without a valid
/// trail byte counts as a single malformed byte, leaving the trail byte to
/// start the next character.
fn char_width(lead: u8, next: Option<u8>) -> usize {
    match (lead, next) {
        (0x81..=0xFE, Some(0x41..=0x5A | 0x61..=0x7A | 0x81..=0xFE)) => 2,
        _ => 1,
    }
}

/// Reads framed messages from a byte stream, one character at a time.
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            eof: false,
        }
    }

    /// Read one message.
    ///
    /// A stream that ends inside the payload yields a frame flagged
    /// `truncated` holding whatever arrived.
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        let mut header = BytesMut::with_capacity(HEADER_SIZE);
        for _ in 0..HEADER_SIZE {
            match self.next_char().await? {
                Some(ch) => header.put_slice(&ch),
                None => return Err(FrameError::IncompleteHeader),
            }
        }

        let header = decode(&header);
        let declared_len = parse_header(&header)?;

        let mut raw = BytesMut::with_capacity(declared_len.min(64 * 1024));
        let mut truncated = false;
        while raw.len() < declared_len {
            match self.next_char().await? {
                Some(ch) => raw.put_slice(&ch),
                None => {
                    truncated = true;
                    break;
                }
            }
        }

        if truncated {
            warn!(
                declared = declared_len,
                received = raw.len(),
                "Stream ended before payload was complete"
            );
        }

        let raw = raw.freeze();
        Ok(Frame {
            declared_len,
            payload: decode(&raw),
            raw,
            truncated,
        })
    }

    /// Bytes of the next character, or `None` at end of stream.
    async fn next_char(&mut self) -> io::Result<Option<Bytes>> {
        if !self.fill(1).await? {
            return Ok(None);
        }

        let lead = self.buffer[0];
        let width = if matches!(lead, 0x81..=0xFE) {
            self.fill(2).await?;
            char_width(lead, self.buffer.get(1).copied())
        } else {
            1
        };

        Ok(Some(self.buffer.split_to(width).freeze()))
    }

    /// Make sure at least `want` bytes are buffered. Returns false if the
    /// stream ended first.
    async fn fill(&mut self, want: usize) -> io::Result<bool> {
        while self.buffer.len() < want {
            if self.eof {
                return Ok(false);
            }
            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                self.eof = true;
            }
        }
        Ok(true)
    }

    /// Bytes buffered but not yet consumed.
    #[cfg(test)]
    fn remaining(&self) -> &[u8] {
        &self.buffer
    }
}

/// Parse the decimal length header.
///
/// Leading and trailing control characters and spaces are ignored. Values
/// outside the range of a signed 32-bit integer are rejected; negative
/// lengths declare an empty payload.
pub fn parse_header(header: &str) -> Result<usize, FrameError> {
    header
        .trim_matches(|c: char| c <= ' ')
        .parse::<i32>()
        .map(|n| usize::try_from(n).unwrap_or(0))
        .map_err(|_| FrameError::InvalidHeader(header.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn euc_kr(text: &str) -> Vec<u8> {
        encode(text).to_vec()
    }

    #[test]
    fn test_length_header() {
        assert_eq!(length_header(0), "0000000000");
        assert_eq!(length_header(20), "0000000020");
        assert_eq!(length_header(14336), "0000014336");
    }

    #[test]
    fn test_encoded_len_counts_bytes() {
        assert_eq!(encoded_len("hello"), 5);
        assert_eq!(encoded_len("한글"), 4);
        assert_eq!(encoded_len("A가B"), 4);
        assert_eq!(encoded_len(""), 0);
    }

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame("요청DATA");
        assert_eq!(&frame[..HEADER_SIZE], b"0000000008");
        assert_eq!(frame.len(), HEADER_SIZE + 8);
        assert_eq!(decode(&frame[HEADER_SIZE..]), "요청DATA");
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("0000000020").unwrap(), 20);
        assert_eq!(parse_header("        20").unwrap(), 20);
        assert!(matches!(
            parse_header("NOTANUMBER"),
            Err(FrameError::InvalidHeader(h)) if h == "NOTANUMBER"
        ));
        assert!(parse_header("9999999999").is_err());
        assert!(parse_header("          ").is_err());
    }

    #[test]
    fn test_parse_header_negative_declares_empty_payload() {
        assert_eq!(parse_header("-000000001").unwrap(), 0);
        assert_eq!(parse_header("-2147483648").unwrap(), 0);
    }

    #[test]
    fn test_parse_header_ignores_control_padding() {
        assert_eq!(parse_header("\0\0\0\0\0\0\0\020").unwrap(), 20);
        assert_eq!(parse_header("\t0000020\r\n").unwrap(), 20);
    }

    #[test]
    fn test_char_width() {
        assert_eq!(char_width(b'A', Some(b'B')), 1);
        assert_eq!(char_width(0xB0, Some(0xA1)), 2);
        assert_eq!(char_width(0xB0, None), 1);
        assert_eq!(char_width(0x80, Some(0xA1)), 1);
        assert_eq!(char_width(0xB0, Some(0x0A)), 1);
        assert_eq!(char_width(0x81, Some(0x41)), 2);
        assert_eq!(char_width(0x81, Some(0x61)), 2);
        // bytes between the alphabetic runs are not trail bytes
        for trail in [0x5B, 0x60, 0x7B, 0x80] {
            assert_eq!(char_width(0x81, Some(trail)), 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_trail_byte_starts_next_character() {
        // 0xB0 followed by '[' decodes as U+FFFD then '['
        let mock = Builder::new().read(b"0000000003\xB0[A").build();
        let frame = FrameReader::new(mock).read_frame().await.unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.payload, "\u{FFFD}[A");
        assert!(!frame.truncated);
    }

    #[tokio::test]
    async fn test_read_ascii_frame() {
        let mock = Builder::new().read(b"0000000005hello").build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.declared_len, 5);
        assert_eq!(frame.payload, "hello");
        assert_eq!(frame.len(), 5);
        assert!(!frame.truncated);
    }

    #[tokio::test]
    async fn test_read_multibyte_frame_split_across_reads() {
        let body = euc_kr("가나다ABC");
        assert_eq!(body.len(), 9);

        // split in the middle of a two-byte character
        let mock = Builder::new()
            .read(b"00000")
            .read(b"00009")
            .read(&body[..3])
            .read(&body[3..])
            .build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.payload, "가나다ABC");
        assert_eq!(frame.len(), 9);
        assert!(!frame.truncated);
    }

    #[tokio::test]
    async fn test_read_stops_at_declared_length() {
        let mock = Builder::new().read(b"0000000003abcdef").build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.payload, "abc");
        assert_eq!(reader.remaining(), b"def");
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mock = Builder::new().read(b"0000000020TEST_REQUEST_DATA").build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.declared_len, 20);
        assert_eq!(frame.payload, "TEST_REQUEST_DATA");
        assert_eq!(frame.len(), 17);
        assert!(frame.truncated);
    }

    #[tokio::test]
    async fn test_read_incomplete_header() {
        let mock = Builder::new().read(b"00000").build();
        let mut reader = FrameReader::new(mock);

        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::IncompleteHeader)
        ));
    }

    #[tokio::test]
    async fn test_read_invalid_header() {
        let mock = Builder::new().read(b"NOTANUMBER").build();
        let mut reader = FrameReader::new(mock);

        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_read_zero_length_frame() {
        let mock = Builder::new().read(b"0000000000").build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_frame().await.unwrap();
        assert!(frame.is_empty());
        assert!(!frame.truncated);
    }

    #[tokio::test]
    async fn test_read_header_only_frame() {
        let mock = Builder::new().read(b"0000000020").build();
        let frame = FrameReader::new(mock).read_frame().await.unwrap();
        assert_eq!(frame.declared_len, 20);
        assert!(frame.is_empty());
        assert!(frame.truncated);

        let mock = Builder::new().read(b"-000000001").build();
        let frame = FrameReader::new(mock).read_frame().await.unwrap();
        assert_eq!(frame.declared_len, 0);
        assert!(frame.is_empty());
        assert!(!frame.truncated);
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut expected = b"0000000006".to_vec();
        expected.extend_from_slice(&euc_kr("한글OK"));

        let mut mock = Builder::new().write(&expected).build();
        let written = write_frame(&mut mock, "한글OK").await.unwrap();
        assert_eq!(written, 16);
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let payload = "TEST_REQUEST_20260101_안녕하세요_NICE";
        let wire = encode_frame(payload);

        let mock = Builder::new().read(&wire).build();
        let frame = FrameReader::new(mock).read_frame().await.unwrap();
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.len(), parse_header(&decode(&wire[..HEADER_SIZE])).unwrap());
    }
}
