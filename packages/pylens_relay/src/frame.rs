//! Newline-delimited framing for the upstream stream.
//!
//! Wire format: one UTF-8 JSON object per line, terminated by `\n`.

use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::debug;

/// Splits a byte stream into lines, carrying partial lines across reads.
///
/// Unlike `LinesCodec`, an unterminated remainder at end of stream is
/// discarded rather than emitted: a runtime that dies mid-write leaves half a
/// JSON object behind, which is never a message.
#[derive(Debug, Default)]
pub struct LineFrameDecoder {
    /// Bytes of the carry buffer already scanned for `\n`.
    scanned: usize,
}

impl LineFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineFrameDecoder {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        let start = self.scanned.min(src.len());
        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let newline = start + offset;
                let frame = src.split_to(newline + 1);
                self.scanned = 0;
                Ok(Some(String::from_utf8_lossy(&frame[..newline]).into_owned()))
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "discarding unterminated trailing frame");
            src.clear();
        }
        self.scanned = 0;
        Ok(None)
    }
}

/// Lazy stream of lines for one connection.
pub fn lines<R: AsyncRead>(reader: R) -> FramedRead<R, LineFrameDecoder> {
    FramedRead::new(reader, LineFrameDecoder::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use proptest::prelude::*;

    /// Feed `chunks` one read at a time, then signal end of stream.
    fn decode_chunks(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = LineFrameDecoder::new();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in chunks {
            buf.extend_from_slice(chunk);
            while let Some(line) = decoder.decode(&mut buf).unwrap() {
                out.push(line);
            }
        }
        while let Some(line) = decoder.decode_eof(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let lines = decode_chunks(&[b"{\"a\":1}\n{\"b\":2}\n"]);
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn frame_split_across_reads() {
        let lines = decode_chunks(&[b"{\"type\":\"out", b"put\",\"data\":\"x\"}\n"]);
        assert_eq!(lines, vec!["{\"type\":\"output\",\"data\":\"x\"}"]);
    }

    #[test]
    fn empty_lines_are_emitted() {
        let lines = decode_chunks(&[b"\n\na\n"]);
        assert_eq!(lines, vec!["", "", "a"]);
    }

    #[test]
    fn unterminated_remainder_is_discarded() {
        let lines = decode_chunks(&[b"whole\npart", b"ial"]);
        assert_eq!(lines, vec!["whole"]);
    }

    #[test]
    fn multibyte_char_split_across_reads() {
        let text = "{\"data\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let lines = decode_chunks(&[&text[..split], &text[split..]]);
        assert_eq!(lines, vec!["{\"data\":\"héllo\"}"]);
    }

    #[tokio::test]
    async fn framed_read_over_async_reader() {
        let reader = tokio_test::io::Builder::new()
            .read(b"one\ntw")
            .read(b"o\nthree")
            .build();
        let collected: Vec<String> = lines(reader).map(|r| r.unwrap()).collect().await;
        assert_eq!(collected, vec!["one", "two"]);
    }

    proptest! {
        #[test]
        fn split_invariance(
            lines in proptest::collection::vec("[a-z{}\":, ]{0,12}", 0..8),
            tail in "[a-z]{0,5}",
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let mut stream = String::new();
            for line in &lines {
                stream.push_str(line);
                stream.push('\n');
            }
            stream.push_str(&tail);
            let bytes = stream.as_bytes();

            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();
            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut prev = 0;
            for p in points {
                chunks.push(&bytes[prev..p]);
                prev = p;
            }
            chunks.push(&bytes[prev..]);

            let whole = decode_chunks(&[bytes]);
            let split = decode_chunks(&chunks);
            prop_assert_eq!(&whole, &lines);
            prop_assert_eq!(split, whole);
        }
    }
}
