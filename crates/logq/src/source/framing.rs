//! Framing — splits a TCP byte stream into syslog frames.
//!
//! Two framings are accepted on the same connection (RFC 6587):
//! octet counting (`<len> <msg>`) when a frame starts with a digit followed
//! by a space-terminated length, and newline-delimited (LF or CRLF)
//! otherwise. Frames above the size limit are consumed and discarded.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest accepted octet count prefix.
const MAX_LENGTH_DIGITS: usize = 10;

#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Message(Bytes),
    /// Exceeded the size limit and was discarded.
    TooLong,
    Eof,
}

/// Reads frames with a bounded, reused buffer.
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
    max_size: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_size: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(max_size.min(64 * 1024)),
            max_size,
        }
    }

    /// Next frame. Empty lines and zero-length counted frames are skipped.
    pub async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            self.buf.clear();
            if !self.skip_line_breaks().await? {
                return Ok(Frame::Eof);
            }

            let first = self.reader.fill_buf().await?.first().copied();
            if first.is_some_and(|b| b.is_ascii_digit()) {
                match self.read_octet_count().await? {
                    Some(0) => continue,
                    Some(len) => return self.read_counted(len).await,
                    // Digits without a length separator: an ordinary line.
                    None => {}
                }
            }
            return self.read_line().await;
        }
    }

    /// Consume CR/LF bytes. Returns false at end of stream.
    async fn skip_line_breaks(&mut self) -> io::Result<bool> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(false);
            }
            let skip = available
                .iter()
                .take_while(|&&b| b == b'\n' || b == b'\r')
                .count();
            if skip < available.len() {
                self.reader.consume(skip);
                return Ok(true);
            }
            let len = available.len();
            self.reader.consume(len);
        }
    }

    /// Read `digits SP`. On anything else the bytes read so far stay in
    /// `buf` and `None` is returned.
    async fn read_octet_count(&mut self) -> io::Result<Option<usize>> {
        loop {
            let available = self.reader.fill_buf().await?;
            let Some(&b) = available.first() else {
                return Ok(None);
            };
            if b == b' ' && !self.buf.is_empty() {
                self.reader.consume(1);
                let len = std::str::from_utf8(&self.buf)
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok());
                if len.is_none() {
                    self.buf.push(b' ');
                }
                return Ok(len);
            }
            if !b.is_ascii_digit() || self.buf.len() >= MAX_LENGTH_DIGITS {
                return Ok(None);
            }
            self.buf.push(b);
            self.reader.consume(1);
        }
    }

    async fn read_counted(&mut self, len: usize) -> io::Result<Frame> {
        self.buf.clear();
        if len > self.max_size {
            let discarded = tokio::io::copy(&mut (&mut self.reader).take(len as u64), &mut tokio::io::sink()).await?;
            if discarded < len as u64 {
                return Ok(Frame::Eof);
            }
            return Ok(Frame::TooLong);
        }
        self.buf.resize(len, 0);
        match self.reader.read_exact(&mut self.buf).await {
            Ok(_) => Ok(Frame::Message(Bytes::copy_from_slice(&self.buf))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Frame::Eof),
            Err(e) => Err(e),
        }
    }

    /// Read up to the next LF, appending to whatever `buf` already holds.
    async fn read_line(&mut self) -> io::Result<Frame> {
        let mut exceeded = self.buf.len() > self.max_size;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            let (take, done) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            if !exceeded {
                let line_part = &available[..take];
                let content = if done { &line_part[..take - 1] } else { line_part };
                if self.buf.len() + content.len() > self.max_size {
                    exceeded = true;
                } else {
                    self.buf.extend_from_slice(content);
                }
            }
            self.reader.consume(take);
            if done {
                break;
            }
        }

        if exceeded {
            return Ok(Frame::TooLong);
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Frame::Message(Bytes::copy_from_slice(&self.buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn frames(input: &[u8], max: usize) -> Vec<Frame> {
        let mut reader = FrameReader::new(BufReader::new(input), max);
        let mut out = Vec::new();
        loop {
            let frame = reader.next_frame().await.unwrap();
            let eof = frame == Frame::Eof;
            out.push(frame);
            if eof {
                return out;
            }
        }
    }

    fn msg(s: &str) -> Frame {
        Frame::Message(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[tokio::test]
    async fn test_newline_framing_lf_and_crlf() {
        let got = frames(b"<13>one\n<13>two\r\n\n<13>three", 64).await;
        assert_eq!(got, vec![msg("<13>one"), msg("<13>two"), msg("<13>three"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_octet_counting() {
        let got = frames(b"7 <13>abc9 <13>1 - x", 64).await;
        assert_eq!(got, vec![msg("<13>abc"), msg("<13>1 - x"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_mixed_framing_on_one_stream() {
        let got = frames(b"5 <1>ab\n<2>line\n", 64).await;
        assert_eq!(got, vec![msg("<1>ab"), msg("<2>line"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_zero_length_counted_frames_are_skipped() {
        let got = frames(b"0 0 5 <1>ab0 ", 64).await;
        assert_eq!(got, vec![msg("<1>ab"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_digits_without_space_are_a_line() {
        let got = frames(b"12345abc\n", 64).await;
        assert_eq!(got, vec![msg("12345abc"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_oversized_line_is_dropped_and_stream_continues() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\n<13>ok\n");
        let got = frames(&input, 16).await;
        assert_eq!(got, vec![Frame::TooLong, msg("<13>ok"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_oversized_counted_frame_is_skipped() {
        let got = frames(b"20 aaaaaaaaaaaaaaaaaaaa4 <1>z", 8).await;
        assert_eq!(got, vec![Frame::TooLong, msg("<1>z"), Frame::Eof]);
    }

    #[tokio::test]
    async fn test_truncated_counted_frame_is_eof() {
        let got = frames(b"30 <13>short", 64).await;
        assert_eq!(got, vec![Frame::Eof]);
    }

    #[tokio::test]
    async fn test_reads_across_partial_writes() {
        let stream = tokio_test::io::Builder::new()
            .read(b"<13>hel")
            .read(b"lo\n10 <13>wor")
            .read(b"ld!")
            .build();
        let mut reader = FrameReader::new(BufReader::new(stream), 64);
        assert_eq!(reader.next_frame().await.unwrap(), msg("<13>hello"));
        assert_eq!(reader.next_frame().await.unwrap(), msg("<13>world!"));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_read_error_is_propagated() {
        let stream = tokio_test::io::Builder::new()
            .read(b"<13>partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = FrameReader::new(BufReader::new(stream), 64);
        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
