//! server-sent-events framing for the chat stream.
//!
//! bytes arrive in arbitrary chunks; a line may span chunks and a chunk may
//! carry many lines. the decoder keeps the trailing partial line as raw bytes
//! so a multi-byte utf-8 sequence split across chunks still decodes cleanly.

use std::io::{self, Read};

/// literal payload that ends a stream normally.
pub const DONE_SENTINEL: &str = "[DONE]";

/// one decoded `data:` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// payload text after the `data:` prefix (may be empty).
    Data(String),
    /// the `[DONE]` sentinel; nothing follows it.
    Done,
}

/// incremental `data:` line decoder. one instance per stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// true once the sentinel was seen; every later call yields nothing.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// feed one chunk, returning the frames completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let frame = decode_line(&self.pending[start..end]);
            start = end + 1;
            if let Some(frame) = frame {
                let is_done = frame == Frame::Done;
                frames.push(frame);
                if is_done {
                    self.done = true;
                    self.pending.clear();
                    return frames;
                }
            }
        }
        self.pending.drain(..start);
        frames
    }

    /// the byte stream ended: decode whatever is left as one last line.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let frame = decode_line(&rest);
        if frame == Some(Frame::Done) {
            self.done = true;
        }
        frame
    }

    /// decode a complete body in one go (used for error bodies).
    pub fn decode_all(body: &[u8]) -> Vec<Frame> {
        let mut decoder = Self::new();
        let mut frames = decoder.push(body);
        frames.extend(decoder.finish());
        frames
    }
}

/// strip the `data:` prefix from a line, with or without one following space.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
}

fn decode_line(raw: &[u8]) -> Option<Frame> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    let payload = data_payload(&line)?;
    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_string()))
    }
}

/// lazy frame source over a blocking body reader.
///
/// each `next_chunk` performs exactly one read, so a caller can check for
/// cancellation between reads.
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    buf: Vec<u8>,
    exhausted: bool,
}

impl<R: Read> FrameReader<R> {
    const CHUNK: usize = 8 * 1024;

    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            buf: vec![0; Self::CHUNK],
            exhausted: false,
        }
    }

    /// read one chunk and return its frames; `None` once the stream is over
    /// (either the body ended or the sentinel was decoded).
    ///
    /// an empty `Some` means bytes arrived that held no complete `data:` line.
    pub fn next_chunk(&mut self) -> io::Result<Option<Vec<Frame>>> {
        if self.exhausted || self.decoder.is_done() {
            self.exhausted = true;
            return Ok(None);
        }
        let n = loop {
            match self.reader.read(&mut self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        if n == 0 {
            self.exhausted = true;
            return Ok(self.decoder.finish().map(|frame| vec![frame]));
        }
        Ok(Some(self.decoder.push(&self.buf[..n])))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = io::Result<Vec<Frame>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STREAM: &str = concat!(
        ": keep-alive\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
        "\n",
        "data:{\"choices\":[{\"delta\":{\"content\":\" thére\"}}]}\r\n",
        "event: ping\n",
        "data: \n",
        "data: [DONE]\n",
    );

    fn whole() -> Vec<Frame> {
        FrameDecoder::decode_all(STREAM.as_bytes())
    }

    #[test]
    fn decodes_prefixes_and_skips_other_lines() {
        assert_eq!(
            whole(),
            vec![
                Frame::Data(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#.into()),
                Frame::Data(r#"{"choices":[{"delta":{"content":" thére"}}]}"#.into()),
                Frame::Data(String::new()),
                Frame::Done,
            ]
        );
    }

    #[test]
    fn any_partition_yields_the_same_frames() {
        let bytes = STREAM.as_bytes();
        for size in 1..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(size) {
                frames.extend(decoder.push(chunk));
            }
            frames.extend(decoder.finish());
            assert_eq!(frames, whole(), "chunk size {size}");
        }
    }

    #[test]
    fn split_points_inside_a_line() {
        let bytes = STREAM.as_bytes();
        for cut in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.push(&bytes[..cut]);
            frames.extend(decoder.push(&bytes[cut..]));
            frames.extend(decoder.finish());
            assert_eq!(frames, whole(), "cut at {cut}");
        }
    }

    #[test]
    fn nothing_after_sentinel() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: a\ndata: [DONE]\ndata: b\n");
        assert_eq!(frames, vec![Frame::Data("a".into()), Frame::Done]);
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: c\n").is_empty());
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(b"data: one\ndata: tw"), vec![Frame::Data("one".into())]);
        assert!(decoder.push(b"o").is_empty());
        assert_eq!(decoder.finish(), Some(Frame::Data("two".into())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn trailing_sentinel_without_newline() {
        assert_eq!(
            FrameDecoder::decode_all(b"data: x\ndata:[DONE]"),
            vec![Frame::Data("x".into()), Frame::Done]
        );
    }

    #[test]
    fn reader_pulls_one_chunk_per_call() {
        let mut reader = FrameReader::new(STREAM.as_bytes());
        let mut frames = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            frames.extend(chunk);
        }
        assert_eq!(frames, whole());
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_reports_bytes_without_frames() {
        struct Chunks(Vec<&'static [u8]>);
        impl Read for Chunks {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let chunk = self.0.remove(0);
                buf[..chunk.len()].copy_from_slice(chunk);
                Ok(chunk.len())
            }
        }

        let mut reader = FrameReader::new(Chunks(vec![&b": keep-alive\n\n"[..], &b"data: x\n"[..], &b"data: tail"[..]]));
        assert_eq!(reader.next_chunk().unwrap(), Some(vec![]));
        assert_eq!(reader.next_chunk().unwrap(), Some(vec![Frame::Data("x".into())]));
        assert_eq!(reader.next_chunk().unwrap(), Some(vec![]));
        assert_eq!(reader.next_chunk().unwrap(), Some(vec![Frame::Data("tail".into())]));
        assert_eq!(reader.next_chunk().unwrap(), None);
    }
}
