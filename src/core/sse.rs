//! Incremental decoder for the Server-Sent-Events wire format.
//!
//! The upstream worker's body arrives as arbitrary byte chunks; boundaries
//! can fall mid-line or mid-UTF-8-sequence. Bytes are buffered until a full
//! line is available, so no chunk boundary can corrupt a frame.

/// One decoded `event:`/`data:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk, returning every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line_bytes = std::mem::replace(&mut self.buf, rest);
            line_bytes.pop(); // the \n
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            let line = String::from_utf8_lossy(&line_bytes).into_owned();
            self.handle_line(&line, &mut frames);
        }
        frames
    }

    /// Flush at EOF. Upstream services are not guaranteed to terminate
    /// framing cleanly, so a pending unterminated event is still delivered.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buf.is_empty() {
            let mut line_bytes = std::mem::take(&mut self.buf);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            let line = String::from_utf8_lossy(&line_bytes).into_owned();
            let mut frames = Vec::new();
            self.handle_line(&line, &mut frames);
            if let Some(frame) = frames.pop() {
                return Some(frame);
            }
        }
        self.take_pending()
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<SseFrame>) {
        if line.is_empty() {
            if let Some(frame) = self.take_pending() {
                out.push(frame);
            }
        } else if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(strip_leading_space(value).to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            // Last data: line wins; the worker does not emit multi-line data.
            self.data = Some(strip_leading_space(value).to_string());
        }
        // Anything else (ids, comments) is ignored.
    }

    fn take_pending(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_none() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = self.data.take().unwrap_or_default();
        Some(SseFrame { event, data })
    }
}

// The wire format strips exactly one space after the colon.
fn strip_leading_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8], chunk_size: usize) -> Vec<SseFrame> {
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for chunk in input.chunks(chunk_size.max(1)) {
            frames.extend(decoder.feed(chunk));
        }
        frames.extend(decoder.finish());
        frames
    }

    #[test]
    fn two_events_in_one_chunk() {
        let input = b"event: status\ndata: {\"s\":1}\n\nevent: result\ndata: done\n\n";
        let frames = decode_all(input, input.len());
        assert_eq!(
            frames,
            vec![
                SseFrame::new("status", "{\"s\":1}"),
                SseFrame::new("result", "done"),
            ]
        );
    }

    #[test]
    fn ordering_survives_every_chunk_size() {
        let mut input = Vec::new();
        for i in 0..20 {
            input.extend_from_slice(
                format!("event: assistant_message\ndata: {{\"n\":{i}}}\n\n").as_bytes(),
            );
        }
        for chunk_size in [1, 2, 3, 5, 7, 16, 64, input.len()] {
            let frames = decode_all(&input, chunk_size);
            assert_eq!(frames.len(), 20, "chunk_size={chunk_size}");
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(frame.data, format!("{{\"n\":{i}}}"), "chunk_size={chunk_size}");
            }
        }
    }

    #[test]
    fn multibyte_utf8_split_across_chunks() {
        // é is two bytes; byte-sized chunks split it.
        let input = "event: assistant_message\ndata: héllo wörld\n\n".as_bytes();
        let frames = decode_all(input, 1);
        assert_eq!(frames, vec![SseFrame::new("assistant_message", "héllo wörld")]);
    }

    #[test]
    fn last_data_line_wins() {
        let input = b"event: status\ndata: first\ndata: second\n\n";
        let frames = decode_all(input, input.len());
        assert_eq!(frames, vec![SseFrame::new("status", "second")]);
    }

    #[test]
    fn unterminated_final_event_is_flushed() {
        let input = b"event: result\ndata: {\"ok\":true}\n\nevent: trailer\ndata: end";
        let frames = decode_all(input, input.len());
        assert_eq!(
            frames,
            vec![
                SseFrame::new("result", "{\"ok\":true}"),
                SseFrame::new("trailer", "end"),
            ]
        );
    }

    #[test]
    fn crlf_lines_are_tolerated() {
        let input = b"event: status\r\ndata: ok\r\n\r\n";
        let frames = decode_all(input, input.len());
        assert_eq!(frames, vec![SseFrame::new("status", "ok")]);
    }

    #[test]
    fn missing_event_name_defaults_to_message() {
        let input = b"data: bare\n\n";
        let frames = decode_all(input, input.len());
        assert_eq!(frames, vec![SseFrame::new("message", "bare")]);
    }

    #[test]
    fn comments_and_ids_are_ignored() {
        let input = b": keep-alive\nid: 7\nevent: status\ndata: ok\n\n";
        let frames = decode_all(input, input.len());
        assert_eq!(frames, vec![SseFrame::new("status", "ok")]);
    }

    #[test]
    fn blank_stream_produces_nothing() {
        assert!(decode_all(b"\n\n\n", 1).is_empty());
    }
}
