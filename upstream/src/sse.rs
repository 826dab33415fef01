//! Incremental text/event-stream frame parser.
//!
//! Push-based: callers feed raw byte chunks as they arrive and receive the
//! frames completed by each chunk. The byte buffer is split only at `\n`
//! (0x0A), which can never occur inside a multi-byte UTF-8 sequence, so
//! characters split across chunk boundaries reassemble correctly before
//! decoding. The parser is finite and restartable only by reconstruction;
//! it imposes no deadline of its own.

/// One decoded frame: an event name and its (possibly multi-line) data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

const DEFAULT_EVENT: &str = "message";

/// Stateful frame parser over byte chunks.
#[derive(Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event_name: Option<String>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every frame the chunk completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            self.process_line(line.trim_end(), &mut out);
        }
        out
    }

    /// End of stream: flush a non-empty pending data buffer as a final
    /// frame even without a trailing blank line. Bytes of an incomplete
    /// final line are discarded.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.take_event())
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                out.push(self.take_event());
            }
            self.event_name = None;
            self.data.clear();
            return;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event_name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data.push_str(rest.trim_start());
            self.data.push('\n');
        }
        // id:, retry: and comment lines are irrelevant to this protocol.
    }

    fn take_event(&mut self) -> SseEvent {
        let event = self
            .event_name
            .take()
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());
        let data = self.data.trim_end().to_string();
        self.data.clear();
        SseEvent { event, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SseParser, input: &str) -> Vec<SseEvent> {
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    #[test]
    fn single_frame_roundtrip() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "event: result\ndata: {\"ok\":true}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "result".into(),
                data: "{\"ok\":true}".into()
            }]
        );
    }

    #[test]
    fn multi_line_data_rejoins_with_newlines() {
        // Two data lines become one frame whose data is the exact
        // multi-line string.
        let mut parser = SseParser::new();
        let events = feed_all(
            &mut parser,
            "event: result\ndata: {\"a\":1}\ndata: {\"b\":2}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "result");
        assert_eq!(events[0].data, "{\"a\":1}\n{\"b\":2}");
    }

    #[test]
    fn event_name_defaults_and_resets_between_frames() {
        let mut parser = SseParser::new();
        let events = feed_all(
            &mut parser,
            "data: first\n\nevent: pending\ndata: second\n\ndata: third\n\n",
        );
        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, ["message", "pending", "message"]);
    }

    #[test]
    fn frames_split_across_arbitrary_chunks() {
        let input = "event: processing\ndata: step one\n\nevent: result\ndata: done\n\n";
        for chunk_len in 1..input.len() {
            let mut parser = SseParser::new();
            let mut events = Vec::new();
            for chunk in input.as_bytes().chunks(chunk_len) {
                events.extend(parser.feed(chunk));
            }
            events.extend(parser.finish());
            assert_eq!(events.len(), 2, "chunk_len {chunk_len}");
            assert_eq!(events[0].event, "processing");
            assert_eq!(events[1].data, "done");
        }
    }

    #[test]
    fn multibyte_utf8_split_across_chunk_boundary() {
        // "é" is 0xC3 0xA9; split between the two bytes.
        let bytes = "data: caf\u{e9} au lait\n\n".as_bytes().to_vec();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::new();
        let mut events = parser.feed(&bytes[..split]);
        assert!(events.is_empty());
        events.extend(parser.feed(&bytes[split..]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "caf\u{e9} au lait");
    }

    #[test]
    fn end_of_stream_flushes_pending_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: result\ndata: unterminated\n");
        assert!(events.is_empty());
        let last = parser.finish().unwrap();
        assert_eq!(last.event, "result");
        assert_eq!(last.data, "unterminated");
        // A second finish yields nothing.
        assert!(parser.finish().is_none());
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "event: pending\n\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "event: result\r\ndata: ok\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "result");
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn incomplete_trailing_line_is_discarded() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: full\n\ndata: partial-without-newline");
        assert_eq!(events.len(), 1);
        assert!(parser.finish().is_none());
    }
}
