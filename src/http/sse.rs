//! Server-Sent Events line framing.
//!
//! Chat completion streams are consumed line by line: every event of interest is a
//! single `data: <json>` line, everything else is a keep-alive or a comment.

/// Incremental line splitter over raw body bytes.
///
/// Buffers partial lines across network reads. Splitting happens on bytes, so a
/// multi-byte UTF-8 character cut in half by a read boundary is reassembled before
/// decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any complete lines, without terminators.
    ///
    /// Both `\n` and `\r\n` endings are accepted.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Flush an unterminated trailing line at end of body.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = decode_line(&self.buffer);
        self.buffer.clear();
        Some(line)
    }

    /// Check if there's pending data in the buffer.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Payload of a `data: ` line, or `None` for any other line.
///
/// Chat completion servers always frame events as `data: <payload>`; a line without
/// the space is not treated as an event.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_lines() {
        let mut lines = LineBuffer::new();
        let out = lines.feed(b"data: first\n\ndata: second\n\n");
        assert_eq!(out, vec!["data: first", "", "data: second", ""]);
        assert!(!lines.has_pending());
    }

    #[test]
    fn test_partial_line() {
        let mut lines = LineBuffer::new();

        let out = lines.feed(b"data: partial");
        assert!(out.is_empty());
        assert!(lines.has_pending());

        let out = lines.feed(b" message\n");
        assert_eq!(out, vec!["data: partial message"]);
        assert!(!lines.has_pending());
    }

    #[test]
    fn test_crlf_endings() {
        let mut lines = LineBuffer::new();
        let out = lines.feed(b"data: one\r\n\r\ndata: two\r\n");
        assert_eq!(out, vec!["data: one", "", "data: two"]);
    }

    #[test]
    fn test_split_utf8() {
        let text = "data: Jakarta é\n".as_bytes();
        let cut = text.len() - 2; // inside the two-byte 'é'
        let mut lines = LineBuffer::new();

        assert!(lines.feed(&text[..cut]).is_empty());
        assert_eq!(lines.feed(&text[cut..]), vec!["data: Jakarta é"]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut lines = LineBuffer::new();
        lines.feed(b"data: [DONE]");
        assert_eq!(lines.finish().as_deref(), Some("data: [DONE]"));
        assert!(lines.finish().is_none());
    }

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data: "), Some(""));
        assert_eq!(data_payload("data:[DONE]"), None);
        assert_eq!(data_payload("data:{\"a\":1}"), None);
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(data_payload(""), None);
    }
}
