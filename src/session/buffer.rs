use crate::prompt;

/// Text accumulated from the child's stdout since the last drain.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded output. Returns true if the buffer now ends in a prompt.
    pub fn append(&mut self, chunk: &str) -> bool {
        self.text.push_str(chunk);
        self.ends_in_prompt()
    }

    pub fn peek(&self) -> &str {
        &self.text
    }

    /// Return everything accumulated so far and reset to empty.
    pub fn drain(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    pub fn ends_in_prompt(&self) -> bool {
        prompt::is_prompt(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Incremental UTF-8 decoder for a byte stream delivered in arbitrary chunks.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    if let Some(len) = e.error_len() {
                        out.push(char::REPLACEMENT_CHARACTER);
                        self.pending.drain(..valid + len);
                    } else {
                        // Incomplete sequence at the end; wait for more bytes.
                        self.pending.drain(..valid);
                        break;
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back (called at end of stream).
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_then_peek_is_empty() {
        let mut buf = OutputBuffer::new();
        buf.append("hello\n");
        assert_eq!(buf.drain(), "hello\n");
        assert_eq!(buf.peek(), "");
        assert!(buf.is_empty());
    }

    #[test]
    fn appends_concatenate_in_order() {
        let mut buf = OutputBuffer::new();
        buf.append("Tokens: ");
        buf.append("$0.42 session.\n");
        assert_eq!(buf.peek(), "Tokens: $0.42 session.\n");
    }

    #[test]
    fn append_reports_prompt_boundary() {
        let mut buf = OutputBuffer::new();
        assert!(!buf.append("Some output\narchit"));
        assert!(buf.append("ect> "));
        assert!(buf.ends_in_prompt());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut buf = OutputBuffer::new();
        buf.append("abc");
        assert_eq!(buf.peek(), "abc");
        assert_eq!(buf.peek(), "abc");
    }

    #[test]
    fn decoder_passes_ascii_through() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"plain text"), "plain text");
        assert_eq!(dec.finish(), "");
    }

    #[test]
    fn decoder_joins_split_character() {
        let bytes = "caf\u{e9}".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 1);
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(head), "caf");
        assert_eq!(dec.decode(tail), "\u{e9}");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn decoder_flushes_truncated_tail() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(&[b'x', 0xe2, 0x82]), "x");
        assert_eq!(dec.finish(), "\u{fffd}");
    }
}
