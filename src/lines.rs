//! Reassembles arbitrarily-chunked transport bytes into logical lines.
//!
//! The transport delivers bytes with no respect for line boundaries, and may
//! split a multi-byte UTF-8 sequence across two chunks. The assembler
//! therefore buffers raw bytes, only decoding once a terminating newline has
//! been seen — a newline byte can never fall inside a multi-byte sequence, so
//! every completed line decodes cleanly even when its interior code points
//! arrived split.

/// Turns byte chunks into complete, newline-stripped logical lines.
///
/// The unconsumed tail of the stream (no newline yet) stays buffered across
/// calls until [`LineAssembler::feed`] sees its terminator or
/// [`LineAssembler::flush`] drains it at end of stream.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one transport chunk and return every line it completed.
    ///
    /// Lines are newline-delimited; the `\n` (and a preceding `\r`, if any)
    /// is stripped. Empty lines are passed through — filtering is the
    /// classifier's job.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(rel) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + rel;
            lines.push(decode_line(&self.buf[start..end]));
            start = end + 1;
        }
        if start > 0 {
            self.buf.drain(..start);
        }
        lines
    }

    /// Drain any residual content as one final, unterminated line.
    ///
    /// Returns `None` when nothing is buffered. Call once the transport has
    /// closed; the assembler is reusable (empty) afterwards.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let line = decode_line(&rest);
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }

    /// Number of buffered, not-yet-consumed tail bytes.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = match bytes.last() {
        Some(&b'\r') => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    // Lossy is safe here: complete lines only ever hold whole code points,
    // so replacement characters appear solely for genuinely invalid input.
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_multiple_lines() {
        let mut asm = LineAssembler::new();
        let lines = asm.feed(b"alpha\nbeta\ngamma");
        assert_eq!(lines, vec!["alpha", "beta"]);
        assert_eq!(asm.flush(), Some("gamma".to_string()));
        assert_eq!(asm.flush(), None);
    }

    #[test]
    fn byte_at_a_time_matches_whole_chunk() {
        let input = "data: {'phase': 'analyzing'}\n<div>héllo ✅</div>\ntail";

        let mut whole = LineAssembler::new();
        let mut expected = whole.feed(input.as_bytes());
        expected.extend(whole.flush());

        let mut split = LineAssembler::new();
        let mut got = Vec::new();
        for byte in input.as_bytes() {
            got.extend(split.feed(std::slice::from_ref(byte)));
        }
        got.extend(split.flush());

        assert_eq!(got, expected);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let text = "⚙️ Processing…\n";
        let bytes = text.as_bytes();
        // Split inside the first (3-byte) gear glyph.
        let mut asm = LineAssembler::new();
        assert!(asm.feed(&bytes[..2]).is_empty());
        let lines = asm.feed(&bytes[2..]);
        assert_eq!(lines, vec!["⚙️ Processing…"]);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut asm = LineAssembler::new();
        let lines = asm.feed(b"data: [DONE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]"]);
    }

    #[test]
    fn empty_lines_pass_through() {
        let mut asm = LineAssembler::new();
        let lines = asm.feed(b"a\n\nb\n");
        assert_eq!(lines, vec!["a", "", "b"]);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn flush_on_whitespace_only_residue() {
        let mut asm = LineAssembler::new();
        assert!(asm.feed(b"   ").is_empty());
        // Whitespace is still content; the classifier decides to drop it.
        assert_eq!(asm.flush(), Some("   ".to_string()));
    }
}
