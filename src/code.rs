//! Accumulates generated source code during a streaming session.

use std::sync::OnceLock;

use regex::Regex;

/// Append-only buffer for the generated markup.
///
/// Frozen once the session reaches its terminal state; appends after freezing
/// are silently dropped, which guards against residual late chunks arriving
/// behind the completion marker.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    buf: String,
    frozen: bool,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one code line, restoring the newline the assembler stripped.
    /// No-op after [`CodeBuffer::freeze`].
    pub fn append(&mut self, line: &str) {
        if self.frozen {
            return;
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    /// The accumulated code so far.
    pub fn snapshot(&self) -> &str {
        &self.buf
    }

    /// Stop accepting appends. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Extract the body of a ```` ```html ```` fence from generated output.
///
/// The model frequently wraps the whole document in a fenced block; when no
/// fence is present the input is returned unchanged.
pub fn extract_markup(text: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```html\s*(.*?)\s*```").expect("fence pattern is valid")
    });
    match fence.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_restores_newlines() {
        let mut buf = CodeBuffer::new();
        buf.append("<div>");
        buf.append("</div>");
        assert_eq!(buf.snapshot(), "<div>\n</div>\n");
    }

    #[test]
    fn append_after_freeze_is_a_noop() {
        let mut buf = CodeBuffer::new();
        buf.append("<div>");
        buf.freeze();
        buf.append("<p>late</p>");
        assert_eq!(buf.snapshot(), "<div>\n");
        assert!(buf.is_frozen());
    }

    #[test]
    fn freeze_is_idempotent() {
        let mut buf = CodeBuffer::new();
        buf.freeze();
        buf.freeze();
        assert!(buf.is_empty());
    }

    #[test]
    fn extracts_fenced_html() {
        let text = "```html\n<!DOCTYPE html>\n<html></html>\n```\n";
        assert_eq!(extract_markup(text), "<!DOCTYPE html>\n<html></html>");
    }

    #[test]
    fn unfenced_text_passes_through() {
        let text = "<html></html>\n";
        assert_eq!(extract_markup(text), text);
    }

    #[test]
    fn fence_with_prose_around_it() {
        let text = "Here you go:\n```html\n<main/>\n```\nEnjoy!";
        assert_eq!(extract_markup(text), "<main/>");
    }
}
