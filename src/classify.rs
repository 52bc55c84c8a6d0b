//! Classifies one logical line from the generation stream.
//!
//! The stream interleaves three things on the same channel: structured status
//! events (JSON, or Python-style dict literals with single quotes), loose
//! progress markers (glyph- or keyword-bearing text), and literal generated
//! code. Classification is a cascade with fixed precedence; anything that
//! survives every status heuristic is generated code. A line that merely
//! *looks* structured but fails to parse is treated as code rather than an
//! error — partial output beats strict rejection.

use serde_json::Value;

use crate::phase::{has_completion_keyword, Phase};
use crate::ProgressEvent;

/// Marker emitted by the producer before the first code chunk. Suppressed.
pub const START_SENTINEL: &str = "[STARTING CODE GENERATION]";
/// Marker emitted by the producer after the last frame. Suppressed.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Leading glyphs the producer prefixes unstructured progress lines with.
const INDICATOR_GLYPHS: [char; 4] = ['🔍', '💻', '⚙', '✅'];

/// Case-sensitive substrings that mark an unstructured line as a progress
/// message rather than generated code.
const STATUS_KEYWORDS: [&str; 6] = [
    "Processing",
    "Analyzing",
    "Done",
    "Generating",
    "Converting",
    "Generation",
];

/// Result of classifying one logical line.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Literal generated-code content, to be appended to the output buffer.
    Code(String),
    /// A progress event. `completion` is set when the line doubles as the
    /// stream's completion marker and must make the session terminal.
    Event {
        event: ProgressEvent,
        completion: bool,
    },
    /// Nothing to record (blank line, standalone sentinel).
    Ignored,
    /// A structured frame carried an `error` field. Fatal for the session.
    Fault(String),
}

/// Stateful line classifier.
///
/// The only state is the arrival-order counter used when a structured event
/// does not provide its own `sequence`.
#[derive(Debug, Default)]
pub struct Classifier {
    seen: u64,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next event without a server ordinal would get.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.seen
    }

    /// Classify one logical line. First match wins:
    ///
    /// 1. strip an SSE `data: ` prefix,
    /// 2. `{...}` → strict JSON, then single-quote-lenient parse,
    /// 3. blank → ignored,
    /// 4. standalone sentinel → ignored,
    /// 5. glyph prefix or status keyword → event with inferred phase,
    /// 6. otherwise → generated code.
    pub fn classify(&mut self, line: &str) -> Classified {
        // SSE framing: strip the prefix, keep the payload's own indentation.
        let stripped = line.trim_start();
        let payload: &str = stripped
            .strip_prefix("data: ")
            .or_else(|| stripped.strip_prefix("data:"))
            .unwrap_or(line);
        let text = payload.trim();

        if text.starts_with('{') && text.ends_with('}') {
            if let Some(value) = parse_event_object(text) {
                if let Some(detail) = value.get("error").and_then(Value::as_str) {
                    return Classified::Fault(detail.to_string());
                }
                let phase_label = value.get("phase").and_then(Value::as_str);
                let message = value.get("message").and_then(Value::as_str);
                if let (Some(phase_label), Some(message)) = (phase_label, message) {
                    return self.structured_event(phase_label, message, &value);
                }
            }
            // Parse failed, or parsed to something that is not an event:
            // fall through to the heuristics below.
        }

        if text.is_empty() {
            return Classified::Ignored;
        }

        if text == START_SENTINEL || text == DONE_SENTINEL {
            return Classified::Ignored;
        }

        let glyph_prefixed = text
            .chars()
            .next()
            .map(|c| INDICATOR_GLYPHS.contains(&c))
            .unwrap_or(false);
        if glyph_prefixed || STATUS_KEYWORDS.iter().any(|k| text.contains(k)) {
            return self.marker_event(text);
        }

        Classified::Code(payload.to_string())
    }

    /// Build an event from a parsed structured frame.
    fn structured_event(&mut self, phase_label: &str, message: &str, value: &Value) -> Classified {
        let phase = Phase::from_label(phase_label).unwrap_or_else(|| Phase::infer(message));
        let message = strip_sentinels(&unwrap_nested_message(message));
        let sequence = value
            .get("sequence")
            .and_then(Value::as_u64)
            .unwrap_or(self.seen);
        self.seen += 1;

        let completion = phase == Phase::Finalizing && has_completion_keyword(&message);
        Classified::Event {
            event: ProgressEvent {
                phase,
                message,
                sequence,
            },
            completion,
        }
    }

    /// Build an event from an unstructured progress marker.
    fn marker_event(&mut self, text: &str) -> Classified {
        let message = strip_sentinels(text);
        if message.is_empty() {
            return Classified::Ignored;
        }
        let phase = Phase::infer(&message);
        let sequence = self.seen;
        self.seen += 1;

        // Only the checkmark-prefixed completion phrase terminates the
        // stream from this path; "Done" mid-pipeline chatter must not.
        let completion = message.starts_with('✅') && has_completion_keyword(&message);
        Classified::Event {
            event: ProgressEvent {
                phase,
                message,
                sequence,
            },
            completion,
        }
    }
}

/// Parse a `{...}` payload: strict JSON first, then a lenient pass that
/// treats single quotes as string delimiters (Python dict literals).
fn parse_event_object(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    serde_json::from_str(&relax_quotes(text)).ok()
}

/// Rewrite a single-quoted object literal into parseable JSON.
///
/// Single quotes become string delimiters, bare double quotes inside them get
/// escaped, and pre-escaped double quotes pass through untouched. `\'` (a
/// quote escaped Python-side) collapses to a literal single quote.
fn relax_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => out.push('"'),
            '"' => {
                out.push('\\');
                out.push('"');
            }
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

/// Unwrap events that arrive wrapped in another event's `message` field,
/// taking the innermost display text.
fn unwrap_nested_message(message: &str) -> String {
    let trimmed = message.trim();
    let looks_nested = trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && (trimmed.contains("'phase'") || trimmed.contains("\"phase\"") || trimmed.contains("phase:"));
    if looks_nested {
        if let Some(inner) = parse_event_object(trimmed) {
            if let Some(inner_message) = inner.get("message").and_then(Value::as_str) {
                return unwrap_nested_message(inner_message);
            }
        }
    }
    message.to_string()
}

/// Remove sentinel fragments embedded in a status message.
fn strip_sentinels(message: &str) -> String {
    if !message.contains('[') {
        return message.trim().to_string();
    }
    message
        .replace(START_SENTINEL, "")
        .replace(DONE_SENTINEL, "")
        .trim()
        .to_string()
}
