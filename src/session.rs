//! One conversion's worth of streaming state.
//!
//! A [`StreamSession`] binds the line assembler, the event sequence, the code
//! buffer, and the terminal flag for exactly one conversion request. Sessions
//! are never reused: each upload gets a fresh one, and once terminal nothing
//! in it mutates again.

use crate::classify::{Classified, Classifier};
use crate::code::CodeBuffer;
use crate::error::{Error, Result};
use crate::lines::LineAssembler;
use crate::phase::{Phase, PhaseGroup, PhaseTracker};
use crate::ProgressEvent;

/// Message used when the transport closed without an explicit completion
/// marker and the driver synthesizes one.
pub const SYNTHESIZED_COMPLETION: &str = "Generation completed.";

/// What one processed line contributed, for incremental emission to a caller.
#[derive(Debug, Clone)]
pub struct LineUpdate {
    /// The logical line as reconstructed from the transport.
    pub line: String,
    /// Progress event recorded for this line, if any.
    pub event: Option<ProgressEvent>,
    /// Code content appended for this line, if any (newline not included).
    pub code: Option<String>,
    /// Whether this line made the session terminal.
    pub terminal: bool,
}

/// Aggregate root for one streaming conversion.
#[derive(Debug, Default)]
pub struct StreamSession {
    assembler: LineAssembler,
    classifier: Classifier,
    tracker: PhaseTracker,
    events: Vec<ProgressEvent>,
    code: CodeBuffer,
    terminal: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning an update per completed line.
    ///
    /// Once the session is terminal this is a no-op — residual late chunks
    /// are dropped without touching the buffer, events, or code.
    pub fn ingest(&mut self, chunk: &[u8]) -> Result<Vec<LineUpdate>> {
        if self.terminal {
            return Ok(Vec::new());
        }
        let mut updates = Vec::new();
        for line in self.assembler.feed(chunk) {
            if self.terminal {
                break;
            }
            updates.push(self.apply_line(line)?);
        }
        Ok(updates)
    }

    /// Handle transport close: flush the residual tail as a final line, and
    /// if no completion marker ever arrived, synthesize one so the session
    /// still terminates cleanly.
    pub fn finish(&mut self) -> Result<Vec<LineUpdate>> {
        if self.terminal {
            return Ok(Vec::new());
        }
        let mut updates = Vec::new();
        if let Some(last) = self.assembler.flush() {
            updates.push(self.apply_line(last)?);
        }
        if !self.terminal {
            log::warn!("stream closed without a completion marker; treating as complete");
            let event = ProgressEvent {
                phase: Phase::Finalizing,
                message: SYNTHESIZED_COMPLETION.to_string(),
                sequence: self.next_synthetic_sequence(),
            };
            self.tracker.observe(&event);
            self.events.push(event.clone());
            self.set_terminal();
            updates.push(LineUpdate {
                line: event.message.clone(),
                event: Some(event),
                code: None,
                terminal: true,
            });
        }
        Ok(updates)
    }

    fn apply_line(&mut self, line: String) -> Result<LineUpdate> {
        match self.classifier.classify(&line) {
            Classified::Fault(detail) => {
                // Upstream reported failure: terminal, partial code untrusted.
                self.set_terminal();
                Err(Error::Upstream(detail))
            }
            Classified::Event { event, completion } => {
                self.tracker.observe(&event);
                self.events.push(event.clone());
                if completion {
                    self.set_terminal();
                }
                Ok(LineUpdate {
                    line,
                    event: Some(event),
                    code: None,
                    terminal: self.terminal,
                })
            }
            Classified::Code(text) => {
                self.code.append(&text);
                Ok(LineUpdate {
                    line,
                    event: None,
                    code: Some(text),
                    terminal: false,
                })
            }
            Classified::Ignored => Ok(LineUpdate {
                line,
                event: None,
                code: None,
                terminal: false,
            }),
        }
    }

    fn set_terminal(&mut self) {
        self.terminal = true;
        self.code.freeze();
    }

    /// Sorts after every event seen so far, server-numbered or not.
    fn next_synthetic_sequence(&self) -> u64 {
        self.events
            .iter()
            .map(|e| e.sequence + 1)
            .max()
            .unwrap_or_else(|| self.classifier.next_sequence())
    }

    /// The generated code accumulated so far (frozen once terminal).
    pub fn code(&self) -> &str {
        self.code.snapshot()
    }

    /// Every recorded event, in arrival order.
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    /// Reached phases with their events, ready for display.
    pub fn grouped(&self) -> Vec<PhaseGroup> {
        self.tracker.grouped(&self.events)
    }

    pub fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}
