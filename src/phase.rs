//! Generation phases and the derived progress state machine.
//!
//! The service reports progress against four fixed phases. Events may arrive
//! out of order, reference a phase that was never announced, or skip phases
//! entirely; nothing here rejects an event — arrival only changes the derived
//! `active`/`completed`/`reached` display state.

use serde::{Deserialize, Serialize};

use crate::ProgressEvent;

/// The four fixed stages of a generation run, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Analyzing,
    Processing,
    Generating,
    Finalizing,
}

/// All phases in pipeline order.
pub const PHASES: [Phase; 4] = [
    Phase::Analyzing,
    Phase::Processing,
    Phase::Generating,
    Phase::Finalizing,
];

/// Keyword → phase inference table, checked in order, first match wins.
///
/// Matching is case-sensitive on purpose: the upstream producer capitalizes
/// its progress verbs, while generated markup rarely does.
const PHASE_KEYWORDS: [(&str, Phase); 8] = [
    ("Analyzing", Phase::Analyzing),
    ("Processing", Phase::Processing),
    ("Generating", Phase::Generating),
    ("Converting", Phase::Generating),
    ("Completed", Phase::Finalizing),
    ("completed", Phase::Finalizing),
    ("Done", Phase::Finalizing),
    ("Finalizing", Phase::Finalizing),
];

/// Substrings that mark a phase's own work as finished when they appear in
/// one of its event messages.
const COMPLETION_KEYWORDS: [&str; 3] = ["Done", "Complete", "completed"];

impl Phase {
    /// Position in the fixed pipeline order, 0-based.
    pub fn index(self) -> usize {
        match self {
            Phase::Analyzing => 0,
            Phase::Processing => 1,
            Phase::Generating => 2,
            Phase::Finalizing => 3,
        }
    }

    /// Canonical lowercase label as used on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Analyzing => "analyzing",
            Phase::Processing => "processing",
            Phase::Generating => "generating",
            Phase::Finalizing => "finalizing",
        }
    }

    /// Parse a server-provided phase label.
    ///
    /// The upstream producer labels per-section completion events
    /// `"individual sections"`; those belong to the finalizing phase.
    pub fn from_label(label: &str) -> Option<Phase> {
        match label.trim().to_ascii_lowercase().as_str() {
            "analyzing" => Some(Phase::Analyzing),
            "processing" => Some(Phase::Processing),
            "generating" => Some(Phase::Generating),
            "finalizing" | "individual sections" => Some(Phase::Finalizing),
            _ => None,
        }
    }

    /// Infer a phase from free-form message text.
    ///
    /// Fallback classifier for unstructured progress lines; `Processing` when
    /// no keyword matches.
    pub fn infer(message: &str) -> Phase {
        for (keyword, phase) in PHASE_KEYWORDS {
            if message.contains(keyword) {
                return phase;
            }
        }
        Phase::Processing
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Returns true if `message` contains a completion keyword.
pub(crate) fn has_completion_keyword(message: &str) -> bool {
    COMPLETION_KEYWORDS.iter().any(|k| message.contains(k))
}

/// Derived display state for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseStatus {
    /// The phase should be shown at all (its index is at or below the
    /// highest active phase).
    pub reached: bool,
    /// At least one event maps to this phase (or it is bridged, see below).
    pub active: bool,
    /// A later phase became active, or one of this phase's own messages
    /// carried a completion keyword.
    pub completed: bool,
}

/// Tracks which phases have been observed and derives display state.
///
/// `processing` is special-cased: the upstream pipeline sometimes jumps
/// straight from analysis events to generation events without reporting the
/// processing stage it implicitly ran, so it is bridged to active whenever
/// both neighbours were seen directly.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    direct: [bool; 4],
    completion_seen: [bool; 4],
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed event. Never rejects; out-of-order and repeated
    /// events only affect derived state.
    pub fn observe(&mut self, event: &ProgressEvent) {
        let i = event.phase.index();
        self.direct[i] = true;
        if has_completion_keyword(&event.message) {
            self.completion_seen[i] = true;
        }
    }

    fn is_active(&self, phase: Phase) -> bool {
        if self.direct[phase.index()] {
            return true;
        }
        // Bridge the implied-but-unreported processing stage.
        phase == Phase::Processing
            && self.direct[Phase::Analyzing.index()]
            && self.direct[Phase::Generating.index()]
    }

    fn highest_active(&self) -> Option<usize> {
        PHASES
            .iter()
            .rev()
            .find(|p| self.is_active(**p))
            .map(|p| p.index())
    }

    /// Derived display state for one phase.
    pub fn status(&self, phase: Phase) -> PhaseStatus {
        let active = self.is_active(phase);
        let later_active = PHASES
            .iter()
            .any(|p| p.index() > phase.index() && self.is_active(*p));
        let completed = later_active || self.completion_seen[phase.index()];
        let reached = match self.highest_active() {
            Some(top) => phase.index() <= top,
            None => false,
        };
        PhaseStatus {
            reached,
            active,
            completed,
        }
    }

    /// Group events for presentation: reached phases in pipeline order, each
    /// with its events in ascending `sequence` order.
    ///
    /// Events are re-sorted on every call so a late-arriving low-sequence
    /// event still displays in logical order.
    pub fn grouped(&self, events: &[ProgressEvent]) -> Vec<PhaseGroup> {
        let mut sorted: Vec<ProgressEvent> = events.to_vec();
        sorted.sort_by_key(|e| e.sequence);

        PHASES
            .iter()
            .filter(|p| self.status(**p).reached)
            .map(|p| PhaseGroup {
                phase: *p,
                status: self.status(*p),
                events: sorted.iter().filter(|e| e.phase == *p).cloned().collect(),
            })
            .collect()
    }
}

/// One displayable phase with its events, produced by [`PhaseTracker::grouped`].
#[derive(Debug, Clone)]
pub struct PhaseGroup {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub events: Vec<ProgressEvent>,
}
