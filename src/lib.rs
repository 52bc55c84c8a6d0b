//! Pagesmith
//!
//! A streaming client for webpage-image → markup generation services. Upload
//! an image of a page design and get back generated HTML/CSS, either as one
//! complete response or as a live stream of progress events and code chunks.
//!
//! The heart of the crate is the incremental stream interpreter: the service
//! interleaves structured status events, loose progress markers, and literal
//! generated code on a single chunked response body, with no guarantee that
//! chunk boundaries respect lines or even UTF-8 code points. The interpreter
//! reassembles lines, classifies each one, tracks the four generation phases,
//! and accumulates the generated source — surfacing all of it incrementally.
//!
//! # Example
//!
//! ```no_run
//! use pagesmith::{ClientConfig, ConvertClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     base_url: "http://127.0.0.1:8000".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut client = ConvertClient::new(config)?;
//! client.on_event(|event| eprintln!("[{}] {}", event.phase, event.message));
//!
//! let image = std::fs::read("page.png")?;
//! let outcome = client.convert_stream(image, "page.png").await?;
//! println!("{}", outcome.markup());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

// Leaf components of the stream interpreter
pub mod classify;
pub mod code;
pub mod lines;
pub mod phase;

// Session state and the HTTP driver on top of it
pub mod client;
pub mod session;

pub use client::ConvertClient;
pub use code::extract_markup;
pub use phase::{Phase, PhaseGroup, PhaseStatus, PhaseTracker};
pub use session::{LineUpdate, StreamSession};

/// Upper bound for the artificial per-line emission delay.
///
/// Pacing exists purely for presentation smoothness; anything beyond tens of
/// milliseconds would turn a cosmetic nicety into visible lag.
pub const MAX_LINE_DELAY_MS: u64 = 50;

/// Configuration for the conversion client
///
/// The defaults point at a locally-running generation service and leave
/// pacing off. `use_heuristic` selects the service's cheaper heuristic
/// description pass instead of its model-based one.
///
/// # Examples
///
/// ```
/// let cfg = pagesmith::ClientConfig::default();
/// assert!(cfg.base_url.contains("127.0.0.1"));
/// assert_eq!(cfg.line_delay_ms, 0);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the generation service
    pub base_url: String,
    /// User agent string to send with requests
    pub user_agent: String,
    /// Timeout for the non-streaming conversion call in milliseconds
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (applies to both endpoints)
    pub connect_timeout_ms: u64,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
    /// Ask the service to use its heuristic description pass
    pub use_heuristic: bool,
    /// Artificial delay between emitted lines in milliseconds, for
    /// presentation smoothness. Clamped to [`MAX_LINE_DELAY_MS`]; paces
    /// emission to callbacks only, never ingestion from the network.
    pub line_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            user_agent: format!("pagesmith/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
            headers: HashMap::new(),
            use_heuristic: false,
            line_delay_ms: 0,
        }
    }
}

/// One progress event recovered from the stream
///
/// `sequence` is a monotonically non-decreasing ordering key; when the
/// service does not provide one it defaults to arrival order. Events are
/// immutable once created and only ever appended to a session's sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Which generation phase this event belongs to
    pub phase: Phase,
    /// Human-readable progress text
    pub message: String,
    /// Ordering key (server-provided or arrival order)
    pub sequence: u64,
}

/// Response of the non-streaming conversion endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Conversion {
    /// Service-provided status message
    pub message: String,
    /// The generated markup (possibly fenced; see [`extract_markup`])
    pub code: String,
    /// Identifier the service assigned to this request
    #[serde(default)]
    pub request_id: Option<String>,
    /// Server-side path the result was saved to, if any
    #[serde(default)]
    pub output_file_path: Option<String>,
}

/// Final state of a completed streaming conversion
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// The raw accumulated code buffer, frozen
    pub code: String,
    /// Every progress event, in arrival order
    pub events: Vec<ProgressEvent>,
    /// Reached phases with their events, in pipeline order
    pub phases: Vec<PhaseGroup>,
}

impl StreamOutcome {
    pub(crate) fn from_session(session: &StreamSession) -> Self {
        Self {
            code: session.code().to_string(),
            phases: session.grouped(),
            events: session.events().to_vec(),
        }
    }

    /// The generated markup with any ```` ```html ```` fence stripped.
    pub fn markup(&self) -> &str {
        extract_markup(&self.code)
    }
}
