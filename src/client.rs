//! HTTP client for the generation service: one non-streaming call and the
//! streaming driver built on top of [`StreamSession`].
//!
//! The streaming driver splits work across two halves connected by a
//! channel: a reader task that owns the transport and the session (all
//! mutation happens there, sequentially), and the emission loop that applies
//! the optional pacing delay and invokes the registered callbacks. Pacing
//! therefore never slows ingestion, and dropping the `convert_stream` future
//! tears the whole thing down — the reader notices the closed channel on its
//! next send and releases the connection.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::session::{LineUpdate, StreamSession};
use crate::{ClientConfig, Conversion, ProgressEvent, StreamOutcome, MAX_LINE_DELAY_MS};

type LineHandler = Arc<dyn Fn(&str) + Send + Sync>;
type EventHandler = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
type CodeHandler = Arc<dyn Fn(&str) + Send + Sync>;
type TerminalHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// Error body shape the service uses for non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Client for one generation service.
///
/// Callbacks registered via `on_*` fire during [`ConvertClient::convert_stream`]
/// for every processed line; all of them are optional.
pub struct ConvertClient {
    http: reqwest::Client,
    base: Url,
    config: ClientConfig,
    on_line: Option<LineHandler>,
    on_event: Option<EventHandler>,
    on_code: Option<CodeHandler>,
    on_terminal: Option<TerminalHandler>,
}

impl ConvertClient {
    /// Build a client from configuration. Validates the base URL and any
    /// custom headers up front.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {:?}: {}", config.base_url, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid header value for {name:?}: {e}")))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            config,
            on_line: None,
            on_event: None,
            on_code: None,
            on_terminal: None,
        })
    }

    /// Register a callback for every reconstructed logical line.
    pub fn on_line<F>(&mut self, cb: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_line = Some(Arc::new(cb));
    }

    /// Remove a previously registered on_line callback if any
    pub fn clear_on_line(&mut self) {
        self.on_line = None;
    }

    /// Register a callback for recovered progress events.
    pub fn on_event<F>(&mut self, cb: F)
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(cb));
    }

    /// Remove a previously registered on_event callback if any
    pub fn clear_on_event(&mut self) {
        self.on_event = None;
    }

    /// Register a callback receiving the growing generated-code snapshot
    /// after each appended code line.
    pub fn on_code<F>(&mut self, cb: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_code = Some(Arc::new(cb));
    }

    /// Remove a previously registered on_code callback if any
    pub fn clear_on_code(&mut self) {
        self.on_code = None;
    }

    /// Register a callback fired once when the session becomes terminal.
    pub fn on_terminal<F>(&mut self, cb: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_terminal = Some(Arc::new(cb));
    }

    /// Remove a previously registered on_terminal callback if any
    pub fn clear_on_terminal(&mut self) {
        self.on_terminal = None;
    }

    /// Convert an image in one shot: no events, one complete JSON response.
    pub async fn convert(&self, image: Vec<u8>, filename: &str) -> Result<Conversion> {
        let url = self.endpoint("convert")?;
        let response = self
            .http
            .post(url)
            .multipart(self.conversion_form(image, filename))
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        response
            .json::<Conversion>()
            .await
            .map_err(|e| Error::Decode(format!("conversion response was not valid JSON: {e}")))
    }

    /// Convert an image while watching generation happen live.
    ///
    /// Registered callbacks fire per processed line, in arrival order, with
    /// the configured pacing delay between lines. The returned outcome holds
    /// the frozen code buffer and the full event sequence.
    pub async fn convert_stream(&self, image: Vec<u8>, filename: &str) -> Result<StreamOutcome> {
        let url = self.endpoint("convert/stream")?;
        let response = self
            .http
            .post(url)
            .multipart(self.conversion_form(image, filename))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<LineUpdate>();
        let reader = tokio::spawn(read_loop(response, tx));

        let delay = Duration::from_millis(self.config.line_delay_ms.min(MAX_LINE_DELAY_MS));
        let mut preview = String::new();
        while let Some(update) = rx.recv().await {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.emit(&update, &mut preview);
        }

        let (session, result) = reader
            .await
            .map_err(|e| Error::Other(format!("stream reader task failed: {e}")))?;
        result?;
        Ok(StreamOutcome::from_session(&session))
    }

    fn emit(&self, update: &LineUpdate, preview: &mut String) {
        if let Some(cb) = &self.on_line {
            cb(&update.line);
        }
        if let Some(event) = &update.event {
            if let Some(cb) = &self.on_event {
                cb(event);
            }
        }
        if let Some(code) = &update.code {
            preview.push_str(code);
            preview.push('\n');
            if let Some(cb) = &self.on_code {
                cb(preview);
            }
        }
        if update.terminal {
            if let Some(cb) = &self.on_terminal {
                cb(true);
            }
        }
    }

    fn conversion_form(&self, image: Vec<u8>, filename: &str) -> Form {
        Form::new()
            .part("image", Part::bytes(image).file_name(filename.to_string()))
            .text(
                "use_heuristic",
                if self.config.use_heuristic { "true" } else { "false" },
            )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("base URL cannot be a base: {}", self.base)))?;
            segments.pop_if_empty();
            for part in path.split('/') {
                segments.push(part);
            }
        }
        Ok(url)
    }
}

/// Reader half of the streaming driver: owns the transport and the session.
/// All session mutation is sequential within this loop.
async fn read_loop(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<LineUpdate>,
) -> (StreamSession, Result<()>) {
    let mut body = response.bytes_stream();
    let mut session = StreamSession::new();

    while let Some(next) = body.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(err) => return (session, Err(err.into())),
        };
        match session.ingest(&chunk) {
            Ok(updates) => {
                for update in updates {
                    if tx.send(update).is_err() {
                        // Caller dropped the stream; release the transport.
                        return (session, Ok(()));
                    }
                }
            }
            Err(err) => return (session, Err(err)),
        }
    }

    // Transport closed: flush the tail and terminate the session.
    match session.finish() {
        Ok(updates) => {
            for update in updates {
                let _ = tx.send(update);
            }
            (session, Ok(()))
        }
        Err(err) => (session, Err(err)),
    }
}

async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.detail)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no error detail provided".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    Error::Http { status, detail }
}
