//! Integration tests driving the client against a local streaming server.

use std::io::Read;
use std::sync::{Arc, Mutex};

use pagesmith::{ClientConfig, ConvertClient, Error, Phase, ProgressEvent};
use tiny_http::{Header, Response, Server};

/// Replays a canned body a few bytes at a time so chunk boundaries land in
/// awkward places (mid-line, mid-code-point).
struct DribbleReader {
    data: &'static [u8],
    pos: usize,
    step: usize,
}

impl Read for DribbleReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Start a server answering exactly one request with a chunked streaming
/// body, delivered `step` bytes at a time. Returns the base URL.
fn start_stream_server(body: &'static str, step: usize) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();

    std::thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            // Drain the multipart upload before answering.
            let mut sink = Vec::new();
            let _ = request.as_reader().read_to_end(&mut sink);

            let reader = DribbleReader {
                data: body.as_bytes(),
                pos: 0,
                step,
            };
            let response = Response::new(
                200.into(),
                vec!["Content-Type: text/event-stream"
                    .parse::<Header>()
                    .unwrap()],
                reader,
                None, // no length => chunked transfer encoding
                None,
            );
            let _ = request.respond(response);
        }
    });

    format!("http://{}", addr)
}

/// Start a server answering one request with a fixed JSON body.
fn start_json_server(status: u16, body: &'static str) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();

    std::thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut sink = Vec::new();
            let _ = request.as_reader().read_to_end(&mut sink);

            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(
                    "Content-Type: application/json"
                        .parse::<Header>()
                        .unwrap(),
                );
            let _ = request.respond(response);
        }
    });

    format!("http://{}", addr)
}

fn client_for(base_url: String) -> ConvertClient {
    let config = ClientConfig {
        base_url,
        ..Default::default()
    };
    ConvertClient::new(config).expect("failed to build client")
}

const FULL_TRANSCRIPT: &str = "data: [STARTING CODE GENERATION]\n\n\
data: {'phase': 'analyzing', 'message': '🔍 Analyzing image structure...', 'sequence': 1}\n\n\
data: {'phase': 'analyzing', 'message': 'Initial analysis done, now proceeding towards processing...', 'sequence': 2}\n\n\
data: {'phase': 'processing', 'message': '⚙️ Processing image elements...', 'sequence': 3}\n\n\
data: {'phase': 'generating', 'message': '💻 Generating HTML code...', 'sequence': 6}\n\n\
data: ```html\n\n\
data: <!DOCTYPE html>\n\n\
data: <html><body>Héllo</body></html>\n\n\
data: ```\n\n\
data: {'phase': 'finalizing', 'message': '✅ Code Generation completed...', 'sequence': 8}\n\n\
data: [DONE]\n\n";

#[tokio::test]
async fn streams_full_generation_transcript() {
    // Three-byte steps guarantee every emoji gets split across chunks.
    let base = start_stream_server(FULL_TRANSCRIPT, 3);
    let mut client = client_for(base);

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_sink = events.clone();
    client.on_event(move |event| events_sink.lock().unwrap().push(event.clone()));

    let snapshots: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let snapshots_sink = snapshots.clone();
    client.on_code(move |code| snapshots_sink.lock().unwrap().push(code.to_string()));

    let terminal_seen = Arc::new(Mutex::new(0u32));
    let terminal_sink = terminal_seen.clone();
    client.on_terminal(move |_| *terminal_sink.lock().unwrap() += 1);

    let outcome = client
        .convert_stream(b"fake image bytes".to_vec(), "page.png")
        .await
        .expect("stream should succeed");

    assert_eq!(
        outcome.code,
        "```html\n<!DOCTYPE html>\n<html><body>Héllo</body></html>\n```\n"
    );
    assert_eq!(
        outcome.markup(),
        "<!DOCTYPE html>\n<html><body>Héllo</body></html>"
    );

    let events = events.lock().unwrap();
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 6, 8]);
    assert_eq!(events.last().unwrap().phase, Phase::Finalizing);

    // All four phases were reached and the last one completed.
    let phases: Vec<Phase> = outcome.phases.iter().map(|g| g.phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Analyzing,
            Phase::Processing,
            Phase::Generating,
            Phase::Finalizing
        ]
    );
    assert!(outcome.phases.iter().all(|g| g.status.completed));

    // Snapshots only ever grow, and the last one is the final buffer.
    let snapshots = snapshots.lock().unwrap();
    assert!(!snapshots.is_empty());
    for pair in snapshots.windows(2) {
        assert!(pair[1].starts_with(pair[0].as_str()));
    }
    assert_eq!(snapshots.last().unwrap(), &outcome.code);

    assert_eq!(*terminal_seen.lock().unwrap(), 1);
}

#[tokio::test]
async fn synthesizes_completion_when_stream_ends_silently() {
    // No completion marker, no [DONE], and an unterminated final line.
    let body = "data: 💻 Generating HTML code...\n\n<div>\n<span>";
    let base = start_stream_server(body, 5);
    let mut client = client_for(base);

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_sink = events.clone();
    client.on_event(move |event| events_sink.lock().unwrap().push(event.clone()));

    let outcome = client
        .convert_stream(b"img".to_vec(), "page.png")
        .await
        .expect("silent close is treated as success");

    // The unterminated tail was flushed as one final code line.
    assert_eq!(outcome.code, "<div>\n<span>\n");

    let events = events.lock().unwrap();
    let last = events.last().expect("synthesized event expected");
    assert_eq!(last.phase, Phase::Finalizing);
    assert!(last.sequence >= events[0].sequence);
}

#[tokio::test]
async fn upstream_error_frame_fails_the_stream() {
    let body = "data: {'phase': 'analyzing', 'message': '🔍 Analyzing image structure...', 'sequence': 1}\n\n\
data: {\"error\": \"Image conversion failed: boom\"}\n\n";
    let base = start_stream_server(body, 9);
    let client = client_for(base);

    let err = client
        .convert_stream(b"img".to_vec(), "page.png")
        .await
        .expect_err("error frame must fail the conversion");

    match err {
        Error::Upstream(detail) => assert!(detail.contains("boom")),
        other => panic!("expected Upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn pacing_preserves_line_order() {
    let base = start_stream_server(FULL_TRANSCRIPT, 4);
    let config = ClientConfig {
        base_url: base,
        line_delay_ms: 2,
        ..Default::default()
    };
    let mut client = ConvertClient::new(config).expect("client");

    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let lines_sink = lines.clone();
    client.on_line(move |line| lines_sink.lock().unwrap().push(line.to_string()));

    let outcome = client
        .convert_stream(b"img".to_vec(), "page.png")
        .await
        .expect("stream should succeed");
    assert!(outcome.markup().contains("Héllo"));

    let got = lines.lock().unwrap();
    // Everything after the completion marker is dropped by the session, so
    // the expected delivery stops there ("data: [DONE]" never surfaces).
    let expected: Vec<&str> = FULL_TRANSCRIPT
        .lines()
        .filter(|l| !l.is_empty())
        .take_while(|l| !l.contains("[DONE]"))
        .collect();
    let got_non_empty: Vec<&str> = got
        .iter()
        .map(String::as_str)
        .filter(|l| !l.trim().is_empty())
        .collect();
    assert_eq!(got_non_empty, expected);
}

#[tokio::test]
async fn convert_returns_complete_conversion() {
    let base = start_json_server(
        200,
        r#"{"message": "successfully generated code for your webpage image.", "code": "```html\n<p>ok</p>\n```", "request_id": "req-42"}"#,
    );
    let client = client_for(base);

    let conversion = client
        .convert(b"img".to_vec(), "page.png")
        .await
        .expect("conversion should succeed");

    assert_eq!(conversion.request_id.as_deref(), Some("req-42"));
    assert_eq!(pagesmith::extract_markup(&conversion.code), "<p>ok</p>");
}

#[tokio::test]
async fn http_error_surfaces_detail() {
    let base = start_json_server(
        500,
        r#"{"detail": "Image conversion failed: no images found", "error": "boom", "traceback": []}"#,
    );
    let client = client_for(base);

    let err = client
        .convert(b"img".to_vec(), "page.png")
        .await
        .expect_err("500 must fail");

    match err {
        Error::Http { status, detail } => {
            assert_eq!(status, 500);
            assert!(detail.contains("no images found"));
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn streaming_http_error_before_body() {
    let base = start_json_server(
        404,
        r#"{"detail": "Image file not found: page.png", "error": "missing", "traceback": []}"#,
    );
    let client = client_for(base);

    let err = client
        .convert_stream(b"img".to_vec(), "page.png")
        .await
        .expect_err("404 must fail before streaming starts");

    assert!(matches!(err, Error::Http { status: 404, .. }));
}
