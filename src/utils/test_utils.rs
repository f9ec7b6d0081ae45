//! In-process HTTP stub used by transport and share tests.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct CannedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl CannedResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }

    pub fn event_stream(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// Answers one connection per canned response, in order, then stops.
pub struct StubServer {
    pub base_url: String,
    task: JoinHandle<Result<Vec<CapturedRequest>, String>>,
}

impl StubServer {
    pub async fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");

        let task = tokio::spawn(async move {
            let mut captured = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
                captured.push(read_http_request(&mut stream).await?);
                write_http_response(&mut stream, &response).await?;
            }
            Ok(captured)
        });

        Self {
            base_url: format!("http://{addr}"),
            task,
        }
    }

    /// Answers a single connection with `raw` as written, then keeps the
    /// socket open until `release` fires or its sender is dropped.
    pub async fn start_raw(raw: String, release: oneshot::Receiver<()>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
            let captured = read_http_request(&mut stream).await?;
            stream
                .write_all(raw.as_bytes())
                .await
                .map_err(|err| err.to_string())?;
            let _ = release.await;
            // the client may already have hung up
            let _ = stream.shutdown().await;
            Ok(vec![captured])
        });

        Self {
            base_url: format!("http://{addr}"),
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        crate::utils::url::construct_api_url(&self.base_url, path)
    }

    pub async fn finish(self) -> Vec<CapturedRequest> {
        self.task
            .await
            .expect("stub server task should join")
            .expect("stub server should succeed")
    }
}

pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}

async fn write_http_response(
    stream: &mut TcpStream,
    response: &CannedResponse,
) -> Result<(), String> {
    let reason = reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown");
    let raw = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        response.status,
        reason,
        response.content_type,
        response.body.len(),
        response.body
    );
    stream
        .write_all(raw.as_bytes())
        .await
        .map_err(|err| err.to_string())?;
    stream.shutdown().await.map_err(|err| err.to_string())
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or_else(|| "Missing header terminator".to_string())?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
