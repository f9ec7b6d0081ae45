use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::generation::GenerationConfig;
use crate::core::message::Message;
use crate::core::pipeline::ChatPipeline;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

/// Best-effort one-line summary of a JSON error payload.
pub(crate) fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

pub struct StreamParams {
    pub pipeline: Arc<ChatPipeline>,
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
    pub session: Option<String>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Runs streamed completions in the background and reports their progress
/// on one channel, tagged with the caller's stream id.
///
/// Every stream ends with exactly one [`StreamMessage::End`], preceded by a
/// [`StreamMessage::Error`] when the request failed. A cancelled stream
/// sends nothing further.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) -> tokio::task::JoinHandle<()> {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                pipeline,
                messages,
                config,
                session,
                cancel_token,
                stream_id,
            } = params;

            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "Stream cancelled");
                }
                _ = async {
                    match pipeline.stream(&messages, &config, session.as_deref()).await {
                        Ok(mut deltas) => {
                            while let Some(delta) = deltas.next().await {
                                if tx_clone.send((StreamMessage::Chunk(delta), stream_id)).is_err() {
                                    debug!(stream_id, "Stream receiver dropped; abandoning reply");
                                    return;
                                }
                            }
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                        Err(err) => {
                            let _ = tx_clone.send((StreamMessage::Error(err.to_string()), stream_id));
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                    }
                } => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{test_client, CannedResponse, StubServer};
    use tokio::sync::oneshot;

    fn params(pipeline: ChatPipeline, stream_id: u64) -> StreamParams {
        StreamParams {
            pipeline: Arc::new(pipeline),
            messages: vec![Message::user("hi")],
            config: GenerationConfig::default(),
            session: None,
            cancel_token: CancellationToken::new(),
            stream_id,
        }
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>) -> Vec<StreamMessage> {
        let mut received = Vec::new();
        while let Some((message, _)) = rx.recv().await {
            let done = message == StreamMessage::End;
            received.push(message);
            if done {
                break;
            }
        }
        received
    }

    #[tokio::test]
    async fn chunks_are_forwarded_then_end() {
        let server = StubServer::start(vec![CannedResponse::event_stream(
            "data: {\"text\":\"Hel\"}\n\ndata: {\"text\":\"lo\"}\n\ndata: [DONE]\n\n",
        )])
        .await;
        let (service, mut rx) = ChatStreamService::new();
        let pipeline = ChatPipeline::new(test_client(), server.url("chat"));

        service.spawn_stream(params(pipeline, 7));
        assert_eq!(
            drain(&mut rx).await,
            vec![
                StreamMessage::Chunk("Hel".into()),
                StreamMessage::Chunk("lo".into()),
                StreamMessage::End
            ]
        );
        server.finish().await;
    }

    #[tokio::test]
    async fn failures_are_reported_before_end() {
        let server = StubServer::start(vec![CannedResponse::text(404, "no route")]).await;
        let (service, mut rx) = ChatStreamService::new();
        let pipeline = ChatPipeline::new(test_client(), server.url("chat"));

        service.spawn_stream(params(pipeline, 1));
        let received = drain(&mut rx).await;
        assert_eq!(received.len(), 2);
        match &received[0] {
            StreamMessage::Error(text) => assert!(text.starts_with("Invalid API endpoint")),
            other => panic!("expected error message, got {:?}", other),
        }
        assert_eq!(received[1], StreamMessage::End);
        server.finish().await;
    }

    #[tokio::test]
    async fn cancelled_stream_sends_nothing() {
        let (service, mut rx) = ChatStreamService::new();
        // nothing listens here; cancellation wins before a connection matters
        let pipeline = ChatPipeline::new(test_client(), "http://127.0.0.1:9/chat");
        let params = params(pipeline, 3);
        params.cancel_token.cancel();

        service.spawn_stream(params).await.unwrap();
        drop(service);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancel_mid_reply_stops_forwarding() {
        let (release_tx, release) = oneshot::channel();
        // the first frame arrives, then the body stays open
        let server = StubServer::start_raw(
            concat!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                "data: {\"text\":\"Hel\"}\n\n",
            )
            .to_string(),
            release,
        )
        .await;
        let (service, mut rx) = ChatStreamService::new();
        let pipeline = ChatPipeline::new(test_client(), server.url("chat"));
        let params = params(pipeline, 5);
        let cancel_token = params.cancel_token.clone();

        let handle = service.spawn_stream(params);
        let first = rx.recv().await;
        assert_eq!(first, Some((StreamMessage::Chunk("Hel".into()), 5)));

        cancel_token.cancel();
        handle.await.unwrap();
        drop(service);
        // no trailing chunk, error or end for a cancelled stream
        assert!(rx.recv().await.is_none());

        let _ = release_tx.send(());
        server.finish().await;
    }

    #[test]
    fn error_summary_prefers_nested_message() {
        let value = serde_json::json!({"error": {"message": "model   overloaded"}});
        let summary = extract_error_summary(&value);
        assert_eq!(summary.as_deref(), Some("model overloaded"));

        let value = serde_json::json!({"error": "plain"});
        assert_eq!(extract_error_summary(&value).as_deref(), Some("plain"));

        let value = serde_json::json!({"status": "failed"});
        assert_eq!(extract_error_summary(&value), None);
    }
}
