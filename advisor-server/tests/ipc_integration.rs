//! IPC integration tests: length-prefixed MessagePack over a Unix socket.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::ipc::{AdvisorRequest, AdvisorResponse};
use advisor_core::llm::{ChatModel, LlmError};
use advisor_core::models::{ChatMessage, ChatTurn};
use advisor_core::{AdvisorConfig, Assistant, CategoryRouter, WordCounter};
use advisor_server::server::{handle_frame, le_codec, run_unix_server};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;

struct FixedModel;

#[async_trait]
impl ChatModel for FixedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(format!("{} messages received", messages.len()))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn make_assistant(dir: &tempfile::TempDir) -> Arc<Assistant> {
    let mut config = AdvisorConfig::default();
    config.assets.root = dir.path().join("assets").display().to_string();
    config.execution.scratch_dir = dir.path().join("scratch").display().to_string();
    Arc::new(Assistant::new(
        &config,
        Arc::new(FixedModel),
        CategoryRouter::heuristic(),
        Arc::new(WordCounter),
    ))
}

async fn roundtrip(
    framed: &mut Framed<UnixStream, tokio_util::codec::LengthDelimitedCodec>,
    request: &AdvisorRequest,
) -> AdvisorResponse {
    let bytes = rmp_serde::to_vec_named(request).unwrap();
    framed.send(Bytes::from(bytes)).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    rmp_serde::from_slice(&frame).unwrap()
}

#[tokio::test]
async fn test_socket_ping_and_ask() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("advisor.sock");
    let socket_str = socket.display().to_string();
    let assistant = make_assistant(&dir);

    let (tx, _rx) = broadcast::channel(1);
    let server = tokio::spawn({
        let shutdown = tx.subscribe();
        let socket_str = socket_str.clone();
        async move { run_unix_server(&socket_str, assistant, shutdown).await }
    });

    // wait for bind
    let mut stream = None;
    for _ in 0..50 {
        if let Ok(s) = UnixStream::connect(&socket).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut framed = Framed::new(stream.expect("server did not bind"), le_codec());

    let pong = roundtrip(&mut framed, &AdvisorRequest::Ping).await;
    assert_eq!(pong.status, "ok");
    assert_eq!(pong.data.unwrap()["pong"], true);

    let ask = AdvisorRequest::Ask {
        question: "How do I hire my first employee for the team?".to_string(),
        history: vec![ChatTurn::user("I own a cafe"), ChatTurn::assistant("Nice")],
    };
    let resp = roundtrip(&mut framed, &ask).await;
    assert_eq!(resp.status, "ok", "{:?}", resp.error);
    let data = resp.data.unwrap();
    assert_eq!(data["success"], true);
    // system + 2 history turns + question
    assert_eq!(data["text"], "4 messages received");
    assert_eq!(data["conversation"]["user_messages"], 1);

    let _ = tx.send(());
    server.await.unwrap().unwrap();
    assert!(!socket.exists(), "socket file removed on shutdown");
}

#[tokio::test]
async fn test_handle_frame_garbage_yields_error_response() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = make_assistant(&dir);

    let bytes = handle_frame(b"\xc1\xc1not msgpack", &assistant).await.unwrap();
    let resp: AdvisorResponse = rmp_serde::from_slice(&bytes).unwrap();
    assert_eq!(resp.status, "error");
    assert!(resp.error.unwrap().contains("Deserialization error"));
}

#[tokio::test]
async fn test_handle_frame_empty_question_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = make_assistant(&dir);

    let req = AdvisorRequest::Ask {
        question: "   ".to_string(),
        history: Vec::new(),
    };
    let bytes = handle_frame(&rmp_serde::to_vec_named(&req).unwrap(), &assistant)
        .await
        .unwrap();
    let resp: AdvisorResponse = rmp_serde::from_slice(&bytes).unwrap();
    assert_eq!(resp.status, "error");
    assert_eq!(resp.error.as_deref(), Some("Question must not be empty."));
}

#[tokio::test]
async fn test_handle_frame_health() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = make_assistant(&dir);

    let bytes = handle_frame(
        &rmp_serde::to_vec_named(&AdvisorRequest::Health).unwrap(),
        &assistant,
    )
    .await
    .unwrap();
    let resp: AdvisorResponse = rmp_serde::from_slice(&bytes).unwrap();
    assert_eq!(resp.status, "ok");
    assert_eq!(resp.data.unwrap()["components"]["chat_model"], "fixed");
}
