//! Unix socket IPC: 4-byte little-endian length prefix + MessagePack payload.

use crate::router;
use advisor_core::ipc::{AdvisorRequest, AdvisorResponse};
use advisor_core::Assistant;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub fn le_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

pub async fn run_unix_server(
    socket_path: &str,
    assistant: Arc<Assistant>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                tokio::spawn(serve_connection(stream, Arc::clone(&assistant)));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

async fn serve_connection(stream: UnixStream, assistant: Arc<Assistant>) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let resp_bytes = match handle_frame(&bytes_mut, &assistant).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                break;
            }
        };

        if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
            tracing::error!("Failed to send response: {}", e);
            break;
        }
    }
}

/// Decode one request frame, dispatch it and encode the response.
///
/// Undecodable frames get an error response rather than closing the connection.
pub async fn handle_frame(
    frame: &[u8],
    assistant: &Assistant,
) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    let response = match rmp_serde::from_slice::<AdvisorRequest>(frame) {
        Ok(request) => router::handle_request(request, assistant).await,
        Err(e) => AdvisorResponse::err(format!("Deserialization error: {}", e)),
    };
    rmp_serde::to_vec_named(&response)
}
