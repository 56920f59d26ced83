//! Adapters between an axum WebSocket and the engine's socket seams.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::trace;

use wsgw_core::{CloseCause, ConnectionId, Frame, SocketError, SocketReader, SocketWriter};

/// Read half of a split axum WebSocket.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

/// Write half of a split axum WebSocket.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

/// Splits an upgraded socket into the engine's reader and writer halves.
pub fn split_socket(socket: WebSocket) -> (WsReader, WsWriter) {
    let (sink, stream) = socket.split();
    (WsReader { stream }, WsWriter { sink })
}

#[async_trait]
impl SocketReader for WsReader {
    async fn next_frame(&mut self) -> Result<Frame, SocketError> {
        loop {
            match self.stream.next().await {
                // The peer vanished without a close frame.
                None => return Ok(Frame::Close(CloseCause::Normal)),
                Some(Err(e)) => return Err(SocketError(e.to_string())),
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    return Ok(Frame::Close(close_cause(frame)));
                }
                Some(Ok(Message::Binary(_))) => return Ok(Frame::Unsupported),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    trace!("keepalive frame");
                }
            }
        }
    }
}

#[async_trait]
impl SocketWriter for WsWriter {
    async fn write_text(&mut self, text: &str) -> Result<(), SocketError> {
        self.sink
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| SocketError(e.to_string()))
    }
}

impl WsWriter {
    /// Sends a close frame with the normal-closure code.
    ///
    /// Errors are ignored: at teardown time the peer may already be gone.
    pub async fn close_normal(&mut self) {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        };
        let _ = self.sink.send(Message::Close(Some(frame))).await;
    }
}

fn close_cause(frame: Option<CloseFrame>) -> CloseCause {
    match frame {
        None => CloseCause::Normal,
        Some(frame) => match frame.code {
            close_code::NORMAL => CloseCause::Normal,
            close_code::AWAY => CloseCause::GoingAway,
            code => CloseCause::Abnormal {
                code,
                reason: frame.reason.as_str().to_string(),
            },
        },
    }
}

#[derive(Serialize)]
struct ConnectionAck<'a> {
    #[serde(rename = "connectionId")]
    connection_id: &'a str,
}

/// Sends the one-shot acknowledgement frame carrying the assigned
/// connection identifier.
pub async fn send_ack(writer: &mut WsWriter, id: &ConnectionId) -> Result<(), SocketError> {
    let ack = serde_json::to_string(&ConnectionAck {
        connection_id: id.as_str(),
    })
    .map_err(|e| SocketError(e.to_string()))?;
    writer.write_text(&ack).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_map_to_causes() {
        assert_eq!(close_cause(None), CloseCause::Normal);
        assert_eq!(
            close_cause(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            })),
            CloseCause::Normal
        );
        assert_eq!(
            close_cause(Some(CloseFrame {
                code: close_code::AWAY,
                reason: "".into(),
            })),
            CloseCause::GoingAway
        );
        assert_eq!(
            close_cause(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "nope".into(),
            })),
            CloseCause::Abnormal {
                code: close_code::POLICY,
                reason: "nope".to_string(),
            }
        );
    }

    #[test]
    fn ack_frame_is_a_single_json_object() {
        let ack = serde_json::to_string(&ConnectionAck {
            connection_id: "C1",
        })
        .unwrap();
        assert_eq!(ack, r#"{"connectionId":"C1"}"#);
    }
}
