//! The per-session relay loop between one WebSocket and the backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{BoxError, SessionError, SocketError};
use crate::id::ConnectionId;
use crate::session::{CloseCause, Frame, Session};

/// Deadline for a single frame write towards the client.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// Read half of a client socket, as seen by the engine.
#[async_trait]
pub trait SocketReader: Send {
    /// Returns the next frame, blocking until one arrives.
    ///
    /// Close-type conditions (close frames, end of stream) are reported as
    /// [`Frame::Close`]; only transport failures surface as `Err`.
    async fn next_frame(&mut self) -> Result<Frame, SocketError>;
}

/// Write half of a client socket, as seen by the engine.
#[async_trait]
pub trait SocketWriter: Send {
    /// Writes one text frame.
    async fn write_text(&mut self, text: &str) -> Result<(), SocketError>;
}

/// Type-erased async callback relaying one inbound text frame to the backend.
///
/// The connection identifier and backend endpoint are captured when the
/// closure is constructed by the accept flow; the engine only supplies the
/// frame payload.
pub type OnClientMessage = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> + Send + Sync,
>;

/// Drives one session until it terminates.
///
/// Spawns the reader task, then loops over the session's channels: outbound
/// payloads are written to the client under [`WRITE_DEADLINE`], inbound
/// frames are handed to `on_client_message`, and the close channel or a
/// cancelled token ends the loop. Relay failures towards the backend are
/// echoed to the client and are not terminal; every other failure is.
///
/// On return the caller owns the teardown: close the socket, notify the
/// backend of the disconnect, and drop the registry entry.
pub async fn process_messages<R, W>(
    cancel: CancellationToken,
    session: Session,
    reader: R,
    writer: &mut W,
    on_client_message: OnClientMessage,
) -> Result<(), SessionError>
where
    R: SocketReader + 'static,
    W: SocketWriter,
{
    let Session {
        id,
        inbound_tx,
        mut inbound_rx,
        outbound_tx,
        mut outbound_rx,
        close_tx,
        mut close_rx,
        ..
    } = session;

    let reader_task = tokio::spawn(read_loop(id.clone(), reader, inbound_tx, close_tx));

    let mut inbound_open = true;
    let result = loop {
        // Biased: pending writes towards the client drain ahead of close
        // and cancellation, so an enqueued frame is either written within
        // the deadline or the session ends with a write error.
        tokio::select! {
            biased;

            outbound = outbound_rx.recv() => {
                // A sender is held on this task, so the channel cannot close.
                let Some(payload) = outbound else { continue };
                debug!(connection_id = %id, len = payload.len(), "relaying message to client");
                match timeout(WRITE_DEADLINE, writer.write_text(&payload)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(connection_id = %id, error = %e, "failed to relay message to client");
                        break Err(SessionError::Write(e.to_string()));
                    }
                    Err(_) => {
                        error!(connection_id = %id, "write to client timed out");
                        break Err(SessionError::WriteTimeout(WRITE_DEADLINE));
                    }
                }
            }
            inbound = inbound_rx.recv(), if inbound_open => {
                let Some(text) = inbound else {
                    inbound_open = false;
                    continue;
                };
                debug!(connection_id = %id, len = text.len(), "relaying message to backend");
                if let Err(e) = on_client_message(text).await {
                    warn!(connection_id = %id, error = %e, "backend rejected client message");
                    // Let the client observe the failure; shed the echo if
                    // the outbound buffer is full, a blocking send here
                    // would deadlock against this very loop.
                    let _ = outbound_tx.try_send(e.to_string());
                }
            }
            close = close_rx.recv() => {
                let cause = close.unwrap_or_else(|| {
                    CloseCause::ReadError("reader stopped without a close cause".to_string())
                });
                break terminal_result(&id, cause);
            }
            _ = cancel.cancelled() => {
                debug!(connection_id = %id, "session context cancelled");
                break Err(SessionError::Cancelled);
            }
        }
    };

    // The caller closes the socket, which unblocks a read pending inside
    // the reader task; aborting covers readers that never wake up.
    reader_task.abort();
    result
}

fn terminal_result(id: &ConnectionId, cause: CloseCause) -> Result<(), SessionError> {
    match cause {
        CloseCause::Normal => {
            debug!(connection_id = %id, "socket closed normally");
            Ok(())
        }
        CloseCause::GoingAway => {
            debug!(connection_id = %id, "socket closed: peer going away");
            Ok(())
        }
        CloseCause::Abnormal { code, reason } => {
            error!(connection_id = %id, code, reason = %reason, "socket closed abnormally");
            Err(SessionError::AbnormalClose { code, reason })
        }
        CloseCause::ProtocolError => {
            error!(connection_id = %id, "client sent an unsupported frame type");
            Err(SessionError::Protocol)
        }
        CloseCause::ReadError(e) => {
            error!(connection_id = %id, error = %e, "read error, closing");
            Err(SessionError::Read(e))
        }
    }
}

/// Reader task: pulls frames off the socket until it closes.
///
/// Text frames go to the inbound channel; everything else becomes a close
/// cause and ends the task. The engine stops consuming inbound when it
/// terminates, which ends a blocked forward here as well.
async fn read_loop<R: SocketReader>(
    id: ConnectionId,
    mut reader: R,
    inbound_tx: mpsc::Sender<String>,
    close_tx: mpsc::Sender<CloseCause>,
) {
    loop {
        match reader.next_frame().await {
            Ok(Frame::Text(text)) => {
                if inbound_tx.send(text).await.is_err() {
                    // Engine already terminated.
                    return;
                }
            }
            Ok(Frame::Close(cause)) => {
                debug!(connection_id = %id, ?cause, "socket closing");
                let _ = close_tx.send(cause).await;
                return;
            }
            Ok(Frame::Unsupported) => {
                warn!(connection_id = %id, "unsupported frame type received");
                let _ = close_tx.send(CloseCause::ProtocolError).await;
                return;
            }
            Err(e) => {
                error!(connection_id = %id, error = %e, "read failed");
                let _ = close_tx.send(CloseCause::ReadError(e.to_string())).await;
                return;
            }
        }
    }
}
