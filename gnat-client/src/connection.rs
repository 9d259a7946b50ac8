//! Background connection task
//!
//! One task per connection owns the framed stream and all protocol state:
//! it splits the inbound byte stream into frames, classifies them, answers
//! keepalives, performs the INFO/CONNECT handshake, and hands decoded
//! deliveries to the router. The facade talks to it through the outgoing
//! op channel; dropping that channel's sender is the stop signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use gnat_protocol::{
    classify, ClientOp, ConnectInfo, FrameCodec, MsgHeader, ProtocolError, ServerFrame, ServerInfo,
};

use crate::router::Router;

pub(crate) struct ConnectionTask {
    framed: Framed<TcpStream, FrameCodec>,
    outgoing: mpsc::UnboundedReceiver<ClientOp>,
    router: Router,
    info: watch::Sender<Option<ServerInfo>>,
    stopped: Arc<AtomicBool>,
    connect_info: ConnectInfo,
    /// Announcement whose payload frame has not arrived yet
    pending: Option<MsgHeader>,
}

impl ConnectionTask {
    pub(crate) fn new(
        framed: Framed<TcpStream, FrameCodec>,
        outgoing: mpsc::UnboundedReceiver<ClientOp>,
        router: Router,
        info: watch::Sender<Option<ServerInfo>>,
        stopped: Arc<AtomicBool>,
        connect_info: ConnectInfo,
    ) -> Self {
        Self {
            framed,
            outgoing,
            router,
            info,
            stopped,
            connect_info,
            pending: None,
        }
    }

    /// Run until stopped, the stream ends, or a fatal I/O error
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                // Outbound ops from the facade
                op = self.outgoing.recv() => match op {
                    Some(op) => {
                        if let Err(e) = self.framed.send(op).await {
                            self.log_io_failure("send", &e);
                            break;
                        }
                    }
                    None => {
                        // Facade dropped its sender: intentional stop.
                        tracing::debug!("Stop requested, closing connection");
                        break;
                    }
                },

                // Inbound frames from the server
                frame = self.framed.next() => match frame {
                    Some(Ok(frame)) => {
                        if let Err(e) = self.handle_frame(frame).await {
                            self.log_io_failure("reply", &e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        self.log_io_failure("read", &e);
                        break;
                    }
                    None => {
                        if self.stopped.load(Ordering::SeqCst) {
                            tracing::debug!("Stream ended after stop");
                        } else {
                            tracing::info!("Server closed connection");
                        }
                        break;
                    }
                },
            }
        }
        // Dropping self here drops the sink senders; blocked facade calls
        // observe the closed channels instead of hanging.
    }

    /// Classify one frame and act on it
    async fn handle_frame(&mut self, frame: Bytes) -> Result<(), ProtocolError> {
        match classify(&frame, self.pending.is_some()) {
            Ok(ServerFrame::Ping) => {
                tracing::trace!("Received PING, replying PONG");
                self.framed.send(ClientOp::Pong).await?;
            }
            Ok(ServerFrame::Pong) | Ok(ServerFrame::Ok) => {}
            Ok(ServerFrame::Err(text)) => {
                tracing::warn!(server_error = %text, "Protocol warning from server");
            }
            Ok(ServerFrame::Info(info)) => {
                tracing::debug!(server_id = ?info.server_id, "Received INFO, sending CONNECT");
                self.info.send_replace(Some(info));
                self.framed
                    .send(ClientOp::Connect(self.connect_info.clone()))
                    .await?;
            }
            Ok(ServerFrame::Msg(header)) => {
                self.pending = Some(header);
            }
            Ok(ServerFrame::Payload(payload)) => {
                if let Some(header) = self.pending.take() {
                    self.router.dispatch(header, payload);
                }
            }
            Err(e) => {
                // Malformed frames are non-fatal; skip and keep reading.
                tracing::warn!("Ignoring malformed frame: {}", e);
            }
        }
        Ok(())
    }

    /// An I/O failure after an intentional stop is expected; one while the
    /// loop was still supposed to be running is fatal to the connection.
    fn log_io_failure(&self, what: &str, error: &ProtocolError) {
        if self.stopped.load(Ordering::SeqCst) {
            tracing::debug!("Ignoring {} failure after stop: {}", what, error);
        } else {
            tracing::error!("Connection {} failed: {}", what, error);
        }
    }
}
