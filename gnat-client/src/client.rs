//! Client facade
//!
//! [`Client`] is the public surface: it formats outbound operations and
//! hands them to the connection task, and reads from the sinks the task
//! fills. All protocol state lives on the task; the facade only holds the
//! channels, the sid counter, and the stop flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use uuid::Uuid;

use gnat_protocol::{ClientOp, ConnectInfo, FrameCodec, ServerInfo, INBOX_PREFIX, SEPARATOR};
use gnat_utils::{GnatError, Result};

use crate::connection::ConnectionTask;
use crate::delivery::{Delivery, Response};
use crate::router::Router;

/// How long `disconnect` waits for the connection task before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Client configuration: identity and server address
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Client name, sent to the server in the CONNECT handshake
    pub name: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl ClientOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: "0.0.0.0".into(),
            port: 4222,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// A publish/subscribe client over one persistent TCP connection.
///
/// Payloads are raw bytes. Subjects must be non-empty and free of
/// whitespace; payloads must not contain the CRLF frame separator (the
/// wire format delimits payloads by separator, not by the declared byte
/// count). Dropping the client tears the connection down, so the
/// connection never outlives its owning scope.
pub struct Client {
    name: String,
    state: ConnectionState,
    /// `None` after an intentional disconnect; dropping the sender is the
    /// connection task's stop signal
    outgoing: Option<mpsc::UnboundedSender<ClientOp>>,
    messages: mpsc::UnboundedReceiver<Delivery>,
    responses: mpsc::Receiver<Response>,
    server_info: watch::Receiver<Option<ServerInfo>>,
    next_sid: AtomicU64,
    stopped: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Client {
    /// Connect to the server and spawn the background connection task.
    ///
    /// The INFO/CONNECT handshake happens asynchronously on the task;
    /// [`Client::server_info`] reports `Some` once it has completed.
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let addr = format!("{}:{}", options.host, options.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| GnatError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
        let framed = Framed::new(stream, FrameCodec::new());

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        // Strict correlation slot: the task writes, the pending request reads.
        let (responses_tx, responses_rx) = mpsc::channel(1);
        let (info_tx, info_rx) = watch::channel(None);
        let stopped = Arc::new(AtomicBool::new(false));

        let task = ConnectionTask::new(
            framed,
            outgoing_rx,
            Router::new(messages_tx, responses_tx),
            info_tx,
            stopped.clone(),
            ConnectInfo::new(options.name.as_str()),
        );
        let handle = tokio::spawn(task.run());

        tracing::debug!(name = %options.name, addr = %addr, "Connected");

        Ok(Self {
            name: options.name,
            state: ConnectionState::Connected,
            outgoing: Some(outgoing_tx),
            messages: messages_rx,
            responses: responses_rx,
            server_info: info_rx,
            next_sid: AtomicU64::new(0),
            stopped,
            task: Some(handle),
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Client name sent in the handshake
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest server identity from the INFO handshake, if received yet
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.borrow().clone()
    }

    /// Publish `payload` on `subject`
    pub fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        validate_subject(subject)?;
        validate_payload(&payload)?;
        self.send_op(ClientOp::Pub {
            subject: subject.to_string(),
            reply: None,
            payload,
        })
    }

    /// Subscribe to `subject`, returning the subscription id.
    ///
    /// Sids are monotonically increasing and never reused within a
    /// connection.
    pub fn subscribe(&self, subject: &str) -> Result<u64> {
        validate_subject(subject)?;
        let sid = self.next_sid.fetch_add(1, Ordering::Relaxed) + 1;
        self.send_op(ClientOp::Sub {
            subject: subject.to_string(),
            sid,
        })?;
        Ok(sid)
    }

    /// Unsubscribe `sid`, optionally only after `max_msgs` more deliveries
    pub fn unsubscribe(&self, sid: u64, max_msgs: Option<u64>) -> Result<()> {
        self.send_op(ClientOp::Unsub { sid, max_msgs })
    }

    /// Publish `payload` on `subject` with a fresh reply inbox and wait
    /// for the correlated response.
    ///
    /// The inbox subscription unsubscribes itself after one delivery. At
    /// most one request may be outstanding at a time; `&mut self` makes
    /// overlap on a single client unrepresentable. If `timeout` elapses
    /// first the call fails with [`GnatError::RequestTimeout`] naming the
    /// subject; the client stays usable afterwards.
    pub async fn request(
        &mut self,
        subject: &str,
        payload: impl Into<Bytes>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let payload = payload.into();
        validate_subject(subject)?;
        validate_payload(&payload)?;

        // A reply that arrived after an earlier request timed out is
        // stale; discard it rather than hand it to this call.
        while self.responses.try_recv().is_ok() {}

        let inbox = format!("{}{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let sid = self.next_sid.fetch_add(1, Ordering::Relaxed) + 1;

        self.send_op(ClientOp::Sub {
            subject: inbox.clone(),
            sid,
        })?;
        self.send_op(ClientOp::Unsub {
            sid,
            max_msgs: Some(1),
        })?;
        self.send_op(ClientOp::Pub {
            subject: subject.to_string(),
            reply: Some(inbox),
            payload,
        })?;

        match timeout {
            Some(bound) => match tokio::time::timeout(bound, self.responses.recv()).await {
                Ok(Some(response)) => Ok(response),
                Ok(None) => Err(self.closed_error()),
                Err(_) => Err(GnatError::RequestTimeout {
                    subject: subject.to_string(),
                    timeout_ms: bound.as_millis() as u64,
                }),
            },
            None => match self.responses.recv().await {
                Some(response) => Ok(response),
                None => Err(self.closed_error()),
            },
        }
    }

    /// Return the deliveries received since `get` was last called.
    ///
    /// Drains the message sink without blocking. If the sink is empty and
    /// `wait` is given, blocks up to that bound for the first arrival and
    /// drains again; one wait per call, never a repeated loop.
    pub async fn get(&mut self, wait: Option<Duration>) -> Result<Vec<Delivery>> {
        let mut drained = Vec::new();
        let mut closed = self.drain(&mut drained);

        if drained.is_empty() {
            if let Some(bound) = wait {
                if !closed && !bound.is_zero() {
                    match tokio::time::timeout(bound, self.messages.recv()).await {
                        Ok(Some(first)) => {
                            drained.push(first);
                            self.drain(&mut drained);
                        }
                        Ok(None) => closed = true,
                        Err(_) => {}
                    }
                }
            }
        }

        if drained.is_empty() && closed {
            return Err(self.closed_error());
        }
        Ok(drained)
    }

    /// Disconnect and wait for the connection task to finish.
    ///
    /// Idempotent. I/O failures the task hits after this point are
    /// expected and swallowed.
    pub async fn disconnect(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Dropping the sender is the stop signal.
        self.outgoing = None;
        if let Some(mut handle) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        self.state = ConnectionState::Disconnected;
        tracing::debug!(name = %self.name, "Disconnected");
    }

    /// Drain everything currently buffered; returns true when the sink's
    /// sender is gone (the connection task has exited)
    fn drain(&mut self, out: &mut Vec<Delivery>) -> bool {
        loop {
            match self.messages.try_recv() {
                Ok(delivery) => out.push(delivery),
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn send_op(&self, op: ClientOp) -> Result<()> {
        let outgoing = self.outgoing.as_ref().ok_or(GnatError::NotConnected)?;
        outgoing.send(op).map_err(|_| GnatError::ConnectionClosed)
    }

    /// Distinguish an intentional disconnect from the task dying under us
    fn closed_error(&self) -> GnatError {
        if self.outgoing.is_none() {
            GnatError::NotConnected
        } else {
            GnatError::ConnectionClosed
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() {
        return Err(GnatError::BadSubject {
            subject: subject.to_string(),
            reason: "subject is empty".into(),
        });
    }
    if subject.contains(|c: char| c.is_ascii_whitespace()) {
        return Err(GnatError::BadSubject {
            subject: subject.to_string(),
            reason: "subject contains whitespace".into(),
        });
    }
    Ok(())
}

fn validate_payload(payload: &Bytes) -> Result<()> {
    // Payloads are delimited by the separator on the wire, so they must
    // not contain it.
    if payload
        .windows(SEPARATOR.len())
        .any(|window| window == SEPARATOR)
    {
        return Err(GnatError::BadPayload(
            "payload contains the CRLF frame separator".into(),
        ));
    }
    Ok(())
}
