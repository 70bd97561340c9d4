//! IPC Processor
//!
//! Multiplexes one duplex stream to the agent into concurrent request/reply
//! exchanges plus a stream of unsolicited inbound commands.
//!
//! ## Lock Usage
//!
//! - `pending` (`parking_lot::Mutex`): insert/remove of reply slots only,
//!   never held across `.await`.
//! - `handlers` (`parking_lot::RwLock`): read once per inbound frame to clone
//!   the handler out, written only by [`Processor::set_handler`].
//! - `writer` (`tokio::sync::Mutex`): serializes whole frames onto the stream
//!   so concurrent senders never interleave bytes. It is the only lock held
//!   across I/O.
//!
//! ## Read loop
//!
//! A single task decodes frames in arrival order. Replies are handed to the
//! waiting caller through a oneshot slot; everything else goes to the handler
//! registered for its command. Handlers run inline and must not block: they
//! are expected to decode and enqueue, nothing more. Replies to inbound
//! requests are written from a spawned task so a slow stream never stalls
//! decoding.

#![allow(clippy::disallowed_types)]

use crate::command::Command;
use crate::config::IpcConfig;
use crate::error::{IpcError, IpcResult};
use crate::frame::{ErrorPayload, Frame, NO_REPLY};
use crate::stats::{ProcessorCounters, ProcessorStats};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked for inbound frames of one command.
///
/// Receives the raw payload. The return value is sent back as a `response`
/// frame when the inbound frame carried a correlation token, and ignored
/// otherwise.
pub type Handler = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

type ReplySlot = oneshot::Sender<IpcResult<Value>>;

/// Removes a pending entry when the waiting request goes away, whichever way
/// it ends (reply, deadline, cancellation, or the future being dropped).
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<u64, ReplySlot>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Request/response and event multiplexer over a single agent stream
pub struct Processor {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Mutex<HashMap<u64, ReplySlot>>,
    handlers: RwLock<HashMap<Command, Handler>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    config: IpcConfig,
    counters: ProcessorCounters,
}

impl Processor {
    /// Create a processor writing frames to `writer`.
    ///
    /// Nothing is read until [`Processor::spawn`] or [`Processor::run`] is
    /// given the other half of the stream.
    pub fn new<W>(writer: W, config: IpcConfig) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
            counters: ProcessorCounters::default(),
        })
    }

    /// Start the read loop on a background task
    pub fn spawn<R>(self: &Arc<Self>, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(Arc::clone(self).run(reader))
    }

    /// Run the read loop until the stream ends.
    ///
    /// On exit every outstanding request fails with [`IpcError::Closed`] and
    /// later requests fail immediately.
    pub async fn run<R>(self: Arc<Self>, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        info!("IPC read loop started");
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => self.handle_line(&line),
                Err(err) => {
                    warn!(error = %err, "IPC stream read failed");
                    break;
                }
            }
        }
        self.fail_pending();
        info!("IPC read loop stopped");
    }

    /// Register the handler for an inbound command. The last registration
    /// for a command wins.
    pub fn set_handler<F>(&self, command: Command, handler: F)
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        if command.is_reply() {
            warn!(%command, "Refusing to register a handler for a reply command");
            return;
        }
        if self
            .handlers
            .write()
            .insert(command, Arc::new(handler))
            .is_some()
        {
            debug!(%command, "Replaced IPC handler");
        }
    }

    /// Fire-and-forget: write one frame without a correlation token
    pub async fn send<P>(&self, command: Command, payload: &P) -> IpcResult<()>
    where
        P: Serialize + ?Sized,
    {
        let data = serde_json::to_value(payload)?;
        self.write_frame(&Frame::new(command.as_str(), NO_REPLY, data))
            .await
    }

    /// Send a request and wait for its reply under the configured deadline
    pub async fn request<P, R>(&self, command: Command, payload: &P) -> IpcResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request_with(
            command,
            payload,
            self.config.request_timeout(),
            std::future::pending::<()>(),
        )
        .await
    }

    /// Send a request and wait for its reply, giving up when `timeout`
    /// elapses ([`IpcError::Timeout`]) or `cancel` resolves
    /// ([`IpcError::Canceled`]).
    pub async fn request_with<P, R, C>(
        &self,
        command: Command,
        payload: &P,
        timeout: Option<Duration>,
        cancel: C,
    ) -> IpcResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
        C: Future<Output = ()>,
    {
        let data = serde_json::to_value(payload)?;
        let (id, reply) = self.register_pending()?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        self.write_frame(&Frame::new(command.as_str(), id, data))
            .await?;

        let deadline = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = reply => match result {
                Ok(Ok(value)) => serde_json::from_value(value).map_err(|e| {
                    warn!(%command, request_id = id, error = %e, "Failed to decode IPC reply");
                    IpcError::serialization(e.to_string())
                }),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(IpcError::Closed),
            },
            _ = deadline => {
                self.counters.record_timeout();
                warn!(%command, request_id = id, "IPC request timed out");
                Err(IpcError::timeout(command.as_str()))
            }
            _ = cancel => {
                debug!(%command, request_id = id, "IPC request canceled");
                Err(IpcError::canceled(command.as_str()))
            }
        }
    }

    /// Number of requests currently waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the read loop has stopped
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the processor counters
    pub fn stats(&self) -> ProcessorStats {
        self.counters.snapshot(self.pending_requests())
    }

    fn register_pending(&self) -> IpcResult<(u64, oneshot::Receiver<IpcResult<Value>>)> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(IpcError::Closed);
        }
        let id = loop {
            let candidate = self.next_id.fetch_add(1, Ordering::Relaxed);
            if candidate != NO_REPLY && !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(id, tx);
        Ok((id, rx))
    }

    async fn write_frame(&self, frame: &Frame) -> IpcResult<()> {
        let bytes = frame.encode()?;
        let mut writer = self.writer.lock().await;
        let written: std::io::Result<()> = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        match written {
            Ok(()) => {
                self.counters.record_send();
                Ok(())
            }
            Err(err) => {
                warn!(command = %frame.command, request_id = frame.id, error = %err, "Failed to write IPC frame");
                Err(IpcError::transport(err.to_string()))
            }
        }
    }

    fn handle_line(self: &Arc<Self>, line: &[u8]) {
        let Ok(text) = std::str::from_utf8(line) else {
            self.counters.record_malformed();
            warn!(len = line.len(), "Dropping IPC frame that is not valid UTF-8");
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.counters.record_malformed();
                warn!(error = %err, len = text.len(), "Dropping malformed IPC frame");
                return;
            }
        };
        self.counters.record_receive();

        let command = match frame.command.parse::<Command>() {
            Ok(command) => command,
            Err(unknown) => {
                self.counters.record_unhandled();
                warn!(command = %unknown.0, request_id = frame.id, "Received unknown IPC command");
                if frame.expects_reply() {
                    self.spawn_reply_error(frame.id, "unknown_command", unknown.to_string());
                }
                return;
            }
        };

        if command.is_reply() {
            self.deliver_reply(command, frame);
        } else {
            self.dispatch(command, frame);
        }
    }

    fn deliver_reply(&self, command: Command, frame: Frame) {
        let Some(slot) = self.pending.lock().remove(&frame.id) else {
            self.counters.record_late_reply();
            debug!(request_id = frame.id, "Dropping reply for unknown or expired request");
            return;
        };

        let result = match command {
            Command::Error => Err(serde_json::from_value::<ErrorPayload>(frame.data)
                .map(IpcError::from)
                .unwrap_or_else(|e| IpcError::Remote {
                    code: "unknown".to_string(),
                    message: format!("undecodable error payload: {e}"),
                })),
            _ => Ok(frame.data),
        };
        // The caller may have given up between the remove and this send.
        let _ = slot.send(result);
    }

    fn dispatch(self: &Arc<Self>, command: Command, frame: Frame) {
        let handler = self.handlers.read().get(&command).cloned();
        let Some(handler) = handler else {
            self.counters.record_unhandled();
            warn!(%command, request_id = frame.id, "No handler registered for IPC command");
            if frame.expects_reply() {
                self.spawn_reply_error(frame.id, "no_handler", format!("no handler for {command}"));
            }
            return;
        };

        let id = frame.id;
        let response = handler(frame.data);
        if id == NO_REPLY {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let frame = Frame::new(
                Command::Response.as_str(),
                id,
                response.unwrap_or(Value::Null),
            );
            if let Err(err) = this.write_frame(&frame).await {
                warn!(%command, request_id = id, error = %err, "Failed to answer inbound IPC request");
            }
        });
    }

    fn spawn_reply_error(self: &Arc<Self>, id: u64, code: &'static str, message: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let data = match serde_json::to_value(ErrorPayload::new(code, message)) {
                Ok(data) => data,
                Err(err) => {
                    warn!(request_id = id, error = %err, "Failed to encode IPC error reply");
                    return;
                }
            };
            if let Err(err) = this
                .write_frame(&Frame::new(Command::Error.as_str(), id, data))
                .await
            {
                warn!(request_id = id, error = %err, "Failed to send IPC error reply");
            }
        });
    }

    fn fail_pending(&self) {
        let drained: Vec<ReplySlot> = {
            let mut pending = self.pending.lock();
            self.closed.store(true, Ordering::Release);
            pending.drain().map(|(_, slot)| slot).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "Failing requests left pending by stream close");
        }
        for slot in drained {
            let _ = slot.send(Err(IpcError::Closed));
        }
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("pending_requests", &self.pending_requests())
            .field("closed", &self.is_closed())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
