//! Message router handle and event loop.
//!
//! [`MsgRouter`] is a cheap, cloneable handle. All connection state lives in
//! a single spawned task that owns the socket, the outbound queue and the
//! awaiting-reply table, and is driven by `tokio::select!` over router
//! commands and whatever the connection is currently waiting on.
//!
//! # Request Flow
//!
//! ```text
//! send() ──► Enqueue ──► outbound queue ──► flush (socket open) ──► awaiting
//!                                                                      │
//! PendingReply ◄── settle ◄── httpReply / srException by reqSeq ◄─────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sim_msgrouter::{MsgRouter, RequestConfig};
//! use serde_json::json;
//!
//! let router = MsgRouter::builder().url("ws://localhost:8000/ws").build()?;
//! let reply = router
//!     .send("/simulation-list", json!({"simulationType": "srw"}), RequestConfig::json())?
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rmpv::Value;
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

use crate::config::RouterConfig;
use crate::cookie::{CookieManager, CookieStatus, CookieStore};
use crate::error::{Error, Result};
use crate::identifiers::{ReqSeq, ReqSeqGenerator};
use crate::protocol::reply::{coerce_reply, sr_exception_error};
use crate::protocol::{Attachment, Body, Frame, Header, InboundFrame, Kind, RequestConfig};

use super::builder::RouterBuilder;
use super::pending::{PendingReply, PendingRequest, RequestTable};
use super::socket::{Connector, Socket, SocketEvent};
use super::state::{Backoff, Link, LinkState};

// ============================================================================
// Constants
// ============================================================================

/// Async message method handled by the router itself.
pub const SET_COOKIES_METHOD: &str = "setCookies";

// ============================================================================
// Types
// ============================================================================

/// Handler for server-pushed async messages.
///
/// Runs on the router task; it must not block.
pub type AsyncMsgHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Snapshot of the router's queues and connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    /// Requests waiting to be transmitted.
    pub queued: usize,
    /// Requests transmitted and waiting for a reply.
    pub awaiting: usize,
    /// Connection state.
    pub state: LinkState,
    /// Current reconnect delay; zero when idle.
    pub backoff: Duration,
}

impl RouterStats {
    /// Returns queued plus awaiting requests.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queued + self.awaiting
    }
}

/// Commands from handles to the event loop.
enum RouterCommand {
    Enqueue(PendingRequest),
    ClearModels,
    Stats(oneshot::Sender<RouterStats>),
    Shutdown,
}

/// State shared by every handle and the event loop.
struct Shared {
    config: RouterConfig,
    req_seq: ReqSeqGenerator,
    cookies: Mutex<CookieManager>,
    handlers: RwLock<FxHashMap<String, AsyncMsgHandler>>,
    runtime: Handle,
}

// ============================================================================
// MsgRouter
// ============================================================================

/// Handle to a running message router.
///
/// Clones share the same connection and request tables.
#[derive(Clone)]
pub struct MsgRouter {
    command_tx: mpsc::UnboundedSender<RouterCommand>,
    shared: Arc<Shared>,
}

impl fmt::Debug for MsgRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsgRouter")
            .field("config", &self.shared.config)
            .field("closed", &self.command_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl MsgRouter {
    /// Creates a builder for configuring a router.
    #[inline]
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Spawns the event loop on `runtime`.
    ///
    /// No connection is made until the first request.
    pub(crate) fn start(
        config: RouterConfig,
        cookies: CookieManager,
        connector: Arc<dyn Connector>,
        runtime: Handle,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            config,
            req_seq: ReqSeqGenerator::new(),
            cookies: Mutex::new(cookies),
            handlers: RwLock::new(FxHashMap::default()),
            runtime,
        });

        let weak = Arc::downgrade(&shared);
        shared.handlers.write().insert(
            SET_COOKIES_METHOD.to_string(),
            Arc::new(move |content| set_cookies(&weak, content)),
        );

        let task = RouterTask {
            backoff: Backoff::new(shared.config.max_backoff),
            shared: Arc::clone(&shared),
            connector,
            command_rx,
            requests: RequestTable::default(),
            link: Link::Disconnected,
        };
        shared.runtime.spawn(task.run());

        debug!(
            protocol_version = shared.config.protocol_version,
            cookie = %shared.config.session_cookie_name,
            "Message router started"
        );

        Self { command_tx, shared }
    }

    /// Sends a request.
    ///
    /// Returns once the request is queued (or, for an upload read from
    /// disk, once the read is scheduled). Await the returned
    /// [`PendingReply`] for the outcome. If the session cookie was rotated,
    /// nothing is sent and the reply resolves to [`Error::Abandoned`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `uri` is not valid percent-encoding
    /// - [`Error::InvalidUpload`] if a form has two files or a misnamed file field
    /// - [`Error::ConnectionClosed`] if the router was shut down
    pub fn send(
        &self,
        uri: &str,
        body: impl Into<Body>,
        config: RequestConfig,
    ) -> Result<PendingReply> {
        if self.shared.cookies.lock().check() == CookieStatus::Rotated {
            debug!(uri, "Session rotated; request skipped");
            return Ok(PendingReply::abandoned());
        }
        if self.command_tx.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let uri = urlencoding::decode(uri)
            .map_err(|e| Error::invalid_argument(format!("uri {uri:?} is not valid: {e}")))?
            .into_owned();

        let (content, upload) = match body.into() {
            Body::Empty => (Value::Nil, None),
            Body::Json(json) => (rmpv::ext::to_value(json)?, None),
            Body::Form(form) => {
                let split = form.split()?;
                (split.meta, split.file)
            }
        };

        let req_seq = self.shared.req_seq.next();
        let version = self.shared.config.protocol_version;

        let upload = match upload.map(|u| u.try_into_attachment()) {
            None => None,
            Some(Ok(attachment)) => Some(attachment),
            Some(Err(on_disk)) => {
                // The file read is the only wait before the request is queued.
                let (mut request, reply) =
                    PendingRequest::new(req_seq, uri, Bytes::new(), config.response_type);
                let command_tx = self.command_tx.clone();

                self.shared.runtime.spawn(async move {
                    let frame = match on_disk.into_attachment().await {
                        Ok(attachment) => {
                            encode_request(version, req_seq, &request.uri, content, Some(attachment))
                        }
                        Err(e) => Err(e),
                    };
                    match frame {
                        Ok(frame) => {
                            request.frame = frame;
                            if let Err(mpsc::error::SendError(RouterCommand::Enqueue(request))) =
                                command_tx.send(RouterCommand::Enqueue(request))
                            {
                                request.settle(Err(Error::ConnectionClosed));
                            }
                        }
                        Err(e) => {
                            warn!(req_seq = %req_seq, error = %e, "Upload not sent");
                            request.settle(Err(e));
                        }
                    }
                });

                return Ok(reply);
            }
        };

        let frame = encode_request(version, req_seq, &uri, content, upload)?;
        let (request, reply) = PendingRequest::new(req_seq, uri, frame, config.response_type);

        self.command_tx
            .send(RouterCommand::Enqueue(request))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(reply)
    }

    /// Registers the handler for an async message method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAsyncMsg`] if the method already has one,
    /// including the built-in `setCookies`.
    pub fn register_async_msg<F>(&self, method: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        match self.shared.handlers.write().entry(method.into()) {
            Entry::Occupied(entry) => Err(Error::duplicate_async_msg(entry.key())),
            Entry::Vacant(entry) => {
                debug!(method = %entry.key(), "Async message handler registered");
                entry.insert(Arc::new(handler));
                Ok(())
            }
        }
    }

    /// Abandons every queued and awaiting request.
    ///
    /// Their replies resolve to [`Error::Abandoned`]. The connection stays
    /// up.
    pub fn clear_models(&self) {
        let _ = self.command_tx.send(RouterCommand::ClearModels);
    }

    /// Stops the event loop and closes the connection.
    ///
    /// Outstanding replies resolve to [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(RouterCommand::Shutdown);
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Subscribes to session rotation.
    ///
    /// The value flips to `true` once and stays there; the application
    /// must then reload.
    #[must_use]
    pub fn session_rotated(&self) -> watch::Receiver<bool> {
        self.shared.cookies.lock().subscribe()
    }

    /// Applies a local cookie change through the rotation gate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionRotated`] without applying `op` if the
    /// session was rotated externally.
    pub fn update_cookies<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CookieStore),
    {
        self.shared.cookies.lock().update(op)
    }

    /// Returns the router configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.shared.config
    }

    /// Reports queue sizes and connection state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the router was shut down.
    pub async fn stats(&self) -> Result<RouterStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RouterCommand::Stats(tx))
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Returns the number of queued plus awaiting requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the router was shut down.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.stats().await?.pending())
    }
}

/// Built-in `setCookies` handler: content is a list of `Set-Cookie` lines.
fn set_cookies(shared: &Weak<Shared>, content: Value) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let lines: Vec<String> = match content {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => s.into_str(),
                other => {
                    warn!(item = %other, "Ignoring non-string cookie");
                    None
                }
            })
            .collect(),
        Value::String(s) => s.into_str().into_iter().collect(),
        other => {
            error!(content = %other, "setCookies expects a list of strings");
            return;
        }
    };

    if let Err(e) = shared.cookies.lock().apply_set_cookies(&lines) {
        error!(error = %e, "Server cookies not applied");
    }
}

/// Encodes an `httpRequest` frame.
fn encode_request(
    version: u32,
    req_seq: ReqSeq,
    uri: &str,
    content: Value,
    attachment: Option<Attachment>,
) -> Result<Bytes> {
    let header = Header::HttpRequest {
        req_seq,
        uri: uri.to_string(),
    }
    .to_wire(version);

    let mut frame = Frame::new(header, content);
    if let Some(attachment) = attachment {
        frame = frame.with_attachment(attachment);
    }
    frame.encode()
}

// ============================================================================
// RouterTask
// ============================================================================

/// What woke the event loop.
enum LoopEvent {
    Command(Option<RouterCommand>),
    Connected(Result<Socket>),
    Socket(SocketEvent),
    RetryDue,
}

/// The event loop. Sole owner of the connection and request tables.
struct RouterTask {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    command_rx: mpsc::UnboundedReceiver<RouterCommand>,
    requests: RequestTable,
    link: Link,
    backoff: Backoff,
}

impl RouterTask {
    async fn run(mut self) {
        loop {
            match self.next_event().await {
                LoopEvent::Command(Some(command)) => {
                    if !self.on_command(command).await {
                        break;
                    }
                }
                LoopEvent::Command(None) => {
                    debug!("All router handles dropped");
                    break;
                }
                LoopEvent::Connected(Ok(socket)) => self.on_open(socket).await,
                LoopEvent::Connected(Err(e)) => {
                    warn!(error = %e, "Connection attempt failed");
                    self.on_disconnect(false);
                }
                LoopEvent::Socket(SocketEvent::Frame(data)) => self.on_frame(&data),
                LoopEvent::Socket(SocketEvent::Closed { was_clean }) => {
                    self.on_disconnect(was_clean);
                }
                LoopEvent::RetryDue => {
                    debug!(backoff_secs = self.backoff.current().as_secs(), "Reconnecting");
                    self.link = Link::Disconnected;
                    self.connect();
                }
            }
        }

        self.teardown().await;
    }

    async fn next_event(&mut self) -> LoopEvent {
        let Self {
            command_rx, link, ..
        } = self;

        tokio::select! {
            biased;
            command = command_rx.recv() => LoopEvent::Command(command),
            event = link_event(link) => event,
        }
    }

    /// Returns `false` when the loop should stop.
    async fn on_command(&mut self, command: RouterCommand) -> bool {
        match command {
            RouterCommand::Enqueue(request) => {
                if request.is_cancelled() {
                    trace!(req_seq = %request.req_seq, "Request cancelled before queueing");
                    return true;
                }
                trace!(req_seq = %request.req_seq, uri = %request.uri, "Request queued");
                self.requests.push_back(request);
                self.flush().await;
            }
            RouterCommand::ClearModels => {
                let count = self.requests.fail_all(|| Error::Abandoned);
                info!(count, "Pending requests abandoned");
            }
            RouterCommand::Stats(reply) => {
                let _ = reply.send(RouterStats {
                    queued: self.requests.outbound_len(),
                    awaiting: self.requests.awaiting_len(),
                    state: self.link.state(),
                    backoff: self.backoff.current(),
                });
            }
            RouterCommand::Shutdown => {
                debug!("Shutdown command received");
                return false;
            }
        }
        true
    }

    /// Opens a connection if needed, or drains the queue if open.
    async fn flush(&mut self) {
        if !self.link.is_open() {
            // Otherwise the open handler or the retry timer flushes later
            if matches!(self.link, Link::Disconnected) && self.requests.has_outbound() {
                self.connect();
            }
            return;
        }
        let Link::Open(socket) = &mut self.link else {
            return;
        };

        let mut failed = false;
        while let Some(request) = self.requests.pop_front() {
            if request.is_cancelled() {
                trace!(req_seq = %request.req_seq, "Dropping cancelled request");
                continue;
            }

            let frame = request.frame.clone();
            trace!(req_seq = %request.req_seq, uri = %request.uri, size = frame.len(), "Sending request");
            self.requests.mark_sent(request);

            if let Err(e) = socket.send(frame).await {
                warn!(error = %e, "Send failed");
                failed = true;
                break;
            }
        }

        if failed {
            self.on_disconnect(false);
        }
    }

    fn connect(&mut self) {
        let cookie_header = {
            let mut cookies = self.shared.cookies.lock();
            if cookies.check() == CookieStatus::Rotated {
                let cookie_name = cookies.cookie_name().to_string();
                drop(cookies);

                let count = self
                    .requests
                    .fail_all(|| Error::session_rotated(cookie_name.as_str()));
                warn!(count, "Session rotated; not connecting");
                self.link = Link::Disconnected;
                return;
            }
            cookies.cookie_header()
        };

        let connector = Arc::clone(&self.connector);
        self.link = Link::Connecting(Box::pin(async move { connector.connect(cookie_header).await }));
        debug!("Connecting");
    }

    async fn on_open(&mut self, socket: Socket) {
        info!(
            queued = self.requests.outbound_len(),
            retried = !self.backoff.is_idle(),
            "Connection open"
        );
        self.backoff.reset();
        self.link = Link::Open(socket);
        self.flush().await;
    }

    fn on_disconnect(&mut self, was_clean: bool) {
        if matches!(self.link, Link::ReconnectScheduled(_)) {
            return;
        }

        if self.backoff.is_idle() && !was_clean {
            let count = self.requests.requeue_awaiting();
            if count > 0 {
                info!(count, "Unanswered requests requeued for replay");
            }
        }

        let delay = self.backoff.escalate();
        info!(backoff_secs = delay.as_secs(), was_clean, "Disconnected; reconnect scheduled");
        self.link = Link::schedule(delay);
    }

    fn on_frame(&mut self, data: &[u8]) {
        let InboundFrame {
            header,
            content,
            trailing,
        } = match InboundFrame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, size = data.len(), "Undecodable frame header");
                return;
            }
        };

        let is_async = header.kind == Kind::AsyncMsg.code();
        let wire_seq = header.req_seq;

        if trailing > 0 {
            warn!(?header, trailing, "Ignoring bytes after frame content");
        }

        let content = match content {
            Ok(content) => content,
            Err(e) => {
                error!(?header, error = %e, "Undecodable frame content");
                if !is_async {
                    self.reject(wire_seq, format!("undecodable content: {e}"));
                }
                return;
            }
        };

        if header.version != self.shared.config.protocol_version {
            error!(?header, %content, expected = self.shared.config.protocol_version, "Protocol version mismatch");
            if !is_async {
                self.reject(
                    wire_seq,
                    format!(
                        "protocol version mismatch: expected {}, got {}",
                        self.shared.config.protocol_version, header.version
                    ),
                );
            }
            return;
        }

        let header = match header.into_header() {
            Ok(header) => header,
            Err(e) => {
                error!(error = %e, %content, "Malformed header");
                if !is_async {
                    self.reject(wire_seq, e.to_string());
                }
                return;
            }
        };

        let (req_seq, kind) = match header {
            Header::AsyncMsg { method } => {
                self.dispatch_async(&method, content);
                return;
            }
            Header::HttpRequest { req_seq, .. } => (req_seq, Kind::HttpRequest),
            Header::HttpReply { req_seq } => (req_seq, Kind::HttpReply),
            Header::SrException { req_seq } => (req_seq, Kind::SrException),
        };

        let Some(request) = self.requests.take_awaiting(req_seq) else {
            error!(req_seq = %req_seq, ?kind, %content, "Reply for unknown reqSeq");
            return;
        };

        let result = match kind {
            Kind::SrException => Err(sr_exception_error(req_seq, content)),
            Kind::HttpReply => coerce_reply(req_seq, request.response_type, content),
            Kind::HttpRequest | Kind::AsyncMsg => Err(Error::protocol_for(
                req_seq,
                format!("unexpected {kind:?} frame for request"),
            )),
        };

        match &result {
            Ok(reply) => trace!(req_seq = %req_seq, status = reply.status, "Request resolved"),
            Err(e) if e.is_protocol_error() => {
                error!(req_seq = %req_seq, uri = %request.uri, error = %e, "Protocol error in reply");
            }
            Err(e) => debug!(req_seq = %req_seq, uri = %request.uri, error = %e, "Request rejected"),
        }

        request.settle(result);
    }

    /// Rejects the awaiting request for `req_seq` with a protocol error.
    fn reject(&mut self, req_seq: Option<ReqSeq>, message: String) {
        if let Some(req_seq) = req_seq
            && let Some(request) = self.requests.take_awaiting(req_seq)
        {
            request.settle(Err(Error::protocol_for(req_seq, message)));
        }
    }

    fn dispatch_async(&self, method: &str, content: Value) {
        let handler = self.shared.handlers.read().get(method).cloned();
        match handler {
            Some(handler) => {
                trace!(method, "Dispatching async message");
                handler(content);
            }
            None => error!(method, %content, "No handler registered for async message"),
        }
    }

    async fn teardown(&mut self) {
        self.command_rx.close();
        while let Ok(command) = self.command_rx.try_recv() {
            if let RouterCommand::Enqueue(request) = command {
                request.settle(Err(Error::ConnectionClosed));
            }
        }

        if let Link::Open(socket) = &mut self.link {
            socket.close().await;
        }
        self.link = Link::Disconnected;

        let count = self.requests.fail_all(|| Error::ConnectionClosed);
        debug!(failed = count, "Router task terminated");
    }
}

/// Waits on whatever the link is waiting on.
async fn link_event(link: &mut Link) -> LoopEvent {
    match link {
        Link::Disconnected => std::future::pending::<LoopEvent>().await,
        Link::Connecting(connecting) => LoopEvent::Connected(connecting.as_mut().await),
        Link::Open(socket) => LoopEvent::Socket(socket.next_event().await),
        Link::ReconnectScheduled(timer) => {
            timer.as_mut().await;
            LoopEvent::RetryDue
        }
    }
}
