//! Socket abstraction and the WebSocket connector.
//!
//! The router never touches tungstenite directly. It asks a [`Connector`]
//! for a [`Socket`]: a sink of binary frames plus a stream of
//! [`SocketEvent`]s. [`WsConnector`] is the production implementation;
//! tests plug in an in-memory one.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Outbound half of a socket.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = Error> + Send>>;

/// Inbound half of a socket.
pub type EventStream = Pin<Box<dyn Stream<Item = SocketEvent> + Send>>;

// ============================================================================
// SocketEvent
// ============================================================================

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A binary frame arrived.
    Frame(Bytes),
    /// The connection ended.
    Closed {
        /// `true` if the peer closed gracefully; unanswered requests are
        /// then not replayed.
        was_clean: bool,
    },
}

// ============================================================================
// Socket
// ============================================================================

/// An open connection to the backend.
pub struct Socket {
    sink: FrameSink,
    events: EventStream,
}

impl Socket {
    /// Creates a socket from its two halves.
    #[inline]
    #[must_use]
    pub fn new(sink: FrameSink, events: EventStream) -> Self {
        Self { sink, events }
    }

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the connection is broken.
    pub async fn send(&mut self, frame: Bytes) -> Result<()> {
        self.sink.send(frame).await
    }

    /// Waits for the next event.
    ///
    /// An exhausted stream is reported as an unclean close.
    pub async fn next_event(&mut self) -> SocketEvent {
        self.events
            .next()
            .await
            .unwrap_or(SocketEvent::Closed { was_clean: false })
    }

    /// Closes the outbound half, ignoring errors.
    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Error while closing socket");
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens sockets to the backend.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new socket.
    ///
    /// `cookie_header` is the current cookie string, if any, to present
    /// during the handshake.
    async fn connect(&self, cookie_header: Option<String>) -> Result<Socket>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// [`Connector`] over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// Creates a connector for a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or has another
    /// scheme.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("invalid url {url:?}: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(Error::config(format!(
                "url scheme must be ws or wss, got {other:?}"
            ))),
        }
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, cookie_header: Option<String>) -> Result<Socket> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(cookies) = cookie_header {
            let value = HeaderValue::from_str(&cookies)
                .map_err(|e| Error::connection(format!("invalid cookie header: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (ws_stream, response) = connect_async(request).await?;
        debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");

        let (ws_write, ws_read) = ws_stream.split();

        let sink = ws_write
            .with(|frame: Bytes| future::ready(Ok::<_, WsError>(Message::Binary(frame))))
            .sink_map_err(Error::from);
        let events = ws_read.filter_map(|message| future::ready(classify(message)));

        Ok(Socket::new(Box::pin(sink), Box::pin(events)))
    }
}

/// Maps a tungstenite message to a socket event.
fn classify(message: std::result::Result<Message, WsError>) -> Option<SocketEvent> {
    match message {
        Ok(Message::Binary(data)) => {
            trace!(size = data.len(), "Binary frame received");
            Some(SocketEvent::Frame(data))
        }
        Ok(Message::Close(frame)) => {
            let was_clean = is_clean_close(frame.as_ref());
            debug!(?frame, was_clean, "WebSocket closed by remote");
            Some(SocketEvent::Closed { was_clean })
        }
        Ok(Message::Text(text)) => {
            warn!(size = text.len(), "Ignoring text frame");
            None
        }
        // Ping, Pong and raw frames are handled by tungstenite
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "WebSocket error");
            Some(SocketEvent::Closed { was_clean: false })
        }
    }
}

/// Only a normal-closure code counts as clean.
///
/// Going-away, restart and error codes mean the server may have dropped
/// in-flight work, so those requests are replayed.
fn is_clean_close(frame: Option<&CloseFrame>) -> bool {
    frame.is_some_and(|f| f.code == CloseCode::Normal)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use rmpv::Value;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use crate::identifiers::ReqSeq;
    use crate::protocol::{Frame, Header, PROTOCOL_VERSION};

    #[test]
    fn test_new_accepts_ws_and_wss() {
        assert!(WsConnector::new("ws://127.0.0.1:8000/ws").is_ok());
        assert!(WsConnector::new("wss://sirepo.example.org/ws").is_ok());
    }

    #[test]
    fn test_new_rejects_other_schemes() {
        let err = WsConnector::new("http://127.0.0.1:8000/ws").expect_err("http scheme");
        assert!(err.to_string().contains("scheme"));
        assert!(WsConnector::new("not a url").is_err());
    }

    #[test]
    fn test_clean_close_codes() {
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        let away = CloseFrame {
            code: CloseCode::Away,
            reason: "restart".into(),
        };
        assert!(is_clean_close(Some(&normal)));
        assert!(!is_clean_close(Some(&away)));
        assert!(!is_clean_close(None));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(Ok(Message::Binary(Bytes::from_static(b"\x01")))),
            Some(SocketEvent::Frame(Bytes::from_static(b"\x01")))
        );
        assert_eq!(classify(Ok(Message::Ping(Bytes::new()))), None);
        assert_eq!(
            classify(Err(WsError::ConnectionClosed)),
            Some(SocketEvent::Closed { was_clean: false })
        );
    }

    #[tokio::test]
    async fn test_connect_sends_cookie_and_frames() {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (cookie_tx, cookie_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut cookie_tx = Some(cookie_tx);
            let callback = |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
                let cookie = req
                    .headers()
                    .get(COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(tx) = cookie_tx.take() {
                    let _ = tx.send(cookie);
                }
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .expect("upgrade");

            // Echo the request back as a reply with the same reqSeq
            if let Some(Ok(Message::Binary(data))) = ws.next().await {
                let request = Frame::decode(&data).expect("decode");
                let reply = Frame::new(
                    Header::HttpReply {
                        req_seq: request.header.req_seq.expect("reqSeq"),
                    }
                    .to_wire(PROTOCOL_VERSION),
                    request.content,
                );
                ws.send(Message::Binary(reply.encode().expect("encode")))
                    .await
                    .expect("send");
            }
            let _ = ws.close(None).await;
        });

        let connector = WsConnector::new(&format!("ws://127.0.0.1:{port}/ws")).expect("url");
        let mut socket = connector
            .connect(Some("sirepo_dev=abc".to_string()))
            .await
            .expect("connect");

        assert_eq!(
            cookie_rx.await.expect("cookie"),
            Some("sirepo_dev=abc".to_string())
        );

        let request = Frame::new(
            Header::HttpRequest {
                req_seq: ReqSeq::new(1),
                uri: "/echo".to_string(),
            }
            .to_wire(PROTOCOL_VERSION),
            Value::from("ping"),
        );
        socket.send(request.encode().expect("encode")).await.expect("send");

        match socket.next_event().await {
            SocketEvent::Frame(data) => {
                let reply = Frame::decode(&data).expect("decode");
                assert_eq!(reply.header.req_seq, Some(ReqSeq::new(1)));
                assert_eq!(reply.content, Value::from("ping"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // close(None) from the server carries no code, so it is not clean
        assert_eq!(
            socket.next_event().await,
            SocketEvent::Closed { was_clean: false }
        );
    }
}
