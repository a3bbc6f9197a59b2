//! Duplex transport to the remote model endpoint.
//!
//! [`DuplexTransport`] is the seam the streaming session talks through:
//! tagged messages in, tagged messages out, no JSON beyond this boundary.
//! [`WsConnector`]/[`WsTransport`] implement it over a WebSocket, performing
//! the setup handshake before the session is handed out, so a connected
//! transport is always ready for media.

use crate::config::CallConfig;
use crate::error::{Result, VoiceError};
use crate::events::{InboundMessage, OutboundMessage, decode_inbound, encode_outbound};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

/// A live bidirectional message stream.
#[async_trait]
pub trait DuplexTransport: Send + Sync {
    /// Send one outbound message. The outbound queue is never reordered:
    /// messages go on the wire in call order.
    async fn send(&self, message: &OutboundMessage) -> Result<()>;

    /// Receive the next inbound message, in arrival order. `None` means the
    /// remote closed cleanly.
    async fn next(&self) -> Option<Result<InboundMessage>>;

    /// Whether the underlying connection is still up.
    fn is_connected(&self) -> bool;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// Opens [`DuplexTransport`]s for a call configuration.
#[async_trait]
pub trait DuplexConnector: Send + Sync {
    /// Connect and complete the setup handshake.
    async fn connect(&self, config: &CallConfig) -> Result<Arc<dyn DuplexTransport>>;
}

// ── WebSocket implementation ────────────────────────────────────────────

/// Connector for WebSocket duplex endpoints with key-in-query auth.
#[derive(Debug)]
pub struct WsConnector {
    endpoint: Url,
    api_key: SecretString,
}

impl WsConnector {
    pub fn new(endpoint: Url, api_key: SecretString) -> Self {
        Self { endpoint, api_key }
    }

    /// Parse the endpoint string and build a connector.
    pub fn from_endpoint(endpoint: &str, api_key: impl Into<String>) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| VoiceError::config(format!("Invalid duplex endpoint: {e}")))?;
        Ok(Self::new(url, SecretString::from(api_key.into())))
    }
}

#[async_trait]
impl DuplexConnector for WsConnector {
    async fn connect(&self, config: &CallConfig) -> Result<Arc<dyn DuplexTransport>> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", self.api_key.expose_secret());

        tracing::info!(endpoint = %self.endpoint, "Connecting duplex transport");
        let (stream, _response) = connect_async(url.as_str()).await.map_err(map_ws_error)?;

        let (sink, source) = stream.split();
        let transport = WsTransport {
            sender: Mutex::new(sink),
            receiver: Mutex::new(source),
            connected: AtomicBool::new(true),
        };

        transport.send(&OutboundMessage::Setup(config.clone())).await?;
        transport.await_ready().await?;

        Ok(Arc::new(transport))
    }
}

/// WebSocket-backed duplex transport.
pub struct WsTransport {
    sender: Mutex<WsSink>,
    receiver: Mutex<WsSource>,
    connected: AtomicBool,
}

impl WsTransport {
    /// Drain inbound messages until the setup acknowledgement arrives.
    async fn await_ready(&self) -> Result<()> {
        loop {
            match self.next().await {
                Some(Ok(InboundMessage::Ready)) => return Ok(()),
                Some(Ok(other)) => {
                    tracing::debug!(?other, "Pre-setup message skipped");
                }
                Some(Err(VoiceError::Protocol(msg))) => {
                    tracing::warn!(%msg, "Protocol violation during setup");
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(VoiceError::remote("Connection closed during setup handshake"));
                }
            }
        }
    }
}

#[async_trait]
impl DuplexTransport for WsTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let wire = encode_outbound(message)?;
        tracing::trace!(bytes = wire.len(), "Sending duplex message");

        let mut sender = self.sender.lock().await;
        sender.send(Message::Text(wire.into())).await.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            map_ws_error(e)
        })
    }

    async fn next(&self) -> Option<Result<InboundMessage>> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => return Some(decode_inbound(text.as_str())),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => return Some(decode_inbound(text)),
                    Err(e) => {
                        return Some(Err(VoiceError::protocol(format!(
                            "Binary message is not UTF-8: {e}"
                        ))));
                    }
                },
                // Keepalive frames are the transport's own business.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return None;
                }
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Some(Err(map_ws_error(e)));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "Close frame not delivered");
        }
    }
}

/// Map WebSocket failures onto the transport error taxonomy: credential
/// rejections, remote refusals and unreachable networks must stay
/// distinguishable for the caller's retry affordance.
fn map_ws_error(e: tokio_tungstenite::tungstenite::Error) -> VoiceError {
    use tokio_tungstenite::tungstenite::Error as Ws;
    match e {
        Ws::Http(response) => {
            let status = response.status();
            if status == 401 || status == 403 {
                VoiceError::AuthFailure(format!("Endpoint rejected credentials ({status})"))
            } else {
                VoiceError::RemoteUnavailable(format!("Endpoint returned {status}"))
            }
        }
        Ws::Io(io) => VoiceError::NetworkUnreachable(io.to_string()),
        Ws::Tls(tls) => VoiceError::NetworkUnreachable(tls.to_string()),
        Ws::Url(url) => VoiceError::Config(format!("Bad endpoint URL: {url}")),
        Ws::ConnectionClosed | Ws::AlreadyClosed => VoiceError::SessionClosed,
        other => VoiceError::RemoteUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_malformed_endpoint() {
        let err = WsConnector::from_endpoint("not a url", "key").unwrap_err();
        assert!(matches!(err, VoiceError::Config(_)));
    }

    #[test]
    fn test_ws_error_taxonomy_is_distinguishable() {
        use tokio_tungstenite::tungstenite::Error as Ws;
        use tokio_tungstenite::tungstenite::http::Response;

        let rejected = Response::builder().status(401).body(None).expect("valid response");
        let auth = map_ws_error(Ws::Http(Box::new(rejected)));
        assert!(matches!(auth, VoiceError::AuthFailure(_)));

        let overloaded = Response::builder().status(503).body(None).expect("valid response");
        let remote = map_ws_error(Ws::Http(Box::new(overloaded)));
        assert!(matches!(remote, VoiceError::RemoteUnavailable(_)));

        let network = map_ws_error(Ws::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(matches!(network, VoiceError::NetworkUnreachable(_)));

        let closed = map_ws_error(Ws::ConnectionClosed);
        assert!(matches!(closed, VoiceError::SessionClosed));
    }
}
