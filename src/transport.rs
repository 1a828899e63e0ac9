//! Duplex transport the session runs on.
//!
//! The session only needs four operations: dial, read a frame, write a
//! frame and close. [`WsTransport`] provides them over a WebSocket; tests
//! plug in an in-memory implementation.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use http::{HeaderMap, HeaderValue};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{ChatError, Result};

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Blocks until the next text frame arrives.
    async fn read_frame(&mut self) -> Result<String>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// A freshly dialed connection, split into its two halves.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Dials new connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, url: &str, headers: &HeaderMap) -> Result<Connection>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn dial(&self, url: &str, headers: &HeaderMap) -> Result<Connection> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChatError::Connection(format!("invalid request for {}: {}", url, e)))?;
        for (name, value) in headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ChatError::Connection(format!("WebSocket connection failed: {}", e)))?;
        debug!("WebSocket handshake with {} completed", url);

        let (write, read) = ws_stream.split();
        Ok(Connection {
            sink: Box::new(WsSink { write }),
            source: Box::new(WsSource { read }),
        })
    }
}

struct WsSink {
    write: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn write_frame(&mut self, frame: String) -> Result<()> {
        self.write
            .send(WsMessage::text(frame))
            .await
            .map_err(|e| ChatError::Connection(format!("write failed: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .map_err(|e| ChatError::Connection(format!("close failed: {}", e)))
    }
}

struct WsSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn read_frame(&mut self) -> Result<String> {
        while let Some(msg) = self.read.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => return Ok(text.as_str().to_owned()),
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => debug!("Ignoring non UTF-8 binary frame"),
                },
                Ok(WsMessage::Close(frame)) => {
                    return Err(ChatError::Connection(format!(
                        "WebSocket closed by server: {:?}",
                        frame
                    )));
                }
                // Pings are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Err(ChatError::Connection(format!("read failed: {}", e))),
            }
        }
        Err(ChatError::Connection("WebSocket stream ended".to_string()))
    }
}

/// Builds the handshake headers for a session.
///
/// The origin header is always present; the auth cookie only when a login
/// key is configured.
pub fn handshake_headers(origin: &str, login_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| ChatError::Construction(format!("invalid origin {:?}: {}", origin, e)))?;
    headers.insert(http::header::ORIGIN, origin);

    if let Some(key) = login_key {
        let cookie = HeaderValue::from_str(&format!("authtoken={}", key))
            .map_err(|e| ChatError::Construction(format!("invalid login key: {}", e)))?;
        headers.insert(http::header::COOKIE, cookie);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_headers_have_no_cookie() {
        let headers = handshake_headers("https://www.destiny.gg", None).unwrap();
        assert_eq!(headers.get("origin").unwrap(), "https://www.destiny.gg");
        assert!(headers.get("cookie").is_none());
    }

    #[test]
    fn credentialed_headers_carry_auth_cookie() {
        let headers = handshake_headers("https://example.org", Some("s3cret")).unwrap();
        assert_eq!(headers.get("cookie").unwrap(), "authtoken=s3cret");
    }

    #[test]
    fn header_values_are_validated() {
        assert!(matches!(
            handshake_headers("https://example.org", Some("bad\nkey")),
            Err(ChatError::Construction(_))
        ));
    }

    #[tokio::test]
    async fn dial_failure_is_a_connection_error() {
        let headers = handshake_headers("https://example.org", None).unwrap();
        let result = WsTransport.dial("ws://127.0.0.1:1/ws", &headers).await;
        assert!(matches!(result, Err(ChatError::Connection(_))));
    }
}
