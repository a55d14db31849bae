//! WebSocket transport to the broker.
//!
//! Each envelope travels as one binary frame holding its CBOR encoding.
//! Ping, pong and text frames are skipped; a close frame or the end of the
//! socket ends the stream.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use vzconn_core::envelope::{self, Envelope};

use crate::error::{ConnectorError, Result};
use crate::stream::{BrokerStream, Connector};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the broker's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Create a connector for `url` (e.g., "wss://vzconn.example.com/connect").
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The broker URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerStream>> {
        let (socket, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectorError::StreamOpen(e.to_string()))?;
        tracing::debug!(url = %self.url, status = %response.status(), "Broker stream opened");

        let (write, read) = socket.split();
        Ok(Arc::new(WsBrokerStream {
            write: Mutex::new(write),
            read: Mutex::new(read),
        }))
    }
}

/// A broker stream over an open WebSocket.
pub struct WsBrokerStream {
    write: Mutex<SplitSink<Socket, Message>>,
    read: Mutex<SplitStream<Socket>>,
}

#[async_trait]
impl BrokerStream for WsBrokerStream {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        let bytes = envelope::encode(&envelope)?;
        self.write
            .lock()
            .await
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| ConnectorError::Send(e.to_string()))
    }

    async fn recv(&self) -> Result<Envelope> {
        let mut read = self.read.lock().await;
        while let Some(frame) = read.next().await {
            match frame.map_err(|e| ConnectorError::Recv(e.to_string()))? {
                Message::Binary(bytes) => return Ok(envelope::decode(&bytes)?),
                Message::Close(frame) => {
                    tracing::debug!(frame = ?frame, "Broker closed stream");
                    return Err(ConnectorError::StreamClosed);
                }
                Message::Text(text) => {
                    tracing::warn!(len = text.len(), "Ignoring text frame from broker");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Err(ConnectorError::StreamClosed)
    }
}
