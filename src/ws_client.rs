//! Websocket transport for the chat channel
//!
//! Opens the socket and splits it into a write half and a read half. Inbound
//! frames are classified into text and binary; control frames are handled
//! by tungstenite and otherwise ignored.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket
pub type WsSink = SplitSink<Socket, Message>;

/// Read half of the socket
pub type WsStream = SplitStream<Socket>;

/// One inbound payload, as far as the chat is concerned.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the channel, or the stream ended
    Closed(String),
}

/// An open channel handle. Dropped handles are never reused.
pub struct ChatChannel {
    generation: u64,
    sink: WsSink,
    stream: WsStream,
}

impl ChatChannel {
    /// Connect to `url`, which already carries the bearer token.
    pub async fn connect(url: &Url, generation: u64) -> Result<Self, tungstenite::Error> {
        info!("Connecting to {}", redact(url));
        let (socket, resp) = connect_async(url.as_str()).await?;
        debug!("WebSocket handshake response: {:?}", resp.status());
        let (sink, stream) = socket.split();
        Ok(Self {
            generation,
            sink,
            stream,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), tungstenite::Error> {
        self.sink.send(Message::Text(text.into())).await
    }

    /// Next chat payload. Errors end the channel and are reported as `Closed`.
    pub async fn recv(&mut self) -> Inbound {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Inbound::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => return Inbound::Binary(bytes.to_vec()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(frame) if !frame.reason.is_empty() => {
                            format!("closed by server: {}", frame.reason.as_str())
                        }
                        Some(frame) => format!("closed by server ({})", u16::from(frame.code)),
                        None => "closed by server".to_string(),
                    };
                    return Inbound::Closed(reason);
                }
                Some(Ok(_)) => {
                    // ping/pong and raw frames
                }
                Some(Err(e)) => return Inbound::Closed(e.to_string()),
                None => return Inbound::Closed("connection ended".to_string()),
            }
        }
    }

    /// Close the socket, best effort.
    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("Error while closing channel #{}: {}", self.generation, e);
        }
    }
}

/// The URL with its query string hidden, for logs.
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    if shown.query().is_some() {
        shown.set_query(Some("<redacted>"));
    }
    shown.to_string()
}
