//! Thin websocket transport to the signaling server: connect, send one
//! [`Envelope`] per frame, receive a stream of them. `Connection` owns the
//! read loop and pending-response demultiplexing; this module only
//! speaks frames.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::domain::Envelope;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsSender(SplitSink<WsStream, Message>);
pub struct WsReceiver(SplitStream<WsStream>);

/// Open a websocket connection to `url`, returning split send/receive
/// halves so the reader loop and the send path can live on separate
/// tasks without contending for a single `Mutex`.
pub async fn connect(url: &str) -> Result<(WsSender, WsReceiver)> {
    let (stream, _response) = connect_async(url).await?;
    let (sink, stream) = stream.split();
    Ok((WsSender(sink), WsReceiver(stream)))
}

impl WsSender {
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        self.0.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

impl WsReceiver {
    /// Read the next frame, parsing it as an [`Envelope`]. Returns `None`
    /// once the server closes the socket.
    pub async fn recv(&mut self) -> Option<Result<Envelope>> {
        loop {
            let frame = match self.0.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(Error::WebSocket(e))),
            };

            return Some(match frame {
                Message::Text(text) => serde_json::from_str(&text).map_err(Error::from),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => continue,
                other => Err(Error::IncorrectRequestType(format!("non-text frame: {other:?}"))),
            });
        }
    }
}
