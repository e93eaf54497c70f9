//! JSON framing for the voice control channel over a websocket.

use crate::model::{Envelope, Event};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Error as JsonError;
use std::{error::Error as StdError, fmt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_tungstenite::{
    tungstenite::{error::Error as TungsteniteError, protocol::CloseFrame, Message},
    MaybeTlsStream,
    WebSocketStream,
};
use tracing::{instrument, warn};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    Json(JsonError),

    /// The voice gateway does not support or offer compression.
    /// As a result, only text messages are expected.
    UnexpectedBinaryMessage(Vec<u8>),

    Ws(TungsteniteError),

    WsClosed(Option<CloseFrame<'static>>),
}

impl Error {
    /// The close code sent by the remote, if the socket was closed with one.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::WsClosed(Some(frame)) => Some(frame.code.into()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "invalid JSON on voice websocket: {e}"),
            Error::UnexpectedBinaryMessage(b) =>
                write!(f, "unexpected binary message of {} bytes", b.len()),
            Error::Ws(e) => write!(f, "websocket error: {e}"),
            Error::WsClosed(Some(frame)) =>
                write!(f, "websocket closed with code {}: {}", frame.code, frame.reason),
            Error::WsClosed(None) => write!(f, "websocket closed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Ws(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

/// A decoded control channel message, and the sequence number it carried.
#[derive(Clone, Debug)]
pub struct Inbound {
    pub event: Event,
    pub seq: Option<u64>,
}

#[async_trait]
pub trait ReceiverExt {
    /// Waits for the next message.
    ///
    /// `Ok(None)` is returned for frames carrying no event (pings, pongs).
    /// A stream which ends without a close frame yields `WsClosed(None)`.
    async fn recv_json(&mut self) -> Result<Option<Inbound>>;
}

#[async_trait]
pub trait SenderExt {
    async fn send_json(&mut self, value: &Event) -> Result<()>;
}

#[async_trait]
impl<S> ReceiverExt for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn recv_json(&mut self) -> Result<Option<Inbound>> {
        match self.next().await {
            Some(Ok(message)) => convert_ws_message(message),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::WsClosed(None)),
        }
    }
}

#[async_trait]
impl<S> SenderExt for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn send_json(&mut self, value: &Event) -> Result<()> {
        Ok(serde_json::to_string(value)
            .map(Message::Text)
            .map_err(Error::from)
            .map(|m| self.send(m))?
            .await?)
    }
}

#[inline]
pub(crate) fn convert_ws_message(message: Message) -> Result<Option<Inbound>> {
    Ok(match message {
        Message::Text(payload) => {
            let event = serde_json::from_str::<Event>(&payload).map_err(|why| {
                warn!("Err deserializing text: {:?}; text: {}", why, payload);
                why
            })?;
            let Envelope { seq } = serde_json::from_str(&payload)?;

            Some(Inbound { event, seq })
        },
        Message::Binary(bytes) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Message::Close(frame) => {
            return Err(Error::WsClosed(frame));
        },
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}

#[instrument]
pub(crate) async fn create_client(url: Url) -> Result<WsStream> {
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

    #[test]
    fn text_frames_carry_sequence() {
        let msg = Message::Text(r#"{"op":6,"d":{"t":42},"seq":7}"#.into());
        let inbound = convert_ws_message(msg).unwrap().unwrap();

        assert!(matches!(inbound.event, Event::HeartbeatAck(ack) if ack.nonce == 42));
        assert_eq!(inbound.seq, Some(7));
    }

    #[test]
    fn close_frames_surface_code() {
        let msg = Message::Close(Some(CloseFrame {
            code: WsCloseCode::from(4014),
            reason: "kicked".into(),
        }));

        let err = convert_ws_message(msg).unwrap_err();
        assert_eq!(err.close_code(), Some(u16::from(CloseCode::Disconnected)));
    }

    #[test]
    fn binary_is_rejected_and_pings_skipped() {
        assert!(matches!(
            convert_ws_message(Message::Binary(vec![1, 2])),
            Err(Error::UnexpectedBinaryMessage(_))
        ));
        assert!(convert_ws_message(Message::Ping(vec![])).unwrap().is_none());
    }
}
