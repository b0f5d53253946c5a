//! WebSocket push channel for one workflow.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("Push stream failed: {0}")]
    Stream(#[from] tokio_tungstenite::tungstenite::Error),
}

pub struct PushChannel {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushChannel {
    pub async fn connect(url: &str) -> Result<Self, PushError> {
        let (stream, _) = connect_async(url).await.map_err(|source| PushError::Connect {
            url: url.to_string(),
            source,
        })?;
        tracing::debug!(url = %url, "push channel connected");
        Ok(Self {
            url: url.to_string(),
            stream,
        })
    }

    /// Next text frame. `None` means the server closed the channel.
    ///
    /// Control frames are skipped; pings are answered by the stream itself.
    pub async fn next_frame(&mut self) -> Option<Result<String, PushError>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!(url = %self.url, "dropping non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(PushError::Stream(e))),
            }
        }
        None
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.stream.send(Message::Close(None)).await {
            tracing::debug!(url = %self.url, error = %e, "close frame not delivered");
        }
    }
}
