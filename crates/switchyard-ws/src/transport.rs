//! [`Transport`] over a WebSocket stream.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use switchyard::{Frame, Transport, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::WS_TARGET;

/// Client stream produced by [`dial`].
type ClientStream = MaybeTlsStream<TcpStream>;

/// How long [`WsTransport`]'s close waits to hand the close frame over.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// One WebSocket connection split into independently locked halves.
///
/// Text and binary messages carry frames; control messages are consumed
/// here. A close message or the end of the stream surfaces as
/// [`TransportError::ConnectionClosed`].
pub struct WsTransport<S = ClientStream> {
    writer: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    reader: Mutex<SplitStream<WebSocketStream<S>>>,
    closed: CancellationToken,
}

/// Opens a WebSocket connection to `url`.
///
/// # Errors
///
/// Returns [`TransportError::Io`] when the socket cannot be opened and
/// [`TransportError::Backend`] when the URL or handshake is rejected.
pub async fn dial(url: &str) -> Result<WsTransport, TransportError> {
    debug!(target: WS_TARGET, url, "dialling");
    let (stream, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(map_ws_error)?;
    debug!(target: WS_TARGET, url, status = %response.status(), "connected");
    Ok(WsTransport::new(stream))
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an established WebSocket stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>) -> Self {
        let (writer, reader) = stream.split();
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            closed: CancellationToken::new(),
        }
    }

    async fn next_frame(&self) -> Result<Frame, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Bytes::from(text)),
                Some(Ok(Message::Binary(data))) => return Ok(Bytes::from(data)),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    trace!(target: WS_TARGET, "skipping control message");
                }
                Some(Ok(Message::Close(close))) => {
                    debug!(target: WS_TARGET, ?close, "peer closed the connection");
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(error)) => return Err(map_ws_error(error)),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let message = match String::from_utf8(frame.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(error) => Message::Binary(error.into_bytes()),
        };
        // Both the lock and the write yield to `closed`, even when the peer
        // has stopped reading.
        let mut writer = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(TransportError::Closed),
            writer = self.writer.lock() => writer,
        };
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(TransportError::Closed),
            sent = writer.send(message) => sent.map_err(map_ws_error),
        }
    }

    async fn receive(&self) -> Result<Frame, TransportError> {
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(TransportError::Closed),
            frame = self.next_frame() => frame,
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        let handshake = async { self.writer.lock().await.close().await };
        match tokio::time::timeout(CLOSE_GRACE, handshake).await {
            Ok(
                Ok(())
                | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed),
            ) => Ok(()),
            Ok(Err(error)) => Err(map_ws_error(error)),
            Err(_) => {
                debug!(target: WS_TARGET, "peer did not take the close frame; dropping");
                Ok(())
            }
        }
    }
}

impl<S> std::fmt::Debug for WsTransport<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WsTransport")
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn map_ws_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionClosed
        }
        tungstenite::Error::Io(error) => TransportError::Io(error),
        other => TransportError::backend(other),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rstest::rstest;
    use serde_json::{Value, json};
    use switchyard::{CancellationToken, Multiplexer, MuxError, Request, Response};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves one WebSocket client, answering each request by echoing its
    /// params and pinging before every answer.
    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut stream = tokio_tungstenite::accept_async(socket)
                .await
                .expect("handshake");
            while let Some(Ok(message)) = stream.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let request = Request::decode(text.as_bytes()).expect("request");
                let reply = Response::success(request.id, request.params.unwrap_or(Value::Null))
                    .encode()
                    .expect("encode");
                let reply = String::from_utf8(reply.to_vec()).expect("utf-8");
                stream.send(Message::Ping(Vec::new())).await.expect("ping");
                stream.send(Message::Text(reply)).await.expect("reply");
            }
        });
        addr
    }

    #[rstest]
    #[tokio::test]
    async fn multiplexer_round_trips_over_websocket() {
        let addr = echo_server().await;
        let transport = dial(&format!("ws://{addr}/devtools/page/1"))
            .await
            .expect("dial");
        let mux = Multiplexer::new(transport);
        let cancel = CancellationToken::new();

        let result: Value = mux
            .call("Runtime.evaluate", json!({"expression": "1 + 1"}), &cancel)
            .await
            .expect("call");

        assert_eq!(result, json!({"expression": "1 + 1"}));
        mux.close().await.expect("close");
    }

    #[rstest]
    #[tokio::test]
    async fn server_hangup_disconnects_the_multiplexer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut stream = tokio_tungstenite::accept_async(socket)
                .await
                .expect("handshake");
            let _request = stream.next().await;
            stream.close(None).await.expect("close");
        });
        let mux = Multiplexer::new(dial(&format!("ws://{addr}")).await.expect("dial"));

        let outcome = mux
            .call_value("Page.enable", json!({}), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, Err(MuxError::Disconnected { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn close_is_not_blocked_by_a_stalled_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (accepted, hold) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let stream = tokio_tungstenite::accept_async(socket)
                .await
                .expect("handshake");
            // Keep the connection open without ever reading from it.
            let _ = accepted.send(stream);
        });
        let transport = std::sync::Arc::new(dial(&format!("ws://{addr}")).await.expect("dial"));
        let _server_side = hold.await.expect("server stream");

        let writer = std::sync::Arc::clone(&transport);
        let flood = tokio::spawn(async move {
            let chunk = Bytes::from(vec![b'x'; 1 << 20]);
            loop {
                if let Err(error) = writer.send(chunk.clone()).await {
                    return error;
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(2), transport.close())
            .await
            .expect("close finished")
            .expect("close succeeded");
        let error = tokio::time::timeout(Duration::from_secs(2), flood)
            .await
            .expect("sender released")
            .expect("sender task");
        assert!(matches!(error, TransportError::Closed));
    }

    #[rstest]
    #[case("not a url")]
    #[case("ws://127.0.0.1:1/devtools")]
    #[tokio::test]
    async fn dial_failures_are_transport_errors(#[case] url: &str) {
        assert!(dial(url).await.is_err());
    }
}
