use std::{sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    mangabot_channels::EventHandler,
    mangabot_config::OneBotConfig,
    tokio::{
        net::TcpStream,
        sync::mpsc,
        task::JoinHandle,
        time::{Instant, interval_at},
    },
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{
            Message,
            client::IntoClientRequest,
            http::{HeaderValue, header::AUTHORIZATION},
        },
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Error,
    error::Result,
    event::{Frame, parse_frame},
    outbound::OneBotOutbound,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Frame prefix kept in debug logs.
const LOG_PREVIEW: usize = 200;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a OneBot v11 endpoint (NapCat, Lagrange, ...).
///
/// Keeps one connection alive, reconnecting with exponential backoff. Every
/// inbound event is handed to the [`EventHandler`] on its own task; replies go
/// out through the [`OneBotOutbound`] shared with whoever sends them.
pub struct OneBotClient {
    config: OneBotConfig,
    outbound: OneBotOutbound,
    handler: Arc<dyn EventHandler>,
}

impl OneBotClient {
    pub fn new(
        config: OneBotConfig,
        outbound: OneBotOutbound,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            config,
            outbound,
            handler,
        }
    }

    /// Run the connection loop in the background until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.connection_loop(cancel))
    }

    async fn connection_loop(self, cancel: CancellationToken) {
        let max_backoff = Duration::from_secs(self.config.max_backoff_secs.max(1));
        let mut backoff = INITIAL_BACKOFF;
        let url = self.config.redacted_url();

        loop {
            info!(url = %url, "connecting to OneBot endpoint");
            let connected = tokio::select! {
                result = self.connect() => result,
                () = cancel.cancelled() => break,
            };

            match connected {
                Ok(stream) => {
                    info!(url = %url, "connected to OneBot endpoint");
                    backoff = INITIAL_BACKOFF;
                    match self.run_session(stream, &cancel).await {
                        Ok(()) => debug!("connection closed"),
                        Err(e) => warn!(error = %e, "connection lost"),
                    }
                },
                Err(e) => error!(url = %url, error = %e, "connection failed"),
            }
            self.outbound.detach();

            if cancel.is_cancelled() {
                break;
            }
            info!(delay_ms = backoff.as_millis() as u64, "reconnecting after delay");
            tokio::select! {
                () = tokio::time::sleep(backoff) => {},
                () = cancel.cancelled() => break,
            }
            backoff = (backoff * 2).min(max_backoff);
        }

        self.outbound.detach();
        info!("OneBot client stopped");
    }

    async fn connect(&self) -> Result<WsStream> {
        let url = url::Url::parse(&self.config.ws_url).map_err(|e| Error::InvalidUrl {
            url: self.config.redacted_url(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::InvalidUrl {
                url: self.config.redacted_url(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let mut request = url.as_str().into_client_request()?;
        if let Some(token) = self.config.token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InvalidToken(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request).await?;
        Ok(stream)
    }

    /// Pump one connection until it closes, fails, or `cancel` fires.
    async fn run_session(&self, stream: WsStream, cancel: &CancellationToken) -> Result<()> {
        let (mut ws_sink, mut ws_reader) = stream.split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        self.outbound.attach(write_tx);

        let period = Duration::from_secs(self.config.ping_interval_secs.max(1));
        let mut ping = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                msg = ws_reader.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_frame(text.as_str()),
                    Some(Ok(Message::Ping(data))) => ws_sink.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by server");
                        return Ok(());
                    },
                    None => return Ok(()),
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return Err(e.into()),
                },
                Some(text) = write_rx.recv() => {
                    ws_sink.send(Message::Text(text.into())).await?;
                },
                _ = ping.tick() => {
                    ws_sink.send(Message::Ping(Default::default())).await?;
                },
                () = cancel.cancelled() => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    return Ok(());
                },
            }
        }
    }

    fn on_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(Frame::Event(event)) => {
                debug!(kind = event.label(), frame = preview(text), "inbound event");
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    handler.handle_event(event).await;
                });
            },
            Ok(Frame::ActionResponse {
                status,
                retcode,
                echo,
            }) => {
                if status == "failed" {
                    warn!(retcode, echo = ?echo, "action failed");
                } else {
                    debug!(%status, retcode, echo = ?echo, "action response");
                }
            },
            Ok(Frame::Ignored(reason)) => debug!(%reason, frame = preview(text), "frame ignored"),
            Err(e) => warn!(error = %e, frame = preview(text), "malformed frame"),
        }
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        async_trait::async_trait,
        mangabot_channels::{InboundEvent, NotificationSink, ReplyTarget},
        secrecy::Secret,
        serde_json::{Value, json},
        tokio::net::TcpListener,
        tokio_tungstenite::{
            accept_hdr_async,
            tungstenite::handshake::server::{ErrorResponse, Request, Response},
        },
    };

    use super::*;

    /// Replies "pong" to every private message and records what it saw.
    struct EchoHandler {
        outbound: OneBotOutbound,
        seen: Mutex<Vec<InboundEvent>>,
    }

    #[async_trait]
    impl EventHandler for EchoHandler {
        async fn handle_event(&self, event: InboundEvent) {
            self.seen.lock().unwrap().push(event.clone());
            if let InboundEvent::PrivateMessage(msg) = &event {
                self.outbound
                    .send_text(&ReplyTarget::private(&msg.sender_id), "pong")
                    .await
                    .unwrap();
            }
        }
    }

    fn config(url: String, token: Option<&str>) -> OneBotConfig {
        OneBotConfig {
            ws_url: url,
            token: token.map(|t| Secret::new(t.to_string())),
            ping_interval_secs: 30,
            max_backoff_secs: 1,
        }
    }

    #[tokio::test]
    async fn round_trip_through_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let auth = Arc::new(Mutex::new(None));
            let seen_auth = Arc::clone(&auth);
            let callback = move |req: &Request,
                                 resp: Response|
                  -> std::result::Result<Response, ErrorResponse> {
                *seen_auth.lock().unwrap() = req
                    .headers()
                    .get(AUTHORIZATION)
                    .map(|v| v.to_str().unwrap().to_string());
                Ok(resp)
            };
            let mut ws = accept_hdr_async(stream, callback).await.unwrap();

            let event = json!({
                "post_type": "message",
                "message_type": "private",
                "user_id": 42,
                "raw_message": "ping",
                "self_id": 10001,
            });
            ws.send(Message::Text(event.to_string().into())).await.unwrap();

            let reply = loop {
                match ws.next().await.unwrap().unwrap() {
                    Message::Text(text) => break text.to_string(),
                    _ => continue,
                }
            };
            let token = auth.lock().unwrap().clone();
            (token, reply)
        });

        let outbound = OneBotOutbound::new();
        let handler = Arc::new(EchoHandler {
            outbound: outbound.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let client = OneBotClient::new(
            config(format!("ws://{addr}"), Some("s3cret")),
            outbound.clone(),
            Arc::clone(&handler) as Arc<dyn EventHandler>,
        )
        .spawn(cancel.clone());

        let (token, reply) = tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.as_deref(), Some("Bearer s3cret"));

        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["action"], "send_private_msg");
        assert_eq!(reply["params"]["user_id"], 42);
        assert_eq!(reply["params"]["message"], "pong");
        assert_eq!(handler.seen.lock().unwrap()[0].self_id(), Some("10001"));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .unwrap()
            .unwrap();
        assert!(!outbound.is_connected());
    }

    #[tokio::test]
    async fn rejects_non_websocket_urls() {
        let client = OneBotClient::new(
            config("http://localhost:1".into(), None),
            OneBotOutbound::new(),
            Arc::new(EchoHandler {
                outbound: OneBotOutbound::new(),
                seen: Mutex::new(Vec::new()),
            }),
        );
        assert!(matches!(
            client.connect().await,
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_stops_reconnect_loop() {
        // Nothing listens on this port; the loop keeps backing off until cancelled.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        let handle = OneBotClient::new(
            config(format!("ws://{addr}"), None),
            OneBotOutbound::new(),
            Arc::new(EchoHandler {
                outbound: OneBotOutbound::new(),
                seen: Mutex::new(Vec::new()),
            }),
        )
        .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
