use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use lendflow_types::{ChatEvent, ChatRequest};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bounded reconnect: fixed delay between attempts, capped by count and by
/// total time spent waiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub max_wait: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            max_wait,
        }
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows_retry(&self, attempts: u32, waited: Duration) -> bool {
        attempts < self.max_attempts && waited + self.delay <= self.max_wait
    }
}

/// One long-lived `/ws/chat` connection for a session, reused across turns
pub struct WsSession {
    url: String,
    session_id: String,
    policy: ReconnectPolicy,
    socket: Option<WsStream>,
}

impl WsSession {
    pub fn new(base_url: &str, session_id: &str, policy: ReconnectPolicy) -> Result<Self> {
        Ok(Self {
            url: chat_socket_url(base_url, session_id)?,
            session_id: session_id.to_string(),
            policy,
            socket: None,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Open the connection if it is not already open, retrying per policy
    pub async fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let start = Instant::now();
        let mut attempts: u32 = 0;

        let socket = loop {
            attempts += 1;
            match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => break socket,
                Err(err) => {
                    if !self.policy.allows_retry(attempts, start.elapsed()) {
                        return Err(ClientError::ConnectFailed {
                            attempts,
                            reason: err.to_string(),
                        });
                    }
                    tracing::debug!(
                        "Chat socket not reachable (attempt {}): {}; retrying in {:?}",
                        attempts,
                        err,
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        };

        tracing::info!(session_id = %self.session_id, attempts, "Chat socket connected");
        self.socket = Some(socket);
        Ok(())
    }

    /// Send one user turn, reconnecting first if the socket was dropped
    pub async fn send_turn(&mut self, request: &ChatRequest) -> Result<()> {
        let frame = serde_json::to_string(request)?;

        self.connect().await?;
        if let Some(socket) = self.socket.as_mut() {
            if socket.send(Message::Text(frame.clone())).await.is_ok() {
                return Ok(());
            }
        }

        // Stale connection: one fresh attempt before giving up
        self.socket = None;
        self.connect().await?;
        match self.socket.as_mut() {
            Some(socket) => Ok(socket.send(Message::Text(frame)).await?),
            None => Err(ClientError::ConnectionLost("socket unavailable".to_string())),
        }
    }

    /// Next protocol event on the connection
    ///
    /// Malformed frames are logged and skipped. Any loss of the connection
    /// is reported as `ConnectionLost`; the next `send_turn` reconnects.
    pub async fn next_event(&mut self) -> Result<ChatEvent> {
        loop {
            let socket = self
                .socket
                .as_mut()
                .ok_or_else(|| ClientError::ConnectionLost("not connected".to_string()))?;

            match socket.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ChatEvent>(&text) {
                    Ok(event) => return Ok(event),
                    Err(e) => tracing::warn!("Dropping malformed socket frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    self.socket = None;
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Err(ClientError::ConnectionLost(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.socket = None;
                    return Err(ClientError::ConnectionLost(e.to_string()));
                }
                None => {
                    self.socket = None;
                    return Err(ClientError::ConnectionLost("stream ended".to_string()));
                }
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                tracing::debug!("Error closing chat socket: {}", e);
            }
        }
    }
}

/// `http(s)://host[/prefix]` → `ws(s)://host[/prefix]/ws/chat?session_id=..`
pub fn chat_socket_url(base_url: &str, session_id: &str) -> Result<String> {
    let mut url =
        Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::InvalidUrl(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;

    let path = format!("{}/ws/chat", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("session_id", session_id);

    Ok(url.to_string())
}
