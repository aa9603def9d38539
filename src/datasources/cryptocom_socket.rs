//! Client for the Crypto.com Exchange user WebSocket API.
//!
//! One client owns one connection. Every fetch walks the session through
//! `Disconnected -> Connected -> Authenticated -> Disconnected`; nothing is
//! reused between fetches.

use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{
    error::{Result, TrackerError},
    position::{decimal_from_json, Position},
    signing::{hmac_sha256_hex, signature_payload},
};

pub const AUTH_METHOD: &str = "public/auth";
pub const BALANCE_METHOD: &str = "user.getBalance";
pub const HEARTBEAT_METHOD: &str = "public/heartbeat";
pub const HEARTBEAT_REPLY_METHOD: &str = "public/respond-heartbeat";
pub const PLATFORM: &str = "Crypto.com";

const BALANCE_FIELDS: [&str; 4] = ["balance", "available", "order", "stake"];

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketTimings {
    /// Bound on connecting and on every awaited response.
    pub response_timeout: Duration,
    /// Pause between authentication attempts.
    pub retry_delay: Duration,
    pub auth_attempts: u32,
}

impl Default for SocketTimings {
    fn default() -> Self {
        SocketTimings {
            response_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            auth_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Outbound frames. All of them share one envelope on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestFrame {
    /// Carries `api_key` and `sig`.
    Signed {
        method: &'static str,
        params: Map<String, JsonValue>,
    },
    /// Relies on the session having been authenticated.
    Plain {
        method: &'static str,
        params: Map<String, JsonValue>,
    },
    HeartbeatReply,
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<i64>,
}

impl RequestFrame {
    pub fn auth() -> RequestFrame {
        RequestFrame::Signed {
            method: AUTH_METHOD,
            params: Map::new(),
        }
    }

    pub fn get_balance() -> RequestFrame {
        RequestFrame::Plain {
            method: BALANCE_METHOD,
            params: Map::new(),
        }
    }

    pub fn encode(&self, credentials: &Credentials, id: u64, nonce: i64) -> Result<String> {
        let envelope = match self {
            RequestFrame::Signed { method, params } => {
                let payload = signature_payload(method, id, &credentials.api_key, params, nonce);
                Envelope {
                    id,
                    method,
                    params: Some(params).filter(|p| !p.is_empty()),
                    api_key: Some(credentials.api_key.as_str()),
                    sig: Some(hmac_sha256_hex(&credentials.api_secret, &payload)?),
                    nonce: Some(nonce),
                }
            }
            RequestFrame::Plain { method, params } => Envelope {
                id,
                method,
                params: Some(params),
                api_key: None,
                sig: None,
                nonce: Some(nonce),
            },
            RequestFrame::HeartbeatReply => Envelope {
                id,
                method: HEARTBEAT_REPLY_METHOD,
                params: None,
                api_key: None,
                sig: None,
                nonce: None,
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

/// Inbound frame. Success and error responses share this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: JsonValue,
}

impl ResponseFrame {
    pub fn answers(&self, id: u64) -> bool {
        self.id.and_then(|v| u64::try_from(v).ok()) == Some(id)
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn into_error(self) -> TrackerError {
        TrackerError::Exchange {
            code: self.code.unwrap_or(-1),
            message: self.message.unwrap_or_else(|| "no message".to_owned()),
        }
    }
}

pub struct ExchangeSocketClient {
    url: String,
    credentials: Credentials,
    timings: SocketTimings,
    stream: Option<WsStream>,
    authenticated: bool,
    next_id: u64,
}

impl ExchangeSocketClient {
    pub fn new(url: String, credentials: Credentials, timings: SocketTimings) -> ExchangeSocketClient {
        ExchangeSocketClient {
            url,
            credentials,
            timings,
            stream: None,
            authenticated: false,
            next_id: u64::try_from(Utc::now().timestamp_millis()).unwrap_or(1),
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.stream, self.authenticated) {
            (None, _) => SessionState::Disconnected,
            (Some(_), false) => SessionState::Connected,
            (Some(_), true) => SessionState::Authenticated,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (stream, _) = timeout(self.timings.response_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TrackerError::Timeout(format!("connecting to {}", self.url)))??;
        debug!("Connected to {}", self.url);
        self.stream = Some(stream);
        self.authenticated = false;
        Ok(())
    }

    async fn send(&mut self, frame: &RequestFrame, id: u64) -> Result<()> {
        let text = frame.encode(&self.credentials, id, Utc::now().timestamp_millis())?;
        let limit = self.timings.response_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TrackerError::Transport("not connected".to_owned()))?;
        send_text(stream, text, limit).await
    }

    /// Reads until the frame answering `id` arrives, answering heartbeats on the way.
    async fn read_response(&mut self, id: u64) -> Result<ResponseFrame> {
        let limit = self.timings.response_timeout;
        let credentials = &self.credentials;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TrackerError::Transport("not connected".to_owned()))?;
        loop {
            let message = match stream.next().await {
                Some(message) => message?,
                None => return Err(TrackerError::Transport("connection closed by exchange".to_owned())),
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    return Err(TrackerError::Transport(format!(
                        "connection closed by exchange: {:?}",
                        frame
                    )))
                }
                _ => continue,
            };
            let frame: ResponseFrame = match serde_json::from_str(text.as_str()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Crypto.com: skipping unreadable frame: {}", e);
                    continue;
                }
            };
            if frame.method.as_deref() == Some(HEARTBEAT_METHOD) {
                if let Some(heartbeat_id) = frame.id.and_then(|v| u64::try_from(v).ok()) {
                    let reply = RequestFrame::HeartbeatReply.encode(credentials, heartbeat_id, 0)?;
                    send_text(stream, reply, limit).await?;
                }
                continue;
            }
            if frame.answers(id) {
                return Ok(frame);
            }
            debug!("Crypto.com: ignoring frame {:?} while waiting for {}", frame.id, id);
        }
    }

    async fn await_response(&mut self, id: u64, what: &str) -> Result<ResponseFrame> {
        let limit = self.timings.response_timeout;
        timeout(limit, self.read_response(id))
            .await
            .map_err(|_| TrackerError::Timeout(format!("no {} response within {:?}", what, limit)))?
    }

    async fn try_authenticate(&mut self) -> Result<()> {
        self.connect().await?;
        let id = self.next_id();
        self.send(&RequestFrame::auth(), id).await?;
        let response = self.await_response(id, AUTH_METHOD).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(response.into_error())
        }
    }

    pub async fn authenticate(&mut self) -> Result<()> {
        let attempts = self.timings.auth_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_authenticate().await {
                Ok(()) => {
                    self.authenticated = true;
                    info!("Crypto.com: authenticated on attempt {}", attempt);
                    return Ok(());
                }
                // The socket stays open; a late answer is skipped by id.
                Err(e @ TrackerError::Timeout(_)) | Err(e @ TrackerError::Exchange { .. }) => {
                    warn!("Crypto.com: auth attempt {}/{} failed: {}", attempt, attempts, e);
                }
                Err(e) => {
                    warn!("Crypto.com: auth attempt {}/{} errored: {}", attempt, attempts, e);
                    self.stream = None;
                    self.authenticated = false;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.timings.retry_delay).await;
            }
        }
        Err(TrackerError::Auth(format!(
            "Crypto.com rejected or ignored {} authentication attempts",
            attempts
        )))
    }

    async fn request_balances(&mut self) -> Result<Vec<Position>> {
        if !self.authenticated {
            self.authenticate().await?;
        }
        let id = self.next_id();
        self.send(&RequestFrame::get_balance(), id).await?;
        let response = self.await_response(id, BALANCE_METHOD).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        parse_accounts(&response.result)
    }

    /// One authenticated balance snapshot. The connection is closed afterwards either way.
    pub async fn fetch_balances(&mut self) -> Result<Vec<Position>> {
        let outcome = self.request_balances().await;
        self.close().await;
        outcome
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!("Crypto.com: error while closing socket: {}", e);
            }
        }
        self.authenticated = false;
    }
}

async fn send_text(stream: &mut WsStream, text: String, limit: Duration) -> Result<()> {
    timeout(limit, stream.send(Message::Text(text.into())))
        .await
        .map_err(|_| TrackerError::Timeout(format!("frame not sent within {:?}", limit)))??;
    Ok(())
}

fn field_amount(account: &JsonValue, currency: &str, field: &str) -> Decimal {
    match &account[field] {
        JsonValue::Null => Decimal::ZERO,
        value => decimal_from_json(value).unwrap_or_else(|| {
            warn!("Crypto.com: unreadable {} for {}: {}", field, currency, value);
            Decimal::ZERO
        }),
    }
}

/// Sums balance, available, order and stake per currency, dropping empty currencies.
pub fn parse_accounts(result: &JsonValue) -> Result<Vec<Position>> {
    let accounts = result["accounts"]
        .as_array()
        .ok_or_else(|| TrackerError::Parse("Crypto.com: balance result has no accounts".to_owned()))?;
    Ok(accounts
        .iter()
        .filter_map(|account| {
            let currency = match account["currency"].as_str().filter(|c| !c.is_empty()) {
                Some(currency) => currency,
                None => {
                    warn!("Crypto.com: account entry without currency: {}", account);
                    return None;
                }
            };
            let total: Decimal = BALANCE_FIELDS
                .iter()
                .map(|field| field_amount(account, currency, field))
                .sum();
            if total > Decimal::ZERO {
                Some(Position::new(currency, total, PLATFORM))
            } else {
                None
            }
        })
        .collect())
}
